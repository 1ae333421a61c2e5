//! Local record store
//!
//! Persists projects, bucket records, the file index and the teardown
//! journal in `<data_dir>/db.json`.

use crate::error::{CloudError, Result};
use crate::model::{BucketRecord, BucketStatus, FileEntry, Project};
use crate::teardown::TeardownPlan;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

const DB_VERSION: u32 = 1;
const DB_FILE: &str = "db.json";
const DB_BACKUP: &str = "db.json.backup";
const LOCK_FILE: &str = "lock.json";
const LOCK_STALE_HOURS: i64 = 1;

/// Everything the tool knows locally
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Database {
    pub version: u32,
    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub projects: Vec<Project>,

    #[serde(default)]
    pub buckets: Vec<BucketRecord>,

    #[serde(default)]
    pub files: Vec<FileEntry>,

    /// In-flight or halted teardowns, keyed by bucket id
    #[serde(default)]
    pub teardowns: BTreeMap<String, TeardownJournal>,
}

/// Persisted progress of one teardown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeardownJournal {
    pub bucket_id: String,
    pub plan: TeardownPlan,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl Database {
    pub fn new() -> Self {
        Self {
            version: DB_VERSION,
            updated_at: Utc::now(),
            projects: Vec::new(),
            buckets: Vec::new(),
            files: Vec::new(),
            teardowns: BTreeMap::new(),
        }
    }

    pub fn insert_project(&mut self, name: impl Into<String>, description: Option<String>) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.projects.push(Project {
            id: id.clone(),
            name: name.into(),
            description,
            created_at: Utc::now(),
        });
        self.touch();
        id
    }

    pub fn find_project(&self, id: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.id == id)
    }

    pub fn find_bucket(&self, id: &str) -> Option<&BucketRecord> {
        self.buckets.iter().find(|b| b.id == id)
    }

    /// Look a record up by id, display name or bucket name
    pub fn resolve_bucket(&self, needle: &str) -> Option<&BucketRecord> {
        self.find_bucket(needle).or_else(|| {
            self.buckets
                .iter()
                .find(|b| b.s3_bucket_name == needle || b.name == needle)
        })
    }

    pub fn filter_buckets<F>(&self, predicate: F) -> Vec<&BucketRecord>
    where
        F: Fn(&BucketRecord) -> bool,
    {
        self.buckets.iter().filter(|b| predicate(b)).collect()
    }

    /// Store a new record under a fresh id and return the id
    pub fn insert_bucket(&mut self, mut record: BucketRecord) -> String {
        record.id = uuid::Uuid::new_v4().to_string();
        let id = record.id.clone();
        self.buckets.push(record);
        self.touch();
        id
    }

    pub fn update_bucket(&mut self, record: BucketRecord) -> Result<()> {
        let slot = self
            .buckets
            .iter_mut()
            .find(|b| b.id == record.id)
            .ok_or_else(|| CloudError::RecordNotFound(format!("bucket {}", record.id)))?;
        *slot = record;
        self.touch();
        Ok(())
    }

    /// Remove a record together with its file index and journal
    pub fn remove_bucket(&mut self, id: &str) -> Option<BucketRecord> {
        let pos = self.buckets.iter().position(|b| b.id == id)?;
        let record = self.buckets.remove(pos);
        self.files.retain(|f| f.bucket_id != id);
        self.teardowns.remove(id);
        self.touch();
        Some(record)
    }

    pub fn insert_file(&mut self, bucket_id: &str, key: impl Into<String>, size: u64) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.files.push(FileEntry {
            id: id.clone(),
            bucket_id: bucket_id.to_string(),
            key: key.into(),
            size,
            content_type: None,
            uploaded_at: Utc::now(),
        });
        self.touch();
        id
    }

    pub fn files_for(&self, bucket_id: &str) -> Vec<&FileEntry> {
        self.files.iter().filter(|f| f.bucket_id == bucket_id).collect()
    }

    /// Point the index entry for `from` at `to`. Returns false if there was
    /// no entry.
    pub fn rename_file_key(&mut self, bucket_id: &str, from: &str, to: &str) -> bool {
        let Some(entry) = self
            .files
            .iter_mut()
            .find(|f| f.bucket_id == bucket_id && f.key == from)
        else {
            return false;
        };
        entry.key = to.to_string();
        self.touch();
        true
    }

    pub fn record_teardown(&mut self, bucket_id: &str, plan: &TeardownPlan) {
        let now = Utc::now();
        self.teardowns
            .entry(bucket_id.to_string())
            .and_modify(|j| {
                j.plan = plan.clone();
                j.updated_at = now;
            })
            .or_insert_with(|| TeardownJournal {
                bucket_id: bucket_id.to_string(),
                plan: plan.clone(),
                started_at: now,
                updated_at: now,
            });
        self.touch();
    }

    pub fn teardown_progress(&self, bucket_id: &str) -> Option<&TeardownJournal> {
        self.teardowns.get(bucket_id)
    }

    pub fn clear_teardown(&mut self, bucket_id: &str) -> Option<TeardownJournal> {
        let removed = self.teardowns.remove(bucket_id);
        if removed.is_some() {
            self.touch();
        }
        removed
    }

    /// Revert records stuck in `deleting` (the process died mid-teardown) to
    /// `failed`. Journals are kept so a retry resumes where it stopped.
    pub fn recover_interrupted_teardowns(&mut self) -> Vec<String> {
        let mut recovered = Vec::new();
        for record in &mut self.buckets {
            if record.status == BucketStatus::Deleting {
                record.set_status(BucketStatus::Failed);
                recovered.push(record.id.clone());
            }
        }
        if !recovered.is_empty() {
            tracing::warn!("Recovered {} interrupted teardown(s)", recovered.len());
            self.touch();
        }
        recovered
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Reads and writes the database file
pub struct StateManager {
    data_dir: PathBuf,
}

impl StateManager {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE)
    }

    fn backup_path(&self) -> PathBuf {
        self.data_dir.join(DB_BACKUP)
    }

    fn lock_path(&self) -> PathBuf {
        self.data_dir.join(LOCK_FILE)
    }

    async fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            fs::create_dir_all(&self.data_dir).await?;
            tracing::debug!("Created data directory: {}", self.data_dir.display());
        }
        Ok(())
    }

    pub async fn load(&self) -> Result<Database> {
        let path = self.db_path();
        if !path.exists() {
            tracing::debug!("Database not found, starting empty");
            return Ok(Database::new());
        }

        let content = fs::read_to_string(&path).await?;
        let db: Database = serde_json::from_str(&content)?;

        if db.version > DB_VERSION {
            return Err(CloudError::StateError(format!(
                "database version {} is newer than supported version {}",
                db.version, DB_VERSION
            )));
        }

        tracing::debug!(
            "Loaded {} bucket(s), {} journal(s)",
            db.buckets.len(),
            db.teardowns.len()
        );
        Ok(db)
    }

    /// Write the database, keeping the previous file as a backup
    pub async fn save(&self, db: &Database) -> Result<()> {
        self.ensure_data_dir().await?;

        let path = self.db_path();
        if path.exists() {
            fs::copy(&path, self.backup_path()).await?;
        }

        let content = serde_json::to_string_pretty(db)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, &path).await?;

        tracing::debug!("Saved {} bucket(s)", db.buckets.len());
        Ok(())
    }

    /// Take the store lock. A lock older than an hour is considered stale.
    pub async fn acquire_lock(&self) -> Result<StateLock> {
        self.ensure_data_dir().await?;

        let lock_path = self.lock_path();
        if lock_path.exists() {
            let content = fs::read_to_string(&lock_path).await?;
            match serde_json::from_str::<LockInfo>(&content) {
                Ok(info) => {
                    let age = Utc::now().signed_duration_since(info.acquired_at);
                    if age.num_hours() < LOCK_STALE_HOURS {
                        return Err(CloudError::LockError(format!(
                            "store is locked by {} (pid {}) since {}",
                            info.holder, info.pid, info.acquired_at
                        )));
                    }
                    tracing::warn!("Removing stale lock from {}", info.holder);
                }
                Err(e) => tracing::warn!("Replacing unreadable lock file: {}", e),
            }
        }

        let info = LockInfo {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            pid: std::process::id(),
            acquired_at: Utc::now(),
        };
        fs::write(&lock_path, serde_json::to_string_pretty(&info)?).await?;

        tracing::debug!("Acquired store lock");
        Ok(StateLock {
            lock_path,
            released: false,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    #[serde(default)]
    pid: u32,
    acquired_at: DateTime<Utc>,
}

/// Held store lock; removed on release or drop
pub struct StateLock {
    lock_path: PathBuf,
    released: bool,
}

impl StateLock {
    pub async fn release(mut self) -> Result<()> {
        if !self.released {
            if self.lock_path.exists() {
                fs::remove_file(&self.lock_path).await?;
                tracing::debug!("Released store lock");
            }
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if !self.released && self.lock_path.exists() {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}
