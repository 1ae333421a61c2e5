use anyhow::Context;
use bucketflow_cloud::{BucketRecord, Database, RecordChange, StateLock, StateManager};
use bucketflow_cloud_aws::{AwsCli, AwsGateway};
use bucketflow_config::Settings;
use bucketflow_deploy::CdkCommand;
use colored::Colorize;

/// Settings plus the handles derived from them
pub struct AppContext {
    pub settings: Settings,
    pub state: StateManager,
}

impl AppContext {
    pub fn load() -> anyhow::Result<Self> {
        let settings = Settings::load().context("Failed to load configuration")?;
        if let Some(path) = &settings.source {
            tracing::debug!("Using config {}", path.display());
        }
        let data_dir = settings.data_dir()?;
        Ok(Self {
            state: StateManager::new(data_dir),
            settings,
        })
    }

    /// Gateway in the configured region
    pub fn gateway(&self) -> AwsGateway {
        self.gateway_in(self.settings.aws.region.clone())
    }

    /// Gateway in the region the record's resources live in
    pub fn gateway_for(&self, record: &BucketRecord) -> AwsGateway {
        self.gateway_in(Some(record.region.clone()))
    }

    fn gateway_in(&self, region: Option<String>) -> AwsGateway {
        let aws = &self.settings.aws;
        AwsGateway::new(
            AwsCli::new()
                .with_program(&aws.program)
                .with_profile(aws.profile.clone())
                .with_region(region)
                .with_timeout(aws.timeout()),
        )
    }

    /// Take the store lock and load the records for writing.
    ///
    /// Records left `deleting` by a process that died mid-teardown are
    /// reverted to `failed` first; their journal is kept for resuming.
    pub async fn load_locked(&self) -> anyhow::Result<(StateLock, Database)> {
        let lock = self.state.acquire_lock().await?;
        let mut db = self.state.load().await?;
        let recovered = db.recover_interrupted_teardowns();
        if !recovered.is_empty() {
            self.state.save(&db).await?;
        }
        Ok((lock, db))
    }

    pub fn cdk(&self) -> CdkCommand {
        let (program, base_args) = self.settings.cdk.command_parts();
        CdkCommand {
            program,
            base_args,
            app_dir: self.settings.cdk.app_dir.clone(),
            profile: self.settings.aws.profile.clone(),
            stack_prefix: self.settings.stack_prefix().to_string(),
        }
    }

    /// Explicit region, else the configured one
    pub fn region(&self, explicit: Option<String>) -> Option<String> {
        explicit.or_else(|| self.settings.aws.region.clone())
    }
}

/// Look a record up by id, S3 bucket name or display name
pub fn resolve<'a>(db: &'a Database, needle: &str) -> anyhow::Result<&'a BucketRecord> {
    db.resolve_bucket(needle).ok_or_else(|| {
        anyhow::anyhow!(
            "No bucket record matches '{}'.\nRun {} to list recorded buckets.",
            needle,
            "bflow status".cyan()
        )
    })
}

/// Write a record mutation into the database
pub fn apply_change(db: &mut Database, change: RecordChange) -> anyhow::Result<()> {
    match change {
        RecordChange::Update(record) => db.update_bucket(record)?,
        RecordChange::Remove(id) => {
            db.remove_bucket(&id);
        }
        RecordChange::Unchanged => {}
    }
    Ok(())
}
