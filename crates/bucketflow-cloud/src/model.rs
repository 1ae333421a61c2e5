//! Persisted records and live snapshots of cloud resources

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Prefix used when no other is configured
pub const DEFAULT_STACK_PREFIX: &str = "BucketflowStack-";

/// Derive the provisioning stack name for a bucket.
///
/// Stack names only allow alphanumerics and hyphens, so the dots a bucket
/// name may carry are replaced.
pub fn stack_name_for(prefix: &str, s3_bucket_name: &str) -> String {
    let sanitized: String = s3_bucket_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect();
    format!("{}{}", prefix, sanitized)
}

/// Lifecycle of a bucket record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketStatus {
    Pending,
    Deploying,
    Active,
    Failed,
    Deleting,
}

impl std::fmt::Display for BucketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BucketStatus::Pending => write!(f, "pending"),
            BucketStatus::Deploying => write!(f, "deploying"),
            BucketStatus::Active => write!(f, "active"),
            BucketStatus::Failed => write!(f, "failed"),
            BucketStatus::Deleting => write!(f, "deleting"),
        }
    }
}

/// Server-side encryption mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Encryption {
    None,
    #[default]
    ServerSide,
    ManagedKey,
}

/// Desired bucket configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketConfig {
    #[serde(default)]
    pub versioning: bool,

    #[serde(default)]
    pub encryption: Encryption,

    #[serde(default)]
    pub backup_enabled: bool,

    #[serde(default = "default_max_file_size_mb", rename = "maxFileSizeMB")]
    pub max_file_size_mb: u64,
}

fn default_max_file_size_mb() -> u64 {
    100
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            versioning: false,
            encryption: Encryption::default(),
            backup_enabled: false,
            max_file_size_mb: default_max_file_size_mb(),
        }
    }
}

/// Desired storage + CDN resource pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketRecord {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub s3_bucket_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3_bucket_arn: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_front_domain: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_front_distribution_id: Option<String>,

    pub region: String,
    pub status: BucketStatus,

    #[serde(default)]
    pub config: BucketConfig,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BucketRecord {
    pub fn new(
        project_id: impl Into<String>,
        name: impl Into<String>,
        s3_bucket_name: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            project_id: project_id.into(),
            name: name.into(),
            s3_bucket_name: s3_bucket_name.into(),
            s3_bucket_arn: None,
            cloud_front_domain: None,
            cloud_front_distribution_id: None,
            region: region.into(),
            status: BucketStatus::Pending,
            config: BucketConfig::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_status(mut self, status: BucketStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_distribution(mut self, id: impl Into<String>, domain: impl Into<String>) -> Self {
        self.cloud_front_distribution_id = Some(id.into());
        self.cloud_front_domain = Some(domain.into());
        self
    }

    pub fn set_status(&mut self, status: BucketStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    pub fn stack_name(&self, prefix: &str) -> String {
        stack_name_for(prefix, &self.s3_bucket_name)
    }
}

/// A project grouping bucket records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    pub created_at: DateTime<Utc>,
}

/// Index entry for an uploaded object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub id: String,
    pub bucket_id: String,
    pub key: String,

    #[serde(default)]
    pub size: u64,

    #[serde(default)]
    pub content_type: Option<String>,

    pub uploaded_at: DateTime<Utc>,
}

/// Live snapshot of a provisioning stack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackStatus {
    pub stack_name: String,
    pub status: String,

    #[serde(default)]
    pub status_reason: Option<String>,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub outputs: HashMap<String, String>,

    #[serde(default)]
    pub resources: Vec<StackResource>,
}

impl StackStatus {
    pub fn new(stack_name: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            stack_name: stack_name.into(),
            status: status.into(),
            status_reason: None,
            created_at: None,
            updated_at: None,
            outputs: HashMap::new(),
            resources: Vec::new(),
        }
    }

    pub fn with_output(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.outputs.insert(key.into(), value.into());
        self
    }

    pub fn phase(&self) -> StackPhase {
        StackPhase::classify(&self.status)
    }

    /// First output whose key matches one of `keys`
    pub fn output(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .find_map(|k| self.outputs.get(*k))
            .map(String::as_str)
    }

    pub fn distribution_id(&self) -> Option<&str> {
        self.output(&["DistributionId", "CloudFrontDistributionId"])
    }

    pub fn distribution_domain(&self) -> Option<&str> {
        self.output(&[
            "DistributionDomainName",
            "CloudFrontDomain",
            "CloudFrontDomainName",
        ])
    }

    pub fn bucket_arn(&self) -> Option<&str> {
        self.output(&["BucketArn", "S3BucketArn"])
    }
}

/// One resource owned by a stack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackResource {
    pub logical_id: String,

    #[serde(default)]
    pub physical_id: Option<String>,

    #[serde(rename = "type")]
    pub resource_type: String,

    pub status: String,

    #[serde(default)]
    pub reason: Option<String>,

    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

/// Coarse lifecycle phase derived from a stack status string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackPhase {
    /// CREATE_COMPLETE, UPDATE_COMPLETE, IMPORT_COMPLETE
    Complete,
    /// Any `*_IN_PROGRESS`
    InProgress,
    /// Rollback or failure terminal states
    Failed,
    /// DELETE_COMPLETE: the stack is gone even if still listed
    Deleted,
    Unknown,
}

impl StackPhase {
    pub fn classify(status: &str) -> Self {
        let status = status.to_ascii_uppercase();
        if status.ends_with("_IN_PROGRESS") {
            StackPhase::InProgress
        } else if status == "DELETE_COMPLETE" {
            StackPhase::Deleted
        } else if status.contains("ROLLBACK") || status.contains("FAILED") {
            StackPhase::Failed
        } else if status.ends_with("_COMPLETE") {
            StackPhase::Complete
        } else {
            StackPhase::Unknown
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_name_derivation() {
        assert_eq!(
            stack_name_for(DEFAULT_STACK_PREFIX, "my-assets"),
            "BucketflowStack-my-assets"
        );
        assert_eq!(stack_name_for("S-", "static.example.com"), "S-static-example-com");
    }

    #[test]
    fn test_stack_phase_classification() {
        assert_eq!(StackPhase::classify("CREATE_COMPLETE"), StackPhase::Complete);
        assert_eq!(StackPhase::classify("UPDATE_COMPLETE"), StackPhase::Complete);
        assert_eq!(StackPhase::classify("CREATE_IN_PROGRESS"), StackPhase::InProgress);
        assert_eq!(
            StackPhase::classify("UPDATE_ROLLBACK_IN_PROGRESS"),
            StackPhase::InProgress
        );
        assert_eq!(StackPhase::classify("ROLLBACK_COMPLETE"), StackPhase::Failed);
        assert_eq!(StackPhase::classify("CREATE_FAILED"), StackPhase::Failed);
        assert_eq!(StackPhase::classify("DELETE_COMPLETE"), StackPhase::Deleted);
        assert_eq!(StackPhase::classify("REVIEW"), StackPhase::Unknown);
    }

    #[test]
    fn test_record_json_layout() {
        let record = BucketRecord::new("p1", "Assets", "my-assets", "us-east-1")
            .with_distribution("E2ABC", "d111.cloudfront.net");
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["s3BucketName"], "my-assets");
        assert_eq!(json["cloudFrontDistributionId"], "E2ABC");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["config"]["encryption"], "server-side");
        assert_eq!(json["config"]["maxFileSizeMB"], 100);
    }

    #[test]
    fn test_outputs_lookup() {
        let stack = StackStatus::new("s", "CREATE_COMPLETE")
            .with_output("DistributionId", "E1")
            .with_output("CloudFrontDomain", "d1.cloudfront.net");
        assert_eq!(stack.distribution_id(), Some("E1"));
        assert_eq!(stack.distribution_domain(), Some("d1.cloudfront.net"));
        assert_eq!(stack.bucket_arn(), None);
    }
}
