//! Cloud resource gateway trait definition

use crate::error::GatewayResult;
use crate::model::StackStatus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status string CloudFront reports once a configuration change has propagated
pub const DISTRIBUTION_DEPLOYED: &str = "Deployed";

/// Thin interface over the three remote resource kinds.
///
/// Every method is a single call against the provider. Methods never retry
/// on their own; the calling workflow decides whether to loop.
#[async_trait]
pub trait CloudGateway: Send + Sync {
    /// Returns the gateway name (e.g., "aws", "memory")
    fn name(&self) -> &str;

    /// Check if the gateway is properly configured and authenticated
    async fn check_auth(&self) -> GatewayResult<AuthStatus>;

    // ========== Stack ==========

    /// Describe a stack with its outputs and resources. `None` when absent.
    async fn describe_stack(&self, stack_name: &str) -> GatewayResult<Option<StackStatus>>;

    /// Request stack deletion. Deleting an absent stack is not an error.
    async fn delete_stack(&self, stack_name: &str) -> GatewayResult<()>;

    // ========== Bucket ==========

    async fn bucket_exists(&self, bucket: &str) -> GatewayResult<bool>;

    /// Fetch one page of a listing. `continuation` is the token returned by
    /// the previous page.
    async fn list_objects_page(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        continuation: Option<&str>,
    ) -> GatewayResult<ObjectPage>;

    /// Batch delete up to 1,000 keys, returning how many were removed
    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> GatewayResult<usize>;

    /// Fetch one page of object versions and delete markers, starting after
    /// `marker`
    async fn list_object_versions_page(
        &self,
        bucket: &str,
        marker: Option<&VersionMarker>,
    ) -> GatewayResult<VersionPage>;

    /// Batch delete up to 1,000 specific versions, returning how many were
    /// removed
    async fn delete_object_versions(
        &self,
        bucket: &str,
        versions: &[ObjectVersion],
    ) -> GatewayResult<usize>;

    async fn delete_bucket(&self, bucket: &str) -> GatewayResult<()>;

    /// Write a zero-length object
    async fn put_empty_object(&self, bucket: &str, key: &str) -> GatewayResult<()>;

    async fn copy_object(&self, bucket: &str, from_key: &str, to_key: &str) -> GatewayResult<()>;

    async fn delete_object(&self, bucket: &str, key: &str) -> GatewayResult<()>;

    // ========== Distribution ==========

    /// Current configuration together with its concurrency token
    async fn get_distribution_config(&self, id: &str) -> GatewayResult<DistributionConfig>;

    /// Submit a configuration. `etag` must be the token of the config it was
    /// derived from; a stale token fails with `Conflict`. Returns the new token.
    async fn update_distribution(
        &self,
        id: &str,
        etag: &str,
        config: &serde_json::Value,
    ) -> GatewayResult<String>;

    /// Fresh read of the propagation status
    async fn get_distribution_status(&self, id: &str) -> GatewayResult<DistributionStatus>;

    /// Delete a disabled, deployed distribution
    async fn delete_distribution(&self, id: &str, etag: &str) -> GatewayResult<()>;
}

/// Authentication status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStatus {
    /// Whether authentication is valid
    pub authenticated: bool,

    /// Account/user information if available
    pub account_info: Option<String>,

    /// Error message if not authenticated
    pub error: Option<String>,
}

impl AuthStatus {
    pub fn ok(account_info: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            account_info: Some(account_info.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            account_info: None,
            error: Some(error.into()),
        }
    }
}

/// Summary of a stored object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,

    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,

    #[serde(default)]
    pub etag: Option<String>,
}

impl ObjectSummary {
    pub fn new(key: impl Into<String>, size: u64) -> Self {
        Self {
            key: key.into(),
            size,
            last_modified: None,
            etag: None,
        }
    }

    /// Zero-length keys ending in `/` are folder markers
    pub fn is_folder_marker(&self) -> bool {
        self.size == 0 && self.key.ends_with('/')
    }
}

/// One page of a bucket listing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectPage {
    pub objects: Vec<ObjectSummary>,

    /// Token for the next page; `None` once the listing is exhausted
    pub next_token: Option<String>,
}

/// One stored version of a key, or a delete marker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectVersion {
    pub key: String,
    pub version_id: String,
    pub delete_marker: bool,
}

/// Position in a version listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionMarker {
    pub key: String,
    pub version_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VersionPage {
    pub versions: Vec<ObjectVersion>,

    /// `None` once the listing is exhausted
    pub next: Option<VersionMarker>,
}

/// Distribution configuration as returned by the provider
#[derive(Debug, Clone, PartialEq)]
pub struct DistributionConfig {
    pub id: String,

    /// Concurrency token required by the next mutation
    pub etag: String,

    /// Full provider document; mutations are submitted as modified copies
    pub config: serde_json::Value,
}

impl DistributionConfig {
    pub fn enabled(&self) -> bool {
        self.config
            .get("Enabled")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }

    /// Copy of the document with `Enabled` switched
    pub fn with_enabled(&self, enabled: bool) -> serde_json::Value {
        let mut config = self.config.clone();
        if let Some(map) = config.as_object_mut() {
            map.insert("Enabled".to_string(), serde_json::Value::Bool(enabled));
        }
        config
    }
}

/// Propagation status of a distribution
#[derive(Debug, Clone, PartialEq)]
pub struct DistributionStatus {
    pub id: String,
    pub status: String,
    pub enabled: bool,
}

impl DistributionStatus {
    pub fn is_deployed(&self) -> bool {
        self.status.eq_ignore_ascii_case(DISTRIBUTION_DEPLOYED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distribution_config_toggle() {
        let cfg = DistributionConfig {
            id: "E1".to_string(),
            etag: "ETAG1".to_string(),
            config: serde_json::json!({"Enabled": true, "Comment": "assets"}),
        };
        assert!(cfg.enabled());

        let disabled = cfg.with_enabled(false);
        assert_eq!(disabled["Enabled"], false);
        assert_eq!(disabled["Comment"], "assets");
    }

    #[test]
    fn test_folder_marker_detection() {
        assert!(ObjectSummary::new("images/", 0).is_folder_marker());
        assert!(!ObjectSummary::new("images/a.png", 0).is_folder_marker());
        assert!(!ObjectSummary::new("images/", 12).is_folder_marker());
    }

    #[test]
    fn test_deployed_status() {
        let status = DistributionStatus {
            id: "E1".to_string(),
            status: "Deployed".to_string(),
            enabled: false,
        };
        assert!(status.is_deployed());
    }
}
