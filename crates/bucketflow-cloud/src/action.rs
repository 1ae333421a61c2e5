//! Corrective actions for drifted bucket records

use crate::error::CloudError;
use crate::model::{BucketRecord, BucketStatus, StackStatus};
use serde::{Deserialize, Serialize};

/// Correction recommended for a local record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncAction {
    /// Remote stack is complete; mark the record active
    UpdateToActive,
    /// Remote stack failed, rolled back or never appeared
    UpdateToFailed,
    /// Reset the record so it can be deployed again
    UpdateToPending,
    /// Local record has no remote counterpart any more
    Cleanup,
    /// No changes needed
    None,
}

impl SyncAction {
    pub fn is_noop(&self) -> bool {
        *self == SyncAction::None
    }
}

impl std::fmt::Display for SyncAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncAction::UpdateToActive => write!(f, "update-to-active"),
            SyncAction::UpdateToFailed => write!(f, "update-to-failed"),
            SyncAction::UpdateToPending => write!(f, "update-to-pending"),
            SyncAction::Cleanup => write!(f, "cleanup"),
            SyncAction::None => write!(f, "none"),
        }
    }
}

impl std::str::FromStr for SyncAction {
    type Err = CloudError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "update-to-active" => Ok(SyncAction::UpdateToActive),
            "update-to-failed" => Ok(SyncAction::UpdateToFailed),
            "update-to-pending" => Ok(SyncAction::UpdateToPending),
            "cleanup" => Ok(SyncAction::Cleanup),
            "none" => Ok(SyncAction::None),
            other => Err(CloudError::InvalidRequest(format!(
                "unknown sync action: {}",
                other
            ))),
        }
    }
}

/// Mutation the caller should write to the record store
#[derive(Debug, Clone, PartialEq)]
pub enum RecordChange {
    /// Replace the stored record
    Update(BucketRecord),
    /// Delete the stored record
    Remove(String),
    Unchanged,
}

/// CDN and bucket identifiers published by a deployed stack
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteOutputs {
    #[serde(default)]
    pub remote_distribution_id: Option<String>,

    #[serde(default)]
    pub remote_cloud_front_domain: Option<String>,

    #[serde(default)]
    pub remote_bucket_arn: Option<String>,
}

impl From<&StackStatus> for RemoteOutputs {
    fn from(stack: &StackStatus) -> Self {
        Self {
            remote_distribution_id: stack.distribution_id().map(str::to_string),
            remote_cloud_front_domain: stack.distribution_domain().map(str::to_string),
            remote_bucket_arn: stack.bucket_arn().map(str::to_string),
        }
    }
}

/// Turn an action into a record mutation.
///
/// `update-to-active` also copies the CDN domain, distribution id and bucket
/// ARN the deployment published, when known.
pub fn apply_action(
    record: &BucketRecord,
    action: SyncAction,
    remote: &RemoteOutputs,
) -> RecordChange {
    let mut updated = record.clone();
    match action {
        SyncAction::UpdateToActive => {
            updated.set_status(BucketStatus::Active);
            if let Some(id) = &remote.remote_distribution_id {
                updated.cloud_front_distribution_id = Some(id.clone());
            }
            if let Some(domain) = &remote.remote_cloud_front_domain {
                updated.cloud_front_domain = Some(domain.clone());
            }
            if let Some(arn) = &remote.remote_bucket_arn {
                updated.s3_bucket_arn = Some(arn.clone());
            }
            RecordChange::Update(updated)
        }
        SyncAction::UpdateToFailed => {
            updated.set_status(BucketStatus::Failed);
            RecordChange::Update(updated)
        }
        SyncAction::UpdateToPending => {
            updated.set_status(BucketStatus::Pending);
            RecordChange::Update(updated)
        }
        SyncAction::Cleanup => RecordChange::Remove(record.id.clone()),
        SyncAction::None => RecordChange::Unchanged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_names() {
        for action in [
            SyncAction::UpdateToActive,
            SyncAction::UpdateToFailed,
            SyncAction::UpdateToPending,
            SyncAction::Cleanup,
            SyncAction::None,
        ] {
            assert_eq!(action.to_string().parse::<SyncAction>().unwrap(), action);
        }
        assert!("delete".parse::<SyncAction>().is_err());
    }

    #[test]
    fn test_update_to_active_takes_outputs() {
        let mut record = BucketRecord::new("p1", "Assets", "my-assets", "us-east-1");
        record.id = "b1".to_string();
        let stack = StackStatus::new("BucketflowStack-my-assets", "CREATE_COMPLETE")
            .with_output("DistributionId", "E9")
            .with_output("DistributionDomainName", "d9.cloudfront.net")
            .with_output("BucketArn", "arn:aws:s3:::my-assets");

        let RecordChange::Update(updated) =
            apply_action(&record, SyncAction::UpdateToActive, &RemoteOutputs::from(&stack))
        else {
            panic!("expected update");
        };

        assert_eq!(updated.status, BucketStatus::Active);
        assert_eq!(updated.cloud_front_distribution_id.as_deref(), Some("E9"));
        assert_eq!(updated.cloud_front_domain.as_deref(), Some("d9.cloudfront.net"));
        assert_eq!(updated.s3_bucket_arn.as_deref(), Some("arn:aws:s3:::my-assets"));
    }

    #[test]
    fn test_cleanup_removes_record() {
        let mut record = BucketRecord::new("p1", "Assets", "my-assets", "us-east-1");
        record.id = "b1".to_string();
        assert_eq!(
            apply_action(&record, SyncAction::Cleanup, &RemoteOutputs::default()),
            RecordChange::Remove("b1".to_string())
        );
        assert_eq!(
            apply_action(&record, SyncAction::None, &RemoteOutputs::default()),
            RecordChange::Unchanged
        );
    }
}
