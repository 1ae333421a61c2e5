//! Drift detection between local bucket records and live cloud state
//!
//! Every call queries the gateway afresh. Nothing is cached between checks:
//! the point is to see what changed since the last one.

use crate::action::{RecordChange, RemoteOutputs, SyncAction, apply_action};
use crate::error::{GatewayResult, ResourceError};
use crate::gateway::CloudGateway;
use crate::model::{BucketRecord, BucketStatus, StackPhase, StackResource};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Comparison of one record against its remote resources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketSyncStatus {
    pub bucket_id: String,
    pub local_status: BucketStatus,
    pub stack_name: String,
    pub stack_exists: bool,
    pub bucket_exists: bool,

    #[serde(default)]
    pub stack_status: Option<String>,

    #[serde(default)]
    pub stack_status_reason: Option<String>,

    #[serde(flatten)]
    pub remote: RemoteOutputs,

    /// Recorded CDN details disagree with the stack outputs
    #[serde(default)]
    pub cdn_mismatch: bool,

    #[serde(default)]
    pub resources: Vec<StackResource>,

    pub needs_sync: bool,
    pub recommended_action: SyncAction,
    pub checked_at: DateTime<Utc>,
}

impl BucketSyncStatus {
    /// Record mutation for `action`, normally the recommended one
    pub fn change_for(&self, record: &BucketRecord, action: SyncAction) -> RecordChange {
        apply_action(record, action, &self.remote)
    }
}

/// Decision table, evaluated top to bottom:
///
/// | local             | stack                       | bucket | action           |
/// |-------------------|-----------------------------|--------|------------------|
/// | pending/deploying | complete                    | yes    | update-to-active |
/// | pending/deploying | rollback/failed/not found   | -      | update-to-failed |
/// | active            | not found                   | -      | cleanup          |
/// | failed            | complete                    | yes    | update-to-active |
/// | any               | in progress / anything else | -      | none             |
pub fn recommend(local: BucketStatus, stack: Option<StackPhase>, bucket_exists: bool) -> SyncAction {
    use BucketStatus::*;

    // A deleted stack that is still listed is as good as absent
    let stack = stack.filter(|p| *p != StackPhase::Deleted);

    match (local, stack) {
        (_, Some(StackPhase::InProgress)) => SyncAction::None,
        (Pending | Deploying, Some(StackPhase::Complete)) if bucket_exists => {
            SyncAction::UpdateToActive
        }
        (Pending | Deploying, Some(StackPhase::Failed) | None) => SyncAction::UpdateToFailed,
        (Active, None) => SyncAction::Cleanup,
        (Failed, Some(StackPhase::Complete)) if bucket_exists => SyncAction::UpdateToActive,
        _ => SyncAction::None,
    }
}

/// One entry of a sync-all run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub bucket_id: String,
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<BucketSyncStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ResourceError>,
}

impl SyncReport {
    /// Wrap the outcome of one check. A failing check is reported, not fatal.
    pub fn from_check(record: &BucketRecord, result: GatewayResult<BucketSyncStatus>) -> Self {
        let (status, error) = match result {
            Ok(status) => (Some(status), None),
            Err(e) => {
                tracing::warn!("Sync check failed for {}: {}", record.id, e);
                (None, Some(e))
            }
        };
        Self {
            bucket_id: record.id.clone(),
            name: record.name.clone(),
            status,
            error,
        }
    }
}

/// Computes sync status for bucket records
pub struct Reconciler<'a, G: CloudGateway + ?Sized> {
    gateway: &'a G,
    stack_prefix: String,
}

impl<'a, G: CloudGateway + ?Sized> Reconciler<'a, G> {
    pub fn new(gateway: &'a G, stack_prefix: impl Into<String>) -> Self {
        Self {
            gateway,
            stack_prefix: stack_prefix.into(),
        }
    }

    /// Check one record against the live stack and bucket
    pub async fn check(&self, record: &BucketRecord) -> GatewayResult<BucketSyncStatus> {
        let stack_name = record.stack_name(&self.stack_prefix);
        let stack = self.gateway.describe_stack(&stack_name).await?;
        let bucket_exists = self.gateway.bucket_exists(&record.s3_bucket_name).await?;

        let phase = stack.as_ref().map(|s| s.phase());
        let action = recommend(record.status, phase, bucket_exists);
        let remote = stack.as_ref().map(RemoteOutputs::from).unwrap_or_default();
        let cdn_mismatch = mismatch(
            record.cloud_front_distribution_id.as_deref(),
            remote.remote_distribution_id.as_deref(),
        ) || mismatch(
            record.cloud_front_domain.as_deref(),
            remote.remote_cloud_front_domain.as_deref(),
        );

        tracing::debug!(
            "Sync check {} ({}): stack={:?} bucket={} -> {}",
            record.id,
            record.status,
            stack.as_ref().map(|s| s.status.as_str()),
            bucket_exists,
            action
        );

        let stack_exists = phase.is_some_and(|p| p != StackPhase::Deleted);
        let (stack_status, stack_status_reason, resources) = match stack {
            Some(s) => (Some(s.status), s.status_reason, s.resources),
            None => (None, None, Vec::new()),
        };

        Ok(BucketSyncStatus {
            bucket_id: record.id.clone(),
            local_status: record.status,
            stack_name,
            stack_exists,
            bucket_exists,
            stack_status,
            stack_status_reason,
            remote,
            cdn_mismatch,
            resources,
            needs_sync: !action.is_noop(),
            recommended_action: action,
            checked_at: Utc::now(),
        })
    }

    /// Check every record in turn through this one gateway
    pub async fn check_all(&self, records: &[BucketRecord]) -> Vec<SyncReport> {
        let mut reports = Vec::with_capacity(records.len());
        for record in records {
            reports.push(SyncReport::from_check(record, self.check(record).await));
        }
        reports
    }
}

fn mismatch(recorded: Option<&str>, remote: Option<&str>) -> bool {
    matches!((recorded, remote), (Some(a), Some(b)) if a != b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::memory::{GatewayOp, InMemoryGateway};
    use crate::model::StackStatus;

    const PREFIX: &str = "BucketflowStack-";

    fn record(status: BucketStatus) -> BucketRecord {
        let mut r = BucketRecord::new("p1", "Assets", "my-assets", "us-east-1").with_status(status);
        r.id = "b1".to_string();
        r
    }

    fn gateway_with_stack(status: &str, bucket: bool) -> InMemoryGateway {
        let gateway = InMemoryGateway::new().with_stack(
            StackStatus::new("BucketflowStack-my-assets", status)
                .with_output("DistributionId", "E1")
                .with_output("DistributionDomainName", "d1.cloudfront.net"),
        );
        if bucket {
            gateway.with_bucket("my-assets", Vec::new())
        } else {
            gateway
        }
    }

    #[test]
    fn test_decision_table() {
        use BucketStatus::*;
        use StackPhase::*;

        let cases = [
            (Pending, Some(Complete), true, SyncAction::UpdateToActive),
            (Deploying, Some(Complete), true, SyncAction::UpdateToActive),
            (Pending, Some(Complete), false, SyncAction::None),
            (Pending, Some(StackPhase::Failed), true, SyncAction::UpdateToFailed),
            (Deploying, None, false, SyncAction::UpdateToFailed),
            (Deploying, Some(Deleted), false, SyncAction::UpdateToFailed),
            (Active, None, true, SyncAction::Cleanup),
            (Active, Some(Complete), true, SyncAction::None),
            (BucketStatus::Failed, Some(Complete), true, SyncAction::UpdateToActive),
            (BucketStatus::Failed, Some(Complete), false, SyncAction::None),
            (BucketStatus::Failed, None, false, SyncAction::None),
            (Pending, Some(InProgress), false, SyncAction::None),
            (Active, Some(InProgress), true, SyncAction::None),
            (Deleting, None, false, SyncAction::None),
        ];

        for (local, stack, bucket, expected) in cases {
            assert_eq!(
                recommend(local, stack, bucket),
                expected,
                "{:?} {:?} {}",
                local,
                stack,
                bucket
            );
        }
    }

    #[tokio::test]
    async fn test_pending_with_complete_stack_goes_active() {
        let gateway = gateway_with_stack("CREATE_COMPLETE", true);
        let reconciler = Reconciler::new(&gateway, PREFIX);

        let status = reconciler.check(&record(BucketStatus::Pending)).await.unwrap();

        assert_eq!(status.recommended_action, SyncAction::UpdateToActive);
        assert!(status.needs_sync);
        assert!(status.stack_exists);
        assert_eq!(status.remote.remote_distribution_id.as_deref(), Some("E1"));

        let RecordChange::Update(updated) =
            status.change_for(&record(BucketStatus::Pending), status.recommended_action)
        else {
            panic!("expected update");
        };
        assert_eq!(updated.status, BucketStatus::Active);
        assert_eq!(updated.cloud_front_domain.as_deref(), Some("d1.cloudfront.net"));
    }

    #[tokio::test]
    async fn test_active_without_stack_needs_cleanup() {
        let gateway = InMemoryGateway::new();
        let reconciler = Reconciler::new(&gateway, PREFIX);

        let status = reconciler.check(&record(BucketStatus::Active)).await.unwrap();

        assert!(!status.stack_exists);
        assert!(!status.bucket_exists);
        assert_eq!(status.recommended_action, SyncAction::Cleanup);
        assert!(status.needs_sync);
    }

    #[tokio::test]
    async fn test_in_progress_is_left_alone() {
        let gateway = gateway_with_stack("UPDATE_IN_PROGRESS", true);
        let reconciler = Reconciler::new(&gateway, PREFIX);

        let status = reconciler.check(&record(BucketStatus::Deploying)).await.unwrap();

        assert_eq!(status.recommended_action, SyncAction::None);
        assert!(!status.needs_sync);
    }

    #[tokio::test]
    async fn test_every_check_queries_the_gateway() {
        let gateway = gateway_with_stack("CREATE_COMPLETE", true);
        let reconciler = Reconciler::new(&gateway, PREFIX);
        let r = record(BucketStatus::Active);

        reconciler.check(&r).await.unwrap();
        reconciler.check(&r).await.unwrap();

        assert_eq!(gateway.call_count(GatewayOp::DescribeStack), 2);
        assert_eq!(gateway.call_count(GatewayOp::BucketExists), 2);
    }

    #[tokio::test]
    async fn test_cdn_mismatch_detected() {
        let gateway = gateway_with_stack("UPDATE_COMPLETE", true);
        let reconciler = Reconciler::new(&gateway, PREFIX);
        let r = record(BucketStatus::Active).with_distribution("EOLD", "old.cloudfront.net");

        let status = reconciler.check(&r).await.unwrap();

        assert!(status.cdn_mismatch);
        assert_eq!(status.recommended_action, SyncAction::None);
    }

    #[tokio::test]
    async fn test_check_all_reports_failures_per_record() {
        let gateway = gateway_with_stack("CREATE_COMPLETE", true);
        gateway.fail_next(GatewayOp::DescribeStack, ErrorKind::PermissionDenied);
        let reconciler = Reconciler::new(&gateway, PREFIX);

        let mut second = record(BucketStatus::Pending);
        second.id = "b2".to_string();
        let reports = reconciler
            .check_all(&[record(BucketStatus::Active), second])
            .await;

        assert_eq!(reports.len(), 2);
        assert_eq!(
            reports[0].error.as_ref().map(|e| e.kind),
            Some(ErrorKind::PermissionDenied)
        );
        assert_eq!(
            reports[1].status.as_ref().map(|s| s.recommended_action),
            Some(SyncAction::UpdateToActive)
        );
    }

    #[test]
    fn test_status_serializes_camel_case() {
        let status = BucketSyncStatus {
            bucket_id: "b1".to_string(),
            local_status: BucketStatus::Active,
            stack_name: "BucketflowStack-my-assets".to_string(),
            stack_exists: false,
            bucket_exists: false,
            stack_status: None,
            stack_status_reason: None,
            remote: RemoteOutputs::default(),
            cdn_mismatch: false,
            resources: Vec::new(),
            needs_sync: true,
            recommended_action: SyncAction::Cleanup,
            checked_at: Utc::now(),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["recommendedAction"], "cleanup");
        assert_eq!(json["needsSync"], true);
        assert!(json.get("remoteDistributionId").is_some());
    }
}
