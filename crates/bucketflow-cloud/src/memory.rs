//! In-memory gateway
//!
//! Behaves like the remote provider closely enough to drive the
//! reconciliation and teardown logic without network access: stale tokens
//! are rejected, non-empty buckets cannot be deleted, enabled distributions
//! cannot be deleted. Faults can be injected per operation and every call is
//! recorded.

use crate::error::{ErrorKind, GatewayResult, ResourceError, ResourceKind, ResourceRef};
use crate::gateway::{
    AuthStatus, CloudGateway, DistributionConfig, DistributionStatus, ObjectPage, ObjectSummary,
    ObjectVersion, VersionMarker, VersionPage, DISTRIBUTION_DEPLOYED,
};
use crate::model::StackStatus;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

const DEFAULT_PAGE_SIZE: usize = 1000;
const IN_PROGRESS: &str = "InProgress";

/// Gateway operation, used for fault injection and call accounting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOp {
    CheckAuth,
    DescribeStack,
    DeleteStack,
    BucketExists,
    ListObjects,
    DeleteObjects,
    ListObjectVersions,
    DeleteObjectVersions,
    DeleteBucket,
    PutObject,
    CopyObject,
    DeleteObject,
    GetDistributionConfig,
    UpdateDistribution,
    GetDistributionStatus,
    DeleteDistribution,
}

#[derive(Debug)]
struct Fault {
    op: GatewayOp,
    /// Calls of `op` still to pass before this fault fires
    skip: u32,
    kind: ErrorKind,
}

#[derive(Debug, Clone)]
struct FakeDistribution {
    config: serde_json::Value,
    version: u32,
    status: String,
    /// InProgress reads left before the status flips to Deployed.
    /// `None` never deploys.
    deploy_after: Option<u32>,
    reads_left: Option<u32>,
}

impl FakeDistribution {
    fn etag(&self) -> String {
        format!("E{}", self.version)
    }

    fn enabled(&self) -> bool {
        self.config
            .get("Enabled")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }
}

#[derive(Debug, Default)]
struct Inner {
    stacks: HashMap<String, StackStatus>,
    buckets: BTreeMap<String, BTreeMap<String, ObjectSummary>>,
    /// Stored versions and delete markers of versioned buckets, sorted
    versions: BTreeMap<String, Vec<ObjectVersion>>,
    versioned: HashSet<String>,
    distributions: HashMap<String, FakeDistribution>,
    faults: Vec<Fault>,
    calls: Vec<GatewayOp>,
}

/// Gateway backed by in-process maps
#[derive(Debug)]
pub struct InMemoryGateway {
    inner: Mutex<Inner>,
    page_size: usize,
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_stack(self, stack: StackStatus) -> Self {
        self.inner().stacks.insert(stack.stack_name.clone(), stack);
        self
    }

    pub fn with_bucket(self, bucket: impl Into<String>, keys: Vec<String>) -> Self {
        let objects = keys
            .into_iter()
            .map(|k| (k.clone(), ObjectSummary::new(k, 1)))
            .collect();
        self.inner().buckets.insert(bucket.into(), objects);
        self
    }

    /// Like [`with_bucket`](Self::with_bucket), with versioning on: every key
    /// starts with one stored version and deletes leave markers behind
    pub fn with_versioned_bucket(self, bucket: impl Into<String>, keys: Vec<String>) -> Self {
        let bucket = bucket.into();
        let mut versions: Vec<ObjectVersion> = keys
            .iter()
            .map(|k| ObjectVersion {
                key: k.clone(),
                version_id: "v1".to_string(),
                delete_marker: false,
            })
            .collect();
        versions.sort_by(|a, b| a.key.cmp(&b.key));
        let this = self.with_bucket(bucket.clone(), keys);
        {
            let mut inner = this.inner();
            inner.versions.insert(bucket.clone(), versions);
            inner.versioned.insert(bucket);
        }
        this
    }

    /// Add a distribution in the `Deployed` state that needs two status reads
    /// to finish propagating after each change
    pub fn with_distribution(self, id: impl Into<String>, enabled: bool) -> Self {
        self.inner().distributions.insert(
            id.into(),
            FakeDistribution {
                config: serde_json::json!({ "Enabled": enabled, "Comment": "bucketflow" }),
                version: 1,
                status: DISTRIBUTION_DEPLOYED.to_string(),
                deploy_after: Some(2),
                reads_left: None,
            },
        );
        self
    }

    /// Change how many InProgress reads follow a configuration change
    pub fn set_deploy_after(&self, id: &str, reads: Option<u32>) {
        if let Some(d) = self.inner().distributions.get_mut(id) {
            d.deploy_after = reads;
        }
    }

    /// Simulate a concurrent external change invalidating held tokens
    pub fn bump_distribution_etag(&self, id: &str) {
        if let Some(d) = self.inner().distributions.get_mut(id) {
            d.version += 1;
        }
    }

    /// Fail the next call of `op`
    pub fn fail_next(&self, op: GatewayOp, kind: ErrorKind) {
        self.fail_nth(op, 1, kind);
    }

    /// Fail the `n`-th upcoming call of `op` (1-based)
    pub fn fail_nth(&self, op: GatewayOp, n: u32, kind: ErrorKind) {
        self.inner().faults.push(Fault {
            op,
            skip: n.saturating_sub(1),
            kind,
        });
    }

    pub fn calls(&self) -> Vec<GatewayOp> {
        self.inner().calls.clone()
    }

    pub fn call_count(&self, op: GatewayOp) -> usize {
        self.inner().calls.iter().filter(|c| **c == op).count()
    }

    pub fn has_stack(&self, name: &str) -> bool {
        self.inner().stacks.contains_key(name)
    }

    pub fn has_bucket(&self, bucket: &str) -> bool {
        self.inner().buckets.contains_key(bucket)
    }

    pub fn has_object(&self, bucket: &str, key: &str) -> bool {
        self.inner()
            .buckets
            .get(bucket)
            .is_some_and(|objects| objects.contains_key(key))
    }

    pub fn object_count(&self, bucket: &str) -> usize {
        self.inner().buckets.get(bucket).map_or(0, BTreeMap::len)
    }

    /// Stored versions plus delete markers
    pub fn version_count(&self, bucket: &str) -> usize {
        self.inner().versions.get(bucket).map_or(0, Vec::len)
    }

    pub fn has_distribution(&self, id: &str) -> bool {
        self.inner().distributions.contains_key(id)
    }

    pub fn distribution_enabled(&self, id: &str) -> Option<bool> {
        self.inner().distributions.get(id).map(FakeDistribution::enabled)
    }

    /// Record the call and fire a pending fault if one is due
    fn enter(&self, op: GatewayOp, resource: ResourceRef) -> GatewayResult<MutexGuard<'_, Inner>> {
        let mut inner = self.inner();
        inner.calls.push(op);

        if let Some(pos) = inner.faults.iter().position(|f| f.op == op) {
            if inner.faults[pos].skip == 0 {
                let fault = inner.faults.remove(pos);
                return Err(ResourceError::new(
                    fault.kind,
                    resource,
                    format!("injected {} failure for {:?}", fault.kind, op),
                ));
            }
            inner.faults[pos].skip -= 1;
        }
        Ok(inner)
    }
}

#[async_trait]
impl CloudGateway for InMemoryGateway {
    fn name(&self) -> &str {
        "memory"
    }

    async fn check_auth(&self) -> GatewayResult<AuthStatus> {
        self.enter(GatewayOp::CheckAuth, ResourceRef::new(ResourceKind::Account, "memory"))?;
        Ok(AuthStatus::ok("in-memory account"))
    }

    async fn describe_stack(&self, stack_name: &str) -> GatewayResult<Option<StackStatus>> {
        let inner = self.enter(GatewayOp::DescribeStack, ResourceRef::stack(stack_name))?;
        Ok(inner.stacks.get(stack_name).cloned())
    }

    async fn delete_stack(&self, stack_name: &str) -> GatewayResult<()> {
        let mut inner = self.enter(GatewayOp::DeleteStack, ResourceRef::stack(stack_name))?;
        inner.stacks.remove(stack_name);
        Ok(())
    }

    async fn bucket_exists(&self, bucket: &str) -> GatewayResult<bool> {
        let inner = self.enter(GatewayOp::BucketExists, ResourceRef::bucket(bucket))?;
        Ok(inner.buckets.contains_key(bucket))
    }

    async fn list_objects_page(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        continuation: Option<&str>,
    ) -> GatewayResult<ObjectPage> {
        let inner = self.enter(GatewayOp::ListObjects, ResourceRef::bucket(bucket))?;
        let objects = inner
            .buckets
            .get(bucket)
            .ok_or_else(|| ResourceError::not_found(ResourceRef::bucket(bucket)))?;

        let mut matching = objects
            .values()
            .filter(|o| prefix.is_none_or(|p| o.key.starts_with(p)))
            .filter(|o| continuation.is_none_or(|after| o.key.as_str() > after));

        let page: Vec<ObjectSummary> = matching.by_ref().take(self.page_size).cloned().collect();
        let more = matching.next().is_some();
        let next_token = if more {
            page.last().map(|o| o.key.clone())
        } else {
            None
        };

        Ok(ObjectPage {
            objects: page,
            next_token,
        })
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> GatewayResult<usize> {
        let mut inner = self.enter(GatewayOp::DeleteObjects, ResourceRef::bucket(bucket))?;
        let objects = inner
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| ResourceError::not_found(ResourceRef::bucket(bucket)))?;
        let removed: Vec<String> = keys
            .iter()
            .filter(|k| objects.remove(*k).is_some())
            .cloned()
            .collect();

        if inner.versioned.contains(bucket) {
            let versions = inner.versions.entry(bucket.to_string()).or_default();
            for key in &removed {
                let n = versions.iter().filter(|v| &v.key == key).count();
                versions.push(ObjectVersion {
                    key: key.clone(),
                    version_id: format!("marker-{}", n),
                    delete_marker: true,
                });
            }
            versions.sort_by(|a, b| (&a.key, &a.version_id).cmp(&(&b.key, &b.version_id)));
        }
        Ok(removed.len())
    }

    async fn list_object_versions_page(
        &self,
        bucket: &str,
        marker: Option<&VersionMarker>,
    ) -> GatewayResult<VersionPage> {
        let inner = self.enter(GatewayOp::ListObjectVersions, ResourceRef::bucket(bucket))?;
        if !inner.buckets.contains_key(bucket) {
            return Err(ResourceError::not_found(ResourceRef::bucket(bucket)));
        }
        let Some(versions) = inner.versions.get(bucket) else {
            return Ok(VersionPage::default());
        };

        let after = |v: &&ObjectVersion| match marker {
            None => true,
            Some(m) => {
                let marker_version = m.version_id.as_deref().unwrap_or("");
                (v.key.as_str(), v.version_id.as_str()) > (m.key.as_str(), marker_version)
            }
        };
        let mut matching = versions.iter().filter(after);
        let page: Vec<ObjectVersion> = matching.by_ref().take(self.page_size).cloned().collect();
        let next = if matching.next().is_some() {
            page.last().map(|v| VersionMarker {
                key: v.key.clone(),
                version_id: Some(v.version_id.clone()),
            })
        } else {
            None
        };
        Ok(VersionPage {
            versions: page,
            next,
        })
    }

    async fn delete_object_versions(
        &self,
        bucket: &str,
        versions: &[ObjectVersion],
    ) -> GatewayResult<usize> {
        let mut inner = self.enter(GatewayOp::DeleteObjectVersions, ResourceRef::bucket(bucket))?;
        if !inner.buckets.contains_key(bucket) {
            return Err(ResourceError::not_found(ResourceRef::bucket(bucket)));
        }
        let Some(stored) = inner.versions.get_mut(bucket) else {
            return Ok(0);
        };

        let before = stored.len();
        stored.retain(|v| {
            !versions
                .iter()
                .any(|d| d.key == v.key && d.version_id == v.version_id)
        });
        let removed = before - stored.len();

        // A key whose last real version is gone has no current object either
        let orphaned: Vec<String> = versions
            .iter()
            .filter(|d| !d.delete_marker)
            .filter(|d| !stored.iter().any(|v| v.key == d.key && !v.delete_marker))
            .map(|d| d.key.clone())
            .collect();
        if let Some(objects) = inner.buckets.get_mut(bucket) {
            for key in orphaned {
                objects.remove(&key);
            }
        }
        Ok(removed)
    }

    async fn delete_bucket(&self, bucket: &str) -> GatewayResult<()> {
        let mut inner = self.enter(GatewayOp::DeleteBucket, ResourceRef::bucket(bucket))?;
        let empty = match inner.buckets.get(bucket) {
            None => return Err(ResourceError::not_found(ResourceRef::bucket(bucket))),
            Some(objects) => {
                objects.is_empty() && inner.versions.get(bucket).is_none_or(Vec::is_empty)
            }
        };
        if !empty {
            return Err(ResourceError::conflict(
                ResourceRef::bucket(bucket),
                "BucketNotEmpty: The bucket you tried to delete is not empty",
            ));
        }
        inner.buckets.remove(bucket);
        inner.versions.remove(bucket);
        inner.versioned.remove(bucket);
        Ok(())
    }

    async fn put_empty_object(&self, bucket: &str, key: &str) -> GatewayResult<()> {
        let mut inner = self.enter(GatewayOp::PutObject, ResourceRef::object(bucket, key))?;
        let objects = inner
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| ResourceError::not_found(ResourceRef::bucket(bucket)))?;
        objects.insert(key.to_string(), ObjectSummary::new(key, 0));
        Ok(())
    }

    async fn copy_object(&self, bucket: &str, from_key: &str, to_key: &str) -> GatewayResult<()> {
        let mut inner = self.enter(GatewayOp::CopyObject, ResourceRef::object(bucket, from_key))?;
        let objects = inner
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| ResourceError::not_found(ResourceRef::bucket(bucket)))?;
        let source = objects
            .get(from_key)
            .cloned()
            .ok_or_else(|| ResourceError::not_found(ResourceRef::object(bucket, from_key)))?;
        objects.insert(
            to_key.to_string(),
            ObjectSummary {
                key: to_key.to_string(),
                ..source
            },
        );
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> GatewayResult<()> {
        let mut inner = self.enter(GatewayOp::DeleteObject, ResourceRef::object(bucket, key))?;
        let objects = inner
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| ResourceError::not_found(ResourceRef::bucket(bucket)))?;
        objects.remove(key);
        Ok(())
    }

    async fn get_distribution_config(&self, id: &str) -> GatewayResult<DistributionConfig> {
        let inner = self.enter(GatewayOp::GetDistributionConfig, ResourceRef::distribution(id))?;
        let d = inner
            .distributions
            .get(id)
            .ok_or_else(|| ResourceError::not_found(ResourceRef::distribution(id)))?;
        Ok(DistributionConfig {
            id: id.to_string(),
            etag: d.etag(),
            config: d.config.clone(),
        })
    }

    async fn update_distribution(
        &self,
        id: &str,
        etag: &str,
        config: &serde_json::Value,
    ) -> GatewayResult<String> {
        let mut inner = self.enter(GatewayOp::UpdateDistribution, ResourceRef::distribution(id))?;
        let d = inner
            .distributions
            .get_mut(id)
            .ok_or_else(|| ResourceError::not_found(ResourceRef::distribution(id)))?;

        if d.etag() != etag {
            return Err(ResourceError::conflict(
                ResourceRef::distribution(id),
                "PreconditionFailed: The If-Match version is missing or not valid",
            ));
        }

        d.config = config.clone();
        d.version += 1;
        d.status = IN_PROGRESS.to_string();
        d.reads_left = d.deploy_after;
        Ok(d.etag())
    }

    async fn get_distribution_status(&self, id: &str) -> GatewayResult<DistributionStatus> {
        let mut inner = self.enter(GatewayOp::GetDistributionStatus, ResourceRef::distribution(id))?;
        let d = inner
            .distributions
            .get_mut(id)
            .ok_or_else(|| ResourceError::not_found(ResourceRef::distribution(id)))?;

        if d.status == IN_PROGRESS {
            match d.reads_left {
                Some(0) => d.status = DISTRIBUTION_DEPLOYED.to_string(),
                Some(n) => d.reads_left = Some(n - 1),
                None => {}
            }
        }

        Ok(DistributionStatus {
            id: id.to_string(),
            status: d.status.clone(),
            enabled: d.enabled(),
        })
    }

    async fn delete_distribution(&self, id: &str, etag: &str) -> GatewayResult<()> {
        let mut inner = self.enter(GatewayOp::DeleteDistribution, ResourceRef::distribution(id))?;
        let d = inner
            .distributions
            .get(id)
            .ok_or_else(|| ResourceError::not_found(ResourceRef::distribution(id)))?;

        if d.etag() != etag {
            return Err(ResourceError::conflict(
                ResourceRef::distribution(id),
                "PreconditionFailed: The If-Match version is missing or not valid",
            ));
        }
        if d.enabled() || d.status != DISTRIBUTION_DEPLOYED {
            return Err(ResourceError::conflict(
                ResourceRef::distribution(id),
                "DistributionNotDisabled: The distribution you are trying to delete has not been disabled",
            ));
        }

        inner.distributions.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stale_etag_is_rejected() {
        let gateway = InMemoryGateway::new().with_distribution("E1", true);
        let cfg = gateway.get_distribution_config("E1").await.unwrap();
        gateway.bump_distribution_etag("E1");

        let err = gateway
            .update_distribution("E1", &cfg.etag, &cfg.with_enabled(false))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_injected_fault_fires_once() {
        let gateway = InMemoryGateway::new().with_bucket("b", Vec::new());
        gateway.fail_next(GatewayOp::BucketExists, ErrorKind::Transient);

        assert!(gateway.bucket_exists("b").await.is_err());
        assert!(gateway.bucket_exists("b").await.unwrap());
        assert_eq!(gateway.call_count(GatewayOp::BucketExists), 2);
    }

    #[tokio::test]
    async fn test_non_empty_bucket_cannot_be_deleted() {
        let gateway = InMemoryGateway::new().with_bucket("b", vec!["k".into()]);
        let err = gateway.delete_bucket("b").await.unwrap_err();
        assert!(err.is_conflict());
        assert!(gateway.has_bucket("b"));
    }
}
