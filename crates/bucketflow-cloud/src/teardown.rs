//! Ordered teardown of a bucket's resource group
//!
//! distribution -> objects -> bucket -> stack. Steps run strictly in
//! sequence; the first failure halts the plan and nothing is rolled back.
//! Re-running a plan is safe: resources that are already gone count as done.

use crate::distribution::{TeardownPolicy, disable_and_delete_distribution};
use crate::error::GatewayResult;
use crate::gateway::CloudGateway;
use crate::model::BucketRecord;
use crate::objects::{empty_bucket, purge_object_versions};
use serde::{Deserialize, Serialize};

/// Identity of a teardown step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepId {
    Distribution,
    EmptyBucket,
    DeleteBucket,
    DeleteStack,
}

impl StepId {
    pub const ORDER: [StepId; 4] = [
        StepId::Distribution,
        StepId::EmptyBucket,
        StepId::DeleteBucket,
        StepId::DeleteStack,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            StepId::Distribution => "Disable and delete CloudFront distribution",
            StepId::EmptyBucket => "Empty S3 bucket",
            StepId::DeleteBucket => "Delete S3 bucket",
            StepId::DeleteStack => "Delete CloudFormation stack",
        }
    }
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepId::Distribution => write!(f, "distribution"),
            StepId::EmptyBucket => write!(f, "empty-bucket"),
            StepId::DeleteBucket => write!(f, "delete-bucket"),
            StepId::DeleteStack => write!(f, "delete-stack"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Done,
    Error,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::Running => write!(f, "running"),
            StepStatus::Done => write!(f, "done"),
            StepStatus::Error => write!(f, "error"),
        }
    }
}

/// One unit of the teardown plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionStep {
    pub id: StepId,
    pub label: String,
    pub status: StepStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Extra outcome information, e.g. how many objects were removed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl DeletionStep {
    pub fn new(id: StepId) -> Self {
        Self {
            id,
            label: id.label().to_string(),
            status: StepStatus::Pending,
            error: None,
            detail: None,
        }
    }
}

/// What the caller should do with the record once teardown returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordDisposition {
    /// Every step is done: delete the record
    Delete,
    /// A step failed: revert the record to `failed`, keep the plan for retry
    RevertToFailed,
    /// Plan not finished (abandoned between steps)
    Unchanged,
}

/// Ordered list of steps for one record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeardownPlan {
    pub steps: Vec<DeletionStep>,
}

impl Default for TeardownPlan {
    fn default() -> Self {
        Self::new()
    }
}

impl TeardownPlan {
    pub fn new() -> Self {
        Self {
            steps: StepId::ORDER.into_iter().map(DeletionStep::new).collect(),
        }
    }

    /// Continue a persisted plan. Failed and interrupted steps run again;
    /// done steps are kept.
    pub fn resume(mut self) -> Self {
        for step in &mut self.steps {
            if step.status != StepStatus::Done {
                step.status = StepStatus::Pending;
                step.error = None;
            }
        }
        self
    }

    pub fn is_complete(&self) -> bool {
        self.steps.iter().all(|s| s.status == StepStatus::Done)
    }

    pub fn failed_step(&self) -> Option<&DeletionStep> {
        self.steps.iter().find(|s| s.status == StepStatus::Error)
    }

    pub fn disposition(&self) -> RecordDisposition {
        if self.is_complete() {
            RecordDisposition::Delete
        } else if self.failed_step().is_some() {
            RecordDisposition::RevertToFailed
        } else {
            RecordDisposition::Unchanged
        }
    }

    fn step_mut(&mut self, id: StepId) -> Option<&mut DeletionStep> {
        self.steps.iter_mut().find(|s| s.id == id)
    }
}

/// Resource names a teardown operates on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownTarget {
    pub bucket: String,
    pub stack_name: String,
    pub distribution_id: Option<String>,

    /// Stored versions must be purged before the bucket can go
    pub versioned: bool,
}

impl TeardownTarget {
    pub fn for_record(record: &BucketRecord, stack_prefix: &str) -> Self {
        Self {
            bucket: record.s3_bucket_name.clone(),
            stack_name: record.stack_name(stack_prefix),
            distribution_id: record.cloud_front_distribution_id.clone(),
            versioned: record.config.versioning,
        }
    }
}

/// Executes teardown plans against a gateway
pub struct TeardownWorkflow<'a, G: CloudGateway + ?Sized> {
    gateway: &'a G,
    policy: TeardownPolicy,
}

impl<'a, G: CloudGateway + ?Sized> TeardownWorkflow<'a, G> {
    pub fn new(gateway: &'a G, policy: TeardownPolicy) -> Self {
        Self { gateway, policy }
    }

    /// Run every pending step in order.
    ///
    /// `on_step` is called each time a step changes status, so the caller can
    /// persist progress and render it. Returns the plan in its final state.
    pub async fn run<F>(
        &self,
        target: &TeardownTarget,
        mut plan: TeardownPlan,
        mut on_step: F,
    ) -> TeardownPlan
    where
        F: FnMut(&TeardownPlan, &DeletionStep),
    {
        for id in StepId::ORDER {
            let Some(step) = plan.step_mut(id) else {
                continue;
            };
            if step.status == StepStatus::Done {
                continue;
            }

            step.status = StepStatus::Running;
            let snapshot = step.clone();
            on_step(&plan, &snapshot);

            let result = self.execute(id, target).await;

            let Some(step) = plan.step_mut(id) else {
                continue;
            };
            match result {
                Ok(detail) => {
                    step.status = StepStatus::Done;
                    step.detail = detail;
                    tracing::info!("Teardown step {} done", id);
                }
                Err(e) => {
                    step.status = StepStatus::Error;
                    step.error = Some(e.to_string());
                    tracing::warn!("Teardown step {} failed: {}", id, e);
                }
            }
            let snapshot = step.clone();
            on_step(&plan, &snapshot);

            if snapshot.status == StepStatus::Error {
                break;
            }
        }
        plan
    }

    async fn empty(&self, target: &TeardownTarget) -> GatewayResult<String> {
        let removed = empty_bucket(self.gateway, &target.bucket).await?;
        if !target.versioned {
            return Ok(format!("{} objects removed", removed));
        }
        let versions = purge_object_versions(self.gateway, &target.bucket).await?;
        Ok(format!("{} objects removed, {} versions purged", removed, versions))
    }

    async fn execute(&self, id: StepId, target: &TeardownTarget) -> GatewayResult<Option<String>> {
        match id {
            StepId::Distribution => match &target.distribution_id {
                Some(dist_id) => {
                    disable_and_delete_distribution(self.gateway, dist_id, &self.policy).await?;
                    Ok(None)
                }
                None => Ok(Some("no distribution recorded".to_string())),
            },
            StepId::EmptyBucket => match self.empty(target).await {
                Ok(detail) => Ok(Some(detail)),
                Err(e) if e.is_not_found() => Ok(Some("bucket already gone".to_string())),
                Err(e) => Err(e),
            },
            StepId::DeleteBucket => match self.gateway.delete_bucket(&target.bucket).await {
                Ok(()) => Ok(None),
                Err(e) if e.is_not_found() => Ok(Some("bucket already gone".to_string())),
                Err(e) => Err(e),
            },
            StepId::DeleteStack => match self.gateway.delete_stack(&target.stack_name).await {
                Ok(()) => Ok(None),
                Err(e) if e.is_not_found() => Ok(Some("stack already gone".to_string())),
                Err(e) => Err(e),
            },
        }
    }
}
