//! Bucketflow cloud core
//!
//! Provider-neutral logic for managing S3 buckets fronted by CloudFront
//! distributions and provisioned through CDK stacks.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  bflow CLI                      │
//! │    (status / sync-all / teardown / cost ...)    │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │               bucketflow-cloud                  │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │          Gateway Abstraction             │   │
//! │  │  trait CloudGateway { ... }              │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌────────────┐ ┌────────────┐ ┌────────────┐   │
//! │  │ Reconciler │ │  Teardown  │ │ Record DB  │   │
//! │  └────────────┘ └────────────┘ └────────────┘   │
//! └───────┬─────────────────┬───────────────────────┘
//!         │                 │
//! ┌───────▼───────┐ ┌───────▼───────┐
//! │   aws CLI     │ │   in-memory   │
//! │   gateway     │ │   gateway     │
//! └───────────────┘ └───────────────┘
//! ```

pub mod action;
pub mod cost;
pub mod distribution;
pub mod error;
pub mod gateway;
pub mod memory;
pub mod model;
pub mod objects;
pub mod reconcile;
pub mod state;
pub mod teardown;

// Re-exports
pub use action::{RecordChange, RemoteOutputs, SyncAction, apply_action};
pub use cost::{CostBreakdown, CostModel, CostRates, Usage, breakdown, estimate_cost};
pub use distribution::{
    DistributionState, DistributionTeardown, TeardownPolicy, disable_and_delete_distribution,
};
pub use error::{
    CloudError, ErrorKind, GatewayResult, ResourceError, ResourceKind, ResourceRef, Result,
};
pub use gateway::{
    AuthStatus, CloudGateway, DistributionConfig, DistributionStatus, ObjectPage, ObjectSummary,
    ObjectVersion, VersionMarker, VersionPage,
};
pub use memory::{GatewayOp, InMemoryGateway};
pub use model::{
    BucketConfig, BucketRecord, BucketStatus, DEFAULT_STACK_PREFIX, Encryption, FileEntry,
    Project, StackPhase, StackResource, StackStatus, stack_name_for,
};
pub use objects::{
    MoveOutcome, create_folder_marker, empty_bucket, folder_marker_key, list_objects, move_object,
    purge_object_versions,
};
pub use reconcile::{BucketSyncStatus, Reconciler, SyncReport, recommend};
pub use state::{Database, StateLock, StateManager, TeardownJournal};
pub use teardown::{
    DeletionStep, RecordDisposition, StepId, StepStatus, TeardownPlan, TeardownTarget,
    TeardownWorkflow,
};
