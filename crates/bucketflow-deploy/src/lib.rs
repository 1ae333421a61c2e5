//! Bucketflow deployment runner
//!
//! Runs the CDK CLI as a subprocess and turns its output into a stream of
//! [`DeployEvent`]s. Each output line is either a JSON object or plain text;
//! both become events. A run ends with a `result` event, and failed runs are
//! followed by an `error-intelligence` event with suggested fixes.
//!
//! ```ignore
//! use bucketflow_deploy::{CdkCommand, DeployRequest, DeploySession, Runner};
//! use tokio_util::sync::CancellationToken;
//!
//! let session = DeploySession::new();
//! let request = DeployRequest::deploy("site-assets", "us-east-1");
//! let outcome = Runner::default()
//!     .execute(&CdkCommand::default(), &request, &session, CancellationToken::new())
//!     .await?;
//! println!("success: {}", outcome.success);
//! ```

pub mod consumer;
pub mod diagnose;
pub mod error;
pub mod event;
pub mod line;
pub mod request;
pub mod runner;
pub mod session;

pub use consumer::{RunPhase, RunResult, RunState};
pub use diagnose::{Analyzer, Diagnosis, DiagnosisRule, FailureContext, MAX_TIPS, PatternRule};
pub use error::{DeployError, Result};
pub use event::{DeployEvent, EventType, FixCommand, Level, ResultStatus};
pub use line::{EventDecoder, LineAssembler};
pub use request::{CdkCommand, DeployAction, DeployRequest, Invocation, validate_bucket_name};
pub use runner::{RunOutcome, Runner};
pub use session::{DeploySession, SessionCursor};
pub use tokio_util::sync::CancellationToken;
