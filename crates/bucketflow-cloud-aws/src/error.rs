//! AWS gateway error types

use crate::classify::classify_stderr;
use bucketflow_cloud::{ErrorKind, ResourceError, ResourceRef};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AwsError {
    #[error("{0} not found. Please install the AWS CLI v2")]
    CliNotFound(String),

    #[error("aws command failed (exit {code:?}): {stderr}")]
    CommandFailed { code: Option<i32>, stderr: String },

    #[error("aws command timed out after {0}s")]
    Timeout(u64),

    #[error("unexpected aws output: {0}")]
    UnexpectedOutput(String),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl AwsError {
    /// Classification into the gateway's error kinds
    pub fn kind(&self) -> ErrorKind {
        match self {
            AwsError::CommandFailed { stderr, .. } => classify_stderr(stderr),
            AwsError::Timeout(_) => ErrorKind::Timeout,
            AwsError::CliNotFound(_) => ErrorKind::PermissionDenied,
            AwsError::UnexpectedOutput(_) | AwsError::JsonError(_) => ErrorKind::Transient,
            AwsError::IoError(_) => ErrorKind::Transient,
        }
    }

    pub fn into_resource_error(self, resource: ResourceRef) -> ResourceError {
        let kind = self.kind();
        let cause = match &self {
            AwsError::CommandFailed { stderr, .. } => stderr.trim().to_string(),
            other => other.to_string(),
        };
        ResourceError::new(kind, resource, cause)
    }
}

pub type Result<T> = std::result::Result<T, AwsError>;
