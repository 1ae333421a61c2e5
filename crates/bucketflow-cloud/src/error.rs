//! Error types for cloud resource operations

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a failed gateway call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Remote resource is absent. Often benign ("already deleted").
    NotFound,
    /// Stale concurrency token or a state precondition was not met
    Conflict,
    /// Network or 5xx failure, retryable
    Transient,
    /// Fatal without operator intervention
    PermissionDenied,
    /// Call or poll ceiling exceeded
    Timeout,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::NotFound => write!(f, "not-found"),
            ErrorKind::Conflict => write!(f, "conflict"),
            ErrorKind::Transient => write!(f, "transient"),
            ErrorKind::PermissionDenied => write!(f, "permission-denied"),
            ErrorKind::Timeout => write!(f, "timeout"),
        }
    }
}

/// The kind of remote resource an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Stack,
    Bucket,
    Object,
    Distribution,
    Account,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Stack => write!(f, "stack"),
            ResourceKind::Bucket => write!(f, "bucket"),
            ResourceKind::Object => write!(f, "object"),
            ResourceKind::Distribution => write!(f, "distribution"),
            ResourceKind::Account => write!(f, "account"),
        }
    }
}

/// Reference to the remote resource a call was made against
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub name: String,
}

impl ResourceRef {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    pub fn stack(name: impl Into<String>) -> Self {
        Self::new(ResourceKind::Stack, name)
    }

    pub fn bucket(name: impl Into<String>) -> Self {
        Self::new(ResourceKind::Bucket, name)
    }

    pub fn object(bucket: &str, key: &str) -> Self {
        Self::new(ResourceKind::Object, format!("{}/{}", bucket, key))
    }

    pub fn distribution(id: impl Into<String>) -> Self {
        Self::new(ResourceKind::Distribution, id)
    }
}

impl std::fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)
    }
}

/// Typed failure of a single gateway operation
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind} on {resource}: {cause}")]
pub struct ResourceError {
    pub kind: ErrorKind,
    pub resource: ResourceRef,
    pub cause: String,
}

impl ResourceError {
    pub fn new(kind: ErrorKind, resource: ResourceRef, cause: impl Into<String>) -> Self {
        Self {
            kind,
            resource,
            cause: cause.into(),
        }
    }

    pub fn not_found(resource: ResourceRef) -> Self {
        let cause = format!("{} does not exist", resource);
        Self::new(ErrorKind::NotFound, resource, cause)
    }

    pub fn conflict(resource: ResourceRef, cause: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, resource, cause)
    }

    pub fn transient(resource: ResourceRef, cause: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, resource, cause)
    }

    pub fn timeout(resource: ResourceRef, cause: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, resource, cause)
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    pub fn is_conflict(&self) -> bool {
        self.kind == ErrorKind::Conflict
    }

    /// Whether re-invoking the same call may succeed without operator action
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Transient | ErrorKind::Conflict | ErrorKind::Timeout
        )
    }
}

/// Errors raised outside a single gateway call (state files, requests)
#[derive(Error, Debug)]
pub enum CloudError {
    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error("Bucket record not found: {0}")]
    RecordNotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("State file error: {0}")]
    StateError(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CloudError>;

/// Result of a single gateway call
pub type GatewayResult<T> = std::result::Result<T, ResourceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ResourceError::not_found(ResourceRef::bucket("assets"));
        assert_eq!(
            err.to_string(),
            "not-found on bucket:assets: bucket:assets does not exist"
        );
    }

    #[test]
    fn test_retryable_kinds() {
        let r = ResourceRef::distribution("E123");
        assert!(ResourceError::conflict(r.clone(), "stale etag").is_retryable());
        assert!(ResourceError::transient(r.clone(), "503").is_retryable());
        assert!(!ResourceError::new(ErrorKind::PermissionDenied, r.clone(), "denied").is_retryable());
        assert!(!ResourceError::not_found(r).is_retryable());
    }

    #[test]
    fn test_kind_serializes_kebab_case() {
        let json = serde_json::to_string(&ErrorKind::PermissionDenied).unwrap();
        assert_eq!(json, "\"permission-denied\"");
    }
}
