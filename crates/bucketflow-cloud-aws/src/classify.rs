//! Mapping of aws CLI failures onto gateway error kinds
//!
//! The CLI prints `An error occurred (<Code>) when calling the <Op> operation: <message>`
//! on stderr. Codes are matched first; bare HTTP statuses (HeadBucket reports
//! only `(404)`/`(403)`) and message fragments are the fallback.

use bucketflow_cloud::ErrorKind;

const NOT_FOUND: &[&str] = &[
    "NoSuchBucket",
    "NoSuchKey",
    "NoSuchDistribution",
    "NoSuchOrigin",
    "(404)",
    "does not exist",
    "Not Found",
];

const CONFLICT: &[&str] = &[
    "PreconditionFailed",
    "InvalidIfMatchVersion",
    "DistributionNotDisabled",
    "BucketNotEmpty",
    "OperationAborted",
    "ConflictingOperation",
    "(409)",
    "(412)",
];

const PERMISSION: &[&str] = &[
    "AccessDenied",
    "UnauthorizedOperation",
    "InvalidClientTokenId",
    "ExpiredToken",
    "SignatureDoesNotMatch",
    "Unable to locate credentials",
    "(403)",
    "Forbidden",
];

const TIMEOUT: &[&str] = &["RequestTimeout", "timed out", "Read timeout"];

/// Classify a failed invocation by its stderr. Anything unrecognised
/// (throttling, 5xx, connection resets) is treated as transient.
pub fn classify_stderr(stderr: &str) -> ErrorKind {
    let code = error_code(stderr);
    let rules: [(&[&str], ErrorKind); 4] = [
        (NOT_FOUND, ErrorKind::NotFound),
        (CONFLICT, ErrorKind::Conflict),
        (PERMISSION, ErrorKind::PermissionDenied),
        (TIMEOUT, ErrorKind::Timeout),
    ];

    if let Some(code) = code {
        for (needles, kind) in &rules {
            if needles.iter().any(|n| n.trim_matches(|c| c == '(' || c == ')') == code) {
                return *kind;
            }
        }
    }

    for (needles, kind) in &rules {
        if needles.iter().any(|n| stderr.contains(n)) {
            return *kind;
        }
    }
    ErrorKind::Transient
}

/// The `(<Code>)` part of an `An error occurred (...)` line
pub fn error_code(stderr: &str) -> Option<&str> {
    let start = stderr.find("An error occurred (")? + "An error occurred (".len();
    let len = stderr[start..].find(')')?;
    Some(&stderr[start..start + len])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_stack() {
        let stderr = "An error occurred (ValidationError) when calling the DescribeStacks operation: Stack with id BucketflowStack-x does not exist";
        assert_eq!(error_code(stderr), Some("ValidationError"));
        assert_eq!(classify_stderr(stderr), ErrorKind::NotFound);
    }

    #[test]
    fn test_head_bucket_statuses() {
        assert_eq!(
            classify_stderr("An error occurred (404) when calling the HeadBucket operation: Not Found"),
            ErrorKind::NotFound
        );
        assert_eq!(
            classify_stderr("An error occurred (403) when calling the HeadBucket operation: Forbidden"),
            ErrorKind::PermissionDenied
        );
    }

    #[test]
    fn test_distribution_conflicts() {
        assert_eq!(
            classify_stderr("An error occurred (PreconditionFailed) when calling the UpdateDistribution operation: The request failed because it didn't meet the preconditions in one or more request-header fields."),
            ErrorKind::Conflict
        );
        assert_eq!(
            classify_stderr("An error occurred (DistributionNotDisabled) when calling the DeleteDistribution operation: The distribution you are trying to delete has not been disabled."),
            ErrorKind::Conflict
        );
    }

    #[test]
    fn test_credentials() {
        assert_eq!(
            classify_stderr("Unable to locate credentials. You can configure credentials by running \"aws configure\"."),
            ErrorKind::PermissionDenied
        );
        assert_eq!(
            classify_stderr("An error occurred (ExpiredToken) when calling the GetCallerIdentity operation: The security token included in the request is expired"),
            ErrorKind::PermissionDenied
        );
    }

    #[test]
    fn test_throttling_is_transient() {
        assert_eq!(
            classify_stderr("An error occurred (Throttling) when calling the DescribeStacks operation (reached max retries: 2): Rate exceeded"),
            ErrorKind::Transient
        );
        assert_eq!(classify_stderr("Connection reset by peer"), ErrorKind::Transient);
    }
}
