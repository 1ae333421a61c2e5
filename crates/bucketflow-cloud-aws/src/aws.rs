//! aws CLI wrapper
//!
//! Runs `aws` subcommands with JSON output and a per-call timeout.

use crate::error::{AwsError, Result};
use serde::de::DeserializeOwned;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

pub const DEFAULT_PROGRAM: &str = "aws";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// aws CLI wrapper
#[derive(Debug, Clone)]
pub struct AwsCli {
    program: String,
    profile: Option<String>,
    region: Option<String>,
    timeout: Duration,
}

impl Default for AwsCli {
    fn default() -> Self {
        Self::new()
    }
}

impl AwsCli {
    pub fn new() -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_string(),
            profile: None,
            region: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_profile(mut self, profile: Option<String>) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_region(mut self, region: Option<String>) -> Self {
        self.region = region;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    pub fn profile(&self) -> Option<&str> {
        self.profile.as_deref()
    }

    /// Full argument vector passed to the program
    pub fn command_args(&self, args: &[&str]) -> Vec<String> {
        let mut full: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        full.extend(["--output".to_string(), "json".to_string()]);
        full.push("--no-cli-pager".to_string());
        if let Some(profile) = &self.profile {
            full.extend(["--profile".to_string(), profile.clone()]);
        }
        if let Some(region) = &self.region {
            full.extend(["--region".to_string(), region.clone()]);
        }
        full
    }

    /// Run a command and return stdout
    pub async fn run(&self, args: &[&str]) -> Result<String> {
        let full = self.command_args(args);
        let mut cmd = Command::new(&self.program);
        cmd.args(&full);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        tracing::debug!("Running: {} {}", self.program, full.join(" "));

        let child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AwsError::CliNotFound(self.program.clone())
            } else {
                AwsError::IoError(e)
            }
        })?;

        // Dropping the future on timeout kills the child
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| AwsError::Timeout(self.timeout.as_secs()))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            tracing::debug!("aws exited with {:?}: {}", output.status.code(), stderr.trim());
            return Err(AwsError::CommandFailed {
                code: output.status.code(),
                stderr,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Run a command and decode its JSON output
    pub async fn run_json<T: DeserializeOwned>(&self, args: &[&str]) -> Result<T> {
        let output = self.run(args).await?;
        if output.trim().is_empty() {
            return Err(AwsError::UnexpectedOutput(format!(
                "empty output from `{}`",
                args.join(" ")
            )));
        }
        Ok(serde_json::from_str(&output)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_args() {
        let cli = AwsCli::new()
            .with_profile(Some("dev".to_string()))
            .with_region(Some("eu-west-1".to_string()));

        assert_eq!(
            cli.command_args(&["s3api", "head-bucket", "--bucket", "b"]),
            vec![
                "s3api",
                "head-bucket",
                "--bucket",
                "b",
                "--output",
                "json",
                "--no-cli-pager",
                "--profile",
                "dev",
                "--region",
                "eu-west-1"
            ]
        );
    }

    #[test]
    fn test_defaults_omit_profile_and_region() {
        let args = AwsCli::new().command_args(&["sts", "get-caller-identity"]);
        assert!(!args.iter().any(|a| a == "--profile" || a == "--region"));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let cli = AwsCli::new().with_program("bucketflow-definitely-missing-aws");
        let err = cli.run(&["sts", "get-caller-identity"]).await.unwrap_err();
        assert!(matches!(err, AwsError::CliNotFound(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_captures_stderr() {
        // `false` ignores its arguments and exits 1
        let cli = AwsCli::new().with_program("false");
        let err = cli.run(&["s3api", "list-buckets"]).await.unwrap_err();
        assert!(matches!(err, AwsError::CommandFailed { code: Some(1), .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_empty_json_output_is_rejected() {
        // `true` prints nothing
        let cli = AwsCli::new().with_program("true");
        let err = cli
            .run_json::<serde_json::Value>(&["sts", "get-caller-identity"])
            .await
            .unwrap_err();
        assert!(matches!(err, AwsError::UnexpectedOutput(_)));
    }
}
