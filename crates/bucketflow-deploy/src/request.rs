//! Deployment requests and the CDK invocation they translate to

use crate::error::{DeployError, Result};
use bucketflow_cloud::{DEFAULT_STACK_PREFIX, stack_name_for};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployAction {
    Synth,
    Deploy,
}

impl std::fmt::Display for DeployAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeployAction::Synth => write!(f, "synth"),
            DeployAction::Deploy => write!(f, "deploy"),
        }
    }
}

impl std::str::FromStr for DeployAction {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "synth" => Ok(DeployAction::Synth),
            "deploy" => Ok(DeployAction::Deploy),
            other => Err(DeployError::InvalidRequest(format!(
                "unknown action: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployRequest {
    pub action: DeployAction,

    #[serde(default)]
    pub bucket_id: Option<String>,

    #[serde(default)]
    pub s3_bucket_name: Option<String>,

    #[serde(default)]
    pub region: Option<String>,
}

impl DeployRequest {
    pub fn synth() -> Self {
        Self {
            action: DeployAction::Synth,
            bucket_id: None,
            s3_bucket_name: None,
            region: None,
        }
    }

    pub fn deploy(s3_bucket_name: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            action: DeployAction::Deploy,
            bucket_id: None,
            s3_bucket_name: Some(s3_bucket_name.into()),
            region: Some(region.into()),
        }
    }

    pub fn with_bucket_id(mut self, id: impl Into<String>) -> Self {
        self.bucket_id = Some(id.into());
        self
    }

    /// `deploy` requires a bucket name and region; anything given must be
    /// well formed.
    pub fn validate(&self) -> Result<()> {
        if self.action == DeployAction::Deploy {
            if self.s3_bucket_name.as_deref().is_none_or(str::is_empty) {
                return Err(DeployError::InvalidRequest(
                    "deploy requires s3BucketName".to_string(),
                ));
            }
            if self.region.as_deref().is_none_or(str::is_empty) {
                return Err(DeployError::InvalidRequest(
                    "deploy requires region".to_string(),
                ));
            }
        }
        if let Some(name) = &self.s3_bucket_name {
            validate_bucket_name(name)?;
        }
        if let Some(region) = &self.region {
            validate_region(region)?;
        }
        Ok(())
    }
}

/// S3 naming rules: 3-63 characters of lowercase letters, digits, dots and
/// hyphens, starting and ending with a letter or digit.
pub fn validate_bucket_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| {
        Err(DeployError::InvalidRequest(format!(
            "bucket name {:?} {}",
            name, reason
        )))
    };

    if !(3..=63).contains(&name.len()) {
        return invalid("must be 3 to 63 characters long");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
    {
        return invalid("may only contain lowercase letters, digits, '.' and '-'");
    }
    let edge_ok = |c: Option<char>| c.is_some_and(|c| c.is_ascii_alphanumeric());
    if !edge_ok(name.chars().next()) || !edge_ok(name.chars().last()) {
        return invalid("must start and end with a letter or digit");
    }
    if name.contains("..") {
        return invalid("must not contain consecutive dots");
    }
    Ok(())
}

fn validate_region(region: &str) -> Result<()> {
    let well_formed = !region.is_empty()
        && region
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && region.contains('-');
    if well_formed {
        Ok(())
    } else {
        Err(DeployError::InvalidRequest(format!(
            "region {:?} is not a valid AWS region",
            region
        )))
    }
}

/// How the CDK CLI is launched
#[derive(Debug, Clone)]
pub struct CdkCommand {
    pub program: String,
    /// Arguments placed before the subcommand (e.g. `cdk` for `npx cdk`)
    pub base_args: Vec<String>,
    pub app_dir: Option<PathBuf>,
    pub profile: Option<String>,
    pub stack_prefix: String,
}

impl Default for CdkCommand {
    fn default() -> Self {
        Self {
            program: "npx".to_string(),
            base_args: vec!["cdk".to_string()],
            app_dir: None,
            profile: None,
            stack_prefix: DEFAULT_STACK_PREFIX.to_string(),
        }
    }
}

impl CdkCommand {
    /// Translate a validated request into a process invocation
    pub fn invocation(&self, request: &DeployRequest) -> Result<Invocation> {
        request.validate()?;

        let mut invocation = Invocation::new(&self.program).args(self.base_args.iter().cloned());
        invocation = invocation.arg(request.action.to_string());

        if let Some(bucket) = &request.s3_bucket_name {
            let stack_name = stack_name_for(&self.stack_prefix, bucket);
            invocation = invocation.arg(&stack_name);
            if request.action == DeployAction::Deploy {
                invocation = invocation.args(["--require-approval", "never"]);
            }
            invocation = invocation
                .context("bucketName", bucket)
                .context("stackName", &stack_name);
        }
        if let Some(region) = &request.region {
            invocation = invocation
                .context("region", region)
                .env("AWS_REGION", region)
                .env("CDK_DEFAULT_REGION", region);
        }
        if let Some(profile) = &self.profile {
            invocation = invocation.env("AWS_PROFILE", profile);
        }
        if let Some(dir) = &self.app_dir {
            invocation = invocation.current_dir(dir.clone());
        }
        Ok(invocation)
    }
}

/// A fully resolved subprocess call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    fn context(self, key: &str, value: &str) -> Self {
        self.arg("--context").arg(format!("{}={}", key, value))
    }

    /// Shell-like rendering for logs and the command echo
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(|part| {
                if part.is_empty() || part.contains(char::is_whitespace) {
                    format!("'{}'", part)
                } else {
                    part.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}
