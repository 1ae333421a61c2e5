//! Error intelligence: heuristic advice for failed runs
//!
//! Rules are tried in order and the first match wins. When nothing matches
//! a generic diagnosis is returned, so analysis never fails.

use crate::event::{DeployEvent, EventType, FixCommand, Level};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

pub const MAX_TIPS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnosis {
    pub diagnosis: String,
    pub fix_commands: Vec<FixCommand>,
    pub tips: Vec<String>,

    /// Name of the rule that produced this, `fallback` if none matched
    #[serde(default)]
    pub rule: String,
}

impl Diagnosis {
    /// Render as an `error-intelligence` event
    pub fn to_event(&self) -> DeployEvent {
        let mut event = DeployEvent::new(Level::Error, &self.diagnosis);
        event.event_type = Some(EventType::ErrorIntelligence);
        event.title = Some("Error intelligence".to_string());
        if let Some(first) = self.fix_commands.first() {
            event.suggestion = Some(first.description.clone());
            event.command = Some(first.command.clone());
        }
        event.fix_commands = self.fix_commands.clone();
        event.tips = self.tips.clone();
        event
    }
}

/// What the analyzer looks at
#[derive(Debug, Clone, Copy)]
pub struct FailureContext<'a> {
    pub text: &'a str,
    pub command: Option<&'a str>,
}

impl<'a> FailureContext<'a> {
    pub fn new(text: &'a str, command: Option<&'a str>) -> Self {
        Self { text, command }
    }
}

pub trait DiagnosisRule: Send + Sync {
    fn name(&self) -> &str;

    /// `None` when the rule does not apply
    fn diagnose(&self, ctx: &FailureContext<'_>) -> Option<Diagnosis>;
}

/// Regex-driven rule with `{placeholder}` templates.
///
/// Placeholders are filled from named capture groups, then from defaults,
/// and `{command}` from the failing command.
pub struct PatternRule {
    name: String,
    pattern: Regex,
    diagnosis: String,
    fixes: Vec<(String, String)>,
    tips: Vec<String>,
    defaults: Vec<(String, String)>,
}

impl PatternRule {
    pub fn new(name: impl Into<String>, pattern: &str, diagnosis: impl Into<String>) -> Result<Self, regex::Error> {
        Ok(Self {
            name: name.into(),
            pattern: Regex::new(pattern)?,
            diagnosis: diagnosis.into(),
            fixes: Vec::new(),
            tips: Vec::new(),
            defaults: Vec::new(),
        })
    }

    pub fn fix(mut self, command: impl Into<String>, description: impl Into<String>) -> Self {
        self.fixes.push((command.into(), description.into()));
        self
    }

    pub fn tip(mut self, tip: impl Into<String>) -> Self {
        self.tips.push(tip.into());
        self
    }

    pub fn default_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.defaults.push((key.into(), value.into()));
        self
    }

    fn fill(&self, template: &str, caps: &Captures<'_>, ctx: &FailureContext<'_>) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let Some(close) = after.find('}') else {
                out.push_str(&rest[open..]);
                return out;
            };
            let key = &after[..close];
            out.push_str(&self.lookup(key, caps, ctx));
            rest = &after[close + 1..];
        }
        out.push_str(rest);
        out
    }

    fn lookup(&self, key: &str, caps: &Captures<'_>, ctx: &FailureContext<'_>) -> String {
        if let Some(m) = caps.name(key) {
            return m.as_str().to_string();
        }
        if key == "command" {
            if let Some(command) = ctx.command {
                return command.to_string();
            }
        }
        self.defaults
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .unwrap_or_else(|| format!("<{}>", key))
    }
}

impl DiagnosisRule for PatternRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn diagnose(&self, ctx: &FailureContext<'_>) -> Option<Diagnosis> {
        let caps = self.pattern.captures(ctx.text)?;
        Some(Diagnosis {
            diagnosis: self.fill(&self.diagnosis, &caps, ctx),
            fix_commands: self
                .fixes
                .iter()
                .map(|(command, description)| FixCommand {
                    command: self.fill(command, &caps, ctx),
                    description: self.fill(description, &caps, ctx),
                })
                .collect(),
            tips: self.tips.iter().map(|t| self.fill(t, &caps, ctx)).collect(),
            rule: self.name.clone(),
        })
    }
}

/// Ordered rule set
pub struct Analyzer {
    rules: Vec<Box<dyn DiagnosisRule>>,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::with_builtin_rules()
    }
}

impl Analyzer {
    /// No rules: everything gets the fallback
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn with_builtin_rules() -> Self {
        let mut analyzer = Self::empty();
        for rule in builtin_rules() {
            match rule {
                Ok(rule) => analyzer.rules.push(Box::new(rule)),
                Err(e) => tracing::warn!("Skipping diagnosis rule: {}", e),
            }
        }
        analyzer
    }

    /// Append a rule with the lowest priority
    pub fn with_rule(mut self, rule: impl DiagnosisRule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    /// Insert a rule ahead of all others
    pub fn prepend(mut self, rule: impl DiagnosisRule + 'static) -> Self {
        self.rules.insert(0, Box::new(rule));
        self
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn analyze(&self, text: &str, command: Option<&str>) -> Diagnosis {
        let ctx = FailureContext::new(text, command);
        let mut diagnosis = self
            .rules
            .iter()
            .find_map(|rule| rule.diagnose(&ctx))
            .unwrap_or_else(|| fallback(&ctx));
        diagnosis.tips.truncate(MAX_TIPS);
        tracing::debug!("Diagnosis via rule {}", diagnosis.rule);
        diagnosis
    }
}

fn fallback(ctx: &FailureContext<'_>) -> Diagnosis {
    let mut fix_commands = Vec::new();
    if let Some(command) = ctx.command {
        fix_commands.push(FixCommand {
            command: format!("{} --verbose", command),
            description: "Re-run with verbose output to see the underlying error".to_string(),
        });
    }
    fix_commands.push(FixCommand {
        command: "npx cdk doctor".to_string(),
        description: "Check the CDK toolchain and environment".to_string(),
    });

    Diagnosis {
        diagnosis: "The deployment failed for a reason that was not recognised".to_string(),
        fix_commands,
        tips: vec![
            "Read the last error lines of the output above".to_string(),
            "Check the stack events in the CloudFormation console".to_string(),
        ],
        rule: "fallback".to_string(),
    }
}

fn builtin_rules() -> Vec<Result<PatternRule, regex::Error>> {
    vec![
        PatternRule::new(
            "credentials",
            r"Unable to locate credentials|ExpiredToken|InvalidClientTokenId|security token included in the request is (?:expired|invalid)|Need to perform AWS calls for account|Could not load credentials",
            "AWS credentials are missing or expired",
        )
        .map(|r| {
            r.fix("aws sts get-caller-identity", "Check which identity the CLI resolves")
                .fix("aws sso login", "Refresh an SSO session")
                .fix("aws configure", "Configure static credentials")
                .tip("Set AWS_PROFILE or aws.profile in bucketflow.yaml to pick a profile")
                .tip("SSO sessions expire; log in again before long deployments")
        }),
        PatternRule::new(
            "access-denied",
            r"(?:AccessDenied|UnauthorizedOperation|not authorized to perform:?\s*(?P<action>[\w:*-]+)?)",
            "The current identity is not allowed to perform {action}",
        )
        .map(|r| {
            r.default_value("action", "this operation")
                .fix("aws sts get-caller-identity", "Confirm which role or user is in use")
                .tip("Grant the missing permission to the deploying role")
                .tip("Bootstrap roles need cloudformation, s3, cloudfront and iam permissions")
        }),
        PatternRule::new(
            "not-bootstrapped",
            r"(?:has not been bootstrapped|/cdk-bootstrap/\S+|bootstrap stack version|Is this account bootstrapped)",
            "The target environment has not been bootstrapped for CDK",
        )
        .map(|r| {
            r.fix("npx cdk bootstrap", "Create the CDK toolkit stack in the target account and region")
                .tip("Bootstrap once per account and region")
        }),
        PatternRule::new(
            "bucket-exists",
            r"(?:(?:AWS::S3::Bucket|[Bb]ucket)\b[^\n]*?\b(?P<bucket>[a-z0-9][a-z0-9.-]{1,61}[a-z0-9]) already exists|BucketAlreadyExists|BucketAlreadyOwnedByYou)",
            "The bucket name {bucket} is already taken",
        )
        .map(|r| {
            r.default_value("bucket", "")
                .fix("aws s3api head-bucket --bucket {bucket}", "Check whether you own the existing bucket")
                .fix("npx cdk import", "Adopt the existing bucket into the stack")
                .tip("Bucket names are global across all AWS accounts")
                .tip("Add an account or environment suffix to keep names unique")
        }),
        PatternRule::new(
            "rollback-complete",
            r"(?:stack/)?(?P<stack>[A-Za-z][A-Za-z0-9-]*)(?:/\S*)? is in (?:UPDATE_)?ROLLBACK_COMPLETE state",
            "Stack {stack} is stuck after a failed creation and cannot be updated",
        )
        .map(|r| {
            r.fix(
                "aws cloudformation describe-stack-events --stack-name {stack}",
                "Find the resource that caused the rollback",
            )
            .fix(
                "aws cloudformation delete-stack --stack-name {stack}",
                "Delete the failed stack so it can be created again",
            )
            .tip("A stack that failed on creation must be deleted before redeploying")
        }),
        PatternRule::new(
            "stack-busy",
            r"(?P<stack>[A-Za-z][A-Za-z0-9-]*)? ?is in (?P<state>[A-Z_]+_IN_PROGRESS) state",
            "The stack is busy ({state}) and cannot be changed right now",
        )
        .map(|r| {
            r.default_value("stack", "<stack-name>")
                .fix(
                    "aws cloudformation describe-stacks --stack-name {stack}",
                    "Watch the stack until the current operation finishes",
                )
                .tip("Wait for the running operation to finish, then retry")
        }),
        PatternRule::new(
            "cname-conflict",
            r"CNAMEAlreadyExists|One or more of the CNAMEs you provided are already associated",
            "An alternate domain name is already attached to another distribution",
        )
        .map(|r| {
            r.fix(
                "aws cloudfront list-conflicting-aliases --distribution-id <id> --alias <domain>",
                "Find the distribution holding the alias",
            )
            .tip("Remove the alias from the other distribution first")
        }),
        PatternRule::new(
            "limit-exceeded",
            r"(?:LimitExceeded|TooManyDistributions|TooManyBuckets|Quota exceeded)",
            "An account quota was reached",
        )
        .map(|r| {
            r.fix(
                "aws service-quotas list-service-quotas --service-code cloudfront",
                "Inspect the current limits",
            )
            .tip("Delete unused buckets or distributions, or request a quota increase")
        }),
        PatternRule::new(
            "cdk-missing",
            r"(?:cdk: (?:command )?not found|npx: (?:command )?not found|could not determine executable to run|spawn cdk ENOENT)",
            "The CDK CLI is not installed",
        )
        .map(|r| {
            r.fix("npm install -g aws-cdk", "Install the CDK CLI globally")
                .fix("npm install", "Install the app's local dependencies")
        }),
        PatternRule::new(
            "app-build",
            r"(?:TSError|Cannot find module '(?P<module>[^']+)'|error TS\d+)",
            "The CDK app failed to compile",
        )
        .map(|r| {
            r.default_value("module", "")
                .fix("npm install", "Install missing dependencies")
                .fix("npx tsc --noEmit", "Show all type errors")
        }),
        PatternRule::new(
            "network",
            r"(?:getaddrinfo|ECONNRESET|ETIMEDOUT|EAI_AGAIN|socket hang up|Could not connect to the endpoint URL)",
            "A network error interrupted the run",
        )
        .map(|r| {
            r.fix("{command}", "Retry the same command")
                .default_value("command", "npx cdk deploy")
                .tip("Check proxy and VPN settings")
        }),
    ]
}
