//! CloudGateway implementation over the aws CLI

use crate::aws::AwsCli;
use crate::error::{AwsError, Result};
use async_trait::async_trait;
use bucketflow_cloud::{
    AuthStatus, CloudGateway, DistributionConfig, DistributionStatus, GatewayResult,
    ObjectPage, ObjectSummary, ObjectVersion, ResourceRef, StackResource, StackStatus,
    VersionMarker, VersionPage,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// AWS gateway (CloudFormation, S3, CloudFront)
pub struct AwsGateway {
    cli: AwsCli,
}

impl AwsGateway {
    pub fn new(cli: AwsCli) -> Self {
        Self { cli }
    }

    pub fn cli(&self) -> &AwsCli {
        &self.cli
    }

    async fn describe_stack_resources(&self, stack_name: &str) -> Result<Vec<StackResource>> {
        let output = self
            .cli
            .run(&[
                "cloudformation",
                "describe-stack-resources",
                "--stack-name",
                stack_name,
            ])
            .await?;
        parse_stack_resources(&output)
    }
}

#[async_trait]
impl CloudGateway for AwsGateway {
    fn name(&self) -> &str {
        "aws"
    }

    async fn check_auth(&self) -> GatewayResult<AuthStatus> {
        match self.cli.run(&["sts", "get-caller-identity"]).await {
            Ok(output) => match parse_caller_identity(&output) {
                Ok(identity) => Ok(AuthStatus::ok(format!(
                    "{} (account {})",
                    identity.arn, identity.account
                ))),
                Err(e) => Ok(AuthStatus::failed(e.to_string())),
            },
            Err(e @ AwsError::CommandFailed { .. }) | Err(e @ AwsError::CliNotFound(_)) => {
                Ok(AuthStatus::failed(e.to_string()))
            }
            Err(e) => Err(e.into_resource_error(ResourceRef::new(
                bucketflow_cloud::ResourceKind::Account,
                "caller-identity",
            ))),
        }
    }

    async fn describe_stack(&self, stack_name: &str) -> GatewayResult<Option<StackStatus>> {
        let resource = || ResourceRef::stack(stack_name);
        let output = match self
            .cli
            .run(&["cloudformation", "describe-stacks", "--stack-name", stack_name])
            .await
        {
            Ok(output) => output,
            Err(e) => {
                let err = e.into_resource_error(resource());
                return if err.is_not_found() { Ok(None) } else { Err(err) };
            }
        };

        let Some(mut stack) = parse_stack(&output).map_err(|e| e.into_resource_error(resource()))?
        else {
            return Ok(None);
        };

        // The stack can vanish between the two calls
        match self.describe_stack_resources(stack_name).await {
            Ok(resources) => stack.resources = resources,
            Err(e) => {
                let err = e.into_resource_error(resource());
                if !err.is_not_found() {
                    return Err(err);
                }
            }
        }
        Ok(Some(stack))
    }

    async fn delete_stack(&self, stack_name: &str) -> GatewayResult<()> {
        match self
            .cli
            .run(&["cloudformation", "delete-stack", "--stack-name", stack_name])
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                let err = e.into_resource_error(ResourceRef::stack(stack_name));
                if err.is_not_found() { Ok(()) } else { Err(err) }
            }
        }
    }

    async fn bucket_exists(&self, bucket: &str) -> GatewayResult<bool> {
        match self.cli.run(&["s3api", "head-bucket", "--bucket", bucket]).await {
            Ok(_) => Ok(true),
            Err(e) => {
                let err = e.into_resource_error(ResourceRef::bucket(bucket));
                if err.is_not_found() { Ok(false) } else { Err(err) }
            }
        }
    }

    async fn list_objects_page(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        continuation: Option<&str>,
    ) -> GatewayResult<ObjectPage> {
        let mut args = vec!["s3api", "list-objects-v2", "--bucket", bucket, "--no-paginate"];
        if let Some(prefix) = prefix {
            args.extend(["--prefix", prefix]);
        }
        if let Some(token) = continuation {
            args.extend(["--continuation-token", token]);
        }

        let output = self.cli.run(&args).await;
        output
            .and_then(|out| parse_object_page(&out))
            .map_err(|e| e.into_resource_error(ResourceRef::bucket(bucket)))
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> GatewayResult<usize> {
        if keys.is_empty() {
            return Ok(0);
        }
        let resource = || ResourceRef::bucket(bucket);
        let payload = delete_payload(keys);
        let output = self
            .cli
            .run(&["s3api", "delete-objects", "--bucket", bucket, "--delete", &payload])
            .await
            .map_err(|e| e.into_resource_error(resource()))?;

        let failures = parse_delete_errors(&output).map_err(|e| e.into_resource_error(resource()))?;
        match failures.first() {
            None => Ok(keys.len()),
            Some(first) => Err(AwsError::CommandFailed {
                code: None,
                stderr: format!(
                    "{} of {} keys not deleted; first: {} ({}) {}",
                    failures.len(),
                    keys.len(),
                    first.key,
                    first.code,
                    first.message
                ),
            }
            .into_resource_error(resource())),
        }
    }

    async fn list_object_versions_page(
        &self,
        bucket: &str,
        marker: Option<&VersionMarker>,
    ) -> GatewayResult<VersionPage> {
        let mut args = vec!["s3api", "list-object-versions", "--bucket", bucket, "--no-paginate"];
        if let Some(marker) = marker {
            args.extend(["--key-marker", marker.key.as_str()]);
            if let Some(version) = &marker.version_id {
                args.extend(["--version-id-marker", version.as_str()]);
            }
        }

        let output = self.cli.run(&args).await;
        output
            .and_then(|out| parse_version_page(&out))
            .map_err(|e| e.into_resource_error(ResourceRef::bucket(bucket)))
    }

    async fn delete_object_versions(
        &self,
        bucket: &str,
        versions: &[ObjectVersion],
    ) -> GatewayResult<usize> {
        if versions.is_empty() {
            return Ok(0);
        }
        let resource = || ResourceRef::bucket(bucket);
        let payload = version_delete_payload(versions);
        let output = self
            .cli
            .run(&["s3api", "delete-objects", "--bucket", bucket, "--delete", &payload])
            .await
            .map_err(|e| e.into_resource_error(resource()))?;

        let failures = parse_delete_errors(&output).map_err(|e| e.into_resource_error(resource()))?;
        match failures.first() {
            None => Ok(versions.len()),
            Some(first) => Err(AwsError::CommandFailed {
                code: None,
                stderr: format!(
                    "{} of {} versions not deleted; first: {} ({}) {}",
                    failures.len(),
                    versions.len(),
                    first.key,
                    first.code,
                    first.message
                ),
            }
            .into_resource_error(resource())),
        }
    }

    async fn delete_bucket(&self, bucket: &str) -> GatewayResult<()> {
        self.cli
            .run(&["s3api", "delete-bucket", "--bucket", bucket])
            .await
            .map(|_| ())
            .map_err(|e| e.into_resource_error(ResourceRef::bucket(bucket)))
    }

    async fn put_empty_object(&self, bucket: &str, key: &str) -> GatewayResult<()> {
        self.cli
            .run(&["s3api", "put-object", "--bucket", bucket, "--key", key])
            .await
            .map(|_| ())
            .map_err(|e| e.into_resource_error(ResourceRef::object(bucket, key)))
    }

    async fn copy_object(&self, bucket: &str, from_key: &str, to_key: &str) -> GatewayResult<()> {
        let source = copy_source(bucket, from_key);
        self.cli
            .run(&[
                "s3api",
                "copy-object",
                "--bucket",
                bucket,
                "--copy-source",
                &source,
                "--key",
                to_key,
            ])
            .await
            .map(|_| ())
            .map_err(|e| e.into_resource_error(ResourceRef::object(bucket, from_key)))
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> GatewayResult<()> {
        self.cli
            .run(&["s3api", "delete-object", "--bucket", bucket, "--key", key])
            .await
            .map(|_| ())
            .map_err(|e| e.into_resource_error(ResourceRef::object(bucket, key)))
    }

    async fn get_distribution_config(&self, id: &str) -> GatewayResult<DistributionConfig> {
        self.cli
            .run(&["cloudfront", "get-distribution-config", "--id", id])
            .await
            .and_then(|out| parse_distribution_config(id, &out))
            .map_err(|e| e.into_resource_error(ResourceRef::distribution(id)))
    }

    async fn update_distribution(
        &self,
        id: &str,
        etag: &str,
        config: &serde_json::Value,
    ) -> GatewayResult<String> {
        let resource = || ResourceRef::distribution(id);
        let document = serde_json::to_string(config)
            .map_err(|e| AwsError::from(e).into_resource_error(resource()))?;
        self.cli
            .run(&[
                "cloudfront",
                "update-distribution",
                "--id",
                id,
                "--if-match",
                etag,
                "--distribution-config",
                &document,
            ])
            .await
            .and_then(|out| parse_etag(&out))
            .map_err(|e| e.into_resource_error(resource()))
    }

    async fn get_distribution_status(&self, id: &str) -> GatewayResult<DistributionStatus> {
        self.cli
            .run(&["cloudfront", "get-distribution", "--id", id])
            .await
            .and_then(|out| parse_distribution_status(&out))
            .map_err(|e| e.into_resource_error(ResourceRef::distribution(id)))
    }

    async fn delete_distribution(&self, id: &str, etag: &str) -> GatewayResult<()> {
        self.cli
            .run(&["cloudfront", "delete-distribution", "--id", id, "--if-match", etag])
            .await
            .map(|_| ())
            .map_err(|e| e.into_resource_error(ResourceRef::distribution(id)))
    }
}

// ========== Output parsing ==========

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CallerIdentity {
    pub account: String,
    pub arn: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeStacksOutput {
    #[serde(default)]
    stacks: Vec<RawStack>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawStack {
    stack_name: String,
    stack_status: String,
    #[serde(default)]
    stack_status_reason: Option<String>,
    #[serde(default)]
    creation_time: Option<String>,
    #[serde(default)]
    last_updated_time: Option<String>,
    #[serde(default)]
    outputs: Vec<RawOutput>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawOutput {
    output_key: String,
    output_value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeStackResourcesOutput {
    #[serde(default)]
    stack_resources: Vec<RawStackResource>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawStackResource {
    logical_resource_id: String,
    #[serde(default)]
    physical_resource_id: Option<String>,
    resource_type: String,
    resource_status: String,
    #[serde(default)]
    resource_status_reason: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListObjectsOutput {
    #[serde(default)]
    contents: Vec<RawObject>,
    #[serde(default)]
    next_continuation_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawObject {
    key: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    last_modified: Option<String>,
    #[serde(default, rename = "ETag")]
    etag: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListVersionsOutput {
    #[serde(default)]
    versions: Vec<RawVersion>,
    #[serde(default)]
    delete_markers: Vec<RawVersion>,
    #[serde(default)]
    is_truncated: bool,
    #[serde(default)]
    next_key_marker: Option<String>,
    #[serde(default)]
    next_version_id_marker: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawVersion {
    key: String,
    version_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DeleteObjectsOutput {
    #[serde(default)]
    errors: Vec<DeleteFailure>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DeleteFailure {
    key: String,
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct DistributionConfigOutput {
    #[serde(rename = "ETag")]
    etag: String,
    #[serde(rename = "DistributionConfig")]
    config: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct EtagOutput {
    #[serde(rename = "ETag")]
    etag: String,
}

#[derive(Debug, Deserialize)]
struct GetDistributionOutput {
    #[serde(rename = "Distribution")]
    distribution: RawDistribution,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawDistribution {
    id: String,
    status: String,
    distribution_config: RawEnabled,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawEnabled {
    enabled: bool,
}

fn timestamp(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|t| t.with_timezone(&Utc))
}

pub fn parse_caller_identity(output: &str) -> Result<CallerIdentity> {
    Ok(serde_json::from_str(output)?)
}

/// First stack of a `describe-stacks` response, with outputs but no resources
pub fn parse_stack(output: &str) -> Result<Option<StackStatus>> {
    let parsed: DescribeStacksOutput = serde_json::from_str(output)?;
    let Some(raw) = parsed.stacks.into_iter().next() else {
        return Ok(None);
    };

    let mut stack = StackStatus::new(raw.stack_name, raw.stack_status);
    stack.status_reason = raw.stack_status_reason;
    stack.created_at = timestamp(raw.creation_time.as_deref());
    stack.updated_at = timestamp(raw.last_updated_time.as_deref());
    for o in raw.outputs {
        stack.outputs.insert(o.output_key, o.output_value);
    }
    Ok(Some(stack))
}

pub fn parse_stack_resources(output: &str) -> Result<Vec<StackResource>> {
    let parsed: DescribeStackResourcesOutput = serde_json::from_str(output)?;
    Ok(parsed
        .stack_resources
        .into_iter()
        .map(|r| StackResource {
            logical_id: r.logical_resource_id,
            physical_id: r.physical_resource_id,
            resource_type: r.resource_type,
            status: r.resource_status,
            reason: r.resource_status_reason,
            last_updated: timestamp(r.timestamp.as_deref()),
        })
        .collect())
}

/// An empty bucket may produce no output at all
pub fn parse_object_page(output: &str) -> Result<ObjectPage> {
    if output.trim().is_empty() {
        return Ok(ObjectPage::default());
    }
    let parsed: ListObjectsOutput = serde_json::from_str(output)?;
    Ok(ObjectPage {
        objects: parsed
            .contents
            .into_iter()
            .map(|o| ObjectSummary {
                key: o.key,
                size: o.size,
                last_modified: timestamp(o.last_modified.as_deref()),
                etag: o.etag.map(|e| e.trim_matches('"').to_string()),
            })
            .collect(),
        next_token: parsed.next_continuation_token.filter(|t| !t.is_empty()),
    })
}

/// Versions first, then delete markers. The marker is set only while the
/// response is truncated.
pub fn parse_version_page(output: &str) -> Result<VersionPage> {
    if output.trim().is_empty() {
        return Ok(VersionPage::default());
    }
    let parsed: ListVersionsOutput = serde_json::from_str(output)?;
    let entry = |raw: RawVersion, delete_marker| ObjectVersion {
        key: raw.key,
        version_id: raw.version_id,
        delete_marker,
    };
    let mut versions: Vec<ObjectVersion> =
        parsed.versions.into_iter().map(|v| entry(v, false)).collect();
    versions.extend(parsed.delete_markers.into_iter().map(|v| entry(v, true)));

    let next = match parsed.next_key_marker {
        Some(key) if parsed.is_truncated && !key.is_empty() => Some(VersionMarker {
            key,
            version_id: parsed.next_version_id_marker.filter(|v| !v.is_empty()),
        }),
        _ => None,
    };
    Ok(VersionPage { versions, next })
}

fn parse_delete_errors(output: &str) -> Result<Vec<DeleteFailure>> {
    if output.trim().is_empty() {
        return Ok(Vec::new());
    }
    let parsed: DeleteObjectsOutput = serde_json::from_str(output)?;
    Ok(parsed.errors)
}

pub fn parse_distribution_config(id: &str, output: &str) -> Result<DistributionConfig> {
    let parsed: DistributionConfigOutput = serde_json::from_str(output)?;
    Ok(DistributionConfig {
        id: id.to_string(),
        etag: parsed.etag,
        config: parsed.config,
    })
}

fn parse_etag(output: &str) -> Result<String> {
    let parsed: EtagOutput = serde_json::from_str(output)?;
    Ok(parsed.etag)
}

pub fn parse_distribution_status(output: &str) -> Result<DistributionStatus> {
    let parsed: GetDistributionOutput = serde_json::from_str(output)?;
    Ok(DistributionStatus {
        id: parsed.distribution.id,
        status: parsed.distribution.status,
        enabled: parsed.distribution.distribution_config.enabled,
    })
}

/// `--delete` document for a quiet batch delete
fn delete_payload(keys: &[String]) -> String {
    let objects: Vec<serde_json::Value> = keys
        .iter()
        .map(|k| serde_json::json!({ "Key": k }))
        .collect();
    serde_json::json!({ "Objects": objects, "Quiet": true }).to_string()
}

fn version_delete_payload(versions: &[ObjectVersion]) -> String {
    let objects: Vec<serde_json::Value> = versions
        .iter()
        .map(|v| serde_json::json!({ "Key": v.key, "VersionId": v.version_id }))
        .collect();
    serde_json::json!({ "Objects": objects, "Quiet": true }).to_string()
}

/// `bucket/key` with the key percent-encoded, as `--copy-source` expects
fn copy_source(bucket: &str, key: &str) -> String {
    let mut encoded = String::with_capacity(key.len());
    for b in key.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                encoded.push(b as char)
            }
            _ => encoded.push_str(&format!("%{:02X}", b)),
        }
    }
    format!("{}/{}", bucket, encoded)
}
