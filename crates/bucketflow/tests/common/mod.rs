#![allow(dead_code)]

use assert_cmd::Command;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A working directory with its own config and record store
pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        Self { root }
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.path().join("data")
    }

    pub fn write_config(&self, content: &str) {
        fs::write(self.root.path().join("bucketflow.yaml"), content).unwrap();
    }

    /// Write an executable script and return its path
    #[cfg(unix)]
    pub fn write_script(&self, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = self.root.path().join(name);
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// `bflow` isolated from the user's config and data
    pub fn bflow(&self) -> Command {
        #[allow(deprecated)]
        let mut cmd = Command::cargo_bin("bflow").unwrap();
        cmd.current_dir(self.root.path())
            .env("HOME", self.root.path())
            .env("XDG_CONFIG_HOME", self.root.path().join(".config"))
            .env("BUCKETFLOW_DATA_DIR", self.data_dir())
            .env_remove("BUCKETFLOW_CONFIG_PATH")
            .env_remove("RUST_LOG");
        cmd
    }
}

/// Fake `aws` CLI answering the calls a deploy and status make
pub const FAKE_AWS: &str = r#"
case "$1 $2" in
  "sts get-caller-identity")
    echo '{"UserId":"AIDAEXAMPLE","Account":"123456789012","Arn":"arn:aws:iam::123456789012:user/ci"}' ;;
  "cloudformation describe-stacks")
    echo '{"Stacks":[{"StackName":"BucketflowStack-site-assets","StackStatus":"CREATE_COMPLETE","Outputs":[{"OutputKey":"DistributionId","OutputValue":"E2ABCDEF"},{"OutputKey":"DistributionDomainName","OutputValue":"d111.cloudfront.net"}]}]}' ;;
  "cloudformation describe-stack-resources")
    echo '{"StackResources":[]}' ;;
  "s3api head-bucket")
    ;;
  *)
    echo "An error occurred (InvalidAction) when calling the $2 operation: unsupported" >&2
    exit 254 ;;
esac
"#;

/// Fake `aws` that only knows the stack in `region` and logs every call to
/// `aws.log` next to itself
pub fn regional_aws(region: &str) -> String {
    format!(
        r#"echo "$*" >> "$(dirname "$0")/aws.log"
case "$*" in
  *"--region {}"*) ;;
  "sts "*) ;;
  "s3api head-bucket"*)
    echo "An error occurred (404) when calling the HeadBucket operation: Not Found" >&2
    exit 254 ;;
  *)
    echo "An error occurred (ValidationError) when calling the DescribeStacks operation: Stack with id BucketflowStack-site-assets does not exist" >&2
    exit 254 ;;
esac
{}"#,
        region, FAKE_AWS
    )
}

pub fn config_with(aws: &Path, cdk_script: &Path) -> String {
    format!(
        "aws:\n  program: {}\n  region: us-east-1\ncdk:\n  command: sh {}\n",
        aws.display(),
        cdk_script.display()
    )
}
