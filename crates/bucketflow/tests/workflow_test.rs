//! End-to-end runs against stub `aws` and `cdk` scripts
#![cfg(unix)]

mod common;

use common::{FAKE_AWS, TestProject, config_with, regional_aws};
use predicates::prelude::*;
use serde_json::{Value, json};
use serial_test::serial;
use std::fs;

fn project_with_cdk(cdk_body: &str) -> TestProject {
    let project = TestProject::new();
    let aws = project.write_script("aws", FAKE_AWS);
    let cdk = project.write_script("cdk.sh", cdk_body);
    project.write_config(&config_with(&aws, &cdk));
    project
}

fn ndjson(stdout: &[u8]) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(stdout)
        .lines()
        .filter(|l| l.starts_with('{'))
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

#[test]
#[serial]
fn test_whoami() {
    let project = project_with_cdk("exit 0");
    project
        .bflow()
        .arg("whoami")
        .assert()
        .success()
        .stdout(predicate::str::contains("123456789012"));
}

#[test]
#[serial]
fn test_deploy_streams_events_and_activates_record() {
    let project = project_with_cdk(
        r#"echo '{"message":"Synthesizing BucketflowStack-site-assets","level":"info"}'
echo "BucketflowStack-site-assets: deploying... [1/1]" >&2
echo '{"message":"Deployed","level":"success"}'"#,
    );

    let output = project
        .bflow()
        .args(["deploy", "site-assets", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let events = ndjson(&output.stdout);
    assert_eq!(events[0]["level"], "command");
    assert!(events[0]["message"].as_str().unwrap().contains("deploy BucketflowStack-site-assets"));
    assert!(events.iter().any(|e| e["message"] == "Deployed"));
    assert!(events.iter().any(|e| e["message"].as_str().unwrap().contains("deploying...")));
    let last = events.last().unwrap();
    assert_eq!(last["type"], "result");
    assert_eq!(last["status"], "ok");

    // Post-deploy sync copied the stack outputs into the record
    let output = project.bflow().args(["status", "--json"]).output().unwrap();
    let records: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(records[0]["s3BucketName"], "site-assets");
    assert_eq!(records[0]["status"], "active");
    assert_eq!(records[0]["cloudFrontDomain"], "d111.cloudfront.net");
    assert_eq!(records[0]["cloudFrontDistributionId"], "E2ABCDEF");
}

#[test]
#[serial]
fn test_failed_deploy_reports_intelligence() {
    let project = project_with_cdk(
        r#"echo "Unable to locate credentials. You can configure credentials by running aws configure." >&2
exit 1"#,
    );

    let output = project
        .bflow()
        .args(["deploy", "site-assets", "--json"])
        .output()
        .unwrap();
    assert!(!output.status.success());

    let events = ndjson(&output.stdout);
    let result = events.iter().find(|e| e["type"] == "result").unwrap();
    assert_eq!(result["status"], "error");
    let intelligence = events.iter().find(|e| e["type"] == "error-intelligence").unwrap();
    assert_eq!(intelligence["command"], "aws sts get-caller-identity");

    project
        .bflow()
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("failed"));
}

#[test]
#[serial]
fn test_failed_result_line_fails_deploy() {
    let project = project_with_cdk(
        r#"echo '{"type":"result","status":"error","level":"error","message":"Stack rolled back"}'
exit 0"#,
    );

    project
        .bflow()
        .args(["deploy", "site-assets"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Stack rolled back"));
}

#[test]
#[serial]
fn test_sync_all_reports_each_record() {
    let project = project_with_cdk("exit 0");
    project
        .bflow()
        .args(["deploy", "site-assets", "--no-sync"])
        .assert()
        .success();

    // Still deploying locally, complete remotely
    let output = project.bflow().args(["sync-all", "--json"]).output().unwrap();
    assert!(output.status.success());
    let reports: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(reports[0]["status"]["recommendedAction"], "update-to-active");
    assert_eq!(reports[0]["status"]["needsSync"], true);

    project
        .bflow()
        .args(["sync-all", "--apply"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Applied 1 change(s)"));

    project
        .bflow()
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("active"));
}

#[test]
#[serial]
fn test_teardown_without_yes_only_previews() {
    let project = project_with_cdk("exit 0");
    project
        .bflow()
        .args(["deploy", "site-assets"])
        .assert()
        .success();

    project
        .bflow()
        .args(["teardown", "site-assets"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Empty S3 bucket"))
        .stdout(predicate::str::contains("--yes"));

    // Nothing changed
    project
        .bflow()
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("site-assets"));
}

#[test]
#[serial]
fn test_synth_streams_without_touching_the_store() {
    let project = project_with_cdk(r#"echo "Resources:""#);
    project
        .bflow()
        .args(["synth", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"message\":\"Resources:\""));

    assert!(!project.data_dir().join("db.json").exists());
}

#[test]
#[serial]
fn test_records_are_checked_in_their_own_region() {
    let project = TestProject::new();
    let aws = project.write_script("aws", &regional_aws("eu-west-1"));
    let cdk = project.write_script("cdk.sh", "exit 0");
    // Configured region is us-east-1
    project.write_config(&config_with(&aws, &cdk));

    project
        .bflow()
        .args(["deploy", "site-assets", "--region", "eu-west-1"])
        .assert()
        .success();

    let output = project.bflow().args(["status", "--json"]).output().unwrap();
    let records: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(records[0]["region"], "eu-west-1");
    assert_eq!(records[0]["status"], "active");
    assert_eq!(records[0]["cloudFrontDistributionId"], "E2ABCDEF");

    // A live stack in another region is not mistaken for a missing one
    project
        .bflow()
        .args(["sync-all", "--apply"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Applied 0 change(s)"));
    project
        .bflow()
        .args(["status", "site-assets"])
        .assert()
        .success()
        .stdout(predicate::str::contains("CREATE_COMPLETE"));

    let log = fs::read_to_string(project.path().join("aws.log")).unwrap();
    let stack_calls: Vec<&str> = log.lines().filter(|l| l.starts_with("cloudformation")).collect();
    assert!(!stack_calls.is_empty());
    for call in stack_calls {
        assert!(call.contains("--region eu-west-1"), "wrong region: {}", call);
    }
}

#[test]
#[serial]
fn test_burst_of_output_is_streamed_without_loss() {
    let project =
        project_with_cdk(r#"awk 'BEGIN { for (i = 0; i < 5000; i++) print "line " i }'"#);

    let output = project.bflow().args(["synth", "--json"]).output().unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let events = ndjson(&output.stdout);
    let lines: Vec<&str> = events
        .iter()
        .filter_map(|e| e["message"].as_str())
        .filter(|m| m.starts_with("line "))
        .collect();
    assert_eq!(lines.len(), 5000);
    assert_eq!(lines[0], "line 0");
    assert_eq!(lines[4999], "line 4999");
    assert_eq!(events.last().unwrap()["type"], "result");
}

#[test]
#[serial]
fn test_interrupted_teardown_is_recovered_by_sync_all() {
    let project = TestProject::new();
    // Stack still changing, so sync-all itself recommends nothing
    let aws = project.write_script("aws", &FAKE_AWS.replace("CREATE_COMPLETE", "UPDATE_IN_PROGRESS"));
    let cdk = project.write_script("cdk.sh", "exit 0");
    project.write_config(&config_with(&aws, &cdk));
    project
        .bflow()
        .args(["deploy", "site-assets", "--no-sync"])
        .assert()
        .success();

    // A teardown that died during its second step
    let db_path = project.data_dir().join("db.json");
    let mut db: Value = serde_json::from_str(&fs::read_to_string(&db_path).unwrap()).unwrap();
    let id = db["buckets"][0]["id"].as_str().unwrap().to_string();
    db["buckets"][0]["status"] = json!("deleting");
    db["teardowns"][&id] = json!({
        "bucketId": id,
        "plan": { "steps": [
            { "id": "distribution", "label": "Disable and delete CloudFront distribution", "status": "done" },
            { "id": "empty-bucket", "label": "Empty S3 bucket", "status": "running" },
            { "id": "delete-bucket", "label": "Delete S3 bucket", "status": "pending" },
            { "id": "delete-stack", "label": "Delete CloudFormation stack", "status": "pending" }
        ]},
        "startedAt": "2026-01-01T00:00:00Z",
        "updatedAt": "2026-01-01T00:00:00Z"
    });
    fs::write(&db_path, serde_json::to_string_pretty(&db).unwrap()).unwrap();

    project.bflow().args(["sync-all", "--apply"]).assert().success();

    let db: Value = serde_json::from_str(&fs::read_to_string(&db_path).unwrap()).unwrap();
    assert_eq!(db["buckets"][0]["status"], "failed");
    // Journal kept so the next teardown resumes
    assert_eq!(db["teardowns"][&id]["plan"]["steps"][0]["status"], "done");
}
