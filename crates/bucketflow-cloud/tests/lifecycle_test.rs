//! Record lifecycle across reconciliation, teardown and the record store

use bucketflow_cloud::{
    BucketRecord, BucketStatus, Database, ErrorKind, GatewayOp, InMemoryGateway, RecordChange,
    RecordDisposition, Reconciler, StackStatus, StateManager, StepStatus, SyncAction,
    TeardownPlan, TeardownPolicy, TeardownTarget, TeardownWorkflow,
};
use std::time::Duration;
use tempfile::tempdir;

const PREFIX: &str = "BucketflowStack-";

fn fast_policy() -> TeardownPolicy {
    TeardownPolicy {
        poll_interval: Duration::ZERO,
        ..TeardownPolicy::default()
    }
}

fn deployed() -> InMemoryGateway {
    InMemoryGateway::new()
        .with_stack(
            StackStatus::new("BucketflowStack-site-assets", "CREATE_COMPLETE")
                .with_output("DistributionId", "E42")
                .with_output("DistributionDomainName", "d42.cloudfront.net"),
        )
        .with_bucket("site-assets", vec!["index.html".into(), "css/main.css".into()])
        .with_distribution("E42", true)
}

#[tokio::test]
async fn test_deploy_sync_then_teardown() {
    let dir = tempdir().unwrap();
    let store = StateManager::new(dir.path());
    let gateway = deployed();

    let mut db = Database::new();
    let id = db.insert_bucket(
        BucketRecord::new("p1", "Site", "site-assets", "us-east-1")
            .with_status(BucketStatus::Deploying),
    );
    store.save(&db).await.unwrap();

    // Deployment finished remotely; reconcile the record
    let record = db.find_bucket(&id).unwrap().clone();
    let status = Reconciler::new(&gateway, PREFIX).check(&record).await.unwrap();
    assert_eq!(status.recommended_action, SyncAction::UpdateToActive);

    let RecordChange::Update(active) = status.change_for(&record, status.recommended_action)
    else {
        panic!("expected update");
    };
    assert_eq!(active.cloud_front_distribution_id.as_deref(), Some("E42"));
    db.update_bucket(active.clone()).unwrap();
    store.save(&db).await.unwrap();

    // Tear it all down, journaling every step
    let mut record = active;
    record.set_status(BucketStatus::Deleting);
    db.update_bucket(record.clone()).unwrap();

    let target = TeardownTarget::for_record(&record, PREFIX);
    let workflow = TeardownWorkflow::new(&gateway, fast_policy());
    let mut journaled = 0;
    let plan = workflow
        .run(&target, TeardownPlan::new(), |plan, _| {
            db.record_teardown(&id, plan);
            journaled += 1;
        })
        .await;

    assert_eq!(journaled, 8);
    assert_eq!(plan.disposition(), RecordDisposition::Delete);
    db.remove_bucket(&id);
    store.save(&db).await.unwrap();

    let reloaded = store.load().await.unwrap();
    assert!(reloaded.find_bucket(&id).is_none());
    assert!(reloaded.teardown_progress(&id).is_none());
    assert!(!gateway.has_bucket("site-assets"));
    assert!(!gateway.has_distribution("E42"));
}

#[tokio::test]
async fn test_interrupted_teardown_resumes_from_journal() {
    let dir = tempdir().unwrap();
    let store = StateManager::new(dir.path());
    let gateway = deployed();
    gateway.fail_next(GatewayOp::DeleteBucket, ErrorKind::Transient);

    let mut db = Database::new();
    let id = db.insert_bucket(
        BucketRecord::new("p1", "Site", "site-assets", "us-east-1")
            .with_status(BucketStatus::Deleting)
            .with_distribution("E42", "d42.cloudfront.net"),
    );
    let record = db.find_bucket(&id).unwrap().clone();
    let target = TeardownTarget::for_record(&record, PREFIX);
    let workflow = TeardownWorkflow::new(&gateway, fast_policy());

    let halted = workflow
        .run(&target, TeardownPlan::new(), |plan, _| db.record_teardown(&id, plan))
        .await;
    assert_eq!(halted.disposition(), RecordDisposition::RevertToFailed);
    store.save(&db).await.unwrap();

    // Next process start
    let mut db = store.load().await.unwrap();
    assert_eq!(db.recover_interrupted_teardowns(), vec![id.clone()]);
    assert_eq!(db.find_bucket(&id).unwrap().status, BucketStatus::Failed);

    let journal = db.teardown_progress(&id).unwrap().plan.clone();
    assert_eq!(journal.steps[0].status, StepStatus::Done);
    assert_eq!(journal.steps[2].status, StepStatus::Error);

    let distribution_calls = gateway.call_count(GatewayOp::GetDistributionStatus);
    let resumed = workflow.run(&target, journal.resume(), |_, _| {}).await;

    assert!(resumed.is_complete());
    assert_eq!(
        gateway.call_count(GatewayOp::GetDistributionStatus),
        distribution_calls
    );
    assert!(!gateway.has_stack("BucketflowStack-site-assets"));
}
