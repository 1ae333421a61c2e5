use crate::context::{AppContext, resolve};
use crate::output::print_json;
use crate::progress::TeardownProgress;
use bucketflow_cloud::{
    BucketStatus, RecordDisposition, StepStatus, TeardownPlan, TeardownTarget, TeardownWorkflow,
};
use colored::Colorize;
use tokio::sync::mpsc;

pub async fn handle(ctx: &AppContext, bucket: &str, yes: bool, json: bool) -> anyhow::Result<()> {
    let (lock, mut db) = ctx.load_locked().await?;
    let mut record = resolve(&db, bucket)?.clone();
    let prefix = ctx.settings.stack_prefix().to_string();
    let target = TeardownTarget::for_record(&record, &prefix);

    let plan = match db.teardown_progress(&record.id) {
        Some(journal) => journal.plan.clone().resume(),
        None => TeardownPlan::new(),
    };

    if !yes {
        println!("{}", format!("Teardown of {}", record.name).bold());
        println!("  Bucket: {}", target.bucket.cyan());
        println!("  Stack:  {}", target.stack_name.cyan());
        if let Some(id) = &target.distribution_id {
            println!("  CDN:    {}", id.cyan());
        }
        println!();
        for step in &plan.steps {
            let mark = if step.status == StepStatus::Done { "✓".green() } else { "•".normal() };
            println!("  {} {}", mark, step.label);
        }
        println!();
        println!(
            "{}",
            "Warning: every object in the bucket will be deleted.".yellow()
        );
        println!("Pass --yes to run it.");
        lock.release().await?;
        return Ok(());
    }

    record.set_status(BucketStatus::Deleting);
    db.update_bucket(record.clone())?;
    db.record_teardown(&record.id, &plan);
    ctx.state.save(&db).await?;

    let gateway = ctx.gateway_for(&record);
    let workflow = TeardownWorkflow::new(&gateway, ctx.settings.teardown.clone());
    let progress = TeardownProgress::new(&record.name, json);

    // Persist every step transition so an interrupted run can resume
    let (tx, mut rx) = mpsc::unbounded_channel::<TeardownPlan>();
    let progress_ref = &progress;
    let run = workflow.run(&target, plan, move |plan, step| {
        progress_ref.step(step);
        if tx.send(plan.clone()).is_err() {
            tracing::debug!("Journal writer gone");
        }
    });
    let journal = async {
        while let Some(plan) = rx.recv().await {
            db.record_teardown(&record.id, &plan);
            if let Err(e) = ctx.state.save(&db).await {
                tracing::warn!("Could not persist teardown progress: {}", e);
            }
        }
    };
    let (plan, ()) = tokio::join!(run, journal);

    let disposition = plan.disposition();
    match disposition {
        RecordDisposition::Delete => {
            db.remove_bucket(&record.id);
            progress.finish(&format!("{} torn down ✓", record.name));
        }
        RecordDisposition::RevertToFailed | RecordDisposition::Unchanged => {
            record.set_status(BucketStatus::Failed);
            db.update_bucket(record.clone())?;
            db.record_teardown(&record.id, &plan);
            progress.finish(&format!("{} teardown halted", record.name));
        }
    }
    ctx.state.save(&db).await?;
    lock.release().await?;

    if json {
        print_json(&serde_json::json!({
            "bucketId": record.id,
            "complete": plan.is_complete(),
            "steps": plan.steps,
        }))?;
    }

    match plan.failed_step() {
        None if disposition == RecordDisposition::Delete => Ok(()),
        Some(step) => anyhow::bail!(
            "Teardown stopped at '{}': {}\nRe-run {} to resume from this step.",
            step.label,
            step.error.as_deref().unwrap_or("unknown error"),
            format!("bflow teardown {} --yes", record.s3_bucket_name).cyan()
        ),
        None => anyhow::bail!("Teardown did not finish; re-run to resume"),
    }
}
