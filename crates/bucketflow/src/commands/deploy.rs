use crate::context::{AppContext, apply_change};
use crate::output;
use anyhow::Context;
use bucketflow_cloud::{BucketRecord, BucketStatus, Database, Reconciler};
use bucketflow_deploy::{DeployError, DeployRequest, RunOutcome, Runner};
use colored::Colorize;

pub struct DeployArgs {
    pub bucket: String,
    pub name: Option<String>,
    pub region: Option<String>,
    pub project: String,
    pub sync: bool,
}

pub async fn handle_synth(
    ctx: &AppContext,
    bucket: Option<String>,
    region: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let mut request = DeployRequest::synth();
    request.s3_bucket_name = bucket;
    request.region = ctx.region(region);

    let invocation = ctx
        .cdk()
        .invocation(&request)
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;

    if !json {
        println!("{}", "Synthesizing CDK app...".blue().bold());
    }
    let outcome = output::stream_run(&Runner::default(), &invocation, json)
        .await
        .map_err(run_error)?;
    finish(&outcome, "Synth", json)
}

pub async fn handle_deploy(ctx: &AppContext, args: DeployArgs, json: bool) -> anyhow::Result<()> {
    let region = ctx.region(args.region.clone()).ok_or_else(|| {
        anyhow::anyhow!("No region given. Pass --region or set aws.region in bucketflow.yaml")
    })?;
    let request = DeployRequest::deploy(&args.bucket, &region);
    let invocation = ctx
        .cdk()
        .invocation(&request)
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;

    let (lock, mut db) = ctx.load_locked().await?;

    let record_id = prepare_record(&mut db, &args, &region)?;
    ctx.state.save(&db).await?;

    if !json {
        println!(
            "{}",
            format!("Deploying {} to {}...", args.bucket, region).blue().bold()
        );
    }
    let outcome = output::stream_run(&Runner::default(), &invocation, json)
        .await
        .map_err(run_error);

    // Record the outcome even when the stream broke
    let mut record = db
        .find_bucket(&record_id)
        .cloned()
        .with_context(|| format!("bucket record {} vanished during deploy", record_id))?;

    match &outcome {
        Ok(outcome) if outcome.success && args.sync => {
            let gateway = ctx.gateway_for(&record);
            let reconciler = Reconciler::new(&gateway, ctx.settings.stack_prefix());
            match reconciler.check(&record).await {
                Ok(status) => {
                    tracing::info!(
                        "Post-deploy sync for {}: {}",
                        record.s3_bucket_name,
                        status.recommended_action
                    );
                    apply_change(&mut db, status.change_for(&record, status.recommended_action))?;
                }
                Err(e) => {
                    tracing::warn!("Post-deploy sync failed: {}", e);
                    if !json {
                        println!(
                            "  {} Could not read the stack back ({}). Run {} later.",
                            "⚠".yellow(),
                            e,
                            "bflow sync-all --apply".cyan()
                        );
                    }
                }
            }
        }
        Ok(outcome) if outcome.success => {}
        Ok(outcome) if outcome.cancelled => {
            // The stack may still be changing; leave the record for sync-all
            if !json {
                println!(
                    "  {} Deploy cancelled. Run {} once the stack settles.",
                    "⚠".yellow(),
                    "bflow sync-all --apply".cyan()
                );
            }
        }
        _ => {
            record.set_status(BucketStatus::Failed);
            db.update_bucket(record)?;
        }
    }

    ctx.state.save(&db).await?;
    lock.release().await?;

    finish(&outcome?, "Deploy", json)
}

/// Find or create the record for this deploy and mark it deploying
fn prepare_record(db: &mut Database, args: &DeployArgs, region: &str) -> anyhow::Result<String> {
    if let Some(existing) = db.resolve_bucket(&args.bucket) {
        let mut record = existing.clone();
        if record.region != region {
            anyhow::bail!(
                "Bucket {} is recorded in {}, not {}",
                record.s3_bucket_name,
                record.region,
                region
            );
        }
        record.set_status(BucketStatus::Deploying);
        let id = record.id.clone();
        db.update_bucket(record)?;
        return Ok(id);
    }

    let project_id = match db.projects.iter().find(|p| p.name == args.project) {
        Some(project) => project.id.clone(),
        None => db.insert_project(&args.project, None),
    };
    let name = args.name.clone().unwrap_or_else(|| args.bucket.clone());
    let record = BucketRecord::new(project_id, name, &args.bucket, region)
        .with_status(BucketStatus::Deploying);
    Ok(db.insert_bucket(record))
}

fn run_error(e: DeployError) -> anyhow::Error {
    if !e.captured().is_empty() {
        tracing::debug!("{} events captured before the failure", e.captured().len());
    }
    anyhow::anyhow!(e.user_message())
}

fn finish(outcome: &RunOutcome, what: &str, json: bool) -> anyhow::Result<()> {
    if outcome.success {
        if !json {
            println!("{}", format!("✓ {} completed", what).green().bold());
        }
        return Ok(());
    }
    if outcome.cancelled {
        anyhow::bail!("{} cancelled", what);
    }
    anyhow::bail!(
        "{} failed: {}",
        what,
        outcome
            .last_error_message
            .as_deref()
            .unwrap_or("unknown error")
    )
}
