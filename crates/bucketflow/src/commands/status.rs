use crate::context::{AppContext, apply_change, resolve};
use crate::output::print_json;
use bucketflow_cloud::{
    BucketRecord, BucketStatus, BucketSyncStatus, Reconciler, SyncAction, SyncReport,
};
use colored::Colorize;

fn status_label(status: BucketStatus) -> colored::ColoredString {
    let text = status.to_string();
    match status {
        BucketStatus::Active => text.green(),
        BucketStatus::Pending | BucketStatus::Deploying => text.yellow(),
        BucketStatus::Failed => text.red(),
        BucketStatus::Deleting => text.magenta(),
    }
}

fn action_label(action: SyncAction) -> colored::ColoredString {
    let text = action.to_string();
    match action {
        SyncAction::None => text.dimmed(),
        SyncAction::Cleanup => text.red(),
        _ => text.yellow(),
    }
}

pub async fn handle_status(ctx: &AppContext, bucket: Option<&str>, json: bool) -> anyhow::Result<()> {
    let db = ctx.state.load().await?;

    let Some(needle) = bucket else {
        if json {
            return print_json(&db.buckets);
        }
        print_records(&db.buckets);
        return Ok(());
    };

    let record = resolve(&db, needle)?;
    let gateway = ctx.gateway_for(record);
    let status = Reconciler::new(&gateway, ctx.settings.stack_prefix())
        .check(record)
        .await?;

    if json {
        return print_json(&status);
    }
    print_sync_status(record, &status);
    if let Some(journal) = db.teardown_progress(&record.id) {
        println!();
        println!("  {}", "Unfinished teardown:".yellow().bold());
        for step in &journal.plan.steps {
            println!("    {:<8} {}", step.status.to_string(), step.label);
        }
    }
    Ok(())
}

pub async fn handle_sync_all(ctx: &AppContext, apply: bool, json: bool) -> anyhow::Result<()> {
    let (lock, mut db) = if apply {
        let (lock, db) = ctx.load_locked().await?;
        (Some(lock), db)
    } else {
        (None, ctx.state.load().await?)
    };

    // Each record is checked in its own region
    let mut reports = Vec::with_capacity(db.buckets.len());
    for record in &db.buckets {
        let gateway = ctx.gateway_for(record);
        let result = Reconciler::new(&gateway, ctx.settings.stack_prefix())
            .check(record)
            .await;
        reports.push(SyncReport::from_check(record, result));
    }

    if json {
        print_json(&reports)?;
    } else if reports.is_empty() {
        println!("{}", "No buckets recorded.".dimmed());
    } else {
        println!("{}", format!("Checked {} bucket(s):", reports.len()).bold());
        for report in &reports {
            match (&report.status, &report.error) {
                (Some(status), _) => println!(
                    "  {} {:<24} {:<10} {}",
                    if status.needs_sync { "●".yellow() } else { "✓".green() },
                    report.name,
                    status_label(status.local_status),
                    action_label(status.recommended_action)
                ),
                (None, Some(error)) => {
                    println!("  {} {:<24} {}", "✗".red(), report.name, error.to_string().red())
                }
                (None, None) => {}
            }
        }
    }

    let mut applied = 0;
    if apply {
        for report in &reports {
            let Some(status) = &report.status else {
                continue;
            };
            if !status.needs_sync {
                continue;
            }
            let Some(record) = db.find_bucket(&report.bucket_id).cloned() else {
                continue;
            };
            apply_change(&mut db, status.change_for(&record, status.recommended_action))?;
            applied += 1;
        }
        if applied > 0 {
            ctx.state.save(&db).await?;
        }
        if !json {
            println!("{}", format!("Applied {} change(s)", applied).green());
        }
    }

    if let Some(lock) = lock {
        lock.release().await?;
    }
    Ok(())
}

pub async fn handle_apply_sync(
    ctx: &AppContext,
    bucket: &str,
    action: Option<SyncAction>,
    json: bool,
) -> anyhow::Result<()> {
    let (lock, mut db) = ctx.load_locked().await?;
    let record = resolve(&db, bucket)?.clone();

    let gateway = ctx.gateway_for(&record);
    let status = Reconciler::new(&gateway, ctx.settings.stack_prefix())
        .check(&record)
        .await?;
    let action = action.unwrap_or(status.recommended_action);

    apply_change(&mut db, status.change_for(&record, action))?;
    ctx.state.save(&db).await?;
    lock.release().await?;

    let current = db.find_bucket(&record.id);
    if json {
        return print_json(&serde_json::json!({
            "bucketId": record.id,
            "action": action,
            "record": current,
        }));
    }
    match current {
        Some(updated) => println!(
            "{} {} {} → {}",
            "✓".green(),
            record.name.cyan(),
            status_label(record.status),
            status_label(updated.status)
        ),
        None => println!("{} {} removed", "✓".green(), record.name.cyan()),
    }
    Ok(())
}

fn print_records(records: &[BucketRecord]) {
    if records.is_empty() {
        println!("{}", "No buckets recorded.".dimmed());
        return;
    }
    println!(
        "{}",
        format!("{:<24} {:<32} {:<14} {:<10} {}", "NAME", "BUCKET", "REGION", "STATUS", "CDN")
            .bold()
    );
    for record in records {
        println!(
            "{:<24} {:<32} {:<14} {:<10} {}",
            record.name,
            record.s3_bucket_name,
            record.region,
            status_label(record.status),
            record.cloud_front_domain.as_deref().unwrap_or("-")
        );
    }
}

fn print_sync_status(record: &BucketRecord, status: &BucketSyncStatus) {
    println!("{}", record.name.cyan().bold());
    println!("  Bucket:       {}", record.s3_bucket_name);
    println!("  Local status: {}", status_label(status.local_status));
    println!(
        "  Stack:        {} ({})",
        status.stack_name,
        status.stack_status.as_deref().unwrap_or("not found")
    );
    if let Some(reason) = &status.stack_status_reason {
        println!("  Reason:       {}", reason.dimmed());
    }
    println!(
        "  S3 bucket:    {}",
        if status.bucket_exists { "exists".green() } else { "missing".red() }
    );
    if let Some(domain) = &status.remote.remote_cloud_front_domain {
        println!("  CDN:          {}", domain);
    }
    if status.cdn_mismatch {
        println!("  {} recorded CDN details differ from the stack outputs", "⚠".yellow());
    }
    println!(
        "  Action:       {}{}",
        action_label(status.recommended_action),
        if status.needs_sync { "  (needs sync)" } else { "" }
    );
}
