use crate::context::AppContext;
use crate::output::print_json;
use bucketflow_cloud::{Database, MoveOutcome, create_folder_marker, move_object};
use bucketflow_cloud_aws::AwsGateway;
use colored::Colorize;

struct Target {
    record_id: Option<String>,
    bucket: String,
    gateway: AwsGateway,
}

/// Recorded bucket id (if any), the S3 bucket name for `needle` and a
/// gateway in its region. Unrecorded names are used as S3 bucket names in
/// the configured region.
fn target(ctx: &AppContext, db: &Database, needle: &str) -> Target {
    match db.resolve_bucket(needle) {
        Some(record) => Target {
            record_id: Some(record.id.clone()),
            bucket: record.s3_bucket_name.clone(),
            gateway: ctx.gateway_for(record),
        },
        None => {
            tracing::debug!("{} is not recorded, using it as a bucket name", needle);
            Target {
                record_id: None,
                bucket: needle.to_string(),
                gateway: ctx.gateway(),
            }
        }
    }
}

pub async fn handle_mkdir(ctx: &AppContext, bucket: &str, path: &str, json: bool) -> anyhow::Result<()> {
    let (lock, mut db) = ctx.load_locked().await?;
    let Target {
        record_id,
        bucket: s3_bucket,
        gateway,
    } = target(ctx, &db, bucket);
    let key = create_folder_marker(&gateway, &s3_bucket, path).await?;

    if let Some(id) = &record_id {
        db.insert_file(id, &key, 0);
        ctx.state.save(&db).await?;
    }
    lock.release().await?;

    if json {
        return print_json(&serde_json::json!({ "bucket": s3_bucket, "key": key }));
    }
    println!("{} Created {}", "✓".green(), format!("s3://{}/{}", s3_bucket, key).cyan());
    Ok(())
}

pub async fn handle_mv(
    ctx: &AppContext,
    bucket: &str,
    from: &str,
    to: &str,
    json: bool,
) -> anyhow::Result<()> {
    let (lock, mut db) = ctx.load_locked().await?;
    let Target {
        record_id,
        bucket: s3_bucket,
        gateway,
    } = target(ctx, &db, bucket);
    let outcome = move_object(&gateway, &s3_bucket, from, to).await?;

    // The destination exists either way, so the index follows it
    if let Some(id) = &record_id {
        if db.rename_file_key(id, from, to) {
            ctx.state.save(&db).await?;
        }
    }
    lock.release().await?;

    let duplicated = matches!(outcome, MoveOutcome::Duplicated { .. });
    if json {
        return print_json(&serde_json::json!({
            "bucket": s3_bucket,
            "from": from,
            "to": to,
            "duplicated": duplicated,
        }));
    }

    match outcome {
        MoveOutcome::Moved => println!("{} {} → {}", "✓".green(), from, to.cyan()),
        MoveOutcome::Duplicated { source_error } => {
            println!("{} Copied {} → {}", "⚠".yellow(), from, to.cyan());
            println!(
                "  {} the source could not be deleted ({}); it now exists at both keys.",
                "Note:".yellow(),
                source_error
            );
        }
    }
    Ok(())
}
