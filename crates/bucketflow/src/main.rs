mod commands;
mod context;
mod output;
mod progress;

use bucketflow_cloud::SyncAction;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bflow")]
#[command(about = "S3 buckets behind CloudFront: deploy, reconcile, tear down", long_about = None)]
struct Cli {
    /// Print machine-readable output (NDJSON events for streaming commands)
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synthesize the CDK app without deploying
    Synth {
        /// S3 bucket name to synthesize a stack for
        #[arg(short, long)]
        bucket: Option<String>,
        /// AWS region
        #[arg(short, long)]
        region: Option<String>,
    },
    /// Deploy a bucket stack and record the result
    Deploy {
        /// S3 bucket name
        bucket: String,
        /// Display name (defaults to the bucket name)
        #[arg(short, long)]
        name: Option<String>,
        /// AWS region (defaults to aws.region in the config)
        #[arg(short, long)]
        region: Option<String>,
        /// Project the record belongs to
        #[arg(short, long, default_value = "default")]
        project: String,
        /// Skip reconciling the record after a successful deploy
        #[arg(long)]
        no_sync: bool,
    },
    /// Show recorded buckets, or the live sync status of one
    Status {
        /// Bucket id, name or S3 bucket name
        bucket: Option<String>,
    },
    /// Check every recorded bucket against its remote resources
    #[command(name = "sync-all")]
    SyncAll {
        /// Apply each recommended action to the records
        #[arg(long)]
        apply: bool,
    },
    /// Apply a sync action to one record
    #[command(name = "apply-sync")]
    ApplySync {
        /// Bucket id, name or S3 bucket name
        bucket: String,
        /// Action to apply instead of the recommended one
        #[arg(short, long)]
        action: Option<SyncAction>,
    },
    /// Delete a bucket's distribution, objects, bucket and stack
    Teardown {
        /// Bucket id, name or S3 bucket name
        bucket: String,
        /// Run without confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Estimate monthly cost from usage counters
    Cost {
        /// Stored bytes
        #[arg(long, default_value_t = 0, conflicts_with = "storage_gb")]
        storage_bytes: u64,
        /// Stored gigabytes
        #[arg(long)]
        storage_gb: Option<f64>,
        /// PUT/COPY/POST requests
        #[arg(long, default_value_t = 0)]
        writes: u64,
        /// GET requests
        #[arg(long, default_value_t = 0)]
        reads: u64,
        /// DELETE requests
        #[arg(long, default_value_t = 0)]
        deletes: u64,
        /// LIST requests
        #[arg(long, default_value_t = 0)]
        lists: u64,
        /// Gigabytes served through the CDN
        #[arg(long, default_value_t = 0.0)]
        transfer_gb: f64,
    },
    /// Suggest fixes for a deployment error (reads stdin when no text is given)
    Diagnose {
        /// Error output to analyze
        text: Option<String>,
        /// Command that produced the error
        #[arg(short, long)]
        command: Option<String>,
    },
    /// Create a folder in a bucket
    Mkdir {
        /// Bucket id, name or S3 bucket name
        bucket: String,
        /// Folder path
        path: String,
    },
    /// Move an object within a bucket
    Mv {
        /// Bucket id, name or S3 bucket name
        bucket: String,
        /// Source key
        from: String,
        /// Destination key
        to: String,
    },
    /// Show the AWS identity in use
    Whoami,
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so NDJSON on stdout stays clean
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    // No config needed
    match &cli.command {
        Commands::Version => {
            println!("bucketflow {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Commands::Diagnose { text, command } => {
            return commands::diagnose::handle(text.clone(), command.clone(), cli.json);
        }
        _ => {}
    }

    let ctx = context::AppContext::load()?;
    let json = cli.json;

    match cli.command {
        Commands::Synth { bucket, region } => {
            commands::deploy::handle_synth(&ctx, bucket, region, json).await?;
        }
        Commands::Deploy {
            bucket,
            name,
            region,
            project,
            no_sync,
        } => {
            commands::deploy::handle_deploy(
                &ctx,
                commands::deploy::DeployArgs {
                    bucket,
                    name,
                    region,
                    project,
                    sync: !no_sync,
                },
                json,
            )
            .await?;
        }
        Commands::Status { bucket } => {
            commands::status::handle_status(&ctx, bucket.as_deref(), json).await?;
        }
        Commands::SyncAll { apply } => {
            commands::status::handle_sync_all(&ctx, apply, json).await?;
        }
        Commands::ApplySync { bucket, action } => {
            commands::status::handle_apply_sync(&ctx, &bucket, action, json).await?;
        }
        Commands::Teardown { bucket, yes } => {
            commands::teardown::handle(&ctx, &bucket, yes, json).await?;
        }
        Commands::Cost {
            storage_bytes,
            storage_gb,
            writes,
            reads,
            deletes,
            lists,
            transfer_gb,
        } => {
            let usage = bucketflow_cloud::Usage {
                storage_bytes: storage_gb.map(commands::cost::gb_to_bytes).unwrap_or(storage_bytes),
                write_count: writes,
                read_count: reads,
                delete_count: deletes,
                list_count: lists,
                transfer_bytes: commands::cost::gb_to_bytes(transfer_gb),
            };
            commands::cost::handle(&ctx, &usage, json)?;
        }
        Commands::Mkdir { bucket, path } => {
            commands::objects::handle_mkdir(&ctx, &bucket, &path, json).await?;
        }
        Commands::Mv { bucket, from, to } => {
            commands::objects::handle_mv(&ctx, &bucket, &from, &to, json).await?;
        }
        Commands::Whoami => {
            commands::whoami::handle(&ctx, json).await?;
        }
        Commands::Version | Commands::Diagnose { .. } => {
            unreachable!("handled before config loading");
        }
    }

    Ok(())
}
