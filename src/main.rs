use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use school_import::config::Config;
use school_import::domain::{DataType, ImportBatch};
use school_import::logging;
use school_import::metrics;
use school_import::pipeline::{ApplierRegistry, ApprovalOutcome, ReviewOrchestrator};
use school_import::storage::SqliteCatalog;

#[derive(Parser)]
#[command(name = "school_import")]
#[command(about = "Review and apply bulk school data imports")]
#[command(version = "0.1.0")]
struct Cli {
    /// Configuration file (default: ./school_import.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Record metrics and print a Prometheus snapshot on exit
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a file for review
    Submit {
        /// ClassList, class-list, or the form label ("Liste des Classes")
        #[arg(long)]
        data_type: String,
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        submitted_by: String,
    },
    /// List batches, most recent first
    List,
    /// Show one batch
    Show { id: String },
    /// Decode a batch without applying it
    Preview { id: String },
    /// Approve a pending batch and apply it
    Approve {
        id: String,
        #[arg(long)]
        reviewer: String,
    },
    /// Reject a pending batch
    Reject {
        id: String,
        #[arg(long)]
        reviewer: String,
    },
    /// Finish batches left approved by an interrupted run
    Resume,
}

fn print_batch_line(batch: &ImportBatch) {
    println!(
        "{}  {:<9} {:<22} {:<28} {} ({})",
        batch.submitted_at.format("%Y-%m-%d %H:%M:%S"),
        batch.status,
        batch.data_type,
        batch.file_name,
        batch.id,
        batch.submitted_by
    );
}

fn print_outcome(outcome: &ApprovalOutcome) {
    println!("\n📊 Import results for {}:", outcome.batch.id);
    println!("   Data type: {}", outcome.batch.data_type.display_label());
    println!("   Rows decoded: {}", outcome.rows_decoded);
    println!("   Created: {}", outcome.stats.created);
    println!("   Updated: {}", outcome.stats.updated);
    if !outcome.dispatched {
        println!("   ⚠️  No applier registered; nothing was written");
    }
    if !outcome.skipped.is_empty() {
        println!("\n⚠️  Skipped rows (column count mismatch):");
        for skipped in &outcome.skipped {
            println!(
                "   - line {}: {} columns, expected {}",
                skipped.line, skipped.found, skipped.expected
            );
        }
    }
}

async fn run(cli: Cli, config: Config) -> Result<()> {
    let catalog = SqliteCatalog::open_at_root(&config.storage.data_root).with_context(|| {
        format!(
            "Failed to open catalog under {}",
            config.storage.data_root.display()
        )
    })?;
    let registry = ApplierRegistry::with_collections(&catalog.collections());
    let review = ReviewOrchestrator::new(
        Arc::new(catalog.batch_store()),
        Arc::new(registry),
        config.review_options(),
    );

    match cli.command {
        Commands::Submit {
            data_type,
            file,
            submitted_by,
        } => {
            let data_type: DataType = data_type.parse()?;
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let file_name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| file.display().to_string());

            let batch = review
                .submit(data_type, file_name, content, submitted_by)
                .await?;
            println!("📥 Submitted {} as {} (pending review)", batch.file_name, batch.id);
        }
        Commands::List => {
            let batches = review.list().await?;
            if batches.is_empty() {
                println!("No import batches.");
            }
            for batch in &batches {
                print_batch_line(batch);
            }
        }
        Commands::Show { id } => {
            let batch = review
                .get(&id)
                .await?
                .with_context(|| format!("Import batch not found: {}", id))?;
            println!("{}", serde_json::to_string_pretty(&batch)?);
        }
        Commands::Preview { id } => {
            let preview = review.preview(&id).await?;
            println!("Columns: {}", preview.headers.join(", "));
            println!("Rows: {}", preview.records.len());
            for skipped in &preview.skipped {
                println!(
                    "   - line {} would be skipped: {} columns, expected {}",
                    skipped.line, skipped.found, skipped.expected
                );
            }
        }
        Commands::Approve { id, reviewer } => {
            info!("Approving batch {}", id);
            let outcome = review
                .approve(&id, &reviewer)
                .await
                .with_context(|| format!("Batch {} was not applied", id))?;
            print_outcome(&outcome);
        }
        Commands::Reject { id, reviewer } => {
            let batch = review.reject(&id, &reviewer).await?;
            println!("🚫 Rejected {} ({})", batch.id, batch.file_name);
        }
        Commands::Resume => {
            let resumed = review.resume_interrupted().await?;
            if resumed.is_empty() {
                println!("No interrupted batches.");
            }
            for outcome in &resumed {
                print_outcome(outcome);
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let _guard = logging::init_logging(&config.logging).context("Failed to initialize logging")?;

    if cli.metrics && metrics::init_metrics().is_none() {
        warn!("Metrics requested but no recorder could be installed");
    }
    let print_metrics = cli.metrics;

    let result = run(cli, config).await;

    if print_metrics {
        if let Some(snapshot) = metrics::render() {
            println!("\n{}", snapshot);
        }
    }
    result
}
