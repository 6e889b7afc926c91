use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cpl_core::SearchCriteria;
use cpl_sync::PipelineConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "cpl-cli")]
#[command(about = "Candidate Pipeline Ledger command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Merge enabled source exports into the candidate database.
    Sync,
    /// Deduplicate a single CSV file in place or into `--output`.
    Dedup {
        input: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
        /// Drop exact repeats instead of merging clusters.
        #[arg(long)]
        keep_first: bool,
    },
    /// Look up candidates in the database by substring.
    Search {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        position: Option<String>,
    },
    /// Summarize the most recent runs.
    Report {
        #[arg(long, default_value_t = 5)]
        runs: usize,
    },
    Snapshots {
        #[command(subcommand)]
        action: Option<SnapshotCommand>,
    },
}

#[derive(Debug, Subcommand)]
enum SnapshotCommand {
    List,
    /// Copy a snapshot back over the database.
    Restore { file_name: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Sync) {
        Commands::Sync => {
            let summary = cpl_sync::run_sync_once_from_env().await?;
            println!(
                "sync complete: run_id={} sources={}/{} rows={}->{} merged={} conflicts={} reports={}",
                summary.run_id,
                summary.loaded_sources,
                summary.enabled_sources,
                summary.input_rows,
                summary.output_rows,
                summary.merged_clusters,
                summary.conflicting_fields,
                summary.reports_dir
            );
        }
        Commands::Dedup {
            input,
            output,
            keep_first,
        } => {
            let summary = cpl_sync::dedup_file(&input, output.as_deref(), keep_first).await?;
            println!(
                "dedup complete: {} rows -> {} rows ({} removed) written to {}",
                summary.input_rows,
                summary.output_rows,
                summary.removed(),
                summary.output.display()
            );
        }
        Commands::Search {
            name,
            email,
            phone,
            position,
        } => {
            let store = PipelineConfig::from_env().snapshot_store();
            let table = store
                .load_database()
                .await?
                .with_context(|| format!("no candidate database at {}", store.database_path().display()))?;
            let criteria = SearchCriteria {
                name: Some(name),
                email,
                phone,
                position,
            };
            let hits = table.find_candidates(&criteria);
            for (_, record) in &hits {
                println!("{}", serde_json::to_string(record).context("serializing candidate")?);
            }
            eprintln!("{} match(es)", hits.len());
        }
        Commands::Report { runs } => {
            let root = PipelineConfig::from_env().workspace_root;
            println!("{}", cpl_sync::report_runs_markdown(runs, Some(root))?);
        }
        Commands::Snapshots { action } => {
            let store = PipelineConfig::from_env().snapshot_store();
            match action.unwrap_or(SnapshotCommand::List) {
                SnapshotCommand::List => {
                    for entry in store.list_snapshots().await? {
                        println!("{}", entry.file_name);
                    }
                }
                SnapshotCommand::Restore { file_name } => {
                    let stored = store.restore(&file_name).await?;
                    println!(
                        "restored {} ({} rows) to {}",
                        file_name,
                        stored.rows,
                        stored.path.display()
                    );
                }
            }
        }
    }

    Ok(())
}

/// Logs go to stderr so command output stays pipeable.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let log_json = std::env::var("CPL_LOG_JSON")
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(false);
    if log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
