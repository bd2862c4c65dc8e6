use std::env;
use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tracklog_kernel::config::TrackerConfig;
use tracklog_kernel::log::{JsonYearLogStore, YearLogStore};
use tracklog_kernel::reconcile::{Reconciler, RunReport};
use tracklog_kernel::replay::{replay, size_history, stats};
use tracklog_kernel::report::ReportSink;
use tracklog_kernel::snapshot::JsonSnapshotStore;

mod export_source;
mod reporter;

use export_source::ExportDirSource;
use reporter::JsonReporter;

/// Tracklog collection history CLI
#[derive(Parser, Debug)]
#[command(name = "tracklog")]
#[command(about = "Track collection membership over time", long_about = None)]
struct Cli {
    /// Path to tracker config JSON
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding snapshots, year logs and reports
    #[arg(long, global = true, default_value = ".")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Diff every collection against its snapshot and merge the changes
    Reconcile {
        /// Directory of exported playlist-items pages
        #[arg(long)]
        source_dir: PathBuf,
    },

    /// Rebuild year logs from the full addition history
    Backfill {
        /// Directory of exported playlist-items pages
        #[arg(long)]
        source_dir: PathBuf,
    },

    /// Replay year logs into size history
    Replay,

    /// Current rankings, yearly most-added and scores
    Stats,
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_env("TRACKLOG_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let format = env::var("TRACKLOG_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);
    match format.as_str() {
        "json" => registry
            .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
            .init(),
        _ => registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .init(),
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<TrackerConfig> {
    let config = match path {
        Some(path) => {
            let data = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str::<TrackerConfig>(&data)
                .with_context(|| format!("failed to parse {}", path.display()))?
        }
        None => TrackerConfig::default_config(),
    };
    config.validate()?;
    Ok(config)
}

fn finish(report: &RunReport) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    if !report.is_clean() {
        bail!("run completed with failures");
    }
    Ok(())
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    let snapshots = JsonSnapshotStore::new(&cli.data_dir, config.snapshot_prefix.clone());
    let logs = JsonYearLogStore::new(&cli.data_dir, config.log_prefix.clone());
    let mut reporter = JsonReporter::new(&cli.data_dir, config.log_prefix.clone());

    match cli.command {
        Command::Reconcile { source_dir } => {
            let source = ExportDirSource::new(source_dir);
            let mut reconciler = Reconciler::new(config, snapshots, logs)?;
            let report = reconciler.reconcile(&source, &mut reporter, Utc::now());
            finish(&report)
        }
        Command::Backfill { source_dir } => {
            let source = ExportDirSource::new(source_dir);
            let mut reconciler = Reconciler::new(config, snapshots, logs)?;
            let report = reconciler.backfill(&source, &mut reporter)?;
            finish(&report)
        }
        Command::Replay => {
            let all = logs.load_all()?;
            let state = replay(&all, config.top_yearly);
            if let Err(e) = reporter.size_history(&size_history(&state.size_series)) {
                warn!(error = %e, "size history not written");
            }
            println!("{}", serde_json::to_string_pretty(&state)?);
            Ok(())
        }
        Command::Stats => {
            let report = stats(&config, &snapshots, &logs)?;
            if let Err(e) = reporter.stats(&report) {
                warn!(error = %e, "stats not written");
            }
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}
