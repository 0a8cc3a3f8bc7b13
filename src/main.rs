//! `crates-diff` — audit source changes in published crates.io artifacts.
//!
//! ## Modes
//!
//! - Two published versions:
//!   `crates-diff --crate tokio --initial-version 0.2.22 --final-version 0.3.4`
//! - One version against its repository tag:
//!   `crates-diff --crate tokio --version 1.0.1`
//! - Batch, from a dependency-change summary:
//!   `crates-diff --summary changes.json --output reports.json`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crates_diff::batch::{self, BatchProcessor};
use crates_diff::pipeline::DiffPipeline;
use crates_diff::registry::{HttpRegistry, DEFAULT_REGISTRY};

#[derive(Parser, Debug)]
#[command(name = "crates-diff")]
#[command(version = env!("CARGO_PKG_VERSION"))]
// --version belongs to the single-version diff mode, so clap's auto flag
// must not claim the same id.
#[command(disable_version_flag = true)]
#[command(about = "Diff the published source of two crates.io versions", long_about = None)]
struct Cli {
    /// Name of the crate to diff (e.g. tokio)
    #[arg(long = "crate", value_name = "NAME", conflicts_with = "summary")]
    crate_name: Option<String>,

    /// Older published version (e.g. 0.2.22)
    #[arg(
        long,
        value_name = "VERSION",
        requires = "crate_name",
        requires = "final_version",
        conflicts_with = "version"
    )]
    initial_version: Option<String>,

    /// Newer published version (e.g. 0.3.4)
    #[arg(
        long,
        value_name = "VERSION",
        requires = "crate_name",
        requires = "initial_version",
        conflicts_with = "version"
    )]
    final_version: Option<String>,

    /// Single published version, compared against the repository tag
    #[arg(long, value_name = "VERSION", requires = "crate_name")]
    version: Option<String>,

    /// Dependency-change summary document (batch mode)
    #[arg(long, value_name = "PATH")]
    summary: Option<PathBuf>,

    /// Where to write the list of produced report names (batch mode)
    #[arg(short, long, value_name = "PATH", requires = "summary")]
    output: Option<PathBuf>,

    /// Registry base URL
    #[arg(long, env = "CRATES_DIFF_REGISTRY", default_value = DEFAULT_REGISTRY)]
    registry: String,

    /// Directory for report artifacts
    #[arg(long, value_name = "DIR", default_value = ".")]
    out_dir: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let registry = HttpRegistry::new(&cli.registry);
    let pipeline = DiffPipeline::new(registry, &cli.out_dir);

    if let Some(summary_path) = &cli.summary {
        let summary = batch::load_summary(summary_path)
            .await
            .with_context(|| format!("Failed to load summary {}", summary_path.display()))?;
        let reports = BatchProcessor::new(&pipeline).process(&summary).await;
        for report in &reports {
            println!("{report}");
        }
        if let Some(output) = &cli.output {
            batch::write_report_list(output, &reports)
                .await
                .with_context(|| format!("Failed to write {}", output.display()))?;
        }
        return Ok(());
    }

    let Some(name) = cli.crate_name.as_deref() else {
        anyhow::bail!("either --crate or --summary is required");
    };

    let identifier = match (&cli.initial_version, &cli.final_version, &cli.version) {
        (Some(old), Some(new), None) => pipeline.diff_versions(name, old, new).await?,
        (None, None, Some(version)) => pipeline.diff_repository(name, version).await?,
        _ => anyhow::bail!("provide --initial-version with --final-version, or --version alone"),
    };
    println!("{identifier}");
    Ok(())
}
