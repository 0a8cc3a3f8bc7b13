//! Batch mode: drive the diff pipeline from a dependency-change summary.
//!
//! The summary document is produced by an external build-graph analysis and
//! lists changed dependencies under two optional sections,
//! `target-packages` and `host-packages`. A record qualifies for diffing
//! only when all of the following hold:
//! - its change kind is exactly `"modified"`,
//! - it carries no `workspace-path` marker,
//! - its old version is present,
//! - it is flagged as sourced from the public registry (`crates-io`).
//!
//! One dependency's failure never aborts the batch; it is reported and
//! processing continues, keeping already-produced report identifiers.

use std::path::Path;

use thiserror::Error;
use tracing::{info, warn};

use crate::model::{ChangeSummary, DependencyChangeRecord};
use crate::pipeline::DiffPipeline;
use crate::registry::Registry;

/// Errors reading or writing batch documents.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse summary document: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Reads and parses a summary document from disk.
pub async fn load_summary(path: &Path) -> Result<ChangeSummary, BatchError> {
    let raw = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&raw)?)
}

/// Serializes the produced report identifiers as a JSON list.
pub async fn write_report_list(path: &Path, reports: &[String]) -> Result<(), BatchError> {
    let body = serde_json::to_string_pretty(reports)?;
    tokio::fs::write(path, body).await?;
    Ok(())
}

/// Change records from both sections, original order preserved.
fn all_changes(summary: &ChangeSummary) -> Vec<&DependencyChangeRecord> {
    let mut records = Vec::new();
    for section in [&summary.target_packages, &summary.host_packages] {
        if let Some(changes) = section.as_ref().and_then(|s| s.changed.as_ref()) {
            records.extend(changes.iter());
        }
    }
    records
}

/// Applies the inclusion rules, logging one diagnostic per excluded record.
pub fn qualifying_changes(summary: &ChangeSummary) -> Vec<&DependencyChangeRecord> {
    all_changes(summary)
        .into_iter()
        .filter(|record| {
            if record.change != "modified" {
                info!(name = %record.name, change = %record.change, "skipping: change kind is not 'modified'");
                return false;
            }
            if record.workspace_path.is_some() {
                info!(name = %record.name, "skipping: workspace-local dependency");
                return false;
            }
            if record.old_version.is_none() {
                info!(name = %record.name, "skipping: no old version recorded");
                return false;
            }
            if !record.crates_io {
                // Unsupported dependency source: reported, not fatal
                warn!(name = %record.name, "skipping: dependency is not hosted on the public registry");
                return false;
            }
            true
        })
        .collect()
}

/// Runs the two-version diff pipeline once per qualifying dependency.
pub struct BatchProcessor<'a, R: Registry> {
    pipeline: &'a DiffPipeline<R>,
}

impl<'a, R: Registry> BatchProcessor<'a, R> {
    pub fn new(pipeline: &'a DiffPipeline<R>) -> Self {
        Self { pipeline }
    }

    /// Processes the summary, returning the report identifiers of every
    /// successfully completed diff, in input order.
    ///
    /// Records whose old and new versions are equal despite being flagged
    /// "modified" are skipped silently (with a diagnostic), not treated as
    /// an error. A failing dependency is logged and the batch continues.
    pub async fn process(&self, summary: &ChangeSummary) -> Vec<String> {
        let mut reports = Vec::new();
        for record in qualifying_changes(summary) {
            let Some(old) = record.old_version.as_deref() else {
                continue; // excluded by the filter already
            };
            if old == record.version {
                info!(name = %record.name, version = %record.version, "skipping: version unchanged");
                continue;
            }

            info!(name = %record.name, old, new = %record.version, "diffing dependency");
            match self
                .pipeline
                .diff_versions(&record.name, old, &record.version)
                .await
            {
                Ok(identifier) => reports.push(identifier),
                Err(e) => {
                    warn!(name = %record.name, error = %e, "diff pipeline failed; continuing with next dependency");
                }
            }
        }
        reports
    }
}
