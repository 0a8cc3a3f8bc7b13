//! Turns two materialized source trees into reviewable diff artifacts.
//!
//! For a label `L` the orchestrator writes three sibling files into its
//! output directory:
//! - `L.crates-diff.patch` — unified diff text
//! - `L.crates-diff.txt` — recursive structural diff (which files differ)
//! - `L.crates-diff.html` — rendered report; its file name is the report
//!   identifier returned to the caller
//!
//! Diffing itself is delegated to external tools: `git diff --no-index` for
//! the unified diff, `diff -qr` for the structural pass, and a
//! [`DiffRenderer`] (by default the `diff2html` CLI) for the HTML report.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

/// Errors from diff generation and rendering.
#[derive(Error, Debug)]
pub enum ReportError {
    /// An external diff tool exited abnormally
    #[error("{tool} failed: {stderr}")]
    Tool { tool: &'static str, stderr: String },

    /// The renderer's stdin could not be opened
    #[error("failed to feed the unified diff to the renderer")]
    RendererInput,

    /// Spawn or filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The three artifacts produced for one comparison.
#[derive(Debug, Clone)]
pub struct DiffReport {
    /// Report identifier: the HTML file's name
    pub identifier: String,
    pub patch_path: PathBuf,
    pub structural_path: PathBuf,
    pub html_path: PathBuf,
}

/// Converts a unified diff stream into an HTML report file.
#[async_trait]
pub trait DiffRenderer: Send + Sync {
    async fn render(&self, unified_diff: &str, output: &Path) -> Result<(), ReportError>;
}

/// Renders through the `diff2html` CLI (`npm install -g diff2html-cli`) with
/// line-level layout and word-level highlighting.
pub struct Diff2Html;

#[async_trait]
impl DiffRenderer for Diff2Html {
    async fn render(&self, unified_diff: &str, output: &Path) -> Result<(), ReportError> {
        let mut child = Command::new("diff2html")
            .args(["-s", "line", "-d", "word", "-i", "stdin", "-F"])
            .arg(output)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        let mut stdin = child.stdin.take().ok_or(ReportError::RendererInput)?;
        stdin.write_all(unified_diff.as_bytes()).await?;
        drop(stdin);

        let done = child.wait_with_output().await?;
        if !done.status.success() {
            return Err(ReportError::Tool {
                tool: "diff2html",
                stderr: String::from_utf8_lossy(&done.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

/// Produces diff reports for pairs of source trees.
pub struct DiffOrchestrator {
    out_dir: PathBuf,
    renderer: Box<dyn DiffRenderer>,
}

impl DiffOrchestrator {
    /// Creates an orchestrator writing artifacts into `out_dir`, rendering
    /// HTML through [`Diff2Html`].
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
            renderer: Box::new(Diff2Html),
        }
    }

    /// Replaces the HTML renderer.
    pub fn with_renderer(mut self, renderer: Box<dyn DiffRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Directory the artifacts are written into.
    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Diffs `path_a` against `path_b` and writes the three artifacts named
    /// from `label`.
    ///
    /// The two paths need not share a parent directory — one may come from a
    /// repository clone and the other from archive extraction.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError`] if an external tool fails or an artifact
    /// cannot be written. Differences between the trees are not an error.
    pub async fn diff(
        &self,
        label: &str,
        path_a: &Path,
        path_b: &Path,
    ) -> Result<DiffReport, ReportError> {
        tokio::fs::create_dir_all(&self.out_dir).await?;

        let unified = unified_diff(path_a, path_b).await?;
        let patch_path = self.out_dir.join(format!("{label}.crates-diff.patch"));
        tokio::fs::write(&patch_path, &unified).await?;

        let structural = structural_diff(path_a, path_b).await?;
        let structural_path = self.out_dir.join(format!("{label}.crates-diff.txt"));
        tokio::fs::write(&structural_path, &structural).await?;

        let identifier = format!("{label}.crates-diff.html");
        let html_path = self.out_dir.join(&identifier);
        self.renderer.render(&unified, &html_path).await?;

        info!(identifier, "diff report written");
        Ok(DiffReport {
            identifier,
            patch_path,
            structural_path,
            html_path,
        })
    }
}

/// Unified diff between two trees. `git diff --no-index` exits 1 when the
/// trees differ; only higher codes are failures.
async fn unified_diff(path_a: &Path, path_b: &Path) -> Result<String, ReportError> {
    debug!(a = %path_a.display(), b = %path_b.display(), "unified diff");
    let output = Command::new("git")
        .args(["diff", "--no-index", "-u", "--"])
        .arg(path_a)
        .arg(path_b)
        .output()
        .await?;

    match output.status.code() {
        Some(0) | Some(1) => Ok(String::from_utf8_lossy(&output.stdout).into_owned()),
        _ => Err(ReportError::Tool {
            tool: "git diff",
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }),
    }
}

/// Recursive structural diff: which files differ or exist on one side only.
/// Same exit-code convention as [`unified_diff`].
async fn structural_diff(path_a: &Path, path_b: &Path) -> Result<String, ReportError> {
    debug!(a = %path_a.display(), b = %path_b.display(), "structural diff");
    let output = Command::new("diff")
        .arg("-qr")
        .arg(path_a)
        .arg(path_b)
        .output()
        .await?;

    match output.status.code() {
        Some(0) | Some(1) => Ok(String::from_utf8_lossy(&output.stdout).into_owned()),
        _ => Err(ReportError::Tool {
            tool: "diff -qr",
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }),
    }
}
