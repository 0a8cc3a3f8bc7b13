//! Single-package diff pipeline: resolve → materialize → report.
//!
//! [`DiffPipeline`] drives the whole flow for one package, in two modes:
//! - [`diff_versions`](DiffPipeline::diff_versions): two published versions,
//!   both materialized from registry archives;
//! - [`diff_repository`](DiffPipeline::diff_repository): one published
//!   version compared against the matching tag of the package's repository.
//!
//! Stages run strictly sequentially; each blocks until its external call
//! completes. Materialized trees live on the stack of the pipeline call and
//! their scratch directories are released when it returns, on success or
//! failure alike.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::materialize::{
    self, MaterializeError, RepositoryError, SourceTree, TagPolicy,
};
use crate::registry::{Registry, RegistryError};
use crate::report::{DiffOrchestrator, DiffRenderer, ReportError};
use crate::resolve::{self, ResolveError, ResolvedVersionMap};

// ============================================================================
// Pipeline Errors
// ============================================================================

/// Aggregate error for a single package's pipeline run.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Registry query failed; fatal to the invocation that triggered it
    #[error("registry query failed: {0}")]
    Registry(#[from] RegistryError),

    /// A requested version is not published
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Archive download or extraction failed
    #[error("materialization failed: {0}")]
    Materialize(#[from] MaterializeError),

    /// Repository clone or tag checkout failed
    #[error("repository resolution failed: {0}")]
    Repository(#[from] RepositoryError),

    /// Diff generation or rendering failed
    #[error("diff report failed: {0}")]
    Report(#[from] ReportError),
}

// ============================================================================
// Pipeline
// ============================================================================

/// Sequential diff pipeline over a [`Registry`].
pub struct DiffPipeline<R: Registry> {
    registry: R,
    orchestrator: DiffOrchestrator,
    tag_policy: TagPolicy,
}

impl<R: Registry> DiffPipeline<R> {
    /// Creates a pipeline writing report artifacts into `out_dir`.
    ///
    /// Default configuration:
    /// - HTML rendering through `diff2html`
    /// - Tag selection per [`TagPolicy::ExactThenUniqueSubstring`]
    pub fn new(registry: R, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            registry,
            orchestrator: DiffOrchestrator::new(out_dir),
            tag_policy: TagPolicy::default(),
        }
    }

    /// Replaces the HTML renderer.
    pub fn with_renderer(mut self, renderer: Box<dyn DiffRenderer>) -> Self {
        self.orchestrator = self.orchestrator.with_renderer(renderer);
        self
    }

    /// Sets the tag tie-break policy for repository materialization.
    pub fn with_tag_policy(mut self, policy: TagPolicy) -> Self {
        self.tag_policy = policy;
        self
    }

    /// Diffs two published versions of `package`, returning the report
    /// identifier (`<package>.<old>-<new>.crates-diff.html`).
    pub async fn diff_versions(
        &self,
        package: &str,
        old: &str,
        new: &str,
    ) -> Result<String, PipelineError> {
        info!(package, old, new, "diffing published versions");
        let metadata = self.registry.query(package).await?;
        let requested = [old.to_string(), new.to_string()];
        let mut resolved = resolve::resolve(&metadata, &requested)?;

        let tree_old = self.materialize_resolved(&mut resolved, package, old).await?;
        let tree_new = self.materialize_resolved(&mut resolved, package, new).await?;

        let label = format!("{package}.{old}-{new}");
        let report = self
            .orchestrator
            .diff(&label, tree_old.root(), tree_new.root())
            .await?;
        Ok(report.identifier)
    }

    /// Diffs the repository checkout of `version`'s tag against the
    /// published archive, returning the report identifier
    /// (`<package>.<version>.crates-diff.html`). The checkout is the left
    /// side of the diff, the archive the right.
    pub async fn diff_repository(
        &self,
        package: &str,
        version: &str,
    ) -> Result<String, PipelineError> {
        info!(package, version, "diffing repository tag against archive");
        let metadata = self.registry.query(package).await?;
        let requested = [version.to_string()];
        let mut resolved = resolve::resolve(&metadata, &requested)?;

        let repository_url = metadata
            .repository
            .clone()
            .ok_or_else(|| RepositoryError::MissingRepositoryUrl(package.to_string()))?;

        let repo_tree =
            materialize::materialize_repository(&repository_url, version, self.tag_policy)
                .await?;
        let archive_tree = self
            .materialize_resolved(&mut resolved, package, version)
            .await?;

        let label = format!("{package}.{version}");
        let report = self
            .orchestrator
            .diff(&label, repo_tree.root(), archive_tree.root())
            .await?;
        Ok(report.identifier)
    }

    /// Materializes one resolved version and records its extracted path in
    /// the map.
    async fn materialize_resolved(
        &self,
        resolved: &mut ResolvedVersionMap,
        package: &str,
        version: &str,
    ) -> Result<SourceTree, PipelineError> {
        // resolve() guarantees an entry per requested version; a miss here
        // is reported as unresolved rather than panicking.
        let dl_path = resolved
            .get(version)
            .map(|entry| entry.dl_path.clone())
            .ok_or_else(|| ResolveError::VersionNotFound {
                package: package.to_string(),
                missing: vec![version.to_string()],
            })?;

        let tree =
            materialize::materialize_archive(&self.registry, package, version, &dl_path).await?;
        if let Some(entry) = resolved.get_mut(version) {
            entry.extracted = Some(tree.root().to_path_buf());
        }
        Ok(tree)
    }

    /// Output directory for report artifacts.
    pub fn out_dir(&self) -> &Path {
        self.orchestrator.out_dir()
    }
}

// ============================================================================
// Tests
// ============================================================================
