pub mod batch;
pub mod materialize;
pub mod model;
pub mod pipeline;
pub mod registry;
pub mod report;
pub mod resolve;

#[cfg(test)]
pub(crate) mod testutil;

// Re-export common types for convenience
pub use batch::{BatchError, BatchProcessor};
pub use materialize::{MaterializeError, RepositoryError, SourceTree, TagPolicy};
pub use model::{ChangeSummary, DependencyChangeRecord, PackageMetadata, PublishedVersion};
pub use pipeline::{DiffPipeline, PipelineError};
pub use registry::{HttpRegistry, Registry, RegistryError, DEFAULT_REGISTRY};
pub use report::{DiffOrchestrator, DiffReport, DiffRenderer, ReportError};
pub use resolve::{resolve, ResolveError, ResolvedVersion, ResolvedVersionMap};
