//! Materializes a package version into a comparable local source tree.
//!
//! Two procedures produce a [`SourceTree`]:
//! - **Archive materialization**: download the registry archive and extract
//!   the gzip-compressed tar into a scratch directory.
//! - **Repository materialization**: clone the project's repository and check
//!   out the tag matching the requested version.
//!
//! Scratch space is owned by the returned [`SourceTree`] via
//! `tempfile::TempDir` and is removed when the value drops, on every exit
//! path including failure.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

use crate::registry::{Registry, RegistryError};

// ============================================================================
// Source Trees
// ============================================================================

/// A local directory holding one version of a package's source.
///
/// Owns the scratch directory it was materialized into; dropping the value
/// removes the whole tree.
#[derive(Debug)]
pub struct SourceTree {
    root: PathBuf,
    _scratch: TempDir,
}

impl SourceTree {
    /// Root of the materialized source, suitable for diffing.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

// ============================================================================
// Archive materialization
// ============================================================================

/// Errors from archive download and extraction.
#[derive(Error, Debug)]
pub enum MaterializeError {
    /// Archive download failed (transport or non-success status)
    #[error("archive download failed: {0}")]
    Download(#[from] RegistryError),

    /// The archive could not be unpacked
    #[error("failed to unpack archive: {0}")]
    Unpack(#[source] std::io::Error),

    /// Extraction did not yield exactly one top-level directory
    #[error("archive for {package} {version} extracted to {found} top-level entries, expected exactly one")]
    UnexpectedLayout {
        package: String,
        version: String,
        found: usize,
    },

    /// Scratch directory or filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Downloads and extracts one published version into a fresh scratch
/// directory.
///
/// Registry archives contain exactly one top-level entry (the
/// `<name>-<version>` directory created by the packaging convention); that
/// entry becomes the tree root.
///
/// # Errors
///
/// Returns [`MaterializeError`] if the download fails, the archive cannot be
/// unpacked, or extraction yields zero or multiple top-level entries. No
/// partial tree is returned; the scratch directory is removed on failure.
pub async fn materialize_archive(
    registry: &dyn Registry,
    package: &str,
    version: &str,
    dl_path: &str,
) -> Result<SourceTree, MaterializeError> {
    let scratch = tempfile::tempdir()?;
    let archive = scratch.path().join(format!("{package}-{version}.crate"));
    registry.download(dl_path, &archive).await?;

    let extract_dir = scratch.path().join(format!("extract-{version}"));
    std::fs::create_dir(&extract_dir)?;

    // Unpacking is blocking work; keep it off the async executor.
    let archive_path = archive.clone();
    let dest = extract_dir.clone();
    tokio::task::spawn_blocking(move || unpack_archive(&archive_path, &dest))
        .await
        .map_err(|e| MaterializeError::Unpack(std::io::Error::other(e)))??;

    let root = single_top_level(&extract_dir, package, version)?;
    info!(package, version, root = %root.display(), "archive materialized");
    Ok(SourceTree {
        root,
        _scratch: scratch,
    })
}

fn unpack_archive(archive: &Path, dest: &Path) -> Result<(), MaterializeError> {
    let file = std::fs::File::open(archive)?;
    let decoder = flate2::read::GzDecoder::new(file);
    let mut tarball = tar::Archive::new(decoder);
    tarball.unpack(dest).map_err(MaterializeError::Unpack)
}

fn single_top_level(
    dir: &Path,
    package: &str,
    version: &str,
) -> Result<PathBuf, MaterializeError> {
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        entries.push(entry?.path());
    }
    if entries.len() == 1 {
        Ok(entries.remove(0))
    } else {
        Err(MaterializeError::UnexpectedLayout {
            package: package.to_string(),
            version: version.to_string(),
            found: entries.len(),
        })
    }
}

// ============================================================================
// Repository materialization
// ============================================================================

/// Errors from repository clone and tag checkout.
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Registry metadata carries no repository URL for the package
    #[error("registry metadata for '{0}' lists no repository URL")]
    MissingRepositoryUrl(String),

    /// A git invocation exited with a non-success status
    #[error("git {operation} failed: {stderr}")]
    Git {
        operation: &'static str,
        stderr: String,
    },

    /// No tag in the repository matches the requested version
    #[error("no tag matching '{version}'")]
    NoMatchingTag { version: String },

    /// Multiple tags match and the policy refuses to pick one
    #[error("ambiguous tag match for '{version}': {}", candidates.join(", "))]
    AmbiguousTag {
        version: String,
        candidates: Vec<String>,
    },

    /// Scratch directory or subprocess spawn failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// How to pick a tag when the version string matches more than one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TagPolicy {
    /// Exact tag name, else exact with a leading `v`, else a substring match
    /// only when it is unique. Multiple substring candidates are an error.
    #[default]
    ExactThenUniqueSubstring,

    /// First listed tag containing the version as a substring. Matches the
    /// historical behavior; listing order decides ties.
    FirstSubstring,
}

/// Selects the tag for `version` from the repository's tag list.
///
/// # Errors
///
/// Returns [`RepositoryError::NoMatchingTag`] when nothing matches, and
/// [`RepositoryError::AmbiguousTag`] when the
/// [`ExactThenUniqueSubstring`](TagPolicy::ExactThenUniqueSubstring) policy
/// finds several substring candidates and no exact match.
pub fn select_tag<'a>(
    tags: &'a [String],
    version: &str,
    policy: TagPolicy,
) -> Result<&'a str, RepositoryError> {
    match policy {
        TagPolicy::FirstSubstring => tags
            .iter()
            .find(|tag| tag.contains(version))
            .map(String::as_str)
            .ok_or_else(|| RepositoryError::NoMatchingTag {
                version: version.to_string(),
            }),
        TagPolicy::ExactThenUniqueSubstring => {
            if let Some(tag) = tags.iter().find(|tag| tag.as_str() == version) {
                return Ok(tag);
            }
            let prefixed = format!("v{version}");
            if let Some(tag) = tags.iter().find(|tag| tag.as_str() == prefixed) {
                return Ok(tag);
            }
            let candidates: Vec<&str> = tags
                .iter()
                .filter(|tag| tag.contains(version))
                .map(String::as_str)
                .collect();
            match candidates.as_slice() {
                [] => Err(RepositoryError::NoMatchingTag {
                    version: version.to_string(),
                }),
                [only] => Ok(only),
                many => Err(RepositoryError::AmbiguousTag {
                    version: version.to_string(),
                    candidates: many.iter().map(|tag| tag.to_string()).collect(),
                }),
            }
        }
    }
}

/// Clones `repository_url` and checks out the tag matching `version`.
///
/// Performs a full clone: tag naming is not normalized across projects, so a
/// shallow or tag-scoped clone cannot be trusted to contain the tag.
///
/// # Errors
///
/// Returns [`RepositoryError`] if the clone fails, no tag matches, or the
/// policy refuses an ambiguous match.
pub async fn materialize_repository(
    repository_url: &str,
    version: &str,
    policy: TagPolicy,
) -> Result<SourceTree, RepositoryError> {
    let scratch = tempfile::tempdir()?;
    run_git(
        scratch.path(),
        "clone",
        &["clone", repository_url, "checkout"],
    )
    .await?;
    let checkout = scratch.path().join("checkout");

    let listing = run_git(&checkout, "tag --list", &["tag", "--list"]).await?;
    let tags: Vec<String> = listing
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect();

    let tag = select_tag(&tags, version, policy)?.to_string();
    info!(repository = repository_url, tag, "checking out tag");
    run_git(&checkout, "checkout", &["checkout", &tag]).await?;

    Ok(SourceTree {
        root: checkout,
        _scratch: scratch,
    })
}

/// Runs git with an explicit working directory, capturing stderr into the
/// error on failure.
async fn run_git(
    workdir: &Path,
    operation: &'static str,
    args: &[&str],
) -> Result<String, RepositoryError> {
    debug!(?args, workdir = %workdir.display(), "running git");
    let output = Command::new("git")
        .args(args)
        .current_dir(workdir)
        .output()
        .await?;

    if !output.status.success() {
        return Err(RepositoryError::Git {
            operation,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{crate_archive, make_tagged_repo, MockRegistry};

    fn tags(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn test_select_tag_prefers_exact_match() {
        let tags = tags(&["v1.0.0", "1.0.0", "1.0.0-beta"]);
        let tag = select_tag(&tags, "1.0.0", TagPolicy::ExactThenUniqueSubstring).unwrap();
        assert_eq!(tag, "1.0.0");
    }

    #[test]
    fn test_select_tag_falls_back_to_v_prefix() {
        let tags = tags(&["v0.9.0", "v1.0.0"]);
        let tag = select_tag(&tags, "1.0.0", TagPolicy::ExactThenUniqueSubstring).unwrap();
        assert_eq!(tag, "v1.0.0");
    }

    #[test]
    fn test_select_tag_accepts_unique_substring() {
        let tags = tags(&["release-2.3.1", "release-2.4.0"]);
        let tag = select_tag(&tags, "2.3.1", TagPolicy::ExactThenUniqueSubstring).unwrap();
        assert_eq!(tag, "release-2.3.1");
    }

    #[test]
    fn test_select_tag_rejects_ambiguous_substring() {
        let tags = tags(&["v1.0.0", "v1.0.0-beta"]);
        let err = select_tag(&tags, "1.0", TagPolicy::ExactThenUniqueSubstring).unwrap_err();
        match err {
            RepositoryError::AmbiguousTag { candidates, .. } => {
                assert_eq!(candidates, vec!["v1.0.0", "v1.0.0-beta"]);
            }
            other => panic!("expected AmbiguousTag, got {other:?}"),
        }
    }

    #[test]
    fn test_select_tag_first_substring_uses_listing_order() {
        let tags = tags(&["v1.0.0-beta", "v1.0.0"]);
        let tag = select_tag(&tags, "1.0", TagPolicy::FirstSubstring).unwrap();
        assert_eq!(tag, "v1.0.0-beta");
    }

    #[test]
    fn test_select_tag_no_match() {
        let tags = tags(&["v2.0.0"]);
        let err = select_tag(&tags, "1.0.0", TagPolicy::ExactThenUniqueSubstring).unwrap_err();
        assert!(matches!(err, RepositoryError::NoMatchingTag { .. }));
    }

    #[tokio::test]
    async fn test_materialize_archive_resolves_single_top_level() {
        let mut registry = MockRegistry::new();
        registry.add_archive(
            "/alpha-1.0.0.crate",
            crate_archive("alpha", "1.0.0", &[("src/lib.rs", "pub fn a() {}\n")]),
        );

        let tree = materialize_archive(&registry, "alpha", "1.0.0", "/alpha-1.0.0.crate")
            .await
            .unwrap();

        assert!(tree.root().ends_with("alpha-1.0.0"));
        let contents = std::fs::read_to_string(tree.root().join("src/lib.rs")).unwrap();
        assert_eq!(contents, "pub fn a() {}\n");
    }

    #[tokio::test]
    async fn test_materialize_archive_is_idempotent_per_version() {
        let mut registry = MockRegistry::new();
        registry.add_archive(
            "/alpha-1.0.0.crate",
            crate_archive("alpha", "1.0.0", &[("Cargo.toml", "[package]\nname = \"alpha\"\n")]),
        );

        let first = materialize_archive(&registry, "alpha", "1.0.0", "/alpha-1.0.0.crate")
            .await
            .unwrap();
        let second = materialize_archive(&registry, "alpha", "1.0.0", "/alpha-1.0.0.crate")
            .await
            .unwrap();

        assert_ne!(first.root(), second.root());
        let a = std::fs::read_to_string(first.root().join("Cargo.toml")).unwrap();
        let b = std::fs::read_to_string(second.root().join("Cargo.toml")).unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_materialize_archive_rejects_multiple_top_level_entries() {
        let mut registry = MockRegistry::new();
        // Two unrelated top-level directories in one archive
        let mut bytes = Vec::new();
        {
            let enc =
                flate2::write::GzEncoder::new(&mut bytes, flate2::Compression::default());
            let mut builder = tar::Builder::new(enc);
            for dir in ["one", "two"] {
                let mut header = tar::Header::new_gnu();
                header.set_size(5);
                header.set_mode(0o644);
                header.set_cksum();
                builder
                    .append_data(&mut header, format!("{dir}/f.txt"), &b"hello"[..])
                    .unwrap();
            }
            builder.into_inner().unwrap().finish().unwrap();
        }
        registry.add_archive("/weird-1.0.0.crate", bytes);

        let err = materialize_archive(&registry, "weird", "1.0.0", "/weird-1.0.0.crate")
            .await
            .unwrap_err();
        match err {
            MaterializeError::UnexpectedLayout { found, .. } => assert_eq!(found, 2),
            other => panic!("expected UnexpectedLayout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_materialize_archive_fails_on_missing_download() {
        let registry = MockRegistry::new();
        let err = materialize_archive(&registry, "alpha", "1.0.0", "/alpha-1.0.0.crate")
            .await
            .unwrap_err();
        assert!(matches!(err, MaterializeError::Download(_)));
    }

    #[tokio::test]
    async fn test_materialize_repository_checks_out_matching_tag() {
        let repo = make_tagged_repo(&[("README.md", "hello\n")], &["v1.0.0"]);
        let url = repo.path().to_string_lossy().into_owned();

        let tree = materialize_repository(&url, "1.0.0", TagPolicy::default())
            .await
            .unwrap();

        let contents = std::fs::read_to_string(tree.root().join("README.md")).unwrap();
        assert_eq!(contents, "hello\n");
    }

    #[tokio::test]
    async fn test_materialize_repository_fails_without_matching_tag() {
        let repo = make_tagged_repo(&[("README.md", "hello\n")], &["v2.0.0"]);
        let url = repo.path().to_string_lossy().into_owned();

        let err = materialize_repository(&url, "1.0.0", TagPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NoMatchingTag { .. }));
    }

    #[tokio::test]
    async fn test_materialize_repository_fails_on_bad_url() {
        let err = materialize_repository(
            "/nonexistent/repository/path",
            "1.0.0",
            TagPolicy::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RepositoryError::Git { .. }));
    }

    #[tokio::test]
    async fn test_source_tree_scratch_is_released_on_drop() {
        let mut registry = MockRegistry::new();
        registry.add_archive(
            "/alpha-1.0.0.crate",
            crate_archive("alpha", "1.0.0", &[("src/lib.rs", "")]),
        );

        let tree = materialize_archive(&registry, "alpha", "1.0.0", "/alpha-1.0.0.crate")
            .await
            .unwrap();
        let root = tree.root().to_path_buf();
        assert!(root.exists());
        drop(tree);
        assert!(!root.exists());
    }
}
