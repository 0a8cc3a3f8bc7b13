//! Maps requested version identifiers onto downloadable registry artifacts.

use std::collections::BTreeMap;
use std::path::PathBuf;

use thiserror::Error;

use crate::model::PackageMetadata;

/// Errors from version resolution.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// At least one requested version is absent from the published list
    #[error("versions not found for '{package}': {}", missing.join(", "))]
    VersionNotFound { package: String, missing: Vec<String> },
}

/// One requested version, resolved to its registry artifact.
///
/// `extracted` stays `None` until the archive has been materialized.
#[derive(Debug, Clone)]
pub struct ResolvedVersion {
    pub dl_path: String,
    pub extracted: Option<PathBuf>,
}

/// Requested version identifier → resolved artifact.
pub type ResolvedVersionMap = BTreeMap<String, ResolvedVersion>;

/// Resolves every requested version against the published list.
///
/// All-or-nothing: on success the map holds exactly one entry per requested
/// version; if any identifier is unmatched the whole resolution fails and no
/// map is produced. Duplicate requested versions collapse to a single entry.
///
/// # Errors
///
/// Returns [`ResolveError::VersionNotFound`] listing every unmatched
/// identifier.
pub fn resolve(
    metadata: &PackageMetadata,
    requested: &[String],
) -> Result<ResolvedVersionMap, ResolveError> {
    let mut map = ResolvedVersionMap::new();
    for published in &metadata.versions {
        if requested.iter().any(|r| *r == published.num) {
            map.insert(
                published.num.clone(),
                ResolvedVersion {
                    dl_path: published.dl_path.clone(),
                    extracted: None,
                },
            );
        }
    }

    let mut missing = Vec::new();
    for version in requested {
        if !map.contains_key(version) && !missing.contains(version) {
            missing.push(version.clone());
        }
    }
    if !missing.is_empty() {
        return Err(ResolveError::VersionNotFound {
            package: metadata.name.clone(),
            missing,
        });
    }

    Ok(map)
}
