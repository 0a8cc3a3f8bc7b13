//! Registry client for package metadata and archive downloads.
//!
//! The [`Registry`] trait is the seam between the diff pipeline and the
//! package registry; [`HttpRegistry`] is the crates.io-backed implementation.
//! Every operation is a single attempt — there is no retry policy, and a
//! failed metadata query must stop the caller before version resolution.

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::model::{PackageMetadata, PublishedVersion};

/// Base URL of the public registry.
pub const DEFAULT_REGISTRY: &str = "https://crates.io";

/// Errors from registry metadata queries and archive downloads.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// The registry answered the metadata query with a non-success status
    #[error("registry returned status {status} for package '{package}'")]
    Unavailable { package: String, status: u16 },

    /// The archive download answered with a non-success status
    #[error("download of '{dl_path}' returned status {status}")]
    Download { dl_path: String, status: u16 },

    /// Transport-level failure (DNS, TLS, connection, body decoding)
    #[error("registry request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Failed to write a downloaded archive to disk
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Read-only access to a package registry.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Fetches published versions and the repository URL for `package`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Unavailable`] on any non-success response;
    /// no metadata is returned and the caller must not proceed to resolution.
    async fn query(&self, package: &str) -> Result<PackageMetadata, RegistryError>;

    /// Downloads the archive at `dl_path` (relative to the registry base)
    /// into the local file `dest`.
    async fn download(&self, dl_path: &str, dest: &Path) -> Result<(), RegistryError>;
}

// Wire shape of `GET <base>/api/v1/crates/<name>`. Only the fields the
// pipeline consumes are modeled.
#[derive(Debug, Deserialize)]
struct CrateResponse {
    #[serde(rename = "crate")]
    krate: CrateInfo,
    versions: Vec<VersionInfo>,
}

#[derive(Debug, Deserialize)]
struct CrateInfo {
    repository: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VersionInfo {
    num: String,
    dl_path: String,
}

fn metadata_from_response(package: &str, response: CrateResponse) -> PackageMetadata {
    PackageMetadata {
        name: package.to_string(),
        versions: response
            .versions
            .into_iter()
            .map(|v| PublishedVersion {
                num: v.num,
                dl_path: v.dl_path,
            })
            .collect(),
        repository: response.krate.repository,
    }
}

/// HTTP client for the crates.io registry API.
pub struct HttpRegistry {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRegistry {
    /// Creates a client against the given registry base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("crates-diff/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("failed to build HTTP client");

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl Default for HttpRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_REGISTRY)
    }
}

#[async_trait]
impl Registry for HttpRegistry {
    async fn query(&self, package: &str) -> Result<PackageMetadata, RegistryError> {
        let url = format!("{}/api/v1/crates/{}", self.base_url, package);
        debug!(%url, "querying registry");

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(RegistryError::Unavailable {
                package: package.to_string(),
                status: response.status().as_u16(),
            });
        }

        let body: CrateResponse = response.json().await?;
        Ok(metadata_from_response(package, body))
    }

    async fn download(&self, dl_path: &str, dest: &Path) -> Result<(), RegistryError> {
        let url = format!("{}{}", self.base_url, dl_path);
        debug!(%url, dest = %dest.display(), "downloading archive");

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(RegistryError::Download {
                dl_path: dl_path.to_string(),
                status: response.status().as_u16(),
            });
        }

        let bytes = response.bytes().await?;
        tokio::fs::write(dest, &bytes).await?;
        Ok(())
    }
}
