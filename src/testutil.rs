//! Shared test fixtures: an in-memory registry, synthetic `.crate` archives
//! and tagged git repositories.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;

use crate::model::{PackageMetadata, PublishedVersion};
use crate::registry::{Registry, RegistryError};
use crate::report::{DiffRenderer, ReportError};

/// In-memory registry serving fixture metadata and archive bytes.
pub struct MockRegistry {
    packages: HashMap<String, PackageMetadata>,
    archives: HashMap<String, Vec<u8>>,
}

impl MockRegistry {
    pub fn new() -> Self {
        Self {
            packages: HashMap::new(),
            archives: HashMap::new(),
        }
    }

    pub fn add_package(
        &mut self,
        name: &str,
        repository: Option<&str>,
        versions: &[(&str, &str)],
    ) {
        self.packages.insert(
            name.to_string(),
            PackageMetadata {
                name: name.to_string(),
                versions: versions
                    .iter()
                    .map(|(num, dl_path)| PublishedVersion {
                        num: num.to_string(),
                        dl_path: dl_path.to_string(),
                    })
                    .collect(),
                repository: repository.map(String::from),
            },
        );
    }

    pub fn add_archive(&mut self, dl_path: &str, bytes: Vec<u8>) {
        self.archives.insert(dl_path.to_string(), bytes);
    }
}

#[async_trait]
impl Registry for MockRegistry {
    async fn query(&self, package: &str) -> Result<PackageMetadata, RegistryError> {
        self.packages
            .get(package)
            .cloned()
            .ok_or_else(|| RegistryError::Unavailable {
                package: package.to_string(),
                status: 404,
            })
    }

    async fn download(&self, dl_path: &str, dest: &Path) -> Result<(), RegistryError> {
        let bytes = self
            .archives
            .get(dl_path)
            .ok_or_else(|| RegistryError::Download {
                dl_path: dl_path.to_string(),
                status: 404,
            })?;
        tokio::fs::write(dest, bytes).await?;
        Ok(())
    }
}

/// Renderer that writes the unified diff wrapped in a minimal HTML shell,
/// so report tests run without `diff2html` installed.
pub struct StubRenderer;

#[async_trait]
impl DiffRenderer for StubRenderer {
    async fn render(&self, unified_diff: &str, output: &Path) -> Result<(), ReportError> {
        let body = format!("<html><pre>{unified_diff}</pre></html>");
        tokio::fs::write(output, body).await?;
        Ok(())
    }
}

/// Builds a gzip-compressed tar with the registry packaging convention: a
/// single `<name>-<version>/` top-level directory containing `files`.
pub fn crate_archive(name: &str, version: &str, files: &[(&str, &str)]) -> Vec<u8> {
    let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (path, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(
                &mut header,
                format!("{name}-{version}/{path}"),
                contents.as_bytes(),
            )
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

pub fn run_git(dir: &Path, args: &[&str]) {
    let output = std::process::Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Creates a git repository with one commit containing `files`, tagged with
/// each name in `tags`.
pub fn make_tagged_repo(files: &[(&str, &str)], tags: &[&str]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    run_git(dir.path(), &["init"]);
    run_git(dir.path(), &["config", "user.name", "test-user"]);
    run_git(dir.path(), &["config", "user.email", "test@example.com"]);

    for (path, contents) in files {
        let full = dir.path().join(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(full, contents).unwrap();
    }
    run_git(dir.path(), &["add", "."]);
    run_git(dir.path(), &["commit", "-m", "initial"]);
    for tag in tags {
        run_git(dir.path(), &["tag", tag]);
    }
    dir
}
