//! Download pipeline types
//!
//! The cache manager drives downloads; locating a resource and moving its
//! bytes are delegated to a `ResourceResolver` and a `ResourceDownloader`.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::cache::lock::CancelFlag;
use crate::cache::origin::ArtifactOrigin;
use crate::module::artifact::Artifact;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    /// Nothing to do: already in the cache, or used in place from its origin
    No,
    Successful,
    Failed,
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DownloadStatus::No => "no",
            DownloadStatus::Successful => "successful",
            DownloadStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Outcome of downloading one artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadReport {
    pub artifact: Artifact,
    pub status: DownloadStatus,
    /// Bytes transferred, or the size of the file already there
    pub size: u64,
    pub elapsed_ms: u64,
    pub origin: Option<ArtifactOrigin>,
    /// Failure message; empty otherwise
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub details: String,
    /// Where the artifact can be read after this download
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_file: Option<PathBuf>,
}

impl DownloadReport {
    pub fn new(artifact: Artifact) -> Self {
        Self {
            artifact,
            status: DownloadStatus::No,
            size: 0,
            elapsed_ms: 0,
            origin: None,
            details: String::new(),
            local_file: None,
        }
    }

    pub fn failed(artifact: Artifact, details: impl Into<String>) -> Self {
        Self {
            status: DownloadStatus::Failed,
            details: details.into(),
            ..Self::new(artifact)
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == DownloadStatus::Failed
    }
}

impl fmt::Display for DownloadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.status.to_string().to_uppercase(), self.artifact)?;
        if !self.details.is_empty() {
            write!(f, ": {}", self.details)?;
        }
        write!(f, " ({}ms)", self.elapsed_ms)
    }
}

/// A located artifact resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedResource {
    /// Local path or URL
    pub location: String,
    pub is_local: bool,
    /// Revision the resource was found for
    pub revision: String,
}

impl ResolvedResource {
    pub fn local(path: impl AsRef<Path>, revision: impl Into<String>) -> Self {
        Self {
            location: path.as_ref().to_string_lossy().into_owned(),
            is_local: true,
            revision: revision.into(),
        }
    }

    pub fn remote(url: impl Into<String>, revision: impl Into<String>) -> Self {
        Self {
            location: url.into(),
            is_local: false,
            revision: revision.into(),
        }
    }

    pub fn local_path(&self) -> Option<PathBuf> {
        self.is_local.then(|| PathBuf::from(&self.location))
    }

    pub fn origin(&self) -> ArtifactOrigin {
        match self.local_path() {
            Some(path) => ArtifactOrigin::local(fs::canonicalize(&path).unwrap_or(path)),
            None => ArtifactOrigin::remote(&self.location),
        }
    }
}

/// Locates the resource holding an artifact's bytes
pub trait ResourceResolver: Send + Sync {
    /// `Ok(None)` when the artifact does not exist
    fn resolve(&self, artifact: &Artifact) -> Result<Option<ResolvedResource>>;
}

/// Moves a resource's bytes to a destination path
pub trait ResourceDownloader: Send + Sync {
    /// Returns the number of bytes written
    fn download(&self, artifact: &Artifact, resource: &ResolvedResource, dest: &Path) -> Result<u64>;
}

/// Download progress notifications; every hook defaults to doing nothing
pub trait DownloadListener: Send + Sync {
    /// Inside the lock, before the resource is located
    fn need_artifact(&self, _artifact: &Artifact) {}

    /// Just before bytes are transferred
    fn start_artifact_download(&self, _artifact: &Artifact, _resource: &ResolvedResource, _dest: &Path) {}

    /// Once the report is final, whatever the outcome
    fn end_artifact_download(&self, _report: &DownloadReport, _dest: &Path) {}
}

#[derive(Clone, Default)]
pub struct DownloadOptions {
    /// Download even when the cache file exists
    pub force: bool,
    /// Use local resources in place instead of copying them into the cache
    pub use_origin: bool,
    pub listener: Option<Arc<dyn DownloadListener>>,
    pub cancel: CancelFlag,
}

impl DownloadOptions {
    pub fn forced() -> Self {
        Self {
            force: true,
            ..Self::default()
        }
    }

    pub fn with_use_origin(mut self, use_origin: bool) -> Self {
        self.use_origin = use_origin;
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn DownloadListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }
}

impl fmt::Debug for DownloadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadOptions")
            .field("force", &self.force)
            .field("use_origin", &self.use_origin)
            .field("listener", &self.listener.is_some())
            .field("cancel", &self.cancel.is_cancelled())
            .finish()
    }
}

/// Copies local resources
///
/// Bytes go to `<dest>.part` first and are renamed into place, so a failed
/// copy never leaves a truncated file at `dest`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileResourceDownloader;

impl ResourceDownloader for FileResourceDownloader {
    fn download(&self, artifact: &Artifact, resource: &ResolvedResource, dest: &Path) -> Result<u64> {
        let source = resource
            .local_path()
            .ok_or_else(|| anyhow!("{} is not a local resource", resource.location))?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }
        let mut part_name = dest.as_os_str().to_owned();
        part_name.push(".part");
        let part = PathBuf::from(part_name);

        let copied = fs::copy(&source, &part)
            .and_then(|size| fs::rename(&part, dest).map(|_| size));
        match copied {
            Ok(size) => {
                debug!("Copied {} from {:?} ({} bytes)", artifact, source, size);
                Ok(size)
            }
            Err(e) => {
                let _ = fs::remove_file(&part);
                Err(e).with_context(|| format!("Failed to copy {:?} to {:?}", source, dest))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::id::ModuleRevisionId;

    fn artifact() -> Artifact {
        Artifact::new(ModuleRevisionId::parts("org", "m", "1.0"), "m", "jar", "jar")
    }

    #[test]
    fn test_file_downloader_copies() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("repo").join("m.jar");
        fs::create_dir_all(source.parent().unwrap()).unwrap();
        fs::write(&source, b"bytes").unwrap();
        let dest = dir.path().join("cache").join("jars").join("m.jar");

        let size = FileResourceDownloader
            .download(&artifact(), &ResolvedResource::local(&source, "1.0"), &dest)
            .unwrap();
        assert_eq!(size, 5);
        assert_eq!(fs::read(&dest).unwrap(), b"bytes");
        assert!(!dest.with_extension("jar.part").exists());
    }

    #[test]
    fn test_file_downloader_missing_source_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("m.jar");
        let resource = ResolvedResource::local(dir.path().join("absent.jar"), "1.0");
        assert!(FileResourceDownloader
            .download(&artifact(), &resource, &dest)
            .is_err());
        assert!(!dest.exists());
        assert!(!dest.with_extension("jar.part").exists());
    }

    #[test]
    fn test_file_downloader_rejects_remote() {
        let dir = tempfile::tempdir().unwrap();
        let resource = ResolvedResource::remote("https://repo.example/m.jar", "1.0");
        assert!(FileResourceDownloader
            .download(&artifact(), &resource, &dir.path().join("m.jar"))
            .is_err());
    }

    #[test]
    fn test_report_display() {
        let report = DownloadReport::failed(artifact(), "artifact missing");
        assert!(report.is_failed());
        assert_eq!(
            report.to_string(),
            "[FAILED] org#m;1.0!m.jar(jar): artifact missing (0ms)"
        );
    }
}
