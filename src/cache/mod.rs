//! Repository cache
//!
//! The `CacheManager` maps module revisions and artifacts to files under two
//! roots:
//!
//! - the repository cache: descriptors, artifacts and per-module metadata
//!   (which resolver produced an entry, where each artifact came from)
//! - the resolution cache: resolved descriptors and per-resolve reports
//!
//! It also runs locked, idempotent artifact downloads.

pub mod download;
pub mod lock;
pub mod origin;
pub mod parallel;
pub mod pattern;
pub mod properties;
pub mod report;

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, trace, warn};

use crate::module::artifact::Artifact;
use crate::module::descriptor::{ModuleDescriptor, TomlDescriptorParser};
use crate::module::id::ModuleRevisionId;
use crate::module::traits::{DescriptorParser, ModuleError};
use crate::registry::Registry;
use crate::resolver::ResolvedModuleRevision;
use crate::utils::{elapsed_millis, log_error, with_default};

pub use download::{
    DownloadListener, DownloadOptions, DownloadReport, DownloadStatus, FileResourceDownloader,
    ResolvedResource, ResourceDownloader, ResourceResolver,
};
pub use lock::{
    ArtifactLockStrategy, CancelFlag, FileLock, InProcessLockStrategy, LockError, LockStrategy,
    NoLockStrategy,
};
pub use origin::ArtifactOrigin;
pub use parallel::download_all;
pub use properties::PropertiesFile;
pub use report::ConfigurationReport;

pub const DEFAULT_DESCRIPTOR_PATTERN: &str = "[organisation]/[module]/descriptor-[revision].toml";
pub const DEFAULT_ARTIFACT_PATTERN: &str = "[organisation]/[module]/[type]s/[artifact]-[revision].[ext]";
pub const DEFAULT_DATA_FILE_PATTERN: &str = "[organisation]/[module]/cachedata-[revision].properties";
pub const DEFAULT_RESOLVED_DESCRIPTOR_PATTERN: &str = "resolved-[organisation]-[module]-[revision].toml";
pub const DEFAULT_RESOLVED_PROPERTIES_PATTERN: &str =
    "resolved-[organisation]-[module]-[revision].properties";

const RESOLVER_KEY: &str = "resolver";
const ARTIFACT_RESOLVER_KEY: &str = "artifact.resolver";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot update cache metadata {path:?}: {source}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("download of {artifact} interrupted")]
    Interrupted { artifact: String },

    #[error("misconfiguration: the repository resolves {artifact} to the cache file itself ({path:?})")]
    CacheAsRepository { artifact: String, path: PathBuf },

    #[error("artifact missing: {0}")]
    ArtifactMissing(String),

    #[error("transfer of {artifact} failed: {message}")]
    Transfer { artifact: String, message: String },

    #[error(transparent)]
    Descriptor(#[from] ModuleError),

    #[error("report serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("download worker failed: {0}")]
    Worker(String),
}

impl CacheError {
    /// Errors that must abort the operation instead of becoming a FAILED report
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CacheError::Interrupted { .. } | CacheError::CacheAsRepository { .. }
        )
    }
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> CacheError + '_ {
    move |source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Patterns, roots and lock strategy name of a cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    pub default_cache: PathBuf,
    pub repository_cache_dir: Option<PathBuf>,
    pub resolution_cache_dir: Option<PathBuf>,
    pub descriptor_pattern: String,
    pub artifact_pattern: String,
    pub data_file_pattern: String,
    pub resolved_descriptor_pattern: String,
    pub resolved_properties_pattern: String,
    pub lock_strategy: String,
    pub use_origin: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            default_cache: PathBuf::from(".modresolve/cache"),
            repository_cache_dir: None,
            resolution_cache_dir: None,
            descriptor_pattern: DEFAULT_DESCRIPTOR_PATTERN.to_string(),
            artifact_pattern: DEFAULT_ARTIFACT_PATTERN.to_string(),
            data_file_pattern: DEFAULT_DATA_FILE_PATTERN.to_string(),
            resolved_descriptor_pattern: DEFAULT_RESOLVED_DESCRIPTOR_PATTERN.to_string(),
            resolved_properties_pattern: DEFAULT_RESOLVED_PROPERTIES_PATTERN.to_string(),
            lock_strategy: lock::NO_LOCK.to_string(),
            use_origin: false,
        }
    }
}

/// Releases an artifact lock on every exit path of `download`
struct LockGuard<'a> {
    strategy: &'a dyn LockStrategy,
    artifact: &'a Artifact,
    path: &'a Path,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.strategy.unlock_artifact(self.artifact, self.path);
    }
}

pub struct CacheManager {
    settings: CacheSettings,
    repository_root: PathBuf,
    resolution_root: PathBuf,
    lock_strategy: OnceLock<Arc<dyn LockStrategy>>,
    parser: Arc<dyn DescriptorParser>,
    /// Serializes this manager's own metadata writers before they contend for the lock file
    metadata_lock: Mutex<()>,
}

impl CacheManager {
    /// Cache rooted at `cache_dir`, or at the settings' default cache
    ///
    /// Explicit repository/resolution directories in `settings` win over the base directory.
    pub fn new(settings: CacheSettings, cache_dir: Option<PathBuf>) -> Self {
        let base = cache_dir.unwrap_or_else(|| settings.default_cache.clone());
        let repository_root = settings
            .repository_cache_dir
            .clone()
            .unwrap_or_else(|| base.clone());
        let resolution_root = settings.resolution_cache_dir.clone().unwrap_or(base);
        Self {
            settings,
            repository_root,
            resolution_root,
            lock_strategy: OnceLock::new(),
            parser: Arc::new(TomlDescriptorParser),
            metadata_lock: Mutex::new(()),
        }
    }

    pub fn with_repository_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.repository_root = root.into();
        self
    }

    pub fn with_resolution_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.resolution_root = root.into();
        self
    }

    pub fn with_parser(mut self, parser: Arc<dyn DescriptorParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub fn repository_root(&self) -> &Path {
        &self.repository_root
    }

    pub fn resolution_root(&self) -> &Path {
        &self.resolution_root
    }

    pub fn parser(&self) -> &dyn DescriptorParser {
        self.parser.as_ref()
    }

    /// Lock strategy in use; defaults to the one named in the settings
    pub fn lock_strategy(&self) -> Arc<dyn LockStrategy> {
        Arc::clone(self.lock_strategy.get_or_init(|| {
            lock::lock_strategy_by_name(&self.settings.lock_strategy).unwrap_or_else(|| {
                warn!(
                    "Unknown lock strategy '{}', downloads will not be locked",
                    self.settings.lock_strategy
                );
                Arc::new(NoLockStrategy)
            })
        }))
    }

    pub fn set_lock_strategy(&mut self, strategy: Arc<dyn LockStrategy>) {
        self.lock_strategy = OnceLock::from(strategy);
    }

    // Paths

    pub fn descriptor_path(&self, mrid: &ModuleRevisionId) -> PathBuf {
        self.repository_root
            .join(pattern::substitute_module(&self.settings.descriptor_pattern, mrid))
    }

    pub fn archive_path(&self, artifact: &Artifact) -> PathBuf {
        self.repository_root
            .join(pattern::substitute_artifact(&self.settings.artifact_pattern, artifact))
    }

    pub fn data_file_path(&self, mrid: &ModuleRevisionId) -> PathBuf {
        self.repository_root
            .join(pattern::substitute_module(&self.settings.data_file_pattern, mrid))
    }

    pub fn resolved_descriptor_path(&self, mrid: &ModuleRevisionId) -> PathBuf {
        self.resolution_root.join(pattern::substitute_module(
            &self.settings.resolved_descriptor_pattern,
            mrid,
        ))
    }

    pub fn resolved_properties_path(&self, mrid: &ModuleRevisionId) -> PathBuf {
        self.resolution_root.join(pattern::substitute_module(
            &self.settings.resolved_properties_pattern,
            mrid,
        ))
    }

    pub fn configuration_report_path(&self, resolve_id: &str, conf: &str) -> PathBuf {
        self.resolution_root
            .join(format!("{}-{}.json", resolve_id, conf))
    }

    /// Report files written for `resolve_id`, sorted by name
    pub fn configuration_reports(&self, resolve_id: &str) -> Result<Vec<PathBuf>, CacheError> {
        let prefix = format!("{}-", resolve_id);
        let entries = match fs::read_dir(&self.resolution_root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&self.resolution_root)(e)),
        };
        let mut reports = Vec::new();
        for entry in entries {
            let path = entry.map_err(io_error(&self.resolution_root))?.path();
            let matches = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&prefix) && n.ends_with(".json"));
            if matches {
                reports.push(path);
            }
        }
        reports.sort();
        Ok(reports)
    }

    pub fn save_configuration_report(
        &self,
        resolve_id: &str,
        conf: &str,
        reports: &[DownloadReport],
    ) -> Result<PathBuf, CacheError> {
        let path = self.configuration_report_path(resolve_id, conf);
        let report = ConfigurationReport::new(resolve_id, conf, reports.to_vec());
        let json = serde_json::to_string_pretty(&report)?;
        fs::create_dir_all(&self.resolution_root).map_err(io_error(&self.resolution_root))?;
        fs::write(&path, json).map_err(io_error(&path))?;
        debug!("Saved report {:?} ({} artifacts)", path, reports.len());
        Ok(path)
    }

    pub fn load_configuration_report(&self, path: &Path) -> Result<ConfigurationReport, CacheError> {
        let json = fs::read_to_string(path).map_err(io_error(path))?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Keep the resolved form of a descriptor (dynamic revisions replaced)
    pub fn save_resolved_descriptor(&self, descriptor: &ModuleDescriptor) -> Result<PathBuf, CacheError> {
        let path = self.resolved_descriptor_path(&descriptor.module_revision_id);
        self.parser.write(descriptor, &path)?;
        Ok(path)
    }

    pub fn resolved_descriptor(&self, mrid: &ModuleRevisionId) -> Option<ModuleDescriptor> {
        let path = self.resolved_descriptor_path(mrid);
        if !path.is_file() {
            return None;
        }
        log_error(
            || self.parser.parse(&path, false),
            "Ignoring unreadable resolved descriptor",
        )
    }

    // Metadata

    fn load_data(&self, mrid: &ModuleRevisionId) -> Result<PropertiesFile, CacheError> {
        let path = self.data_file_path(mrid);
        PropertiesFile::load(&path).map_err(|source| CacheError::Metadata { path, source })
    }

    /// Read-modify-write of a module's metadata, flushed before returning
    ///
    /// Other processes may share the cache directory, so the whole cycle runs
    /// under a lock file next to the data file.
    fn update_data<F>(&self, mrid: &ModuleRevisionId, update: F) -> Result<(), CacheError>
    where
        F: FnOnce(&mut PropertiesFile),
    {
        let _guard = self
            .metadata_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let path = self.data_file_path(mrid);
        let metadata_error = |source| CacheError::Metadata {
            path: path.clone(),
            source,
        };
        let _file_lock = FileLock::acquire(&path, lock::DEFAULT_LOCK_TIMEOUT)
            .map_err(|e| metadata_error(io::Error::new(io::ErrorKind::Other, e)))?
            .ok_or_else(|| {
                metadata_error(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "metadata file is locked by another process",
                ))
            })?;
        let mut data = self.load_data(mrid)?;
        update(&mut data);
        data.save().map_err(|source| CacheError::Metadata {
            path: data.path().to_path_buf(),
            source,
        })
    }

    fn saved_value(&self, mrid: &ModuleRevisionId, key: &str) -> Option<String> {
        log_error(|| self.load_data(mrid), "Cannot read cache metadata")?
            .get(key)
            .map(str::to_string)
    }

    pub fn save_resolver(&self, mrid: &ModuleRevisionId, resolver: &str) -> Result<(), CacheError> {
        trace!("Saving resolver {} for {}", resolver, mrid);
        self.update_data(mrid, |data| data.set(RESOLVER_KEY, resolver))
    }

    pub fn save_artifact_resolver(&self, mrid: &ModuleRevisionId, resolver: &str) -> Result<(), CacheError> {
        trace!("Saving artifact resolver {} for {}", resolver, mrid);
        self.update_data(mrid, |data| data.set(ARTIFACT_RESOLVER_KEY, resolver))
    }

    pub fn saved_resolver_name(&self, mrid: &ModuleRevisionId) -> Option<String> {
        self.saved_value(mrid, RESOLVER_KEY)
    }

    pub fn saved_artifact_resolver_name(&self, mrid: &ModuleRevisionId) -> Option<String> {
        self.saved_value(mrid, ARTIFACT_RESOLVER_KEY)
    }

    pub fn save_artifact_origin(&self, artifact: &Artifact, origin: &ArtifactOrigin) -> Result<(), CacheError> {
        self.update_data(&artifact.module_revision_id, |data| {
            data.set(origin::is_local_key(artifact), origin.is_local.to_string());
            data.set(origin::location_key(artifact), origin.location.clone());
        })
    }

    pub fn saved_artifact_origin(&self, artifact: &Artifact) -> Option<ArtifactOrigin> {
        let data = log_error(
            || self.load_data(&artifact.module_revision_id),
            "Cannot read cache metadata",
        )?;
        let location = data.get(&origin::location_key(artifact))?;
        let is_local = data.get(&origin::is_local_key(artifact)) == Some("true");
        Some(ArtifactOrigin {
            is_local,
            location: location.to_string(),
        })
    }

    pub fn remove_saved_artifact_origin(&self, artifact: &Artifact) -> Result<(), CacheError> {
        self.update_data(&artifact.module_revision_id, |data| {
            data.remove(&origin::is_local_key(artifact));
            data.remove(&origin::location_key(artifact));
        })
    }

    // Locating artifacts

    /// Where `artifact` can be read from
    ///
    /// The cache file when it exists; otherwise the saved local origin if that
    /// file still exists; otherwise the (absent) cache file.
    pub fn locate_artifact(&self, artifact: &Artifact) -> PathBuf {
        let archive = self.archive_path(artifact);
        if archive.exists() {
            return archive;
        }
        let origin = self.saved_artifact_origin(artifact);
        self.locate_artifact_with(artifact, origin.as_ref(), true)
    }

    /// Like `locate_artifact` with an explicit origin and origin policy
    ///
    /// With `use_origin` false this is always the cache path.
    pub fn locate_artifact_with(
        &self,
        artifact: &Artifact,
        origin: Option<&ArtifactOrigin>,
        use_origin: bool,
    ) -> PathBuf {
        if use_origin {
            if let Some(original) = origin
                .and_then(ArtifactOrigin::local_path)
                .filter(|p| p.exists())
            {
                return original;
            }
        }
        self.archive_path(artifact)
    }

    // Descriptors

    /// Store a descriptor in the repository cache under its resolved revision
    pub fn save_descriptor(&self, descriptor: &ModuleDescriptor) -> Result<PathBuf, CacheError> {
        let path = self.descriptor_path(descriptor.resolved_module_revision_id());
        self.parser.write(descriptor, &path)?;
        debug!("Cached descriptor of {} at {:?}", descriptor.resolved_module_revision_id(), path);
        Ok(path)
    }

    /// Cached descriptor for a pinned revision, with the resolvers that produced it
    ///
    /// Misses (dynamic revision, no file, unreadable file, no usable resolver)
    /// are silent: they only make the caller resolve again.
    pub fn find_module_in_cache(
        &self,
        registry: &Registry,
        mrid: &ModuleRevisionId,
        validate: bool,
    ) -> Option<ResolvedModuleRevision> {
        if registry.version_matcher().is_dynamic(mrid) {
            trace!("{} is dynamic, not looking in cache", mrid);
            return None;
        }
        let path = self.descriptor_path(mrid);
        if !path.is_file() {
            trace!("No cached descriptor for {} at {:?}", mrid, path);
            return None;
        }
        let descriptor = match self.parser.parse(&path, validate) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                debug!("Ignoring cached descriptor of {}: {}", mrid, e);
                return None;
            }
        };

        let saved = self.saved_resolver_name(mrid);
        let resolver = match saved.as_deref().and_then(|name| registry.resolver(name)) {
            Some(resolver) => resolver,
            None => {
                debug!(
                    "Resolver {:?} which cached {} is not configured, trying module rules",
                    saved, mrid
                );
                let Some(resolver) = registry.resolver_for_module(&mrid.module_id) else {
                    debug!("No resolver for cached {}, ignoring cache entry", mrid);
                    return None;
                };
                if let Some(name) = resolver.name() {
                    log_error(
                        || self.save_resolver(mrid, name),
                        "Cannot update resolver of cached module",
                    );
                }
                resolver
            }
        };

        let artifact_resolver = self
            .saved_artifact_resolver_name(mrid)
            .and_then(|name| registry.resolver(&name))
            .unwrap_or_else(|| Arc::clone(&resolver));

        debug!("Found {} in cache (resolver {:?})", mrid, resolver.name());
        Some(ResolvedModuleRevision {
            resolver: resolver.name().map(str::to_string),
            artifact_resolver: artifact_resolver.name().map(str::to_string),
            descriptor,
            from_cache: true,
        })
    }

    // Downloads

    /// Bring `artifact` into the cache
    ///
    /// Failures to find or transfer the artifact come back as a FAILED
    /// report. Only interruption while waiting for the artifact lock and a
    /// repository pointing at the cache itself are returned as errors.
    pub fn download(
        &self,
        artifact: &Artifact,
        resource_resolver: &dyn ResourceResolver,
        downloader: &dyn ResourceDownloader,
        options: &DownloadOptions,
    ) -> Result<DownloadReport, CacheError> {
        let start = Instant::now();
        let archive = self.archive_path(artifact);
        let listener = options.listener.as_deref();
        let strategy = self.lock_strategy();

        let locked = match strategy.lock_artifact(artifact, &archive, &options.cancel) {
            Ok(locked) => locked,
            Err(LockError::Interrupted(_)) => {
                warn!("Interrupted while waiting for lock on {}", artifact);
                return Err(CacheError::Interrupted {
                    artifact: artifact.to_string(),
                });
            }
            Err(e) => {
                let mut report = DownloadReport::failed(artifact.clone(), e.to_string());
                report.elapsed_ms = elapsed_millis(start);
                if let Some(l) = listener {
                    l.end_artifact_download(&report, &archive);
                }
                return Ok(report);
            }
        };
        if !locked {
            let mut report = DownloadReport::failed(
                artifact.clone(),
                format!("failed to acquire lock on {:?}", archive),
            );
            report.elapsed_ms = elapsed_millis(start);
            if let Some(l) = listener {
                l.end_artifact_download(&report, &archive);
            }
            return Ok(report);
        }
        let _guard = LockGuard {
            strategy: strategy.as_ref(),
            artifact,
            path: &archive,
        };

        if let Some(l) = listener {
            l.need_artifact(artifact);
        }

        let mut report = DownloadReport::new(artifact.clone());
        let saved_origin = self.saved_artifact_origin(artifact);
        let target = self.locate_artifact_with(artifact, saved_origin.as_ref(), options.use_origin);
        let outcome = if target.exists() && !options.force {
            trace!("{} already available at {:?}", artifact, target);
            report.size = with_default(
                || fs::metadata(&target).map(|m| m.len()),
                0,
                "Cannot read size of cached artifact",
            );
            report.origin = saved_origin;
            report.local_file = Some(target);
            Ok(())
        } else {
            self.fetch(artifact, &archive, resource_resolver, downloader, options, &mut report)
        };
        report.elapsed_ms = elapsed_millis(start);

        let fatal = match outcome {
            Ok(()) => None,
            Err(e) if e.is_fatal() => {
                error!("{}", e);
                report.status = DownloadStatus::Failed;
                report.details = e.to_string();
                Some(e)
            }
            Err(e) => {
                debug!("Download of {} failed: {}", artifact, e);
                report.status = DownloadStatus::Failed;
                report.details = e.to_string();
                report.local_file = None;
                None
            }
        };

        if let Some(l) = listener {
            l.end_artifact_download(&report, &archive);
        }
        match fatal {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    /// Locate and transfer; runs with the artifact lock held
    fn fetch(
        &self,
        artifact: &Artifact,
        archive: &Path,
        resource_resolver: &dyn ResourceResolver,
        downloader: &dyn ResourceDownloader,
        options: &DownloadOptions,
        report: &mut DownloadReport,
    ) -> Result<(), CacheError> {
        let transfer_error = |e: anyhow::Error| CacheError::Transfer {
            artifact: artifact.to_string(),
            message: format!("{:#}", e),
        };
        let resource = resource_resolver
            .resolve(artifact)
            .map_err(transfer_error)?
            .ok_or_else(|| CacheError::ArtifactMissing(artifact.to_string()))?;
        let origin = resource.origin();

        if options.use_origin {
            if let Some(original) = origin.local_path() {
                self.save_artifact_origin(artifact, &origin)?;
                report.size = fs::metadata(&original)
                    .map_err(io_error(&original))?
                    .len();
                report.status = DownloadStatus::No;
                report.origin = Some(origin);
                report.local_file = Some(original);
                return Ok(());
            }
        }

        if let Some(source) = resource.local_path() {
            if is_same_file(&source, archive) {
                return Err(CacheError::CacheAsRepository {
                    artifact: artifact.to_string(),
                    path: archive.to_path_buf(),
                });
            }
        }

        if let Some(l) = options.listener.as_deref() {
            l.start_artifact_download(artifact, &resource, archive);
        }
        if options.cancel.is_cancelled() {
            return Err(CacheError::Transfer {
                artifact: artifact.to_string(),
                message: "interrupted".to_string(),
            });
        }

        let existed = archive.exists();
        let size = match downloader.download(artifact, &resource, archive) {
            Ok(size) => size,
            Err(e) => {
                if !existed && archive.exists() {
                    let _ = fs::remove_file(archive);
                }
                return Err(transfer_error(e));
            }
        };
        self.save_artifact_origin(artifact, &origin)?;
        debug!("Downloaded {} ({} bytes) from {}", artifact, size, origin.location);
        report.size = size;
        report.status = DownloadStatus::Successful;
        report.origin = Some(origin);
        report.local_file = Some(archive.to_path_buf());
        Ok(())
    }
}

/// Same file on disk, including through symlinks or `..` components
fn is_same_file(source: &Path, archive: &Path) -> bool {
    let canonical = |p: &Path| -> Option<PathBuf> {
        match fs::canonicalize(p) {
            Ok(c) => Some(c),
            Err(_) => {
                let parent = fs::canonicalize(p.parent()?).ok()?;
                Some(parent.join(p.file_name()?))
            }
        }
    };
    match (canonical(source), canonical(archive)) {
        (Some(a), Some(b)) => a == b,
        _ => source == archive,
    }
}

impl fmt::Display for CacheManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cache: {}", self.repository_root.display())
    }
}

impl fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheManager")
            .field("repository_root", &self.repository_root)
            .field("resolution_root", &self.resolution_root)
            .field("settings", &self.settings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::id::ModuleRevisionId;

    fn cache(dir: &Path) -> CacheManager {
        CacheManager::new(CacheSettings::default(), Some(dir.to_path_buf()))
    }

    fn jar() -> Artifact {
        Artifact::new(ModuleRevisionId::parts("org", "core", "1.0"), "core", "jar", "jar")
    }

    #[test]
    fn test_paths() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());
        let mrid = ModuleRevisionId::parts("org", "core", "1.0");
        assert_eq!(
            cache.archive_path(&jar()),
            dir.path().join("org/core/jars/core-1.0.jar")
        );
        assert_eq!(
            cache.descriptor_path(&mrid),
            dir.path().join("org/core/descriptor-1.0.toml")
        );
        assert_eq!(
            cache.data_file_path(&mrid),
            dir.path().join("org/core/cachedata-1.0.properties")
        );
        assert_eq!(
            cache.configuration_report_path("app", "compile"),
            dir.path().join("app-compile.json")
        );
        assert_eq!(cache.to_string(), format!("cache: {}", dir.path().display()));
    }

    #[test]
    fn test_separate_roots() {
        let dir = tempfile::tempdir().unwrap();
        let settings = CacheSettings {
            resolution_cache_dir: Some(dir.path().join("resolution")),
            ..CacheSettings::default()
        };
        let cache = CacheManager::new(settings, Some(dir.path().join("repo")));
        let mrid = ModuleRevisionId::parts("org", "core", "1.0");
        assert_eq!(cache.repository_root(), dir.path().join("repo"));
        assert_eq!(
            cache.resolved_descriptor_path(&mrid),
            dir.path().join("resolution/resolved-org-core-1.0.toml")
        );
        assert_eq!(
            cache.resolved_properties_path(&mrid),
            dir.path().join("resolution/resolved-org-core-1.0.properties")
        );
    }

    #[test]
    fn test_resolver_provenance() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());
        let mrid = ModuleRevisionId::parts("org", "core", "1.0");
        assert!(cache.saved_resolver_name(&mrid).is_none());

        cache.save_resolver(&mrid, "local").unwrap();
        cache.save_artifact_resolver(&mrid, "shared").unwrap();
        assert_eq!(cache.saved_resolver_name(&mrid).as_deref(), Some("local"));
        assert_eq!(cache.saved_artifact_resolver_name(&mrid).as_deref(), Some("shared"));
    }

    #[test]
    fn test_artifact_origin_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());
        let origin = ArtifactOrigin::remote("https://repo.example/org/core-1.0.jar");

        cache.save_artifact_origin(&jar(), &origin).unwrap();
        assert_eq!(cache.saved_artifact_origin(&jar()), Some(origin));
        cache.remove_saved_artifact_origin(&jar()).unwrap();
        assert!(cache.saved_artifact_origin(&jar()).is_none());
    }

    #[test]
    fn test_locate_artifact_prefers_existing_local_origin() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&dir.path().join("cache"));
        let original = dir.path().join("core.jar");
        fs::write(&original, b"jar").unwrap();

        assert_eq!(cache.locate_artifact(&jar()), cache.archive_path(&jar()));
        cache
            .save_artifact_origin(&jar(), &ArtifactOrigin::local(&original))
            .unwrap();
        assert_eq!(cache.locate_artifact(&jar()), original);
        assert_eq!(
            cache.locate_artifact_with(&jar(), Some(&ArtifactOrigin::local(&original)), false),
            cache.archive_path(&jar())
        );

        fs::remove_file(&original).unwrap();
        assert_eq!(cache.locate_artifact(&jar()), cache.archive_path(&jar()));
    }

    #[test]
    fn test_configuration_reports() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());
        assert!(cache.configuration_reports("app").unwrap().is_empty());

        let reports = vec![
            DownloadReport::new(jar()),
            DownloadReport::failed(jar(), "artifact missing"),
        ];
        cache.save_configuration_report("app", "compile", &reports).unwrap();
        cache.save_configuration_report("app", "test", &reports[..1]).unwrap();
        cache.save_configuration_report("other", "compile", &[]).unwrap();

        let paths = cache.configuration_reports("app").unwrap();
        assert_eq!(paths.len(), 2);
        let loaded = cache.load_configuration_report(&paths[0]).unwrap();
        assert_eq!(loaded.conf, "compile");
        assert!(loaded.has_failures());
        assert_eq!(loaded.artifacts, reports);
    }

    #[test]
    fn test_unknown_lock_strategy_falls_back() {
        let settings = CacheSettings {
            lock_strategy: "nope".to_string(),
            ..CacheSettings::default()
        };
        let cache = CacheManager::new(settings, None);
        assert_eq!(cache.lock_strategy().name(), lock::NO_LOCK);
    }
}
