//! Local filesystem repository resolver
//!
//! The repository is a directory tree described by a descriptor pattern and
//! an artifact pattern, e.g.
//!
//! ```text
//! [organisation]/[module]/[revision]/descriptor.toml
//! [organisation]/[module]/[revision]/[artifact].[ext]
//! ```
//!
//! Dynamic revisions are resolved by listing the directory level holding
//! `[revision]`, which must then be a whole path segment.

use anyhow::Result as AnyResult;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::cache::pattern::{self, REVISION};
use crate::cache::{DownloadOptions, DownloadReport, FileResourceDownloader, ResolvedResource, ResourceResolver};
use crate::config::ResolverSettings;
use crate::module::artifact::Artifact;
use crate::module::dependency::DependencyEdge;
use crate::module::descriptor::TomlDescriptorParser;
use crate::module::id::ModuleRevisionId;
use crate::module::traits::DescriptorParser;
use crate::namespace::{Direction, Namespace};
use crate::registry::Registry;
use crate::resolver::factory::context_from_settings;
use crate::resolver::{DependencyResolver, ResolveData, ResolvedModuleRevision, ResolverContext, ResolverError};

pub const FILESYSTEM_KIND: &str = "filesystem";

pub const DEFAULT_DESCRIPTOR_PATTERN: &str = "[organisation]/[module]/[revision]/descriptor.toml";
pub const DEFAULT_ARTIFACT_PATTERN: &str = "[organisation]/[module]/[revision]/[artifact].[ext]";

#[derive(Debug)]
pub struct FileSystemResolver {
    context: ResolverContext,
    root: PathBuf,
    descriptor_pattern: String,
    artifact_pattern: String,
    parser: TomlDescriptorParser,
}

impl FileSystemResolver {
    pub fn new(context: ResolverContext, root: impl Into<PathBuf>) -> Self {
        Self {
            context,
            root: root.into(),
            descriptor_pattern: DEFAULT_DESCRIPTOR_PATTERN.to_string(),
            artifact_pattern: DEFAULT_ARTIFACT_PATTERN.to_string(),
            parser: TomlDescriptorParser,
        }
    }

    /// Resolver for `settings`, with its namespace looked up in `registry`
    pub fn from_settings(settings: &ResolverSettings, registry: &Registry) -> Result<Self, ResolverError> {
        let root = settings.root.clone().ok_or_else(|| ResolverError::Configuration {
            resolver: settings.name.clone(),
            message: "filesystem resolver needs a root".to_string(),
        })?;
        let mut resolver = Self::new(context_from_settings(settings, registry), root);
        if let Some(p) = &settings.descriptor_pattern {
            resolver.descriptor_pattern = p.clone();
        }
        if let Some(p) = &settings.artifact_pattern {
            resolver.artifact_pattern = p.clone();
        }
        Ok(resolver)
    }

    pub fn with_patterns(mut self, descriptor_pattern: impl Into<String>, artifact_pattern: impl Into<String>) -> Self {
        self.descriptor_pattern = descriptor_pattern.into();
        self.artifact_pattern = artifact_pattern.into();
        self
    }

    pub fn context_mut(&mut self) -> &mut ResolverContext {
        &mut self.context
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Descriptor location for a revision id in this repository's namespace
    pub fn descriptor_file(&self, mrid: &ModuleRevisionId) -> PathBuf {
        self.root
            .join(pattern::substitute_module(&self.descriptor_pattern, mrid))
    }

    /// Artifact location for an artifact in this repository's namespace
    pub fn artifact_file(&self, artifact: &Artifact) -> PathBuf {
        self.root
            .join(pattern::substitute_artifact(&self.artifact_pattern, artifact))
    }

    /// Repository file for a system-space artifact, if present
    fn find_artifact(&self, artifact: &Artifact, namespace: &Namespace) -> Option<ResolvedResource> {
        let private = namespace.transform_artifact(artifact, Direction::FromSystem);
        let path = self.artifact_file(&private);
        if !path.is_file() {
            debug!("{:?}: no {} at {:?}", self.name(), private, path);
            return None;
        }
        Some(ResolvedResource::local(
            path,
            private.module_revision_id.revision.clone(),
        ))
    }

    fn io_error(&self, source: std::io::Error) -> ResolverError {
        ResolverError::Io {
            resolver: self.name().unwrap_or_default().to_string(),
            source,
        }
    }

    /// Revisions of `mrid`'s module present in the repository
    pub fn list_revisions(&self, mrid: &ModuleRevisionId) -> Result<Vec<String>, ResolverError> {
        let Some(prefix) = pattern::prefix_before_segment(&self.descriptor_pattern, REVISION) else {
            debug!(
                "{:?}: cannot list revisions, [revision] is not a directory in {}",
                self.name(),
                self.descriptor_pattern
            );
            return Ok(Vec::new());
        };
        let dir = self.root.join(pattern::substitute_module(prefix, mrid));
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_error(e)),
        };
        let mut revisions = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| self.io_error(e))?;
            if !entry.file_type().map_err(|e| self.io_error(e))?.is_dir() {
                continue;
            }
            if let Some(revision) = entry.file_name().to_str() {
                if self.descriptor_file(&mrid.with_revision(revision)).is_file() {
                    revisions.push(revision.to_string());
                }
            }
        }
        Ok(revisions)
    }

    /// Concrete revision for `mrid` (private namespace), `None` when nothing matches
    fn find_revision(
        &self,
        registry: &Registry,
        mrid: &ModuleRevisionId,
    ) -> Result<Option<ModuleRevisionId>, ResolverError> {
        let version_matcher = registry.version_matcher();
        if !version_matcher.is_dynamic(mrid) {
            return Ok(self.descriptor_file(mrid).is_file().then(|| mrid.clone()));
        }
        let candidates: Vec<String> = self
            .list_revisions(mrid)?
            .into_iter()
            .filter(|rev| version_matcher.accept(&mrid.revision, rev))
            .collect();
        let latest = self.context.latest_strategy(registry);
        let found = latest.find_latest(&candidates).map(|rev| mrid.with_revision(rev.as_str()));
        debug!(
            "{:?}: {} candidates for {}, {} picked {:?}",
            self.name(),
            candidates.len(),
            mrid,
            latest.name(),
            found.as_ref().map(|m| &m.revision)
        );
        Ok(found)
    }
}

impl DependencyResolver for FileSystemResolver {
    fn context(&self) -> &ResolverContext {
        &self.context
    }

    fn type_name(&self) -> &'static str {
        FILESYSTEM_KIND
    }

    fn location(&self) -> Option<String> {
        Some(self.root.display().to_string())
    }

    fn get_dependency(
        &self,
        dd: &DependencyEdge,
        data: &ResolveData<'_>,
    ) -> Result<Option<ResolvedModuleRevision>, ResolverError> {
        let registry = data.registry;
        let system_mrid = dd.target();
        let changing = dd.is_changing() || self.context.is_changing(registry, system_mrid)?;

        if changing {
            debug!("{:?}: {} is changing, skipping cache", self.name(), system_mrid);
        } else if let Some(cached) =
            self.context
                .find_module_in_cache(registry, data.cache, system_mrid, data.validate)
        {
            return Ok(Some(cached));
        }

        let namespace = self.context.namespace(Some(registry));
        let private_dd = namespace.transform_dependency(dd, Direction::FromSystem);
        let Some(private_mrid) = self.find_revision(registry, private_dd.target())? else {
            debug!("{:?}: {} not found", self.name(), private_dd.target());
            return Ok(None);
        };

        let path = self.descriptor_file(&private_mrid);
        let parsed = self
            .parser
            .parse(&path, self.context.do_validate(data.validate))?;
        let mut descriptor = namespace.transform_descriptor(&parsed, Direction::ToSystem);
        let resolved = namespace.to_system(&private_mrid);
        if registry.version_matcher().is_dynamic(system_mrid) {
            descriptor.resolved_module_revision_id = Some(resolved.clone());
        }

        data.cache.save_descriptor(&descriptor)?;
        if let Some(name) = self.name() {
            data.cache.save_resolver(&resolved, name)?;
            data.cache.save_artifact_resolver(&resolved, name)?;
        }
        if registry.version_matcher().is_dynamic(system_mrid) {
            data.cache.save_resolved_descriptor(&descriptor)?;
        }
        info!("{:?}: found {} in {:?}", self.name(), resolved, path);

        Ok(Some(ResolvedModuleRevision {
            resolver: self.name().map(str::to_string),
            artifact_resolver: self.name().map(str::to_string),
            descriptor,
            from_cache: false,
        }))
    }

    fn download(
        &self,
        artifacts: &[Artifact],
        options: &DownloadOptions,
        data: &ResolveData<'_>,
    ) -> Result<Vec<DownloadReport>, ResolverError> {
        let lookup = NamespacedLookup {
            resolver: self,
            namespace: self.context.namespace(Some(data.registry)),
        };
        let mut reports = Vec::with_capacity(artifacts.len());
        for artifact in artifacts {
            let report = data
                .cache
                .download(artifact, &lookup, &FileResourceDownloader, options)?;
            if report.is_failed() {
                self.report_failure(Some(artifact));
            }
            reports.push(report);
        }
        Ok(reports)
    }
}

/// Artifact lookups in the explicitly bound namespace, or the system one
impl ResourceResolver for FileSystemResolver {
    fn resolve(&self, artifact: &Artifact) -> AnyResult<Option<ResolvedResource>> {
        Ok(self.find_artifact(artifact, &self.context.namespace(None)))
    }
}

/// Lookups in the namespace a registry resolved for this resolver
struct NamespacedLookup<'a> {
    resolver: &'a FileSystemResolver,
    namespace: Arc<Namespace>,
}

impl ResourceResolver for NamespacedLookup<'_> {
    fn resolve(&self, artifact: &Artifact) -> AnyResult<Option<ResolvedResource>> {
        Ok(self.resolver.find_artifact(artifact, &self.namespace))
    }
}
