//! Module descriptors
//!
//! A descriptor lists a module revision's configurations, published
//! artifacts and dependency edges. Descriptors are stored as TOML both in
//! repositories and in the repository cache.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::module::artifact::Artifact;
use crate::module::dependency::{DependencyEdge, WILDCARD};
use crate::module::id::ModuleRevisionId;
use crate::module::traits::{DescriptorParser, ModuleError};

fn default_status() -> String {
    "integration".to_string()
}

fn default_true() -> bool {
    true
}

/// A named usage scope of a module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    pub name: String,
    #[serde(default = "default_true")]
    pub public: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extends: Vec<String>,
}

impl Configuration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            public: true,
            extends: Vec::new(),
        }
    }
}

/// An artifact as declared in a descriptor, before it is bound to a revision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedArtifact {
    pub name: String,
    #[serde(rename = "type")]
    pub artifact_type: String,
    pub ext: String,
    /// Configurations publishing this artifact; empty means all of them
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub confs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    #[serde(default = "default_status")]
    pub status: String,
    pub module_revision_id: ModuleRevisionId,
    /// Concrete revision when `module_revision_id` was asked with a dynamic one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_module_revision_id: Option<ModuleRevisionId>,
    #[serde(default, rename = "configuration", skip_serializing_if = "Vec::is_empty")]
    pub configurations: Vec<Configuration>,
    #[serde(default, rename = "artifact", skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<PublishedArtifact>,
    #[serde(default, rename = "dependency", skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<DependencyEdge>,
}

impl ModuleDescriptor {
    pub fn new(module_revision_id: ModuleRevisionId) -> Self {
        Self {
            status: default_status(),
            module_revision_id,
            resolved_module_revision_id: None,
            configurations: Vec::new(),
            artifacts: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    pub fn resolved_module_revision_id(&self) -> &ModuleRevisionId {
        self.resolved_module_revision_id
            .as_ref()
            .unwrap_or(&self.module_revision_id)
    }

    pub fn configuration_names(&self) -> Vec<&str> {
        self.configurations.iter().map(|c| c.name.as_str()).collect()
    }

    /// Artifacts published in `conf`, bound to the resolved revision
    pub fn artifacts_for(&self, conf: &str) -> Vec<Artifact> {
        let mrid = self.resolved_module_revision_id();
        self.artifacts
            .iter()
            .filter(|a| {
                conf == WILDCARD || a.confs.is_empty() || a.confs.iter().any(|c| c == conf)
            })
            .map(|a| Artifact::new(mrid.clone(), &a.name, &a.artifact_type, &a.ext))
            .collect()
    }

    /// Every published artifact, bound to the resolved revision
    pub fn all_artifacts(&self) -> Vec<Artifact> {
        self.artifacts_for(WILDCARD)
    }

    /// Structural checks applied when a descriptor is parsed with validation on
    pub fn validate(&self) -> Result<(), ModuleError> {
        let mrid = &self.module_revision_id;
        if mrid.organisation().is_empty() || mrid.name().is_empty() {
            return Err(ModuleError::InvalidDescriptor(format!(
                "missing organisation or name in {}",
                mrid
            )));
        }
        if mrid.revision.is_empty() {
            return Err(ModuleError::InvalidDescriptor(format!(
                "missing revision in {}",
                mrid
            )));
        }
        let names = self.configuration_names();
        for conf in &self.configurations {
            for parent in &conf.extends {
                if !names.contains(&parent.as_str()) {
                    return Err(ModuleError::InvalidDescriptor(format!(
                        "configuration '{}' of {} extends unknown configuration '{}'",
                        conf.name, mrid, parent
                    )));
                }
            }
        }
        for dependency in &self.dependencies {
            dependency.validate()?;
        }
        Ok(())
    }
}

/// Descriptor parser for the TOML format
#[derive(Debug, Clone, Copy, Default)]
pub struct TomlDescriptorParser;

impl DescriptorParser for TomlDescriptorParser {
    fn parse(&self, path: &Path, validate: bool) -> Result<ModuleDescriptor, ModuleError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ModuleError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let descriptor: ModuleDescriptor =
            toml::from_str(&contents).map_err(|e| ModuleError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        if validate {
            descriptor.validate()?;
        }
        debug!("Parsed descriptor {:?} for {}", path, descriptor.module_revision_id);
        Ok(descriptor)
    }

    fn write(&self, descriptor: &ModuleDescriptor, path: &Path) -> Result<(), ModuleError> {
        let contents = toml::to_string_pretty(descriptor)?;
        let io_err = |source| ModuleError::Io {
            path: path.to_path_buf(),
            source,
        };
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent).map_err(io_err)?;
        let mut tmp = NamedTempFile::new_in(parent).map_err(io_err)?;
        tmp.write_all(contents.as_bytes()).map_err(io_err)?;
        tmp.persist(path).map_err(|e| io_err(e.error))?;
        Ok(())
    }
}
