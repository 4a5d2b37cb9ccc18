//! Artifacts published by a module revision

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::module::id::{ArtifactId, ModuleRevisionId};

/// Name/type/ext used for the module descriptor itself when it is stored
/// in the repository cache like any other artifact.
pub const DESCRIPTOR_ARTIFACT_NAME: &str = "descriptor";
pub const DESCRIPTOR_ARTIFACT_TYPE: &str = "descriptor";
pub const DESCRIPTOR_ARTIFACT_EXT: &str = "toml";

/// An artifact of a module revision
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Artifact {
    pub module_revision_id: ModuleRevisionId,
    pub name: String,
    #[serde(rename = "type")]
    pub artifact_type: String,
    pub ext: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
    /// Explicit location the artifact is published at, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Artifact {
    pub fn new(
        module_revision_id: ModuleRevisionId,
        name: impl Into<String>,
        artifact_type: impl Into<String>,
        ext: impl Into<String>,
    ) -> Self {
        Self {
            module_revision_id,
            name: name.into(),
            artifact_type: artifact_type.into(),
            ext: ext.into(),
            extra: BTreeMap::new(),
            url: None,
        }
    }

    /// The artifact standing for a module's descriptor file
    pub fn descriptor(module_revision_id: ModuleRevisionId) -> Self {
        Self::new(
            module_revision_id,
            DESCRIPTOR_ARTIFACT_NAME,
            DESCRIPTOR_ARTIFACT_TYPE,
            DESCRIPTOR_ARTIFACT_EXT,
        )
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn id(&self) -> ArtifactId {
        ArtifactId {
            module_revision_id: self.module_revision_id.clone(),
            name: self.name.clone(),
            artifact_type: self.artifact_type.clone(),
            ext: self.ext.clone(),
            extra: self.extra.clone(),
        }
    }

    /// Same artifact attached to another module revision
    pub fn with_module_revision_id(&self, module_revision_id: ModuleRevisionId) -> Self {
        Self {
            module_revision_id,
            ..self.clone()
        }
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}
