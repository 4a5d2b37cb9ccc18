//! Artifact origins
//!
//! Where the bytes of a cached artifact came from, and the metadata keys
//! used to persist that per artifact.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;

use crate::module::artifact::Artifact;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactOrigin {
    pub is_local: bool,
    /// Local path or URL
    pub location: String,
}

impl ArtifactOrigin {
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self {
            is_local: true,
            location: path.into().to_string_lossy().into_owned(),
        }
    }

    pub fn remote(location: impl Into<String>) -> Self {
        Self {
            is_local: false,
            location: location.into(),
        }
    }

    /// The original file, for local origins
    pub fn local_path(&self) -> Option<PathBuf> {
        self.is_local.then(|| PathBuf::from(&self.location))
    }
}

impl fmt::Display for ArtifactOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_local { "local" } else { "remote" };
        write!(f, "ArtifactOrigin {{ {}: {} }}", kind, self.location)
    }
}

/// Metadata key prefix for one artifact: `artifact:<name>#<type>#<ext>#<hash8>`
///
/// The hash covers the full artifact id (owner revision, extra attributes)
/// and is truncated to 8 hex digits; two distinct ids sharing name, type,
/// ext and hash prefix would share an entry.
pub fn origin_key(artifact: &Artifact) -> String {
    let digest = Sha256::digest(artifact.id().to_string().as_bytes());
    let hash = hex::encode(&digest[..4]);
    format!(
        "artifact:{}#{}#{}#{}",
        artifact.name, artifact.artifact_type, artifact.ext, hash
    )
}

pub fn location_key(artifact: &Artifact) -> String {
    format!("{}.location", origin_key(artifact))
}

pub fn is_local_key(artifact: &Artifact) -> String {
    format!("{}.is-local", origin_key(artifact))
}
