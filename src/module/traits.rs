//! Module model traits and errors
//!
//! Defines the descriptor parser seam and the errors raised while building
//! or reading module metadata.

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::module::descriptor::ModuleDescriptor;

/// Module model errors
#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("Empty {0} name")]
    EmptyConfigurationName(String),

    #[error("Cannot read descriptor {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot parse descriptor {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid module descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<toml::ser::Error> for ModuleError {
    fn from(e: toml::ser::Error) -> Self {
        ModuleError::SerializationError(e.to_string())
    }
}

/// Reads and writes module descriptor files
///
/// The on-disk descriptor format is an external contract; the cache and the
/// resolvers only depend on this trait.
pub trait DescriptorParser: Send + Sync {
    /// Parse the descriptor at `path`, checking its invariants when `validate` is set
    fn parse(&self, path: &Path, validate: bool) -> Result<ModuleDescriptor, ModuleError>;

    /// Write `descriptor` to `path`, replacing any previous content
    fn write(&self, descriptor: &ModuleDescriptor, path: &Path) -> Result<(), ModuleError>;
}
