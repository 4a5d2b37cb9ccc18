//! Module model
//!
//! Identities, artifacts, dependency edges and descriptors shared by the
//! resolvers and the cache.

pub mod artifact;
pub mod dependency;
pub mod descriptor;
pub mod id;
pub mod traits;

pub use artifact::Artifact;
pub use dependency::{ArtifactFilter, DependencyEdge, FilterKind, WILDCARD};
pub use descriptor::{Configuration, ModuleDescriptor, PublishedArtifact, TomlDescriptorParser};
pub use id::{ArtifactId, ModuleId, ModuleRevisionId};
pub use traits::{DescriptorParser, ModuleError};
