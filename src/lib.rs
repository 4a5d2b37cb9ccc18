//! modresolve - module dependency resolution
//!
//! Resolvers locate module descriptors and artifacts in repositories. A
//! shared `CacheManager` stores what they find together with provenance
//! metadata (which resolver produced a module, where an artifact came from)
//! and serializes concurrent downloads through a pluggable lock strategy.
//!
//! ## Layout
//!
//! 1. `module`: identifiers, artifacts, dependency edges, descriptors
//! 2. `matcher`, `version`: pattern matchers and latest-revision strategies
//! 3. `namespace`: id translation between a repository and the system space
//! 4. `registry`: the explicit context holding named strategies, matchers,
//!    namespaces and resolvers
//! 5. `resolver`: `ResolverContext` and the resolver implementations
//! 6. `cache`: repository and resolution caches, locking, downloads
//! 7. `config`: TOML settings that build a registry and a cache

pub mod cache;
pub mod config;
pub mod matcher;
pub mod module;
pub mod namespace;
pub mod registry;
pub mod resolver;
pub mod utils;
pub mod version;

pub use cache::{CacheError, CacheManager, CacheSettings, DownloadOptions, DownloadReport, DownloadStatus};
pub use config::{ConfigError, ResolveSettings, ResolverSettings};
pub use module::{Artifact, DependencyEdge, ModuleDescriptor, ModuleId, ModuleRevisionId};
pub use namespace::Namespace;
pub use registry::Registry;
pub use resolver::{
    DependencyResolver, FileSystemResolver, ResolveData, ResolvedModuleRevision, ResolverContext,
    ResolverError,
};
