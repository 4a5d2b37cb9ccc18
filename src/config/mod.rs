//! Resolve settings
//!
//! Settings are read from TOML, validated once, then turned into the
//! `Registry` and `CacheManager` used by a resolution run.
//!
//! ```toml
//! default_cache = "/var/cache/modresolve"
//! lock_strategy = "artifact-lock"
//! default_resolver = "local"
//!
//! [[resolvers]]
//! kind = "filesystem"
//! name = "local"
//! root = "/srv/repository"
//! changing_pattern = ".*-SNAPSHOT"
//!
//! [[modules]]
//! organisation = "org.acme"
//! resolver = "local"
//!
//! [logging]
//! filter = "modresolve=debug"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::cache::{self, lock, CacheManager, CacheSettings, DownloadOptions};
use crate::matcher::{MatcherError, ANY_EXPRESSION, EXACT_OR_REGEXP};
use crate::namespace::{Namespace, NamespaceError, NamespaceSpec};
use crate::registry::Registry;
use crate::resolver::{builtin_factories, ResolverError};
use crate::utils::{env_bool, env_opt, env_path};
use crate::version::DEFAULT_STRATEGY_NAME;

/// Overrides `default_cache` when set
pub const CACHE_DIR_ENV: &str = "MODRESOLVE_CACHE_DIR";

/// Overrides `use_origin` when set
pub const USE_ORIGIN_ENV: &str = "MODRESOLVE_USE_ORIGIN";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read settings {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse settings: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid setting {setting}: {message}")]
    Invalid { setting: String, message: String },

    #[error("resolver '{resolver}' has unknown kind '{kind}'")]
    UnknownResolverKind { resolver: String, kind: String },

    #[error("{setting} refers to unknown {what} '{name}'")]
    UnknownReference {
        setting: String,
        what: &'static str,
        name: String,
    },

    #[error(transparent)]
    Namespace(#[from] NamespaceError),

    #[error(transparent)]
    Matcher(#[from] MatcherError),

    #[error(transparent)]
    Resolver(#[from] ResolverError),
}

fn invalid(setting: impl Into<String>, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        setting: setting.into(),
        message: message.into(),
    }
}

fn default_true() -> bool {
    true
}

fn default_cache() -> PathBuf {
    PathBuf::from(".modresolve/cache")
}

fn default_descriptor_pattern() -> String {
    cache::DEFAULT_DESCRIPTOR_PATTERN.to_string()
}

fn default_artifact_pattern() -> String {
    cache::DEFAULT_ARTIFACT_PATTERN.to_string()
}

fn default_data_file_pattern() -> String {
    cache::DEFAULT_DATA_FILE_PATTERN.to_string()
}

fn default_resolved_descriptor_pattern() -> String {
    cache::DEFAULT_RESOLVED_DESCRIPTOR_PATTERN.to_string()
}

fn default_resolved_properties_pattern() -> String {
    cache::DEFAULT_RESOLVED_PROPERTIES_PATTERN.to_string()
}

fn default_lock_strategy() -> String {
    lock::NO_LOCK.to_string()
}

fn default_resolver_kind() -> String {
    crate::resolver::filesystem::FILESYSTEM_KIND.to_string()
}

fn default_changing_matcher() -> String {
    EXACT_OR_REGEXP.to_string()
}

fn any_expression() -> String {
    ANY_EXPRESSION.to_string()
}

/// Logging configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log filter (e.g. "info", "modresolve::cache=debug"); RUST_LOG takes precedence
    #[serde(default)]
    pub filter: Option<String>,

    /// Emit JSON lines (needs the `json-logging` feature)
    #[serde(default)]
    pub json_format: bool,
}

/// One configured resolver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverSettings {
    /// Factory key
    #[serde(default = "default_resolver_kind")]
    pub kind: String,

    pub name: String,

    /// Repository root, for kinds that have one
    #[serde(default)]
    pub root: Option<PathBuf>,

    #[serde(default)]
    pub descriptor_pattern: Option<String>,

    #[serde(default)]
    pub artifact_pattern: Option<String>,

    /// Revisions matching this expression are changing
    #[serde(default)]
    pub changing_pattern: Option<String>,

    #[serde(default = "default_changing_matcher")]
    pub changing_matcher: String,

    #[serde(default)]
    pub namespace: Option<String>,

    /// Latest strategy name
    #[serde(default)]
    pub latest: Option<String>,

    /// Unset inherits the caller's choice
    #[serde(default)]
    pub validate: Option<bool>,
}

impl ResolverSettings {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            kind: default_resolver_kind(),
            name: name.into(),
            root: None,
            descriptor_pattern: None,
            artifact_pattern: None,
            changing_pattern: None,
            changing_matcher: default_changing_matcher(),
            namespace: None,
            latest: None,
            validate: None,
        }
    }
}

/// Routes matching modules to a resolver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRuleSettings {
    #[serde(default = "any_expression")]
    pub organisation: String,

    #[serde(default = "any_expression")]
    pub name: String,

    #[serde(default)]
    pub matcher: Option<String>,

    pub resolver: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveSettings {
    /// Base directory of both caches
    #[serde(default = "default_cache")]
    pub default_cache: PathBuf,

    #[serde(default)]
    pub repository_cache_dir: Option<PathBuf>,

    #[serde(default)]
    pub resolution_cache_dir: Option<PathBuf>,

    #[serde(default = "default_descriptor_pattern")]
    pub descriptor_pattern: String,

    #[serde(default = "default_artifact_pattern")]
    pub artifact_pattern: String,

    #[serde(default = "default_data_file_pattern")]
    pub data_file_pattern: String,

    #[serde(default = "default_resolved_descriptor_pattern")]
    pub resolved_descriptor_pattern: String,

    #[serde(default = "default_resolved_properties_pattern")]
    pub resolved_properties_pattern: String,

    /// `no-lock`, `artifact-lock` or `in-process`
    #[serde(default = "default_lock_strategy")]
    pub lock_strategy: String,

    #[serde(default = "default_true")]
    pub validate: bool,

    /// Use local artifacts in place instead of copying them into the cache
    #[serde(default)]
    pub use_origin: bool,

    #[serde(default)]
    pub default_resolver: Option<String>,

    #[serde(default)]
    pub default_latest_strategy: Option<String>,

    #[serde(default)]
    pub resolvers: Vec<ResolverSettings>,

    #[serde(default)]
    pub namespaces: Vec<NamespaceSpec>,

    #[serde(default)]
    pub modules: Vec<ModuleRuleSettings>,

    #[serde(default)]
    pub logging: Option<LoggingConfig>,
}

impl Default for ResolveSettings {
    fn default() -> Self {
        Self {
            default_cache: default_cache(),
            repository_cache_dir: None,
            resolution_cache_dir: None,
            descriptor_pattern: default_descriptor_pattern(),
            artifact_pattern: default_artifact_pattern(),
            data_file_pattern: default_data_file_pattern(),
            resolved_descriptor_pattern: default_resolved_descriptor_pattern(),
            resolved_properties_pattern: default_resolved_properties_pattern(),
            lock_strategy: default_lock_strategy(),
            validate: true,
            use_origin: false,
            default_resolver: None,
            default_latest_strategy: None,
            resolvers: Vec::new(),
            namespaces: Vec::new(),
            modules: Vec::new(),
            logging: None,
        }
    }
}

impl ResolveSettings {
    /// Load settings from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loading settings from {:?}", path);
        Self::from_toml_str(&content)
    }

    /// Parse settings, applying environment overrides
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut settings: ResolveSettings = toml::from_str(content)?;
        settings.apply_env_overrides();
        Ok(settings)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Some(dir) = env_path(CACHE_DIR_ENV) {
            debug!("{} overrides default cache with {:?}", CACHE_DIR_ENV, dir);
            self.default_cache = dir;
        }
        if env_opt(USE_ORIGIN_ENV).is_some() {
            self.use_origin = env_bool(USE_ORIGIN_ENV);
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let patterns = [
            ("descriptor_pattern", &self.descriptor_pattern),
            ("artifact_pattern", &self.artifact_pattern),
            ("data_file_pattern", &self.data_file_pattern),
            ("resolved_descriptor_pattern", &self.resolved_descriptor_pattern),
            ("resolved_properties_pattern", &self.resolved_properties_pattern),
        ];
        for (setting, pattern) in patterns {
            if pattern.trim().is_empty() {
                return Err(invalid(setting, "pattern must not be empty"));
            }
        }

        if lock::lock_strategy_by_name(&self.lock_strategy).is_none() {
            return Err(ConfigError::UnknownReference {
                setting: "lock_strategy".to_string(),
                what: "lock strategy",
                name: self.lock_strategy.clone(),
            });
        }

        let mut names = HashSet::new();
        for (index, resolver) in self.resolvers.iter().enumerate() {
            if resolver.name.trim().is_empty() {
                return Err(invalid(format!("resolvers[{}].name", index), "must not be empty"));
            }
            if !names.insert(resolver.name.as_str()) {
                return Err(invalid(
                    format!("resolvers[{}].name", index),
                    format!("duplicate resolver name '{}'", resolver.name),
                ));
            }
        }

        let namespaces: HashSet<&str> = self.namespaces.iter().map(|n| n.name.as_str()).collect();
        for resolver in &self.resolvers {
            if let Some(ns) = &resolver.namespace {
                if !namespaces.contains(ns.as_str()) && ns != crate::namespace::SYSTEM_NAMESPACE {
                    // recoverable: the resolver falls back to the system namespace
                    warn!("Resolver '{}' uses undefined namespace '{}'", resolver.name, ns);
                }
            }
        }

        if let Some(name) = &self.default_resolver {
            if !names.contains(name.as_str()) {
                return Err(ConfigError::UnknownReference {
                    setting: "default_resolver".to_string(),
                    what: "resolver",
                    name: name.clone(),
                });
            }
        }

        for (index, rule) in self.modules.iter().enumerate() {
            if !names.contains(rule.resolver.as_str()) {
                return Err(ConfigError::UnknownReference {
                    setting: format!("modules[{}].resolver", index),
                    what: "resolver",
                    name: rule.resolver.clone(),
                });
            }
        }

        if let Some(name) = &self.default_latest_strategy {
            if name != DEFAULT_STRATEGY_NAME && Registry::new().latest_strategy(name).is_none() {
                return Err(ConfigError::UnknownReference {
                    setting: "default_latest_strategy".to_string(),
                    what: "latest strategy",
                    name: name.clone(),
                });
            }
        }

        Ok(())
    }

    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            default_cache: self.default_cache.clone(),
            repository_cache_dir: self.repository_cache_dir.clone(),
            resolution_cache_dir: self.resolution_cache_dir.clone(),
            descriptor_pattern: self.descriptor_pattern.clone(),
            artifact_pattern: self.artifact_pattern.clone(),
            data_file_pattern: self.data_file_pattern.clone(),
            resolved_descriptor_pattern: self.resolved_descriptor_pattern.clone(),
            resolved_properties_pattern: self.resolved_properties_pattern.clone(),
            lock_strategy: self.lock_strategy.clone(),
            use_origin: self.use_origin,
        }
    }

    pub fn cache_manager(&self) -> CacheManager {
        CacheManager::new(self.cache_settings(), None)
    }

    pub fn download_options(&self) -> DownloadOptions {
        DownloadOptions::default().with_use_origin(self.use_origin)
    }

    /// Build the registry: namespaces, resolvers, module rules and defaults
    pub fn build_registry(&self) -> Result<Registry, ConfigError> {
        self.validate()?;
        let mut registry = Registry::new();

        if let Some(name) = &self.default_latest_strategy {
            if name != DEFAULT_STRATEGY_NAME {
                registry.set_default_latest_strategy(name);
            }
        }

        for spec in &self.namespaces {
            registry.add_namespace(Namespace::from_spec(spec)?);
        }

        let factories = builtin_factories();
        for resolver in &self.resolvers {
            let Some(factory) = factories.get(resolver.kind.as_str()) else {
                let err = ConfigError::UnknownResolverKind {
                    resolver: resolver.name.clone(),
                    kind: resolver.kind.clone(),
                };
                error!("{}", err);
                return Err(err);
            };
            let built = factory(resolver, &registry)?;
            // fail now rather than at first lookup
            built.context().changing_matcher(&registry)?;
            registry.add_resolver(Arc::clone(&built));
        }

        for rule in &self.modules {
            registry.add_module_rule(
                &rule.organisation,
                &rule.name,
                rule.matcher.as_deref(),
                rule.resolver.clone(),
            )?;
        }

        if let Some(name) = &self.default_resolver {
            registry.set_default_resolver(name.clone());
        }
        debug!("Built registry: {:?}", registry);
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const SAMPLE: &str = r#"
default_cache = "/tmp/modresolve-cache"
lock_strategy = "artifact-lock"
default_resolver = "local"
default_latest_strategy = "latest-lexico"

[[resolvers]]
name = "local"
root = "/srv/repo"
changing_pattern = ".*-SNAPSHOT"
changing_matcher = "regexp"
namespace = "acme"

[[namespaces]]
name = "acme"

[[namespaces.rules]]
[namespaces.rules.from_system]
src = [{ organisation = "org\\.acme" }]
dest = { organisation = "acme" }
[namespaces.rules.to_system]
src = [{ organisation = "acme" }]
dest = { organisation = "org.acme" }

[[modules]]
organisation = "org.acme"
resolver = "local"

[logging]
filter = "debug"
"#;

    #[test]
    #[serial]
    fn test_parse_sample() {
        std::env::remove_var(CACHE_DIR_ENV);
        std::env::remove_var(USE_ORIGIN_ENV);
        let settings = ResolveSettings::from_toml_str(SAMPLE).unwrap();
        assert_eq!(settings.default_cache, PathBuf::from("/tmp/modresolve-cache"));
        assert_eq!(settings.resolvers[0].kind, "filesystem");
        assert_eq!(settings.resolvers[0].changing_matcher, "regexp");
        assert_eq!(settings.namespaces[0].rules.len(), 1);
        assert_eq!(settings.modules[0].name, "*");
        assert_eq!(settings.logging.as_ref().unwrap().filter.as_deref(), Some("debug"));
        assert!(settings.validate);

        let registry = settings.build_registry().unwrap();
        assert_eq!(registry.default_latest_strategy().name(), "latest-lexico");
        assert!(registry.namespace("acme").is_some());
        let routed = registry
            .resolver_for_module(&crate::module::id::ModuleId::new("org.acme", "core"))
            .unwrap();
        assert_eq!(routed.name(), Some("local"));
    }

    #[test]
    #[serial]
    fn test_env_overrides_cache_dir() {
        std::env::set_var(CACHE_DIR_ENV, "/override/cache");
        std::env::set_var(USE_ORIGIN_ENV, "true");
        let settings = ResolveSettings::from_toml_str("").unwrap();
        std::env::remove_var(CACHE_DIR_ENV);
        std::env::remove_var(USE_ORIGIN_ENV);
        assert_eq!(settings.default_cache, PathBuf::from("/override/cache"));
        assert!(settings.use_origin);
        assert!(settings.download_options().use_origin);
        assert_eq!(settings.lock_strategy, lock::NO_LOCK);
    }

    #[test]
    fn test_validation_errors() {
        let mut settings = ResolveSettings::default();
        settings.resolvers.push(ResolverSettings::named("a"));
        settings.resolvers.push(ResolverSettings::named("a"));
        assert!(matches!(settings.validate(), Err(ConfigError::Invalid { .. })));

        let settings = ResolveSettings {
            default_resolver: Some("missing".to_string()),
            ..ResolveSettings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::UnknownReference { what: "resolver", .. })
        ));

        let settings = ResolveSettings {
            lock_strategy: "flock".to_string(),
            ..ResolveSettings::default()
        };
        assert!(settings.validate().is_err());

        let settings = ResolveSettings {
            artifact_pattern: " ".to_string(),
            ..ResolveSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_unknown_changing_matcher_is_fatal() {
        let mut resolver = ResolverSettings::named("local");
        resolver.root = Some(PathBuf::from("/srv/repo"));
        resolver.changing_pattern = Some(".*".to_string());
        resolver.changing_matcher = "fuzzy".to_string();
        let settings = ResolveSettings {
            resolvers: vec![resolver],
            ..ResolveSettings::default()
        };
        assert!(matches!(
            settings.build_registry(),
            Err(ConfigError::Resolver(ResolverError::UnknownMatcher { .. }))
        ));
    }

    #[test]
    fn test_unknown_resolver_kind() {
        let mut resolver = ResolverSettings::named("remote");
        resolver.kind = "http".to_string();
        let settings = ResolveSettings {
            resolvers: vec![resolver],
            ..ResolveSettings::default()
        };
        assert!(matches!(
            settings.build_registry(),
            Err(ConfigError::UnknownResolverKind { .. })
        ));
    }
}
