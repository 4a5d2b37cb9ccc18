//! Per-resolver state and policy lookups
//!
//! Latest strategy and namespace are referenced by name and resolved against
//! the `Registry` on first use. Unknown names fall back to the registry
//! default (with a warning) since a resolver can still work correctly with
//! them. An unknown changing matcher is an error instead: ignoring it would
//! silently treat changing modules as immutable.

use std::sync::{Arc, OnceLock};
use tracing::{debug, error, warn};

use crate::cache::CacheManager;
use crate::matcher::{Matcher, NoMatcher, EXACT_OR_REGEXP};
use crate::module::id::ModuleRevisionId;
use crate::namespace::Namespace;
use crate::registry::Registry;
use crate::resolver::{ResolvedModuleRevision, ResolverError};
use crate::version::{LatestStrategy, DEFAULT_STRATEGY_NAME};

/// Latest strategy for an explicit instance and/or a configured name
///
/// The explicit instance wins. A name that is absent, `"default"` or unknown
/// gives the registry's default strategy.
pub fn resolve_latest_strategy(
    explicit: Option<&Arc<dyn LatestStrategy>>,
    name: Option<&str>,
    registry: &Registry,
) -> Arc<dyn LatestStrategy> {
    if let Some(strategy) = explicit {
        return Arc::clone(strategy);
    }
    match name {
        Some(name) if name != DEFAULT_STRATEGY_NAME => {
            registry.latest_strategy(name).unwrap_or_else(|| {
                warn!(
                    "Unknown latest strategy '{}', using default '{}'",
                    name,
                    registry.default_latest_strategy().name()
                );
                registry.default_latest_strategy()
            })
        }
        _ => registry.default_latest_strategy(),
    }
}

/// Namespace for an explicit instance and/or a configured name
///
/// Without a registry, or for an unknown name, this is the system namespace.
pub fn resolve_namespace(
    explicit: Option<&Arc<Namespace>>,
    name: Option<&str>,
    registry: Option<&Registry>,
) -> Arc<Namespace> {
    if let Some(namespace) = explicit {
        return Arc::clone(namespace);
    }
    let Some(registry) = registry else {
        return Arc::new(Namespace::system());
    };
    match name {
        Some(name) => registry.namespace(name).unwrap_or_else(|| {
            warn!("Unknown namespace '{}', using system namespace", name);
            registry.system_namespace()
        }),
        None => registry.system_namespace(),
    }
}

#[derive(Debug)]
pub struct ResolverContext {
    name: Option<String>,
    validate: Option<bool>,
    changing_pattern: Option<String>,
    changing_matcher_name: String,
    namespace_name: Option<String>,
    latest_name: Option<String>,
    explicit_namespace: Option<Arc<Namespace>>,
    explicit_latest: Option<Arc<dyn LatestStrategy>>,
    namespace: OnceLock<Arc<Namespace>>,
    latest: OnceLock<Arc<dyn LatestStrategy>>,
    changing_matcher: OnceLock<Arc<dyn Matcher>>,
}

impl Default for ResolverContext {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ResolverContext {
    pub fn new(name: Option<String>) -> Self {
        Self {
            name,
            validate: None,
            changing_pattern: None,
            changing_matcher_name: EXACT_OR_REGEXP.to_string(),
            namespace_name: None,
            latest_name: None,
            explicit_namespace: None,
            explicit_latest: None,
            namespace: OnceLock::new(),
            latest: OnceLock::new(),
            changing_matcher: OnceLock::new(),
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self::new(Some(name.into()))
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: Option<String>) {
        self.name = name;
    }

    // Validation

    /// `None` inherits the caller's choice
    pub fn set_validate(&mut self, validate: Option<bool>) {
        self.validate = validate;
    }

    pub fn validate(&self) -> Option<bool> {
        self.validate
    }

    /// Whether to validate, given what the caller asked for
    pub fn do_validate(&self, caller_validate: bool) -> bool {
        self.validate.unwrap_or(caller_validate)
    }

    pub fn is_validate(&self) -> bool {
        self.validate.unwrap_or(true)
    }

    // Changing modules

    pub fn set_changing_pattern(&mut self, pattern: Option<String>) {
        self.changing_pattern = pattern;
        self.changing_matcher = OnceLock::new();
    }

    pub fn set_changing_matcher(&mut self, matcher: impl Into<String>) {
        self.changing_matcher_name = matcher.into();
        self.changing_matcher = OnceLock::new();
    }

    pub fn changing_pattern(&self) -> Option<&str> {
        self.changing_pattern.as_deref()
    }

    pub fn changing_matcher_name(&self) -> &str {
        &self.changing_matcher_name
    }

    /// Matcher for changing revisions; never matches when no pattern is set
    pub fn changing_matcher(&self, registry: &Registry) -> Result<Arc<dyn Matcher>, ResolverError> {
        if let Some(matcher) = self.changing_matcher.get() {
            return Ok(Arc::clone(matcher));
        }
        let matcher: Arc<dyn Matcher> = match self.changing_pattern.as_deref() {
            None => Arc::new(NoMatcher),
            Some(pattern) => {
                let Some(pattern_matcher) = registry.matcher(&self.changing_matcher_name) else {
                    let err = ResolverError::UnknownMatcher {
                        resolver: self.display_name().to_string(),
                        matcher: self.changing_matcher_name.clone(),
                    };
                    error!("{}", err);
                    return Err(err);
                };
                Arc::from(pattern_matcher.matcher(pattern)?)
            }
        };
        Ok(Arc::clone(self.changing_matcher.get_or_init(|| matcher)))
    }

    pub fn is_changing(&self, registry: &Registry, mrid: &ModuleRevisionId) -> Result<bool, ResolverError> {
        Ok(self.changing_matcher(registry)?.matches(&mrid.revision))
    }

    // Latest strategy

    /// Configured strategy name, `"default"` when none
    pub fn latest_name(&self) -> &str {
        match (&self.explicit_latest, &self.latest_name) {
            (Some(strategy), _) => strategy.name(),
            (None, Some(name)) => name,
            (None, None) => DEFAULT_STRATEGY_NAME,
        }
    }

    pub fn set_latest_name(&mut self, name: Option<String>) {
        self.latest_name = name;
        self.latest = OnceLock::new();
    }

    pub fn set_latest(&mut self, strategy: Arc<dyn LatestStrategy>) {
        self.explicit_latest = Some(strategy);
        self.latest = OnceLock::new();
    }

    pub fn latest_strategy(&self, registry: &Registry) -> Arc<dyn LatestStrategy> {
        Arc::clone(self.latest.get_or_init(|| {
            resolve_latest_strategy(
                self.explicit_latest.as_ref(),
                self.latest_name.as_deref(),
                registry,
            )
        }))
    }

    // Namespace

    pub fn namespace_name(&self) -> Option<&str> {
        self.namespace_name.as_deref()
    }

    pub fn set_namespace_name(&mut self, name: Option<String>) {
        self.namespace_name = name;
        self.namespace = OnceLock::new();
    }

    pub fn set_namespace(&mut self, namespace: Arc<Namespace>) {
        self.explicit_namespace = Some(namespace);
        self.namespace = OnceLock::new();
    }

    /// The resolver's namespace
    ///
    /// Lookups made with a registry are memoized. Without one this is always
    /// the explicit namespace, or the system namespace when none was set, so
    /// the answer never depends on earlier calls.
    pub fn namespace(&self, registry: Option<&Registry>) -> Arc<Namespace> {
        let Some(registry) = registry else {
            return resolve_namespace(self.explicit_namespace.as_ref(), None, None);
        };
        Arc::clone(self.namespace.get_or_init(|| {
            resolve_namespace(
                self.explicit_namespace.as_ref(),
                self.namespace_name.as_deref(),
                Some(registry),
            )
        }))
    }

    /// Resolve the configured namespace name now and keep it as the explicit namespace
    pub fn bind_namespace(&mut self, registry: &Registry) {
        let namespace = resolve_namespace(
            self.explicit_namespace.as_ref(),
            self.namespace_name.as_deref(),
            Some(registry),
        );
        self.set_namespace(namespace);
    }

    // Cache

    /// A cached module, accepted only if this resolver produced it
    pub fn find_module_in_cache(
        &self,
        registry: &Registry,
        cache: &CacheManager,
        mrid: &ModuleRevisionId,
        validate: bool,
    ) -> Option<ResolvedModuleRevision> {
        let cached = cache.find_module_in_cache(registry, mrid, self.do_validate(validate))?;
        if !self.produced(&cached) {
            debug!(
                "{} found in cache but resolved by {:?}, not by {:?}: ignoring",
                mrid,
                cached.resolver,
                self.name()
            );
            return None;
        }
        Some(cached)
    }

    /// Whether `cached` was recorded under this resolver's name
    ///
    /// An entry without a resolver name belongs to unnamed resolvers.
    pub fn produced(&self, cached: &ResolvedModuleRevision) -> bool {
        cached.resolver.as_deref() == self.name()
    }

    fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<unnamed>")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::REGEXP;
    use crate::module::descriptor::ModuleDescriptor;
    use crate::namespace::{NamespaceSpec, SYSTEM_NAMESPACE};
    use crate::version::{LatestLexicographicStrategy, LATEST_LEXICO, LATEST_REVISION};

    #[test]
    fn test_latest_strategy_resolution() {
        let registry = Registry::new();
        assert_eq!(resolve_latest_strategy(None, None, &registry).name(), LATEST_REVISION);
        assert_eq!(
            resolve_latest_strategy(None, Some("default"), &registry).name(),
            LATEST_REVISION
        );
        assert_eq!(
            resolve_latest_strategy(None, Some(LATEST_LEXICO), &registry).name(),
            LATEST_LEXICO
        );
        assert_eq!(
            resolve_latest_strategy(None, Some("newest-first"), &registry).name(),
            LATEST_REVISION
        );
        let explicit: Arc<dyn LatestStrategy> = Arc::new(LatestLexicographicStrategy);
        assert_eq!(
            resolve_latest_strategy(Some(&explicit), Some(LATEST_REVISION), &registry).name(),
            LATEST_LEXICO
        );
    }

    #[test]
    fn test_namespace_resolution() {
        let mut registry = Registry::new();
        registry.add_namespace(
            Namespace::from_spec(&NamespaceSpec {
                name: "private".to_string(),
                ..Default::default()
            })
            .unwrap(),
        );
        assert_eq!(resolve_namespace(None, Some("private"), Some(&registry)).name(), "private");
        assert_eq!(
            resolve_namespace(None, Some("missing"), Some(&registry)).name(),
            SYSTEM_NAMESPACE
        );
        assert_eq!(resolve_namespace(None, Some("private"), None).name(), SYSTEM_NAMESPACE);
    }

    #[test]
    fn test_latest_memoized_until_overridden() {
        let registry = Registry::new();
        let mut ctx = ResolverContext::named("local");
        assert_eq!(ctx.latest_name(), DEFAULT_STRATEGY_NAME);
        assert_eq!(ctx.latest_strategy(&registry).name(), LATEST_REVISION);

        ctx.set_latest_name(Some(LATEST_LEXICO.to_string()));
        assert_eq!(ctx.latest_name(), LATEST_LEXICO);
        assert_eq!(ctx.latest_strategy(&registry).name(), LATEST_LEXICO);
    }

    #[test]
    fn test_namespace_without_registry_ignores_earlier_lookups() {
        let mut registry = Registry::new();
        registry.add_namespace(
            Namespace::from_spec(&NamespaceSpec {
                name: "private".to_string(),
                ..Default::default()
            })
            .unwrap(),
        );
        let mut ctx = ResolverContext::named("local");
        ctx.set_namespace_name(Some("private".to_string()));
        assert_eq!(ctx.namespace(None).name(), SYSTEM_NAMESPACE);
        assert_eq!(ctx.namespace(Some(&registry)).name(), "private");
        assert_eq!(ctx.namespace(None).name(), SYSTEM_NAMESPACE);

        ctx.bind_namespace(&registry);
        assert_eq!(ctx.namespace(None).name(), "private");
        assert_eq!(ctx.namespace_name(), Some("private"));
    }

    #[test]
    fn test_cache_attribution_by_name() {
        let entry = |resolver: Option<&str>| ResolvedModuleRevision {
            resolver: resolver.map(str::to_string),
            artifact_resolver: resolver.map(str::to_string),
            descriptor: ModuleDescriptor::new(ModuleRevisionId::parts("org", "m", "1.0")),
            from_cache: true,
        };
        let unnamed = ResolverContext::default();
        let local = ResolverContext::named("local");

        assert!(unnamed.produced(&entry(None)));
        assert!(!unnamed.produced(&entry(Some("local"))));
        assert!(local.produced(&entry(Some("local"))));
        assert!(!local.produced(&entry(None)));
        assert!(!local.produced(&entry(Some("remote"))));
    }

    #[test]
    fn test_validate_tri_state() {
        let mut ctx = ResolverContext::default();
        assert!(ctx.is_validate());
        assert!(!ctx.do_validate(false));
        ctx.set_validate(Some(false));
        assert!(!ctx.is_validate());
        assert!(!ctx.do_validate(true));
    }

    #[test]
    fn test_changing_matcher() {
        let registry = Registry::new();
        let mut ctx = ResolverContext::named("local");
        let snapshot = ModuleRevisionId::parts("org", "m", "1.0-SNAPSHOT");
        assert!(!ctx.is_changing(&registry, &snapshot).unwrap());

        ctx.set_changing_pattern(Some(".*-SNAPSHOT".to_string()));
        ctx.set_changing_matcher(REGEXP);
        assert!(ctx.is_changing(&registry, &snapshot).unwrap());
        assert!(!ctx
            .is_changing(&registry, &snapshot.with_revision("1.0"))
            .unwrap());

        ctx.set_changing_matcher("fuzzy");
        assert!(matches!(
            ctx.changing_matcher(&registry),
            Err(ResolverError::UnknownMatcher { .. })
        ));
    }
}
