//! Named component registry
//!
//! The `Registry` is the context object every resolver and cache lookup goes
//! through: latest strategies, matching algorithms, namespaces and resolvers
//! by name, module -> resolver rules, the default resolver and the version
//! matcher. It is wired once from settings and shared read-only afterwards.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::matcher::{builtin_matchers, Matcher, MatcherError, PatternMatcher, EXACT_OR_REGEXP};
use crate::module::id::ModuleId;
use crate::namespace::{Namespace, SYSTEM_NAMESPACE};
use crate::resolver::DependencyResolver;
use crate::version::{builtin_latest_strategies, LatestStrategy, VersionMatcher, LATEST_REVISION};

/// Routes modules whose organisation and name match to a named resolver
#[derive(Debug)]
pub struct ModuleRule {
    organisation: Box<dyn Matcher>,
    module: Box<dyn Matcher>,
    resolver: String,
}

impl ModuleRule {
    pub fn matches(&self, module_id: &ModuleId) -> bool {
        self.organisation.matches(&module_id.organisation) && self.module.matches(&module_id.name)
    }

    pub fn resolver(&self) -> &str {
        &self.resolver
    }
}

pub struct Registry {
    latest_strategies: HashMap<String, Arc<dyn LatestStrategy>>,
    default_latest_strategy: Arc<dyn LatestStrategy>,
    matchers: HashMap<String, Arc<dyn PatternMatcher>>,
    namespaces: HashMap<String, Arc<Namespace>>,
    system_namespace: Arc<Namespace>,
    resolvers: HashMap<String, Arc<dyn DependencyResolver>>,
    default_resolver: Option<String>,
    module_rules: Vec<ModuleRule>,
    version_matcher: VersionMatcher,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Registry holding the builtin strategies, matchers and the system namespace
    pub fn new() -> Self {
        let latest_strategies: HashMap<String, Arc<dyn LatestStrategy>> =
            builtin_latest_strategies()
                .into_iter()
                .map(|s| (s.name().to_string(), s))
                .collect();
        let default_latest_strategy = latest_strategies
            .get(LATEST_REVISION)
            .cloned()
            .unwrap_or_else(|| Arc::new(crate::version::LatestRevisionStrategy));
        let matchers = builtin_matchers()
            .into_iter()
            .map(|m| (m.name().to_string(), m))
            .collect();
        let system_namespace = Arc::new(Namespace::system());
        let mut namespaces = HashMap::new();
        namespaces.insert(SYSTEM_NAMESPACE.to_string(), Arc::clone(&system_namespace));
        Self {
            latest_strategies,
            default_latest_strategy,
            matchers,
            namespaces,
            system_namespace,
            resolvers: HashMap::new(),
            default_resolver: None,
            module_rules: Vec::new(),
            version_matcher: VersionMatcher,
        }
    }

    // Latest strategies

    pub fn add_latest_strategy(&mut self, strategy: Arc<dyn LatestStrategy>) {
        self.latest_strategies
            .insert(strategy.name().to_string(), strategy);
    }

    pub fn latest_strategy(&self, name: &str) -> Option<Arc<dyn LatestStrategy>> {
        self.latest_strategies.get(name).cloned()
    }

    pub fn default_latest_strategy(&self) -> Arc<dyn LatestStrategy> {
        Arc::clone(&self.default_latest_strategy)
    }

    /// Returns false when no strategy has that name
    pub fn set_default_latest_strategy(&mut self, name: &str) -> bool {
        match self.latest_strategies.get(name) {
            Some(strategy) => {
                self.default_latest_strategy = Arc::clone(strategy);
                true
            }
            None => false,
        }
    }

    // Matchers

    pub fn add_matcher(&mut self, matcher: Arc<dyn PatternMatcher>) {
        self.matchers.insert(matcher.name().to_string(), matcher);
    }

    pub fn matcher(&self, name: &str) -> Option<Arc<dyn PatternMatcher>> {
        self.matchers.get(name).cloned()
    }

    // Namespaces

    pub fn add_namespace(&mut self, namespace: Namespace) {
        self.namespaces
            .insert(namespace.name().to_string(), Arc::new(namespace));
    }

    pub fn namespace(&self, name: &str) -> Option<Arc<Namespace>> {
        self.namespaces.get(name).cloned()
    }

    pub fn system_namespace(&self) -> Arc<Namespace> {
        Arc::clone(&self.system_namespace)
    }

    // Resolvers

    /// Unnamed resolvers cannot be looked up and are not registered
    pub fn add_resolver(&mut self, resolver: Arc<dyn DependencyResolver>) {
        let Some(name) = resolver.name().map(str::to_string) else {
            warn!("Ignoring unnamed {} resolver", resolver.type_name());
            return;
        };
        debug!("Registering resolver {}", name);
        self.resolvers.insert(name, resolver);
    }

    pub fn resolver(&self, name: &str) -> Option<Arc<dyn DependencyResolver>> {
        self.resolvers.get(name).cloned()
    }

    pub fn resolver_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.resolvers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn set_default_resolver(&mut self, name: impl Into<String>) {
        self.default_resolver = Some(name.into());
    }

    pub fn default_resolver(&self) -> Option<Arc<dyn DependencyResolver>> {
        self.default_resolver
            .as_deref()
            .and_then(|name| self.resolver(name))
    }

    /// Route modules matching `organisation`/`module` to `resolver`
    ///
    /// Expressions are compiled with the named matcher, `exactOrRegexp` when
    /// none is given.
    pub fn add_module_rule(
        &mut self,
        organisation: &str,
        module: &str,
        matcher: Option<&str>,
        resolver: impl Into<String>,
    ) -> Result<(), MatcherError> {
        let matcher_name = matcher.unwrap_or(EXACT_OR_REGEXP);
        let pattern_matcher =
            self.matcher(matcher_name)
                .ok_or_else(|| MatcherError::UnknownMatcher(matcher_name.to_string()))?;
        self.module_rules.push(ModuleRule {
            organisation: pattern_matcher.matcher(organisation)?,
            module: pattern_matcher.matcher(module)?,
            resolver: resolver.into(),
        });
        Ok(())
    }

    /// Resolver configured for a module: first matching rule, else the default resolver
    pub fn resolver_for_module(&self, module_id: &ModuleId) -> Option<Arc<dyn DependencyResolver>> {
        self.module_rules
            .iter()
            .find(|rule| rule.matches(module_id))
            .and_then(|rule| self.resolver(rule.resolver()))
            .or_else(|| self.default_resolver())
    }

    pub fn version_matcher(&self) -> &VersionMatcher {
        &self.version_matcher
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("latest_strategies", &self.latest_strategies.keys())
            .field("default_latest_strategy", &self.default_latest_strategy.name())
            .field("matchers", &self.matchers.keys())
            .field("namespaces", &self.namespaces.keys())
            .field("resolvers", &self.resolver_names())
            .field("default_resolver", &self.default_resolver)
            .field("module_rules", &self.module_rules.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::REGEXP;
    use crate::version::LATEST_LEXICO;

    #[test]
    fn test_builtins_registered() {
        let registry = Registry::new();
        assert!(registry.latest_strategy(LATEST_REVISION).is_some());
        assert!(registry.latest_strategy(LATEST_LEXICO).is_some());
        assert!(registry.matcher(EXACT_OR_REGEXP).is_some());
        assert!(registry.matcher("glob").is_some());
        assert!(registry.namespace(SYSTEM_NAMESPACE).unwrap().is_identity());
        assert_eq!(registry.default_latest_strategy().name(), LATEST_REVISION);
    }

    #[test]
    fn test_set_default_latest_strategy() {
        let mut registry = Registry::new();
        assert!(registry.set_default_latest_strategy(LATEST_LEXICO));
        assert_eq!(registry.default_latest_strategy().name(), LATEST_LEXICO);
        assert!(!registry.set_default_latest_strategy("missing"));
        assert_eq!(registry.default_latest_strategy().name(), LATEST_LEXICO);
    }

    #[test]
    fn test_module_rule_unknown_matcher() {
        let mut registry = Registry::new();
        assert!(matches!(
            registry.add_module_rule("org", "*", Some("nope"), "local"),
            Err(MatcherError::UnknownMatcher(_))
        ));
        registry
            .add_module_rule("org\\..*", "*", Some(REGEXP), "local")
            .unwrap();
        assert!(registry.module_rules[0].matches(&ModuleId::new("org.apache", "lang")));
        assert!(!registry.module_rules[0].matches(&ModuleId::new("com.acme", "lang")));
        // rule target not registered and no default: nothing to route to
        assert!(registry
            .resolver_for_module(&ModuleId::new("org.apache", "lang"))
            .is_none());
    }
}
