//! Resolver construction by kind
//!
//! Settings name a resolver `kind`; the matching factory is looked up once
//! while the registry is built. Factories run after the registry's namespaces
//! are defined, so a configured namespace is resolved at construction.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::ResolverSettings;
use crate::registry::Registry;
use crate::resolver::filesystem::{FileSystemResolver, FILESYSTEM_KIND};
use crate::resolver::{DependencyResolver, ResolverContext, ResolverError};

pub type ResolverFactory =
    fn(&ResolverSettings, &Registry) -> Result<Arc<dyn DependencyResolver>, ResolverError>;

/// Factories for the resolver kinds this crate provides
pub fn builtin_factories() -> HashMap<&'static str, ResolverFactory> {
    let mut factories: HashMap<&'static str, ResolverFactory> = HashMap::new();
    factories.insert(FILESYSTEM_KIND, |settings, registry| {
        Ok(Arc::new(FileSystemResolver::from_settings(settings, registry)?))
    });
    factories
}

/// Context holding the policy part of resolver settings
pub fn context_from_settings(settings: &ResolverSettings, registry: &Registry) -> ResolverContext {
    let mut ctx = ResolverContext::named(&settings.name);
    ctx.set_validate(settings.validate);
    ctx.set_changing_pattern(settings.changing_pattern.clone());
    ctx.set_changing_matcher(&settings.changing_matcher);
    ctx.set_namespace_name(settings.namespace.clone());
    ctx.set_latest_name(settings.latest.clone());
    if settings.namespace.is_some() {
        ctx.bind_namespace(registry);
    }
    ctx
}
