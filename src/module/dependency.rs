//! Dependency edges
//!
//! A `DependencyEdge` says "module A, in configuration C, depends on module
//! B". It carries the per-configuration mapping rules between the consuming
//! module's configurations (master configurations) and the dependency's
//! configurations, per-configuration artifact filters, and resolution flags.
//!
//! Mapping keys are configuration names or the wildcard `*`, which applies to
//! every master configuration. Dependency configuration names may use the
//! self fallback token `@` (the master configuration itself) or `@(suffix)`
//! (the master configuration followed by `suffix`).

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::matcher::{MatcherError, PatternMatcher, EXACT_OR_REGEXP};
use crate::module::artifact::Artifact;
use crate::module::id::{ModuleId, ModuleRevisionId};
use crate::module::traits::ModuleError;

/// Configuration key applying to every master configuration
pub const WILDCARD: &str = "*";

const SELF_FALLBACK: char = '@';

fn default_true() -> bool {
    true
}

fn default_matcher() -> String {
    EXACT_OR_REGEXP.to_string()
}

/// Artifact filter attached to a dependency
///
/// Each field is an expression for the named matcher; a filter accepts an
/// artifact when name, type and extension all match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactFilter {
    pub name: String,
    #[serde(rename = "type", default = "any_expression")]
    pub artifact_type: String,
    #[serde(default = "any_expression")]
    pub ext: String,
    #[serde(default = "default_matcher")]
    pub matcher: String,
}

fn any_expression() -> String {
    crate::matcher::ANY_EXPRESSION.to_string()
}

impl ArtifactFilter {
    pub fn new(
        name: impl Into<String>,
        artifact_type: impl Into<String>,
        ext: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            artifact_type: artifact_type.into(),
            ext: ext.into(),
            matcher: default_matcher(),
        }
    }

    pub fn with_matcher(mut self, matcher: impl Into<String>) -> Self {
        self.matcher = matcher.into();
        self
    }

    /// Test an artifact against this filter using the filter's algorithm
    pub fn matches(
        &self,
        artifact: &Artifact,
        pattern_matcher: &dyn PatternMatcher,
    ) -> Result<bool, MatcherError> {
        Ok(pattern_matcher.matcher(&self.name)?.matches(&artifact.name)
            && pattern_matcher
                .matcher(&self.artifact_type)?
                .matches(&artifact.artifact_type)
            && pattern_matcher.matcher(&self.ext)?.matches(&artifact.ext))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ConfMapping {
    master: String,
    dependency: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct KeyedFilters {
    conf: String,
    filters: Vec<ArtifactFilter>,
}

/// Which filter table to read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Include,
    Exclude,
}

/// One dependency relationship
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    #[serde(default)]
    force: bool,
    #[serde(default)]
    changing: bool,
    #[serde(default = "default_true")]
    transitive: bool,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    extends: BTreeSet<String>,
    target: ModuleRevisionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent: Option<ModuleRevisionId>,
    #[serde(default, rename = "conf", skip_serializing_if = "Vec::is_empty")]
    config_mapping: Vec<ConfMapping>,
    #[serde(default, rename = "include", skip_serializing_if = "Vec::is_empty")]
    artifact_includes: Vec<KeyedFilters>,
    #[serde(default, rename = "exclude", skip_serializing_if = "Vec::is_empty")]
    artifact_excludes: Vec<KeyedFilters>,
}

impl DependencyEdge {
    /// Root dependency (no consuming module)
    pub fn new(target: ModuleRevisionId, force: bool) -> Self {
        Self::with_changing(target, force, false)
    }

    pub fn with_changing(target: ModuleRevisionId, force: bool, changing: bool) -> Self {
        Self {
            force,
            changing,
            transitive: true,
            extends: BTreeSet::new(),
            target,
            parent: None,
            config_mapping: Vec::new(),
            artifact_includes: Vec::new(),
            artifact_excludes: Vec::new(),
        }
    }

    /// Dependency declared by `parent`
    pub fn with_parent(
        parent: ModuleRevisionId,
        target: ModuleRevisionId,
        force: bool,
        changing: bool,
        transitive: bool,
    ) -> Self {
        Self {
            parent: Some(parent),
            transitive,
            ..Self::with_changing(target, force, changing)
        }
    }

    /// Copy of this edge pointing at another revision of the same module
    ///
    /// Used once a dynamic revision has been resolved to a concrete one.
    pub fn with_revision(&self, revision: impl Into<String>) -> Self {
        Self {
            target: self.target.with_revision(revision),
            ..self.clone()
        }
    }

    /// Copy of this edge with a transformed target and parent
    pub(crate) fn with_ids(
        &self,
        target: ModuleRevisionId,
        parent: Option<ModuleRevisionId>,
    ) -> Self {
        Self {
            target,
            parent,
            ..self.clone()
        }
    }

    pub fn target(&self) -> &ModuleRevisionId {
        &self.target
    }

    pub fn dependency_id(&self) -> &ModuleId {
        &self.target.module_id
    }

    pub fn parent(&self) -> Option<&ModuleRevisionId> {
        self.parent.as_ref()
    }

    pub fn is_force(&self) -> bool {
        self.force
    }

    pub fn is_changing(&self) -> bool {
        self.changing
    }

    pub fn is_transitive(&self) -> bool {
        self.transitive
    }

    pub fn extends(&self) -> &BTreeSet<String> {
        &self.extends
    }

    /// Master configurations with a mapping, in insertion order
    pub fn module_configurations(&self) -> Vec<&str> {
        self.config_mapping
            .iter()
            .map(|m| m.master.as_str())
            .collect()
    }

    fn mapped(&self, master: &str) -> Option<&[String]> {
        self.config_mapping
            .iter()
            .find(|m| m.master == master)
            .map(|m| m.dependency.as_slice())
    }

    /// Dependency configurations required when the consumer is resolved in
    /// `master_conf`
    pub fn dependency_configurations(&self, master_conf: &str) -> Vec<String> {
        let mut confs: Vec<String> = Vec::new();
        let mapped = self.mapped(master_conf).unwrap_or(&[]);
        let wildcard = self.mapped(WILDCARD).unwrap_or(&[]);
        for conf in mapped.iter().chain(wildcard.iter()) {
            push_unique(&mut confs, conf.clone());
        }

        if let Some(pos) = confs.iter().position(|c| parse_self_fallback(c).is_some()) {
            let token = confs.remove(pos);
            if let Some(suffix) = parse_self_fallback(&token) {
                push_unique(&mut confs, format!("{}{}", master_conf, suffix));
            }
        }

        collapse_wildcard(confs)
    }

    /// Union of `dependency_configurations` over several master configurations
    pub fn dependency_configurations_for_all<S: AsRef<str>>(&self, master_confs: &[S]) -> Vec<String> {
        let mut confs = Vec::new();
        for master in master_confs {
            for conf in self.dependency_configurations(master.as_ref()) {
                push_unique(&mut confs, conf);
            }
        }
        collapse_wildcard(confs)
    }

    fn filter_table(&self, kind: FilterKind) -> &[KeyedFilters] {
        match kind {
            FilterKind::Include => &self.artifact_includes,
            FilterKind::Exclude => &self.artifact_excludes,
        }
    }

    /// Filters applying to `master_conf` (its own plus the wildcard ones)
    ///
    /// An empty result means "no filtering", not "everything filtered".
    pub fn artifact_filters(&self, master_conf: &str, kind: FilterKind) -> Vec<&ArtifactFilter> {
        let table = self.filter_table(kind);
        let mut out: Vec<&ArtifactFilter> = Vec::new();
        if table.is_empty() {
            return out;
        }
        for keyed in table
            .iter()
            .filter(|k| k.conf == master_conf || k.conf == WILDCARD)
        {
            for filter in &keyed.filters {
                if !out.contains(&filter) {
                    out.push(filter);
                }
            }
        }
        out
    }

    pub fn artifact_includes(&self, master_conf: &str) -> Vec<&ArtifactFilter> {
        self.artifact_filters(master_conf, FilterKind::Include)
    }

    pub fn artifact_excludes(&self, master_conf: &str) -> Vec<&ArtifactFilter> {
        self.artifact_filters(master_conf, FilterKind::Exclude)
    }

    pub fn artifact_includes_for_all<S: AsRef<str>>(&self, master_confs: &[S]) -> Vec<&ArtifactFilter> {
        self.filters_for_all(master_confs, FilterKind::Include)
    }

    pub fn artifact_excludes_for_all<S: AsRef<str>>(&self, master_confs: &[S]) -> Vec<&ArtifactFilter> {
        self.filters_for_all(master_confs, FilterKind::Exclude)
    }

    fn filters_for_all<S: AsRef<str>>(&self, master_confs: &[S], kind: FilterKind) -> Vec<&ArtifactFilter> {
        let mut out: Vec<&ArtifactFilter> = Vec::new();
        for master in master_confs {
            for filter in self.artifact_filters(master.as_ref(), kind) {
                if !out.contains(&filter) {
                    out.push(filter);
                }
            }
        }
        out
    }

    /// Every filter of the given kind, whatever its configuration key
    pub fn all_artifact_filters(&self, kind: FilterKind) -> Vec<&ArtifactFilter> {
        let mut out: Vec<&ArtifactFilter> = Vec::new();
        for filter in self.filter_table(kind).iter().flat_map(|k| k.filters.iter()) {
            if !out.contains(&filter) {
                out.push(filter);
            }
        }
        out
    }

    pub fn all_artifact_includes(&self) -> Vec<&ArtifactFilter> {
        self.all_artifact_filters(FilterKind::Include)
    }

    pub fn all_artifact_excludes(&self) -> Vec<&ArtifactFilter> {
        self.all_artifact_filters(FilterKind::Exclude)
    }

    /// Map `master_conf` to `dep_conf`; adding an existing pair is a no-op
    pub fn add_dependency_configuration(
        &mut self,
        master_conf: &str,
        dep_conf: &str,
    ) -> Result<(), ModuleError> {
        check_key(master_conf, "master configuration")?;
        check_key(dep_conf, "dependency configuration")?;
        match self.config_mapping.iter_mut().find(|m| m.master == master_conf) {
            Some(mapping) => push_unique(&mut mapping.dependency, dep_conf.to_string()),
            None => self.config_mapping.push(ConfMapping {
                master: master_conf.to_string(),
                dependency: vec![dep_conf.to_string()],
            }),
        }
        Ok(())
    }

    pub fn add_artifact_include(
        &mut self,
        master_conf: &str,
        filter: ArtifactFilter,
    ) -> Result<(), ModuleError> {
        self.add_artifact_filter(master_conf, filter, FilterKind::Include)
    }

    pub fn add_artifact_exclude(
        &mut self,
        master_conf: &str,
        filter: ArtifactFilter,
    ) -> Result<(), ModuleError> {
        self.add_artifact_filter(master_conf, filter, FilterKind::Exclude)
    }

    fn add_artifact_filter(
        &mut self,
        master_conf: &str,
        filter: ArtifactFilter,
        kind: FilterKind,
    ) -> Result<(), ModuleError> {
        check_key(master_conf, "master configuration")?;
        let table = match kind {
            FilterKind::Include => &mut self.artifact_includes,
            FilterKind::Exclude => &mut self.artifact_excludes,
        };
        match table.iter_mut().find(|k| k.conf == master_conf) {
            // duplicates allowed: filters are evaluated as an OR-set
            Some(keyed) => keyed.filters.push(filter),
            None => table.push(KeyedFilters {
                conf: master_conf.to_string(),
                filters: vec![filter],
            }),
        }
        Ok(())
    }

    /// Record that this edge's mapping rules extend `conf`
    pub fn add_extends(&mut self, conf: &str) -> Result<(), ModuleError> {
        check_key(conf, "extended configuration")?;
        self.extends.insert(conf.to_string());
        Ok(())
    }

    /// Check the key invariant on an edge built by deserialization
    pub fn validate(&self) -> Result<(), ModuleError> {
        for mapping in &self.config_mapping {
            check_key(&mapping.master, "master configuration")?;
            for conf in &mapping.dependency {
                check_key(conf, "dependency configuration")?;
            }
        }
        for keyed in self.artifact_includes.iter().chain(self.artifact_excludes.iter()) {
            check_key(&keyed.conf, "artifact filter configuration")?;
        }
        Ok(())
    }
}

impl fmt::Display for DependencyEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dependency: {} {{", self.target)?;
        for (i, mapping) in self.config_mapping.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}=[{}]", mapping.master, mapping.dependency.join(", "))?;
        }
        write!(f, "}}")
    }
}

fn check_key(key: &str, what: &str) -> Result<(), ModuleError> {
    if key.trim().is_empty() {
        return Err(ModuleError::EmptyConfigurationName(what.to_string()));
    }
    Ok(())
}

fn push_unique(confs: &mut Vec<String>, conf: String) {
    if !confs.contains(&conf) {
        confs.push(conf);
    }
}

fn collapse_wildcard(confs: Vec<String>) -> Vec<String> {
    if confs.iter().any(|c| c == WILDCARD) {
        return vec![WILDCARD.to_string()];
    }
    confs
}

/// `@` -> `Some("")`, `@(suffix)` -> `Some("suffix")`, anything else -> `None`
fn parse_self_fallback(conf: &str) -> Option<&str> {
    let rest = conf.strip_prefix(SELF_FALLBACK)?;
    if rest.is_empty() {
        return Some("");
    }
    rest.strip_prefix('(')?.strip_suffix(')')
}
