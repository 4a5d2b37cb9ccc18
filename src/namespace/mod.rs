//! Namespaces
//!
//! A resolver may name modules differently from the rest of the system
//! (e.g. `apache#commons-lang` in its repository, `org.apache#commons-lang`
//! everywhere else). A `Namespace` holds rules translating revision ids from
//! the resolver's private space to the canonical system space (`to_system`)
//! and back (`from_system`). Ids that no rule matches pass through unchanged
//! in both directions.
//!
//! Rule sources are regular expressions on organisation, module and revision.
//! Destinations may reference capture groups of the matching source with
//! `$o<n>`, `$m<n>` and `$r<n>` (`$m0` is the whole module name).

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::module::artifact::Artifact;
use crate::module::dependency::DependencyEdge;
use crate::module::descriptor::ModuleDescriptor;
use crate::module::id::{ModuleId, ModuleRevisionId};

/// Name of the identity namespace
pub const SYSTEM_NAMESPACE: &str = "system";

#[derive(Debug, Error)]
pub enum NamespaceError {
    #[error("namespace '{namespace}': invalid {field} pattern '{pattern}': {source}")]
    InvalidPattern {
        namespace: String,
        field: &'static str,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Source side of a transform; `None` fields match anything
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionIdPattern {
    #[serde(default)]
    pub organisation: Option<String>,
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub revision: Option<String>,
}

/// Destination side of a transform; `None` fields keep the input value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionIdTemplate {
    #[serde(default)]
    pub organisation: Option<String>,
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub revision: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformSpec {
    #[serde(default)]
    pub src: Vec<RevisionIdPattern>,
    #[serde(default)]
    pub dest: RevisionIdTemplate,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceRuleSpec {
    #[serde(default)]
    pub name: Option<String>,
    pub from_system: TransformSpec,
    pub to_system: TransformSpec,
}

/// Declarative namespace definition, as found in settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceSpec {
    pub name: String,
    /// Apply every matching rule in sequence instead of stopping at the first
    #[serde(default)]
    pub chain_rules: bool,
    #[serde(default)]
    pub rules: Vec<NamespaceRuleSpec>,
}

/// Translation direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// resolver space -> system space
    ToSystem,
    /// system space -> resolver space
    FromSystem,
}

#[derive(Debug, Clone)]
struct CompiledPattern {
    organisation: Regex,
    module: Regex,
    revision: Regex,
}

impl CompiledPattern {
    fn compile(namespace: &str, spec: &RevisionIdPattern) -> Result<Self, NamespaceError> {
        let compile = |field: &'static str, pattern: &Option<String>| {
            let body = pattern.as_deref().unwrap_or(".*");
            Regex::new(&format!("^(?:{})$", body)).map_err(|source| {
                NamespaceError::InvalidPattern {
                    namespace: namespace.to_string(),
                    field,
                    pattern: body.to_string(),
                    source,
                }
            })
        };
        Ok(Self {
            organisation: compile("organisation", &spec.organisation)?,
            module: compile("module", &spec.module)?,
            revision: compile("revision", &spec.revision)?,
        })
    }
}

struct Matched<'a> {
    organisation: Captures<'a>,
    module: Captures<'a>,
    revision: Captures<'a>,
}

#[derive(Debug, Clone)]
pub struct RevisionIdTransformer {
    src: Vec<CompiledPattern>,
    dest: RevisionIdTemplate,
}

impl RevisionIdTransformer {
    fn compile(namespace: &str, spec: &TransformSpec) -> Result<Self, NamespaceError> {
        let src = if spec.src.is_empty() {
            vec![CompiledPattern::compile(namespace, &RevisionIdPattern::default())?]
        } else {
            spec.src
                .iter()
                .map(|p| CompiledPattern::compile(namespace, p))
                .collect::<Result<Vec<_>, _>>()?
        };
        Ok(Self {
            src,
            dest: spec.dest.clone(),
        })
    }

    /// `None` when no source pattern matches
    pub fn transform(&self, mrid: &ModuleRevisionId) -> Option<ModuleRevisionId> {
        let matched = self.src.iter().find_map(|p| {
            Some(Matched {
                organisation: p.organisation.captures(mrid.organisation())?,
                module: p.module.captures(mrid.name())?,
                revision: p.revision.captures(&mrid.revision)?,
            })
        })?;
        let apply = |template: &Option<String>, current: &str| {
            template
                .as_deref()
                .map(|t| expand(t, &matched))
                .unwrap_or_else(|| current.to_string())
        };
        let mut out = ModuleRevisionId::new(
            ModuleId::new(
                apply(&self.dest.organisation, mrid.organisation()),
                apply(&self.dest.module, mrid.name()),
            ),
            apply(&self.dest.revision, &mrid.revision),
        );
        out.extra = mrid.extra.clone();
        Some(out)
    }
}

/// Expand `$o<n>`, `$m<n>`, `$r<n>` references in a destination template
fn expand(template: &str, matched: &Matched<'_>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        let captures = match chars.peek() {
            Some('o') => Some(&matched.organisation),
            Some('m') => Some(&matched.module),
            Some('r') => Some(&matched.revision),
            _ => None,
        };
        let Some(captures) = captures else {
            out.push(c);
            continue;
        };
        let kind = chars.next().unwrap_or_default();
        let mut digits = String::new();
        while let Some(d) = chars.peek().filter(|d| d.is_ascii_digit()) {
            digits.push(*d);
            chars.next();
        }
        match digits.parse::<usize>() {
            Ok(group) => {
                if let Some(m) = captures.get(group) {
                    out.push_str(m.as_str());
                }
            }
            Err(_) => {
                out.push(c);
                out.push(kind);
            }
        }
    }
    out
}

#[derive(Debug, Clone)]
pub struct NamespaceRule {
    name: Option<String>,
    from_system: RevisionIdTransformer,
    to_system: RevisionIdTransformer,
}

impl NamespaceRule {
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn transformer(&self, direction: Direction) -> &RevisionIdTransformer {
        match direction {
            Direction::ToSystem => &self.to_system,
            Direction::FromSystem => &self.from_system,
        }
    }
}

/// A resolver-private identifier space
#[derive(Debug, Clone)]
pub struct Namespace {
    name: String,
    chain_rules: bool,
    rules: Vec<NamespaceRule>,
}

impl Namespace {
    /// The identity namespace
    pub fn system() -> Self {
        Self {
            name: SYSTEM_NAMESPACE.to_string(),
            chain_rules: false,
            rules: Vec::new(),
        }
    }

    pub fn from_spec(spec: &NamespaceSpec) -> Result<Self, NamespaceError> {
        let rules = spec
            .rules
            .iter()
            .map(|rule| {
                Ok(NamespaceRule {
                    name: rule.name.clone(),
                    from_system: RevisionIdTransformer::compile(&spec.name, &rule.from_system)?,
                    to_system: RevisionIdTransformer::compile(&spec.name, &rule.to_system)?,
                })
            })
            .collect::<Result<Vec<_>, NamespaceError>>()?;
        Ok(Self {
            name: spec.name.clone(),
            chain_rules: spec.chain_rules,
            rules,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rules(&self) -> &[NamespaceRule] {
        &self.rules
    }

    pub fn is_identity(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn transform(&self, mrid: &ModuleRevisionId, direction: Direction) -> ModuleRevisionId {
        let mut current = mrid.clone();
        for rule in &self.rules {
            if let Some(next) = rule.transformer(direction).transform(&current) {
                tracing::trace!(
                    "namespace {} rule {:?}: {} -> {}",
                    self.name,
                    rule.name,
                    current,
                    next
                );
                current = next;
                if !self.chain_rules {
                    break;
                }
            }
        }
        current
    }

    pub fn to_system(&self, mrid: &ModuleRevisionId) -> ModuleRevisionId {
        self.transform(mrid, Direction::ToSystem)
    }

    pub fn from_system(&self, mrid: &ModuleRevisionId) -> ModuleRevisionId {
        self.transform(mrid, Direction::FromSystem)
    }

    pub fn transform_artifact(&self, artifact: &Artifact, direction: Direction) -> Artifact {
        if self.is_identity() {
            return artifact.clone();
        }
        artifact.with_module_revision_id(self.transform(&artifact.module_revision_id, direction))
    }

    pub fn transform_dependency(&self, edge: &DependencyEdge, direction: Direction) -> DependencyEdge {
        if self.is_identity() {
            return edge.clone();
        }
        edge.with_ids(
            self.transform(edge.target(), direction),
            edge.parent().map(|p| self.transform(p, direction)),
        )
    }

    /// Translate a descriptor's own ids and every dependency edge it holds
    pub fn transform_descriptor(
        &self,
        descriptor: &ModuleDescriptor,
        direction: Direction,
    ) -> ModuleDescriptor {
        if self.is_identity() {
            return descriptor.clone();
        }
        let mut out = descriptor.clone();
        out.module_revision_id = self.transform(&descriptor.module_revision_id, direction);
        out.resolved_module_revision_id = descriptor
            .resolved_module_revision_id
            .as_ref()
            .map(|m| self.transform(m, direction));
        out.dependencies = descriptor
            .dependencies
            .iter()
            .map(|d| self.transform_dependency(d, direction))
            .collect();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `apache#<module>` in the resolver, `org.apache#<module>` in the system
    fn apache_namespace() -> Namespace {
        Namespace::from_spec(&NamespaceSpec {
            name: "apache".to_string(),
            chain_rules: false,
            rules: vec![NamespaceRuleSpec {
                name: Some("apache-org".to_string()),
                from_system: TransformSpec {
                    src: vec![RevisionIdPattern {
                        organisation: Some("org\\.apache".to_string()),
                        ..Default::default()
                    }],
                    dest: RevisionIdTemplate {
                        organisation: Some("apache".to_string()),
                        ..Default::default()
                    },
                },
                to_system: TransformSpec {
                    src: vec![RevisionIdPattern {
                        organisation: Some("apache".to_string()),
                        ..Default::default()
                    }],
                    dest: RevisionIdTemplate {
                        organisation: Some("org.apache".to_string()),
                        ..Default::default()
                    },
                },
            }],
        })
        .unwrap()
    }

    #[test]
    fn test_system_namespace_is_identity() {
        let ns = Namespace::system();
        let mrid = ModuleRevisionId::parts("org", "mod", "1.0");
        assert_eq!(ns.to_system(&mrid), mrid);
        assert_eq!(ns.from_system(&mrid), mrid);
        assert!(ns.is_identity());
    }

    #[test]
    fn test_remapped_organisation() {
        let ns = apache_namespace();
        let private = ModuleRevisionId::parts("apache", "commons-lang", "2.1");
        let system = ns.to_system(&private);
        assert_eq!(system, ModuleRevisionId::parts("org.apache", "commons-lang", "2.1"));
        assert_eq!(ns.from_system(&system), private);
    }

    #[test]
    fn test_capture_groups() {
        let ns = Namespace::from_spec(&NamespaceSpec {
            name: "suffixed".to_string(),
            chain_rules: false,
            rules: vec![NamespaceRuleSpec {
                name: None,
                from_system: TransformSpec {
                    src: vec![RevisionIdPattern {
                        module: Some("(.+)".to_string()),
                        ..Default::default()
                    }],
                    dest: RevisionIdTemplate {
                        module: Some("$m1-java".to_string()),
                        ..Default::default()
                    },
                },
                to_system: TransformSpec {
                    src: vec![RevisionIdPattern {
                        module: Some("(.+)-java".to_string()),
                        ..Default::default()
                    }],
                    dest: RevisionIdTemplate {
                        module: Some("$m1".to_string()),
                        ..Default::default()
                    },
                },
            }],
        })
        .unwrap();
        let mrid = ModuleRevisionId::parts("org", "client", "3.0");
        let private = ns.from_system(&mrid);
        assert_eq!(private.name(), "client-java");
        assert_eq!(ns.to_system(&private), mrid);
    }

    #[test]
    fn test_chained_rules() {
        let rename = |from: &str, to: &str| NamespaceRuleSpec {
            name: None,
            from_system: TransformSpec::default(),
            to_system: TransformSpec {
                src: vec![RevisionIdPattern {
                    organisation: Some(from.to_string()),
                    ..Default::default()
                }],
                dest: RevisionIdTemplate {
                    organisation: Some(to.to_string()),
                    ..Default::default()
                },
            },
        };
        let mut spec = NamespaceSpec {
            name: "chain".to_string(),
            chain_rules: false,
            rules: vec![rename("a", "b"), rename("b", "c")],
        };
        let mrid = ModuleRevisionId::parts("a", "m", "1");
        assert_eq!(Namespace::from_spec(&spec).unwrap().to_system(&mrid).organisation(), "b");
        spec.chain_rules = true;
        assert_eq!(Namespace::from_spec(&spec).unwrap().to_system(&mrid).organisation(), "c");
    }

    #[test]
    fn test_dependency_edge_transform() {
        let ns = apache_namespace();
        let mut dd = DependencyEdge::with_parent(
            ModuleRevisionId::parts("org.apache", "app", "1.0"),
            ModuleRevisionId::parts("org.apache", "lib", "2.0"),
            false,
            false,
            true,
        );
        dd.add_dependency_configuration("compile", "default").unwrap();
        let private = ns.transform_dependency(&dd, Direction::FromSystem);
        assert_eq!(private.target().organisation(), "apache");
        assert_eq!(private.parent().unwrap().organisation(), "apache");
        assert_eq!(private.dependency_configurations("compile"), vec!["default"]);
    }

    #[test]
    fn test_invalid_pattern() {
        let spec = NamespaceSpec {
            name: "broken".to_string(),
            chain_rules: false,
            rules: vec![NamespaceRuleSpec {
                name: None,
                from_system: TransformSpec {
                    src: vec![RevisionIdPattern {
                        organisation: Some("(".to_string()),
                        ..Default::default()
                    }],
                    dest: RevisionIdTemplate::default(),
                },
                to_system: TransformSpec::default(),
            }],
        };
        assert!(Namespace::from_spec(&spec).is_err());
    }
}
