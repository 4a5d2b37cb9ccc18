//! Module and artifact identities
//!
//! Value types identifying a module, one revision of a module, and one
//! artifact of a revision. All of them are immutable and compare by value.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Organisation + name of a module
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleId {
    pub organisation: String,
    pub name: String,
}

impl ModuleId {
    pub fn new(organisation: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            organisation: organisation.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.organisation, self.name)
    }
}

/// One revision of a module
///
/// Extra attributes are kept in a sorted map so that two ids built from the
/// same attributes in a different order are equal and hash identically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleRevisionId {
    #[serde(flatten)]
    pub module_id: ModuleId,
    pub revision: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl ModuleRevisionId {
    pub fn new(module_id: ModuleId, revision: impl Into<String>) -> Self {
        Self {
            module_id,
            revision: revision.into(),
            extra: BTreeMap::new(),
        }
    }

    /// Shorthand for `ModuleRevisionId::new(ModuleId::new(org, name), rev)`
    pub fn parts(
        organisation: impl Into<String>,
        name: impl Into<String>,
        revision: impl Into<String>,
    ) -> Self {
        Self::new(ModuleId::new(organisation, name), revision)
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn organisation(&self) -> &str {
        &self.module_id.organisation
    }

    pub fn name(&self) -> &str {
        &self.module_id.name
    }

    /// Same module, different revision
    pub fn with_revision(&self, revision: impl Into<String>) -> Self {
        Self {
            module_id: self.module_id.clone(),
            revision: revision.into(),
            extra: self.extra.clone(),
        }
    }
}

impl fmt::Display for ModuleRevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};{}", self.module_id, self.revision)?;
        for (key, value) in &self.extra {
            write!(f, ";{}={}", key, value)?;
        }
        Ok(())
    }
}

/// Full identity of an artifact: its owner revision plus name/type/ext/extra
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactId {
    pub module_revision_id: ModuleRevisionId,
    pub name: String,
    pub artifact_type: String,
    pub ext: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}!{}.{}({})",
            self.module_revision_id, self.name, self.ext, self.artifact_type
        )?;
        for (key, value) in &self.extra {
            write!(f, ";{}={}", key, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_revision_id_equality_ignores_attribute_order() {
        let a = ModuleRevisionId::parts("org", "mod", "1.0")
            .with_extra("platform", "linux")
            .with_extra("abi", "gnu");
        let b = ModuleRevisionId::parts("org", "mod", "1.0")
            .with_extra("abi", "gnu")
            .with_extra("platform", "linux");
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_display() {
        let mrid = ModuleRevisionId::parts("org", "mod", "1.0");
        assert_eq!(mrid.to_string(), "org#mod;1.0");
        assert_eq!(mrid.with_revision("2.0").revision, "2.0");
    }
}
