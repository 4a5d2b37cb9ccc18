//! Revision comparison and dynamic revision handling
//!
//! `LatestStrategy` implementations order candidate revisions so a resolver
//! can pick the newest one; `VersionMatcher` decides whether an asked
//! revision is dynamic (must be re-evaluated against the repository) and
//! whether a concrete revision satisfies it.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::module::id::ModuleRevisionId;

pub const LATEST_REVISION: &str = "latest-revision";
pub const LATEST_LEXICO: &str = "latest-lexico";

/// Name resolving to the registry's default strategy
pub const DEFAULT_STRATEGY_NAME: &str = "default";

/// Policy for picking the latest among candidate revisions
pub trait LatestStrategy: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn compare(&self, a: &str, b: &str) -> Ordering;

    fn find_latest<'a>(&self, revisions: &'a [String]) -> Option<&'a String> {
        revisions.iter().max_by(|a, b| self.compare(a, b))
    }

    /// Candidates sorted oldest first
    fn sort(&self, revisions: &mut [String]) {
        revisions.sort_by(|a, b| self.compare(a, b));
    }
}

/// Plain string ordering
#[derive(Debug, Clone, Copy, Default)]
pub struct LatestLexicographicStrategy;

impl LatestStrategy for LatestLexicographicStrategy {
    fn name(&self) -> &str {
        LATEST_LEXICO
    }

    fn compare(&self, a: &str, b: &str) -> Ordering {
        a.cmp(b)
    }
}

/// Revision-aware ordering: `1.10 > 1.9`, `1.0 > 1.0-rc1 > 1.0-dev`
#[derive(Debug, Clone, Copy, Default)]
pub struct LatestRevisionStrategy;

impl LatestRevisionStrategy {
    fn special_meaning(part: &str) -> Option<i32> {
        match part.to_ascii_lowercase().as_str() {
            "dev" => Some(-1),
            "rc" => Some(1),
            "final" => Some(2),
            _ => None,
        }
    }
}

fn is_number(part: &str) -> bool {
    !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit())
}

fn compare_numbers(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Split a revision on separators and digit/non-digit boundaries
fn revision_parts(revision: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut current_is_digit: Option<bool> = None;
    for c in revision.chars() {
        if matches!(c, '.' | '-' | '_' | '+') {
            if !current.is_empty() {
                parts.push(std::mem::take(&mut current));
            }
            current_is_digit = None;
            continue;
        }
        let digit = c.is_ascii_digit();
        if current_is_digit.is_some_and(|d| d != digit) && !current.is_empty() {
            parts.push(std::mem::take(&mut current));
        }
        current_is_digit = Some(digit);
        current.push(c);
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

impl LatestStrategy for LatestRevisionStrategy {
    fn name(&self) -> &str {
        LATEST_REVISION
    }

    fn compare(&self, a: &str, b: &str) -> Ordering {
        let parts_a = revision_parts(a);
        let parts_b = revision_parts(b);
        for (pa, pb) in parts_a.iter().zip(parts_b.iter()) {
            if is_number(pa) && is_number(pb) {
                match compare_numbers(pa, pb) {
                    Ordering::Equal => continue,
                    other => return other,
                }
            }
            if pa == pb {
                continue;
            }
            let sa = Self::special_meaning(pa);
            let sb = Self::special_meaning(pb);
            if let Some(sa) = sa {
                return sa.cmp(&sb.unwrap_or(0));
            }
            if let Some(sb) = sb {
                return 0.cmp(&sb);
            }
            if is_number(pa) {
                return Ordering::Greater;
            }
            if is_number(pb) {
                return Ordering::Less;
            }
            return pa.cmp(pb);
        }
        match parts_a.len().cmp(&parts_b.len()) {
            Ordering::Less => {
                if is_number(&parts_b[parts_a.len()]) {
                    Ordering::Less
                } else {
                    Ordering::Greater
                }
            }
            Ordering::Greater => {
                if is_number(&parts_a[parts_b.len()]) {
                    Ordering::Greater
                } else {
                    Ordering::Less
                }
            }
            Ordering::Equal => Ordering::Equal,
        }
    }
}

/// Strategies available in every registry
pub fn builtin_latest_strategies() -> Vec<Arc<dyn LatestStrategy>> {
    vec![
        Arc::new(LatestRevisionStrategy),
        Arc::new(LatestLexicographicStrategy),
    ]
}

/// Kinds of dynamic revision
#[derive(Debug, Clone, PartialEq, Eq)]
enum Constraint<'a> {
    /// `latest.<status>`
    Latest,
    /// `1.2.+`
    Prefix(&'a str),
    /// `[1.0,2.0)` and friends; `None` bounds are open
    Range {
        lower: Option<(&'a str, bool)>,
        upper: Option<(&'a str, bool)>,
    },
    Exact(&'a str),
}

fn parse_constraint(revision: &str) -> Constraint<'_> {
    if revision.starts_with("latest.") {
        return Constraint::Latest;
    }
    if let Some(prefix) = revision.strip_suffix('+') {
        return Constraint::Prefix(prefix);
    }
    if revision.len() >= 3 && revision.contains(',') {
        let first = revision.as_bytes()[0];
        let last = revision.as_bytes()[revision.len() - 1];
        if matches!(first, b'[' | b'(' | b']') && matches!(last, b']' | b')' | b'[') {
            let inner = &revision[1..revision.len() - 1];
            if let Some((low, high)) = inner.split_once(',') {
                let low = low.trim();
                let high = high.trim();
                return Constraint::Range {
                    lower: (!low.is_empty()).then_some((low, first == b'[')),
                    upper: (!high.is_empty()).then_some((high, last == b']')),
                };
            }
        }
    }
    Constraint::Exact(revision)
}

/// Dynamic revision detection and acceptance
#[derive(Debug, Clone, Copy, Default)]
pub struct VersionMatcher;

impl VersionMatcher {
    pub fn is_dynamic(&self, mrid: &ModuleRevisionId) -> bool {
        self.is_dynamic_revision(&mrid.revision)
    }

    pub fn is_dynamic_revision(&self, revision: &str) -> bool {
        !matches!(parse_constraint(revision), Constraint::Exact(_))
    }

    /// Does the concrete `found` revision satisfy `asked`?
    ///
    /// `latest.<status>` accepts any revision; status filtering needs module
    /// metadata this layer does not read.
    pub fn accept(&self, asked: &str, found: &str) -> bool {
        let order = LatestRevisionStrategy;
        match parse_constraint(asked) {
            Constraint::Latest => true,
            Constraint::Prefix(prefix) => found.starts_with(prefix),
            Constraint::Range { lower, upper } => {
                let lower_ok = lower.map_or(true, |(bound, inclusive)| {
                    match order.compare(found, bound) {
                        Ordering::Greater => true,
                        Ordering::Equal => inclusive,
                        Ordering::Less => false,
                    }
                });
                let upper_ok = upper.map_or(true, |(bound, inclusive)| {
                    match order.compare(found, bound) {
                        Ordering::Less => true,
                        Ordering::Equal => inclusive,
                        Ordering::Greater => false,
                    }
                });
                lower_ok && upper_ok
            }
            Constraint::Exact(rev) => rev == found,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_revision_ordering() {
        let s = LatestRevisionStrategy;
        assert_eq!(s.compare("1.10", "1.9"), Ordering::Greater);
        assert_eq!(s.compare("1.0", "1.0.1"), Ordering::Less);
        assert_eq!(s.compare("1.0", "1.0-dev"), Ordering::Greater);
        assert_eq!(s.compare("1.0-rc1", "1.0-dev1"), Ordering::Greater);
        assert_eq!(s.compare("1.0final", "1.0rc2"), Ordering::Greater);
        assert_eq!(s.compare("2.0", "2.0"), Ordering::Equal);
        assert_eq!(s.compare("1.01", "1.1"), Ordering::Equal);
    }

    #[test]
    fn test_find_latest() {
        let revs: Vec<String> = ["1.2", "1.10", "1.9"].iter().map(|s| s.to_string()).collect();
        assert_eq!(LatestRevisionStrategy.find_latest(&revs).unwrap(), "1.10");
        assert_eq!(LatestLexicographicStrategy.find_latest(&revs).unwrap(), "1.9");
        assert!(LatestRevisionStrategy.find_latest(&[]).is_none());
    }

    #[test]
    fn test_dynamic_detection() {
        let vm = VersionMatcher;
        assert!(vm.is_dynamic_revision("latest.integration"));
        assert!(vm.is_dynamic_revision("1.+"));
        assert!(vm.is_dynamic_revision("[1.0,2.0)"));
        assert!(vm.is_dynamic_revision("]1.0,["));
        assert!(!vm.is_dynamic_revision("1.0"));
        assert!(!vm.is_dynamic_revision("1.0-SNAPSHOT"));
    }

    #[test]
    fn test_accept() {
        let vm = VersionMatcher;
        assert!(vm.accept("latest.release", "3.1"));
        assert!(vm.accept("1.+", "1.4"));
        assert!(!vm.accept("1.+", "2.0"));
        assert!(vm.accept("[1.0,2.0)", "1.0"));
        assert!(vm.accept("[1.0,2.0)", "1.9.9"));
        assert!(!vm.accept("[1.0,2.0)", "2.0"));
        assert!(!vm.accept("(1.0,2.0]", "1.0"));
        assert!(vm.accept("(1.0,2.0]", "2.0"));
        assert!(vm.accept("[1.5,)", "10.0"));
        assert!(vm.accept("1.0", "1.0"));
        assert!(!vm.accept("1.0", "1.1"));
    }
}
