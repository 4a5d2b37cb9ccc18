//! Pattern matching algorithms
//!
//! A `PatternMatcher` is a named algorithm (exact, regexp, glob, ...) that
//! compiles an expression into a `Matcher`. Algorithms are looked up by name
//! through the `Registry`, so a resolver can say "changing revisions are
//! those matching `.*-SNAPSHOT` with the `regexp` matcher".

use regex::Regex;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

pub const EXACT: &str = "exact";
pub const REGEXP: &str = "regexp";
pub const GLOB: &str = "glob";
pub const EXACT_OR_REGEXP: &str = "exactOrRegexp";

/// Expression matching everything, whatever the algorithm
pub const ANY_EXPRESSION: &str = "*";

#[derive(Debug, Error)]
pub enum MatcherError {
    #[error("invalid {matcher} expression '{expression}': {source}")]
    InvalidExpression {
        matcher: String,
        expression: String,
        #[source]
        source: regex::Error,
    },

    #[error("unknown matcher '{0}'")]
    UnknownMatcher(String),
}

/// A compiled expression
pub trait Matcher: Send + Sync + fmt::Debug {
    fn matches(&self, input: &str) -> bool;

    /// True when the matcher only accepts a single literal value
    fn is_exact(&self) -> bool;
}

/// A named matching algorithm
pub trait PatternMatcher: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn matcher(&self, expression: &str) -> Result<Box<dyn Matcher>, MatcherError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoMatcher;

impl Matcher for NoMatcher {
    fn matches(&self, _input: &str) -> bool {
        false
    }

    fn is_exact(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AnyMatcher;

impl Matcher for AnyMatcher {
    fn matches(&self, _input: &str) -> bool {
        true
    }

    fn is_exact(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone)]
struct ExactMatcher(String);

impl Matcher for ExactMatcher {
    fn matches(&self, input: &str) -> bool {
        self.0 == input
    }

    fn is_exact(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone)]
struct RegexpMatcher(Regex);

impl Matcher for RegexpMatcher {
    fn matches(&self, input: &str) -> bool {
        self.0.is_match(input)
    }

    fn is_exact(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone)]
struct ExactOrRegexpMatcher {
    exact: String,
    regexp: Regex,
}

impl Matcher for ExactOrRegexpMatcher {
    fn matches(&self, input: &str) -> bool {
        self.exact == input || self.regexp.is_match(input)
    }

    fn is_exact(&self) -> bool {
        false
    }
}

fn anchored(matcher: &str, expression: &str, body: &str) -> Result<Regex, MatcherError> {
    Regex::new(&format!("^(?:{})$", body)).map_err(|source| MatcherError::InvalidExpression {
        matcher: matcher.to_string(),
        expression: expression.to_string(),
        source,
    })
}

fn glob_to_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() * 2);
    for c in glob.chars() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExactPatternMatcher;

impl PatternMatcher for ExactPatternMatcher {
    fn name(&self) -> &str {
        EXACT
    }

    fn matcher(&self, expression: &str) -> Result<Box<dyn Matcher>, MatcherError> {
        if expression == ANY_EXPRESSION {
            return Ok(Box::new(AnyMatcher));
        }
        Ok(Box::new(ExactMatcher(expression.to_string())))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RegexpPatternMatcher;

impl PatternMatcher for RegexpPatternMatcher {
    fn name(&self) -> &str {
        REGEXP
    }

    fn matcher(&self, expression: &str) -> Result<Box<dyn Matcher>, MatcherError> {
        if expression == ANY_EXPRESSION {
            return Ok(Box::new(AnyMatcher));
        }
        Ok(Box::new(RegexpMatcher(anchored(
            REGEXP, expression, expression,
        )?)))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExactOrRegexpPatternMatcher;

impl PatternMatcher for ExactOrRegexpPatternMatcher {
    fn name(&self) -> &str {
        EXACT_OR_REGEXP
    }

    fn matcher(&self, expression: &str) -> Result<Box<dyn Matcher>, MatcherError> {
        if expression == ANY_EXPRESSION {
            return Ok(Box::new(AnyMatcher));
        }
        Ok(Box::new(ExactOrRegexpMatcher {
            exact: expression.to_string(),
            regexp: anchored(EXACT_OR_REGEXP, expression, expression)?,
        }))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GlobPatternMatcher;

impl PatternMatcher for GlobPatternMatcher {
    fn name(&self) -> &str {
        GLOB
    }

    fn matcher(&self, expression: &str) -> Result<Box<dyn Matcher>, MatcherError> {
        if expression == ANY_EXPRESSION {
            return Ok(Box::new(AnyMatcher));
        }
        Ok(Box::new(RegexpMatcher(anchored(
            GLOB,
            expression,
            &glob_to_regex(expression),
        )?)))
    }
}

/// Matching algorithms available in every registry
pub fn builtin_matchers() -> Vec<Arc<dyn PatternMatcher>> {
    vec![
        Arc::new(ExactPatternMatcher),
        Arc::new(RegexpPatternMatcher),
        Arc::new(ExactOrRegexpPatternMatcher),
        Arc::new(GlobPatternMatcher),
    ]
}
