//! Cache path patterns
//!
//! Patterns are relative paths with `[token]` placeholders. Optional groups
//! `( ... )` are dropped entirely when a token inside them is missing or
//! empty, otherwise their parentheses are removed:
//!
//! `[artifact](-[classifier]).[ext]` gives `core-sources.jar` or `core.jar`.
//!
//! Unknown tokens outside an optional group are left as written.

use std::collections::HashMap;

use crate::module::artifact::Artifact;
use crate::module::id::ModuleRevisionId;

pub const ORGANISATION: &str = "organisation";
pub const MODULE: &str = "module";
pub const REVISION: &str = "revision";
pub const ARTIFACT: &str = "artifact";
pub const TYPE: &str = "type";
pub const EXT: &str = "ext";

/// Tokens for a module revision: organisation, module, revision and extra attributes
pub fn module_tokens(mrid: &ModuleRevisionId) -> HashMap<String, String> {
    let mut tokens: HashMap<String, String> = mrid
        .extra
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    tokens.insert(ORGANISATION.to_string(), mrid.organisation().to_string());
    tokens.insert(MODULE.to_string(), mrid.name().to_string());
    tokens.insert(REVISION.to_string(), mrid.revision.clone());
    tokens
}

/// Module tokens plus artifact, type, ext and the artifact's extra attributes
pub fn artifact_tokens(artifact: &Artifact) -> HashMap<String, String> {
    let mut tokens = module_tokens(&artifact.module_revision_id);
    for (k, v) in &artifact.extra {
        tokens.insert(k.clone(), v.clone());
    }
    tokens.insert(ARTIFACT.to_string(), artifact.name.clone());
    tokens.insert(TYPE.to_string(), artifact.artifact_type.clone());
    tokens.insert(EXT.to_string(), artifact.ext.clone());
    tokens
}

pub fn substitute_module(pattern: &str, mrid: &ModuleRevisionId) -> String {
    substitute(pattern, &module_tokens(mrid))
}

pub fn substitute_artifact(pattern: &str, artifact: &Artifact) -> String {
    substitute(pattern, &artifact_tokens(artifact))
}

/// Replace every `[token]` of `pattern`
pub fn substitute(pattern: &str, tokens: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(pattern.len());
    // (buffer, every token inside resolved to a non-empty value)
    let mut group: Option<(String, bool)> = None;
    let mut rest = pattern;

    while let Some(c) = rest.chars().next() {
        match c {
            '(' if group.is_none() => {
                group = Some((String::new(), true));
                rest = &rest[1..];
            }
            ')' if group.is_some() => {
                if let Some((buffer, complete)) = group.take() {
                    if complete {
                        out.push_str(&buffer);
                    }
                }
                rest = &rest[1..];
            }
            '[' => {
                let Some(end) = rest.find(']') else {
                    push(&mut out, &mut group, rest);
                    break;
                };
                let name = &rest[1..end];
                match tokens.get(name).filter(|v| !v.is_empty()) {
                    Some(value) => push(&mut out, &mut group, value),
                    None => match group.as_mut() {
                        Some((_, complete)) => *complete = false,
                        None => {
                            if !tokens.contains_key(name) {
                                out.push_str(&rest[..=end]);
                            }
                        }
                    },
                }
                rest = &rest[end + 1..];
            }
            _ => {
                let len = c.len_utf8();
                push(&mut out, &mut group, &rest[..len]);
                rest = &rest[len..];
            }
        }
    }
    // unbalanced '(' is kept literally
    if let Some((buffer, _)) = group {
        out.push('(');
        out.push_str(&buffer);
    }
    out
}

fn push(out: &mut String, group: &mut Option<(String, bool)>, text: &str) {
    match group {
        Some((buffer, _)) => buffer.push_str(text),
        None => out.push_str(text),
    }
}

/// Part of `pattern` before the path segment that is exactly `[token]`
///
/// `None` when no segment consists of the token alone.
pub fn prefix_before_segment<'a>(pattern: &'a str, token: &str) -> Option<&'a str> {
    let placeholder = format!("[{}]", token);
    let mut offset = 0;
    for segment in pattern.split('/') {
        if segment == placeholder {
            return Some(pattern[..offset].trim_end_matches('/'));
        }
        offset += segment.len() + 1;
    }
    None
}
