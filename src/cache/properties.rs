//! Key/value metadata files
//!
//! One `key=value` entry per line, `#` and `!` start comments. Keys and values
//! escape `\`, `=`, `:`, `#`, `!` and line breaks with a backslash so any
//! string survives a save/load cycle.
//!
//! Every `save` writes a uniquely named temporary file, syncs it and renames
//! it over the previous one: readers see either the old or the new content.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertiesFile {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl PropertiesFile {
    /// Load `path`, or start empty when it does not exist yet
    pub fn load(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(contents) => parse(&contents),
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e),
        };
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Write all entries to disk before returning
    pub fn save(&self) -> io::Result<()> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent)?;
        let mut tmp = NamedTempFile::new_in(parent)?;
        writeln!(tmp, "#modresolve metadata")?;
        for (key, value) in &self.entries {
            writeln!(tmp, "{}={}", escape(key), escape(value))?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        trace!("Saved {} entries to {:?}", self.entries.len(), self.path);
        Ok(())
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' | '=' | ':' | '#' | '!' => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out
}

/// Split an escaped line at its first unescaped separator and unescape both halves
fn parse_line(line: &str) -> Option<(String, String)> {
    let mut key = String::new();
    let mut value = String::new();
    let mut in_value = false;
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        let target = if in_value { &mut value } else { &mut key };
        match c {
            '\\' => match chars.next() {
                Some('n') => target.push('\n'),
                Some('r') => target.push('\r'),
                Some(other) => target.push(other),
                None => {}
            },
            '=' | ':' if !in_value => in_value = true,
            _ => target.push(c),
        }
    }
    in_value.then_some((key, value))
}

fn parse(contents: &str) -> BTreeMap<String, String> {
    contents
        .lines()
        .filter(|line| {
            let trimmed = line.trim_start();
            !(trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!'))
        })
        .filter_map(parse_line)
        .collect()
}
