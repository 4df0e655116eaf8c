// SPDX-License-Identifier: AGPL-3.0-only

//! `Variable=Value` parameter files.
//!
//! One entry per line, `#` starts a comment, keys are case-insensitive and
//! surrounding whitespace is ignored. A bare key (no `=`) is a flag set to
//! `1`. Command-line overrides use the same syntax and are appended after the
//! file, so later entries win.

use std::fmt;
use std::path::Path;

use crate::error::{QcdError, Result};

/// Ordered key/value entries; keys are stored upper-case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterSet {
    entries: Vec<(String, String)>,
}

impl ParameterSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a whole parameter text.
    ///
    /// # Errors
    ///
    /// [`QcdError::Config`] naming the line of an entry with an empty key.
    pub fn parse(text: &str) -> Result<Self> {
        let mut set = Self::new();
        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            set.push_entry(line)
                .map_err(|e| QcdError::Config(format!("line {}: {e}", lineno + 1)))?;
        }
        Ok(set)
    }

    /// Read and parse a parameter file.
    ///
    /// # Errors
    ///
    /// [`QcdError::Io`] if the file cannot be read, or a parse error.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Append one `KEY=VALUE` or bare `KEY` entry.
    ///
    /// # Errors
    ///
    /// [`QcdError::Config`] if the key is empty.
    pub fn push_entry(&mut self, entry: &str) -> Result<()> {
        let (key, value) = match entry.split_once('=') {
            Some((k, v)) => (k.trim(), v.trim()),
            None => (entry.trim(), "1"),
        };
        if key.is_empty() {
            return Err(QcdError::config(format!("entry `{entry}` has no variable name")));
        }
        self.set(key, value);
        Ok(())
    }

    /// Append a key/value pair.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.entries.push((key.to_ascii_uppercase(), value.into()));
    }

    /// Append all entries of `other` after ours.
    pub fn extend(&mut self, other: &Self) {
        self.entries.extend(other.entries.iter().cloned());
    }

    /// Last value given for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        let key = key.to_ascii_uppercase();
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for ParameterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (k, v) in &self.entries {
            writeln!(f, "{k}={v}")?;
        }
        Ok(())
    }
}
