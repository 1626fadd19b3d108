//! Entry filtering: hidden files, exclusion globs and store files.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};

use archivekeeper_core::ScanError;

/// Decides which entries the walker skips.
#[derive(Debug, Clone)]
pub struct EntryFilter {
    excludes: GlobSet,
    include_hidden: bool,
    skip: Vec<PathBuf>,
}

impl EntryFilter {
    /// Build a filter from glob patterns.
    pub fn new(patterns: &[String], include_hidden: bool) -> Result<Self, ScanError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern).map_err(|e| ScanError::InvalidPattern {
                pattern: pattern.clone(),
                message: e.to_string(),
            })?;
            builder.add(glob);
        }
        let excludes = builder.build().map_err(|e| ScanError::InvalidPattern {
            pattern: patterns.join(","),
            message: e.to_string(),
        })?;

        Ok(Self {
            excludes,
            include_hidden,
            skip: Vec::new(),
        })
    }

    /// A filter that only skips hidden entries.
    pub fn hidden_only() -> Self {
        Self {
            excludes: GlobSet::empty(),
            include_hidden: false,
            skip: Vec::new(),
        }
    }

    /// Always skip this absolute path (and everything beneath it).
    pub fn skip_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.skip.push(path.into());
        self
    }

    /// Check if hidden entries should be skipped.
    pub fn should_skip_hidden(&self, name: &str) -> bool {
        !self.include_hidden && name.starts_with('.')
    }

    /// Check an entry against every rule.
    pub fn is_excluded(&self, relative: &str, name: &str, absolute: &Path) -> bool {
        if self.should_skip_hidden(name) {
            return true;
        }
        if self.skip.iter().any(|s| absolute == s) {
            return true;
        }
        self.excludes.is_match(relative) || self.excludes.is_match(name)
    }
}

impl Default for EntryFilter {
    fn default() -> Self {
        Self::hidden_only()
    }
}
