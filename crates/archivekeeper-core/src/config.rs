//! Run configuration and the optional settings file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hash::HashAlgorithm;

/// Directory under the archive root that holds the default store.
pub const STORE_DIR_NAME: &str = ".archivekeeper";

const DEFAULT_DB_FILE: &str = "state.db";

/// Configuration for one integrity run.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct KeeperConfig {
    /// Archive root to track.
    pub root: PathBuf,

    /// Snapshot database (None = `<root>/.archivekeeper/state.db`).
    #[builder(default, setter(into, strip_option))]
    #[serde(default)]
    pub database: Option<PathBuf>,

    /// Include hidden files (starting with .).
    #[builder(default = "false")]
    #[serde(default)]
    pub include_hidden: bool,

    /// Follow symbolic links.
    #[builder(default = "false")]
    #[serde(default)]
    pub follow_symlinks: bool,

    /// Glob patterns to exclude, matched against the relative path and the name.
    #[builder(default)]
    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    /// Number of hashing threads (0 = auto-detect).
    #[builder(default = "0")]
    #[serde(default)]
    pub threads: usize,

    /// Read buffer size for hashing.
    #[builder(default = "default_chunk_size()")]
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Files larger than this log hashing progress.
    #[builder(default = "default_progress_threshold()")]
    #[serde(default = "default_progress_threshold")]
    pub progress_log_threshold: u64,

    /// Digest algorithm.
    #[builder(default)]
    #[serde(default)]
    pub hash_algorithm: HashAlgorithm,

    /// Extra attempts after a transient hashing failure.
    #[builder(default = "default_max_retries()")]
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Per-file hashing deadline in seconds.
    #[builder(default = "default_file_timeout_secs()")]
    #[serde(default = "default_file_timeout_secs")]
    pub file_timeout_secs: u64,
}

fn default_chunk_size() -> usize {
    4 * 1024 * 1024
}

fn default_progress_threshold() -> u64 {
    100 * 1024 * 1024
}

fn default_max_retries() -> u32 {
    2
}

fn default_file_timeout_secs() -> u64 {
    600
}

impl KeeperConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        match self.root {
            Some(ref root) if root.as_os_str().is_empty() => {
                return Err("Root path cannot be empty".to_string());
            }
            None => return Err("Root path is required".to_string()),
            _ => {}
        }
        if self.chunk_size == Some(0) {
            return Err("Chunk size must be positive".to_string());
        }
        Ok(())
    }
}

impl KeeperConfig {
    /// Create a new config builder.
    pub fn builder() -> KeeperConfigBuilder {
        KeeperConfigBuilder::default()
    }

    /// Create a simple config for tracking a path.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            database: None,
            include_hidden: false,
            follow_symlinks: false,
            exclude_patterns: Vec::new(),
            threads: 0,
            chunk_size: default_chunk_size(),
            progress_log_threshold: default_progress_threshold(),
            hash_algorithm: HashAlgorithm::default(),
            max_retries: default_max_retries(),
            file_timeout_secs: default_file_timeout_secs(),
        }
    }

    /// Resolve the database path against a (canonical) root.
    pub fn database_path(&self, root: &Path) -> PathBuf {
        match &self.database {
            Some(path) => path.clone(),
            None => root.join(STORE_DIR_NAME).join(DEFAULT_DB_FILE),
        }
    }

    /// Per-file hashing deadline.
    pub fn file_timeout(&self) -> Duration {
        Duration::from_secs(self.file_timeout_secs)
    }
}

impl Default for KeeperConfig {
    fn default() -> Self {
        Self::new(".")
    }
}

/// Errors loading the settings file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Settings file could not be read.
    #[error("Cannot read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Settings file is not valid TOML for this schema.
    #[error("Invalid settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Resulting configuration failed validation.
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Default location of the settings file.
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("archivekeeper").join("config.toml"))
}

/// Values from the TOML settings file. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileSettings {
    pub database: Option<PathBuf>,
    pub include_hidden: Option<bool>,
    pub follow_symlinks: Option<bool>,
    pub exclude_patterns: Option<Vec<String>>,
    pub threads: Option<usize>,
    pub chunk_size: Option<usize>,
    pub progress_log_threshold: Option<u64>,
    pub hash_algorithm: Option<HashAlgorithm>,
    pub max_retries: Option<u32>,
    pub file_timeout_secs: Option<u64>,
}

impl FileSettings {
    /// Load settings from an explicit path.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load from the default location; an absent file yields defaults.
    pub fn load_default() -> Result<Self, ConfigError> {
        match default_settings_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Seed a builder with these values. Later setter calls override them.
    pub fn apply(&self, builder: &mut KeeperConfigBuilder) {
        if let Some(ref database) = self.database {
            builder.database(database.clone());
        }
        if let Some(v) = self.include_hidden {
            builder.include_hidden(v);
        }
        if let Some(v) = self.follow_symlinks {
            builder.follow_symlinks(v);
        }
        if let Some(ref v) = self.exclude_patterns {
            builder.exclude_patterns(v.clone());
        }
        if let Some(v) = self.threads {
            builder.threads(v);
        }
        if let Some(v) = self.chunk_size {
            builder.chunk_size(v);
        }
        if let Some(v) = self.progress_log_threshold {
            builder.progress_log_threshold(v);
        }
        if let Some(v) = self.hash_algorithm {
            builder.hash_algorithm(v);
        }
        if let Some(v) = self.max_retries {
            builder.max_retries(v);
        }
        if let Some(v) = self.file_timeout_secs {
            builder.file_timeout_secs(v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = KeeperConfig::builder()
            .root("/archive")
            .threads(4usize)
            .follow_symlinks(true)
            .hash_algorithm(HashAlgorithm::Blake3)
            .build()
            .unwrap();

        assert_eq!(config.root, PathBuf::from("/archive"));
        assert_eq!(config.threads, 4);
        assert!(config.follow_symlinks);
        assert_eq!(config.hash_algorithm, HashAlgorithm::Blake3);
        assert_eq!(config.chunk_size, 4 * 1024 * 1024);
    }

    #[test]
    fn test_builder_rejects_missing_root() {
        assert!(KeeperConfig::builder().build().is_err());
        assert!(KeeperConfig::builder().root("").build().is_err());
    }

    #[test]
    fn test_builder_rejects_zero_chunk() {
        let result = KeeperConfig::builder().root("/a").chunk_size(0usize).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_default_database_under_root() {
        let config = KeeperConfig::new("/archive");
        assert_eq!(
            config.database_path(Path::new("/archive")),
            PathBuf::from("/archive/.archivekeeper/state.db")
        );

        let config = KeeperConfig::builder()
            .root("/archive")
            .database("/var/lib/keeper.db")
            .build()
            .unwrap();
        assert_eq!(
            config.database_path(Path::new("/archive")),
            PathBuf::from("/var/lib/keeper.db")
        );
    }

    #[test]
    fn test_settings_file_overridden_by_later_setters() {
        let settings: FileSettings = toml::from_str(
            r#"
            threads = 2
            hash_algorithm = "blake3"
            exclude_patterns = ["*.xmp"]
            "#,
        )
        .unwrap();

        let mut builder = KeeperConfig::builder();
        builder.root("/archive");
        settings.apply(&mut builder);
        builder.threads(8usize);
        let config = builder.build().unwrap();

        assert_eq!(config.threads, 8);
        assert_eq!(config.hash_algorithm, HashAlgorithm::Blake3);
        assert_eq!(config.exclude_patterns, vec!["*.xmp".to_string()]);
    }

    #[test]
    fn test_settings_reject_unknown_keys() {
        let result: Result<FileSettings, _> = toml::from_str("colour = \"red\"");
        assert!(result.is_err());
    }
}
