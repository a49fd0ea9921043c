//! Tracker configuration, read from TOML.
//!
//! Every field has a default, so an empty file (or no file) is a valid
//! configuration:
//!
//! ```toml
//! database_path = "/var/lib/changelog-tracker/tracker.db"
//!
//! [registry]
//! api_base = "https://registry.internal/api"
//! lookup_timeout_secs = 10
//!
//! [indexer]
//! page_size = 50
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// SQLite database file
    pub database_path: PathBuf,
    pub registry: RegistryConfig,
    pub indexer: IndexerConfig,
    pub reconcile: ReconcileConfig,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("changelog-tracker.db"),
            registry: RegistryConfig::default(),
            indexer: IndexerConfig::default(),
            reconcile: ReconcileConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Base URL of the JSON API (`/query` and `/info` are appended)
    pub api_base: String,
    /// Base URL of the public site that hosts changelog pages
    pub site_base: String,
    pub lookup_timeout_secs: u64,
    pub list_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.wordpress.org/plugins/registry".to_string(),
            site_base: "https://wordpress.org".to_string(),
            lookup_timeout_secs: 10,
            list_timeout_secs: 30,
            user_agent: concat!("changelog-tracker/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    pub page_size: u32,
    /// Warm-up only indexes while the catalog holds fewer entries than this
    pub warm_up_threshold: u64,
    pub warm_up_batches: u32,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            page_size: 50,
            warm_up_threshold: 50,
            warm_up_batches: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Minimum gap between scheduled runs
    pub interval_secs: u64,
    /// Upper bound for each reconciliation phase
    pub phase_timeout_secs: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            interval_secs: 24 * 60 * 60,
            phase_timeout_secs: 300,
        }
    }
}

impl TrackerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.indexer.page_size == 0 {
            return Err(ConfigError::Invalid {
                field: "indexer.page_size",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.registry.lookup_timeout_secs == 0 || self.registry.list_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "registry timeouts",
                reason: "must be at least 1 second".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = TrackerConfig::from_toml_str("").unwrap();
        assert_eq!(config, TrackerConfig::default());
        assert_eq!(config.indexer.page_size, 50);
        assert_eq!(config.registry.lookup_timeout_secs, 10);
        assert_eq!(config.registry.list_timeout_secs, 30);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = TrackerConfig::from_toml_str(
            r#"
            database_path = "/tmp/tracker.db"

            [registry]
            api_base = "http://localhost:9000"

            [reconcile]
            interval_secs = 3600
            "#,
        )
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/tmp/tracker.db"));
        assert_eq!(config.registry.api_base, "http://localhost:9000");
        assert_eq!(config.registry.site_base, "https://wordpress.org");
        assert_eq!(config.reconcile.interval_secs, 3600);
        assert_eq!(config.reconcile.phase_timeout_secs, 300);
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let err = TrackerConfig::from_toml_str("[indexer]\npage_size = 0").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "indexer.page_size",
                ..
            }
        ));
    }
}
