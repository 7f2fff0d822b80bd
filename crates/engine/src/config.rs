//! Coordinator configuration via `xapool.toml`
//!
//! A missing file means defaults. To change settings, write the default file
//! once with [`XaConfig::write_default_if_missing`], edit it and restart.
//! The isolation level of pooled connections is fixed at read-committed and
//! is not configurable.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use xapool_core::{IdSource, RandomIds, SequentialIds, XaError, XaResult, DEFAULT_ID_MODULUS};
use xapool_pool::DEFAULT_MAX_IDLE;

/// Config file name.
pub const CONFIG_FILE_NAME: &str = "xapool.toml";

/// Coordinator configuration loaded from `xapool.toml`.
///
/// # Example
///
/// ```toml
/// max_idle_per_pool = 8
/// id_source = "sequential"
/// txn_id_modulus = 2147483647
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct XaConfig {
    /// Idle connections kept per pool; extra connections are dropped on release.
    #[serde(default = "default_max_idle")]
    pub max_idle_per_pool: usize,
    /// Transaction id source: `"sequential"` or `"random"`.
    #[serde(default = "default_id_source")]
    pub id_source: String,
    /// Sequential ids run `1..txn_id_modulus` and then wrap to 1.
    #[serde(default = "default_modulus")]
    pub txn_id_modulus: u64,
}

fn default_max_idle() -> usize {
    DEFAULT_MAX_IDLE
}

fn default_id_source() -> String {
    "sequential".to_string()
}

fn default_modulus() -> u64 {
    DEFAULT_ID_MODULUS
}

impl Default for XaConfig {
    fn default() -> Self {
        Self {
            max_idle_per_pool: default_max_idle(),
            id_source: default_id_source(),
            txn_id_modulus: default_modulus(),
        }
    }
}

impl XaConfig {
    /// Check every value.
    ///
    /// # Errors
    ///
    /// Returns [`XaError::Config`] for an unknown id source or a modulus
    /// below 2.
    pub fn validate(&self) -> XaResult<()> {
        match self.id_source.as_str() {
            "sequential" | "random" => {}
            other => {
                return Err(XaError::Config(format!(
                    "Invalid id_source '{}' in {}. Expected \"sequential\" or \"random\".",
                    other, CONFIG_FILE_NAME
                )))
            }
        }
        if self.txn_id_modulus < 2 {
            return Err(XaError::Config(format!(
                "txn_id_modulus must be at least 2, got {}",
                self.txn_id_modulus
            )));
        }
        Ok(())
    }

    /// Build the configured transaction id source.
    ///
    /// # Errors
    ///
    /// Returns [`XaError::Config`] if the config does not validate.
    pub fn id_source(&self) -> XaResult<Arc<dyn IdSource>> {
        self.validate()?;
        Ok(match self.id_source.as_str() {
            "random" => Arc::new(RandomIds),
            _ => Arc::new(SequentialIds::with_modulus(self.txn_id_modulus)),
        })
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# xapool configuration
#
# Idle physical connections kept per pool (default: 8).
# Connections released beyond this are closed.
max_idle_per_pool = 8

# Transaction id source: "sequential" (default) or "random"
#   "sequential" = 1, 2, 3, ... wrapping back to 1 at txn_id_modulus
#   "random"     = random 64-bit ids
id_source = "sequential"

# Upper bound (exclusive) for sequential transaction ids.
txn_id_modulus = 2147483647
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> XaResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            XaError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: XaConfig = toml::from_str(&content).map_err(|e| {
            XaError::Config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> XaResult<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                XaError::Config(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> XaResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| XaError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            XaError::Config(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
