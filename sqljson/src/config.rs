use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::logging::LogLevel;
use crate::{SqlJsonError, SqlJsonResult};

/// Engine settings. Every field has a default, so a config file only needs
/// the entries it changes.
///
/// ```toml
/// fetched_table = "fetched"
/// query_log_level = "info"
/// log_results = true
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Name under which the rows a node fetched remotely are visible to that
    /// node's in-memory queries. Unset: only preloaded tables are visible.
    pub fetched_table: Option<String>,

    /// Level of query diagnostics for nodes without their own `logLevel`.
    pub query_log_level: LogLevel,

    /// Include result rows in query diagnostics.
    pub log_results: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fetched_table: None,
            query_log_level: LogLevel::Debug,
            log_results: false,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> SqlJsonResult<Self> {
        toml::from_str(text).map_err(|e| SqlJsonError::Config(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> SqlJsonResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn with_fetched_table(mut self, name: impl Into<String>) -> Self {
        self.fetched_table = Some(name.into());
        self
    }
}
