use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Longest per-fetch timeout accepted by `validate`
const MAX_LOAD_TIMEOUT_MS: u64 = 10 * 60 * 1000;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

/// Explorer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplorerConfig {
    /// Per-fetch timeout in milliseconds (0 waits forever)
    #[serde(default = "default_load_timeout_ms")]
    pub load_timeout_ms: u64,

    /// Abort the fetch task of a superseded load instead of letting it finish
    #[serde(default = "default_true")]
    pub abort_superseded: bool,

    /// Expand contributor roots when the view starts
    #[serde(default = "default_true")]
    pub expand_roots: bool,

    /// Default level for the log filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_load_timeout_ms() -> u64 {
    30_000
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            load_timeout_ms: default_load_timeout_ms(),
            abort_superseded: true,
            expand_roots: true,
            log_level: default_log_level(),
        }
    }
}

impl ExplorerConfig {
    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        let config: ExplorerConfig =
            serde_json::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path.as_ref(), contents).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Per-fetch timeout, if one is configured
    pub fn load_timeout(&self) -> Option<Duration> {
        (self.load_timeout_ms > 0).then(|| Duration::from_millis(self.load_timeout_ms))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.load_timeout_ms > MAX_LOAD_TIMEOUT_MS {
            return Err(ConfigError::ValidationError(format!(
                "load_timeout_ms must be <= {MAX_LOAD_TIMEOUT_MS}"
            )));
        }

        if !LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "unknown log_level '{}'",
                self.log_level
            )));
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Serialize error: {0}")]
    SerializeError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
}
