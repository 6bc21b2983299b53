//! Executor configuration.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Default number of records fetched per page by batched iteration.
pub const DEFAULT_BATCH_SIZE: u32 = 1000;

/// How the executor treats access to an association that was not loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadMode {
    /// Raise `NotPreloaded`.
    #[default]
    Strict,
    /// Fetch the association for that one record and log a warning.
    Permissive,
}

/// Executor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Behaviour on access to an unloaded association.
    pub load_mode: LoadMode,

    /// Page size for batched iteration.
    pub batch_size: u32,

    /// Log every executed statement at `debug` level.
    pub log_statements: bool,
}

impl ExecutorConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self {
            load_mode: LoadMode::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            log_statements: true,
        }
    }

    /// Set the load mode.
    pub fn with_load_mode(mut self, mode: LoadMode) -> Self {
        self.load_mode = mode;
        self
    }

    /// Set the batch size. Zero is raised to one.
    pub fn with_batch_size(mut self, size: u32) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Enable or disable statement logging.
    pub fn with_log_statements(mut self, enabled: bool) -> Self {
        self.log_statements = enabled;
        self
    }

    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::InvalidArgument(format!("executor config: {}", e)))?;
        if config.batch_size == 0 {
            return Err(Error::InvalidArgument(
                "executor config: batch_size must be positive".to_string(),
            ));
        }
        Ok(config)
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ExecutorConfig::default();
        assert_eq!(config.load_mode, LoadMode::Strict);
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert!(config.log_statements);
    }

    #[test]
    fn test_builder() {
        let config = ExecutorConfig::new()
            .with_load_mode(LoadMode::Permissive)
            .with_batch_size(0)
            .with_log_statements(false);
        assert_eq!(config.load_mode, LoadMode::Permissive);
        assert_eq!(config.batch_size, 1);
        assert!(!config.log_statements);
    }

    #[test]
    fn test_from_json() {
        let config = ExecutorConfig::from_json(r#"{"load_mode": "permissive"}"#).unwrap();
        assert_eq!(config.load_mode, LoadMode::Permissive);
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);

        assert!(ExecutorConfig::from_json(r#"{"batch_size": 0}"#).is_err());
        assert!(ExecutorConfig::from_json(r#"{"load_mode": "lazy"}"#).is_err());
    }
}
