//! Engine configuration loaded from TOML
//!
//! ```toml
//! [controller]
//! max_retries = 3
//! retry_delay_ms = 5000
//! backoff = "exponential"
//!
//! [agent]
//! learning_rate = 0.1
//! epsilon = 0.2
//!
//! [storage]
//! root = "./quarry-data"
//! keep_versions = 20
//! ```
//!
//! Every section and field is optional and falls back to its default.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use quarry_rl_core::{AgentConfig, EngineError};

use crate::controller::ControllerConfig;

/// Where models and progress snapshots live
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory of the filesystem blob store
    pub root: PathBuf,
    /// Key prefix for model versions
    pub model_prefix: String,
    /// Versions kept per model; 0 keeps all
    pub keep_versions: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./quarry-data"),
            model_prefix: "models".to_string(),
            keep_versions: 20,
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Retry and timeout policy
    pub controller: ControllerConfig,
    /// Learning parameters shared by every domain's agent
    pub agent: AgentConfig,
    /// Storage layout
    pub storage: StorageConfig,
}

impl EngineConfig {
    /// Read and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> quarry_rl_core::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("failed to read {}: {e}", path.display())))?;
        let config = Self::from_toml_str(&content)?;
        debug!(path = %path.display(), "Engine configuration loaded");
        Ok(config)
    }

    /// Parse and validate TOML text
    pub fn from_toml_str(content: &str) -> quarry_rl_core::Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| EngineError::Config(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every section
    pub fn validate(&self) -> quarry_rl_core::Result<()> {
        self.controller.validate()?;
        self.agent.validate()?;
        if self.storage.model_prefix.trim_matches('/').is_empty() {
            return Err(EngineError::Config("storage.model_prefix is empty".into()));
        }
        Ok(())
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> quarry_rl_core::Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| EngineError::Config(format!("cannot render configuration: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::Backoff;

    #[test]
    fn test_missing_sections_use_defaults() {
        let config = tokio_test::assert_ok!(EngineConfig::from_toml_str(""));
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.controller.max_retries, 3);
        assert_eq!(config.controller.timeout_secs, 70);
        assert!((config.agent.learning_rate - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn test_partial_sections() {
        let config = EngineConfig::from_toml_str(
            r#"
            [controller]
            max_retries = 5
            backoff = "exponential"

            [agent]
            epsilon = 0.5
            seed = 7
            "#,
        )
        .unwrap();
        assert_eq!(config.controller.max_retries, 5);
        assert_eq!(config.controller.backoff, Backoff::Exponential);
        assert_eq!(config.controller.retry_delay_ms, 5_000);
        assert!((config.agent.epsilon - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.agent.seed, Some(7));
        assert_eq!(config.storage.model_prefix, "models");
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        let err = EngineConfig::from_toml_str("[agent]\nlearning_rate = 0.0\n").unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
        let err = EngineConfig::from_toml_str("[controller]\ntimeout_secs = 0\n").unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
        let err = EngineConfig::from_toml_str("[controller\n").unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quarry.toml");
        let mut config = EngineConfig::default();
        config.storage.keep_versions = 3;
        std::fs::write(&path, config.to_toml_string().unwrap()).unwrap();

        assert_eq!(EngineConfig::load(&path).unwrap(), config);
        assert!(EngineConfig::load(dir.path().join("missing.toml")).is_err());
    }
}
