//! Engine configuration
//!
//! Loaded from TOML; every field has a default so an empty file is valid.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Fallback values for the participant's target environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Connection target used when the session points at a local database
    pub default_connection_uri: String,
    /// Cloud region for key management checks
    pub default_region: String,
    /// Credentials profile for key management checks
    pub default_profile: String,
    /// Tool name to binary path, consulted before `PATH`
    pub tool_paths: BTreeMap<String, PathBuf>,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            default_connection_uri: "mongodb://localhost:27017".to_string(),
            default_region: "eu-central-1".to_string(),
            default_profile: "default".to_string(),
            tool_paths: BTreeMap::new(),
        }
    }
}

/// Workshop server endpoint for the remote store, oracle and cleaner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Server root, e.g. `http://localhost:5173`
    pub base_url: String,
    /// Per-request timeout
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5173".to_string(),
            timeout_secs: 30,
        }
    }
}

impl RemoteConfig {
    /// Request timeout
    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Points subtracted for revealing help
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PenaltyConfig {
    /// Flat penalty per revealed solution
    pub solution: u32,
    /// Penalty for hint index 0 of a step
    pub first_hint: u32,
    /// Penalty for every later hint index
    pub later_hint: u32,
}

impl Default for PenaltyConfig {
    fn default() -> Self {
        Self {
            solution: 5,
            first_hint: 1,
            later_hint: 2,
        }
    }
}

impl PenaltyConfig {
    /// Penalty for revealing the hint at zero-based position `index`
    ///
    /// The charge depends on the position, not on how many hints came before,
    /// so revealing hint 1 first still costs the later-hint penalty.
    #[inline]
    #[must_use]
    pub fn hint(&self, index: u32) -> u32 {
        if index == 0 {
            self.first_hint
        } else {
            self.later_hint
        }
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Lab environment defaults
    pub environment: EnvironmentConfig,
    /// Lab timing heartbeat period
    pub heartbeat_interval_secs: u64,
    /// Period of the background session pull from the remote
    pub session_refresh_secs: u64,
    /// Maximum retained metrics events, oldest dropped first
    pub metrics_capacity: usize,
    /// Hint and solution charges
    pub penalties: PenaltyConfig,
    /// Shared server; `None` runs the instance offline
    pub remote: Option<RemoteConfig>,
    /// File-backed local store; `None` keeps state in memory
    pub storage_path: Option<PathBuf>,
    /// Loaded step enhancements kept in the registry cache
    pub enhancement_cache_capacity: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            environment: EnvironmentConfig::default(),
            heartbeat_interval_secs: 30,
            session_refresh_secs: 10,
            metrics_capacity: 1000,
            penalties: PenaltyConfig::default(),
            remote: None,
            storage_path: None,
            enhancement_cache_capacity: 256,
        }
    }
}

impl EngineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse TOML text
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] on malformed TOML or wrong field types
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file
    ///
    /// # Errors
    /// Returns [`ConfigError::Unreadable`] when the file cannot be read, or the
    /// parse errors of [`Self::from_toml_str`]
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Reject values the engine cannot run with
    ///
    /// # Errors
    /// [`ConfigError::Invalid`] for a zero heartbeat period, session pull period
    /// or metrics capacity
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.heartbeat_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "heartbeat_interval_secs must be greater than zero".into(),
            ));
        }
        if self.session_refresh_secs == 0 {
            return Err(ConfigError::Invalid("session_refresh_secs must be greater than zero".into()));
        }
        if self.metrics_capacity == 0 {
            return Err(ConfigError::Invalid("metrics_capacity must be greater than zero".into()));
        }
        Ok(())
    }

    /// Heartbeat period
    #[inline]
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Session pull period
    #[inline]
    #[must_use]
    pub fn session_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.session_refresh_secs)
    }

    /// With session pull period in seconds
    #[inline]
    #[must_use]
    pub fn with_session_refresh_secs(mut self, secs: u64) -> Self {
        self.session_refresh_secs = secs;
        self
    }

    /// With heartbeat period in seconds
    #[inline]
    #[must_use]
    pub fn with_heartbeat_secs(mut self, secs: u64) -> Self {
        self.heartbeat_interval_secs = secs;
        self
    }

    /// With metrics log capacity
    #[inline]
    #[must_use]
    pub fn with_metrics_capacity(mut self, capacity: usize) -> Self {
        self.metrics_capacity = capacity;
        self
    }

    /// With penalty schedule
    #[inline]
    #[must_use]
    pub fn with_penalties(mut self, penalties: PenaltyConfig) -> Self {
        self.penalties = penalties;
        self
    }

    /// With shared server
    #[inline]
    #[must_use]
    pub fn with_remote(mut self, remote: RemoteConfig) -> Self {
        self.remote = Some(remote);
        self
    }

    /// With file-backed local store
    #[inline]
    #[must_use]
    pub fn with_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = Some(path.into());
        self
    }

    /// With environment fallbacks
    #[inline]
    #[must_use]
    pub fn with_environment(mut self, environment: EnvironmentConfig) -> Self {
        self.environment = environment;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.environment.default_region, "eu-central-1");
        assert_eq!(config.penalties.solution, 5);
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(30));
    }

    #[test]
    fn partial_toml_overrides_fields() {
        let raw = r#"
            heartbeat_interval_secs = 10
            storage_path = "/tmp/labsync.json"

            [environment]
            default_region = "us-east-1"

            [environment.tool_paths]
            mongosh = "/opt/mongosh/bin/mongosh"

            [penalties]
            later_hint = 3

            [remote]
            base_url = "http://workshop.internal:5173"
        "#;
        let config = EngineConfig::from_toml_str(raw).unwrap();
        assert_eq!(config.heartbeat_interval_secs, 10);
        assert_eq!(config.environment.default_region, "us-east-1");
        assert_eq!(config.environment.default_profile, "default");
        assert_eq!(
            config.environment.tool_paths["mongosh"],
            PathBuf::from("/opt/mongosh/bin/mongosh")
        );
        assert_eq!(config.penalties.first_hint, 1);
        assert_eq!(config.penalties.later_hint, 3);
        assert_eq!(config.remote.unwrap().timeout_secs, 30);
    }

    #[test]
    fn zero_heartbeat_is_rejected() {
        let err = EngineConfig::from_toml_str("heartbeat_interval_secs = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn builder_values_are_validated_too() {
        assert!(EngineConfig::default().validate().is_ok());
        for config in [
            EngineConfig::default().with_heartbeat_secs(0),
            EngineConfig::default().with_session_refresh_secs(0),
            EngineConfig::default().with_metrics_capacity(0),
        ] {
            assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        }
    }

    #[test]
    fn hint_schedule() {
        let p = PenaltyConfig::default();
        assert_eq!(p.hint(0), 1);
        assert_eq!(p.hint(1), 2);
        assert_eq!(p.hint(4), 2);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labsync.toml");
        std::fs::write(&path, "metrics_capacity = 50").unwrap();
        assert_eq!(EngineConfig::load(&path).unwrap().metrics_capacity, 50);
        assert!(matches!(
            EngineConfig::load(&dir.path().join("missing.toml")),
            Err(ConfigError::Unreadable { .. })
        ));
    }
}
