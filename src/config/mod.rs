//! Engine configuration
//!
//! Loaded from a JSON file; every field is optional and falls back to its
//! default. `fragmentation_limit` is the split-count threshold above which a
//! modified document is compacted (`-1` disables compaction).

mod errors;

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use errors::{ConfigError, ConfigResult};

use crate::observability::{log_event_with_fields, Event, Severity};

/// Update engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Split-count threshold (default: -1, never compact)
    #[serde(default = "default_fragmentation_limit")]
    pub fragmentation_limit: i64,

    /// Run the structural consistency check after every mutation (default: true)
    #[serde(default = "default_consistency_checks")]
    pub consistency_checks: bool,

    /// Maximum wait for a document write lock, in milliseconds (default: none)
    #[serde(default)]
    pub lock_timeout_ms: Option<u64>,

    /// Minimum log severity (default: "INFO")
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_fragmentation_limit() -> i64 {
    -1
}

fn default_consistency_checks() -> bool {
    true
}

fn default_log_level() -> String {
    "INFO".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fragmentation_limit: default_fragmentation_limit(),
            consistency_checks: default_consistency_checks(),
            lock_timeout_ms: None,
            log_level: default_log_level(),
        }
    }
}

impl EngineConfig {
    /// Read, parse and validate a JSON config file
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let display = path.display().to_string();

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;

        let config: EngineConfig =
            serde_json::from_str(&content).map_err(|e| ConfigError::Malformed {
                path: display.clone(),
                message: e.to_string(),
            })?;

        config.validate()?;

        let limit = config.fragmentation_limit.to_string();
        log_event_with_fields(
            Event::ConfigLoaded,
            &[
                ("path", &display),
                ("fragmentation_limit", &limit),
                ("log_level", &config.log_level),
            ],
        );
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.fragmentation_limit < -1 {
            return Err(ConfigError::invalid(
                "fragmentation_limit",
                format!("{} is below -1", self.fragmentation_limit),
            ));
        }
        if self.fragmentation_limit > i64::from(u32::MAX) {
            return Err(ConfigError::invalid(
                "fragmentation_limit",
                format!("{} exceeds {}", self.fragmentation_limit, u32::MAX),
            ));
        }
        if self.lock_timeout_ms == Some(0) {
            return Err(ConfigError::invalid("lock_timeout_ms", "must be positive"));
        }
        self.severity()?;
        Ok(())
    }

    pub fn with_fragmentation_limit(mut self, limit: i64) -> Self {
        self.fragmentation_limit = limit;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn lock_timeout(&self) -> Option<Duration> {
        self.lock_timeout_ms.map(Duration::from_millis)
    }

    pub fn severity(&self) -> ConfigResult<Severity> {
        self.log_level
            .parse()
            .map_err(|e: String| ConfigError::invalid("log_level", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(json: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.fragmentation_limit, -1);
        assert!(config.consistency_checks);
        assert_eq!(config.lock_timeout(), None);
        assert_eq!(config.severity().unwrap(), Severity::Info);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_file() {
        let file = write_config(r#"{"fragmentation_limit": 4, "log_level": "warn"}"#);
        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.fragmentation_limit, 4);
        assert!(config.consistency_checks);
        assert_eq!(config.severity().unwrap(), Severity::Warn);
    }

    #[test]
    fn test_load_full_file() {
        let file = write_config(
            r#"{"fragmentation_limit": -1, "consistency_checks": false,
                "lock_timeout_ms": 250, "log_level": "TRACE"}"#,
        );
        let config = EngineConfig::load(file.path()).unwrap();
        assert!(!config.consistency_checks);
        assert_eq!(config.lock_timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_rejects_limit_below_minus_one() {
        let file = write_config(r#"{"fragmentation_limit": -2}"#);
        let err = EngineConfig::load(file.path()).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                field: "fragmentation_limit",
                ..
            }
        ));
    }

    #[test]
    fn test_rejects_unknown_log_level() {
        let config = EngineConfig {
            log_level: "chatty".into(),
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let config = EngineConfig::default().with_lock_timeout(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_json() {
        let file = write_config("{ not json");
        assert!(matches!(
            EngineConfig::load(file.path()),
            Err(ConfigError::Malformed { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("engine.json");
        assert!(matches!(
            EngineConfig::load(&missing),
            Err(ConfigError::Read { .. })
        ));
    }
}
