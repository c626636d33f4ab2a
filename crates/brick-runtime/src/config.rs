//! Runtime configuration
//!
//! Loaded from YAML; every field has a default so an empty file is valid.
//!
//! ```yaml
//! realm: sandboxed
//! trace:
//!   enabled: true
//!   maxRecordsPerRun: 500
//! retry:
//!   defaultMaxRetries: 3
//!   delay:
//!     strategy: exponential
//!     initialMillis: 50
//!     maxMillis: 2000
//! renderNestedPipelines: false
//! logFilter: info
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use brick_expr::Realm;

pub const ENV_REALM: &str = "BRICKFLOW_REALM";
pub const ENV_TRACE_MAX_RECORDS: &str = "BRICKFLOW_TRACE_MAX_RECORDS";
pub const ENV_LOG: &str = "BRICKFLOW_LOG";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("CONFIG/IO: failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("CONFIG/PARSE: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("CONFIG/ENV: {var}={value} is not valid")]
    InvalidEnv { var: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeConfig {
    pub realm: Realm,
    pub trace: TraceConfig,
    pub retry: RetryConfig,
    /// Offer implicit rendering of nested pipelines to bricks without
    /// pipeline slots. Never applies in the privileged realm.
    pub render_nested_pipelines: bool,
    /// Fallback `tracing` filter when `RUST_LOG` is unset
    pub log_filter: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            realm: Realm::Sandboxed,
            trace: TraceConfig::default(),
            retry: RetryConfig::default(),
            render_nested_pipelines: false,
            log_filter: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TraceConfig {
    pub enabled: bool,
    pub max_records_per_run: Option<usize>,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_records_per_run: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryConfig {
    /// Used when a retry brick omits `maxRetries`
    pub default_max_retries: u32,
    pub delay: RetryDelay,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            default_max_retries: 3,
            delay: RetryDelay::Immediate,
        }
    }
}

/// Wait between retry attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "lowercase")]
pub enum RetryDelay {
    #[default]
    Immediate,
    Fixed { millis: u64 },
    #[serde(rename_all = "camelCase")]
    Exponential { initial_millis: u64, max_millis: u64 },
}

impl RetryDelay {
    /// Delay before retry number `retry` (0 for the first retry)
    pub fn delay_for(&self, retry: u32) -> Duration {
        match *self {
            Self::Immediate => Duration::ZERO,
            Self::Fixed { millis } => Duration::from_millis(millis),
            Self::Exponential {
                initial_millis,
                max_millis,
            } => {
                let factor = 1u64.checked_shl(retry).unwrap_or(u64::MAX);
                Duration::from_millis(initial_millis.saturating_mul(factor).min(max_millis))
            }
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Apply `BRICKFLOW_*` overrides from the process environment
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|var| std::env::var(var).ok())
    }

    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_REALM) {
            self.realm = match value.trim().to_ascii_lowercase().as_str() {
                "privileged" => Realm::Privileged,
                "sandboxed" => Realm::Sandboxed,
                _ => return Err(invalid_env(ENV_REALM, value)),
            };
        }
        if let Some(value) = lookup(ENV_TRACE_MAX_RECORDS) {
            let max = value
                .trim()
                .parse::<usize>()
                .map_err(|_| invalid_env(ENV_TRACE_MAX_RECORDS, value.clone()))?;
            self.trace.max_records_per_run = (max > 0).then_some(max);
        }
        if let Some(value) = lookup(ENV_LOG) {
            self.log_filter = value;
        }
        Ok(())
    }
}

fn invalid_env(var: &str, value: String) -> ConfigError {
    ConfigError::InvalidEnv {
        var: var.to_string(),
        value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(RuntimeConfig::from_yaml("").unwrap(), RuntimeConfig::default());
        assert_eq!(RuntimeConfig::from_yaml("{}").unwrap(), RuntimeConfig::default());
    }

    #[test]
    fn test_full_yaml() {
        let config = RuntimeConfig::from_yaml(
            r#"
realm: privileged
trace:
  enabled: false
  maxRecordsPerRun: 50
retry:
  defaultMaxRetries: 5
  delay:
    strategy: exponential
    initialMillis: 10
    maxMillis: 100
renderNestedPipelines: true
logFilter: debug
"#,
        )
        .unwrap();

        assert_eq!(config.realm, Realm::Privileged);
        assert!(!config.trace.enabled);
        assert_eq!(config.trace.max_records_per_run, Some(50));
        assert_eq!(config.retry.default_max_retries, 5);
        assert_eq!(
            config.retry.delay,
            RetryDelay::Exponential {
                initial_millis: 10,
                max_millis: 100
            }
        );
        assert!(config.render_nested_pipelines);
        assert_eq!(config.log_filter, "debug");
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(matches!(
            RuntimeConfig::from_yaml("realm: [1, 2]"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let error = RuntimeConfig::load("/nonexistent/brickflow.yaml").unwrap_err();
        assert!(error.to_string().starts_with("CONFIG/IO"));
    }

    #[test]
    fn test_delay_policies() {
        assert_eq!(RetryDelay::Immediate.delay_for(3), Duration::ZERO);
        assert_eq!(
            RetryDelay::Fixed { millis: 20 }.delay_for(7),
            Duration::from_millis(20)
        );

        let exponential = RetryDelay::Exponential {
            initial_millis: 10,
            max_millis: 50,
        };
        assert_eq!(exponential.delay_for(0), Duration::from_millis(10));
        assert_eq!(exponential.delay_for(2), Duration::from_millis(40));
        assert_eq!(exponential.delay_for(3), Duration::from_millis(50));
        assert_eq!(exponential.delay_for(200), Duration::from_millis(50));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_REALM, "Privileged"),
            (ENV_TRACE_MAX_RECORDS, "25"),
            (ENV_LOG, "brick_runtime=trace"),
        ]);
        let mut config = RuntimeConfig::default();
        config
            .apply_env_from(|var| env.get(var).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.realm, Realm::Privileged);
        assert_eq!(config.trace.max_records_per_run, Some(25));
        assert_eq!(config.log_filter, "brick_runtime=trace");
    }

    #[test]
    fn test_invalid_env() {
        let mut config = RuntimeConfig::default();
        let error = config
            .apply_env_from(|var| (var == ENV_TRACE_MAX_RECORDS).then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(error, ConfigError::InvalidEnv { .. }));
    }
}
