//! Configuration management for windowgate.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, WindowgateError};
use crate::ratelimit::LockPolicy;

/// Prefix of environment variables overriding file settings,
/// e.g. `WINDOWGATE__LIMITER__WINDOW_MAX_SIZE=50`.
pub const ENV_PREFIX: &str = "WINDOWGATE";

/// Main configuration for windowgate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowgateConfig {
    /// Limiter parameters
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Limiter parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Maximum admitted requests per key in one window
    #[serde(default = "default_window_max_size")]
    pub window_max_size: u64,

    /// Window length, in `window_unit`s
    #[serde(default = "default_window_length")]
    pub window_length: u64,

    /// Unit of `window_length`
    #[serde(default)]
    pub window_unit: TimeUnit,

    /// Locking granularity
    #[serde(default)]
    pub policy: LockPolicy,

    /// Forget keys idle for this many seconds. Unset keeps every key forever.
    #[serde(default)]
    pub idle_eviction_secs: Option<u64>,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            window_max_size: default_window_max_size(),
            window_length: default_window_length(),
            window_unit: TimeUnit::default(),
            policy: LockPolicy::default(),
            idle_eviction_secs: None,
        }
    }
}

impl LimiterConfig {
    /// Window length as a [`Duration`].
    pub fn window_duration(&self) -> Duration {
        self.window_unit.to_duration(self.window_length)
    }

    /// Idle eviction threshold, if enabled.
    pub fn idle_eviction(&self) -> Option<Duration> {
        self.idle_eviction_secs.map(Duration::from_secs)
    }
}

fn default_window_max_size() -> u64 {
    100
}

fn default_window_length() -> u64 {
    1
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub filter: String,

    /// Emit JSON lines instead of human-readable text
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}

/// Unit a window length is expressed in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    #[default]
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    /// Convert `value` of this unit into a [`Duration`], saturating on overflow.
    pub fn to_duration(self, value: u64) -> Duration {
        match self {
            TimeUnit::Nanoseconds => Duration::from_nanos(value),
            TimeUnit::Microseconds => Duration::from_micros(value),
            TimeUnit::Milliseconds => Duration::from_millis(value),
            TimeUnit::Seconds => Duration::from_secs(value),
            TimeUnit::Minutes => Duration::from_secs(value.saturating_mul(60)),
            TimeUnit::Hours => Duration::from_secs(value.saturating_mul(3600)),
            TimeUnit::Days => Duration::from_secs(value.saturating_mul(86400)),
        }
    }
}

impl WindowgateConfig {
    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| WindowgateError::Config(format!("Failed to parse configuration: {}", e)))
    }

    /// Load configuration from a file, then apply `WINDOWGATE__` environment overrides.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_file_with_env_prefix(path, ENV_PREFIX)
    }

    /// Load configuration from a file, then apply `<prefix>__` environment overrides.
    pub fn from_file_with_env_prefix<P: AsRef<Path>>(path: P, prefix: &str) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), prefix, "Loading configuration");

        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path))
            .add_source(
                ::config::Environment::with_prefix(prefix)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WindowgateConfig::default();
        assert_eq!(config.limiter.window_max_size, 100);
        assert_eq!(config.limiter.window_duration(), Duration::from_secs(1));
        assert_eq!(config.limiter.policy, LockPolicy::PerKey);
        assert_eq!(config.limiter.idle_eviction(), None);
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
limiter:
  window_max_size: 3
  window_length: 1000
  window_unit: milliseconds
  policy: coarse
  idle_eviction_secs: 300
logging:
  filter: windowgate=debug
  json: true
"#;
        let config = WindowgateConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.limiter.window_max_size, 3);
        assert_eq!(config.limiter.window_duration(), Duration::from_millis(1000));
        assert_eq!(config.limiter.policy, LockPolicy::Coarse);
        assert_eq!(config.limiter.idle_eviction(), Some(Duration::from_secs(300)));
        assert_eq!(config.logging.filter, "windowgate=debug");
        assert!(config.logging.json);
    }

    #[test]
    fn test_parse_partial_config_fills_defaults() {
        let yaml = r#"
limiter:
  window_max_size: 10
  window_unit: minutes
"#;
        let config = WindowgateConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.limiter.window_max_size, 10);
        assert_eq!(config.limiter.window_duration(), Duration::from_secs(60));
        assert_eq!(config.limiter.policy, LockPolicy::PerKey);
        assert!(!config.logging.json);
    }

    #[test]
    fn test_parse_rejects_negative_max_size() {
        let yaml = "limiter:\n  window_max_size: -1\n";
        let err = WindowgateConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, WindowgateError::Config(_)));
    }

    #[test]
    fn test_parse_rejects_unknown_policy() {
        let yaml = "limiter:\n  policy: global\n";
        assert!(WindowgateConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_time_unit_conversion() {
        assert_eq!(TimeUnit::Nanoseconds.to_duration(5), Duration::from_nanos(5));
        assert_eq!(TimeUnit::Microseconds.to_duration(5), Duration::from_micros(5));
        assert_eq!(TimeUnit::Milliseconds.to_duration(5), Duration::from_millis(5));
        assert_eq!(TimeUnit::Seconds.to_duration(5), Duration::from_secs(5));
        assert_eq!(TimeUnit::Minutes.to_duration(2), Duration::from_secs(120));
        assert_eq!(TimeUnit::Hours.to_duration(1), Duration::from_secs(3600));
        assert_eq!(TimeUnit::Days.to_duration(1), Duration::from_secs(86400));
        assert_eq!(TimeUnit::Days.to_duration(u64::MAX), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_from_file() {
        let path = std::env::temp_dir().join(format!(
            "windowgate-config-{}.yaml",
            std::process::id()
        ));
        std::fs::write(
            &path,
            "limiter:\n  window_max_size: 42\n  window_length: 30\n  window_unit: seconds\n",
        )
        .unwrap();

        let config = WindowgateConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.limiter.window_max_size, 42);
        assert_eq!(config.limiter.window_duration(), Duration::from_secs(30));
    }

    #[test]
    fn test_environment_overrides_file() {
        let prefix = format!("WINDOWGATE_TEST_{}", std::process::id());
        let max_var = format!("{}__LIMITER__WINDOW_MAX_SIZE", prefix);
        let policy_var = format!("{}__LIMITER__POLICY", prefix);
        let path = std::env::temp_dir().join(format!(
            "windowgate-env-config-{}.yaml",
            std::process::id()
        ));
        std::fs::write(
            &path,
            "limiter:\n  window_max_size: 42\n  window_length: 30\n  policy: per_key\n",
        )
        .unwrap();

        std::env::set_var(&max_var, "50");
        std::env::set_var(&policy_var, "coarse");
        let result = WindowgateConfig::from_file_with_env_prefix(&path, &prefix);
        std::env::remove_var(&max_var);
        std::env::remove_var(&policy_var);
        std::fs::remove_file(&path).unwrap();

        let config = result.unwrap();
        assert_eq!(config.limiter.window_max_size, 50);
        assert_eq!(config.limiter.policy, LockPolicy::Coarse);
        assert_eq!(config.limiter.window_duration(), Duration::from_secs(30));
    }

    #[test]
    fn test_from_missing_file() {
        let err = WindowgateConfig::from_file("/nonexistent/windowgate.yaml").unwrap_err();
        assert!(matches!(err, WindowgateError::Config(_)));
    }
}
