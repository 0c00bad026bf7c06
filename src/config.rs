//! Configuration management for Coalescer.

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::error::{CoalescerError, Result};

/// Prefix for environment variable overrides, e.g. `COALESCER_LIMITER__INTERVAL_MS`.
const ENV_PREFIX: &str = "COALESCER";

/// Main configuration for the Coalescer service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoalescerConfig {
    /// Limiter configuration
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Reload command configuration
    #[serde(default)]
    pub reload: ReloadConfig,

    /// Change source configuration
    #[serde(default)]
    pub triggers: TriggerConfig,

    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
}

/// Limiter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Minimum milliseconds between the starts of two reloads
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
        }
    }
}

impl LimiterConfig {
    /// The interval as a [`Duration`].
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

fn default_interval_ms() -> u64 {
    5000
}

/// Reload command configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReloadConfig {
    /// Program to execute on every reload
    #[serde(default)]
    pub command: Option<String>,

    /// Arguments passed to the program
    #[serde(default)]
    pub args: Vec<String>,
}

/// Change source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Register a change at start-up so the first reload happens right away
    #[serde(default = "default_true")]
    pub initial: bool,

    /// Treat each line on stdin as a change notification
    #[serde(default)]
    pub stdin: bool,

    /// Treat SIGHUP as a change notification
    #[serde(default = "default_true")]
    pub hangup: bool,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            initial: true,
            stdin: false,
            hangup: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Output format
    #[serde(default)]
    pub format: LogFormat,

    /// Default filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl CoalescerConfig {
    /// Load configuration from an optional YAML file, then apply
    /// `COALESCER_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Yaml));
        }

        let config: CoalescerConfig = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| CoalescerError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string, without environment overrides.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: CoalescerConfig = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| CoalescerError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that cannot run.
    pub fn validate(&self) -> Result<()> {
        if let Some(command) = &self.reload.command {
            if command.trim().is_empty() {
                return Err(CoalescerError::Config(
                    "reload.command must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CoalescerConfig::default();
        assert_eq!(config.limiter.interval(), Duration::from_secs(5));
        assert!(config.reload.command.is_none());
        assert!(config.triggers.initial);
        assert!(!config.triggers.stdin);
        assert!(config.triggers.hangup);
        assert_eq!(config.log.format, LogFormat::Text);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
limiter:
  interval_ms: 2000
reload:
  command: /usr/local/bin/reload-haproxy
  args: ["-f", "/var/lib/haproxy/conf/haproxy.config"]
triggers:
  stdin: true
  hangup: false
log:
  format: json
  level: debug
"#;
        let config = CoalescerConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.limiter.interval(), Duration::from_secs(2));
        assert_eq!(
            config.reload.command.as_deref(),
            Some("/usr/local/bin/reload-haproxy")
        );
        assert_eq!(config.reload.args.len(), 2);
        assert!(config.triggers.initial);
        assert!(config.triggers.stdin);
        assert!(!config.triggers.hangup);
        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(config.log.level, "debug");
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
limiter:
  interval_ms: 0
"#;
        let config = CoalescerConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.limiter.interval(), Duration::ZERO);
        assert!(config.triggers.hangup);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_empty_command_rejected() {
        let yaml = r#"
reload:
  command: "  "
"#;
        let err = CoalescerConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, CoalescerError::Config(_)));
    }

    #[test]
    fn test_invalid_format_rejected() {
        let yaml = r#"
log:
  format: xml
"#;
        assert!(CoalescerConfig::from_yaml(yaml).is_err());
    }
}
