//! Configuration structs for the registry watcher and worker pools

use cleaners_core::constants::{
    DEFAULT_DRAIN_TIMEOUT, DEFAULT_SWEEP_INTERVAL, WATCHER_THREAD_NAME, WORKER_THREAD_PREFIX,
};
use cleaners_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// What the registry does with a cleanup action that panicked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Report the failure and forget the registration
    #[default]
    LogAndDrop,
    /// Report the failure and keep a record for later inspection
    DeadLetter,
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::LogAndDrop => write!(f, "log-and-drop"),
            FailurePolicy::DeadLetter => write!(f, "dead-letter"),
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "log-and-drop" | "log" | "drop" => Ok(FailurePolicy::LogAndDrop),
            "dead-letter" | "deadletter" => Ok(FailurePolicy::DeadLetter),
            other => Err(Error::configuration(format!(
                "unknown failure policy '{other}', expected 'log-and-drop' or 'dead-letter'"
            ))),
        }
    }
}

/// Settings for the cleanup registry and its watcher thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// How long the watcher idles before sweeping for unreachable owners
    pub sweep_interval_ms: u64,
    /// Handling of panicking cleanup actions
    pub failure_policy: FailurePolicy,
    /// Name given to the watcher thread
    pub watcher_thread_name: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL.as_millis() as u64,
            failure_policy: FailurePolicy::default(),
            watcher_thread_name: WATCHER_THREAD_NAME.to_string(),
        }
    }
}

impl RegistryConfig {
    /// The sweep interval as a `Duration`
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<()> {
        if self.sweep_interval_ms == 0 {
            return Err(Error::configuration(
                "registry.sweep_interval_ms must be greater than zero",
            ));
        }
        if self.watcher_thread_name.trim().is_empty() {
            return Err(Error::configuration(
                "registry.watcher_thread_name must not be empty",
            ));
        }
        Ok(())
    }
}

/// Settings for worker pool resources
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Fixed number of worker threads; `None` uses the available parallelism
    pub threads: Option<usize>,
    /// Upper bound on waiting for a pool to drain during cleanup
    pub drain_timeout_ms: u64,
    /// Prefix for worker thread names
    pub thread_name_prefix: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            threads: None,
            drain_timeout_ms: DEFAULT_DRAIN_TIMEOUT.as_millis() as u64,
            thread_name_prefix: WORKER_THREAD_PREFIX.to_string(),
        }
    }
}

impl PoolConfig {
    /// The drain timeout as a `Duration`
    #[must_use]
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    /// The number of worker threads to start
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<()> {
        if self.threads == Some(0) {
            return Err(Error::configuration("pool.threads must be at least one"));
        }
        if self.drain_timeout_ms == 0 {
            return Err(Error::configuration(
                "pool.drain_timeout_ms must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Complete configuration for a cleaners process
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanersConfig {
    /// Registry settings
    pub registry: RegistryConfig,
    /// Worker pool settings
    pub pool: PoolConfig,
    /// Where the last applied layer of settings came from
    #[serde(skip)]
    pub source: ConfigSource,
}

impl CleanersConfig {
    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.registry.validate()?;
        self.pool.validate()
    }
}

/// Source of configuration for debugging and precedence tracking
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Built-in defaults
    #[default]
    Default,
    /// Configuration file
    ConfigFile(PathBuf),
    /// Environment variable
    EnvironmentVariable(String),
    /// Command line argument
    CommandLine,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CleanersConfig::default();
        assert_eq!(config.registry.sweep_interval(), DEFAULT_SWEEP_INTERVAL);
        assert_eq!(config.registry.failure_policy, FailurePolicy::LogAndDrop);
        assert_eq!(config.pool.drain_timeout(), Duration::from_secs(2));
        assert!(config.pool.worker_count() >= 1);
        assert_eq!(config.source, ConfigSource::Default);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_failure_policy_parsing() {
        assert_eq!(
            "dead-letter".parse::<FailurePolicy>().unwrap(),
            FailurePolicy::DeadLetter
        );
        assert_eq!(
            " Log-And-Drop ".parse::<FailurePolicy>().unwrap(),
            FailurePolicy::LogAndDrop
        );
        assert!("retry".parse::<FailurePolicy>().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_values() {
        let mut config = CleanersConfig::default();
        config.pool.threads = Some(0);
        assert!(config.validate().is_err());

        let mut config = CleanersConfig::default();
        config.registry.sweep_interval_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sweep_interval_ms"));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: CleanersConfig =
            serde_json::from_str(r#"{ "pool": { "threads": 3 } }"#).unwrap();
        assert_eq!(config.pool.threads, Some(3));
        assert_eq!(config.pool.drain_timeout_ms, 2000);
        assert_eq!(config.registry, RegistryConfig::default());
    }
}
