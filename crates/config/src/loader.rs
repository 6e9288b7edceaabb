//! Configuration loader
//!
//! Resolves a [`CleanersConfig`] from defaults, an optional JSON file and
//! `CLEANERS_*` environment variables, in that order of precedence.

use crate::config::{CleanersConfig, ConfigSource, FailurePolicy};
use cleaners_core::constants::{
    CLEANERS_DRAIN_TIMEOUT_VAR, CLEANERS_FAILURE_POLICY_VAR, CLEANERS_POOL_THREADS_VAR,
    CLEANERS_SWEEP_INTERVAL_VAR,
};
use cleaners_core::{Error, Result, ResultExt};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Builder that layers configuration sources
#[derive(Debug, Default)]
pub struct ConfigLoader {
    file: Option<PathBuf>,
    read_env: bool,
}

impl ConfigLoader {
    /// Create a loader that only yields defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Layer a JSON configuration file over the defaults
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Layer `CLEANERS_*` environment variables over file and defaults
    pub fn with_env(mut self) -> Self {
        self.read_env = true;
        self
    }

    /// Resolve and validate the configuration
    pub fn load(self) -> Result<CleanersConfig> {
        let mut config = match &self.file {
            Some(path) => load_file(path)?,
            None => CleanersConfig::default(),
        };

        if self.read_env {
            apply_env(&mut config)?;
        }

        config.validate()?;
        tracing::debug!(source = ?config.source, "configuration loaded");
        Ok(config)
    }
}

fn load_file(path: &Path) -> Result<CleanersConfig> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| Error::file_system(path, "read configuration", e))?;
    let mut config: CleanersConfig = serde_json::from_str(&contents)
        .with_context(|| format!("invalid configuration file {}", path.display()))?;
    config.source = ConfigSource::ConfigFile(path.to_path_buf());
    Ok(config)
}

fn apply_env(config: &mut CleanersConfig) -> Result<()> {
    if let Some(ms) = env_value::<u64>(CLEANERS_SWEEP_INTERVAL_VAR)? {
        config.registry.sweep_interval_ms = ms;
        config.source = ConfigSource::EnvironmentVariable(CLEANERS_SWEEP_INTERVAL_VAR.into());
    }
    if let Some(policy) = env_value::<FailurePolicy>(CLEANERS_FAILURE_POLICY_VAR)? {
        config.registry.failure_policy = policy;
        config.source = ConfigSource::EnvironmentVariable(CLEANERS_FAILURE_POLICY_VAR.into());
    }
    if let Some(threads) = env_value::<usize>(CLEANERS_POOL_THREADS_VAR)? {
        config.pool.threads = Some(threads);
        config.source = ConfigSource::EnvironmentVariable(CLEANERS_POOL_THREADS_VAR.into());
    }
    if let Some(ms) = env_value::<u64>(CLEANERS_DRAIN_TIMEOUT_VAR)? {
        config.pool.drain_timeout_ms = ms;
        config.source = ConfigSource::EnvironmentVariable(CLEANERS_DRAIN_TIMEOUT_VAR.into());
    }
    Ok(())
}

fn env_value<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::configuration(format!("{name}='{raw}' is invalid: {e}"))),
        Err(_) => Ok(None),
    }
}
