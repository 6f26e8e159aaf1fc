//! Waypoint configuration
//!
//! Loaded from YAML, then overridden by `WAYPOINT_*` environment variables.

use std::env;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use waypoint_locator::{WaitConfig, DEFAULT_PUBLISH_THRESHOLD};

use crate::cli::output::OutputFormat;

pub const ENV_MAX_RETRIES: &str = "WAYPOINT_MAX_RETRIES";
pub const ENV_RETRY_INTERVAL_MS: &str = "WAYPOINT_RETRY_INTERVAL_MS";
pub const ENV_MUTATION_TIMEOUT_MS: &str = "WAYPOINT_MUTATION_TIMEOUT_MS";
pub const ENV_PUBLISH_THRESHOLD: &str = "WAYPOINT_PUBLISH_THRESHOLD";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} has an invalid value '{value}': {reason}")]
    InvalidEnv {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaypointConfig {
    /// Wait/retry defaults applied to every resolution
    pub wait: WaitConfig,
    /// Minimum set score for `validate` to pass
    pub publish_threshold: f64,
    /// Output format used when `--output` is not given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputFormat>,
}

impl Default for WaypointConfig {
    fn default() -> Self {
        Self {
            wait: WaitConfig::default(),
            publish_threshold: DEFAULT_PUBLISH_THRESHOLD,
            output: None,
        }
    }
}

impl WaypointConfig {
    /// Apply `WAYPOINT_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    /// Apply overrides from any key lookup; used with a map in tests.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(value) = lookup(ENV_MAX_RETRIES) {
            self.wait.max_retries = parse_env(ENV_MAX_RETRIES, &value)?;
        }
        if let Some(value) = lookup(ENV_RETRY_INTERVAL_MS) {
            self.wait.retry_interval_ms = parse_env(ENV_RETRY_INTERVAL_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_MUTATION_TIMEOUT_MS) {
            self.wait.mutation_timeout_ms = parse_env(ENV_MUTATION_TIMEOUT_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_PUBLISH_THRESHOLD) {
            self.publish_threshold = parse_env(ENV_PUBLISH_THRESHOLD, &value)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.wait.retry_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "wait.retryIntervalMs must be greater than zero".to_string(),
            ));
        }
        if self.wait.mutation_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "wait.mutationTimeoutMs must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.publish_threshold) {
            return Err(ConfigError::Invalid(format!(
                "publish_threshold must be within [0, 1], got {}",
                self.publish_threshold
            )));
        }
        Ok(())
    }
}

fn parse_env<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|err: T::Err| ConfigError::InvalidEnv {
            key,
            value: value.to_string(),
            reason: err.to_string(),
        })
}
