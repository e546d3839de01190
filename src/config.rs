//! Configuration loaded from environment variables with defaults.

use std::env;
use std::time::Duration;

use thiserror::Error;

use crate::engine::AdmissionMode;
use crate::reward::{HttpRewardAdvisor, RewardError};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("ADMISSION_MODE must be `durable` or `fast-path`, got `{0}`")]
    InvalidMode(String),
    #[error("REWARD_SERVICE_TIMEOUT_SECS must be a positive integer, got `{0}`")]
    InvalidTimeout(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// `ADMISSION_MODE`: `durable` (default) or `fast-path`
    pub admission_mode: AdmissionMode,
    /// `REDIS_URL`: stock counter backend for fast-path mode; in-memory when unset
    pub redis_url: Option<String>,
    /// `REWARD_SERVICE_URL`: base url of the reward advisor
    pub reward_service_url: Option<String>,
    /// `REWARD_SERVICE_TIMEOUT_SECS` (default: 5)
    pub reward_service_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            admission_mode: AdmissionMode::Durable,
            redis_url: None,
            reward_service_url: None,
            reward_service_timeout_secs: 5,
        }
    }
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let admission_mode = match lookup("ADMISSION_MODE").as_deref().map(str::trim) {
            None | Some("") => defaults.admission_mode,
            Some("durable") => AdmissionMode::Durable,
            Some("fast-path") => AdmissionMode::FastPath,
            Some(other) => return Err(ConfigError::InvalidMode(other.to_string())),
        };

        let reward_service_timeout_secs = match lookup("REWARD_SERVICE_TIMEOUT_SECS") {
            None => defaults.reward_service_timeout_secs,
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or_else(|| ConfigError::InvalidTimeout(raw.clone()))?,
        };

        Ok(Self {
            admission_mode,
            redis_url: lookup("REDIS_URL").filter(|s| !s.is_empty()),
            reward_service_url: lookup("REWARD_SERVICE_URL").filter(|s| !s.is_empty()),
            reward_service_timeout_secs,
        })
    }

    pub fn reward_service_timeout(&self) -> Duration {
        Duration::from_secs(self.reward_service_timeout_secs)
    }

    /// The reward advisor client, if a service url is configured.
    pub fn reward_advisor(&self) -> Result<Option<HttpRewardAdvisor>, RewardError> {
        self.reward_service_url
            .as_deref()
            .map(|url| HttpRewardAdvisor::new(url, self.reward_service_timeout()))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        assert_eq!(Config::from_lookup(lookup(&[])).unwrap(), Config::default());
    }

    #[test]
    fn reads_all_keys() {
        let config = Config::from_lookup(lookup(&[
            ("ADMISSION_MODE", "fast-path"),
            ("REDIS_URL", "redis://127.0.0.1:6379"),
            ("REWARD_SERVICE_URL", "http://advisor:8000"),
            ("REWARD_SERVICE_TIMEOUT_SECS", "9"),
        ]))
        .unwrap();

        assert_eq!(config.admission_mode, AdmissionMode::FastPath);
        assert_eq!(config.redis_url.as_deref(), Some("redis://127.0.0.1:6379"));
        assert_eq!(config.reward_service_url.as_deref(), Some("http://advisor:8000"));
        assert_eq!(config.reward_service_timeout(), Duration::from_secs(9));
    }

    #[test]
    fn reward_advisor_only_when_configured() {
        assert!(Config::default().reward_advisor().unwrap().is_none());

        let config = Config::from_lookup(lookup(&[("REWARD_SERVICE_URL", "http://advisor:8000")]))
            .unwrap();
        assert!(config.reward_advisor().unwrap().is_some());
    }

    #[test]
    fn rejects_unknown_mode() {
        assert_eq!(
            Config::from_lookup(lookup(&[("ADMISSION_MODE", "turbo")])),
            Err(ConfigError::InvalidMode("turbo".to_string()))
        );
    }

    #[test]
    fn rejects_zero_timeout() {
        assert!(matches!(
            Config::from_lookup(lookup(&[("REWARD_SERVICE_TIMEOUT_SECS", "0")])),
            Err(ConfigError::InvalidTimeout(_))
        ));
    }
}
