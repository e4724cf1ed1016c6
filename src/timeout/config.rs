use serde::{Deserialize, Serialize};
use std::time::Duration;
use crate::utils::{get_env_with_prefix, parse_bool};

/// Whole-request timeout for inbound calls
///
/// Sits above the 30 second Square client timeout so a slow processor call
/// surfaces as a relay error rather than a bare gateway timeout.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl TimeoutConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Load timeout configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(enabled) = get_env_with_prefix("TIMEOUT_ENABLED") {
            config.enabled = parse_bool(&enabled).unwrap_or(true);
        }

        if let Some(seconds) = get_env_with_prefix("TIMEOUT_SECONDS") {
            if let Ok(s) = seconds.parse() {
                config.timeout_seconds = s;
            }
        }

        config
    }
}

fn default_enabled() -> bool {
    true
}

fn default_timeout_seconds() -> u64 {
    45
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_outlasts_processor_timeout() {
        let config = TimeoutConfig::default();
        assert!(config.enabled);
        assert!(config.duration() > Duration::from_secs(30));
    }
}
