use serde::{Deserialize, Serialize};
use crate::utils::{get_env_with_prefix, parse_bool};

/// CORS configuration for browser clients of the relay
///
/// Enabled with any origin by default: the payment form is served from
/// whatever host embeds the tokenization widget. No credentials are
/// allowed, since callers authenticate with `X-Api-Key` rather than cookies.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorsConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Allowed origins; `["*"]` allows any origin
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,

    #[serde(default = "default_allowed_methods")]
    pub allowed_methods: Vec<String>,

    #[serde(default = "default_allowed_headers")]
    pub allowed_headers: Vec<String>,

    #[serde(default = "default_max_age")]
    pub max_age_seconds: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            allowed_origins: default_allowed_origins(),
            allowed_methods: default_allowed_methods(),
            allowed_headers: default_allowed_headers(),
            max_age_seconds: default_max_age(),
        }
    }
}

impl CorsConfig {
    /// Only the listed origins may call the relay from a browser
    pub fn restrictive(allowed_origins: Vec<String>) -> Self {
        Self {
            allowed_origins,
            ..Self::default()
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Load CORS configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(enabled) = get_env_with_prefix("CORS_ENABLED") {
            config.enabled = parse_bool(&enabled).unwrap_or(true);
        }
        if let Some(origins) = get_env_with_prefix("CORS_ALLOWED_ORIGINS") {
            config.allowed_origins = split_list(&origins);
        }
        if let Some(methods) = get_env_with_prefix("CORS_ALLOWED_METHODS") {
            config.allowed_methods = split_list(&methods);
        }
        if let Some(headers) = get_env_with_prefix("CORS_ALLOWED_HEADERS") {
            config.allowed_headers = split_list(&headers);
        }
        if let Some(max_age) = get_env_with_prefix("CORS_MAX_AGE") {
            if let Ok(val) = max_age.parse() {
                config.max_age_seconds = val;
            }
        }

        config
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn default_enabled() -> bool {
    true
}

fn default_allowed_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_allowed_methods() -> Vec<String> {
    vec![
        "GET".to_string(),
        "POST".to_string(),
        "DELETE".to_string(),
        "OPTIONS".to_string(),
    ]
}

fn default_allowed_headers() -> Vec<String> {
    vec![
        "content-type".to_string(),
        "x-api-key".to_string(),
        "x-request-id".to_string(),
    ]
}

fn default_max_age() -> u64 {
    3600
}
