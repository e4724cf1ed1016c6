use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

use crate::cors::CorsConfig;
use crate::error::RelayError;
use crate::timeout::TimeoutConfig;
use crate::utils::{get_env_any, get_env_with_prefix, parse_bool};

/// Default `Square-Version` header sent with every processor call.
pub const DEFAULT_SQUARE_VERSION: &str = "2024-08-21";

const SANDBOX_BASE_URL: &str = "https://connect.squareupsandbox.com";
const PRODUCTION_BASE_URL: &str = "https://connect.squareup.com";

/// Main configuration for the relay
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub square: SquareConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub timeout: TimeoutConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum request body size in bytes (default: 1MB)
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

/// Square deployment the relay talks to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SquareEnvironment {
    #[default]
    Sandbox,
    Production,
}

impl SquareEnvironment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sandbox => "sandbox",
            Self::Production => "production",
        }
    }

    pub fn base_url(&self) -> &'static str {
        match self {
            Self::Sandbox => SANDBOX_BASE_URL,
            Self::Production => PRODUCTION_BASE_URL,
        }
    }
}

impl std::str::FromStr for SquareEnvironment {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sandbox" => Ok(Self::Sandbox),
            "production" => Ok(Self::Production),
            other => Err(RelayError::config(format!(
                "Invalid Square environment: {}. Must be 'sandbox' or 'production'",
                other
            ))),
        }
    }
}

/// Square credentials and client settings.
///
/// Missing credentials are not a startup error; the processor simply reports
/// itself as not ready.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SquareConfig {
    #[serde(default)]
    pub environment: SquareEnvironment,
    #[serde(skip)]
    pub access_token: Option<SecretString>,
    #[serde(default)]
    pub location_id: Option<String>,
    #[serde(default)]
    pub application_id: Option<String>,
    #[serde(default = "default_square_version")]
    pub version: String,
    #[serde(default = "default_square_timeout")]
    pub timeout_seconds: u64,
    /// Overrides the environment's base URL (tests, proxies).
    #[serde(default)]
    pub base_url: Option<String>,
    /// Also disable the card at Square when a stored card is deleted.
    #[serde(default)]
    pub disable_cards_on_delete: bool,
}

impl Default for SquareConfig {
    fn default() -> Self {
        Self {
            environment: SquareEnvironment::default(),
            access_token: None,
            location_id: None,
            application_id: None,
            version: default_square_version(),
            timeout_seconds: default_square_timeout(),
            base_url: None,
            disable_cards_on_delete: false,
        }
    }
}

impl SquareConfig {
    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.environment.base_url())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn has_token(&self) -> bool {
        self.access_token
            .as_ref()
            .is_some_and(|token| !token.expose_secret().trim().is_empty())
    }

    pub fn has_location(&self) -> bool {
        self.location_id
            .as_ref()
            .is_some_and(|location| !location.trim().is_empty())
    }

    fn from_env() -> Result<Self, RelayError> {
        let mut config = Self::default();

        if let Some(env) = get_env_any(&["SQUARE_ENV", "SQUARE_ENVIRONMENT"]) {
            config.environment = env.parse()?;
        }
        config.access_token = get_env_with_prefix("SQUARE_ACCESS_TOKEN").map(SecretString::from);
        config.location_id = get_env_with_prefix("SQUARE_LOCATION_ID");
        config.application_id = get_env_with_prefix("SQUARE_APPLICATION_ID");
        if let Some(version) = get_env_with_prefix("SQUARE_VERSION") {
            config.version = version;
        }
        if let Some(seconds) = get_env_with_prefix("SQUARE_TIMEOUT_SECONDS") {
            if let Ok(s) = seconds.parse() {
                config.timeout_seconds = s;
            }
        }
        config.base_url = get_env_with_prefix("SQUARE_BASE_URL");
        if let Some(flag) = get_env_with_prefix("CARDS_DISABLE_ON_DELETE") {
            config.disable_cards_on_delete = parse_bool(&flag).unwrap_or(false);
        }

        Ok(config)
    }
}

/// Card metadata store settings. Without a database URL the relay keeps
/// records in memory.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(skip)]
    pub database_url: Option<SecretString>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_run_migrations")]
    pub run_migrations: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: default_max_connections(),
            run_migrations: default_run_migrations(),
        }
    }
}

impl StoreConfig {
    fn from_env() -> Self {
        let mut config = Self::default();
        config.database_url =
            get_env_any(&["DATABASE_URL", "SUPABASE_DB_URL"]).map(SecretString::from);
        if let Some(max) = get_env_with_prefix("DATABASE_MAX_CONNECTIONS") {
            if let Ok(m) = max.parse() {
                config.max_connections = m;
            }
        }
        if let Some(flag) = get_env_with_prefix("DATABASE_RUN_MIGRATIONS") {
            config.run_migrations = parse_bool(&flag).unwrap_or(true);
        }
        config
    }
}

/// Guards for the write endpoints.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SecurityConfig {
    /// When set, POST and DELETE routes require a matching `X-Api-Key`.
    #[serde(skip)]
    pub internal_api_key: Option<SecretString>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_size: default_max_body_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    10000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_body_size() -> usize {
    1024 * 1024
}

fn default_square_version() -> String {
    DEFAULT_SQUARE_VERSION.to_string()
}

fn default_square_timeout() -> u64 {
    30
}

fn default_max_connections() -> u32 {
    5
}

fn default_run_migrations() -> bool {
    true
}

impl ServerConfig {
    pub fn addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

/// Builder for Config with environment variable support
#[must_use = "builder does nothing until you call build()"]
pub struct ConfigBuilder {
    config: Config,
    env_error: Option<RelayError>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            env_error: None,
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.config.server.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.config.server.port = port;
        self
    }

    pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
        self.config.server.max_body_size = max_body_size;
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn with_json_logging(mut self, enabled: bool) -> Self {
        self.config.logging.json = enabled;
        self
    }

    pub fn with_square(mut self, square: SquareConfig) -> Self {
        self.config.square = square;
        self
    }

    /// Set the Square access token and location in one go
    pub fn with_square_credentials(
        mut self,
        access_token: impl Into<String>,
        location_id: impl Into<String>,
    ) -> Self {
        self.config.square.access_token = Some(SecretString::from(access_token.into()));
        self.config.square.location_id = Some(location_id.into());
        self
    }

    pub fn with_square_environment(mut self, environment: SquareEnvironment) -> Self {
        self.config.square.environment = environment;
        self
    }

    pub fn with_square_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.square.base_url = Some(base_url.into());
        self
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.config.store.database_url = Some(SecretString::from(url.into()));
        self
    }

    pub fn with_internal_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.security.internal_api_key = Some(SecretString::from(key.into()));
        self
    }

    pub fn with_disable_cards_on_delete(mut self, enabled: bool) -> Self {
        self.config.square.disable_cards_on_delete = enabled;
        self
    }

    pub fn with_cors(mut self, cors: CorsConfig) -> Self {
        self.config.cors = cors;
        self
    }

    pub fn with_timeout(mut self, timeout: TimeoutConfig) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Load configuration from environment variables with CARDRELAY_ prefix
    pub fn from_env(mut self) -> Self {
        if let Some(host) = get_env_with_prefix("HOST") {
            self.config.server.host = host;
        }
        // Hosting platforms hand the port over as plain PORT
        if let Some(port) = get_env_with_prefix("PORT") {
            if let Ok(p) = port.parse() {
                self.config.server.port = p;
            }
        }
        if let Some(max_body_size) = get_env_with_prefix("MAX_BODY_SIZE") {
            if let Ok(size) = max_body_size.parse() {
                self.config.server.max_body_size = size;
            }
        }
        if let Some(level) = get_env_with_prefix("LOG_LEVEL") {
            self.config.logging.level = level;
        }
        if let Some(json) = get_env_with_prefix("LOG_JSON") {
            self.config.logging.json = parse_bool(&json).unwrap_or(false);
        }

        match SquareConfig::from_env() {
            Ok(square) => self.config.square = square,
            Err(err) => self.env_error = Some(err),
        }
        self.config.store = StoreConfig::from_env();
        self.config.security.internal_api_key =
            get_env_with_prefix("INTERNAL_API_KEY").map(SecretString::from);
        self.config.cors = CorsConfig::from_env();
        self.config.timeout = TimeoutConfig::from_env();

        self
    }

    /// Build the configuration, validating all settings
    ///
    /// # Errors
    ///
    /// Returns `RelayError::Config` for an unparsable address, an unknown log
    /// level or Square environment, or zero-valued timeouts and limits.
    pub fn build(self) -> crate::error::Result<Config> {
        if let Some(err) = self.env_error {
            return Err(err);
        }

        self.config.server.addr().map_err(|e| {
            RelayError::config(format!(
                "Invalid server address {}:{} - {}",
                self.config.server.host, self.config.server.port, e
            ))
        })?;

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.config.logging.level.to_lowercase().as_str()) {
            return Err(RelayError::config(format!(
                "Invalid log level: {}. Must be one of: {}",
                self.config.logging.level,
                valid_log_levels.join(", ")
            )));
        }

        if self.config.timeout.enabled && self.config.timeout.timeout_seconds == 0 {
            return Err(RelayError::config("Request timeout must be greater than 0 when enabled"));
        }

        if self.config.square.timeout_seconds == 0 {
            return Err(RelayError::config("Square request timeout must be greater than 0"));
        }

        if self.config.square.version.trim().is_empty() {
            return Err(RelayError::config("Square-Version must not be empty"));
        }

        if self.config.server.port == 0 {
            return Err(RelayError::config("Server port must be greater than 0"));
        }

        if self.config.server.max_body_size == 0 {
            return Err(RelayError::config("Maximum body size must be greater than 0"));
        }

        if self.config.store.max_connections == 0 {
            return Err(RelayError::config("Database max connections must be greater than 0"));
        }

        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_build() {
        let config = ConfigBuilder::new().build().unwrap();
        assert_eq!(config.server.port, 10000);
        assert_eq!(config.square.environment, SquareEnvironment::Sandbox);
        assert_eq!(config.square.version, "2024-08-21");
        assert_eq!(config.square.timeout(), Duration::from_secs(30));
        assert!(!config.square.has_token());
        assert!(!config.square.disable_cards_on_delete);
        assert!(config.store.database_url.is_none());
    }

    #[test]
    fn test_base_url_follows_environment() {
        let mut square = SquareConfig::default();
        assert_eq!(square.base_url(), "https://connect.squareupsandbox.com");
        square.environment = SquareEnvironment::Production;
        assert_eq!(square.base_url(), "https://connect.squareup.com");
        square.base_url = Some("http://127.0.0.1:9999".to_string());
        assert_eq!(square.base_url(), "http://127.0.0.1:9999");
    }

    #[test]
    fn test_environment_parsing() {
        assert_eq!(
            "Production".parse::<SquareEnvironment>().unwrap(),
            SquareEnvironment::Production
        );
        assert!("staging".parse::<SquareEnvironment>().is_err());
    }

    #[test]
    fn test_blank_credentials_are_not_ready() {
        let config = ConfigBuilder::new()
            .with_square_credentials("  ", "")
            .build()
            .unwrap();
        assert!(!config.square.has_token());
        assert!(!config.square.has_location());
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let result = ConfigBuilder::new().with_log_level("loud").build();
        assert!(matches!(result, Err(RelayError::Config(_))));
    }

    #[test]
    fn test_zero_port_rejected() {
        let result = ConfigBuilder::new().with_port(0).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_secrets_are_redacted_in_debug() {
        let config = ConfigBuilder::new()
            .with_square_credentials("EAAA-super-secret", "LOC1")
            .with_internal_api_key("internal-secret")
            .build()
            .unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("EAAA-super-secret"));
        assert!(!debug.contains("internal-secret"));
        assert!(debug.contains("LOC1"));
    }
}
