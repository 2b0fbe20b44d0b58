//! # API Configuration
//!
//! Server settings loaded once at startup.
//!
//! ## Load Order (later overrides earlier)
//! 1. Defaults (this file)
//! 2. Config file (`tally.toml`, or the path in `TALLY_CONFIG`)
//! 3. Environment variables (`TALLY_*`)
//!
//! The result is validated before the server binds.
//!
//! ## Example `tally.toml`
//! ```toml
//! bind_addr = "0.0.0.0"
//! port = 8080
//! db_path = "/var/lib/tally/tally.db"
//! max_connections = 8
//! jwt_secret = "a-long-random-secret"
//! request_timeout_secs = 15
//! currency_code = "EUR"
//! currency_symbol = "€"
//! currency_decimals = 2
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Minimum accepted length of the JWT signing secret.
pub const MIN_JWT_SECRET_LEN: usize = 16;

/// Built-in signing secret. Only debug builds accept it.
pub const DEV_JWT_SECRET: &str = "tally-dev-secret-change-in-production";

/// API server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Interface to bind.
    pub bind_addr: String,

    /// HTTP port.
    pub port: u16,

    /// SQLite database path (`:memory:` for an ephemeral store).
    pub db_path: PathBuf,

    /// Maximum pooled connections.
    pub max_connections: u32,

    /// HS256 secret shared with the identity provider.
    pub jwt_secret: String,

    /// Lifetime of tokens issued by the dev `issue-token` command.
    pub jwt_lifetime_secs: i64,

    /// Per-request deadline.
    pub request_timeout_secs: u64,

    /// Currency code (ISO 4217)
    pub currency_code: String,

    /// Currency symbol (for log lines)
    pub currency_symbol: String,

    /// Number of decimal places for currency
    pub currency_decimals: u8,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            bind_addr: "127.0.0.1".to_string(),
            port: 8080,
            db_path: PathBuf::from("./tally.db"),
            max_connections: 5,
            jwt_secret: DEV_JWT_SECRET.to_string(),
            jwt_lifetime_secs: 3600,
            request_timeout_secs: 15,
            currency_code: "USD".to_string(),
            currency_symbol: "$".to_string(),
            currency_decimals: 2,
        }
    }
}

impl ApiConfig {
    /// Loads configuration from file, environment, and defaults.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = ApiConfig::default();

        let path = config_path
            .or_else(|| std::env::var("TALLY_CONFIG").ok().map(PathBuf::from))
            .or_else(Self::default_config_path);

        if let Some(path) = path {
            if path.exists() {
                info!(?path, "Loading config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    /// Applies `TALLY_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(key: &str, raw: String) -> Result<T, ConfigError> {
            raw.trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        }

        if let Some(addr) = lookup("TALLY_BIND_ADDR") {
            self.bind_addr = addr;
        }
        if let Some(port) = lookup("TALLY_PORT") {
            self.port = parse("TALLY_PORT", port)?;
        }
        if let Some(path) = lookup("TALLY_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.db_path = PathBuf::from(path);
        }
        if let Some(secret) = lookup("TALLY_JWT_SECRET") {
            self.jwt_secret = secret;
        }
        if let Some(secs) = lookup("TALLY_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = parse("TALLY_REQUEST_TIMEOUT_SECS", secs)?;
        }
        if let Some(max) = lookup("TALLY_MAX_CONNECTIONS") {
            self.max_connections = parse("TALLY_MAX_CONNECTIONS", max)?;
        }
        if let Some(code) = lookup("TALLY_CURRENCY_CODE") {
            self.currency_code = code;
        }
        if let Some(decimals) = lookup("TALLY_CURRENCY_DECIMALS") {
            self.currency_decimals = parse("TALLY_CURRENCY_DECIMALS", decimals)?;
        }

        Ok(())
    }

    /// Validates the configuration.
    ///
    /// Release builds refuse to start with [`DEV_JWT_SECRET`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_with(cfg!(debug_assertions))
    }

    /// [`validate`](Self::validate) with the dev-secret policy made explicit.
    pub fn validate_with(&self, allow_dev_secret: bool) -> Result<(), ConfigError> {
        if !allow_dev_secret && self.jwt_secret == DEV_JWT_SECRET {
            return Err(ConfigError::Invalid(
                "jwt_secret is the built-in development secret; set TALLY_JWT_SECRET".into(),
            ));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid("port must be greater than 0".into()));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "max_connections must be greater than 0".into(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be greater than 0".into(),
            ));
        }
        if self.jwt_secret.len() < MIN_JWT_SECRET_LEN {
            return Err(ConfigError::Invalid(format!(
                "jwt_secret must be at least {} characters",
                MIN_JWT_SECRET_LEN
            )));
        }
        if self.jwt_lifetime_secs <= 0 {
            return Err(ConfigError::Invalid(
                "jwt_lifetime_secs must be greater than 0".into(),
            ));
        }
        if self.currency_code.len() != 3 {
            return Err(ConfigError::Invalid(format!(
                "currency_code must be a 3-letter ISO code, got: {}",
                self.currency_code
            )));
        }
        if self.currency_decimals > 4 {
            return Err(ConfigError::Invalid(
                "currency_decimals must be at most 4".into(),
            ));
        }
        Ok(())
    }

    /// `bind_addr:port`
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Formats a cent amount as a currency string.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let config = ApiConfig::default();
    /// assert_eq!(config.format_currency(1234), "$12.34");
    /// ```
    pub fn format_currency(&self, cents: i64) -> String {
        let divisor = 10_i64.pow(self.currency_decimals as u32);
        let whole = cents / divisor;
        let frac = (cents % divisor).abs();

        format!(
            "{}{}{}",
            if cents < 0 { "-" } else { "" },
            self.currency_symbol,
            if self.currency_decimals > 0 {
                format!(
                    "{}.{:0width$}",
                    whole.abs(),
                    frac,
                    width = self.currency_decimals as usize
                )
            } else {
                whole.abs().to_string()
            }
        )
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "tally", "tally")
            .map(|dirs| dirs.config_dir().join("tally.toml"))
    }
}

/// Configuration error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
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
    fn test_defaults_are_valid() {
        assert!(ApiConfig::default().validate_with(true).is_ok());
        assert_eq!(ApiConfig::default().socket_addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ApiConfig::default();
        config
            .apply_overrides(lookup(&[
                ("TALLY_PORT", "9090"),
                ("TALLY_DB_PATH", ":memory:"),
                ("TALLY_REQUEST_TIMEOUT_SECS", "30"),
                ("TALLY_CURRENCY_DECIMALS", "0"),
            ]))
            .unwrap();

        assert_eq!(config.port, 9090);
        assert_eq!(config.db_path, PathBuf::from(":memory:"));
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.currency_decimals, 0);
    }

    #[test]
    fn test_bad_env_value_is_reported() {
        let mut config = ApiConfig::default();
        let err = config
            .apply_overrides(lookup(&[("TALLY_PORT", "eighty")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(ref key) if key == "TALLY_PORT"));
    }

    #[test]
    fn test_toml_partial_file_keeps_defaults() {
        let config: ApiConfig = toml::from_str("port = 7000\ncurrency_code = \"EUR\"").unwrap();
        assert_eq!(config.port, 7000);
        assert_eq!(config.currency_code, "EUR");
        assert_eq!(config.max_connections, 5);
    }

    #[test]
    fn test_validation() {
        let config = ApiConfig {
            jwt_secret: "short".to_string(),
            ..ApiConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ApiConfig {
            request_timeout_secs: 0,
            ..ApiConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ApiConfig {
            currency_code: "EURO".to_string(),
            ..ApiConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_dev_secret_refused_outside_dev_builds() {
        let err = ApiConfig::default().validate_with(false).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref msg) if msg.contains("TALLY_JWT_SECRET")));

        let mut config = ApiConfig::default();
        config
            .apply_overrides(lookup(&[("TALLY_JWT_SECRET", "a-long-random-production-secret")]))
            .unwrap();
        assert!(config.validate_with(false).is_ok());
    }

    #[test]
    fn test_format_currency() {
        let config = ApiConfig::default();
        assert_eq!(config.format_currency(1234), "$12.34");
        assert_eq!(config.format_currency(1), "$0.01");
        assert_eq!(config.format_currency(-1234), "-$12.34");

        let yen = ApiConfig {
            currency_symbol: "¥".to_string(),
            currency_decimals: 0,
            ..ApiConfig::default()
        };
        assert_eq!(yen.format_currency(1234), "¥1234");
    }
}
