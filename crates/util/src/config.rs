use std::{env, fmt, net::SocketAddr, time::Duration};

use super::server_bind_address;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://credvault.db";
pub const DEFAULT_BCRYPT_COST: u32 = 10;
pub const DEFAULT_STORAGE_TIMEOUT_MS: u64 = 5_000;

const MIN_BCRYPT_COST: u32 = 4;
const MAX_BCRYPT_COST: u32 = 31;

/// Application runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    fn from_str(value: &str) -> Result<Self, ConfigError> {
        match value {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }

    pub fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }

    /// Returns the canonical name used for logging/metrics labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }
}

/// Runtime configuration resolved from environment variables.
#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub environment: Environment,
    pub database_url: String,
    pub bcrypt_cost: u32,
    pub storage_timeout: Duration,
    pub pepper: Option<Vec<u8>>,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("environment", &self.environment)
            .field("database_url", &self.database_url)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .field("storage_timeout", &self.storage_timeout)
            .field("pepper", &self.pepper.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl AppConfig {
    /// Constructs the configuration by reading and validating environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_value = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let environment = Environment::from_str(&env_value)?;
        let bind_addr = server_bind_address().map_err(ConfigError::BindAddress)?;

        let database_url = match env::var("DATABASE_URL") {
            Ok(value) if !value.trim().is_empty() => value,
            _ if environment.is_production() => {
                return Err(ConfigError::MissingVariable("DATABASE_URL"))
            }
            _ => DEFAULT_DATABASE_URL.to_string(),
        };

        let bcrypt_cost = match env::var("BCRYPT_COST") {
            Ok(raw) => parse_cost(&raw)?,
            Err(_) => DEFAULT_BCRYPT_COST,
        };

        let storage_timeout = match env::var("STORAGE_TIMEOUT_MS") {
            Ok(raw) => parse_timeout(&raw)?,
            Err(_) => Duration::from_millis(DEFAULT_STORAGE_TIMEOUT_MS),
        };

        let pepper = match env::var("CREDENTIAL_PEPPER") {
            Ok(raw) if !raw.trim().is_empty() => {
                Some(hex::decode(raw.trim()).map_err(ConfigError::InvalidPepper)?)
            }
            _ => None,
        };

        Ok(Self {
            bind_addr,
            environment,
            database_url,
            bcrypt_cost,
            storage_timeout,
            pepper,
        })
    }
}

fn parse_cost(raw: &str) -> Result<u32, ConfigError> {
    raw.trim()
        .parse::<u32>()
        .ok()
        .filter(|cost| (MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(cost))
        .ok_or_else(|| ConfigError::InvalidCost(raw.to_string()))
}

fn parse_timeout(raw: &str) -> Result<Duration, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .ok()
        .filter(|millis| *millis > 0)
        .map(Duration::from_millis)
        .ok_or_else(|| ConfigError::InvalidTimeout(raw.to_string()))
}

/// Errors that can occur during configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    InvalidEnvironment(String),
    BindAddress(std::net::AddrParseError),
    MissingVariable(&'static str),
    InvalidCost(String),
    InvalidTimeout(String),
    InvalidPepper(hex::FromHexError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEnvironment(value) => write!(
                f,
                "APP_ENV must be one of 'development', 'production', or 'test' (got {value})"
            ),
            Self::BindAddress(err) => write!(f, "invalid APP_BIND_ADDR value: {err}"),
            Self::MissingVariable(name) => write!(f, "{name} must be set in production"),
            Self::InvalidCost(value) => write!(
                f,
                "BCRYPT_COST must be an integer between {MIN_BCRYPT_COST} and {MAX_BCRYPT_COST} (got {value})"
            ),
            Self::InvalidTimeout(value) => write!(
                f,
                "STORAGE_TIMEOUT_MS must be a positive integer (got {value})"
            ),
            Self::InvalidPepper(err) => write!(f, "CREDENTIAL_PEPPER must be hex encoded: {err}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DEFAULT_BIND_ADDR, ENV_GUARD};

    const VARS: [&str; 6] = [
        "APP_ENV",
        "APP_BIND_ADDR",
        "DATABASE_URL",
        "BCRYPT_COST",
        "STORAGE_TIMEOUT_MS",
        "CREDENTIAL_PEPPER",
    ];

    fn clear_env() {
        for name in VARS {
            env::remove_var(name);
        }
    }

    #[test]
    fn loads_defaults_in_development() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();

        let config = AppConfig::from_env().expect("config should load with defaults");
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.bcrypt_cost, DEFAULT_BCRYPT_COST);
        assert_eq!(config.storage_timeout, Duration::from_millis(5_000));
        assert!(config.pepper.is_none());
    }

    #[test]
    fn rejects_invalid_environment() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();
        env::set_var("APP_ENV", "invalid");

        let err = AppConfig::from_env().expect_err("invalid env should error");
        assert!(matches!(err, ConfigError::InvalidEnvironment(value) if value == "invalid"));

        clear_env();
    }

    #[test]
    fn production_requires_database_url() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();
        env::set_var("APP_ENV", "production");

        let err = AppConfig::from_env().expect_err("missing DATABASE_URL should error");
        assert!(matches!(err, ConfigError::MissingVariable("DATABASE_URL")));

        env::set_var("DATABASE_URL", "sqlite:///var/lib/credvault/credentials.db");
        env::set_var("APP_BIND_ADDR", "0.0.0.0:9000");
        let config = AppConfig::from_env().expect("config should load");
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.bind_addr.to_string(), "0.0.0.0:9000");
        assert_eq!(
            config.database_url,
            "sqlite:///var/lib/credvault/credentials.db"
        );

        clear_env();
    }

    #[test]
    fn parses_hashing_and_storage_overrides() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();
        env::set_var("BCRYPT_COST", "12");
        env::set_var("STORAGE_TIMEOUT_MS", "250");
        env::set_var("CREDENTIAL_PEPPER", "00ff10");

        let config = AppConfig::from_env().expect("config should load");
        assert_eq!(config.bcrypt_cost, 12);
        assert_eq!(config.storage_timeout, Duration::from_millis(250));
        assert_eq!(config.pepper.as_deref(), Some(&[0x00, 0xff, 0x10][..]));
        assert!(!format!("{config:?}").contains("00ff10"));

        clear_env();
    }

    #[test]
    fn rejects_out_of_range_cost_and_zero_timeout() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();

        env::set_var("BCRYPT_COST", "3");
        let err = AppConfig::from_env().expect_err("cost below minimum");
        assert!(matches!(err, ConfigError::InvalidCost(value) if value == "3"));

        env::set_var("BCRYPT_COST", "10");
        env::set_var("STORAGE_TIMEOUT_MS", "0");
        let err = AppConfig::from_env().expect_err("zero timeout");
        assert!(matches!(err, ConfigError::InvalidTimeout(value) if value == "0"));

        clear_env();
    }

    #[test]
    fn rejects_non_hex_pepper() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();
        env::set_var("CREDENTIAL_PEPPER", "not-hex");

        let err = AppConfig::from_env().expect_err("pepper must be hex");
        assert!(matches!(err, ConfigError::InvalidPepper(_)));

        clear_env();
    }
}
