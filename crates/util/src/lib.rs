pub mod config;

use std::{env, net::SocketAddr};

pub use config::{AppConfig, ConfigError, Environment};

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";

/// Reads `.env` into the process environment if the file exists.
///
/// Variables already set in the environment win over the file.
pub fn load_env_file() {
    let _ = dotenvy::dotenv();
}

/// Parses `APP_BIND_ADDR`, or [`DEFAULT_BIND_ADDR`] when it is unset.
pub fn server_bind_address() -> Result<SocketAddr, std::net::AddrParseError> {
    let value = env::var("APP_BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
    value.parse()
}

// Shared by every test in the crate that touches process environment.
#[cfg(test)]
pub(crate) static ENV_GUARD: std::sync::LazyLock<std::sync::Mutex<()>> =
    std::sync::LazyLock::new(|| std::sync::Mutex::new(()));
