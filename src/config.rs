//! Configuration loaded from the environment at startup.
//!
//! A `.env` file in the working directory is read first for local
//! development; real environment variables take precedence.

use std::net::SocketAddr;

use time::Duration;

use crate::models::user::session::TokenKeys;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(&'static str),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(&'static str, String),
}

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// Postgres connection string. Without one, data lives in memory.
    pub database_url: Option<String>,
    pub tokens: TokenKeys,
    pub mailgun_token: Option<String>,
    /// Shared secret that external schedulers present to trigger reminders.
    pub cron_token: Option<String>,
}

impl Config {
    pub const DEFAULT_BIND_ADDRESS: &'static str = "0.0.0.0:5000";
    pub const DEFAULT_TOKEN_EXPIRY_SECONDS: i64 = 60 * 60;
    pub const DEFAULT_REFRESH_EXPIRY_SECONDS: i64 = 30 * 24 * 60 * 60;

    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let bind_address = optional_var("BIND_ADDRESS")
            .unwrap_or_else(|| Self::DEFAULT_BIND_ADDRESS.to_owned())
            .parse::<SocketAddr>()
            .map_err(|err| ConfigError::InvalidValue("BIND_ADDRESS", err.to_string()))?;

        let tokens = TokenKeys {
            access_secret: required_var("JWT_SECRET")?,
            access_ttl: seconds_var("JWT_EXPIRE", Self::DEFAULT_TOKEN_EXPIRY_SECONDS)?,
            refresh_secret: required_var("REFRESH_TOKEN_SECRET")?,
            refresh_ttl: seconds_var("REFRESH_TOKEN_EXPIRE", Self::DEFAULT_REFRESH_EXPIRY_SECONDS)?,
        };

        Ok(Self {
            bind_address,
            database_url: optional_var("DATABASE_URL"),
            tokens,
            mailgun_token: optional_var("MAILGUN_TOKEN"),
            cron_token: optional_var("CRON_TOKEN"),
        })
    }
}

fn optional_var(name: &'static str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

fn required_var(name: &'static str) -> Result<String, ConfigError> {
    optional_var(name).ok_or(ConfigError::MissingVar(name))
}

fn seconds_var(name: &'static str, default: i64) -> Result<Duration, ConfigError> {
    match optional_var(name) {
        Some(value) => value
            .parse::<i64>()
            .ok()
            .filter(|seconds| *seconds > 0)
            .map(Duration::seconds)
            .ok_or_else(|| {
                ConfigError::InvalidValue(name, format!("'{}' is not a positive number of seconds", value))
            }),
        None => Ok(Duration::seconds(default)),
    }
}
