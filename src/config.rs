use std::env;

use chrono::Duration;

use crate::error::ConfigError;

const DEFAULT_DATABASE_URL: &str = "sqlite://myblog.db";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_CONFIRMATION_LINK_TIMEOUT: i64 = 15;

/// Token signing settings handed to the model methods.
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub secret_key: String,
    /// Lifetime of email confirmation links, in minutes.
    pub confirmation_link_timeout: i64,
}

impl SecurityConfig {
    pub fn new(secret_key: impl Into<String>, confirmation_link_timeout: i64) -> Self {
        Self {
            secret_key: secret_key.into(),
            confirmation_link_timeout,
        }
    }

    /// Confirmation link lifetime, or `None` when the configured minutes do
    /// not fit in a `Duration`.
    pub fn confirmation_max_age(&self) -> Option<Duration> {
        Duration::try_minutes(self.confirmation_link_timeout)
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    pub security: SecurityConfig,
}

impl AppConfig {
    /// Reads the process environment. Call `dotenvy::dotenv()` first to pick up a `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());

        let port = match env::var("PORT") {
            Ok(value) => value.parse().map_err(|_| ConfigError::Invalid {
                var: "PORT",
                value,
            })?,
            Err(_) => DEFAULT_PORT,
        };

        let secret_key = env::var("SECRET_KEY").map_err(|_| ConfigError::Missing("SECRET_KEY"))?;
        if secret_key.is_empty() {
            return Err(ConfigError::Invalid {
                var: "SECRET_KEY",
                value: String::new(),
            });
        }

        let confirmation_link_timeout = match env::var("CONFIRMATION_LINK_TIMEOUT") {
            Ok(value) => match value.parse::<i64>() {
                Ok(minutes) if minutes > 0 && Duration::try_minutes(minutes).is_some() => minutes,
                _ => {
                    return Err(ConfigError::Invalid {
                        var: "CONFIRMATION_LINK_TIMEOUT",
                        value,
                    })
                }
            },
            Err(_) => DEFAULT_CONFIRMATION_LINK_TIMEOUT,
        };

        Ok(Self {
            database_url,
            port,
            security: SecurityConfig::new(secret_key, confirmation_link_timeout),
        })
    }
}
