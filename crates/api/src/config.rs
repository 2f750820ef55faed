//! Application configuration

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,

    // Database (in-memory store when unset)
    pub database_url: Option<String>,
    pub database_max_connections: u32,

    // Authentication
    pub jwt_secret: String,
    pub jwt_expiry_hours: i64,

    // AI responder (disabled when unset)
    pub ai_endpoint_url: Option<String>,
    pub ai_api_key: Option<String>,
    pub ai_timeout_ms: u64,
    pub ai_failure_threshold: u32,

    // Chat
    pub endpoint_queue_capacity: usize,
    pub need_human_debounce_secs: u64,
    pub disconnect_grace_secs: u64,
    pub max_message_bytes: usize,

    // Logging
    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Server
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),

            // Database
            database_url: non_empty("DATABASE_URL"),
            database_max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 10)?,

            // Authentication
            jwt_secret: {
                let secret =
                    env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?;
                if secret.len() < 32 {
                    return Err(ConfigError::WeakSecret(
                        "JWT_SECRET must be at least 32 characters",
                    ));
                }
                secret
            },
            jwt_expiry_hours: parse_or("JWT_EXPIRY_HOURS", 24)?,

            // AI responder
            ai_endpoint_url: non_empty("AI_ENDPOINT_URL"),
            ai_api_key: non_empty("AI_API_KEY"),
            ai_timeout_ms: parse_or("AI_TIMEOUT_MS", 8000)?,
            ai_failure_threshold: parse_or("AI_FAILURE_THRESHOLD", 3)?,

            // Chat
            endpoint_queue_capacity: {
                let capacity = parse_or("ENDPOINT_QUEUE_CAPACITY", 256)?;
                if capacity == 0 {
                    return Err(ConfigError::Invalid("ENDPOINT_QUEUE_CAPACITY"));
                }
                capacity
            },
            need_human_debounce_secs: parse_or("NEED_HUMAN_DEBOUNCE_SECS", 60)?,
            disconnect_grace_secs: parse_or("DISCONNECT_GRACE_SECS", 5)?,
            max_message_bytes: parse_or("MAX_MESSAGE_BYTES", 4000)?,

            // Logging
            log_format: match env::var("LOG_FORMAT").as_deref() {
                Ok("json") => LogFormat::Json,
                Ok("text") | Err(_) => LogFormat::Text,
                Ok(_) => return Err(ConfigError::Invalid("LOG_FORMAT")),
            },
        })
    }

    pub fn ai_timeout(&self) -> Duration {
        Duration::from_millis(self.ai_timeout_ms)
    }

    pub fn need_human_debounce(&self) -> Duration {
        Duration::from_secs(self.need_human_debounce_secs)
    }

    pub fn disconnect_grace(&self) -> Duration {
        Duration::from_secs(self.disconnect_grace_secs)
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        Err(_) => Ok(default),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
    #[error("Weak secret: {0}")]
    WeakSecret(&'static str),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]  // Allow unwrap() in tests for cleaner test code
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "BIND_ADDRESS",
        "DATABASE_URL",
        "JWT_SECRET",
        "AI_ENDPOINT_URL",
        "AI_TIMEOUT_MS",
        "ENDPOINT_QUEUE_CAPACITY",
        "DISCONNECT_GRACE_SECS",
        "LOG_FORMAT",
    ];

    fn reset_env() {
        for var in VARS {
            env::remove_var(var);
        }
        env::set_var(
            "JWT_SECRET",
            "test-jwt-secret-must-be-at-least-32-characters-long",
        );
    }

    #[test]
    #[serial]
    fn test_defaults() {
        reset_env();
        let config = Config::from_env().unwrap();

        assert_eq!(config.bind_address, "0.0.0.0:3000");
        assert!(config.database_url.is_none());
        assert!(config.ai_endpoint_url.is_none());
        assert_eq!(config.ai_timeout(), Duration::from_secs(8));
        assert_eq!(config.endpoint_queue_capacity, 256);
        assert_eq!(config.need_human_debounce(), Duration::from_secs(60));
        assert_eq!(config.disconnect_grace(), Duration::from_secs(5));
        assert_eq!(config.max_message_bytes, 4000);
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    #[serial]
    fn test_missing_and_weak_secret() {
        reset_env();
        env::remove_var("JWT_SECRET");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Missing("JWT_SECRET"))
        ));

        env::set_var("JWT_SECRET", "short");
        assert!(matches!(Config::from_env(), Err(ConfigError::WeakSecret(_))));
        reset_env();
    }

    #[test]
    #[serial]
    fn test_overrides_and_invalid_values() {
        reset_env();
        env::set_var("DATABASE_URL", "postgres://localhost/helpline");
        env::set_var("AI_TIMEOUT_MS", "250");
        env::set_var("DISCONNECT_GRACE_SECS", "0");
        env::set_var("LOG_FORMAT", "json");

        let config = Config::from_env().unwrap();
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/helpline"));
        assert_eq!(config.ai_timeout(), Duration::from_millis(250));
        assert!(config.disconnect_grace().is_zero());
        assert_eq!(config.log_format, LogFormat::Json);

        env::set_var("ENDPOINT_QUEUE_CAPACITY", "0");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Invalid("ENDPOINT_QUEUE_CAPACITY"))
        ));

        env::set_var("ENDPOINT_QUEUE_CAPACITY", "lots");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Invalid("ENDPOINT_QUEUE_CAPACITY"))
        ));
        reset_env();
    }
}
