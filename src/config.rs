//! Configuration management for the intake service
//!
//! Configuration is sourced from environment variables at process start
//! (the deployment contract for this service: a container env injected by
//! the orchestrator). Database credentials are required; everything else
//! has a sensible default.

use crate::error::{AppError, AppResult};
use std::str::FromStr;

/// Root configuration structure
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub observability: ObservabilityConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// IP address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Identity reported in responses and persisted with every record
    pub backend_name: String,
}

/// Database connection configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    /// Upper bound the pool manages on its own; the service only observes
    /// occupancy, it never resizes the pool.
    pub max_connections: u32,
}

/// Observability configuration
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub log_level: String,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` naming the variable when a required
    /// variable is missing or a value fails to parse.
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    ///
    /// Split out from [`Config::from_env`] so tests can feed a map instead
    /// of mutating the process environment.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        Ok(Self {
            server: ServerConfig {
                host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parse_or(&get, "PORT", 8080)?,
                backend_name: get("BACKEND_NAME").unwrap_or_else(|| "intake".to_string()),
            },
            database: DatabaseConfig {
                host: require(&get, "DB_HOST")?,
                port: parse_or(&get, "DB_PORT", 5432)?,
                user: require(&get, "DB_USER")?,
                password: require(&get, "DB_PASSWORD")?,
                database: require(&get, "DB_NAME")?,
                max_connections: parse_or(&get, "DB_MAX_CONNECTIONS", 10)?,
            },
            observability: ObservabilityConfig {
                log_level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            },
        })
    }
}

fn require(get: &impl Fn(&str) -> Option<String>, key: &str) -> AppResult<String> {
    get(key).ok_or_else(|| AppError::Config(format!("environment variable `{key}` is not set")))
}

fn parse_or<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> AppResult<T> {
    match get(key) {
        Some(raw) => raw.parse().map_err(|_| {
            AppError::Config(format!("environment variable `{key}` has invalid value `{raw}`"))
        }),
        None => Ok(default),
    }
}
