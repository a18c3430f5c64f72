//! Configuration loader for the `vitals-sensorflow` backend service.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). Nothing else in the crate reads `env::var` for
//! configuration.
//!
use std::env;

use anyhow::{anyhow, Result};

/// Parse an optional numeric environment variable with a default value.
macro_rules! parse_env {
    ($var_name:expr, $ty:ty, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<$ty>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// SQLite file holding the aggregate table, or `:memory:`.
    pub db_path: String,

    /// Maximum number of database connections in the pool.
    pub db_pool_max: u32,

    /// TCP port the HTTP server binds on all interfaces.
    pub http_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            db_path: "vitals.db".to_string(),
            db_pool_max: 5,
            http_port: 8080,
        }
    }
}

/// Load configuration from environment variables with defaults.
///
/// Optional:
/// - `DATABASE_PATH` – SQLite file (default: `vitals.db`)
/// - `DB_POOL_MAX` – max DB connections (default: 5)
/// - `HTTP_PORT` – listen port (default: 8080)
///
/// Returns an error if any variable is present but invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let defaults = Config::default();

    let db_path = env::var("DATABASE_PATH").unwrap_or(defaults.db_path);
    if db_path.trim().is_empty() {
        return Err(anyhow!("DATABASE_PATH must not be empty"));
    }
    let db_pool_max = parse_env!("DB_POOL_MAX", u32, defaults.db_pool_max);
    let http_port = parse_env!("HTTP_PORT", u16, defaults.http_port);

    Ok(Config {
        db_path,
        db_pool_max,
        http_port,
    })
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Configuration loaded:");
        tracing::info!("  DATABASE_PATH : {}", self.db_path);
        tracing::info!("  DB_POOL_MAX   : {}", self.db_pool_max);
        tracing::info!("  HTTP_PORT     : {}", self.http_port);
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    // Single test so env mutations never race with each other.
    #[test]
    fn test_load_from_env() {
        // ---
        env::remove_var("DATABASE_PATH");
        env::remove_var("DB_POOL_MAX");
        env::remove_var("HTTP_PORT");

        let cfg = load_from_env().unwrap();
        assert_eq!(cfg.db_path, "vitals.db");
        assert_eq!(cfg.db_pool_max, 5);
        assert_eq!(cfg.http_port, 8080);

        env::set_var("DATABASE_PATH", "/tmp/pint.db");
        env::set_var("DB_POOL_MAX", "9");
        env::set_var("HTTP_PORT", "9090");
        let cfg = load_from_env().unwrap();
        assert_eq!(cfg.db_path, "/tmp/pint.db");
        assert_eq!(cfg.db_pool_max, 9);
        assert_eq!(cfg.http_port, 9090);

        env::set_var("HTTP_PORT", "not-a-port");
        let err = load_from_env().unwrap_err();
        assert!(err.to_string().contains("HTTP_PORT"));

        env::set_var("HTTP_PORT", "9090");
        env::set_var("DATABASE_PATH", "  ");
        assert!(load_from_env().is_err());

        env::remove_var("DATABASE_PATH");
        env::remove_var("DB_POOL_MAX");
        env::remove_var("HTTP_PORT");
    }
}
