//! Application configuration loaded from environment variables.

use std::time::Duration;

use orchestrator::{OrchestratorConfig, RetryPolicy};

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `json` for JSON logs, anything else for text
/// - `DATABASE_URL`: orders database; in-memory store when unset
/// - `INVENTORY_URL`: catalog base URL (default: `"http://127.0.0.1:3001"`)
/// - `INVENTORY_TIMEOUT_MS`: deadline per catalog call (default: `2000`)
/// - `INVENTORY_MAX_ATTEMPTS`: attempts per catalog call (default: `3`)
/// - `INVENTORY_BACKOFF_MS`: first retry delay (default: `50`)
/// - `RESERVATION_ATTEMPTS`: stock reservation rounds per line (default: `3`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub json_logs: bool,
    pub database_url: Option<String>,
    pub inventory_url: String,
    pub inventory_timeout: Duration,
    pub inventory_max_attempts: u32,
    pub inventory_backoff: Duration,
    pub reservation_attempts: u32,
}

fn parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: parsed("PORT").unwrap_or(defaults.port),
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
            json_logs: std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")),
            database_url: std::env::var("DATABASE_URL").ok().filter(|u| !u.is_empty()),
            inventory_url: std::env::var("INVENTORY_URL")
                .ok()
                .filter(|u| !u.is_empty())
                .unwrap_or(defaults.inventory_url),
            inventory_timeout: parsed("INVENTORY_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.inventory_timeout),
            inventory_max_attempts: parsed("INVENTORY_MAX_ATTEMPTS")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.inventory_max_attempts),
            inventory_backoff: parsed("INVENTORY_BACKOFF_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.inventory_backoff),
            reservation_attempts: parsed("RESERVATION_ATTEMPTS")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.reservation_attempts),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Orchestrator tuning derived from the inventory settings.
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            call_timeout: self.inventory_timeout,
            retry: RetryPolicy {
                max_attempts: self.inventory_max_attempts,
                initial_backoff: self.inventory_backoff,
                ..RetryPolicy::default()
            },
            reservation_attempts: self.reservation_attempts,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            json_logs: false,
            database_url: None,
            inventory_url: "http://127.0.0.1:3001".to_string(),
            inventory_timeout: Duration::from_millis(2000),
            inventory_max_attempts: 3,
            inventory_backoff: Duration::from_millis(50),
            reservation_attempts: 3,
        }
    }
}
