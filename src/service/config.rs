//! Service configuration loaded from the environment.
//!
//! Environment variables:
//! - `HOST`: Service host (default: 0.0.0.0)
//! - `PORT`: Service port (default: 8001)
//! - `LOG_FORMAT`: "json" for structured logs, "pretty" for development (default: json)
//! - `QUERY_TIMEOUT_MS`: Deadline for transitive queries (default: 5000)
//! - `DATABASE_URL`: PostgreSQL connection string; in-memory store when unset

use std::time::Duration;

/// Default service port.
pub const DEFAULT_PORT: u16 = 8001;

/// Default deadline for transitive queries in milliseconds.
pub const DEFAULT_QUERY_TIMEOUT_MS: u64 = 5000;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event.
    Json,
    /// Human readable, for local development.
    Pretty,
}

impl LogFormat {
    /// Parse from string; anything other than "pretty" is JSON.
    pub fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("pretty") {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Log output format.
    pub log_format: LogFormat,
    /// Deadline applied to every transitive query.
    pub query_timeout: Duration,
    /// PostgreSQL URL. `None` selects the in-memory store.
    pub database_url: Option<String>,
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: lookup("PORT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            log_format: lookup("LOG_FORMAT")
                .map(|s| LogFormat::from_str(&s))
                .unwrap_or(LogFormat::Json),
            query_timeout: Duration::from_millis(
                lookup("QUERY_TIMEOUT_MS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_QUERY_TIMEOUT_MS),
            ),
            database_url: lookup("DATABASE_URL").filter(|s| !s.is_empty()),
        }
    }

    /// `host:port` bind address.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}
