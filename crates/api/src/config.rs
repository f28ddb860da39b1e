//! Application configuration loaded from environment variables.

use chrono::Duration;
use consolidation::EngineConfig;

/// Log output format for the `fmt` layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default `"0.0.0.0"`)
/// - `PORT`: listen port (default `3000`)
/// - `RUST_LOG`: tracing filter directive (default `"info"`)
/// - `LOG_FORMAT`: `pretty` or `json` (default `pretty`)
/// - `DATABASE_URL`: PostgreSQL connection string; unset keeps events in memory
/// - `MAX_CONFLICT_RETRIES`, `NOTIFY_ATTEMPTS`, `DEFERRED_DUE_HOURS`: engine knobs
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub max_conflict_retries: u32,
    pub notify_attempts: u32,
    pub deferred_due_hours: i64,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parsed(&lookup, "PORT").unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: lookup("LOG_FORMAT")
                .map(|f| LogFormat::parse(&f))
                .unwrap_or(defaults.log_format),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            max_conflict_retries: parsed(&lookup, "MAX_CONFLICT_RETRIES")
                .unwrap_or(defaults.max_conflict_retries),
            notify_attempts: parsed(&lookup, "NOTIFY_ATTEMPTS").unwrap_or(defaults.notify_attempts),
            deferred_due_hours: parsed(&lookup, "DEFERRED_DUE_HOURS")
                .filter(|hours: &i64| *hours > 0)
                .unwrap_or(defaults.deferred_due_hours),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn engine(&self) -> EngineConfig {
        EngineConfig::default()
            .with_conflict_retries(self.max_conflict_retries)
            .with_notify_attempts(self.notify_attempts)
            .with_deferred_due(Duration::hours(self.deferred_due_hours))
    }
}

fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            database_url: None,
            max_conflict_retries: 3,
            notify_attempts: 3,
            deferred_due_hours: 24,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = config_from(&[]);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.database_url.is_none());
        assert_eq!(config.deferred_due_hours, 24);
    }

    #[test]
    fn test_addr_formatting() {
        let config = config_from(&[("HOST", "127.0.0.1"), ("PORT", "8080")]);
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_engine_knobs() {
        let config = config_from(&[
            ("MAX_CONFLICT_RETRIES", "5"),
            ("NOTIFY_ATTEMPTS", "1"),
            ("DEFERRED_DUE_HOURS", "48"),
            ("LOG_FORMAT", "JSON"),
        ]);
        let engine = config.engine();
        assert_eq!(engine.max_conflict_retries, 5);
        assert_eq!(engine.notify_attempts, 1);
        assert_eq!(engine.deferred_due, Duration::hours(48));
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_bad_values_fall_back() {
        let config = config_from(&[
            ("PORT", "not-a-port"),
            ("DEFERRED_DUE_HOURS", "-3"),
            ("DATABASE_URL", "  "),
        ]);
        assert_eq!(config.port, 3000);
        assert_eq!(config.deferred_due_hours, 24);
        assert!(config.database_url.is_none());
    }
}
