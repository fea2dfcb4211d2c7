//! Application configuration loaded from environment variables.

use std::time::Duration;

use settlement::{RetryConfig, SettlementConfig};

/// Log output format.
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
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `pretty` or `json` (default: `pretty`)
/// - `DATABASE_URL`: PostgreSQL URL; unset runs on the in-memory store
/// - `DATABASE_MAX_CONNECTIONS` (default: `10`)
/// - `DATABASE_ACQUIRE_TIMEOUT_MS` (default: `2000`)
/// - `SETTLEMENT_TIMEOUT_MS` (default: `5000`)
/// - `STORE_RETRY_ATTEMPTS` (default: `3`)
/// - `STORE_RETRY_BASE_DELAY_MS` (default: `50`)
/// - `STORE_RETRY_MAX_DELAY_MS` (default: `1000`)
/// - `RECONCILE_INTERVAL_SECS` (default: `30`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub database_acquire_timeout: Duration,
    pub settlement_timeout: Duration,
    pub retry_attempts: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    pub reconcile_interval: Duration,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup. Unparseable values fall
    /// back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        let millis = |key: &str, default: Duration| {
            parsed(key).map(Duration::from_millis).unwrap_or(default)
        };

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: lookup("LOG_FORMAT")
                .map(|v| LogFormat::parse(&v))
                .unwrap_or(defaults.log_format),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            database_max_connections: parsed("DATABASE_MAX_CONNECTIONS")
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(defaults.database_max_connections),
            database_acquire_timeout: millis(
                "DATABASE_ACQUIRE_TIMEOUT_MS",
                defaults.database_acquire_timeout,
            ),
            settlement_timeout: millis("SETTLEMENT_TIMEOUT_MS", defaults.settlement_timeout),
            retry_attempts: parsed("STORE_RETRY_ATTEMPTS")
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(defaults.retry_attempts),
            retry_base_delay: millis("STORE_RETRY_BASE_DELAY_MS", defaults.retry_base_delay),
            retry_max_delay: millis("STORE_RETRY_MAX_DELAY_MS", defaults.retry_max_delay),
            reconcile_interval: parsed("RECONCILE_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.reconcile_interval),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Settlement tuning derived from this config.
    pub fn settlement(&self) -> SettlementConfig {
        SettlementConfig::default()
            .with_timeout(self.settlement_timeout)
            .with_retry(RetryConfig {
                max_attempts: self.retry_attempts,
                base_delay: self.retry_base_delay,
                max_delay: self.retry_max_delay,
                ..RetryConfig::default()
            })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            database_url: None,
            database_max_connections: 10,
            database_acquire_timeout: Duration::from_millis(2000),
            settlement_timeout: Duration::from_millis(5000),
            retry_attempts: 3,
            retry_base_delay: Duration::from_millis(50),
            retry_max_delay: Duration::from_millis(1000),
            reconcile_interval: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_reads_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("PORT", "8081"),
            ("LOG_FORMAT", "JSON"),
            ("DATABASE_URL", "postgres://localhost/settlement"),
            ("SETTLEMENT_TIMEOUT_MS", "750"),
            ("STORE_RETRY_ATTEMPTS", "5"),
            ("RECONCILE_INTERVAL_SECS", "2"),
        ]));
        assert_eq!(config.port, 8081);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/settlement")
        );
        assert_eq!(config.settlement_timeout, Duration::from_millis(750));
        assert_eq!(config.retry_attempts, 5);
        assert_eq!(config.reconcile_interval, Duration::from_secs(2));
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = Config::from_lookup(lookup(&[
            ("PORT", "not-a-port"),
            ("STORE_RETRY_ATTEMPTS", "-1"),
            ("DATABASE_URL", "  "),
        ]));
        assert_eq!(config.port, 3000);
        assert_eq!(config.retry_attempts, 3);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_settlement_config_conversion() {
        let config = Config {
            settlement_timeout: Duration::from_secs(1),
            retry_attempts: 4,
            retry_base_delay: Duration::from_millis(10),
            retry_max_delay: Duration::from_millis(80),
            ..Config::default()
        };
        let settlement = config.settlement();
        assert_eq!(settlement.settlement_timeout, Duration::from_secs(1));
        assert_eq!(settlement.retry.max_attempts, 4);
        assert_eq!(settlement.retry.base_delay, Duration::from_millis(10));
        assert_eq!(settlement.retry.max_delay, Duration::from_millis(80));
    }
}
