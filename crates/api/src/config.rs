//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use resilience::CircuitBreakerConfig;
use stock_channel::ChannelConfig;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `PRODUCT_SERVICE_URL`: remote product service; unset uses the in-process catalog
/// - `DATABASE_URL`: PostgreSQL for orders; unset keeps orders in memory
/// - `ORDER_OBSERVER`: subscriber notified of new orders (default: `"admin@naver.com"`)
/// - `CB_FAILURE_THRESHOLD`, `CB_WINDOW_SECS`, `CB_COOL_DOWN_SECS`, `CB_CALL_TIMEOUT_MS`:
///   product lookup circuit breaker (defaults: 5, 60, 30, 3000; a timeout of 0 disables it)
/// - `STOCK_PARTITIONS`, `STOCK_PARTITION_CAPACITY`: stock channel sizing (defaults: 8, 1024)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub product_service_url: Option<String>,
    pub database_url: Option<String>,
    pub order_observer: String,
    pub cb_failure_threshold: u32,
    pub cb_window: Duration,
    pub cb_cool_down: Duration,
    pub cb_call_timeout: Option<Duration>,
    pub stock_partitions: usize,
    pub stock_partition_capacity: usize,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let call_timeout_ms: u64 = env_or("CB_CALL_TIMEOUT_MS", 3000);

        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: env_or("PORT", defaults.port),
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
            product_service_url: non_empty_var("PRODUCT_SERVICE_URL"),
            database_url: non_empty_var("DATABASE_URL"),
            order_observer: non_empty_var("ORDER_OBSERVER").unwrap_or(defaults.order_observer),
            cb_failure_threshold: env_or("CB_FAILURE_THRESHOLD", defaults.cb_failure_threshold),
            cb_window: Duration::from_secs(env_or("CB_WINDOW_SECS", 60)),
            cb_cool_down: Duration::from_secs(env_or("CB_COOL_DOWN_SECS", 30)),
            cb_call_timeout: (call_timeout_ms > 0).then(|| Duration::from_millis(call_timeout_ms)),
            stock_partitions: env_or("STOCK_PARTITIONS", defaults.stock_partitions),
            stock_partition_capacity: env_or(
                "STOCK_PARTITION_CAPACITY",
                defaults.stock_partition_capacity,
            ),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn circuit_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.cb_failure_threshold.max(1),
            window: self.cb_window,
            cool_down: self.cb_cool_down,
            call_timeout: self.cb_call_timeout,
            ..CircuitBreakerConfig::default()
        }
    }

    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            partitions: self.stock_partitions.max(1),
            partition_capacity: self.stock_partition_capacity.max(1),
            ..ChannelConfig::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            product_service_url: None,
            database_url: None,
            order_observer: ordering::DEFAULT_ORDER_OBSERVER.to_string(),
            cb_failure_threshold: 5,
            cb_window: Duration::from_secs(60),
            cb_cool_down: Duration::from_secs(30),
            cb_call_timeout: Some(Duration::from_millis(3000)),
            stock_partitions: 8,
            stock_partition_capacity: 1024,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.order_observer, "admin@naver.com");
        assert!(config.product_service_url.is_none());
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
    fn test_circuit_breaker_config() {
        let config = Config {
            cb_failure_threshold: 2,
            cb_cool_down: Duration::from_secs(5),
            cb_call_timeout: None,
            ..Config::default()
        };
        let cb = config.circuit_breaker_config();
        assert_eq!(cb.failure_threshold, 2);
        assert_eq!(cb.cool_down, Duration::from_secs(5));
        assert_eq!(cb.window, Duration::from_secs(60));
        assert_eq!(cb.half_open_max_calls, 1);
        assert!(cb.call_timeout.is_none());
    }

    #[test]
    fn test_channel_config_never_zero() {
        let config = Config {
            stock_partitions: 0,
            stock_partition_capacity: 0,
            ..Config::default()
        };
        let channel = config.channel_config();
        assert_eq!(channel.partitions, 1);
        assert_eq!(channel.partition_capacity, 1);
    }
}
