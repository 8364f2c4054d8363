//! Configuration management for Gatehouse.
//!
//! Values are layered: built-in defaults, then an optional YAML file, then
//! environment variables prefixed with `GATEHOUSE` (nested keys separated by
//! `__`, e.g. `GATEHOUSE__RATE_LIMITING__LIMIT=50`).

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::error::{GatehouseError, Result};

/// Main configuration for the Gatehouse service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatehouseConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8000))
}

/// What the admission middleware does when the counter store errors mid-request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// Admit the request without enforcement.
    #[default]
    FailOpen,
    /// Reject the request with 503 Service Unavailable.
    FailClosed,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Requests allowed per window
    #[serde(default = "default_limit")]
    pub limit: u64,

    /// Window length in seconds
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,

    /// Prefix for counter keys in the store
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Requests whose path starts with any of these are never counted
    #[serde(default = "default_exempt_path_prefixes")]
    pub exempt_path_prefixes: Vec<String>,

    /// Counter store connection target: `redis://127.0.0.1:6379/0`, or
    /// `memory://` for a store local to this process.
    /// Rate limiting is disabled when unset.
    #[serde(default)]
    pub store_url: Option<String>,

    /// Upper bound for each counter store call in milliseconds
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,

    /// Upper bound for one attempt to connect to the counter store in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Behaviour on counter store errors
    #[serde(default)]
    pub failure_mode: FailureMode,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            window_seconds: default_window_seconds(),
            key_prefix: default_key_prefix(),
            exempt_path_prefixes: default_exempt_path_prefixes(),
            store_url: None,
            store_timeout_ms: default_store_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            failure_mode: FailureMode::default(),
        }
    }
}

impl RateLimitingConfig {
    /// Store call timeout as a `Duration`.
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Store connect timeout as a `Duration`.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Longest accepted window: one year.
pub const MAX_WINDOW_SECONDS: u64 = 365 * 24 * 60 * 60;

fn default_limit() -> u64 {
    100
}

fn default_window_seconds() -> u64 {
    60
}

fn default_key_prefix() -> String {
    "rl".to_string()
}

fn default_exempt_path_prefixes() -> Vec<String> {
    ["/docs", "/openapi.json", "/healthz", "/static"]
        .iter()
        .map(|p| p.to_string())
        .collect()
}

fn default_store_timeout_ms() -> u64 {
    250
}

fn default_connect_timeout_ms() -> u64 {
    2000
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl GatehouseConfig {
    /// Load configuration from a YAML file path.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: GatehouseConfig = serde_yaml::from_str(&contents)
            .map_err(|e| GatehouseError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from defaults, an optional YAML file, and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path).format(config::FileFormat::Yaml),
            );
        }

        let config: GatehouseConfig = builder
            .add_source(
                config::Environment::with_prefix("GATEHOUSE")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("rate_limiting.exempt_path_prefixes")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the rate limiter cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.rate_limiting.limit == 0 {
            return Err(GatehouseError::Config(
                "rate_limiting.limit must be greater than zero".to_string(),
            ));
        }
        if self.rate_limiting.window_seconds == 0 {
            return Err(GatehouseError::Config(
                "rate_limiting.window_seconds must be greater than zero".to_string(),
            ));
        }
        if self.rate_limiting.window_seconds > MAX_WINDOW_SECONDS {
            return Err(GatehouseError::Config(format!(
                "rate_limiting.window_seconds must be at most {}",
                MAX_WINDOW_SECONDS
            )));
        }
        if self.rate_limiting.connect_timeout_ms == 0 {
            return Err(GatehouseError::Config(
                "rate_limiting.connect_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio_test::assert_ok;

    // Tests that read or write process environment hold this lock.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_defaults() {
        let config = GatehouseConfig::default();
        assert_ok!(config.validate());
        assert_eq!(config.rate_limiting.limit, 100);
        assert_eq!(config.rate_limiting.window_seconds, 60);
        assert_eq!(config.rate_limiting.key_prefix, "rl");
        assert_eq!(
            config.rate_limiting.exempt_path_prefixes,
            vec!["/docs", "/openapi.json", "/healthz", "/static"]
        );
        assert!(config.rate_limiting.store_url.is_none());
        assert_eq!(config.rate_limiting.failure_mode, FailureMode::FailOpen);
        assert_eq!(config.rate_limiting.store_timeout(), Duration::from_millis(250));
        assert_eq!(config.rate_limiting.connect_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
rate_limiting:
  limit: 2
  failure_mode: fail_closed
  store_url: "redis://127.0.0.1:6379/0"
"#;
        let config: GatehouseConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.rate_limiting.limit, 2);
        assert_eq!(config.rate_limiting.window_seconds, 60);
        assert_eq!(config.rate_limiting.failure_mode, FailureMode::FailClosed);
        assert_eq!(
            config.rate_limiting.store_url.as_deref(),
            Some("redis://127.0.0.1:6379/0")
        );
        assert_eq!(config.server.http_addr, default_http_addr());
    }

    #[test]
    fn test_validate_rejects_zero_limit() {
        let mut config = GatehouseConfig::default();
        config.rate_limiting.limit = 0;
        assert!(matches!(config.validate(), Err(GatehouseError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_window() {
        let mut config = GatehouseConfig::default();
        config.rate_limiting.window_seconds = 0;
        assert!(matches!(config.validate(), Err(GatehouseError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_window_over_a_year() {
        let mut config = GatehouseConfig::default();
        config.rate_limiting.window_seconds = MAX_WINDOW_SECONDS;
        assert_ok!(config.validate());

        config.rate_limiting.window_seconds = MAX_WINDOW_SECONDS + 1;
        assert!(matches!(config.validate(), Err(GatehouseError::Config(_))));

        config.rate_limiting.window_seconds = u64::MAX;
        assert!(matches!(config.validate(), Err(GatehouseError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_connect_timeout() {
        let mut config = GatehouseConfig::default();
        config.rate_limiting.connect_timeout_ms = 0;
        assert!(matches!(config.validate(), Err(GatehouseError::Config(_))));
    }

    #[test]
    fn test_from_file_rejects_invalid_window() {
        let path = std::env::temp_dir().join(format!("gatehouse-test-{}.yaml", std::process::id()));
        std::fs::write(&path, "rate_limiting:\n  window_seconds: 0\n").unwrap();

        let result = GatehouseConfig::from_file(path.to_str().unwrap());
        std::fs::remove_file(&path).ok();

        assert!(matches!(result, Err(GatehouseError::Config(_))));
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let config = assert_ok!(GatehouseConfig::load(None));
        assert!(config.rate_limiting.limit > 0);
        assert!(config.rate_limiting.window_seconds > 0);
    }

    #[test]
    fn test_load_layers_environment_over_defaults() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let vars = [
            ("GATEHOUSE__RATE_LIMITING__LIMIT", "7"),
            ("GATEHOUSE__RATE_LIMITING__EXEMPT_PATH_PREFIXES", "/a,/b"),
            ("GATEHOUSE__RATE_LIMITING__FAILURE_MODE", "fail_closed"),
        ];
        for (key, value) in vars {
            std::env::set_var(key, value);
        }

        let result = GatehouseConfig::load(None);
        for (key, _) in vars {
            std::env::remove_var(key);
        }

        let config = assert_ok!(result);
        assert_eq!(config.rate_limiting.limit, 7);
        assert_eq!(config.rate_limiting.exempt_path_prefixes, vec!["/a", "/b"]);
        assert_eq!(config.rate_limiting.failure_mode, FailureMode::FailClosed);
        assert_eq!(config.rate_limiting.window_seconds, 60);
    }

    #[test]
    fn test_load_environment_overrides_file() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let path = std::env::temp_dir()
            .join(format!("gatehouse-layer-test-{}.yaml", std::process::id()));
        std::fs::write(&path, "rate_limiting:\n  limit: 3\n  window_seconds: 30\n").unwrap();
        std::env::set_var("GATEHOUSE__RATE_LIMITING__LIMIT", "9");

        let result = GatehouseConfig::load(Some(&path));
        std::env::remove_var("GATEHOUSE__RATE_LIMITING__LIMIT");
        std::fs::remove_file(&path).ok();

        let config = assert_ok!(result);
        assert_eq!(config.rate_limiting.limit, 9);
        assert_eq!(config.rate_limiting.window_seconds, 30);
    }
}
