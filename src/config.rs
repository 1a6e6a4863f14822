//! Client configuration
//!
//! Connection parameters for both halves of the connectivity core: the
//! REST base URL and per-request timeout for the HTTP pipeline, and the
//! websocket path, heartbeat interval and reconnect policy for the
//! realtime channel.

use std::time::Duration;

use thiserror::Error;

/// Default server URL
const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080";

/// Environment variable that overrides the base URL
const BASE_URL_ENV: &str = "GONGGU_API_URL";

/// Default websocket endpoint path
const DEFAULT_WS_PATH: &str = "/ws-chat";

/// Default heartbeat interval (both directions)
const DEFAULT_HEARTBEAT_MS: u64 = 4000;

/// Default cap on automatic reconnect attempts
const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Default base delay before the first reconnect attempt; the delay for
/// attempt n is `base * n`.
const DEFAULT_RECONNECT_BASE_DELAY_MS: u64 = 500;

/// Default per-request HTTP timeout
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct Config {
    base_url: String,
    ws_path: String,
    heartbeat_interval: Duration,
    max_reconnect_attempts: u32,
    reconnect_base_delay: Duration,
    http_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            ws_path: DEFAULT_WS_PATH.to_string(),
            heartbeat_interval: Duration::from_millis(DEFAULT_HEARTBEAT_MS),
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            reconnect_base_delay: Duration::from_millis(DEFAULT_RECONNECT_BASE_DELAY_MS),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }
}

impl Config {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration with defaults, letting the `GONGGU_API_URL`
    /// environment variable override the base URL.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            if !url.is_empty() {
                config.base_url = url;
            }
        }
        config
    }

    /// Create a new ConfigBuilder.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Get the full URL for an API endpoint.
    pub fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Get the websocket URL for the chat endpoint (scheme swapped to ws/wss).
    pub fn ws_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            base.to_string()
        };
        format!("{}{}", base, self.ws_path)
    }

    /// Server base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Heartbeat interval for the realtime channel (both directions).
    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    /// Cap on automatic reconnect attempts.
    pub fn max_reconnect_attempts(&self) -> u32 {
        self.max_reconnect_attempts
    }

    /// Base delay before reconnect attempt 1; attempt n waits `base * n`.
    pub fn reconnect_base_delay(&self) -> Duration {
        self.reconnect_base_delay
    }

    /// Per-request HTTP timeout.
    pub fn http_timeout(&self) -> Duration {
        self.http_timeout
    }
}

/// Builder for [`Config`].
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    base_url: Option<String>,
    ws_path: Option<String>,
    heartbeat_interval: Option<Duration>,
    max_reconnect_attempts: Option<u32>,
    reconnect_base_delay: Option<Duration>,
    http_timeout: Option<Duration>,
}

impl ConfigBuilder {
    /// Set the server base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the websocket endpoint path.
    pub fn ws_path(mut self, path: impl Into<String>) -> Self {
        self.ws_path = Some(path.into());
        self
    }

    /// Set the heartbeat interval.
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = Some(interval);
        self
    }

    /// Set the reconnect attempt cap.
    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = Some(attempts);
        self
    }

    /// Set the base reconnect delay.
    pub fn reconnect_base_delay(mut self, delay: Duration) -> Self {
        self.reconnect_base_delay = Some(delay);
        self
    }

    /// Set the per-request HTTP timeout.
    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = Some(timeout);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Result<Config, ConfigError> {
        let defaults = Config::default();
        let base_url = self.base_url.unwrap_or(defaults.base_url);
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::InvalidUrl(base_url));
        }
        Ok(Config {
            base_url,
            ws_path: self.ws_path.unwrap_or(defaults.ws_path),
            heartbeat_interval: self.heartbeat_interval.unwrap_or(defaults.heartbeat_interval),
            max_reconnect_attempts: self
                .max_reconnect_attempts
                .unwrap_or(defaults.max_reconnect_attempts),
            reconnect_base_delay: self
                .reconnect_base_delay
                .unwrap_or(defaults.reconnect_base_delay),
            http_timeout: self.http_timeout.unwrap_or(defaults.http_timeout),
        })
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid base URL: {0}")]
    InvalidUrl(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::new();
        assert_eq!(config.base_url(), "http://127.0.0.1:8080");
        assert_eq!(config.max_reconnect_attempts(), 5);
        assert_eq!(config.heartbeat_interval(), Duration::from_millis(4000));
    }

    #[test]
    fn test_api_url() {
        let config = Config::new();
        assert_eq!(
            config.api_url("/api/v1/user/public/login"),
            "http://127.0.0.1:8080/api/v1/user/public/login"
        );
    }

    #[test]
    fn test_api_url_trims_trailing_slash() {
        let config = Config::builder()
            .base_url("http://example.com/")
            .build()
            .unwrap();
        assert_eq!(config.api_url("/x"), "http://example.com/x");
    }

    #[test]
    fn test_ws_url_scheme_swap() {
        let config = Config::builder()
            .base_url("https://market.example.com")
            .build()
            .unwrap();
        assert_eq!(config.ws_url(), "wss://market.example.com/ws-chat");

        let config = Config::new();
        assert_eq!(config.ws_url(), "ws://127.0.0.1:8080/ws-chat");
    }

    #[test]
    fn test_builder_rejects_bad_scheme() {
        let result = Config::builder().base_url("ftp://nope").build();
        assert!(matches!(result, Err(ConfigError::InvalidUrl(_))));
    }
}
