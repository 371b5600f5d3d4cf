//! Webhook service configuration types.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

/// How `POST /deploy` runs a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookMode {
    /// Run both phases inside the request and answer with the result.
    Sync,
    /// Queue the deployment and answer immediately with its id.
    #[default]
    Async,
}

impl WebhookMode {
    /// Parse `sync` or `async`, case-insensitively.
    #[must_use]
    pub fn from_setting(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sync" => Some(Self::Sync),
            "async" | "queued" => Some(Self::Async),
            _ => None,
        }
    }
}

impl fmt::Display for WebhookMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sync => "sync",
            Self::Async => "async",
        })
    }
}

/// Configuration for the webhook service.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    /// Listen address (e.g., "0.0.0.0:9000").
    #[serde(default = "WebhookConfig::default_listen_addr")]
    pub listen_addr: String,

    /// Deployment mode.
    #[serde(default)]
    pub mode: WebhookMode,

    /// Allowed CORS origins.
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    #[serde(default = "WebhookConfig::default_max_body")]
    pub max_body_bytes: usize,

    /// Request timeout in seconds. Sync deployments run inside the request.
    #[serde(default = "WebhookConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl WebhookConfig {
    fn default_listen_addr() -> String {
        "0.0.0.0:9000".to_string()
    }

    const fn default_max_body() -> usize {
        64 * 1024
    }

    const fn default_request_timeout() -> u64 {
        3600
    }

    /// Get the request timeout as a `Duration`.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Load configuration from environment variables.
    ///
    /// Supported environment variables:
    /// - `PORT`: listen port on all interfaces (default 9000)
    /// - `WEBHOOK_MODE`: `sync` or `async`
    /// - `WEBHOOK_CORS_ORIGINS`: comma-separated allowed origins
    /// - `WEBHOOK_MAX_BODY_BYTES`: request body limit
    /// - `WEBHOOK_REQUEST_TIMEOUT_SECS`: request timeout
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("PORT") {
            if let Ok(port) = val.parse::<u16>() {
                config.listen_addr = format!("0.0.0.0:{port}");
            }
        }
        if let Ok(val) = std::env::var("WEBHOOK_MODE") {
            config.mode = WebhookMode::from_setting(&val).unwrap_or(config.mode);
        }
        if let Ok(val) = std::env::var("WEBHOOK_CORS_ORIGINS") {
            config.cors_origins = val
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(ToString::to_string)
                .collect();
        }
        if let Ok(val) = std::env::var("WEBHOOK_MAX_BODY_BYTES") {
            if let Ok(n) = val.parse() {
                config.max_body_bytes = n;
            }
        }
        if let Ok(val) = std::env::var("WEBHOOK_REQUEST_TIMEOUT_SECS") {
            if let Ok(n) = val.parse() {
                config.request_timeout_seconds = n;
            }
        }

        config
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            listen_addr: Self::default_listen_addr(),
            mode: WebhookMode::default(),
            cors_origins: vec!["*".to_string()],
            max_body_bytes: Self::default_max_body(),
            request_timeout_seconds: Self::default_request_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = WebhookConfig::default();
        assert_eq!(config.listen_addr, "0.0.0.0:9000");
        assert_eq!(config.mode, WebhookMode::Async);
        assert_eq!(config.request_timeout(), Duration::from_secs(3600));
    }

    #[test]
    fn mode_settings() {
        assert_eq!(WebhookMode::from_setting("SYNC"), Some(WebhookMode::Sync));
        assert_eq!(WebhookMode::from_setting(" async "), Some(WebhookMode::Async));
        assert_eq!(WebhookMode::from_setting("later"), None);
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: WebhookConfig = serde_json::from_str(r#"{"mode":"sync"}"#).unwrap();
        assert_eq!(config.mode, WebhookMode::Sync);
        assert_eq!(config.max_body_bytes, 64 * 1024);
        assert!(config.cors_origins.is_empty());
    }
}
