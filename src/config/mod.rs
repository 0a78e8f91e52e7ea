use std::env;
use std::time::Duration;

use crate::error::{ClientError, Result};
use crate::realtime::ReconnectPolicy;

pub const DEFAULT_API_URL: &str = "http://localhost:5000/api";
pub const DEFAULT_REALTIME_PATH: &str = "/ws";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,
    pub realtime: RealtimeConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL of the REST API, including its `/api` segment
    pub base_url: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// REST base with the trailing `/api` segment stripped
    pub base_url: String,
    pub path: String,
    pub reconnect: ReconnectPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub default_level: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let api_url = env::var("CLASSROOM_API_URL")
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        Self::from_api_url(api_url)
    }

    /// Builds a configuration around an explicit API base URL, reading the
    /// remaining settings from the environment.
    pub fn from_api_url(api_url: impl Into<String>) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();

        let request_timeout_secs = env::var("CLASSROOM_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);

        let default_policy = ReconnectPolicy::default();
        let reconnect = ReconnectPolicy {
            max_retries: env::var("CLASSROOM_RECONNECT_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_policy.max_retries),
            base_delay: env::var("CLASSROOM_RECONNECT_BASE_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(default_policy.base_delay),
            max_delay: env::var("CLASSROOM_RECONNECT_MAX_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(default_policy.max_delay),
        };

        let format = match env::var("LOG_FORMAT").map(|v| v.to_lowercase()) {
            Ok(v) if v == "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Self {
            realtime: RealtimeConfig {
                base_url: derive_realtime_url(&api_url),
                path: env::var("CLASSROOM_REALTIME_PATH")
                    .unwrap_or_else(|_| DEFAULT_REALTIME_PATH.to_string()),
                reconnect,
            },
            api: ApiConfig {
                base_url: api_url,
                request_timeout_secs,
            },
            logging: LoggingConfig {
                format,
                default_level: "info".to_string(),
            },
        }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl RealtimeConfig {
    /// WebSocket endpoint: the realtime base with its scheme mapped to
    /// ws/wss and the socket path appended.
    pub fn websocket_url(&self) -> Result<String> {
        let base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else if self.base_url.starts_with("ws://") || self.base_url.starts_with("wss://") {
            self.base_url.clone()
        } else {
            return Err(ClientError::InvalidUrl(format!(
                "unsupported scheme in realtime URL: {}",
                self.base_url
            )));
        };

        let path = self.path.trim_start_matches('/');
        if path.is_empty() {
            Ok(base)
        } else {
            Ok(format!("{}/{}", base.trim_end_matches('/'), path))
        }
    }
}

/// Strips a trailing `/api` path segment from the REST base URL.
pub fn derive_realtime_url(api_url: &str) -> String {
    let trimmed = api_url.trim_end_matches('/');
    match trimmed.strip_suffix("/api") {
        Some(base) if !base.ends_with(':') && !base.ends_with('/') => base.to_string(),
        _ => trimmed.to_string(),
    }
}
