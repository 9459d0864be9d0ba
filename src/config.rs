//! Client configuration parsed from environment variables.
//!
//! Every value has a default so an empty environment yields a client that
//! talks to a local development API.

use std::time::Duration;

pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8000/api";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_CHAT_POLL_MS: u64 = 5_000;
pub const DEFAULT_BADGE_POLL_MS: u64 = 30_000;

/// Errors produced while building a [`ClientConfig`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid API base URL '{0}' (expected http:// or https://)")]
    InvalidBaseUrl(String),
    #[error("{var} must be greater than zero")]
    ZeroDuration { var: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request: Duration,
    pub connect: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollIntervals {
    /// Active chat feed refresh.
    pub chat: Duration,
    /// Background unread-notification badge refresh.
    pub badge: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub timeouts: HttpTimeouts,
    /// Upper bound on a single capability probe before the gate fails closed.
    pub probe_timeout: Duration,
    pub poll: PollIntervals,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_owned(),
            timeouts: HttpTimeouts {
                request: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
                connect: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            },
            probe_timeout: Duration::from_millis(DEFAULT_PROBE_TIMEOUT_MS),
            poll: PollIntervals {
                chat: Duration::from_millis(DEFAULT_CHAT_POLL_MS),
                badge: Duration::from_millis(DEFAULT_BADGE_POLL_MS),
            },
        }
    }
}

impl ClientConfig {
    /// Build typed client config from environment variables.
    ///
    /// Optional:
    /// - `UNIHUB_API_BASE_URL`: default `http://127.0.0.1:8000/api`
    /// - `UNIHUB_REQUEST_TIMEOUT_SECS`: default 30
    /// - `UNIHUB_CONNECT_TIMEOUT_SECS`: default 10
    /// - `UNIHUB_PROBE_TIMEOUT_MS`: default 10000
    /// - `UNIHUB_CHAT_POLL_MS`: default 5000
    /// - `UNIHUB_BADGE_POLL_MS`: default 30000
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is not http(s) or a poll interval is zero.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base = std::env::var("UNIHUB_API_BASE_URL").unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_owned());
        let config = Self {
            api_base_url: normalize_base_url(&base)?,
            timeouts: HttpTimeouts {
                request: Duration::from_secs(env_parse("UNIHUB_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)),
                connect: Duration::from_secs(env_parse("UNIHUB_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS)),
            },
            probe_timeout: Duration::from_millis(env_parse("UNIHUB_PROBE_TIMEOUT_MS", DEFAULT_PROBE_TIMEOUT_MS)),
            poll: PollIntervals {
                chat: Duration::from_millis(env_parse("UNIHUB_CHAT_POLL_MS", DEFAULT_CHAT_POLL_MS)),
                badge: Duration::from_millis(env_parse("UNIHUB_BADGE_POLL_MS", DEFAULT_BADGE_POLL_MS)),
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Replace the API base URL, normalizing the trailing slash.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is not http(s).
    pub fn with_base_url(mut self, raw: &str) -> Result<Self, ConfigError> {
        self.api_base_url = normalize_base_url(raw)?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.poll.chat.is_zero() {
            return Err(ConfigError::ZeroDuration { var: "UNIHUB_CHAT_POLL_MS" });
        }
        if self.poll.badge.is_zero() {
            return Err(ConfigError::ZeroDuration { var: "UNIHUB_BADGE_POLL_MS" });
        }
        Ok(())
    }
}

pub(crate) fn normalize_base_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(ConfigError::InvalidBaseUrl(raw.to_owned()));
    }
    Ok(trimmed.to_owned())
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
