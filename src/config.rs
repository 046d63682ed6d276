//! Tracker configuration parsed from environment variables.
//!
//! Every setting has a default; numeric values that fail to parse fall back
//! to the default as well. Only the canvas server URLs are validated, since a
//! tracker pointed at a malformed URL can never start.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::error::{ErrorCode, ErrorKind};
use crate::services::cooldown::CooldownParams;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_API_URL: &str = "https://pxls.space";
pub const DEFAULT_FEED_URL: &str = "wss://pxls.space/ws";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_RECONNECT_BACKOFF_MS: u64 = 1000;
pub const DEFAULT_PAUSE_QUEUE_CAPACITY: usize = 4096;
pub const DEFAULT_CANVAS_REFRESH_SECS: u64 = 60;
pub const DEFAULT_ARCHIVE_DIR: &str = "resources/canvases";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} is not a valid URL: {value}")]
    InvalidUrl { key: &'static str, value: String },
}

impl ErrorCode for ConfigError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidUrl { .. } => "E_CONFIG_URL",
        }
    }

    fn kind(&self) -> ErrorKind {
        ErrorKind::Fatal
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    pub port: u16,
    pub api_url: String,
    pub feed_url: String,
    /// Value of the `x-pxls-cfauth` header, when the feed sits behind an auth proxy.
    pub cfauth: Option<String>,
    pub http_timeout: Duration,
    pub reconnect_backoff: Duration,
    pub pause_queue_capacity: usize,
    /// How often `/info` is re-read to follow canvas resets.
    pub canvas_refresh: Duration,
    pub archive_dir: PathBuf,
    pub cooldown: CooldownParams,
}

impl TrackerConfig {
    /// Build config from the process environment.
    ///
    /// # Errors
    ///
    /// See [`TrackerConfig::from_lookup`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from any key lookup.
    ///
    /// Recognised keys: `PORT`, `PXLS_API_URL`, `PXLS_FEED_URL`, `PXLS_CFAUTH`,
    /// `HTTP_TIMEOUT_SECS`, `FEED_RECONNECT_BACKOFF_MS`,
    /// `FEED_PAUSE_QUEUE_CAPACITY`, `CANVAS_REFRESH_SECS`, `ARCHIVE_DIR`, and the `COOLDOWN_*`
    /// formula constants (`STEEPNESS`, `GLOBAL_OFFSET`, `USER_OFFSET`,
    /// `MULTIPLIER`, `STACK_MULTIPLIER`).
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidUrl`] when either canvas server URL is malformed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let parse = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = CooldownParams::default();

        let api_url = url_setting(parse("PXLS_API_URL"), "PXLS_API_URL", DEFAULT_API_URL)?;
        let feed_url = url_setting(parse("PXLS_FEED_URL"), "PXLS_FEED_URL", DEFAULT_FEED_URL)?;

        Ok(Self {
            port: parse_or(parse("PORT"), DEFAULT_PORT),
            api_url,
            feed_url,
            cfauth: parse("PXLS_CFAUTH"),
            http_timeout: Duration::from_secs(parse_or(parse("HTTP_TIMEOUT_SECS"), DEFAULT_HTTP_TIMEOUT_SECS)),
            reconnect_backoff: Duration::from_millis(parse_or(
                parse("FEED_RECONNECT_BACKOFF_MS"),
                DEFAULT_RECONNECT_BACKOFF_MS,
            )),
            pause_queue_capacity: parse_or(parse("FEED_PAUSE_QUEUE_CAPACITY"), DEFAULT_PAUSE_QUEUE_CAPACITY),
            canvas_refresh: Duration::from_secs(parse_or(parse("CANVAS_REFRESH_SECS"), DEFAULT_CANVAS_REFRESH_SECS).max(1)),
            archive_dir: parse("ARCHIVE_DIR").map_or_else(|| PathBuf::from(DEFAULT_ARCHIVE_DIR), PathBuf::from),
            cooldown: CooldownParams {
                steepness: parse_or(parse("COOLDOWN_STEEPNESS"), defaults.steepness),
                global_offset: parse_or(parse("COOLDOWN_GLOBAL_OFFSET"), defaults.global_offset),
                user_offset: parse_or(parse("COOLDOWN_USER_OFFSET"), defaults.user_offset),
                multiplier: parse_or(parse("COOLDOWN_MULTIPLIER"), defaults.multiplier),
                stack_multiplier: parse_or(parse("COOLDOWN_STACK_MULTIPLIER"), defaults.stack_multiplier),
            },
        })
    }
}

fn parse_or<T>(raw: Option<String>, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    raw.and_then(|v| v.trim().parse::<T>().ok()).unwrap_or(default)
}

fn url_setting(raw: Option<String>, key: &'static str, default: &str) -> Result<String, ConfigError> {
    let value = raw.unwrap_or_else(|| default.to_owned());
    Url::parse(value.trim()).map_err(|_| ConfigError::InvalidUrl { key, value: value.clone() })?;
    Ok(value.trim().trim_end_matches('/').to_owned())
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
