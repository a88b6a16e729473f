//! Client configuration.
//!
//! Provides a `ClientConfig` shared by every client to locate the detection
//! server and the directory where pulled images are stored.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::util::{is_http_url, normalize_text_option};
use crate::{Error, Result};

/// Environment variable overriding the server base URL.
pub const API_URL_ENV: &str = "SCANPEST_API_URL";
/// Environment variable overriding the media directory.
pub const MEDIA_DIR_ENV: &str = "SCANPEST_MEDIA_DIR";
/// Environment variable setting a request timeout in seconds.
pub const TIMEOUT_ENV: &str = "SCANPEST_REQUEST_TIMEOUT_SECS";

/// Runtime configuration for talking to the detection server.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Server base URL, e.g. `https://api.example.com/`
    #[serde(default)]
    pub api_base_url: Option<String>,
    /// Where images of pulled detections are written
    #[serde(default)]
    pub media_dir: Option<PathBuf>,
    /// Per-request timeout; transport defaults apply when unset
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl ClientConfig {
    /// Parse configuration from a JSON document.
    pub fn from_json(payload: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(payload)?;
        config.validated()
    }

    /// Apply `SCANPEST_*` environment overrides on top of this config.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = normalize_text_option(lookup(API_URL_ENV)) {
            self.api_base_url = Some(url);
        }
        if let Some(dir) = normalize_text_option(lookup(MEDIA_DIR_ENV)) {
            self.media_dir = Some(PathBuf::from(dir));
        }
        if let Some(secs) = normalize_text_option(lookup(TIMEOUT_ENV)) {
            match secs.parse() {
                Ok(secs) => self.request_timeout_secs = Some(secs),
                Err(_) => tracing::warn!("Ignoring invalid {TIMEOUT_ENV} value: {secs}"),
            }
        }
        self
    }

    /// Validate and normalize the configuration.
    pub fn validated(mut self) -> Result<Self> {
        self.api_base_url = match normalize_text_option(self.api_base_url) {
            Some(url) => Some(normalize_base_url(&url)?),
            None => None,
        };
        if self.request_timeout_secs == Some(0) {
            return Err(Error::InvalidInput(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(self)
    }

    /// The validated server base URL, required for any sync.
    pub fn require_api_base_url(&self) -> Result<String> {
        let url = normalize_text_option(self.api_base_url.clone()).ok_or_else(|| {
            Error::InvalidInput(format!(
                "server URL is not configured (set {API_URL_ENV} or a profile api_base_url)"
            ))
        })?;
        normalize_base_url(&url)
    }

    /// Request timeout as a `Duration`.
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

/// Normalize a server base URL: require http(s) and strip trailing slashes.
pub fn normalize_base_url(raw: &str) -> Result<String> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(Error::InvalidInput(
            "server URL must not be empty".to_string(),
        ));
    }
    if !is_http_url(value) {
        return Err(Error::InvalidInput(
            "server URL must include http:// or https://".to_string(),
        ));
    }
    Ok(value.trim_end_matches('/').to_string())
}
