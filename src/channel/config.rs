//! Channel configuration

use crate::error::{Result, StreamifyError};
use crate::pipe::DEFAULT_BUFFER_SIZE;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default connect timeout (30 seconds)
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default read timeout (1 hour)
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 60 * 60;

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_read_timeout() -> u64 {
    DEFAULT_READ_TIMEOUT_SECS
}

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

/// Configuration of a WebDAV upload channel
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ChannelConfig {
    /// Base URL every identifier is resolved against
    pub base_url: String,

    /// Basic authentication user; no header is sent when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Basic authentication password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Connect timeout in seconds (default: 30)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Longest time without upload progress or response, in seconds (default: 3600)
    ///
    /// Time spent waiting on the writer does not count.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,

    /// Pipe capacity for requests that do not set one (default: 1 MiB)
    #[serde(default = "default_buffer_size")]
    pub default_buffer_size: usize,
}

impl std::fmt::Debug for ChannelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelConfig")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("read_timeout_secs", &self.read_timeout_secs)
            .field("default_buffer_size", &self.default_buffer_size)
            .finish()
    }
}

impl ChannelConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            username: None,
            password: None,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            read_timeout_secs: DEFAULT_READ_TIMEOUT_SECS,
            default_buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    /// Set basic authentication credentials
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn connect_timeout_secs(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }

    pub fn read_timeout_secs(mut self, secs: u64) -> Self {
        self.read_timeout_secs = secs;
        self
    }

    pub fn default_buffer_size(mut self, size: usize) -> Self {
        self.default_buffer_size = size;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    /// Whether a basic authentication header should be sent
    pub fn has_credentials(&self) -> bool {
        self.username.as_deref().is_some_and(|u| !u.is_empty())
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_url.is_empty() {
            return Err(StreamifyError::config_error("Missing base URL!"));
        }

        let url = Url::parse(&self.base_url)
            .map_err(|e| StreamifyError::config_error(format!("Invalid base URL '{}': {}", self.base_url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(StreamifyError::config_error(format!(
                "Unsupported scheme '{}' in base URL",
                url.scheme()
            )));
        }

        if self.has_credentials() && self.password.as_deref().unwrap_or("").is_empty() {
            return Err(StreamifyError::invalid_parameter(
                "password",
                "Missing password!",
            ));
        }

        if self.connect_timeout_secs == 0 {
            return Err(StreamifyError::invalid_parameter(
                "connect_timeout_secs",
                "Connect timeout must be greater than 0",
            ));
        }

        if self.read_timeout_secs == 0 {
            return Err(StreamifyError::invalid_parameter(
                "read_timeout_secs",
                "Read timeout must be greater than 0",
            ));
        }

        if self.default_buffer_size == 0 {
            return Err(StreamifyError::invalid_parameter(
                "default_buffer_size",
                "Buffer size must be greater than 0",
            ));
        }

        Ok(())
    }

    /// Convert the configuration to a JSON string
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(StreamifyError::from)
    }

    /// Create a configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(StreamifyError::from)
    }

    /// Read a configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}
