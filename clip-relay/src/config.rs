//! Configuration loading for clipsync-relay.
//!
//! Configuration is loaded from a TOML file (default: `relay.toml`), then a
//! small set of `CLIPSYNC_*` environment variables may override it.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable overriding `limits.rate_per_second`.
pub const ENV_RATE: &str = "CLIPSYNC_RATE_LPS";
/// Environment variable overriding `limits.dedupe_capacity`.
pub const ENV_DEDUPE: &str = "CLIPSYNC_DEDUPE";
/// Environment variable switching auth to signed mode with the given secret.
pub const ENV_HMAC_SECRET: &str = "CLIPSYNC_HMAC_SECRET";

/// Root configuration for clipsync-relay.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Clip admission limits.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Authentication configuration.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Per-connection session timing.
    #[serde(default)]
    pub session: SessionConfig,
    /// Fan-out timing.
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    /// Blob store configuration.
    #[serde(default)]
    pub uploads: UploadsConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the HTTP/WebSocket listener (default: 0.0.0.0:8080).
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Upper bound for closing every session on shutdown (default: 5000 ms).
    #[serde(default = "default_shutdown_deadline_ms")]
    pub shutdown_deadline_ms: u64,
}

/// Clip admission limits.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Largest clip carried inline in a frame (default: 64 KiB).
    #[serde(default = "default_max_inline_bytes")]
    pub max_inline_bytes: usize,
    /// Clips per second per device; zero or negative disables limiting (default: 0).
    #[serde(default)]
    pub rate_per_second: i64,
    /// Message ids remembered per user for duplicate suppression; 0 disables (default: 128).
    #[serde(default = "default_dedupe_capacity")]
    pub dedupe_capacity: usize,
    /// Longest accepted device id (default: 64).
    #[serde(default = "default_max_device_id_len")]
    pub max_device_id_len: usize,
}

/// How hello tokens are checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Any non-empty token is accepted and used as the user id.
    #[default]
    Static,
    /// `user:expiry:hexmac` tokens signed with `auth.secret`.
    Signed,
}

/// Authentication configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// Token checking mode (default: static).
    #[serde(default)]
    pub mode: AuthMode,
    /// HMAC secret for signed mode.
    #[serde(default)]
    pub secret: String,
}

/// Per-connection session timing.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Timeout in seconds for receiving HELLO after connection (default: 10).
    #[serde(default = "default_hello_timeout_secs")]
    pub hello_timeout_secs: u64,
    /// Inactivity after which a connection is closed (default: 20).
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
    /// Interval between server keep-alive pings (default: 10).
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
}

/// Fan-out timing.
#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastConfig {
    /// One-shot wait before re-checking when a user has no other device online (default: 50).
    #[serde(default = "default_grace_ms")]
    pub grace_ms: u64,
    /// Per-target write timeout (default: 1000).
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

/// Blob store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadsConfig {
    /// Directory holding uploaded blobs (default: ./uploads).
    #[serde(default = "default_uploads_dir")]
    pub dir: PathBuf,
    /// Largest accepted upload body (default: 50 MiB).
    #[serde(default = "default_max_upload_bytes")]
    pub max_bytes: usize,
    /// Accepted upload content types; `type/*` wildcards allowed, empty accepts all.
    #[serde(default)]
    pub allowed_mimes: Vec<String>,
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_shutdown_deadline_ms() -> u64 {
    5000
}

fn default_max_inline_bytes() -> usize {
    clip_types::MAX_INLINE_BYTES
}

fn default_dedupe_capacity() -> usize {
    128
}

fn default_max_device_id_len() -> usize {
    clip_types::MAX_DEVICE_ID_LEN
}

fn default_hello_timeout_secs() -> u64 {
    10
}

fn default_read_timeout_secs() -> u64 {
    20
}

fn default_ping_interval_secs() -> u64 {
    10
}

fn default_grace_ms() -> u64 {
    50
}

fn default_write_timeout_ms() -> u64 {
    1000
}

fn default_uploads_dir() -> PathBuf {
    PathBuf::from("./uploads")
}

fn default_max_upload_bytes() -> usize {
    50 * 1024 * 1024 // 50 MiB
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            shutdown_deadline_ms: default_shutdown_deadline_ms(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_inline_bytes: default_max_inline_bytes(),
            rate_per_second: 0,
            dedupe_capacity: default_dedupe_capacity(),
            max_device_id_len: default_max_device_id_len(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            hello_timeout_secs: default_hello_timeout_secs(),
            read_timeout_secs: default_read_timeout_secs(),
            ping_interval_secs: default_ping_interval_secs(),
        }
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            grace_ms: default_grace_ms(),
            write_timeout_ms: default_write_timeout_ms(),
        }
    }
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            dir: default_uploads_dir(),
            max_bytes: default_max_upload_bytes(),
            allowed_mimes: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Shutdown deadline as a duration.
    pub fn shutdown_deadline(&self) -> Duration {
        Duration::from_millis(self.shutdown_deadline_ms)
    }
}

impl SessionConfig {
    /// HELLO timeout as a duration.
    pub fn hello_timeout(&self) -> Duration {
        Duration::from_secs(self.hello_timeout_secs)
    }

    /// Per-read inactivity timeout as a duration.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    /// Keep-alive interval as a duration.
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }
}

impl BroadcastConfig {
    /// Grace wait as a duration.
    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }

    /// Per-target write timeout as a duration.
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Apply `CLIPSYNC_*` overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|name| std::env::var(name).ok());
    }

    /// Apply overrides using `lookup` to resolve variable names.
    ///
    /// Unset, empty or unparsable numeric values leave the setting untouched.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(rate) = lookup(ENV_RATE).and_then(|v| v.trim().parse::<i64>().ok()) {
            self.limits.rate_per_second = rate;
        }
        if let Some(capacity) = lookup(ENV_DEDUPE).and_then(|v| v.trim().parse::<usize>().ok()) {
            self.limits.dedupe_capacity = capacity;
        }
        if let Some(secret) = lookup(ENV_HMAC_SECRET).filter(|s| !s.is_empty()) {
            self.auth.mode = AuthMode::Signed;
            self.auth.secret = secret;
        }
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the configuration cannot be served.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.mode == AuthMode::Signed && self.auth.secret.is_empty() {
            return Err(ConfigError::Invalid {
                reason: "auth.mode = \"signed\" requires a non-empty auth.secret".to_string(),
            });
        }
        if self.limits.max_device_id_len == 0 {
            return Err(ConfigError::Invalid {
                reason: "limits.max_device_id_len must be > 0".to_string(),
            });
        }
        if self.session.hello_timeout_secs == 0
            || self.session.read_timeout_secs == 0
            || self.session.ping_interval_secs == 0
        {
            return Err(ConfigError::Invalid {
                reason: "session timeouts and ping interval must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// Configuration values are inconsistent.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// What is wrong.
        reason: String,
    },
}
