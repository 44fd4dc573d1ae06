//! Configuration management for chunkup.
//!
//! This module handles loading, saving, and validating chunkup
//! configuration. Command-line flags override values loaded here.
//!
//! ## Configuration File Locations
//!
//! | Platform | Path |
//! |----------|------|
//! | Linux | `~/.config/chunkup/config.toml` |
//! | macOS | `~/Library/Application Support/com.chunkup.Chunkup/config.toml` |
//! | Windows | `%APPDATA%\chunkup\Chunkup\config\config.toml` |
//!
//! ## Example
//!
//! ```toml
//! [server]
//! port = 8080
//! upload_root = "uploads"
//!
//! [client]
//! url = "ws://localhost:8080/upload"
//! framing = "tagged"
//! idle_timeout = "300s"
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::protocol::FramingMode;
use crate::session::SessionConfig;

/// Main configuration struct for chunkup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server settings
    pub server: ServerConfig,
    /// Client settings
    pub client: ClientConfig,
}

/// Server configuration options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// TCP port to listen on
    pub port: u16,
    /// Bind to 127.0.0.1 instead of all interfaces
    pub localhost_only: bool,
    /// Directory under which per-user destinations are created
    pub upload_root: PathBuf,
    /// HTTP path upgraded to WebSocket
    pub route: String,
    /// Bytes between progress replies
    pub progress_threshold: u64,
    /// Largest WebSocket message accepted, in bytes
    pub max_message_size: usize,
    /// Reject user and file names that are not a single path component
    pub strict_names: bool,
    /// Treat a declared-size mismatch as a protocol violation
    pub enforce_declared_sizes: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: crate::DEFAULT_PORT,
            localhost_only: false,
            upload_root: PathBuf::from("uploads"),
            route: crate::DEFAULT_UPLOAD_ROUTE.to_string(),
            progress_threshold: crate::DEFAULT_PROGRESS_THRESHOLD,
            max_message_size: crate::DEFAULT_MAX_MESSAGE_SIZE,
            strict_names: true,
            enforce_declared_sizes: false,
        }
    }
}

impl ServerConfig {
    /// Get the bind address for the server.
    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        if self.localhost_only {
            SocketAddr::from(([127, 0, 0, 1], self.port))
        } else {
            SocketAddr::from(([0, 0, 0, 0], self.port))
        }
    }

    /// Session settings derived from this configuration.
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            upload_root: self.upload_root.clone(),
            progress_threshold: self.progress_threshold,
            strict_names: self.strict_names,
            enforce_declared_sizes: self.enforce_declared_sizes,
        }
    }
}

/// Client configuration options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server URL, including the upload route
    pub url: String,
    /// Destination identity sent in the init message
    pub username: String,
    /// Token sent in the init message (random per session if unset)
    pub token: Option<String>,
    /// Content bytes per binary frame.
    ///
    /// Tagged framing adds one byte to every frame, so the frame a server
    /// sees is [`ClientConfig::frame_size`] bytes. Servers drop the
    /// connection when that exceeds their `max_message_size`
    /// (1 MiB by default).
    pub chunk_size: usize,
    /// Chunk framing requested from the server
    pub framing: FramingMode,
    /// Fixed boundary token (random per session if unset)
    pub boundary: Option<String>,
    /// How long to wait for the next server reply
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,
}

impl ClientConfig {
    /// Largest content frame this configuration puts on the wire.
    #[must_use]
    pub const fn frame_size(&self) -> usize {
        match self.framing {
            FramingMode::Tagged => self.chunk_size + 1,
            FramingMode::Boundary => self.chunk_size,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: format!(
                "ws://localhost:{}{}",
                crate::DEFAULT_PORT,
                crate::DEFAULT_UPLOAD_ROUTE
            ),
            username: default_username(),
            token: None,
            chunk_size: crate::DEFAULT_CHUNK_SIZE,
            framing: FramingMode::Tagged,
            boundary: None,
            idle_timeout: Duration::from_secs(crate::DEFAULT_IDLE_TIMEOUT_SECS),
        }
    }
}

fn default_username() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|h| crate::file::validate_name(h).is_ok())
        .unwrap_or_else(|| "anonymous".to_string())
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// If the configuration file doesn't exist, returns the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, falling back to defaults if it
    /// doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("Failed to read config: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be written.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be written.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::ConfigError(format!("Failed to create config directory: {e}"))
            })?;
        }

        std::fs::write(path, self.to_toml_string()?)
            .map_err(|e| Error::ConfigError(format!("Failed to write config: {e}")))
    }

    /// Render the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::ConfigError(format!("Failed to serialize config: {e}")))
    }

    /// Check values that would only fail later, mid-session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] naming the first bad key.
    pub fn validate(&self) -> Result<()> {
        let invalid = |key: &str, reason: &str| Error::InvalidConfig {
            key: key.to_string(),
            reason: reason.to_string(),
        };

        if !self.server.route.starts_with('/') {
            return Err(invalid("server.route", "must start with '/'"));
        }
        if self.server.progress_threshold == 0 {
            return Err(invalid("server.progress_threshold", "must be greater than zero"));
        }
        if self.server.max_message_size == 0 {
            return Err(invalid("server.max_message_size", "must be greater than zero"));
        }
        if self.client.chunk_size == 0 {
            return Err(invalid("client.chunk_size", "must be greater than zero"));
        }
        if !(self.client.url.starts_with("ws://") || self.client.url.starts_with("wss://")) {
            return Err(invalid("client.url", "must be a ws:// or wss:// URL"));
        }
        if self.client.username.is_empty() {
            return Err(invalid("client.username", "must not be empty"));
        }
        if self.client.boundary.as_deref() == Some("") {
            return Err(invalid("client.boundary", "must not be empty"));
        }
        if self.client.idle_timeout.is_zero() {
            return Err(invalid("client.idle_timeout", "must be greater than zero"));
        }
        if self.client.frame_size() > crate::DEFAULT_MAX_MESSAGE_SIZE {
            tracing::warn!(
                "client.chunk_size {} gives {}-byte frames, above the default server limit of {} bytes",
                self.client.chunk_size,
                self.client.frame_size(),
                crate::DEFAULT_MAX_MESSAGE_SIZE
            );
        }
        Ok(())
    }

    /// Get the default configuration directory path.
    #[must_use]
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "chunkup", "Chunkup")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the full path to the configuration file.
    #[must_use]
    pub fn config_path() -> PathBuf {
        Self::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("config.toml")
    }
}

mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}s", duration.as_secs()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.strip_suffix('s')
            .map(|secs| {
                secs.parse()
                    .map(Duration::from_secs)
                    .map_err(serde::de::Error::custom)
            })
            .or_else(|| {
                s.strip_suffix('m').map(|mins| {
                    mins.parse::<u64>()
                        .map(|m| Duration::from_secs(m * 60))
                        .map_err(serde::de::Error::custom)
                })
            })
            .unwrap_or_else(|| Err(serde::de::Error::custom("invalid duration format")))
    }
}
