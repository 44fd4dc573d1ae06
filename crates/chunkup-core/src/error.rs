//! Error types for chunkup.
//!
//! This module provides a unified error type for all chunkup operations,
//! with specific variants for the protocol failure modes and a policy
//! helper ([`Error::is_fatal`]) used by the connection drivers.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// A specialized `Result` type for chunkup operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for chunkup.
#[derive(Error, Debug)]
pub enum Error {
    /// A control message is missing fields or cannot be parsed
    #[error("malformed control message: {0}")]
    MalformedMessage(String),

    /// The destination directory cannot be created
    #[error("destination '{}' unavailable: {source}", path.display())]
    DestinationUnavailable {
        /// Directory that could not be created
        path: PathBuf,
        /// Underlying I/O failure
        source: io::Error,
    },

    /// A client-supplied name would escape the destination directory
    #[error("invalid name '{0}': must be a single path component without '|'")]
    InvalidName(String),

    /// Two files in one upload would land on the same destination name
    #[error("file name '{0}' appears more than once in the upload")]
    DuplicateName(String),

    /// A frame arrived that the current state does not accept
    #[error("protocol violation in state {state}: {reason}")]
    ProtocolViolation {
        /// State the session was in
        state: &'static str,
        /// What was wrong with the frame
        reason: String,
    },

    /// The server refused the init message
    #[error("upload rejected by server")]
    Rejected,

    /// The server reported a failure with an `error|...` reply
    #[error("server reported an error: {0}")]
    ServerError(String),

    /// The peer sent a reply the client does not expect right now
    #[error("unexpected reply '{reply}' while {state}")]
    UnexpectedReply {
        /// Raw reply text
        reply: String,
        /// Client state description
        state: &'static str,
    },

    /// The connection closed before the upload completed
    #[error("connection closed before the upload completed")]
    ConnectionClosed,

    /// Transport-level failure (WebSocket, channel)
    #[error("transport error: {0}")]
    Transport(String),

    /// Nothing to upload
    #[error("no files to upload")]
    EmptyManifest,

    /// File not found
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Configuration file error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Invalid configuration value
    #[error("invalid configuration value for '{key}': {reason}")]
    InvalidConfig {
        /// Configuration key
        key: String,
        /// Reason for invalidity
        reason: String,
    },

    /// Operation timeout
    #[error("operation timed out after {0} seconds")]
    Timeout(u64),

    /// Internal error (should not happen)
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Creates a protocol violation for the given state.
    pub fn violation(state: &'static str, reason: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            state,
            reason: reason.into(),
        }
    }

    /// Returns whether the server driver must close the connection after
    /// this error.
    ///
    /// Violations are reported to the peer and the session keeps its
    /// state. Storage and transport failures leave the session in an
    /// unknown position and end the connection.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::ProtocolViolation { .. }
                | Self::MalformedMessage(_)
                | Self::InvalidName(_)
                | Self::DuplicateName(_)
                | Self::DestinationUnavailable { .. }
        )
    }

    /// Returns a helpful suggestion for resolving the error, if applicable.
    #[must_use]
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::Rejected => Some(
                "The server refused the upload. Check that the username and file names\n\
                 are plain names (no '/' or '..') and that the server can create its\n\
                 upload directory.",
            ),
            Self::ConnectionClosed | Self::Transport(_) => Some(
                "Check that the server is running and the URL ends with the upload\n\
                 route, e.g. ws://localhost:8080/upload",
            ),
            Self::ServerError(_) => Some(
                "Uploading to a server that predates tagged framing? Retry with:\n\
                   chunkup upload --framing boundary ...",
            ),
            Self::Timeout(_) => Some("Increase client.idle_timeout in the config file."),
            Self::DuplicateName(_) => Some(
                "Files are stored by name only. Rename one of them or upload them\n\
                 in separate runs.",
            ),
            _ => None,
        }
    }
}
