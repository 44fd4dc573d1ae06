//! # Chunkup Core Library
//!
//! `chunkup-core` implements a small protocol for uploading a batch of
//! files from a client to a server over one message-oriented connection
//! (a WebSocket in practice).
//!
//! ## Features
//!
//! - **Session negotiation**: a JSON init message carries the manifest
//!   and the end-of-file marker, the server answers `ready` or `reject`
//! - **Chunked transfer**: files are streamed as independent binary frames
//! - **Explicit framing**: optional one-byte frame tags remove the
//!   content/boundary ambiguity of the legacy marker
//! - **Progress**: the server reports cumulative bytes every threshold
//!
//! ## Modules
//!
//! - [`client`] - Upload control loop and the chunk sender task
//! - [`config`] - Configuration management
//! - [`mod@file`] - Manifests, chunk reading and writing, name checks
//! - [`progress`] - Progress threshold tracking and reporting hooks
//! - [`protocol`] - Control messages, server replies, frame classification
//! - [`server`] - Per-connection driver and the HTTP/WebSocket endpoint
//! - [`session`] - The server-side transfer state machine
//! - [`transport`] - Frame transport traits and adapters
//!
//! ## Example
//!
//! ```rust,ignore
//! use chunkup_core::client::UploadClient;
//! use chunkup_core::config::Config;
//!
//! let config = Config::load()?;
//! let client = UploadClient::new(config.client);
//! let summary = client.upload_to("ws://localhost:8080/upload", &paths, &mut ()).await?;
//! println!("Uploaded {} files", summary.files);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]

pub mod client;
pub mod config;
pub mod error;
pub mod file;
pub mod progress;
pub mod protocol;
pub mod server;
pub mod session;
pub mod transport;

pub use error::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default server port
pub const DEFAULT_PORT: u16 = 8080;

/// Default WebSocket route for uploads
pub const DEFAULT_UPLOAD_ROUTE: &str = "/upload";

/// Default chunk size for file content frames (8 KB)
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

/// Default progress notification threshold (1 MB)
pub const DEFAULT_PROGRESS_THRESHOLD: u64 = 1024 * 1024;

/// Default maximum WebSocket message size accepted by the server (1 MB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Default idle timeout while waiting for a server reply, in seconds
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;
