//! Server-side transfer state machine.
//!
//! One [`Session`] exists per connection and is driven by exactly one loop
//! (see [`crate::server::serve_connection`]). Each inbound frame is handled
//! to completion before the next one, so the state needs no locking.
//!
//! ```text
//!   Idle ──init/ready──▶ Uploading ──last end-of-file/next──▶ Finished
//!    ▲                                                          │
//!    └──────────────────────── any command/close ───────────────┘
//! ```
//!
//! [`Session::handle`] returns the replies and closes the driver must
//! perform, or an error. Errors for which [`Error::is_fatal`] is false
//! leave the state untouched.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::file::{validate_name, ChunkWriter, Manifest, ManifestEntry};
use crate::progress::ProgressTracker;
use crate::protocol::{
    decode_command, BoundaryToken, ChunkFrame, ControlMessage, FramingMode, InitMessage,
    ServerReply,
};
use crate::transport::{CloseReason, Frame};

/// Settings that shape a session's behaviour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Directory under which `<username>/` destinations are created
    pub upload_root: PathBuf,
    /// Bytes between `progress` replies
    pub progress_threshold: u64,
    /// Reject user and file names that are not a single path component
    pub strict_names: bool,
    /// Treat a size mismatch at end-of-file as a protocol violation
    pub enforce_declared_sizes: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            upload_root: PathBuf::from("uploads"),
            progress_threshold: crate::DEFAULT_PROGRESS_THRESHOLD,
            strict_names: true,
            enforce_declared_sizes: false,
        }
    }
}

/// Something the connection driver must do after a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Send a text reply
    Reply(ServerReply),
    /// Close the connection
    Close(CloseReason),
}

/// Counters for one connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Files whose end-of-file was received
    pub files_completed: usize,
    /// Content bytes written to disk
    pub bytes_written: u64,
}

/// The file batch currently being received.
#[derive(Debug)]
pub struct ActiveUpload {
    username: String,
    destination: PathBuf,
    manifest: Manifest,
    cursor: usize,
    boundary: BoundaryToken,
    framing: FramingMode,
    writer: ChunkWriter,
    progress: ProgressTracker,
}

impl ActiveUpload {
    /// Destination directory for this batch.
    #[must_use]
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Files in this batch.
    #[must_use]
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Index of the file being received.
    #[must_use]
    pub const fn cursor(&self) -> usize {
        self.cursor
    }

    /// Bytes written to the current file.
    #[must_use]
    pub const fn bytes_written(&self) -> u64 {
        self.writer.offset()
    }

    /// Negotiated chunk framing.
    #[must_use]
    pub const fn framing(&self) -> FramingMode {
        self.framing
    }

    fn current_entry(&self) -> Option<&ManifestEntry> {
        self.manifest.get(self.cursor)
    }
}

/// Summary kept after the last file of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedUpload {
    /// Destination directory of the batch
    pub destination: PathBuf,
    /// Number of files received
    pub files: usize,
    /// Sum of declared sizes
    pub declared_bytes: u64,
}

/// Per-connection protocol state.
#[derive(Debug, Default)]
pub enum UploadState {
    /// Waiting for `init`
    #[default]
    Idle,
    /// Receiving file content
    Uploading(ActiveUpload),
    /// All files received, waiting for `exit`
    Finished(FinishedUpload),
}

impl UploadState {
    /// Lower-case state name, used in logs and violations.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Uploading(_) => "uploading",
            Self::Finished(_) => "finished",
        }
    }
}

/// The server side of one connection.
#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    state: UploadState,
    stats: SessionStats,
}

impl Session {
    /// Create an idle session.
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            state: UploadState::Idle,
            stats: SessionStats::default(),
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> &UploadState {
        &self.state
    }

    /// Counters so far.
    #[must_use]
    pub const fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Drop any in-progress upload and return to idle.
    pub fn reset(&mut self) {
        self.state = UploadState::Idle;
    }

    /// Handle one inbound frame.
    ///
    /// # Errors
    ///
    /// Returns a protocol violation for frames the current state does not
    /// accept, and I/O errors from writing chunks or creating the next file.
    pub async fn handle(&mut self, frame: Frame) -> Result<Vec<Action>> {
        match self.state {
            UploadState::Idle => self.handle_idle(&frame).await,
            UploadState::Uploading(_) => self.handle_uploading(frame).await,
            UploadState::Finished(_) => self.handle_finished(&frame),
        }
    }

    async fn handle_idle(&mut self, frame: &Frame) -> Result<Vec<Action>> {
        match self.start(frame.payload()).await {
            Ok(upload) => {
                tracing::info!(
                    "Receiving {} file(s) into {}",
                    upload.manifest.len(),
                    upload.destination.display()
                );
                self.state = UploadState::Uploading(upload);
                Ok(vec![Action::Reply(ServerReply::Ready)])
            }
            Err(e) if !e.is_fatal() => {
                tracing::warn!("Rejecting init: {}", e);
                Ok(vec![Action::Reply(ServerReply::Reject)])
            }
            Err(e) => Err(e),
        }
    }

    async fn start(&self, payload: &[u8]) -> Result<ActiveUpload> {
        let InitMessage {
            username,
            token: _,
            manifest,
            boundary,
            framing,
        } = match ControlMessage::decode(payload)? {
            ControlMessage::Init(init) => init,
            other => {
                return Err(Error::violation(
                    "idle",
                    format!("expected init, got '{}'", other.command()),
                ));
            }
        };

        let Some(first) = manifest.get(0) else {
            return Err(Error::MalformedMessage("file list is empty".to_string()));
        };

        manifest.check_unique_names()?;

        if self.config.strict_names {
            validate_name(&username)?;
            for entry in manifest.entries() {
                validate_name(&entry.name)?;
            }
        } else {
            tracing::warn!(
                "Name checks are disabled; '{}' and its file names are used verbatim",
                username
            );
        }

        let destination = self.config.upload_root.join(&username);
        tokio::fs::create_dir_all(&destination)
            .await
            .map_err(|source| Error::DestinationUnavailable {
                path: destination.clone(),
                source,
            })?;

        let path = destination.join(&first.name);
        let writer = ChunkWriter::create(path.clone())
            .await
            .map_err(|e| match e {
                Error::Io(source) => Error::DestinationUnavailable { path, source },
                other => other,
            })?;
        tracing::debug!("Framing: {}, boundary: {}", framing, boundary);

        Ok(ActiveUpload {
            username,
            destination,
            manifest,
            cursor: 0,
            boundary,
            framing,
            writer,
            progress: ProgressTracker::new(self.config.progress_threshold),
        })
    }

    async fn handle_uploading(&mut self, frame: Frame) -> Result<Vec<Action>> {
        let UploadState::Uploading(upload) = &mut self.state else {
            return Err(Error::Internal("not uploading".to_string()));
        };

        let data = match frame {
            Frame::Binary(data) => data,
            Frame::Text(text) => {
                return Err(Error::violation(
                    "uploading",
                    format!("unexpected text frame ({} bytes)", text.len()),
                ));
            }
        };

        match upload.framing.classify(&data, &upload.boundary)? {
            ChunkFrame::Data(chunk) => {
                let offset = upload.writer.write(chunk).await?;
                self.stats.bytes_written += chunk.len() as u64;
                Ok(upload
                    .progress
                    .record(offset)
                    .map(|offset| Action::Reply(ServerReply::Progress(offset)))
                    .into_iter()
                    .collect())
            }
            ChunkFrame::EndOfFile => {
                let written = upload.writer.offset();
                let (name, declared) = upload
                    .current_entry()
                    .map(|e| (e.name.clone(), e.size))
                    .ok_or_else(|| Error::Internal("cursor past end of manifest".to_string()))?;

                if written != declared {
                    if self.config.enforce_declared_sizes {
                        return Err(Error::violation(
                            "uploading",
                            format!("'{name}' declared {declared} bytes but {written} were sent"),
                        ));
                    }
                    tracing::warn!(
                        "'{}' declared {} bytes but {} were received",
                        name,
                        declared,
                        written
                    );
                }

                tracing::info!("Received {} ({} bytes)", name, written);
                self.stats.files_completed += 1;
                upload.cursor += 1;
                upload.progress.reset();

                if let Some(next) = upload.current_entry() {
                    let path = upload.destination.join(&next.name);
                    upload.writer = ChunkWriter::create(path).await?;
                } else {
                    tracing::info!(
                        "All {} file(s) from {} received",
                        upload.manifest.len(),
                        upload.username
                    );
                    let finished = FinishedUpload {
                        destination: upload.destination.clone(),
                        files: upload.manifest.len(),
                        declared_bytes: upload.manifest.total_size(),
                    };
                    self.state = UploadState::Finished(finished);
                }
                Ok(vec![Action::Reply(ServerReply::Next)])
            }
        }
    }

    fn handle_finished(&mut self, frame: &Frame) -> Result<Vec<Action>> {
        let command = decode_command(frame.payload()).map_err(|e| {
            Error::violation("finished", format!("expected a control message: {e}"))
        })?;

        if command == "exit" {
            tracing::info!("Client finished the session");
        } else {
            tracing::info!("Closing after '{}' command", command);
        }
        self.state = UploadState::Idle;
        Ok(vec![Action::Close(CloseReason::normal("upload complete"))])
    }
}
