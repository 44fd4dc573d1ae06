//! Client side of the upload protocol.
//!
//! The control loop owns the inbound half and the client state. It hands
//! work to a [`sender::ChunkSender`] task, which owns the outbound half:
//!
//! ```text
//!   control loop ──SendCommand──▶ sender task ──frames──▶ server
//!        ▲   ▲                        │
//!        │   └──────SenderEvent───────┘
//!        └──────────replies────────────────────────────── server
//! ```
//!
//! A file is queued only after the server's `next` for the previous one
//! arrives. After the last `next` the client sends `exit` and waits for
//! the server to close.

pub mod sender;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::file::Manifest;
use crate::progress::ProgressReporter;
use crate::protocol::boundary::random_token;
use crate::protocol::{BoundaryToken, ControlMessage, InitMessage, ServerReply};
use crate::transport::{CloseReason, Frame, FrameSink, FrameSource};

use sender::{ChunkSender, SendCommand, SenderEvent, SenderHandle};

/// Length of the generated session token.
const TOKEN_LENGTH: usize = 32;

/// Where the control loop is in the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Init sent, waiting for `ready`
    AwaitingReady,
    /// Streaming the file at `cursor`
    Uploading {
        /// Index of the file being sent
        cursor: usize,
    },
    /// Exit sent, waiting for the server to close
    Exiting,
}

impl ClientState {
    /// Description used in errors.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::AwaitingReady => "awaiting ready",
            Self::Uploading { .. } => "uploading",
            Self::Exiting => "exiting",
        }
    }
}

/// Outcome of a completed upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSummary {
    /// Identity the files were uploaded as
    pub username: String,
    /// Number of files uploaded
    pub files: usize,
    /// Content bytes sent
    pub bytes: u64,
    /// Wall-clock time from init to close
    pub elapsed: Duration,
}

/// Uploads batches of files.
#[derive(Debug, Clone)]
pub struct UploadClient {
    config: ClientConfig,
}

impl UploadClient {
    /// Create a client with the given configuration.
    #[must_use]
    pub const fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    /// Get the client configuration.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Connect to `url` and upload `paths`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails or the upload does not
    /// complete.
    #[cfg(feature = "ws")]
    pub async fn upload_to<R: ProgressReporter>(
        &self,
        url: &str,
        paths: &[PathBuf],
        reporter: &mut R,
    ) -> Result<UploadSummary> {
        let (sink, source) = crate::transport::ws::connect(url).await?;
        self.upload(sink, source, paths, reporter).await
    }

    /// Upload `paths` over an established connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Rejected`] if the server refuses the init,
    /// [`Error::ServerError`] on an `error|` reply, [`Error::Timeout`] if
    /// the server goes quiet, and transport or file errors otherwise. The
    /// connection is closed in every case.
    pub async fn upload<K, S, R>(
        &self,
        sink: K,
        mut source: S,
        paths: &[PathBuf],
        reporter: &mut R,
    ) -> Result<UploadSummary>
    where
        K: FrameSink + 'static,
        S: FrameSource,
        R: ProgressReporter,
    {
        if paths.is_empty() {
            return Err(Error::EmptyManifest);
        }
        let manifest = Manifest::from_paths(paths).await?;
        let boundary = match &self.config.boundary {
            Some(token) => BoundaryToken::parse(token)?,
            None => BoundaryToken::generate(),
        };
        let init = InitMessage {
            username: self.config.username.clone(),
            token: self
                .config
                .token
                .clone()
                .unwrap_or_else(|| random_token(TOKEN_LENGTH)),
            manifest: manifest.clone(),
            boundary: boundary.clone(),
            framing: self.config.framing,
        };

        tracing::info!(
            "Uploading {} file(s) as {} ({} framing)",
            manifest.len(),
            init.username,
            init.framing
        );

        let started = Instant::now();
        let mut sender = ChunkSender::new(
            sink,
            self.config.chunk_size,
            self.config.framing,
            boundary,
        )
        .spawn();

        let mut bytes = 0;
        let outcome = async {
            sender
                .send(SendCommand::Control(ControlMessage::Init(init)))
                .await?;
            self.drive(&mut sender, &mut source, &manifest, paths, reporter, &mut bytes)
                .await
        }
        .await;

        let reason = match &outcome {
            Ok(()) => CloseReason::normal("upload complete"),
            Err(e) => {
                tracing::warn!("Upload aborted: {}", e);
                CloseReason::going_away("upload aborted")
            }
        };
        for event in sender.finish(reason).await {
            if let SenderEvent::FileSent { bytes: sent, .. } = event {
                bytes += sent;
            }
        }
        outcome?;

        Ok(UploadSummary {
            username: self.config.username.clone(),
            files: manifest.len(),
            bytes,
            elapsed: started.elapsed(),
        })
    }

    async fn drive<S, R>(
        &self,
        sender: &mut SenderHandle,
        source: &mut S,
        manifest: &Manifest,
        paths: &[PathBuf],
        reporter: &mut R,
        bytes: &mut u64,
    ) -> Result<()>
    where
        S: FrameSource,
        R: ProgressReporter,
    {
        let idle_timeout = self.config.idle_timeout;
        let mut state = ClientState::AwaitingReady;

        loop {
            let frame = tokio::select! {
                event = sender.next_event() => {
                    match event {
                        Some(SenderEvent::FileSent { index, bytes: sent, chunks }) => {
                            tracing::debug!("File {} sent: {} bytes in {} frames", index, sent, chunks);
                            *bytes += sent;
                            continue;
                        }
                        Some(SenderEvent::Failed(e)) => return Err(e),
                        None => return Err(Error::Internal("sender task stopped".to_string())),
                    }
                }
                received = tokio::time::timeout(idle_timeout, source.recv()) => {
                    received.map_err(|_| Error::Timeout(idle_timeout.as_secs()))??
                }
            };

            let Some(frame) = frame else {
                return if state == ClientState::Exiting {
                    Ok(())
                } else {
                    Err(Error::ConnectionClosed)
                };
            };

            let text = match frame {
                Frame::Text(text) => text,
                Frame::Binary(data) => String::from_utf8(data).map_err(|_| {
                    Error::MalformedMessage("binary reply is not UTF-8".to_string())
                })?,
            };
            let reply = ServerReply::parse(&text)?;

            state = match (state, reply) {
                (_, ServerReply::Error(reason)) => return Err(Error::ServerError(reason)),
                (ClientState::AwaitingReady, ServerReply::Ready) => {
                    tracing::debug!("Server ready");
                    self.start_file(sender, manifest, paths, reporter, 0).await?
                }
                (ClientState::AwaitingReady, ServerReply::Reject) => return Err(Error::Rejected),
                (ClientState::Uploading { cursor }, ServerReply::Progress(uploaded)) => {
                    if let Some(entry) = manifest.get(cursor) {
                        reporter.progress(cursor, entry, uploaded);
                    }
                    state
                }
                (ClientState::Uploading { cursor }, ServerReply::Next) => {
                    if let Some(entry) = manifest.get(cursor) {
                        reporter.file_finished(cursor, entry);
                    }
                    self.start_file(sender, manifest, paths, reporter, cursor + 1)
                        .await?
                }
                (state, _) => {
                    return Err(Error::UnexpectedReply {
                        reply: text,
                        state: state.name(),
                    })
                }
            };
        }
    }

    async fn start_file<R: ProgressReporter>(
        &self,
        sender: &SenderHandle,
        manifest: &Manifest,
        paths: &[PathBuf],
        reporter: &mut R,
        index: usize,
    ) -> Result<ClientState> {
        match (manifest.get(index), paths.get(index)) {
            (Some(entry), Some(path)) => {
                reporter.file_started(index, entry);
                sender
                    .send(SendCommand::File {
                        index,
                        path: path.clone(),
                    })
                    .await?;
                Ok(ClientState::Uploading { cursor: index })
            }
            _ => {
                tracing::debug!("All files acknowledged, sending exit");
                sender.send(SendCommand::Control(ControlMessage::Exit)).await?;
                Ok(ClientState::Exiting)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory;
    use tempfile::TempDir;

    fn client(framing: crate::protocol::FramingMode) -> UploadClient {
        UploadClient::new(ClientConfig {
            username: "alice".to_string(),
            framing,
            boundary: Some("#END#".to_string()),
            idle_timeout: Duration::from_secs(5),
            ..ClientConfig::default()
        })
    }

    async fn expect_binary(source: &mut memory::MemorySource) -> Vec<u8> {
        match source.recv().await.unwrap() {
            Some(Frame::Binary(data)) => data,
            other => panic!("expected binary frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rejected_init() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"hello").unwrap();

        let (client_end, mut server) = memory::pair();
        let uploader = client(crate::protocol::FramingMode::Boundary);
        let task = tokio::spawn(async move {
            uploader
                .upload(client_end.sink, client_end.source, &[path], &mut ())
                .await
        });

        let init = expect_binary(&mut server.source).await;
        assert!(matches!(
            ControlMessage::decode(&init).unwrap(),
            ControlMessage::Init(_)
        ));
        server
            .sink
            .send(Frame::Text("reject".to_string()))
            .await
            .unwrap();

        assert!(matches!(task.await.unwrap(), Err(Error::Rejected)));
        assert_eq!(server.source.recv().await.unwrap(), None);
        assert_eq!(
            server.source.close_reason().unwrap().code,
            CloseReason::GOING_AWAY
        );
    }

    #[tokio::test]
    async fn test_waits_for_next_before_second_file() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        std::fs::write(&a, b"aa").unwrap();
        std::fs::write(&b, b"b").unwrap();

        let (client_end, mut server) = memory::pair();
        let uploader = client(crate::protocol::FramingMode::Boundary);
        let task = tokio::spawn(async move {
            uploader
                .upload(client_end.sink, client_end.source, &[a, b], &mut ())
                .await
        });

        expect_binary(&mut server.source).await;
        server.sink.send(Frame::Text("ready".into())).await.unwrap();

        assert_eq!(expect_binary(&mut server.source).await, b"aa");
        assert_eq!(expect_binary(&mut server.source).await, b"#END#");

        // Nothing more until the server acknowledges the file.
        let early = tokio::time::timeout(Duration::from_millis(50), server.source.recv()).await;
        assert!(early.is_err());

        server.sink.send(Frame::Text("next".into())).await.unwrap();
        assert_eq!(expect_binary(&mut server.source).await, b"b");
        assert_eq!(expect_binary(&mut server.source).await, b"#END#");

        server.sink.send(Frame::Text("next".into())).await.unwrap();
        assert_eq!(
            expect_binary(&mut server.source).await,
            br#"{"command":"exit"}"#
        );
        server
            .sink
            .close(CloseReason::normal("upload complete"))
            .await
            .unwrap();

        let summary = task.await.unwrap().unwrap();
        assert_eq!(summary.files, 2);
        assert_eq!(summary.bytes, 3);
        assert_eq!(summary.username, "alice");
    }

    #[tokio::test]
    async fn test_error_reply_aborts() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"x").unwrap();

        let (client_end, mut server) = memory::pair();
        let uploader = client(crate::protocol::FramingMode::Tagged);
        let task = tokio::spawn(async move {
            uploader
                .upload(client_end.sink, client_end.source, &[path], &mut ())
                .await
        });

        expect_binary(&mut server.source).await;
        server
            .sink
            .send(Frame::Text("error|disk full".into()))
            .await
            .unwrap();

        match task.await.unwrap() {
            Err(Error::ServerError(reason)) => assert_eq!(reason, "disk full"),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unexpected_reply() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"x").unwrap();

        let (client_end, mut server) = memory::pair();
        let uploader = client(crate::protocol::FramingMode::Tagged);
        let task = tokio::spawn(async move {
            uploader
                .upload(client_end.sink, client_end.source, &[path], &mut ())
                .await
        });

        expect_binary(&mut server.source).await;
        server.sink.send(Frame::Text("next".into())).await.unwrap();

        assert!(matches!(
            task.await.unwrap(),
            Err(Error::UnexpectedReply { state: "awaiting ready", .. })
        ));
    }

    #[tokio::test]
    async fn test_server_closing_early() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"x").unwrap();

        let (client_end, mut server) = memory::pair();
        let uploader = client(crate::protocol::FramingMode::Tagged);
        let task = tokio::spawn(async move {
            uploader
                .upload(client_end.sink, client_end.source, &[path], &mut ())
                .await
        });

        expect_binary(&mut server.source).await;
        server.sink.close(CloseReason::normal("bye")).await.unwrap();

        assert!(matches!(task.await.unwrap(), Err(Error::ConnectionClosed)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timeout() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"x").unwrap();

        let (client_end, _server) = memory::pair();
        let uploader = client(crate::protocol::FramingMode::Tagged);

        let result = uploader
            .upload(client_end.sink, client_end.source, &[path], &mut ())
            .await;
        assert!(matches!(result, Err(Error::Timeout(5))));
    }

    #[tokio::test]
    async fn test_empty_path_list() {
        let (client_end, _server) = memory::pair();
        let result = client(crate::protocol::FramingMode::Tagged)
            .upload(client_end.sink, client_end.source, &[], &mut ())
            .await;
        assert!(matches!(result, Err(Error::EmptyManifest)));
    }
}
