//! Chunk sender task.
//!
//! The sender owns the outbound half of the connection. The control loop
//! talks to it only through [`SendCommand`]s and hears back through
//! [`SenderEvent`]s, so the two never share mutable state.
//!
//! Every frame send is awaited before the next slice is read, which keeps
//! at most one chunk in flight.

use std::path::{Path, PathBuf};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::file::ChunkReader;
use crate::protocol::{BoundaryToken, ControlMessage, FramingMode};
use crate::transport::{CloseReason, Frame, FrameSink};

/// Commands queued per direction.
const COMMAND_CAPACITY: usize = 16;

/// Work for the sender task, processed in order.
#[derive(Debug)]
pub enum SendCommand {
    /// Send a control message as a binary JSON frame
    Control(ControlMessage),
    /// Stream a file followed by its end-of-file frame
    File {
        /// Position in the manifest
        index: usize,
        /// Local file to read
        path: PathBuf,
    },
    /// Close the connection and stop
    Close(CloseReason),
}

/// Reports from the sender task.
#[derive(Debug)]
pub enum SenderEvent {
    /// A file and its end-of-file frame were handed to the transport
    FileSent {
        /// Position in the manifest
        index: usize,
        /// Content bytes sent
        bytes: u64,
        /// Content frames sent
        chunks: u64,
    },
    /// Sending failed; the task has stopped
    Failed(Error),
}

/// Result of streaming one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentFile {
    /// Content bytes sent
    pub bytes: u64,
    /// Content frames sent
    pub chunks: u64,
}

/// Stream `path` as content frames, then one end-of-file frame.
///
/// A zero-length file produces only the end-of-file frame.
///
/// # Errors
///
/// Returns an error if the file cannot be read or a frame cannot be sent.
pub async fn send_file<K: FrameSink>(
    sink: &mut K,
    path: &Path,
    chunk_size: usize,
    framing: FramingMode,
    boundary: &BoundaryToken,
) -> Result<SentFile> {
    let mut reader = ChunkReader::open(path, chunk_size).await?;
    let mut chunks = 0;

    while let Some(chunk) = reader.next_chunk().await? {
        sink.send(Frame::Binary(framing.encode_data(&chunk))).await?;
        chunks += 1;
    }
    sink.send(Frame::Binary(framing.encode_end_of_file(boundary)))
        .await?;

    Ok(SentFile {
        bytes: reader.bytes_read(),
        chunks,
    })
}

/// Owns the outbound half and executes [`SendCommand`]s.
#[derive(Debug)]
pub struct ChunkSender<K> {
    sink: K,
    chunk_size: usize,
    framing: FramingMode,
    boundary: BoundaryToken,
}

impl<K: FrameSink + 'static> ChunkSender<K> {
    /// Create a sender for one session.
    pub fn new(sink: K, chunk_size: usize, framing: FramingMode, boundary: BoundaryToken) -> Self {
        Self {
            sink,
            chunk_size,
            framing,
            boundary,
        }
    }

    /// Start the sender task.
    #[must_use]
    pub fn spawn(self) -> SenderHandle {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(COMMAND_CAPACITY);
        let task = tokio::spawn(self.run(command_rx, event_tx));

        SenderHandle {
            commands: command_tx,
            events: event_rx,
            task,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<SendCommand>,
        events: mpsc::Sender<SenderEvent>,
    ) {
        while let Some(command) = commands.recv().await {
            let outcome = match command {
                SendCommand::Control(message) => self.send_control(&message).await.map(|()| None),
                SendCommand::File { index, path } => {
                    tracing::debug!("Sending {}", path.display());
                    send_file(
                        &mut self.sink,
                        &path,
                        self.chunk_size,
                        self.framing,
                        &self.boundary,
                    )
                    .await
                    .map(|sent| {
                        Some(SenderEvent::FileSent {
                            index,
                            bytes: sent.bytes,
                            chunks: sent.chunks,
                        })
                    })
                }
                SendCommand::Close(reason) => {
                    if let Err(e) = self.sink.close(reason).await {
                        tracing::debug!("Close failed: {}", e);
                    }
                    return;
                }
            };

            match outcome {
                Ok(Some(event)) => {
                    // The control loop may already be gone.
                    let _ = events.send(event).await;
                }
                Ok(None) => {}
                Err(e) => {
                    let _ = events.send(SenderEvent::Failed(e)).await;
                    return;
                }
            }
        }
    }

    async fn send_control(&mut self, message: &ControlMessage) -> Result<()> {
        tracing::debug!("Sending '{}' command", message.command());
        self.sink.send(Frame::Binary(message.encode()?)).await
    }
}

/// Control-loop side of a running [`ChunkSender`].
#[derive(Debug)]
pub struct SenderHandle {
    commands: mpsc::Sender<SendCommand>,
    events: mpsc::Receiver<SenderEvent>,
    task: JoinHandle<()>,
}

impl SenderHandle {
    /// Queue a command.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the task has stopped.
    pub async fn send(&self, command: SendCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Wait for the next event, or `None` once the task has stopped.
    pub async fn next_event(&mut self) -> Option<SenderEvent> {
        self.events.recv().await
    }

    /// Close the connection, wait for the task, and return the events it
    /// emitted that were not read yet.
    pub async fn finish(mut self, reason: CloseReason) -> Vec<SenderEvent> {
        // Fails only if the task already stopped.
        let _ = self.commands.send(SendCommand::Close(reason)).await;
        drop(self.commands);

        let mut pending = Vec::new();
        while let Some(event) = self.events.recv().await {
            pending.push(event);
        }
        if let Err(e) = self.task.await {
            tracing::warn!("Sender task ended abnormally: {}", e);
        }
        pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{memory, FrameSource};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_send_file_frames() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"abcdefghij").unwrap();
        let boundary = BoundaryToken::parse("#END#").unwrap();

        let (mut client, mut server) = memory::pair();
        let sent = send_file(&mut client.sink, &path, 4, FramingMode::Boundary, &boundary)
            .await
            .unwrap();
        assert_eq!(sent, SentFile { bytes: 10, chunks: 3 });

        let mut frames = Vec::new();
        for _ in 0..4 {
            frames.push(server.source.recv().await.unwrap().unwrap().into_payload());
        }
        assert_eq!(
            frames,
            vec![
                b"abcd".to_vec(),
                b"efgh".to_vec(),
                b"ij".to_vec(),
                b"#END#".to_vec()
            ]
        );
    }

    #[tokio::test]
    async fn test_send_empty_file_tagged() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty");
        std::fs::write(&path, b"").unwrap();
        let boundary = BoundaryToken::generate();

        let (mut client, mut server) = memory::pair();
        let sent = send_file(&mut client.sink, &path, 8, FramingMode::Tagged, &boundary)
            .await
            .unwrap();
        assert_eq!(sent.chunks, 0);

        let frame = server.source.recv().await.unwrap().unwrap();
        assert_eq!(frame, Frame::Binary(vec![0x01]));
    }

    #[tokio::test]
    async fn test_sender_task_processes_commands_in_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"hi").unwrap();

        let (client, mut server) = memory::pair();
        let mut handle = ChunkSender::new(
            client.sink,
            8,
            FramingMode::Tagged,
            BoundaryToken::generate(),
        )
        .spawn();

        handle
            .send(SendCommand::File { index: 0, path })
            .await
            .unwrap();
        handle
            .send(SendCommand::Control(ControlMessage::Exit))
            .await
            .unwrap();

        match handle.next_event().await {
            Some(SenderEvent::FileSent { index, bytes, chunks }) => {
                assert_eq!((index, bytes, chunks), (0, 2, 1));
            }
            other => panic!("unexpected event {other:?}"),
        }

        assert_eq!(
            server.source.recv().await.unwrap(),
            Some(Frame::Binary(vec![0x00, b'h', b'i']))
        );
        assert_eq!(
            server.source.recv().await.unwrap(),
            Some(Frame::Binary(vec![0x01]))
        );
        assert_eq!(
            server.source.recv().await.unwrap(),
            Some(Frame::Binary(br#"{"command":"exit"}"#.to_vec()))
        );

        assert!(handle.finish(CloseReason::normal("done")).await.is_empty());
        assert_eq!(server.source.recv().await.unwrap(), None);
        assert!(server.source.close_reason().unwrap().is_normal());
    }

    #[tokio::test]
    async fn test_sender_reports_missing_file() {
        let dir = TempDir::new().unwrap();
        let (client, _server) = memory::pair();
        let mut handle =
            ChunkSender::new(client.sink, 8, FramingMode::Tagged, BoundaryToken::generate())
                .spawn();

        handle
            .send(SendCommand::File {
                index: 0,
                path: dir.path().join("missing"),
            })
            .await
            .unwrap();

        assert!(matches!(
            handle.next_event().await,
            Some(SenderEvent::Failed(Error::FileNotFound(_)))
        ));
        assert!(handle.next_event().await.is_none());
    }
}
