//! In-memory transport for testing without a real network.
//!
//! Provides channel-backed halves that implement [`FrameSink`] and
//! [`FrameSource`], so the client and server drivers can be exercised
//! against each other inside one process.

use tokio::sync::mpsc;

use super::{CloseReason, Frame, FrameSink, FrameSource};
use crate::error::{Error, Result};

/// Buffered frames per direction.
const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug)]
enum Envelope {
    Frame(Frame),
    Close(CloseReason),
}

/// Sending half of an in-memory connection.
#[derive(Debug)]
pub struct MemorySink {
    tx: mpsc::Sender<Envelope>,
    closed: bool,
}

/// Receiving half of an in-memory connection.
#[derive(Debug)]
pub struct MemorySource {
    rx: mpsc::Receiver<Envelope>,
    close_reason: Option<CloseReason>,
}

impl MemorySource {
    /// Close status sent by the peer, once a close has been received.
    #[must_use]
    pub const fn close_reason(&self) -> Option<&CloseReason> {
        self.close_reason.as_ref()
    }
}

/// One endpoint of an in-memory connection.
#[derive(Debug)]
pub struct MemoryEndpoint {
    /// Frames to the peer
    pub sink: MemorySink,
    /// Frames from the peer
    pub source: MemorySource,
}

/// Create a connected pair of endpoints: `(client, server)`.
#[must_use]
pub fn pair() -> (MemoryEndpoint, MemoryEndpoint) {
    let (client_tx, server_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (server_tx, client_rx) = mpsc::channel(CHANNEL_CAPACITY);

    let client = MemoryEndpoint {
        sink: MemorySink {
            tx: client_tx,
            closed: false,
        },
        source: MemorySource {
            rx: client_rx,
            close_reason: None,
        },
    };
    let server = MemoryEndpoint {
        sink: MemorySink {
            tx: server_tx,
            closed: false,
        },
        source: MemorySource {
            rx: server_rx,
            close_reason: None,
        },
    };
    (client, server)
}

impl FrameSink for MemorySink {
    async fn send(&mut self, frame: Frame) -> Result<()> {
        if self.closed {
            return Err(Error::ConnectionClosed);
        }
        self.tx
            .send(Envelope::Frame(frame))
            .await
            .map_err(|_| Error::ConnectionClosed)
    }

    async fn close(&mut self, reason: CloseReason) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        // The peer may already be gone; closing is still complete.
        let _ = self.tx.send(Envelope::Close(reason)).await;
        Ok(())
    }
}

impl FrameSource for MemorySource {
    async fn recv(&mut self) -> Result<Option<Frame>> {
        if self.close_reason.is_some() {
            return Ok(None);
        }
        match self.rx.recv().await {
            Some(Envelope::Frame(frame)) => Ok(Some(frame)),
            Some(Envelope::Close(reason)) => {
                self.close_reason = Some(reason);
                Ok(None)
            }
            None => Ok(None),
        }
    }
}
