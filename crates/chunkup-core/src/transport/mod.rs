//! Frame transport abstraction.
//!
//! The protocol only needs a collaborator that delivers and accepts
//! discrete frames and reports when the peer has closed. Both halves of a
//! connection are modelled separately so the client can hand its outbound
//! half to the sender task while the control loop keeps the inbound half.
//!
//! ## Implementations
//!
//! | Adapter | Module | Used by |
//! |---------|--------|---------|
//! | In-memory channels | [`memory`] | tests |
//! | axum `WebSocket` | `ws` | server |
//! | tokio-tungstenite | `ws` | client |

pub mod memory;
#[cfg(feature = "ws")]
pub mod ws;

use std::future::Future;

use crate::error::Result;

/// One discrete unit delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text frame
    Text(String),
    /// Binary frame
    Binary(Vec<u8>),
}

impl Frame {
    /// Raw payload bytes regardless of frame type.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(data) => data,
        }
    }

    /// Consume the frame and return its payload bytes.
    #[must_use]
    pub fn into_payload(self) -> Vec<u8> {
        match self {
            Self::Text(text) => text.into_bytes(),
            Self::Binary(data) => data,
        }
    }

    /// Short name of the frame type, for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Binary(_) => "binary",
        }
    }
}

/// Status sent along with a connection close.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    /// WebSocket close code
    pub code: u16,
    /// Human-readable reason
    pub reason: String,
}

impl CloseReason {
    /// Normal closure.
    pub const NORMAL: u16 = 1000;
    /// The endpoint is abandoning the connection.
    pub const GOING_AWAY: u16 = 1001;
    /// The server hit an unexpected condition.
    pub const INTERNAL_ERROR: u16 = 1011;

    /// A normal close with the given reason text.
    pub fn normal(reason: impl Into<String>) -> Self {
        Self {
            code: Self::NORMAL,
            reason: reason.into(),
        }
    }

    /// A close sent when the client gives up on an upload.
    pub fn going_away(reason: impl Into<String>) -> Self {
        Self {
            code: Self::GOING_AWAY,
            reason: reason.into(),
        }
    }

    /// A close signalling a server-side failure.
    pub fn internal_error(reason: impl Into<String>) -> Self {
        Self {
            code: Self::INTERNAL_ERROR,
            reason: reason.into(),
        }
    }

    /// Whether this is a normal closure.
    #[must_use]
    pub const fn is_normal(&self) -> bool {
        self.code == Self::NORMAL
    }
}

/// Outbound half of a connection.
///
/// `send` resolves once the transport has accepted the frame, which gives
/// the chunk sender its one-frame-in-flight backpressure.
pub trait FrameSink: Send {
    /// Send one frame.
    fn send(&mut self, frame: Frame) -> impl Future<Output = Result<()>> + Send;

    /// Close the connection with the given status.
    fn close(&mut self, reason: CloseReason) -> impl Future<Output = Result<()>> + Send;
}

/// Inbound half of a connection.
pub trait FrameSource: Send {
    /// Receive the next frame, or `None` once the peer has closed.
    fn recv(&mut self) -> impl Future<Output = Result<Option<Frame>>> + Send;
}
