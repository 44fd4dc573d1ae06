//! WebSocket adapters.
//!
//! The server side wraps axum's upgraded [`WebSocket`]; the client side
//! wraps a tokio-tungstenite stream. Ping/pong frames are answered by the
//! underlying libraries and skipped here; a close frame reads as the end
//! of the connection.

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as ClientCloseFrame;
use tokio_tungstenite::tungstenite::Message as ClientMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use axum::extract::ws::{CloseFrame as ServerCloseFrame, Message as ServerMessage, WebSocket};

use super::{CloseReason, Frame, FrameSink, FrameSource};
use crate::error::{Error, Result};

/// Outbound half of a server-side WebSocket.
pub struct ServerSink(SplitSink<WebSocket, ServerMessage>);

/// Inbound half of a server-side WebSocket.
pub struct ServerSource(SplitStream<WebSocket>);

/// Split an upgraded axum socket into transport halves.
#[must_use]
pub fn split_server(socket: WebSocket) -> (ServerSink, ServerSource) {
    let (sink, stream) = socket.split();
    (ServerSink(sink), ServerSource(stream))
}

impl FrameSink for ServerSink {
    async fn send(&mut self, frame: Frame) -> Result<()> {
        let message = match frame {
            Frame::Text(text) => ServerMessage::Text(text.into()),
            Frame::Binary(data) => ServerMessage::Binary(data.into()),
        };
        self.0
            .send(message)
            .await
            .map_err(|e| Error::Transport(e.to_string()))
    }

    async fn close(&mut self, reason: CloseReason) -> Result<()> {
        let frame = ServerCloseFrame {
            code: reason.code,
            reason: reason.reason.into(),
        };
        if let Err(e) = self.0.send(ServerMessage::Close(Some(frame))).await {
            tracing::debug!("Close frame not delivered: {}", e);
        }
        Ok(())
    }
}

impl FrameSource for ServerSource {
    async fn recv(&mut self) -> Result<Option<Frame>> {
        loop {
            let Some(message) = self.0.next().await else {
                return Ok(None);
            };
            match message.map_err(|e| Error::Transport(e.to_string()))? {
                ServerMessage::Text(text) => return Ok(Some(Frame::Text(text.as_str().to_owned()))),
                ServerMessage::Binary(data) => return Ok(Some(Frame::Binary(data.to_vec()))),
                ServerMessage::Close(frame) => {
                    if let Some(frame) = frame {
                        tracing::debug!("Client closed: {} {}", frame.code, frame.reason.as_str());
                    }
                    return Ok(None);
                }
                ServerMessage::Ping(_) | ServerMessage::Pong(_) => {}
            }
        }
    }
}

/// Outbound half returned by [`connect`].
pub type ConnectedSink = ClientSink<MaybeTlsStream<TcpStream>>;

/// Inbound half returned by [`connect`].
pub type ConnectedSource = ClientSource<MaybeTlsStream<TcpStream>>;

/// Outbound half of a client-side WebSocket.
pub struct ClientSink<S>(SplitSink<WebSocketStream<S>, ClientMessage>);

/// Inbound half of a client-side WebSocket.
pub struct ClientSource<S>(SplitStream<WebSocketStream<S>>);

/// Split a tungstenite stream into transport halves.
#[must_use]
pub fn split_client<S>(stream: WebSocketStream<S>) -> (ClientSink<S>, ClientSource<S>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (sink, stream) = stream.split();
    (ClientSink(sink), ClientSource(stream))
}

/// Open a WebSocket connection to `url` (e.g. `ws://localhost:8080/upload`).
pub async fn connect(url: &str) -> Result<(ConnectedSink, ConnectedSource)> {
    let (stream, response) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| Error::Transport(format!("failed to connect to {url}: {e}")))?;
    tracing::debug!("Connected to {} ({})", url, response.status());
    Ok(split_client(stream))
}

impl<S> FrameSink for ClientSink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, frame: Frame) -> Result<()> {
        let message = match frame {
            Frame::Text(text) => ClientMessage::Text(text.into()),
            Frame::Binary(data) => ClientMessage::Binary(data.into()),
        };
        self.0
            .send(message)
            .await
            .map_err(|e| Error::Transport(e.to_string()))
    }

    async fn close(&mut self, reason: CloseReason) -> Result<()> {
        let frame = ClientCloseFrame {
            code: CloseCode::from(reason.code),
            reason: reason.reason.into(),
        };
        if let Err(e) = self.0.send(ClientMessage::Close(Some(frame))).await {
            tracing::debug!("Close frame not delivered: {}", e);
        }
        Ok(())
    }
}

impl<S> FrameSource for ClientSource<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn recv(&mut self) -> Result<Option<Frame>> {
        loop {
            let Some(message) = self.0.next().await else {
                return Ok(None);
            };
            match message.map_err(|e| Error::Transport(e.to_string()))? {
                ClientMessage::Text(text) => return Ok(Some(Frame::Text(text.as_str().to_owned()))),
                ClientMessage::Binary(data) => return Ok(Some(Frame::Binary(data.to_vec()))),
                ClientMessage::Close(frame) => {
                    if let Some(frame) = frame {
                        tracing::debug!(
                            "Server closed: {} {}",
                            u16::from(frame.code),
                            frame.reason.as_str()
                        );
                    }
                    return Ok(None);
                }
                ClientMessage::Ping(_) | ClientMessage::Pong(_) | ClientMessage::Frame(_) => {}
            }
        }
    }
}
