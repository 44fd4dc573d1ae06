//! Server side of the upload protocol.
//!
//! [`serve_connection`] drives one [`Session`] over any transport. The
//! `http` module (behind the `ws` feature) accepts WebSocket connections
//! and runs one driver per connection.

#[cfg(feature = "ws")]
pub mod http;

#[cfg(feature = "ws")]
pub use http::UploadServer;

use crate::error::Result;
use crate::protocol::ServerReply;
use crate::session::{Action, Session, SessionConfig, SessionStats, UploadState};
use crate::transport::{CloseReason, Frame, FrameSink, FrameSource};

/// Run the protocol for one connection until it closes.
///
/// Frames are handled strictly in arrival order. Replies and closes the
/// session asks for are performed immediately. On a recoverable error the
/// peer gets an `error|<reason>` reply and the session keeps its state; on
/// a fatal one the session is reset, the peer is told, and the connection
/// is closed with status 1011.
///
/// # Errors
///
/// Returns the fatal session error, or a transport error while replying.
pub async fn serve_connection<S, K>(
    mut source: S,
    mut sink: K,
    config: SessionConfig,
) -> Result<SessionStats>
where
    S: FrameSource,
    K: FrameSink,
{
    let mut session = Session::new(config);

    loop {
        let Some(frame) = source.recv().await? else {
            if let UploadState::Uploading(upload) = session.state() {
                tracing::warn!(
                    "Client left during file {} of {} ({} bytes written)",
                    upload.cursor() + 1,
                    upload.manifest().len(),
                    upload.bytes_written()
                );
            }
            return Ok(session.stats());
        };

        match session.handle(frame).await {
            Ok(actions) => {
                for action in actions {
                    match action {
                        Action::Reply(reply) => send_reply(&mut sink, &reply).await?,
                        Action::Close(reason) => {
                            sink.close(reason).await?;
                            return Ok(session.stats());
                        }
                    }
                }
            }
            Err(e) if e.is_fatal() => {
                tracing::error!("Session failed while {}: {}", session.state().name(), e);
                session.reset();
                if let Err(send_err) = send_reply(&mut sink, &ServerReply::Error(e.to_string())).await
                {
                    tracing::debug!("Could not report failure: {}", send_err);
                }
                if let Err(close_err) = sink.close(CloseReason::internal_error("internal error")).await
                {
                    tracing::debug!("Could not close connection: {}", close_err);
                }
                return Err(e);
            }
            Err(e) => {
                tracing::warn!("{}", e);
                send_reply(&mut sink, &ServerReply::Error(e.to_string())).await?;
            }
        }
    }
}

async fn send_reply<K: FrameSink>(sink: &mut K, reply: &ServerReply) -> Result<()> {
    sink.send(Frame::Text(reply.encode())).await
}
