//! HTTP endpoint that upgrades upload connections to WebSocket.
//!
//! ## Endpoints
//!
//! | Method | Endpoint | Description |
//! |--------|----------|-------------|
//! | GET (WS) | `server.route` (default `/upload`) | One upload session per connection |

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::Instrument;

use super::serve_connection;
use crate::config::ServerConfig;
use crate::error::Result;
use crate::transport::ws::split_server;

/// The upload server instance.
#[derive(Debug, Clone)]
pub struct UploadServer {
    config: Arc<ServerConfig>,
}

impl UploadServer {
    /// Create a new server with the given configuration.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Get the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the router serving the upload route.
    pub fn router(&self) -> Router {
        Router::new()
            .route(&self.config.route, get(upload_handler))
            .with_state(Arc::clone(&self.config))
    }

    /// Bind the configured address.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is in use or not permitted.
    pub async fn bind(&self) -> Result<TcpListener> {
        Ok(TcpListener::bind(self.config.bind_addr()).await?)
    }

    /// Bind and serve until Ctrl-C.
    ///
    /// # Errors
    ///
    /// Returns an error if binding or serving fails.
    pub async fn run(&self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("Could not listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Serve connections from `listener` until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener fails.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::info!(
            "Accepting uploads on ws://{}{} into {}",
            listener.local_addr()?,
            self.config.route,
            self.config.upload_root.display()
        );

        axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await?;

        tracing::info!("Server stopped");
        Ok(())
    }
}

async fn upload_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(config): State<Arc<ServerConfig>>,
) -> Response {
    ws.max_message_size(config.max_message_size)
        .max_frame_size(config.max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, peer, config))
}

async fn handle_socket(socket: WebSocket, peer: SocketAddr, config: Arc<ServerConfig>) {
    let id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("connection", %id, %peer);

    async move {
        tracing::info!("Client connected");
        let (sink, source) = split_server(socket);
        match serve_connection(source, sink, config.session_config()).await {
            Ok(stats) => tracing::info!(
                "Connection closed: {} file(s), {} bytes",
                stats.files_completed,
                stats.bytes_written
            ),
            Err(e) => tracing::warn!("Connection ended with error: {}", e),
        }
    }
    .instrument(span)
    .await;
}
