//! Uploads over real WebSocket connections on a loopback port.

#![cfg(feature = "ws")]

mod common;

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use chunkup_core::client::UploadClient;
use chunkup_core::config::{ClientConfig, ServerConfig};
use chunkup_core::protocol::FramingMode;
use chunkup_core::server::UploadServer;
use chunkup_core::Error;

use common::{client_config, create_temp_dir, create_test_file, random_bytes};

struct RunningServer {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<chunkup_core::Result<()>>,
}

impl RunningServer {
    async fn start(config: ServerConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown, rx) = oneshot::channel::<()>();

        let server = UploadServer::new(config);
        let task = tokio::spawn(async move {
            server
                .serve(listener, async {
                    let _ = rx.await;
                })
                .await
        });

        Self {
            addr,
            shutdown,
            task,
        }
    }

    fn url(&self) -> String {
        format!("ws://{}/upload", self.addr)
    }

    async fn stop(self) {
        let _ = self.shutdown.send(());
        self.task.await.unwrap().unwrap();
    }
}

fn server_config(root: &std::path::Path) -> ServerConfig {
    ServerConfig {
        upload_root: root.to_path_buf(),
        progress_threshold: 4096,
        ..ServerConfig::default()
    }
}

#[tokio::test]
async fn test_upload_over_websocket() {
    let src = create_temp_dir();
    let dest = create_temp_dir();
    let a = create_test_file(src.path(), "a.txt", b"hello");
    let b = create_test_file(src.path(), "b.bin", &random_bytes(50_000));
    let empty = create_test_file(src.path(), "empty", b"");

    let server = RunningServer::start(server_config(dest.path())).await;

    for framing in [FramingMode::Tagged, FramingMode::Boundary] {
        let client = UploadClient::new(client_config(framing, 8 * 1024));
        let summary = client
            .upload_to(&server.url(), &[a.clone(), b.clone(), empty.clone()], &mut ())
            .await
            .unwrap();

        assert_eq!(summary.files, 3);
        assert_eq!(summary.bytes, 50_005);
        common::assert_files_equal(&a, &dest.path().join("alice/a.txt"));
        common::assert_files_equal(&b, &dest.path().join("alice/b.bin"));
        assert_eq!(std::fs::read(dest.path().join("alice/empty")).unwrap(), b"");
    }

    server.stop().await;
}

#[tokio::test]
async fn test_rejected_over_websocket() {
    let src = create_temp_dir();
    let dest = create_temp_dir();
    let a = create_test_file(src.path(), "a.txt", b"hello");

    let server = RunningServer::start(server_config(dest.path())).await;

    let client = UploadClient::new(ClientConfig {
        username: "..".to_string(),
        ..client_config(FramingMode::Tagged, 1024)
    });
    let result = client.upload_to(&server.url(), &[a], &mut ()).await;
    assert!(matches!(result, Err(Error::Rejected)));

    server.stop().await;
}

#[tokio::test]
async fn test_wrong_route_fails_to_connect() {
    let dest = create_temp_dir();
    let server = RunningServer::start(server_config(dest.path())).await;

    let result = chunkup_core::transport::ws::connect(&format!("ws://{}/other", server.addr)).await;
    assert!(matches!(result, Err(Error::Transport(_))));

    server.stop().await;
}
