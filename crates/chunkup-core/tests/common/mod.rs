//! Common test utilities for chunkup integration tests.
//!
//! This module provides shared functionality for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use chunkup_core::client::{UploadClient, UploadSummary};
use chunkup_core::config::ClientConfig;
use chunkup_core::protocol::FramingMode;
use chunkup_core::server::serve_connection;
use chunkup_core::session::{SessionConfig, SessionStats};
use chunkup_core::transport::memory;

/// Boundary token used by the fixed-boundary scenarios.
pub const BOUNDARY: &str = "#END#";

/// Create a temporary directory for test files.
///
/// The directory will be automatically cleaned up when the returned
/// `TempDir` is dropped.
pub fn create_temp_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

/// Create a test file with the given content.
pub fn create_test_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create parent directories");
    }
    std::fs::write(&path, content).expect("Failed to write test file");
    path
}

/// Generate random bytes for testing.
pub fn random_bytes(size: usize) -> Vec<u8> {
    use rand::RngCore;
    let mut bytes = vec![0u8; size];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// Assert that two files have identical content.
pub fn assert_files_equal(path1: &Path, path2: &Path) {
    let content1 = std::fs::read(path1).expect("Failed to read first file");
    let content2 = std::fs::read(path2).expect("Failed to read second file");
    assert_eq!(content1, content2, "File contents differ");
}

/// Session settings storing under `root`.
pub fn session_config(root: &Path) -> SessionConfig {
    SessionConfig {
        upload_root: root.to_path_buf(),
        ..SessionConfig::default()
    }
}

/// Client settings for user `alice` with a fixed boundary.
pub fn client_config(framing: FramingMode, chunk_size: usize) -> ClientConfig {
    ClientConfig {
        username: "alice".to_string(),
        token: Some("test-token".to_string()),
        chunk_size,
        framing,
        boundary: Some(BOUNDARY.to_string()),
        idle_timeout: Duration::from_secs(10),
        ..ClientConfig::default()
    }
}

/// Run a full upload of `paths` against an in-memory server.
///
/// Returns the client outcome and the server driver outcome.
pub async fn upload_in_memory(
    server: SessionConfig,
    client: ClientConfig,
    paths: &[PathBuf],
) -> (
    chunkup_core::Result<UploadSummary>,
    chunkup_core::Result<SessionStats>,
) {
    let (client_end, server_end) = memory::pair();
    let driver = tokio::spawn(serve_connection(
        server_end.source,
        server_end.sink,
        server,
    ));

    let uploaded = UploadClient::new(client)
        .upload(client_end.sink, client_end.source, paths, &mut ())
        .await;
    let served = driver.await.expect("server driver panicked");
    (uploaded, served)
}
