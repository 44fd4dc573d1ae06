//! Content that looks like the end-of-file marker.
//!
//! With boundary framing a content slice equal to the boundary token is
//! indistinguishable from end-of-file. These tests pin that behaviour and
//! show tagged framing carrying the same bytes intact.

mod common;

use chunkup_core::protocol::FramingMode;
use chunkup_core::Error;

use common::{
    client_config, create_temp_dir, create_test_file, session_config, upload_in_memory, BOUNDARY,
};

/// A file whose first chunk is exactly the boundary token.
fn colliding_content() -> Vec<u8> {
    let mut content = BOUNDARY.as_bytes().to_vec();
    content.extend_from_slice(b"tail");
    content
}

#[tokio::test]
async fn test_boundary_framing_truncates_colliding_content() {
    let src = create_temp_dir();
    let dest = create_temp_dir();
    let path = create_test_file(src.path(), "x.bin", &colliding_content());

    let (uploaded, _served) = upload_in_memory(
        session_config(dest.path()),
        client_config(FramingMode::Boundary, BOUNDARY.len()),
        &[path],
    )
    .await;

    // The first slice ends the file early; the rest arrives after the
    // server has finished and is reported back as a violation.
    assert!(
        matches!(uploaded, Err(Error::ServerError(_))),
        "unexpected result {uploaded:?}"
    );
    assert_eq!(std::fs::read(dest.path().join("alice/x.bin")).unwrap(), b"");
}

#[tokio::test]
async fn test_boundary_framing_shifts_later_files() {
    let src = create_temp_dir();
    let dest = create_temp_dir();
    let first = create_test_file(src.path(), "first.bin", &colliding_content());
    let second = create_test_file(src.path(), "second.bin", b"ok");

    let (uploaded, _served) = upload_in_memory(
        session_config(dest.path()),
        client_config(FramingMode::Boundary, BOUNDARY.len()),
        &[first, second],
    )
    .await;

    // "tail" lands in the second file before the client ever sends it.
    assert!(uploaded.is_err());
    assert_eq!(std::fs::read(dest.path().join("alice/first.bin")).unwrap(), b"");
    assert_eq!(
        std::fs::read(dest.path().join("alice/second.bin")).unwrap(),
        b"tail"
    );
}

#[tokio::test]
async fn test_tagged_framing_preserves_colliding_content() {
    let src = create_temp_dir();
    let dest = create_temp_dir();
    let first = create_test_file(src.path(), "first.bin", &colliding_content());
    let second = create_test_file(src.path(), "second.bin", b"ok");

    let (uploaded, served) = upload_in_memory(
        session_config(dest.path()),
        client_config(FramingMode::Tagged, BOUNDARY.len()),
        &[first, second],
    )
    .await;

    assert_eq!(uploaded.unwrap().files, 2);
    assert_eq!(served.unwrap().files_completed, 2);
    assert_eq!(
        std::fs::read(dest.path().join("alice/first.bin")).unwrap(),
        colliding_content()
    );
    assert_eq!(std::fs::read(dest.path().join("alice/second.bin")).unwrap(), b"ok");
}
