//! chunkup CLI - chunked multi-file upload over WebSocket
//!
//! Runs either side of the upload protocol: a server that stores incoming
//! files under `<root>/<username>/`, or a client that streams local files.
//!
//! ## Quick Start
//!
//! ```bash
//! # Receive uploads into ./uploads
//! chunkup serve --root ./uploads
//!
//! # Upload files (on another machine)
//! chunkup upload --url ws://server:8080/upload ./report.pdf ./assets
//! ```

#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

use anyhow::Result;
use clap::Parser;

mod commands;
pub mod ui;

use commands::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => commands::serve::run(args).await,
        Command::Upload(args) => commands::upload::run(args).await,
        Command::Config(args) => commands::config::run(args).await,
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,chunkup=info,chunkup_core=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}
