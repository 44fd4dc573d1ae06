//! Serve command implementation.

use anyhow::{Context, Result};

use chunkup_core::server::UploadServer;

use super::ServeArgs;

/// Run the serve command.
pub async fn run(args: ServeArgs) -> Result<()> {
    let mut config = super::load_config()?;

    if let Some(port) = args.port {
        tracing::debug!("Port overridden from command line: {}", port);
        config.server.port = port;
    }
    if let Some(root) = args.root {
        tracing::debug!("Upload root overridden from command line: {}", root.display());
        config.server.upload_root = root;
    }
    if args.localhost_only {
        config.server.localhost_only = true;
    }
    if let Some(threshold) = args.threshold {
        tracing::debug!("Progress threshold overridden from command line: {}", threshold);
        config.server.progress_threshold = threshold;
    }
    config.validate().context("Invalid server settings")?;

    std::fs::create_dir_all(&config.server.upload_root).with_context(|| {
        format!(
            "Failed to create upload directory {}",
            config.server.upload_root.display()
        )
    })?;

    println!();
    println!("chunkup v{}", chunkup_core::VERSION);
    println!("{}", "-".repeat(37));
    println!();
    println!(
        "  Listening on ws://{}{}",
        config.server.bind_addr(),
        config.server.route
    );
    println!(
        "  Storing uploads in {}",
        config.server.upload_root.display()
    );
    if !config.server.strict_names {
        println!("  Warning: name checks are disabled (server.strict_names = false)");
    }
    println!();
    println!("  Press Ctrl+C to stop");
    println!();

    let server = UploadServer::new(config.server);
    server.run().await.context("Server failed")
}
