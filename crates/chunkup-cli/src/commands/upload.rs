//! Upload command implementation.

use anyhow::{Context, Result};

use chunkup_core::client::{UploadClient, UploadSummary};
use chunkup_core::file::{collect_upload_paths, format_size, Manifest};

use super::UploadArgs;
use crate::ui::ConsoleProgress;

/// Run the upload command.
pub async fn run(args: UploadArgs) -> Result<()> {
    let mut config = super::load_config()?;

    if let Some(url) = args.url {
        tracing::debug!("Server URL overridden from command line: {}", url);
        config.client.url = url;
    }
    if let Some(username) = args.username {
        tracing::debug!("Username overridden from command line: {}", username);
        config.client.username = username;
    }
    if let Some(chunk_size) = args.chunk_size {
        tracing::debug!("Chunk size overridden from command line: {}", chunk_size);
        config.client.chunk_size = chunk_size;
    }
    if let Some(framing) = args.framing {
        config.client.framing = framing.into();
        tracing::debug!("Framing overridden from command line: {}", config.client.framing);
    }
    config.validate().context("Invalid upload settings")?;

    let paths = collect_upload_paths(&args.paths).context("Failed to collect files")?;
    if paths.is_empty() {
        anyhow::bail!("No files to upload");
    }

    if !args.quiet {
        let manifest = Manifest::from_paths(&paths)
            .await
            .context("Invalid upload file list")?;
        println!();
        println!("chunkup v{}", chunkup_core::VERSION);
        println!("{}", "-".repeat(37));
        println!();
        println!(
            "  Uploading {} file(s) ({}) to {} as {}",
            manifest.len(),
            format_size(manifest.total_size()),
            config.client.url,
            config.client.username
        );
        println!();
    }

    let url = config.client.url.clone();
    let client = UploadClient::new(config.client);
    let result = if args.quiet {
        client.upload_to(&url, &paths, &mut ()).await
    } else {
        client
            .upload_to(&url, &paths, &mut ConsoleProgress::new(paths.len()))
            .await
    };

    match result {
        Ok(summary) => {
            if !args.quiet {
                display_summary(&summary);
            }
            Ok(())
        }
        Err(e) => {
            if !args.quiet {
                eprintln!();
                eprintln!("  Upload failed: {}", e);
                if let Some(suggestion) = e.suggestion() {
                    eprintln!();
                    for line in suggestion.lines() {
                        eprintln!("  {}", line.trim_start());
                    }
                }
                eprintln!();
            }
            Err(e.into())
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn display_summary(summary: &UploadSummary) {
    let secs = summary.elapsed.as_secs_f64();
    let rate = if secs > 0.0 {
        format!("{}/s", format_size((summary.bytes as f64 / secs) as u64))
    } else {
        "--".to_string()
    };

    println!();
    println!(
        "  Upload complete: {} file(s), {} in {:.1}s ({})",
        summary.files,
        format_size(summary.bytes),
        secs,
        rate
    );
    println!();
}
