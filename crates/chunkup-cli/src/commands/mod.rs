//! CLI command definitions and handlers.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use chunkup_core::config::Config;
use chunkup_core::protocol::FramingMode;

pub mod config;
pub mod serve;
pub mod upload;

/// Load configuration from the default location.
///
/// A missing file yields the defaults; a file that exists but does not
/// parse is an error rather than being silently ignored.
pub fn load_config() -> Result<Config> {
    Config::load().with_context(|| {
        format!(
            "Failed to load configuration from {}",
            Config::config_path().display()
        )
    })
}

/// chunkup - Chunked multi-file upload over a single WebSocket connection
#[derive(Parser)]
#[command(name = "chunkup")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand)]
pub enum Command {
    /// Accept uploads over WebSocket
    Serve(ServeArgs),

    /// Upload files to a server
    Upload(UploadArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

/// Arguments for the serve command
#[derive(Parser)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(short, long, env = "CHUNKUP_PORT")]
    pub port: Option<u16>,

    /// Directory uploads are stored under
    #[arg(short, long, env = "CHUNKUP_ROOT")]
    pub root: Option<PathBuf>,

    /// Bind to localhost only
    #[arg(long)]
    pub localhost_only: bool,

    /// Bytes between progress notifications
    #[arg(long)]
    pub threshold: Option<u64>,
}

/// Arguments for the upload command
#[derive(Parser)]
pub struct UploadArgs {
    /// Files to upload; a directory contributes the files directly inside it
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Server URL, including the upload route
    #[arg(short, long, env = "CHUNKUP_URL")]
    pub url: Option<String>,

    /// Name of the destination directory on the server
    #[arg(short = 'n', long)]
    pub username: Option<String>,

    /// Content bytes per frame
    #[arg(short, long)]
    pub chunk_size: Option<usize>,

    /// How file content is framed on the wire
    #[arg(short, long, value_enum)]
    pub framing: Option<FramingArg>,

    /// Minimal output
    #[arg(short, long)]
    pub quiet: bool,
}

/// Chunk framing selectable on the command line
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum FramingArg {
    /// End-of-file is a frame equal to the boundary token (legacy servers)
    Boundary,
    /// Every frame carries a one-byte tag
    Tagged,
}

impl From<FramingArg> for FramingMode {
    fn from(arg: FramingArg) -> Self {
        match arg {
            FramingArg::Boundary => Self::Boundary,
            FramingArg::Tagged => Self::Tagged,
        }
    }
}

/// Arguments for the config command
#[derive(Parser)]
pub struct ConfigArgs {
    /// Config subcommand
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Config subcommands
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Show the configuration file path
    Path,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
