use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mp3relay")]
#[command(author, version, about = "Video-to-MP3 relay over a key-rotating conversion API")]
pub struct Cli {
    /// Path to config file (defaults to ./mp3relay.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the relay server
    Start {
        /// Host to bind to (overrides config and HOST)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config and PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Resolve and validate the configuration, then print a summary
    Validate,

    /// Print the video id the relay would extract from a URL
    ExtractId {
        /// Video URL
        url: String,
    },

    /// Display version information
    Version,
}
