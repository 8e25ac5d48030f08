//! Command line arguments.

use clap::Parser;
use std::path::PathBuf;

/// Chorus chat server.
#[derive(Debug, Default, Parser)]
#[command(name = "chorus", version, about = "WebSocket chat broadcast server")]
pub struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Host to bind to (overrides config and environment).
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on (overrides config and environment).
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Print the effective configuration as TOML and exit.
    #[arg(long)]
    pub print_config: bool,
}
