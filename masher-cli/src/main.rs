//! Masher CLI
//!
//! Command-line interface for submitting pushes to the masher daemon.

mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;

#[derive(Parser)]
#[command(name = "masher")]
#[command(about = "Update push masher CLI", long_about = None)]
struct Cli {
    /// Masher daemon URL
    #[arg(long = "url", env = "MASHER_URL", default_value = "http://localhost:8080")]
    masher_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config {
        masher_url: cli.masher_url,
    };

    handle_command(cli.command, &config).await
}
