//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod push;
mod status;

use anyhow::Result;
use clap::Subcommand;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Push updates by title
    Push {
        /// Update titles
        #[arg(required_unless_present = "resume")]
        titles: Vec<String>,

        /// Resume the push recorded in the marker file
        #[arg(long)]
        resume: bool,
    },
    /// Compose repositories without moving any tags
    Mash {
        /// Repository names (e.g. dist-f8-updates-testing)
        #[arg(required = true)]
        repos: Vec<String>,
    },
    /// Show what the masher is doing
    Status,
    /// Show the log of the last completed push
    LastLog,
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Push { titles, resume } => push::push_updates(config, titles, resume).await,
        Commands::Mash { repos } => push::mash_repos(config, repos).await,
        Commands::Status => status::show_status(config).await,
        Commands::LastLog => status::show_last_log(config).await,
    }
}
