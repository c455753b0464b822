//! Push command handlers
//!
//! Submits pushes and bare compositions to the daemon.

use anyhow::Result;
use colored::*;
use masher_client::MasherClient;
use masher_core::dto::push::PushAccepted;

use crate::config::Config;

/// Queue a push of the given update titles
pub async fn push_updates(config: &Config, titles: Vec<String>, resume: bool) -> Result<()> {
    let client = MasherClient::new(&config.masher_url);

    if resume {
        println!("{}", "Resuming the interrupted push...".dimmed());
    }

    let count = titles.len();
    let accepted = match client.submit_push(titles, resume).await {
        Ok(accepted) => accepted,
        Err(e) if e.is_not_found() => {
            eprintln!(
                "{}",
                "Hint: pass --resume to skip updates that no longer exist".dimmed()
            );
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };

    println!(
        "{} Push of {} update(s) accepted",
        "✓".green(),
        count.to_string().cyan()
    );
    print_accepted(&accepted);

    Ok(())
}

/// Queue a composition of bare repositories
pub async fn mash_repos(config: &Config, repos: Vec<String>) -> Result<()> {
    let client = MasherClient::new(&config.masher_url);

    let accepted = client.mash_repos(repos.clone()).await?;

    println!("{} Mash of {} accepted", "✓".green(), repos.join(", ").cyan());
    print_accepted(&accepted);

    Ok(())
}

fn print_accepted(accepted: &PushAccepted) {
    println!("  ID:     {}", format!("#{}", accepted.id).cyan());
    println!(
        "  State:  {}",
        if accepted.started {
            "mashing".green()
        } else {
            "queued".yellow()
        }
    );
}
