//! Status command handlers

use anyhow::Result;
use colored::*;
use masher_client::MasherClient;

use crate::config::Config;

/// Print the daemon status text
pub async fn show_status(config: &Config) -> Result<()> {
    let client = MasherClient::new(&config.masher_url);
    let status = client.status().await?;

    if status.mashing {
        println!("{}", "Masher is busy".green().bold());
    } else {
        println!("{}", "Masher is idle".yellow().bold());
    }
    println!("{}", format!("{} push(es) queued", status.queued).dimmed());
    println!("{}", "─".repeat(80).dimmed());
    println!("{}", status.text);

    Ok(())
}

/// Print the log of the most recently completed push
pub async fn show_last_log(config: &Config) -> Result<()> {
    let client = MasherClient::new(&config.masher_url);
    let log = client.last_log().await?;

    match &log.path {
        Some(path) => println!("{}", format!("Log: {}", path).bold()),
        None => println!("{}", "No push has completed yet.".yellow()),
    }
    println!("{}", "─".repeat(80).dimmed());
    println!("{}", log.contents);
    println!("{}", "─".repeat(80).dimmed());

    Ok(())
}
