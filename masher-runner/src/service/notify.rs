//! Notifications
//!
//! Operations reports, update notices, testing digests and bug tracker
//! comments all leave the masher through a [`NotificationSink`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use masher_core::domain::update::{Build, Update};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Per-release testing digest: release label -> build NVR -> notice body
pub type TestingDigest = BTreeMap<String, BTreeMap<String, String>>;

/// Service trait for outgoing notifications
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Sends a mail
    async fn send_mail(&self, to: &str, subject: &str, body: &str) -> Result<()>;

    /// Comments on every bug an update references
    async fn comment_on_bugs(&self, update: &Update, comment: &str) -> Result<()>;
}

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Notification<'a> {
    Mail {
        from: &'a str,
        to: &'a str,
        subject: &'a str,
        body: &'a str,
    },
    BugComment {
        bugs: &'a [u32],
        title: &'a str,
        comment: &'a str,
    },
}

/// Posts notifications as JSON to a relay webhook
pub struct WebhookNotifier {
    url: String,
    from: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            from: from.into(),
            client: reqwest::Client::new(),
        }
    }

    async fn post(&self, notification: &Notification<'_>) -> Result<()> {
        self.client
            .post(&self.url)
            .json(notification)
            .send()
            .await
            .with_context(|| format!("Failed to reach notification relay {}", self.url))?
            .error_for_status()
            .context("Notification relay rejected the message")?;
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for WebhookNotifier {
    async fn send_mail(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        debug!("Sending mail '{}' to {}", subject, to);
        self.post(&Notification::Mail {
            from: &self.from,
            to,
            subject,
            body,
        })
        .await
    }

    async fn comment_on_bugs(&self, update: &Update, comment: &str) -> Result<()> {
        if update.bugs.is_empty() {
            return Ok(());
        }
        self.post(&Notification::BugComment {
            bugs: &update.bugs,
            title: &update.title,
            comment,
        })
        .await
    }
}

/// Writes notifications to the log instead of delivering them
pub struct TracingNotifier;

#[async_trait]
impl NotificationSink for TracingNotifier {
    async fn send_mail(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        info!(to, subject, "{}", body);
        Ok(())
    }

    async fn comment_on_bugs(&self, update: &Update, comment: &str) -> Result<()> {
        for bug in &update.bugs {
            info!(bug, update = %update.title, "{}", comment);
        }
        Ok(())
    }
}

const RULE: &str =
    "================================================================================";
const THIN_RULE: &str =
    "--------------------------------------------------------------------------------";

/// Notice body for one build of an update
pub fn build_notice(update: &Update, build: &Build) -> String {
    let mut body = format!("{}\n {}\n{}\n", RULE, build.nvr, RULE);
    body.push_str(&format!("Release: {}\n", update.release.long_name));
    body.push_str(&format!("Update: {}\n", update.title));
    body.push_str(&format!("{}\n", THIN_RULE));

    if !update.notes.is_empty() {
        body.push_str("Update Information:\n\n");
        body.push_str(update.notes.trim_end());
        body.push_str(&format!("\n{}\n", THIN_RULE));
    }

    if !update.bugs.is_empty() {
        let bugs: Vec<String> = update.bugs.iter().map(|b| format!("#{}", b)).collect();
        body.push_str(&format!("Bug(s): {}\n{}\n", bugs.join(", "), THIN_RULE));
    }

    body
}

/// Subject and body of the public notice for an update
pub fn update_notice(update: &Update) -> (String, String) {
    let subject = format!("{} Update: {}", update.release.long_name, update.title);
    let body = update
        .builds
        .iter()
        .map(|build| build_notice(update, build))
        .collect::<Vec<_>>()
        .join("\n");
    (subject, body)
}

/// Adds the notices of every build of `update` to the digest
pub fn add_to_digest(digest: &mut TestingDigest, update: &Update) {
    let section = digest.entry(update.release.long_name.clone()).or_default();
    for build in &update.builds {
        section.insert(build.nvr.clone(), build_notice(update, build));
    }
}

/// Subject and body of the digest mail for one release
pub fn render_digest(release: &str, notices: &BTreeMap<String, String>) -> (String, String) {
    let mut body = format!(
        "The following builds have been pushed to {} updates-testing\n\n",
        release
    );
    for nvr in notices.keys() {
        body.push_str(&format!("    {}\n", nvr));
    }
    body.push_str("\nDetails about builds:\n\n");
    for notice in notices.values() {
        body.push('\n');
        body.push_str(notice);
    }

    (format!("{} updates-testing report", title_case(release)), body)
}

fn title_case(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
