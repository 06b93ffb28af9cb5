//! Reporter - run events to the log file and an optional Telegram chat
//!
//! The event log is append-only with one line per event:
//! `[YYYY-MM-DD HH:MM:SS] <emoji> <message>`. When Telegram credentials are
//! configured, a run sends exactly one start and one end notification.
//! Neither a log write failure nor a notification failure fails the run.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local, TimeZone};
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::BackupError;
use crate::git::single_line;
use crate::summary::RunSummary;
use crate::sync::{Action, RepoOutcome};

/// Transport for run notifications
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> Result<()>;
}

/// Telegram Bot API `sendMessage` with Markdown parse mode
pub struct TelegramNotifier {
    client: reqwest::Client,
    api_url: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(api_url: &str, bot_token: &str, chat_id: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            bot_token: bot_token.to_string(),
            chat_id: chat_id.to_string(),
        }
    }

    /// Notifier for the configured chat, if both credentials are present
    pub fn from_config(config: &Config) -> Option<Self> {
        match (&config.telegram_bot_token, &config.telegram_chat_id) {
            (Some(token), Some(chat_id)) => {
                Some(Self::new(&config.telegram_api_url, token, chat_id))
            }
            _ => None,
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.api_url, self.bot_token);
        let params = [
            ("chat_id", self.chat_id.as_str()),
            ("text", text),
            ("parse_mode", "Markdown"),
        ];

        // The URL carries the bot token, keep it out of error messages
        self.client
            .post(&url)
            .form(&params)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Telegram request failed: {}", e.without_url()))?
            .error_for_status()
            .map_err(|e| anyhow::anyhow!("Telegram rejected the message: {}", e.without_url()))?;

        Ok(())
    }
}

/// Append-only event log
#[derive(Debug, Clone)]
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one timestamped line
    pub fn append(&self, emoji: &str, message: &str) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log directory: {:?}", parent))?;
        }

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open log file: {:?}", self.path))?;

        writeln!(file, "{}", format_line(&Local::now(), emoji, message))
            .with_context(|| format!("Failed to write log file: {:?}", self.path))
    }
}

/// `[YYYY-MM-DD HH:MM:SS] <emoji> <message>`, line breaks in `message` folded into `; `
pub fn format_line<Tz: TimeZone>(at: &DateTime<Tz>, emoji: &str, message: &str) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!(
        "[{}] {} {}",
        at.format("%Y-%m-%d %H:%M:%S"),
        emoji,
        single_line(message)
    )
}

/// Human-readable size from kilobytes
pub fn format_size_kb(size_kb: u64) -> String {
    const KB_PER_MB: f64 = 1024.0;
    const KB_PER_GB: f64 = 1024.0 * 1024.0;

    let kb = size_kb as f64;
    if kb >= KB_PER_GB {
        format!("{:.1} GB", kb / KB_PER_GB)
    } else if kb >= KB_PER_MB {
        format!("{:.1} MB", kb / KB_PER_MB)
    } else {
        format!("{} KB", size_kb)
    }
}

/// Escape characters that Telegram's legacy Markdown treats as markup
pub fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Telegram's limit for one message
const TELEGRAM_MAX_CHARS: usize = 4096;
/// Repositories named per list in the end notification
const MAX_LISTED: usize = 10;

pub fn start_message(account: &str) -> String {
    format!("🔄 *Backup started* for {}", escape_markdown(account))
}

/// End-of-run notification: counts, sizes, warnings and failed repositories
pub fn end_message(account: &str, summary: &RunSummary) -> String {
    let mut text = String::new();

    if summary.has_failures() {
        let _ = writeln!(
            text,
            "⚠️ *Backup finished with failures* for {}",
            escape_markdown(account)
        );
    } else {
        let _ = writeln!(text, "✅ *Backup completed* for {}", escape_markdown(account));
    }

    let _ = writeln!(text);
    let _ = writeln!(text, "📦 Repositories: {}", summary.total_repos);
    let _ = writeln!(text, "📥 Cloned: {}", summary.cloned);
    let _ = writeln!(text, "🔄 Updated: {}", summary.updated);
    let _ = writeln!(text, "❌ Failed: {}", summary.failed);
    let _ = writeln!(text, "💾 Total size: {}", format_size_kb(summary.total_size_kb));
    if let Some(name) = &summary.max_size_repo {
        let _ = writeln!(
            text,
            "🏔 Largest: {} ({})",
            escape_markdown(name),
            format_size_kb(summary.max_size_kb)
        );
    }

    if summary.has_warnings() {
        let _ = writeln!(text);
        let _ = writeln!(text, "⚠️ *Warnings*");
        write_capped(
            &mut text,
            summary.stale_repos.iter().map(|(name, months)| {
                format!(
                    "• Stale: {} (no commits for {} months)",
                    escape_markdown(name),
                    months
                )
            }),
        );
        write_capped(
            &mut text,
            summary.large_repos.iter().map(|(name, size_kb)| {
                format!(
                    "• Large: {} ({})",
                    escape_markdown(name),
                    format_size_kb(*size_kb)
                )
            }),
        );
    }

    if !summary.failures.is_empty() {
        let _ = writeln!(text);
        let _ = writeln!(text, "❌ *Failed repositories*");
        write_capped(
            &mut text,
            summary
                .failures
                .iter()
                .map(|(name, _)| format!("• {}", escape_markdown(name))),
        );
    }

    truncate_chars(text.trim_end(), TELEGRAM_MAX_CHARS)
}

/// Write at most [`MAX_LISTED`] lines, then a count of the rest
fn write_capped(text: &mut String, lines: impl ExactSizeIterator<Item = String>) {
    let total = lines.len();
    for line in lines.take(MAX_LISTED) {
        let _ = writeln!(text, "{}", line);
    }
    if total > MAX_LISTED {
        let _ = writeln!(text, "…and {} more", total - MAX_LISTED);
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some(_) => {
            let kept: String = text.chars().take(max_chars - 1).collect();
            format!("{}…", kept)
        }
    }
}

pub fn fatal_message(account: &str, error: &BackupError) -> String {
    format!(
        "💥 *Backup aborted* for {}\n{}",
        escape_markdown(account),
        escape_markdown(&error.to_string())
    )
}

/// Writes run events to the log file and notifies when configured
pub struct Reporter {
    log: EventLog,
    notifier: Option<Box<dyn Notifier>>,
    account: String,
}

impl Reporter {
    /// Reporter using Telegram when both credentials are configured
    pub fn new(config: &Config) -> Self {
        let notifier = TelegramNotifier::from_config(config)
            .map(|telegram| Box::new(telegram) as Box<dyn Notifier>);
        Self::with_notifier(config, notifier)
    }

    pub fn with_notifier(config: &Config, notifier: Option<Box<dyn Notifier>>) -> Self {
        Self {
            log: EventLog::new(&config.log_file),
            notifier,
            account: config.github_username.clone(),
        }
    }

    pub fn log_path(&self) -> &Path {
        self.log.path()
    }

    /// Log the run start and send the start notification
    pub async fn start(&self) {
        self.event("🚀", &format!("Backup started for {}", self.account));
        self.notify(&start_message(&self.account)).await;
    }

    /// Log every outcome, warnings and totals, then send the end notification
    pub async fn report(&self, summary: &RunSummary, outcomes: &[RepoOutcome]) {
        for outcome in outcomes {
            match outcome.action {
                Action::Cloned => self.event(
                    "📥",
                    &format!("Cloned {} ({})", outcome.name, format_size_kb(outcome.size_kb)),
                ),
                Action::Updated => self.event(
                    "🔄",
                    &format!("Updated {} ({})", outcome.name, format_size_kb(outcome.size_kb)),
                ),
                Action::Failed => {
                    let reason = outcome
                        .error
                        .as_ref()
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| format!("{} failed", outcome.name));
                    self.event("❌", &reason)
                }
            }
        }

        for (name, months) in &summary.stale_repos {
            self.event(
                "⚠️",
                &format!("Stale repository {}: last commit {} months ago", name, months),
            );
        }
        for (name, size_kb) in &summary.large_repos {
            self.event(
                "⚠️",
                &format!("Large repository {}: {}", name, format_size_kb(*size_kb)),
            );
        }

        let largest = summary
            .max_size_repo
            .as_ref()
            .map(|name| format!(", largest {} ({})", name, format_size_kb(summary.max_size_kb)))
            .unwrap_or_default();
        let emoji = if summary.has_failures() { "❌" } else { "✅" };
        self.event(
            emoji,
            &format!(
                "Backup finished: {} repositories, {} cloned, {} updated, {} failed, total {}{}",
                summary.total_repos,
                summary.cloned,
                summary.updated,
                summary.failed,
                format_size_kb(summary.total_size_kb),
                largest
            ),
        );

        self.notify(&end_message(&self.account, summary)).await;
    }

    /// Log a fatal run error and send it as the end notification
    pub async fn fatal(&self, error: &BackupError) {
        self.event("💥", &format!("Backup aborted: {}", error));
        self.notify(&fatal_message(&self.account, error)).await;
    }

    fn event(&self, emoji: &str, message: &str) {
        if let Err(e) = self.log.append(emoji, message) {
            warn!("Failed to write event log: {:#}", e);
        }
    }

    async fn notify(&self, text: &str) {
        let Some(notifier) = &self.notifier else {
            return;
        };

        match notifier.send(text).await {
            Ok(()) => debug!("Notification sent"),
            Err(e) => warn!("Notification failed: {:#}", e),
        }
    }
}
