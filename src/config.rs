use anyhow::Context;
use dirs::config_dir;
use path_clean::PathClean;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{BackupError, BackupResult};

const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";
const DEFAULT_STALE_MONTHS: u32 = 6;
const DEFAULT_LARGE_REPO_MB: u64 = 500;

/// Settings for one backup run, loaded once and never mutated afterwards
#[derive(Clone, Serialize)]
pub struct Config {
    /// GitHub personal access token
    pub github_token: String,

    /// Account whose repositories are backed up
    pub github_username: String,

    /// Directory holding one working copy per repository
    pub backup_dir: PathBuf,

    /// Telegram bot token for run notifications
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telegram_bot_token: Option<String>,

    /// Telegram chat receiving run notifications
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telegram_chat_id: Option<String>,

    /// Append-only event log
    pub log_file: PathBuf,

    /// GitHub REST API root (GitHub Enterprise installs differ)
    pub github_api_url: String,

    /// Telegram Bot API root
    pub telegram_api_url: String,

    /// Request every page of `/user/repos` instead of only the first 100
    pub fetch_all_pages: bool,

    /// Upper bound for each git subprocess, unbounded when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_timeout_secs: Option<u64>,

    /// Age in 30-day months from which a repository counts as stale
    pub stale_months: u32,

    /// Size in MB above which a repository counts as large
    pub large_repo_mb: u64,
}

/// On-disk shape before validation; every field may be absent
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    github_token: Option<String>,
    github_username: Option<String>,
    backup_dir: Option<String>,
    telegram_bot_token: Option<String>,
    telegram_chat_id: Option<ChatId>,
    log_file: Option<String>,
    github_api_url: Option<String>,
    telegram_api_url: Option<String>,
    #[serde(default)]
    fetch_all_pages: bool,
    git_timeout_secs: Option<u64>,
    stale_months: Option<u32>,
    large_repo_mb: Option<u64>,
}

/// Telegram chat ids show up both quoted and as bare integers
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ChatId {
    Text(String),
    Number(i64),
}

impl ChatId {
    fn into_string(self) -> String {
        match self {
            ChatId::Text(text) => text,
            ChatId::Number(number) => number.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> BackupResult<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BackupError::ConfigMissing {
                    path: path.to_path_buf(),
                })
            }
            Err(e) => return Err(BackupError::Io(e)),
        };

        warn_if_world_readable(path);

        let raw: RawConfig =
            serde_json::from_str(&content).map_err(|e| BackupError::ConfigMalformed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        Self::from_raw(raw).map_err(|e| BackupError::ConfigMalformed {
            path: path.to_path_buf(),
            reason: format!("{e:#}"),
        })
    }

    fn from_raw(raw: RawConfig) -> anyhow::Result<Self> {
        let github_token = required(raw.github_token, "github_token")?;
        let github_username = required(raw.github_username, "github_username")?;
        let backup_dir = expand_path(&required(raw.backup_dir, "backup_dir")?)
            .context("Failed to expand backup_dir path")?;
        let log_file = expand_path(&required(raw.log_file, "log_file")?)
            .context("Failed to expand log_file path")?;

        Ok(Self {
            github_token,
            github_username,
            backup_dir,
            telegram_bot_token: optional(raw.telegram_bot_token),
            telegram_chat_id: optional(raw.telegram_chat_id.map(ChatId::into_string)),
            log_file,
            github_api_url: optional(raw.github_api_url)
                .unwrap_or_else(|| DEFAULT_GITHUB_API_URL.to_string()),
            telegram_api_url: optional(raw.telegram_api_url)
                .unwrap_or_else(|| DEFAULT_TELEGRAM_API_URL.to_string()),
            fetch_all_pages: raw.fetch_all_pages,
            git_timeout_secs: raw.git_timeout_secs.filter(|secs| *secs > 0),
            stale_months: raw.stale_months.unwrap_or(DEFAULT_STALE_MONTHS),
            large_repo_mb: raw.large_repo_mb.unwrap_or(DEFAULT_LARGE_REPO_MB),
        })
    }

    /// Create a config with required fields set and everything else defaulted
    pub fn new(
        github_token: impl Into<String>,
        github_username: impl Into<String>,
        backup_dir: impl Into<PathBuf>,
        log_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            github_token: github_token.into(),
            github_username: github_username.into(),
            backup_dir: backup_dir.into(),
            telegram_bot_token: None,
            telegram_chat_id: None,
            log_file: log_file.into(),
            github_api_url: DEFAULT_GITHUB_API_URL.to_string(),
            telegram_api_url: DEFAULT_TELEGRAM_API_URL.to_string(),
            fetch_all_pages: false,
            git_timeout_secs: None,
            stale_months: DEFAULT_STALE_MONTHS,
            large_repo_mb: DEFAULT_LARGE_REPO_MB,
        }
    }

    /// Save configuration as JSON, readable and writable by the owner only
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        use std::io::Write;

        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options
            .open(path)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;
        file.write_all(content.as_bytes())
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        // mode() only applies on creation
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
                .with_context(|| format!("Failed to restrict permissions on {:?}", path))?;
        }

        Ok(())
    }

    /// `./env.json` when present, otherwise the XDG config location
    pub fn default_config_path() -> PathBuf {
        let local = PathBuf::from("env.json");
        if local.exists() {
            return local;
        }

        config_dir()
            .map(|dir| dir.join("gitbackup").join("env.json"))
            .unwrap_or(local)
    }

    /// Both Telegram credentials are present
    pub fn notifications_enabled(&self) -> bool {
        self.telegram_bot_token.is_some() && self.telegram_chat_id.is_some()
    }

    /// Size threshold in KB above which a repository is reported as large
    pub fn large_repo_threshold_kb(&self) -> u64 {
        self.large_repo_mb * 1024
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const REDACTED: &str = "<redacted>";
        f.debug_struct("Config")
            .field("github_token", &REDACTED)
            .field("github_username", &self.github_username)
            .field("backup_dir", &self.backup_dir)
            .field(
                "telegram_bot_token",
                &self.telegram_bot_token.as_ref().map(|_| REDACTED),
            )
            .field("telegram_chat_id", &self.telegram_chat_id)
            .field("log_file", &self.log_file)
            .field("github_api_url", &self.github_api_url)
            .field("telegram_api_url", &self.telegram_api_url)
            .field("fetch_all_pages", &self.fetch_all_pages)
            .field("git_timeout_secs", &self.git_timeout_secs)
            .field("stale_months", &self.stale_months)
            .field("large_repo_mb", &self.large_repo_mb)
            .finish()
    }
}

fn required(value: Option<String>, field: &str) -> anyhow::Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        Some(_) => anyhow::bail!("field `{}` is empty", field),
        None => anyhow::bail!("missing field `{}`", field),
    }
}

fn optional(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Expand `~` and environment variables, then normalize the result
fn expand_path(raw: &str) -> anyhow::Result<PathBuf> {
    let expanded = shellexpand::full(raw)?;
    Ok(PathBuf::from(expanded.as_ref()).clean())
}

#[cfg(unix)]
fn warn_if_world_readable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    if let Ok(metadata) = std::fs::metadata(path) {
        let mode = metadata.permissions().mode();
        if mode & 0o077 != 0 {
            tracing::warn!(
                "Config file {:?} is accessible by other users (mode {:o}); run: chmod 600 {:?}",
                path,
                mode & 0o777,
                path
            );
        }
    }
}

#[cfg(not(unix))]
fn warn_if_world_readable(_path: &Path) {}
