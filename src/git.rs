use anyhow::{anyhow, Context, Result};
use std::ffi::OsStr;
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command as AsyncCommand;
use tokio::time::timeout;
use tracing::debug;

use crate::config::Config;

const REDACTED: &str = "***";

/// Runs git against working copies in the backup directory
#[derive(Clone)]
pub struct GitClient {
    token: String,
    timeout: Option<Duration>,
}

impl GitClient {
    pub fn new(config: &Config) -> Self {
        Self {
            token: config.github_token.clone(),
            timeout: config.git_timeout_secs.map(Duration::from_secs),
        }
    }

    /// The path exists and holds a git working copy
    pub fn is_working_copy(path: &Path) -> bool {
        path.exists() && path.join(".git").exists()
    }

    /// Embed the token as URL credential for http(s) remotes
    ///
    /// Other schemes (ssh, file) are returned unchanged.
    pub fn authenticated_url(&self, clone_url: &str) -> String {
        if self.token.is_empty() {
            return clone_url.to_string();
        }

        match reqwest::Url::parse(clone_url) {
            Ok(mut url) if matches!(url.scheme(), "http" | "https") => {
                if url.set_username(&self.token).is_ok() && url.set_password(None).is_ok() {
                    url.to_string()
                } else {
                    clone_url.to_string()
                }
            }
            _ => clone_url.to_string(),
        }
    }

    /// Replace every occurrence of the token
    pub fn redact(&self, text: &str) -> String {
        if self.token.is_empty() {
            text.to_string()
        } else {
            text.replace(&self.token, REDACTED)
        }
    }

    /// Fresh clone of `clone_url` into `target`
    pub async fn clone_repository(&self, clone_url: &str, target: &Path) -> Result<()> {
        debug!("Cloning {} -> {}", self.redact(clone_url), target.display());

        let url = self.authenticated_url(clone_url);
        let output = self
            .run_git(
                [OsStr::new("clone"), OsStr::new("--quiet"), OsStr::new(&url), target.as_os_str()],
                None,
            )
            .await?;

        self.check_status("clone", &output)
    }

    /// Fast-forward the working copy at `path` from its upstream
    pub async fn pull(&self, path: &Path) -> Result<()> {
        debug!("Pulling {}", path.display());

        let output = self
            .run_git(["pull", "--ff-only", "--quiet"], Some(path))
            .await?;

        self.check_status("pull", &output)
    }

    /// Committer timestamp of HEAD, `None` for a repository without commits
    ///
    /// A directory that is not itself a working copy yields `None` even when
    /// it sits inside another repository.
    pub async fn last_commit_epoch(&self, path: &Path) -> Option<i64> {
        if !Self::is_working_copy(path) {
            return None;
        }

        let output = self
            .run_git(["log", "-1", "--format=%ct"], Some(path))
            .await
            .ok()?;

        if !output.status.success() {
            return None;
        }

        String::from_utf8_lossy(&output.stdout).trim().parse().ok()
    }

    async fn run_git<I, S>(&self, args: I, cwd: Option<&Path>) -> Result<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<_> = args.into_iter().map(|a| a.as_ref().to_os_string()).collect();
        let subcommand = args
            .first()
            .map(|a| a.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut command = AsyncCommand::new("git");
        command
            .args(&args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            command.current_dir(dir);
        }

        let output = match self.timeout {
            Some(limit) => timeout(limit, command.output()).await.map_err(|_| {
                anyhow!("git {} timed out after {}s", subcommand, limit.as_secs())
            })?,
            None => command.output().await,
        };

        output.with_context(|| format!("Failed to execute git {}", subcommand))
    }

    fn check_status(&self, subcommand: &str, output: &Output) -> Result<()> {
        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(anyhow!(
            "git {} failed ({}): {}",
            subcommand,
            output.status,
            self.redact(&single_line(&stderr))
        ))
    }
}

/// Non-blank lines of `text` joined with `; `
pub fn single_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("; ")
}
