//! Reconciler - brings each listed repository's local copy up to date
//!
//! Repositories are processed strictly one after another. For each one the
//! engine decides between a fresh clone and a fast-forward pull, measures the
//! resulting working copy, and records the outcome into the run summary. A
//! failing repository never stops the loop.

use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::disk::directory_size_kb;
use crate::error::{BackupError, BackupResult};
use crate::git::GitClient;
use crate::github::RepositoryRef;
use crate::summary::{RunSummary, SummaryBuilder, Thresholds};

/// What happened to a repository during the run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Cloned,
    Updated,
    Failed,
}

/// Result of reconciling one repository
#[derive(Debug)]
pub struct RepoOutcome {
    pub name: String,
    pub action: Action,
    /// Disk usage of the working copy, 0 when it does not exist
    pub size_kb: u64,
    /// `None` when there is no working copy or it has no commits
    pub last_commit_epoch: Option<i64>,
    /// Set when `action` is [`Action::Failed`]
    pub error: Option<BackupError>,
}

impl RepoOutcome {
    pub fn is_success(&self) -> bool {
        self.action != Action::Failed
    }
}

/// Outcomes in processing order plus the summary built from them
#[derive(Debug)]
pub struct Reconciliation {
    pub outcomes: Vec<RepoOutcome>,
    pub summary: RunSummary,
}

/// Clone-or-update engine over the backup directory
#[derive(Clone)]
pub struct SyncEngine {
    backup_root: PathBuf,
    git_client: GitClient,
    thresholds: Thresholds,
}

impl SyncEngine {
    pub fn new(config: &Config) -> Self {
        Self {
            backup_root: config.backup_dir.clone(),
            git_client: GitClient::new(config),
            thresholds: Thresholds::from_config(config),
        }
    }

    /// Local working copy location for a repository
    pub fn target_path(&self, repo: &RepositoryRef) -> PathBuf {
        self.backup_root.join(&repo.name)
    }

    /// Reconcile every repository, measuring staleness against the current time
    pub async fn reconcile(&self, repos: &[RepositoryRef]) -> BackupResult<Reconciliation> {
        self.reconcile_at(repos, Utc::now().timestamp()).await
    }

    /// Reconcile every repository, measuring staleness against `now`
    pub async fn reconcile_at(
        &self,
        repos: &[RepositoryRef],
        now: i64,
    ) -> BackupResult<Reconciliation> {
        tokio::fs::create_dir_all(&self.backup_root).await?;

        info!(
            "Reconciling {} repositories into {}",
            repos.len(),
            self.backup_root.display()
        );

        let mut builder = SummaryBuilder::new(self.thresholds, now);
        let mut outcomes = Vec::with_capacity(repos.len());

        for repo in repos {
            let outcome = self.sync_repository(repo).await;
            builder.record(&outcome);
            outcomes.push(outcome);
        }

        Ok(Reconciliation {
            outcomes,
            summary: builder.finish(),
        })
    }

    /// Clone or update a single repository and measure the result
    pub async fn sync_repository(&self, repo: &RepositoryRef) -> RepoOutcome {
        let target = self.target_path(repo);

        let (action, error) = if GitClient::is_working_copy(&target) {
            info!("Updating repository: {}", repo.name);
            match self.git_client.pull(&target).await {
                Ok(()) => (Action::Updated, None),
                Err(e) => {
                    error!("Update failed for {}: {:#}", repo.name, e);
                    let err = BackupError::UpdateFailed {
                        name: repo.name.clone(),
                        reason: format!("{:#}", e),
                    };
                    (Action::Failed, Some(err))
                }
            }
        } else {
            info!("Cloning repository: {} -> {}", repo.name, target.display());
            match self
                .git_client
                .clone_repository(&repo.clone_url, &target)
                .await
            {
                Ok(()) => (Action::Cloned, None),
                Err(e) => {
                    error!("Clone failed for {}: {:#}", repo.name, e);
                    let err = BackupError::CloneFailed {
                        name: repo.name.clone(),
                        reason: format!("{:#}", e),
                    };
                    (Action::Failed, Some(err))
                }
            }
        };

        // A failed update still leaves the previous clone on disk
        let (size_kb, last_commit_epoch) = if target.exists() {
            (
                self.measure_size(&target).await,
                self.git_client.last_commit_epoch(&target).await,
            )
        } else {
            (0, None)
        };

        debug!(
            "{}: {:?}, {} KB, last commit {:?}",
            repo.name, action, size_kb, last_commit_epoch
        );

        RepoOutcome {
            name: repo.name.clone(),
            action,
            size_kb,
            last_commit_epoch,
            error,
        }
    }

    async fn measure_size(&self, path: &Path) -> u64 {
        let owned = path.to_path_buf();
        match tokio::task::spawn_blocking(move || directory_size_kb(&owned)).await {
            Ok(Ok(size)) => size,
            Ok(Err(e)) => {
                warn!("Failed to measure {}: {:#}", path.display(), e);
                0
            }
            Err(e) => {
                warn!("Size measurement task for {} failed: {}", path.display(), e);
                0
            }
        }
    }

    pub fn backup_root(&self) -> &Path {
        &self.backup_root
    }
}
