//! One backup run: list, reconcile, report
//!
//! [`Backup::run`] walks through [`RunPhase`] in order. A fatal error while
//! listing or locking is reported and returned before any repository is
//! touched. Per-repository failures only surface through
//! [`RunReport::exit_code`].

use tracing::{error, info};

use crate::config::Config;
use crate::error::{BackupError, BackupResult};
use crate::github::GitHubClient;
use crate::lock::RunLock;
use crate::report::Reporter;
use crate::summary::RunSummary;
use crate::sync::{RepoOutcome, SyncEngine};

/// Where a run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    FetchingList,
    Reconciling,
    Reporting,
    Done,
    Failed,
}

/// Result of a run that got through reconciliation
#[derive(Debug)]
pub struct RunReport {
    pub summary: RunSummary,
    pub outcomes: Vec<RepoOutcome>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        !self.summary.has_failures()
    }

    /// 0 when every repository succeeded, 1 otherwise
    pub fn exit_code(&self) -> u8 {
        if self.is_success() {
            0
        } else {
            1
        }
    }
}

/// A configured backup of one account
pub struct Backup {
    config: Config,
    github: GitHubClient,
    engine: SyncEngine,
    reporter: Reporter,
    phase: RunPhase,
}

impl Backup {
    pub fn new(config: Config) -> BackupResult<Self> {
        let reporter = Reporter::new(&config);
        Self::with_reporter(config, reporter)
    }

    /// Use a custom reporter, e.g. one with a different notifier
    pub fn with_reporter(config: Config, reporter: Reporter) -> BackupResult<Self> {
        Ok(Self {
            github: GitHubClient::new(&config)?,
            engine: SyncEngine::new(&config),
            reporter,
            phase: RunPhase::Idle,
            config,
        })
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Perform one full run
    pub async fn run(&mut self) -> BackupResult<RunReport> {
        info!("Starting backup for {}", self.config.github_username);
        self.reporter.start().await;

        self.phase = RunPhase::FetchingList;
        let repos = match self.github.list_repositories().await {
            Ok(repos) => repos,
            Err(e) => return Err(self.abort(e).await),
        };

        let _lock = match RunLock::acquire(self.engine.backup_root()) {
            Ok(lock) => lock,
            Err(e) => return Err(self.abort(e).await),
        };

        self.phase = RunPhase::Reconciling;
        let reconciliation = match self.engine.reconcile(&repos).await {
            Ok(reconciliation) => reconciliation,
            Err(e) => return Err(self.abort(e).await),
        };

        self.phase = RunPhase::Reporting;
        self.reporter
            .report(&reconciliation.summary, &reconciliation.outcomes)
            .await;

        self.phase = RunPhase::Done;
        info!(
            "Backup finished: {} cloned, {} updated, {} failed",
            reconciliation.summary.cloned,
            reconciliation.summary.updated,
            reconciliation.summary.failed
        );

        Ok(RunReport {
            summary: reconciliation.summary,
            outcomes: reconciliation.outcomes,
        })
    }

    async fn abort(&mut self, err: BackupError) -> BackupError {
        error!("Backup aborted: {}", err);
        self.phase = RunPhase::Failed;
        self.reporter.fatal(&err).await;
        err
    }
}
