//! gitbackup - mirror every GitHub repository an account owns to local disk
//!
//! One run lists the account's repositories, clones the missing ones and
//! fast-forwards the rest, then reports what happened to an event log and,
//! optionally, a Telegram chat.
//!
//! ## Modules
//!
//! - [`config`]: JSON configuration loading and validation
//! - [`github`]: repository listing through the GitHub REST API
//! - [`git`]: `git` subprocess wrapper
//! - [`sync`]: per-repository clone-or-update reconciliation
//! - [`summary`]: run statistics and stale/large classification
//! - [`report`]: event log and notifications
//! - [`run`]: the end-to-end run

pub mod config;
pub mod disk;
pub mod error;
pub mod git;
pub mod github;
pub mod lock;
pub mod report;
pub mod run;
pub mod summary;
pub mod sync;

pub use config::Config;
pub use error::{BackupError, BackupResult};
pub use git::GitClient;
pub use github::{GitHubClient, RepositoryRef};
pub use lock::{RunLock, LOCK_FILE_NAME};
pub use report::{Notifier, Reporter, TelegramNotifier};
pub use run::{Backup, RunPhase, RunReport};
pub use summary::{RunSummary, Thresholds};
pub use sync::{Action, RepoOutcome, SyncEngine};
