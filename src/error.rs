//! Error kinds surfaced by a backup run
//!
//! Config, listing and lock errors are fatal to the run. Clone and update
//! errors are recorded on the repository's outcome and only affect the exit
//! code once every repository has been processed.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackupError {
    /// The configuration file does not exist
    #[error("config file not found: {}", path.display())]
    ConfigMissing { path: PathBuf },

    /// The configuration file could not be parsed or lacks a required field
    #[error("config file {} is malformed: {reason}", path.display())]
    ConfigMalformed { path: PathBuf, reason: String },

    /// Listing repositories failed (transport, HTTP status or decoding)
    #[error("GitHub API error: {0}")]
    Api(String),

    /// The account owns no repositories
    #[error("no repositories found for account {account}")]
    NoRepositories { account: String },

    #[error("clone of {name} failed: {reason}")]
    CloneFailed { name: String, reason: String },

    #[error("update of {name} failed: {reason}")]
    UpdateFailed { name: String, reason: String },

    /// Another run holds the backup root lock
    #[error("another backup run holds the lock at {}", path.display())]
    Locked { path: PathBuf },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackupError {
    /// Whether this error aborts the whole run rather than a single repository
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            BackupError::CloneFailed { .. } | BackupError::UpdateFailed { .. }
        )
    }
}

pub type BackupResult<T> = std::result::Result<T, BackupError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_errors_are_not_fatal() {
        let clone = BackupError::CloneFailed {
            name: "repo".to_string(),
            reason: "exit status 128".to_string(),
        };
        let update = BackupError::UpdateFailed {
            name: "repo".to_string(),
            reason: "not a fast-forward".to_string(),
        };

        assert!(!clone.is_fatal());
        assert!(!update.is_fatal());
        assert!(BackupError::Api("boom".to_string()).is_fatal());
        assert!(BackupError::NoRepositories {
            account: "octocat".to_string()
        }
        .is_fatal());
    }

    #[test]
    fn test_error_messages() {
        let err = BackupError::ConfigMalformed {
            path: PathBuf::from("/etc/env.json"),
            reason: "missing field `github_token`".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "config file /etc/env.json is malformed: missing field `github_token`"
        );

        let err = BackupError::UpdateFailed {
            name: "dotfiles".to_string(),
            reason: "fatal: Not possible to fast-forward".to_string(),
        };
        assert!(err.to_string().starts_with("update of dotfiles failed"));
    }
}
