//! Run statistics accumulated while reconciling
//!
//! A [`SummaryBuilder`] is threaded through the reconciler and records each
//! [`RepoOutcome`] as it is produced. [`SummaryBuilder::finish`] yields the
//! immutable [`RunSummary`] handed to the reporter.

use crate::config::Config;
use crate::sync::{Action, RepoOutcome};

const SECONDS_PER_DAY: i64 = 86_400;
/// Fixed month length used for staleness; calendar months are not considered
const DAYS_PER_MONTH: i64 = 30;

/// Classification thresholds for stale and large repositories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub stale_months: u32,
    pub large_repo_kb: u64,
}

impl Thresholds {
    pub fn from_config(config: &Config) -> Self {
        Self {
            stale_months: config.stale_months,
            large_repo_kb: config.large_repo_threshold_kb(),
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            stale_months: 6,
            large_repo_kb: 500 * 1024,
        }
    }
}

/// Whole 30-day months between `last_commit` and `now`
pub fn age_in_months(now: i64, last_commit: i64) -> i64 {
    ((now - last_commit) / SECONDS_PER_DAY) / DAYS_PER_MONTH
}

/// A repository without commits is never stale
pub fn is_stale(now: i64, last_commit: Option<i64>, stale_months: u32) -> bool {
    last_commit.is_some_and(|epoch| age_in_months(now, epoch) >= i64::from(stale_months))
}

pub fn is_large(size_kb: u64, threshold_kb: u64) -> bool {
    size_kb > threshold_kb
}

/// Final statistics of one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total_repos: usize,
    pub cloned: usize,
    pub updated: usize,
    pub failed: usize,
    /// Disk usage of every working copy present after its operation
    pub total_size_kb: u64,
    /// Largest successful working copy
    pub max_size_kb: u64,
    pub max_size_repo: Option<String>,
    /// `(name, age in months)` in processing order
    pub stale_repos: Vec<(String, i64)>,
    /// `(name, size in KB)` in processing order
    pub large_repos: Vec<(String, u64)>,
    /// `(name, reason)` in processing order
    pub failures: Vec<(String, String)>,
}

impl RunSummary {
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    pub fn has_warnings(&self) -> bool {
        !self.stale_repos.is_empty() || !self.large_repos.is_empty()
    }
}

/// Accumulates a [`RunSummary`] one outcome at a time
#[derive(Debug)]
pub struct SummaryBuilder {
    summary: RunSummary,
    thresholds: Thresholds,
    now: i64,
}

impl SummaryBuilder {
    /// `now` is the epoch second staleness is measured against
    pub fn new(thresholds: Thresholds, now: i64) -> Self {
        Self {
            summary: RunSummary::default(),
            thresholds,
            now,
        }
    }

    pub fn record(&mut self, outcome: &RepoOutcome) {
        let summary = &mut self.summary;
        summary.total_repos += 1;

        match outcome.action {
            Action::Cloned => summary.cloned += 1,
            Action::Updated => summary.updated += 1,
            Action::Failed => {
                summary.failed += 1;
                let reason = outcome
                    .error
                    .as_ref()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "unknown error".to_string());
                summary.failures.push((outcome.name.clone(), reason));
            }
        }

        summary.total_size_kb += outcome.size_kb;

        // Strictly greater: the first repository wins ties
        if outcome.is_success()
            && (summary.max_size_repo.is_none() || outcome.size_kb > summary.max_size_kb)
        {
            summary.max_size_kb = outcome.size_kb;
            summary.max_size_repo = Some(outcome.name.clone());
        }

        if let Some(epoch) = outcome.last_commit_epoch {
            if is_stale(self.now, Some(epoch), self.thresholds.stale_months) {
                summary
                    .stale_repos
                    .push((outcome.name.clone(), age_in_months(self.now, epoch)));
            }
        }

        if is_large(outcome.size_kb, self.thresholds.large_repo_kb) {
            summary
                .large_repos
                .push((outcome.name.clone(), outcome.size_kb));
        }
    }

    pub fn finish(self) -> RunSummary {
        self.summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackupError;
    use quickcheck_macros::quickcheck;

    const NOW: i64 = 1_760_000_000;
    const DAY: i64 = 86_400;

    fn outcome(name: &str, action: Action, size_kb: u64, last_commit: Option<i64>) -> RepoOutcome {
        let error = (action == Action::Failed).then(|| BackupError::UpdateFailed {
            name: name.to_string(),
            reason: "network unreachable".to_string(),
        });
        RepoOutcome {
            name: name.to_string(),
            action,
            size_kb,
            last_commit_epoch: last_commit,
            error,
        }
    }

    fn action_from(byte: u8) -> Action {
        match byte % 3 {
            0 => Action::Cloned,
            1 => Action::Updated,
            _ => Action::Failed,
        }
    }

    #[test]
    fn test_age_uses_thirty_day_months() {
        assert_eq!(age_in_months(NOW, NOW), 0);
        assert_eq!(age_in_months(NOW, NOW - 29 * DAY), 0);
        assert_eq!(age_in_months(NOW, NOW - 30 * DAY), 1);
        assert_eq!(age_in_months(NOW, NOW - 179 * DAY - (DAY - 1)), 5);
        assert_eq!(age_in_months(NOW, NOW - 180 * DAY), 6);
    }

    #[test]
    fn test_stale_boundary() {
        assert!(!is_stale(NOW, Some(NOW - 179 * DAY), 6));
        assert!(is_stale(NOW, Some(NOW - 180 * DAY), 6));
        assert!(!is_stale(NOW, None, 6));
        assert!(!is_stale(NOW, Some(NOW + 400 * DAY), 6));
    }

    #[test]
    fn test_large_is_strictly_greater() {
        let threshold = 500 * 1024;
        assert!(!is_large(threshold, threshold));
        assert!(is_large(threshold + 1, threshold));
    }

    #[test]
    fn test_summary_counts_and_warnings() {
        let mut builder = SummaryBuilder::new(Thresholds::default(), NOW);
        builder.record(&outcome("fresh", Action::Cloned, 120, Some(NOW - DAY)));
        builder.record(&outcome("old", Action::Updated, 80, Some(NOW - 200 * DAY)));
        builder.record(&outcome("huge", Action::Updated, 600 * 1024, Some(NOW)));
        builder.record(&outcome("broken", Action::Failed, 0, None));
        builder.record(&outcome("empty", Action::Cloned, 40, None));

        let summary = builder.finish();

        assert_eq!(summary.total_repos, 5);
        assert_eq!(summary.cloned, 2);
        assert_eq!(summary.updated, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.total_size_kb, 120 + 80 + 600 * 1024 + 40);
        assert_eq!(summary.max_size_kb, 600 * 1024);
        assert_eq!(summary.max_size_repo.as_deref(), Some("huge"));
        assert_eq!(summary.stale_repos, vec![("old".to_string(), 6)]);
        assert_eq!(summary.large_repos, vec![("huge".to_string(), 600 * 1024)]);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].0, "broken");
        assert!(summary.has_failures());
        assert!(summary.has_warnings());
    }

    #[test]
    fn test_failed_outcome_never_sets_max() {
        let mut builder = SummaryBuilder::new(Thresholds::default(), NOW);
        builder.record(&outcome("small", Action::Updated, 10, None));
        builder.record(&outcome("leftover", Action::Failed, 9_000, Some(NOW)));

        let summary = builder.finish();
        assert_eq!(summary.max_size_kb, 10);
        assert_eq!(summary.max_size_repo.as_deref(), Some("small"));
        assert_eq!(summary.total_size_kb, 9_010);
    }

    #[test]
    fn test_max_tie_keeps_first() {
        let mut builder = SummaryBuilder::new(Thresholds::default(), NOW);
        builder.record(&outcome("first", Action::Cloned, 500, None));
        builder.record(&outcome("second", Action::Updated, 500, None));

        let summary = builder.finish();
        assert_eq!(summary.max_size_repo.as_deref(), Some("first"));
    }

    #[test]
    fn test_custom_thresholds() {
        let thresholds = Thresholds {
            stale_months: 1,
            large_repo_kb: 100,
        };
        let mut builder = SummaryBuilder::new(thresholds, NOW);
        builder.record(&outcome("repo", Action::Cloned, 101, Some(NOW - 31 * DAY)));

        let summary = builder.finish();
        assert_eq!(summary.stale_repos.len(), 1);
        assert_eq!(summary.large_repos.len(), 1);
    }

    #[quickcheck]
    fn prop_counts_add_up(entries: Vec<(u8, u32)>) -> bool {
        let mut builder = SummaryBuilder::new(Thresholds::default(), NOW);
        for (i, (action, size)) in entries.iter().enumerate() {
            builder.record(&outcome(&format!("r{i}"), action_from(*action), u64::from(*size), None));
        }
        let summary = builder.finish();

        summary.cloned + summary.updated + summary.failed == summary.total_repos
            && summary.total_repos == entries.len()
    }

    #[quickcheck]
    fn prop_max_is_first_largest_success(entries: Vec<(u8, u16)>) -> bool {
        let mut builder = SummaryBuilder::new(Thresholds::default(), NOW);
        for (i, (action, size)) in entries.iter().enumerate() {
            builder.record(&outcome(&format!("r{i}"), action_from(*action), u64::from(*size), None));
        }
        let summary = builder.finish();

        let successes: Vec<_> = entries
            .iter()
            .enumerate()
            .filter(|(_, (action, _))| action_from(*action) != Action::Failed)
            .collect();

        match successes.iter().map(|(_, (_, size))| *size).max() {
            None => summary.max_size_repo.is_none() && summary.max_size_kb == 0,
            Some(max) => {
                let (first, _) = successes
                    .iter()
                    .find(|(_, (_, size))| *size == max)
                    .expect("max comes from successes");
                summary.max_size_kb == u64::from(max)
                    && summary.max_size_repo == Some(format!("r{first}"))
            }
        }
    }

    #[quickcheck]
    fn prop_stale_matches_floor_formula(age_secs: u32, months: u8) -> bool {
        let threshold = u32::from(months % 24);
        let last_commit = NOW - i64::from(age_secs);
        let expected = (i64::from(age_secs) / 86_400) / 30 >= i64::from(threshold);

        is_stale(NOW, Some(last_commit), threshold) == expected
    }
}
