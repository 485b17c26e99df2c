//! Per-run fetch accounting.

use serde::Serialize;

/// Observability counters for one fetch run. Accumulated in the run
/// context instead of any process-wide state, and returned alongside the
/// model (also attached to an aborted fetch so callers can report how
/// much of the account was covered).
#[derive(Debug, Clone, Default, Serialize)]
pub struct FetchReport {
    /// Scheduler iterations, including the account-page rounds.
    pub rounds: usize,
    /// Transport executions, counting retries.
    pub requests: usize,
    /// Repositories whose branch and tag connections both finished.
    pub complete_repositories: usize,
    /// Repositories with at least one connection still pending when the
    /// run ended (cancellation or abort).
    pub incomplete_repositories: usize,
    /// Total branches in the returned model.
    pub branches: usize,
    /// Total tags in the returned model.
    pub tags: usize,
    /// Tags dropped because their annotated-tag chain never reached a
    /// commit within the configured depth limit.
    pub tags_skipped: usize,
    /// Branches dropped because their head target was missing.
    pub branches_skipped: usize,
    /// True when the run stopped early because cancellation was
    /// requested between rounds.
    pub cancelled: bool,
}

impl FetchReport {
    /// True when every repository finished both of its connections.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.incomplete_repositories == 0 && !self.cancelled
    }
}
