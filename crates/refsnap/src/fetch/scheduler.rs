//! Round-driven batch scheduler.
//!
//! The scheduler first paginates the account's repository connection
//! (each page carries the first branch and tag pages of every new
//! repository inline), then runs continuation rounds: every repository
//! with a pending branch or tag connection is packed into batches of at
//! most `batch_size` aliased sub-queries, the batches of a round execute
//! concurrently under the in-flight bound, and their pages are merged
//! sequentially on the driver before the tracker decides whether another
//! round is needed. Rounds repeat until nothing is pending.
//!
//! Failure semantics: transient transport errors are retried per
//! [`RetryConfig`]; once a batch gives out, everything already merged is
//! still assembled and attached to [`FetchError::Aborted`]. Protocol
//! violations (stale cursors, duplicate nodes) abort immediately and are
//! never retried.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::assemble::assemble;
use super::errors::FetchError;
use super::merge::AccountDraft;
use super::report::FetchReport;
use super::state::{ConnectionKind, PaginationTracker};
use crate::graphql::query::{self, BatchItem, PageCursor};
use crate::graphql::transport::{GraphqlTransport, TransportError};
use crate::graphql::types::{self, AccountPage, PageInfo, RefConnection, RepoContinuation};
use crate::model::{Account, AccountKind};
use crate::retry::{execute_with_retry, RetryConfig};

/// Default connection page size. Overridable via configuration
/// (`REFSNAP_PAGE_SIZE` in the CLI layer).
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Default maximum entities per batched continuation document.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Default bound on simultaneously in-flight requests within one round.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 4;

/// Default maximum annotated-tag hops before a tag is dropped.
pub const DEFAULT_TAG_DEREF_LIMIT: usize = 10;

/// Tunables of one fetch run.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// `first:` argument of every connection.
    pub page_size: u32,
    /// Maximum entities combined into one aliased document.
    pub batch_size: usize,
    /// Maximum concurrently in-flight requests (distinct from batch size).
    pub max_in_flight: usize,
    /// Annotated-tag dereference depth limit.
    pub tag_deref_limit: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            tag_deref_limit: DEFAULT_TAG_DEREF_LIMIT,
        }
    }
}

impl FetchOptions {
    /// Reject unusable sizes before any request goes out.
    pub fn validate(&self) -> Result<(), FetchError> {
        if self.page_size == 0 {
            return Err(FetchError::Config("page size must be positive".into()));
        }
        if self.batch_size == 0 {
            return Err(FetchError::Config("batch size must be positive".into()));
        }
        if self.max_in_flight == 0 {
            return Err(FetchError::Config(
                "max in-flight requests must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// A completed (or cancelled-but-consistent) fetch: the model plus the
/// run's accounting.
#[derive(Debug)]
pub struct FetchOutcome {
    pub account: Account,
    pub report: FetchReport,
}

/// Internal distinction between "the transport gave out" (abort with
/// partial model) and "a pagination invariant broke" (abort outright).
enum RoundError {
    Transport(TransportError),
    Fatal(FetchError),
}

impl From<TransportError> for RoundError {
    fn from(err: TransportError) -> Self {
        Self::Transport(err)
    }
}

impl From<FetchError> for RoundError {
    fn from(err: FetchError) -> Self {
        Self::Fatal(err)
    }
}

/// Mutable state of one run, threaded through the rounds.
struct RunState {
    draft: AccountDraft,
    tracker: PaginationTracker,
    rounds: usize,
    requests: Arc<AtomicUsize>,
    cancelled: bool,
}

/// Drives a complete account snapshot through the transport.
pub struct Fetcher {
    transport: Arc<dyn GraphqlTransport>,
    options: FetchOptions,
    retry: RetryConfig,
    cancel: Arc<AtomicBool>,
}

impl Fetcher {
    /// Validate the options and build a fetcher.
    pub fn new(
        transport: Arc<dyn GraphqlTransport>,
        options: FetchOptions,
    ) -> Result<Self, FetchError> {
        options.validate()?;
        Ok(Self {
            transport,
            options,
            retry: RetryConfig::default(),
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Replace the default retry policy.
    #[must_use]
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Observe an external cancellation flag. The flag is checked between
    /// rounds; requests already in flight complete and their pages are
    /// merged before the model is returned.
    #[must_use]
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Fetch every repository of `login` with all branches and tags.
    pub async fn fetch(&self, login: &str, kind: AccountKind) -> Result<FetchOutcome, FetchError> {
        let mut run = RunState {
            draft: AccountDraft::new(login, kind),
            tracker: PaginationTracker::new(),
            rounds: 0,
            requests: Arc::new(AtomicUsize::new(0)),
            cancelled: false,
        };

        let outcome = self.drive(login, kind, &mut run).await;

        let RunState {
            draft,
            tracker,
            rounds,
            requests,
            cancelled,
        } = run;
        let (account, stats) = assemble(draft, self.options.tag_deref_limit);
        let complete = account
            .repositories
            .iter()
            .filter(|r| tracker.is_complete(&r.id))
            .count();
        let report = FetchReport {
            rounds,
            requests: requests.load(Ordering::Relaxed),
            complete_repositories: complete,
            incomplete_repositories: account.repositories.len() - complete,
            branches: account.repositories.iter().map(|r| r.branches.len()).sum(),
            tags: account.repositories.iter().map(|r| r.tags.len()).sum(),
            tags_skipped: stats.tags_skipped,
            branches_skipped: stats.branches_skipped,
            cancelled,
        };

        match outcome {
            Ok(()) => {
                tracing::info!(
                    login,
                    rounds = report.rounds,
                    requests = report.requests,
                    repositories = account.repositories.len(),
                    branches = report.branches,
                    tags = report.tags,
                    "fetch finished"
                );
                Ok(FetchOutcome { account, report })
            }
            Err(RoundError::Fatal(err)) => Err(err),
            Err(RoundError::Transport(cause)) => Err(FetchError::Aborted {
                login: login.to_string(),
                cause,
                partial: Box::new(account),
                report,
            }),
        }
    }

    fn cancellation_requested(&self, run: &mut RunState) -> bool {
        if self.cancel.load(Ordering::Acquire) {
            tracing::info!("cancellation requested, stopping between rounds");
            run.cancelled = true;
            return true;
        }
        false
    }

    async fn drive(
        &self,
        login: &str,
        kind: AccountKind,
        run: &mut RunState,
    ) -> Result<(), RoundError> {
        run.tracker.register(login, &[ConnectionKind::Repositories]);
        let document = query::account_page_document(kind);

        // Account pages run sequentially; each page inlines the first
        // branch and tag pages of the repositories it introduces.
        while run
            .tracker
            .get(login, ConnectionKind::Repositories)
            .is_some_and(|s| s.has_more)
        {
            if self.cancellation_requested(run) {
                return Ok(());
            }
            let after = run
                .tracker
                .get(login, ConnectionKind::Repositories)
                .and_then(|s| s.cursor.clone());
            run.rounds += 1;
            let round = run.rounds;

            let variables =
                query::account_page_variables(login, self.options.page_size, after.as_deref());
            let value = execute_with_retry(
                self.transport.as_ref(),
                &document,
                &variables,
                &self.retry,
                &run.requests,
            )
            .await?;
            let page: AccountPage = types::parse(value)?;
            let node = page.account.ok_or_else(|| {
                TransportError::malformed(format!("no {} named {login:?}", kind.graphql_field()))
            })?;

            let connection = node.repositories;
            let info = connection.page_info.clone();
            let discovered = run.draft.merge_repository_page(connection.nodes, round)?;
            for repo in discovered {
                run.tracker
                    .register(&repo.id, &[ConnectionKind::Branches, ConnectionKind::Tags]);
                run.tracker.advance(
                    &repo.id,
                    ConnectionKind::Branches,
                    repo.branch_page.end_cursor,
                    repo.branch_page.has_next_page,
                )?;
                run.tracker.advance(
                    &repo.id,
                    ConnectionKind::Tags,
                    repo.tag_page.end_cursor,
                    repo.tag_page.has_next_page,
                )?;
            }

            if info.has_next_page && info.end_cursor == after {
                return Err(FetchError::StaleProgress {
                    entity: login.to_string(),
                    kind: ConnectionKind::Repositories,
                    round,
                }
                .into());
            }
            run.tracker.advance(
                login,
                ConnectionKind::Repositories,
                info.end_cursor,
                info.has_next_page,
            )?;
        }

        // Continuation rounds until no connection is pending anywhere.
        loop {
            if self.cancellation_requested(run) {
                return Ok(());
            }
            let items = self.pending_batch_items(run);
            if items.is_empty() {
                return Ok(());
            }
            run.rounds += 1;
            let round = run.rounds;
            tracing::debug!(round, pending = items.len(), "starting continuation round");
            self.run_round(login, round, items, run).await?;
        }
    }

    /// Batch slots for every repository with pending pages, in discovery
    /// order. A repository needing both connections occupies one slot.
    fn pending_batch_items(&self, run: &RunState) -> Vec<BatchItem> {
        let pending_branches: HashSet<&str> = run
            .tracker
            .pending(ConnectionKind::Branches)
            .into_iter()
            .collect();
        let pending_tags: HashSet<&str> = run
            .tracker
            .pending(ConnectionKind::Tags)
            .into_iter()
            .collect();

        run.draft
            .repos
            .iter()
            .filter_map(|repo| {
                let resume = |kind| {
                    PageCursor::resuming_at(
                        run.tracker.get(&repo.id, kind).and_then(|s| s.cursor.clone()),
                    )
                };
                let branches = pending_branches
                    .contains(repo.id.as_str())
                    .then(|| resume(ConnectionKind::Branches));
                let tags = pending_tags
                    .contains(repo.id.as_str())
                    .then(|| resume(ConnectionKind::Tags));
                if branches.is_none() && tags.is_none() {
                    return None;
                }
                Some(BatchItem {
                    repo_id: repo.id.clone(),
                    name: repo.name.clone(),
                    branches,
                    tags,
                })
            })
            .collect()
    }

    /// Execute one round: all batches concurrently, merges sequentially.
    async fn run_round(
        &self,
        login: &str,
        round: usize,
        items: Vec<BatchItem>,
        run: &mut RunState,
    ) -> Result<(), RoundError> {
        let batches: Vec<Vec<BatchItem>> = items
            .chunks(self.options.batch_size)
            .map(<[BatchItem]>::to_vec)
            .collect();

        let semaphore = Arc::new(Semaphore::new(self.options.max_in_flight));
        let mut tasks = JoinSet::new();
        for (idx, batch) in batches.iter().enumerate() {
            let document = query::continuation_document(batch);
            let variables =
                query::continuation_variables(batch, login, self.options.page_size);
            let transport = Arc::clone(&self.transport);
            let retry = self.retry.clone();
            let requests = Arc::clone(&run.requests);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                let result = execute_with_retry(
                    transport.as_ref(),
                    &document,
                    &variables,
                    &retry,
                    &requests,
                )
                .await;
                (idx, result)
            });
        }

        let mut results: Vec<Option<Result<Value, TransportError>>> =
            (0..batches.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            let (idx, result) = joined.expect("batch task panicked");
            results[idx] = Some(result);
        }

        // Merge every page that arrived, in batch order, before
        // surfacing any failure: merged data stays part of the model.
        let mut failure: Option<TransportError> = None;
        for (idx, batch) in batches.into_iter().enumerate() {
            let result = results[idx].take().expect("missing batch result");
            match result {
                Ok(value) => {
                    match types::parse::<HashMap<String, Option<RepoContinuation>>>(value) {
                        Ok(mut sections) => self.merge_batch(round, &batch, &mut sections, run)?,
                        Err(err) => {
                            if failure.is_none() {
                                failure = Some(err);
                            }
                        }
                    }
                }
                Err(err) => {
                    if failure.is_none() {
                        failure = Some(err);
                    }
                }
            }
        }

        match failure {
            Some(cause) => Err(cause.into()),
            None => Ok(()),
        }
    }

    /// Demultiplex one batched response by alias and fold it in.
    fn merge_batch(
        &self,
        round: usize,
        batch: &[BatchItem],
        sections: &mut HashMap<String, Option<RepoContinuation>>,
        run: &mut RunState,
    ) -> Result<(), RoundError> {
        for (idx, item) in batch.iter().enumerate() {
            let alias = query::alias(idx);
            let section = sections
                .remove(&alias)
                .ok_or_else(|| {
                    TransportError::malformed(format!("response is missing alias {alias}"))
                })?
                .ok_or_else(|| {
                    TransportError::malformed(format!(
                        "repository {:?} vanished mid-fetch",
                        item.name
                    ))
                })?;

            let mut progressed = false;
            if let Some(prev) = &item.branches {
                let connection = section.branches.ok_or_else(|| {
                    TransportError::malformed(format!(
                        "alias {alias} is missing the requested branch connection"
                    ))
                })?;
                progressed |= page_progressed(prev, &connection.page_info);
                self.merge_connection(item, ConnectionKind::Branches, connection, round, run)?;
            }
            if let Some(prev) = &item.tags {
                let connection = section.tags.ok_or_else(|| {
                    TransportError::malformed(format!(
                        "alias {alias} is missing the requested tag connection"
                    ))
                })?;
                progressed |= page_progressed(prev, &connection.page_info);
                self.merge_connection(item, ConnectionKind::Tags, connection, round, run)?;
            }

            if !progressed {
                let kind = if item.branches.is_some() {
                    ConnectionKind::Branches
                } else {
                    ConnectionKind::Tags
                };
                return Err(FetchError::StaleProgress {
                    entity: item.repo_id.clone(),
                    kind,
                    round,
                }
                .into());
            }
        }
        Ok(())
    }

    fn merge_connection(
        &self,
        item: &BatchItem,
        kind: ConnectionKind,
        connection: RefConnection,
        round: usize,
        run: &mut RunState,
    ) -> Result<(), FetchError> {
        let RefConnection { nodes, page_info } = connection;
        run.draft.merge_ref_page(&item.repo_id, kind, nodes, round)?;
        run.tracker
            .advance(&item.repo_id, kind, page_info.end_cursor, page_info.has_next_page)
    }
}

/// A page made progress when its cursor moved or the connection finished.
/// Anything else would loop forever and is treated as a protocol violation.
fn page_progressed(prev: &PageCursor, info: &PageInfo) -> bool {
    !info.has_next_page || info.end_cursor != prev.after
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_sizes_are_rejected() {
        let ok = FetchOptions::default();
        assert!(ok.validate().is_ok());

        for bad in [
            FetchOptions {
                page_size: 0,
                ..Default::default()
            },
            FetchOptions {
                batch_size: 0,
                ..Default::default()
            },
            FetchOptions {
                max_in_flight: 0,
                ..Default::default()
            },
        ] {
            assert!(matches!(bad.validate(), Err(FetchError::Config(_))));
        }
    }

    #[test]
    fn progress_detection() {
        let fresh = PageCursor::resuming_at(Some("c1".into()));
        let finished = PageInfo {
            has_next_page: false,
            end_cursor: Some("c1".into()),
        };
        let moved = PageInfo {
            has_next_page: true,
            end_cursor: Some("c2".into()),
        };
        let stuck = PageInfo {
            has_next_page: true,
            end_cursor: Some("c1".into()),
        };
        assert!(page_progressed(&fresh, &finished));
        assert!(page_progressed(&fresh, &moved));
        assert!(!page_progressed(&fresh, &stuck));
    }
}
