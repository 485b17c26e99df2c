//! The pagination and batching engine.
//!
//! # Module structure
//!
//! - [`state`] - per-entity cursor bookkeeping ([`PaginationTracker`])
//! - [`scheduler`] - round driver ([`Fetcher`], [`FetchOptions`])
//! - [`errors`] - the [`FetchError`] taxonomy
//! - [`report`] - per-run accounting ([`FetchReport`])
//!
//! The merger and assembler are internal: callers hand a login to
//! [`Fetcher::fetch`] and receive a finished [`FetchOutcome`].

pub mod errors;
pub mod report;
pub mod scheduler;
pub mod state;

mod assemble;
mod merge;

pub use errors::FetchError;
pub use report::FetchReport;
pub use scheduler::{
    FetchOptions, FetchOutcome, Fetcher, DEFAULT_BATCH_SIZE, DEFAULT_MAX_IN_FLIGHT,
    DEFAULT_PAGE_SIZE, DEFAULT_TAG_DEREF_LIMIT,
};
pub use state::{ConnectionKind, PaginationCursor, PaginationTracker};
