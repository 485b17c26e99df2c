//! refsnap - snapshot every repository, branch and tag of a GitHub
//! account through the GraphQL API.
//!
//! The library drives cursor pagination over the account's repository
//! connection and over each repository's branch and tag connections,
//! batching the pending continuations of many repositories into single
//! aliased documents to keep the request count low. The result is one
//! in-memory [`Account`] tree per run; nothing is cached across runs.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use refsnap::{AccountKind, FetchOptions, Fetcher, HttpTransport};
//!
//! let transport = Arc::new(HttpTransport::new(token, Duration::from_secs(30))?);
//! let fetcher = Fetcher::new(transport, FetchOptions::default())?;
//! let outcome = fetcher.fetch("rust-lang", AccountKind::Organization).await?;
//! println!("{} repositories", outcome.account.repositories.len());
//! ```

pub mod fetch;
pub mod graphql;
pub mod model;
pub mod retry;

pub use fetch::{
    ConnectionKind, FetchError, FetchOptions, FetchOutcome, FetchReport, Fetcher,
    PaginationTracker,
};
pub use graphql::{GraphqlTransport, HttpTransport, TransportError};
pub use model::{Account, AccountKind, Branch, CommitInfo, Repository, Tag};
pub use retry::RetryConfig;
