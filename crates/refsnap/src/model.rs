//! The normalized snapshot model handed to callers.
//!
//! Everything here is plain owned data: one [`Account`] tree per fetch,
//! discarded and rebuilt on every invocation. Pagination bookkeeping lives
//! in [`crate::fetch::state`], never in the model itself.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Whether the queried login is a user or an organization.
///
/// GitHub exposes these as distinct top-level GraphQL fields, so the
/// query builder needs to know which one to select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    User,
    Organization,
}

impl AccountKind {
    /// The GraphQL field name used to look up this kind of account.
    #[must_use]
    pub fn graphql_field(self) -> &'static str {
        match self {
            AccountKind::User => "user",
            AccountKind::Organization => "organization",
        }
    }
}

/// The root of a snapshot: one account and all of its repositories,
/// in discovery order.
#[derive(Debug, Clone, Serialize)]
pub struct Account {
    /// The queried login.
    pub login: String,
    /// User or organization.
    pub kind: AccountKind,
    /// Repositories in the order the repository connection returned them.
    pub repositories: Vec<Repository>,
}

/// A single repository with its fully paginated branches and tags.
#[derive(Debug, Clone, Serialize)]
pub struct Repository {
    /// Stable GraphQL node id.
    pub id: String,
    /// Repository name (without the owner prefix).
    pub name: String,
    pub description: Option<String>,
    pub url: String,
    pub is_private: bool,
    pub is_fork: bool,
    /// Branches in page-arrival order.
    pub branches: Vec<Branch>,
    /// Tags in page-arrival order.
    pub tags: Vec<Tag>,
}

/// A branch and the commit at its head.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Branch {
    pub name: String,
    pub commit: CommitInfo,
}

/// A tag, always resolved to the terminal commit it points at.
///
/// Annotated tags (tag objects pointing at further tag objects) are
/// dereferenced by the assembler before a `Tag` is ever constructed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tag {
    pub name: String,
    pub commit: CommitInfo,
}

/// Normalized commit metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitInfo {
    /// Commit SHA (the GraphQL `oid`).
    pub sha: String,
    /// Author name, when the API reports one.
    pub author: Option<String>,
    /// Commit timestamp.
    pub committed_at: Option<DateTime<Utc>>,
    /// First line of the commit message.
    pub summary: String,
    /// Remainder of the commit message, without the summary line.
    pub body: String,
}
