//! Typed views of the GraphQL response payloads.
//!
//! Responses are parsed into these structs immediately after the
//! transport returns, so loosely-typed JSON never travels further into
//! the engine. A shape mismatch surfaces as
//! [`TransportError::Malformed`](super::transport::TransportError).

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use super::transport::TransportError;

/// Cursor state of one connection as reported by the API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

/// `author { name }` on a commit.
#[derive(Debug, Clone, Deserialize)]
pub struct GitActor {
    pub name: Option<String>,
}

/// A git object behind a ref target, discriminated by `__typename`.
///
/// Branch refs always target a commit. Tag refs may target a tag object
/// which itself targets another git object; the chain is resolved by the
/// assembler, not here.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "__typename")]
pub enum GitObject {
    #[serde(rename_all = "camelCase")]
    Commit {
        oid: String,
        author: Option<GitActor>,
        committed_date: Option<DateTime<Utc>>,
        message: String,
    },
    Tag {
        target: Option<Box<GitObject>>,
    },
}

/// One node of a `refs(...)` connection: a branch or tag name plus the
/// object it points at.
#[derive(Debug, Clone, Deserialize)]
pub struct RefNode {
    pub name: String,
    pub target: Option<GitObject>,
}

/// A page of a branch or tag connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefConnection {
    pub nodes: Vec<RefNode>,
    pub page_info: PageInfo,
}

/// One repository node inside the account's repository connection.
///
/// The account page query inlines the first page of both ref
/// connections, so a small repository needs no follow-up request at all.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryNode {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub url: String,
    pub is_private: bool,
    pub is_fork: bool,
    pub branches: RefConnection,
    pub tags: RefConnection,
}

/// A page of the account-level repository connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryConnection {
    pub nodes: Vec<RepositoryNode>,
    pub page_info: PageInfo,
}

/// Response shape of the account page query. The user/organization field
/// is always aliased to `account` so both kinds parse identically.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountPage {
    pub account: Option<AccountNode>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountNode {
    pub repositories: RepositoryConnection,
}

/// One aliased sub-result of a batched continuation query. Only the
/// connections that were actually requested are present.
#[derive(Debug, Clone, Deserialize)]
pub struct RepoContinuation {
    pub branches: Option<RefConnection>,
    pub tags: Option<RefConnection>,
}

/// Parse a raw `data` value into a typed shape, failing fast on mismatch.
pub fn parse<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, TransportError> {
    serde_json::from_value(value).map_err(|e| TransportError::malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_commit_target() {
        let node: RefNode = parse(json!({
            "name": "main",
            "target": {
                "__typename": "Commit",
                "oid": "abc123",
                "author": { "name": "ada" },
                "committedDate": "2024-03-01T12:00:00Z",
                "message": "first\n\nbody here"
            }
        }))
        .unwrap();

        assert_eq!(node.name, "main");
        match node.target.unwrap() {
            GitObject::Commit { oid, author, .. } => {
                assert_eq!(oid, "abc123");
                assert_eq!(author.unwrap().name.as_deref(), Some("ada"));
            }
            GitObject::Tag { .. } => panic!("expected commit"),
        }
    }

    #[test]
    fn parses_annotated_tag_chain() {
        let node: RefNode = parse(json!({
            "name": "v1.0",
            "target": {
                "__typename": "Tag",
                "target": {
                    "__typename": "Commit",
                    "oid": "def456",
                    "author": null,
                    "committedDate": null,
                    "message": "release"
                }
            }
        }))
        .unwrap();

        match node.target.unwrap() {
            GitObject::Tag { target } => match *target.unwrap() {
                GitObject::Commit { oid, .. } => assert_eq!(oid, "def456"),
                GitObject::Tag { .. } => panic!("expected commit at depth 1"),
            },
            GitObject::Commit { .. } => panic!("expected tag object"),
        }
    }

    #[test]
    fn shape_mismatch_is_malformed() {
        let err = parse::<AccountPage>(json!({ "account": { "repositories": 42 } })).unwrap_err();
        assert!(matches!(err, TransportError::Malformed { .. }));
    }
}
