//! Final normalization pass, run once all pagination has settled.
//!
//! Annotated tags are dereferenced to their terminal commit and commit
//! messages are split into summary and body. A tag whose chain never
//! reaches a commit within the depth limit is dropped with a warning;
//! one bad tag never fails the run.

use super::merge::{AccountDraft, RefEntry};
use crate::graphql::types::GitObject;
use crate::model::{Account, Branch, CommitInfo, Repository, Tag};

/// Counters produced while assembling, folded into the fetch report.
#[derive(Debug, Default)]
pub(crate) struct AssembleStats {
    pub tags_skipped: usize,
    pub branches_skipped: usize,
}

/// Split a raw commit message into first line and remainder.
fn split_message(message: &str) -> (String, String) {
    match message.split_once('\n') {
        Some((summary, body)) => (
            summary.trim_end_matches('\r').to_string(),
            body.trim_start_matches(['\r', '\n']).to_string(),
        ),
        None => (message.to_string(), String::new()),
    }
}

/// Follow a ref target through annotated-tag objects until a commit is
/// reached. `None` when the chain is truncated or exceeds `limit` hops.
fn resolve_commit(target: &GitObject, limit: usize) -> Option<CommitInfo> {
    let mut current = target;
    let mut hops = 0;
    loop {
        match current {
            GitObject::Commit {
                oid,
                author,
                committed_date,
                message,
            } => {
                let (summary, body) = split_message(message);
                return Some(CommitInfo {
                    sha: oid.clone(),
                    author: author.as_ref().and_then(|a| a.name.clone()),
                    committed_at: *committed_date,
                    summary,
                    body,
                });
            }
            GitObject::Tag { target } => {
                hops += 1;
                if hops > limit {
                    return None;
                }
                current = target.as_deref()?;
            }
        }
    }
}

fn assemble_branches(
    repo_name: &str,
    entries: Vec<RefEntry>,
    limit: usize,
    stats: &mut AssembleStats,
) -> Vec<Branch> {
    let mut branches = Vec::with_capacity(entries.len());
    for entry in entries {
        let commit = entry.target.as_ref().and_then(|t| resolve_commit(t, limit));
        match commit {
            Some(commit) => branches.push(Branch {
                name: entry.name,
                commit,
            }),
            None => {
                stats.branches_skipped += 1;
                tracing::warn!(
                    repo = repo_name,
                    branch = %entry.name,
                    "branch head did not resolve to a commit, skipping"
                );
            }
        }
    }
    branches
}

fn assemble_tags(
    repo_name: &str,
    entries: Vec<RefEntry>,
    limit: usize,
    stats: &mut AssembleStats,
) -> Vec<Tag> {
    let mut tags = Vec::with_capacity(entries.len());
    for entry in entries {
        let commit = entry.target.as_ref().and_then(|t| resolve_commit(t, limit));
        match commit {
            Some(commit) => tags.push(Tag {
                name: entry.name,
                commit,
            }),
            None => {
                stats.tags_skipped += 1;
                tracing::warn!(
                    repo = repo_name,
                    tag = %entry.name,
                    deref_limit = limit,
                    "tag did not dereference to a commit, skipping"
                );
            }
        }
    }
    tags
}

/// Turn the merged draft into the final account tree.
pub(crate) fn assemble(draft: AccountDraft, tag_deref_limit: usize) -> (Account, AssembleStats) {
    let mut stats = AssembleStats::default();
    let repositories = draft
        .repos
        .into_iter()
        .map(|repo| {
            let branches = assemble_branches(&repo.name, repo.branches, tag_deref_limit, &mut stats);
            let tags = assemble_tags(&repo.name, repo.tags, tag_deref_limit, &mut stats);
            Repository {
                id: repo.id,
                name: repo.name,
                description: repo.description,
                url: repo.url,
                is_private: repo.is_private,
                is_fork: repo.is_fork,
                branches,
                tags,
            }
        })
        .collect();

    (
        Account {
            login: draft.login,
            kind: draft.kind,
            repositories,
        },
        stats,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphql::types::GitActor;

    fn commit(oid: &str, message: &str) -> GitObject {
        GitObject::Commit {
            oid: oid.to_string(),
            author: Some(GitActor {
                name: Some("ada".to_string()),
            }),
            committed_date: None,
            message: message.to_string(),
        }
    }

    /// Wrap an object in `depth` annotated-tag hops.
    fn nested(depth: usize, inner: GitObject) -> GitObject {
        (0..depth).fold(inner, |acc, _| GitObject::Tag {
            target: Some(Box::new(acc)),
        })
    }

    #[test]
    fn message_splits_into_summary_and_body() {
        assert_eq!(
            split_message("fix parser\n\nhandle empty input\nand CRLF"),
            (
                "fix parser".to_string(),
                "handle empty input\nand CRLF".to_string()
            )
        );
        assert_eq!(split_message("oneliner"), ("oneliner".to_string(), String::new()));
        assert_eq!(
            split_message("crlf summary\r\nbody"),
            ("crlf summary".to_string(), "body".to_string())
        );
    }

    #[test]
    fn direct_commit_resolves_trivially() {
        let info = resolve_commit(&commit("abc", "msg"), 10).unwrap();
        assert_eq!(info.sha, "abc");
        assert_eq!(info.author.as_deref(), Some("ada"));
    }

    #[test]
    fn annotated_tag_resolves_through_one_hop() {
        let info = resolve_commit(&nested(1, commit("def", "release\n\nnotes")), 10).unwrap();
        assert_eq!(info.sha, "def");
        assert_eq!(info.summary, "release");
        assert_eq!(info.body, "notes");
    }

    #[test]
    fn chain_beyond_depth_limit_is_unresolved() {
        let limit = 3;
        assert!(resolve_commit(&nested(limit, commit("x", "m")), limit).is_some());
        assert!(resolve_commit(&nested(limit + 1, commit("x", "m")), limit).is_none());
    }

    #[test]
    fn truncated_chain_is_unresolved() {
        let truncated = GitObject::Tag { target: None };
        assert!(resolve_commit(&truncated, 10).is_none());
    }
}
