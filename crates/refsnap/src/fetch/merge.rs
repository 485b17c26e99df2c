//! Folding page payloads into the growing in-memory model.
//!
//! The merger only ever appends: nodes arrive in page order and stay in
//! that order, and nothing from a previous round is rewritten.
//! Repositories are deduplicated by node id; a duplicate branch or tag
//! name within one repository means the API broke cursor-pagination
//! disjointness and is fatal.

use std::collections::{HashMap, HashSet};

use super::errors::FetchError;
use super::state::ConnectionKind;
use crate::graphql::types::{GitObject, PageInfo, RefNode, RepositoryNode};
use crate::model::AccountKind;

/// A branch or tag as merged, before tag dereferencing.
#[derive(Debug, Clone)]
pub(crate) struct RefEntry {
    pub name: String,
    pub target: Option<GitObject>,
}

/// One repository under construction.
#[derive(Debug, Clone)]
pub(crate) struct RepoDraft {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub url: String,
    pub is_private: bool,
    pub is_fork: bool,
    pub branches: Vec<RefEntry>,
    pub tags: Vec<RefEntry>,
    branch_names: HashSet<String>,
    tag_names: HashSet<String>,
}

/// Inline page-info captured when a repository is first discovered, so
/// the scheduler can seed the tracker for both child connections.
#[derive(Debug)]
pub(crate) struct DiscoveredRepo {
    pub id: String,
    pub branch_page: PageInfo,
    pub tag_page: PageInfo,
}

/// The whole account model under construction.
#[derive(Debug)]
pub(crate) struct AccountDraft {
    pub login: String,
    pub kind: AccountKind,
    pub repos: Vec<RepoDraft>,
    by_id: HashMap<String, usize>,
}

impl AccountDraft {
    pub(crate) fn new(login: &str, kind: AccountKind) -> Self {
        Self {
            login: login.to_string(),
            kind,
            repos: Vec::new(),
            by_id: HashMap::new(),
        }
    }

    /// Merge one page of the account's repository connection, including
    /// the inlined first pages of each new repository's branches and
    /// tags. Repositories already merged are skipped (dedup by id).
    pub(crate) fn merge_repository_page(
        &mut self,
        nodes: Vec<RepositoryNode>,
        round: usize,
    ) -> Result<Vec<DiscoveredRepo>, FetchError> {
        let mut discovered = Vec::with_capacity(nodes.len());
        for node in nodes {
            if self.by_id.contains_key(&node.id) {
                tracing::debug!(repo = %node.name, "repository repeated across pages, skipping");
                continue;
            }

            let draft = RepoDraft {
                id: node.id.clone(),
                name: node.name,
                description: node.description,
                url: node.url,
                is_private: node.is_private,
                is_fork: node.is_fork,
                branches: Vec::new(),
                tags: Vec::new(),
                branch_names: HashSet::new(),
                tag_names: HashSet::new(),
            };
            self.by_id.insert(node.id.clone(), self.repos.len());
            self.repos.push(draft);

            self.merge_ref_page(&node.id, ConnectionKind::Branches, node.branches.nodes, round)?;
            self.merge_ref_page(&node.id, ConnectionKind::Tags, node.tags.nodes, round)?;

            discovered.push(DiscoveredRepo {
                id: node.id,
                branch_page: node.branches.page_info,
                tag_page: node.tags.page_info,
            });
        }
        Ok(discovered)
    }

    /// Append one page of branch or tag nodes to the owning repository.
    pub(crate) fn merge_ref_page(
        &mut self,
        repo_id: &str,
        kind: ConnectionKind,
        nodes: Vec<RefNode>,
        round: usize,
    ) -> Result<(), FetchError> {
        let idx = *self.by_id.get(repo_id).ok_or_else(|| {
            FetchError::state(repo_id, kind, "page received for unknown repository")
        })?;
        let repo = &mut self.repos[idx];

        let (entries, seen) = match kind {
            ConnectionKind::Branches => (&mut repo.branches, &mut repo.branch_names),
            ConnectionKind::Tags => (&mut repo.tags, &mut repo.tag_names),
            ConnectionKind::Repositories => {
                return Err(FetchError::state(
                    repo_id,
                    kind,
                    "repository connection has no ref pages",
                ));
            }
        };

        for node in nodes {
            if !seen.insert(node.name.clone()) {
                return Err(FetchError::DataIntegrity {
                    repo: repo.name.clone(),
                    kind,
                    name: node.name,
                    round,
                });
            }
            entries.push(RefEntry {
                name: node.name,
                target: node.target,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphql::types::RefConnection;
    use serde_json::json;

    fn repo_node(id: &str, name: &str, branches: &[&str], tags: &[&str]) -> RepositoryNode {
        let refs = |names: &[&str]| RefConnection {
            nodes: names
                .iter()
                .map(|n| RefNode {
                    name: (*n).to_string(),
                    target: None,
                })
                .collect(),
            page_info: crate::graphql::types::parse(json!({
                "hasNextPage": false,
                "endCursor": null,
            }))
            .unwrap(),
        };
        RepositoryNode {
            id: id.to_string(),
            name: name.to_string(),
            description: None,
            url: format!("https://github.com/acme/{name}"),
            is_private: false,
            is_fork: false,
            branches: refs(branches),
            tags: refs(tags),
        }
    }

    fn ref_nodes(names: &[&str]) -> Vec<RefNode> {
        names
            .iter()
            .map(|n| RefNode {
                name: (*n).to_string(),
                target: None,
            })
            .collect()
    }

    #[test]
    fn appends_pages_in_arrival_order() {
        let mut draft = AccountDraft::new("acme", AccountKind::Organization);
        draft
            .merge_repository_page(vec![repo_node("id-1", "widget", &["main"], &[])], 1)
            .unwrap();
        draft
            .merge_ref_page("id-1", ConnectionKind::Branches, ref_nodes(&["dev", "ci"]), 2)
            .unwrap();
        draft
            .merge_ref_page("id-1", ConnectionKind::Branches, ref_nodes(&["release"]), 3)
            .unwrap();

        let names: Vec<_> = draft.repos[0].branches.iter().map(|b| &b.name).collect();
        assert_eq!(names, ["main", "dev", "ci", "release"]);
    }

    #[test]
    fn duplicate_branch_name_is_a_data_integrity_error() {
        let mut draft = AccountDraft::new("acme", AccountKind::User);
        draft
            .merge_repository_page(vec![repo_node("id-1", "widget", &["main"], &[])], 1)
            .unwrap();

        let err = draft
            .merge_ref_page("id-1", ConnectionKind::Branches, ref_nodes(&["main"]), 2)
            .unwrap_err();
        match err {
            FetchError::DataIntegrity { repo, kind, name, round } => {
                assert_eq!(repo, "widget");
                assert_eq!(kind, ConnectionKind::Branches);
                assert_eq!(name, "main");
                assert_eq!(round, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn repeated_repository_node_is_skipped() {
        let mut draft = AccountDraft::new("acme", AccountKind::User);
        draft
            .merge_repository_page(vec![repo_node("id-1", "widget", &["main"], &[])], 1)
            .unwrap();
        // Same id again on a later page: skipped, including its inline refs.
        let discovered = draft
            .merge_repository_page(vec![repo_node("id-1", "widget", &["main"], &[])], 2)
            .unwrap();

        assert!(discovered.is_empty());
        assert_eq!(draft.repos.len(), 1);
        assert_eq!(draft.repos[0].branches.len(), 1);
    }

    #[test]
    fn page_for_unknown_repository_is_a_state_error() {
        let mut draft = AccountDraft::new("acme", AccountKind::User);
        let err = draft
            .merge_ref_page("ghost", ConnectionKind::Tags, ref_nodes(&["v1"]), 1)
            .unwrap_err();
        assert!(matches!(err, FetchError::State { .. }));
    }
}
