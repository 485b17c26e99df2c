//! Per-entity pagination cursor bookkeeping.
//!
//! The tracker is a pure state holder keyed by (entity id, connection
//! kind). The scheduler consults [`PaginationTracker::pending`] before
//! every round and calls [`PaginationTracker::advance`] after every page
//! is consumed. Once a connection reports no further pages it can never
//! flip back within a run.

use std::collections::HashMap;
use std::fmt;

use super::errors::FetchError;

/// The three paginated relationships the engine drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionKind {
    /// The account's top-level repository connection.
    Repositories,
    /// Branches within one repository.
    Branches,
    /// Tags within one repository.
    Tags,
}

impl fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionKind::Repositories => "repositories",
            ConnectionKind::Branches => "branches",
            ConnectionKind::Tags => "tags",
        };
        f.write_str(s)
    }
}

/// Opaque cursor plus the has-more flag for one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationCursor {
    pub cursor: Option<String>,
    pub has_more: bool,
}

impl PaginationCursor {
    /// Fresh state for a newly discovered entity: no cursor yet, at
    /// least one page assumed pending.
    fn new() -> Self {
        Self {
            cursor: None,
            has_more: true,
        }
    }
}

/// Tracks cursor state for every discovered entity, in discovery order.
#[derive(Debug, Default)]
pub struct PaginationTracker {
    states: HashMap<String, HashMap<ConnectionKind, PaginationCursor>>,
    /// Entity ids in registration order, so `pending` is deterministic.
    order: Vec<String>,
}

impl PaginationTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create cursor state for a newly discovered entity's connections.
    /// Re-registering an already known entity is a no-op, so a repository
    /// re-appearing on a later page does not reset its progress.
    pub fn register(&mut self, entity_id: &str, kinds: &[ConnectionKind]) {
        if self.states.contains_key(entity_id) {
            return;
        }
        let connections = kinds
            .iter()
            .map(|kind| (*kind, PaginationCursor::new()))
            .collect();
        self.states.insert(entity_id.to_string(), connections);
        self.order.push(entity_id.to_string());
    }

    /// Record the page-info of a consumed page.
    ///
    /// Idempotent for identical arguments. Fails for unregistered
    /// entities and for any attempt to resurrect a finished connection.
    pub fn advance(
        &mut self,
        entity_id: &str,
        kind: ConnectionKind,
        new_cursor: Option<String>,
        has_more: bool,
    ) -> Result<(), FetchError> {
        let connections = self
            .states
            .get_mut(entity_id)
            .ok_or_else(|| FetchError::state(entity_id, kind, "entity is not registered"))?;
        let state = connections
            .get_mut(&kind)
            .ok_or_else(|| FetchError::state(entity_id, kind, "connection is not tracked"))?;

        if !state.has_more {
            if state.cursor == new_cursor && !has_more {
                return Ok(());
            }
            return Err(FetchError::state(
                entity_id,
                kind,
                "connection already completed; has-more may not reset",
            ));
        }

        state.cursor = new_cursor;
        state.has_more = has_more;
        Ok(())
    }

    /// Current cursor state for one connection, if tracked.
    #[must_use]
    pub fn get(&self, entity_id: &str, kind: ConnectionKind) -> Option<&PaginationCursor> {
        self.states.get(entity_id).and_then(|c| c.get(&kind))
    }

    /// All entities whose connection of this kind still has pending
    /// pages, in discovery order.
    #[must_use]
    pub fn pending(&self, kind: ConnectionKind) -> Vec<&str> {
        self.order
            .iter()
            .filter(|id| {
                self.states
                    .get(id.as_str())
                    .and_then(|c| c.get(&kind))
                    .is_some_and(|s| s.has_more)
            })
            .map(String::as_str)
            .collect()
    }

    /// True iff every connection of this entity is finished. Unregistered
    /// entities are not complete.
    #[must_use]
    pub fn is_complete(&self, entity_id: &str) -> bool {
        self.states
            .get(entity_id)
            .is_some_and(|connections| connections.values().all(|s| !s.has_more))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPO_CONNECTIONS: &[ConnectionKind] = &[ConnectionKind::Branches, ConnectionKind::Tags];

    #[test]
    fn register_initializes_pending_state() {
        let mut tracker = PaginationTracker::new();
        tracker.register("repo-1", REPO_CONNECTIONS);

        let state = tracker.get("repo-1", ConnectionKind::Branches).unwrap();
        assert!(state.has_more);
        assert!(state.cursor.is_none());
        assert!(!tracker.is_complete("repo-1"));
    }

    #[test]
    fn register_twice_does_not_reset() {
        let mut tracker = PaginationTracker::new();
        tracker.register("repo-1", REPO_CONNECTIONS);
        tracker
            .advance("repo-1", ConnectionKind::Branches, None, false)
            .unwrap();
        tracker.register("repo-1", REPO_CONNECTIONS);

        assert!(tracker.pending(ConnectionKind::Branches).is_empty());
    }

    #[test]
    fn advance_is_idempotent_for_identical_arguments() {
        let mut tracker = PaginationTracker::new();
        tracker.register("repo-1", REPO_CONNECTIONS);

        tracker
            .advance("repo-1", ConnectionKind::Branches, Some("c1".into()), false)
            .unwrap();
        // Same arguments again: no error, no state change.
        tracker
            .advance("repo-1", ConnectionKind::Branches, Some("c1".into()), false)
            .unwrap();

        let state = tracker.get("repo-1", ConnectionKind::Branches).unwrap();
        assert_eq!(state.cursor.as_deref(), Some("c1"));
        assert!(!state.has_more);
    }

    #[test]
    fn advance_unregistered_entity_fails() {
        let mut tracker = PaginationTracker::new();
        let err = tracker
            .advance("ghost", ConnectionKind::Tags, None, false)
            .unwrap_err();
        assert!(matches!(err, FetchError::State { .. }));
    }

    #[test]
    fn has_more_never_resets_to_true() {
        let mut tracker = PaginationTracker::new();
        tracker.register("repo-1", REPO_CONNECTIONS);
        tracker
            .advance("repo-1", ConnectionKind::Tags, Some("c1".into()), false)
            .unwrap();

        let err = tracker
            .advance("repo-1", ConnectionKind::Tags, Some("c2".into()), true)
            .unwrap_err();
        assert!(matches!(err, FetchError::State { .. }));
    }

    #[test]
    fn pending_respects_discovery_order() {
        let mut tracker = PaginationTracker::new();
        tracker.register("b-repo", REPO_CONNECTIONS);
        tracker.register("a-repo", REPO_CONNECTIONS);
        tracker.register("c-repo", REPO_CONNECTIONS);
        tracker
            .advance("a-repo", ConnectionKind::Branches, None, false)
            .unwrap();

        assert_eq!(
            tracker.pending(ConnectionKind::Branches),
            vec!["b-repo", "c-repo"]
        );
        assert_eq!(
            tracker.pending(ConnectionKind::Tags),
            vec!["b-repo", "a-repo", "c-repo"]
        );
    }

    #[test]
    fn complete_requires_every_connection() {
        let mut tracker = PaginationTracker::new();
        tracker.register("repo-1", REPO_CONNECTIONS);
        tracker
            .advance("repo-1", ConnectionKind::Branches, None, false)
            .unwrap();
        assert!(!tracker.is_complete("repo-1"));

        tracker
            .advance("repo-1", ConnectionKind::Tags, None, false)
            .unwrap();
        assert!(tracker.is_complete("repo-1"));
        assert!(!tracker.is_complete("never-seen"));
    }
}
