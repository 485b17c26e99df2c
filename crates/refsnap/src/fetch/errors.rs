//! Fetch-engine error taxonomy.

use thiserror::Error;

use super::report::FetchReport;
use super::state::ConnectionKind;
use crate::graphql::TransportError;
use crate::model::Account;

/// Terminal failures of a fetch run.
///
/// `Config` is raised before any request goes out. `State`,
/// `StaleProgress` and `DataIntegrity` mean the pagination protocol
/// assumptions were violated; they are never retried and always carry
/// enough context (entity, connection kind, round) to diagnose the
/// violation. `Aborted` is the one variant callers are expected to
/// recover from: it carries whatever partial model was merged before the
/// transport gave out.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("pagination state error for {entity} ({kind}): {message}")]
    State {
        entity: String,
        kind: ConnectionKind,
        message: String,
    },

    #[error("no pagination progress for {entity} ({kind}) in round {round}")]
    StaleProgress {
        entity: String,
        kind: ConnectionKind,
        round: usize,
    },

    #[error("duplicate {kind} node {name:?} in repository {repo} (round {round})")]
    DataIntegrity {
        repo: String,
        kind: ConnectionKind,
        name: String,
        round: usize,
    },

    #[error("fetch of {login} aborted: {cause}")]
    Aborted {
        login: String,
        #[source]
        cause: TransportError,
        /// Everything merged before the failure. The caller decides
        /// whether a partial snapshot is worth persisting.
        partial: Box<Account>,
        report: FetchReport,
    },
}

impl FetchError {
    pub(crate) fn state(
        entity: impl Into<String>,
        kind: ConnectionKind,
        message: impl Into<String>,
    ) -> Self {
        Self::State {
            entity: entity.into(),
            kind,
            message: message.into(),
        }
    }
}
