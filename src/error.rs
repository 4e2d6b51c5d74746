//! Error types for assignq.

use thiserror::Error;

use crate::model::Status;

#[derive(Debug, Error)]
pub enum Error {
    #[error("queue entry not found: {0}")]
    NotFound(String),

    /// An optimistic conditional update lost a race to another pass.
    /// Never surfaced to users; callers advance to the next candidate.
    #[error("conflict on {id}: expected {expected}, found {actual}")]
    Conflict {
        id: String,
        expected: Status,
        actual: Status,
    },

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: Status, to: Status },

    /// Malformed enqueue request (empty skill set, blank key, unknown
    /// priority). Rejected synchronously; never enters the store.
    #[error("invalid entry: {0}")]
    InvalidEntry(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Failure reported by an external collaborator (directory,
    /// notification service, downstream assignment record creation).
    #[error("collaborator error: {0}")]
    Collaborator(#[from] anyhow::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
