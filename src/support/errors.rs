//! Cross-cutting error types

use thiserror::Error;

/// Domain-level errors, surfaced by the Store and by Session-facing APIs.
#[derive(Debug, Error, Clone)]
pub enum DomainError {
    #[error("charge point not found: {0}")]
    ChargePointNotFound(String),

    #[error("transaction not found: {0}")]
    TransactionNotFound(i64),

    #[error("duplicate message: actor={actor:?} unique_id={unique_id}")]
    DuplicateMessage { actor: Actor, unique_id: String },

    #[error("charge point {0} is not connected")]
    ChargePointOffline(String),

    #[error("command timed out waiting for {0}")]
    CommandTimeout(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("{0}")]
    Other(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

/// Which side originated a Message (see spec.md §3, Message entity).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Actor {
    ChargePoint,
    CentralSystem,
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ChargePoint => write!(f, "charge_point"),
            Self::CentralSystem => write!(f, "central_system"),
        }
    }
}
