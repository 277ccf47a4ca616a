//! Error types for registry and lock operations

pub mod handlers;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LockError>;

/// Message carried by the lock-conflict sentinel. Automation matches on it.
pub const LOCKED_MESSAGE: &str = "manifest is currently locked for editing";

#[derive(Error, Debug)]
pub enum LockError {
    /// Transport failures, passed through verbatim
    #[error(transparent)]
    Network(#[from] reqwest::Error),

    /// The registry answered with a status the operation did not expect
    #[error("{operation} failed (status {status}): {message}")]
    Registry {
        operation: String,
        status: u16,
        message: String,
    },

    /// Another writer holds the lock and `force` was not set
    #[error("{}", LOCKED_MESSAGE)]
    Locked,

    /// The registry rejected a conditional manifest write
    #[error("manifest {reference} changed since it was last read (precondition failed)")]
    PreconditionFailed { reference: String },

    #[error("expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("unusable media type: expected {expected}, got {actual}")]
    MediaTypeMismatch { expected: String, actual: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid reference: {0}")]
    InvalidReference(String),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl LockError {
    /// True for the lock-conflict sentinel only
    pub fn is_locked(&self) -> bool {
        matches!(self, LockError::Locked)
    }

    /// True when a conflicting write was detected, either by reading the
    /// lock annotation or by the registry rejecting a conditional write
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            LockError::Locked | LockError::PreconditionFailed { .. }
        )
    }

    /// True when the registry answered 404
    pub fn is_not_found(&self) -> bool {
        matches!(self, LockError::Registry { status: 404, .. })
    }
}

impl From<url::ParseError> for LockError {
    fn from(err: url::ParseError) -> Self {
        LockError::InvalidReference(err.to_string())
    }
}
