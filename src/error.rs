//! Error kinds surfaced by the object store, reference store, and pack reader.

use crate::id::ObjectId;

/// Unified error type for every fallible operation in this crate.
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("ambiguous prefix {prefix:?}: matches {count} objects")]
    Ambiguous { prefix: String, count: usize },

    #[error("malformed git data: {0}")]
    FormatError(String),

    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: ObjectId, actual: ObjectId },

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error("repository is closed")]
    Closed,

    #[error("illegal state: {0}")]
    IllegalState(String),
}

pub type Result<T> = std::result::Result<T, GitError>;

impl GitError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        GitError::InvalidArgument(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        GitError::NotFound(msg.into())
    }

    pub fn format_error(msg: impl Into<String>) -> Self {
        GitError::FormatError(msg.into())
    }

    pub fn illegal_state(msg: impl Into<String>) -> Self {
        GitError::IllegalState(msg.into())
    }

    /// Coarse classification used by callers that only care about the §7 error
    /// kind and not the exact variant (e.g. HashMismatch is a FormatError subclass).
    pub fn kind(&self) -> ErrorKind {
        match self {
            GitError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            GitError::NotFound(_) => ErrorKind::NotFound,
            GitError::Ambiguous { .. } => ErrorKind::Ambiguous,
            GitError::FormatError(_) => ErrorKind::FormatError,
            GitError::HashMismatch { .. } => ErrorKind::FormatError,
            GitError::IoError(_) => ErrorKind::IoError,
            GitError::Closed => ErrorKind::Closed,
            GitError::IllegalState(_) => ErrorKind::IllegalState,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    Ambiguous,
    FormatError,
    IoError,
    Closed,
    IllegalState,
}
