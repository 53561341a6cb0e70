//! Error types for datastore operations.

/// Error type for datastore operations.
///
/// Engine errors never leak raw: each operation wraps them into its own
/// failure kind. Only [`Error::NotFound`] is distinguished from other read
/// failures so callers can branch on "missing" vs "broken".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The engine could not be opened (missing path, existing path, lock
    /// contention, ...). The store stays unopened so the call can be retried.
    OpenFailed(String),

    /// The operation requires an open store.
    NotOpen,

    /// The key does not exist.
    NotFound(String),

    /// A put or batch commit failed.
    WriteFailed(String),

    /// A delete failed.
    DeleteFailed(String),

    /// A read or cursor step failed for a reason other than a missing key.
    ReadFailed(String),

    /// The engine refused to close.
    CloseFailed(String),

    /// A key is not in canonical form.
    InvalidKey(String),

    /// The engine cannot hand out cursors in a supported call convention.
    UnsupportedCursor(String),

    /// A query filter or order failed. Surfaced to the consumer unchanged.
    Query(String),

    /// Internal errors indicating bugs or invariant violations.
    Internal(String),
}

impl Error {
    /// Creates a [`Error::Query`] for use inside filters and orders.
    pub fn query(e: impl std::fmt::Display) -> Self {
        Error::Query(e.to_string())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::OpenFailed(msg) => write!(f, "Open failed: {}", msg),
            Error::NotOpen => write!(f, "Datastore is not open"),
            Error::NotFound(key) => write!(f, "Not found: {}", key),
            Error::WriteFailed(msg) => write!(f, "Write failed: {}", msg),
            Error::DeleteFailed(msg) => write!(f, "Delete failed: {}", msg),
            Error::ReadFailed(msg) => write!(f, "Read failed: {}", msg),
            Error::CloseFailed(msg) => write!(f, "Close failed: {}", msg),
            Error::InvalidKey(msg) => write!(f, "Invalid key: {}", msg),
            Error::UnsupportedCursor(msg) => write!(f, "Unsupported cursor: {}", msg),
            Error::Query(msg) => write!(f, "Query error: {}", msg),
            Error::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

/// Result type alias for datastore operations.
pub type Result<T> = std::result::Result<T, Error>;
