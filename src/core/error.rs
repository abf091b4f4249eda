use std::fmt;
use thiserror::Error;

/// Failure taxonomy of the sync subsystem.
///
/// Remote-facing kinds (`Network`, `Unauthenticated`, `RateLimited`, `Validation`,
/// `RestoreExpired`) come back from a `RemoteStore`; `StorageFailure` is produced by the
/// local store and never leaves `CollectionStore`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Restore window expired for '{0}'")]
    RestoreExpired(String),

    #[error("Storage failure: {0}")]
    StorageFailure(String),

    #[error("Entity '{0}' not found")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;

/// Data-free discriminant of [`SyncError`], handy for matching and fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Network,
    Unauthenticated,
    RateLimited,
    Validation,
    RestoreExpired,
    StorageFailure,
    NotFound,
    InvalidState,
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(_) => ErrorKind::Network,
            Self::Unauthenticated(_) => ErrorKind::Unauthenticated,
            Self::RateLimited(_) => ErrorKind::RateLimited,
            Self::Validation(_) => ErrorKind::Validation,
            Self::RestoreExpired(_) => ErrorKind::RestoreExpired,
            Self::StorageFailure(_) => ErrorKind::StorageFailure,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidState(_) => ErrorKind::InvalidState,
        }
    }

    /// Builds an error of the given kind with a message.
    pub fn from_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            ErrorKind::Network => Self::Network(message),
            ErrorKind::Unauthenticated => Self::Unauthenticated(message),
            ErrorKind::RateLimited => Self::RateLimited(message),
            ErrorKind::Validation => Self::Validation(message),
            ErrorKind::RestoreExpired => Self::RestoreExpired(message),
            ErrorKind::StorageFailure => Self::StorageFailure(message),
            ErrorKind::NotFound => Self::NotFound(message),
            ErrorKind::InvalidState => Self::InvalidState(message),
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Network => "network",
            Self::Unauthenticated => "unauthenticated",
            Self::RateLimited => "rate_limited",
            Self::Validation => "validation",
            Self::RestoreExpired => "restore_expired",
            Self::StorageFailure => "storage_failure",
            Self::NotFound => "not_found",
            Self::InvalidState => "invalid_state",
        };
        write!(f, "{label}")
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::StorageFailure(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        Self::StorageFailure(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_constructor() {
        for kind in [
            ErrorKind::Network,
            ErrorKind::RateLimited,
            ErrorKind::RestoreExpired,
            ErrorKind::InvalidState,
        ] {
            assert_eq!(SyncError::from_kind(kind, "x").kind(), kind);
        }
    }
}
