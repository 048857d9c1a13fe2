//! Error taxonomy shared across the sync core.
//!
//! Every unrecoverable tool failure carries a stable kind string so the
//! transport can surface it without parsing messages. A stale CSS cache is
//! deliberately not part of this enum: cache refresh failures are reported
//! as warnings, never as errors.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the sync core.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A named entity (template set, theme, template, stylesheet) is absent.
    #[error("{entity} `{name}` not found")]
    NotFound { entity: &'static str, name: String },

    /// The path does not map into the sync layout. Watchers ignore these.
    #[error("path does not map into the sync layout: {}", .0.display())]
    NotRoutable(PathBuf),

    /// Content or shape violates a contract (empty file, oversize file,
    /// wrong suffix, non-UTF-8 bytes).
    #[error("{0}")]
    Invalid(String),

    /// Database-side failure; may be transient (timeouts, lock contention).
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    /// Filesystem-side failure; may be transient.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File watcher backend failure.
    #[error("file watcher error: {0}")]
    Watcher(#[from] notify::Error),

    /// Subprocess bridge timeout, unparseable envelope, or spawn failure.
    #[error("bridge failure: {0}")]
    Bridge(String),

    /// Programmer error; callers should treat this as fatal.
    #[error("internal error: {0}")]
    Fatal(String),
}

impl SyncError {
    /// Create a `NotFound` error for a named entity.
    pub fn not_found(entity: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound { entity, name: name.into() }
    }

    /// Stable kind string used in tool results.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NotFound",
            Self::NotRoutable(_) => "NotRoutable",
            Self::Invalid(_) => "Invalid",
            Self::Db(_) | Self::Io(_) | Self::Watcher(_) => "TransientIO",
            Self::Bridge(_) => "BridgeFailure",
            Self::Fatal(_) => "Fatal",
        }
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_strings_are_stable() {
        assert_eq!(SyncError::not_found("theme", "Default").kind(), "NotFound");
        assert_eq!(SyncError::NotRoutable(PathBuf::from("/tmp/x")).kind(), "NotRoutable");
        assert_eq!(SyncError::Invalid("empty file".into()).kind(), "Invalid");
        assert_eq!(SyncError::Bridge("timed out".into()).kind(), "BridgeFailure");
        assert_eq!(SyncError::Fatal("broken bijection".into()).kind(), "Fatal");
        let io = SyncError::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, "slow disk"));
        assert_eq!(io.kind(), "TransientIO");
    }

    #[test]
    fn test_not_found_display() {
        let err = SyncError::not_found("template set", "Missing Set");
        assert_eq!(err.to_string(), "template set `Missing Set` not found");
    }
}
