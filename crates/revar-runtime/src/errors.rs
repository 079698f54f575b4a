//! Runtime error types.
//!
//! Business-rule outcomes are not errors: a rejected assignment is
//! `Ok(false)` and an unbound identifier resolves to its own name. These
//! variants cover host faults and misuse of the caller-facing API.

use revar_store::StoreError;

/// Errors that can occur while operating on variables and scopes.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// The persistent store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// `previous` reached further back than the recorded history.
    #[error("{name}: requested {requested} steps back but only {available} are recorded")]
    HistoryUnderflow {
        /// Variable name.
        name: String,
        /// Steps requested.
        requested: usize,
        /// Steps available.
        available: usize,
    },

    /// No scope in the chain binds this name.
    #[error("unknown variable: {0}")]
    UnknownVariable(String),

    /// The variable was dropped before the awaited update happened.
    #[error("wait abandoned: {0} was dropped")]
    WaitAbandoned(String),

    /// A `next` wait ran past its deadline.
    #[error("timed out waiting for {0}")]
    Timeout(String),

    /// A `next` wait was cancelled.
    #[error("operation cancelled")]
    Cancelled,
}

impl RuntimeError {
    /// Whether retrying the operation can succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Store(e) => matches!(e, StoreError::Pool(_) | StoreError::Unavailable(_)),
            Self::Timeout(_) | Self::Cancelled => true,
            Self::HistoryUnderflow { .. } | Self::UnknownVariable(_) | Self::WaitAbandoned(_) => {
                false
            }
        }
    }

    /// Short category string for logging.
    pub fn category(&self) -> &str {
        match self {
            Self::Store(_) => "store",
            Self::HistoryUnderflow { .. } => "history_underflow",
            Self::UnknownVariable(_) => "unknown_variable",
            Self::WaitAbandoned(_) => "wait_abandoned",
            Self::Timeout(_) => "timeout",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Convenience type alias for runtime results.
pub type Result<T> = std::result::Result<T, RuntimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn underflow_display() {
        let err = RuntimeError::HistoryUnderflow {
            name: "x".into(),
            requested: 4,
            available: 2,
        };
        assert_eq!(
            err.to_string(),
            "x: requested 4 steps back but only 2 are recorded"
        );
    }

    #[test]
    fn store_error_converts() {
        let err: RuntimeError = StoreError::Unavailable("offline".into()).into();
        assert_eq!(err.to_string(), "store error: store unavailable: offline");
        assert_eq!(err.category(), "store");
    }

    #[test]
    fn categories() {
        assert_eq!(RuntimeError::Cancelled.category(), "cancelled");
        assert_eq!(RuntimeError::Timeout("x".into()).category(), "timeout");
        assert_eq!(
            RuntimeError::UnknownVariable("x".into()).category(),
            "unknown_variable"
        );
        assert_eq!(
            RuntimeError::WaitAbandoned("x".into()).category(),
            "wait_abandoned"
        );
    }

    #[test]
    fn recoverability() {
        assert!(RuntimeError::Cancelled.is_recoverable());
        assert!(RuntimeError::Timeout("x".into()).is_recoverable());
        assert!(RuntimeError::Store(StoreError::Unavailable("x".into())).is_recoverable());
        assert!(
            !RuntimeError::Store(StoreError::Migration {
                message: "m".into()
            })
            .is_recoverable()
        );
        assert!(!RuntimeError::UnknownVariable("x".into()).is_recoverable());
    }
}
