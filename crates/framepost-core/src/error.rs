//! Core error types.

use thiserror::Error;

use crate::session::SessionState;

/// Errors from the session state machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Invalid state transition attempted
    #[error("invalid state transition: cannot {operation} from {state:?}")]
    InvalidState {
        /// Current state when the error occurred
        state: SessionState,
        /// Operation that was attempted
        operation: &'static str,
    },
}

/// Errors from runtime configuration writes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Key is not in the definition table
    #[error("unknown configuration: {0}")]
    UnknownKey(String),

    /// Integer value outside the key's bounds
    #[error("{key} must be between {min} and {max}")]
    OutOfRange {
        /// Key being written
        key: String,
        /// Lower bound (inclusive)
        min: i64,
        /// Upper bound (inclusive)
        max: i64,
    },

    /// Value does not parse as the key's type
    #[error("invalid value for {key} (expected: {expected})")]
    InvalidValue {
        /// Key being written
        key: String,
        /// Human description of the expected shape
        expected: &'static str,
    },
}
