//! Server error types.

use thiserror::Error;

/// Errors that can occur in the server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuration error (invalid bind address, bad initial config).
    ///
    /// Fatal at startup; the binary exits nonzero.
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport/network error (bind failure, accept failure, I/O).
    ///
    /// Fatal when it hits the listen socket; per-connection failures are
    /// handled on the session and never surface here.
    #[error("transport error: {0}")]
    Transport(String),

    /// Protocol error escaping a session handler.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Unexpected internal state. Indicates a bug.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<framepost_proto::ProtocolError> for ServerError {
    fn from(err: framepost_proto::ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}
