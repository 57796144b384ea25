//! Client error types.

use thiserror::Error;

/// Errors surfaced by the client library.
#[derive(Error, Debug)]
pub enum ClientError {
    /// TCP connect failed
    #[error("connection failed: {0}")]
    Connect(String),

    /// The server answered the CONNECT handshake with an ERROR
    #[error("connection rejected: {reason}")]
    Rejected {
        /// Server-supplied reason (e.g. username taken, banned)
        reason: String,
    },

    /// Wire-level failure after the handshake
    #[error("transport error: {0}")]
    Transport(#[from] framepost_proto::ProtocolError),

    /// The server sent something the client cannot interpret
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Operation attempted on a connection that is already gone
    #[error("not connected")]
    NotConnected,

    /// Locally rejected before sending
    #[error("invalid message: {0}")]
    InvalidMessage(&'static str),

    /// Reply target does not exist in the message store
    #[error("no stored message with index {0}")]
    UnknownMessage(u64),
}
