//! Wire protocol error types.
//!
//! Strongly-typed errors for the frame codec and command grammar. We avoid
//! leaking `std::io::Error` upward so callers can match on what actually
//! happened (peer close vs. oversized frame vs. genuine I/O failure).

use thiserror::Error;

/// Errors produced by the frame codec.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame length exceeds the hard cap.
    ///
    /// Rejected before the payload is allocated, so a malicious length prefix
    /// cannot trigger a large allocation.
    #[error("frame too large: {size} bytes exceeds the {max} byte cap")]
    FrameTooLarge {
        /// Claimed payload size
        size: usize,
        /// Maximum allowed payload size
        max: usize,
    },

    /// Zero-length payload.
    ///
    /// The grammar has no empty message; a zero length prefix indicates a
    /// broken or malicious peer.
    #[error("empty frame payload")]
    EmptyPayload,

    /// Buffer ended before the payload the prefix claims.
    #[error("frame truncated: expected {expected} payload bytes, got {actual}")]
    FrameTruncated {
        /// Payload size the length prefix claims
        expected: usize,
        /// Payload bytes actually present
        actual: usize,
    },

    /// Peer closed the connection (EOF or reset mid-frame).
    ///
    /// This is the normal end-of-session signal for a read loop, not a bug.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// Underlying transport error other than a close.
    #[error("i/o error: {0}")]
    Io(String),
}

impl ProtocolError {
    /// Returns true if the error means the session is over.
    ///
    /// Read loops exit on these. Invalid-length errors
    /// ([`Self::FrameTooLarge`], [`Self::EmptyPayload`]) come back with the
    /// stream already aligned on the next frame, so read loops drop the bad
    /// frame and keep going.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::ConnectionClosed | Self::Io(_))
    }
}

impl From<std::io::Error> for ProtocolError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;

        match err.kind() {
            ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe => Self::ConnectionClosed,
            _ => Self::Io(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_close_maps_to_connection_closed() {
        for kind in [
            std::io::ErrorKind::UnexpectedEof,
            std::io::ErrorKind::ConnectionReset,
            std::io::ErrorKind::ConnectionAborted,
            std::io::ErrorKind::BrokenPipe,
        ] {
            let err: ProtocolError = std::io::Error::from(kind).into();
            assert_eq!(err, ProtocolError::ConnectionClosed);
            assert!(err.is_disconnect());
        }
    }

    #[test]
    fn other_io_errors_keep_their_message() {
        let err: ProtocolError =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
        assert!(matches!(err, ProtocolError::Io(_)));
        assert!(err.is_disconnect());
    }

    #[test]
    fn frame_errors_are_not_disconnects() {
        assert!(!ProtocolError::FrameTooLarge { size: 11, max: 10 }.is_disconnect());
        assert!(!ProtocolError::EmptyPayload.is_disconnect());
    }
}
