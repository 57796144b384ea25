//! Framepost wire protocol.
//!
//! Two layers, kept strictly apart:
//!
//! - [`frame`]: length-prefixed framing (4-byte big-endian length + payload,
//!   10 MiB cap). Byte-transparent; never looks inside a payload.
//! - [`command`]: the semicolon-delimited text grammar carried inside frames,
//!   plus sanitization, validation, and wire timestamp helpers.
//!
//! Server and client both depend on this crate and nothing else protocol
//! shaped, so the two ends cannot drift apart.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod command;
mod errors;
pub mod frame;

pub use command::{Command, Verb};
pub use errors::ProtocolError;
pub use frame::{MAX_FRAME_SIZE, read_frame, write_frame};
