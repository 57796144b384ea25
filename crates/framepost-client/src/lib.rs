//! Framepost client.
//!
//! Library for talking to a framepost server: connect and claim a username,
//! send and receive store-and-forward messages, query the roster and the
//! server log, and reply to received messages out of a local store.
//!
//! # Architecture
//!
//! [`connect`] handshakes inline and hands back a [`Connection`]: commands go
//! out through its methods, everything the server says comes back as a
//! [`ServerEvent`] stream from [`Connection::next_event`]. One spawned I/O
//! task owns the socket; heartbeat PINGs are answered there and never reach
//! the application.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod error;
mod event;
mod store;

pub use client::{connect, Connection};
pub use error::ClientError;
pub use event::{IncomingMessage, ServerEvent};
pub use store::{reply_subject, MessageStore, StoredMessage};
