//! Message data model.

/// A store-and-forward message between users.
///
/// Created by the driver when a SEND is accepted; owned by the dispatcher
/// once enqueued; dropped after the delivery attempt (success or
/// recipient-missing notification). The timestamp is set server-side at
/// enqueue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Sender username
    pub from: String,
    /// Recipient username (broadcast fan-out resolves `all` before enqueue)
    pub to: String,
    /// Subject line
    pub subject: String,
    /// Message body
    pub body: String,
    /// Unix seconds at enqueue, server wall clock
    pub timestamp_secs: u64,
}
