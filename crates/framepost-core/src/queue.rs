//! Bounded message queue with configurable full-queue policy.
//!
//! FIFO of [`Message`]s between the session handlers (producers) and the
//! routing dispatcher (single consumer). Capacity is passed per push because
//! it is runtime-tunable; the queue itself carries no configuration.
//!
//! # Invariants
//!
//! - After any `push` with capacity C on a queue of size ≤ C, size ≤ C.
//! - FIFO order under [`QueuePolicy::Reject`] and [`QueuePolicy::DropNewest`].
//!   Under [`QueuePolicy::DropOldest`], order is preserved among surviving
//!   messages.

use std::collections::VecDeque;

use crate::message::Message;

/// What to do with a new message when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueuePolicy {
    /// Refuse the new message; the producer reports failure to the sender
    #[default]
    Reject,
    /// Drop the head to make room; the new message enqueues
    DropOldest,
    /// Silently ignore the new message
    DropNewest,
}

/// Result of a push, so the producer can answer the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Message is in the queue
    Enqueued,
    /// Message is in the queue; the previous head was discarded to make room
    DroppedOldest,
    /// Message was not enqueued
    Rejected,
}

impl PushOutcome {
    /// True if the new message made it into the queue.
    pub fn accepted(&self) -> bool {
        !matches!(self, Self::Rejected)
    }
}

/// Bounded FIFO of messages.
#[derive(Debug, Default)]
pub struct MessageQueue {
    items: VecDeque<Message>,
}

impl MessageQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self { items: VecDeque::new() }
    }

    /// Push a message, applying `policy` if the queue holds `capacity`
    /// messages or more.
    pub fn push(&mut self, msg: Message, capacity: usize, policy: QueuePolicy) -> PushOutcome {
        if self.items.len() >= capacity {
            match policy {
                QueuePolicy::Reject | QueuePolicy::DropNewest => return PushOutcome::Rejected,
                QueuePolicy::DropOldest => {
                    self.items.pop_front();
                    self.items.push_back(msg);
                    return PushOutcome::DroppedOldest;
                },
            }
        }

        self.items.push_back(msg);
        PushOutcome::Enqueued
    }

    /// Pop the oldest message. `None` when empty.
    pub fn pop(&mut self) -> Option<Message> {
        self.items.pop_front()
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(body: &str) -> Message {
        Message {
            from: "alice".to_string(),
            to: "bob".to_string(),
            subject: "s".to_string(),
            body: body.to_string(),
            timestamp_secs: 0,
        }
    }

    #[test]
    fn fifo_order() {
        let mut queue = MessageQueue::new();

        for body in ["one", "two", "three"] {
            assert_eq!(queue.push(msg(body), 10, QueuePolicy::Reject), PushOutcome::Enqueued);
        }

        assert_eq!(queue.pop().unwrap().body, "one");
        assert_eq!(queue.pop().unwrap().body, "two");
        assert_eq!(queue.pop().unwrap().body, "three");
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn capacity_boundary_under_reject() {
        let mut queue = MessageQueue::new();

        assert!(queue.push(msg("1"), 2, QueuePolicy::Reject).accepted());
        assert!(queue.push(msg("2"), 2, QueuePolicy::Reject).accepted());
        assert_eq!(queue.push(msg("3"), 2, QueuePolicy::Reject), PushOutcome::Rejected);

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop().unwrap().body, "1");
    }

    #[test]
    fn drop_oldest_keeps_size_and_drops_head() {
        let mut queue = MessageQueue::new();

        queue.push(msg("1"), 2, QueuePolicy::DropOldest);
        queue.push(msg("2"), 2, QueuePolicy::DropOldest);
        assert_eq!(queue.push(msg("3"), 2, QueuePolicy::DropOldest), PushOutcome::DroppedOldest);

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop().unwrap().body, "2");
        assert_eq!(queue.pop().unwrap().body, "3");
    }

    #[test]
    fn drop_newest_ignores_the_new_message() {
        let mut queue = MessageQueue::new();

        queue.push(msg("1"), 1, QueuePolicy::DropNewest);
        assert_eq!(queue.push(msg("2"), 1, QueuePolicy::DropNewest), PushOutcome::Rejected);

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop().unwrap().body, "1");
    }

    #[test]
    fn shrunk_capacity_applies_to_new_pushes_only() {
        let mut queue = MessageQueue::new();

        for i in 0..5 {
            queue.push(msg(&i.to_string()), 10, QueuePolicy::Reject);
        }

        // Capacity lowered below current size: new pushes follow the policy,
        // existing messages stay queued.
        assert_eq!(queue.push(msg("new"), 3, QueuePolicy::Reject), PushOutcome::Rejected);
        assert_eq!(queue.len(), 5);
    }
}
