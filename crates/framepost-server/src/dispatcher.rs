//! Routing dispatcher: the single delivery worker.
//!
//! Sessions (and the broadcast fan-out) enqueue messages; one worker task
//! consumes them, resolves the recipient through the driver's registry, and
//! writes the delivery frame to the recipient's socket. The queue sits behind
//! a plain mutex with a [`Notify`] for wakeups; shutdown rides a watch
//! channel so a close wakes the waiter immediately and pending messages are
//! simply dropped.
//!
//! The worker sleeps `delay_between_messages` before each dequeue - a global
//! rate governor, not a per-recipient one.
//!
//! Write failures are logged and otherwise ignored: the recipient's session
//! loop detects the dead socket on its own read and is the sole destroyer of
//! the session. The dispatcher never closes sockets.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use framepost_core::{
    env::Environment,
    message::Message,
    queue::{MessageQueue, PushOutcome, QueuePolicy},
};
use framepost_proto::command::reply;
use tokio::sync::{watch, Notify};

use crate::{driver::ServerDriver, runtime::Connections};

/// Dispatcher configuration fixed at startup.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Sleep before each dequeue (the rate governor)
    pub delay_between_messages: Duration,
    /// What to do with new messages when the queue is full
    pub queue_policy: QueuePolicy,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self { delay_between_messages: Duration::from_millis(10), queue_policy: QueuePolicy::Reject }
    }
}

/// Bounded queue plus the counters the delivery worker maintains.
pub struct Dispatcher {
    queue: Mutex<MessageQueue>,
    notify: Notify,
    config: DispatcherConfig,
    messages_sent: AtomicU64,
}

impl Dispatcher {
    /// Create a dispatcher.
    pub fn new(config: DispatcherConfig) -> Self {
        Self {
            queue: Mutex::new(MessageQueue::new()),
            notify: Notify::new(),
            config,
            messages_sent: AtomicU64::new(0),
        }
    }

    /// Enqueue a message. `capacity` is read by the caller from the runtime
    /// config at the moment of the push, so `/set MAX_QUEUE_SIZE` applies
    /// live.
    pub fn enqueue(&self, message: Message, capacity: usize) -> PushOutcome {
        let outcome = {
            let mut queue = self.queue.lock().expect("queue lock poisoned");
            queue.push(message, capacity, self.config.queue_policy)
        };

        match outcome {
            PushOutcome::Enqueued => {},
            PushOutcome::DroppedOldest => {
                tracing::warn!("Queue full - oldest message dropped");
            },
            PushOutcome::Rejected => {
                tracing::warn!("Queue full - message rejected");
            },
        }

        if outcome.accepted() {
            self.notify.notify_one();
        }

        outcome
    }

    /// Messages delivered successfully since startup.
    pub fn messages_sent(&self) -> u64 {
        self.messages_sent.load(Ordering::Relaxed)
    }

    /// Queued messages right now.
    pub fn len(&self) -> usize {
        self.queue.lock().expect("queue lock poisoned").len()
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until the queue is nonempty. Returns `false` on shutdown.
    ///
    /// The message is NOT popped here: the rate governor sleeps between this
    /// wait and the pop, so a message the worker has not yet acted on still
    /// counts against the queue capacity.
    async fn wait_nonempty(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        loop {
            if *shutdown.borrow() {
                return false;
            }

            if !self.queue.lock().expect("queue lock poisoned").is_empty() {
                return true;
            }

            tokio::select! {
                _ = self.notify.notified() => {},
                _ = shutdown.changed() => {},
            }
        }
    }

    fn pop(&self) -> Option<Message> {
        self.queue.lock().expect("queue lock poisoned").pop()
    }

    /// Run the delivery worker until shutdown.
    pub(crate) async fn run<E: Environment>(
        self: Arc<Self>,
        driver: Arc<tokio::sync::Mutex<ServerDriver<E>>>,
        connections: Arc<Connections>,
        env: E,
        mut shutdown: watch::Receiver<bool>,
    ) {
        tracing::info!("Dispatcher started");

        loop {
            if !self.wait_nonempty(&mut shutdown).await {
                break;
            }

            // Rate governor: sleep before acting on the dequeue.
            let delay = self.config.delay_between_messages;
            if delay > Duration::ZERO {
                tokio::select! {
                    _ = env.sleep(delay) => {},
                    _ = shutdown.changed() => break,
                }
            }

            let Some(message) = self.pop() else {
                continue;
            };

            // Resolve under the driver lock, send after releasing it.
            let (recipient, sender) = {
                let driver = driver.lock().await;
                (driver.session_for(&message.to), driver.session_for(&message.from))
            };

            let Some(recipient_session) = recipient else {
                tracing::warn!(
                    "Recipient not found or disconnected: {} (message from {})",
                    message.to,
                    message.from
                );

                // Tell the sender, if they are still around.
                if let Some(sender_session) = sender {
                    let notice = reply::error(&format!(
                        "Message to '{}' could not be delivered: user disconnected",
                        message.to
                    ));
                    if let Err(err) = connections.send_payload(sender_session, &notice).await {
                        tracing::debug!("undeliverable-notice write failed: {err}");
                    }
                }
                continue;
            };

            let payload = reply::message(
                &message.from,
                &message.subject,
                &message.body,
                message.timestamp_secs,
            );

            match connections.send_payload(recipient_session, &payload).await {
                Ok(()) => {
                    self.messages_sent.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!("Message dispatched from {} to {}", message.from, message.to);
                },
                Err(err) => {
                    // The recipient's read loop owns the teardown.
                    tracing::error!("Failed to send message to {}: {err}", message.to);
                },
            }
        }

        tracing::info!("Dispatcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(n: usize) -> Message {
        Message {
            from: "alice".to_string(),
            to: "bob".to_string(),
            subject: "s".to_string(),
            body: n.to_string(),
            timestamp_secs: 0,
        }
    }

    #[test]
    fn enqueue_applies_capacity_and_policy() {
        let dispatcher = Dispatcher::new(DispatcherConfig::default());

        assert_eq!(dispatcher.enqueue(msg(1), 2), PushOutcome::Enqueued);
        assert_eq!(dispatcher.enqueue(msg(2), 2), PushOutcome::Enqueued);
        assert_eq!(dispatcher.enqueue(msg(3), 2), PushOutcome::Rejected);
        assert_eq!(dispatcher.len(), 2);
    }

    #[test]
    fn drop_oldest_policy_accepts_the_new_message() {
        let dispatcher = Dispatcher::new(DispatcherConfig {
            queue_policy: QueuePolicy::DropOldest,
            ..Default::default()
        });

        dispatcher.enqueue(msg(1), 1);
        assert_eq!(dispatcher.enqueue(msg(2), 1), PushOutcome::DroppedOldest);
        assert_eq!(dispatcher.len(), 1);
    }

    #[tokio::test]
    async fn waiter_wakes_on_enqueue() {
        let dispatcher = Arc::new(Dispatcher::new(DispatcherConfig::default()));
        let (_tx, mut rx) = watch::channel(false);

        let waiter = {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move { dispatcher.wait_nonempty(&mut rx).await })
        };

        tokio::task::yield_now().await;
        dispatcher.enqueue(msg(7), 10);

        assert!(waiter.await.unwrap());
        assert_eq!(dispatcher.pop().unwrap().body, "7");
    }

    #[tokio::test]
    async fn waiter_wakes_on_shutdown() {
        let dispatcher = Arc::new(Dispatcher::new(DispatcherConfig::default()));
        let (tx, mut rx) = watch::channel(false);

        let waiter = {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move { dispatcher.wait_nonempty(&mut rx).await })
        };

        tokio::task::yield_now().await;
        tx.send(true).unwrap();

        assert!(!waiter.await.unwrap());
    }
}
