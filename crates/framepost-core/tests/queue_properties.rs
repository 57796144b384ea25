//! Property tests for the bounded queue invariants.

use framepost_core::{Message, MessageQueue, QueuePolicy};
use proptest::prelude::*;

fn msg(n: usize) -> Message {
    Message {
        from: "a".to_string(),
        to: "b".to_string(),
        subject: "s".to_string(),
        body: n.to_string(),
        timestamp_secs: 0,
    }
}

fn policy_strategy() -> impl Strategy<Value = QueuePolicy> {
    prop_oneof![
        Just(QueuePolicy::Reject),
        Just(QueuePolicy::DropOldest),
        Just(QueuePolicy::DropNewest),
    ]
}

proptest! {
    #[test]
    fn size_never_exceeds_capacity(
        capacity in 1usize..64,
        pushes in 0usize..256,
        policy in policy_strategy(),
    ) {
        let mut queue = MessageQueue::new();

        for n in 0..pushes {
            queue.push(msg(n), capacity, policy);
            prop_assert!(queue.len() <= capacity);
        }
    }

    #[test]
    fn surviving_order_is_monotonic(
        capacity in 1usize..32,
        pushes in 0usize..128,
        policy in policy_strategy(),
    ) {
        let mut queue = MessageQueue::new();

        for n in 0..pushes {
            queue.push(msg(n), capacity, policy);
        }

        let mut last: Option<usize> = None;
        while let Some(m) = queue.pop() {
            let n: usize = m.body.parse().unwrap();
            if let Some(prev) = last {
                prop_assert!(n > prev, "queue order regressed: {prev} then {n}");
            }
            last = Some(n);
        }
    }
}
