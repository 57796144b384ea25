//! Environment abstraction for deterministic testing.
//!
//! Decouples protocol logic from system resources (monotonic time, wall
//! clock, timers). Production code injects a real-clock implementation; tests
//! substitute a virtual clock so heartbeat timeouts and message timestamps
//! are reproducible.

use std::time::Duration;

/// Abstract environment providing time and async timers.
///
/// Implementations MUST guarantee that `now()` never goes backwards within a
/// single execution context.
pub trait Environment: Clone + Send + Sync + 'static {
    /// The specific instant type used by this environment.
    ///
    /// Production environments use `std::time::Instant`; test environments
    /// may use virtual time.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current monotonic time.
    fn now(&self) -> Self::Instant;

    /// Sleep for the specified duration.
    ///
    /// The only async method in the trait; used by driver/runtime code only,
    /// never by protocol logic.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Current wall clock as unix seconds.
    ///
    /// Used for message timestamps on the wire. Unlike `now()`, this is
    /// allowed to jump (NTP adjustments); nothing orders on it.
    fn wall_clock_secs(&self) -> u64;
}
