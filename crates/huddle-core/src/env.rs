//! Clock and randomness as an injectable dependency.
//!
//! State machines take `now` as an argument and the runtime asks the
//! environment for it, so the same code runs on the wall clock in the CLI and
//! on tokio's paused clock with a seeded RNG in simulation.

use std::time::Duration;

/// Time, sleep and randomness for the runtime.
///
/// `now()` must never go backwards. The other methods are expected not to
/// fail; an implementation that cannot produce randomness may panic.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Monotonic instant. `std::time::Instant` in production,
    /// `tokio::time::Instant` under simulation.
    type Instant: Copy
        + Ord
        + Send
        + Sync
        + std::fmt::Debug
        + std::ops::Sub<Output = Duration>
        + std::ops::Add<Duration, Output = Self::Instant>;

    /// Current instant.
    fn now(&self) -> Self::Instant;

    /// Resolve after `duration`. Awaited by the runtime loop only.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fill `buffer` with random bytes, reproducibly under a fixed seed.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Eight random bytes as a `u64`, used for reconnect jitter.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_le_bytes(bytes)
    }
}
