//! Wall clock and OS entropy for the terminal client.

use std::{future::Future, time::Duration};

use huddle_core::Environment;

/// The real environment: `std::time::Instant`, tokio timers and getrandom.
///
/// # Panics
///
/// `random_bytes` panics if the OS refuses to supply entropy.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// The environment has no state; this is `SystemEnv`.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    #[allow(clippy::disallowed_methods)]
    fn now(&self) -> std::time::Instant {
        std::time::Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).expect("invariant: OS entropy source available");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::disallowed_methods)]
    fn clock_moves_forward() {
        let before = SystemEnv.now();
        std::thread::sleep(Duration::from_millis(5));

        assert!(SystemEnv.now() > before);
    }

    #[test]
    fn jitter_source_is_not_constant() {
        let draws: Vec<u64> = (0..4).map(|_| SystemEnv.random_u64()).collect();

        assert!(draws.windows(2).any(|w| w[0] != w[1]));
    }

    #[tokio::test]
    async fn sleep_lasts_at_least_the_duration() {
        let started = SystemEnv.now();
        SystemEnv.sleep(Duration::from_millis(20)).await;

        assert!(SystemEnv.now() - started >= Duration::from_millis(20));
    }
}
