//! Reconnect backoff.
//!
//! Exponential doubling from `base_delay` up to `max_delay`, with up to 20%
//! positive jitter so a fleet of clients does not reconnect in lockstep. The
//! jitter source is supplied by the caller (normally
//! [`Environment::random_u64`](crate::Environment::random_u64)) to keep the
//! computation deterministic under simulation.

use std::time::Duration;

/// First retry delay.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(250);

/// Ceiling for a single retry delay (before jitter).
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(5);

/// Attempts made before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 8;

/// Maximum jitter as a percentage of the computed delay.
const JITTER_PERCENT: u64 = 20;

/// When and how often to try to re-establish a dropped link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Retry automatically after an unintended disconnect
    pub enabled: bool,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound on the un-jittered delay
    pub max_delay: Duration,
    /// Give up after this many consecutive failures. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            max_attempts: Some(DEFAULT_MAX_ATTEMPTS),
        }
    }
}

impl ReconnectPolicy {
    /// Policy that never retries on its own.
    pub fn disabled() -> Self {
        Self { enabled: false, ..Self::default() }
    }
}

/// Attempt counter driven by a [`ReconnectPolicy`].
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempt: u32,
}

impl Backoff {
    /// Start counting from zero attempts.
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Consecutive failed attempts so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// The policy this backoff follows.
    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Delay before the next attempt, or `None` when retries are exhausted or
    /// disabled.
    ///
    /// Each call consumes one attempt.
    pub fn next_delay(&mut self, random: u64) -> Option<Duration> {
        if !self.policy.enabled {
            return None;
        }
        if self.policy.max_attempts.is_some_and(|max| self.attempt >= max) {
            return None;
        }

        let shift = self.attempt.min(16);
        let base = self.policy.base_delay.saturating_mul(1u32 << shift).min(self.policy.max_delay);
        self.attempt += 1;

        let base_ms = base.as_millis() as u64;
        let jitter_span = base_ms * JITTER_PERCENT / 100;
        let jitter = if jitter_span == 0 { 0 } else { random % (jitter_span + 1) };

        Some(Duration::from_millis(base_ms + jitter))
    }

    /// Forget past failures after a successful connect.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn delays_double_until_capped() {
        let mut backoff = Backoff::new(ReconnectPolicy { max_attempts: None, ..Default::default() });

        let delays: Vec<_> = (0..7).filter_map(|_| backoff.next_delay(0)).collect();
        let ms: Vec<_> = delays.iter().map(Duration::as_millis).collect();

        assert_eq!(ms, vec![250, 500, 1000, 2000, 4000, 5000, 5000]);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let mut backoff = Backoff::new(ReconnectPolicy { max_attempts: Some(2), ..Default::default() });

        assert!(backoff.next_delay(0).is_some());
        assert!(backoff.next_delay(0).is_some());
        assert!(backoff.next_delay(0).is_none());

        backoff.reset();
        assert_eq!(backoff.next_delay(0), Some(DEFAULT_BASE_DELAY));
    }

    #[test]
    fn disabled_policy_never_retries() {
        let mut backoff = Backoff::new(ReconnectPolicy::disabled());
        assert!(backoff.next_delay(0).is_none());
    }

    proptest! {
        #[test]
        fn jitter_stays_within_twenty_percent(random in any::<u64>(), steps in 0u32..12) {
            let mut backoff = Backoff::new(ReconnectPolicy { max_attempts: None, ..Default::default() });
            for _ in 0..steps {
                backoff.next_delay(random);
            }

            let delay = backoff.next_delay(random).unwrap();
            let floor = DEFAULT_BASE_DELAY.saturating_mul(1 << steps.min(16)).min(DEFAULT_MAX_DELAY);

            prop_assert!(delay >= floor);
            prop_assert!(delay.as_millis() <= floor.as_millis() * 120 / 100);
        }
    }
}
