//! Remote participants currently typing.

use std::{collections::BTreeMap, ops::Add, time::Duration};

/// A remote typing signal lapses this long after its last start.
pub const TYPING_TTL: Duration = Duration::from_secs(5);

/// Participant ids mapped to the instant their typing signal expires.
#[derive(Debug, Clone)]
pub struct TypingSet<I> {
    expiries: BTreeMap<u64, I>,
}

impl<I> Default for TypingSet<I> {
    fn default() -> Self {
        Self { expiries: BTreeMap::new() }
    }
}

impl<I> TypingSet<I> {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove `participant_id` at once. Returns whether it was present.
    pub fn stop(&mut self, participant_id: u64) -> bool {
        self.expiries.remove(&participant_id).is_some()
    }

    /// Forget everyone.
    pub fn clear(&mut self) {
        self.expiries.clear();
    }

    /// Whether nobody is typing.
    pub fn is_empty(&self) -> bool {
        self.expiries.is_empty()
    }

    #[cfg(test)]
    fn participants(&self) -> impl Iterator<Item = u64> + '_ {
        self.expiries.keys().copied()
    }
}

impl<I> TypingSet<I>
where
    I: Copy + Ord + Add<Duration, Output = I>,
{
    /// Insert or refresh `participant_id`.
    pub fn start(&mut self, participant_id: u64, now: I) {
        self.expiries.insert(participant_id, now + TYPING_TTL);
    }

    /// Drop every entry whose expiry is at or before `now`. Returns whether
    /// anything was removed.
    pub fn expire(&mut self, now: I) -> bool {
        let before = self.expiries.len();
        self.expiries.retain(|_, expiry| *expiry > now);
        self.expiries.len() != before
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    #[test]
    fn entry_expires_after_ttl() {
        let t0 = Instant::now();
        let mut set = TypingSet::new();
        set.start(1, t0);

        assert!(!set.expire(t0 + Duration::from_secs(4)));
        assert!(set.expire(t0 + TYPING_TTL));
        assert!(set.is_empty());
    }

    #[test]
    fn restart_refreshes_expiry() {
        let t0 = Instant::now();
        let mut set = TypingSet::new();
        set.start(1, t0);
        set.start(1, t0 + Duration::from_secs(4));

        set.expire(t0 + Duration::from_secs(6));
        assert_eq!(set.participants().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn clearing_needs_no_clock() {
        let mut set: TypingSet<()> = TypingSet::new();

        set.clear();
        assert!(!set.stop(7));
        assert!(set.is_empty());
    }

    #[test]
    fn stop_removes_immediately() {
        let t0 = Instant::now();
        let mut set = TypingSet::new();
        set.start(1, t0);
        set.start(2, t0);

        assert!(set.stop(1));
        assert!(!set.stop(1));
        assert_eq!(set.participants().collect::<Vec<_>>(), vec![2]);
    }
}
