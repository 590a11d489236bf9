//! Append-only message log for the current room membership.

use std::collections::HashSet;

use huddle_proto::payloads::chat::MessageRecord;

/// A single log entry. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Stable identity used for dedup
    pub perm_id: String,
    /// Milliseconds since the Unix epoch, never below the previous entry
    pub timestamp: u64,
    /// Author nickname. `None` for system entries
    pub user_nickname: Option<String>,
    /// Author icon. `None` for system entries
    pub user_icon: Option<String>,
    /// Message text
    pub body: String,
    /// Generated by the system rather than a participant
    pub is_system: bool,
}

impl From<MessageRecord> for Message {
    fn from(record: MessageRecord) -> Self {
        Self {
            perm_id: record.perm_id,
            timestamp: record.timestamp,
            user_nickname: record.user_nickname,
            user_icon: record.user_icon,
            body: record.body,
            is_system: record.is_system,
        }
    }
}

/// Messages in backend delivery order, deduplicated by `perm_id`.
///
/// Entries are never reordered. A timestamp that would go backwards is
/// clamped to the previous entry's timestamp.
#[derive(Debug, Clone, Default)]
pub struct MessageLog {
    entries: Vec<Message>,
    seen: HashSet<String>,
}

impl MessageLog {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append unless `perm_id` is already present. Returns whether it was added.
    pub fn append(&mut self, mut message: Message) -> bool {
        if self.seen.contains(&message.perm_id) {
            tracing::trace!(perm_id = %message.perm_id, "dropping duplicate message");
            return false;
        }

        if let Some(last) = self.entries.last() {
            message.timestamp = message.timestamp.max(last.timestamp);
        }

        self.seen.insert(message.perm_id.clone());
        self.entries.push(message);
        true
    }

    /// Append every record in order. Returns how many were new.
    pub fn merge(&mut self, records: impl IntoIterator<Item = Message>) -> usize {
        let mut added = 0;
        for message in records {
            if self.append(message) {
                added += 1;
            }
        }
        added
    }

    /// Entries in display order.
    pub fn entries(&self) -> &[Message] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `perm_id` of the newest participant message, where a resume picks up.
    ///
    /// System entries are skipped: their ids are either local or name
    /// presence events the backend does not replay.
    pub fn resume_cursor(&self) -> Option<&str> {
        self.entries.iter().rev().find(|m| !m.is_system).map(|m| m.perm_id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn msg(perm_id: &str, timestamp: u64) -> Message {
        Message {
            perm_id: perm_id.to_string(),
            timestamp,
            user_nickname: Some("alice".to_string()),
            user_icon: Some("🦊".to_string()),
            body: "hi".to_string(),
            is_system: false,
        }
    }

    #[test]
    fn duplicate_perm_id_yields_one_entry() {
        let mut log = MessageLog::new();
        assert!(log.append(msg("a", 1)));
        assert!(!log.append(msg("a", 2)));
        assert_eq!(log.len(), 1);
        assert_eq!(log.entries()[0].timestamp, 1);
    }

    #[test]
    fn insertion_order_is_kept_and_timestamps_clamped() {
        let mut log = MessageLog::new();
        log.append(msg("a", 100));
        log.append(msg("b", 50));
        log.append(msg("c", 200));

        let ids: Vec<_> = log.entries().iter().map(|m| m.perm_id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert_eq!(log.entries()[1].timestamp, 100);
    }

    #[test]
    fn merge_counts_only_new_entries() {
        let mut log = MessageLog::new();
        log.append(msg("a", 1));

        let added = log.merge(vec![msg("a", 1), msg("b", 2)]);
        assert_eq!(added, 1);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn resume_cursor_skips_system_entries() {
        let mut log = MessageLog::new();
        assert_eq!(log.resume_cursor(), None);

        log.append(msg("a", 1));
        log.append(Message { is_system: true, ..msg("local:1", 2) });
        assert_eq!(log.resume_cursor(), Some("a"));

        log.append(msg("b", 3));
        assert_eq!(log.resume_cursor(), Some("b"));
    }

    proptest! {
        #[test]
        fn log_invariants_hold(ops in prop::collection::vec((0u8..16, any::<u32>()), 0..64)) {
            let mut log = MessageLog::new();
            for (id, ts) in ops {
                log.append(msg(&format!("m{id}"), u64::from(ts)));
            }

            let mut seen = HashSet::new();
            for m in log.entries() {
                prop_assert!(seen.insert(m.perm_id.clone()));
            }
            for pair in log.entries().windows(2) {
                prop_assert!(pair[0].timestamp <= pair[1].timestamp);
            }
        }
    }
}
