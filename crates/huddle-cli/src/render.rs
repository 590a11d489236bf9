//! Turns successive snapshots into terminal lines.
//!
//! The renderer only prints what changed since the previous snapshot: phase
//! changes, new messages, typing indicator flips and status notices.

use huddle_app::RoomSnapshot;
use huddle_client::{Message, SessionPhase};

/// Remembers what was already printed.
#[derive(Debug, Default)]
pub struct Renderer {
    previous: Option<RoomSnapshot>,
    printed: usize,
}

impl Renderer {
    /// A renderer that has printed nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines describing how `snapshot` differs from the last one rendered.
    pub fn render(&mut self, snapshot: &RoomSnapshot) -> Vec<String> {
        let mut lines = Vec::new();
        let previous = self.previous.take();

        if previous.as_ref().is_none_or(|p| p.phase != snapshot.phase) {
            lines.push(format!("* {}", describe_phase(snapshot)));
        }

        let same_room = previous.as_ref().is_some_and(|p| p.room_id == snapshot.room_id);
        if !same_room || snapshot.messages.len() < self.printed {
            self.printed = 0;
        }
        for message in &snapshot.messages[self.printed..] {
            lines.push(format_message(message));
        }
        self.printed = snapshot.messages.len();

        let was_typing = previous.as_ref().is_some_and(|p| p.anyone_typing);
        if snapshot.anyone_typing && !was_typing {
            lines.push("* someone is typing...".to_string());
        }

        let old_status = previous.as_ref().and_then(|p| p.status.as_deref());
        if let Some(status) = snapshot.status.as_deref()
            && old_status != Some(status)
        {
            lines.push(format!("! {status}"));
        }

        self.previous = Some(snapshot.clone());
        lines
    }
}

fn describe_phase(snapshot: &RoomSnapshot) -> String {
    let room = snapshot.room_id.as_deref().unwrap_or("?");
    match snapshot.phase {
        SessionPhase::Idle => "offline".to_string(),
        SessionPhase::Connecting => "connecting...".to_string(),
        SessionPhase::Ready => "connected, /create or /join <room> to start".to_string(),
        SessionPhase::InRoom => {
            let names: Vec<&str> = snapshot.roster.iter().map(|p| p.nickname.as_str()).collect();
            format!("in room {room} with {}", names.join(", "))
        },
        SessionPhase::Resuming => format!("rejoining room {room}..."),
        SessionPhase::DisconnectedInRoom => format!("connection lost, will rejoin room {room}"),
    }
}

/// `HH:MM:SS` (UTC) of a Unix millisecond timestamp.
fn clock(timestamp_ms: u64) -> String {
    let seconds_of_day = (timestamp_ms / 1000) % 86_400;
    format!(
        "{:02}:{:02}:{:02}",
        seconds_of_day / 3600,
        (seconds_of_day / 60) % 60,
        seconds_of_day % 60
    )
}

fn format_message(message: &Message) -> String {
    let time = clock(message.timestamp);
    if message.is_system {
        return format!("[{time}] * {}", message.body);
    }

    let icon = message.user_icon.as_deref().unwrap_or("?");
    let nickname = message.user_nickname.as_deref().unwrap_or("someone");
    format!("[{time}] {icon} {nickname}: {}", message.body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(perm_id: &str, body: &str) -> Message {
        Message {
            perm_id: perm_id.to_string(),
            timestamp: 3_723_000,
            user_nickname: Some("bob".to_string()),
            user_icon: Some("🐻".to_string()),
            body: body.to_string(),
            is_system: false,
        }
    }

    fn in_room(messages: Vec<Message>) -> RoomSnapshot {
        RoomSnapshot {
            phase: SessionPhase::InRoom,
            room_id: Some("room-1".to_string()),
            messages,
            ..RoomSnapshot::initial()
        }
    }

    #[test]
    fn first_render_shows_the_phase() {
        let mut renderer = Renderer::new();

        assert_eq!(renderer.render(&RoomSnapshot::initial()), ["* offline"]);
        assert!(renderer.render(&RoomSnapshot::initial()).is_empty());
    }

    #[test]
    fn only_new_messages_are_printed() {
        let mut renderer = Renderer::new();
        renderer.render(&in_room(vec![message("m1", "hi")]));

        let lines = renderer.render(&in_room(vec![message("m1", "hi"), message("m2", "again")]));

        assert_eq!(lines, ["[01:02:03] 🐻 bob: again"]);
    }

    #[test]
    fn a_new_room_prints_its_log_from_the_start() {
        let mut renderer = Renderer::new();
        renderer.render(&in_room(vec![message("m1", "old")]));

        let mut moved = in_room(vec![message("m9", "fresh")]);
        moved.room_id = Some("room-2".to_string());

        assert!(renderer.render(&moved).contains(&"[01:02:03] 🐻 bob: fresh".to_string()));
    }

    #[test]
    fn system_entries_have_no_author() {
        let mut entry = message("s1", "bob joined the room");
        entry.is_system = true;
        entry.user_nickname = None;

        assert_eq!(format_message(&entry), "[01:02:03] * bob joined the room");
    }

    #[test]
    fn status_is_printed_once() {
        let mut renderer = Renderer::new();
        let mut snapshot = RoomSnapshot::initial();
        snapshot.status = Some("slow down".to_string());

        assert!(renderer.render(&snapshot).contains(&"! slow down".to_string()));

        snapshot.revision += 1;
        assert!(renderer.render(&snapshot).is_empty());
    }

    #[test]
    fn typing_indicator_prints_on_start_only() {
        let mut renderer = Renderer::new();
        let mut snapshot = in_room(Vec::new());
        renderer.render(&snapshot);

        snapshot.anyone_typing = true;
        assert_eq!(renderer.render(&snapshot), ["* someone is typing..."]);
        assert!(renderer.render(&snapshot).is_empty());
    }
}
