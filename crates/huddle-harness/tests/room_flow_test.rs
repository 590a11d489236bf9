//! End-to-end room flows through the real runtime.
//!
//! # Oracle Pattern
//!
//! Every test drives clients only through their `SessionHandle` and ends with
//! checks on what the presentation layer would see, plus the invariant
//! registry.

use std::time::Duration;

use huddle_app::Storage;
use huddle_client::{SessionError, SessionPhase};
use huddle_harness::SimCluster;
use huddle_proto::{ErrorPayload, Opcode, Payload};

/// Two connected clients with alice's room created and bob joined.
async fn room_of_two() -> (SimCluster, String) {
    let mut cluster = SimCluster::new(1);
    let alice = cluster.add_client();
    let bob = cluster.add_client();
    cluster.settle().await;

    let room_id = cluster.client(alice).handle.create_room("alice", "🦊").await.unwrap();
    cluster.client(bob).handle.join_room("bob", &room_id, "🐻").await.unwrap();
    cluster.check_settled("room of two").await;

    (cluster, room_id)
}

#[tokio::test(start_paused = true)]
async fn clients_connect_on_start() {
    let mut cluster = SimCluster::new(0);
    let alice = cluster.add_client();
    cluster.settle().await;

    let snapshot = cluster.client(alice).snapshot();
    assert_eq!(snapshot.phase, SessionPhase::Ready);
    assert!(snapshot.room_id.is_none());
    assert_eq!(cluster.backend.received_count(Opcode::Hello), 1);

    cluster.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn create_then_join_shares_roster() {
    let (mut cluster, room_id) = room_of_two().await;

    let alice = cluster.client(0).snapshot();
    let bob = cluster.client(1).snapshot();

    assert_eq!(alice.room_id.as_deref(), Some(room_id.as_str()));
    assert_eq!(bob.room_id.as_deref(), Some(room_id.as_str()));
    assert_eq!(alice.roster.len(), 2);
    assert_eq!(alice.messages[0].body, "Room created");
    assert!(alice.messages.iter().any(|m| m.body == "bob joined the room" && m.is_system));
    assert_eq!(bob.messages[0].body, "bob joined the room");
    assert_eq!(bob.identity.as_ref().map(|i| i.nickname.as_str()), Some("bob"));

    cluster.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn messages_reach_everyone_once() {
    let (mut cluster, room_id) = room_of_two().await;

    cluster.client(1).handle.send_message("  hello alice  ").await.unwrap();
    cluster.client(0).handle.send_message("hi bob").await.unwrap();
    cluster.check_settled("after chat").await;

    for index in 0..2 {
        let snapshot = cluster.client(index).snapshot();
        let bodies: Vec<&str> =
            snapshot.messages.iter().filter(|m| !m.is_system).map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, ["hello alice", "hi bob"]);
    }

    let from_bob = &cluster.client(0).snapshot().messages;
    let entry = from_bob.iter().find(|m| m.body == "hello alice").unwrap();
    assert_eq!(entry.user_nickname.as_deref(), Some("bob"));
    assert_eq!(entry.user_icon.as_deref(), Some("🐻"));
    assert_eq!(cluster.backend.history(&room_id).len(), 2);

    cluster.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn typing_follows_the_debouncer() {
    let (mut cluster, _) = room_of_two().await;

    cluster.client(1).handle.input_changed("h").await.unwrap();
    cluster.client(1).handle.input_changed("he").await.unwrap();
    cluster.settle().await;
    assert!(cluster.client(0).snapshot().anyone_typing);
    assert_eq!(cluster.backend.received_count(Opcode::SetTyping), 1);

    // Idle past the debounce window
    tokio::time::sleep(Duration::from_secs(3)).await;
    cluster.check_settled("after idle").await;

    assert!(!cluster.client(0).snapshot().anyone_typing);
    assert_eq!(cluster.backend.received_count(Opcode::SetTyping), 2);

    cluster.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn submit_stops_typing_before_sending() {
    let (mut cluster, _) = room_of_two().await;

    cluster.client(0).handle.input_changed("on my way").await.unwrap();
    cluster.client(0).handle.submit("on my way").await.unwrap();
    cluster.settle().await;

    let opcodes: Vec<Opcode> = cluster
        .backend
        .received()
        .into_iter()
        .filter_map(|(_, frame)| frame.opcode())
        .filter(|op| matches!(op, Opcode::SetTyping | Opcode::SendMessage))
        .collect();
    assert_eq!(opcodes, [Opcode::SetTyping, Opcode::SetTyping, Opcode::SendMessage]);

    let stops: Vec<bool> = cluster
        .backend
        .received()
        .into_iter()
        .filter_map(|(_, frame)| match Payload::from_frame(&frame) {
            Ok(Payload::SetTyping(typing)) => Some(typing.is_typing),
            _ => None,
        })
        .collect();
    assert_eq!(stops, [true, false]);
    assert!(!cluster.client(1).snapshot().anyone_typing);

    cluster.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn leaving_clears_resume_and_notifies_room() {
    let (mut cluster, room_id) = room_of_two().await;
    assert!(cluster.client(1).storage.load_resume().unwrap().is_some());

    cluster.client(1).handle.leave_room().await.unwrap();
    cluster.check_settled("after leave").await;

    let bob = cluster.client(1).snapshot();
    assert_eq!(bob.phase, SessionPhase::Ready);
    assert!(bob.messages.is_empty());
    assert!(cluster.client(1).storage.load_resume().unwrap().is_none());
    assert_eq!(
        cluster.client(1).storage.load_identity().unwrap().map(|i| i.nickname),
        Some("bob".to_string())
    );

    let alice = cluster.client(0).snapshot();
    assert_eq!(alice.roster.len(), 1);
    assert!(alice.messages.iter().any(|m| m.body == "bob left the room"));
    assert_eq!(cluster.backend.participants(&room_id).len(), 1);

    cluster.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn joining_a_missing_room_fails_cleanly() {
    let mut cluster = SimCluster::new(2);
    let bob = cluster.add_client();
    cluster.settle().await;

    let result = cluster.client(bob).handle.join_room("bob", "  no-such-room ", "🐻").await;
    assert_eq!(result, Err(SessionError::RoomNotFound { room_id: "no-such-room".to_string() }));

    cluster.check_settled("after failed join").await;
    let snapshot = cluster.client(bob).snapshot();
    assert_eq!(snapshot.phase, SessionPhase::Ready);
    assert!(snapshot.status.is_some());

    cluster.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn local_validation_rejects_before_the_wire() {
    let (mut cluster, _) = room_of_two().await;
    let sent_before = cluster.backend.received().len();

    let handle = &cluster.client(0).handle;
    assert!(matches!(handle.send_message("   ").await, Err(SessionError::InvalidMessage { .. })));
    assert!(matches!(
        handle.send_message(&"x".repeat(501)).await,
        Err(SessionError::InvalidMessage { .. })
    ));
    assert!(matches!(
        handle.create_room("a", "🦊").await,
        Err(SessionError::InvalidIdentity { .. })
    ));
    assert_eq!(handle.join_room("alice", "   ", "🦊").await, Err(SessionError::InvalidRoomId));

    cluster.settle().await;
    assert_eq!(cluster.backend.received().len(), sent_before);

    cluster.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn backend_rejection_surfaces_as_status() {
    let (mut cluster, room_id) = room_of_two().await;
    cluster.backend.reject_messages(Some(ErrorPayload::rate_limited(5)));

    cluster.client(0).handle.send_message("too fast").await.unwrap();
    cluster.check_settled("after rejection").await;

    let alice = cluster.client(0).snapshot();
    assert_eq!(alice.phase, SessionPhase::InRoom);
    assert!(alice.status.as_deref().is_some_and(|s| s.contains("slow down")));
    assert!(cluster.backend.history(&room_id).is_empty());

    cluster.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn create_from_a_room_moves_rooms() {
    let (mut cluster, first) = room_of_two().await;

    let second = cluster.client(1).handle.create_room("bob", "🐻").await.unwrap();
    cluster.check_settled("after move").await;

    assert_ne!(first, second);
    assert_eq!(cluster.client(1).snapshot().room_id.as_deref(), Some(second.as_str()));
    assert_eq!(cluster.backend.participants(&first).len(), 1);
    assert!(cluster.client(0).snapshot().messages.iter().any(|m| m.body == "bob left the room"));

    cluster.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn handle_fails_after_shutdown() {
    let mut cluster = SimCluster::new(3);
    let alice = cluster.add_client();
    cluster.settle().await;

    cluster.clients[alice].stop().await;

    assert!(!cluster.client(alice).is_running());
    assert_eq!(
        cluster.client(alice).handle.create_room("alice", "🦊").await,
        Err(SessionError::NotConnected)
    );
    assert_eq!(cluster.client(alice).snapshot().phase, SessionPhase::Idle);
    assert!(cluster.backend.links().is_empty());
}
