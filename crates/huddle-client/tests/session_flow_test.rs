//! Session lifecycle tests driven by hand-built backend frames.
//!
//! Each test scripts the backend side explicitly so the oracle is the exact
//! frame sequence, not a simulated server.

use std::time::{Duration, Instant};

use huddle_client::{
    ConnectionState, ResumeRecord, Session, SessionAction, SessionError, SessionEvent,
    SessionPhase, TYPING_TTL,
};
use huddle_proto::{
    Frame, Opcode, Payload,
    payloads::{
        ErrorPayload,
        chat::{ChatMessage, MessageRecord, TypingUpdate},
        room::{Participant, Presence, PresenceKind, RoomCreated, RoomGone, Resync},
    },
};
use proptest::prelude::*;

const ROOM: &str = "room-1";
const SELF_ID: u64 = 1;
const PEER_ID: u64 = 2;

fn frame(payload: Payload, request_id: u32) -> Frame {
    payload.into_request(request_id).unwrap()
}

fn recv(session: &mut Session, payload: Payload, request_id: u32) -> Vec<SessionAction> {
    session
        .handle(SessionEvent::FrameReceived { frame: frame(payload, request_id), now: Instant::now() })
        .unwrap()
}

fn link(session: &mut Session, state: ConnectionState) -> Vec<SessionAction> {
    session.handle(SessionEvent::ConnectionChanged(state)).unwrap()
}

fn sent(actions: &[SessionAction]) -> Vec<Frame> {
    actions
        .iter()
        .filter_map(|a| match a {
            SessionAction::Send(frame) => Some(frame.clone()),
            _ => None,
        })
        .collect()
}

fn record(perm_id: &str, timestamp: u64) -> MessageRecord {
    MessageRecord {
        perm_id: perm_id.to_string(),
        timestamp,
        user_nickname: Some("bob".to_string()),
        user_icon: Some("🐻".to_string()),
        body: format!("body of {perm_id}"),
        is_system: false,
    }
}

fn chat(perm_id: &str, timestamp: u64) -> Payload {
    Payload::Message(ChatMessage { room_id: ROOM.to_string(), record: record(perm_id, timestamp) })
}

fn peer() -> Participant {
    Participant { id: PEER_ID, nickname: "bob".to_string(), icon: "🐻".to_string() }
}

fn in_room() -> Session {
    let mut session = Session::new();
    link(&mut session, ConnectionState::Connected);
    let (request_id, _) = session.create_room("alice", "🦊").unwrap();
    recv(
        &mut session,
        Payload::RoomCreated(RoomCreated {
            room_id: ROOM.to_string(),
            participant_id: SELF_ID,
            timestamp: 1_000,
        }),
        request_id,
    );
    session
}

/// Drop the link and bring it back, returning the resume request id.
fn bounce(session: &mut Session) -> u32 {
    link(session, ConnectionState::Disconnected);
    assert_eq!(session.reconnect(), vec![SessionAction::Connect]);
    let actions = link(session, ConnectionState::Connected);

    let frames = sent(&actions);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].opcode(), Some(Opcode::ResumeRoom));
    frames[0].request_id()
}

#[test]
fn resume_asks_only_for_messages_after_the_newest_held() {
    let mut session = in_room();
    recv(&mut session, chat("m1", 2_000), 0);
    recv(&mut session, chat("m2", 2_500), 0);

    link(&mut session, ConnectionState::Disconnected);
    assert_eq!(session.reconnect(), vec![SessionAction::Connect]);
    let actions = link(&mut session, ConnectionState::Connected);

    let frames = sent(&actions);
    let Ok(Payload::ResumeRoom(resume)) = Payload::from_frame(&frames[0]) else {
        panic!("expected ResumeRoom, got {frames:?}");
    };
    assert_eq!(resume.since.as_deref(), Some("m2"));
}

#[test]
fn reconnect_and_resync_keeps_prior_messages() {
    let mut session = in_room();
    recv(&mut session, chat("m1", 2_000), 0);

    let request_id = bounce(&mut session);
    assert_eq!(session.phase(), SessionPhase::Resuming);

    recv(
        &mut session,
        Payload::Resync(Resync {
            room_id: ROOM.to_string(),
            participant_id: SELF_ID,
            participants: vec![peer()],
            messages: vec![record("m1", 2_000), record("m2", 3_000)],
        }),
        request_id,
    );

    // Oracle: local notice + m1 (kept) + m2 (new); m1 not duplicated
    assert_eq!(session.phase(), SessionPhase::InRoom);
    let ids: Vec<_> = session.messages().iter().map(|m| m.perm_id.as_str()).collect();
    assert_eq!(ids.len(), 3);
    assert_eq!(&ids[1..], ["m1", "m2"]);
    assert_eq!(session.roster().count(), 1);
}

#[test]
fn room_gone_falls_back_to_ready() {
    let mut session = in_room();
    bounce(&mut session);

    let actions = recv(
        &mut session,
        Payload::RoomGone(RoomGone { room_id: ROOM.to_string(), reason: "expired".to_string() }),
        0,
    );

    assert!(matches!(actions.as_slice(), [
        SessionAction::ClearResume,
        SessionAction::RoomLost { room_id, .. },
    ] if room_id == ROOM));
    assert_eq!(session.phase(), SessionPhase::Ready);
    assert!(session.messages().is_empty());
    assert!(session.room_id().is_none());
}

#[test]
fn error_answering_resume_loses_room() {
    let mut session = in_room();
    let request_id = bounce(&mut session);

    let actions =
        recv(&mut session, Payload::Error(ErrorPayload::room_not_found(ROOM)), request_id);

    assert!(actions.iter().any(|a| matches!(a, SessionAction::RoomLost { .. })));
    assert_eq!(session.phase(), SessionPhase::Ready);
}

#[test]
fn resuming_blocks_messages_but_allows_leave() {
    let mut session = in_room();
    bounce(&mut session);

    assert_eq!(session.send_message("hi"), Err(SessionError::NotConnected));
    assert!(session.set_typing(true).is_empty());

    let actions = session.leave_room().unwrap();
    assert_eq!(sent(&actions)[0].opcode(), Some(Opcode::LeaveRoom));
    assert_eq!(session.phase(), SessionPhase::Ready);
}

#[test]
fn persisted_record_resumes_on_first_connect() {
    let mut session: Session = Session::new();
    let record = ResumeRecord {
        room_id: ROOM.to_string(),
        nickname: "alice".to_string(),
        icon: "🦊".to_string(),
    };

    assert!(session.resume_from(&record));
    assert_eq!(session.phase(), SessionPhase::DisconnectedInRoom);
    assert_eq!(session.room_id(), Some(ROOM));
    assert!(session.participant_id().is_none());

    assert_eq!(session.reconnect(), vec![SessionAction::Connect]);
    let actions = link(&mut session, ConnectionState::Connected);
    assert_eq!(sent(&actions)[0].opcode(), Some(Opcode::ResumeRoom));
}

#[test]
fn resume_ignored_outside_idle() {
    let mut session = in_room();
    let record = ResumeRecord {
        room_id: "other".to_string(),
        nickname: "alice".to_string(),
        icon: "🦊".to_string(),
    };
    assert!(!session.resume_from(&record));
    assert_eq!(session.room_id(), Some(ROOM));
}

#[test]
fn pending_join_fails_on_disconnect() {
    let mut session: Session = Session::new();
    link(&mut session, ConnectionState::Connected);
    let (request_id, _) = session.join_room("alice", ROOM, "🦊").unwrap();

    let actions = link(&mut session, ConnectionState::Disconnected);

    assert_eq!(actions, vec![SessionAction::RequestFailed {
        request_id,
        error: SessionError::NotConnected
    }]);
    assert_eq!(session.phase(), SessionPhase::Idle);
}

#[test]
fn traffic_for_other_rooms_is_dropped() {
    let mut session = in_room();
    let before = session.messages().len();

    recv(
        &mut session,
        Payload::Message(ChatMessage { room_id: "elsewhere".to_string(), record: record("x", 5) }),
        0,
    );
    recv(
        &mut session,
        Payload::TypingUpdate(TypingUpdate {
            room_id: "elsewhere".to_string(),
            participant_id: PEER_ID,
            is_typing: true,
        }),
        0,
    );

    assert_eq!(session.messages().len(), before);
    assert!(!session.anyone_typing());
}

#[test]
fn presence_updates_roster_and_log() {
    let mut session = in_room();

    recv(
        &mut session,
        Payload::Presence(Presence {
            room_id: ROOM.to_string(),
            perm_id: "p1".to_string(),
            timestamp: 2_000,
            participant: peer(),
            kind: PresenceKind::Joined,
        }),
        0,
    );

    assert_eq!(session.roster().count(), 2);
    let last = session.messages().last().unwrap();
    assert!(last.is_system);
    assert!(last.body.contains("bob"));

    recv(
        &mut session,
        Payload::Presence(Presence {
            room_id: ROOM.to_string(),
            perm_id: "p2".to_string(),
            timestamp: 3_000,
            participant: peer(),
            kind: PresenceKind::Left,
        }),
        0,
    );

    assert_eq!(session.roster().count(), 1);
    assert_eq!(session.phase(), SessionPhase::InRoom);
    assert_eq!(session.connection_state(), ConnectionState::Connected);
}

#[test]
fn remote_typing_expires_and_ignores_self() {
    let mut session = in_room();
    let t0 = Instant::now();

    let typing = |id, is_typing| SessionEvent::FrameReceived {
        frame: frame(
            Payload::TypingUpdate(TypingUpdate {
                room_id: ROOM.to_string(),
                participant_id: id,
                is_typing,
            }),
            0,
        ),
        now: t0,
    };

    session.handle(typing(SELF_ID, true)).unwrap();
    assert!(!session.anyone_typing());

    session.handle(typing(PEER_ID, true)).unwrap();
    assert!(session.anyone_typing());

    session.handle(SessionEvent::Tick { now: t0 + Duration::from_secs(1) }).unwrap();
    assert!(session.anyone_typing());

    session.handle(SessionEvent::Tick { now: t0 + TYPING_TTL }).unwrap();
    assert!(!session.anyone_typing());

    session.handle(typing(PEER_ID, true)).unwrap();
    session.handle(typing(PEER_ID, false)).unwrap();
    assert!(!session.anyone_typing());
}

#[test]
fn disconnect_clears_typing() {
    let mut session = in_room();
    session.set_typing(true);
    recv(
        &mut session,
        Payload::TypingUpdate(TypingUpdate {
            room_id: ROOM.to_string(),
            participant_id: PEER_ID,
            is_typing: true,
        }),
        0,
    );
    let generation = session.generation();

    link(&mut session, ConnectionState::Disconnected);

    assert!(!session.anyone_typing());
    assert!(!session.is_self_typing());
    assert!(session.generation() > generation);
}

#[derive(Debug, Clone)]
enum Op {
    Create,
    Join,
    Leave,
    Send(String),
    Typing(bool),
    Reconnect,
    Link(ConnectionState),
    AnswerPending,
    Echo(u8, u64),
    Resync,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Create),
        Just(Op::Join),
        Just(Op::Leave),
        "[ a-z]{0,8}".prop_map(Op::Send),
        any::<bool>().prop_map(Op::Typing),
        Just(Op::Reconnect),
        prop_oneof![
            Just(ConnectionState::Disconnected),
            Just(ConnectionState::Connecting),
            Just(ConnectionState::Connected),
        ]
        .prop_map(Op::Link),
        Just(Op::AnswerPending),
        (0u8..6, 0u64..10_000).prop_map(|(id, ts)| Op::Echo(id, ts)),
        Just(Op::Resync),
    ]
}

proptest! {
    #[test]
    fn session_invariants_hold(ops in prop::collection::vec(op(), 1..80)) {
        let mut session: Session = Session::new();
        let mut last_resume = None;

        for op in ops {
            let revision = session.revision();
            let actions = match op {
                Op::Create => session.create_room("alice", "🦊").map(|(_, a)| a).unwrap_or_default(),
                Op::Join => session.join_room("alice", ROOM, "🦊").map(|(_, a)| a).unwrap_or_default(),
                Op::Leave => session.leave_room().unwrap_or_default(),
                Op::Send(body) => {
                    let before = session.messages().len();
                    let result = session.send_message(&body);
                    prop_assert_eq!(session.messages().len(), before);
                    if body.trim().is_empty() {
                        prop_assert!(
                            matches!(result, Err(SessionError::InvalidMessage { .. })),
                            "blank body must be rejected first"
                        );
                        prop_assert_eq!(session.revision(), revision);
                    }
                    result.unwrap_or_default()
                },
                Op::Typing(value) => {
                    let first = session.set_typing(value);
                    let second = session.set_typing(value);
                    prop_assert!(second.is_empty());
                    first
                },
                Op::Reconnect => session.reconnect(),
                Op::Link(state) => link(&mut session, state),
                Op::AnswerPending => match session.pending_request() {
                    Some(request_id) => recv(
                        &mut session,
                        Payload::RoomCreated(RoomCreated {
                            room_id: ROOM.to_string(),
                            participant_id: SELF_ID,
                            timestamp: 500,
                        }),
                        request_id,
                    ),
                    None => vec![],
                },
                Op::Echo(id, ts) => recv(&mut session, chat(&format!("m{id}"), ts), 0),
                Op::Resync => match last_resume {
                    Some(request_id) => recv(
                        &mut session,
                        Payload::Resync(Resync {
                            room_id: ROOM.to_string(),
                            participant_id: SELF_ID,
                            participants: vec![peer()],
                            messages: vec![record("m0", 1), record("m9", 9_999)],
                        }),
                        request_id,
                    ),
                    None => vec![],
                },
            };

            for frame in sent(&actions) {
                if frame.opcode() == Some(Opcode::ResumeRoom) {
                    last_resume = Some(frame.request_id());
                }
            }

            // Oracle: room id iff identity
            prop_assert_eq!(session.room_id().is_some(), session.identity().is_some());

            // Oracle: unique perm ids, non-decreasing timestamps
            let messages = session.messages();
            let mut ids: Vec<_> = messages.iter().map(|m| m.perm_id.clone()).collect();
            ids.sort();
            ids.dedup();
            prop_assert_eq!(ids.len(), messages.len());
            for pair in messages.windows(2) {
                prop_assert!(pair[0].timestamp <= pair[1].timestamp);
            }

            // Oracle: phase agrees with connection state
            let connected = session.connection_state() == ConnectionState::Connected;
            match session.phase() {
                SessionPhase::Ready | SessionPhase::InRoom | SessionPhase::Resuming => prop_assert!(connected),
                SessionPhase::Idle => prop_assert_eq!(session.connection_state(), ConnectionState::Disconnected),
                SessionPhase::Connecting => prop_assert_eq!(session.connection_state(), ConnectionState::Connecting),
                SessionPhase::DisconnectedInRoom => prop_assert!(!connected),
            }

            // Oracle: typing only while in a room
            if session.phase() != SessionPhase::InRoom {
                prop_assert!(!session.is_self_typing());
            }
        }
    }
}
