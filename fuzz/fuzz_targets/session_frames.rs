//! Fuzz target for the Session state machine
//!
//! Interleaves user intents, link changes, clock ticks and backend frames
//! (well-formed and raw) in arbitrary order.
//!
//! # Invariants
//!
//! - A room id is present exactly when an identity is present
//! - Without a room the log and roster are empty
//! - Message perm ids are unique and timestamps never go backwards
//! - Revision and generation never decrease
//! - Typing is only reported inside a room

#![no_main]

use std::{
    collections::HashSet,
    time::{Duration, Instant},
};

use arbitrary::Arbitrary;
use bytes::Bytes;
use huddle_client::{ConnectionState, Session, SessionEvent};
use huddle_proto::{
    payloads::{
        chat::{ChatMessage, MessageRecord, TypingUpdate},
        room::{Participant, Presence, PresenceKind, RoomCreated, RoomGone, RoomJoined, Resync},
    },
    ErrorPayload, Frame, FrameHeader, Opcode, Payload,
};
use libfuzzer_sys::fuzz_target;

const ROOMS: [&str; 2] = ["room-1", "room-2"];

#[derive(Debug, Arbitrary)]
enum Op {
    Create { nickname: String },
    Join { room: u8 },
    Leave,
    Send { body: String },
    Typing(bool),
    Reconnect,
    Link(Link),
    Tick { advance_ms: u16 },
    Backend { request_id: u8, reply: Reply },
    Raw { opcode: u16, request_id: u32, payload: Vec<u8> },
}

#[derive(Debug, Arbitrary)]
enum Link {
    Down,
    Connecting,
    Up,
}

#[derive(Debug, Arbitrary)]
enum Reply {
    Created { room: u8, participant: u8, timestamp: u32 },
    Joined { room: u8, participant: u8, timestamp: u32, others: u8 },
    Resync { room: u8, participant: u8, messages: Vec<(u8, u32)> },
    Gone { room: u8 },
    Presence { room: u8, perm: u8, participant: u8, joined: bool, timestamp: u32 },
    Message { room: u8, perm: u8, timestamp: u32 },
    Typing { room: u8, participant: u8, is_typing: bool },
    Error { code: u16 },
}

fn room(index: u8) -> String {
    ROOMS[index as usize % ROOMS.len()].to_string()
}

fn participant(id: u8) -> Participant {
    Participant { id: u64::from(id), nickname: format!("user{id}"), icon: "🙂".to_string() }
}

fn record(perm: u8, timestamp: u32) -> MessageRecord {
    MessageRecord {
        perm_id: format!("m{perm}"),
        timestamp: u64::from(timestamp),
        user_nickname: Some("peer".to_string()),
        user_icon: Some("🙂".to_string()),
        body: "hi".to_string(),
        is_system: false,
    }
}

fn reply_frame(request_id: u8, reply: Reply) -> Option<Frame> {
    let payload = match reply {
        Reply::Created { room: r, participant, timestamp } => Payload::RoomCreated(RoomCreated {
            room_id: room(r),
            participant_id: u64::from(participant),
            timestamp: u64::from(timestamp),
        }),
        Reply::Joined { room: r, participant: p, timestamp, others } => {
            Payload::RoomJoined(RoomJoined {
                room_id: room(r),
                participant_id: u64::from(p),
                timestamp: u64::from(timestamp),
                participants: (0..others % 4).map(participant).chain([participant(p)]).collect(),
            })
        },
        Reply::Resync { room: r, participant: p, messages } => Payload::Resync(Resync {
            room_id: room(r),
            participant_id: u64::from(p),
            participants: vec![participant(p)],
            messages: messages.into_iter().map(|(perm, ts)| record(perm, ts)).collect(),
        }),
        Reply::Gone { room: r } => {
            Payload::RoomGone(RoomGone { room_id: room(r), reason: "gone".to_string() })
        },
        Reply::Presence { room: r, perm, participant: p, joined, timestamp } => {
            Payload::Presence(Presence {
                room_id: room(r),
                perm_id: format!("p{perm}"),
                timestamp: u64::from(timestamp),
                participant: participant(p),
                kind: if joined { PresenceKind::Joined } else { PresenceKind::Left },
            })
        },
        Reply::Message { room: r, perm, timestamp } => {
            Payload::Message(ChatMessage { room_id: room(r), record: record(perm, timestamp) })
        },
        Reply::Typing { room: r, participant, is_typing } => {
            Payload::TypingUpdate(TypingUpdate {
                room_id: room(r),
                participant_id: u64::from(participant),
                is_typing,
            })
        },
        Reply::Error { code } => {
            Payload::Error(ErrorPayload { code, message: "nope".to_string(), retry_after: None })
        },
    };

    payload.into_request(u32::from(request_id)).ok()
}

fuzz_target!(|ops: Vec<Op>| {
    let mut session: Session<Instant> = Session::new();
    let mut now = Instant::now();
    let mut revision = session.revision();
    let mut generation = session.generation();

    for op in ops {
        let _ = match op {
            Op::Create { nickname } => session.create_room(&nickname, "🙂").map(|(_, a)| a),
            Op::Join { room: r } => session.join_room("fuzzer", &room(r), "🙂").map(|(_, a)| a),
            Op::Leave => session.leave_room(),
            Op::Send { body } => session.send_message(&body),
            Op::Typing(is_typing) => Ok(session.set_typing(is_typing)),
            Op::Reconnect => Ok(session.reconnect()),
            Op::Link(link) => {
                let state = match link {
                    Link::Down => ConnectionState::Disconnected,
                    Link::Connecting => ConnectionState::Connecting,
                    Link::Up => ConnectionState::Connected,
                };
                session.handle(SessionEvent::ConnectionChanged(state))
            },
            Op::Tick { advance_ms } => {
                now += Duration::from_millis(u64::from(advance_ms));
                session.handle(SessionEvent::Tick { now })
            },
            Op::Backend { request_id, reply } => match reply_frame(request_id, reply) {
                Some(frame) => session.handle(SessionEvent::FrameReceived { frame, now }),
                None => continue,
            },
            Op::Raw { opcode, request_id, payload } => {
                let Some(opcode) = Opcode::from_u16(opcode) else { continue };
                let header = FrameHeader::with_request(opcode, request_id);
                let frame = Frame::new(header, Bytes::from(payload));
                session.handle(SessionEvent::FrameReceived { frame, now })
            },
        };

        assert_eq!(session.room_id().is_some(), session.identity().is_some());
        if session.room_id().is_none() {
            assert!(session.messages().is_empty());
            assert_eq!(session.roster().count(), 0);
            assert!(!session.anyone_typing());
            assert!(!session.is_self_typing());
        }

        let mut seen = HashSet::new();
        for message in session.messages() {
            assert!(seen.insert(message.perm_id.as_str()), "duplicate {}", message.perm_id);
        }
        assert!(session.messages().windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

        assert!(session.revision() >= revision);
        assert!(session.generation() >= generation);
        revision = session.revision();
        generation = session.generation();
    }
});
