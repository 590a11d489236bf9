//! In-memory chat backend for simulation.
//!
//! `SimBackend` speaks the wire protocol to any number of [`SimDriver`]s and
//! keeps just enough room state to answer them: rooms, their participants and
//! their history. Everything happens synchronously inside the caller's
//! `send_frame`, and replies land on per-link channels that the drivers
//! drain.
//!
//! Tests reach in through the same handle to inject faults: drop a link, make
//! the backend unreachable, stop answering, close a room, reject messages.
//!
//! [`SimDriver`]: crate::SimDriver

#![allow(clippy::disallowed_types, reason = "Synchronous locking operations only")]

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use huddle_app::TransportEvent;
use huddle_proto::{
    ErrorPayload, Frame, FrameHeader, Opcode, Payload,
    payloads::{
        chat::{ChatMessage, MessageRecord, TypingUpdate},
        room::{
            Participant, Presence, PresenceKind, RESYNC_PAGE, Resync, RoomCreated, RoomGone,
            RoomJoined,
        },
        session::HelloReply,
    },
};
use tokio::sync::mpsc;

use crate::SimDriverError;

/// Wall-clock milliseconds the backend starts stamping from.
pub const EPOCH_MS: u64 = 1_700_000_000_000;

/// Events flowing from the backend to one driver.
pub type LinkEvents = mpsc::UnboundedReceiver<TransportEvent>;

struct Link {
    events: mpsc::UnboundedSender<TransportEvent>,
    member: Option<(String, u64)>,
}

#[derive(Default)]
struct Room {
    participants: BTreeMap<u64, (Participant, u64)>,
    history: Vec<MessageRecord>,
}

struct BackendState {
    reachable: bool,
    muted: bool,
    reject_messages: Option<ErrorPayload>,
    links: HashMap<u64, Link>,
    rooms: BTreeMap<String, Room>,
    received: Vec<(u64, Frame)>,
    connect_attempts: u32,
    next_link: u64,
    next_participant: u64,
    next_room: u64,
    next_perm: u64,
    clock_ms: u64,
}

impl Default for BackendState {
    fn default() -> Self {
        Self {
            reachable: true,
            muted: false,
            reject_messages: None,
            links: HashMap::new(),
            rooms: BTreeMap::new(),
            received: Vec::new(),
            connect_attempts: 0,
            next_link: 1,
            next_participant: 1,
            next_room: 1,
            next_perm: 1,
            clock_ms: EPOCH_MS,
        }
    }
}

/// Shared handle to the simulated backend.
///
/// Clones refer to the same backend.
#[derive(Clone, Default)]
pub struct SimBackend {
    state: Arc<Mutex<BackendState>>,
}

impl SimBackend {
    /// Reachable backend with no rooms.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BackendState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a link. The returned channel already holds
    /// [`TransportEvent::Connected`].
    pub(crate) fn open_link(&self) -> Result<(u64, LinkEvents), SimDriverError> {
        let mut state = self.lock();
        state.connect_attempts += 1;
        if !state.reachable {
            return Err(SimDriverError("backend unreachable".to_string()));
        }

        let link_id = state.next_link;
        state.next_link += 1;

        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(TransportEvent::Connected);
        state.links.insert(link_id, Link { events: tx, member: None });

        tracing::trace!(link_id, "sim link opened");
        Ok((link_id, rx))
    }

    /// The client closed its side.
    pub(crate) fn close_link(&self, link_id: u64) {
        let mut state = self.lock();
        state.leave_current(link_id);
        state.links.remove(&link_id);
    }

    /// A frame from a client.
    pub(crate) fn deliver(&self, link_id: u64, frame: Frame) -> Result<(), SimDriverError> {
        let mut state = self.lock();
        if !state.links.contains_key(&link_id) {
            return Err(SimDriverError(format!("link {link_id} is closed")));
        }

        state.received.push((link_id, frame.clone()));
        if state.muted {
            return Ok(());
        }

        state.handle(link_id, &frame);
        Ok(())
    }

    /// Sever a link from the backend side. The client sees
    /// [`TransportEvent::Disconnected`].
    pub fn drop_link(&self, link_id: u64, reason: &str) {
        let mut state = self.lock();
        state.leave_current(link_id);
        if let Some(link) = state.links.remove(&link_id) {
            let _ = link.events.send(TransportEvent::Disconnected { reason: reason.to_string() });
        }
    }

    /// Sever every open link.
    pub fn drop_all(&self, reason: &str) {
        let ids: Vec<u64> = self.lock().links.keys().copied().collect();
        for link_id in ids {
            self.drop_link(link_id, reason);
        }
    }

    /// Refuse (or accept again) new links.
    pub fn set_reachable(&self, reachable: bool) {
        self.lock().reachable = reachable;
    }

    /// Stop (or resume) answering anything, pings included.
    pub fn set_muted(&self, muted: bool) {
        self.lock().muted = muted;
    }

    /// Answer every chat message with `error` instead of broadcasting it.
    pub fn reject_messages(&self, error: Option<ErrorPayload>) {
        self.lock().reject_messages = error;
    }

    /// Close a room, telling everyone in it.
    pub fn close_room(&self, room_id: &str, reason: &str) {
        let mut state = self.lock();
        let Some(room) = state.rooms.remove(room_id) else {
            return;
        };

        let gone = Payload::RoomGone(RoomGone {
            room_id: room_id.to_string(),
            reason: reason.to_string(),
        });
        for (_, link_id) in room.participants.values() {
            if let Some(link) = state.links.get_mut(link_id) {
                link.member = None;
            }
            state.send(*link_id, gone.clone(), 0);
        }
    }

    /// Push an arbitrary frame down one link.
    pub fn push_frame(&self, link_id: u64, frame: Frame) {
        self.lock().push(link_id, frame);
    }

    /// Currently open link ids, oldest first.
    pub fn links(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.lock().links.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Link ids of everyone in `room_id`.
    pub fn links_in(&self, room_id: &str) -> Vec<u64> {
        self.lock()
            .rooms
            .get(room_id)
            .map(|room| room.participants.values().map(|(_, link)| *link).collect())
            .unwrap_or_default()
    }

    /// Ids of rooms that exist.
    pub fn room_ids(&self) -> Vec<String> {
        self.lock().rooms.keys().cloned().collect()
    }

    /// Participants of `room_id` in id order.
    pub fn participants(&self, room_id: &str) -> Vec<Participant> {
        self.lock()
            .rooms
            .get(room_id)
            .map(|room| room.participants.values().map(|(p, _)| p.clone()).collect())
            .unwrap_or_default()
    }

    /// Full history of `room_id`.
    pub fn history(&self, room_id: &str) -> Vec<MessageRecord> {
        self.lock().rooms.get(room_id).map(|room| room.history.clone()).unwrap_or_default()
    }

    /// Number of frames with `opcode` received so far, over all links.
    pub fn received_count(&self, opcode: Opcode) -> usize {
        self.lock().received.iter().filter(|(_, f)| f.opcode() == Some(opcode)).count()
    }

    /// Every frame received so far with the link it came in on.
    pub fn received(&self) -> Vec<(u64, Frame)> {
        self.lock().received.clone()
    }

    /// Number of link attempts, refused ones included.
    pub fn connect_attempts(&self) -> u32 {
        self.lock().connect_attempts
    }
}

impl BackendState {
    fn tick_clock(&mut self) -> u64 {
        self.clock_ms += 1;
        self.clock_ms
    }

    fn perm_id(&mut self) -> String {
        let id = self.next_perm;
        self.next_perm += 1;
        format!("m{id:06}")
    }

    fn send(&mut self, link_id: u64, payload: Payload, request_id: u32) {
        match payload.into_request(request_id) {
            Ok(frame) => self.push(link_id, frame),
            Err(error) => tracing::warn!(%error, "sim backend failed to encode"),
        }
    }

    fn push(&self, link_id: u64, frame: Frame) {
        if let Some(link) = self.links.get(&link_id) {
            let _ = link.events.send(TransportEvent::Frame(frame));
        }
    }

    fn broadcast(&mut self, room_id: &str, payload: &Payload, except: Option<u64>) {
        let targets: Vec<u64> = self
            .rooms
            .get(room_id)
            .map(|room| room.participants.values().map(|(_, link)| *link).collect())
            .unwrap_or_default();

        for link_id in targets.into_iter().filter(|id| Some(*id) != except) {
            self.send(link_id, payload.clone(), 0);
        }
    }

    fn handle(&mut self, link_id: u64, frame: &Frame) {
        let request_id = frame.request_id();

        let payload = match Payload::from_frame(frame) {
            Ok(payload) => payload,
            Err(error) => {
                let error = ErrorPayload::invalid_payload(error.to_string());
                self.send(link_id, Payload::Error(error), request_id);
                return;
            },
        };

        match payload {
            Payload::Hello(_) => {
                let reply = HelloReply { session_id: link_id };
                self.send(link_id, Payload::HelloReply(reply), request_id);
            },
            Payload::Ping => {
                if let Some(link) = self.links.get(&link_id) {
                    let _ = link.events.send(TransportEvent::Frame(Frame::empty(Opcode::Pong)));
                }
            },
            Payload::Pong | Payload::Goodbye(_) => {},
            Payload::CreateRoom(create) => {
                self.leave_current(link_id);
                let room_id = format!("room-{}", self.next_room);
                self.next_room += 1;
                self.rooms.insert(room_id.clone(), Room::default());

                let participant_id = self.admit(link_id, &room_id, create.nickname, create.icon);
                let created =
                    RoomCreated { room_id, participant_id, timestamp: self.tick_clock() };
                self.send(link_id, Payload::RoomCreated(created), request_id);
            },
            Payload::JoinRoom(join) => {
                if !self.rooms.contains_key(&join.room_id) {
                    let error = ErrorPayload::room_not_found(&join.room_id);
                    self.send(link_id, Payload::Error(error), request_id);
                    return;
                }
                self.leave_current(link_id);

                let participant_id = self.admit(link_id, &join.room_id, join.nickname, join.icon);
                let joined = RoomJoined {
                    participants: self.roster(&join.room_id),
                    room_id: join.room_id,
                    participant_id,
                    timestamp: self.tick_clock(),
                };
                self.send(link_id, Payload::RoomJoined(joined), request_id);
            },
            Payload::ResumeRoom(resume) => {
                if !self.rooms.contains_key(&resume.room_id) {
                    let gone = RoomGone {
                        room_id: resume.room_id,
                        reason: "room no longer exists".to_string(),
                    };
                    self.send(link_id, Payload::RoomGone(gone), request_id);
                    return;
                }
                self.leave_current(link_id);

                let participant_id =
                    self.admit(link_id, &resume.room_id, resume.nickname, resume.icon);
                let messages = self
                    .rooms
                    .get(&resume.room_id)
                    .map(|r| resync_page(&r.history, resume.since.as_deref()))
                    .unwrap_or_default();
                let resync = Resync {
                    participants: self.roster(&resume.room_id),
                    messages,
                    room_id: resume.room_id,
                    participant_id,
                };
                match fit_resync(resync, request_id) {
                    Ok(frame) => self.push(link_id, frame),
                    Err(error) => tracing::warn!(%error, "sim backend failed to encode"),
                }
            },
            Payload::LeaveRoom(_) => self.leave_current(link_id),
            Payload::SendMessage(message) => {
                let Some((room_id, participant_id)) = self.membership(link_id) else {
                    self.send(link_id, Payload::Error(ErrorPayload::not_in_room()), request_id);
                    return;
                };
                if let Some(error) = self.reject_messages.clone() {
                    self.send(link_id, Payload::Error(error), request_id);
                    return;
                }

                let author = self
                    .rooms
                    .get(&room_id)
                    .and_then(|room| room.participants.get(&participant_id))
                    .map(|(p, _)| (p.nickname.clone(), p.icon.clone()));
                let record = MessageRecord {
                    perm_id: self.perm_id(),
                    timestamp: self.tick_clock(),
                    user_nickname: author.as_ref().map(|(n, _)| n.clone()),
                    user_icon: author.map(|(_, i)| i),
                    body: message.body,
                    is_system: false,
                };
                if let Some(room) = self.rooms.get_mut(&room_id) {
                    room.history.push(record.clone());
                }

                let chat = Payload::Message(ChatMessage { room_id: room_id.clone(), record });
                self.broadcast(&room_id, &chat, None);
            },
            Payload::SetTyping(typing) => {
                if let Some((room_id, participant_id)) = self.membership(link_id) {
                    let update = Payload::TypingUpdate(TypingUpdate {
                        room_id: room_id.clone(),
                        participant_id,
                        is_typing: typing.is_typing,
                    });
                    self.broadcast(&room_id, &update, Some(link_id));
                }
            },
            other => {
                let error =
                    ErrorPayload::frame_rejected(format!("{:?} is server-only", other.opcode()));
                self.send(link_id, Payload::Error(error), request_id);
            },
        }
    }

    fn membership(&self, link_id: u64) -> Option<(String, u64)> {
        self.links.get(&link_id).and_then(|link| link.member.clone())
    }

    fn roster(&self, room_id: &str) -> Vec<Participant> {
        self.rooms
            .get(room_id)
            .map(|room| room.participants.values().map(|(p, _)| p.clone()).collect())
            .unwrap_or_default()
    }

    /// Add a participant and announce them to the rest of the room.
    fn admit(&mut self, link_id: u64, room_id: &str, nickname: String, icon: String) -> u64 {
        let participant_id = self.next_participant;
        self.next_participant += 1;
        let participant = Participant { id: participant_id, nickname, icon };

        if let Some(room) = self.rooms.get_mut(room_id) {
            room.participants.insert(participant_id, (participant.clone(), link_id));
        }
        if let Some(link) = self.links.get_mut(&link_id) {
            link.member = Some((room_id.to_string(), participant_id));
        }

        let presence = Payload::Presence(Presence {
            room_id: room_id.to_string(),
            perm_id: self.perm_id(),
            timestamp: self.tick_clock(),
            participant,
            kind: PresenceKind::Joined,
        });
        self.broadcast(room_id, &presence, Some(link_id));
        participant_id
    }

    /// Remove the link's participant from its room, if any.
    fn leave_current(&mut self, link_id: u64) {
        let member = self.links.get_mut(&link_id).and_then(|link| link.member.take());
        if let Some((room_id, participant_id)) = member {
            self.remove_participant(&room_id, participant_id);
        }
    }

    fn remove_participant(&mut self, room_id: &str, participant_id: u64) {
        let Some((participant, _)) =
            self.rooms.get_mut(room_id).and_then(|room| room.participants.remove(&participant_id))
        else {
            return;
        };

        let presence = Payload::Presence(Presence {
            room_id: room_id.to_string(),
            perm_id: self.perm_id(),
            timestamp: self.tick_clock(),
            participant,
            kind: PresenceKind::Left,
        });
        self.broadcast(room_id, &presence, None);
    }
}

/// History after `since`, or the newest page when the cursor is unknown.
fn resync_page(history: &[MessageRecord], since: Option<&str>) -> Vec<MessageRecord> {
    let after = since
        .and_then(|since| history.iter().position(|m| m.perm_id == since))
        .map_or(0, |index| index + 1);
    let start = after.max(history.len().saturating_sub(RESYNC_PAGE));
    history[start..].to_vec()
}

/// Encode `resync`, dropping its oldest messages until the frame fits.
fn fit_resync(mut resync: Resync, request_id: u32) -> huddle_proto::Result<Frame> {
    let max = FrameHeader::MAX_PAYLOAD_SIZE as usize;
    loop {
        let frame = Payload::Resync(resync.clone()).into_request(request_id)?;
        if frame.payload.len() <= max || resync.messages.is_empty() {
            return Ok(frame);
        }
        resync.messages.remove(0);
    }
}
