//! Session state machine.
//!
//! Owns room membership, the message log, the roster and typing state, and
//! validates every intent against the current state. Inbound traffic and link
//! changes arrive as [`SessionEvent`]s; effects leave as [`SessionAction`]s.
//!
//! # State Machine
//!
//! ```text
//!            reconnect          Connected
//!  ┌──────┐ ──────────> ┌────────────┐ ──────────> ┌───────┐
//!  │ Idle │             │ Connecting │             │ Ready │<─────────────┐
//!  └──────┘ <────────── └────────────┘             └───────┘              │
//!     ^      Disconnected                   create/join │ ^ leave/RoomGone │
//!     │                                      response   v │                │
//!     │ leave                                       ┌────────┐             │
//!     │                        ┌───────────────────>│ InRoom │             │
//!     │                        │ Resync             └────────┘             │
//!     │                  ┌──────────┐                   │ Disconnected     │
//!     │                  │ Resuming │─────────────────────────────────────>┘
//!     │                  └──────────┘                   v
//!     │                        ^ Connected    ┌────────────────────┐
//!     └───────────────────────────────────────│ DisconnectedInRoom │
//!                                             └────────────────────┘
//! ```
//!
//! # Counters
//!
//! `generation` increments whenever membership changes or typing state is
//! reset. Timers armed under an older generation are discarded. `revision`
//! increments on every accepted transition and tells observers when to
//! re-read.

use std::{
    collections::BTreeMap,
    ops::Add,
    time::{Duration, Instant},
};

use huddle_core::ConnectionState;
use huddle_proto::{
    Frame, FrameHeader, Opcode, Payload,
    payloads::{
        ErrorPayload,
        chat::{ChatMessage, SendMessage, SetTyping, TypingUpdate},
        room::{
            CreateRoom, JoinRoom, LeaveRoom, Participant, Presence, PresenceKind, ResumeRoom,
            RoomCreated, RoomGone, RoomJoined, Resync,
        },
    },
};

use crate::{
    error::SessionError,
    event::{SessionAction, SessionEvent},
    identity::{Identity, ResumeRecord},
    log::{Message, MessageLog},
    typing::TypingSet,
};

/// Longest accepted message body, in characters, after trimming.
pub const MAX_MESSAGE_CHARS: usize = 500;

/// Observable phase of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionPhase {
    /// Disconnected, no room
    Idle,
    /// Transport coming up, no room
    Connecting,
    /// Connected, no room
    Ready,
    /// Connected, in a room
    InRoom,
    /// Connected, room retained, waiting for the backend to resync it
    Resuming,
    /// Transport down, room retained
    DisconnectedInRoom,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum RequestKind {
    Create,
    Join { room_id: String },
}

/// Outstanding create or join.
#[derive(Debug, Clone)]
struct PendingRequest {
    request_id: u32,
    kind: RequestKind,
    identity: Identity,
}

/// Everything that exists only while we belong to a room.
#[derive(Debug, Clone)]
struct Membership<I> {
    room_id: String,
    identity: Identity,
    /// Unknown until the backend confirms a resumed membership.
    participant_id: Option<u64>,
    log: MessageLog,
    roster: BTreeMap<u64, Participant>,
    typing: TypingSet<I>,
    self_typing: bool,
}

impl<I> Membership<I> {
    fn new(room_id: String, identity: Identity, participant_id: Option<u64>) -> Self {
        Self {
            room_id,
            identity,
            participant_id,
            log: MessageLog::new(),
            roster: BTreeMap::new(),
            typing: TypingSet::default(),
            self_typing: false,
        }
    }

    fn resume_record(&self) -> ResumeRecord {
        ResumeRecord::new(self.room_id.clone(), &self.identity)
    }

    fn reset_typing(&mut self) {
        self.typing.clear();
        self.self_typing = false;
    }
}

#[derive(Debug, Clone)]
enum State<I> {
    Idle,
    Connecting,
    Ready { pending: Option<PendingRequest> },
    InRoom(Membership<I>),
    Resuming { membership: Membership<I>, request_id: u32 },
    DisconnectedInRoom { membership: Membership<I>, link: ConnectionState },
}

/// Client-side session for a single room.
///
/// Generic over `Instant` so simulation can drive typing expiry with virtual
/// time.
#[derive(Debug, Clone)]
pub struct Session<I = Instant> {
    state: State<I>,
    generation: u64,
    revision: u64,
    last_request_id: u32,
    local_seq: u64,
}

impl<I> Default for Session<I> {
    fn default() -> Self {
        Self { state: State::Idle, generation: 0, revision: 0, last_request_id: 0, local_seq: 0 }
    }
}

impl<I> Session<I>
where
    I: Copy + Ord + Add<Duration, Output = I>,
{
    /// A session in [`SessionPhase::Idle`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Current phase.
    pub fn phase(&self) -> SessionPhase {
        match &self.state {
            State::Idle => SessionPhase::Idle,
            State::Connecting => SessionPhase::Connecting,
            State::Ready { .. } => SessionPhase::Ready,
            State::InRoom(_) => SessionPhase::InRoom,
            State::Resuming { .. } => SessionPhase::Resuming,
            State::DisconnectedInRoom { .. } => SessionPhase::DisconnectedInRoom,
        }
    }

    /// Connection state as last reported by the link.
    pub fn connection_state(&self) -> ConnectionState {
        match &self.state {
            State::Idle => ConnectionState::Disconnected,
            State::Connecting => ConnectionState::Connecting,
            State::Ready { .. } | State::InRoom(_) | State::Resuming { .. } => {
                ConnectionState::Connected
            },
            State::DisconnectedInRoom { link, .. } => *link,
        }
    }

    /// Membership change counter.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Accepted transition counter.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Current room. Present iff [`Self::identity`] is present.
    pub fn room_id(&self) -> Option<&str> {
        self.membership().map(|m| m.room_id.as_str())
    }

    /// Identity used in the current room.
    pub fn identity(&self) -> Option<&Identity> {
        self.membership().map(|m| &m.identity)
    }

    /// Our participant id in the current room, once known.
    pub fn participant_id(&self) -> Option<u64> {
        self.membership().and_then(|m| m.participant_id)
    }

    /// Message log of the current room, empty outside a room.
    pub fn messages(&self) -> &[Message] {
        self.membership().map(|m| m.log.entries()).unwrap_or_default()
    }

    /// Participants of the current room, in id order.
    pub fn roster(&self) -> impl Iterator<Item = &Participant> {
        self.membership().into_iter().flat_map(|m| m.roster.values())
    }

    /// Whether any remote participant is typing.
    pub fn anyone_typing(&self) -> bool {
        self.membership().is_some_and(|m| !m.typing.is_empty())
    }

    /// Whether we last told the backend we are typing.
    pub fn is_self_typing(&self) -> bool {
        self.membership().is_some_and(|m| m.self_typing)
    }

    /// Request id of the outstanding create/join, if any.
    pub fn pending_request(&self) -> Option<u32> {
        match &self.state {
            State::Ready { pending } => pending.as_ref().map(|p| p.request_id),
            _ => None,
        }
    }

    /// The record a restart would resume from.
    pub fn resume_record(&self) -> Option<ResumeRecord> {
        self.membership().map(Membership::resume_record)
    }

    fn membership(&self) -> Option<&Membership<I>> {
        match &self.state {
            State::InRoom(m)
            | State::Resuming { membership: m, .. }
            | State::DisconnectedInRoom { membership: m, .. } => Some(m),
            _ => None,
        }
    }

    /// Membership that can receive traffic for `room_id`.
    fn live_membership_mut(&mut self, room_id: &str) -> Option<&mut Membership<I>> {
        match &mut self.state {
            State::InRoom(m) | State::Resuming { membership: m, .. } if m.room_id == room_id => {
                Some(m)
            },
            _ => None,
        }
    }

    fn next_request_id(&mut self) -> u32 {
        self.last_request_id = self.last_request_id.wrapping_add(1);
        if self.last_request_id == 0 {
            self.last_request_id = 1;
        }
        self.last_request_id
    }

    fn system_message(&mut self, timestamp: u64, body: String) -> Message {
        self.local_seq += 1;
        Message {
            perm_id: format!("local:{}", self.local_seq),
            timestamp,
            user_nickname: None,
            user_icon: None,
            body,
            is_system: true,
        }
    }

    fn membership_changed(&mut self) {
        self.generation += 1;
        self.revision += 1;
    }

    /// Create a new room.
    ///
    /// Returns the request id the backend will answer. From `InRoom` the
    /// current room is left first.
    ///
    /// # Errors
    ///
    /// - `SessionError::InvalidIdentity` if nickname or icon are invalid
    /// - `SessionError::JoinInProgress` if a create/join is outstanding
    /// - `SessionError::NotConnected` outside `Ready`/`InRoom`
    pub fn create_room(
        &mut self,
        nickname: &str,
        icon: &str,
    ) -> Result<(u32, Vec<SessionAction>), SessionError> {
        let identity = Identity::new(nickname, icon)?;
        self.check_request_window()?;

        let request_id = self.next_request_id();
        let frame = Payload::CreateRoom(CreateRoom {
            nickname: identity.nickname.clone(),
            icon: identity.icon.clone(),
        })
        .into_request(request_id)?;

        let mut actions = self.leave_for_request();
        actions.push(SessionAction::Send(frame));

        self.state = State::Ready {
            pending: Some(PendingRequest { request_id, kind: RequestKind::Create, identity }),
        };
        self.revision += 1;

        tracing::debug!(request_id, "create room requested");

        Ok((request_id, actions))
    }

    /// Join an existing room.
    ///
    /// # Errors
    ///
    /// - `SessionError::InvalidIdentity` if nickname or icon are invalid
    /// - `SessionError::InvalidRoomId` if `room_id` is blank
    /// - `SessionError::JoinInProgress` if a create/join is outstanding
    /// - `SessionError::NotConnected` outside `Ready`/`InRoom`
    pub fn join_room(
        &mut self,
        nickname: &str,
        room_id: &str,
        icon: &str,
    ) -> Result<(u32, Vec<SessionAction>), SessionError> {
        let identity = Identity::new(nickname, icon)?;
        let room_id = room_id.trim();
        if room_id.is_empty() {
            return Err(SessionError::InvalidRoomId);
        }
        self.check_request_window()?;

        let request_id = self.next_request_id();
        let frame = Payload::JoinRoom(JoinRoom {
            room_id: room_id.to_string(),
            nickname: identity.nickname.clone(),
            icon: identity.icon.clone(),
        })
        .into_request(request_id)?;

        let mut actions = self.leave_for_request();
        actions.push(SessionAction::Send(frame));

        self.state = State::Ready {
            pending: Some(PendingRequest {
                request_id,
                kind: RequestKind::Join { room_id: room_id.to_string() },
                identity,
            }),
        };
        self.revision += 1;

        tracing::debug!(request_id, room_id, "join room requested");

        Ok((request_id, actions))
    }

    fn check_request_window(&self) -> Result<(), SessionError> {
        match &self.state {
            State::Ready { pending: Some(_) } => Err(SessionError::JoinInProgress),
            State::Ready { pending: None } | State::InRoom(_) => Ok(()),
            _ => Err(SessionError::NotConnected),
        }
    }

    /// Implicit leave before a create/join from `InRoom`.
    fn leave_for_request(&mut self) -> Vec<SessionAction> {
        if matches!(self.state, State::InRoom(_)) {
            self.leave_room().unwrap_or_default()
        } else {
            vec![]
        }
    }

    /// Leave the current room.
    ///
    /// Connected: sends a best-effort leave notice and returns to `Ready`.
    /// Disconnected: drops the retained room locally.
    ///
    /// # Errors
    ///
    /// - `SessionError::NotInRoom` if there is no room to leave
    pub fn leave_room(&mut self) -> Result<Vec<SessionAction>, SessionError> {
        match std::mem::replace(&mut self.state, State::Idle) {
            State::InRoom(membership) | State::Resuming { membership, .. } => {
                let mut actions = Vec::new();
                let notice = Payload::LeaveRoom(LeaveRoom { room_id: membership.room_id.clone() })
                    .into_frame(FrameHeader::new(Opcode::LeaveRoom));
                match notice {
                    Ok(frame) => actions.push(SessionAction::Send(frame)),
                    Err(e) => tracing::warn!(error = %e, "failed to encode leave notice"),
                }
                actions.push(SessionAction::ClearResume);

                tracing::info!(room_id = %membership.room_id, "left room");

                self.state = State::Ready { pending: None };
                self.membership_changed();
                Ok(actions)
            },
            State::DisconnectedInRoom { membership, link } => {
                tracing::info!(room_id = %membership.room_id, "dropped room while offline");

                self.state = match link {
                    ConnectionState::Connecting => State::Connecting,
                    _ => State::Idle,
                };
                self.membership_changed();
                Ok(vec![SessionAction::ClearResume])
            },
            other => {
                self.state = other;
                Err(SessionError::NotInRoom)
            },
        }
    }

    /// Send a chat message.
    ///
    /// The body is trimmed. Nothing is appended locally; the entry appears
    /// when the backend echoes it.
    ///
    /// # Errors
    ///
    /// - `SessionError::InvalidMessage` if the body is blank or too long
    /// - `SessionError::NotInRoom` if there is no room
    /// - `SessionError::NotConnected` if the room is retained but offline
    pub fn send_message(&mut self, body: &str) -> Result<Vec<SessionAction>, SessionError> {
        let body = body.trim();
        if body.is_empty() {
            return Err(SessionError::InvalidMessage { reason: "message is empty".to_string() });
        }
        if body.chars().count() > MAX_MESSAGE_CHARS {
            return Err(SessionError::InvalidMessage {
                reason: format!("message exceeds {MAX_MESSAGE_CHARS} characters"),
            });
        }

        match &self.state {
            State::InRoom(_) => {},
            State::Resuming { .. } | State::DisconnectedInRoom { .. } => {
                return Err(SessionError::NotConnected);
            },
            _ => return Err(SessionError::NotInRoom),
        }

        let request_id = self.next_request_id();
        let frame =
            Payload::SendMessage(SendMessage { body: body.to_string() }).into_request(request_id)?;

        tracing::debug!(request_id, chars = body.chars().count(), "sending message");

        Ok(vec![SessionAction::Send(frame)])
    }

    /// Tell the room whether we are typing.
    ///
    /// Silent no-op outside `InRoom`. Repeating the current value sends
    /// nothing.
    pub fn set_typing(&mut self, is_typing: bool) -> Vec<SessionAction> {
        let State::InRoom(membership) = &mut self.state else {
            return vec![];
        };
        if membership.self_typing == is_typing {
            return vec![];
        }

        match Payload::SetTyping(SetTyping { is_typing }).into_frame(FrameHeader::new(Opcode::SetTyping))
        {
            Ok(frame) => {
                membership.self_typing = is_typing;
                vec![SessionAction::Send(frame)]
            },
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode typing signal");
                vec![]
            },
        }
    }

    /// Ask for the transport to come back.
    ///
    /// Valid from `Idle` and from `DisconnectedInRoom` while no attempt is in
    /// flight; a no-op otherwise.
    pub fn reconnect(&mut self) -> Vec<SessionAction> {
        if matches!(self.state, State::Idle) {
            self.state = State::Connecting;
            self.revision += 1;
            return vec![SessionAction::Connect];
        }

        if let State::DisconnectedInRoom { link, .. } = &mut self.state
            && *link == ConnectionState::Disconnected
        {
            *link = ConnectionState::Connecting;
            self.revision += 1;
            return vec![SessionAction::Connect];
        }

        vec![]
    }

    /// Seed a retained room from a persisted record.
    ///
    /// Only valid in `Idle`, before the first connect. Returns whether the
    /// record was adopted.
    pub fn resume_from(&mut self, record: &ResumeRecord) -> bool {
        if !matches!(self.state, State::Idle) {
            return false;
        }

        let identity = match Identity::new(&record.nickname, &record.icon) {
            Ok(identity) => identity,
            Err(e) => {
                tracing::warn!(error = %e, "discarding invalid resume record");
                return false;
            },
        };

        tracing::info!(room_id = %record.room_id, "resuming persisted room");

        self.state = State::DisconnectedInRoom {
            membership: Membership::new(record.room_id.clone(), identity, None),
            link: ConnectionState::Disconnected,
        };
        self.membership_changed();
        true
    }

    /// Wind the session down before the process exits.
    ///
    /// The persisted resume record is left in place so the next launch
    /// resumes the room.
    pub fn shutdown(&mut self) -> Vec<SessionAction> {
        let mut actions = Vec::new();

        match std::mem::replace(&mut self.state, State::Idle) {
            State::InRoom(membership) if membership.self_typing => {
                match Payload::SetTyping(SetTyping { is_typing: false })
                    .into_frame(FrameHeader::new(Opcode::SetTyping))
                {
                    Ok(frame) => actions.push(SessionAction::Send(frame)),
                    Err(e) => tracing::warn!(error = %e, "failed to encode typing signal"),
                }
            },
            State::Ready { pending: Some(pending) } => {
                actions.push(SessionAction::RequestFailed {
                    request_id: pending.request_id,
                    error: SessionError::NotConnected,
                });
            },
            _ => {},
        }

        actions.push(SessionAction::Close);
        self.membership_changed();
        actions
    }

    /// Process an inbound event and return resulting actions.
    ///
    /// # Errors
    ///
    /// - `SessionError::InvalidFrame` if a frame cannot be decoded. The
    ///   session state is unchanged.
    pub fn handle(&mut self, event: SessionEvent<I>) -> Result<Vec<SessionAction>, SessionError> {
        match event {
            SessionEvent::ConnectionChanged(link) => Ok(self.handle_connection_changed(link)),
            SessionEvent::FrameReceived { frame, now } => self.handle_frame(&frame, now),
            SessionEvent::Tick { now } => Ok(self.handle_tick(now)),
        }
    }

    fn handle_connection_changed(&mut self, link: ConnectionState) -> Vec<SessionAction> {
        let mut actions = Vec::new();

        let next = match (std::mem::replace(&mut self.state, State::Idle), link) {
            (State::Idle, ConnectionState::Connecting) => State::Connecting,
            (State::Idle | State::Connecting, ConnectionState::Connected) => {
                State::Ready { pending: None }
            },
            (State::Connecting, ConnectionState::Disconnected) => State::Idle,
            (State::Ready { pending }, ConnectionState::Disconnected) => {
                if let Some(pending) = pending {
                    actions.push(SessionAction::RequestFailed {
                        request_id: pending.request_id,
                        error: SessionError::NotConnected,
                    });
                }
                State::Idle
            },
            (
                State::InRoom(mut membership) | State::Resuming { mut membership, .. },
                ConnectionState::Disconnected,
            ) => {
                membership.reset_typing();
                self.generation += 1;
                tracing::info!(room_id = %membership.room_id, "link lost, room retained");
                State::DisconnectedInRoom { membership, link: ConnectionState::Disconnected }
            },
            (State::DisconnectedInRoom { membership, .. }, ConnectionState::Connected) => {
                let request_id = self.next_request_id();
                let resume = Payload::ResumeRoom(ResumeRoom {
                    room_id: membership.room_id.clone(),
                    nickname: membership.identity.nickname.clone(),
                    icon: membership.identity.icon.clone(),
                    since: membership.log.resume_cursor().map(str::to_string),
                })
                .into_request(request_id);

                match resume {
                    Ok(frame) => {
                        tracing::debug!(request_id, room_id = %membership.room_id, "resuming room");
                        actions.push(SessionAction::Send(frame));
                        State::Resuming { membership, request_id }
                    },
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to encode resume request");
                        self.generation += 1;
                        actions.push(SessionAction::ClearResume);
                        actions.push(SessionAction::RoomLost {
                            room_id: membership.room_id,
                            reason: e.to_string(),
                        });
                        State::Ready { pending: None }
                    },
                }
            },
            (State::DisconnectedInRoom { membership, .. }, link) => {
                State::DisconnectedInRoom { membership, link }
            },
            (unchanged, link) => {
                tracing::trace!(?link, "connection change ignored");
                self.state = unchanged;
                return actions;
            },
        };

        self.state = next;
        self.revision += 1;
        actions
    }

    fn handle_frame(&mut self, frame: &Frame, now: I) -> Result<Vec<SessionAction>, SessionError> {
        let Some(opcode) = frame.opcode() else {
            return Err(SessionError::InvalidFrame {
                reason: format!("unknown opcode {:#06x}", frame.header.opcode()),
            });
        };

        if opcode.is_link() {
            tracing::trace!(?opcode, "link frame ignored by session");
            return Ok(vec![]);
        }

        let request_id = frame.request_id();
        let actions = match Payload::from_frame(frame)? {
            Payload::RoomCreated(created) => self.on_room_created(request_id, created),
            Payload::RoomJoined(joined) => self.on_room_joined(request_id, joined),
            Payload::Error(error) => self.on_error(request_id, error),
            Payload::Resync(resync) => self.on_resync(request_id, resync),
            Payload::RoomGone(gone) => self.on_room_gone(gone),
            Payload::Presence(presence) => self.on_presence(presence),
            Payload::Message(message) => self.on_message(message),
            Payload::TypingUpdate(update) => self.on_typing(update, now),
            other => {
                tracing::debug!(opcode = ?other.opcode(), "unexpected payload from backend");
                vec![]
            },
        };

        Ok(actions)
    }

    fn take_pending(&mut self, request_id: u32) -> Option<PendingRequest> {
        match &mut self.state {
            State::Ready { pending } if pending.as_ref().is_some_and(|p| p.request_id == request_id) => {
                pending.take()
            },
            _ => None,
        }
    }

    fn on_room_created(&mut self, request_id: u32, created: RoomCreated) -> Vec<SessionAction> {
        let Some(pending) = self.take_pending(request_id) else {
            tracing::debug!(request_id, "stale RoomCreated ignored");
            return vec![];
        };

        self.enter_room(
            pending,
            created.room_id,
            created.participant_id,
            created.timestamp,
            Vec::new(),
            "Room created".to_string(),
        )
    }

    fn on_room_joined(&mut self, request_id: u32, joined: RoomJoined) -> Vec<SessionAction> {
        let Some(pending) = self.take_pending(request_id) else {
            tracing::debug!(request_id, "stale RoomJoined ignored");
            return vec![];
        };

        let body = format!("{} joined the room", pending.identity.nickname);
        self.enter_room(
            pending,
            joined.room_id,
            joined.participant_id,
            joined.timestamp,
            joined.participants,
            body,
        )
    }

    fn enter_room(
        &mut self,
        pending: PendingRequest,
        room_id: String,
        participant_id: u64,
        timestamp: u64,
        participants: Vec<Participant>,
        notice: String,
    ) -> Vec<SessionAction> {
        let identity = pending.identity;
        let mut membership = Membership::new(room_id.clone(), identity.clone(), Some(participant_id));

        membership.roster = participants.into_iter().map(|p| (p.id, p)).collect();
        membership.roster.entry(participant_id).or_insert_with(|| Participant {
            id: participant_id,
            nickname: identity.nickname.clone(),
            icon: identity.icon.clone(),
        });

        let notice = self.system_message(timestamp, notice);
        membership.log.append(notice);

        let record = membership.resume_record();

        tracing::info!(%room_id, participant_id, request_id = pending.request_id, "entered room");

        self.state = State::InRoom(membership);
        self.membership_changed();

        vec![
            SessionAction::PersistResume(record),
            SessionAction::RememberIdentity(identity),
            SessionAction::RequestCompleted { request_id: pending.request_id, room_id },
        ]
    }

    fn on_error(&mut self, request_id: u32, error: ErrorPayload) -> Vec<SessionAction> {
        if request_id != 0 {
            if let Some(pending) = self.take_pending(request_id) {
                self.revision += 1;

                let failure = match (error.code, pending.kind) {
                    (ErrorPayload::ROOM_NOT_FOUND, RequestKind::Join { room_id }) => {
                        SessionError::RoomNotFound { room_id }
                    },
                    (code, _) => SessionError::BackendRejected { code, message: error.message },
                };

                tracing::info!(request_id, error = %failure, "request rejected");

                return vec![SessionAction::RequestFailed { request_id, error: failure }];
            }

            if let State::Resuming { request_id: resume_id, .. } = &self.state
                && *resume_id == request_id
            {
                return self.lose_room(error.message);
            }
        }

        match &self.state {
            State::InRoom(_) | State::Resuming { .. } => {
                tracing::info!(request_id, code = error.code, message = %error.message, "backend rejected");
                self.revision += 1;
                vec![SessionAction::Rejected(SessionError::BackendRejected {
                    code: error.code,
                    message: error.message,
                })]
            },
            _ => {
                tracing::debug!(request_id, code = error.code, "stale error ignored");
                vec![]
            },
        }
    }

    fn lose_room(&mut self, reason: String) -> Vec<SessionAction> {
        let room_id = match std::mem::replace(&mut self.state, State::Ready { pending: None }) {
            State::InRoom(membership) | State::Resuming { membership, .. } => membership.room_id,
            other => {
                self.state = other;
                return vec![];
            },
        };

        tracing::info!(%room_id, %reason, "room lost");

        self.membership_changed();
        vec![SessionAction::ClearResume, SessionAction::RoomLost { room_id, reason }]
    }

    fn on_resync(&mut self, request_id: u32, resync: Resync) -> Vec<SessionAction> {
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Resuming { mut membership, request_id: expected }
                if expected == request_id && membership.room_id == resync.room_id =>
            {
                membership.participant_id = Some(resync.participant_id);
                membership.roster = resync.participants.into_iter().map(|p| (p.id, p)).collect();
                let added = membership.log.merge(resync.messages.into_iter().map(Message::from));

                tracing::info!(room_id = %membership.room_id, added, "room resynced");

                self.state = State::InRoom(membership);
                self.revision += 1;
            },
            other => {
                tracing::debug!(request_id, room_id = %resync.room_id, "stale resync ignored");
                self.state = other;
            },
        }
        vec![]
    }

    fn on_room_gone(&mut self, gone: RoomGone) -> Vec<SessionAction> {
        if self.live_membership_mut(&gone.room_id).is_none() {
            tracing::debug!(room_id = %gone.room_id, "RoomGone for another room ignored");
            return vec![];
        }
        self.lose_room(gone.reason)
    }

    fn on_presence(&mut self, presence: Presence) -> Vec<SessionAction> {
        let Some(membership) = self.live_membership_mut(&presence.room_id) else {
            return vec![];
        };
        let participant = presence.participant;
        if membership.participant_id == Some(participant.id) {
            return vec![];
        }

        let body = match presence.kind {
            PresenceKind::Joined => format!("{} joined the room", participant.nickname),
            PresenceKind::Left => format!("{} left the room", participant.nickname),
        };
        let entry = Message {
            perm_id: presence.perm_id,
            timestamp: presence.timestamp,
            user_nickname: Some(participant.nickname.clone()),
            user_icon: Some(participant.icon.clone()),
            body,
            is_system: true,
        };

        match presence.kind {
            PresenceKind::Joined => {
                membership.roster.insert(participant.id, participant);
            },
            PresenceKind::Left => {
                membership.roster.remove(&participant.id);
                membership.typing.stop(participant.id);
            },
        }
        membership.log.append(entry);

        self.revision += 1;
        vec![]
    }

    fn on_message(&mut self, message: ChatMessage) -> Vec<SessionAction> {
        let Some(membership) = self.live_membership_mut(&message.room_id) else {
            tracing::trace!(room_id = %message.room_id, "message for another room dropped");
            return vec![];
        };

        if membership.log.append(Message::from(message.record)) {
            self.revision += 1;
        }
        vec![]
    }

    fn on_typing(&mut self, update: TypingUpdate, now: I) -> Vec<SessionAction> {
        let Some(membership) = self.live_membership_mut(&update.room_id) else {
            return vec![];
        };
        if membership.participant_id == Some(update.participant_id) {
            return vec![];
        }

        if update.is_typing {
            membership.typing.start(update.participant_id, now);
        } else {
            membership.typing.stop(update.participant_id);
        }

        self.revision += 1;
        vec![]
    }

    fn handle_tick(&mut self, now: I) -> Vec<SessionAction> {
        let expired = match &mut self.state {
            State::InRoom(m) | State::Resuming { membership: m, .. } => m.typing.expire(now),
            _ => false,
        };
        if expired {
            self.revision += 1;
        }
        vec![]
    }
}
