//! Presentation-side handle to a running [`Runtime`](crate::Runtime).
//!
//! The handle never touches session state. Every intent is a message to the
//! runtime task, which applies it in order with everything else and answers
//! over a oneshot channel.

use huddle_client::SessionError;
use tokio::sync::{mpsc, oneshot, watch};

use crate::snapshot::RoomSnapshot;

/// Reply channel for intents that resolve to a room id.
pub(crate) type RoomReply = oneshot::Sender<Result<String, SessionError>>;

/// Reply channel for intents that resolve to nothing.
pub(crate) type UnitReply = oneshot::Sender<Result<(), SessionError>>;

/// Messages from a [`SessionHandle`] to the runtime.
#[derive(Debug)]
pub(crate) enum Command {
    CreateRoom { nickname: String, icon: String, reply: RoomReply },
    JoinRoom { nickname: String, room_id: String, icon: String, reply: RoomReply },
    LeaveRoom { reply: UnitReply },
    SendMessage { body: String, reply: UnitReply },
    SetTyping { is_typing: bool },
    Reconnect,
    InputChanged { content: String },
    InputSubmitted,
    InputBlurred,
    Submit { body: String, reply: UnitReply },
    Shutdown { reply: oneshot::Sender<()> },
}

/// Cloneable handle for the presentation layer.
///
/// Once the runtime has stopped, every intent fails with
/// [`SessionError::NotConnected`].
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<RoomSnapshot>,
}

impl SessionHandle {
    pub(crate) fn new(
        commands: mpsc::Sender<Command>,
        snapshots: watch::Receiver<RoomSnapshot>,
    ) -> Self {
        Self { commands, snapshots }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, SessionError>>) -> Command,
    ) -> Result<T, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.commands.send(build(reply)).await.map_err(|_| SessionError::NotConnected)?;
        rx.await.map_err(|_| SessionError::NotConnected)?
    }

    async fn notify(&self, command: Command) -> Result<(), SessionError> {
        self.commands.send(command).await.map_err(|_| SessionError::NotConnected)
    }

    /// Create a room. Resolves with the room id once the backend confirms.
    pub async fn create_room(&self, nickname: &str, icon: &str) -> Result<String, SessionError> {
        self.request(|reply| Command::CreateRoom {
            nickname: nickname.to_string(),
            icon: icon.to_string(),
            reply,
        })
        .await
    }

    /// Join a room. Resolves with the joined room id.
    pub async fn join_room(
        &self,
        nickname: &str,
        room_id: &str,
        icon: &str,
    ) -> Result<String, SessionError> {
        self.request(|reply| Command::JoinRoom {
            nickname: nickname.to_string(),
            room_id: room_id.to_string(),
            icon: icon.to_string(),
            reply,
        })
        .await
    }

    /// Leave the current room.
    pub async fn leave_room(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::LeaveRoom { reply }).await
    }

    /// Send a message. Resolves once it is on the wire, not when echoed.
    pub async fn send_message(&self, body: &str) -> Result<(), SessionError> {
        self.request(|reply| Command::SendMessage { body: body.to_string(), reply }).await
    }

    /// Set the typing flag directly, bypassing the debouncer.
    pub async fn set_typing(&self, is_typing: bool) -> Result<(), SessionError> {
        self.notify(Command::SetTyping { is_typing }).await
    }

    /// Ask the runtime to reconnect now.
    pub async fn reconnect(&self) -> Result<(), SessionError> {
        self.notify(Command::Reconnect).await
    }

    /// The input box content changed.
    pub async fn input_changed(&self, content: &str) -> Result<(), SessionError> {
        self.notify(Command::InputChanged { content: content.to_string() }).await
    }

    /// The input box was submitted without a message (e.g. cleared by Enter).
    pub async fn input_submitted(&self) -> Result<(), SessionError> {
        self.notify(Command::InputSubmitted).await
    }

    /// The input box lost focus.
    pub async fn input_blurred(&self) -> Result<(), SessionError> {
        self.notify(Command::InputBlurred).await
    }

    /// Submit the input box: stop typing, then send `body`.
    pub async fn submit(&self, body: &str) -> Result<(), SessionError> {
        self.request(|reply| Command::Submit { body: body.to_string(), reply }).await
    }

    /// Subscribe to snapshot updates.
    pub fn subscribe(&self) -> watch::Receiver<RoomSnapshot> {
        self.snapshots.clone()
    }

    /// The latest snapshot.
    pub fn snapshot(&self) -> RoomSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Stop the runtime. Returns once it has wound down.
    pub async fn shutdown(&self) {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown { reply }).await.is_ok() {
            let _ = rx.await;
        }
    }
}
