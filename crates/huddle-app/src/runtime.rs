//! Generic runtime for session orchestration.
//!
//! The Runtime drives the client event loop, coordinating between:
//! - [`Session`]: room state machine
//! - [`Connection`]: link handshake and heartbeat
//! - [`TypingDebouncer`]: input box to typing signal
//! - [`Driver`]: platform-specific transport I/O
//! - [`Storage`]: identity and resume records
//!
//! Everything runs on one task. Commands from the [`SessionHandle`],
//! transport events and timer ticks are applied strictly one at a time, and a
//! fresh [`RoomSnapshot`] is published after each one that changed anything.

use std::{
    collections::{HashMap, VecDeque},
    time::Duration,
};

use huddle_client::{
    ConnectionState, Identity, Session, SessionAction, SessionError, SessionEvent, SessionPhase,
    TypingDebouncer,
};
use huddle_core::{Backoff, Connection, ConnectionAction, Environment, LinkPhase};
use huddle_proto::{Frame, Opcode};
use tokio::sync::{mpsc, watch};

use crate::{
    Driver, RuntimeConfig, SessionHandle, TransportEvent,
    handle::{Command, RoomReply},
    snapshot::RoomSnapshot,
    storage::Storage,
};

/// Capacity of the handle-to-runtime command channel.
pub const COMMAND_CAPACITY: usize = 64;

/// Generic runtime that owns the session and talks to the transport.
///
/// # Type Parameters
///
/// - `D`: Platform-specific transport driver
/// - `E`: Environment for time and randomness
/// - `S`: Persistence for identity and resume records
pub struct Runtime<D, E, S>
where
    D: Driver,
    E: Environment,
    S: Storage,
{
    driver: D,
    env: E,
    storage: S,
    config: RuntimeConfig,
    session: Session<E::Instant>,
    connection: Option<Connection<E::Instant>>,
    debouncer: TypingDebouncer<E::Instant>,
    backoff: Backoff,
    retry_at: Option<E::Instant>,
    next_tick: E::Instant,
    commands: mpsc::Receiver<Command>,
    snapshots: watch::Sender<RoomSnapshot>,
    replies: HashMap<u32, RoomReply>,
    remembered: Option<Identity>,
    status: Option<String>,
    // Bumped whenever something outside the session changes the snapshot.
    notices: u64,
    published: Option<(u64, u64)>,
    stopped: bool,
}

impl<D, E, S> Runtime<D, E, S>
where
    D: Driver,
    E: Environment,
    S: Storage,
{
    /// Create a runtime and the handle the presentation layer talks to.
    ///
    /// Nothing happens until [`Self::run`] is awaited.
    pub fn new(driver: D, env: E, storage: S, config: RuntimeConfig) -> (Self, SessionHandle) {
        let (command_tx, commands) = mpsc::channel(COMMAND_CAPACITY);
        let (snapshots, snapshot_rx) = watch::channel(RoomSnapshot::initial());
        let now = env.now();

        let runtime = Self {
            driver,
            session: Session::new(),
            connection: None,
            debouncer: TypingDebouncer::new(config.typing_idle),
            backoff: Backoff::new(config.reconnect.clone()),
            retry_at: None,
            next_tick: now + config.tick_interval,
            commands,
            snapshots,
            replies: HashMap::new(),
            remembered: None,
            status: None,
            notices: 0,
            published: None,
            stopped: false,
            env,
            storage,
            config,
        };

        (runtime, SessionHandle::new(command_tx, snapshot_rx))
    }

    /// Run the event loop until shutdown.
    ///
    /// Shutdown happens on [`SessionHandle::shutdown`] or once every handle
    /// has been dropped.
    pub async fn run(mut self) {
        self.start().await;
        self.publish();

        while !self.stopped {
            let wait = self.until_next_deadline();

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => self.shutdown().await,
                },
                event = self.driver.next_event() => self.handle_transport(event).await,
                () = self.env.sleep(wait) => self.tick().await,
            }

            self.catch_up_typing().await;
            self.publish();
        }

        tracing::info!("runtime stopped");
    }

    /// Restore persisted records and bring the link up.
    async fn start(&mut self) {
        match self.storage.load_identity() {
            Ok(identity) => {
                self.remembered = identity;
                self.notices += 1;
            },
            Err(error) => tracing::warn!(%error, "failed to load identity"),
        }

        match self.storage.load_resume() {
            Ok(Some(record)) => {
                if self.session.resume_from(&record) {
                    tracing::info!(room_id = %record.room_id, "resuming room from last launch");
                } else {
                    tracing::warn!(room_id = %record.room_id, "discarding unusable resume record");
                    self.clear_resume();
                }
            },
            Ok(None) => {},
            Err(error) => tracing::warn!(%error, "failed to load resume record"),
        }

        let actions = self.session.reconnect();
        self.execute(actions).await;
    }

    /// Time until the earliest of the periodic tick, the typing idle timer and
    /// a scheduled reconnect.
    fn until_next_deadline(&self) -> Duration {
        let deadline = [self.debouncer.next_deadline(), self.retry_at]
            .into_iter()
            .flatten()
            .fold(self.next_tick, std::cmp::min);

        let now = self.env.now();
        if now >= deadline { Duration::ZERO } else { deadline - now }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::CreateRoom { nickname, icon, reply } => {
                match self.session.create_room(&nickname, &icon) {
                    Ok((request_id, actions)) => {
                        self.replies.insert(request_id, reply);
                        self.execute(actions).await;
                    },
                    Err(error) => {
                        let _ = reply.send(Err(error));
                    },
                }
            },
            Command::JoinRoom { nickname, room_id, icon, reply } => {
                match self.session.join_room(&nickname, &room_id, &icon) {
                    Ok((request_id, actions)) => {
                        self.replies.insert(request_id, reply);
                        self.execute(actions).await;
                    },
                    Err(error) => {
                        let _ = reply.send(Err(error));
                    },
                }
            },
            Command::LeaveRoom { reply } => match self.session.leave_room() {
                Ok(actions) => {
                    self.execute(actions).await;
                    let _ = reply.send(Ok(()));
                },
                Err(error) => {
                    let _ = reply.send(Err(error));
                },
            },
            Command::SendMessage { body, reply } => {
                let result = self.send_message(&body).await;
                let _ = reply.send(result);
            },
            Command::SetTyping { is_typing } => self.signal_typing(Some(is_typing)).await,
            Command::Reconnect => {
                self.retry_at = None;
                self.backoff.reset();
                let actions = self.session.reconnect();
                self.execute(actions).await;
            },
            Command::InputChanged { content } => {
                let now = self.env.now();
                let signal = self.debouncer.on_input(&content, now, self.session.generation());
                self.signal_typing(signal).await;
            },
            Command::InputSubmitted => {
                let signal = self.debouncer.on_submit(self.session.generation());
                self.signal_typing(signal).await;
            },
            Command::InputBlurred => {
                let signal = self.debouncer.on_blur(self.session.generation());
                self.signal_typing(signal).await;
            },
            Command::Submit { body, reply } => {
                let signal = self.debouncer.on_submit(self.session.generation());
                self.signal_typing(signal).await;
                let result = self.send_message(&body).await;
                let _ = reply.send(result);
            },
            Command::Shutdown { reply } => {
                self.shutdown().await;
                self.publish();
                let _ = reply.send(());
            },
        }
    }

    async fn send_message(&mut self, body: &str) -> Result<(), SessionError> {
        let actions = self.session.send_message(body)?;
        self.execute(actions).await;
        Ok(())
    }

    /// Deliver a typing start the session could not send while the room was
    /// offline or resuming.
    async fn catch_up_typing(&mut self) {
        let owed = self.debouncer.is_signaling_in(self.session.generation())
            && self.session.phase() == SessionPhase::InRoom
            && !self.session.is_self_typing();
        if owed {
            tracing::debug!("re-sending typing start after resume");
            self.signal_typing(Some(true)).await;
        }
    }

    async fn signal_typing(&mut self, signal: Option<bool>) {
        if let Some(is_typing) = signal {
            let actions = self.session.set_typing(is_typing);
            self.execute(actions).await;
        }
    }

    async fn handle_transport(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => {
                let now = self.env.now();
                let mut connection = Connection::new(now, self.config.connection.clone());
                let link_actions = match connection.send_hello(now) {
                    Ok(actions) => actions,
                    Err(error) => {
                        tracing::warn!(%error, "handshake could not start");
                        Vec::new()
                    },
                };
                self.connection = Some(connection);

                let actions = self.execute_link(link_actions).await;
                self.execute(actions).await;
            },
            TransportEvent::Disconnected { reason } => {
                let actions = self.link_down(&reason);
                self.execute(actions).await;
            },
            TransportEvent::Frame(frame) => self.handle_frame(frame).await,
        }
    }

    async fn handle_frame(&mut self, frame: Frame) {
        let now = self.env.now();
        let Some(connection) = self.connection.as_mut() else {
            tracing::debug!(opcode = frame.header.opcode(), "frame without a link, dropped");
            return;
        };

        if frame.opcode().is_some_and(Opcode::is_link) {
            let link_actions = match connection.handle_frame(&frame, now) {
                Ok(actions) => actions,
                Err(error) if connection.phase() == LinkPhase::Pending => {
                    tracing::warn!(%error, "handshake failed");
                    let actions = self.link_down(&error.to_string());
                    self.execute(actions).await;
                    return;
                },
                Err(error) => {
                    tracing::warn!(%error, "rejected link frame");
                    return;
                },
            };
            let actions = self.execute_link(link_actions).await;
            self.execute(actions).await;
            return;
        }

        connection.update_activity(now);
        if connection.phase() != LinkPhase::Authenticated {
            tracing::warn!(opcode = frame.header.opcode(), "session frame before handshake");
            return;
        }

        let actions = self.session_event(SessionEvent::FrameReceived { frame, now });
        self.execute(actions).await;
    }

    async fn tick(&mut self) {
        let now = self.env.now();
        self.next_tick = now + self.config.tick_interval;

        if self.retry_at.is_some_and(|at| now >= at) {
            self.retry_at = None;
            tracing::debug!(attempt = self.backoff.attempt(), "reconnect backoff elapsed");
            let actions = self.session.reconnect();
            self.execute(actions).await;
        }

        if let Some(connection) = self.connection.as_mut() {
            let link_actions = connection.tick(now);
            let actions = self.execute_link(link_actions).await;
            self.execute(actions).await;
        }

        let actions = self.session_event(SessionEvent::Tick { now });
        self.execute(actions).await;

        let signal = self.debouncer.tick(now, self.session.generation());
        self.signal_typing(signal).await;
    }

    /// Carry out session actions, including any they cause in turn.
    async fn execute(&mut self, actions: Vec<SessionAction>) {
        let mut queue: VecDeque<SessionAction> = actions.into();

        while let Some(action) = queue.pop_front() {
            match action {
                SessionAction::Send(frame) => {
                    if let Err(reason) = self.transmit(frame).await {
                        queue.extend(self.link_down(&reason));
                    }
                },
                SessionAction::Connect => queue.extend(self.connect().await),
                SessionAction::Close => self.close_link("client shutdown").await,
                SessionAction::RequestCompleted { request_id, room_id } => {
                    self.set_status(None);
                    match self.replies.remove(&request_id) {
                        Some(reply) => {
                            let _ = reply.send(Ok(room_id));
                        },
                        None => tracing::debug!(request_id, "completed request had no waiter"),
                    }
                },
                SessionAction::RequestFailed { request_id, error } => {
                    self.set_status(Some(error.to_string()));
                    if let Some(reply) = self.replies.remove(&request_id) {
                        let _ = reply.send(Err(error));
                    }
                },
                SessionAction::Rejected(error) => {
                    tracing::info!(%error, "backend rejected a request");
                    self.set_status(Some(error.to_string()));
                },
                SessionAction::RoomLost { room_id, reason } => {
                    tracing::info!(%room_id, %reason, "room lost");
                    self.set_status(Some(format!("room {room_id} is gone: {reason}")));
                },
                SessionAction::PersistResume(record) => {
                    if let Err(error) = self.storage.save_resume(&record) {
                        tracing::warn!(%error, "failed to persist resume record");
                    }
                },
                SessionAction::ClearResume => self.clear_resume(),
                SessionAction::RememberIdentity(identity) => {
                    if let Err(error) = self.storage.save_identity(&identity) {
                        tracing::warn!(%error, "failed to persist identity");
                    }
                    self.remembered = Some(identity);
                    self.notices += 1;
                },
            }
        }
    }

    /// Carry out link actions, returning whatever the session makes of them.
    async fn execute_link(&mut self, actions: Vec<ConnectionAction>) -> Vec<SessionAction> {
        let mut out = Vec::new();

        for action in actions {
            match action {
                ConnectionAction::SendFrame(frame) => {
                    if let Err(error) = self.driver.send_frame(frame).await {
                        out.extend(self.link_down(&error.to_string()));
                        break;
                    }
                },
                ConnectionAction::Established { session_id } => {
                    tracing::info!(session_id, "link established");
                    self.backoff.reset();
                    self.retry_at = None;
                    self.set_status(None);
                    out.extend(self.session_event(SessionEvent::ConnectionChanged(
                        ConnectionState::Connected,
                    )));
                },
                ConnectionAction::Close { reason } => {
                    out.extend(self.link_down(&reason));
                    break;
                },
            }
        }

        out
    }

    async fn transmit(&mut self, frame: Frame) -> Result<(), String> {
        let ready = self.connection.as_ref().is_some_and(|c| c.phase() == LinkPhase::Authenticated);
        if !ready {
            tracing::debug!(opcode = frame.header.opcode(), "no link, frame dropped");
            return Ok(());
        }

        self.driver.send_frame(frame).await.map_err(|e| e.to_string())
    }

    async fn connect(&mut self) -> Vec<SessionAction> {
        self.retry_at = None;
        let addr = self.config.server_addr.clone();

        match self.driver.connect(&addr).await {
            Ok(()) => {
                tracing::debug!(%addr, "transport connecting");
                Vec::new()
            },
            Err(error) => {
                tracing::warn!(%addr, %error, "connect failed");
                self.link_down(&error.to_string())
            },
        }
    }

    /// Tear down the link after a failure and schedule the next attempt.
    fn link_down(&mut self, reason: &str) -> Vec<SessionAction> {
        let had_link = self.connection.take().is_some();
        if !had_link && self.session.connection_state() == ConnectionState::Disconnected {
            return Vec::new();
        }

        tracing::info!(%reason, "link down");
        self.driver.close(reason);
        let actions =
            self.session_event(SessionEvent::ConnectionChanged(ConnectionState::Disconnected));
        self.schedule_retry();
        actions
    }

    fn schedule_retry(&mut self) {
        if self.stopped
            || !matches!(self.session.phase(), SessionPhase::Idle | SessionPhase::DisconnectedInRoom)
        {
            return;
        }

        match self.backoff.next_delay(self.env.random_u64()) {
            Some(delay) => {
                tracing::debug!(?delay, attempt = self.backoff.attempt(), "reconnect scheduled");
                self.retry_at = Some(self.env.now() + delay);
            },
            None if self.backoff.policy().enabled => {
                let attempts = self.backoff.attempt();
                tracing::warn!(attempts, "giving up on reconnect");
                self.set_status(Some(format!("gave up reconnecting after {attempts} attempts")));
            },
            None => {},
        }
    }

    /// Say goodbye if the link is up, then drop the transport.
    async fn close_link(&mut self, reason: &str) {
        self.retry_at = None;
        if let Some(mut connection) = self.connection.take() {
            for action in connection.goodbye(reason) {
                if let ConnectionAction::SendFrame(frame) = action
                    && let Err(error) = self.driver.send_frame(frame).await
                {
                    tracing::debug!(%error, "goodbye not delivered");
                }
            }
        }
        self.driver.close(reason);
    }

    fn session_event(&mut self, event: SessionEvent<E::Instant>) -> Vec<SessionAction> {
        match self.session.handle(event) {
            Ok(actions) => actions,
            Err(error) => {
                tracing::warn!(%error, "session dropped an event");
                Vec::new()
            },
        }
    }

    fn clear_resume(&mut self) {
        if let Err(error) = self.storage.clear_resume() {
            tracing::warn!(%error, "failed to clear resume record");
        }
    }

    fn set_status(&mut self, status: Option<String>) {
        if self.status != status {
            self.status = status;
            self.notices += 1;
        }
    }

    async fn shutdown(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.retry_at = None;

        let signal = self.debouncer.on_teardown();
        self.signal_typing(signal).await;

        let actions = self.session.shutdown();
        self.execute(actions).await;

        for (_, reply) in self.replies.drain() {
            let _ = reply.send(Err(SessionError::NotConnected));
        }
    }

    fn publish(&mut self) {
        let key = (self.session.revision(), self.notices);
        if self.published == Some(key) {
            return;
        }
        self.published = Some(key);

        let snapshot =
            RoomSnapshot::capture(&self.session, self.remembered.as_ref(), self.status.as_deref());
        self.snapshots.send_replace(snapshot);
    }
}
