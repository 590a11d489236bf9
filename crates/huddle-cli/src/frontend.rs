//! The stdin/stdout loop.
//!
//! Reads commands line by line and forwards them to the [`SessionHandle`],
//! while printing every snapshot change the runtime publishes. A line from
//! the terminal carries no keystroke history, so no typing signal is sent for
//! it: a message line is submitted through the handle, which clears any
//! typing state and sends.
//!
//! `/create` and `/join` wait on the backend, so they run as background
//! requests. Input and snapshots keep flowing meanwhile, and `/quit` abandons
//! whatever is still outstanding.

use huddle_app::{RoomSnapshot, SessionHandle};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt},
    task::JoinSet,
};

use crate::{
    CliError,
    command::{Command, HELP},
    render::Renderer,
};

/// Icon used when none was given.
pub const DEFAULT_ICON: &str = "🙂";

/// Nickname and icon used for `/create` and `/join`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    /// Nickname, if chosen yet
    pub nickname: Option<String>,
    /// Icon
    pub icon: String,
}

impl Default for Profile {
    fn default() -> Self {
        Self { nickname: None, icon: DEFAULT_ICON.to_string() }
    }
}

enum Flow {
    Continue,
    Quit,
}

/// Line-oriented frontend writing to `W`.
pub struct Frontend<W> {
    handle: SessionHandle,
    out: W,
    renderer: Renderer,
    profile: Profile,
    requests: JoinSet<Option<String>>,
}

impl<W: AsyncWrite + Unpin> Frontend<W> {
    /// Frontend driving `handle`, printing to `out`.
    pub fn new(handle: SessionHandle, out: W, profile: Profile) -> Self {
        Self { handle, out, renderer: Renderer::new(), profile, requests: JoinSet::new() }
    }

    /// Run until `/quit` or end of input, then shut the runtime down.
    pub async fn run<R: AsyncBufRead + Unpin>(mut self, input: R) -> Result<W, CliError> {
        let mut lines = input.lines();
        let mut updates = self.handle.subscribe();
        let first = updates.borrow_and_update().clone();
        self.show(&first).await?;

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else { break };
                    if let Flow::Quit = self.dispatch(&line).await? {
                        break;
                    }
                }
                changed = updates.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = updates.borrow_and_update().clone();
                    self.show(&snapshot).await?;
                }
                Some(done) = self.requests.join_next() => {
                    if let Ok(Some(line)) = done {
                        self.say(&line).await?;
                    }
                }
            }
        }

        self.requests.abort_all();
        self.handle.shutdown().await;
        let last = self.handle.snapshot();
        self.show(&last).await?;
        self.out.flush().await?;
        Ok(self.out)
    }

    async fn dispatch(&mut self, line: &str) -> Result<Flow, CliError> {
        let command = match Command::parse(line) {
            Ok(command) => command,
            Err(e) => {
                self.say(&format!("! {e}")).await?;
                return Ok(Flow::Continue);
            },
        };
        tracing::debug!(?command, "command");

        match command {
            Command::Create => {
                let Some(nickname) = self.nickname().await? else {
                    return Ok(Flow::Continue);
                };
                let (handle, icon) = (self.handle.clone(), self.profile.icon.clone());
                self.requests.spawn(async move {
                    let line = match handle.create_room(&nickname, &icon).await {
                        Ok(room_id) => {
                            format!("* created room {room_id}, share it to invite others")
                        },
                        Err(e) => format!("! {e}"),
                    };
                    Some(line)
                });
            },
            Command::Join(room_id) => {
                let Some(nickname) = self.nickname().await? else {
                    return Ok(Flow::Continue);
                };
                let (handle, icon) = (self.handle.clone(), self.profile.icon.clone());
                self.requests.spawn(async move {
                    let joined = handle.join_room(&nickname, &room_id, &icon).await;
                    joined.err().map(|e| format!("! {e}"))
                });
            },
            Command::Leave => {
                if let Err(e) = self.handle.leave_room().await {
                    self.say(&format!("! {e}")).await?;
                }
            },
            Command::Reconnect => {
                if let Err(e) = self.handle.reconnect().await {
                    self.say(&format!("! {e}")).await?;
                }
            },
            Command::Nick { nickname, icon } => {
                if let Some(icon) = icon {
                    self.profile.icon = icon;
                }
                self.say(&format!("* you are now {} {nickname}", self.profile.icon)).await?;
                self.profile.nickname = Some(nickname);
            },
            Command::Help => self.say(HELP).await?,
            Command::Quit => return Ok(Flow::Quit),
            Command::Say(body) => {
                if let Err(e) = self.handle.submit(&body).await {
                    self.say(&format!("! {e}")).await?;
                }
            },
            Command::Empty => {
                if let Err(e) = self.handle.input_submitted().await {
                    self.say(&format!("! {e}")).await?;
                }
            },
        }

        Ok(Flow::Continue)
    }

    /// The nickname to use, asking for one if none is known.
    async fn nickname(&mut self) -> Result<Option<String>, CliError> {
        if self.profile.nickname.is_none()
            && let Some(remembered) = self.handle.snapshot().remembered
        {
            if self.profile.icon == DEFAULT_ICON {
                self.profile.icon = remembered.icon;
            }
            self.profile.nickname = Some(remembered.nickname);
        }

        if self.profile.nickname.is_none() {
            self.say("! pick a nickname first: /nick <name> [icon]").await?;
        }
        Ok(self.profile.nickname.clone())
    }

    async fn show(&mut self, snapshot: &RoomSnapshot) -> Result<(), CliError> {
        for line in self.renderer.render(snapshot) {
            self.say(&line).await?;
        }
        Ok(())
    }

    async fn say(&mut self, line: &str) -> Result<(), CliError> {
        self.out.write_all(line.as_bytes()).await?;
        self.out.write_all(b"\n").await?;
        self.out.flush().await?;
        Ok(())
    }
}
