//! Huddle command-line client.
//!
//! A line-oriented frontend over the [`huddle_app`] runtime. Each stdin line
//! is a command or a message; every published snapshot change is printed to
//! stdout.
//!
//! # Components
//!
//! - [`QuicDriver`]: Runtime driver over `huddle_client::transport`
//! - [`SystemEnv`]: System clock and OS randomness
//! - [`Command`]: Parsed stdin line
//! - [`Renderer`]: Snapshot diffs as terminal lines
//! - [`Frontend`]: The stdin/stdout loop

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod command;
mod driver;
mod error;
mod frontend;
mod render;
mod system_env;

pub use command::{Command, HELP, ParseError};
pub use driver::QuicDriver;
pub use error::CliError;
pub use frontend::{DEFAULT_ICON, Frontend, Profile};
pub use render::Renderer;
pub use system_env::SystemEnv;
