//! Application layer for Huddle
//!
//! Generic runtime that owns the session, runs it against a transport, and
//! exposes it to a frontend through a cloneable handle and a stream of
//! read-only snapshots. The same runtime runs in production and in
//! deterministic simulation.
//!
//! # Components
//!
//! - [`Runtime`]: Single-task orchestration loop
//! - [`SessionHandle`]: Intents in, snapshots out
//! - [`RoomSnapshot`]: What the frontend renders
//! - [`Driver`]: Trait for platform-specific transport I/O
//! - [`storage`]: Identity and resume persistence

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod config;
mod driver;
mod handle;
mod runtime;
mod snapshot;
pub mod storage;

pub use config::{DEFAULT_TICK_INTERVAL, RuntimeConfig};
pub use driver::{Driver, TransportEvent};
pub use handle::SessionHandle;
pub use runtime::{COMMAND_CAPACITY, Runtime};
pub use snapshot::RoomSnapshot;
pub use storage::{MemoryStorage, RedbStorage, Storage, StorageError};
