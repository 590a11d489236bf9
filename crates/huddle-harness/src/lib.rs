//! Deterministic simulation harness for the Huddle session runtime.
//!
//! The production [`huddle_app::Runtime`] runs unchanged against an in-memory
//! backend on tokio's paused clock with a seeded RNG, so reconnect backoff,
//! heartbeats, idle timeouts and typing timers all replay exactly.
//!
//! # Invariant Testing
//!
//! The `invariants` module checks what must hold in every published snapshot
//! regardless of the path taken to get there. Use
//! [`InvariantRegistry::standard()`] after any step and
//! [`InvariantRegistry::settled()`] once traffic has drained.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod cluster;
pub mod invariants;
pub mod sim_driver;
pub mod sim_env;

pub use backend::{EPOCH_MS, SimBackend};
pub use cluster::{SETTLE, SimClient, SimCluster, sim_config};
pub use invariants::{
    ClientSnapshot, Invariant, InvariantRegistry, InvariantResult, MembershipAtomic,
    PhaseMatchesConnection, RosterAgreement, SystemSnapshot, TimestampsMonotonic,
    TypingRequiresRoom, UniquePermIds, Violation,
};
pub use sim_driver::{SimDriver, SimDriverError};
pub use sim_env::SimEnv;
