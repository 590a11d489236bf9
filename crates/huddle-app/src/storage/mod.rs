//! Persistence collaborators.
//!
//! Two small records survive restarts: the last-used identity (to prefill
//! the next create/join) and the resume record (to rejoin the room after a
//! relaunch). The trait is synchronous; both records are tiny.

mod memory;
mod redb;

use huddle_client::{Identity, ResumeRecord};
pub use memory::MemoryStorage;
use thiserror::Error;

pub use self::redb::RedbStorage;

/// Storage failures.
///
/// The runtime logs these and carries on; losing a record degrades the next
/// launch, not the current session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Backend I/O or transaction failure.
    #[error("storage i/o error: {0}")]
    Io(String),

    /// Stored bytes could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Key-value persistence for identity and resume records.
///
/// Must be Send + Sync; implementations share internal state, so clones
/// access the same underlying storage.
pub trait Storage: Send + Sync + 'static {
    /// Last-used identity. `None` on first launch.
    fn load_identity(&self) -> Result<Option<Identity>, StorageError>;

    /// Overwrite the last-used identity.
    fn save_identity(&self, identity: &Identity) -> Result<(), StorageError>;

    /// Room to resume. `None` if the last run left its room.
    fn load_resume(&self) -> Result<Option<ResumeRecord>, StorageError>;

    /// Overwrite the resume record.
    fn save_resume(&self, record: &ResumeRecord) -> Result<(), StorageError>;

    /// Delete the resume record. Succeeds if there was none.
    fn clear_resume(&self) -> Result<(), StorageError>;
}
