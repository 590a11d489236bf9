#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]

use std::sync::{Arc, Mutex, MutexGuard};

use huddle_client::{Identity, ResumeRecord};

use super::{Storage, StorageError};

/// In-memory storage for tests and simulation.
///
/// Clones share state, so a test can keep one handle and give another to the
/// runtime.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryStorageInner>>,
}

#[derive(Default)]
struct MemoryStorageInner {
    identity: Option<Identity>,
    resume: Option<ResumeRecord>,
}

impl MemoryStorage {
    /// Empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage pre-seeded as if a previous run had been in `record`'s room.
    pub fn with_resume(record: ResumeRecord) -> Self {
        let storage = Self::new();
        if let Ok(mut inner) = storage.inner.lock() {
            inner.identity = Some(record.identity());
            inner.resume = Some(record);
        }
        storage
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryStorageInner>, StorageError> {
        self.inner.lock().map_err(|e| StorageError::Io(e.to_string()))
    }
}

impl Storage for MemoryStorage {
    fn load_identity(&self) -> Result<Option<Identity>, StorageError> {
        Ok(self.lock()?.identity.clone())
    }

    fn save_identity(&self, identity: &Identity) -> Result<(), StorageError> {
        self.lock()?.identity = Some(identity.clone());
        Ok(())
    }

    fn load_resume(&self) -> Result<Option<ResumeRecord>, StorageError> {
        Ok(self.lock()?.resume.clone())
    }

    fn save_resume(&self, record: &ResumeRecord) -> Result<(), StorageError> {
        self.lock()?.resume = Some(record.clone());
        Ok(())
    }

    fn clear_resume(&self) -> Result<(), StorageError> {
        self.lock()?.resume = None;
        Ok(())
    }
}
