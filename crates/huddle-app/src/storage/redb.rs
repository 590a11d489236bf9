//! Redb-backed durable storage.
//!
//! Each record lives under a fixed key in its own table, CBOR-encoded. Redb's
//! copy-on-write transactions keep a record intact if the process dies
//! mid-write.

use std::{fmt::Display, path::Path, sync::Arc};

use huddle_client::{Identity, ResumeRecord};
use redb::{Database, TableDefinition};
use serde::{Serialize, de::DeserializeOwned};

use super::{Storage, StorageError};

/// Single-row table of CBOR bytes.
type RecordTable = TableDefinition<'static, &'static [u8], &'static [u8]>;

/// Last identity the user joined or created a room with.
const IDENTITY: RecordTable = TableDefinition::new("identity");

/// Room to rejoin after a restart. Absent once the user leaves.
const RESUME: RecordTable = TableDefinition::new("resume");

/// The only key in either table.
const RECORD_KEY: &[u8] = b"current";

fn io(e: impl Display) -> StorageError {
    StorageError::Io(e.to_string())
}

/// Identity and resume record in a single Redb file.
///
/// Clones share the database handle.
#[derive(Clone)]
pub struct RedbStorage {
    db: Arc<Database>,
}

impl RedbStorage {
    /// Open `path`, creating the file and both tables on first use.
    ///
    /// # Errors
    ///
    /// `StorageError::Io` if the file cannot be opened, is locked by another
    /// process, or is not a Redb database.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::create(path.as_ref()).map_err(io)?;

        let setup = db.begin_write().map_err(io)?;
        for table in [IDENTITY, RESUME] {
            setup.open_table(table).map_err(io)?;
        }
        setup.commit().map_err(io)?;

        Ok(Self { db: Arc::new(db) })
    }

    fn put<T: Serialize>(&self, table: RecordTable, value: &T) -> Result<(), StorageError> {
        let mut encoded = Vec::new();
        ciborium::into_writer(value, &mut encoded)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let write = self.db.begin_write().map_err(io)?;
        {
            let mut rows = write.open_table(table).map_err(io)?;
            rows.insert(RECORD_KEY, encoded.as_slice()).map_err(io)?;
        }
        write.commit().map_err(io)
    }

    fn get<T: DeserializeOwned>(&self, table: RecordTable) -> Result<Option<T>, StorageError> {
        let read = self.db.begin_read().map_err(io)?;
        let rows = read.open_table(table).map_err(io)?;
        let Some(stored) = rows.get(RECORD_KEY).map_err(io)? else {
            return Ok(None);
        };

        ciborium::from_reader(stored.value())
            .map(Some)
            .map_err(|e| StorageError::Serialization(e.to_string()))
    }
}

impl Storage for RedbStorage {
    fn load_identity(&self) -> Result<Option<Identity>, StorageError> {
        self.get(IDENTITY)
    }

    fn save_identity(&self, identity: &Identity) -> Result<(), StorageError> {
        self.put(IDENTITY, identity)
    }

    fn load_resume(&self) -> Result<Option<ResumeRecord>, StorageError> {
        self.get(RESUME)
    }

    fn save_resume(&self, record: &ResumeRecord) -> Result<(), StorageError> {
        self.put(RESUME, record)
    }

    fn clear_resume(&self) -> Result<(), StorageError> {
        let write = self.db.begin_write().map_err(io)?;
        {
            let mut rows = write.open_table(RESUME).map_err(io)?;
            rows.remove(RECORD_KEY).map_err(io)?;
        }
        write.commit().map_err(io)
    }
}
