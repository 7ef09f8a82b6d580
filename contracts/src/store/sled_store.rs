//! sled-backed escrow store.
//!
//! One tree, keyed by the raw 32-byte contract ID, valued by
//! `bincode(PersistedRecord)`. Every write is flushed before returning.

use std::path::Path;

use pointlock_protocol::config::ESCROW_TREE_NAME;
use pointlock_protocol::ContractId;
use sled::{Db, Tree};

use super::{EscrowStore, StoreError, StoreResult};
use crate::record::{EscrowRecord, EscrowStatus, PersistedRecord};

/// Durable [`EscrowStore`] on an embedded sled database.
///
/// Cheap to clone; clones share the same database handle.
#[derive(Debug, Clone)]
pub struct SledEscrowStore {
    db: Db,
    escrows: Tree,
}

impl SledEscrowStore {
    /// Open or create a database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// A throwaway database removed on drop.
    pub fn open_temporary() -> StoreResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    /// Wrap an already-open database.
    pub fn from_db(db: Db) -> StoreResult<Self> {
        let escrows = db.open_tree(ESCROW_TREE_NAME)?;
        Ok(Self { db, escrows })
    }

    fn encode(record: &EscrowRecord) -> StoreResult<Vec<u8>> {
        bincode::serialize(&PersistedRecord::from(record))
            .map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn decode(id: &ContractId, bytes: &[u8]) -> StoreResult<EscrowRecord> {
        let row: PersistedRecord =
            bincode::deserialize(bytes).map_err(|e| StoreError::Serialization(e.to_string()))?;
        EscrowRecord::try_from(row).map_err(|e| StoreError::Backend(format!("{id}: {e}")))
    }
}

impl EscrowStore for SledEscrowStore {
    fn exists(&self, id: &ContractId) -> StoreResult<bool> {
        Ok(self.escrows.contains_key(id.as_bytes())?)
    }

    fn insert(&self, id: ContractId, record: EscrowRecord) -> StoreResult<()> {
        let bytes = Self::encode(&record)?;
        // Create-only: succeeds only if the key is currently absent.
        let swapped = self
            .escrows
            .compare_and_swap(id.as_bytes(), None as Option<&[u8]>, Some(bytes))?;
        if swapped.is_err() {
            return Err(StoreError::AlreadyExists(id));
        }
        self.db.flush()?;
        Ok(())
    }

    fn get(&self, id: &ContractId) -> StoreResult<Option<EscrowRecord>> {
        match self.escrows.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(Self::decode(id, &bytes)?)),
            None => Ok(None),
        }
    }

    fn set_status(&self, id: &ContractId, status: EscrowStatus) -> StoreResult<()> {
        let current = self
            .escrows
            .get(id.as_bytes())?
            .ok_or(StoreError::NotFound(*id))?;

        let mut record = Self::decode(id, &current)?;
        record.status = status;
        let next = Self::encode(&record)?;

        let swapped = self
            .escrows
            .compare_and_swap(id.as_bytes(), Some(&current), Some(next))?;
        if swapped.is_err() {
            return Err(StoreError::Backend(format!(
                "{id}: record changed during status update"
            )));
        }
        self.db.flush()?;
        Ok(())
    }

    fn records(&self) -> StoreResult<Vec<(ContractId, EscrowRecord)>> {
        self.escrows
            .iter()
            .map(|entry| -> StoreResult<(ContractId, EscrowRecord)> {
                let (key, value) = entry?;
                let bytes: [u8; 32] = key.as_ref().try_into().map_err(|_| {
                    StoreError::Backend(format!("malformed {}-byte key", key.len()))
                })?;
                let id = ContractId::from_bytes(bytes);
                Ok((id, Self::decode(&id, &value)?))
            })
            .collect()
    }

    fn len(&self) -> StoreResult<usize> {
        Ok(self.escrows.len())
    }
}
