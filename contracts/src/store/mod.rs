//! # Escrow Record Store
//!
//! Keyed storage of [`EscrowRecord`]s. Two properties matter to the engine:
//!
//! 1. `insert` is create-only. A second insert under the same ID fails with
//!    [`StoreError::AlreadyExists`] even if two callers race.
//! 2. `set_status` only touches the status; the creation parameters of a
//!    record never change after insert.
//!
//! | Backend               | Durability       | Use                    |
//! |-----------------------|------------------|------------------------|
//! | [`MemoryEscrowStore`] | process lifetime | tests, ephemeral nodes |
//! | [`SledEscrowStore`]   | on disk (sled)   | `serve --store sled`   |

mod sled_store;

pub use sled_store::SledEscrowStore;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use pointlock_protocol::ContractId;

use crate::record::{EscrowRecord, EscrowStatus};

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists: {0}")]
    AlreadyExists(ContractId),

    #[error("record not found: {0}")]
    NotFound(ContractId),

    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Persistent keyed storage of escrow records.
pub trait EscrowStore: Send + Sync {
    /// Whether a record exists under `id`.
    fn exists(&self, id: &ContractId) -> StoreResult<bool>;

    /// Create a record. Fails with `AlreadyExists` if `id` is taken.
    fn insert(&self, id: ContractId, record: EscrowRecord) -> StoreResult<()>;

    /// Fetch a copy of a record.
    fn get(&self, id: &ContractId) -> StoreResult<Option<EscrowRecord>>;

    /// Overwrite the status of an existing record.
    fn set_status(&self, id: &ContractId, status: EscrowStatus) -> StoreResult<()>;

    /// Every stored record, in no particular order.
    fn records(&self) -> StoreResult<Vec<(ContractId, EscrowRecord)>>;

    /// Number of stored records.
    fn len(&self) -> StoreResult<usize>;

    /// `true` when no records are stored.
    fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }
}

// ---------------------------------------------------------------------------
// MemoryEscrowStore
// ---------------------------------------------------------------------------

/// Sharded in-memory store.
#[derive(Debug, Default)]
pub struct MemoryEscrowStore {
    records: DashMap<ContractId, EscrowRecord>,
}

impl MemoryEscrowStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl EscrowStore for MemoryEscrowStore {
    fn exists(&self, id: &ContractId) -> StoreResult<bool> {
        Ok(self.records.contains_key(id))
    }

    fn insert(&self, id: ContractId, record: EscrowRecord) -> StoreResult<()> {
        match self.records.entry(id) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists(id)),
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(())
            }
        }
    }

    fn get(&self, id: &ContractId) -> StoreResult<Option<EscrowRecord>> {
        Ok(self.records.get(id).map(|r| r.value().clone()))
    }

    fn set_status(&self, id: &ContractId, status: EscrowStatus) -> StoreResult<()> {
        let mut record = self
            .records
            .get_mut(id)
            .ok_or(StoreError::NotFound(*id))?;
        record.status = status;
        Ok(())
    }

    fn records(&self) -> StoreResult<Vec<(ContractId, EscrowRecord)>> {
        Ok(self
            .records
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect())
    }

    fn len(&self) -> StoreResult<usize> {
        Ok(self.records.len())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::record::{AuxPoints, EscrowParams};
    use pointlock_protocol::{CurvePoint, Identity};

    pub(crate) fn sample(tag: u8) -> (ContractId, EscrowRecord) {
        let record = EscrowRecord::open(EscrowParams {
            sender: Identity::new("alice").unwrap(),
            receiver: Identity::new("bob").unwrap(),
            amount: 100 + tag as u64,
            commitment: CurvePoint::from_u64(1, 2),
            aux: AuxPoints::new(CurvePoint::from_u64(3, 4), CurvePoint::from_u64(5, 6)),
            timelock: 1_000,
        });
        (ContractId::from_bytes([tag; 32]), record)
    }

    /// Behaviour every backend must share.
    pub(crate) fn exercise_store(store: &dyn EscrowStore) {
        let (id, record) = sample(1);

        assert!(store.is_empty().unwrap());
        assert!(!store.exists(&id).unwrap());
        assert!(store.get(&id).unwrap().is_none());

        store.insert(id, record.clone()).unwrap();
        assert!(store.exists(&id).unwrap());
        assert_eq!(store.get(&id).unwrap(), Some(record.clone()));
        assert_eq!(store.len().unwrap(), 1);

        let dup = store.insert(id, record.clone());
        assert!(matches!(dup, Err(StoreError::AlreadyExists(d)) if d == id));

        store.set_status(&id, EscrowStatus::Withdrawn).unwrap();
        let stored = store.get(&id).unwrap().unwrap();
        assert_eq!(stored.status, EscrowStatus::Withdrawn);
        assert_eq!(stored.params, record.params);

        let listed = store.records().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].0, id);

        let (missing, _) = sample(2);
        assert!(matches!(
            store.set_status(&missing, EscrowStatus::Refunded),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn memory_store_contract() {
        exercise_store(&MemoryEscrowStore::new());
    }

    #[test]
    fn concurrent_inserts_admit_exactly_one() {
        let store = MemoryEscrowStore::new();
        let (id, record) = sample(9);

        let wins: usize = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| store.insert(id, record.clone()).is_ok()))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap() as usize)
                .sum()
        });
        assert_eq!(wins, 1);
    }
}
