//! # Escrow Engine
//!
//! Owns the escrow lifecycle. Every operation takes the caller identity
//! explicitly; the engine has no ambient notion of "who is calling".
//!
//! ## Per-contract serialization
//!
//! Each contract ID maps to its own `RwLock`. `open`, `withdraw` and
//! `refund` hold the write side for their whole check-then-act sequence,
//! so two racing finalizations on one escrow cannot both pass the
//! `IsOpen` guard. `get_contract` holds the read side and therefore never
//! sees a staged status that might still be rolled back. Operations on
//! different contracts never contend.
//!
//! ## Commit order for withdraw and refund
//!
//! ```text
//!   guards ──► stage status ──► ledger.transfer ──► emit event
//!                                   │
//!                                   └─ Err ─► restore Open, return TransferFailed
//! ```
//!
//! If the store also fails to restore `Open`, the record is left in the
//! staged terminal status although no value moved. The call then returns
//! `RollbackFailed` carrying both errors, and the escrow can be neither
//! withdrawn nor refunded until the record is repaired by hand.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use pointlock_protocol::config::WITHDRAW_SPLIT_DIVISOR;
use pointlock_protocol::{
    Bn254Oracle, ContractId, CurveOracle, Identity, InMemoryLedger, Payout, Scalar,
    SettlementLedger, SystemClock, TimeSource,
};
use serde::{Deserialize, Serialize};

use crate::error::EscrowError;
use crate::events::{EscrowEvent, EventSink, TracingEventSink};
use crate::guards::{self, enforce};
use crate::record::{ContractView, EscrowRecord, EscrowStatus, OpenRequest};
use crate::store::{EscrowStore, MemoryEscrowStore, StoreError};

pub type EscrowResult<T> = Result<T, EscrowError>;

// ---------------------------------------------------------------------------
// Disbursement
// ---------------------------------------------------------------------------

/// The payouts one finalization sends to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disbursement {
    /// Legs handed to the ledger in a single transfer.
    pub payouts: Vec<Payout>,
    /// Value deliberately left in the escrow account.
    pub remainder: u64,
}

impl Disbursement {
    /// Floor-split `amount` between receiver and claimant. An odd unit
    /// stays in escrow.
    pub fn withdrawal(amount: u64, receiver: &Identity, claimant: &Identity) -> Self {
        let share = amount / WITHDRAW_SPLIT_DIVISOR;
        Self {
            payouts: vec![
                Payout::new(receiver.clone(), share),
                Payout::new(claimant.clone(), share),
            ],
            remainder: amount - share * WITHDRAW_SPLIT_DIVISOR,
        }
    }

    /// Return the full amount to the sender.
    pub fn refund(amount: u64, sender: &Identity) -> Self {
        Self {
            payouts: vec![Payout::new(sender.clone(), amount)],
            remainder: 0,
        }
    }

    /// Sum of all legs.
    pub fn total(&self) -> u64 {
        self.payouts.iter().map(|p| p.amount).sum()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Assembles an [`EscrowEngine`]. Anything not supplied falls back to an
/// in-process default.
///
/// | Slot   | Default              |
/// |--------|----------------------|
/// | store  | `MemoryEscrowStore`  |
/// | curve  | `Bn254Oracle`        |
/// | ledger | `InMemoryLedger`     |
/// | clock  | `SystemClock`        |
/// | events | `TracingEventSink`   |
#[derive(Default)]
pub struct EscrowEngineBuilder {
    store: Option<Arc<dyn EscrowStore>>,
    curve: Option<Arc<dyn CurveOracle>>,
    ledger: Option<Arc<dyn SettlementLedger>>,
    clock: Option<Arc<dyn TimeSource>>,
    events: Option<Arc<dyn EventSink>>,
}

impl EscrowEngineBuilder {
    pub fn store(mut self, store: Arc<dyn EscrowStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn curve(mut self, curve: Arc<dyn CurveOracle>) -> Self {
        self.curve = Some(curve);
        self
    }

    pub fn ledger(mut self, ledger: Arc<dyn SettlementLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn TimeSource>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn build(self) -> EscrowEngine {
        EscrowEngine {
            store: self
                .store
                .unwrap_or_else(|| Arc::new(MemoryEscrowStore::new())),
            curve: self.curve.unwrap_or_else(|| Arc::new(Bn254Oracle::new())),
            ledger: self
                .ledger
                .unwrap_or_else(|| Arc::new(InMemoryLedger::new())),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            events: self.events.unwrap_or_else(|| Arc::new(TracingEventSink)),
            locks: DashMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The escrow state machine.
pub struct EscrowEngine {
    store: Arc<dyn EscrowStore>,
    curve: Arc<dyn CurveOracle>,
    ledger: Arc<dyn SettlementLedger>,
    clock: Arc<dyn TimeSource>,
    events: Arc<dyn EventSink>,
    locks: DashMap<ContractId, Arc<RwLock<()>>>,
}

impl EscrowEngine {
    pub fn builder() -> EscrowEngineBuilder {
        EscrowEngineBuilder::default()
    }

    /// Name of the curve commitments are checked against.
    pub fn curve_name(&self) -> &'static str {
        self.curve.name()
    }

    /// Number of escrows ever opened.
    pub fn contract_count(&self) -> EscrowResult<usize> {
        Ok(self.store.len()?)
    }

    // -- open ---------------------------------------------------------------

    /// Create an escrow funded by `caller`.
    ///
    /// Returns the derived contract ID. The commitment is stored as given;
    /// a commitment no scalar can reach simply makes the escrow
    /// refund-only.
    pub fn open(&self, caller: &Identity, request: OpenRequest) -> EscrowResult<ContractId> {
        let now = self.clock.now();
        if let Err(e) = enforce(&guards::open_guards(request.amount, request.timelock, now)) {
            tracing::warn!(sender = %caller, error = %e, "open rejected");
            return Err(e);
        }

        let params = request.into_params(caller.clone());
        let id = params.contract_id();

        let lock = self.contract_lock(&id);
        let _guard = lock.write();

        let result = self.insert_new(id, EscrowRecord::open(params));
        match &result {
            Ok(record) => self.publish(EscrowEvent::opened(id, record)),
            Err(e) => tracing::warn!(contract = %id, error = %e, "open rejected"),
        }
        result.map(|_| id)
    }

    fn insert_new(&self, id: ContractId, record: EscrowRecord) -> EscrowResult<EscrowRecord> {
        if self.store.exists(&id)? {
            return Err(EscrowError::DuplicateContract(id));
        }
        match self.store.insert(id, record.clone()) {
            Ok(()) => Ok(record),
            Err(StoreError::AlreadyExists(id)) => Err(EscrowError::DuplicateContract(id)),
            Err(e) => Err(e.into()),
        }
    }

    // -- withdraw -----------------------------------------------------------

    /// Claim an open escrow by revealing the committed scalar.
    ///
    /// Anyone holding the scalar may call this before the timelock. Half
    /// goes to the receiver, half to `caller`.
    pub fn withdraw(
        &self,
        caller: &Identity,
        id: &ContractId,
        secret: &Scalar,
    ) -> EscrowResult<Disbursement> {
        let lock = self.contract_lock(id);
        let _guard = lock.write();

        let result = self.withdraw_locked(caller, id, secret);
        if let Err(e) = &result {
            tracing::warn!(contract = %id, claimant = %caller, error = %e, "withdraw rejected");
        }
        result
    }

    fn withdraw_locked(
        &self,
        caller: &Identity,
        id: &ContractId,
        secret: &Scalar,
    ) -> EscrowResult<Disbursement> {
        let record = self.load(id)?;
        let revealed = self.curve.commitment(secret)?;
        let now = self.clock.now();
        enforce(&guards::withdraw_guards(&record, &revealed, now))?;

        let plan = Disbursement::withdrawal(record.params.amount, &record.params.receiver, caller);
        self.settle(id, EscrowStatus::Withdrawn, &plan)?;

        self.publish(EscrowEvent::Withdrawn {
            contract_id: *id,
            claimant: caller.clone(),
            receiver: record.params.receiver.clone(),
            secret: secret.clone(),
            receiver_share: plan.payouts[0].amount,
            claimant_share: plan.payouts[1].amount,
            remainder: plan.remainder,
        });
        Ok(plan)
    }

    // -- refund -------------------------------------------------------------

    /// Return an open escrow to its sender once the timelock has passed.
    pub fn refund(&self, caller: &Identity, id: &ContractId) -> EscrowResult<Disbursement> {
        let lock = self.contract_lock(id);
        let _guard = lock.write();

        let result = self.refund_locked(caller, id);
        if let Err(e) = &result {
            tracing::warn!(contract = %id, caller = %caller, error = %e, "refund rejected");
        }
        result
    }

    fn refund_locked(&self, caller: &Identity, id: &ContractId) -> EscrowResult<Disbursement> {
        let record = self.load(id)?;
        let now = self.clock.now();
        enforce(&guards::refund_guards(&record, caller, now))?;

        let plan = Disbursement::refund(record.params.amount, &record.params.sender);
        self.settle(id, EscrowStatus::Refunded, &plan)?;

        self.publish(EscrowEvent::Refunded {
            contract_id: *id,
            sender: record.params.sender.clone(),
            amount: record.params.amount,
        });
        Ok(plan)
    }

    // -- queries ------------------------------------------------------------

    /// Snapshot of an escrow, or `None` if the ID is unknown.
    pub fn get_contract(&self, id: &ContractId) -> EscrowResult<Option<ContractView>> {
        // Unknown IDs do not allocate a lock. Records opened by an earlier
        // engine over the same store have no entry yet, so one is created.
        let existing = self.locks.get(id).map(|l| Arc::clone(l.value()));
        let lock = match existing {
            Some(lock) => lock,
            None if self.store.exists(id)? => self.contract_lock(id),
            None => return Ok(None),
        };
        let _guard = lock.read();
        Ok(self.store.get(id)?.map(|record| record.view(*id)))
    }

    /// Whether an escrow exists under `id`.
    pub fn exists(&self, id: &ContractId) -> EscrowResult<bool> {
        Ok(self.store.exists(id)?)
    }

    /// Every escrow still awaiting withdrawal or refund.
    ///
    /// Used at startup to reconcile a persistent store with a ledger that
    /// does not survive restarts.
    pub fn open_contracts(&self) -> EscrowResult<Vec<ContractView>> {
        Ok(self
            .store
            .records()?
            .into_iter()
            .filter(|(_, record)| record.status == EscrowStatus::Open)
            .map(|(id, record)| record.view(id))
            .collect())
    }

    // -- internals ----------------------------------------------------------

    fn contract_lock(&self, id: &ContractId) -> Arc<RwLock<()>> {
        // Clone out of the map so the shard guard is released before we
        // block on the per-contract lock.
        Arc::clone(
            self.locks
                .entry(*id)
                .or_insert_with(|| Arc::new(RwLock::new(())))
                .value(),
        )
    }

    fn load(&self, id: &ContractId) -> EscrowResult<EscrowRecord> {
        self.store
            .get(id)?
            .ok_or(EscrowError::ContractNotFound(*id))
    }

    fn settle(&self, id: &ContractId, status: EscrowStatus, plan: &Disbursement) -> EscrowResult<()> {
        self.store.set_status(id, status)?;

        if let Err(failure) = self.ledger.transfer(id, &plan.payouts) {
            tracing::error!(
                contract = %id,
                staged = %status,
                error = %failure,
                "settlement failed, restoring Open"
            );
            if let Err(restore) = self.store.set_status(id, EscrowStatus::Open) {
                tracing::error!(
                    contract = %id,
                    staged = %status,
                    error = %restore,
                    "failed to restore Open status, record needs repair"
                );
                return Err(EscrowError::RollbackFailed {
                    transfer: failure,
                    restore,
                });
            }
            return Err(EscrowError::TransferFailed(failure));
        }

        tracing::info!(
            contract = %id,
            status = %status,
            paid = plan.total(),
            remainder = plan.remainder,
            "escrow finalized"
        );
        Ok(())
    }

    fn publish(&self, event: EscrowEvent) {
        if let Err(e) = self.events.emit(&event) {
            tracing::warn!(
                contract = %event.contract_id(),
                event = event.kind(),
                error = %e,
                "event delivery failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingEventSink;
    use crate::record::AuxPoints;
    use pointlock_protocol::{CurvePoint, ManualClock, TransferFailed};

    const T0: u64 = 1_000;
    const LOCK: u64 = 2_000;

    struct Harness {
        engine: EscrowEngine,
        clock: Arc<ManualClock>,
        ledger: Arc<InMemoryLedger>,
        events: Arc<RecordingEventSink>,
    }

    fn harness() -> Harness {
        let clock = Arc::new(ManualClock::new(T0));
        let ledger = Arc::new(InMemoryLedger::new());
        let events = Arc::new(RecordingEventSink::new());
        let engine = EscrowEngine::builder()
            .clock(clock.clone())
            .ledger(ledger.clone())
            .events(events.clone())
            .build();
        Harness {
            engine,
            clock,
            ledger,
            events,
        }
    }

    fn who(s: &str) -> Identity {
        Identity::new(s).unwrap()
    }

    fn request(amount: u64, secret: &Scalar) -> OpenRequest {
        OpenRequest {
            receiver: who("bob"),
            amount,
            commitment: Bn254Oracle::new().commitment(secret).unwrap(),
            aux: AuxPoints::new(CurvePoint::infinity(), CurvePoint::infinity()),
            timelock: LOCK,
        }
    }

    fn open_funded(h: &Harness, amount: u64, secret: &Scalar) -> ContractId {
        let id = h.engine.open(&who("alice"), request(amount, secret)).unwrap();
        h.ledger.fund_escrow(&id, amount).unwrap();
        id
    }

    #[test]
    fn withdrawal_split_is_floor_with_remainder() {
        let plan = Disbursement::withdrawal(101, &who("r"), &who("c"));
        assert_eq!(plan.payouts[0].amount, 50);
        assert_eq!(plan.payouts[1].amount, 50);
        assert_eq!(plan.remainder, 1);
        assert_eq!(plan.total() + plan.remainder, 101);
    }

    #[test]
    fn open_returns_derived_id() {
        let h = harness();
        let k = Scalar::from_u64(5);
        let req = request(10, &k);
        let expected = req.clone().into_params(who("alice")).contract_id();
        assert_eq!(h.engine.open(&who("alice"), req).unwrap(), expected);
        assert_eq!(h.events.len(), 1);
    }

    #[test]
    fn withdraw_then_view() {
        let h = harness();
        let k = Scalar::from_u64(5);
        let id = open_funded(&h, 100, &k);

        let plan = h.engine.withdraw(&who("carol"), &id, &k).unwrap();
        assert_eq!(plan.total(), 100);
        assert_eq!(h.ledger.balance(&who("bob")), 50);
        assert_eq!(h.ledger.balance(&who("carol")), 50);

        let view = h.engine.get_contract(&id).unwrap().unwrap();
        assert!(view.withdrawn);
        assert!(!view.refunded);
    }

    #[test]
    fn refund_after_timelock() {
        let h = harness();
        let k = Scalar::from_u64(5);
        let id = open_funded(&h, 100, &k);

        h.clock.set(LOCK);
        h.engine.refund(&who("alice"), &id).unwrap();
        assert_eq!(h.ledger.balance(&who("alice")), 100);
        assert!(h.engine.get_contract(&id).unwrap().unwrap().refunded);
    }

    #[test]
    fn failed_transfer_restores_open() {
        let h = harness();
        let k = Scalar::from_u64(5);
        // Never funded, so the ledger refuses the payout.
        let id = h.engine.open(&who("alice"), request(100, &k)).unwrap();

        let err = h.engine.withdraw(&who("carol"), &id, &k).unwrap_err();
        assert!(matches!(err, EscrowError::TransferFailed(_)));

        let view = h.engine.get_contract(&id).unwrap().unwrap();
        assert!(!view.withdrawn && !view.refunded);
        // Only the open event.
        assert_eq!(h.events.len(), 1);
    }

    /// Delegates to memory but cannot put a record back to `Open`.
    struct NoRestoreStore(MemoryEscrowStore);

    impl EscrowStore for NoRestoreStore {
        fn exists(&self, id: &ContractId) -> Result<bool, StoreError> {
            self.0.exists(id)
        }

        fn insert(&self, id: ContractId, record: EscrowRecord) -> Result<(), StoreError> {
            self.0.insert(id, record)
        }

        fn get(&self, id: &ContractId) -> Result<Option<EscrowRecord>, StoreError> {
            self.0.get(id)
        }

        fn set_status(&self, id: &ContractId, status: EscrowStatus) -> Result<(), StoreError> {
            if status == EscrowStatus::Open {
                return Err(StoreError::Backend("disk full".into()));
            }
            self.0.set_status(id, status)
        }

        fn records(&self) -> Result<Vec<(ContractId, EscrowRecord)>, StoreError> {
            self.0.records()
        }

        fn len(&self) -> Result<usize, StoreError> {
            self.0.len()
        }
    }

    #[test]
    fn failed_restore_reports_both_errors() {
        let events = Arc::new(RecordingEventSink::new());
        let engine = EscrowEngine::builder()
            .store(Arc::new(NoRestoreStore(MemoryEscrowStore::new())))
            .clock(Arc::new(ManualClock::new(T0)))
            .events(events.clone())
            .build();
        let k = Scalar::from_u64(5);
        // Never funded, so the ledger refuses the payout.
        let id = engine.open(&who("alice"), request(100, &k)).unwrap();

        let err = engine.withdraw(&who("carol"), &id, &k).unwrap_err();
        assert!(matches!(
            err,
            EscrowError::RollbackFailed {
                transfer: TransferFailed::UnknownEscrow(_),
                restore: StoreError::Backend(_),
            }
        ));
        assert_eq!(err.code(), "rollback_failed");

        // The staged status is stuck and no withdrawal event went out.
        assert!(engine.get_contract(&id).unwrap().unwrap().withdrawn);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn open_contracts_excludes_finalized() {
        let h = harness();
        let k = Scalar::from_u64(5);
        let withdrawn = open_funded(&h, 100, &k);
        let still_open = open_funded(&h, 200, &k);
        h.engine.withdraw(&who("carol"), &withdrawn, &k).unwrap();

        let open = h.engine.open_contracts().unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].contract_id, still_open);
    }

    #[test]
    fn unknown_contract_view_is_none() {
        let h = harness();
        let id = ContractId::from_bytes([9; 32]);
        assert!(h.engine.get_contract(&id).unwrap().is_none());
        assert!(!h.engine.exists(&id).unwrap());
    }
}
