//! # Escrow Record Model
//!
//! One [`EscrowRecord`] exists per accepted escrow. Everything except
//! `status` is fixed at creation; `status` moves forward exactly once,
//! from `Open` to either `Withdrawn` or `Refunded`.
//!
//! ```text
//!            withdraw (secret, before timelock)
//!   Open ─────────────────────────────────────► Withdrawn
//!     │
//!     └───────────────────────────────────────► Refunded
//!            refund (sender, at/after timelock)
//! ```
//!
//! Records are never deleted. A finalized record is what makes a second
//! withdraw or refund fail with `AlreadyFinalized`.

use pointlock_protocol::{ContractId, CurvePoint, Identity, Timestamp};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle state of an escrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EscrowStatus {
    /// Funded and awaiting either a withdrawal or a refund.
    Open,
    /// Claimed by a party that revealed the committed scalar. Terminal.
    Withdrawn,
    /// Returned to the sender after the timelock. Terminal.
    Refunded,
}

impl EscrowStatus {
    /// `true` for `Withdrawn` and `Refunded`.
    pub fn is_terminal(self) -> bool {
        !matches!(self, EscrowStatus::Open)
    }
}

impl std::fmt::Display for EscrowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EscrowStatus::Open => write!(f, "Open"),
            EscrowStatus::Withdrawn => write!(f, "Withdrawn"),
            EscrowStatus::Refunded => write!(f, "Refunded"),
        }
    }
}

// ---------------------------------------------------------------------------
// Auxiliary points
// ---------------------------------------------------------------------------

/// Two point pairs carried for downstream protocol use (for example the
/// ElGamal ciphertext halves of an encrypted share in a chained exchange).
///
/// The engine never validates or interprets them. They are hashed into the
/// contract ID, stored, and echoed back in views and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuxPoints {
    /// First auxiliary point.
    pub c1: CurvePoint,
    /// Second auxiliary point.
    pub c2: CurvePoint,
}

impl AuxPoints {
    /// Pair two points.
    pub fn new(c1: CurvePoint, c2: CurvePoint) -> Self {
        Self { c1, c2 }
    }
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Every contract-defining parameter, in identifier order.
///
/// Two requests with equal `EscrowParams` derive the same contract ID and
/// the second is rejected as a duplicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowParams {
    /// Funding party; the only one allowed to refund.
    pub sender: Identity,
    /// Counterparty who receives half of any withdrawal.
    pub receiver: Identity,
    /// Locked value.
    pub amount: u64,
    /// Point a revealed scalar must reproduce as `k * G`.
    pub commitment: CurvePoint,
    /// Opaque auxiliary points.
    pub aux: AuxPoints,
    /// Absolute expiry (Unix seconds).
    pub timelock: Timestamp,
}

impl EscrowParams {
    /// The deterministic identifier for these parameters.
    pub fn contract_id(&self) -> ContractId {
        crate::contract_id::derive_contract_id(self)
    }
}

/// What a caller submits to open an escrow. The sender is not part of the
/// request; it is the caller identity passed alongside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenRequest {
    /// Counterparty who receives half of any withdrawal.
    pub receiver: Identity,
    /// Locked value. Must be positive.
    pub amount: u64,
    /// Commitment point `k * G`.
    pub commitment: CurvePoint,
    /// Opaque auxiliary points.
    pub aux: AuxPoints,
    /// Absolute expiry. Must be strictly in the future.
    pub timelock: Timestamp,
}

impl OpenRequest {
    /// Bind the request to its sender.
    pub fn into_params(self, sender: Identity) -> EscrowParams {
        EscrowParams {
            sender,
            receiver: self.receiver,
            amount: self.amount,
            commitment: self.commitment,
            aux: self.aux,
            timelock: self.timelock,
        }
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// The stored state of one escrow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowRecord {
    /// Creation parameters. Immutable.
    pub params: EscrowParams,
    /// Current lifecycle status.
    pub status: EscrowStatus,
}

impl EscrowRecord {
    /// A freshly opened record.
    pub fn open(params: EscrowParams) -> Self {
        Self {
            params,
            status: EscrowStatus::Open,
        }
    }

    /// Read-only projection for queries.
    pub fn view(&self, contract_id: ContractId) -> ContractView {
        ContractView {
            contract_id,
            sender: self.params.sender.clone(),
            receiver: self.params.receiver.clone(),
            amount: self.params.amount,
            commitment: self.params.commitment,
            aux: self.params.aux,
            timelock: self.params.timelock,
            withdrawn: self.status == EscrowStatus::Withdrawn,
            refunded: self.status == EscrowStatus::Refunded,
        }
    }
}

/// Public view of an escrow, as returned by `get_contract`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractView {
    /// Identifier of the escrow.
    pub contract_id: ContractId,
    /// Funding party.
    pub sender: Identity,
    /// Designated counterparty.
    pub receiver: Identity,
    /// Locked value.
    pub amount: u64,
    /// Commitment point.
    pub commitment: CurvePoint,
    /// Auxiliary points, echoed unchanged.
    pub aux: AuxPoints,
    /// Absolute expiry.
    pub timelock: Timestamp,
    /// `true` once withdrawn.
    pub withdrawn: bool,
    /// `true` once refunded.
    pub refunded: bool,
}

// ---------------------------------------------------------------------------
// Persisted layout
// ---------------------------------------------------------------------------

/// Flat on-disk layout: sender, receiver, amount, commitment, c1, c2,
/// timelock, withdrawn, refunded. Shared with external readers, so field
/// order is fixed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedRecord {
    pub sender: Identity,
    pub receiver: Identity,
    pub amount: u64,
    pub commitment: CurvePoint,
    pub c1: CurvePoint,
    pub c2: CurvePoint,
    pub timelock: Timestamp,
    pub withdrawn: bool,
    pub refunded: bool,
}

impl From<&EscrowRecord> for PersistedRecord {
    fn from(record: &EscrowRecord) -> Self {
        let p = &record.params;
        Self {
            sender: p.sender.clone(),
            receiver: p.receiver.clone(),
            amount: p.amount,
            commitment: p.commitment,
            c1: p.aux.c1,
            c2: p.aux.c2,
            timelock: p.timelock,
            withdrawn: record.status == EscrowStatus::Withdrawn,
            refunded: record.status == EscrowStatus::Refunded,
        }
    }
}

impl TryFrom<PersistedRecord> for EscrowRecord {
    type Error = String;

    fn try_from(row: PersistedRecord) -> Result<Self, Self::Error> {
        let status = match (row.withdrawn, row.refunded) {
            (false, false) => EscrowStatus::Open,
            (true, false) => EscrowStatus::Withdrawn,
            (false, true) => EscrowStatus::Refunded,
            (true, true) => return Err("record is both withdrawn and refunded".into()),
        };
        Ok(Self {
            params: EscrowParams {
                sender: row.sender,
                receiver: row.receiver,
                amount: row.amount,
                commitment: row.commitment,
                aux: AuxPoints::new(row.c1, row.c2),
                timelock: row.timelock,
            },
            status,
        })
    }
}
