//! Escrow error kinds.

use pointlock_protocol::{ContractId, CurveError, Identity, Timestamp, TransferFailed};
use thiserror::Error;

use crate::record::EscrowStatus;
use crate::store::StoreError;

/// Every way an escrow operation can be refused.
///
/// A rejected operation leaves no trace: no record is created or changed,
/// no value moves, and no event is emitted.
#[derive(Debug, Error)]
pub enum EscrowError {
    /// The escrow amount must be positive.
    #[error("invalid amount: escrow amount must be greater than zero")]
    InvalidAmount,

    /// The timelock is not strictly in the future.
    #[error("invalid timelock: {timelock} is not after the current time {now}")]
    InvalidTimelock {
        /// Requested expiry.
        timelock: Timestamp,
        /// Clock reading at evaluation.
        now: Timestamp,
    },

    /// An escrow with identical parameters already exists.
    #[error("duplicate contract: {0} already exists")]
    DuplicateContract(ContractId),

    /// No escrow with this identifier.
    #[error("contract not found: {0}")]
    ContractNotFound(ContractId),

    /// The revealed scalar does not reproduce the commitment point.
    #[error("secret mismatch: revealed scalar does not match the commitment")]
    SecretMismatch,

    /// The escrow was already withdrawn or refunded.
    #[error("contract already finalized: status is {0}")]
    AlreadyFinalized(EscrowStatus),

    /// A withdrawal arrived at or after the timelock.
    #[error("timelock expired: withdrawals closed at {timelock}, now {now}")]
    TimelockExpired {
        /// Expiry of the escrow.
        timelock: Timestamp,
        /// Clock reading at evaluation.
        now: Timestamp,
    },

    /// A refund arrived before the timelock.
    #[error("timelock not yet passed: refundable at {timelock}, now {now}")]
    TimelockNotYetPassed {
        /// Expiry of the escrow.
        timelock: Timestamp,
        /// Clock reading at evaluation.
        now: Timestamp,
    },

    /// Only the sender may refund.
    #[error("caller {caller} is not the sender of this contract")]
    NotSender {
        /// Who tried to refund.
        caller: Identity,
    },

    /// The settlement ledger refused the payout. The status change was
    /// rolled back.
    #[error("transfer failed: {0}")]
    TransferFailed(#[from] TransferFailed),

    /// The ledger refused the payout and the staged status could not be
    /// put back to `Open`. The record needs manual repair.
    #[error("transfer failed ({transfer}) and restoring Open failed: {restore}")]
    RollbackFailed {
        /// Why the ledger refused.
        transfer: TransferFailed,
        /// Why the store could not restore the record.
        restore: StoreError,
    },

    /// The record store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The curve oracle failed.
    #[error("curve error: {0}")]
    Curve(#[from] CurveError),
}

impl EscrowError {
    /// Stable machine-readable code for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            EscrowError::InvalidAmount => "invalid_amount",
            EscrowError::InvalidTimelock { .. } => "invalid_timelock",
            EscrowError::DuplicateContract(_) => "duplicate_contract",
            EscrowError::ContractNotFound(_) => "contract_not_found",
            EscrowError::SecretMismatch => "secret_mismatch",
            EscrowError::AlreadyFinalized(_) => "already_finalized",
            EscrowError::TimelockExpired { .. } => "timelock_expired",
            EscrowError::TimelockNotYetPassed { .. } => "timelock_not_yet_passed",
            EscrowError::NotSender { .. } => "not_sender",
            EscrowError::TransferFailed(_) => "transfer_failed",
            EscrowError::RollbackFailed { .. } => "rollback_failed",
            EscrowError::Store(_) => "store_error",
            EscrowError::Curve(_) => "curve_error",
        }
    }
}
