//! # Precondition Guards
//!
//! Each operation declares its preconditions as an ordered list of
//! [`Guard`]s. [`enforce`] checks them in order and reports the first one
//! that fails, so the error a caller sees is deterministic when several
//! conditions are violated at once.
//!
//! | Operation | Guards, in order                                  |
//! |-----------|---------------------------------------------------|
//! | open      | positive amount, future timelock                  |
//! | withdraw  | secret matches, still open, before timelock       |
//! | refund    | caller is sender, still open, timelock passed     |
//!
//! Existence and duplicate checks need the store and run in the engine
//! around these lists.

use pointlock_protocol::{CurvePoint, Identity, Timestamp};

use crate::error::EscrowError;
use crate::record::{EscrowRecord, EscrowStatus};

/// One precondition.
#[derive(Debug, Clone, Copy)]
pub enum Guard<'a> {
    /// `amount > 0`.
    PositiveAmount { amount: u64 },
    /// `timelock > now`.
    FutureTimelock { timelock: Timestamp, now: Timestamp },
    /// `revealed == committed`.
    SecretMatches {
        revealed: &'a CurvePoint,
        committed: &'a CurvePoint,
    },
    /// `status == Open`.
    IsOpen { status: EscrowStatus },
    /// `now < timelock`.
    BeforeTimelock { timelock: Timestamp, now: Timestamp },
    /// `now >= timelock`.
    TimelockPassed { timelock: Timestamp, now: Timestamp },
    /// `caller == sender`.
    CallerIsSender {
        caller: &'a Identity,
        sender: &'a Identity,
    },
}

impl Guard<'_> {
    /// Evaluate this guard.
    pub fn check(&self) -> Result<(), EscrowError> {
        match *self {
            Guard::PositiveAmount { amount } => {
                if amount == 0 {
                    return Err(EscrowError::InvalidAmount);
                }
            }
            Guard::FutureTimelock { timelock, now } => {
                if timelock <= now {
                    return Err(EscrowError::InvalidTimelock { timelock, now });
                }
            }
            Guard::SecretMatches {
                revealed,
                committed,
            } => {
                if revealed != committed {
                    return Err(EscrowError::SecretMismatch);
                }
            }
            Guard::IsOpen { status } => {
                if status.is_terminal() {
                    return Err(EscrowError::AlreadyFinalized(status));
                }
            }
            Guard::BeforeTimelock { timelock, now } => {
                if now >= timelock {
                    return Err(EscrowError::TimelockExpired { timelock, now });
                }
            }
            Guard::TimelockPassed { timelock, now } => {
                if now < timelock {
                    return Err(EscrowError::TimelockNotYetPassed { timelock, now });
                }
            }
            Guard::CallerIsSender { caller, sender } => {
                if caller != sender {
                    return Err(EscrowError::NotSender {
                        caller: caller.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Check every guard in order; the first failure wins.
pub fn enforce(guards: &[Guard<'_>]) -> Result<(), EscrowError> {
    guards.iter().try_for_each(Guard::check)
}

/// Preconditions of `open`.
pub fn open_guards(amount: u64, timelock: Timestamp, now: Timestamp) -> [Guard<'static>; 2] {
    [
        Guard::PositiveAmount { amount },
        Guard::FutureTimelock { timelock, now },
    ]
}

/// Preconditions of `withdraw`, given the point the revealed scalar maps to.
pub fn withdraw_guards<'a>(
    record: &'a EscrowRecord,
    revealed: &'a CurvePoint,
    now: Timestamp,
) -> [Guard<'a>; 3] {
    [
        Guard::SecretMatches {
            revealed,
            committed: &record.params.commitment,
        },
        Guard::IsOpen {
            status: record.status,
        },
        Guard::BeforeTimelock {
            timelock: record.params.timelock,
            now,
        },
    ]
}

/// Preconditions of `refund`.
pub fn refund_guards<'a>(
    record: &'a EscrowRecord,
    caller: &'a Identity,
    now: Timestamp,
) -> [Guard<'a>; 3] {
    [
        Guard::CallerIsSender {
            caller,
            sender: &record.params.sender,
        },
        Guard::IsOpen {
            status: record.status,
        },
        Guard::TimelockPassed {
            timelock: record.params.timelock,
            now,
        },
    ]
}
