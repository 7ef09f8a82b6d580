//! # Settlement Ledger
//!
//! The escrow engine decides *who* gets paid; moving the value is someone
//! else's job. [`SettlementLedger`] is that boundary. A chain runtime, a
//! custodial database or a payment rail implements it; [`InMemoryLedger`]
//! is the reference implementation used by the node and the tests.
//!
//! ## All-or-nothing instructions
//!
//! One escrow transition settles in one call. A withdrawal carries two legs
//! (receiver share and claimant share), a refund carries one. An
//! implementation must apply every leg or none of them, because the engine
//! rolls back its status change when `transfer` fails and assumes nothing
//! moved.
//!
//! ```text
//!   withdraw: escrow ──► receiver  (amount / 2)
//!                    └─► claimant  (amount / 2)
//!   refund:   escrow ──► sender    (amount)
//! ```

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::{ContractId, Identity};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One leg of a settlement instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    /// Who receives the value.
    pub to: Identity,
    /// How much they receive.
    pub amount: u64,
}

impl Payout {
    /// Convenience constructor.
    pub fn new(to: Identity, amount: u64) -> Self {
        Self { to, amount }
    }
}

/// Why a settlement instruction was refused. Nothing moved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferFailed {
    /// The ledger has no funded account for this escrow.
    #[error("escrow {0} has no funded account on the ledger")]
    UnknownEscrow(String),

    /// The legs add up to more than the escrow still holds.
    #[error("insufficient escrowed funds: requested {requested}, available {available}")]
    InsufficientEscrow {
        /// Sum of all legs.
        requested: u64,
        /// Deposited minus already disbursed.
        available: u64,
    },

    /// Crediting a recipient would overflow their balance.
    #[error("balance overflow crediting {0}")]
    BalanceOverflow(String),

    /// The backing system refused the instruction.
    #[error("transfer rejected: {0}")]
    Rejected(String),
}

/// External value-movement primitive.
pub trait SettlementLedger: Send + Sync {
    /// Pay every leg in `payouts` out of the escrow account `from_escrow`,
    /// atomically.
    fn transfer(&self, from_escrow: &ContractId, payouts: &[Payout]) -> Result<(), TransferFailed>;
}

// ---------------------------------------------------------------------------
// InMemoryLedger
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Copy)]
struct EscrowAccount {
    deposited: u64,
    disbursed: u64,
}

impl EscrowAccount {
    fn available(&self) -> u64 {
        self.deposited.saturating_sub(self.disbursed)
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    balances: HashMap<Identity, u64>,
    escrows: HashMap<ContractId, EscrowAccount>,
}

/// A process-local ledger of identity balances and escrow accounts.
///
/// Every escrow account tracks what was deposited and what has been paid
/// out, and refuses to pay out more than it holds. That makes the ledger
/// itself a second line of defence against double disbursement.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
}

impl InMemoryLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `amount` as locked in the escrow account `escrow`.
    pub fn fund_escrow(&self, escrow: &ContractId, amount: u64) -> Result<(), TransferFailed> {
        let mut state = self.state.lock();
        let account = state.escrows.entry(*escrow).or_default();
        account.deposited = account
            .deposited
            .checked_add(amount)
            .ok_or_else(|| TransferFailed::BalanceOverflow(escrow.to_hex()))?;
        Ok(())
    }

    /// Credit an identity directly (seeding, faucets).
    pub fn credit(&self, to: &Identity, amount: u64) -> Result<(), TransferFailed> {
        let mut state = self.state.lock();
        let balance = state.balances.entry(to.clone()).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or_else(|| TransferFailed::BalanceOverflow(to.to_string()))?;
        Ok(())
    }

    /// Current balance of an identity. Unknown identities hold zero.
    pub fn balance(&self, who: &Identity) -> u64 {
        self.state.lock().balances.get(who).copied().unwrap_or(0)
    }

    /// Value still held by an escrow account.
    pub fn escrow_balance(&self, escrow: &ContractId) -> u64 {
        self.state
            .lock()
            .escrows
            .get(escrow)
            .map(EscrowAccount::available)
            .unwrap_or(0)
    }

    /// Total value ever paid out of an escrow account.
    pub fn disbursed(&self, escrow: &ContractId) -> u64 {
        self.state
            .lock()
            .escrows
            .get(escrow)
            .map(|a| a.disbursed)
            .unwrap_or(0)
    }
}

impl SettlementLedger for InMemoryLedger {
    fn transfer(&self, from_escrow: &ContractId, payouts: &[Payout]) -> Result<(), TransferFailed> {
        let mut state = self.state.lock();

        let account = *state
            .escrows
            .get(from_escrow)
            .ok_or_else(|| TransferFailed::UnknownEscrow(from_escrow.to_hex()))?;

        let requested = payouts
            .iter()
            .try_fold(0u64, |acc, p| acc.checked_add(p.amount))
            .ok_or(TransferFailed::InsufficientEscrow {
                requested: u64::MAX,
                available: account.available(),
            })?;

        if requested > account.available() {
            return Err(TransferFailed::InsufficientEscrow {
                requested,
                available: account.available(),
            });
        }

        // Compute every new balance before writing any of them.
        let mut credited: HashMap<Identity, u64> = HashMap::new();
        for payout in payouts {
            let current = match credited.get(&payout.to) {
                Some(v) => *v,
                None => state.balances.get(&payout.to).copied().unwrap_or(0),
            };
            let next = current
                .checked_add(payout.amount)
                .ok_or_else(|| TransferFailed::BalanceOverflow(payout.to.to_string()))?;
            credited.insert(payout.to.clone(), next);
        }

        state.balances.extend(credited);
        if let Some(acct) = state.escrows.get_mut(from_escrow) {
            acct.disbursed += requested;
        }

        tracing::debug!(
            escrow = %from_escrow,
            legs = payouts.len(),
            amount = requested,
            "settlement applied"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn who(s: &str) -> Identity {
        Identity::new(s).unwrap()
    }

    fn escrow(tag: u8) -> ContractId {
        ContractId::from_bytes([tag; 32])
    }

    #[test]
    fn transfer_from_unknown_escrow_fails() {
        let ledger = InMemoryLedger::new();
        let result = ledger.transfer(&escrow(1), &[Payout::new(who("a"), 1)]);
        assert!(matches!(result, Err(TransferFailed::UnknownEscrow(_))));
    }

    #[test]
    fn two_leg_transfer_credits_both() {
        let ledger = InMemoryLedger::new();
        ledger.fund_escrow(&escrow(1), 100).unwrap();
        ledger
            .transfer(
                &escrow(1),
                &[Payout::new(who("r"), 50), Payout::new(who("c"), 50)],
            )
            .unwrap();

        assert_eq!(ledger.balance(&who("r")), 50);
        assert_eq!(ledger.balance(&who("c")), 50);
        assert_eq!(ledger.escrow_balance(&escrow(1)), 0);
        assert_eq!(ledger.disbursed(&escrow(1)), 100);
    }

    #[test]
    fn same_recipient_on_both_legs_accumulates() {
        let ledger = InMemoryLedger::new();
        ledger.fund_escrow(&escrow(1), 10).unwrap();
        ledger
            .transfer(
                &escrow(1),
                &[Payout::new(who("x"), 5), Payout::new(who("x"), 5)],
            )
            .unwrap();
        assert_eq!(ledger.balance(&who("x")), 10);
    }

    #[test]
    fn overdraw_is_refused_and_nothing_moves() {
        let ledger = InMemoryLedger::new();
        ledger.fund_escrow(&escrow(1), 100).unwrap();
        ledger
            .transfer(&escrow(1), &[Payout::new(who("a"), 100)])
            .unwrap();

        let second = ledger.transfer(&escrow(1), &[Payout::new(who("b"), 1)]);
        assert_eq!(
            second,
            Err(TransferFailed::InsufficientEscrow {
                requested: 1,
                available: 0
            })
        );
        assert_eq!(ledger.balance(&who("b")), 0);
        assert_eq!(ledger.disbursed(&escrow(1)), 100);
    }

    #[test]
    fn overflowing_leg_aborts_whole_instruction() {
        let ledger = InMemoryLedger::new();
        ledger.credit(&who("rich"), u64::MAX).unwrap();
        ledger.fund_escrow(&escrow(2), 10).unwrap();

        let result = ledger.transfer(
            &escrow(2),
            &[Payout::new(who("poor"), 5), Payout::new(who("rich"), 5)],
        );
        assert!(matches!(result, Err(TransferFailed::BalanceOverflow(_))));
        // First leg must not have landed.
        assert_eq!(ledger.balance(&who("poor")), 0);
        assert_eq!(ledger.escrow_balance(&escrow(2)), 10);
    }

    #[test]
    fn remainder_stays_in_escrow() {
        let ledger = InMemoryLedger::new();
        ledger.fund_escrow(&escrow(3), 101).unwrap();
        ledger
            .transfer(
                &escrow(3),
                &[Payout::new(who("r"), 50), Payout::new(who("c"), 50)],
            )
            .unwrap();
        assert_eq!(ledger.escrow_balance(&escrow(3)), 1);
    }
}
