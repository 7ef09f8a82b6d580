// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # pointlock Protocol, Primitives and External Interfaces
//!
//! pointlock escrows release funds to whoever reveals a secret scalar `k`
//! matching a committed curve point `k * G`. This crate holds everything the
//! escrow engine depends on but does not own:
//!
//! - **crypto**: BN254/G1 curve oracle and SHA-256 hashing.
//! - **identity**: opaque party identities and 32-byte contract IDs.
//! - **clock**: the time source consulted by timelock guards.
//! - **settlement**: the ledger boundary that actually moves value.
//! - **config**: protocol constants.
//!
//! The engine itself lives in `pointlock-contracts`.

pub mod clock;
pub mod config;
pub mod crypto;
pub mod encoding;
pub mod identity;
pub mod settlement;

pub use clock::{ManualClock, SystemClock, TimeSource, Timestamp};
pub use crypto::{Bn254Oracle, CurveError, CurveOracle, CurvePoint, Scalar};
pub use identity::{ContractId, Identity, IdentityError};
pub use settlement::{InMemoryLedger, Payout, SettlementLedger, TransferFailed};
