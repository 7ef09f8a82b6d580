//! # pointlock Contracts
//!
//! The scalar-revealing timelock escrow. A sender locks value against a
//! curve point `P`; whoever later reveals `k` with `k * G == P` before the
//! timelock releases it, split evenly between the designated receiver and
//! themselves. After the timelock only the sender can take it back.
//!
//! - **engine**: the state machine and its per-contract locking.
//! - **guards**: ordered preconditions for each operation.
//! - **record**: records, views, and the persisted layout.
//! - **contract_id**: deterministic identifier derivation.
//! - **store**: in-memory and sled record stores.
//! - **events**: notifications emitted on every committed change.
//!
//! ## Design Principles
//!
//! 1. State transitions are explicit: one status enum, never two flags that
//!    could disagree.
//! 2. A failed settlement leaves the escrow exactly as it was.
//! 3. Every external dependency (curve, ledger, clock, store, sink) sits
//!    behind a trait so the engine can be driven deterministically in tests.

pub mod contract_id;
pub mod engine;
pub mod error;
pub mod events;
pub mod guards;
pub mod record;
pub mod store;

pub use contract_id::derive_contract_id;
pub use engine::{Disbursement, EscrowEngine, EscrowEngineBuilder, EscrowResult};
pub use error::EscrowError;
pub use events::{
    BroadcastEventSink, EscrowEvent, EventSink, FanoutEventSink, RecordingEventSink, SinkError,
    TracingEventSink,
};
pub use record::{AuxPoints, ContractView, EscrowParams, EscrowRecord, EscrowStatus, OpenRequest};
pub use store::{EscrowStore, MemoryEscrowStore, SledEscrowStore, StoreError};
