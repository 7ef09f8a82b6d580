//! # Cryptographic Primitives
//!
//! Two concerns, both thin wrappers around audited crates:
//!
//! - **curve**: BN254/G1 scalar multiplication via `ark-bn254`, the
//!   commitment check behind every withdrawal.
//! - **hash**: SHA-256 for contract identifiers.
//!
//! Nothing here implements field or group arithmetic by hand.

pub mod curve;
pub mod hash;

pub use curve::{Bn254Oracle, CurveError, CurveOracle, CurvePoint, Scalar};
pub use hash::{sha256, sha256_array, sha256_multi};
