//! # Protocol Configuration & Constants
//!
//! Every fixed parameter of pointlock lives here. Changing any value in the
//! "Identifier Derivation" section changes every contract ID ever derived,
//! so treat those as frozen once escrows exist.

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// Crate-independent protocol version, reported by the node.
pub const PROTOCOL_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Cryptographic Parameters
// ---------------------------------------------------------------------------

/// Curve used for commitments. Same group as the EVM `ecMul` precompile.
pub const CURVE_NAME: &str = "BN254";

/// Width of one affine coordinate, one scalar, and one identifier, in bytes.
pub const COORDINATE_LENGTH: usize = 32;

/// Digest used for contract identifiers.
pub const ID_HASH_FUNCTION: &str = "SHA-256";

/// Identifier length in bytes.
pub const CONTRACT_ID_LENGTH: usize = 32;

// ---------------------------------------------------------------------------
// Identifier Derivation
// ---------------------------------------------------------------------------

/// Domain tag prepended to every identifier preimage. Keeps pointlock IDs
/// from colliding with SHA-256 digests computed for any other purpose.
pub const CONTRACT_ID_DOMAIN: &[u8] = b"pointlock/contract-id/v1";

// ---------------------------------------------------------------------------
// Settlement
// ---------------------------------------------------------------------------

/// A withdrawal pays `amount / WITHDRAW_SPLIT_DIVISOR` to the receiver and
/// the same to the claimant. The remainder stays in the escrow account.
pub const WITHDRAW_SPLIT_DIVISOR: u64 = 2;

// ---------------------------------------------------------------------------
// Node Defaults
// ---------------------------------------------------------------------------

/// Default HTTP API port.
pub const DEFAULT_API_PORT: u16 = 9841;

/// Default Prometheus metrics port.
pub const DEFAULT_METRICS_PORT: u16 = 9842;

/// Capacity of the broadcast channel feeding event subscribers.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Name of the sled tree holding escrow records.
pub const ESCROW_TREE_NAME: &str = "escrows";
