//! # Identities and Contract Identifiers
//!
//! pointlock does not run an account system. Parties are opaque
//! [`Identity`] strings handed to us by whatever sits in front of the
//! engine (an authenticated API layer, a chain runtime, a test). The only
//! properties we rely on are equality and a stable byte encoding.
//!
//! [`ContractId`] is the 32-byte digest that names an escrow. It is derived
//! from the creation parameters (see `pointlock_contracts::contract_id`),
//! never generated randomly, so identical parameters always map to the same
//! ID. That is how duplicate creation is detected.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::CONTRACT_ID_LENGTH;

/// Errors that can occur while parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    /// Identities must carry at least one character.
    #[error("identity must not be empty")]
    Empty,

    /// The contract ID string is not valid 64-digit hex.
    #[error("invalid contract id: {0}")]
    InvalidContractId(String),
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// An opaque party identity (account address, public key hex, username).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    /// Wrap a string as an identity. Rejects the empty string.
    pub fn new(value: impl Into<String>) -> Result<Self, IdentityError> {
        let value = value.into();
        if value.is_empty() {
            return Err(IdentityError::Empty);
        }
        Ok(Self(value))
    }

    /// The identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Raw bytes of the identity, as fed into identifier derivation.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self.0)
    }
}

impl FromStr for Identity {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Identity {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.0
    }
}

// ---------------------------------------------------------------------------
// ContractId
// ---------------------------------------------------------------------------

/// A 32-byte escrow identifier. Displayed and serialized as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContractId(#[serde(with = "crate::encoding::hex32")] [u8; CONTRACT_ID_LENGTH]);

impl ContractId {
    /// Wrap a raw digest.
    pub const fn from_bytes(bytes: [u8; CONTRACT_ID_LENGTH]) -> Self {
        Self(bytes)
    }

    /// The raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; CONTRACT_ID_LENGTH] {
        &self.0
    }

    /// Lowercase hex encoding (64 digits, no prefix).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from exactly 64 hex digits, with or without `0x`.
    pub fn from_hex(s: &str) -> Result<Self, IdentityError> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        if digits.len() != 2 * CONTRACT_ID_LENGTH {
            return Err(IdentityError::InvalidContractId(format!(
                "expected {} hex digits, got {}",
                2 * CONTRACT_ID_LENGTH,
                digits.len()
            )));
        }
        let bytes = hex::decode(digits)
            .map_err(|e| IdentityError::InvalidContractId(e.to_string()))?;
        let mut out = [0u8; CONTRACT_ID_LENGTH];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }
}

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContractId({})", self.to_hex())
    }
}

impl FromStr for ContractId {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_identity_rejected() {
        assert_eq!(Identity::new(""), Err(IdentityError::Empty));
    }

    #[test]
    fn identity_displays_raw_value() {
        let id = Identity::new("alice").unwrap();
        assert_eq!(id.to_string(), "alice");
        assert_eq!(id.as_bytes(), b"alice");
    }

    #[test]
    fn identity_serializes_transparently() {
        let id: Identity = "bob".parse().unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"bob\"");
    }

    #[test]
    fn empty_identity_rejected_on_deserialize() {
        assert!(serde_json::from_str::<Identity>("\"\"").is_err());
        let id: Identity = serde_json::from_str("\"carol\"").unwrap();
        assert_eq!(id.as_str(), "carol");
    }

    #[test]
    fn contract_id_hex_roundtrip() {
        let id = ContractId::from_bytes([0x5a; 32]);
        let parsed: ContractId = id.to_hex().parse().unwrap();
        assert_eq!(parsed, id);
        let prefixed = ContractId::from_hex(&format!("0x{}", id)).unwrap();
        assert_eq!(prefixed, id);
    }

    #[test]
    fn contract_id_rejects_short_input() {
        assert!(ContractId::from_hex("abcd").is_err());
    }

    #[test]
    fn contract_id_rejects_non_hex() {
        assert!(ContractId::from_hex(&"zz".repeat(32)).is_err());
    }
}
