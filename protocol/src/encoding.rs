//! Hex helpers for 32-byte words.
//!
//! Coordinates, scalars and identifiers all travel as 64-digit hex strings
//! in JSON. Input may carry a `0x` prefix and may be shorter than 64 digits
//! (left-padded with zeros), which is how most EVM tooling prints `uint256`.

/// Parse a hex string into a big-endian 32-byte word.
pub fn parse_word(s: &str) -> Result<[u8; 32], String> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    if digits.is_empty() || digits.len() > 64 {
        return Err(format!("expected 1..=64 hex digits, got {}", digits.len()));
    }

    let padded = format!("{:0>64}", digits);
    let bytes = hex::decode(&padded).map_err(|e| e.to_string())?;

    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// `serde(with = ...)` adapter encoding `[u8; 32]` as lowercase hex.
pub mod hex32 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(deserializer)?;
        super::parse_word(&s).map_err(serde::de::Error::custom)
    }
}
