//! # Hashing Utilities
//!
//! SHA-256 is the only digest pointlock needs. Contract identifiers are
//! SHA-256 over a canonical, domain-tagged encoding of the creation
//! parameters, which keeps them reproducible by any external system that
//! has a SHA-256 implementation (EVM contracts, indexers, wallets).
//!
//! ## Multi-part hashing
//!
//! Identifier derivation feeds a dozen fixed-width fields into one digest.
//! [`sha256_multi`] streams the parts into the hasher instead of building
//! an intermediate buffer first.

use sha2::{Digest, Sha256};

/// Compute the SHA-256 hash of the input data.
///
/// Returns a 32-byte digest as a `Vec<u8>`. Prefer [`sha256_array`] when
/// the fixed-size type propagates naturally.
///
/// # Example
///
/// ```
/// use pointlock_protocol::crypto::sha256;
///
/// let hash = sha256(b"pointlock");
/// assert_eq!(hash.len(), 32);
/// ```
pub fn sha256(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

/// Compute the SHA-256 hash and return a fixed-size array.
pub fn sha256_array(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Hash multiple byte slices as if they were concatenated.
///
/// `sha256_multi(&[a, b])` equals `sha256_array(a || b)`. Callers that need
/// field boundaries to survive concatenation must encode them (length
/// prefixes or fixed widths) before handing the parts over.
pub fn sha256_multi(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        // SHA-256 of the empty string.
        let hash = sha256(b"");
        let expected =
            hex::decode("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
                .unwrap();
        assert_eq!(hash, expected);
    }

    #[test]
    fn test_sha256_abc_vector() {
        let hash = sha256_array(b"abc");
        assert_eq!(
            hex::encode(hash),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn sha256_deterministic() {
        let a = sha256(b"pointlock");
        let b = sha256(b"pointlock");
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn test_sha256_array_matches_vec() {
        let vec_result = sha256(b"test data");
        let arr_result = sha256_array(b"test data");
        assert_eq!(vec_result.as_slice(), arr_result.as_slice());
    }

    #[test]
    fn test_sha256_multi_matches_concatenation() {
        let joined = sha256_array(b"helloworld");
        let parts = sha256_multi(&[b"hello", b"world"]);
        assert_eq!(joined, parts);
    }

    #[test]
    fn test_sha256_multi_empty_is_empty_hash() {
        assert_eq!(sha256_multi(&[]), sha256_array(b""));
    }
}
