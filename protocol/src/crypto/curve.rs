//! # Curve Oracle over BN254/G1
//!
//! Escrow withdrawal is gated on a scalar `k` whose public point `k * G`
//! equals the commitment fixed at creation. This module is the only place
//! that touches curve arithmetic. Everything else sees [`CurvePoint`]
//! (two 32-byte big-endian affine coordinates) and [`Scalar`] (a 256-bit
//! big-endian integer).
//!
//! ## Why BN254
//!
//! BN254/G1 is the group behind the EVM `ecMul` precompile, so commitments
//! produced here can be checked by contracts on EVM chains and vice versa.
//! The arithmetic itself comes from `ark-bn254`; we only validate inputs
//! and translate encodings.
//!
//! ## Encoding rules
//!
//! - Coordinates must be canonical field elements (strictly below the base
//!   field modulus). Non-canonical encodings are rejected, not reduced.
//! - The point at infinity is encoded as `(0, 0)`, matching the precompile.
//! - Scalars are reduced modulo the group order `r`. G1 has prime order,
//!   so `k * G == (k mod r) * G` for every 256-bit `k`.

use std::fmt;
use std::ops::Mul;

use ark_bn254::{Fq, Fr, G1Affine};
use ark_ec::{AffineRepr, CurveGroup};
use ark_ff::{BigInteger, PrimeField, UniformRand};
use ark_std::rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::COORDINATE_LENGTH;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors produced while decoding or operating on curve values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CurveError {
    /// A coordinate is not a canonical base-field element.
    #[error("non-canonical coordinate: {0} is not below the field modulus")]
    NonCanonicalCoordinate(String),

    /// The coordinates decode, but the point does not satisfy the curve equation.
    #[error("point ({x}, {y}) is not on the curve")]
    NotOnCurve {
        /// Hex-encoded x coordinate.
        x: String,
        /// Hex-encoded y coordinate.
        y: String,
    },

    /// Malformed hex input.
    #[error("invalid hex encoding: {0}")]
    InvalidHex(String),
}

// ---------------------------------------------------------------------------
// CurvePoint
// ---------------------------------------------------------------------------

/// An affine curve point as two 32-byte big-endian coordinates.
///
/// This is the wire and storage representation. It is deliberately
/// unvalidated: auxiliary points are carried opaquely and never touch the
/// curve, and commitments are only compared coordinate-for-coordinate with
/// a freshly computed `k * G`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CurvePoint {
    /// Affine x coordinate, big-endian.
    #[serde(with = "crate::encoding::hex32")]
    pub x: [u8; COORDINATE_LENGTH],
    /// Affine y coordinate, big-endian.
    #[serde(with = "crate::encoding::hex32")]
    pub y: [u8; COORDINATE_LENGTH],
}

impl CurvePoint {
    /// Build a point from raw coordinates.
    pub const fn new(x: [u8; COORDINATE_LENGTH], y: [u8; COORDINATE_LENGTH]) -> Self {
        Self { x, y }
    }

    /// The `(0, 0)` encoding of the point at infinity.
    pub const fn infinity() -> Self {
        Self {
            x: [0u8; COORDINATE_LENGTH],
            y: [0u8; COORDINATE_LENGTH],
        }
    }

    /// Build a point from small integer coordinates. Mostly useful in tests.
    pub fn from_u64(x: u64, y: u64) -> Self {
        Self {
            x: u64_to_word(x),
            y: u64_to_word(y),
        }
    }

    /// Parse a point from two hex strings (optional `0x` prefix, up to 64 digits).
    pub fn from_hex(x: &str, y: &str) -> Result<Self, CurveError> {
        Ok(Self {
            x: crate::encoding::parse_word(x).map_err(CurveError::InvalidHex)?,
            y: crate::encoding::parse_word(y).map_err(CurveError::InvalidHex)?,
        })
    }

    /// Returns `true` for the `(0, 0)` infinity encoding.
    pub fn is_infinity(&self) -> bool {
        self.x == [0u8; COORDINATE_LENGTH] && self.y == [0u8; COORDINATE_LENGTH]
    }

    /// Hex-encoded x coordinate.
    pub fn x_hex(&self) -> String {
        hex::encode(self.x)
    }

    /// Hex-encoded y coordinate.
    pub fn y_hex(&self) -> String {
        hex::encode(self.y)
    }

    /// Both coordinates concatenated (64 bytes), as hashed into identifiers.
    pub fn to_bytes(&self) -> [u8; 2 * COORDINATE_LENGTH] {
        let mut out = [0u8; 2 * COORDINATE_LENGTH];
        out[..COORDINATE_LENGTH].copy_from_slice(&self.x);
        out[COORDINATE_LENGTH..].copy_from_slice(&self.y);
        out
    }
}

impl fmt::Debug for CurvePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CurvePoint(0x{}, 0x{})", self.x_hex(), self.y_hex())
    }
}

// ---------------------------------------------------------------------------
// Scalar
// ---------------------------------------------------------------------------

/// A 256-bit big-endian secret scalar.
///
/// `Debug` never prints the value. Anyone who learns the scalar behind a
/// commitment can claim the escrow, so it must not leak through logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scalar(#[serde(with = "crate::encoding::hex32")] pub [u8; COORDINATE_LENGTH]);

impl Scalar {
    /// Wrap raw big-endian bytes.
    pub const fn from_bytes(bytes: [u8; COORDINATE_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Build a scalar from a small integer.
    pub fn from_u64(value: u64) -> Self {
        Self(u64_to_word(value))
    }

    /// Parse a scalar from hex (optional `0x` prefix, up to 64 digits).
    pub fn from_hex(s: &str) -> Result<Self, CurveError> {
        crate::encoding::parse_word(s)
            .map(Self)
            .map_err(CurveError::InvalidHex)
    }

    /// Draw a uniformly random scalar below the group order.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let fr = Fr::rand(rng);
        let mut out = [0u8; COORDINATE_LENGTH];
        out.copy_from_slice(&fr.into_bigint().to_bytes_be());
        Self(out)
    }

    /// Draw a fresh secret from the operating system's CSPRNG.
    pub fn generate() -> Self {
        Self::random(&mut rand::rngs::OsRng)
    }

    /// Hex encoding of the raw bytes.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    fn to_field(&self) -> Fr {
        Fr::from_be_bytes_mod_order(&self.0)
    }
}

impl fmt::Debug for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Scalar(<redacted>)")
    }
}

// ---------------------------------------------------------------------------
// CurveOracle
// ---------------------------------------------------------------------------

/// Scalar multiplication over a fixed curve.
///
/// Implementations must be deterministic and stateless. The escrow engine
/// only ever calls [`commitment`](CurveOracle::commitment), but the general
/// form is exposed for chained-swap tooling that multiplies other points.
pub trait CurveOracle: Send + Sync {
    /// Human-readable curve name, for logs.
    fn name(&self) -> &'static str;

    /// The generator `G`.
    fn base_point(&self) -> CurvePoint;

    /// Compute `scalar * point`, validating `point` and the result.
    fn scalar_mul(&self, scalar: &Scalar, point: &CurvePoint) -> Result<CurvePoint, CurveError>;

    /// Compute the public commitment `scalar * G`.
    fn commitment(&self, scalar: &Scalar) -> Result<CurvePoint, CurveError> {
        self.scalar_mul(scalar, &self.base_point())
    }
}

/// [`CurveOracle`] over BN254/G1 backed by `ark-bn254`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Bn254Oracle;

impl Bn254Oracle {
    /// Create the oracle. It holds no state.
    pub fn new() -> Self {
        Self
    }

    fn decode(point: &CurvePoint) -> Result<G1Affine, CurveError> {
        if point.is_infinity() {
            return Ok(G1Affine::zero());
        }

        let x = decode_coordinate(&point.x)?;
        let y = decode_coordinate(&point.y)?;
        let affine = G1Affine::new_unchecked(x, y);

        // G1 has cofactor 1, so on-curve implies in the prime-order subgroup.
        if !affine.is_on_curve() || !affine.is_in_correct_subgroup_assuming_on_curve() {
            return Err(CurveError::NotOnCurve {
                x: point.x_hex(),
                y: point.y_hex(),
            });
        }
        Ok(affine)
    }

    fn encode(point: &G1Affine) -> CurvePoint {
        match point.xy() {
            Some((x, y)) => CurvePoint::new(encode_coordinate(x), encode_coordinate(y)),
            None => CurvePoint::infinity(),
        }
    }
}

impl CurveOracle for Bn254Oracle {
    fn name(&self) -> &'static str {
        crate::config::CURVE_NAME
    }

    fn base_point(&self) -> CurvePoint {
        Self::encode(&G1Affine::generator())
    }

    fn scalar_mul(&self, scalar: &Scalar, point: &CurvePoint) -> Result<CurvePoint, CurveError> {
        let base = Self::decode(point)?;
        let result = base.mul(scalar.to_field()).into_affine();

        if !result.is_zero() && !result.is_on_curve() {
            let encoded = Self::encode(&result);
            return Err(CurveError::NotOnCurve {
                x: encoded.x_hex(),
                y: encoded.y_hex(),
            });
        }
        Ok(Self::encode(&result))
    }
}

fn decode_coordinate(bytes: &[u8; COORDINATE_LENGTH]) -> Result<Fq, CurveError> {
    let element = Fq::from_be_bytes_mod_order(bytes);
    if encode_coordinate(&element) != *bytes {
        return Err(CurveError::NonCanonicalCoordinate(hex::encode(bytes)));
    }
    Ok(element)
}

fn encode_coordinate(element: &Fq) -> [u8; COORDINATE_LENGTH] {
    let mut out = [0u8; COORDINATE_LENGTH];
    out.copy_from_slice(&element.into_bigint().to_bytes_be());
    out
}

fn u64_to_word(value: u64) -> [u8; COORDINATE_LENGTH] {
    let mut out = [0u8; COORDINATE_LENGTH];
    out[COORDINATE_LENGTH - 8..].copy_from_slice(&value.to_be_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    /// BN254 group order r.
    const GROUP_ORDER: &str = "30644e72e131a029b85045b68181585d2833e84879b9709143e1f593f0000001";
    /// BN254 base field modulus p.
    const FIELD_MODULUS: &str = "30644e72e131a029b85045b68181585d97816a916871ca8d3c208c16d87cfd47";

    #[test]
    fn generator_is_one_two() {
        let oracle = Bn254Oracle::new();
        assert_eq!(oracle.base_point(), CurvePoint::from_u64(1, 2));
    }

    #[test]
    fn scalar_one_yields_generator() {
        let oracle = Bn254Oracle::new();
        let p = oracle.commitment(&Scalar::from_u64(1)).unwrap();
        assert_eq!(p, oracle.base_point());
    }

    #[test]
    fn scalar_two_matches_known_doubling() {
        let oracle = Bn254Oracle::new();
        let p = oracle.commitment(&Scalar::from_u64(2)).unwrap();
        let expected = CurvePoint::from_hex(
            "030644e72e131a029b85045b68181585d97816a916871ca8d3c208c16d87cfd3",
            "15ed738c0e0a7c92e7845f96b2ae9c0a68a6a449e3538fc7ff3ebf7a5a18a2c4",
        )
        .unwrap();
        assert_eq!(p, expected);
    }

    #[test]
    fn scalar_mul_composes() {
        // 3 * (5 * G) == 15 * G
        let oracle = Bn254Oracle::new();
        let five_g = oracle.commitment(&Scalar::from_u64(5)).unwrap();
        let lhs = oracle.scalar_mul(&Scalar::from_u64(3), &five_g).unwrap();
        let rhs = oracle.commitment(&Scalar::from_u64(15)).unwrap();
        assert_eq!(lhs, rhs);
    }

    #[test]
    fn group_order_yields_infinity() {
        let oracle = Bn254Oracle::new();
        let r = Scalar::from_hex(GROUP_ORDER).unwrap();
        let p = oracle.commitment(&r).unwrap();
        assert!(p.is_infinity());
    }

    #[test]
    fn scalar_is_reduced_modulo_order() {
        // r + 1 behaves like 1.
        let oracle = Bn254Oracle::new();
        let mut bytes = Scalar::from_hex(GROUP_ORDER).unwrap().0;
        bytes[31] += 1;
        let p = oracle.commitment(&Scalar::from_bytes(bytes)).unwrap();
        assert_eq!(p, oracle.base_point());
    }

    #[test]
    fn zero_scalar_yields_infinity() {
        let oracle = Bn254Oracle::new();
        let p = oracle.commitment(&Scalar::from_u64(0)).unwrap();
        assert_eq!(p, CurvePoint::infinity());
    }

    #[test]
    fn infinity_times_anything_is_infinity() {
        let oracle = Bn254Oracle::new();
        let p = oracle
            .scalar_mul(&Scalar::from_u64(42), &CurvePoint::infinity())
            .unwrap();
        assert!(p.is_infinity());
    }

    #[test]
    fn off_curve_point_rejected() {
        let oracle = Bn254Oracle::new();
        let result = oracle.scalar_mul(&Scalar::from_u64(2), &CurvePoint::from_u64(1, 3));
        assert!(matches!(result, Err(CurveError::NotOnCurve { .. })));
    }

    #[test]
    fn non_canonical_coordinate_rejected() {
        let oracle = Bn254Oracle::new();
        let bad = CurvePoint::from_hex(FIELD_MODULUS, "02").unwrap();
        let result = oracle.scalar_mul(&Scalar::from_u64(2), &bad);
        assert!(matches!(result, Err(CurveError::NonCanonicalCoordinate(_))));
    }

    #[test]
    fn random_scalar_round_trips_through_commitment() {
        let oracle = Bn254Oracle::new();
        let mut rng = ark_std::test_rng();
        let k = Scalar::random(&mut rng);
        let a = oracle.commitment(&k).unwrap();
        let b = oracle.commitment(&k).unwrap();
        assert_eq!(a, b);
        assert!(!a.is_infinity());
    }

    #[test]
    fn generated_scalars_differ() {
        assert_ne!(Scalar::generate(), Scalar::generate());
    }

    #[test]
    fn scalar_debug_is_redacted() {
        let k = Scalar::from_u64(1234);
        assert_eq!(format!("{:?}", k), "Scalar(<redacted>)");
    }

    #[test]
    fn point_serializes_as_hex() {
        let p = CurvePoint::from_u64(1, 2);
        let json = serde_json::to_value(p).unwrap();
        assert_eq!(
            json["x"],
            "0000000000000000000000000000000000000000000000000000000000000001"
        );
        let back: CurvePoint = serde_json::from_value(json).unwrap();
        assert_eq!(back, p);
    }
}
