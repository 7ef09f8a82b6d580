//! # Contract Identifier Derivation
//!
//! ```text
//! id = SHA-256( "pointlock/contract-id/v1"
//!             || u32_be(len(sender))   || sender
//!             || u32_be(len(receiver)) || receiver
//!             || u64_be(amount)
//!             || commitment.x || commitment.y
//!             || c1.x || c1.y || c2.x || c2.y
//!             || u64_be(timelock) )
//! ```
//!
//! Identities are variable-length, so each carries a length prefix; all
//! other fields are fixed-width. The encoding is therefore injective, and
//! moving bytes between fields (or swapping sender and receiver) always
//! yields a different preimage.

use pointlock_protocol::config::CONTRACT_ID_DOMAIN;
use pointlock_protocol::crypto::sha256_multi;
use pointlock_protocol::{ContractId, Identity};

use crate::record::EscrowParams;

/// Derive the identifier of an escrow from its parameters.
pub fn derive_contract_id(params: &EscrowParams) -> ContractId {
    let sender_len = identity_len(&params.sender);
    let receiver_len = identity_len(&params.receiver);
    let amount = params.amount.to_be_bytes();
    let commitment = params.commitment.to_bytes();
    let c1 = params.aux.c1.to_bytes();
    let c2 = params.aux.c2.to_bytes();
    let timelock = params.timelock.to_be_bytes();

    ContractId::from_bytes(sha256_multi(&[
        CONTRACT_ID_DOMAIN,
        &sender_len,
        params.sender.as_bytes(),
        &receiver_len,
        params.receiver.as_bytes(),
        &amount,
        &commitment,
        &c1,
        &c2,
        &timelock,
    ]))
}

fn identity_len(identity: &Identity) -> [u8; 4] {
    // Identities longer than 4 GiB are not a thing we need to encode.
    (identity.as_bytes().len() as u32).to_be_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::AuxPoints;
    use pointlock_protocol::CurvePoint;

    fn params() -> EscrowParams {
        EscrowParams {
            sender: Identity::new("alice").unwrap(),
            receiver: Identity::new("bob").unwrap(),
            amount: 100,
            commitment: CurvePoint::from_u64(1, 2),
            aux: AuxPoints::new(CurvePoint::from_u64(3, 4), CurvePoint::from_u64(5, 6)),
            timelock: 1_700_000_000,
        }
    }

    #[test]
    fn derivation_is_deterministic() {
        assert_eq!(derive_contract_id(&params()), derive_contract_id(&params()));
    }

    #[test]
    fn every_field_affects_the_id() {
        let base = derive_contract_id(&params());

        let mut p = params();
        p.sender = Identity::new("alice2").unwrap();
        assert_ne!(derive_contract_id(&p), base);

        let mut p = params();
        p.receiver = Identity::new("carol").unwrap();
        assert_ne!(derive_contract_id(&p), base);

        let mut p = params();
        p.amount += 1;
        assert_ne!(derive_contract_id(&p), base);

        let mut p = params();
        p.commitment.y[31] ^= 1;
        assert_ne!(derive_contract_id(&p), base);

        let mut p = params();
        p.aux.c1.x[0] ^= 1;
        assert_ne!(derive_contract_id(&p), base);

        let mut p = params();
        p.aux.c2.y[31] ^= 1;
        assert_ne!(derive_contract_id(&p), base);

        let mut p = params();
        p.timelock += 1;
        assert_ne!(derive_contract_id(&p), base);
    }

    #[test]
    fn swapping_parties_changes_the_id() {
        let mut p = params();
        std::mem::swap(&mut p.sender, &mut p.receiver);
        assert_ne!(derive_contract_id(&p), derive_contract_id(&params()));
    }

    #[test]
    fn swapping_aux_points_changes_the_id() {
        let mut p = params();
        std::mem::swap(&mut p.aux.c1, &mut p.aux.c2);
        assert_ne!(derive_contract_id(&p), derive_contract_id(&params()));
    }

    #[test]
    fn identity_boundaries_are_unambiguous() {
        // "ab" + "c" must not collide with "a" + "bc".
        let mut a = params();
        a.sender = Identity::new("ab").unwrap();
        a.receiver = Identity::new("c").unwrap();

        let mut b = params();
        b.sender = Identity::new("a").unwrap();
        b.receiver = Identity::new("bc").unwrap();

        assert_ne!(derive_contract_id(&a), derive_contract_id(&b));
    }

    #[test]
    fn params_method_matches_free_function() {
        let p = params();
        assert_eq!(p.contract_id(), derive_contract_id(&p));
    }
}
