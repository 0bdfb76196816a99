//! The multiplicative-to-additive subprotocol.
//!
//! Two parties holding secrets `a` and `b` end up with additive shares
//! `α + β = a·b mod q` without revealing either input. The initiator sends
//! `Enc_A(a)` under its own Paillier key; the responder picks a mask
//! `β' ∈ [0, q⁵)`, replies with `c = Enc_A(a)^b · Enc_A(β')`, and keeps
//! `β = -β' mod q`; the initiator decrypts and reduces to get `α`.
//!
//! The mask is drawn from `q⁵` so that the responder proof's `q⁷` bound has
//! completeness slack while still swamping `a·b < q²` statistically. Range
//! proofs on both legs ([`pienc`](crate::zkp::pienc) for the initiator,
//! [`pimta`](crate::zkp::pimta) for the responder) prevent plaintext
//! wraparound attacks; the signing protocol attaches and checks them.

use crate::{
    curve::CurveTrait,
    errors::Result,
    paillier::{Ciphertext, DecryptionKey, EncryptionKey, Nonce},
    utils::random_positive_bn,
};
use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, RngCore};

/// The initiator's opening move: its encrypted secret plus the nonce needed
/// for the range proof.
pub(crate) struct MtaInit {
    pub(crate) ciphertext: Ciphertext,
    pub(crate) nonce: Nonce,
}

/// The responder's reply: the combined ciphertext, the mask (needed for the
/// responder proof), its encryption nonce, and the responder's additive
/// share `β = -β' mod q`.
pub(crate) struct MtaResponse<C: CurveTrait> {
    pub(crate) ciphertext: Ciphertext,
    pub(crate) beta_prime: BigNumber,
    pub(crate) nonce: Nonce,
    pub(crate) share: C::Scalar,
}

/// Initiate: encrypt `a ∈ [0, q)` under the initiator's own key.
pub(crate) fn init<R: RngCore + CryptoRng>(
    rng: &mut R,
    initiator_pk: &EncryptionKey,
    a: &BigNumber,
) -> Result<MtaInit> {
    let (ciphertext, nonce) = initiator_pk.encrypt(rng, a)?;
    Ok(MtaInit { ciphertext, nonce })
}

/// Respond with secret `b ∈ [0, q)` to an initiator ciphertext.
pub(crate) fn respond<C: CurveTrait, R: RngCore + CryptoRng>(
    rng: &mut R,
    initiator_pk: &EncryptionKey,
    initiator_ciphertext: &Ciphertext,
    b: &BigNumber,
) -> Result<MtaResponse<C>> {
    let q = C::order();
    let q5 = &q * &q * &q * &q * &q;
    let beta_prime = random_positive_bn(rng, &q5);
    let (enc_beta, nonce) = initiator_pk.encrypt(rng, &beta_prime)?;
    let ciphertext = initiator_pk.multiply_and_add(b, initiator_ciphertext, &enc_beta)?;

    use crate::curve::ScalarTrait;
    let share = C::bn_to_scalar(&beta_prime)?.negate();
    Ok(MtaResponse {
        ciphertext,
        beta_prime,
        nonce,
        share,
    })
}

/// Finalize: decrypt the responder's ciphertext and reduce into the scalar
/// field to obtain `α`.
pub(crate) fn finalize<C: CurveTrait>(
    initiator_dk: &DecryptionKey,
    response_ciphertext: &Ciphertext,
) -> Result<C::Scalar> {
    let plaintext = initiator_dk.decrypt(response_ciphertext)?;
    C::bn_to_scalar(&plaintext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        curve::{ScalarTrait, TestCurve},
        paillier::tests::test_key,
        utils::testing::init_testing,
    };

    #[test]
    fn shares_sum_to_the_product() {
        let mut rng = init_testing();
        let dk = test_key(&mut rng);
        let pk = dk.encryption_key().clone();
        let q = TestCurve::order();

        for _ in 0..5 {
            let a = random_positive_bn(&mut rng, &q);
            let b = random_positive_bn(&mut rng, &q);

            let opening = init(&mut rng, &pk, &a).unwrap();
            let response =
                respond::<TestCurve, _>(&mut rng, &pk, &opening.ciphertext, &b).unwrap();
            let alpha = finalize::<TestCurve>(&dk, &response.ciphertext).unwrap();

            let product = TestCurve::bn_to_scalar(&a.modmul(&b, &q)).unwrap();
            assert_eq!(alpha.add(&response.share), product);
        }
    }

    #[test]
    fn mask_stays_below_the_proof_bound() {
        let mut rng = init_testing();
        let dk = test_key(&mut rng);
        let pk = dk.encryption_key().clone();
        let q = TestCurve::order();
        let q5 = &q * &q * &q * &q * &q;

        let a = random_positive_bn(&mut rng, &q);
        let b = random_positive_bn(&mut rng, &q);
        let opening = init(&mut rng, &pk, &a).unwrap();
        let response = respond::<TestCurve, _>(&mut rng, &pk, &opening.ciphertext, &b).unwrap();
        assert!(response.beta_prime < q5);
    }
}
