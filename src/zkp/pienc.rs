//! Range proof for a Paillier ciphertext.
//!
//! Proves that a ciphertext `c` under the prover's key `N` encrypts a
//! plaintext below `q³`, where `q` is the curve order. The commitments live
//! under the *verifier's* ring-Pedersen parameters, so the proof has to be
//! produced once per receiver. The signing protocol runs this on the
//! encrypted mask share `Enc(kᵢ)`; without it, an oversized plaintext would
//! let a malicious initiator extract bits of the responder's secrets through
//! modular wraparound.
//!
//! The `q³` bound is normative: shrinking it breaks soundness of the MtA
//! accounting, expanding it breaks completeness.

use crate::{
    curve::CurveTrait,
    errors::{InternalError, Result},
    paillier::{Ciphertext, EncryptionKey, Nonce},
    ring_pedersen::RingPedersenParams,
    utils::{
        positive_challenge_from_transcript, random_bn_in_z_star, random_positive_bn,
        within_interval,
    },
    zkp::{append_context, Proof, ProofContext},
};
use libpaillier::unknown_order::BigNumber;
use merlin::Transcript;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use tracing::error;

/// The public statement: `ciphertext` encrypts a value below `q³` under
/// `prover_pk`.
#[derive(Copy, Clone)]
pub(crate) struct CommonInput<'a> {
    setup: &'a RingPedersenParams,
    prover_pk: &'a EncryptionKey,
    ciphertext: &'a Ciphertext,
}

impl<'a> CommonInput<'a> {
    pub(crate) fn new(
        setup: &'a RingPedersenParams,
        prover_pk: &'a EncryptionKey,
        ciphertext: &'a Ciphertext,
    ) -> Self {
        Self {
            setup,
            prover_pk,
            ciphertext,
        }
    }
}

/// The prover's witness: the plaintext and the encryption nonce.
#[derive(Copy, Clone)]
pub(crate) struct PiEncSecret<'a> {
    plaintext: &'a BigNumber,
    nonce: &'a Nonce,
}

impl<'a> PiEncSecret<'a> {
    pub(crate) fn new(plaintext: &'a BigNumber, nonce: &'a Nonce) -> Self {
        Self { plaintext, nonce }
    }
}

/// Range proof for an encrypted plaintext.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PiEncProof<C> {
    z: BigNumber,
    u: BigNumber,
    w: BigNumber,
    s: BigNumber,
    s1: BigNumber,
    s2: BigNumber,
    curve: PhantomData<C>,
}

impl<C: CurveTrait> PiEncProof<C> {
    fn challenge(
        transcript: &mut Transcript,
        context: &impl ProofContext,
        input: &CommonInput,
        z: &BigNumber,
        u: &BigNumber,
        w: &BigNumber,
    ) -> Result<BigNumber> {
        append_context(transcript, b"PiEncProof context", context)?;
        transcript.append_message(b"prover modulus", &input.prover_pk.modulus().to_bytes());
        transcript.append_message(b"setup modulus", &input.setup.modulus().to_bytes());
        transcript.append_message(b"ciphertext", &input.ciphertext.as_bn().to_bytes());
        transcript.append_message(b"z", &z.to_bytes());
        transcript.append_message(b"u", &u.to_bytes());
        transcript.append_message(b"w", &w.to_bytes());
        positive_challenge_from_transcript(transcript, &C::order())
    }
}

impl<C: CurveTrait> Proof for PiEncProof<C> {
    type CommonInput<'a> = CommonInput<'a>;
    type ProverSecret<'a> = PiEncSecret<'a>;

    fn prove<R: RngCore + CryptoRng>(
        input: Self::CommonInput<'_>,
        secret: Self::ProverSecret<'_>,
        context: &impl ProofContext,
        transcript: &mut Transcript,
        rng: &mut R,
    ) -> Result<Self> {
        let q = C::order();
        let q3 = &q * &q * &q;
        let n = input.prover_pk.modulus();
        let nn = input.prover_pk.modulus_squared();
        let n_tilde = input.setup.modulus();

        let alpha = random_positive_bn(rng, &q3);
        let beta = random_bn_in_z_star(rng, n)?;
        let gamma = random_positive_bn(rng, &(&q3 * n_tilde));
        let rho = random_positive_bn(rng, &(&q * n_tilde));

        // z = h1^m h2^rho, w = h1^alpha h2^gamma (mod Ñ);
        // u = Enc(alpha; beta) = (1+N)^alpha beta^N (mod N²).
        let z = input.setup.commit(secret.plaintext, &rho);
        let w = input.setup.commit(&alpha, &gamma);
        let gamma_base = (BigNumber::one() + n) % &nn;
        let u = gamma_base
            .modpow(&alpha, &nn)
            .modmul(&beta.modpow(n, &nn), &nn);

        let e = Self::challenge(transcript, context, &input, &z, &u, &w)?;

        let s = secret.nonce.modpow(&e, n).modmul(&beta, n);
        let s1 = &e * secret.plaintext + &alpha;
        let s2 = &e * &rho + &gamma;

        Ok(Self {
            z,
            u,
            w,
            s,
            s1,
            s2,
            curve: PhantomData,
        })
    }

    fn verify(
        self,
        input: Self::CommonInput<'_>,
        context: &impl ProofContext,
        transcript: &mut Transcript,
    ) -> Result<()> {
        let q = C::order();
        let q3 = &q * &q * &q;
        let n = input.prover_pk.modulus();
        let nn = input.prover_pk.modulus_squared();
        let n_tilde = input.setup.modulus();

        // Interval and unit sanity checks on every element.
        if !within_interval(&self.z, n_tilde)
            || !within_interval(&self.w, n_tilde)
            || !within_interval(&self.u, &nn)
            || !within_interval(&self.s, n)
            || self.s1 < BigNumber::zero()
            || self.s2 < BigNumber::zero()
            || self.u.gcd(&nn) != BigNumber::one()
            || self.s.gcd(n) != BigNumber::one()
        {
            error!("Range proof element out of range");
            return Err(InternalError::unattributed());
        }

        // The range assertion itself: for honest plaintexts below q,
        // s1 = e·m + alpha lands below q³ except with negligible probability.
        if !within_interval(&self.s1, &q3) {
            error!("Range proof response exceeds the q³ bound");
            return Err(InternalError::unattributed());
        }

        let e = Self::challenge(transcript, context, &input, &self.z, &self.u, &self.w)?;

        // Enc(s1; s) == u · c^e (mod N²)
        let gamma_base = (BigNumber::one() + n) % &nn;
        let lhs = gamma_base
            .modpow(&self.s1, &nn)
            .modmul(&self.s.modpow(n, &nn), &nn);
        let rhs = self
            .u
            .modmul(&input.ciphertext.as_bn().modpow(&e, &nn), &nn);
        if lhs != rhs {
            error!("Range proof ciphertext equation failed");
            return Err(InternalError::unattributed());
        }

        // h1^s1 h2^s2 == w · z^e (mod Ñ)
        let lhs = input.setup.commit(&self.s1, &self.s2);
        let rhs = self.w.modmul(&self.z.modpow(&e, n_tilde), n_tilde);
        if lhs != rhs {
            error!("Range proof commitment equation failed");
            return Err(InternalError::unattributed());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        curve::TestCurve,
        paillier::tests::test_key,
        ring_pedersen::tests::test_params,
        utils::{random_positive_bn, testing::init_testing},
    };

    fn transcript() -> Transcript {
        Transcript::new(b"PiEncProof test")
    }

    #[test]
    fn honest_proof_verifies() {
        let mut rng = init_testing();
        let dk = test_key(&mut rng);
        let pk = dk.encryption_key().clone();
        let setup = test_params(&mut rng);

        let m = random_positive_bn(&mut rng, &TestCurve::order());
        let (ciphertext, nonce) = pk.encrypt(&mut rng, &m).unwrap();

        let input = CommonInput::new(setup.params(), &pk, &ciphertext);
        let secret = PiEncSecret::new(&m, &nonce);
        let proof: PiEncProof<TestCurve> =
            PiEncProof::prove(input, secret, &(), &mut transcript(), &mut rng).unwrap();
        assert!(proof.verify(input, &(), &mut transcript()).is_ok());
    }

    #[test]
    fn oversized_plaintexts_are_rejected() {
        let mut rng = init_testing();
        let dk = test_key(&mut rng);
        let pk = dk.encryption_key().clone();
        let setup = test_params(&mut rng);

        // A plaintext far beyond q³ (but still a valid Paillier plaintext).
        let q = TestCurve::order();
        let q4 = &q * &q * &q * &q;
        let (ciphertext, nonce) = pk.encrypt(&mut rng, &q4).unwrap();

        let input = CommonInput::new(setup.params(), &pk, &ciphertext);
        let secret = PiEncSecret::new(&q4, &nonce);
        let proof: PiEncProof<TestCurve> =
            PiEncProof::prove(input, secret, &(), &mut transcript(), &mut rng).unwrap();
        assert!(proof.verify(input, &(), &mut transcript()).is_err());
    }

    #[test]
    fn tampered_proofs_are_rejected() {
        let mut rng = init_testing();
        let dk = test_key(&mut rng);
        let pk = dk.encryption_key().clone();
        let setup = test_params(&mut rng);

        let m = random_positive_bn(&mut rng, &TestCurve::order());
        let (ciphertext, nonce) = pk.encrypt(&mut rng, &m).unwrap();

        let input = CommonInput::new(setup.params(), &pk, &ciphertext);
        let secret = PiEncSecret::new(&m, &nonce);
        let mut proof: PiEncProof<TestCurve> =
            PiEncProof::prove(input, secret, &(), &mut transcript(), &mut rng).unwrap();
        proof.s1 = &proof.s1 + BigNumber::one();
        assert!(proof.verify(input, &(), &mut transcript()).is_err());
    }

    #[test]
    fn proof_is_bound_to_the_ciphertext() {
        let mut rng = init_testing();
        let dk = test_key(&mut rng);
        let pk = dk.encryption_key().clone();
        let setup = test_params(&mut rng);

        let m = random_positive_bn(&mut rng, &TestCurve::order());
        let (ciphertext, nonce) = pk.encrypt(&mut rng, &m).unwrap();
        let (other_ciphertext, _) = pk.encrypt(&mut rng, &m).unwrap();

        let input = CommonInput::new(setup.params(), &pk, &ciphertext);
        let secret = PiEncSecret::new(&m, &nonce);
        let proof: PiEncProof<TestCurve> =
            PiEncProof::prove(input, secret, &(), &mut transcript(), &mut rng).unwrap();

        let other_input = CommonInput::new(setup.params(), &pk, &other_ciphertext);
        assert!(proof.verify(other_input, &(), &mut transcript()).is_err());
    }
}
