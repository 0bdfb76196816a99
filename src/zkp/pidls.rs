//! Discrete-log-with-slack proof.
//!
//! Binds a curve point `Q = k·R` to a Paillier ciphertext `K = Enc(k)`,
//! with the slack range guarantee `k < q³`. The signing protocol uses it in
//! round five: every signer publishes `R^{kᵢ}` and proves it consistent with
//! the ciphertext it opened the protocol with, so that `∏ R^{kᵢ} = G` can be
//! checked before any signature share is revealed, and a signer that lied
//! about its δ-contribution is identified rather than discovered after a
//! failed signature.

use crate::{
    curve::CurveTrait,
    errors::{InternalError, Result},
    paillier::{Ciphertext, EncryptionKey, Nonce},
    ring_pedersen::RingPedersenParams,
    utils::{
        positive_challenge_from_transcript, random_bn_in_z_star, random_positive_bn,
        within_interval,
    },
    zkp::{append_context, ProofContext},
};
use libpaillier::unknown_order::BigNumber;
use merlin::Transcript;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::error;

/// The public statement: `ciphertext` encrypts the discrete log of `q_point`
/// with respect to `r_point`, and that discrete log is below `q³`.
#[derive(Copy, Clone)]
pub(crate) struct CommonInput<'a, C: CurveTrait> {
    setup: &'a RingPedersenParams,
    prover_pk: &'a EncryptionKey,
    ciphertext: &'a Ciphertext,
    r_point: &'a C,
    q_point: &'a C,
}

impl<'a, C: CurveTrait> CommonInput<'a, C> {
    pub(crate) fn new(
        setup: &'a RingPedersenParams,
        prover_pk: &'a EncryptionKey,
        ciphertext: &'a Ciphertext,
        r_point: &'a C,
        q_point: &'a C,
    ) -> Self {
        Self {
            setup,
            prover_pk,
            ciphertext,
            r_point,
            q_point,
        }
    }
}

/// The prover's witness.
#[derive(Copy, Clone)]
pub(crate) struct PiDlsSecret<'a> {
    k: &'a BigNumber,
    nonce: &'a Nonce,
}

impl<'a> PiDlsSecret<'a> {
    pub(crate) fn new(k: &'a BigNumber, nonce: &'a Nonce) -> Self {
        Self { k, nonce }
    }
}

/// Proof that a point's discrete log matches an encrypted value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PiDlsProof<C: CurveTrait> {
    z: BigNumber,
    #[serde(bound(deserialize = "C: CurveTrait"))]
    u1: C,
    u2: BigNumber,
    u3: BigNumber,
    s1: BigNumber,
    s2: BigNumber,
    s3: BigNumber,
}

impl<C: CurveTrait> PiDlsProof<C> {
    #[allow(clippy::too_many_arguments)]
    fn challenge(
        transcript: &mut Transcript,
        context: &impl ProofContext,
        input: &CommonInput<C>,
        z: &BigNumber,
        u1: &C,
        u2: &BigNumber,
        u3: &BigNumber,
    ) -> Result<BigNumber> {
        append_context(transcript, b"PiDlsProof context", context)?;
        transcript.append_message(b"prover modulus", &input.prover_pk.modulus().to_bytes());
        transcript.append_message(b"setup modulus", &input.setup.modulus().to_bytes());
        transcript.append_message(b"ciphertext", &input.ciphertext.as_bn().to_bytes());
        transcript.append_message(b"R", &input.r_point.to_bytes());
        transcript.append_message(b"Q", &input.q_point.to_bytes());
        transcript.append_message(b"z", &z.to_bytes());
        transcript.append_message(b"u1", &u1.to_bytes());
        transcript.append_message(b"u2", &u2.to_bytes());
        transcript.append_message(b"u3", &u3.to_bytes());
        positive_challenge_from_transcript(transcript, &C::order())
    }

    pub(crate) fn prove<R: RngCore + CryptoRng>(
        input: CommonInput<C>,
        secret: PiDlsSecret,
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
        let rho = random_positive_bn(rng, &(&q * n_tilde));
        let rho_prime = random_positive_bn(rng, &(&q3 * n_tilde));

        let z = input.setup.commit(secret.k, &rho);
        let u1 = input.r_point.multiply_by_bignum(&alpha)?;
        let gamma_base = (BigNumber::one() + n) % &nn;
        let u2 = gamma_base
            .modpow(&alpha, &nn)
            .modmul(&beta.modpow(n, &nn), &nn);
        let u3 = input.setup.commit(&alpha, &rho_prime);

        let e = Self::challenge(transcript, context, &input, &z, &u1, &u2, &u3)?;

        let s1 = &e * secret.k + &alpha;
        let s2 = secret.nonce.modpow(&e, n).modmul(&beta, n);
        let s3 = &e * &rho + &rho_prime;

        Ok(Self {
            z,
            u1,
            u2,
            u3,
            s1,
            s2,
            s3,
        })
    }

    pub(crate) fn verify(
        &self,
        input: CommonInput<C>,
        context: &impl ProofContext,
        transcript: &mut Transcript,
    ) -> Result<()> {
        let q = C::order();
        let q3 = &q * &q * &q;
        let n = input.prover_pk.modulus();
        let nn = input.prover_pk.modulus_squared();
        let n_tilde = input.setup.modulus();

        if !within_interval(&self.z, n_tilde)
            || !within_interval(&self.u2, &nn)
            || !within_interval(&self.u3, n_tilde)
            || !within_interval(&self.s2, n)
            || self.s3 < BigNumber::zero()
            || self.u2.gcd(&nn) != BigNumber::one()
            || self.s2.gcd(n) != BigNumber::one()
        {
            error!("Consistency proof element out of range");
            return Err(InternalError::unattributed());
        }
        if !within_interval(&self.s1, &q3) {
            error!("Consistency proof response exceeds the q³ bound");
            return Err(InternalError::unattributed());
        }

        let e = Self::challenge(
            transcript,
            context,
            &input,
            &self.z,
            &self.u1,
            &self.u2,
            &self.u3,
        )?;

        // s1·R == u1 + e·Q
        let lhs = input.r_point.multiply_by_bignum(&self.s1)?;
        let rhs = self.u1 + input.q_point.multiply_by_bignum(&e)?;
        if lhs != rhs {
            error!("Consistency proof point equation failed");
            return Err(InternalError::unattributed());
        }

        // (1+N)^s1 · s2^N == u2 · K^e (mod N²)
        let gamma_base = (BigNumber::one() + n) % &nn;
        let lhs = gamma_base
            .modpow(&self.s1, &nn)
            .modmul(&self.s2.modpow(n, &nn), &nn);
        let rhs = self
            .u2
            .modmul(&input.ciphertext.as_bn().modpow(&e, &nn), &nn);
        if lhs != rhs {
            error!("Consistency proof ciphertext equation failed");
            return Err(InternalError::unattributed());
        }

        // h1^s1 h2^s3 == u3 · z^e (mod Ñ)
        let lhs = input.setup.commit(&self.s1, &self.s3);
        let rhs = self.u3.modmul(&self.z.modpow(&e, n_tilde), n_tilde);
        if lhs != rhs {
            error!("Consistency proof commitment equation failed");
            return Err(InternalError::unattributed());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        curve::{ScalarTrait, TestCurve},
        paillier::tests::test_key,
        ring_pedersen::tests::test_params,
        utils::{random_positive_bn, testing::init_testing},
    };

    fn transcript() -> Transcript {
        Transcript::new(b"PiDlsProof test")
    }

    #[test]
    fn honest_proof_verifies() {
        let mut rng = init_testing();
        let dk = test_key(&mut rng);
        let pk = dk.encryption_key().clone();
        let setup = test_params(&mut rng);

        let k = random_positive_bn(&mut rng, &TestCurve::order());
        let (ciphertext, nonce) = pk.encrypt(&mut rng, &k).unwrap();

        let r_scalar = <TestCurve as CurveTrait>::Scalar::random(&mut rng);
        let r_point = TestCurve::generator().multiply_by_scalar(&r_scalar);
        let q_point = r_point.multiply_by_bignum(&k).unwrap();

        let input = CommonInput::new(setup.params(), &pk, &ciphertext, &r_point, &q_point);
        let secret = PiDlsSecret::new(&k, &nonce);
        let proof = PiDlsProof::prove(input, secret, &(), &mut transcript(), &mut rng).unwrap();
        assert!(proof.verify(input, &(), &mut transcript()).is_ok());
    }

    #[test]
    fn mismatched_point_is_rejected() {
        let mut rng = init_testing();
        let dk = test_key(&mut rng);
        let pk = dk.encryption_key().clone();
        let setup = test_params(&mut rng);

        let k = random_positive_bn(&mut rng, &TestCurve::order());
        let (ciphertext, nonce) = pk.encrypt(&mut rng, &k).unwrap();

        let r_scalar = <TestCurve as CurveTrait>::Scalar::random(&mut rng);
        let r_point = TestCurve::generator().multiply_by_scalar(&r_scalar);
        // Q formed with a different exponent than the ciphertext's plaintext.
        let q_point = r_point
            .multiply_by_bignum(&(&k + BigNumber::one()))
            .unwrap();

        let input = CommonInput::new(setup.params(), &pk, &ciphertext, &r_point, &q_point);
        let secret = PiDlsSecret::new(&k, &nonce);
        let proof = PiDlsProof::prove(input, secret, &(), &mut transcript(), &mut rng).unwrap();
        assert!(proof.verify(input, &(), &mut transcript()).is_err());
    }
}
