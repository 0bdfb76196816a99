//! Responder proofs for the multiplicative-to-additive subprotocol.
//!
//! The responder holds `b` and replies to the initiator's ciphertext
//! `c₁ = Enc_A(a)` with `c₂ = c₁^b · Enc_A(β')`. [`PiMtaProof`] proves that
//! `c₂` really was formed that way with `b < q³` and `β' < q⁷`;
//! [`PiMtaProofWc`] additionally ties `b` to a public point `B = b·G`, which
//! the signing protocol uses when `b` is a long-lived key share rather than
//! an ephemeral nonce.
//!
//! The `q³`/`q⁷` bounds must be held invariant: shrinking them breaks
//! soundness, expanding them breaks completeness.

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

/// The public statement shared by both proof variants.
///
/// `c1` is the initiator's ciphertext, `c2` the responder's reply, both under
/// the *initiator's* Paillier key; the ring-Pedersen parameters are the
/// verifier's (that is, the initiator's).
#[derive(Copy, Clone)]
pub(crate) struct CommonInput<'a> {
    setup: &'a RingPedersenParams,
    initiator_pk: &'a EncryptionKey,
    c1: &'a Ciphertext,
    c2: &'a Ciphertext,
}

impl<'a> CommonInput<'a> {
    pub(crate) fn new(
        setup: &'a RingPedersenParams,
        initiator_pk: &'a EncryptionKey,
        c1: &'a Ciphertext,
        c2: &'a Ciphertext,
    ) -> Self {
        Self {
            setup,
            initiator_pk,
            c1,
            c2,
        }
    }
}

/// The responder's witness.
#[derive(Copy, Clone)]
pub(crate) struct PiMtaSecret<'a> {
    b: &'a BigNumber,
    beta_prime: &'a BigNumber,
    nonce: &'a Nonce,
}

impl<'a> PiMtaSecret<'a> {
    pub(crate) fn new(b: &'a BigNumber, beta_prime: &'a BigNumber, nonce: &'a Nonce) -> Self {
        Self {
            b,
            beta_prime,
            nonce,
        }
    }
}

/// Core proof elements shared by the plain and with-check variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PiMtaProof {
    z: BigNumber,
    z_prime: BigNumber,
    t: BigNumber,
    v: BigNumber,
    w: BigNumber,
    s: BigNumber,
    s1: BigNumber,
    s2: BigNumber,
    t1: BigNumber,
    t2: BigNumber,
}

/// The with-check variant: also proves consistency with `B = b·G`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PiMtaProofWc<C: CurveTrait> {
    proof: PiMtaProof,
    #[serde(bound(deserialize = "C: CurveTrait"))]
    u: C,
}

struct Commitments {
    z: BigNumber,
    z_prime: BigNumber,
    t: BigNumber,
    v: BigNumber,
    w: BigNumber,
    alpha: BigNumber,
    rho: BigNumber,
    rho_prime: BigNumber,
    sigma: BigNumber,
    tau: BigNumber,
    beta: BigNumber,
    gamma: BigNumber,
}

impl PiMtaProof {
    fn commitments<R: RngCore + CryptoRng>(
        rng: &mut R,
        q: &BigNumber,
        input: &CommonInput,
        secret: &PiMtaSecret,
    ) -> Result<Commitments> {
        let q3 = q * q * q;
        let q7 = &q3 * &q3 * q;
        let n = input.initiator_pk.modulus();
        let nn = input.initiator_pk.modulus_squared();
        let n_tilde = input.setup.modulus();

        let alpha = random_positive_bn(rng, &q3);
        let rho = random_positive_bn(rng, &(q * n_tilde));
        let rho_prime = random_positive_bn(rng, &(&q3 * n_tilde));
        let sigma = random_positive_bn(rng, &(q * n_tilde));
        let tau = random_positive_bn(rng, &(&q3 * n_tilde));
        let beta = random_bn_in_z_star(rng, n)?;
        let gamma = random_positive_bn(rng, &q7);

        let z = input.setup.commit(secret.b, &rho);
        let z_prime = input.setup.commit(&alpha, &rho_prime);
        let t = input.setup.commit(secret.beta_prime, &sigma);
        // v = c1^alpha · (1+N)^gamma · beta^N mod N²
        let gamma_base = (BigNumber::one() + n) % &nn;
        let v = input
            .c1
            .as_bn()
            .modpow(&alpha, &nn)
            .modmul(&gamma_base.modpow(&gamma, &nn), &nn)
            .modmul(&beta.modpow(n, &nn), &nn);
        let w = input.setup.commit(&gamma, &tau);

        Ok(Commitments {
            z,
            z_prime,
            t,
            v,
            w,
            alpha,
            rho,
            rho_prime,
            sigma,
            tau,
            beta,
            gamma,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn challenge<C: CurveTrait>(
        transcript: &mut Transcript,
        context: &impl ProofContext,
        input: &CommonInput,
        point: Option<(&C, &C)>,
        z: &BigNumber,
        z_prime: &BigNumber,
        t: &BigNumber,
        v: &BigNumber,
        w: &BigNumber,
    ) -> Result<BigNumber> {
        append_context(transcript, b"PiMtaProof context", context)?;
        transcript.append_message(b"initiator modulus", &input.initiator_pk.modulus().to_bytes());
        transcript.append_message(b"setup modulus", &input.setup.modulus().to_bytes());
        transcript.append_message(b"c1", &input.c1.as_bn().to_bytes());
        transcript.append_message(b"c2", &input.c2.as_bn().to_bytes());
        if let Some((public_point, u)) = point {
            transcript.append_message(b"B", &public_point.to_bytes());
            transcript.append_message(b"u", &u.to_bytes());
        }
        transcript.append_message(b"z", &z.to_bytes());
        transcript.append_message(b"z_prime", &z_prime.to_bytes());
        transcript.append_message(b"t", &t.to_bytes());
        transcript.append_message(b"v", &v.to_bytes());
        transcript.append_message(b"w", &w.to_bytes());
        positive_challenge_from_transcript(transcript, &C::order())
    }

    fn respond(
        commitments: &Commitments,
        secret: &PiMtaSecret,
        e: &BigNumber,
        n: &BigNumber,
    ) -> Self {
        let s = secret
            .nonce
            .modpow(e, n)
            .modmul(&commitments.beta, n);
        let s1 = e * secret.b + &commitments.alpha;
        let s2 = e * &commitments.rho + &commitments.rho_prime;
        let t1 = e * secret.beta_prime + &commitments.gamma;
        let t2 = e * &commitments.sigma + &commitments.tau;

        Self {
            z: commitments.z.clone(),
            z_prime: commitments.z_prime.clone(),
            t: commitments.t.clone(),
            v: commitments.v.clone(),
            w: commitments.w.clone(),
            s,
            s1,
            s2,
            t1,
            t2,
        }
    }

    /// Range, interval, and unit sanity checks common to both variants.
    fn validate_elements(&self, q: &BigNumber, input: &CommonInput) -> Result<()> {
        let q3 = q * q * q;
        let q7 = &q3 * &q3 * q;
        let n = input.initiator_pk.modulus();
        let nn = input.initiator_pk.modulus_squared();
        let n_tilde = input.setup.modulus();

        if !within_interval(&self.z, n_tilde)
            || !within_interval(&self.z_prime, n_tilde)
            || !within_interval(&self.t, n_tilde)
            || !within_interval(&self.v, &nn)
            || !within_interval(&self.w, n_tilde)
            || !within_interval(&self.s, n)
            || self.s2 < BigNumber::zero()
            || self.t2 < BigNumber::zero()
        {
            error!("MtA responder proof element out of range");
            return Err(InternalError::unattributed());
        }
        if self.v.gcd(&nn) != BigNumber::one() || self.s.gcd(n) != BigNumber::one() {
            error!("MtA responder proof element shares a factor with the modulus");
            return Err(InternalError::unattributed());
        }
        // The range assertions: b < q³ and β' < q⁷.
        if !within_interval(&self.s1, &q3) || !within_interval(&self.t1, &q7) {
            error!("MtA responder proof violates the q³/q⁷ bounds");
            return Err(InternalError::unattributed());
        }
        Ok(())
    }

    /// The three verification equations shared by both variants.
    fn verify_equations(&self, e: &BigNumber, input: &CommonInput) -> Result<()> {
        let n = input.initiator_pk.modulus();
        let nn = input.initiator_pk.modulus_squared();
        let n_tilde = input.setup.modulus();

        // h1^s1 h2^s2 == z' · z^e (mod Ñ)
        let lhs = input.setup.commit(&self.s1, &self.s2);
        let rhs = self
            .z_prime
            .modmul(&self.z.modpow(e, n_tilde), n_tilde);
        if lhs != rhs {
            error!("MtA responder proof: b-commitment equation failed");
            return Err(InternalError::unattributed());
        }

        // c1^s1 · (1+N)^t1 · s^N == v · c2^e (mod N²)
        let gamma_base = (BigNumber::one() + n) % &nn;
        let lhs = input
            .c1
            .as_bn()
            .modpow(&self.s1, &nn)
            .modmul(&gamma_base.modpow(&self.t1, &nn), &nn)
            .modmul(&self.s.modpow(n, &nn), &nn);
        let rhs = self
            .v
            .modmul(&input.c2.as_bn().modpow(e, &nn), &nn);
        if lhs != rhs {
            error!("MtA responder proof: ciphertext equation failed");
            return Err(InternalError::unattributed());
        }

        // h1^t1 h2^t2 == w · t^e (mod Ñ)
        let lhs = input.setup.commit(&self.t1, &self.t2);
        let rhs = self.w.modmul(&self.t.modpow(e, n_tilde), n_tilde);
        if lhs != rhs {
            error!("MtA responder proof: β'-commitment equation failed");
            return Err(InternalError::unattributed());
        }
        Ok(())
    }

    /// Prove the plain (no-check) statement for curve `C`.
    pub(crate) fn prove_for_curve<C: CurveTrait, R: RngCore + CryptoRng>(
        input: CommonInput,
        secret: PiMtaSecret,
        context: &impl ProofContext,
        transcript: &mut Transcript,
        rng: &mut R,
    ) -> Result<Self> {
        let q = C::order();
        let commitments = Self::commitments(rng, &q, &input, &secret)?;
        let e = Self::challenge::<C>(
            transcript,
            context,
            &input,
            None,
            &commitments.z,
            &commitments.z_prime,
            &commitments.t,
            &commitments.v,
            &commitments.w,
        )?;
        Ok(Self::respond(
            &commitments,
            &secret,
            &e,
            input.initiator_pk.modulus(),
        ))
    }

    /// Verify the plain (no-check) statement for curve `C`.
    pub(crate) fn verify_for_curve<C: CurveTrait>(
        &self,
        input: CommonInput,
        context: &impl ProofContext,
        transcript: &mut Transcript,
    ) -> Result<()> {
        let q = C::order();
        self.validate_elements(&q, &input)?;
        let e = Self::challenge::<C>(
            transcript,
            context,
            &input,
            None,
            &self.z,
            &self.z_prime,
            &self.t,
            &self.v,
            &self.w,
        )?;
        self.verify_equations(&e, &input)
    }
}

impl<C: CurveTrait> PiMtaProofWc<C> {
    /// Prove the with-check statement: additionally ties `b` to
    /// `public_point = b·G`.
    pub(crate) fn prove<R: RngCore + CryptoRng>(
        input: CommonInput,
        public_point: &C,
        secret: PiMtaSecret,
        context: &impl ProofContext,
        transcript: &mut Transcript,
        rng: &mut R,
    ) -> Result<Self> {
        let q = C::order();
        let commitments = PiMtaProof::commitments(rng, &q, &input, &secret)?;
        let u = C::generator().multiply_by_bignum(&commitments.alpha)?;
        let e = PiMtaProof::challenge::<C>(
            transcript,
            context,
            &input,
            Some((public_point, &u)),
            &commitments.z,
            &commitments.z_prime,
            &commitments.t,
            &commitments.v,
            &commitments.w,
        )?;
        let proof = PiMtaProof::respond(&commitments, &secret, &e, input.initiator_pk.modulus());
        Ok(Self { proof, u })
    }

    /// Verify the with-check statement.
    pub(crate) fn verify(
        &self,
        input: CommonInput,
        public_point: &C,
        context: &impl ProofContext,
        transcript: &mut Transcript,
    ) -> Result<()> {
        let q = C::order();
        self.proof.validate_elements(&q, &input)?;
        let e = PiMtaProof::challenge::<C>(
            transcript,
            context,
            &input,
            Some((public_point, &self.u)),
            &self.proof.z,
            &self.proof.z_prime,
            &self.proof.t,
            &self.proof.v,
            &self.proof.w,
        )?;

        // s1·G == u + e·B
        let lhs = C::generator().multiply_by_bignum(&self.proof.s1)?;
        let rhs = self.u + public_point.multiply_by_bignum(&e)?;
        if lhs != rhs {
            error!("MtA responder proof: point consistency equation failed");
            return Err(InternalError::unattributed());
        }
        self.proof.verify_equations(&e, &input)
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
        Transcript::new(b"PiMtaProof test")
    }

    struct TestStatement {
        setup: crate::ring_pedersen::VerifiedRingPedersen,
        pk: EncryptionKey,
        c1: Ciphertext,
        c2: Ciphertext,
        b: BigNumber,
        beta_prime: BigNumber,
        nonce: Nonce,
    }

    fn test_statement<R: RngCore + CryptoRng>(rng: &mut R) -> TestStatement {
        let dk = test_key(rng);
        let pk = dk.encryption_key().clone();
        let setup = test_params(rng);

        let q = TestCurve::order();
        // β' is drawn from q⁵ so the q⁷ proof bound has completeness slack.
        let q5 = &q * &q * &q * &q * &q;

        let a = random_positive_bn(rng, &q);
        let b = random_positive_bn(rng, &q);
        let beta_prime = random_positive_bn(rng, &q5);

        let (c1, _) = pk.encrypt(rng, &a).unwrap();
        let (enc_beta, nonce) = pk.encrypt(rng, &beta_prime).unwrap();
        let c2 = pk.multiply_and_add(&b, &c1, &enc_beta).unwrap();

        TestStatement {
            setup,
            pk,
            c1,
            c2,
            b,
            beta_prime,
            nonce,
        }
    }

    #[test]
    fn plain_proof_roundtrip_verifies() {
        let mut rng = init_testing();
        let st = test_statement(&mut rng);
        let input = CommonInput::new(st.setup.params(), &st.pk, &st.c1, &st.c2);
        let secret = PiMtaSecret::new(&st.b, &st.beta_prime, &st.nonce);

        let proof = PiMtaProof::prove_for_curve::<TestCurve, _>(
            input,
            secret,
            &(),
            &mut transcript(),
            &mut rng,
        )
        .unwrap();
        assert!(proof
            .verify_for_curve::<TestCurve>(input, &(), &mut transcript())
            .is_ok());
    }

    #[test]
    fn with_check_proof_roundtrip_verifies() {
        let mut rng = init_testing();
        let st = test_statement(&mut rng);
        let input = CommonInput::new(st.setup.params(), &st.pk, &st.c1, &st.c2);
        let secret = PiMtaSecret::new(&st.b, &st.beta_prime, &st.nonce);
        let public_point = TestCurve::generator().multiply_by_bignum(&st.b).unwrap();

        let proof = PiMtaProofWc::<TestCurve>::prove(
            input,
            &public_point,
            secret,
            &(),
            &mut transcript(),
            &mut rng,
        )
        .unwrap();
        assert!(proof
            .verify(input, &public_point, &(), &mut transcript())
            .is_ok());
    }

    #[test]
    fn with_check_rejects_the_wrong_point() {
        let mut rng = init_testing();
        let st = test_statement(&mut rng);
        let input = CommonInput::new(st.setup.params(), &st.pk, &st.c1, &st.c2);
        let secret = PiMtaSecret::new(&st.b, &st.beta_prime, &st.nonce);
        let public_point = TestCurve::generator().multiply_by_bignum(&st.b).unwrap();

        let proof = PiMtaProofWc::<TestCurve>::prove(
            input,
            &public_point,
            secret,
            &(),
            &mut transcript(),
            &mut rng,
        )
        .unwrap();

        let wrong = TestCurve::generator()
            .multiply_by_bignum(&(&st.b + BigNumber::one()))
            .unwrap();
        assert!(proof.verify(input, &wrong, &(), &mut transcript()).is_err());
    }

    #[test]
    fn tampered_responses_are_rejected() {
        let mut rng = init_testing();
        let st = test_statement(&mut rng);
        let input = CommonInput::new(st.setup.params(), &st.pk, &st.c1, &st.c2);
        let secret = PiMtaSecret::new(&st.b, &st.beta_prime, &st.nonce);

        let mut proof = PiMtaProof::prove_for_curve::<TestCurve, _>(
            input,
            secret,
            &(),
            &mut transcript(),
            &mut rng,
        )
        .unwrap();
        proof.t1 = &proof.t1 + BigNumber::one();
        assert!(proof
            .verify_for_curve::<TestCurve>(input, &(), &mut transcript())
            .is_err());
    }
}
