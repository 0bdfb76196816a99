//! No-small-factor proof for a Paillier modulus.
//!
//! Proves knowledge of a factorization `N₀ = p·q` in which neither factor is
//! small. Soundness gives factor lower bounds of roughly
//! `2^(|N₀| - MASK_BITS)`; with the configured sizes that rules out every
//! modulus whose factorization would let a malicious party cheat the range
//! proofs built on it. Commitments live under the verifier's ring-Pedersen
//! parameters, so the proof is produced once per receiver.

use crate::{
    errors::{InternalError, Result},
    parameters::{PRIME_BITS, SOUNDNESS},
    ring_pedersen::RingPedersenParams,
    utils::{positive_challenge_from_transcript, random_positive_bn, within_interval},
    zkp::{append_context, Proof, ProofContext},
};
use libpaillier::unknown_order::BigNumber;
use merlin::Transcript;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::error;

/// Challenge size. Soundness error is `2^-FAC_CHALLENGE_BITS`.
const FAC_CHALLENGE_BITS: usize = 128;

/// Size of the masks for `e·p`: challenge plus factor plus statistical
/// hiding slack. The range checks on the responses are against this bound,
/// which is what determines the proven factor sizes.
const MASK_BITS: usize = FAC_CHALLENGE_BITS + PRIME_BITS + SOUNDNESS;

/// The public statement: the prover knows a balanced factorization of
/// `modulus`.
#[derive(Copy, Clone)]
pub(crate) struct CommonInput<'a> {
    setup: &'a RingPedersenParams,
    modulus: &'a BigNumber,
}

impl<'a> CommonInput<'a> {
    pub(crate) fn new(setup: &'a RingPedersenParams, modulus: &'a BigNumber) -> Self {
        Self { setup, modulus }
    }
}

/// The prover's witness: the factors themselves.
#[derive(Copy, Clone)]
pub(crate) struct PiFacSecret<'a> {
    p: &'a BigNumber,
    q: &'a BigNumber,
}

impl<'a> PiFacSecret<'a> {
    pub(crate) fn new(p: &'a BigNumber, q: &'a BigNumber) -> Self {
        Self { p, q }
    }
}

/// Proof of knowledge of a no-small-factor factorization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PiFacProof {
    p_commit: BigNumber,
    q_commit: BigNumber,
    a_commit: BigNumber,
    b_commit: BigNumber,
    t_commit: BigNumber,
    sigma: BigNumber,
    z1: BigNumber,
    z2: BigNumber,
    w1: BigNumber,
    w2: BigNumber,
    v: BigNumber,
}

impl PiFacProof {
    #[allow(clippy::too_many_arguments)]
    fn challenge(
        transcript: &mut Transcript,
        context: &impl ProofContext,
        input: &CommonInput,
        proof_fields: [&BigNumber; 6],
    ) -> Result<BigNumber> {
        append_context(transcript, b"PiFacProof context", context)?;
        transcript.append_message(b"modulus", &input.modulus.to_bytes());
        transcript.append_message(b"setup modulus", &input.setup.modulus().to_bytes());
        for (label, field) in [
            &b"P"[..],
            &b"Q"[..],
            &b"A"[..],
            &b"B"[..],
            &b"T"[..],
            &b"sigma"[..],
        ]
        .into_iter()
        .zip(proof_fields)
        {
            transcript.append_message(b"field", label);
            transcript.append_message(b"value", &field.to_bytes());
        }
        // One below the power of two keeps the bound's byte length at 16,
        // so the rejection sampling accepts almost every draw.
        let bound = (BigNumber::one() << FAC_CHALLENGE_BITS) - 1;
        positive_challenge_from_transcript(transcript, &bound)
    }
}

impl Proof for PiFacProof {
    type CommonInput<'a> = CommonInput<'a>;
    type ProverSecret<'a> = PiFacSecret<'a>;

    fn prove<R: RngCore + CryptoRng>(
        input: Self::CommonInput<'_>,
        secret: Self::ProverSecret<'_>,
        context: &impl ProofContext,
        transcript: &mut Transcript,
        rng: &mut R,
    ) -> Result<Self> {
        let n_tilde = input.setup.modulus();
        let mask_bound = BigNumber::one() << MASK_BITS;
        let blind_bound = n_tilde * (BigNumber::one() << SOUNDNESS);
        let wide_blind_bound = n_tilde * &mask_bound;
        let response_blind_bound =
            n_tilde * (BigNumber::one() << (MASK_BITS + FAC_CHALLENGE_BITS + SOUNDNESS));

        let alpha = random_positive_bn(rng, &mask_bound);
        let beta = random_positive_bn(rng, &mask_bound);
        let mu = random_positive_bn(rng, &blind_bound);
        let nu = random_positive_bn(rng, &blind_bound);
        let x = random_positive_bn(rng, &wide_blind_bound);
        let y = random_positive_bn(rng, &wide_blind_bound);
        let sigma_prime = random_positive_bn(rng, &wide_blind_bound);
        let r = random_positive_bn(rng, &response_blind_bound);

        // σ masks ν·p so that the third verification equation closes over
        // the committed Q rather than the raw factors.
        let sigma = &nu * secret.p + &sigma_prime;

        let p_commit = input.setup.commit(secret.p, &mu);
        let q_commit = input.setup.commit(secret.q, &nu);
        let a_commit = input.setup.commit(&alpha, &x);
        let b_commit = input.setup.commit(&beta, &y);
        let t_commit = q_commit
            .modpow(&alpha, n_tilde)
            .modmul(&input.setup.h2().modpow(&r, n_tilde), n_tilde);

        let e = Self::challenge(
            transcript,
            context,
            &input,
            [&p_commit, &q_commit, &a_commit, &b_commit, &t_commit, &sigma],
        )?;

        let z1 = &alpha + &e * secret.p;
        let z2 = &beta + &e * secret.q;
        let w1 = &x + &e * &mu;
        let w2 = &y + &e * &nu;
        let v = &r + &e * &sigma_prime;

        Ok(Self {
            p_commit,
            q_commit,
            a_commit,
            b_commit,
            t_commit,
            sigma,
            z1,
            z2,
            w1,
            w2,
            v,
        })
    }

    fn verify(
        self,
        input: Self::CommonInput<'_>,
        context: &impl ProofContext,
        transcript: &mut Transcript,
    ) -> Result<()> {
        let n_tilde = input.setup.modulus();
        // One extra bit of slack over the sampling bound covers the `e·p`
        // addition.
        let response_bound = BigNumber::one() << (MASK_BITS + 1);

        for commitment in [
            &self.p_commit,
            &self.q_commit,
            &self.a_commit,
            &self.b_commit,
            &self.t_commit,
        ] {
            if !within_interval(commitment, n_tilde) || commitment == &BigNumber::zero() {
                error!("Factorization proof commitment out of range");
                return Err(InternalError::unattributed());
            }
        }
        for response in [&self.z1, &self.z2, &self.w1, &self.w2, &self.v, &self.sigma] {
            if response < &BigNumber::zero() {
                error!("Factorization proof response is negative");
                return Err(InternalError::unattributed());
            }
        }
        // The factor-size assertion.
        if !within_interval(&self.z1, &response_bound) || !within_interval(&self.z2, &response_bound)
        {
            error!("Factorization proof response exceeds the size bound");
            return Err(InternalError::unattributed());
        }

        let e = Self::challenge(
            transcript,
            context,
            &input,
            [
                &self.p_commit,
                &self.q_commit,
                &self.a_commit,
                &self.b_commit,
                &self.t_commit,
                &self.sigma,
            ],
        )?;

        // h1^z1 h2^w1 == A · P^e (mod Ñ)
        let lhs = input.setup.commit(&self.z1, &self.w1);
        let rhs = self
            .a_commit
            .modmul(&self.p_commit.modpow(&e, n_tilde), n_tilde);
        if lhs != rhs {
            error!("Factorization proof: p-equation failed");
            return Err(InternalError::unattributed());
        }

        // h1^z2 h2^w2 == B · Q^e (mod Ñ)
        let lhs = input.setup.commit(&self.z2, &self.w2);
        let rhs = self
            .b_commit
            .modmul(&self.q_commit.modpow(&e, n_tilde), n_tilde);
        if lhs != rhs {
            error!("Factorization proof: q-equation failed");
            return Err(InternalError::unattributed());
        }

        // Q^z1 h2^v == T · (h1^N0 h2^σ)^e (mod Ñ)
        let lhs = self
            .q_commit
            .modpow(&self.z1, n_tilde)
            .modmul(&input.setup.h2().modpow(&self.v, n_tilde), n_tilde);
        let r_value = input.setup.commit(input.modulus, &self.sigma);
        let rhs = self
            .t_commit
            .modmul(&r_value.modpow(&e, n_tilde), n_tilde);
        if lhs != rhs {
            error!("Factorization proof: product equation failed");
            return Err(InternalError::unattributed());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        paillier::prime_gen,
        ring_pedersen::tests::test_params,
        utils::testing::init_testing,
    };

    fn transcript() -> Transcript {
        Transcript::new(b"PiFacProof test")
    }

    #[test]
    fn honest_proof_verifies() {
        let mut rng = init_testing();
        let setup = test_params(&mut rng);
        let (p, q) = prime_gen::get_prime_pair_from_pool_insecure(&mut rng).unwrap();
        let modulus = &p * &q;

        let input = CommonInput::new(setup.params(), &modulus);
        let secret = PiFacSecret::new(&p, &q);
        let proof = PiFacProof::prove(input, secret, &(), &mut transcript(), &mut rng).unwrap();
        assert!(proof.verify(input, &(), &mut transcript()).is_ok());
    }

    #[test]
    fn wrong_factors_fail() {
        let mut rng = init_testing();
        let setup = test_params(&mut rng);
        let (p, q) = prime_gen::get_prime_pair_from_pool_insecure(&mut rng).unwrap();
        let (p2, q2) = prime_gen::get_prime_pair_from_pool_insecure(&mut rng).unwrap();
        let modulus = &p * &q;

        let input = CommonInput::new(setup.params(), &modulus);
        let secret = PiFacSecret::new(&p2, &q2);
        let proof = PiFacProof::prove(input, secret, &(), &mut transcript(), &mut rng).unwrap();
        assert!(proof.verify(input, &(), &mut transcript()).is_err());
    }

    #[test]
    fn proof_is_bound_to_the_setup() {
        let mut rng = init_testing();
        let setup = test_params(&mut rng);
        let other_setup = test_params(&mut rng);
        let (p, q) = prime_gen::get_prime_pair_from_pool_insecure(&mut rng).unwrap();
        let modulus = &p * &q;

        let input = CommonInput::new(setup.params(), &modulus);
        let secret = PiFacSecret::new(&p, &q);
        let proof = PiFacProof::prove(input, secret, &(), &mut transcript(), &mut rng).unwrap();

        let other_input = CommonInput::new(other_setup.params(), &modulus);
        assert!(proof.verify(other_input, &(), &mut transcript()).is_err());
    }
}
