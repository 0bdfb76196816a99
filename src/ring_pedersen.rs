//! Ring-Pedersen commitment parameters.
//!
//! Each party publishes an auxiliary RSA modulus `Ñ` together with two group
//! elements `h1, h2` satisfying `h1 = h2^λ mod Ñ`. Range and factorization
//! proofs commit to their secrets as `h1^a · h2^b mod Ñ`. The parameters ship
//! with a proof (`PiPrmProof`) that `h1` really lies in the subgroup
//! generated by `h2`; accepting unproven parameters would let a malicious
//! verifier break the soundness of every proof built on them.

use crate::{
    errors::{InternalError, Result},
    parameters::{MIN_MODULUS_BITS, PRIME_BITS, SOUNDNESS},
    utils::{
        bit_length, challenge_bits_from_transcript, random_bn_in_z_star, random_positive_bn,
        within_interval,
    },
};
use libpaillier::unknown_order::BigNumber;
use merlin::Transcript;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::error;

/// Public ring-Pedersen parameters `(Ñ, h1, h2)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingPedersenParams {
    n_tilde: BigNumber,
    h1: BigNumber,
    h2: BigNumber,
}

impl RingPedersenParams {
    /// The auxiliary modulus `Ñ`.
    pub(crate) fn modulus(&self) -> &BigNumber {
        &self.n_tilde
    }

    pub(crate) fn h2(&self) -> &BigNumber {
        &self.h2
    }

    /// Commit to `a` with blinding exponent `b`: `h1^a · h2^b mod Ñ`.
    ///
    /// Exponents must be non-negative.
    pub(crate) fn commit(&self, a: &BigNumber, b: &BigNumber) -> BigNumber {
        self.h1
            .modpow(a, &self.n_tilde)
            .modmul(&self.h2.modpow(b, &self.n_tilde), &self.n_tilde)
    }
}

/// Proof that `h1 ∈ <h2>` modulo `Ñ`.
///
/// An iterated Schnorr-style argument: [`SOUNDNESS`] commitments
/// `A_i = h2^{a_i}`, one challenge bit each, responses `z_i = a_i + e_i·λ`
/// reduced modulo `φ(Ñ)`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct PiPrmProof {
    commitments: Vec<BigNumber>,
    responses: Vec<BigNumber>,
}

/// Ring-Pedersen parameters bundled with their subgroup proof.
///
/// The proof is produced at generation time and must be (re-)verified
/// whenever the parameters arrive from a peer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerifiedRingPedersen {
    params: RingPedersenParams,
    proof: PiPrmProof,
}

impl PartialEq for VerifiedRingPedersen {
    fn eq(&self, other: &Self) -> bool {
        self.params == other.params
    }
}
impl Eq for VerifiedRingPedersen {}

impl VerifiedRingPedersen {
    /// Generate fresh parameters from two random safe primes.
    pub(crate) fn gen<R: RngCore + CryptoRng>(rng: &mut R) -> Result<Self> {
        let p = crate::paillier::prime_gen::get_random_safe_prime(rng)?;
        let q = crate::paillier::prime_gen::get_random_safe_prime(rng)?;
        Self::from_primes(rng, &p, &q)
    }

    /// Generate parameters from a known safe-prime pair.
    pub(crate) fn from_primes<R: RngCore + CryptoRng>(
        rng: &mut R,
        p: &BigNumber,
        q: &BigNumber,
    ) -> Result<Self> {
        if p == q || bit_length(p) != PRIME_BITS || bit_length(q) != PRIME_BITS {
            error!("Ring-Pedersen factors must be distinct safe primes of the configured size");
            return Err(InternalError::InternalInvariantFailed);
        }
        let n_tilde = p * q;
        let totient = (p - 1) * (q - 1);

        // h2 is a random quadratic residue, h1 = h2^λ.
        let r = random_bn_in_z_star(rng, &n_tilde)?;
        let h2 = r.modmul(&r, &n_tilde);
        let lambda = random_positive_bn(rng, &totient);
        let h1 = h2.modpow(&lambda, &n_tilde);

        let params = RingPedersenParams { n_tilde, h1, h2 };
        let proof = PiPrmProof::prove(rng, &params, &lambda, &totient)?;
        Ok(Self { params, proof })
    }

    /// The public parameters.
    pub(crate) fn params(&self) -> &RingPedersenParams {
        &self.params
    }

    /// Validate parameters received from a peer.
    pub(crate) fn verify(&self) -> Result<()> {
        let n = &self.params.n_tilde;
        if bit_length(n) < MIN_MODULUS_BITS {
            error!("Ring-Pedersen modulus is too short");
            return Err(InternalError::unattributed());
        }
        for h in [&self.params.h1, &self.params.h2] {
            if !within_interval(h, n)
                || h <= &BigNumber::one()
                || h.gcd(n) != BigNumber::one()
            {
                error!("Ring-Pedersen generator is out of range");
                return Err(InternalError::unattributed());
            }
        }
        if self.params.h1 == self.params.h2 {
            error!("Ring-Pedersen generators must be distinct");
            return Err(InternalError::unattributed());
        }
        self.proof.verify(&self.params)
    }
}

impl PiPrmProof {
    fn transcript(params: &RingPedersenParams, commitments: &[BigNumber]) -> Result<Transcript> {
        let mut transcript = Transcript::new(b"PiPrmProof");
        transcript.append_message(b"n_tilde", &params.n_tilde.to_bytes());
        transcript.append_message(b"h1", &params.h1.to_bytes());
        transcript.append_message(b"h2", &params.h2.to_bytes());
        transcript.append_message(b"commitments", &serialize!(&commitments)?);
        Ok(transcript)
    }

    fn prove<R: RngCore + CryptoRng>(
        rng: &mut R,
        params: &RingPedersenParams,
        lambda: &BigNumber,
        totient: &BigNumber,
    ) -> Result<Self> {
        let secrets: Vec<BigNumber> = (0..SOUNDNESS)
            .map(|_| random_positive_bn(rng, totient))
            .collect();
        let commitments: Vec<BigNumber> = secrets
            .iter()
            .map(|a| params.h2.modpow(a, &params.n_tilde))
            .collect();

        let mut transcript = Self::transcript(params, &commitments)?;
        let challenges = challenge_bits_from_transcript(&mut transcript, SOUNDNESS);

        let responses = secrets
            .iter()
            .zip(challenges.iter())
            .map(|(a, e)| match e {
                true => a.modadd(lambda, totient),
                false => a.clone(),
            })
            .collect();

        Ok(Self {
            commitments,
            responses,
        })
    }

    fn verify(&self, params: &RingPedersenParams) -> Result<()> {
        if self.commitments.len() != SOUNDNESS || self.responses.len() != SOUNDNESS {
            error!("Ring-Pedersen proof has the wrong number of rounds");
            return Err(InternalError::unattributed());
        }
        let n = &params.n_tilde;
        for a in self.commitments.iter().chain(self.responses.iter()) {
            if !within_interval(a, &(n * n)) {
                error!("Ring-Pedersen proof element is out of range");
                return Err(InternalError::unattributed());
            }
        }

        let mut transcript = Self::transcript(params, &self.commitments)?;
        let challenges = challenge_bits_from_transcript(&mut transcript, SOUNDNESS);

        for ((commitment, z), e) in self
            .commitments
            .iter()
            .zip(self.responses.iter())
            .zip(challenges.iter())
        {
            let lhs = params.h2.modpow(z, n);
            let rhs = match e {
                true => commitment.modmul(&params.h1, n),
                false => commitment % n,
            };
            if lhs != rhs {
                error!("Ring-Pedersen subgroup proof failed to verify");
                return Err(InternalError::unattributed());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{paillier::prime_gen, utils::testing::init_testing};

    pub(crate) fn test_params<R: RngCore + CryptoRng>(rng: &mut R) -> VerifiedRingPedersen {
        let (p, q) = prime_gen::get_prime_pair_from_pool_insecure(rng).unwrap();
        VerifiedRingPedersen::from_primes(rng, &p, &q).unwrap()
    }

    #[test]
    fn generated_parameters_verify() {
        let mut rng = init_testing();
        let verified = test_params(&mut rng);
        assert!(verified.verify().is_ok());
    }

    #[test]
    fn tampered_parameters_fail() {
        let mut rng = init_testing();
        let mut verified = test_params(&mut rng);
        verified.params.h1 = verified.params.h1.modmul(
            &verified.params.h2,
            &verified.params.n_tilde,
        );
        assert!(verified.verify().is_err());
    }

    #[test]
    fn proof_is_bound_to_its_parameters() {
        let mut rng = init_testing();
        let first = test_params(&mut rng);
        let second = test_params(&mut rng);
        let frankenstein = VerifiedRingPedersen {
            params: first.params.clone(),
            proof: second.proof.clone(),
        };
        assert!(frankenstein.verify().is_err());
    }

    #[test]
    fn commitments_compose_multiplicatively() {
        let mut rng = init_testing();
        let verified = test_params(&mut rng);
        let params = verified.params();

        let a = random_positive_bn(&mut rng, params.modulus());
        let b = random_positive_bn(&mut rng, params.modulus());
        let c = random_positive_bn(&mut rng, params.modulus());
        let d = random_positive_bn(&mut rng, params.modulus());

        let lhs = params
            .commit(&a, &b)
            .modmul(&params.commit(&c, &d), params.modulus());
        let rhs = params.commit(&(&a + &c), &(&b + &d));
        assert_eq!(lhs, rhs);
    }
}
