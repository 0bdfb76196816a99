//! Proof that a modulus is a Blum-like integer.
//!
//! Proves that `N = p·q` with `p ≡ q ≡ 3 mod 4`, which gives the
//! quadratic-residue structure the other Paillier proofs rely on: exactly
//! one of the four twists `±y, ±w·y` of any unit `y` is a square, and every
//! square has fourth roots the prover can exhibit. The proof runs
//! [`SOUNDNESS`] independent iterations, each contributing one bit.

use crate::{
    errors::{InternalError, Result},
    parameters::SOUNDNESS,
    utils::{positive_challenge_from_transcript, random_positive_bn, within_interval},
    zkp::{append_context, Proof, ProofContext},
};
use libpaillier::unknown_order::BigNumber;
use merlin::Transcript;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::error;

/// The public statement: `modulus` is a product of two primes, each
/// congruent to 3 mod 4.
#[derive(Copy, Clone)]
pub(crate) struct CommonInput<'a> {
    modulus: &'a BigNumber,
}

impl<'a> CommonInput<'a> {
    pub(crate) fn new(modulus: &'a BigNumber) -> Self {
        Self { modulus }
    }
}

/// The prover's witness: the factors.
#[derive(Copy, Clone)]
pub(crate) struct PiModSecret<'a> {
    p: &'a BigNumber,
    q: &'a BigNumber,
}

impl<'a> PiModSecret<'a> {
    pub(crate) fn new(p: &'a BigNumber, q: &'a BigNumber) -> Self {
        Self { p, q }
    }
}

/// One iteration's response.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PiModResponse {
    /// A fourth root of the twisted challenge.
    x: BigNumber,
    /// Twist flag: negate the challenge.
    a: bool,
    /// Twist flag: multiply the challenge by `w`.
    b: bool,
    /// An `N`-th root of the challenge.
    z: BigNumber,
}

/// Proof that a modulus is a Blum-like integer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PiModProof {
    /// A unit with Jacobi symbol -1, fixed before the challenges.
    w: BigNumber,
    responses: Vec<PiModResponse>,
}

/// Jacobi symbol `(a / n)` for odd positive `n`.
pub(crate) fn jacobi(a: &BigNumber, n: &BigNumber) -> i8 {
    let zero = BigNumber::zero();
    let one = BigNumber::one();
    let two = &one + &one;
    let three = &two + &one;
    let four = &two + &two;
    let five = &four + &one;
    let eight = &four + &four;

    let mut a = a % n;
    let mut n = n.clone();
    let mut t: i8 = 1;
    while a != zero {
        while &a % &two == zero {
            a = a >> 1;
            let r = &n % &eight;
            if r == three || r == five {
                t = -t;
            }
        }
        std::mem::swap(&mut a, &mut n);
        if &a % &four == three && &n % &four == three {
            t = -t;
        }
        a = &a % &n;
    }
    if n == one {
        t
    } else {
        0
    }
}

/// Legendre symbol check: is `a` a nonzero square modulo the odd prime `p`?
fn is_quadratic_residue(a: &BigNumber, p: &BigNumber) -> bool {
    let exp = (p - 1) >> 1;
    a.modpow(&exp, p) == BigNumber::one()
}

/// Square root modulo a prime `p ≡ 3 mod 4`, assuming `a` is a residue.
fn sqrt_mod_prime(a: &BigNumber, p: &BigNumber) -> BigNumber {
    let exp = (p + 1) >> 2;
    a.modpow(&exp, p)
}

/// Combine residues mod `p` and mod `q` into a residue mod `p·q`.
fn crt(a_p: &BigNumber, a_q: &BigNumber, p: &BigNumber, q: &BigNumber) -> Result<BigNumber> {
    let p_inv = p.invert(q).ok_or_else(|| {
        error!("CRT moduli are not coprime");
        InternalError::InternalInvariantFailed
    })?;
    // Keep the difference non-negative before reducing.
    let a_p_mod_q = a_p % q;
    let diff = ((a_q + q) - &a_p_mod_q) % q;
    let diff = diff.modmul(&p_inv, q);
    Ok(a_p + p * diff)
}

impl PiModProof {
    /// Derive the per-iteration challenges. Both sides must call this with a
    /// transcript in the same state (context, modulus and `w` appended).
    fn challenges(
        transcript: &mut Transcript,
        modulus: &BigNumber,
    ) -> Result<Vec<BigNumber>> {
        (0..SOUNDNESS)
            .map(|_| positive_challenge_from_transcript(transcript, modulus))
            .collect()
    }

    fn bind_statement(
        transcript: &mut Transcript,
        context: &impl ProofContext,
        modulus: &BigNumber,
        w: &BigNumber,
    ) -> Result<()> {
        append_context(transcript, b"PiModProof context", context)?;
        transcript.append_message(b"modulus", &modulus.to_bytes());
        transcript.append_message(b"w", &w.to_bytes());
        Ok(())
    }

    /// A fourth root of `y` modulo `N = p·q`, assuming `y` is a square with
    /// square roots that are themselves squares adjustable per prime.
    fn fourth_root(
        y: &BigNumber,
        p: &BigNumber,
        q: &BigNumber,
    ) -> Result<BigNumber> {
        // First square root, adjusted so the result is again a residue
        // modulo each prime (for p ≡ 3 mod 4, exactly one of ±r is).
        let mut s_p = sqrt_mod_prime(&(y % p), p);
        if !is_quadratic_residue(&s_p, p) {
            s_p = p - &s_p;
        }
        let mut s_q = sqrt_mod_prime(&(y % q), q);
        if !is_quadratic_residue(&s_q, q) {
            s_q = q - &s_q;
        }
        // Second square root.
        let t_p = sqrt_mod_prime(&s_p, p);
        let t_q = sqrt_mod_prime(&s_q, q);
        crt(&t_p, &t_q, p, q)
    }
}

impl Proof for PiModProof {
    type CommonInput<'a> = CommonInput<'a>;
    type ProverSecret<'a> = PiModSecret<'a>;

    fn prove<R: RngCore + CryptoRng>(
        input: Self::CommonInput<'_>,
        secret: Self::ProverSecret<'_>,
        context: &impl ProofContext,
        transcript: &mut Transcript,
        rng: &mut R,
    ) -> Result<Self> {
        let n = input.modulus;
        let (p, q) = (secret.p, secret.q);
        let four = BigNumber::from_slice([4u8]);
        let three = BigNumber::from_slice([3u8]);
        if &(p * q) != n || p % &four != three || q % &four != three {
            error!("Blum modulus proof witness does not match the statement");
            return Err(InternalError::InternalInvariantFailed);
        }

        // Fix a unit with Jacobi symbol -1 before any challenge is drawn.
        let w = std::iter::repeat_with(|| random_positive_bn(rng, n))
            .take(crate::utils::CRYPTOGRAPHIC_RETRY_MAX)
            .find(|candidate| jacobi(candidate, n) == -1)
            .ok_or(InternalError::InternalInvariantFailed)?;

        Self::bind_statement(transcript, context, n, &w)?;
        let challenges = Self::challenges(transcript, n)?;

        // N^{-1} mod φ(N) exists because N shares no factor with φ(N).
        let totient = (p - 1) * (q - 1);
        let n_inv = n.invert(&totient).ok_or_else(|| {
            error!("Modulus is not invertible modulo its own totient");
            InternalError::InternalInvariantFailed
        })?;

        let responses = challenges
            .iter()
            .map(|y| {
                // Find the unique twist of y that is a quadratic residue.
                let mut chosen = None;
                for (a, b) in [(false, false), (false, true), (true, false), (true, true)] {
                    let mut candidate = y.clone();
                    if b {
                        candidate = candidate.modmul(&w, n);
                    }
                    if a {
                        candidate = (n - &candidate) % n;
                    }
                    if is_quadratic_residue(&(&candidate % p), p)
                        && is_quadratic_residue(&(&candidate % q), q)
                    {
                        chosen = Some((candidate, a, b));
                        break;
                    }
                }
                let (y_prime, a, b) = chosen.ok_or_else(|| {
                    error!("No twist of the challenge is a quadratic residue");
                    InternalError::InternalInvariantFailed
                })?;

                let x = Self::fourth_root(&y_prime, p, q)?;
                let z = y.modpow(&n_inv, n);
                Ok(PiModResponse { x, a, b, z })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { w, responses })
    }

    fn verify(
        self,
        input: Self::CommonInput<'_>,
        context: &impl ProofContext,
        transcript: &mut Transcript,
    ) -> Result<()> {
        let n = input.modulus;
        let one = BigNumber::one();
        let two = &one + &one;

        if n % &two == BigNumber::zero() || n <= &BigNumber::from_slice([1u8]) {
            error!("Blum modulus proof statement must be an odd composite");
            return Err(InternalError::unattributed());
        }
        if !within_interval(&self.w, n) || jacobi(&self.w, n) != -1 {
            error!("Blum modulus proof twist element is malformed");
            return Err(InternalError::unattributed());
        }
        if self.responses.len() != SOUNDNESS {
            error!("Blum modulus proof has the wrong number of rounds");
            return Err(InternalError::unattributed());
        }

        Self::bind_statement(transcript, context, n, &self.w)?;
        let challenges = Self::challenges(transcript, n)?;

        for (response, y) in self.responses.iter().zip(challenges.iter()) {
            if !within_interval(&response.x, n) || !within_interval(&response.z, n) {
                error!("Blum modulus proof response out of range");
                return Err(InternalError::unattributed());
            }
            // z^N == y (mod N): y has an N-th root.
            if response.z.modpow(n, n) != y % n {
                error!("Blum modulus proof N-th root check failed");
                return Err(InternalError::unattributed());
            }
            // x^4 == (-1)^a w^b y (mod N): the chosen twist has a 4th root.
            let mut y_prime = y.clone();
            if response.b {
                y_prime = y_prime.modmul(&self.w, n);
            }
            if response.a {
                y_prime = (n - &y_prime) % n;
            }
            let x2 = response.x.modmul(&response.x, n);
            let x4 = x2.modmul(&x2, n);
            if x4 != y_prime {
                error!("Blum modulus proof fourth-root check failed");
                return Err(InternalError::unattributed());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{paillier::prime_gen, utils::testing::init_testing};

    fn transcript() -> Transcript {
        Transcript::new(b"PiModProof test")
    }

    #[test]
    fn honest_proof_verifies() {
        let mut rng = init_testing();
        let (p, q) = prime_gen::get_prime_pair_from_pool_insecure(&mut rng).unwrap();
        let modulus = &p * &q;

        let input = CommonInput::new(&modulus);
        let secret = PiModSecret::new(&p, &q);
        let proof = PiModProof::prove(input, secret, &(), &mut transcript(), &mut rng).unwrap();
        assert!(proof.verify(input, &(), &mut transcript()).is_ok());
    }

    #[test]
    fn proof_for_the_wrong_modulus_fails() {
        let mut rng = init_testing();
        let (p, q) = prime_gen::get_prime_pair_from_pool_insecure(&mut rng).unwrap();
        let (p2, q2) = prime_gen::get_prime_pair_from_pool_insecure(&mut rng).unwrap();
        let modulus = &p * &q;
        let other_modulus = &p2 * &q2;

        let input = CommonInput::new(&modulus);
        let secret = PiModSecret::new(&p, &q);
        let proof = PiModProof::prove(input, secret, &(), &mut transcript(), &mut rng).unwrap();

        let other_input = CommonInput::new(&other_modulus);
        assert!(proof.verify(other_input, &(), &mut transcript()).is_err());
    }

    #[test]
    fn mismatched_witness_is_refused() {
        let mut rng = init_testing();
        let (p, q) = prime_gen::get_prime_pair_from_pool_insecure(&mut rng).unwrap();
        let (p2, q2) = prime_gen::get_prime_pair_from_pool_insecure(&mut rng).unwrap();
        let modulus = &p * &q;

        let input = CommonInput::new(&modulus);
        let secret = PiModSecret::new(&p2, &q2);
        assert!(PiModProof::prove(input, secret, &(), &mut transcript(), &mut rng).is_err());
    }

    #[test]
    fn jacobi_symbol_matches_known_values() {
        // (a / 7) for a = 1..6: 1, 1, -1, 1, -1, -1.
        let seven = BigNumber::from_slice([7u8]);
        let expected: [i8; 6] = [1, 1, -1, 1, -1, -1];
        for (a, want) in (1u8..=6).zip(expected) {
            assert_eq!(jacobi(&BigNumber::from_slice([a]), &seven), want);
        }
        // Shared factor gives 0.
        let fifteen = BigNumber::from_slice([15u8]);
        assert_eq!(jacobi(&BigNumber::from_slice([5u8]), &fifteen), 0);
    }
}
