//! Paillier encryption over safe-prime moduli.
//!
//! The scheme is additively homomorphic: multiplying two ciphertexts adds
//! their plaintexts, and raising a ciphertext to a constant multiplies its
//! plaintext by that constant. The signing protocol leans on both properties
//! for its multiplicative-to-additive conversion.

use crate::{
    errors::{CallerError, InternalError, Result},
    parameters::PRIME_BITS,
    utils::{bit_length, random_bn_in_z_star, within_interval, CRYPTOGRAPHIC_RETRY_MAX},
};
use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::{error, instrument};
use zeroize::Zeroize;

/// A nonce used for encryption, drawn from the units modulo `N`.
pub(crate) type Nonce = BigNumber;

/// A Paillier ciphertext.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ciphertext(pub(crate) BigNumber);

impl Ciphertext {
    pub(crate) fn as_bn(&self) -> &BigNumber {
        &self.0
    }
}

/// A public Paillier encryption key with modulus `N` and generator
/// `g = N + 1`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionKey {
    n: BigNumber,
}

impl EncryptionKey {
    pub(crate) fn from_modulus(n: BigNumber) -> Self {
        Self { n }
    }

    /// The public modulus `N`.
    pub fn modulus(&self) -> &BigNumber {
        &self.n
    }

    pub(crate) fn modulus_squared(&self) -> BigNumber {
        &self.n * &self.n
    }

    /// Encrypt `m ∈ [0, N)` with a fresh nonce, returning both.
    pub(crate) fn encrypt<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        m: &BigNumber,
    ) -> Result<(Ciphertext, Nonce)> {
        if !within_interval(m, &self.n) {
            error!("Plaintext is out of range for the modulus");
            Err(CallerError::BadInput)?;
        }
        let nonce = random_bn_in_z_star(rng, &self.n)?;
        let c = self.encrypt_with_nonce(m, &nonce)?;
        Ok((c, nonce))
    }

    /// Encrypt `m` with the given nonce: `(1 + mN) · rᴺ mod N²`.
    pub(crate) fn encrypt_with_nonce(&self, m: &BigNumber, nonce: &Nonce) -> Result<Ciphertext> {
        if !within_interval(m, &self.n) {
            error!("Plaintext is out of range for the modulus");
            Err(CallerError::BadInput)?;
        }
        let nn = self.modulus_squared();
        let one_plus_mn = (BigNumber::one() + m * &self.n) % &nn;
        let r_to_n = nonce.modpow(&self.n, &nn);
        Ok(Ciphertext(one_plus_mn.modmul(&r_to_n, &nn)))
    }

    /// Homomorphic addition: the returned ciphertext encrypts `m₁ + m₂`.
    pub(crate) fn add(&self, c1: &Ciphertext, c2: &Ciphertext) -> Ciphertext {
        let nn = self.modulus_squared();
        Ciphertext(c1.0.modmul(&c2.0, &nn))
    }

    /// Homomorphic multiply-and-add: the returned ciphertext encrypts
    /// `a·m₁ + m₂`, where `c₁` encrypts `m₁` and `c₂` encrypts `m₂`.
    pub(crate) fn multiply_and_add(
        &self,
        a: &BigNumber,
        c1: &Ciphertext,
        c2: &Ciphertext,
    ) -> Result<Ciphertext> {
        if a < &BigNumber::zero() {
            error!("Homomorphic coefficient must be non-negative");
            Err(CallerError::BadInput)?;
        }
        let nn = self.modulus_squared();
        Ok(Ciphertext(c1.0.modpow(a, &nn).modmul(&c2.0, &nn)))
    }

    /// True iff `c` is a well-formed ciphertext under this key.
    pub(crate) fn ciphertext_in_range(&self, c: &Ciphertext) -> bool {
        within_interval(&c.0, &self.modulus_squared()) && c.0 != BigNumber::zero()
    }
}

/// A private Paillier decryption key.
///
/// Holds the factorization of the modulus; it is wiped on drop and its
/// `Debug` output is redacted.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptionKey {
    p: BigNumber,
    q: BigNumber,
    lambda: BigNumber,
    mu: BigNumber,
    pk: EncryptionKey,
}

impl std::fmt::Debug for DecryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptionKey")
            .field("p", &"[redacted]")
            .field("q", &"[redacted]")
            .field("lambda", &"[redacted]")
            .field("mu", &"[redacted]")
            .field("pk", &self.pk)
            .finish()
    }
}

impl Zeroize for DecryptionKey {
    fn zeroize(&mut self) {
        // BigNumber offers no in-place wipe, so overwrite with zeros. This is
        // best-effort: previously freed limbs may survive on the heap.
        self.p = BigNumber::zero();
        self.q = BigNumber::zero();
        self.lambda = BigNumber::zero();
        self.mu = BigNumber::zero();
    }
}

impl Drop for DecryptionKey {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl DecryptionKey {
    /// Generate a fresh key from two random safe primes.
    #[instrument(skip_all, err(Debug))]
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Result<Self> {
        for _ in 0..CRYPTOGRAPHIC_RETRY_MAX {
            let p = prime_gen::get_random_safe_prime(rng)?;
            let q = prime_gen::get_random_safe_prime(rng)?;
            if Self::factors_are_acceptable(&p, &q) {
                return Self::from_primes(&p, &q);
            }
        }
        error!("Failed to sample an acceptable safe prime pair");
        Err(CallerError::RetryFailed)?
    }

    /// Assemble a key from a known safe-prime pair.
    pub(crate) fn from_primes(p: &BigNumber, q: &BigNumber) -> Result<Self> {
        if !Self::factors_are_acceptable(p, q) {
            Err(CallerError::BadInput)?;
        }
        let n = p * q;
        let p_minus_one = p - 1;
        let q_minus_one = q - 1;
        // λ = lcm(p-1, q-1) = (p-1)(q-1) / gcd(p-1, q-1).
        let gcd = p_minus_one.gcd(&q_minus_one);
        let lambda = (&p_minus_one * &q_minus_one) / gcd;
        let mu = lambda.invert(&n).ok_or_else(|| {
            error!("λ is not invertible modulo N; the primes are malformed");
            InternalError::InternalInvariantFailed
        })?;
        Ok(Self {
            p: p.clone(),
            q: q.clone(),
            lambda,
            mu,
            pk: EncryptionKey::from_modulus(n),
        })
    }

    fn factors_are_acceptable(p: &BigNumber, q: &BigNumber) -> bool {
        if p == q || bit_length(p) != PRIME_BITS || bit_length(q) != PRIME_BITS {
            return false;
        }
        // The factors must not be close enough for Fermat-style splitting.
        let diff = if p > q { p - q } else { q - p };
        bit_length(&diff) > PRIME_BITS / 2
    }

    /// Decrypt a ciphertext: `L(c^λ mod N²) · μ mod N`.
    pub(crate) fn decrypt(&self, c: &Ciphertext) -> Result<BigNumber> {
        let n = self.pk.modulus();
        let nn = self.pk.modulus_squared();
        if !self.pk.ciphertext_in_range(c) {
            error!("Ciphertext is out of range for the modulus");
            Err(CallerError::BadInput)?;
        }
        let l = (c.0.modpow(&self.lambda, &nn) - BigNumber::one()) / n;
        Ok(l.modmul(&self.mu, n))
    }

    /// The corresponding public key.
    pub fn encryption_key(&self) -> &EncryptionKey {
        &self.pk
    }

    /// The secret factorization, for the proofs about the modulus.
    pub(crate) fn primes(&self) -> (&BigNumber, &BigNumber) {
        (&self.p, &self.q)
    }
}

/// Safe-prime sampling.
pub(crate) mod prime_gen {
    use super::*;
    use rand::Rng;

    /// Sample a safe prime of [`PRIME_BITS`] bits.
    ///
    /// The underlying library drives its own entropy source; the retry
    /// budget bounds how long a pathological run can take.
    pub(crate) fn get_random_safe_prime<R: RngCore + CryptoRng>(
        _rng: &mut R,
    ) -> Result<BigNumber> {
        for _ in 0..CRYPTOGRAPHIC_RETRY_MAX {
            let p = BigNumber::safe_prime(PRIME_BITS);
            if bit_length(&p) == PRIME_BITS {
                return Ok(p);
            }
        }
        Err(CallerError::RetryFailed)?
    }

    /// Draw a distinct pair of safe primes from the pre-generated test pool.
    ///
    /// The pool is public, so any key built from it offers no security.
    pub(crate) fn get_prime_pair_from_pool_insecure<R: RngCore + CryptoRng>(
        rng: &mut R,
    ) -> Result<(BigNumber, BigNumber)> {
        let pool = &crate::safe_primes_512::SAFE_PRIMES;
        let i = rng.gen_range(0..pool.len());
        let j = std::iter::repeat_with(|| rng.gen_range(0..pool.len()))
            .find(|j| *j != i)
            .ok_or(InternalError::InternalInvariantFailed)?;
        Ok((prime_from_hex(pool[i]), prime_from_hex(pool[j])))
    }

    pub(crate) fn prime_from_hex(hex_str: &str) -> BigNumber {
        BigNumber::from_slice(hex::decode(hex_str).expect("prime pool contains valid hex"))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::utils::{random_positive_bn, testing::init_testing};

    pub(crate) fn test_key<R: RngCore + CryptoRng>(rng: &mut R) -> DecryptionKey {
        let (p, q) = prime_gen::get_prime_pair_from_pool_insecure(rng).unwrap();
        DecryptionKey::from_primes(&p, &q).unwrap()
    }

    #[test]
    fn encryption_roundtrips() {
        let mut rng = init_testing();
        let dk = test_key(&mut rng);
        let pk = dk.encryption_key().clone();

        for _ in 0..10 {
            let m = random_positive_bn(&mut rng, pk.modulus());
            let (c, _) = pk.encrypt(&mut rng, &m).unwrap();
            assert_eq!(dk.decrypt(&c).unwrap(), m);
        }
    }

    #[test]
    fn homomorphic_addition_holds() {
        let mut rng = init_testing();
        let dk = test_key(&mut rng);
        let pk = dk.encryption_key().clone();

        let m1 = random_positive_bn(&mut rng, pk.modulus());
        let m2 = random_positive_bn(&mut rng, pk.modulus());
        let (c1, _) = pk.encrypt(&mut rng, &m1).unwrap();
        let (c2, _) = pk.encrypt(&mut rng, &m2).unwrap();

        let sum = pk.add(&c1, &c2);
        let expected = m1.modadd(&m2, pk.modulus());
        assert_eq!(dk.decrypt(&sum).unwrap(), expected);
    }

    #[test]
    fn homomorphic_multiply_and_add_holds() {
        let mut rng = init_testing();
        let dk = test_key(&mut rng);
        let pk = dk.encryption_key().clone();

        let a = random_positive_bn(&mut rng, pk.modulus());
        let m1 = random_positive_bn(&mut rng, pk.modulus());
        let m2 = random_positive_bn(&mut rng, pk.modulus());
        let (c1, _) = pk.encrypt(&mut rng, &m1).unwrap();
        let (c2, _) = pk.encrypt(&mut rng, &m2).unwrap();

        let combined = pk.multiply_and_add(&a, &c1, &c2).unwrap();
        let expected = a.modmul(&m1, pk.modulus()).modadd(&m2, pk.modulus());
        assert_eq!(dk.decrypt(&combined).unwrap(), expected);
    }

    #[test]
    fn out_of_range_plaintexts_are_rejected() {
        let mut rng = init_testing();
        let dk = test_key(&mut rng);
        let pk = dk.encryption_key().clone();

        assert!(pk.encrypt(&mut rng, pk.modulus()).is_err());
        assert!(pk.encrypt(&mut rng, &-BigNumber::one()).is_err());
    }

    #[test]
    fn close_factors_are_rejected() {
        let p = prime_gen::prime_from_hex(crate::safe_primes_512::SAFE_PRIMES[0]);
        assert!(DecryptionKey::from_primes(&p, &p).is_err());
    }
}
