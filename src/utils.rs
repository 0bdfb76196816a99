//! BigNumber sampling and encoding helpers shared across the protocol suite.

use crate::errors::{CallerError, InternalError, Result};
use libpaillier::unknown_order::BigNumber;
use merlin::Transcript;
use rand::{CryptoRng, Rng, RngCore};
use tracing::error;

/// Retry budget for randomized operations that can fail (rejection sampling,
/// drawing units, prime generation). Exhausting it surfaces as
/// [`CallerError::RetryFailed`].
pub(crate) const CRYPTOGRAPHIC_RETRY_MAX: usize = 500usize;

/// Returns `true` iff `0 <= x < bound`.
///
/// Used to validate scalars received from peers; a violation signals a
/// malicious sender.
pub(crate) fn within_interval(x: &BigNumber, bound: &BigNumber) -> bool {
    x >= &BigNumber::zero() && x < bound
}

/// Number of significant bits in `n`.
pub(crate) fn bit_length(n: &BigNumber) -> usize {
    let bytes = n.to_bytes();
    match bytes.first() {
        None => 0,
        Some(&b) if b == 0 => 0,
        Some(&b) => (bytes.len() - 1) * 8 + (8 - b.leading_zeros() as usize),
    }
}

/// Sample a number uniformly at random from the range `[0, n)`.
pub(crate) fn random_positive_bn<R: RngCore + CryptoRng>(rng: &mut R, n: &BigNumber) -> BigNumber {
    BigNumber::from_rng(n, rng)
}

/// Sample a number uniformly at random from the range `[-2^n, 2^n]`.
pub(crate) fn random_plusminus_by_size<R: RngCore + CryptoRng>(rng: &mut R, n: usize) -> BigNumber {
    let range = BigNumber::one() << n;
    // `from_rng()` samples the open interval, so add 1 to close it.
    let val = BigNumber::from_rng(&(&range + 1), rng);
    let is_positive: bool = rng.gen();
    match is_positive {
        true => val,
        false => -val,
    }
}

/// Generate a random `BigNumber` in the multiplicative group of integers
/// modulo `n`.
///
/// Note: in this application `n` is typically the product of two primes. If
/// the drawn element shares a factor with `n`, the caller has stumbled upon
/// the factorization of `n`; the chance is negligible and the element is
/// dropped anyway.
pub(crate) fn random_bn_in_z_star<R: RngCore + CryptoRng>(
    rng: &mut R,
    n: &BigNumber,
) -> Result<BigNumber> {
    std::iter::repeat_with(|| BigNumber::from_rng(n, rng))
        .take(CRYPTOGRAPHIC_RETRY_MAX)
        .find(|result| result != &BigNumber::zero() && result.gcd(n) == BigNumber::one())
        .ok_or(InternalError::CallingApplicationMistake(
            CallerError::RetryFailed,
        ))
}

/// Derive a deterministic pseudorandom value in `[0, n)` from the
/// [`Transcript`].
///
/// To avoid sampling bias the challenge is never reduced modulo `n`; the
/// transcript is re-queried until a value below `n` comes out. Each query
/// extends the transcript, so retries produce independent candidates.
pub(crate) fn positive_challenge_from_transcript(
    transcript: &mut Transcript,
    n: &BigNumber,
) -> Result<BigNumber> {
    let len = n.to_bytes().len();
    let mut t = vec![0u8; len];
    for _ in 0..CRYPTOGRAPHIC_RETRY_MAX {
        transcript.challenge_bytes(b"sampling randomness", t.as_mut_slice());
        let b = BigNumber::from_slice(t.as_slice());
        if &b < n {
            return Ok(b);
        }
    }
    Err(CallerError::RetryFailed)?
}

/// Draw `count` challenge bits from the [`Transcript`].
pub(crate) fn challenge_bits_from_transcript(
    transcript: &mut Transcript,
    count: usize,
) -> Vec<bool> {
    let mut bytes = vec![0u8; count.div_ceil(8)];
    transcript.challenge_bytes(b"sampling challenge bits", bytes.as_mut_slice());
    (0..count)
        .map(|i| (bytes[i / 8] >> (i % 8)) & 1 == 1)
        .collect()
}

/// Encode a non-negative value smaller than `2^256` as 32 little-endian
/// bytes. Values with high-order zero bytes round-trip losslessly.
pub(crate) fn bn_to_le_bytes32(x: &BigNumber) -> Result<[u8; 32]> {
    let be = x.to_bytes();
    if be.len() > 32 {
        error!("Value does not fit in 32 bytes");
        return Err(InternalError::InternalInvariantFailed);
    }
    let mut out = [0u8; 32];
    for (i, byte) in be.iter().rev().enumerate() {
        out[i] = *byte;
    }
    Ok(out)
}

/// Decode little-endian bytes into a non-negative value.
pub(crate) fn bn_from_le_bytes(bytes: &[u8]) -> BigNumber {
    let be: Vec<u8> = bytes.iter().rev().copied().collect();
    BigNumber::from_slice(&be)
}

/// Constant-time byte-slice equality.
///
/// Slices of different lengths compare unequal without inspecting contents.
pub(crate) fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

#[cfg(test)]
pub(crate) mod testing {
    use rand::{
        rngs::{OsRng, StdRng},
        Rng, SeedableRng,
    };
    use tracing_subscriber::EnvFilter;

    /// Returns an rng to be used for testing, and installs a tracing
    /// subscriber honoring `RUST_LOG`. The seed is printed to stderr so a
    /// failing run can be reproduced. This function is idempotent.
    pub(crate) fn init_testing() -> StdRng {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let mut seeder = OsRng;
        let seed = seeder.gen();
        eprintln!("Test rng seed (pass to StdRng::from_seed to reproduce): {seed:?}");
        StdRng::from_seed(seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::testing::init_testing;

    #[test]
    fn plusminus_sampling_spans_the_range() {
        let mut rng = init_testing();
        let mut max_len = 0;
        let num_bytes = 100;

        for _ in 0..1000 {
            let bn = random_plusminus_by_size(&mut rng, num_bytes * 8);
            let len = bn.to_bytes().len();
            if max_len < len {
                max_len = len;
            }
        }
        assert!(max_len > num_bytes - 2);
    }

    #[test]
    fn le_bytes_roundtrip_preserves_leading_zeros() {
        let small = BigNumber::from_slice([0x01, 0x02]);
        let le = bn_to_le_bytes32(&small).unwrap();
        assert_eq!(le[0], 0x02);
        assert_eq!(le[1], 0x01);
        assert!(le[2..].iter().all(|&b| b == 0));
        assert_eq!(bn_from_le_bytes(&le), small);

        // A value short enough that its top encoded bytes are zero.
        let mut rng = init_testing();
        let bound = BigNumber::one() << 240;
        let val = random_positive_bn(&mut rng, &bound);
        let le = bn_to_le_bytes32(&val).unwrap();
        assert_eq!(bn_from_le_bytes(&le), val);
    }

    #[test]
    fn interval_check_is_half_open() {
        let bound = BigNumber::from_slice([10]);
        assert!(within_interval(&BigNumber::zero(), &bound));
        assert!(within_interval(&BigNumber::from_slice([9]), &bound));
        assert!(!within_interval(&bound, &bound));
        assert!(!within_interval(&-BigNumber::one(), &bound));
    }

    #[test]
    fn bit_length_matches_definition() {
        assert_eq!(bit_length(&BigNumber::zero()), 0);
        assert_eq!(bit_length(&BigNumber::one()), 1);
        assert_eq!(bit_length(&BigNumber::from_slice([0xff])), 8);
        assert_eq!(bit_length(&(BigNumber::one() << 511)), 512);
    }

    #[test]
    fn transcript_challenges_land_below_the_bound() {
        let n = BigNumber::from_slice([0x0f, 0xff]);
        let mut transcript = merlin::Transcript::new(b"test");
        for _ in 0..50 {
            let c = positive_challenge_from_transcript(&mut transcript, &n).unwrap();
            assert!(within_interval(&c, &n));
        }
    }

    #[test]
    fn ct_eq_rejects_length_and_content_mismatches() {
        assert!(ct_eq(b"abc", b"abc"));
        assert!(!ct_eq(b"abc", b"abd"));
        assert!(!ct_eq(b"abc", b"abcd"));
        assert!(ct_eq(b"", b""));
    }
}
