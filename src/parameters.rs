//! Statically-configured sizes for the cryptographic primitives.

/// Bit length of each Paillier and ring-Pedersen prime factor.
///
/// Both factors are safe primes of this size, so the moduli are twice as
/// long. 512-bit factors keep the test suite tractable; a production
/// deployment should raise this to at least 1024 bits.
pub(crate) const PRIME_BITS: usize = 512;

/// Minimum acceptable bit length for a peer's Paillier or ring-Pedersen
/// modulus. Anything shorter is rejected and the sender marked as a culprit.
pub(crate) const MIN_MODULUS_BITS: usize = 2 * PRIME_BITS - 1;

/// Statistical security parameter, in bits.
///
/// Iterated proofs (`pimod`, `piprm`) run this many rounds, each contributing
/// one bit of soundness.
pub(crate) const SOUNDNESS: usize = 80;
