//! Elliptic curve abstraction.
//!
//! The protocol suite runs over two curves: secp256k1 for ECDSA and
//! Edwards25519 for EdDSA. [`CurveTrait`] captures the group operations both
//! schemes need; [`EcdsaCurve`] adds the short-Weierstrass-only surface
//! (x-projection, verifying keys, DER-free signatures, recovery ids) that the
//! GG18 protocols use.

use crate::errors::Result;
use libpaillier::unknown_order::BigNumber;
use serde::{de::DeserializeOwned, Serialize};
use std::{fmt::Debug, ops::Add};
use zeroize::Zeroize;

/// Generic elliptic curve point.
///
/// Deserialization of an implementor must reject encodings that are not
/// canonical, off-curve, or outside the prime-order subgroup; the protocols
/// rely on this to validate peer-supplied points.
pub trait CurveTrait:
    'static
    + Clone
    + Copy
    + Debug
    + Send
    + Sync
    + Eq
    + PartialEq
    + Serialize
    + DeserializeOwned
    + Add<Output = Self>
    + Zeroize
{
    /// The type of scalars modulo the group order.
    type Scalar: ScalarTrait;

    /// The base point of the prime-order subgroup.
    fn generator() -> Self;

    /// The identity point, used to initialize point aggregations.
    fn identity() -> Self;

    /// The order of the prime-order subgroup.
    fn order() -> BigNumber;

    /// Multiply `self` by a [`Self::Scalar`].
    fn multiply_by_scalar(&self, scalar: &Self::Scalar) -> Self;

    /// Multiply `self` by a [`BigNumber`], which is first reduced into the
    /// scalar field. The intermediate scalar is wiped after use.
    fn multiply_by_bignum(&self, scalar: &BigNumber) -> Result<Self>;

    /// Multiply the generator by a [`BigNumber`] scalar.
    fn scale_generator(scalar: &BigNumber) -> Result<Self> {
        Self::generator().multiply_by_bignum(scalar)
    }

    /// Serialize the point in its canonical compressed encoding.
    fn to_bytes(self) -> Vec<u8>;

    /// Deserialize a point from its canonical compressed encoding,
    /// validating curve and subgroup membership.
    fn try_from_bytes(bytes: &[u8]) -> Result<Self>;

    /// Reduce a [`BigNumber`] into the scalar field (mod `q`, sign-aware).
    fn bn_to_scalar(x: &BigNumber) -> Result<Self::Scalar>;

    /// Lift a scalar back into a non-negative [`BigNumber`] below `q`.
    fn scalar_to_bn(x: &Self::Scalar) -> BigNumber;
}

/// Scalar field element.
pub trait ScalarTrait:
    'static
    + Clone
    + Copy
    + Debug
    + Send
    + Sync
    + Eq
    + PartialEq
    + Serialize
    + DeserializeOwned
    + Zeroize
{
    /// The zero scalar.
    fn zero() -> Self;

    /// The one scalar.
    fn one() -> Self;

    /// Add two scalars.
    fn add(&self, other: &Self) -> Self;

    /// Addition operator such that we can use += syntax.
    fn add_assign(&mut self, other: Self) {
        *self = self.add(&other);
    }

    /// Subtract two scalars.
    fn sub(&self, other: &Self) -> Self;

    /// Negate.
    fn negate(&self) -> Self;

    /// Multiply two scalars.
    fn mul(&self, other: &Self) -> Self;

    /// Invert, if nonzero.
    fn invert(&self) -> Option<Self>;

    /// True iff `self` is larger than half the group order.
    fn is_high(&self) -> bool;

    /// A uniformly random scalar.
    fn random<R: rand::RngCore + rand::CryptoRng>(rng: &mut R) -> Self;

    /// Canonical byte encoding.
    fn to_bytes(&self) -> Vec<u8>;
}

/// The extra surface ECDSA needs from its curve.
pub trait EcdsaCurve: CurveTrait {
    /// The verifying key corresponding to a full public-key point.
    type VerifyingKey: VerifyingKeyTrait<C = Self>;

    /// The DER-free `(r, s)` signature type.
    type EcdsaSignature: SignatureTrait;

    /// The x-coordinate of the point, reduced into the scalar field.
    fn x_projection(&self) -> Result<Self::Scalar>;

    /// Parity of the affine y-coordinate (0 even, 1 odd). Feeds the
    /// recovery id.
    fn y_parity(&self) -> u8;
}

/// DER-free ECDSA signature.
pub trait SignatureTrait: Clone + Copy + Debug + PartialEq {
    /// Create a signature from the two scalars.
    fn from_scalars(r: &BigNumber, s: &BigNumber) -> Result<Self>
    where
        Self: Sized;

    /// Big-endian bytes of `r`.
    fn r_bytes(&self) -> Vec<u8>;

    /// Big-endian bytes of `s`.
    fn s_bytes(&self) -> Vec<u8>;
}

/// Verifying key derived from a sum of public key shares.
pub trait VerifyingKeyTrait: Clone + Copy + Debug + Send + Sync + Eq + PartialEq {
    /// The curve associated with this verifying key.
    type C: EcdsaCurve;

    /// Create a verifying key from a curve point.
    fn from_point(point: Self::C) -> Result<Self>;

    /// Verify the signature against a prehashed message digest.
    fn verify_prehash(
        &self,
        digest: &[u8],
        signature: &<Self::C as EcdsaCurve>::EcdsaSignature,
    ) -> Result<()>;
}

/// Default curve type used by the ECDSA test suites.
#[cfg(test)]
pub(crate) type TestCurve = crate::k256::K256;
