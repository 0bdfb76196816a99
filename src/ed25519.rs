//! Edwards25519 implementation of the curve abstraction.
//!
//! Points use the canonical RFC 8032 compressed encoding: 32 bytes of
//! little-endian Y with the parity of X in the high bit of the last byte.
//! Decoding validates canonicity and prime-order subgroup membership.

use crate::{
    curve::{CurveTrait, ScalarTrait},
    errors::{CallerError, InternalError, Result},
};
use curve25519_dalek::{
    constants::ED25519_BASEPOINT_POINT,
    edwards::{CompressedEdwardsY, EdwardsPoint},
    scalar::Scalar,
    traits::Identity,
};
use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::{Zeroize, Zeroizing};

/// Wrapper around [`EdwardsPoint`] with canonical serde and validation.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Zeroize)]
pub struct Ed25519(pub(crate) EdwardsPoint);

/// The group order `l = 2^252 + 27742317777372353535851937790883648493`.
const GROUP_ORDER_HEX: &str = "1000000000000000000000000000000014def9dea2f79cd65812631a5cf5d3ed";

pub(crate) fn ed25519_order() -> BigNumber {
    let bytes = hex::decode(GROUP_ORDER_HEX).expect("group order constant is valid hex");
    BigNumber::from_slice(bytes)
}

impl Ed25519 {
    fn decode(bytes: &[u8]) -> Result<Self> {
        let compressed = CompressedEdwardsY::from_slice(bytes).map_err(|_| {
            tracing::error!("Edwards point encoding must be exactly 32 bytes");
            CallerError::DeserializationFailed
        })?;
        let point = compressed.decompress().ok_or_else(|| {
            tracing::error!("Bytes do not encode a point on Edwards25519");
            InternalError::from(CallerError::DeserializationFailed)
        })?;
        // Reject non-canonical encodings and points outside the prime-order
        // subgroup.
        if point.compress().as_bytes() != compressed.as_bytes() || !point.is_torsion_free() {
            tracing::error!("Edwards point encoding is non-canonical or has torsion");
            Err(CallerError::DeserializationFailed)?;
        }
        Ok(Self(point))
    }
}

impl std::ops::Add for Ed25519 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Serialize for Ed25519 {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.compress().to_bytes().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Ed25519 {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bytes = <[u8; 32]>::deserialize(deserializer)?;
        Ed25519::decode(&bytes).map_err(|_| {
            serde::de::Error::custom("bytes do not encode a valid Edwards25519 point")
        })
    }
}

impl CurveTrait for Ed25519 {
    type Scalar = Scalar;

    fn generator() -> Self {
        Self(ED25519_BASEPOINT_POINT)
    }

    fn identity() -> Self {
        Self(EdwardsPoint::identity())
    }

    fn order() -> BigNumber {
        ed25519_order()
    }

    fn multiply_by_scalar(&self, scalar: &Self::Scalar) -> Self {
        Self(self.0 * scalar)
    }

    fn multiply_by_bignum(&self, scalar: &BigNumber) -> Result<Self> {
        let s = Zeroizing::new(Self::bn_to_scalar(scalar)?);
        Ok(self.multiply_by_scalar(&s))
    }

    fn to_bytes(self) -> Vec<u8> {
        self.0.compress().to_bytes().to_vec()
    }

    fn try_from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::decode(bytes)
    }

    fn bn_to_scalar(x: &BigNumber) -> Result<Self::Scalar> {
        let reduced = x % Self::order();
        let le = crate::utils::bn_to_le_bytes32(&reduced)?;
        let mut ret: Scalar = Option::from(Scalar::from_canonical_bytes(le)).ok_or_else(|| {
            tracing::error!("Failed to convert BigNumber into Edwards25519 scalar");
            InternalError::InternalInvariantFailed
        })?;

        if x < &BigNumber::zero() {
            ret = -ret;
        }
        Ok(ret)
    }

    fn scalar_to_bn(x: &Self::Scalar) -> BigNumber {
        crate::utils::bn_from_le_bytes(&x.to_bytes())
    }
}

impl ScalarTrait for Scalar {
    fn zero() -> Self {
        Scalar::ZERO
    }

    fn one() -> Self {
        Scalar::ONE
    }

    fn add(&self, other: &Self) -> Self {
        self + other
    }

    fn sub(&self, other: &Self) -> Self {
        self - other
    }

    fn negate(&self) -> Self {
        -self
    }

    fn mul(&self, other: &Self) -> Self {
        self * other
    }

    fn invert(&self) -> Option<Self> {
        if self == &Scalar::ZERO {
            None
        } else {
            Some(Scalar::invert(self))
        }
    }

    fn is_high(&self) -> bool {
        let half = ed25519_order() >> 1;
        Ed25519::scalar_to_bn(self) > half
    }

    fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Scalar::random(rng)
    }

    fn to_bytes(&self) -> Vec<u8> {
        Scalar::to_bytes(self).to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::testing::init_testing;

    #[test]
    fn point_byte_conversion_works() {
        let rng = &mut init_testing();
        let s = <Scalar as ScalarTrait>::random(rng);
        let point = Ed25519::generator().multiply_by_scalar(&s);
        let bytes = point.to_bytes();
        assert_eq!(bytes.len(), 32);
        assert_eq!(Ed25519::try_from_bytes(&bytes).unwrap(), point);
    }

    #[test]
    fn low_order_points_are_rejected() {
        // The canonical encoding of a small-order point (order 8, from the
        // standard torsion subgroup table).
        let low_order =
            hex::decode("c7176a703d4dd84fba3c0b760d10670f2a2053fa2c39ccc64ec7fd7792ac037a")
                .unwrap();
        assert!(Ed25519::try_from_bytes(&low_order).is_err());
    }

    #[test]
    fn identity_encoding_is_canonical() {
        let id = Ed25519::identity();
        let bytes = id.to_bytes();
        assert_eq!(bytes[0], 1);
        assert!(bytes[1..].iter().all(|&b| b == 0));
    }

    #[test]
    fn scalar_roundtrip_through_bn() {
        let rng = &mut init_testing();
        let s = <Scalar as ScalarTrait>::random(rng);
        let bn = Ed25519::scalar_to_bn(&s);
        assert_eq!(Ed25519::bn_to_scalar(&bn).unwrap(), s);
    }

    #[test]
    fn order_matches_basepoint() {
        let l = ed25519_order();
        // l * G must be the identity.
        let prod = Ed25519::generator().multiply_by_bignum(&l).unwrap();
        assert_eq!(prod, Ed25519::identity());
    }
}
