//! secp256k1 implementation of the curve abstraction.

use crate::{
    curve::{CurveTrait, EcdsaCurve, ScalarTrait, SignatureTrait, VerifyingKeyTrait},
    errors::{
        CallerError,
        InternalError::{self, InternalInvariantFailed},
        Result,
    },
};
use generic_array::GenericArray;
use k256::{
    ecdsa::{signature::hazmat::PrehashVerifier, VerifyingKey},
    elliptic_curve::{
        bigint::Encoding, group::GroupEncoding, point::AffineCoordinates, scalar::IsHigh,
        AffinePoint, Curve, Field, PrimeField,
    },
    Scalar as K256Scalar,
};
use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::Debug;
use tracing::error;
use zeroize::{Zeroize, Zeroizing};

/// Wrapper around [`k256::ProjectivePoint`] so that we can define our own
/// serialization/deserialization for it.
///
/// Note that this type derives [`Debug`]; if a [`K256`] is used in a private
/// type, `Debug` should be manually implemented with the field of this type
/// explicitly redacted.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Zeroize)]
pub struct K256(pub(crate) k256::ProjectivePoint);

impl K256 {
    pub(crate) const GENERATOR: Self = K256(k256::ProjectivePoint::GENERATOR);
    pub(crate) const IDENTITY: Self = K256(k256::ProjectivePoint::IDENTITY);
}

impl std::ops::Add for K256 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Serialize for K256 {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let afp = AffinePoint::<k256::Secp256k1>::from(self.0);
        afp.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for K256 {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let p = AffinePoint::<k256::Secp256k1>::deserialize(deserializer)?;
        Ok(Self(p.into()))
    }
}

pub(crate) fn k256_order() -> BigNumber {
    let order_bytes: [u8; 32] = k256::Secp256k1::ORDER.to_be_bytes();
    BigNumber::from_slice(order_bytes)
}

impl CurveTrait for K256 {
    type Scalar = K256Scalar;

    fn generator() -> Self {
        Self::GENERATOR
    }

    fn identity() -> Self {
        Self::IDENTITY
    }

    fn order() -> BigNumber {
        k256_order()
    }

    fn multiply_by_scalar(&self, scalar: &Self::Scalar) -> Self {
        Self(self.0 * scalar)
    }

    fn multiply_by_bignum(&self, scalar: &BigNumber) -> Result<Self> {
        let s = Zeroizing::new(Self::bn_to_scalar(scalar)?);
        Ok(self.multiply_by_scalar(&s))
    }

    fn to_bytes(self) -> Vec<u8> {
        let mut generic_array = AffinePoint::<k256::Secp256k1>::from(self.0).to_bytes();
        let bytes = generic_array.to_vec();
        generic_array.zeroize();
        bytes
    }

    fn try_from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut fixed_len_bytes: [u8; 33] = bytes.try_into().map_err(|_| {
            error!("Failed to decode bytes as a curve point");
            CallerError::DeserializationFailed
        })?;

        let point: Option<AffinePoint<k256::Secp256k1>> =
            AffinePoint::<k256::Secp256k1>::from_bytes(&fixed_len_bytes.into()).into();
        fixed_len_bytes.zeroize();

        match point {
            Some(point) => Ok(Self(point.into())),
            None => {
                error!("Failed to decode bytes as a curve point");
                Err(CallerError::DeserializationFailed)?
            }
        }
    }

    // Returns x: BigNumber as a k256::Scalar mod k256_order.
    fn bn_to_scalar(x: &BigNumber) -> Result<Self::Scalar> {
        // Take (mod q)
        let order = Self::order();
        let x_modded = x % order;

        let bytes = Zeroizing::new(x_modded.to_bytes());
        let mut slice = Zeroizing::new(vec![0u8; 32 - bytes.len()]);
        slice.extend_from_slice(&bytes);

        let mut ret: Self::Scalar = Option::from(<K256Scalar as PrimeField>::from_repr(
            GenericArray::clone_from_slice(&slice),
        ))
        .ok_or_else(|| {
            error!("Failed to convert BigNumber into k256::Scalar");
            InternalError::InternalInvariantFailed
        })?;

        // Make sure to negate the scalar if the original input was negative
        if x < &BigNumber::zero() {
            ret = ret.negate();
        }

        Ok(ret)
    }

    fn scalar_to_bn(x: &Self::Scalar) -> BigNumber {
        let bytes = x.to_repr();
        BigNumber::from_slice(bytes)
    }
}

impl ScalarTrait for K256Scalar {
    fn zero() -> Self {
        K256Scalar::ZERO
    }

    fn one() -> Self {
        K256Scalar::ONE
    }

    fn add(&self, other: &Self) -> Self {
        k256::Scalar::add(self, other)
    }

    fn sub(&self, other: &Self) -> Self {
        k256::Scalar::sub(self, other)
    }

    fn negate(&self) -> Self {
        k256::Scalar::negate(self)
    }

    fn mul(&self, other: &Self) -> Self {
        k256::Scalar::mul(self, other)
    }

    fn invert(&self) -> Option<Self> {
        K256Scalar::invert(self).into()
    }

    fn is_high(&self) -> bool {
        <k256::Scalar as IsHigh>::is_high(self).into()
    }

    fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        <K256Scalar as Field>::random(rng)
    }

    fn to_bytes(&self) -> Vec<u8> {
        K256Scalar::to_bytes(self).to_vec()
    }
}

impl EcdsaCurve for K256 {
    type VerifyingKey = VerifyingKey;
    type EcdsaSignature = SignatureK256;

    fn x_projection(&self) -> Result<Self::Scalar> {
        let x_projection = self.0.to_affine().x();

        // Note: this takes the x-coordinate bytes as a scalar encoding. The
        // coordinate may exceed the group order, in which case `from_repr`
        // refuses it; the signing protocol restarts with fresh nonces when
        // that (cryptographically rare) case comes up.
        Option::from(<k256::Scalar as PrimeField>::from_repr(x_projection)).ok_or_else(|| {
            error!("Unable to compute x-projection of curve point");
            InternalInvariantFailed
        })
    }

    fn y_parity(&self) -> u8 {
        // Compressed SEC1 tag: 0x02 for even y, 0x03 for odd y.
        let bytes = (*self).to_bytes();
        match bytes.first() {
            Some(0x03) => 1,
            _ => 0,
        }
    }
}

/// ECDSA signature over secp256k1.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SignatureK256(pub(crate) k256::ecdsa::Signature);

impl SignatureTrait for SignatureK256 {
    fn from_scalars(r: &BigNumber, s: &BigNumber) -> Result<Self> {
        let r_scalar = K256::bn_to_scalar(r)?;
        let s_scalar = K256::bn_to_scalar(s)?;
        let sig = k256::ecdsa::Signature::from_scalars(r_scalar, s_scalar)
            .map_err(|_| InternalInvariantFailed)?;
        Ok(SignatureK256(sig))
    }

    fn r_bytes(&self) -> Vec<u8> {
        self.0.split_bytes().0.to_vec()
    }

    fn s_bytes(&self) -> Vec<u8> {
        self.0.split_bytes().1.to_vec()
    }
}

impl VerifyingKeyTrait for VerifyingKey {
    type C = K256;

    fn from_point(point: Self::C) -> Result<Self> {
        VerifyingKey::from_sec1_bytes(&point.to_bytes()).map_err(|_| InternalInvariantFailed)
    }

    fn verify_prehash(
        &self,
        digest: &[u8],
        signature: &<Self::C as EcdsaCurve>::EcdsaSignature,
    ) -> Result<()> {
        PrehashVerifier::verify_prehash(self, digest, &signature.0)
            .map_err(|_| InternalError::unattributed())
    }
}

#[cfg(test)]
mod curve_point_tests {
    use super::*;
    use crate::utils::testing::init_testing;
    use k256::elliptic_curve::Group;

    #[test]
    fn curve_point_byte_conversion_works() {
        let rng = &mut init_testing();
        let point = K256(k256::ProjectivePoint::random(rng));
        let bytes = CurveTrait::to_bytes(point);
        let reconstructed = K256::try_from_bytes(&bytes).unwrap();
        assert_eq!(point, reconstructed);
    }

    #[test]
    fn bn_to_scalar_handles_negatives() {
        let neg1 = BigNumber::zero() - BigNumber::one();
        let scalar = K256::bn_to_scalar(&neg1).unwrap();
        assert_eq!(K256Scalar::ZERO, ScalarTrait::add(&scalar, &K256Scalar::ONE));
    }

    #[test]
    fn scalar_roundtrip_through_bn() {
        let rng = &mut init_testing();
        let s = <K256Scalar as ScalarTrait>::random(rng);
        let bn = K256::scalar_to_bn(&s);
        assert_eq!(K256::bn_to_scalar(&bn).unwrap(), s);
    }

    #[test]
    fn malformed_point_encodings_are_rejected() {
        assert!(K256::try_from_bytes(&[0u8; 32]).is_err());
        let mut bytes = vec![0x02u8];
        bytes.extend_from_slice(&[0xffu8; 32]);
        assert!(K256::try_from_bytes(&bytes).is_err());
    }
}
