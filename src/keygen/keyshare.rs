//! Key share types produced by distributed key generation.

use crate::{
    curve::{CurveTrait, ScalarTrait},
    protocol::PartyId,
};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A party's additive share of the joint private key.
///
/// The share is a plain field scalar; it is wiped on drop and never printed.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop, PartialEq, Eq)]
pub struct KeySharePrivate<C: CurveTrait> {
    x: C::Scalar,
}

impl<C: CurveTrait> KeySharePrivate<C> {
    pub(crate) fn new(x: C::Scalar) -> Self {
        Self { x }
    }

    /// The share scalar.
    pub(crate) fn as_scalar(&self) -> &C::Scalar {
        &self.x
    }

    /// The corresponding public share `x·G`.
    pub(crate) fn public_point(&self) -> C {
        C::generator().multiply_by_scalar(&self.x)
    }
}

impl<C: CurveTrait> std::fmt::Debug for KeySharePrivate<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySharePrivate")
            .field("x", &"[redacted]")
            .finish()
    }
}

/// A party's public key share `X = x·G`, tagged with its owner.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeySharePublic<C: CurveTrait> {
    participant: PartyId,
    #[serde(bound(deserialize = "C: CurveTrait"))]
    X: C,
}

impl<C: CurveTrait> KeySharePublic<C> {
    pub(crate) fn new(participant: PartyId, share: C) -> Self {
        Self {
            participant,
            X: share,
        }
    }

    /// The owning party.
    pub fn participant(&self) -> &PartyId {
        &self.participant
    }
}

impl<C: CurveTrait> AsRef<C> for KeySharePublic<C> {
    fn as_ref(&self) -> &C {
        &self.X
    }
}
