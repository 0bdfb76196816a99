//! Per-party auxiliary cryptographic material for the ECDSA protocols.
//!
//! Each ECDSA party carries a Paillier key pair plus ring-Pedersen
//! commitment parameters. Generating them means sampling four safe primes,
//! by far the most expensive step of key generation, so [`PreParams`] can be
//! computed ahead of time and handed to keygen or resharing as input.

use crate::{
    errors::Result,
    paillier::{DecryptionKey, EncryptionKey},
    parameters::MIN_MODULUS_BITS,
    protocol::PartyId,
    ring_pedersen::VerifiedRingPedersen,
    utils::bit_length,
};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::{error, instrument};

/// A party's public auxiliary material: its Paillier encryption key and its
/// ring-Pedersen parameters (with subgroup proof).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuxInfoPublic {
    participant: PartyId,
    pk: EncryptionKey,
    params: VerifiedRingPedersen,
}

impl AuxInfoPublic {
    pub(crate) fn new(
        participant: PartyId,
        pk: EncryptionKey,
        params: VerifiedRingPedersen,
    ) -> Self {
        Self {
            participant,
            pk,
            params,
        }
    }

    /// The owning party.
    pub fn participant(&self) -> &PartyId {
        &self.participant
    }

    /// The Paillier encryption key.
    pub fn pk(&self) -> &EncryptionKey {
        &self.pk
    }

    /// The ring-Pedersen parameters.
    pub(crate) fn params(&self) -> &VerifiedRingPedersen {
        &self.params
    }

    /// Validate material received from a peer: modulus sizes and the
    /// ring-Pedersen subgroup proof. A failure marks the sender as culprit
    /// at the call site.
    pub(crate) fn verify(&self) -> Result<()> {
        if bit_length(self.pk.modulus()) < MIN_MODULUS_BITS {
            error!("Peer Paillier modulus is too short");
            return Err(crate::errors::InternalError::unattributed());
        }
        self.params.verify()
    }
}

/// A party's private auxiliary material: its Paillier decryption key.
#[derive(Clone, Serialize, Deserialize)]
pub struct AuxInfoPrivate {
    decryption_key: DecryptionKey,
}

impl From<DecryptionKey> for AuxInfoPrivate {
    fn from(decryption_key: DecryptionKey) -> Self {
        Self { decryption_key }
    }
}

impl AuxInfoPrivate {
    /// The Paillier decryption key.
    pub(crate) fn decryption_key(&self) -> &DecryptionKey {
        &self.decryption_key
    }
}

impl std::fmt::Debug for AuxInfoPrivate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuxInfoPrivate")
            .field("decryption_key", &"[redacted]")
            .finish()
    }
}

/// Pre-computed auxiliary material, reusable across keygen sessions.
///
/// Contains the full Paillier secret, so it must be stored as carefully as
/// the eventual key share.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PreParams {
    pub(crate) decryption_key: DecryptionKey,
    pub(crate) setup: VerifiedRingPedersen,
}

impl PreParams {
    /// Generate fresh pre-parameters. This samples four safe primes and can
    /// take minutes; run it ahead of the protocol where possible.
    #[instrument(skip_all, err(Debug))]
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Result<Self> {
        let decryption_key = DecryptionKey::generate(rng)?;
        let setup = VerifiedRingPedersen::gen(rng)?;
        Ok(Self {
            decryption_key,
            setup,
        })
    }

    /// Pre-parameters built from the insecure test prime pool.
    #[cfg(test)]
    pub(crate) fn from_pool_insecure<R: RngCore + CryptoRng>(rng: &mut R) -> Result<Self> {
        let (p, q) = crate::paillier::prime_gen::get_prime_pair_from_pool_insecure(rng)?;
        let decryption_key = DecryptionKey::from_primes(&p, &q)?;
        let (p2, q2) = crate::paillier::prime_gen::get_prime_pair_from_pool_insecure(rng)?;
        let setup = VerifiedRingPedersen::from_primes(rng, &p2, &q2)?;
        Ok(Self {
            decryption_key,
            setup,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{protocol::testing::test_party_ids, utils::testing::init_testing};

    #[test]
    fn pool_preparams_produce_valid_public_material() {
        let mut rng = init_testing();
        let parties = test_party_ids(1);
        let pre = PreParams::from_pool_insecure(&mut rng).unwrap();
        let public = AuxInfoPublic::new(
            parties[0].clone(),
            pre.decryption_key.encryption_key().clone(),
            pre.setup.clone(),
        );
        assert!(public.verify().is_ok());
    }
}
