//! The persisted result of EdDSA distributed key generation.

use crate::{
    curve::CurveTrait,
    ed25519::Ed25519,
    errors::{CallerError, InternalError, Result},
    keygen::{KeySharePrivate, KeySharePublic},
    protocol::PartyId,
};
use serde::{Deserialize, Serialize};
use tracing::error;

/// Everything an EdDSA party must persist after key generation or
/// resharing. There is no Paillier material here; threshold Schnorr needs
/// only the curve-side shares.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Output {
    public_key: Ed25519,
    participants: Vec<PartyId>,
    threshold: usize,
    rid: [u8; 32],
    vss_commitments: Vec<(PartyId, Vec<Ed25519>)>,
    public_shares: Vec<KeySharePublic<Ed25519>>,
    private_share: KeySharePrivate<Ed25519>,
}

impl Output {
    pub(crate) fn from_parts(
        participants: Vec<PartyId>,
        threshold: usize,
        rid: [u8; 32],
        vss_commitments: Vec<(PartyId, Vec<Ed25519>)>,
        public_shares: Vec<KeySharePublic<Ed25519>>,
        private_share: KeySharePrivate<Ed25519>,
        self_id: &PartyId,
    ) -> Result<Self> {
        let public_key = vss_commitments
            .iter()
            .fold(Ed25519::identity(), |sum, (_, commitments)| {
                sum + commitments[0]
            });

        let own_share = public_shares
            .iter()
            .find(|share| share.participant() == self_id)
            .ok_or_else(|| {
                error!("Output is missing this party's public share");
                InternalError::InternalInvariantFailed
            })?;
        if own_share.as_ref() != &private_share.public_point() {
            error!("Final private share does not match the published public share");
            return Err(InternalError::InternalInvariantFailed);
        }
        if public_shares.len() != participants.len() {
            error!("Output does not cover the full participant set");
            return Err(InternalError::InternalInvariantFailed);
        }

        Ok(Self {
            public_key,
            participants,
            threshold,
            rid,
            vss_commitments,
            public_shares,
            private_share,
        })
    }

    /// The joint public key as a curve point.
    pub fn public_key_point(&self) -> Ed25519 {
        self.public_key
    }

    /// The canonical 32-byte RFC 8032 public key encoding.
    pub fn public_key_bytes(&self) -> [u8; 32] {
        let bytes = self.public_key.to_bytes();
        bytes.try_into().expect("compressed points are 32 bytes")
    }

    /// The parties bound at keygen time, in canonical order.
    pub fn participants(&self) -> &[PartyId] {
        &self.participants
    }

    /// The threshold `t` the key was generated for.
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// All public key shares.
    pub fn public_shares(&self) -> &[KeySharePublic<Ed25519>] {
        &self.public_shares
    }

    /// The public key share of one party.
    pub(crate) fn find_public_share(&self, party: &PartyId) -> Result<&KeySharePublic<Ed25519>> {
        self.public_shares
            .iter()
            .find(|share| share.participant() == party)
            .ok_or_else(|| {
                error!("No public share for party {party}");
                InternalError::from(CallerError::BadInput)
            })
    }

    /// This party's private share.
    pub(crate) fn private_share(&self) -> &KeySharePrivate<Ed25519> {
        &self.private_share
    }

    /// Serialize for persistent storage; contains the private share.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serialize!(self)
    }

    /// Restore saved data, re-running the construction-time checks.
    pub fn from_bytes(bytes: &[u8], self_id: &PartyId) -> Result<Self> {
        let output: Self = deserialize!(bytes)?;
        Self::from_parts(
            output.participants,
            output.threshold,
            output.rid,
            output.vss_commitments,
            output.public_shares,
            output.private_share,
            self_id,
        )
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::{curve::ScalarTrait, vss::Polynomial};
    use rand::{CryptoRng, RngCore};

    /// Build a mutually consistent set of EdDSA keygen outputs without
    /// running the protocol.
    pub(crate) fn simulate_output_set<R: RngCore + CryptoRng>(
        participants: &[PartyId],
        threshold: usize,
        rng: &mut R,
    ) -> Result<Vec<Output>> {
        type Scalar = <Ed25519 as CurveTrait>::Scalar;

        let mut rid = [0u8; 32];
        rng.fill_bytes(&mut rid);

        let polynomials: Vec<Polynomial<Ed25519>> = participants
            .iter()
            .map(|_| Polynomial::sample(Scalar::random(rng), threshold, rng))
            .collect();
        let vss_commitments: Vec<(PartyId, Vec<Ed25519>)> = participants
            .iter()
            .zip(polynomials.iter())
            .map(|(party, poly)| (party.clone(), poly.commitments()))
            .collect();

        let private_shares: Vec<Scalar> = participants
            .iter()
            .map(|party| {
                let mut sum = Scalar::zero();
                for poly in &polynomials {
                    sum = sum.add(&poly.evaluate_at_party(party)?);
                }
                Ok(sum)
            })
            .collect::<Result<Vec<_>>>()?;

        let public_shares: Vec<KeySharePublic<Ed25519>> = participants
            .iter()
            .zip(private_shares.iter())
            .map(|(party, x)| {
                KeySharePublic::new(party.clone(), Ed25519::generator().multiply_by_scalar(x))
            })
            .collect();

        participants
            .iter()
            .zip(private_shares.into_iter())
            .map(|(party, x)| {
                Output::from_parts(
                    participants.to_vec(),
                    threshold,
                    rid,
                    vss_commitments.clone(),
                    public_shares.clone(),
                    KeySharePrivate::new(x),
                    party,
                )
            })
            .collect()
    }
}
