//! The persisted result of ECDSA distributed key generation.

use crate::{
    auxinfo::{AuxInfoPrivate, AuxInfoPublic},
    curve::{CurveTrait, EcdsaCurve, ScalarTrait, VerifyingKeyTrait},
    errors::{CallerError, InternalError, Result},
    keygen::{KeySharePrivate, KeySharePublic},
    protocol::PartyId,
};
use serde::{Deserialize, Serialize};
use tracing::error;

/// Everything a party must persist after key generation or resharing.
///
/// The shared part (public key, party list, commitment vectors, public
/// shares, peer Paillier and ring-Pedersen material) is identical across all
/// parties; the private part (key share, Paillier secret) is this party's
/// own. Treat serialized values as secret material.
///
/// The serialized encoding is an opaque blob, stable within a major version;
/// carrying saved data across major versions requires a resharing session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Output<C: CurveTrait> {
    #[serde(bound(deserialize = "C: CurveTrait"))]
    public_key: C,
    participants: Vec<PartyId>,
    threshold: usize,
    rid: [u8; 32],
    /// Per-dealer Feldman commitment vectors, as verified at keygen time.
    #[serde(bound(deserialize = "C: CurveTrait"))]
    vss_commitments: Vec<(PartyId, Vec<C>)>,
    #[serde(bound(deserialize = "C: CurveTrait"))]
    public_shares: Vec<KeySharePublic<C>>,
    #[serde(bound(deserialize = "C: CurveTrait"))]
    private_share: KeySharePrivate<C>,
    auxinfo_publics: Vec<AuxInfoPublic>,
    auxinfo_private: AuxInfoPrivate,
}

impl<C: CurveTrait> Output<C> {
    /// Assemble and self-check an output.
    ///
    /// The checks are the final consistency gate of keygen: the public key
    /// must equal the sum of the dealers' constant-term commitments, the
    /// private share must match its published public share, and every party
    /// must come with exactly one set of auxiliary material. A mismatch here
    /// is fatal; no culprit can be named this late.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        participants: Vec<PartyId>,
        threshold: usize,
        rid: [u8; 32],
        vss_commitments: Vec<(PartyId, Vec<C>)>,
        public_shares: Vec<KeySharePublic<C>>,
        private_share: KeySharePrivate<C>,
        self_id: &PartyId,
        auxinfo_publics: Vec<AuxInfoPublic>,
        auxinfo_private: AuxInfoPrivate,
    ) -> Result<Self> {
        let public_key = vss_commitments
            .iter()
            .fold(C::identity(), |sum, (_, commitments)| {
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

        // After a resharing the commitment vectors belong to the old
        // committee, so their count is unrelated to the holder set; the
        // shares and auxiliary material always track the holders.
        if public_shares.len() != participants.len()
            || auxinfo_publics.len() != participants.len()
        {
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
            auxinfo_publics,
            auxinfo_private,
        })
    }

    /// The joint public key as a curve point.
    pub fn public_key_point(&self) -> C {
        self.public_key
    }

    /// The parties bound at keygen time, in canonical order.
    pub fn participants(&self) -> &[PartyId] {
        &self.participants
    }

    /// The threshold `t` the key was generated for.
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// The shared session randomness fixed at keygen time.
    pub(crate) fn rid(&self) -> [u8; 32] {
        self.rid
    }

    /// All public key shares.
    pub fn public_shares(&self) -> &[KeySharePublic<C>] {
        &self.public_shares
    }

    /// The public key share of one party.
    pub(crate) fn find_public_share(&self, party: &PartyId) -> Result<&KeySharePublic<C>> {
        self.public_shares
            .iter()
            .find(|share| share.participant() == party)
            .ok_or_else(|| {
                error!("No public share for party {party}");
                InternalError::from(CallerError::BadInput)
            })
    }

    /// This party's private share.
    pub(crate) fn private_share(&self) -> &KeySharePrivate<C> {
        &self.private_share
    }

    /// The auxiliary material of one party.
    pub(crate) fn find_auxinfo(&self, party: &PartyId) -> Result<&AuxInfoPublic> {
        self.auxinfo_publics
            .iter()
            .find(|aux| aux.participant() == party)
            .ok_or_else(|| {
                error!("No auxiliary material for party {party}");
                InternalError::from(CallerError::BadInput)
            })
    }

    /// This party's Paillier secret.
    pub(crate) fn auxinfo_private(&self) -> &AuxInfoPrivate {
        &self.auxinfo_private
    }

    /// Serialize for persistent storage. The result contains the private
    /// share and must be stored like a private key.
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
            output.auxinfo_publics,
            output.auxinfo_private,
        )
    }
}

impl<C: EcdsaCurve> Output<C> {
    /// The joint public key as a verifier handle.
    pub fn verifying_key(&self) -> Result<C::VerifyingKey> {
        C::VerifyingKey::from_point(self.public_key)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::{
        auxinfo::PreParams,
        vss::{self, Polynomial},
    };
    use rand::{CryptoRng, RngCore};

    /// Build a mutually consistent set of keygen outputs without running the
    /// protocol. For tests of downstream protocols only.
    pub(crate) fn simulate_output_set<C: CurveTrait, R: RngCore + CryptoRng>(
        participants: &[PartyId],
        threshold: usize,
        rng: &mut R,
    ) -> Result<Vec<Output<C>>> {
        let mut rid = [0u8; 32];
        rng.fill_bytes(&mut rid);

        // One dealer polynomial per party, exactly as keygen would have it.
        let polynomials: Vec<Polynomial<C>> = participants
            .iter()
            .map(|_| Polynomial::sample(C::Scalar::random(rng), threshold, rng))
            .collect();
        let vss_commitments: Vec<(PartyId, Vec<C>)> = participants
            .iter()
            .zip(polynomials.iter())
            .map(|(party, poly)| (party.clone(), poly.commitments()))
            .collect();

        let private_shares: Vec<C::Scalar> = participants
            .iter()
            .map(|party| {
                let mut sum = C::Scalar::zero();
                for poly in &polynomials {
                    sum = sum.add(&poly.evaluate_at_party(party)?);
                }
                Ok(sum)
            })
            .collect::<Result<Vec<_>>>()?;

        let public_shares: Vec<KeySharePublic<C>> = participants
            .iter()
            .zip(private_shares.iter())
            .map(|(party, x)| {
                KeySharePublic::new(party.clone(), C::generator().multiply_by_scalar(x))
            })
            .collect();

        let pre_params: Vec<PreParams> = participants
            .iter()
            .map(|_| PreParams::from_pool_insecure(rng))
            .collect::<Result<Vec<_>>>()?;
        let auxinfo_publics: Vec<AuxInfoPublic> = participants
            .iter()
            .zip(pre_params.iter())
            .map(|(party, pre)| {
                AuxInfoPublic::new(
                    party.clone(),
                    pre.decryption_key.encryption_key().clone(),
                    pre.setup.clone(),
                )
            })
            .collect();

        participants
            .iter()
            .zip(private_shares.into_iter())
            .zip(pre_params.into_iter())
            .map(|((party, x), pre)| {
                Output::from_parts(
                    participants.to_vec(),
                    threshold,
                    rid,
                    vss_commitments.clone(),
                    public_shares.clone(),
                    KeySharePrivate::new(x),
                    party,
                    auxinfo_publics.clone(),
                    pre.decryption_key.into(),
                )
            })
            .collect()
    }

    /// The joint secret key implied by a simulated output set, for
    /// validating test results.
    pub(crate) fn reconstruct_secret<C: CurveTrait>(
        outputs: &[Output<C>],
    ) -> Result<C::Scalar> {
        let shares: Vec<(PartyId, C::Scalar)> = outputs[0]
            .participants()
            .iter()
            .zip(outputs.iter())
            .map(|(party, output)| (party.clone(), *output.private_share().as_scalar()))
            .collect();
        vss::reconstruct::<C>(&shares)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        curve::TestCurve,
        protocol::testing::test_party_ids,
        utils::testing::init_testing,
        vss,
    };

    #[test]
    fn simulated_outputs_interpolate_to_the_public_key() {
        let mut rng = init_testing();
        let parties = test_party_ids(4);
        let outputs =
            testing::simulate_output_set::<TestCurve, _>(&parties, 2, &mut rng).unwrap();

        let secret = testing::reconstruct_secret(&outputs).unwrap();
        let expected = TestCurve::generator().multiply_by_scalar(&secret);
        for output in &outputs {
            assert_eq!(output.public_key_point(), expected);
        }

        // Any t+1 subset interpolates to the same secret.
        let subset: Vec<_> = outputs[1..4]
            .iter()
            .zip(&parties[1..4])
            .map(|(output, party)| (party.clone(), *output.private_share().as_scalar()))
            .collect();
        assert_eq!(vss::reconstruct::<TestCurve>(&subset).unwrap(), secret);
    }

    #[test]
    fn save_data_roundtrips_through_bytes() {
        let mut rng = init_testing();
        let parties = test_party_ids(2);
        let outputs =
            testing::simulate_output_set::<TestCurve, _>(&parties, 1, &mut rng).unwrap();

        let bytes = outputs[0].to_bytes().unwrap();
        let restored = Output::<TestCurve>::from_bytes(&bytes, &parties[0]).unwrap();
        assert_eq!(restored.public_key_point(), outputs[0].public_key_point());
        assert_eq!(restored.participants(), outputs[0].participants());

        // Restoring under the wrong identity fails the self-check.
        assert!(Output::<TestCurve>::from_bytes(&bytes, &parties[1]).is_err());
    }
}
