//! Hash commitment opened across rounds one and two of key generation.

use crate::{
    curve::CurveTrait,
    errors::{InternalError, Result},
    messages::{KeygenMessageType, Message, MessageType},
    protocol::{Identifier, PartyId},
};
use merlin::Transcript;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::{error, instrument};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub(crate) struct KeygenCommit {
    hash: [u8; 32],
}

impl KeygenCommit {
    pub(crate) fn from_message(message: &Message) -> Result<Self> {
        message.check_type(MessageType::Keygen(KeygenMessageType::R1CommitHash))?;
        let keygen_commit: KeygenCommit = deserialize!(&message.unverified_bytes)?;
        Ok(keygen_commit)
    }
}

/// The opening of a round-one commitment: the dealer's Feldman commitment
/// vector, its Schnorr nonce precommitment, and its share of the session
/// randomness.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub(crate) struct KeygenDecommit<C: CurveTrait> {
    pub(crate) sid: Identifier,
    pub(crate) sender: PartyId,
    pub(crate) rid: [u8; 32],
    #[serde(bound(deserialize = "C: CurveTrait"))]
    pub(crate) coeff_commitments: Vec<C>,
    #[serde(bound(deserialize = "C: CurveTrait"))]
    pub(crate) precommit: C,
}

impl<C: CurveTrait> KeygenDecommit<C> {
    pub(crate) fn new<R: RngCore + CryptoRng>(
        rng: &mut R,
        sid: &Identifier,
        sender: &PartyId,
        coeff_commitments: Vec<C>,
        precommit: C,
    ) -> Self {
        let mut rid = [0u8; 32];
        rng.fill_bytes(rid.as_mut_slice());
        Self {
            sid: *sid,
            sender: sender.clone(),
            rid,
            coeff_commitments,
            precommit,
        }
    }

    /// Deserialize a decommitment from a message and verify it against the
    /// previously received commitment.
    pub(crate) fn from_message(
        message: &Message,
        com: &KeygenCommit,
        expected_commitments: usize,
    ) -> Result<Self> {
        message.check_type(MessageType::Keygen(KeygenMessageType::R2Decommit))?;
        let decommit: KeygenDecommit<C> = deserialize!(&message.unverified_bytes)?;
        decommit.verify(message.id(), message.from(), com, expected_commitments)?;
        Ok(decommit)
    }

    pub(crate) fn commit(&self) -> Result<KeygenCommit> {
        let mut transcript = Transcript::new(b"KeygenR1");
        transcript.append_message(b"decom", &serialize!(&self)?);
        let mut hash = [0u8; 32];
        transcript.challenge_bytes(b"hashing r1", &mut hash);
        Ok(KeygenCommit { hash })
    }

    /// Verify this decommitment against a commitment and expected content.
    #[instrument(skip_all, err(Debug))]
    fn verify(
        &self,
        sid: Identifier,
        sender: &PartyId,
        com: &KeygenCommit,
        expected_commitments: usize,
    ) -> Result<()> {
        let rebuilt_com = self.commit()?;
        if !crate::utils::ct_eq(&rebuilt_com.hash, &com.hash) {
            error!("Decommitment does not match the original commitment");
            return Err(InternalError::culprit(sender));
        }
        if self.sid != sid {
            error!("Decommitment carries the wrong session identifier");
            return Err(InternalError::culprit(sender));
        }
        if &self.sender != sender {
            error!("Decommitment carries the wrong sender");
            return Err(InternalError::culprit(sender));
        }
        if self.coeff_commitments.len() != expected_commitments {
            error!("Decommitment carries the wrong number of polynomial commitments");
            return Err(InternalError::culprit(sender));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        curve::{ScalarTrait, TestCurve},
        protocol::testing::test_party_ids,
        utils::testing::init_testing,
    };

    #[test]
    fn commitment_opens_to_its_own_decommitment() {
        let mut rng = init_testing();
        let parties = test_party_ids(1);
        let sid = Identifier::random(&mut rng);
        let point = TestCurve::generator()
            .multiply_by_scalar(&<TestCurve as CurveTrait>::Scalar::random(&mut rng));

        let decommit =
            KeygenDecommit::new(&mut rng, &sid, &parties[0], vec![point], point);
        let com = decommit.commit().unwrap();
        assert!(decommit.verify(sid, &parties[0], &com, 1).is_ok());
    }

    #[test]
    fn altered_decommitment_is_rejected() {
        let mut rng = init_testing();
        let parties = test_party_ids(2);
        let sid = Identifier::random(&mut rng);
        let point = TestCurve::generator()
            .multiply_by_scalar(&<TestCurve as CurveTrait>::Scalar::random(&mut rng));

        let decommit =
            KeygenDecommit::new(&mut rng, &sid, &parties[0], vec![point], point);
        let com = decommit.commit().unwrap();

        let mut altered = decommit.clone();
        altered.rid[0] ^= 1;
        assert!(altered.verify(sid, &parties[0], &com, 1).is_err());

        // Wrong claimed sender.
        assert!(decommit.verify(sid, &parties[1], &com, 1).is_err());
    }
}
