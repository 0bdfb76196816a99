//! Hash commitment on the resharing polynomial, opened in round two.

use crate::{
    curve::CurveTrait,
    errors::{InternalError, Result},
    messages::{Message, MessageType, ResharingMessageType},
    protocol::{Identifier, PartyId},
};
use merlin::Transcript;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::error;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub(crate) struct ResharingCommit {
    hash: [u8; 32],
}

impl ResharingCommit {
    pub(crate) fn from_message(message: &Message) -> Result<Self> {
        message.check_type(MessageType::Resharing(ResharingMessageType::R1OldCommit))?;
        let commit: ResharingCommit = deserialize!(&message.unverified_bytes)?;
        Ok(commit)
    }
}

/// The opening of an old-committee member's round-one commitment: its
/// resharing polynomial in the exponent plus a session-randomness share.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub(crate) struct ResharingDecommit<C: CurveTrait> {
    pub(crate) sid: Identifier,
    pub(crate) sender: PartyId,
    pub(crate) rid: [u8; 32],
    #[serde(bound(deserialize = "C: CurveTrait"))]
    pub(crate) coeff_commitments: Vec<C>,
}

impl<C: CurveTrait> ResharingDecommit<C> {
    pub(crate) fn new<R: RngCore + CryptoRng>(
        rng: &mut R,
        sid: &Identifier,
        sender: &PartyId,
        coeff_commitments: Vec<C>,
    ) -> Self {
        let mut rid = [0u8; 32];
        rng.fill_bytes(rid.as_mut_slice());
        Self {
            sid: *sid,
            sender: sender.clone(),
            rid,
            coeff_commitments,
        }
    }

    pub(crate) fn commit(&self) -> Result<ResharingCommit> {
        let mut transcript = Transcript::new(b"ResharingR1");
        transcript.append_message(b"decom", &serialize!(&self)?);
        let mut hash = [0u8; 32];
        transcript.challenge_bytes(b"hashing r1", &mut hash);
        Ok(ResharingCommit { hash })
    }

    pub(crate) fn from_message(
        message: &Message,
        com: &ResharingCommit,
        expected_commitments: usize,
    ) -> Result<Self> {
        message.check_type(MessageType::Resharing(ResharingMessageType::R2Decommit))?;
        let decommit: ResharingDecommit<C> = deserialize!(&message.unverified_bytes)?;

        let rebuilt = decommit.commit()?;
        if !crate::utils::ct_eq(&rebuilt.hash, &com.hash) {
            error!("Resharing decommitment does not match the original commitment");
            return Err(InternalError::culprit(message.from()));
        }
        if decommit.sid != message.id() || &decommit.sender != message.from() {
            error!("Resharing decommitment carries the wrong header");
            return Err(InternalError::culprit(message.from()));
        }
        if decommit.coeff_commitments.len() != expected_commitments {
            error!("Resharing decommitment has the wrong polynomial degree");
            return Err(InternalError::culprit(message.from()));
        }
        Ok(decommit)
    }
}
