//! Hash commitment on the nonce point, opened in round four of signing.

use crate::{
    curve::CurveTrait,
    errors::{InternalError, Result},
    messages::{Message, MessageType, SignMessageType},
    protocol::{Identifier, PartyId},
};
use merlin::Transcript;
use serde::{Deserialize, Serialize};
use tracing::error;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub(crate) struct SignCommit {
    hash: [u8; 32],
}

/// The opening of a signing round-one commitment: the nonce point
/// `Γᵢ = γᵢ·G`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub(crate) struct SignDecommit<C: CurveTrait> {
    pub(crate) sid: Identifier,
    pub(crate) sender: PartyId,
    #[serde(bound(deserialize = "C: CurveTrait"))]
    pub(crate) gamma_point: C,
}

impl<C: CurveTrait> SignDecommit<C> {
    pub(crate) fn new(sid: &Identifier, sender: &PartyId, gamma_point: C) -> Self {
        Self {
            sid: *sid,
            sender: sender.clone(),
            gamma_point,
        }
    }

    pub(crate) fn commit(&self) -> Result<SignCommit> {
        let mut transcript = Transcript::new(b"SignR1");
        transcript.append_message(b"decom", &serialize!(&self)?);
        let mut hash = [0u8; 32];
        transcript.challenge_bytes(b"hashing r1", &mut hash);
        Ok(SignCommit { hash })
    }

    /// Deserialize a decommitment from a message and verify it against the
    /// previously received commitment.
    pub(crate) fn from_message(message: &Message, com: &SignCommit) -> Result<Self> {
        message.check_type(MessageType::Sign(SignMessageType::R4Decommit))?;
        let decommit: SignDecommit<C> = deserialize!(&message.unverified_bytes)?;

        let rebuilt = decommit.commit()?;
        if !crate::utils::ct_eq(&rebuilt.hash, &com.hash) {
            error!("Nonce decommitment does not match the original commitment");
            return Err(InternalError::culprit(message.from()));
        }
        if decommit.sid != message.id() {
            error!("Nonce decommitment carries the wrong session identifier");
            return Err(InternalError::culprit(message.from()));
        }
        if &decommit.sender != message.from() {
            error!("Nonce decommitment carries the wrong sender");
            return Err(InternalError::culprit(message.from()));
        }
        Ok(decommit)
    }
}
