//! Protocol messages and the stable wire format.
//!
//! A [`Message`] couples a routing header (sender, recipient, broadcast
//! flag) with a typed payload. On the wire, messages travel as a
//! length-delimited binary record whose payload schema is identified by a
//! URL-form string; the prefix of that string is deployment configuration,
//! only the schema suffix is matched on receipt. Session identifiers are
//! deliberately absent from the wire wrapper: the transport binds them.

use crate::{
    errors::{CallerError, InternalError, Result},
    protocol::{Identifier, PartyId},
};
use serde::{Deserialize, Serialize};
use tracing::error;

/// The protocol a message belongs to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolType {
    /// ECDSA distributed key generation.
    Keygen,
    /// ECDSA threshold signing.
    Sign,
    /// ECDSA share rotation.
    Resharing,
    /// EdDSA distributed key generation.
    EddsaKeygen,
    /// EdDSA threshold signing.
    EddsaSign,
    /// EdDSA share rotation.
    EddsaResharing,
}

/// How a message type travels.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum MessageRouting {
    /// Delivered identically to every other party.
    Broadcast,
    /// Delivered to exactly one recipient.
    PointToPoint,
    /// Never put on the wire; the driver signals itself with it.
    SelfOnly,
}

/// Message types for ECDSA key generation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeygenMessageType {
    /// Self-signal to begin round one.
    Ready,
    /// Round 1: commitment hash plus Paillier and ring-Pedersen parameters.
    R1CommitHash,
    /// Round 2: opening of the round-1 commitment.
    R2Decommit,
    /// Round 2: Feldman share for one recipient.
    R2PrivateShare,
    /// Round 3: proofs about the Paillier modulus, tailored per recipient.
    R3PaillierProof,
    /// Round 4: Schnorr proof of the final key share.
    R4SchnorrProof,
}

/// Message types for ECDSA signing.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignMessageType {
    /// Self-signal to begin round one.
    Ready,
    /// Round 1: nonce commitment and the encrypted mask share.
    R1CommitHash,
    /// Round 1: range proof for the encrypted mask share, per recipient.
    R1RangeProof,
    /// Round 2: MtA responses (plain and with-check), per recipient.
    R2MtaResponse,
    /// Round 3: the masked nonce product share δ_i.
    R3Delta,
    /// Round 4: opening of the round-1 nonce commitment.
    R4Decommit,
    /// Round 5: the point R^{k_i}.
    R5RBar,
    /// Round 5: consistency proof binding R^{k_i} to the round-1 ciphertext.
    R5ConsistencyProof,
    /// Round 6: the signature share s_i.
    R6Share,
}

/// Message types for ECDSA resharing.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResharingMessageType {
    /// Self-signal to begin round one.
    Ready,
    /// Round 1 (old committee): commitment to the resharing polynomial.
    R1OldCommit,
    /// Round 1 (new committee): fresh Paillier and ring-Pedersen parameters.
    R1NewAuxInfo,
    /// Round 2 (old committee): opening of the round-1 commitment.
    R2Decommit,
    /// Round 2 (old committee): Feldman share for one new-committee member.
    R2PrivateShare,
    /// Round 3 (new committee): proofs about the fresh Paillier modulus.
    R3PaillierProof,
    /// Round 4 (new committee): Schnorr proof of the new key share.
    R4SchnorrProof,
}

/// Message types for EdDSA key generation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EddsaKeygenMessageType {
    /// Self-signal to begin round one.
    Ready,
    /// Round 1: commitment hash.
    R1CommitHash,
    /// Round 2: opening of the round-1 commitment.
    R2Decommit,
    /// Round 2: Feldman share for one recipient.
    R2PrivateShare,
    /// Round 3: Schnorr proof of the final key share.
    R3SchnorrProof,
}

/// Message types for EdDSA signing.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EddsaSignMessageType {
    /// Self-signal to begin round one.
    Ready,
    /// Round 1: commitment to the nonce point R_i.
    R1CommitHash,
    /// Round 2: opening of the round-1 commitment.
    R2Decommit,
    /// Round 3: the signature share s_i.
    R3Share,
}

/// Message types for EdDSA resharing.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EddsaResharingMessageType {
    /// Self-signal to begin round one.
    Ready,
    /// Round 1 (old committee): commitment to the resharing polynomial.
    R1OldCommit,
    /// Round 2 (old committee): opening of the round-1 commitment.
    R2Decommit,
    /// Round 2 (old committee): Feldman share for one new-committee member.
    R2PrivateShare,
    /// Round 3 (new committee): Schnorr proof of the new key share.
    R3SchnorrProof,
}

/// A typed protocol message.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    /// ECDSA key generation.
    Keygen(KeygenMessageType),
    /// ECDSA signing.
    Sign(SignMessageType),
    /// ECDSA resharing.
    Resharing(ResharingMessageType),
    /// EdDSA key generation.
    EddsaKeygen(EddsaKeygenMessageType),
    /// EdDSA signing.
    EddsaSign(EddsaSignMessageType),
    /// EdDSA resharing.
    EddsaResharing(EddsaResharingMessageType),
}

/// Schema suffixes for every wire-capable message type. The full type URL is
/// `<prefix>.<suffix>`; receivers match only the suffix.
const TYPE_URL_TABLE: &[(MessageType, &str)] = &[
    (
        MessageType::Keygen(KeygenMessageType::R1CommitHash),
        "tsig.Keygen.R1CommitHash",
    ),
    (
        MessageType::Keygen(KeygenMessageType::R2Decommit),
        "tsig.Keygen.R2Decommit",
    ),
    (
        MessageType::Keygen(KeygenMessageType::R2PrivateShare),
        "tsig.Keygen.R2PrivateShare",
    ),
    (
        MessageType::Keygen(KeygenMessageType::R3PaillierProof),
        "tsig.Keygen.R3PaillierProof",
    ),
    (
        MessageType::Keygen(KeygenMessageType::R4SchnorrProof),
        "tsig.Keygen.R4SchnorrProof",
    ),
    (
        MessageType::Sign(SignMessageType::R1CommitHash),
        "tsig.Sign.R1CommitHash",
    ),
    (
        MessageType::Sign(SignMessageType::R1RangeProof),
        "tsig.Sign.R1RangeProof",
    ),
    (
        MessageType::Sign(SignMessageType::R2MtaResponse),
        "tsig.Sign.R2MtaResponse",
    ),
    (MessageType::Sign(SignMessageType::R3Delta), "tsig.Sign.R3Delta"),
    (
        MessageType::Sign(SignMessageType::R4Decommit),
        "tsig.Sign.R4Decommit",
    ),
    (MessageType::Sign(SignMessageType::R5RBar), "tsig.Sign.R5RBar"),
    (
        MessageType::Sign(SignMessageType::R5ConsistencyProof),
        "tsig.Sign.R5ConsistencyProof",
    ),
    (MessageType::Sign(SignMessageType::R6Share), "tsig.Sign.R6Share"),
    (
        MessageType::Resharing(ResharingMessageType::R1OldCommit),
        "tsig.Resharing.R1OldCommit",
    ),
    (
        MessageType::Resharing(ResharingMessageType::R1NewAuxInfo),
        "tsig.Resharing.R1NewAuxInfo",
    ),
    (
        MessageType::Resharing(ResharingMessageType::R2Decommit),
        "tsig.Resharing.R2Decommit",
    ),
    (
        MessageType::Resharing(ResharingMessageType::R2PrivateShare),
        "tsig.Resharing.R2PrivateShare",
    ),
    (
        MessageType::Resharing(ResharingMessageType::R3PaillierProof),
        "tsig.Resharing.R3PaillierProof",
    ),
    (
        MessageType::Resharing(ResharingMessageType::R4SchnorrProof),
        "tsig.Resharing.R4SchnorrProof",
    ),
    (
        MessageType::EddsaKeygen(EddsaKeygenMessageType::R1CommitHash),
        "tsig.EddsaKeygen.R1CommitHash",
    ),
    (
        MessageType::EddsaKeygen(EddsaKeygenMessageType::R2Decommit),
        "tsig.EddsaKeygen.R2Decommit",
    ),
    (
        MessageType::EddsaKeygen(EddsaKeygenMessageType::R2PrivateShare),
        "tsig.EddsaKeygen.R2PrivateShare",
    ),
    (
        MessageType::EddsaKeygen(EddsaKeygenMessageType::R3SchnorrProof),
        "tsig.EddsaKeygen.R3SchnorrProof",
    ),
    (
        MessageType::EddsaSign(EddsaSignMessageType::R1CommitHash),
        "tsig.EddsaSign.R1CommitHash",
    ),
    (
        MessageType::EddsaSign(EddsaSignMessageType::R2Decommit),
        "tsig.EddsaSign.R2Decommit",
    ),
    (
        MessageType::EddsaSign(EddsaSignMessageType::R3Share),
        "tsig.EddsaSign.R3Share",
    ),
    (
        MessageType::EddsaResharing(EddsaResharingMessageType::R1OldCommit),
        "tsig.EddsaResharing.R1OldCommit",
    ),
    (
        MessageType::EddsaResharing(EddsaResharingMessageType::R2Decommit),
        "tsig.EddsaResharing.R2Decommit",
    ),
    (
        MessageType::EddsaResharing(EddsaResharingMessageType::R2PrivateShare),
        "tsig.EddsaResharing.R2PrivateShare",
    ),
    (
        MessageType::EddsaResharing(EddsaResharingMessageType::R3SchnorrProof),
        "tsig.EddsaResharing.R3SchnorrProof",
    ),
];

impl MessageType {
    pub(crate) fn routing(&self) -> MessageRouting {
        use MessageRouting::*;
        match self {
            MessageType::Keygen(t) => match t {
                KeygenMessageType::Ready => SelfOnly,
                KeygenMessageType::R2PrivateShare | KeygenMessageType::R3PaillierProof => {
                    PointToPoint
                }
                _ => Broadcast,
            },
            MessageType::Sign(t) => match t {
                SignMessageType::Ready => SelfOnly,
                SignMessageType::R1RangeProof
                | SignMessageType::R2MtaResponse
                | SignMessageType::R5ConsistencyProof => PointToPoint,
                _ => Broadcast,
            },
            MessageType::Resharing(t) => match t {
                ResharingMessageType::Ready => SelfOnly,
                ResharingMessageType::R2PrivateShare | ResharingMessageType::R3PaillierProof => {
                    PointToPoint
                }
                _ => Broadcast,
            },
            MessageType::EddsaKeygen(t) => match t {
                EddsaKeygenMessageType::Ready => SelfOnly,
                EddsaKeygenMessageType::R2PrivateShare => PointToPoint,
                _ => Broadcast,
            },
            MessageType::EddsaSign(t) => match t {
                EddsaSignMessageType::Ready => SelfOnly,
                _ => Broadcast,
            },
            MessageType::EddsaResharing(t) => match t {
                EddsaResharingMessageType::Ready => SelfOnly,
                EddsaResharingMessageType::R2PrivateShare => PointToPoint,
                _ => Broadcast,
            },
        }
    }

    /// The schema suffix of this message type, if it can travel on the wire.
    pub(crate) fn type_url_suffix(&self) -> Option<&'static str> {
        TYPE_URL_TABLE
            .iter()
            .find(|(mt, _)| mt == self)
            .map(|(_, suffix)| *suffix)
    }

    /// Resolve a full type URL against the schema table, tolerating any
    /// deployment prefix.
    pub(crate) fn from_type_url(url: &str) -> Option<MessageType> {
        TYPE_URL_TABLE
            .iter()
            .find(|(_, suffix)| url == *suffix || url.ends_with(&format!(".{suffix}")))
            .map(|(mt, _)| *mt)
    }
}

/// The outer wire wrapper. Field order is part of the stable format.
#[derive(Serialize, Deserialize)]
struct WireFrame {
    sender: Vec<u8>,
    recipients: Vec<Vec<u8>>,
    is_broadcast: bool,
    type_url: String,
    payload: Vec<u8>,
}

/// A single message between protocol parties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    message_type: MessageType,
    id: Identifier,
    from: PartyId,
    to: PartyId,
    is_broadcast: bool,
    /// The payload, not yet validated against the message type.
    pub(crate) unverified_bytes: Vec<u8>,
}

impl Message {
    /// Create a point-to-point message.
    pub(crate) fn new<T: Serialize>(
        message_type: MessageType,
        id: Identifier,
        from: PartyId,
        to: PartyId,
        payload: &T,
    ) -> Result<Self> {
        Ok(Self {
            message_type,
            id,
            from,
            to,
            is_broadcast: false,
            unverified_bytes: serialize!(payload)?,
        })
    }

    /// Create one copy of a broadcast message, addressed to `to`.
    ///
    /// The round engine stamps the broadcast flag; the transport's reliable
    /// broadcast must deliver the bytes identically to every recipient.
    pub(crate) fn new_broadcast<T: Serialize>(
        message_type: MessageType,
        id: Identifier,
        from: PartyId,
        to: PartyId,
        payload: &T,
    ) -> Result<Self> {
        Ok(Self {
            message_type,
            id,
            from,
            to,
            is_broadcast: true,
            unverified_bytes: serialize!(payload)?,
        })
    }

    /// The payload type.
    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    /// The session this message belongs to.
    pub fn id(&self) -> Identifier {
        self.id
    }

    /// The sender.
    pub fn from(&self) -> &PartyId {
        &self.from
    }

    /// The recipient.
    pub fn to(&self) -> &PartyId {
        &self.to
    }

    /// Whether this message was sent with broadcast semantics.
    pub fn is_broadcast(&self) -> bool {
        self.is_broadcast
    }

    /// Check the payload type, returning an error naming the sender if it
    /// does not match.
    pub(crate) fn check_type(&self, expected: MessageType) -> Result<()> {
        if self.message_type != expected {
            error!(
                "Wrong message type: expected {:?}, got {:?}",
                expected, self.message_type
            );
            return Err(InternalError::culprit(&self.from));
        }
        Ok(())
    }

    /// Encode for the transport.
    ///
    /// `type_url_prefix` is the deployment's organization prefix; receivers
    /// only match the schema suffix, so differing prefixes interoperate.
    pub fn to_wire_bytes(&self, type_url_prefix: &str) -> Result<Vec<u8>> {
        let suffix = self.message_type.type_url_suffix().ok_or_else(|| {
            error!("Message type {:?} never travels on the wire", self.message_type);
            InternalError::from(CallerError::BadInput)
        })?;
        let frame = WireFrame {
            sender: serialize!(&self.from)?,
            recipients: if self.is_broadcast {
                Vec::new()
            } else {
                vec![serialize!(&self.to)?]
            },
            is_broadcast: self.is_broadcast,
            type_url: format!("{type_url_prefix}.{suffix}"),
            payload: self.unverified_bytes.clone(),
        };
        serialize!(&frame)
    }

    /// Decode a wire frame, verifying that the routing fields agree with
    /// what the transport claims about the delivery.
    pub fn from_wire_bytes(
        bytes: &[u8],
        session: Identifier,
        claimed_sender: &PartyId,
        claimed_broadcast: bool,
        recipient: &PartyId,
    ) -> Result<Self> {
        let frame: WireFrame = deserialize!(bytes)?;
        let sender: PartyId = deserialize!(&frame.sender)?;
        if &sender != claimed_sender {
            error!("Wire frame sender does not match the transport's claim");
            return Err(InternalError::culprit(claimed_sender));
        }
        let message_type = MessageType::from_type_url(&frame.type_url).ok_or_else(|| {
            error!("Unknown payload type URL {:?}", frame.type_url);
            InternalError::culprit(claimed_sender)
        })?;
        if frame.is_broadcast != claimed_broadcast {
            error!("Wire frame broadcast flag does not match the transport's claim");
            return Err(InternalError::culprit(claimed_sender));
        }
        match message_type.routing() {
            MessageRouting::Broadcast => {
                if !frame.is_broadcast || !frame.recipients.is_empty() {
                    error!("Per-recipient send claims broadcast semantics");
                    return Err(InternalError::culprit(claimed_sender));
                }
            }
            MessageRouting::PointToPoint => {
                if frame.is_broadcast || frame.recipients.len() != 1 {
                    error!("Point-to-point payload carried with broadcast routing");
                    return Err(InternalError::culprit(claimed_sender));
                }
                let to: PartyId = deserialize!(&frame.recipients[0])?;
                if &to != recipient {
                    error!("Message was not addressed to this party");
                    Err(CallerError::WrongMessageRecipient)?;
                }
            }
            MessageRouting::SelfOnly => {
                error!("Internal message type arrived from the wire");
                return Err(InternalError::culprit(claimed_sender));
            }
        }
        Ok(Self {
            message_type,
            id: session,
            from: sender,
            to: recipient.clone(),
            is_broadcast: frame.is_broadcast,
            unverified_bytes: frame.payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{testing::test_party_ids, Identifier};
    use rand::rngs::OsRng;

    #[test]
    fn wire_roundtrip_preserves_routing() {
        let parties = test_party_ids(2);
        let sid = Identifier::random(&mut OsRng);
        let msg = Message::new(
            MessageType::Keygen(KeygenMessageType::R2PrivateShare),
            sid,
            parties[0].clone(),
            parties[1].clone(),
            &vec![1u8, 2, 3],
        )
        .unwrap();

        let bytes = msg.to_wire_bytes("com.example").unwrap();
        let decoded =
            Message::from_wire_bytes(&bytes, sid, &parties[0], false, &parties[1]).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn prefix_differences_are_tolerated() {
        let parties = test_party_ids(2);
        let sid = Identifier::random(&mut OsRng);
        let msg = Message::new_broadcast(
            MessageType::EddsaSign(EddsaSignMessageType::R3Share),
            sid,
            parties[0].clone(),
            parties[1].clone(),
            &vec![9u8],
        )
        .unwrap();

        for prefix in ["org.alpha", "org.beta.deployment"] {
            let bytes = msg.to_wire_bytes(prefix).unwrap();
            let decoded =
                Message::from_wire_bytes(&bytes, sid, &parties[0], true, &parties[1]).unwrap();
            assert_eq!(decoded.message_type(), msg.message_type());
        }
    }

    #[test]
    fn sender_spoofing_is_detected() {
        let parties = test_party_ids(3);
        let sid = Identifier::random(&mut OsRng);
        let msg = Message::new_broadcast(
            MessageType::Sign(SignMessageType::R3Delta),
            sid,
            parties[0].clone(),
            parties[1].clone(),
            &vec![0u8],
        )
        .unwrap();
        let bytes = msg.to_wire_bytes("org").unwrap();

        // The transport claims a different sender than the frame asserts.
        let err = Message::from_wire_bytes(&bytes, sid, &parties[2], true, &parties[1]);
        assert!(err.is_err());
    }

    #[test]
    fn broadcast_flag_mismatch_is_rejected() {
        let parties = test_party_ids(2);
        let sid = Identifier::random(&mut OsRng);
        let msg = Message::new_broadcast(
            MessageType::Sign(SignMessageType::R3Delta),
            sid,
            parties[0].clone(),
            parties[1].clone(),
            &vec![0u8],
        )
        .unwrap();
        let bytes = msg.to_wire_bytes("org").unwrap();
        assert!(Message::from_wire_bytes(&bytes, sid, &parties[0], false, &parties[1]).is_err());
    }

    #[test]
    fn ready_messages_never_come_from_the_wire() {
        let parties = test_party_ids(2);
        let sid = Identifier::random(&mut OsRng);
        let msg = Message::new(
            MessageType::Sign(SignMessageType::Ready),
            sid,
            parties[0].clone(),
            parties[0].clone(),
            &Vec::<u8>::new(),
        )
        .unwrap();
        assert!(msg.to_wire_bytes("org").is_err());
    }

    #[test]
    fn every_wire_type_has_a_unique_suffix() {
        for (i, (_, a)) in TYPE_URL_TABLE.iter().enumerate() {
            for (_, b) in TYPE_URL_TABLE.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }
}
