//! EdDSA threshold signing.
//!
//! Three-round threshold Schnorr over Edwards25519. The challenge is the
//! RFC 8032 one: `SHA-512(enc(R) ‖ enc(A) ‖ M)` over the *raw message
//! bytes*, interpreted little-endian and reduced mod the group order, so the
//! 64-byte output verifies under any stock Ed25519 verifier with no
//! transformation.

use crate::{
    curve::{CurveTrait, ScalarTrait},
    ed25519::Ed25519,
    errors::{CallerError, InternalError, Result},
    local_storage::{LocalStorage, TypeTag},
    messages::{EddsaSignMessageType, Message, MessageType, ProtocolType},
    participant::{InnerProtocolParticipant, ProcessOutcome, ProtocolParticipant, Status},
    protocol::{Identifier, PartyId, SharedContext},
    signature::SignatureData,
    vss,
};
use curve25519_dalek::scalar::Scalar;
use merlin::Transcript;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use tracing::{error, info, instrument};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::output::Output;

/// The transient nonce share; wiped once the signature share is out.
#[derive(Zeroize, ZeroizeOnDrop)]
struct NoncePrivate {
    r: Scalar,
}

impl std::fmt::Debug for NoncePrivate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoncePrivate").finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
struct EddsaSignCommit {
    hash: [u8; 32],
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct EddsaSignDecommit {
    sid: Identifier,
    sender: PartyId,
    nonce_point: Ed25519,
}

impl EddsaSignDecommit {
    fn commit(&self) -> Result<EddsaSignCommit> {
        let mut transcript = Transcript::new(b"EddsaSignR1");
        transcript.append_message(b"decom", &serialize!(&self)?);
        let mut hash = [0u8; 32];
        transcript.challenge_bytes(b"hashing r1", &mut hash);
        Ok(EddsaSignCommit { hash })
    }

    fn from_message(message: &Message, com: &EddsaSignCommit) -> Result<Self> {
        message.check_type(MessageType::EddsaSign(EddsaSignMessageType::R2Decommit))?;
        let decommit: EddsaSignDecommit = deserialize!(&message.unverified_bytes)?;

        let rebuilt = decommit.commit()?;
        if !crate::utils::ct_eq(&rebuilt.hash, &com.hash) {
            error!("Nonce decommitment does not match the original commitment");
            return Err(InternalError::culprit(message.from()));
        }
        if decommit.sid != message.id() || &decommit.sender != message.from() {
            error!("Nonce decommitment carries the wrong header");
            return Err(InternalError::culprit(message.from()));
        }
        Ok(decommit)
    }
}

mod storage {
    use super::*;

    pub(super) struct Commit;
    impl TypeTag for Commit {
        type Value = EddsaSignCommit;
    }
    pub(super) struct Decommit;
    impl TypeTag for Decommit {
        type Value = EddsaSignDecommit;
    }
    pub(super) struct Nonce;
    impl TypeTag for Nonce {
        type Value = NoncePrivate;
    }
    pub(super) struct RPoint;
    impl TypeTag for RPoint {
        type Value = Ed25519;
    }
    pub(super) struct Challenge;
    impl TypeTag for Challenge {
        type Value = Scalar;
    }
    pub(super) struct SigShare;
    impl TypeTag for SigShare {
        type Value = Scalar;
    }
}

/// Input to EdDSA signing: prior save data and the raw message bytes.
#[derive(Debug)]
pub struct Input {
    keygen_output: Output,
    message: Vec<u8>,
}

impl Input {
    /// Assemble signing input. `message` is the raw message; EdDSA hashes
    /// it internally as RFC 8032 prescribes.
    pub fn new(message: Vec<u8>, keygen_output: Output) -> Self {
        Self {
            keygen_output,
            message,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct R3Payload {
    share: Scalar,
}

/// A party running the EdDSA threshold signing protocol.
#[derive(Debug)]
pub struct EddsaSignParticipant {
    sid: Identifier,
    id: PartyId,
    other_participant_ids: Vec<PartyId>,
    local_storage: LocalStorage,
    input: Input,
    status: Status,
}

impl ProtocolParticipant for EddsaSignParticipant {
    type Input = Input;
    type Output = SignatureData;

    fn new(
        sid: Identifier,
        id: PartyId,
        other_participant_ids: Vec<PartyId>,
        input: Self::Input,
    ) -> Result<Self> {
        let quorum_size = other_participant_ids.len() + 1;
        if quorum_size != input.keygen_output.threshold() + 1 {
            error!("Signing requires a quorum of exactly t + 1 shareholders");
            Err(CallerError::ParticipantConfigError)?;
        }
        for party in std::iter::once(&id).chain(other_participant_ids.iter()) {
            if !input.keygen_output.participants().contains(party) {
                error!("Signer {party} does not hold a share of this key");
                Err(CallerError::ParticipantConfigError)?;
            }
        }
        Ok(Self {
            sid,
            id,
            other_participant_ids,
            local_storage: Default::default(),
            input,
            status: Status::NotReady,
        })
    }

    fn ready_type() -> MessageType {
        MessageType::EddsaSign(EddsaSignMessageType::Ready)
    }

    fn protocol_type() -> ProtocolType {
        ProtocolType::EddsaSign
    }

    fn id(&self) -> &PartyId {
        &self.id
    }

    fn other_ids(&self) -> &[PartyId] {
        &self.other_participant_ids
    }

    fn sid(&self) -> Identifier {
        self.sid
    }

    #[instrument(skip_all)]
    fn process_message<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        message: &Message,
    ) -> Result<ProcessOutcome<Self::Output>> {
        info!(
            "EDDSA SIGN: party {} received {:?} from {}",
            self.id(),
            message.message_type(),
            message.from()
        );

        if *self.status() == Status::TerminatedSuccessfully {
            Err(CallerError::ProtocolAlreadyTerminated)?;
        }
        if !self.status().is_ready() && message.message_type() != Self::ready_type() {
            self.stash_message(message)?;
            return Ok(ProcessOutcome::Incomplete);
        }

        match message.message_type() {
            MessageType::EddsaSign(EddsaSignMessageType::Ready) => {
                self.handle_ready_msg(rng, message)
            }
            MessageType::EddsaSign(EddsaSignMessageType::R1CommitHash) => {
                self.handle_round_one_msg(rng, message)
            }
            MessageType::EddsaSign(EddsaSignMessageType::R2Decommit) => {
                self.handle_round_two_msg(rng, message)
            }
            MessageType::EddsaSign(EddsaSignMessageType::R3Share) => {
                self.handle_round_three_msg(rng, message)
            }
            message_type => {
                error!("Incorrect MessageType given to EddsaSignParticipant: {message_type:?}");
                Err(InternalError::InternalInvariantFailed)
            }
        }
    }

    fn status(&self) -> &Status {
        &self.status
    }

    fn waiting_for(&self) -> Vec<PartyId> {
        let others = &self.other_participant_ids;
        if !self.status.is_ready() || *self.status() == Status::TerminatedSuccessfully {
            return Vec::new();
        }
        let missing = self.local_storage.missing_ids::<storage::Commit>(others);
        if !missing.is_empty() {
            return missing;
        }
        let missing = self.local_storage.missing_ids::<storage::Decommit>(others);
        if !missing.is_empty() {
            return missing;
        }
        self.local_storage.missing_ids::<storage::SigShare>(others)
    }
}

impl InnerProtocolParticipant for EddsaSignParticipant {
    type Context = SharedContext<Ed25519>;

    fn retrieve_context(&self) -> Self::Context {
        SharedContext::collect(self)
    }

    fn local_storage(&self) -> &LocalStorage {
        &self.local_storage
    }

    fn local_storage_mut(&mut self) -> &mut LocalStorage {
        &mut self.local_storage
    }

    fn status_mut(&mut self) -> &mut Status {
        &mut self.status
    }
}

impl EddsaSignParticipant {
    fn quorum(&self) -> Vec<PartyId> {
        let mut quorum = self.all_participants();
        quorum.sort();
        quorum
    }

    #[instrument(skip_all, err(Debug))]
    fn handle_ready_msg<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        message: &Message,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        info!("Handling ready EdDSA sign message.");
        let ready_outcome = self.process_ready_message(rng, message)?;
        let round_one_messages =
            run_only_once!(self, "eddsa sign round one", self.gen_round_one_msgs(rng))?;
        let cascade = self.maybe_finish_round_one(rng)?;
        ready_outcome
            .with_messages(round_one_messages)
            .consolidate(vec![cascade])
    }

    /// Round one: commit to the nonce point `Rᵢ = rᵢ·G`.
    #[instrument(skip_all, err(Debug))]
    fn gen_round_one_msgs<R: RngCore + CryptoRng>(&mut self, rng: &mut R) -> Result<Vec<Message>> {
        info!("Generating round one EdDSA sign messages.");

        let r = Scalar::random(rng);
        let nonce_point = Ed25519::generator().multiply_by_scalar(&r);
        self.local_storage
            .store::<storage::Nonce>(self.id.clone(), NoncePrivate { r });

        let decommit = EddsaSignDecommit {
            sid: self.sid,
            sender: self.id.clone(),
            nonce_point,
        };
        let commit = decommit.commit()?;
        self.local_storage
            .store::<storage::Commit>(self.id.clone(), commit.clone());
        self.local_storage
            .store::<storage::Decommit>(self.id.clone(), decommit);

        self.broadcast_for_other_participants(
            MessageType::EddsaSign(EddsaSignMessageType::R1CommitHash),
            &commit,
        )
    }

    #[instrument(skip_all, err(Debug))]
    fn handle_round_one_msg<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        message: &Message,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        self.check_for_duplicate_msg::<storage::Commit>(message.from())?;
        info!("Handling round one EdDSA sign message.");

        message.check_type(MessageType::EddsaSign(EddsaSignMessageType::R1CommitHash))?;
        let commit: EddsaSignCommit = deserialize!(&message.unverified_bytes)?;
        self.local_storage
            .store_once::<storage::Commit>(message.from().clone(), commit)?;

        self.maybe_finish_round_one(rng)
    }

    fn maybe_finish_round_one<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        let r1_done = self
            .local_storage
            .contains_for_all_ids::<storage::Commit>(&self.all_participants());
        if !r1_done || !self.run_once("eddsa sign round two")? {
            return Ok(ProcessOutcome::Incomplete);
        }

        let decommit = self.local_storage.retrieve::<storage::Decommit>(&self.id)?;
        let round_two_messages = self.broadcast_for_other_participants(
            MessageType::EddsaSign(EddsaSignMessageType::R2Decommit),
            decommit,
        )?;

        let mut outcomes = self
            .fetch_messages(MessageType::EddsaSign(EddsaSignMessageType::R2Decommit))?
            .iter()
            .map(|msg| self.handle_round_two_msg(rng, msg))
            .collect::<Result<Vec<_>>>()?;
        outcomes.push(self.maybe_finish_round_two(rng)?);
        ProcessOutcome::collect_with_messages(outcomes, round_two_messages)
    }

    #[instrument(skip_all, err(Debug))]
    fn handle_round_two_msg<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        message: &Message,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        self.check_for_duplicate_msg::<storage::Decommit>(message.from())?;

        let r1_done = self
            .local_storage
            .contains_for_all_ids::<storage::Commit>(&self.all_participants());
        if !r1_done {
            self.stash_message(message)?;
            return Ok(ProcessOutcome::Incomplete);
        }
        info!("Handling round two EdDSA sign message.");

        let commit = self.local_storage.retrieve::<storage::Commit>(message.from())?;
        let decommit = EddsaSignDecommit::from_message(message, commit)?;
        self.local_storage
            .store_once::<storage::Decommit>(message.from().clone(), decommit)?;

        self.maybe_finish_round_two(rng)
    }

    /// Round three: derive the RFC 8032 challenge and release the share.
    fn maybe_finish_round_two<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        let all = self.all_participants();
        if !self
            .local_storage
            .contains_for_all_ids::<storage::Decommit>(&all)
            || !self.run_once("eddsa sign round three")?
        {
            return Ok(ProcessOutcome::Incomplete);
        }
        info!("Deriving the EdDSA challenge.");

        let mut r_point = Ed25519::identity();
        for party in &all {
            let decommit = self.local_storage.retrieve::<storage::Decommit>(party)?;
            r_point = r_point + decommit.nonce_point;
        }
        self.local_storage
            .store::<storage::RPoint>(self.id.clone(), r_point);

        // h = SHA-512(enc(R) ‖ enc(A) ‖ M), little-endian, reduced mod q.
        let mut hasher = Sha512::new();
        hasher.update(r_point.to_bytes());
        hasher.update(self.input.keygen_output.public_key_bytes());
        hasher.update(&self.input.message);
        let challenge = Scalar::from_bytes_mod_order_wide(&hasher.finalize().into());
        self.local_storage
            .store::<storage::Challenge>(self.id.clone(), challenge);

        // sᵢ = rᵢ + h·λᵢ·xᵢ. The nonce is spent; wipe it.
        let lambda = vss::lagrange_coefficient_at_zero::<Ed25519>(&self.id, &self.quorum())?;
        let share = {
            let nonce = self.local_storage.retrieve::<storage::Nonce>(&self.id)?;
            nonce.r + challenge * lambda * self.input.keygen_output.private_share().as_scalar()
        };
        let _ = self.local_storage.remove::<storage::Nonce>(&self.id.clone())?;
        self.local_storage
            .store::<storage::SigShare>(self.id.clone(), share);

        let round_three_messages = self.broadcast_for_other_participants(
            MessageType::EddsaSign(EddsaSignMessageType::R3Share),
            &R3Payload { share },
        )?;

        let mut outcomes = self
            .fetch_messages(MessageType::EddsaSign(EddsaSignMessageType::R3Share))?
            .iter()
            .map(|msg| self.handle_round_three_msg(rng, msg))
            .collect::<Result<Vec<_>>>()?;
        outcomes.push(self.maybe_finish_protocol()?);
        ProcessOutcome::collect_with_messages(outcomes, round_three_messages)
    }

    #[instrument(skip_all, err(Debug))]
    fn handle_round_three_msg<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        message: &Message,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        let _ = rng;
        self.check_for_duplicate_msg::<storage::SigShare>(message.from())?;

        if !self.local_storage.contains::<storage::Challenge>(&self.id) {
            self.stash_message(message)?;
            return Ok(ProcessOutcome::Incomplete);
        }
        info!("Handling round three EdDSA sign message.");

        message.check_type(MessageType::EddsaSign(EddsaSignMessageType::R3Share))?;
        let payload: R3Payload = deserialize!(&message.unverified_bytes)?;

        // Each share is individually checkable:
        // sⱼ·G == Rⱼ + h·λⱼ·Xⱼ.
        let challenge = *self.local_storage.retrieve::<storage::Challenge>(&self.id)?;
        let sender_nonce_point = self
            .local_storage
            .retrieve::<storage::Decommit>(message.from())?
            .nonce_point;
        let lambda =
            vss::lagrange_coefficient_at_zero::<Ed25519>(message.from(), &self.quorum())?;
        let sender_public = self
            .input
            .keygen_output
            .find_public_share(message.from())?
            .as_ref()
            .to_owned();
        let lhs = Ed25519::generator().multiply_by_scalar(&payload.share);
        let rhs =
            sender_nonce_point + sender_public.multiply_by_scalar(&(challenge * lambda));
        if lhs != rhs {
            error!("Signature share from {} does not verify", message.from());
            return Err(InternalError::culprit(message.from()));
        }

        self.local_storage
            .store_once::<storage::SigShare>(message.from().clone(), payload.share)?;

        self.maybe_finish_protocol()
    }

    fn maybe_finish_protocol(
        &mut self,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        let all = self.all_participants();
        if !self
            .local_storage
            .contains_for_all_ids::<storage::SigShare>(&all)
        {
            return Ok(ProcessOutcome::Incomplete);
        }
        info!("Combining EdDSA signature shares.");

        let mut s = Scalar::ZERO;
        for party in &all {
            s += self.local_storage.remove::<storage::SigShare>(party)?;
        }
        let r_point = *self.local_storage.retrieve::<storage::RPoint>(&self.id)?;

        let r_bytes = r_point.to_bytes();
        let s_bytes = s.to_bytes().to_vec();
        let signature_bytes = [r_bytes.as_slice(), s_bytes.as_slice()].concat();

        // The output must satisfy a stock RFC 8032 verifier.
        let verifying_key =
            ed25519_dalek::VerifyingKey::from_bytes(&self.input.keygen_output.public_key_bytes())
                .map_err(|_| InternalError::InternalInvariantFailed)?;
        let dalek_signature = ed25519_dalek::Signature::from_bytes(
            signature_bytes
                .as_slice()
                .try_into()
                .map_err(|_| InternalError::InternalInvariantFailed)?,
        );
        verifying_key
            .verify_strict(&self.input.message, &dalek_signature)
            .map_err(|e| {
                error!("Assembled threshold EdDSA signature failed verification: {e:?}");
                InternalError::unattributed()
            })?;

        let output = SignatureData::eddsa(r_bytes, s_bytes, self.input.message.clone());
        self.status = Status::TerminatedSuccessfully;
        Ok(ProcessOutcome::Terminated(output))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        eddsa::output::testing::simulate_output_set,
        protocol::testing::test_party_ids,
        utils::testing::init_testing,
    };
    use ed25519_dalek::Verifier;
    use rand::{rngs::StdRng, Rng};
    use std::collections::HashMap;

    /// Run a signing session. With `through_wire` set, every message is
    /// round-tripped through the stable wire encoding before delivery.
    pub(crate) fn run_eddsa_signing(
        signers: &[PartyId],
        outputs: &[Output],
        message: &[u8],
        through_wire: bool,
        rng: &mut StdRng,
    ) -> Result<Vec<SignatureData>> {
        let sid = Identifier::random(rng);
        let mut quorum: Vec<EddsaSignParticipant> = signers
            .iter()
            .zip(outputs.iter())
            .map(|(party, output)| {
                let others = signers
                    .iter()
                    .filter(|p| *p != party)
                    .cloned()
                    .collect::<Vec<_>>();
                EddsaSignParticipant::new(
                    sid,
                    party.clone(),
                    others,
                    Input::new(message.to_vec(), output.clone()),
                )
            })
            .collect::<Result<Vec<_>>>()?;

        let mut inboxes: HashMap<PartyId, Vec<Message>> = quorum
            .iter()
            .map(|p| (p.id().clone(), Vec::new()))
            .collect();
        let mut signatures: Vec<Option<SignatureData>> =
            std::iter::repeat_with(|| None).take(quorum.len()).collect();

        for participant in quorum.iter() {
            let empty: [u8; 0] = [];
            let ready = Message::new(
                EddsaSignParticipant::ready_type(),
                participant.sid(),
                participant.id().clone(),
                participant.id().clone(),
                &empty,
            )?;
            inboxes.get_mut(participant.id()).unwrap().push(ready);
        }

        let deliver = |m: Message, inboxes: &mut HashMap<PartyId, Vec<Message>>| -> Result<()> {
            let m = if through_wire
                && m.message_type() != EddsaSignParticipant::ready_type()
            {
                let bytes = m.to_wire_bytes("org.example")?;
                Message::from_wire_bytes(&bytes, m.id(), m.from(), m.is_broadcast(), m.to())?
            } else {
                m
            };
            inboxes.get_mut(m.to()).unwrap().push(m);
            Ok(())
        };

        while !quorum
            .iter()
            .all(|p| *p.status() == Status::TerminatedSuccessfully)
        {
            let index = rng.gen_range(0..quorum.len());
            let participant = &mut quorum[index];
            let inbox = inboxes.get_mut(participant.id()).unwrap();
            if inbox.is_empty() {
                continue;
            }
            let msg = inbox.remove(rng.gen_range(0..inbox.len()));
            match participant.process_message(rng, &msg)? {
                ProcessOutcome::Incomplete => {}
                ProcessOutcome::Processed(messages) => {
                    for m in messages {
                        deliver(m, &mut inboxes)?;
                    }
                }
                ProcessOutcome::Terminated(output) => signatures[index] = Some(output),
                ProcessOutcome::TerminatedForThisParticipant(output, messages) => {
                    for m in messages {
                        deliver(m, &mut inboxes)?;
                    }
                    signatures[index] = Some(output);
                }
            }
        }
        Ok(signatures.into_iter().flatten().collect())
    }

    fn verify_with_stock_ed25519(output: &Output, message: &[u8], signature: &SignatureData) {
        assert_eq!(signature.signature().len(), 64);
        let vk = ed25519_dalek::VerifyingKey::from_bytes(&output.public_key_bytes()).unwrap();
        let sig =
            ed25519_dalek::Signature::from_bytes(signature.signature().try_into().unwrap());
        vk.verify(message, &sig).unwrap();
    }

    #[test]
    fn single_party_signature_passes_a_stock_verifier() {
        let mut rng = init_testing();
        let parties = test_party_ids(1);
        let outputs = simulate_output_set(&parties, 0, &mut rng).unwrap();
        let message = b"Hello, FROST Ed25519 Standard Compatibility Test!";

        let signatures =
            run_eddsa_signing(&parties, &outputs, message, false, &mut rng).unwrap();
        assert_eq!(signatures.len(), 1);
        verify_with_stock_ed25519(&outputs[0], message, &signatures[0]);
        assert_eq!(signatures[0].message(), message);
        assert!(signatures[0].recovery_id().is_none());
    }

    #[test]
    fn threshold_signature_passes_a_stock_verifier() {
        let mut rng = init_testing();
        let parties = test_party_ids(4);
        let outputs = simulate_output_set(&parties, 1, &mut rng).unwrap();
        let message = b"threshold schnorr over edwards25519";

        // Quorum of two out of four.
        let signers = vec![parties[1].clone(), parties[3].clone()];
        let signer_outputs = vec![outputs[1].clone(), outputs[3].clone()];
        let signatures =
            run_eddsa_signing(&signers, &signer_outputs, message, false, &mut rng).unwrap();
        for signature in &signatures {
            assert_eq!(signature, &signatures[0]);
            verify_with_stock_ed25519(&outputs[0], message, signature);
        }
    }

    #[test]
    fn signatures_survive_the_wire_encoding() {
        let mut rng = init_testing();
        let parties = test_party_ids(3);
        let outputs = simulate_output_set(&parties, 2, &mut rng).unwrap();
        // A fixed 32-byte message; the run exercises leading-zero handling
        // in the scalar codecs regardless of where the zeros fall.
        let message = [0u8; 32];

        let signatures =
            run_eddsa_signing(&parties, &outputs, &message, true, &mut rng).unwrap();
        for signature in &signatures {
            verify_with_stock_ed25519(&outputs[0], &message, signature);
        }
    }

    #[test]
    fn tampered_share_names_the_culprit() {
        let mut rng = init_testing();
        let parties = test_party_ids(2);
        let outputs = simulate_output_set(&parties, 1, &mut rng).unwrap();

        // Corrupt one party's private share so its round-three share fails
        // the per-share check.
        let mut bad_outputs = outputs.clone();
        let mut corrupted = simulate_output_set(&parties, 1, &mut rng).unwrap();
        bad_outputs[1] = corrupted.remove(1);

        let result = run_eddsa_signing(&parties, &bad_outputs, b"tamper", false, &mut rng);
        match result {
            Err(err) => assert!(!err.culprits().is_empty()),
            Ok(_) => panic!("a corrupted share must abort the session"),
        }
    }
}
