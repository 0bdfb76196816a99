//! EdDSA distributed key generation.
//!
//! The same commit / reveal-and-share / prove skeleton as the ECDSA keygen,
//! compressed to three rounds because threshold Schnorr needs no Paillier
//! machinery:
//! 1. commit to the Feldman commitment vector and a Schnorr nonce,
//! 2. open the commitment and deal the shares,
//! 3. prove knowledge of the final share; output the joint Edwards point.

use crate::{
    curve::{CurveTrait, ScalarTrait},
    ed25519::Ed25519,
    errors::{CallerError, InternalError, Result},
    keygen::{KeySharePrivate, KeySharePublic},
    local_storage::{LocalStorage, TypeTag},
    messages::{EddsaKeygenMessageType, Message, MessageType, ProtocolType},
    participant::{InnerProtocolParticipant, ProcessOutcome, ProtocolParticipant, Status},
    protocol::{Identifier, PartyId, SharedContext},
    vss::{self, Polynomial},
    zkp::pisch::{self, PiSchPrecommit, PiSchProof},
};
use merlin::Transcript;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use super::output::Output;

type Scalar = <Ed25519 as CurveTrait>::Scalar;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
struct EddsaKeygenCommit {
    hash: [u8; 32],
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct EddsaKeygenDecommit {
    sid: Identifier,
    sender: PartyId,
    rid: [u8; 32],
    coeff_commitments: Vec<Ed25519>,
    precommit: Ed25519,
}

impl EddsaKeygenDecommit {
    fn new<R: RngCore + CryptoRng>(
        rng: &mut R,
        sid: &Identifier,
        sender: &PartyId,
        coeff_commitments: Vec<Ed25519>,
        precommit: Ed25519,
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

    fn commit(&self) -> Result<EddsaKeygenCommit> {
        let mut transcript = Transcript::new(b"EddsaKeygenR1");
        transcript.append_message(b"decom", &serialize!(&self)?);
        let mut hash = [0u8; 32];
        transcript.challenge_bytes(b"hashing r1", &mut hash);
        Ok(EddsaKeygenCommit { hash })
    }

    fn from_message(
        message: &Message,
        com: &EddsaKeygenCommit,
        expected_commitments: usize,
    ) -> Result<Self> {
        message.check_type(MessageType::EddsaKeygen(EddsaKeygenMessageType::R2Decommit))?;
        let decommit: EddsaKeygenDecommit = deserialize!(&message.unverified_bytes)?;

        let rebuilt = decommit.commit()?;
        if !crate::utils::ct_eq(&rebuilt.hash, &com.hash) {
            error!("Decommitment does not match the original commitment");
            return Err(InternalError::culprit(message.from()));
        }
        if decommit.sid != message.id() || &decommit.sender != message.from() {
            error!("Decommitment carries the wrong header");
            return Err(InternalError::culprit(message.from()));
        }
        if decommit.coeff_commitments.len() != expected_commitments {
            error!("Decommitment carries the wrong number of polynomial commitments");
            return Err(InternalError::culprit(message.from()));
        }
        Ok(decommit)
    }
}

mod storage {
    use super::*;

    pub(super) struct Commit;
    impl TypeTag for Commit {
        type Value = EddsaKeygenCommit;
    }
    pub(super) struct Decommit;
    impl TypeTag for Decommit {
        type Value = EddsaKeygenDecommit;
    }
    pub(super) struct SecretPolynomial;
    impl TypeTag for SecretPolynomial {
        type Value = Polynomial<Ed25519>;
    }
    pub(super) struct SchnorrPrecommit;
    impl TypeTag for SchnorrPrecommit {
        type Value = PiSchPrecommit<Ed25519>;
    }
    pub(super) struct RawShare;
    impl TypeTag for RawShare {
        type Value = Scalar;
    }
    pub(super) struct GlobalRid;
    impl TypeTag for GlobalRid {
        type Value = [u8; 32];
    }
    pub(super) struct FinalShare;
    impl TypeTag for FinalShare {
        type Value = KeySharePrivate<Ed25519>;
    }
    pub(super) struct PublicShares;
    impl TypeTag for PublicShares {
        type Value = Vec<KeySharePublic<Ed25519>>;
    }
    pub(super) struct SchnorrDone;
    impl TypeTag for SchnorrDone {
        type Value = ();
    }
}

/// Input to EdDSA key generation: the threshold.
#[derive(Debug)]
pub struct Input {
    threshold: usize,
}

impl Input {
    /// Assemble keygen input.
    pub fn new(threshold: usize) -> Self {
        Self { threshold }
    }
}

#[derive(Serialize, Deserialize)]
struct SharePayload {
    share: Scalar,
}

/// A party running EdDSA distributed key generation.
#[derive(Debug)]
pub struct EddsaKeygenParticipant {
    sid: Identifier,
    id: PartyId,
    other_participant_ids: Vec<PartyId>,
    local_storage: LocalStorage,
    input: Input,
    status: Status,
}

impl ProtocolParticipant for EddsaKeygenParticipant {
    type Input = Input;
    type Output = Output;

    fn new(
        sid: Identifier,
        id: PartyId,
        other_participant_ids: Vec<PartyId>,
        input: Self::Input,
    ) -> Result<Self> {
        if input.threshold + 1 > other_participant_ids.len() + 1 {
            error!("Keygen threshold must satisfy t + 1 <= n");
            Err(CallerError::ParticipantConfigError)?;
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
        MessageType::EddsaKeygen(EddsaKeygenMessageType::Ready)
    }

    fn protocol_type() -> ProtocolType {
        ProtocolType::EddsaKeygen
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
            "EDDSA KEYGEN: party {} received {:?} from {}",
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
            MessageType::EddsaKeygen(EddsaKeygenMessageType::Ready) => {
                self.handle_ready_msg(rng, message)
            }
            MessageType::EddsaKeygen(EddsaKeygenMessageType::R1CommitHash) => {
                self.handle_round_one_msg(rng, message)
            }
            MessageType::EddsaKeygen(EddsaKeygenMessageType::R2Decommit) => {
                self.handle_round_two_decommit(rng, message)
            }
            MessageType::EddsaKeygen(EddsaKeygenMessageType::R2PrivateShare) => {
                self.handle_round_two_share(rng, message)
            }
            MessageType::EddsaKeygen(EddsaKeygenMessageType::R3SchnorrProof) => {
                self.handle_round_three_msg(rng, message)
            }
            message_type => {
                error!("Incorrect MessageType given to EddsaKeygenParticipant: {message_type:?}");
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
        let mut missing = self.local_storage.missing_ids::<storage::Decommit>(others);
        for party in self.local_storage.missing_ids::<storage::RawShare>(others) {
            if !missing.contains(&party) {
                missing.push(party);
            }
        }
        if !missing.is_empty() {
            return missing;
        }
        self.local_storage.missing_ids::<storage::SchnorrDone>(others)
    }
}

impl InnerProtocolParticipant for EddsaKeygenParticipant {
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

impl EddsaKeygenParticipant {
    #[instrument(skip_all, err(Debug))]
    fn handle_ready_msg<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        message: &Message,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        info!("Handling ready EdDSA keygen message.");
        let ready_outcome = self.process_ready_message(rng, message)?;
        let round_one_messages =
            run_only_once!(self, "eddsa keygen round one", self.gen_round_one_msgs(rng))?;
        let cascade = self.maybe_finish_round_one(rng)?;
        ready_outcome
            .with_messages(round_one_messages)
            .consolidate(vec![cascade])
    }

    #[instrument(skip_all, err(Debug))]
    fn gen_round_one_msgs<R: RngCore + CryptoRng>(&mut self, rng: &mut R) -> Result<Vec<Message>> {
        info!("Generating round one EdDSA keygen messages.");

        let polynomial =
            Polynomial::<Ed25519>::sample(Scalar::random(rng), self.input.threshold, rng);
        let coeff_commitments = polynomial.commitments();
        self.local_storage
            .store::<storage::SecretPolynomial>(self.id.clone(), polynomial);

        let sch_precommit = PiSchProof::<Ed25519>::precommit(rng)?;
        let precommit_point = *sch_precommit.precommitment();
        self.local_storage
            .store::<storage::SchnorrPrecommit>(self.id.clone(), sch_precommit);

        let decommit = EddsaKeygenDecommit::new(
            rng,
            &self.sid,
            &self.id,
            coeff_commitments,
            precommit_point,
        );
        let commit = decommit.commit()?;
        self.local_storage
            .store::<storage::Commit>(self.id.clone(), commit.clone());
        self.local_storage
            .store::<storage::Decommit>(self.id.clone(), decommit);

        self.broadcast_for_other_participants(
            MessageType::EddsaKeygen(EddsaKeygenMessageType::R1CommitHash),
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
        info!("Handling round one EdDSA keygen message.");

        message.check_type(MessageType::EddsaKeygen(EddsaKeygenMessageType::R1CommitHash))?;
        let commit: EddsaKeygenCommit = deserialize!(&message.unverified_bytes)?;
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
        if !r1_done {
            return Ok(ProcessOutcome::Incomplete);
        }

        let round_two_messages =
            run_only_once!(self, "eddsa keygen round two", self.gen_round_two_msgs())?;

        let mut outcomes = self
            .fetch_messages(MessageType::EddsaKeygen(
                EddsaKeygenMessageType::R2PrivateShare,
            ))?
            .iter()
            .map(|msg| self.handle_round_two_share(rng, msg))
            .collect::<Result<Vec<_>>>()?;
        let decommit_outcomes = self
            .fetch_messages(MessageType::EddsaKeygen(EddsaKeygenMessageType::R2Decommit))?
            .iter()
            .map(|msg| self.handle_round_two_decommit(rng, msg))
            .collect::<Result<Vec<_>>>()?;
        outcomes.extend(decommit_outcomes);
        outcomes.push(self.maybe_finish_round_two(rng)?);
        ProcessOutcome::collect_with_messages(outcomes, round_two_messages)
    }

    #[instrument(skip_all, err(Debug))]
    fn gen_round_two_msgs(&mut self) -> Result<Vec<Message>> {
        info!("Generating round two EdDSA keygen messages.");

        let decommit = self.local_storage.retrieve::<storage::Decommit>(&self.id)?;
        let mut messages = self.broadcast_for_other_participants(
            MessageType::EddsaKeygen(EddsaKeygenMessageType::R2Decommit),
            decommit,
        )?;

        let polynomial = self
            .local_storage
            .retrieve::<storage::SecretPolynomial>(&self.id)?;
        let share_messages = self
            .other_participant_ids
            .clone()
            .into_iter()
            .map(|other| {
                let share = polynomial.evaluate_at_party(&other)?;
                Message::new(
                    MessageType::EddsaKeygen(EddsaKeygenMessageType::R2PrivateShare),
                    self.sid,
                    self.id.clone(),
                    other,
                    &SharePayload { share },
                )
            })
            .collect::<Result<Vec<_>>>()?;
        messages.extend(share_messages);
        Ok(messages)
    }

    #[instrument(skip_all, err(Debug))]
    fn handle_round_two_decommit<R: RngCore + CryptoRng>(
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
        info!("Handling round two EdDSA keygen decommitment.");

        let commit = self.local_storage.retrieve::<storage::Commit>(message.from())?;
        let decommit =
            EddsaKeygenDecommit::from_message(message, commit, self.input.threshold + 1)?;
        self.local_storage
            .store_once::<storage::Decommit>(message.from().clone(), decommit)?;

        self.maybe_finish_round_two(rng)
    }

    #[instrument(skip_all, err(Debug))]
    fn handle_round_two_share<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        message: &Message,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        self.check_for_duplicate_msg::<storage::RawShare>(message.from())?;
        info!("Handling round two EdDSA keygen share.");

        message.check_type(MessageType::EddsaKeygen(
            EddsaKeygenMessageType::R2PrivateShare,
        ))?;
        let payload: SharePayload = deserialize!(&message.unverified_bytes)?;
        self.local_storage
            .store_once::<storage::RawShare>(message.from().clone(), payload.share)?;

        self.maybe_finish_round_two(rng)
    }

    fn maybe_finish_round_two<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        let all = self.all_participants();
        let others = self.other_participant_ids.clone();
        let r2_done = self
            .local_storage
            .contains_for_all_ids::<storage::Decommit>(&all)
            && self
                .local_storage
                .contains_for_all_ids::<storage::RawShare>(&others);
        if !r2_done || !self.run_once("eddsa keygen finish round two")? {
            return Ok(ProcessOutcome::Incomplete);
        }
        info!("Finishing EdDSA keygen round two.");

        for dealer in &others {
            let decommit = self.local_storage.retrieve::<storage::Decommit>(dealer)?;
            let commitments = decommit.coeff_commitments.clone();
            let share = self.local_storage.retrieve::<storage::RawShare>(dealer)?;
            if !vss::verify_share::<Ed25519>(share, &commitments, &self.id)? {
                error!("Feldman share from {dealer} does not match its commitments");
                return Err(InternalError::culprit(dealer));
            }
        }

        let polynomial = self
            .local_storage
            .retrieve::<storage::SecretPolynomial>(&self.id)?;
        let mut final_share = polynomial.evaluate_at_party(&self.id)?;
        for dealer in &others {
            final_share = final_share.add(self.local_storage.retrieve::<storage::RawShare>(dealer)?);
        }
        self.local_storage
            .store::<storage::FinalShare>(self.id.clone(), KeySharePrivate::new(final_share));

        let mut global_rid = [0u8; 32];
        for party in &all {
            let decommit = self.local_storage.retrieve::<storage::Decommit>(party)?;
            for (acc, byte) in global_rid.iter_mut().zip(decommit.rid.iter()) {
                *acc ^= byte;
            }
        }
        self.local_storage
            .store::<storage::GlobalRid>(self.id.clone(), global_rid);

        let mut public_shares = Vec::with_capacity(all.len());
        for party in &all {
            let x = party.coordinate::<Ed25519>()?;
            let mut sum = Ed25519::identity();
            for dealer in &all {
                let decommit = self.local_storage.retrieve::<storage::Decommit>(dealer)?;
                sum = sum + vss::eval_public(&decommit.coeff_commitments, &x);
            }
            public_shares.push(KeySharePublic::new(party.clone(), sum));
        }
        self.local_storage
            .store::<storage::PublicShares>(self.id.clone(), public_shares);

        let round_three_messages =
            run_only_once!(self, "eddsa keygen round three", self.gen_round_three_msgs())?;

        let mut outcomes = self
            .fetch_messages(MessageType::EddsaKeygen(
                EddsaKeygenMessageType::R3SchnorrProof,
            ))?
            .iter()
            .map(|msg| self.handle_round_three_msg(rng, msg))
            .collect::<Result<Vec<_>>>()?;
        outcomes.push(self.maybe_finish_protocol()?);
        ProcessOutcome::collect_with_messages(outcomes, round_three_messages)
    }

    #[instrument(skip_all, err(Debug))]
    fn gen_round_three_msgs(&mut self) -> Result<Vec<Message>> {
        info!("Generating round three EdDSA keygen messages.");

        let context = self.retrieve_context();
        let global_rid = *self.local_storage.retrieve::<storage::GlobalRid>(&self.id)?;
        let precommit = self
            .local_storage
            .retrieve::<storage::SchnorrPrecommit>(&self.id)?
            .clone();
        let final_share = self.local_storage.retrieve::<storage::FinalShare>(&self.id)?;
        let public_share = final_share.public_point();

        let transcript = schnorr_proof_transcript(self.sid, &global_rid, &self.id)?;
        let proof = PiSchProof::prove_from_precommit(
            &context,
            &precommit,
            &pisch::CommonInput::new(&public_share),
            &pisch::ProverSecret::<Ed25519>::new(final_share.as_scalar()),
            &transcript,
        )?;

        self.broadcast_for_other_participants(
            MessageType::EddsaKeygen(EddsaKeygenMessageType::R3SchnorrProof),
            &proof,
        )
    }

    #[instrument(skip_all, err(Debug))]
    fn handle_round_three_msg<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        message: &Message,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        let _ = rng;
        self.check_for_duplicate_msg::<storage::SchnorrDone>(message.from())?;

        if !self.local_storage.contains::<storage::PublicShares>(&self.id) {
            info!("Not yet ready to handle round three EdDSA keygen message; stashing.");
            self.stash_message(message)?;
            return Ok(ProcessOutcome::Incomplete);
        }
        info!("Handling round three EdDSA keygen message.");

        message.check_type(MessageType::EddsaKeygen(
            EddsaKeygenMessageType::R3SchnorrProof,
        ))?;
        let proof: PiSchProof<Ed25519> = deserialize!(&message.unverified_bytes)?;

        let context = self.retrieve_context();
        let global_rid = *self.local_storage.retrieve::<storage::GlobalRid>(&self.id)?;
        let decommit = self.local_storage.retrieve::<storage::Decommit>(message.from())?;
        let precommit_point = decommit.precommit;
        let public_shares = self.local_storage.retrieve::<storage::PublicShares>(&self.id)?;
        let sender_share = public_shares
            .iter()
            .find(|share| share.participant() == message.from())
            .ok_or(InternalError::InternalInvariantFailed)?
            .as_ref()
            .to_owned();

        let transcript = schnorr_proof_transcript(self.sid, &global_rid, message.from())?;
        proof
            .verify_with_precommit(
                pisch::CommonInput::new(&sender_share),
                &context,
                &transcript,
                &precommit_point,
            )
            .map_err(|_| InternalError::culprit(message.from()))?;

        self.local_storage
            .store_once::<storage::SchnorrDone>(message.from().clone(), ())?;

        self.maybe_finish_protocol()
    }

    fn maybe_finish_protocol(
        &mut self,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        let others = self.other_participant_ids.clone();
        let done = self
            .local_storage
            .contains_for_all_ids::<storage::SchnorrDone>(&others)
            && self.local_storage.contains::<storage::FinalShare>(&self.id);
        if !done {
            return Ok(ProcessOutcome::Incomplete);
        }
        info!("EdDSA keygen complete; assembling save data.");

        let all = self.all_participants();
        let mut vss_commitments = Vec::with_capacity(all.len());
        for party in &all {
            let decommit = self.local_storage.retrieve::<storage::Decommit>(party)?;
            vss_commitments.push((party.clone(), decommit.coeff_commitments.clone()));
        }
        let public_shares = self
            .local_storage
            .remove::<storage::PublicShares>(&self.id.clone())?;
        let private_share = self
            .local_storage
            .remove::<storage::FinalShare>(&self.id.clone())?;
        let global_rid = *self.local_storage.retrieve::<storage::GlobalRid>(&self.id)?;

        let mut sorted = all;
        sorted.sort();
        let output = Output::from_parts(
            sorted,
            self.input.threshold,
            global_rid,
            vss_commitments,
            public_shares,
            private_share,
            &self.id,
        )?;

        self.status = Status::TerminatedSuccessfully;
        Ok(ProcessOutcome::Terminated(output))
    }
}

fn schnorr_proof_transcript(
    sid: Identifier,
    global_rid: &[u8; 32],
    sender: &PartyId,
) -> Result<Transcript> {
    let mut transcript = Transcript::new(b"eddsa keygen schnorr");
    transcript.append_message(b"sid", &serialize!(&sid)?);
    transcript.append_message(b"rid", global_rid);
    transcript.append_message(b"sender", &serialize!(sender)?);
    Ok(transcript)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{protocol::testing::test_party_ids, utils::testing::init_testing, vss};
    use rand::{rngs::StdRng, Rng};
    use std::collections::HashMap;

    pub(crate) fn run_eddsa_keygen(
        parties: &[PartyId],
        threshold: usize,
        rng: &mut StdRng,
    ) -> Result<Vec<Output>> {
        let sid = Identifier::random(rng);
        let mut quorum: Vec<EddsaKeygenParticipant> = parties
            .iter()
            .map(|party| {
                let others = parties
                    .iter()
                    .filter(|p| *p != party)
                    .cloned()
                    .collect::<Vec<_>>();
                EddsaKeygenParticipant::new(sid, party.clone(), others, Input::new(threshold))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut inboxes: HashMap<PartyId, Vec<Message>> = quorum
            .iter()
            .map(|p| (p.id().clone(), Vec::new()))
            .collect();
        let mut outputs: Vec<Option<Output>> =
            std::iter::repeat_with(|| None).take(quorum.len()).collect();

        for participant in quorum.iter() {
            let empty: [u8; 0] = [];
            let ready = Message::new(
                EddsaKeygenParticipant::ready_type(),
                participant.sid(),
                participant.id().clone(),
                participant.id().clone(),
                &empty,
            )?;
            inboxes.get_mut(participant.id()).unwrap().push(ready);
        }

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
            let message = inbox.remove(rng.gen_range(0..inbox.len()));
            match participant.process_message(rng, &message)? {
                ProcessOutcome::Incomplete => {}
                ProcessOutcome::Processed(messages) => {
                    for m in messages {
                        inboxes.get_mut(m.to()).unwrap().push(m);
                    }
                }
                ProcessOutcome::Terminated(output) => outputs[index] = Some(output),
                ProcessOutcome::TerminatedForThisParticipant(output, messages) => {
                    for m in messages {
                        inboxes.get_mut(m.to()).unwrap().push(m);
                    }
                    outputs[index] = Some(output);
                }
            }
        }
        Ok(outputs.into_iter().flatten().collect())
    }

    #[test]
    fn eddsa_keygen_produces_consistent_save_data() {
        let mut rng = init_testing();
        let parties = test_party_ids(3);
        let outputs = run_eddsa_keygen(&parties, 1, &mut rng).unwrap();
        assert_eq!(outputs.len(), 3);

        let key = outputs[0].public_key_point();
        for output in &outputs {
            assert_eq!(output.public_key_point(), key);
        }

        for subset in [[0usize, 1], [1, 2]] {
            let shares: Vec<_> = subset
                .iter()
                .map(|&i| {
                    (
                        parties[i].clone(),
                        *outputs[i].private_share().as_scalar(),
                    )
                })
                .collect();
            let secret = vss::reconstruct::<Ed25519>(&shares).unwrap();
            assert_eq!(Ed25519::generator().multiply_by_scalar(&secret), key);
        }
    }

    #[test]
    fn single_party_eddsa_keygen_completes() {
        let mut rng = init_testing();
        let parties = test_party_ids(1);
        let outputs = run_eddsa_keygen(&parties, 0, &mut rng).unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].public_key_bytes().len(), 32);
    }
}
