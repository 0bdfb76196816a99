//! EdDSA share rotation.
//!
//! The mirror of the ECDSA resharing protocol minus all Paillier work: the
//! old committee re-deals its Lagrange-weighted shares under the new
//! threshold, the new committee verifies, sums, and proves its new shares.
//! The joint Edwards point never changes.

use crate::{
    curve::{CurveTrait, ScalarTrait},
    ed25519::Ed25519,
    errors::{CallerError, InternalError, Result},
    keygen::{KeySharePrivate, KeySharePublic},
    local_storage::{LocalStorage, TypeTag},
    messages::{EddsaResharingMessageType, Message, MessageType, ProtocolType},
    participant::{InnerProtocolParticipant, ProcessOutcome, ProtocolParticipant, Status},
    protocol::{Identifier, PartyId, ReSharingParameters, SharedContext},
    vss::{self, Polynomial},
    zkp::{
        pisch::{self, PiSchProof},
        Proof,
    },
};
use merlin::Transcript;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use super::output::Output;

type Scalar = <Ed25519 as CurveTrait>::Scalar;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
struct ResharingCommit {
    hash: [u8; 32],
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct ResharingDecommit {
    sid: Identifier,
    sender: PartyId,
    rid: [u8; 32],
    coeff_commitments: Vec<Ed25519>,
}

impl ResharingDecommit {
    fn new<R: RngCore + CryptoRng>(
        rng: &mut R,
        sid: &Identifier,
        sender: &PartyId,
        coeff_commitments: Vec<Ed25519>,
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

    fn commit(&self) -> Result<ResharingCommit> {
        let mut transcript = Transcript::new(b"EddsaResharingR1");
        transcript.append_message(b"decom", &serialize!(&self)?);
        let mut hash = [0u8; 32];
        transcript.challenge_bytes(b"hashing r1", &mut hash);
        Ok(ResharingCommit { hash })
    }

    fn from_message(
        message: &Message,
        com: &ResharingCommit,
        expected_commitments: usize,
    ) -> Result<Self> {
        message.check_type(MessageType::EddsaResharing(
            EddsaResharingMessageType::R2Decommit,
        ))?;
        let decommit: ResharingDecommit = deserialize!(&message.unverified_bytes)?;

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

mod storage {
    use super::*;

    pub(super) struct OldCommit;
    impl TypeTag for OldCommit {
        type Value = ResharingCommit;
    }
    pub(super) struct OldDecommit;
    impl TypeTag for OldDecommit {
        type Value = ResharingDecommit;
    }
    pub(super) struct SecretPolynomial;
    impl TypeTag for SecretPolynomial {
        type Value = Polynomial<Ed25519>;
    }
    pub(super) struct RawShare;
    impl TypeTag for RawShare {
        type Value = Scalar;
    }
    pub(super) struct GlobalRid;
    impl TypeTag for GlobalRid {
        type Value = [u8; 32];
    }
    pub(super) struct NewShare;
    impl TypeTag for NewShare {
        type Value = KeySharePrivate<Ed25519>;
    }
    pub(super) struct NewPublicShares;
    impl TypeTag for NewPublicShares {
        type Value = Vec<KeySharePublic<Ed25519>>;
    }
    pub(super) struct SchnorrDone;
    impl TypeTag for SchnorrDone {
        type Value = ();
    }
}

/// Input to EdDSA resharing.
#[derive(Debug)]
pub struct Input {
    old_committee: Vec<PartyId>,
    new_committee: Vec<PartyId>,
    new_threshold: usize,
    expected_public_key: Ed25519,
    old_output: Option<Output>,
}

impl Input {
    /// Assemble resharing input for one party.
    pub fn new(
        resharing: &ReSharingParameters<Ed25519>,
        expected_public_key: Ed25519,
        old_output: Option<Output>,
    ) -> Result<Self> {
        if resharing.is_old_committee() {
            let output = old_output.as_ref().ok_or_else(|| {
                error!("Old-committee members must supply their save data");
                InternalError::from(CallerError::BadInput)
            })?;
            if output.public_key_point() != expected_public_key {
                error!("Save data does not match the expected public key");
                Err(CallerError::BadInput)?;
            }
            if resharing.old_threshold() != output.threshold() {
                error!("Old threshold does not match the save data");
                Err(CallerError::BadInput)?;
            }
        } else if !resharing.new_peers().contains(resharing.self_id()) {
            error!("Party is in neither committee");
            Err(CallerError::ParticipantConfigError)?;
        }
        Ok(Self {
            old_committee: resharing.old_peers().ids().to_vec(),
            new_committee: resharing.new_peers().ids().to_vec(),
            new_threshold: resharing.new_threshold(),
            expected_public_key,
            old_output,
        })
    }
}

#[derive(Serialize, Deserialize)]
struct SharePayload {
    share: Scalar,
}

/// A party running the EdDSA resharing protocol.
///
/// New-committee members output fresh save data; outgoing-only members
/// output `None`.
#[derive(Debug)]
pub struct EddsaResharingParticipant {
    sid: Identifier,
    id: PartyId,
    other_participant_ids: Vec<PartyId>,
    local_storage: LocalStorage,
    input: Input,
    status: Status,
}

impl ProtocolParticipant for EddsaResharingParticipant {
    type Input = Input;
    type Output = Option<Output>;

    fn new(
        sid: Identifier,
        id: PartyId,
        other_participant_ids: Vec<PartyId>,
        input: Self::Input,
    ) -> Result<Self> {
        if !input.old_committee.contains(&id) && !input.new_committee.contains(&id) {
            error!("Party is in neither resharing committee");
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
        MessageType::EddsaResharing(EddsaResharingMessageType::Ready)
    }

    fn protocol_type() -> ProtocolType {
        ProtocolType::EddsaResharing
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
            "EDDSA RESHARING: party {} received {:?} from {}",
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
            MessageType::EddsaResharing(EddsaResharingMessageType::Ready) => {
                self.handle_ready_msg(rng, message)
            }
            MessageType::EddsaResharing(EddsaResharingMessageType::R1OldCommit) => {
                self.handle_old_commit(rng, message)
            }
            MessageType::EddsaResharing(EddsaResharingMessageType::R2Decommit) => {
                self.handle_decommit(rng, message)
            }
            MessageType::EddsaResharing(EddsaResharingMessageType::R2PrivateShare) => {
                self.handle_share(rng, message)
            }
            MessageType::EddsaResharing(EddsaResharingMessageType::R3SchnorrProof) => {
                self.handle_schnorr_proof(rng, message)
            }
            message_type => {
                error!(
                    "Incorrect MessageType given to EddsaResharingParticipant: {message_type:?}"
                );
                Err(InternalError::InternalInvariantFailed)
            }
        }
    }

    fn status(&self) -> &Status {
        &self.status
    }

    fn waiting_for(&self) -> Vec<PartyId> {
        if !self.status.is_ready() || *self.status() == Status::TerminatedSuccessfully {
            return Vec::new();
        }
        let old_others = self.old_others();
        let missing = self.local_storage.missing_ids::<storage::OldCommit>(&old_others);
        if !missing.is_empty() {
            return missing;
        }
        let mut missing = self
            .local_storage
            .missing_ids::<storage::OldDecommit>(&old_others);
        if self.is_new() {
            for party in self.local_storage.missing_ids::<storage::RawShare>(&old_others) {
                if !missing.contains(&party) {
                    missing.push(party);
                }
            }
        }
        if !missing.is_empty() {
            return missing;
        }
        if self.is_new() {
            return self
                .local_storage
                .missing_ids::<storage::SchnorrDone>(&self.new_others());
        }
        Vec::new()
    }
}

impl InnerProtocolParticipant for EddsaResharingParticipant {
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

impl EddsaResharingParticipant {
    fn is_old(&self) -> bool {
        self.input.old_committee.contains(&self.id)
    }

    fn is_new(&self) -> bool {
        self.input.new_committee.contains(&self.id)
    }

    fn old_others(&self) -> Vec<PartyId> {
        self.input
            .old_committee
            .iter()
            .filter(|p| *p != &self.id)
            .cloned()
            .collect()
    }

    fn new_others(&self) -> Vec<PartyId> {
        self.input
            .new_committee
            .iter()
            .filter(|p| *p != &self.id)
            .cloned()
            .collect()
    }

    #[instrument(skip_all, err(Debug))]
    fn handle_ready_msg<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        message: &Message,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        info!("Handling ready EdDSA resharing message.");
        let ready_outcome = self.process_ready_message(rng, message)?;
        let round_one_messages = run_only_once!(
            self,
            "eddsa resharing round one",
            self.gen_round_one_msgs(rng)
        )?;
        let cascade = self.maybe_start_sharing(rng)?;
        ready_outcome
            .with_messages(round_one_messages)
            .consolidate(vec![cascade])
    }

    #[instrument(skip_all, err(Debug))]
    fn gen_round_one_msgs<R: RngCore + CryptoRng>(&mut self, rng: &mut R) -> Result<Vec<Message>> {
        if !self.is_old() {
            return Ok(Vec::new());
        }
        info!("Generating round one EdDSA resharing messages.");

        let output = self
            .input
            .old_output
            .as_ref()
            .ok_or(InternalError::InternalInvariantFailed)?;
        let lambda =
            vss::lagrange_coefficient_at_zero::<Ed25519>(&self.id, &self.input.old_committee)?;
        let weighted = lambda.mul(output.private_share().as_scalar());
        let polynomial = Polynomial::<Ed25519>::sample(weighted, self.input.new_threshold, rng);
        let decommit =
            ResharingDecommit::new(rng, &self.sid, &self.id, polynomial.commitments());
        let commit = decommit.commit()?;
        self.local_storage
            .store::<storage::SecretPolynomial>(self.id.clone(), polynomial);
        self.local_storage
            .store::<storage::OldCommit>(self.id.clone(), commit.clone());
        self.local_storage
            .store::<storage::OldDecommit>(self.id.clone(), decommit);

        self.broadcast_for_other_participants(
            MessageType::EddsaResharing(EddsaResharingMessageType::R1OldCommit),
            &commit,
        )
    }

    #[instrument(skip_all, err(Debug))]
    fn handle_old_commit<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        message: &Message,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        self.check_for_duplicate_msg::<storage::OldCommit>(message.from())?;
        if !self.input.old_committee.contains(message.from()) {
            error!("Round one commitment from a party outside the old committee");
            return Err(InternalError::culprit(message.from()));
        }
        message.check_type(MessageType::EddsaResharing(
            EddsaResharingMessageType::R1OldCommit,
        ))?;
        let commit: ResharingCommit = deserialize!(&message.unverified_bytes)?;
        self.local_storage
            .store_once::<storage::OldCommit>(message.from().clone(), commit)?;
        self.maybe_start_sharing(rng)
    }

    fn maybe_start_sharing<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        let r1_done = self
            .local_storage
            .contains_for_all_ids::<storage::OldCommit>(&self.input.old_committee.clone());
        if !r1_done {
            return Ok(ProcessOutcome::Incomplete);
        }

        let round_two_messages = run_only_once!(
            self,
            "eddsa resharing round two",
            self.gen_round_two_msgs()
        )?;

        let mut outcomes = self
            .fetch_messages(MessageType::EddsaResharing(
                EddsaResharingMessageType::R2PrivateShare,
            ))?
            .iter()
            .map(|msg| self.handle_share(rng, msg))
            .collect::<Result<Vec<_>>>()?;
        let decommit_outcomes = self
            .fetch_messages(MessageType::EddsaResharing(
                EddsaResharingMessageType::R2Decommit,
            ))?
            .iter()
            .map(|msg| self.handle_decommit(rng, msg))
            .collect::<Result<Vec<_>>>()?;
        outcomes.extend(decommit_outcomes);
        outcomes.push(self.maybe_finish_sharing(rng)?);
        ProcessOutcome::collect_with_messages(outcomes, round_two_messages)
    }

    #[instrument(skip_all, err(Debug))]
    fn gen_round_two_msgs(&mut self) -> Result<Vec<Message>> {
        if !self.is_old() {
            return Ok(Vec::new());
        }
        info!("Generating round two EdDSA resharing messages.");

        let decommit = self.local_storage.retrieve::<storage::OldDecommit>(&self.id)?;
        let mut messages = self.broadcast_for_other_participants(
            MessageType::EddsaResharing(EddsaResharingMessageType::R2Decommit),
            decommit,
        )?;

        let polynomial = self
            .local_storage
            .retrieve::<storage::SecretPolynomial>(&self.id)?;
        let mut own_share = None;
        for recipient in &self.input.new_committee.clone() {
            let share = polynomial.evaluate_at_party(recipient)?;
            if recipient == &self.id {
                own_share = Some(share);
                continue;
            }
            messages.push(Message::new(
                MessageType::EddsaResharing(EddsaResharingMessageType::R2PrivateShare),
                self.sid,
                self.id.clone(),
                recipient.clone(),
                &SharePayload { share },
            )?);
        }
        if let Some(share) = own_share {
            self.local_storage
                .store::<storage::RawShare>(self.id.clone(), share);
        }
        Ok(messages)
    }

    #[instrument(skip_all, err(Debug))]
    fn handle_decommit<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        message: &Message,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        self.check_for_duplicate_msg::<storage::OldDecommit>(message.from())?;

        let r1_done = self
            .local_storage
            .contains_for_all_ids::<storage::OldCommit>(&self.input.old_committee.clone());
        if !r1_done {
            self.stash_message(message)?;
            return Ok(ProcessOutcome::Incomplete);
        }
        info!("Handling EdDSA resharing decommitment.");

        let commit = self.local_storage.retrieve::<storage::OldCommit>(message.from())?;
        let decommit =
            ResharingDecommit::from_message(message, commit, self.input.new_threshold + 1)?;
        self.local_storage
            .store_once::<storage::OldDecommit>(message.from().clone(), decommit)?;

        self.maybe_finish_sharing(rng)
    }

    #[instrument(skip_all, err(Debug))]
    fn handle_share<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        message: &Message,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        self.check_for_duplicate_msg::<storage::RawShare>(message.from())?;

        if !self.is_new() || !self.input.old_committee.contains(message.from()) {
            error!("A resharing share travelled outside the committee structure");
            return Err(InternalError::culprit(message.from()));
        }
        message.check_type(MessageType::EddsaResharing(
            EddsaResharingMessageType::R2PrivateShare,
        ))?;
        let payload: SharePayload = deserialize!(&message.unverified_bytes)?;
        self.local_storage
            .store_once::<storage::RawShare>(message.from().clone(), payload.share)?;

        self.maybe_finish_sharing(rng)
    }

    fn maybe_finish_sharing<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        let old_committee = self.input.old_committee.clone();
        let decommits_done = self
            .local_storage
            .contains_for_all_ids::<storage::OldDecommit>(&old_committee);

        if !self.is_new() {
            if decommits_done && self.run_once("eddsa resharing old retire")? {
                info!("Old-committee member retiring; share is obsolete.");
                self.status = Status::TerminatedSuccessfully;
                return Ok(ProcessOutcome::Terminated(None));
            }
            return Ok(ProcessOutcome::Incomplete);
        }

        let shares_done = self
            .local_storage
            .contains_for_all_ids::<storage::RawShare>(&old_committee);
        if !decommits_done || !shares_done || !self.run_once("eddsa resharing finish sharing")? {
            return Ok(ProcessOutcome::Incomplete);
        }
        info!("Finishing EdDSA resharing dealing phase.");

        for dealer in &old_committee {
            let decommit = self.local_storage.retrieve::<storage::OldDecommit>(dealer)?;
            let commitments = decommit.coeff_commitments.clone();
            let share = self.local_storage.retrieve::<storage::RawShare>(dealer)?;
            if !vss::verify_share::<Ed25519>(share, &commitments, &self.id)? {
                error!("Resharing share from {dealer} does not match its commitments");
                return Err(InternalError::culprit(dealer));
            }
        }

        let mut key_sum = Ed25519::identity();
        for dealer in &old_committee {
            let decommit = self.local_storage.retrieve::<storage::OldDecommit>(dealer)?;
            key_sum = key_sum + decommit.coeff_commitments[0];
        }
        if key_sum != self.input.expected_public_key {
            error!("Resharing would change the public key; aborting");
            return Err(InternalError::unattributed());
        }

        let mut new_share = Scalar::zero();
        for dealer in &old_committee {
            new_share = new_share.add(self.local_storage.retrieve::<storage::RawShare>(dealer)?);
        }
        self.local_storage
            .store::<storage::NewShare>(self.id.clone(), KeySharePrivate::new(new_share));

        let mut global_rid = [0u8; 32];
        for dealer in &old_committee {
            let decommit = self.local_storage.retrieve::<storage::OldDecommit>(dealer)?;
            for (acc, byte) in global_rid.iter_mut().zip(decommit.rid.iter()) {
                *acc ^= byte;
            }
        }
        self.local_storage
            .store::<storage::GlobalRid>(self.id.clone(), global_rid);

        let mut public_shares = Vec::new();
        for member in &self.input.new_committee.clone() {
            let x = member.coordinate::<Ed25519>()?;
            let mut sum = Ed25519::identity();
            for dealer in &old_committee {
                let decommit = self.local_storage.retrieve::<storage::OldDecommit>(dealer)?;
                sum = sum + vss::eval_public(&decommit.coeff_commitments, &x);
            }
            public_shares.push(KeySharePublic::new(member.clone(), sum));
        }
        self.local_storage
            .store::<storage::NewPublicShares>(self.id.clone(), public_shares);

        let round_three_messages = run_only_once!(
            self,
            "eddsa resharing round three",
            self.gen_round_three_msgs(rng)
        )?;

        let mut outcomes = self
            .fetch_messages(MessageType::EddsaResharing(
                EddsaResharingMessageType::R3SchnorrProof,
            ))?
            .iter()
            .map(|msg| self.handle_schnorr_proof(rng, msg))
            .collect::<Result<Vec<_>>>()?;
        outcomes.push(self.maybe_finish_protocol()?);
        ProcessOutcome::collect_with_messages(outcomes, round_three_messages)
    }

    #[instrument(skip_all, err(Debug))]
    fn gen_round_three_msgs<R: RngCore + CryptoRng>(&mut self, rng: &mut R) -> Result<Vec<Message>> {
        info!("Generating round three EdDSA resharing messages.");

        let context = self.retrieve_context();
        let global_rid = *self.local_storage.retrieve::<storage::GlobalRid>(&self.id)?;
        let new_share = self.local_storage.retrieve::<storage::NewShare>(&self.id)?;
        let public_point = new_share.public_point();

        let mut transcript = schnorr_transcript(self.sid, &global_rid, &self.id)?;
        let proof = PiSchProof::<Ed25519>::prove(
            pisch::CommonInput::new(&public_point),
            &pisch::ProverSecret::<Ed25519>::new(new_share.as_scalar()),
            &context,
            &mut transcript,
            rng,
        )?;

        self.new_others()
            .into_iter()
            .map(|recipient| {
                Message::new_broadcast(
                    MessageType::EddsaResharing(EddsaResharingMessageType::R3SchnorrProof),
                    self.sid,
                    self.id.clone(),
                    recipient,
                    &proof,
                )
            })
            .collect()
    }

    #[instrument(skip_all, err(Debug))]
    fn handle_schnorr_proof<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        message: &Message,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        let _ = rng;
        self.check_for_duplicate_msg::<storage::SchnorrDone>(message.from())?;

        if !self.local_storage.contains::<storage::NewPublicShares>(&self.id) {
            self.stash_message(message)?;
            return Ok(ProcessOutcome::Incomplete);
        }
        info!("Handling EdDSA resharing Schnorr proof.");

        message.check_type(MessageType::EddsaResharing(
            EddsaResharingMessageType::R3SchnorrProof,
        ))?;
        let proof: PiSchProof<Ed25519> = deserialize!(&message.unverified_bytes)?;
        let context = self.retrieve_context();
        let global_rid = *self.local_storage.retrieve::<storage::GlobalRid>(&self.id)?;
        let public_shares = self
            .local_storage
            .retrieve::<storage::NewPublicShares>(&self.id)?;
        let sender_share = public_shares
            .iter()
            .find(|share| share.participant() == message.from())
            .ok_or_else(|| InternalError::culprit(message.from()))?
            .as_ref()
            .to_owned();

        let mut transcript = schnorr_transcript(self.sid, &global_rid, message.from())?;
        proof
            .verify(
                pisch::CommonInput::new(&sender_share),
                &context,
                &mut transcript,
            )
            .map_err(|_| InternalError::culprit(message.from()))?;

        self.local_storage
            .store_once::<storage::SchnorrDone>(message.from().clone(), ())?;

        self.maybe_finish_protocol()
    }

    fn maybe_finish_protocol(
        &mut self,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        let new_others = self.new_others();
        let done = self
            .local_storage
            .contains_for_all_ids::<storage::SchnorrDone>(&new_others)
            && self.local_storage.contains::<storage::NewShare>(&self.id);
        if !done {
            return Ok(ProcessOutcome::Incomplete);
        }
        info!("EdDSA resharing complete; assembling new save data.");

        let old_committee = self.input.old_committee.clone();
        let mut vss_commitments = Vec::with_capacity(old_committee.len());
        for dealer in &old_committee {
            let decommit = self.local_storage.retrieve::<storage::OldDecommit>(dealer)?;
            vss_commitments.push((dealer.clone(), decommit.coeff_commitments.clone()));
        }
        let public_shares = self
            .local_storage
            .remove::<storage::NewPublicShares>(&self.id.clone())?;
        let private_share = self.local_storage.remove::<storage::NewShare>(&self.id.clone())?;
        let global_rid = *self.local_storage.retrieve::<storage::GlobalRid>(&self.id)?;

        let output = Output::from_parts(
            self.input.new_committee.clone(),
            self.input.new_threshold,
            global_rid,
            vss_commitments,
            public_shares,
            private_share,
            &self.id,
        )?;

        self.status = Status::TerminatedSuccessfully;
        Ok(ProcessOutcome::Terminated(Some(output)))
    }
}

fn schnorr_transcript(
    sid: Identifier,
    global_rid: &[u8; 32],
    sender: &PartyId,
) -> Result<Transcript> {
    let mut transcript = Transcript::new(b"eddsa resharing schnorr");
    transcript.append_message(b"sid", &serialize!(&sid)?);
    transcript.append_message(b"rid", global_rid);
    transcript.append_message(b"sender", &serialize!(sender)?);
    Ok(transcript)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        eddsa::{output::testing::simulate_output_set, sign::tests::run_eddsa_signing},
        protocol::{testing::test_party_ids, PeerContext},
        utils::testing::init_testing,
    };
    use libpaillier::unknown_order::BigNumber;
    use rand::{rngs::StdRng, Rng};
    use std::collections::HashMap;

    fn run_resharing(
        quorum: &mut [EddsaResharingParticipant],
        rng: &mut StdRng,
    ) -> Result<HashMap<PartyId, Option<Output>>> {
        let mut inboxes: HashMap<PartyId, Vec<Message>> = quorum
            .iter()
            .map(|p| (p.id().clone(), Vec::new()))
            .collect();
        let mut outputs = HashMap::new();

        for participant in quorum.iter() {
            let empty: [u8; 0] = [];
            let ready = Message::new(
                EddsaResharingParticipant::ready_type(),
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
            if *participant.status() == Status::TerminatedSuccessfully {
                continue;
            }
            let inbox = inboxes.get_mut(participant.id()).unwrap();
            if inbox.is_empty() {
                continue;
            }
            let message = inbox.remove(rng.gen_range(0..inbox.len()));
            let id = participant.id().clone();
            match participant.process_message(rng, &message)? {
                ProcessOutcome::Incomplete => {}
                ProcessOutcome::Processed(messages) => {
                    for m in messages {
                        inboxes.get_mut(m.to()).unwrap().push(m);
                    }
                }
                ProcessOutcome::Terminated(output) => {
                    let _ = outputs.insert(id, output);
                }
                ProcessOutcome::TerminatedForThisParticipant(output, messages) => {
                    for m in messages {
                        inboxes.get_mut(m.to()).unwrap().push(m);
                    }
                    let _ = outputs.insert(id, output);
                }
            }
        }
        Ok(outputs)
    }

    #[test]
    fn reshared_key_still_signs_for_a_stock_verifier() {
        let mut rng = init_testing();

        let old_parties = test_party_ids(3);
        let new_parties: Vec<PartyId> = (21..=24)
            .map(|i| {
                PartyId::new(
                    format!("new-{i}"),
                    format!("N{i}"),
                    BigNumber::from_slice([i as u8]),
                )
                .unwrap()
            })
            .collect();
        let old_outputs = simulate_output_set(&old_parties, 1, &mut rng).unwrap();
        let public_key = old_outputs[0].public_key_point();

        let sid = Identifier::random(&mut rng);
        let all_parties: Vec<PartyId> = {
            let mut v = old_parties.clone();
            v.extend(new_parties.iter().cloned());
            v
        };

        let mut quorum: Vec<EddsaResharingParticipant> = Vec::new();
        for party in &all_parties {
            let resharing = ReSharingParameters::<Ed25519>::new(
                PeerContext::new(old_parties.clone()).unwrap(),
                PeerContext::new(new_parties.clone()).unwrap(),
                party.clone(),
                1,
                2,
            )
            .unwrap();
            let old_output = old_parties
                .iter()
                .position(|p| p == party)
                .map(|i| old_outputs[i].clone());
            let input = Input::new(&resharing, public_key, old_output).unwrap();
            let others = all_parties
                .iter()
                .filter(|p| *p != party)
                .cloned()
                .collect::<Vec<_>>();
            quorum.push(
                EddsaResharingParticipant::new(sid, party.clone(), others, input).unwrap(),
            );
        }

        let outputs = run_resharing(&mut quorum, &mut rng).unwrap();

        for party in &old_parties {
            assert!(outputs.get(party).unwrap().is_none());
        }
        let new_outputs: Vec<Output> = new_parties
            .iter()
            .map(|p| outputs.get(p).unwrap().clone().unwrap())
            .collect();
        for output in &new_outputs {
            assert_eq!(output.public_key_point(), public_key);
            assert_eq!(output.threshold(), 2);
        }

        // The rotated committee signs under the unchanged public key.
        let signers = new_parties[..3].to_vec();
        let signer_outputs = new_outputs[..3].to_vec();
        let message = b"resharing test";
        let signatures =
            run_eddsa_signing(&signers, &signer_outputs, message, false, &mut rng).unwrap();
        let vk = ed25519_dalek::VerifyingKey::from_bytes(&new_outputs[0].public_key_bytes())
            .unwrap();
        for signature in &signatures {
            let sig = ed25519_dalek::Signature::from_bytes(
                signature.signature().try_into().unwrap(),
            );
            use ed25519_dalek::Verifier;
            vk.verify(message, &sig).unwrap();
        }
    }
}
