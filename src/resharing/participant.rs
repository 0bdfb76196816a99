//! The share-rotation participant.
//!
//! The old committee re-shares the key to a (possibly different) new
//! committee under a new threshold; the joint public key never changes and
//! the key itself is never reconstructed. Each participating old member
//! deals a fresh degree-`t_new` polynomial whose constant term is its
//! Lagrange-weighted share; every new member sums the dealt evaluations into
//! its new share and checks that the dealers' constant terms still add up to
//! the expected public key. New members generate fresh Paillier material and
//! prove it well-formed, exactly as in key generation. Old shares become
//! useless the moment the new committee takes over.

use crate::{
    auxinfo::{AuxInfoPrivate, AuxInfoPublic, PreParams},
    curve::{CurveTrait, ScalarTrait},
    errors::{CallerError, InternalError, Result},
    keygen::{self, KeySharePrivate, KeySharePublic},
    local_storage::{LocalStorage, TypeTag},
    messages::{Message, MessageType, ProtocolType, ResharingMessageType},
    participant::{InnerProtocolParticipant, ProcessOutcome, ProtocolParticipant, Status},
    protocol::{Identifier, PartyId, ReSharingParameters, SharedContext},
    resharing::commit::{ResharingCommit, ResharingDecommit},
    ring_pedersen::VerifiedRingPedersen,
    vss::{self, Polynomial},
    zkp::{
        pifac::{self, PiFacProof},
        pimod::{self, PiModProof},
        pisch::{self, PiSchProof},
        Proof,
    },
};
use merlin::Transcript;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use tracing::{error, info, instrument};

mod storage {
    use super::*;

    pub(super) struct OldCommit;
    impl TypeTag for OldCommit {
        type Value = ResharingCommit;
    }
    pub(super) struct OldDecommit<C> {
        _c: PhantomData<C>,
    }
    impl<C: CurveTrait> TypeTag for OldDecommit<C> {
        type Value = ResharingDecommit<C>;
    }
    pub(super) struct NewAux;
    impl TypeTag for NewAux {
        type Value = AuxInfoPublic;
    }
    pub(super) struct AuxPrivate;
    impl TypeTag for AuxPrivate {
        type Value = AuxInfoPrivate;
    }
    pub(super) struct SecretPolynomial<C> {
        _c: PhantomData<C>,
    }
    impl<C: CurveTrait> TypeTag for SecretPolynomial<C> {
        type Value = Polynomial<C>;
    }
    pub(super) struct RawShare<C: CurveTrait> {
        _c: PhantomData<C>,
    }
    impl<C: CurveTrait> TypeTag for RawShare<C> {
        type Value = C::Scalar;
    }
    pub(super) struct GlobalRid;
    impl TypeTag for GlobalRid {
        type Value = [u8; 32];
    }
    pub(super) struct NewShare<C> {
        _c: PhantomData<C>,
    }
    impl<C: CurveTrait> TypeTag for NewShare<C> {
        type Value = KeySharePrivate<C>;
    }
    pub(super) struct NewPublicShares<C> {
        _c: PhantomData<C>,
    }
    impl<C: CurveTrait> TypeTag for NewPublicShares<C> {
        type Value = Vec<KeySharePublic<C>>;
    }
    pub(super) struct PaillierDone;
    impl TypeTag for PaillierDone {
        type Value = ();
    }
    pub(super) struct SchnorrDone;
    impl TypeTag for SchnorrDone {
        type Value = ();
    }
}

/// Input to resharing.
///
/// Members of the outgoing committee supply their existing save data; members
/// of the incoming committee may supply pre-computed Paillier material.
#[derive(Debug)]
pub struct Input<C: CurveTrait> {
    old_committee: Vec<PartyId>,
    new_committee: Vec<PartyId>,
    new_threshold: usize,
    expected_public_key: C,
    old_output: Option<keygen::Output<C>>,
    pre_params: Option<PreParams>,
}

impl<C: CurveTrait> Input<C> {
    /// Assemble resharing input for one party.
    ///
    /// `expected_public_key` is the joint key being handed over; new-only
    /// members learn it out of band (it is public), old members must hold
    /// save data matching it.
    pub fn new(
        resharing: &ReSharingParameters<C>,
        expected_public_key: C,
        old_output: Option<keygen::Output<C>>,
        pre_params: Option<PreParams>,
    ) -> Result<Self> {
        let self_id = resharing.self_id();
        if resharing.is_old_committee() {
            let output = old_output.as_ref().ok_or_else(|| {
                error!("Old-committee members must supply their save data");
                InternalError::from(CallerError::BadInput)
            })?;
            if output.public_key_point() != expected_public_key {
                error!("Save data does not match the expected public key");
                Err(CallerError::BadInput)?;
            }
            for member in resharing.old_peers().ids() {
                if !output.participants().contains(member) {
                    error!("Old committee member {member} does not hold a share of this key");
                    Err(CallerError::BadInput)?;
                }
            }
            if resharing.old_threshold() != output.threshold() {
                error!("Old threshold does not match the save data");
                Err(CallerError::BadInput)?;
            }
        } else if !resharing.new_peers().contains(self_id) {
            error!("Party is in neither committee");
            Err(CallerError::ParticipantConfigError)?;
        }

        Ok(Self {
            old_committee: resharing.old_peers().ids().to_vec(),
            new_committee: resharing.new_peers().ids().to_vec(),
            new_threshold: resharing.new_threshold(),
            expected_public_key,
            old_output,
            pre_params,
        })
    }
}

#[derive(Serialize, Deserialize)]
struct R1AuxPayload {
    aux: AuxInfoPublic,
}

#[derive(Serialize, Deserialize)]
struct SharePayload<C: CurveTrait> {
    #[serde(bound(deserialize = "C: CurveTrait"))]
    share: C::Scalar,
}

#[derive(Serialize, Deserialize)]
struct R3Payload {
    pimod: PiModProof,
    pifac: PiFacProof,
}

/// A party running the resharing protocol.
///
/// The protocol output is the new save data for incoming-committee members
/// and `None` for outgoing-only members, whose shares are now obsolete.
#[derive(Debug)]
pub struct ResharingParticipant<C: CurveTrait> {
    sid: Identifier,
    id: PartyId,
    other_participant_ids: Vec<PartyId>,
    local_storage: LocalStorage,
    input: Input<C>,
    status: Status,
}

impl<C: CurveTrait> ProtocolParticipant for ResharingParticipant<C> {
    type Input = Input<C>;
    type Output = Option<keygen::Output<C>>;

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
        MessageType::Resharing(ResharingMessageType::Ready)
    }

    fn protocol_type() -> ProtocolType {
        ProtocolType::Resharing
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
            "RESHARING: party {} received {:?} from {}",
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
            MessageType::Resharing(ResharingMessageType::Ready) => {
                self.handle_ready_msg(rng, message)
            }
            MessageType::Resharing(ResharingMessageType::R1OldCommit) => {
                self.handle_old_commit(rng, message)
            }
            MessageType::Resharing(ResharingMessageType::R1NewAuxInfo) => {
                self.handle_new_aux(rng, message)
            }
            MessageType::Resharing(ResharingMessageType::R2Decommit) => {
                self.handle_decommit(rng, message)
            }
            MessageType::Resharing(ResharingMessageType::R2PrivateShare) => {
                self.handle_share(rng, message)
            }
            MessageType::Resharing(ResharingMessageType::R3PaillierProof) => {
                self.handle_paillier_proof(rng, message)
            }
            MessageType::Resharing(ResharingMessageType::R4SchnorrProof) => {
                self.handle_schnorr_proof(rng, message)
            }
            message_type => {
                error!("Incorrect MessageType given to ResharingParticipant: {message_type:?}");
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
        let new_others = self.new_others();

        let mut missing = self
            .local_storage
            .missing_ids::<storage::OldCommit>(&old_others);
        for party in self.local_storage.missing_ids::<storage::NewAux>(&new_others) {
            if !missing.contains(&party) {
                missing.push(party);
            }
        }
        if !missing.is_empty() {
            return missing;
        }
        let mut missing = self
            .local_storage
            .missing_ids::<storage::OldDecommit<C>>(&old_others);
        if self.is_new() {
            for party in self
                .local_storage
                .missing_ids::<storage::RawShare<C>>(&old_others)
            {
                if !missing.contains(&party) {
                    missing.push(party);
                }
            }
        }
        if !missing.is_empty() {
            return missing;
        }
        if self.is_new() {
            let missing = self
                .local_storage
                .missing_ids::<storage::PaillierDone>(&new_others);
            if !missing.is_empty() {
                return missing;
            }
            return self
                .local_storage
                .missing_ids::<storage::SchnorrDone>(&new_others);
        }
        Vec::new()
    }
}

impl<C: CurveTrait> InnerProtocolParticipant for ResharingParticipant<C> {
    type Context = SharedContext<C>;

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

impl<C: CurveTrait> ResharingParticipant<C> {
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
        info!("Handling ready resharing message.");
        let ready_outcome = self.process_ready_message(rng, message)?;
        let round_one_messages =
            run_only_once!(self, "resharing round one", self.gen_round_one_msgs(rng))?;
        let cascade = self.maybe_start_sharing(rng)?;
        ready_outcome
            .with_messages(round_one_messages)
            .consolidate(vec![cascade])
    }

    /// Round one. Old members commit to a fresh resharing polynomial; new
    /// members publish fresh Paillier and ring-Pedersen material.
    #[instrument(skip_all, err(Debug))]
    fn gen_round_one_msgs<R: RngCore + CryptoRng>(&mut self, rng: &mut R) -> Result<Vec<Message>> {
        info!("Generating round one resharing messages.");
        let mut messages = Vec::new();

        if self.is_old() {
            let output = self
                .input
                .old_output
                .as_ref()
                .ok_or(InternalError::InternalInvariantFailed)?;
            // The constant term is this party's Lagrange-weighted share, so
            // the dealt polynomials sum to the original secret at zero.
            let lambda =
                vss::lagrange_coefficient_at_zero::<C>(&self.id, &self.input.old_committee)?;
            let weighted = lambda.mul(output.private_share().as_scalar());
            let polynomial = Polynomial::<C>::sample(weighted, self.input.new_threshold, rng);
            let decommit = ResharingDecommit::new(
                rng,
                &self.sid,
                &self.id,
                polynomial.commitments(),
            );
            let commit = decommit.commit()?;
            self.local_storage
                .store::<storage::SecretPolynomial<C>>(self.id.clone(), polynomial);
            self.local_storage
                .store::<storage::OldCommit>(self.id.clone(), commit.clone());
            self.local_storage
                .store::<storage::OldDecommit<C>>(self.id.clone(), decommit);
            messages.extend(self.broadcast_for_other_participants(
                MessageType::Resharing(ResharingMessageType::R1OldCommit),
                &commit,
            )?);
        }

        if self.is_new() {
            let (decryption_key, setup) = match self.input.pre_params.take() {
                Some(pre) => (pre.decryption_key, pre.setup),
                None => {
                    let dk = crate::paillier::DecryptionKey::generate(rng)?;
                    let setup = VerifiedRingPedersen::gen(rng)?;
                    (dk, setup)
                }
            };
            let aux = AuxInfoPublic::new(
                self.id.clone(),
                decryption_key.encryption_key().clone(),
                setup,
            );
            self.local_storage
                .store::<storage::AuxPrivate>(self.id.clone(), decryption_key.into());
            self.local_storage
                .store::<storage::NewAux>(self.id.clone(), aux.clone());
            messages.extend(self.broadcast_for_other_participants(
                MessageType::Resharing(ResharingMessageType::R1NewAuxInfo),
                &R1AuxPayload { aux },
            )?);
        }

        Ok(messages)
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
        let commit = ResharingCommit::from_message(message)?;
        self.local_storage
            .store_once::<storage::OldCommit>(message.from().clone(), commit)?;
        self.maybe_start_sharing(rng)
    }

    #[instrument(skip_all, err(Debug))]
    fn handle_new_aux<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        message: &Message,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        self.check_for_duplicate_msg::<storage::NewAux>(message.from())?;
        if !self.input.new_committee.contains(message.from()) {
            error!("Auxiliary material from a party outside the new committee");
            return Err(InternalError::culprit(message.from()));
        }
        let payload: R1AuxPayload = deserialize!(&message.unverified_bytes)?;
        if payload.aux.participant() != message.from() {
            error!("Auxiliary material claims the wrong owner");
            return Err(InternalError::culprit(message.from()));
        }
        payload
            .aux
            .verify()
            .map_err(|_| InternalError::culprit(message.from()))?;
        self.local_storage
            .store_once::<storage::NewAux>(message.from().clone(), payload.aux)?;
        self.maybe_start_sharing(rng)
    }

    /// Once all commitments and auxiliary material are in, the old members
    /// open their commitments and deal the shares.
    fn maybe_start_sharing<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        let r1_done = self
            .local_storage
            .contains_for_all_ids::<storage::OldCommit>(&self.input.old_committee.clone())
            && self
                .local_storage
                .contains_for_all_ids::<storage::NewAux>(&self.input.new_committee.clone());
        if !r1_done {
            return Ok(ProcessOutcome::Incomplete);
        }

        let round_two_messages =
            run_only_once!(self, "resharing round two", self.gen_round_two_msgs(rng))?;

        let mut outcomes = self
            .fetch_messages(MessageType::Resharing(ResharingMessageType::R2PrivateShare))?
            .iter()
            .map(|msg| self.handle_share(rng, msg))
            .collect::<Result<Vec<_>>>()?;
        let decommit_outcomes = self
            .fetch_messages(MessageType::Resharing(ResharingMessageType::R2Decommit))?
            .iter()
            .map(|msg| self.handle_decommit(rng, msg))
            .collect::<Result<Vec<_>>>()?;
        outcomes.extend(decommit_outcomes);
        outcomes.push(self.maybe_finish_sharing(rng)?);
        ProcessOutcome::collect_with_messages(outcomes, round_two_messages)
    }

    /// Round two (old members): open the commitment and deal shares to the
    /// new committee.
    #[instrument(skip_all, err(Debug))]
    fn gen_round_two_msgs<R: RngCore + CryptoRng>(&mut self, rng: &mut R) -> Result<Vec<Message>> {
        let _ = rng;
        if !self.is_old() {
            return Ok(Vec::new());
        }
        info!("Generating round two resharing messages.");

        let decommit = self
            .local_storage
            .retrieve::<storage::OldDecommit<C>>(&self.id)?;
        let mut messages = self.broadcast_for_other_participants(
            MessageType::Resharing(ResharingMessageType::R2Decommit),
            decommit,
        )?;

        let polynomial = self
            .local_storage
            .retrieve::<storage::SecretPolynomial<C>>(&self.id)?;
        let mut own_share = None;
        for recipient in &self.input.new_committee.clone() {
            let share = polynomial.evaluate_at_party(recipient)?;
            if recipient == &self.id {
                own_share = Some(share);
                continue;
            }
            messages.push(Message::new(
                MessageType::Resharing(ResharingMessageType::R2PrivateShare),
                self.sid,
                self.id.clone(),
                recipient.clone(),
                &SharePayload::<C> { share },
            )?);
        }
        // A dealer who is also a recipient keeps its own evaluation locally.
        if let Some(share) = own_share {
            self.local_storage
                .store::<storage::RawShare<C>>(self.id.clone(), share);
        }
        Ok(messages)
    }

    #[instrument(skip_all, err(Debug))]
    fn handle_decommit<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        message: &Message,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        self.check_for_duplicate_msg::<storage::OldDecommit<C>>(message.from())?;

        let r1_done = self
            .local_storage
            .contains_for_all_ids::<storage::OldCommit>(&self.input.old_committee.clone());
        if !r1_done {
            self.stash_message(message)?;
            return Ok(ProcessOutcome::Incomplete);
        }
        info!("Handling resharing decommitment.");

        let commit = self.local_storage.retrieve::<storage::OldCommit>(message.from())?;
        let decommit = ResharingDecommit::<C>::from_message(
            message,
            commit,
            self.input.new_threshold + 1,
        )?;
        self.local_storage
            .store_once::<storage::OldDecommit<C>>(message.from().clone(), decommit)?;

        self.maybe_finish_sharing(rng)
    }

    #[instrument(skip_all, err(Debug))]
    fn handle_share<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        message: &Message,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        self.check_for_duplicate_msg::<storage::RawShare<C>>(message.from())?;

        if !self.is_new() {
            error!("A share was dealt to a party outside the new committee");
            return Err(InternalError::culprit(message.from()));
        }
        if !self.input.old_committee.contains(message.from()) {
            error!("A share arrived from a party outside the old committee");
            return Err(InternalError::culprit(message.from()));
        }
        message.check_type(MessageType::Resharing(ResharingMessageType::R2PrivateShare))?;
        let payload: SharePayload<C> = deserialize!(&message.unverified_bytes)?;
        self.local_storage
            .store_once::<storage::RawShare<C>>(message.from().clone(), payload.share)?;

        self.maybe_finish_sharing(rng)
    }

    /// Once every decommitment (and, for new members, every share) is in:
    /// verify, assemble the new share, and either continue with the Paillier
    /// proofs (new members) or finish (old-only members).
    fn maybe_finish_sharing<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        let old_committee = self.input.old_committee.clone();
        let decommits_done = self
            .local_storage
            .contains_for_all_ids::<storage::OldDecommit<C>>(&old_committee);

        if !self.is_new() {
            // Outgoing-only members are done once the dealing phase closes
            // and every broadcast addressed to them has landed.
            let aux_done = self
                .local_storage
                .contains_for_all_ids::<storage::NewAux>(&self.input.new_committee.clone());
            if decommits_done && aux_done && self.run_once("resharing old retire")? {
                info!("Old-committee member retiring; share is obsolete.");
                self.status = Status::TerminatedSuccessfully;
                return Ok(ProcessOutcome::Terminated(None));
            }
            return Ok(ProcessOutcome::Incomplete);
        }

        let shares_done = self
            .local_storage
            .contains_for_all_ids::<storage::RawShare<C>>(&old_committee);
        if !decommits_done || !shares_done || !self.run_once("resharing finish sharing")? {
            return Ok(ProcessOutcome::Incomplete);
        }
        info!("Finishing resharing dealing phase.");

        // Verify each dealt share against its dealer's commitments.
        for dealer in &old_committee {
            let decommit = self
                .local_storage
                .retrieve::<storage::OldDecommit<C>>(dealer)?;
            let commitments = decommit.coeff_commitments.clone();
            let share = self.local_storage.retrieve::<storage::RawShare<C>>(dealer)?;
            if !vss::verify_share::<C>(share, &commitments, &self.id)? {
                error!("Resharing share from {dealer} does not match its commitments");
                return Err(InternalError::culprit(dealer));
            }
        }

        // The dealers' constant terms must still sum to the public key.
        let mut key_sum = C::identity();
        for dealer in &old_committee {
            let decommit = self
                .local_storage
                .retrieve::<storage::OldDecommit<C>>(dealer)?;
            key_sum = key_sum + decommit.coeff_commitments[0];
        }
        if key_sum != self.input.expected_public_key {
            error!("Resharing would change the public key; aborting");
            return Err(InternalError::unattributed());
        }

        // New share: sum of the dealt evaluations.
        let mut new_share = C::Scalar::zero();
        for dealer in &old_committee {
            new_share = new_share.add(self.local_storage.retrieve::<storage::RawShare<C>>(dealer)?);
        }
        self.local_storage
            .store::<storage::NewShare<C>>(self.id.clone(), KeySharePrivate::new(new_share));

        let mut global_rid = [0u8; 32];
        for dealer in &old_committee {
            let decommit = self
                .local_storage
                .retrieve::<storage::OldDecommit<C>>(dealer)?;
            for (acc, byte) in global_rid.iter_mut().zip(decommit.rid.iter()) {
                *acc ^= byte;
            }
        }
        self.local_storage
            .store::<storage::GlobalRid>(self.id.clone(), global_rid);

        // Public shares of the whole new committee, from the commitments.
        let mut public_shares = Vec::new();
        for member in &self.input.new_committee.clone() {
            let x = member.coordinate::<C>()?;
            let mut sum = C::identity();
            for dealer in &old_committee {
                let decommit = self
                    .local_storage
                    .retrieve::<storage::OldDecommit<C>>(dealer)?;
                sum = sum + vss::eval_public(&decommit.coeff_commitments, &x);
            }
            public_shares.push(KeySharePublic::new(member.clone(), sum));
        }
        self.local_storage
            .store::<storage::NewPublicShares<C>>(self.id.clone(), public_shares);

        let round_three_messages =
            run_only_once!(self, "resharing round three", self.gen_round_three_msgs(rng))?;

        let mut outcomes = self
            .fetch_messages(MessageType::Resharing(ResharingMessageType::R3PaillierProof))?
            .iter()
            .map(|msg| self.handle_paillier_proof(rng, msg))
            .collect::<Result<Vec<_>>>()?;
        outcomes.push(self.maybe_finish_paillier_phase(rng)?);
        ProcessOutcome::collect_with_messages(outcomes, round_three_messages)
    }

    /// Round three (new members): prove the fresh Paillier modulus
    /// well-formed to every other new member.
    #[instrument(skip_all, err(Debug))]
    fn gen_round_three_msgs<R: RngCore + CryptoRng>(&mut self, rng: &mut R) -> Result<Vec<Message>> {
        info!("Generating round three resharing messages.");

        let context = self.retrieve_context();
        let global_rid = *self.local_storage.retrieve::<storage::GlobalRid>(&self.id)?;
        let aux_private = self
            .local_storage
            .retrieve::<storage::AuxPrivate>(&self.id)?
            .clone();
        let dk = aux_private.decryption_key();
        let (p, q) = (dk.primes().0.clone(), dk.primes().1.clone());
        let modulus = dk.encryption_key().modulus().clone();

        self.new_others()
            .into_iter()
            .map(|recipient| {
                let mut transcript = resharing_proof_transcript(self.sid, &global_rid, &self.id)?;
                let pimod = PiModProof::prove(
                    pimod::CommonInput::new(&modulus),
                    pimod::PiModSecret::new(&p, &q),
                    &context,
                    &mut transcript,
                    rng,
                )?;
                let recipient_aux = self.local_storage.retrieve::<storage::NewAux>(&recipient)?;
                let pifac = PiFacProof::prove(
                    pifac::CommonInput::new(recipient_aux.params().params(), &modulus),
                    pifac::PiFacSecret::new(&p, &q),
                    &context,
                    &mut transcript,
                    rng,
                )?;
                Message::new(
                    MessageType::Resharing(ResharingMessageType::R3PaillierProof),
                    self.sid,
                    self.id.clone(),
                    recipient,
                    &R3Payload { pimod, pifac },
                )
            })
            .collect()
    }

    #[instrument(skip_all, err(Debug))]
    fn handle_paillier_proof<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        message: &Message,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        self.check_for_duplicate_msg::<storage::PaillierDone>(message.from())?;

        if !self.is_new() {
            error!("A Paillier proof was sent to a party outside the new committee");
            return Err(InternalError::culprit(message.from()));
        }
        if !self.local_storage.contains::<storage::GlobalRid>(&self.id) {
            self.stash_message(message)?;
            return Ok(ProcessOutcome::Incomplete);
        }
        info!("Handling resharing Paillier proof.");

        let payload: R3Payload = deserialize!(&message.unverified_bytes)?;
        let context = self.retrieve_context();
        let global_rid = *self.local_storage.retrieve::<storage::GlobalRid>(&self.id)?;
        let sender_modulus = self
            .local_storage
            .retrieve::<storage::NewAux>(message.from())?
            .pk()
            .modulus()
            .clone();
        let own_setup = self
            .local_storage
            .retrieve::<storage::NewAux>(&self.id)?
            .params()
            .clone();

        let mut transcript = resharing_proof_transcript(self.sid, &global_rid, message.from())?;
        payload
            .pimod
            .verify(pimod::CommonInput::new(&sender_modulus), &context, &mut transcript)
            .map_err(|_| InternalError::culprit(message.from()))?;
        payload
            .pifac
            .verify(
                pifac::CommonInput::new(own_setup.params(), &sender_modulus),
                &context,
                &mut transcript,
            )
            .map_err(|_| InternalError::culprit(message.from()))?;

        self.local_storage
            .store_once::<storage::PaillierDone>(message.from().clone(), ())?;

        self.maybe_finish_paillier_phase(rng)
    }

    /// Round four (new members): Schnorr proof of the new share.
    fn maybe_finish_paillier_phase<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        let new_others = self.new_others();
        let done = self
            .local_storage
            .contains_for_all_ids::<storage::PaillierDone>(&new_others)
            && self.local_storage.contains::<storage::GlobalRid>(&self.id);
        if !done {
            return Ok(ProcessOutcome::Incomplete);
        }

        let round_four_messages =
            run_only_once!(self, "resharing round four", self.gen_round_four_msgs(rng))?;

        let mut outcomes = self
            .fetch_messages(MessageType::Resharing(ResharingMessageType::R4SchnorrProof))?
            .iter()
            .map(|msg| self.handle_schnorr_proof(rng, msg))
            .collect::<Result<Vec<_>>>()?;
        outcomes.push(self.maybe_finish_protocol()?);
        ProcessOutcome::collect_with_messages(outcomes, round_four_messages)
    }

    #[instrument(skip_all, err(Debug))]
    fn gen_round_four_msgs<R: RngCore + CryptoRng>(&mut self, rng: &mut R) -> Result<Vec<Message>> {
        info!("Generating round four resharing messages.");

        let context = self.retrieve_context();
        let global_rid = *self.local_storage.retrieve::<storage::GlobalRid>(&self.id)?;
        let new_share = self.local_storage.retrieve::<storage::NewShare<C>>(&self.id)?;
        let public_point = new_share.public_point();

        let mut transcript = resharing_schnorr_transcript(self.sid, &global_rid, &self.id)?;
        let proof = PiSchProof::<C>::prove(
            pisch::CommonInput::new(&public_point),
            &pisch::ProverSecret::<C>::new(new_share.as_scalar()),
            &context,
            &mut transcript,
            rng,
        )?;

        // Only the new committee consumes this; old-only members have
        // already retired.
        self.new_others()
            .into_iter()
            .map(|recipient| {
                Message::new_broadcast(
                    MessageType::Resharing(ResharingMessageType::R4SchnorrProof),
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

        if !self
            .local_storage
            .contains::<storage::NewPublicShares<C>>(&self.id)
        {
            self.stash_message(message)?;
            return Ok(ProcessOutcome::Incomplete);
        }
        info!("Handling resharing Schnorr proof.");

        message.check_type(MessageType::Resharing(ResharingMessageType::R4SchnorrProof))?;
        let proof: PiSchProof<C> = deserialize!(&message.unverified_bytes)?;
        let context = self.retrieve_context();
        let global_rid = *self.local_storage.retrieve::<storage::GlobalRid>(&self.id)?;
        let public_shares = self
            .local_storage
            .retrieve::<storage::NewPublicShares<C>>(&self.id)?;
        let sender_share = public_shares
            .iter()
            .find(|share| share.participant() == message.from())
            .ok_or_else(|| InternalError::culprit(message.from()))?
            .as_ref()
            .to_owned();

        let mut transcript = resharing_schnorr_transcript(self.sid, &global_rid, message.from())?;
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
            && self.local_storage.contains::<storage::NewShare<C>>(&self.id);
        if !done {
            return Ok(ProcessOutcome::Incomplete);
        }
        info!("Resharing complete; assembling new save data.");

        let old_committee = self.input.old_committee.clone();
        let mut vss_commitments = Vec::with_capacity(old_committee.len());
        for dealer in &old_committee {
            let decommit = self
                .local_storage
                .retrieve::<storage::OldDecommit<C>>(dealer)?;
            vss_commitments.push((dealer.clone(), decommit.coeff_commitments.clone()));
        }
        let public_shares = self
            .local_storage
            .remove::<storage::NewPublicShares<C>>(&self.id.clone())?;
        let private_share = self
            .local_storage
            .remove::<storage::NewShare<C>>(&self.id.clone())?;
        let global_rid = *self.local_storage.retrieve::<storage::GlobalRid>(&self.id)?;

        let new_committee = self.input.new_committee.clone();
        let mut auxinfo_publics = Vec::with_capacity(new_committee.len());
        for member in &new_committee {
            auxinfo_publics.push(
                self.local_storage
                    .retrieve::<storage::NewAux>(member)?
                    .clone(),
            );
        }
        let auxinfo_private = self
            .local_storage
            .remove::<storage::AuxPrivate>(&self.id.clone())?;

        let output = keygen::Output::from_parts(
            new_committee,
            self.input.new_threshold,
            global_rid,
            vss_commitments,
            public_shares,
            private_share,
            &self.id,
            auxinfo_publics,
            auxinfo_private,
        )?;

        self.status = Status::TerminatedSuccessfully;
        Ok(ProcessOutcome::Terminated(Some(output)))
    }
}

fn resharing_proof_transcript(
    sid: Identifier,
    global_rid: &[u8; 32],
    sender: &PartyId,
) -> Result<Transcript> {
    let mut transcript = Transcript::new(b"resharing paillier proofs");
    transcript.append_message(b"sid", &serialize!(&sid)?);
    transcript.append_message(b"rid", global_rid);
    transcript.append_message(b"sender", &serialize!(sender)?);
    Ok(transcript)
}

fn resharing_schnorr_transcript(
    sid: Identifier,
    global_rid: &[u8; 32],
    sender: &PartyId,
) -> Result<Transcript> {
    let mut transcript = Transcript::new(b"resharing schnorr");
    transcript.append_message(b"sid", &serialize!(&sid)?);
    transcript.append_message(b"rid", global_rid);
    transcript.append_message(b"sender", &serialize!(sender)?);
    Ok(transcript)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        curve::TestCurve,
        keygen::testing::simulate_output_set,
        protocol::{testing::test_party_ids, PeerContext},
        utils::testing::init_testing,
        vss,
    };
    use libpaillier::unknown_order::BigNumber;
    use rand::{rngs::StdRng, Rng};
    use std::collections::HashMap;

    type TestResharing = ResharingParticipant<TestCurve>;

    fn run_resharing(
        quorum: &mut [TestResharing],
        rng: &mut StdRng,
    ) -> Result<HashMap<PartyId, Option<keygen::Output<TestCurve>>>> {
        let mut inboxes: HashMap<PartyId, Vec<Message>> = quorum
            .iter()
            .map(|p| (p.id().clone(), Vec::new()))
            .collect();
        let mut outputs = HashMap::new();

        for participant in quorum.iter() {
            let empty: [u8; 0] = [];
            let ready = Message::new(
                TestResharing::ready_type(),
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
    fn resharing_to_a_larger_committee_preserves_the_key() {
        let mut rng = init_testing();

        // Old committee: 5 parties at threshold 2. New committee: 7 fresh
        // parties at threshold 3.
        let old_parties = test_party_ids(5);
        let new_parties: Vec<PartyId> = (11..=17)
            .map(|i| {
                PartyId::new(
                    format!("new-{i}"),
                    format!("N{i}"),
                    BigNumber::from_slice([i as u8]),
                )
                .unwrap()
            })
            .collect();
        let old_outputs =
            simulate_output_set::<TestCurve, _>(&old_parties, 2, &mut rng).unwrap();
        let public_key = old_outputs[0].public_key_point();
        let old_secret =
            crate::keygen::testing::reconstruct_secret(&old_outputs).unwrap();

        let sid = Identifier::random(&mut rng);
        let all_parties: Vec<PartyId> = {
            let mut v = old_parties.clone();
            v.extend(new_parties.iter().cloned());
            v
        };

        let mut quorum: Vec<TestResharing> = Vec::new();
        for party in &all_parties {
            let resharing = ReSharingParameters::<TestCurve>::new(
                PeerContext::new(old_parties.clone()).unwrap(),
                PeerContext::new(new_parties.clone()).unwrap(),
                party.clone(),
                2,
                3,
            )
            .unwrap();
            let old_output = old_parties
                .iter()
                .position(|p| p == party)
                .map(|i| old_outputs[i].clone());
            let pre_params = if new_parties.contains(party) {
                Some(PreParams::from_pool_insecure(&mut rng).unwrap())
            } else {
                None
            };
            let input =
                Input::new(&resharing, public_key, old_output, pre_params).unwrap();
            let others = all_parties
                .iter()
                .filter(|p| *p != party)
                .cloned()
                .collect::<Vec<_>>();
            quorum.push(TestResharing::new(sid, party.clone(), others, input).unwrap());
        }

        let outputs = run_resharing(&mut quorum, &mut rng).unwrap();

        // Old-only members got no new data.
        for party in &old_parties {
            assert!(outputs.get(party).unwrap().is_none());
        }

        // New members hold shares of the *same* key under the new threshold.
        let new_outputs: Vec<_> = new_parties
            .iter()
            .map(|p| outputs.get(p).unwrap().clone().unwrap())
            .collect();
        for output in &new_outputs {
            assert_eq!(output.public_key_point(), public_key);
            assert_eq!(output.threshold(), 3);
            assert_eq!(output.participants().len(), 7);
        }

        // Any 4 of the new shares reconstruct the original secret.
        let shares: Vec<_> = new_parties[2..6]
            .iter()
            .zip(new_outputs[2..6].iter())
            .map(|(party, output)| (party.clone(), *output.private_share().as_scalar()))
            .collect();
        assert_eq!(
            vss::reconstruct::<TestCurve>(&shares).unwrap(),
            old_secret
        );

        // The rotated committee signs under the unchanged public key.
        let digest = crate::sign::tests::digest_of(b"resharing test");
        let signers: Vec<PartyId> = new_parties[..4].to_vec();
        let signer_outputs: Vec<_> = new_outputs[..4].to_vec();
        let sign_sid = Identifier::random(&mut rng);
        let mut sign_quorum =
            crate::sign::tests::make_sign_quorum(sign_sid, &signers, &signer_outputs, &digest)
                .unwrap();
        let signatures =
            crate::sign::tests::run_signing(&mut sign_quorum, &mut rng, |_| {}).unwrap();
        for signature in &signatures {
            crate::sign::tests::verify_with_stock_ecdsa(&old_outputs[0], &digest, signature);
        }
    }

    #[test]
    fn old_member_without_save_data_is_rejected() {
        let mut rng = init_testing();
        let parties = test_party_ids(3);
        let outputs = simulate_output_set::<TestCurve, _>(&parties, 1, &mut rng).unwrap();

        let resharing = ReSharingParameters::<TestCurve>::new(
            PeerContext::new(parties.clone()).unwrap(),
            PeerContext::new(parties.clone()).unwrap(),
            parties[0].clone(),
            1,
            1,
        )
        .unwrap();
        assert!(Input::new(&resharing, outputs[0].public_key_point(), None, None).is_err());
    }
}
