//! The distributed key generation participant.
//!
//! Five rounds, no trusted dealer:
//! 1. Every party samples its additive key contribution `uᵢ`, commits to its
//!    Feldman commitment vector and Schnorr nonce, and publishes its
//!    Paillier modulus and ring-Pedersen parameters (with subgroup proof).
//! 2. Parties open their commitments and send each peer its Feldman share
//!    over the confidential transport.
//! 3. Every received share is checked against the dealer's commitment
//!    vector; the final share `xᵢ = Σⱼ fⱼ(xᵢ)` is assembled, and proofs
//!    about the Paillier modulus (`pimod` + `pifac`) go out per recipient.
//! 4. Each party publishes a Schnorr proof for its final public share,
//!    using the nonce it committed to in round one.
//! 5. Proofs are verified, the joint public key `Y = Σ uⱼ·G` is derived,
//!    and the save data is emitted after a final self-consistency check.

use crate::{
    auxinfo::{AuxInfoPrivate, AuxInfoPublic, PreParams},
    curve::{CurveTrait, ScalarTrait},
    errors::{CallerError, InternalError, Result},
    keygen::{
        commit::{KeygenCommit, KeygenDecommit},
        keyshare::{KeySharePrivate, KeySharePublic},
        output::Output,
    },
    local_storage::{LocalStorage, TypeTag},
    messages::{KeygenMessageType, Message, MessageType, ProtocolType},
    participant::{InnerProtocolParticipant, ProcessOutcome, ProtocolParticipant, Status},
    protocol::{Identifier, PartyId, SharedContext},
    ring_pedersen::VerifiedRingPedersen,
    vss::{self, Polynomial},
    zkp::{
        pifac::{self, PiFacProof},
        pimod::{self, PiModProof},
        pisch::{self, PiSchPrecommit, PiSchProof},
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

    pub(super) struct Commit;
    impl TypeTag for Commit {
        type Value = KeygenCommit;
    }
    pub(super) struct Decommit<C> {
        _c: PhantomData<C>,
    }
    impl<C: CurveTrait> TypeTag for Decommit<C> {
        type Value = KeygenDecommit<C>;
    }
    pub(super) struct AuxPublic;
    impl TypeTag for AuxPublic {
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
    pub(super) struct SchnorrPrecommit<C> {
        _c: PhantomData<C>,
    }
    impl<C: CurveTrait> TypeTag for SchnorrPrecommit<C> {
        type Value = PiSchPrecommit<C>;
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
    pub(super) struct FinalShare<C> {
        _c: PhantomData<C>,
    }
    impl<C: CurveTrait> TypeTag for FinalShare<C> {
        type Value = KeySharePrivate<C>;
    }
    pub(super) struct PublicShares<C> {
        _c: PhantomData<C>,
    }
    impl<C: CurveTrait> TypeTag for PublicShares<C> {
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

/// Input to key generation: the threshold and, optionally, pre-computed
/// Paillier material.
#[derive(Debug)]
pub struct Input {
    threshold: usize,
    pre_params: Option<PreParams>,
}

impl Input {
    /// Assemble keygen input. Supplying [`PreParams`] skips the safe-prime
    /// generation inside round one.
    pub fn new(threshold: usize, pre_params: Option<PreParams>) -> Self {
        Self {
            threshold,
            pre_params,
        }
    }

    /// The threshold `t`.
    pub fn threshold(&self) -> usize {
        self.threshold
    }
}

/// Round-one broadcast payload.
#[derive(Serialize, Deserialize)]
struct R1Payload {
    commit: KeygenCommit,
    aux: AuxInfoPublic,
}

/// Round-two point-to-point payload.
#[derive(Serialize, Deserialize)]
struct SharePayload<C: CurveTrait> {
    #[serde(bound(deserialize = "C: CurveTrait"))]
    share: C::Scalar,
}

/// Round-three point-to-point payload.
#[derive(Serialize, Deserialize)]
struct R3Payload {
    pimod: PiModProof,
    pifac: PiFacProof,
}

/// A party running distributed key generation.
#[derive(Debug)]
pub struct KeygenParticipant<C: CurveTrait> {
    sid: Identifier,
    id: PartyId,
    other_participant_ids: Vec<PartyId>,
    local_storage: LocalStorage,
    input: Input,
    status: Status,
    curve: PhantomData<C>,
}

impl<C: CurveTrait> ProtocolParticipant for KeygenParticipant<C> {
    type Input = Input;
    type Output = Output<C>;

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
            curve: PhantomData,
        })
    }

    fn ready_type() -> MessageType {
        MessageType::Keygen(KeygenMessageType::Ready)
    }

    fn protocol_type() -> ProtocolType {
        ProtocolType::Keygen
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
            "KEYGEN: party {} received {:?} from {}",
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
            MessageType::Keygen(KeygenMessageType::Ready) => self.handle_ready_msg(rng, message),
            MessageType::Keygen(KeygenMessageType::R1CommitHash) => {
                self.handle_round_one_msg(rng, message)
            }
            MessageType::Keygen(KeygenMessageType::R2Decommit) => {
                self.handle_round_two_decommit(rng, message)
            }
            MessageType::Keygen(KeygenMessageType::R2PrivateShare) => {
                self.handle_round_two_share(rng, message)
            }
            MessageType::Keygen(KeygenMessageType::R3PaillierProof) => {
                self.handle_round_three_msg(rng, message)
            }
            MessageType::Keygen(KeygenMessageType::R4SchnorrProof) => {
                self.handle_round_four_msg(rng, message)
            }
            message_type => {
                error!("Incorrect MessageType given to KeygenParticipant: {message_type:?}");
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
        let mut missing = self
            .local_storage
            .missing_ids::<storage::Decommit<C>>(others);
        for party in self.local_storage.missing_ids::<storage::RawShare<C>>(others) {
            if !missing.contains(&party) {
                missing.push(party);
            }
        }
        if !missing.is_empty() {
            return missing;
        }
        let missing = self.local_storage.missing_ids::<storage::PaillierDone>(others);
        if !missing.is_empty() {
            return missing;
        }
        self.local_storage.missing_ids::<storage::SchnorrDone>(others)
    }
}

impl<C: CurveTrait> InnerProtocolParticipant for KeygenParticipant<C> {
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

impl<C: CurveTrait> KeygenParticipant<C> {
    #[instrument(skip_all, err(Debug))]
    fn handle_ready_msg<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        message: &Message,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        info!("Handling ready keygen message.");
        let ready_outcome = self.process_ready_message(rng, message)?;
        let round_one_messages = run_only_once!(self, "keygen round one", self.gen_round_one_msgs(rng))?;
        // With a single party (or if everything arrived before the ready
        // signal), later rounds may already be unblocked.
        let cascade = self.maybe_finish_round_one(rng)?;
        ready_outcome
            .with_messages(round_one_messages)
            .consolidate(vec![cascade])
    }

    /// Round one: sample the key contribution, commit to the Feldman vector
    /// and the Schnorr nonce, and publish the Paillier material.
    #[instrument(skip_all, err(Debug))]
    fn gen_round_one_msgs<R: RngCore + CryptoRng>(&mut self, rng: &mut R) -> Result<Vec<Message>> {
        info!("Generating round one keygen messages.");

        let (decryption_key, setup) = match self.input.pre_params.take() {
            Some(pre) => (pre.decryption_key, pre.setup),
            None => {
                let dk = crate::paillier::DecryptionKey::generate(rng)?;
                let setup = VerifiedRingPedersen::gen(rng)?;
                (dk, setup)
            }
        };
        let aux_public = AuxInfoPublic::new(
            self.id.clone(),
            decryption_key.encryption_key().clone(),
            setup,
        );
        self.local_storage
            .store::<storage::AuxPrivate>(self.id.clone(), decryption_key.into());
        self.local_storage
            .store::<storage::AuxPublic>(self.id.clone(), aux_public.clone());

        let polynomial =
            Polynomial::<C>::sample(C::Scalar::random(rng), self.input.threshold(), rng);
        let coeff_commitments = polynomial.commitments();
        self.local_storage
            .store::<storage::SecretPolynomial<C>>(self.id.clone(), polynomial);

        let sch_precommit = PiSchProof::<C>::precommit(rng)?;
        let precommit_point = *sch_precommit.precommitment();
        self.local_storage
            .store::<storage::SchnorrPrecommit<C>>(self.id.clone(), sch_precommit);

        let decommit =
            KeygenDecommit::new(rng, &self.sid, &self.id, coeff_commitments, precommit_point);
        let commit = decommit.commit()?;
        self.local_storage
            .store::<storage::Commit>(self.id.clone(), commit.clone());
        self.local_storage
            .store::<storage::Decommit<C>>(self.id.clone(), decommit);

        self.broadcast_for_other_participants(
            MessageType::Keygen(KeygenMessageType::R1CommitHash),
            &R1Payload {
                commit,
                aux: aux_public,
            },
        )
    }

    #[instrument(skip_all, err(Debug))]
    fn handle_round_one_msg<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        message: &Message,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        self.check_for_duplicate_msg::<storage::Commit>(message.from())?;
        info!("Handling round one keygen message.");

        let payload: R1Payload = deserialize!(&message.unverified_bytes)?;
        if payload.aux.participant() != message.from() {
            error!("Round one auxiliary material claims the wrong owner");
            return Err(InternalError::culprit(message.from()));
        }
        // Reject undersized moduli and unproven ring-Pedersen parameters.
        payload
            .aux
            .verify()
            .map_err(|_| InternalError::culprit(message.from()))?;

        self.local_storage
            .store_once::<storage::Commit>(message.from().clone(), payload.commit)?;
        self.local_storage
            .store::<storage::AuxPublic>(message.from().clone(), payload.aux);

        self.maybe_finish_round_one(rng)
    }

    /// Once every commitment is in, open ours and deal the shares.
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
            run_only_once!(self, "keygen round two", self.gen_round_two_msgs(rng))?;

        let mut outcomes = self
            .fetch_messages(MessageType::Keygen(KeygenMessageType::R2PrivateShare))?
            .iter()
            .map(|msg| self.handle_round_two_share(rng, msg))
            .collect::<Result<Vec<_>>>()?;
        let decommit_outcomes = self
            .fetch_messages(MessageType::Keygen(KeygenMessageType::R2Decommit))?
            .iter()
            .map(|msg| self.handle_round_two_decommit(rng, msg))
            .collect::<Result<Vec<_>>>()?;
        outcomes.extend(decommit_outcomes);
        outcomes.push(self.maybe_finish_round_two(rng)?);

        ProcessOutcome::collect_with_messages(outcomes, round_two_messages)
    }

    /// Round two: open the commitment and send each peer its share.
    #[instrument(skip_all, err(Debug))]
    fn gen_round_two_msgs<R: RngCore + CryptoRng>(&mut self, rng: &mut R) -> Result<Vec<Message>> {
        info!("Generating round two keygen messages.");
        let _ = rng;

        let decommit = self
            .local_storage
            .retrieve::<storage::Decommit<C>>(&self.id)?;
        let mut messages = self.broadcast_for_other_participants(
            MessageType::Keygen(KeygenMessageType::R2Decommit),
            decommit,
        )?;

        let polynomial = self
            .local_storage
            .retrieve::<storage::SecretPolynomial<C>>(&self.id)?;
        // The Feldman shares ride the confidential transport in the clear;
        // the transport contract requires authenticated, encrypted channels.
        let share_messages = self
            .other_participant_ids
            .clone()
            .into_iter()
            .map(|other| {
                let share = polynomial.evaluate_at_party(&other)?;
                Message::new(
                    MessageType::Keygen(KeygenMessageType::R2PrivateShare),
                    self.sid,
                    self.id.clone(),
                    other,
                    &SharePayload::<C> { share },
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
        self.check_for_duplicate_msg::<storage::Decommit<C>>(message.from())?;
        info!("Handling round two keygen decommitment.");

        // All round-one commitments must be in before decommitments open.
        let r1_done = self
            .local_storage
            .contains_for_all_ids::<storage::Commit>(&self.all_participants());
        if !r1_done {
            self.stash_message(message)?;
            return Ok(ProcessOutcome::Incomplete);
        }

        let commit = self.local_storage.retrieve::<storage::Commit>(message.from())?;
        let decommit = KeygenDecommit::<C>::from_message(
            message,
            commit,
            self.input.threshold() + 1,
        )?;
        self.local_storage
            .store_once::<storage::Decommit<C>>(message.from().clone(), decommit)?;

        self.maybe_finish_round_two(rng)
    }

    #[instrument(skip_all, err(Debug))]
    fn handle_round_two_share<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        message: &Message,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        self.check_for_duplicate_msg::<storage::RawShare<C>>(message.from())?;
        info!("Handling round two keygen share.");

        message.check_type(MessageType::Keygen(KeygenMessageType::R2PrivateShare))?;
        let payload: SharePayload<C> = deserialize!(&message.unverified_bytes)?;
        self.local_storage
            .store_once::<storage::RawShare<C>>(message.from().clone(), payload.share)?;

        self.maybe_finish_round_two(rng)
    }

    /// Once every decommitment and share is in: verify the shares, derive
    /// the final key share and session randomness, and send the Paillier
    /// proofs.
    fn maybe_finish_round_two<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        let all = self.all_participants();
        let others = self.other_participant_ids.clone();
        let r2_done = self
            .local_storage
            .contains_for_all_ids::<storage::Decommit<C>>(&all)
            && self
                .local_storage
                .contains_for_all_ids::<storage::RawShare<C>>(&others);
        if !r2_done || !self.run_once("keygen finish round two")? {
            return Ok(ProcessOutcome::Incomplete);
        }
        info!("Finishing keygen round two.");

        // Check every received share against its dealer's commitments.
        for dealer in &others {
            let decommit = self.local_storage.retrieve::<storage::Decommit<C>>(dealer)?;
            let commitments = decommit.coeff_commitments.clone();
            let share = self.local_storage.retrieve::<storage::RawShare<C>>(dealer)?;
            if !vss::verify_share::<C>(share, &commitments, &self.id)? {
                error!("Feldman share from {dealer} does not match its commitments");
                return Err(InternalError::culprit(dealer));
            }
        }

        // xᵢ = Σⱼ fⱼ(xᵢ), including our own dealing.
        let polynomial = self
            .local_storage
            .retrieve::<storage::SecretPolynomial<C>>(&self.id)?;
        let mut final_share = polynomial.evaluate_at_party(&self.id)?;
        for dealer in &others {
            let share = self.local_storage.retrieve::<storage::RawShare<C>>(dealer)?;
            final_share = final_share.add(share);
        }
        self.local_storage
            .store::<storage::FinalShare<C>>(self.id.clone(), KeySharePrivate::new(final_share));

        // Session randomness: XOR of every party's contribution.
        let mut global_rid = [0u8; 32];
        for party in &all {
            let decommit = self.local_storage.retrieve::<storage::Decommit<C>>(party)?;
            for (acc, byte) in global_rid.iter_mut().zip(decommit.rid.iter()) {
                *acc ^= byte;
            }
        }
        self.local_storage
            .store::<storage::GlobalRid>(self.id.clone(), global_rid);

        // Each party's public share is the sum of all dealers' polynomials
        // evaluated (in the exponent) at that party's coordinate.
        let mut public_shares = Vec::with_capacity(all.len());
        for party in &all {
            let x = party.coordinate::<C>()?;
            let mut sum = C::identity();
            for dealer in &all {
                let decommit = self.local_storage.retrieve::<storage::Decommit<C>>(dealer)?;
                sum = sum + vss::eval_public(&decommit.coeff_commitments, &x);
            }
            public_shares.push(KeySharePublic::new(party.clone(), sum));
        }
        self.local_storage
            .store::<storage::PublicShares<C>>(self.id.clone(), public_shares);

        let round_three_messages =
            run_only_once!(self, "keygen round three", self.gen_round_three_msgs(rng))?;

        let mut outcomes = self
            .fetch_messages(MessageType::Keygen(KeygenMessageType::R3PaillierProof))?
            .iter()
            .map(|msg| self.handle_round_three_msg(rng, msg))
            .collect::<Result<Vec<_>>>()?;
        outcomes.push(self.maybe_finish_round_three(rng)?);

        ProcessOutcome::collect_with_messages(outcomes, round_three_messages)
    }

    /// Round three: prove the Paillier modulus well-formed, once per
    /// recipient (the factor proof binds the recipient's ring-Pedersen
    /// parameters).
    #[instrument(skip_all, err(Debug))]
    fn gen_round_three_msgs<R: RngCore + CryptoRng>(&mut self, rng: &mut R) -> Result<Vec<Message>> {
        info!("Generating round three keygen messages.");

        let context = self.retrieve_context();
        let global_rid = *self
            .local_storage
            .retrieve::<storage::GlobalRid>(&self.id)?;
        let aux_private = self
            .local_storage
            .retrieve::<storage::AuxPrivate>(&self.id)?
            .clone();
        let (p, q) = {
            let dk = aux_private.decryption_key();
            (dk.primes().0.clone(), dk.primes().1.clone())
        };
        let modulus = aux_private.decryption_key().encryption_key().modulus().clone();

        self.other_participant_ids
            .clone()
            .into_iter()
            .map(|recipient| {
                let mut transcript = paillier_proof_transcript(self.sid, &global_rid, &self.id)?;
                let pimod = PiModProof::prove(
                    pimod::CommonInput::new(&modulus),
                    pimod::PiModSecret::new(&p, &q),
                    &context,
                    &mut transcript,
                    rng,
                )?;
                let recipient_aux = self.local_storage.retrieve::<storage::AuxPublic>(&recipient)?;
                let pifac = PiFacProof::prove(
                    pifac::CommonInput::new(recipient_aux.params().params(), &modulus),
                    pifac::PiFacSecret::new(&p, &q),
                    &context,
                    &mut transcript,
                    rng,
                )?;
                Message::new(
                    MessageType::Keygen(KeygenMessageType::R3PaillierProof),
                    self.sid,
                    self.id.clone(),
                    recipient,
                    &R3Payload { pimod, pifac },
                )
            })
            .collect()
    }

    #[instrument(skip_all, err(Debug))]
    fn handle_round_three_msg<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        message: &Message,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        self.check_for_duplicate_msg::<storage::PaillierDone>(message.from())?;

        if !self.local_storage.contains::<storage::GlobalRid>(&self.id) {
            info!("Not yet ready to handle round three keygen message; stashing.");
            self.stash_message(message)?;
            return Ok(ProcessOutcome::Incomplete);
        }
        info!("Handling round three keygen message.");

        let payload: R3Payload = deserialize!(&message.unverified_bytes)?;
        let context = self.retrieve_context();
        let global_rid = *self
            .local_storage
            .retrieve::<storage::GlobalRid>(&self.id)?;

        let sender_modulus = self
            .local_storage
            .retrieve::<storage::AuxPublic>(message.from())?
            .pk()
            .modulus()
            .clone();
        let own_setup = self
            .local_storage
            .retrieve::<storage::AuxPublic>(&self.id)?
            .params()
            .clone();

        let mut transcript = paillier_proof_transcript(self.sid, &global_rid, message.from())?;
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

        self.maybe_finish_round_three(rng)
    }

    /// Once every Paillier proof has checked out, publish the Schnorr proof
    /// of the final key share.
    fn maybe_finish_round_three<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        let others = self.other_participant_ids.clone();
        let r3_done = self
            .local_storage
            .contains_for_all_ids::<storage::PaillierDone>(&others)
            && self.local_storage.contains::<storage::GlobalRid>(&self.id);
        if !r3_done {
            return Ok(ProcessOutcome::Incomplete);
        }

        let round_four_messages =
            run_only_once!(self, "keygen round four", self.gen_round_four_msgs(rng))?;

        let mut outcomes = self
            .fetch_messages(MessageType::Keygen(KeygenMessageType::R4SchnorrProof))?
            .iter()
            .map(|msg| self.handle_round_four_msg(rng, msg))
            .collect::<Result<Vec<_>>>()?;
        outcomes.push(self.maybe_finish_protocol()?);

        ProcessOutcome::collect_with_messages(outcomes, round_four_messages)
    }

    /// Round four: Schnorr proof of the final share, finishing the nonce
    /// committed in round one.
    #[instrument(skip_all, err(Debug))]
    fn gen_round_four_msgs<R: RngCore + CryptoRng>(&mut self, rng: &mut R) -> Result<Vec<Message>> {
        info!("Generating round four keygen messages.");
        let _ = rng;

        let context = self.retrieve_context();
        let global_rid = *self
            .local_storage
            .retrieve::<storage::GlobalRid>(&self.id)?;
        let precommit = self
            .local_storage
            .retrieve::<storage::SchnorrPrecommit<C>>(&self.id)?
            .clone();
        let final_share = self
            .local_storage
            .retrieve::<storage::FinalShare<C>>(&self.id)?;
        let public_share = final_share.public_point();

        let transcript = schnorr_proof_transcript(self.sid, &global_rid, &self.id)?;
        let proof = PiSchProof::prove_from_precommit(
            &context,
            &precommit,
            &pisch::CommonInput::new(&public_share),
            &pisch::ProverSecret::<C>::new(final_share.as_scalar()),
            &transcript,
        )?;

        self.broadcast_for_other_participants(
            MessageType::Keygen(KeygenMessageType::R4SchnorrProof),
            &proof,
        )
    }

    #[instrument(skip_all, err(Debug))]
    fn handle_round_four_msg<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        message: &Message,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        let _ = rng;
        self.check_for_duplicate_msg::<storage::SchnorrDone>(message.from())?;

        if !self
            .local_storage
            .contains::<storage::PublicShares<C>>(&self.id)
        {
            info!("Not yet ready to handle round four keygen message; stashing.");
            self.stash_message(message)?;
            return Ok(ProcessOutcome::Incomplete);
        }
        info!("Handling round four keygen message.");

        message.check_type(MessageType::Keygen(KeygenMessageType::R4SchnorrProof))?;
        let proof: PiSchProof<C> = deserialize!(&message.unverified_bytes)?;

        let context = self.retrieve_context();
        let global_rid = *self
            .local_storage
            .retrieve::<storage::GlobalRid>(&self.id)?;
        let decommit = self
            .local_storage
            .retrieve::<storage::Decommit<C>>(message.from())?;
        let precommit_point = decommit.precommit;
        let public_shares = self
            .local_storage
            .retrieve::<storage::PublicShares<C>>(&self.id)?;
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

    /// Final gate: assemble and self-check the save data.
    fn maybe_finish_protocol(
        &mut self,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        let others = self.other_participant_ids.clone();
        let done = self
            .local_storage
            .contains_for_all_ids::<storage::SchnorrDone>(&others)
            && self
                .local_storage
                .contains_for_all_ids::<storage::PaillierDone>(&others)
            && self
                .local_storage
                .contains::<storage::FinalShare<C>>(&self.id);
        if !done {
            return Ok(ProcessOutcome::Incomplete);
        }
        info!("Keygen complete; assembling save data.");

        let all = self.all_participants();
        let mut vss_commitments = Vec::with_capacity(all.len());
        for party in &all {
            let decommit = self.local_storage.retrieve::<storage::Decommit<C>>(party)?;
            vss_commitments.push((party.clone(), decommit.coeff_commitments.clone()));
        }
        let public_shares = self
            .local_storage
            .remove::<storage::PublicShares<C>>(&self.id.clone())?;
        let private_share = self
            .local_storage
            .remove::<storage::FinalShare<C>>(&self.id.clone())?;
        let global_rid = *self
            .local_storage
            .retrieve::<storage::GlobalRid>(&self.id)?;
        let mut auxinfo_publics = Vec::with_capacity(all.len());
        for party in &all {
            auxinfo_publics.push(
                self.local_storage
                    .retrieve::<storage::AuxPublic>(party)?
                    .clone(),
            );
        }
        let auxinfo_private = self
            .local_storage
            .remove::<storage::AuxPrivate>(&self.id.clone())?;

        let mut sorted = all.clone();
        sorted.sort();
        let output = Output::from_parts(
            sorted,
            self.input.threshold(),
            global_rid,
            vss_commitments,
            public_shares,
            private_share,
            &self.id,
            auxinfo_publics,
            auxinfo_private,
        )?;

        self.status = Status::TerminatedSuccessfully;
        Ok(ProcessOutcome::Terminated(output))
    }
}

/// Transcript binding the Paillier proofs to the session, the shared
/// randomness, and the prover.
fn paillier_proof_transcript(
    sid: Identifier,
    global_rid: &[u8; 32],
    sender: &PartyId,
) -> Result<Transcript> {
    let mut transcript = Transcript::new(b"keygen paillier proofs");
    transcript.append_message(b"sid", &serialize!(&sid)?);
    transcript.append_message(b"rid", global_rid);
    transcript.append_message(b"sender", &serialize!(sender)?);
    Ok(transcript)
}

/// Transcript for the round-four Schnorr proof.
fn schnorr_proof_transcript(
    sid: Identifier,
    global_rid: &[u8; 32],
    sender: &PartyId,
) -> Result<Transcript> {
    let mut transcript = Transcript::new(b"keygen schnorr");
    transcript.append_message(b"sid", &serialize!(&sid)?);
    transcript.append_message(b"rid", global_rid);
    transcript.append_message(b"sender", &serialize!(sender)?);
    Ok(transcript)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        curve::TestCurve,
        protocol::testing::test_party_ids,
        utils::testing::init_testing,
        vss,
    };
    use rand::{rngs::StdRng, Rng};
    use std::collections::HashMap;

    type TestKeygen = KeygenParticipant<TestCurve>;

    pub(crate) fn make_keygen_quorum(
        sid: Identifier,
        parties: &[PartyId],
        threshold: usize,
        rng: &mut StdRng,
    ) -> Result<Vec<TestKeygen>> {
        parties
            .iter()
            .map(|party| {
                let pre = PreParams::from_pool_insecure(rng)?;
                let others = parties
                    .iter()
                    .filter(|p| *p != party)
                    .cloned()
                    .collect::<Vec<_>>();
                TestKeygen::new(sid, party.clone(), others, Input::new(threshold, Some(pre)))
            })
            .collect()
    }

    pub(crate) fn deliver_all(
        messages: &[Message],
        inboxes: &mut HashMap<PartyId, Vec<Message>>,
    ) {
        for message in messages {
            inboxes
                .get_mut(message.to())
                .unwrap()
                .push(message.clone());
        }
    }

    fn is_done(quorum: &[TestKeygen]) -> bool {
        quorum
            .iter()
            .all(|p| *p.status() == Status::TerminatedSuccessfully)
    }

    /// Run a full keygen among `n` in-memory parties, delivering messages in
    /// random order, optionally tampering with messages in flight.
    fn run_keygen(
        quorum: &mut [TestKeygen],
        rng: &mut StdRng,
        mut tamper: impl FnMut(&mut Message),
    ) -> Result<Vec<Output<TestCurve>>> {
        let mut inboxes: HashMap<PartyId, Vec<Message>> = quorum
            .iter()
            .map(|p| (p.id().clone(), Vec::new()))
            .collect();
        let mut outputs: Vec<Option<Output<TestCurve>>> =
            std::iter::repeat_with(|| None).take(quorum.len()).collect();

        for participant in quorum.iter() {
            let empty: [u8; 0] = [];
            let ready = Message::new(
                TestKeygen::ready_type(),
                participant.sid(),
                participant.id().clone(),
                participant.id().clone(),
                &empty,
            )?;
            inboxes.get_mut(participant.id()).unwrap().push(ready);
        }

        while !is_done(quorum) {
            let index = rng.gen_range(0..quorum.len());
            let participant = &mut quorum[index];
            let inbox = inboxes.get_mut(participant.id()).unwrap();
            if inbox.is_empty() {
                continue;
            }
            let mut message = inbox.remove(rng.gen_range(0..inbox.len()));
            tamper(&mut message);
            match participant.process_message(rng, &message)? {
                ProcessOutcome::Incomplete => {}
                ProcessOutcome::Processed(messages) => deliver_all(&messages, &mut inboxes),
                ProcessOutcome::Terminated(output) => outputs[index] = Some(output),
                ProcessOutcome::TerminatedForThisParticipant(output, messages) => {
                    deliver_all(&messages, &mut inboxes);
                    outputs[index] = Some(output);
                }
            }
        }
        Ok(outputs.into_iter().flatten().collect())
    }

    #[test]
    fn keygen_produces_consistent_save_data() {
        let mut rng = init_testing();
        let parties = test_party_ids(3);
        let sid = Identifier::random(&mut rng);
        let threshold = 1;
        let mut quorum = make_keygen_quorum(sid, &parties, threshold, &mut rng).unwrap();
        let outputs = run_keygen(&mut quorum, &mut rng, |_| {}).unwrap();
        assert_eq!(outputs.len(), parties.len());

        // Everybody agrees on the public key and the party list.
        let key = outputs[0].public_key_point();
        for output in &outputs {
            assert_eq!(output.public_key_point(), key);
            assert_eq!(output.participants(), outputs[0].participants());
            assert_eq!(output.threshold(), threshold);
        }

        // The Lagrange interpolation of any t+1 shares reproduces the
        // discrete log of the joint public key.
        for subset in [[0usize, 1], [1, 2], [0, 2]] {
            let shares: Vec<_> = subset
                .iter()
                .map(|&i| {
                    (
                        parties[i].clone(),
                        *outputs[i].private_share().as_scalar(),
                    )
                })
                .collect();
            let secret = vss::reconstruct::<TestCurve>(&shares).unwrap();
            assert_eq!(
                TestCurve::generator().multiply_by_scalar(&secret),
                key
            );
        }

        // Public shares line up with private shares.
        for (output, party) in outputs.iter().zip(parties.iter()) {
            let public = output.find_public_share(party).unwrap();
            assert_eq!(public.as_ref(), &output.private_share().public_point());
        }
    }

    #[test]
    fn single_party_keygen_completes() {
        let mut rng = init_testing();
        let parties = test_party_ids(1);
        let sid = Identifier::random(&mut rng);
        let mut quorum = make_keygen_quorum(sid, &parties, 0, &mut rng).unwrap();
        let outputs = run_keygen(&mut quorum, &mut rng, |_| {}).unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(
            outputs[0].public_key_point(),
            outputs[0].private_share().public_point()
        );
    }

    #[test]
    fn tampered_share_names_the_dealer() {
        let mut rng = init_testing();
        let parties = test_party_ids(3);
        let sid = Identifier::random(&mut rng);
        let mut quorum = make_keygen_quorum(sid, &parties, 1, &mut rng).unwrap();

        // Tamper with the share the lowest-keyed party deals to the second
        // party: add one to the scalar in transit.
        let dealer = parties[0].clone();
        let victim = parties[1].clone();
        let result = run_keygen(&mut quorum, &mut rng, |message| {
            if message.message_type() == MessageType::Keygen(KeygenMessageType::R2PrivateShare)
                && message.from() == &dealer
                && message.to() == &victim
            {
                let payload: SharePayload<TestCurve> =
                    bincode::deserialize(&message.unverified_bytes).unwrap();
                let tampered = SharePayload::<TestCurve> {
                    share: payload.share.add(&<TestCurve as CurveTrait>::Scalar::one()),
                };
                message.unverified_bytes = bincode::serialize(&tampered).unwrap();
            }
        });

        match result {
            Err(InternalError::ProtocolViolation(culprits)) => {
                assert_eq!(culprits, vec![dealer]);
            }
            other => panic!("expected a protocol violation naming the dealer, got {other:?}"),
        }
    }
}
