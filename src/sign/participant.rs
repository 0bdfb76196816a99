//! The interactive threshold signing participant.
//!
//! A quorum of exactly `t + 1` shareholders produces a standard ECDSA
//! signature over a caller-supplied message digest. The shape of the run:
//!
//! 1. Every signer samples a mask share `kᵢ` and a nonce share `γᵢ`,
//!    commits to `Γᵢ = γᵢ·G`, and circulates `Enc_i(kᵢ)` with a range proof
//!    per receiver.
//! 2. Every ordered pair runs the multiplicative-to-additive subprotocol
//!    twice: against the peer's nonce share and against its (Lagrange
//!    weighted) key share, the latter with a consistency check.
//! 3. The additive shares are folded into `δᵢ` and `σᵢ`; `δᵢ` is broadcast
//!    and `δ = Σ δᵢ = k·γ` reconstructed.
//! 4. Nonce commitments are opened, `Γ = Σ Γᵢ`, `R = δ⁻¹·Γ = G^{1/k}`, and
//!    `r = x(R) mod q`.
//! 5. Every signer publishes `R^{kᵢ}` with a proof binding it to the round-1
//!    ciphertext.
//! 6. `∏ R^{kᵢ} = G` gates the release of the signature shares
//!    `sᵢ = m·kᵢ + r·σᵢ`; a signer whose proof fails is named before any
//!    share leaves this party.
//! 7. `s = Σ sᵢ` is normalized to the low half of the order and the
//!    resulting `(r, s)` verified against the joint key before being
//!    released.

use crate::{
    curve::{CurveTrait, EcdsaCurve, ScalarTrait, SignatureTrait, VerifyingKeyTrait},
    errors::{CallerError, InternalError, Result},
    keygen,
    local_storage::{LocalStorage, TypeTag},
    messages::{Message, MessageType, ProtocolType, SignMessageType},
    mta,
    paillier::{Ciphertext, Nonce},
    participant::{InnerProtocolParticipant, ProcessOutcome, ProtocolParticipant, Status},
    protocol::{Identifier, PartyId, SharedContext},
    sign::commit::{SignCommit, SignDecommit},
    signature::SignatureData,
    utils::{bn_to_le_bytes32, random_positive_bn},
    vss,
    zkp::{
        pidls::{self, PiDlsProof},
        pienc::{self, PiEncProof},
        pimta::{self, PiMtaProof, PiMtaProofWc},
        Proof,
    },
};
use libpaillier::unknown_order::BigNumber;
use merlin::Transcript;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use tracing::{error, info, instrument};
use zeroize::Zeroize;

/// Transient round-one secrets; wiped as soon as the signature share is out.
struct RoundOnePrivate {
    k: BigNumber,
    gamma: BigNumber,
    k_nonce: Nonce,
}

impl Zeroize for RoundOnePrivate {
    fn zeroize(&mut self) {
        self.k = BigNumber::zero();
        self.gamma = BigNumber::zero();
        self.k_nonce = BigNumber::zero();
    }
}

impl Drop for RoundOnePrivate {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl std::fmt::Debug for RoundOnePrivate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoundOnePrivate").finish_non_exhaustive()
    }
}

mod storage {
    use super::*;

    pub(super) struct Commit;
    impl TypeTag for Commit {
        type Value = SignCommit;
    }
    pub(super) struct Decommit<C> {
        _c: PhantomData<C>,
    }
    impl<C: CurveTrait> TypeTag for Decommit<C> {
        type Value = SignDecommit<C>;
    }
    pub(super) struct R1Private;
    impl TypeTag for R1Private {
        type Value = RoundOnePrivate;
    }
    pub(super) struct AliceCiphertext;
    impl TypeTag for AliceCiphertext {
        type Value = Ciphertext;
    }
    pub(super) struct RangeProofOk;
    impl TypeTag for RangeProofOk {
        type Value = ();
    }
    /// Our additive shares from the responses we sent to a given peer:
    /// `(β, ν)`.
    pub(super) struct ResponderShares<C: CurveTrait> {
        _c: PhantomData<C>,
    }
    impl<C: CurveTrait> TypeTag for ResponderShares<C> {
        type Value = (C::Scalar, C::Scalar);
    }
    /// The additive shares decrypted from a peer's response: `(α, μ)`.
    pub(super) struct InitiatorShares<C: CurveTrait> {
        _c: PhantomData<C>,
    }
    impl<C: CurveTrait> TypeTag for InitiatorShares<C> {
        type Value = (C::Scalar, C::Scalar);
    }
    pub(super) struct Delta<C: CurveTrait> {
        _c: PhantomData<C>,
    }
    impl<C: CurveTrait> TypeTag for Delta<C> {
        type Value = C::Scalar;
    }
    pub(super) struct Sigma<C: CurveTrait> {
        _c: PhantomData<C>,
    }
    impl<C: CurveTrait> TypeTag for Sigma<C> {
        type Value = C::Scalar;
    }
    pub(super) struct RPoint<C> {
        _c: PhantomData<C>,
    }
    impl<C: CurveTrait> TypeTag for RPoint<C> {
        type Value = C;
    }
    pub(super) struct RScalar<C: CurveTrait> {
        _c: PhantomData<C>,
    }
    impl<C: CurveTrait> TypeTag for RScalar<C> {
        type Value = C::Scalar;
    }
    pub(super) struct RBar<C> {
        _c: PhantomData<C>,
    }
    impl<C: CurveTrait> TypeTag for RBar<C> {
        type Value = C;
    }
    pub(super) struct DlsProofOk;
    impl TypeTag for DlsProofOk {
        type Value = ();
    }
    pub(super) struct SigShare<C: CurveTrait> {
        _c: PhantomData<C>,
    }
    impl<C: CurveTrait> TypeTag for SigShare<C> {
        type Value = C::Scalar;
    }
}

/// Input to signing: prior save data and the digest to sign.
#[derive(Debug)]
pub struct Input<C: CurveTrait> {
    keygen_output: keygen::Output<C>,
    digest: BigNumber,
}

impl<C: CurveTrait> Input<C> {
    /// Assemble signing input.
    ///
    /// `digest` is the message hash as a non-negative integer already
    /// reduced below the curve order; the application chooses the hash
    /// algorithm.
    pub fn new(digest: BigNumber, keygen_output: keygen::Output<C>) -> Result<Self> {
        if digest < BigNumber::zero() || digest >= C::order() {
            error!("Signing digest must lie in [0, q)");
            Err(CallerError::BadInput)?;
        }
        Ok(Self {
            keygen_output,
            digest,
        })
    }
}

/// Round-one broadcast payload.
#[derive(Serialize, Deserialize)]
struct R1Payload {
    commit: SignCommit,
    ciphertext: Ciphertext,
}

/// Round-one per-recipient payload.
#[derive(Serialize, Deserialize)]
struct R1ProofPayload<C> {
    #[serde(bound(deserialize = "C: CurveTrait"))]
    proof: PiEncProof<C>,
}

/// Round-two per-recipient payload: both MtA responses.
#[derive(Serialize, Deserialize)]
struct R2Payload<C: CurveTrait> {
    c_gamma: Ciphertext,
    proof_gamma: PiMtaProof,
    c_key: Ciphertext,
    #[serde(bound(deserialize = "C: CurveTrait"))]
    proof_key: PiMtaProofWc<C>,
}

#[derive(Serialize, Deserialize)]
struct R3Payload<C: CurveTrait> {
    #[serde(bound(deserialize = "C: CurveTrait"))]
    delta: C::Scalar,
}

#[derive(Serialize, Deserialize)]
struct R5Payload<C: CurveTrait> {
    #[serde(bound(deserialize = "C: CurveTrait"))]
    q_point: C,
}

#[derive(Serialize, Deserialize)]
struct R5ProofPayload<C: CurveTrait> {
    #[serde(bound(deserialize = "C: CurveTrait"))]
    proof: PiDlsProof<C>,
}

#[derive(Serialize, Deserialize)]
struct R6Payload<C: CurveTrait> {
    #[serde(bound(deserialize = "C: CurveTrait"))]
    share: C::Scalar,
}

/// A party running the interactive signing protocol.
#[derive(Debug)]
pub struct SignParticipant<C: EcdsaCurve> {
    sid: Identifier,
    id: PartyId,
    other_participant_ids: Vec<PartyId>,
    local_storage: LocalStorage,
    input: Input<C>,
    status: Status,
}

impl<C: EcdsaCurve> ProtocolParticipant for SignParticipant<C> {
    type Input = Input<C>;
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
        MessageType::Sign(SignMessageType::Ready)
    }

    fn protocol_type() -> ProtocolType {
        ProtocolType::Sign
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
            "SIGN: party {} received {:?} from {}",
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
            MessageType::Sign(SignMessageType::Ready) => self.handle_ready_msg(rng, message),
            MessageType::Sign(SignMessageType::R1CommitHash) => {
                self.handle_round_one_broadcast(rng, message)
            }
            MessageType::Sign(SignMessageType::R1RangeProof) => {
                self.handle_round_one_proof(rng, message)
            }
            MessageType::Sign(SignMessageType::R2MtaResponse) => {
                self.handle_round_two_msg(rng, message)
            }
            MessageType::Sign(SignMessageType::R3Delta) => self.handle_round_three_msg(rng, message),
            MessageType::Sign(SignMessageType::R4Decommit) => {
                self.handle_round_four_msg(rng, message)
            }
            MessageType::Sign(SignMessageType::R5RBar) => self.handle_round_five_rbar(rng, message),
            MessageType::Sign(SignMessageType::R5ConsistencyProof) => {
                self.handle_round_five_proof(rng, message)
            }
            MessageType::Sign(SignMessageType::R6Share) => self.handle_round_six_msg(rng, message),
            message_type => {
                error!("Incorrect MessageType given to SignParticipant: {message_type:?}");
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
        for missing in [
            self.local_storage
                .missing_ids::<storage::AliceCiphertext>(others),
            self.local_storage.missing_ids::<storage::RangeProofOk>(others),
            self.local_storage
                .missing_ids::<storage::InitiatorShares<C>>(others),
            self.local_storage.missing_ids::<storage::Delta<C>>(others),
            self.local_storage.missing_ids::<storage::Decommit<C>>(others),
            self.local_storage.missing_ids::<storage::RBar<C>>(others),
            self.local_storage.missing_ids::<storage::DlsProofOk>(others),
            self.local_storage.missing_ids::<storage::SigShare<C>>(others),
        ] {
            if !missing.is_empty() {
                return missing;
            }
        }
        Vec::new()
    }
}

impl<C: EcdsaCurve> InnerProtocolParticipant for SignParticipant<C> {
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

impl<C: EcdsaCurve> SignParticipant<C> {
    /// The full signing quorum in canonical order.
    fn quorum(&self) -> Vec<PartyId> {
        let mut quorum = self.all_participants();
        quorum.sort();
        quorum
    }

    /// This party's additive key share `wᵢ = λᵢ·xᵢ` for the active quorum.
    fn weighted_share(&self) -> Result<C::Scalar> {
        let lambda = vss::lagrange_coefficient_at_zero::<C>(&self.id, &self.quorum())?;
        Ok(lambda.mul(self.input.keygen_output.private_share().as_scalar()))
    }

    /// A peer's public weighted share `Wⱼ = λⱼ·Xⱼ`.
    fn weighted_public_share(&self, party: &PartyId) -> Result<C> {
        let lambda = vss::lagrange_coefficient_at_zero::<C>(party, &self.quorum())?;
        let share = self.input.keygen_output.find_public_share(party)?;
        Ok(share.as_ref().multiply_by_scalar(&lambda))
    }

    #[instrument(skip_all, err(Debug))]
    fn handle_ready_msg<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        message: &Message,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        info!("Handling ready sign message.");
        let ready_outcome = self.process_ready_message(rng, message)?;
        let round_one_messages = run_only_once!(self, "sign round one", self.gen_round_one_msgs(rng))?;
        let cascade = self.maybe_finish_round_one(rng)?;
        ready_outcome
            .with_messages(round_one_messages)
            .consolidate(vec![cascade])
    }

    /// Round one: sample `kᵢ`, `γᵢ`; commit to `Γᵢ`; circulate `Enc(kᵢ)`
    /// with per-receiver range proofs.
    #[instrument(skip_all, err(Debug))]
    fn gen_round_one_msgs<R: RngCore + CryptoRng>(&mut self, rng: &mut R) -> Result<Vec<Message>> {
        info!("Generating round one sign messages.");
        let order = C::order();
        let k = random_positive_bn(rng, &order);
        let gamma = random_positive_bn(rng, &order);

        let gamma_point = C::generator().multiply_by_bignum(&gamma)?;
        let decommit = SignDecommit::new(&self.sid, &self.id, gamma_point);
        let commit = decommit.commit()?;
        self.local_storage
            .store::<storage::Commit>(self.id.clone(), commit.clone());
        self.local_storage
            .store::<storage::Decommit<C>>(self.id.clone(), decommit);

        let own_aux = self.input.keygen_output.find_auxinfo(&self.id)?;
        let opening = mta::init(rng, own_aux.pk(), &k)?;
        let (ciphertext, k_nonce) = (opening.ciphertext, opening.nonce);
        self.local_storage
            .store::<storage::AliceCiphertext>(self.id.clone(), ciphertext.clone());

        let context = self.retrieve_context();
        let rid = self.input.keygen_output.rid();
        let mut messages = self.broadcast_for_other_participants(
            MessageType::Sign(SignMessageType::R1CommitHash),
            &R1Payload {
                commit,
                ciphertext: ciphertext.clone(),
            },
        )?;
        for recipient in self.other_participant_ids.clone() {
            let recipient_aux = self.input.keygen_output.find_auxinfo(&recipient)?;
            let mut transcript = range_proof_transcript(self.sid, &rid, &self.id)?;
            let proof: PiEncProof<C> = PiEncProof::prove(
                pienc::CommonInput::new(
                    recipient_aux.params().params(),
                    own_aux.pk(),
                    &ciphertext,
                ),
                pienc::PiEncSecret::new(&k, &k_nonce),
                &context,
                &mut transcript,
                rng,
            )?;
            messages.push(Message::new(
                MessageType::Sign(SignMessageType::R1RangeProof),
                self.sid,
                self.id.clone(),
                recipient,
                &R1ProofPayload { proof },
            )?);
        }

        self.local_storage
            .store::<storage::R1Private>(self.id.clone(), RoundOnePrivate { k, gamma, k_nonce });
        Ok(messages)
    }

    #[instrument(skip_all, err(Debug))]
    fn handle_round_one_broadcast<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        message: &Message,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        self.check_for_duplicate_msg::<storage::AliceCiphertext>(message.from())?;
        info!("Handling round one sign broadcast.");

        let payload: R1Payload = deserialize!(&message.unverified_bytes)?;
        let sender_aux = self.input.keygen_output.find_auxinfo(message.from())?;
        if !sender_aux.pk().ciphertext_in_range(&payload.ciphertext) {
            error!("Round one ciphertext is out of range for the sender's modulus");
            return Err(InternalError::culprit(message.from()));
        }
        self.local_storage
            .store_once::<storage::Commit>(message.from().clone(), payload.commit)?;
        self.local_storage
            .store::<storage::AliceCiphertext>(message.from().clone(), payload.ciphertext);

        // The matching range proof may have arrived first.
        let outcomes = self
            .fetch_messages_by_sender(
                MessageType::Sign(SignMessageType::R1RangeProof),
                message.from(),
            )?
            .iter()
            .map(|msg| self.handle_round_one_proof(rng, msg))
            .collect::<Result<Vec<_>>>()?;
        ProcessOutcome::collect(outcomes)
    }

    #[instrument(skip_all, err(Debug))]
    fn handle_round_one_proof<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        message: &Message,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        self.check_for_duplicate_msg::<storage::RangeProofOk>(message.from())?;

        if !self
            .local_storage
            .contains::<storage::AliceCiphertext>(message.from())
        {
            info!("Range proof arrived before its ciphertext; stashing.");
            self.stash_message(message)?;
            return Ok(ProcessOutcome::Incomplete);
        }
        info!("Handling round one sign range proof.");

        let payload: R1ProofPayload<C> = deserialize!(&message.unverified_bytes)?;
        let context = self.retrieve_context();
        let rid = self.input.keygen_output.rid();
        let own_aux = self.input.keygen_output.find_auxinfo(&self.id)?;
        let sender_aux = self.input.keygen_output.find_auxinfo(message.from())?;
        let ciphertext = self
            .local_storage
            .retrieve::<storage::AliceCiphertext>(message.from())?;

        let mut transcript = range_proof_transcript(self.sid, &rid, message.from())?;
        payload
            .proof
            .verify(
                pienc::CommonInput::new(own_aux.params().params(), sender_aux.pk(), ciphertext),
                &context,
                &mut transcript,
            )
            .map_err(|_| InternalError::culprit(message.from()))?;

        self.local_storage
            .store_once::<storage::RangeProofOk>(message.from().clone(), ())?;

        self.maybe_finish_round_one(rng)
    }

    /// Once every peer's ciphertext has a verified range proof, answer all
    /// of them with MtA responses.
    fn maybe_finish_round_one<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        let others = self.other_participant_ids.clone();
        let r1_done = self
            .local_storage
            .contains_for_all_ids::<storage::AliceCiphertext>(&others)
            && self
                .local_storage
                .contains_for_all_ids::<storage::RangeProofOk>(&others);
        if !r1_done {
            return Ok(ProcessOutcome::Incomplete);
        }

        let round_two_messages =
            run_only_once!(self, "sign round two", self.gen_round_two_msgs(rng))?;

        let mut outcomes = self
            .fetch_messages(MessageType::Sign(SignMessageType::R2MtaResponse))?
            .iter()
            .map(|msg| self.handle_round_two_msg(rng, msg))
            .collect::<Result<Vec<_>>>()?;
        outcomes.push(self.maybe_finish_round_two(rng)?);
        ProcessOutcome::collect_with_messages(outcomes, round_two_messages)
    }

    /// Round two: for each peer, respond to its encrypted mask share twice:
    /// with our nonce share `γᵢ` and with our weighted key share `wᵢ` (the
    /// latter proven consistent with `Wᵢ = wᵢ·G`).
    #[instrument(skip_all, err(Debug))]
    fn gen_round_two_msgs<R: RngCore + CryptoRng>(&mut self, rng: &mut R) -> Result<Vec<Message>> {
        info!("Generating round two sign messages.");
        let context = self.retrieve_context();
        let rid = self.input.keygen_output.rid();

        let (gamma, w) = {
            let r1 = self.local_storage.retrieve::<storage::R1Private>(&self.id)?;
            (r1.gamma.clone(), C::scalar_to_bn(&self.weighted_share()?))
        };
        let w_point = C::generator().multiply_by_bignum(&w)?;

        let mut messages = Vec::new();
        for recipient in self.other_participant_ids.clone() {
            let recipient_aux = self.input.keygen_output.find_auxinfo(&recipient)?;
            let recipient_pk = recipient_aux.pk();
            let c1 = self
                .local_storage
                .retrieve::<storage::AliceCiphertext>(&recipient)?
                .clone();

            // One MtA run against the peer's mask with our nonce share, one
            // with our weighted key share (consistency-checked against Wᵢ).
            let gamma_response = mta::respond::<C, _>(rng, recipient_pk, &c1, &gamma)?;
            let key_response = mta::respond::<C, _>(rng, recipient_pk, &c1, &w)?;

            let mut transcript = mta_transcript(self.sid, &rid, &self.id, &recipient)?;
            let proof_gamma = PiMtaProof::prove_for_curve::<C, _>(
                pimta::CommonInput::new(
                    recipient_aux.params().params(),
                    recipient_pk,
                    &c1,
                    &gamma_response.ciphertext,
                ),
                pimta::PiMtaSecret::new(&gamma, &gamma_response.beta_prime, &gamma_response.nonce),
                &context,
                &mut transcript,
                rng,
            )?;
            let proof_key = PiMtaProofWc::<C>::prove(
                pimta::CommonInput::new(
                    recipient_aux.params().params(),
                    recipient_pk,
                    &c1,
                    &key_response.ciphertext,
                ),
                &w_point,
                pimta::PiMtaSecret::new(&w, &key_response.beta_prime, &key_response.nonce),
                &context,
                &mut transcript,
                rng,
            )?;

            self.local_storage.store::<storage::ResponderShares<C>>(
                recipient.clone(),
                (gamma_response.share, key_response.share),
            );

            messages.push(Message::new(
                MessageType::Sign(SignMessageType::R2MtaResponse),
                self.sid,
                self.id.clone(),
                recipient,
                &R2Payload::<C> {
                    c_gamma: gamma_response.ciphertext,
                    proof_gamma,
                    c_key: key_response.ciphertext,
                    proof_key,
                },
            )?);
        }
        Ok(messages)
    }

    #[instrument(skip_all, err(Debug))]
    fn handle_round_two_msg<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        message: &Message,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        self.check_for_duplicate_msg::<storage::InitiatorShares<C>>(message.from())?;

        if !self.local_storage.contains::<storage::R1Private>(&self.id) {
            self.stash_message(message)?;
            return Ok(ProcessOutcome::Incomplete);
        }
        info!("Handling round two sign message.");

        let payload: R2Payload<C> = deserialize!(&message.unverified_bytes)?;
        let context = self.retrieve_context();
        let rid = self.input.keygen_output.rid();
        let own_aux = self.input.keygen_output.find_auxinfo(&self.id)?;
        let own_ciphertext = self
            .local_storage
            .retrieve::<storage::AliceCiphertext>(&self.id)?
            .clone();
        let sender_w_point = self.weighted_public_share(message.from())?;

        let mut transcript = mta_transcript(self.sid, &rid, message.from(), &self.id)?;
        payload
            .proof_gamma
            .verify_for_curve::<C>(
                pimta::CommonInput::new(
                    own_aux.params().params(),
                    own_aux.pk(),
                    &own_ciphertext,
                    &payload.c_gamma,
                ),
                &context,
                &mut transcript,
            )
            .map_err(|_| InternalError::culprit(message.from()))?;
        payload
            .proof_key
            .verify(
                pimta::CommonInput::new(
                    own_aux.params().params(),
                    own_aux.pk(),
                    &own_ciphertext,
                    &payload.c_key,
                ),
                &sender_w_point,
                &context,
                &mut transcript,
            )
            .map_err(|_| InternalError::culprit(message.from()))?;

        // Decrypt our additive shares and reduce into the scalar field.
        let dk = self
            .input
            .keygen_output
            .auxinfo_private()
            .decryption_key()
            .clone();
        let alpha = mta::finalize::<C>(&dk, &payload.c_gamma)?;
        let mu = mta::finalize::<C>(&dk, &payload.c_key)?;
        self.local_storage
            .store_once::<storage::InitiatorShares<C>>(message.from().clone(), (alpha, mu))?;

        self.maybe_finish_round_two(rng)
    }

    /// Round three: fold the MtA shares into `δᵢ` and `σᵢ`, broadcast `δᵢ`.
    fn maybe_finish_round_two<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        let others = self.other_participant_ids.clone();
        let r2_done = self
            .local_storage
            .contains_for_all_ids::<storage::InitiatorShares<C>>(&others)
            && self.local_storage.contains::<storage::R1Private>(&self.id);
        if !r2_done || !self.run_once("sign finish round two")? {
            return Ok(ProcessOutcome::Incomplete);
        }
        info!("Finishing sign round two; broadcasting δ share.");

        let (k_scalar, gamma_scalar) = {
            let r1 = self.local_storage.retrieve::<storage::R1Private>(&self.id)?;
            (C::bn_to_scalar(&r1.k)?, C::bn_to_scalar(&r1.gamma)?)
        };
        let w = self.weighted_share()?;

        let mut delta = k_scalar.mul(&gamma_scalar);
        let mut sigma = k_scalar.mul(&w);
        for peer in &others {
            let (alpha, mu) = *self
                .local_storage
                .retrieve::<storage::InitiatorShares<C>>(peer)?;
            let (beta, nu) = *self
                .local_storage
                .retrieve::<storage::ResponderShares<C>>(peer)?;
            delta = delta.add(&alpha).add(&beta);
            sigma = sigma.add(&mu).add(&nu);
        }
        self.local_storage
            .store::<storage::Delta<C>>(self.id.clone(), delta);
        self.local_storage
            .store::<storage::Sigma<C>>(self.id.clone(), sigma);

        let round_three_messages = self.broadcast_for_other_participants(
            MessageType::Sign(SignMessageType::R3Delta),
            &R3Payload::<C> { delta },
        )?;

        let mut outcomes = self
            .fetch_messages(MessageType::Sign(SignMessageType::R3Delta))?
            .iter()
            .map(|msg| self.handle_round_three_msg(rng, msg))
            .collect::<Result<Vec<_>>>()?;
        outcomes.push(self.maybe_finish_round_three(rng)?);
        ProcessOutcome::collect_with_messages(outcomes, round_three_messages)
    }

    #[instrument(skip_all, err(Debug))]
    fn handle_round_three_msg<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        message: &Message,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        self.check_for_duplicate_msg::<storage::Delta<C>>(message.from())?;

        if !self.local_storage.contains::<storage::Delta<C>>(&self.id) {
            self.stash_message(message)?;
            return Ok(ProcessOutcome::Incomplete);
        }
        info!("Handling round three sign message.");

        let payload: R3Payload<C> = deserialize!(&message.unverified_bytes)?;
        self.local_storage
            .store_once::<storage::Delta<C>>(message.from().clone(), payload.delta)?;

        self.maybe_finish_round_three(rng)
    }

    /// Round four: open the nonce commitment.
    fn maybe_finish_round_three<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        let all = self.all_participants();
        if !self
            .local_storage
            .contains_for_all_ids::<storage::Delta<C>>(&all)
        {
            return Ok(ProcessOutcome::Incomplete);
        }
        if !self.run_once("sign round four")? {
            return Ok(ProcessOutcome::Incomplete);
        }
        info!("Broadcasting nonce decommitment.");

        let decommit = self
            .local_storage
            .retrieve::<storage::Decommit<C>>(&self.id)?
            .clone();
        let round_four_messages = self.broadcast_for_other_participants(
            MessageType::Sign(SignMessageType::R4Decommit),
            &decommit,
        )?;

        let mut outcomes = self
            .fetch_messages(MessageType::Sign(SignMessageType::R4Decommit))?
            .iter()
            .map(|msg| self.handle_round_four_msg(rng, msg))
            .collect::<Result<Vec<_>>>()?;
        outcomes.push(self.maybe_finish_round_four(rng)?);
        ProcessOutcome::collect_with_messages(outcomes, round_four_messages)
    }

    #[instrument(skip_all, err(Debug))]
    fn handle_round_four_msg<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        message: &Message,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        self.check_for_duplicate_msg::<storage::Decommit<C>>(message.from())?;

        if !self.local_storage.contains::<storage::Commit>(message.from()) {
            self.stash_message(message)?;
            return Ok(ProcessOutcome::Incomplete);
        }
        info!("Handling round four sign message.");

        let commit = self.local_storage.retrieve::<storage::Commit>(message.from())?;
        let decommit = SignDecommit::<C>::from_message(message, commit)?;
        self.local_storage
            .store_once::<storage::Decommit<C>>(message.from().clone(), decommit)?;

        self.maybe_finish_round_four(rng)
    }

    /// Round five: derive `R` and `r`, publish `R^{kᵢ}` with its
    /// consistency proof.
    fn maybe_finish_round_four<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        let all = self.all_participants();
        let r4_done = self
            .local_storage
            .contains_for_all_ids::<storage::Decommit<C>>(&all)
            && self
                .local_storage
                .contains_for_all_ids::<storage::Delta<C>>(&all);
        if !r4_done || !self.run_once("sign round five")? {
            return Ok(ProcessOutcome::Incomplete);
        }
        info!("Deriving the signature nonce point.");

        let mut gamma_sum = C::identity();
        let mut delta_sum = C::Scalar::zero();
        for party in &all {
            let decommit = self.local_storage.retrieve::<storage::Decommit<C>>(party)?;
            gamma_sum = gamma_sum + decommit.gamma_point;
            delta_sum = delta_sum.add(self.local_storage.retrieve::<storage::Delta<C>>(party)?);
        }
        let delta_inv = delta_sum.invert().ok_or_else(|| {
            error!("The combined δ is zero; the signing session must restart");
            InternalError::unattributed()
        })?;
        let r_point = gamma_sum.multiply_by_scalar(&delta_inv);
        let r_scalar = r_point.x_projection()?;
        if r_scalar == C::Scalar::zero() {
            error!("The signature r component is zero; the signing session must restart");
            return Err(InternalError::unattributed());
        }
        self.local_storage
            .store::<storage::RPoint<C>>(self.id.clone(), r_point);
        self.local_storage
            .store::<storage::RScalar<C>>(self.id.clone(), r_scalar);

        // Q_i = R^{k_i}, proven consistent with the round-one ciphertext.
        let context = self.retrieve_context();
        let rid = self.input.keygen_output.rid();
        let (k, k_nonce) = {
            let r1 = self.local_storage.retrieve::<storage::R1Private>(&self.id)?;
            (r1.k.clone(), r1.k_nonce.clone())
        };
        let q_point = r_point.multiply_by_bignum(&k)?;
        self.local_storage
            .store::<storage::RBar<C>>(self.id.clone(), q_point);

        let own_aux = self.input.keygen_output.find_auxinfo(&self.id)?;
        let own_ciphertext = self
            .local_storage
            .retrieve::<storage::AliceCiphertext>(&self.id)?
            .clone();
        let mut round_five_messages = self.broadcast_for_other_participants(
            MessageType::Sign(SignMessageType::R5RBar),
            &R5Payload::<C> { q_point },
        )?;
        for recipient in self.other_participant_ids.clone() {
            let recipient_aux = self.input.keygen_output.find_auxinfo(&recipient)?;
            let mut transcript = dls_transcript(self.sid, &rid, &self.id)?;
            let proof = PiDlsProof::prove(
                pidls::CommonInput::new(
                    recipient_aux.params().params(),
                    own_aux.pk(),
                    &own_ciphertext,
                    &r_point,
                    &q_point,
                ),
                pidls::PiDlsSecret::new(&k, &k_nonce),
                &context,
                &mut transcript,
                rng,
            )?;
            round_five_messages.push(Message::new(
                MessageType::Sign(SignMessageType::R5ConsistencyProof),
                self.sid,
                self.id.clone(),
                recipient,
                &R5ProofPayload { proof },
            )?);
        }

        let mut outcomes = self
            .fetch_messages(MessageType::Sign(SignMessageType::R5RBar))?
            .iter()
            .map(|msg| self.handle_round_five_rbar(rng, msg))
            .collect::<Result<Vec<_>>>()?;
        let proof_outcomes = self
            .fetch_messages(MessageType::Sign(SignMessageType::R5ConsistencyProof))?
            .iter()
            .map(|msg| self.handle_round_five_proof(rng, msg))
            .collect::<Result<Vec<_>>>()?;
        outcomes.extend(proof_outcomes);
        outcomes.push(self.maybe_finish_round_five(rng)?);
        ProcessOutcome::collect_with_messages(outcomes, round_five_messages)
    }

    #[instrument(skip_all, err(Debug))]
    fn handle_round_five_rbar<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        message: &Message,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        self.check_for_duplicate_msg::<storage::RBar<C>>(message.from())?;

        if !self.local_storage.contains::<storage::RPoint<C>>(&self.id) {
            self.stash_message(message)?;
            return Ok(ProcessOutcome::Incomplete);
        }
        info!("Handling round five sign point.");

        let payload: R5Payload<C> = deserialize!(&message.unverified_bytes)?;
        self.local_storage
            .store_once::<storage::RBar<C>>(message.from().clone(), payload.q_point)?;

        // Its proof may have arrived first.
        let outcomes = self
            .fetch_messages_by_sender(
                MessageType::Sign(SignMessageType::R5ConsistencyProof),
                message.from(),
            )?
            .iter()
            .map(|msg| self.handle_round_five_proof(rng, msg))
            .collect::<Result<Vec<_>>>()?;
        let maybe = self.maybe_finish_round_five(rng)?;
        ProcessOutcome::collect(outcomes.into_iter().chain([maybe]).collect())
    }

    #[instrument(skip_all, err(Debug))]
    fn handle_round_five_proof<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        message: &Message,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        self.check_for_duplicate_msg::<storage::DlsProofOk>(message.from())?;

        let ready = self.local_storage.contains::<storage::RPoint<C>>(&self.id)
            && self.local_storage.contains::<storage::RBar<C>>(message.from());
        if !ready {
            self.stash_message(message)?;
            return Ok(ProcessOutcome::Incomplete);
        }
        info!("Handling round five sign consistency proof.");

        let payload: R5ProofPayload<C> = deserialize!(&message.unverified_bytes)?;
        let context = self.retrieve_context();
        let rid = self.input.keygen_output.rid();
        let own_aux = self.input.keygen_output.find_auxinfo(&self.id)?;
        let sender_aux = self.input.keygen_output.find_auxinfo(message.from())?;
        let sender_ciphertext = self
            .local_storage
            .retrieve::<storage::AliceCiphertext>(message.from())?;
        let r_point = *self.local_storage.retrieve::<storage::RPoint<C>>(&self.id)?;
        let q_point = *self.local_storage.retrieve::<storage::RBar<C>>(message.from())?;

        let mut transcript = dls_transcript(self.sid, &rid, message.from())?;
        payload
            .proof
            .verify(
                pidls::CommonInput::new(
                    own_aux.params().params(),
                    sender_aux.pk(),
                    sender_ciphertext,
                    &r_point,
                    &q_point,
                ),
                &context,
                &mut transcript,
            )
            .map_err(|_| InternalError::culprit(message.from()))?;

        self.local_storage
            .store_once::<storage::DlsProofOk>(message.from().clone(), ())?;

        self.maybe_finish_round_five(rng)
    }

    /// Round six: check `∏ R^{kⱼ} = G`, then release the signature share.
    fn maybe_finish_round_five<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        let all = self.all_participants();
        let others = self.other_participant_ids.clone();
        let r5_done = self
            .local_storage
            .contains_for_all_ids::<storage::RBar<C>>(&all)
            && self
                .local_storage
                .contains_for_all_ids::<storage::DlsProofOk>(&others);
        if !r5_done || !self.run_once("sign round six")? {
            return Ok(ProcessOutcome::Incomplete);
        }
        info!("Checking the mask product before releasing signature shares.");

        let mut product = C::identity();
        for party in &all {
            product = product + *self.local_storage.retrieve::<storage::RBar<C>>(party)?;
        }
        if product != C::generator() {
            // Every individual consistency proof verified, so the mask
            // shares match the ciphertexts; a wrong product means some δ
            // contribution was false and cannot be pinned on one party.
            error!("Mask reconstruction failed: ∏ R^(k_i) ≠ G");
            return Err(InternalError::unattributed());
        }

        let r_scalar = *self.local_storage.retrieve::<storage::RScalar<C>>(&self.id)?;
        let sigma = *self.local_storage.retrieve::<storage::Sigma<C>>(&self.id)?;
        let digest = C::bn_to_scalar(&self.input.digest)?;
        let share = {
            let r1 = self.local_storage.retrieve::<storage::R1Private>(&self.id)?;
            let k_scalar = C::bn_to_scalar(&r1.k)?;
            digest.mul(&k_scalar).add(&r_scalar.mul(&sigma))
        };
        // The transient nonces are spent; wipe them.
        let _ = self.local_storage.remove::<storage::R1Private>(&self.id.clone())?;

        self.local_storage
            .store::<storage::SigShare<C>>(self.id.clone(), share);
        let round_six_messages = self.broadcast_for_other_participants(
            MessageType::Sign(SignMessageType::R6Share),
            &R6Payload::<C> { share },
        )?;

        let mut outcomes = self
            .fetch_messages(MessageType::Sign(SignMessageType::R6Share))?
            .iter()
            .map(|msg| self.handle_round_six_msg(rng, msg))
            .collect::<Result<Vec<_>>>()?;
        outcomes.push(self.maybe_finish_protocol()?);
        ProcessOutcome::collect_with_messages(outcomes, round_six_messages)
    }

    #[instrument(skip_all, err(Debug))]
    fn handle_round_six_msg<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        message: &Message,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        let _ = rng;
        self.check_for_duplicate_msg::<storage::SigShare<C>>(message.from())?;

        if !self
            .local_storage
            .contains::<storage::SigShare<C>>(&self.id)
        {
            self.stash_message(message)?;
            return Ok(ProcessOutcome::Incomplete);
        }
        info!("Handling round six sign message.");

        let payload: R6Payload<C> = deserialize!(&message.unverified_bytes)?;
        self.local_storage
            .store_once::<storage::SigShare<C>>(message.from().clone(), payload.share)?;

        self.maybe_finish_protocol()
    }

    /// Combine the shares, normalize, and verify before release.
    fn maybe_finish_protocol(
        &mut self,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        let all = self.all_participants();
        if !self
            .local_storage
            .contains_for_all_ids::<storage::SigShare<C>>(&all)
        {
            return Ok(ProcessOutcome::Incomplete);
        }
        info!("Combining signature shares.");

        let mut s = C::Scalar::zero();
        for party in &all {
            s = s.add(&self.local_storage.remove::<storage::SigShare<C>>(party)?);
        }
        if s == C::Scalar::zero() {
            error!("The signature s component is zero; the signing session must restart");
            return Err(InternalError::unattributed());
        }

        let r_point = *self.local_storage.retrieve::<storage::RPoint<C>>(&self.id)?;
        let r_scalar = *self.local_storage.retrieve::<storage::RScalar<C>>(&self.id)?;

        // Canonical low-s form; the parity flip folds into the recovery id.
        let mut recovery_id = r_point.y_parity();
        if s.is_high() {
            s = s.negate();
            recovery_id ^= 1;
        }

        let signature =
            C::EcdsaSignature::from_scalars(&C::scalar_to_bn(&r_scalar), &C::scalar_to_bn(&s))?;

        let digest_bytes = bn_to_le_bytes32(&self.input.digest)?
            .iter()
            .rev()
            .copied()
            .collect::<Vec<u8>>();
        self.input
            .keygen_output
            .verifying_key()?
            .verify_prehash(&digest_bytes, &signature)
            .map_err(|e| {
                error!("Assembled threshold signature failed verification: {e:?}");
                InternalError::unattributed()
            })?;

        let output = SignatureData::ecdsa(
            signature.r_bytes(),
            signature.s_bytes(),
            recovery_id,
            digest_bytes,
        );
        self.status = Status::TerminatedSuccessfully;
        Ok(ProcessOutcome::Terminated(output))
    }
}

fn range_proof_transcript(
    sid: Identifier,
    rid: &[u8; 32],
    sender: &PartyId,
) -> Result<Transcript> {
    let mut transcript = Transcript::new(b"sign range proof");
    transcript.append_message(b"sid", &serialize!(&sid)?);
    transcript.append_message(b"rid", rid);
    transcript.append_message(b"sender", &serialize!(sender)?);
    Ok(transcript)
}

fn mta_transcript(
    sid: Identifier,
    rid: &[u8; 32],
    initiator: &PartyId,
    responder: &PartyId,
) -> Result<Transcript> {
    let mut transcript = Transcript::new(b"sign mta");
    transcript.append_message(b"sid", &serialize!(&sid)?);
    transcript.append_message(b"rid", rid);
    transcript.append_message(b"initiator", &serialize!(initiator)?);
    transcript.append_message(b"responder", &serialize!(responder)?);
    Ok(transcript)
}

fn dls_transcript(sid: Identifier, rid: &[u8; 32], sender: &PartyId) -> Result<Transcript> {
    let mut transcript = Transcript::new(b"sign consistency proof");
    transcript.append_message(b"sid", &serialize!(&sid)?);
    transcript.append_message(b"rid", rid);
    transcript.append_message(b"sender", &serialize!(sender)?);
    Ok(transcript)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        curve::TestCurve,
        keygen::testing::simulate_output_set,
        protocol::testing::test_party_ids,
        utils::testing::init_testing,
    };
    use k256::ecdsa::signature::hazmat::PrehashVerifier;
    use rand::{rngs::StdRng, Rng};
    use sha2::{Digest, Sha256};
    use std::collections::HashMap;

    type TestSign = SignParticipant<TestCurve>;

    pub(crate) fn digest_of(message: &[u8]) -> BigNumber {
        let digest = Sha256::digest(message);
        BigNumber::from_slice(digest) % TestCurve::order()
    }

    pub(crate) fn make_sign_quorum(
        sid: Identifier,
        signers: &[PartyId],
        outputs: &[keygen::Output<TestCurve>],
        digest: &BigNumber,
    ) -> Result<Vec<TestSign>> {
        signers
            .iter()
            .zip(outputs.iter())
            .map(|(party, output)| {
                let others = signers
                    .iter()
                    .filter(|p| *p != party)
                    .cloned()
                    .collect::<Vec<_>>();
                TestSign::new(
                    sid,
                    party.clone(),
                    others,
                    Input::new(digest.clone(), output.clone())?,
                )
            })
            .collect()
    }

    pub(crate) fn run_signing(
        quorum: &mut [TestSign],
        rng: &mut StdRng,
        mut tamper: impl FnMut(&mut Message),
    ) -> Result<Vec<SignatureData>> {
        let mut inboxes: HashMap<PartyId, Vec<Message>> = quorum
            .iter()
            .map(|p| (p.id().clone(), Vec::new()))
            .collect();
        let mut outputs: Vec<Option<SignatureData>> =
            std::iter::repeat_with(|| None).take(quorum.len()).collect();

        for participant in quorum.iter() {
            let empty: [u8; 0] = [];
            let ready = Message::new(
                TestSign::ready_type(),
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
            let mut message = inbox.remove(rng.gen_range(0..inbox.len()));
            tamper(&mut message);
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

    pub(crate) fn verify_with_stock_ecdsa(
        output: &keygen::Output<TestCurve>,
        digest: &BigNumber,
        signature: &SignatureData,
    ) {
        let vk = output.verifying_key().unwrap();
        let sig = k256::ecdsa::Signature::from_slice(signature.signature()).unwrap();
        let digest_bytes = {
            let le = crate::utils::bn_to_le_bytes32(digest).unwrap();
            le.iter().rev().copied().collect::<Vec<u8>>()
        };
        PrehashVerifier::verify_prehash(&vk, &digest_bytes, &sig).unwrap();
    }

    #[test]
    fn threshold_signing_produces_a_stock_verifiable_signature() {
        let mut rng = init_testing();
        let parties = test_party_ids(5);
        let threshold = 2;
        let outputs =
            simulate_output_set::<TestCurve, _>(&parties, threshold, &mut rng).unwrap();
        let digest = digest_of(b"hello");

        // Quorum {1, 2, 3}.
        let signers: Vec<PartyId> = parties[0..3].to_vec();
        let signer_outputs: Vec<_> = outputs[0..3].to_vec();
        let sid = Identifier::random(&mut rng);
        let mut quorum = make_sign_quorum(sid, &signers, &signer_outputs, &digest).unwrap();
        let signatures = run_signing(&mut quorum, &mut rng, |_| {}).unwrap();
        assert_eq!(signatures.len(), 3);
        for signature in &signatures {
            assert_eq!(signature, &signatures[0]);
            verify_with_stock_ecdsa(&outputs[0], &digest, signature);
            assert!(signature.recovery_id().is_some());
        }

        // A different quorum {2, 3, 5} signs the same message under the same
        // public key.
        let signers: Vec<PartyId> =
            vec![parties[1].clone(), parties[2].clone(), parties[4].clone()];
        let signer_outputs = vec![outputs[1].clone(), outputs[2].clone(), outputs[4].clone()];
        let sid = Identifier::random(&mut rng);
        let mut quorum = make_sign_quorum(sid, &signers, &signer_outputs, &digest).unwrap();
        let signatures = run_signing(&mut quorum, &mut rng, |_| {}).unwrap();
        for signature in &signatures {
            verify_with_stock_ecdsa(&outputs[0], &digest, signature);
        }
    }

    #[test]
    fn single_party_signing_works() {
        let mut rng = init_testing();
        let parties = test_party_ids(1);
        let outputs = simulate_output_set::<TestCurve, _>(&parties, 0, &mut rng).unwrap();
        let digest = digest_of(b"solo");

        let sid = Identifier::random(&mut rng);
        let mut quorum = make_sign_quorum(sid, &parties, &outputs, &digest).unwrap();
        let signatures = run_signing(&mut quorum, &mut rng, |_| {}).unwrap();
        assert_eq!(signatures.len(), 1);
        verify_with_stock_ecdsa(&outputs[0], &digest, &signatures[0]);
    }

    #[test]
    fn malformed_range_proof_names_the_sender() {
        let mut rng = init_testing();
        let parties = test_party_ids(3);
        let outputs = simulate_output_set::<TestCurve, _>(&parties, 2, &mut rng).unwrap();
        let digest = digest_of(b"culprit test");

        let sid = Identifier::random(&mut rng);
        let mut quorum = make_sign_quorum(sid, &parties, &outputs, &digest).unwrap();

        // The second party garbles every range proof it sends.
        let cheater = parties[1].clone();
        let result = run_signing(&mut quorum, &mut rng, |message| {
            if message.message_type() == MessageType::Sign(SignMessageType::R1RangeProof)
                && message.from() == &cheater
            {
                // Flip the last data byte of the serialized proof; the
                // payload still decodes but the proof no longer verifies.
                let index = message.unverified_bytes.len() - 1;
                message.unverified_bytes[index] ^= 0x01;
            }
        });

        match result {
            Err(err) => assert_eq!(err.culprits(), std::slice::from_ref(&cheater)),
            Ok(_) => panic!("tampered range proof must abort the session"),
        }
    }

    #[test]
    fn oversized_quorum_is_rejected() {
        let mut rng = init_testing();
        let parties = test_party_ids(4);
        let outputs = simulate_output_set::<TestCurve, _>(&parties, 2, &mut rng).unwrap();
        let digest = digest_of(b"bad quorum");

        // All four parties try to sign under a t = 2 key.
        let sid = Identifier::random(&mut rng);
        assert!(make_sign_quorum(sid, &parties, &outputs, &digest).is_err());
    }
}
