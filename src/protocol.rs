//! Party identities, protocol parameters, and the transport-facing driver.

use crate::{
    curve::CurveTrait,
    errors::{CallerError, InternalError, Result},
    messages::Message,
    participant::{ProcessOutcome, ProtocolParticipant, Status},
    zkp::ProofContext,
};
use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::{
    cmp::Ordering,
    collections::HashSet,
    fmt::{Display, Formatter},
    hash::{Hash, Hasher},
    marker::PhantomData,
};
use tracing::error;

/// The stable identity of a protocol party.
///
/// The `id` is an externally assigned identifier (for example a node name or
/// public-key fingerprint), the `moniker` is a human-readable label, and the
/// `key` is a unique positive integer that doubles as the party's Shamir
/// evaluation x-coordinate and as the sort key for the canonical party
/// ordering.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PartyId {
    id: String,
    moniker: String,
    key: BigNumber,
}

impl PartyId {
    /// Create a new identity. The key must be strictly positive.
    pub fn new(id: impl Into<String>, moniker: impl Into<String>, key: BigNumber) -> Result<Self> {
        if key <= BigNumber::zero() {
            error!("Party keys must be strictly positive");
            Err(CallerError::ParticipantConfigError)?;
        }
        Ok(Self {
            id: id.into(),
            moniker: moniker.into(),
            key,
        })
    }

    /// The stable identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The human-readable label.
    pub fn moniker(&self) -> &str {
        &self.moniker
    }

    /// The unique integer key (also the Shamir x-coordinate).
    pub fn key(&self) -> &BigNumber {
        &self.key
    }

    /// The party's evaluation coordinate in the scalar field of `C`.
    ///
    /// Fails if the key collapses to zero modulo the group order, which the
    /// parameter validation rules out for accepted peer sets.
    pub(crate) fn coordinate<C: CurveTrait>(&self) -> Result<C::Scalar> {
        let reduced = &self.key % C::order();
        if reduced == BigNumber::zero() {
            error!("Party key is zero modulo the curve order");
            return Err(InternalError::InternalInvariantFailed);
        }
        C::bn_to_scalar(&self.key)
    }
}

impl Display for PartyId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl PartialEq for PartyId {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.key == other.key
    }
}
impl Eq for PartyId {}

impl Hash for PartyId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.key.to_bytes().hash(state);
    }
}

impl Ord for PartyId {
    fn cmp(&self, other: &Self) -> Ordering {
        // Minimal big-endian encodings order numerically by (length, bytes).
        let (a, b) = (self.key.to_bytes(), other.key.to_bytes());
        a.len()
            .cmp(&b.len())
            .then_with(|| a.cmp(&b))
            .then_with(|| self.id.cmp(&other.id))
    }
}
impl PartialOrd for PartyId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The ordered set of parties participating in a protocol run.
///
/// Construction sorts the parties into the canonical order and rejects
/// duplicated identifiers or keys; every index-based access in the protocols
/// refers to this ordering.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerContext {
    parties: Vec<PartyId>,
}

impl PeerContext {
    /// Build a peer context from an unordered party list.
    pub fn new(mut parties: Vec<PartyId>) -> Result<Self> {
        if parties.is_empty() {
            error!("A peer context requires at least one party");
            Err(CallerError::ParticipantConfigError)?;
        }
        parties.sort();

        let mut ids = HashSet::new();
        let mut keys = HashSet::new();
        for party in &parties {
            if !ids.insert(party.id().to_string()) || !keys.insert(party.key().to_bytes()) {
                error!("Duplicate party identifier or key in peer context");
                Err(CallerError::ParticipantConfigError)?;
            }
        }
        Ok(Self { parties })
    }

    /// The parties in canonical order.
    pub fn ids(&self) -> &[PartyId] {
        &self.parties
    }

    /// Number of parties.
    pub fn count(&self) -> usize {
        self.parties.len()
    }

    /// Whether the given party belongs to this context.
    pub fn contains(&self, party: &PartyId) -> bool {
        self.parties.contains(party)
    }

    /// All parties except `party`.
    pub(crate) fn all_but(&self, party: &PartyId) -> Vec<PartyId> {
        self.parties
            .iter()
            .filter(|p| *p != party)
            .cloned()
            .collect()
    }
}

/// Parameters of a keygen or signing session: the curve (as a type
/// parameter), the peer context, the local party, the party count `n`, and
/// the threshold `t`. Any `t + 1` parties can later produce a signature.
#[derive(Clone, Debug)]
pub struct Parameters<C: CurveTrait> {
    peers: PeerContext,
    self_id: PartyId,
    threshold: usize,
    curve: PhantomData<C>,
}

impl<C: CurveTrait> Parameters<C> {
    /// Validate and assemble session parameters.
    pub fn new(peers: PeerContext, self_id: PartyId, count: usize, threshold: usize) -> Result<Self> {
        if peers.count() != count {
            error!("Party count does not match the peer context");
            Err(CallerError::ParticipantConfigError)?;
        }
        if threshold + 1 > count {
            error!("Threshold must satisfy t + 1 <= n");
            Err(CallerError::ParticipantConfigError)?;
        }
        if !peers.contains(&self_id) {
            error!("The local party must appear in the peer context");
            Err(CallerError::ParticipantConfigError)?;
        }
        // Keys must stay unique and nonzero once reduced into the scalar
        // field, since they serve as Shamir evaluation points.
        let order = C::order();
        let mut reduced = HashSet::new();
        for party in peers.ids() {
            let r = party.key() % &order;
            if r == BigNumber::zero() || !reduced.insert(r.to_bytes()) {
                error!("Party keys collide modulo the curve order");
                Err(CallerError::ParticipantConfigError)?;
            }
        }
        Ok(Self {
            peers,
            self_id,
            threshold,
            curve: PhantomData,
        })
    }

    /// The peer context.
    pub fn peers(&self) -> &PeerContext {
        &self.peers
    }

    /// The local party.
    pub fn self_id(&self) -> &PartyId {
        &self.self_id
    }

    /// The number of parties `n`.
    pub fn count(&self) -> usize {
        self.peers.count()
    }

    /// The threshold `t`.
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// All parties except the local one.
    pub fn other_ids(&self) -> Vec<PartyId> {
        self.peers.all_but(&self.self_id)
    }
}

/// Parameters for a resharing session: the old committee hands the key off
/// to a (possibly different) new committee under a new threshold. The peer
/// context of the session is the union of both committees.
#[derive(Clone, Debug)]
pub struct ReSharingParameters<C: CurveTrait> {
    old_peers: PeerContext,
    new_peers: PeerContext,
    self_id: PartyId,
    old_threshold: usize,
    new_threshold: usize,
    curve: PhantomData<C>,
}

impl<C: CurveTrait> ReSharingParameters<C> {
    /// Validate and assemble resharing parameters.
    ///
    /// The old peer context must contain at least `t_old + 1` parties (the
    /// reconstruction quorum); the new context and threshold follow the same
    /// rules as [`Parameters`].
    pub fn new(
        old_peers: PeerContext,
        new_peers: PeerContext,
        self_id: PartyId,
        old_threshold: usize,
        new_threshold: usize,
    ) -> Result<Self> {
        if old_peers.count() < old_threshold + 1 {
            error!("The old committee cannot reconstruct the key");
            Err(CallerError::ParticipantConfigError)?;
        }
        if new_threshold + 1 > new_peers.count() {
            error!("New threshold must satisfy t + 1 <= n");
            Err(CallerError::ParticipantConfigError)?;
        }
        if !old_peers.contains(&self_id) && !new_peers.contains(&self_id) {
            error!("The local party must appear in one of the committees");
            Err(CallerError::ParticipantConfigError)?;
        }
        let order = C::order();
        for peers in [&old_peers, &new_peers] {
            let mut reduced = HashSet::new();
            for party in peers.ids() {
                let r = party.key() % &order;
                if r == BigNumber::zero() || !reduced.insert(r.to_bytes()) {
                    error!("Party keys collide modulo the curve order");
                    Err(CallerError::ParticipantConfigError)?;
                }
            }
        }
        Ok(Self {
            old_peers,
            new_peers,
            self_id,
            old_threshold,
            new_threshold,
            curve: PhantomData,
        })
    }

    /// The outgoing committee.
    pub fn old_peers(&self) -> &PeerContext {
        &self.old_peers
    }

    /// The incoming committee.
    pub fn new_peers(&self) -> &PeerContext {
        &self.new_peers
    }

    /// The local party.
    pub fn self_id(&self) -> &PartyId {
        &self.self_id
    }

    /// The old threshold.
    pub fn old_threshold(&self) -> usize {
        self.old_threshold
    }

    /// The new threshold.
    pub fn new_threshold(&self) -> usize {
        self.new_threshold
    }

    /// Whether the local party belongs to the outgoing committee.
    pub fn is_old_committee(&self) -> bool {
        self.old_peers.contains(&self.self_id)
    }

    /// Whether the local party belongs to the incoming committee.
    pub fn is_new_committee(&self) -> bool {
        self.new_peers.contains(&self.self_id)
    }

    /// The union of both committees in canonical order.
    pub fn all_parties(&self) -> Vec<PartyId> {
        let mut all = self.old_peers.ids().to_vec();
        for p in self.new_peers.ids() {
            if !all.contains(p) {
                all.push(p.clone());
            }
        }
        all.sort();
        all
    }
}

/// A session identifier.
///
/// The transport binds every message to the session agreed out of band; this
/// identifier scopes transcripts and storage within the library, and is never
/// put on the wire.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identifier(u128);

impl Identifier {
    /// Generate a random identifier.
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self(rng.gen())
    }
}

impl Display for Identifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#034x}", self.0)
    }
}

/// Context shared by all transcripts of a protocol run: the session
/// identifier, the canonical party list, and the curve constants. Binding
/// this into every Fiat-Shamir challenge prevents proof replay across
/// sessions.
#[derive(Debug, Clone)]
pub(crate) struct SharedContext<C: CurveTrait> {
    sid: Identifier,
    participants: Vec<PartyId>,
    generator: C,
    order: BigNumber,
}

impl<C: CurveTrait> ProofContext for SharedContext<C> {
    fn as_bytes(&self) -> Result<Vec<u8>> {
        Ok([
            serialize!(&self.sid)?,
            serialize!(&self.participants)?,
            self.generator.to_bytes(),
            self.order.to_bytes(),
        ]
        .concat())
    }
}

impl<C: CurveTrait> SharedContext<C> {
    /// Collect the shared context of a running participant.
    pub(crate) fn collect<P: ProtocolParticipant>(p: &P) -> Self {
        let mut participants = p.all_participants();
        participants.sort();
        Self {
            sid: p.sid(),
            participants,
            generator: C::generator(),
            order: C::order(),
        }
    }

}

/// A protocol party as seen by the embedding application.
///
/// This is the single-threaded driver required by the transport contract: it
/// owns the protocol state machine, turns inbound wire bytes into state
/// transitions, and reports which peers it is still waiting on. Messages for
/// future rounds are buffered internally and never processed out of order;
/// finalization output is returned exactly once.
#[derive(Debug)]
pub struct Participant<P: ProtocolParticipant> {
    participant: P,
}

impl<P: ProtocolParticipant> Participant<P> {
    /// Create a driver for one party of a protocol session.
    pub fn new(
        sid: Identifier,
        id: PartyId,
        other_ids: Vec<PartyId>,
        input: P::Input,
    ) -> Result<Self> {
        Ok(Self {
            participant: P::new(sid, id, other_ids, input)?,
        })
    }

    /// Create a driver from validated session parameters.
    pub fn from_parameters<C: CurveTrait>(
        sid: Identifier,
        parameters: &Parameters<C>,
        input: P::Input,
    ) -> Result<Self> {
        Self::new(
            sid,
            parameters.self_id().clone(),
            parameters.other_ids(),
            input,
        )
    }

    /// This party's identity.
    pub fn party_id(&self) -> &PartyId {
        self.participant.id()
    }

    /// The session identifier.
    pub fn sid(&self) -> Identifier {
        self.participant.sid()
    }

    /// Whether the protocol has delivered its output.
    pub fn is_done(&self) -> bool {
        *self.participant.status() == Status::TerminatedSuccessfully
    }

    /// The self-addressed message that starts the protocol.
    pub fn initialize_message(&self) -> Result<Message> {
        let empty: [u8; 0] = [];
        Message::new(
            P::ready_type(),
            self.sid(),
            self.party_id().clone(),
            self.party_id().clone(),
            &empty,
        )
    }

    /// Begin round one, returning this party's first outbound messages.
    pub fn start<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
    ) -> Result<(Option<P::Output>, Vec<Message>)> {
        let init = self.initialize_message()?;
        self.update(rng, &init)
    }

    /// Process a single inbound message.
    ///
    /// Returns the protocol output if this message completed the protocol,
    /// along with any outbound messages it triggered.
    pub fn update<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        message: &Message,
    ) -> Result<(Option<P::Output>, Vec<Message>)> {
        if message.id() != self.sid() {
            error!("Message belongs to a different session");
            Err(CallerError::WrongMessageRecipient)?;
        }
        if message.to() != self.party_id() {
            error!("Message is not addressed to this party");
            Err(CallerError::WrongMessageRecipient)?;
        }
        let outcome = self.participant.process_message(rng, message)?;
        Ok(outcome.into_parts())
    }

    /// Decode a wire frame from the transport and process it.
    ///
    /// The claimed sender and broadcast flag come from the (authenticated)
    /// transport; the frame must agree with them.
    pub fn update_from_bytes<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        wire_bytes: &[u8],
        sender: &PartyId,
        is_broadcast: bool,
    ) -> Result<(Option<P::Output>, Vec<Message>)> {
        let message = Message::from_wire_bytes(
            wire_bytes,
            self.sid(),
            sender,
            is_broadcast,
            self.party_id(),
        )?;
        self.update(rng, &message)
    }

    /// The peers whose messages the current round is still missing.
    ///
    /// The caller uses this for timeout attribution; the library itself never
    /// consults a clock.
    pub fn waiting_for(&self) -> Vec<PartyId> {
        self.participant.waiting_for()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Build a quorum of `n` test parties with small distinct keys.
    pub(crate) fn test_party_ids(n: usize) -> Vec<PartyId> {
        (1..=n)
            .map(|i| {
                PartyId::new(
                    format!("party-{i}"),
                    format!("P{i}"),
                    BigNumber::from_slice([i as u8]),
                )
                .unwrap()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k256::K256;
    use testing::test_party_ids;

    #[test]
    fn peer_context_sorts_and_deduplicates() {
        let mut parties = test_party_ids(4);
        parties.reverse();
        let ctx = PeerContext::new(parties.clone()).unwrap();
        let keys: Vec<_> = ctx.ids().iter().map(|p| p.key().to_bytes()).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);

        parties.push(parties[0].clone());
        assert!(PeerContext::new(parties).is_err());
    }

    #[test]
    fn zero_keys_are_rejected() {
        assert!(PartyId::new("z", "z", BigNumber::zero()).is_err());
    }

    #[test]
    fn parameters_enforce_the_threshold_bound() {
        let parties = test_party_ids(3);
        let ctx = PeerContext::new(parties.clone()).unwrap();
        assert!(Parameters::<K256>::new(ctx.clone(), parties[0].clone(), 3, 2).is_ok());
        assert!(Parameters::<K256>::new(ctx.clone(), parties[0].clone(), 3, 3).is_err());
        assert!(Parameters::<K256>::new(ctx, parties[0].clone(), 2, 1).is_err());
    }

    #[test]
    fn trivial_threshold_is_allowed() {
        let parties = test_party_ids(1);
        let ctx = PeerContext::new(parties.clone()).unwrap();
        assert!(Parameters::<K256>::new(ctx, parties[0].clone(), 1, 0).is_ok());
    }

    #[test]
    fn parameters_reject_outsider_self() {
        let parties = test_party_ids(3);
        let ctx = PeerContext::new(parties[..2].to_vec()).unwrap();
        assert!(Parameters::<K256>::new(ctx, parties[2].clone(), 2, 1).is_err());
    }

    #[test]
    fn driver_runs_a_protocol_over_wire_bytes() {
        use crate::eddsa::{EddsaKeygenParticipant, KeygenInput};
        use crate::utils::testing::init_testing;

        let mut rng = init_testing();
        let parties = test_party_ids(2);
        let sid = Identifier::random(&mut rng);

        let mut drivers: Vec<Participant<EddsaKeygenParticipant>> = parties
            .iter()
            .map(|party| {
                let peers = PeerContext::new(parties.clone()).unwrap();
                let parameters =
                    Parameters::<crate::Ed25519>::new(peers, party.clone(), 2, 1).unwrap();
                Participant::from_parameters(sid, &parameters, KeygenInput::new(1)).unwrap()
            })
            .collect();

        // Start both parties and shuttle every message through the stable
        // wire encoding, as a transport would.
        let mut in_flight: Vec<Message> = Vec::new();
        for driver in drivers.iter_mut() {
            let (output, messages) = driver.start(&mut rng).unwrap();
            assert!(output.is_none());
            in_flight.extend(messages);
        }
        // Each party should now be waiting on its peer's round one message.
        for (driver, other) in drivers.iter().zip(parties.iter().rev()) {
            assert_eq!(driver.waiting_for(), vec![other.clone()]);
        }

        let mut outputs = Vec::new();
        while let Some(message) = in_flight.pop() {
            let bytes = message.to_wire_bytes("org.example").unwrap();
            let recipient = drivers
                .iter_mut()
                .find(|d| d.party_id() == message.to())
                .unwrap();
            let (output, messages) = recipient
                .update_from_bytes(
                    &mut rng,
                    &bytes,
                    message.from(),
                    message.is_broadcast(),
                )
                .unwrap();
            in_flight.extend(messages);
            if let Some(output) = output {
                outputs.push(output);
            }
        }

        assert_eq!(outputs.len(), 2);
        assert!(drivers.iter().all(|d| d.is_done()));
        assert!(drivers.iter().all(|d| d.waiting_for().is_empty()));
        assert_eq!(
            outputs[0].public_key_point(),
            outputs[1].public_key_point()
        );
    }
}
