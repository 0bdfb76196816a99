//! The round-driven participant contract shared by every protocol.
//!
//! Each protocol implements [`ProtocolParticipant`]: a state machine that is
//! fed one message at a time and reacts with outbound messages, an output, or
//! nothing. Messages for rounds that are not yet current are stashed and
//! replayed when the round arrives; within a round, messages from different
//! senders commute.

use crate::{
    errors::{CallerError, InternalError, Result},
    local_storage::{LocalStorage, TypeTag},
    message_queue::MessageQueue,
    messages::{Message, MessageType, ProtocolType},
    protocol::{Identifier, PartyId},
    zkp::ProofContext,
};
use rand::{CryptoRng, RngCore};
use serde::Serialize;
use std::collections::HashSet;
use tracing::error;

/// Execution status of a participant.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Status {
    /// Constructed but not yet signalled to start.
    NotReady,
    /// Processing rounds.
    Ready,
    /// Finished; the output has been delivered and no further messages are
    /// accepted.
    TerminatedSuccessfully,
}

impl Status {
    /// Whether the participant has started processing rounds.
    pub fn is_ready(&self) -> bool {
        matches!(self, Status::Ready | Status::TerminatedSuccessfully)
    }
}

/// The result of processing one message.
#[derive(Debug)]
pub enum ProcessOutcome<O> {
    /// The round is still waiting on peers.
    Incomplete,
    /// Processing produced outbound messages.
    Processed(Vec<Message>),
    /// The protocol finished and produced its output.
    Terminated(O),
    /// The protocol finished for this participant, with final outbound
    /// messages that other parties still need.
    TerminatedForThisParticipant(O, Vec<Message>),
}

impl<O> ProcessOutcome<O> {
    /// Wrap a message list, mapping an empty list to `Incomplete`.
    pub(crate) fn from_messages(messages: Vec<Message>) -> Self {
        if messages.is_empty() {
            Self::Incomplete
        } else {
            Self::Processed(messages)
        }
    }

    /// Split into the output and the outbound messages.
    pub fn into_parts(self) -> (Option<O>, Vec<Message>) {
        match self {
            Self::Incomplete => (None, Vec::new()),
            Self::Processed(messages) => (None, messages),
            Self::Terminated(output) => (Some(output), Vec::new()),
            Self::TerminatedForThisParticipant(output, messages) => (Some(output), messages),
        }
    }

    /// Attach additional outbound messages to this outcome.
    pub(crate) fn with_messages(self, mut messages: Vec<Message>) -> Self {
        let (output, mut existing) = self.into_parts();
        existing.append(&mut messages);
        match output {
            Some(output) if existing.is_empty() => Self::Terminated(output),
            Some(output) => Self::TerminatedForThisParticipant(output, existing),
            None => Self::from_messages(existing),
        }
    }

    /// Merge several outcomes produced while handling a single inbound
    /// message. At most one of them may carry an output.
    pub(crate) fn collect(outcomes: Vec<Self>) -> Result<Self> {
        let mut output = None;
        let mut messages = Vec::new();
        for outcome in outcomes {
            let (o, mut msgs) = outcome.into_parts();
            if o.is_some() {
                if output.is_some() {
                    error!("Multiple outcomes tried to deliver a protocol output");
                    return Err(InternalError::InternalInvariantFailed);
                }
                output = o;
            }
            messages.append(&mut msgs);
        }
        Ok(match output {
            Some(output) if messages.is_empty() => Self::Terminated(output),
            Some(output) => Self::TerminatedForThisParticipant(output, messages),
            None => Self::from_messages(messages),
        })
    }

    /// Merge outcomes and attach extra messages.
    pub(crate) fn collect_with_messages(outcomes: Vec<Self>, messages: Vec<Message>) -> Result<Self> {
        Ok(Self::collect(outcomes)?.with_messages(messages))
    }

    /// Merge this outcome with others produced in the same handler.
    pub(crate) fn consolidate(self, others: Vec<Self>) -> Result<Self> {
        let mut all = vec![self];
        all.extend(others);
        Self::collect(all)
    }
}

/// A party's view of one protocol execution.
pub trait ProtocolParticipant: Sized {
    /// Input consumed at construction.
    type Input;
    /// Output delivered exactly once at termination.
    type Output;

    /// Construct a participant for a session.
    fn new(
        sid: Identifier,
        id: PartyId,
        other_participant_ids: Vec<PartyId>,
        input: Self::Input,
    ) -> Result<Self>;

    /// The message type that signals this participant to start.
    fn ready_type() -> MessageType;

    /// The protocol this participant runs.
    fn protocol_type() -> ProtocolType;

    /// This party's identity.
    fn id(&self) -> &PartyId;

    /// The other parties in the session.
    fn other_ids(&self) -> &[PartyId];

    /// The session identifier.
    fn sid(&self) -> Identifier;

    /// Feed one message into the state machine.
    fn process_message<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        message: &Message,
    ) -> Result<ProcessOutcome<Self::Output>>;

    /// Current execution status.
    fn status(&self) -> &Status;

    /// The parties whose contribution to the current round is missing.
    fn waiting_for(&self) -> Vec<PartyId>;

    /// Every party in the session, including this one.
    fn all_participants(&self) -> Vec<PartyId> {
        let mut participants = self.other_ids().to_vec();
        participants.push(self.id().clone());
        participants
    }
}

mod storage {
    use super::*;

    pub(super) struct Stash;
    impl TypeTag for Stash {
        type Value = MessageQueue;
    }
    pub(super) struct Progress;
    impl TypeTag for Progress {
        type Value = HashSet<&'static str>;
    }
}

/// Internal participant plumbing: typed storage, the message stash, and the
/// shared handling of ready signals and one-shot round generation.
pub(crate) trait InnerProtocolParticipant: ProtocolParticipant {
    /// The context bound into this protocol's Fiat-Shamir transcripts.
    type Context: ProofContext;

    /// Collect the transcript context for the current session state.
    fn retrieve_context(&self) -> Self::Context;

    fn local_storage(&self) -> &LocalStorage;
    fn local_storage_mut(&mut self) -> &mut LocalStorage;
    fn status_mut(&mut self) -> &mut Status;

    /// Handle the self-addressed ready signal: mark the participant ready
    /// and replay everything that arrived early.
    fn process_ready_message<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        message: &Message,
    ) -> Result<ProcessOutcome<Self::Output>> {
        message.check_type(Self::ready_type())?;
        if message.from() != self.id() {
            error!("Ready signals must come from the local driver");
            return Err(InternalError::culprit(message.from()));
        }
        if self.status().is_ready() {
            Err(CallerError::ProtocolAlreadyTerminated)?;
        }
        *self.status_mut() = Status::Ready;

        let stashed = self.drain_all_stashed()?;
        let outcomes = stashed
            .iter()
            .map(|m| self.process_message(rng, m))
            .collect::<Result<Vec<_>>>()?;
        ProcessOutcome::collect(outcomes)
    }

    /// Buffer a message for a future round.
    fn stash_message(&mut self, message: &Message) -> Result<()> {
        let me = self.id().clone();
        if !self.local_storage().contains::<storage::Stash>(&me) {
            self.local_storage_mut()
                .store::<storage::Stash>(me.clone(), MessageQueue::default());
        }
        self.local_storage_mut()
            .retrieve_mut::<storage::Stash>(&me)?
            .store(message.clone())
    }

    /// Remove all stashed messages of the given type.
    fn fetch_messages(&mut self, message_type: MessageType) -> Result<Vec<Message>> {
        let me = self.id().clone();
        if !self.local_storage().contains::<storage::Stash>(&me) {
            return Ok(Vec::new());
        }
        Ok(self
            .local_storage_mut()
            .retrieve_mut::<storage::Stash>(&me)?
            .retrieve_all(message_type))
    }

    /// Remove the stashed messages of the given type from one sender.
    fn fetch_messages_by_sender(
        &mut self,
        message_type: MessageType,
        sender: &PartyId,
    ) -> Result<Vec<Message>> {
        let me = self.id().clone();
        if !self.local_storage().contains::<storage::Stash>(&me) {
            return Ok(Vec::new());
        }
        Ok(self
            .local_storage_mut()
            .retrieve_mut::<storage::Stash>(&me)?
            .retrieve_by_sender(message_type, sender))
    }

    /// Remove every stashed message.
    fn drain_all_stashed(&mut self) -> Result<Vec<Message>> {
        let me = self.id().clone();
        if !self.local_storage().contains::<storage::Stash>(&me) {
            return Ok(Vec::new());
        }
        Ok(self
            .local_storage_mut()
            .retrieve_mut::<storage::Stash>(&me)?
            .drain())
    }

    /// Claim a one-shot marker. Returns `true` exactly once per tag.
    fn run_once(&mut self, tag: &'static str) -> Result<bool> {
        let me = self.id().clone();
        if !self.local_storage().contains::<storage::Progress>(&me) {
            self.local_storage_mut()
                .store::<storage::Progress>(me.clone(), HashSet::new());
        }
        let markers = self
            .local_storage_mut()
            .retrieve_mut::<storage::Progress>(&me)?;
        Ok(markers.insert(tag))
    }

    /// Reject a second contribution of kind `T` from `sender`.
    fn check_for_duplicate_msg<T: TypeTag>(&self, sender: &PartyId) -> Result<()> {
        if self.local_storage().contains::<T>(sender) {
            Err(InternalError::DuplicateMessage(sender.clone()))
        } else {
            Ok(())
        }
    }

    /// One point-to-point message per other participant, all carrying the
    /// same payload.
    fn message_for_other_participants<T: Serialize>(
        &self,
        message_type: MessageType,
        payload: &T,
    ) -> Result<Vec<Message>> {
        self.other_ids()
            .iter()
            .map(|other| {
                Message::new(
                    message_type,
                    self.sid(),
                    self.id().clone(),
                    other.clone(),
                    payload,
                )
            })
            .collect()
    }

    /// One copy of a broadcast payload per other participant.
    fn broadcast_for_other_participants<T: Serialize>(
        &self,
        message_type: MessageType,
        payload: &T,
    ) -> Result<Vec<Message>> {
        self.other_ids()
            .iter()
            .map(|other| {
                Message::new_broadcast(
                    message_type,
                    self.sid(),
                    self.id().clone(),
                    other.clone(),
                    payload,
                )
            })
            .collect()
    }
}

/// Run a message-generation expression exactly once, no matter how many
/// message arrivals try to trigger it.
macro_rules! run_only_once {
    ($self:ident, $tag:literal, $gen:expr) => {{
        if $self.run_once($tag)? {
            $gen
        } else {
            Ok(Vec::new())
        }
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_collection_merges_messages_and_output() {
        let outcomes: Vec<ProcessOutcome<u32>> = vec![
            ProcessOutcome::Incomplete,
            ProcessOutcome::Terminated(42),
            ProcessOutcome::Incomplete,
        ];
        let merged = ProcessOutcome::collect(outcomes).unwrap();
        let (output, messages) = merged.into_parts();
        assert_eq!(output, Some(42));
        assert!(messages.is_empty());
    }

    #[test]
    fn two_outputs_in_one_batch_is_a_bug() {
        let outcomes: Vec<ProcessOutcome<u32>> =
            vec![ProcessOutcome::Terminated(1), ProcessOutcome::Terminated(2)];
        assert!(ProcessOutcome::collect(outcomes).is_err());
    }

    #[test]
    fn empty_message_lists_collapse_to_incomplete() {
        let outcome: ProcessOutcome<u32> = ProcessOutcome::from_messages(Vec::new());
        assert!(matches!(outcome, ProcessOutcome::Incomplete));
    }
}
