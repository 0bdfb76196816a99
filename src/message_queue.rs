//! Buffer for messages that arrive before their round is current.

use crate::{
    errors::{InternalError, Result},
    messages::{Message, MessageType},
};
use std::collections::HashMap;
use tracing::error;

/// Messages stashed for later rounds, keyed by payload type.
///
/// A second message from the same sender for the same type is rejected at
/// stash time; within a type, insertion order is preserved.
#[derive(Debug, Default)]
pub(crate) struct MessageQueue {
    queue: HashMap<MessageType, Vec<Message>>,
}

impl MessageQueue {
    /// Stash a message.
    pub(crate) fn store(&mut self, message: Message) -> Result<()> {
        let entry = self.queue.entry(message.message_type()).or_default();
        if entry.iter().any(|m| m.from() == message.from()) {
            error!(
                "Duplicate {:?} message from {}",
                message.message_type(),
                message.from()
            );
            return Err(InternalError::DuplicateMessage(message.from().clone()));
        }
        entry.push(message);
        Ok(())
    }

    /// Remove and return all stashed messages of the given type.
    pub(crate) fn retrieve_all(&mut self, message_type: MessageType) -> Vec<Message> {
        self.queue.remove(&message_type).unwrap_or_default()
    }

    /// Remove and return the stashed messages of the given type from one
    /// sender.
    pub(crate) fn retrieve_by_sender(
        &mut self,
        message_type: MessageType,
        sender: &crate::protocol::PartyId,
    ) -> Vec<Message> {
        let Some(entry) = self.queue.get_mut(&message_type) else {
            return Vec::new();
        };
        let (matching, rest): (Vec<_>, Vec<_>) =
            entry.drain(..).partition(|m| m.from() == sender);
        *entry = rest;
        matching
    }

    /// Remove and return every stashed message.
    pub(crate) fn drain(&mut self) -> Vec<Message> {
        let mut all: Vec<Message> = self.queue.drain().flat_map(|(_, msgs)| msgs).collect();
        // Keep a deterministic order so replays of a run stay reproducible.
        all.sort_by_key(|m| (format!("{:?}", m.message_type()), m.from().clone()));
        all
    }

    /// Whether nothing is stashed.
    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.queue.values().all(|v| v.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        messages::{KeygenMessageType, MessageType},
        protocol::{testing::test_party_ids, Identifier},
    };
    use rand::rngs::OsRng;

    fn test_message(from: usize, mt: MessageType) -> Message {
        let parties = test_party_ids(4);
        Message::new(
            mt,
            Identifier::random(&mut OsRng),
            parties[from].clone(),
            parties[3].clone(),
            &Vec::<u8>::new(),
        )
        .unwrap()
    }

    #[test]
    fn stash_and_retrieve_by_type() {
        let mt = MessageType::Keygen(KeygenMessageType::R2Decommit);
        let other = MessageType::Keygen(KeygenMessageType::R2PrivateShare);
        let mut queue = MessageQueue::default();
        queue.store(test_message(0, mt)).unwrap();
        queue.store(test_message(1, mt)).unwrap();
        queue.store(test_message(0, other)).unwrap();

        assert_eq!(queue.retrieve_all(mt).len(), 2);
        assert_eq!(queue.retrieve_all(mt).len(), 0);
        assert_eq!(queue.retrieve_all(other).len(), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn duplicate_stash_is_rejected() {
        let mt = MessageType::Keygen(KeygenMessageType::R2Decommit);
        let mut queue = MessageQueue::default();
        queue.store(test_message(0, mt)).unwrap();
        assert!(matches!(
            queue.store(test_message(0, mt)),
            Err(InternalError::DuplicateMessage(_))
        ));
    }

    #[test]
    fn retrieve_by_sender_leaves_the_rest() {
        let mt = MessageType::Keygen(KeygenMessageType::R2Decommit);
        let parties = test_party_ids(4);
        let mut queue = MessageQueue::default();
        queue.store(test_message(0, mt)).unwrap();
        queue.store(test_message(1, mt)).unwrap();

        let got = queue.retrieve_by_sender(mt, &parties[0]);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].from(), &parties[0]);
        assert_eq!(queue.retrieve_all(mt).len(), 1);
    }
}
