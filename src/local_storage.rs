//! Typed per-party storage for transient round state.
//!
//! Each round stores what it has received from each party under a
//! [`TypeTag`]; the tag's associated type keeps lookups statically typed
//! while the storage itself stays protocol-agnostic.

use crate::{
    errors::{InternalError, Result},
    protocol::PartyId,
};
use std::{
    any::{Any, TypeId},
    collections::HashMap,
    fmt::Debug,
};
use tracing::error;

/// A marker type naming one kind of stored value.
pub(crate) trait TypeTag: 'static {
    /// The stored value type.
    type Value: Send + Sync + 'static;
}

#[derive(Default)]
pub(crate) struct LocalStorage {
    storage: HashMap<(TypeId, PartyId), Box<dyn Any + Send + Sync>>,
}

impl Debug for LocalStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStorage")
            .field("entries", &self.storage.len())
            .finish()
    }
}

impl LocalStorage {
    /// Store a value for the given party, overwriting any existing entry.
    pub(crate) fn store<T: TypeTag>(&mut self, party: PartyId, value: T::Value) {
        let _ = self
            .storage
            .insert((TypeId::of::<T>(), party), Box::new(value));
    }

    /// Store a value for the given party, failing if an entry already
    /// exists. Used to reject duplicate per-round contributions.
    pub(crate) fn store_once<T: TypeTag>(&mut self, party: PartyId, value: T::Value) -> Result<()> {
        if self.contains::<T>(&party) {
            error!("Duplicate round contribution from {}", party);
            return Err(InternalError::DuplicateMessage(party));
        }
        self.store::<T>(party, value);
        Ok(())
    }

    /// Retrieve a reference to a stored value.
    pub(crate) fn retrieve<T: TypeTag>(&self, party: &PartyId) -> Result<&T::Value> {
        self.storage
            .get(&(TypeId::of::<T>(), party.clone()))
            .and_then(|any| any.downcast_ref())
            .ok_or_else(|| {
                error!("Storage is missing an entry the protocol expected to exist");
                InternalError::InternalInvariantFailed
            })
    }

    /// Retrieve a mutable reference to a stored value.
    pub(crate) fn retrieve_mut<T: TypeTag>(&mut self, party: &PartyId) -> Result<&mut T::Value> {
        self.storage
            .get_mut(&(TypeId::of::<T>(), party.clone()))
            .and_then(|any| any.downcast_mut())
            .ok_or_else(|| {
                error!("Storage is missing an entry the protocol expected to exist");
                InternalError::InternalInvariantFailed
            })
    }

    /// Remove and return a stored value.
    pub(crate) fn remove<T: TypeTag>(&mut self, party: &PartyId) -> Result<T::Value> {
        self.storage
            .remove(&(TypeId::of::<T>(), party.clone()))
            .and_then(|any| any.downcast().ok())
            .map(|boxed| *boxed)
            .ok_or_else(|| {
                error!("Storage is missing an entry the protocol expected to exist");
                InternalError::InternalInvariantFailed
            })
    }

    /// Whether an entry exists for the given party.
    pub(crate) fn contains<T: TypeTag>(&self, party: &PartyId) -> bool {
        self.storage.contains_key(&(TypeId::of::<T>(), party.clone()))
    }

    /// Whether entries exist for all the given parties.
    pub(crate) fn contains_for_all_ids<T: TypeTag>(&self, parties: &[PartyId]) -> bool {
        parties.iter().all(|party| self.contains::<T>(party))
    }

    /// The parties among `parties` without an entry yet.
    pub(crate) fn missing_ids<T: TypeTag>(&self, parties: &[PartyId]) -> Vec<PartyId> {
        parties
            .iter()
            .filter(|party| !self.contains::<T>(party))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::testing::test_party_ids;

    struct Counter;
    impl TypeTag for Counter {
        type Value = u64;
    }

    #[test]
    fn typed_storage_roundtrips() {
        let parties = test_party_ids(2);
        let mut storage = LocalStorage::default();

        storage.store::<Counter>(parties[0].clone(), 7);
        assert!(storage.contains::<Counter>(&parties[0]));
        assert!(!storage.contains::<Counter>(&parties[1]));
        assert_eq!(*storage.retrieve::<Counter>(&parties[0]).unwrap(), 7);
        assert_eq!(storage.remove::<Counter>(&parties[0]).unwrap(), 7);
        assert!(!storage.contains::<Counter>(&parties[0]));
    }

    #[test]
    fn store_once_rejects_duplicates() {
        let parties = test_party_ids(1);
        let mut storage = LocalStorage::default();
        storage.store_once::<Counter>(parties[0].clone(), 1).unwrap();
        assert!(matches!(
            storage.store_once::<Counter>(parties[0].clone(), 2),
            Err(InternalError::DuplicateMessage(_))
        ));
    }

    #[test]
    fn missing_ids_reports_the_gap() {
        let parties = test_party_ids(3);
        let mut storage = LocalStorage::default();
        storage.store::<Counter>(parties[1].clone(), 1);
        assert_eq!(
            storage.missing_ids::<Counter>(&parties),
            vec![parties[0].clone(), parties[2].clone()]
        );
        assert!(!storage.contains_for_all_ids::<Counter>(&parties));
    }
}
