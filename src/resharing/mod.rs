//! ECDSA share rotation.
//!
//! Moves a key from one committee to another (with a possibly different
//! threshold) without changing the public key or ever assembling the
//! private key. New members leave with fresh save data, outgoing members
//! leave with nothing.

mod commit;
mod participant;

pub use participant::{Input, ResharingParticipant};
