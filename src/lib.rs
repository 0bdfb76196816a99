//! Multi-party threshold signing without a trusted dealer.
//!
//! A set of `n` mutually distrusting parties jointly generates a single
//! public key such that any `t + 1` of them can cooperate to sign under it,
//! while any `t` learn nothing. The private key never exists in one place:
//! not at key generation, not while signing, and not while the shareholder
//! set is being rotated.
//!
//! Two signature schemes are provided:
//! - **ECDSA** over secp256k1 ([`keygen`], [`sign`], [`resharing`]), using
//!   the GG18 family of protocols: Feldman verifiable secret sharing for the
//!   key, Paillier-based multiplicative-to-additive conversion for the
//!   signing nonce algebra, and a zero-knowledge proof suite keeping every
//!   step honest.
//! - **EdDSA** over Edwards25519 ([`eddsa`]), a threshold Schnorr whose
//!   output is a standard RFC 8032 Ed25519 signature.
//!
//! This crate deliberately stops at the protocol boundary: the embedding
//! application supplies authenticated confidential channels, a reliable
//! broadcast primitive, an out-of-band session identifier, and persistent
//! storage for the save data. Each party drives its [`Participant`] by
//! feeding it inbound messages; the participant answers with outbound
//! messages and, exactly once, the protocol output. [`Participant::waiting_for`]
//! supports caller-side timeout attribution; errors carry the
//! [`PartyId`]s of provably misbehaving peers.

#![allow(non_snake_case)]
#![warn(missing_docs)]

#[macro_use]
pub mod errors;
#[macro_use]
mod participant;

mod auxinfo;
mod curve;
mod ed25519;
pub mod eddsa;
mod k256;
pub mod keygen;
mod local_storage;
mod message_queue;
mod messages;
mod mta;
mod paillier;
mod parameters;
mod protocol;
pub mod resharing;
mod ring_pedersen;
mod safe_primes_512;
pub mod sign;
mod signature;
mod utils;
mod vss;
mod zkp;

pub use crate::k256::K256;
pub use auxinfo::{AuxInfoPublic, PreParams};
pub use curve::{CurveTrait, EcdsaCurve, ScalarTrait, SignatureTrait, VerifyingKeyTrait};
pub use ed25519::Ed25519;
pub use messages::{Message, MessageType, ProtocolType};
pub use paillier::{Ciphertext, EncryptionKey};
pub use participant::{ProcessOutcome, ProtocolParticipant, Status};
pub use protocol::{
    Identifier, Parameters, Participant, PartyId, PeerContext, ReSharingParameters,
};
pub use signature::SignatureData;
