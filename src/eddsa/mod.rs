//! Ed25519-compatible threshold protocols.
//!
//! Distributed key generation, threshold Schnorr signing, and share
//! rotation over Edwards25519. Signatures are byte-for-byte RFC 8032
//! Ed25519 signatures; any stock verifier accepts them.

mod keygen;
mod output;
mod resharing;
mod sign;

pub use keygen::{EddsaKeygenParticipant, Input as KeygenInput};
pub use output::Output;
pub use resharing::{EddsaResharingParticipant, Input as ResharingInput};
pub use sign::{EddsaSignParticipant, Input as SignInput};
