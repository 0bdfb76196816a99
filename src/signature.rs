//! Finalized signatures as the embedding application consumes them.

use serde::{Deserialize, Serialize};

/// A finalized threshold signature.
///
/// For ECDSA, `r` and `s` are 32-byte big-endian scalars with `s` normalized
/// to the low half of the group order, `signature` is `r ‖ s`, and
/// `recovery_id` recovers the public key from the signature. For EdDSA, `r`
/// is the 32-byte compressed nonce point, `s` the 32-byte little-endian
/// scalar, `signature` the RFC 8032 64-byte form, and `message` the raw
/// bytes that were signed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureData {
    r: Vec<u8>,
    s: Vec<u8>,
    signature: Vec<u8>,
    recovery_id: Option<u8>,
    message: Vec<u8>,
}

impl SignatureData {
    pub(crate) fn ecdsa(r: Vec<u8>, s: Vec<u8>, recovery_id: u8, message: Vec<u8>) -> Self {
        let signature = [r.as_slice(), s.as_slice()].concat();
        Self {
            r,
            s,
            signature,
            recovery_id: Some(recovery_id),
            message,
        }
    }

    pub(crate) fn eddsa(r: Vec<u8>, s: Vec<u8>, message: Vec<u8>) -> Self {
        let signature = [r.as_slice(), s.as_slice()].concat();
        Self {
            r,
            s,
            signature,
            recovery_id: None,
            message,
        }
    }

    /// The `R` component bytes.
    pub fn r(&self) -> &[u8] {
        &self.r
    }

    /// The `S` component bytes.
    pub fn s(&self) -> &[u8] {
        &self.s
    }

    /// The concatenated signature bytes.
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// The recovery identifier (ECDSA only).
    pub fn recovery_id(&self) -> Option<u8> {
        self.recovery_id
    }

    /// The message bytes: the digest for ECDSA, the raw message for EdDSA.
    pub fn message(&self) -> &[u8] {
        &self.message
    }
}
