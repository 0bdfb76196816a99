//! Error types for the protocol suite.
//!
//! Errors are split into two levels: [`CallerError`] covers mistakes made by
//! the calling application (malformed parameters, misuse of the API), while
//! [`InternalError`] covers everything that can go wrong during a protocol
//! run, including violations attributable to specific peers. Protocol
//! violations carry the list of culprit [`PartyId`](crate::PartyId)s; a
//! non-empty culprit list always means the session is dead and the named
//! parties are to blame.

use crate::protocol::PartyId;
use thiserror::Error;

/// The default `Result` type used throughout the crate.
pub type Result<T> = std::result::Result<T, InternalError>;

/// Errors caused by the calling application.
///
/// These are detected before any protocol message is exchanged and never name
/// culprits.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum CallerError {
    /// The input provided to a protocol constructor was malformed.
    #[error("the protocol input was not well-formed")]
    BadInput,
    /// The participant set was malformed (empty, duplicated identities,
    /// threshold out of range, or the local party missing from the set).
    #[error("the participant set was not well-formed")]
    ParticipantConfigError,
    /// A byte string failed to decode into the expected type.
    #[error("could not deserialize message")]
    DeserializationFailed,
    /// A randomized operation exhausted its retry budget. The caller may try
    /// again with a fresh RNG state.
    #[error("exhausted the retry budget for a randomized operation")]
    RetryFailed,
    /// A message was delivered to a protocol that already terminated.
    #[error("protocol execution already terminated")]
    ProtocolAlreadyTerminated,
    /// A message was delivered to a party other than its addressee.
    #[error("message was not addressed to this party")]
    WrongMessageRecipient,
    /// The wire frame did not match the claimed routing metadata.
    #[error("wire frame routing fields do not match the transport claims")]
    WireFrameMismatch,
}

/// Errors that can occur while running a protocol.
#[derive(Debug, Error)]
pub enum InternalError {
    /// A message or proof failed validation. The named parties misbehaved;
    /// the session cannot be recovered.
    #[error("protocol violated by {}", format_culprits(.0))]
    ProtocolViolation(Vec<PartyId>),
    /// The same party sent two messages for the same round.
    #[error("duplicate message from {0}")]
    DuplicateMessage(PartyId),
    /// An internal invariant did not hold. This indicates a bug in the
    /// library or byzantine behavior that slipped past the proof checks.
    #[error("an internal invariant was violated")]
    InternalInvariantFailed,
    /// A value could not be encoded for the wire or a transcript.
    #[error("could not serialize value")]
    Serialization,
    /// The calling application misused the API.
    #[error("the calling application made a mistake: {0}")]
    CallingApplicationMistake(#[from] CallerError),
}

impl InternalError {
    /// Convenience constructor for a violation with a single culprit.
    pub(crate) fn culprit(party: &PartyId) -> Self {
        InternalError::ProtocolViolation(vec![party.clone()])
    }

    /// A violation that cannot be attributed to any specific party.
    pub(crate) fn unattributed() -> Self {
        InternalError::ProtocolViolation(Vec::new())
    }

    /// The culprits named by this error, if any.
    pub fn culprits(&self) -> &[PartyId] {
        match self {
            InternalError::ProtocolViolation(culprits) => culprits,
            InternalError::DuplicateMessage(culprit) => std::slice::from_ref(culprit),
            _ => &[],
        }
    }
}

fn format_culprits(culprits: &[PartyId]) -> String {
    if culprits.is_empty() {
        "an unidentified party".to_string()
    } else {
        culprits
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

macro_rules! serialize {
    ($x:expr) => {{
        bincode::serialize($x).map_err(|_| $crate::errors::InternalError::Serialization)
    }};
}

macro_rules! deserialize {
    ($x:expr) => {{
        bincode::deserialize($x).map_err(|_| {
            $crate::errors::InternalError::CallingApplicationMistake(
                $crate::errors::CallerError::DeserializationFailed,
            )
        })
    }};
}
