//! Zero-knowledge proofs used across the protocols.
//!
//! All proofs are made non-interactive with Fiat-Shamir over a merlin
//! transcript. Every challenge binds the protocol's shared context (session
//! identifier, party set, curve constants) plus the statement, so a proof
//! produced in one session can never be replayed in another.

pub(crate) mod pidls;
pub(crate) mod pienc;
pub(crate) mod pifac;
pub(crate) mod pimod;
pub(crate) mod pimta;
pub(crate) mod pisch;

use crate::errors::Result;
use merlin::Transcript;
use rand::{CryptoRng, RngCore};

/// Context that gets bound into a proof transcript.
pub(crate) trait ProofContext {
    /// The canonical byte encoding of the context.
    fn as_bytes(&self) -> Result<Vec<u8>>;
}

/// The empty context, for proofs bound only to their statement.
impl ProofContext for () {
    fn as_bytes(&self) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }
}

/// A non-interactive zero-knowledge proof.
pub(crate) trait Proof: Sized {
    /// The public statement.
    type CommonInput<'a>;
    /// The prover's witness.
    type ProverSecret<'a>;

    /// Prove the statement.
    fn prove<R: RngCore + CryptoRng>(
        input: Self::CommonInput<'_>,
        secret: Self::ProverSecret<'_>,
        context: &impl ProofContext,
        transcript: &mut Transcript,
        rng: &mut R,
    ) -> Result<Self>;

    /// Verify the proof against the statement.
    fn verify(
        self,
        input: Self::CommonInput<'_>,
        context: &impl ProofContext,
        transcript: &mut Transcript,
    ) -> Result<()>;
}

/// Append the shared context under the given label.
pub(crate) fn append_context(
    transcript: &mut Transcript,
    label: &'static [u8],
    context: &impl ProofContext,
) -> Result<()> {
    transcript.append_message(label, &context.as_bytes()?);
    Ok(())
}
