//! Schnorr proof of knowledge of a discrete logarithm.
//!
//! Proves knowledge of `x` such that `Y = x·G`. The keygen protocols commit
//! to the proof's nonce commitment `A = r·G` in round one and only open it
//! when the proof itself is published, which pins the prover to a nonce
//! chosen before it saw anyone else's values.

use crate::{
    curve::{CurveTrait, ScalarTrait},
    errors::{InternalError, Result},
    utils::positive_challenge_from_transcript,
    zkp::{append_context, Proof, ProofContext},
};
use merlin::Transcript;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// The public statement: a point `Y` claimed to be `x·G`.
#[derive(Copy, Clone)]
pub(crate) struct CommonInput<'a, C: CurveTrait> {
    x_commitment: &'a C,
}

impl<'a, C: CurveTrait> CommonInput<'a, C> {
    pub(crate) fn new(x_commitment: &'a C) -> Self {
        Self { x_commitment }
    }
}

/// The prover's witness.
#[derive(Zeroize, ZeroizeOnDrop)]
pub(crate) struct ProverSecret<C: CurveTrait> {
    x: C::Scalar,
}

impl<C: CurveTrait> ProverSecret<C> {
    pub(crate) fn new(x: &C::Scalar) -> Self {
        Self { x: *x }
    }
}

/// A nonce commitment generated ahead of the proof.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub(crate) struct PiSchPrecommit<C: CurveTrait> {
    commitment: C,
    nonce: C::Scalar,
}

impl<C: CurveTrait> PiSchPrecommit<C> {
    /// The public nonce commitment `A`.
    pub(crate) fn precommitment(&self) -> &C {
        &self.commitment
    }
}

impl<C: CurveTrait> std::fmt::Debug for PiSchPrecommit<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PiSchPrecommit")
            .field("commitment", &self.commitment)
            .field("nonce", &"[redacted]")
            .finish()
    }
}

/// The proof: the nonce commitment and the response scalar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PiSchProof<C: CurveTrait> {
    commitment: C,
    response: C::Scalar,
}

impl<C: CurveTrait> PiSchProof<C> {
    /// Sample the proof nonce early, committing to `A = r·G`.
    pub(crate) fn precommit<R: RngCore + CryptoRng>(rng: &mut R) -> Result<PiSchPrecommit<C>> {
        let nonce = C::Scalar::random(rng);
        let commitment = C::generator().multiply_by_scalar(&nonce);
        Ok(PiSchPrecommit { commitment, nonce })
    }

    /// Finish a proof whose nonce was committed earlier.
    pub(crate) fn prove_from_precommit(
        context: &impl ProofContext,
        precommit: &PiSchPrecommit<C>,
        input: &CommonInput<C>,
        secret: &ProverSecret<C>,
        transcript: &Transcript,
    ) -> Result<Self> {
        let mut transcript = transcript.clone();
        let challenge = Self::challenge(&mut transcript, context, input, &precommit.commitment)?;
        let response = precommit.nonce.add(&challenge.mul(&secret.x));
        Ok(Self {
            commitment: precommit.commitment,
            response,
        })
    }

    /// Verify, additionally requiring that the nonce commitment matches a
    /// previously received precommitment.
    pub(crate) fn verify_with_precommit(
        self,
        input: CommonInput<C>,
        context: &impl ProofContext,
        transcript: &Transcript,
        expected_commitment: &C,
    ) -> Result<()> {
        if &self.commitment != expected_commitment {
            error!("Schnorr nonce commitment does not match the committed value");
            return Err(InternalError::unattributed());
        }
        let mut transcript = transcript.clone();
        self.verify_internal(input, context, &mut transcript)
    }

    fn challenge(
        transcript: &mut Transcript,
        context: &impl ProofContext,
        input: &CommonInput<C>,
        commitment: &C,
    ) -> Result<C::Scalar> {
        append_context(transcript, b"PiSchProof context", context)?;
        transcript.append_message(b"generator", &C::generator().to_bytes());
        transcript.append_message(b"public point", &input.x_commitment.to_bytes());
        transcript.append_message(b"nonce commitment", &commitment.to_bytes());
        let challenge = positive_challenge_from_transcript(transcript, &C::order())?;
        C::bn_to_scalar(&challenge)
    }

    fn verify_internal(
        self,
        input: CommonInput<C>,
        context: &impl ProofContext,
        transcript: &mut Transcript,
    ) -> Result<()> {
        let challenge = Self::challenge(transcript, context, &input, &self.commitment)?;
        let lhs = C::generator().multiply_by_scalar(&self.response);
        let rhs = self.commitment + input.x_commitment.multiply_by_scalar(&challenge);
        if lhs != rhs {
            error!("Schnorr proof verification failed");
            return Err(InternalError::unattributed());
        }
        Ok(())
    }
}

impl<C: CurveTrait> Proof for PiSchProof<C> {
    type CommonInput<'a> = CommonInput<'a, C>;
    type ProverSecret<'a> = &'a ProverSecret<C>;

    fn prove<R: RngCore + CryptoRng>(
        input: Self::CommonInput<'_>,
        secret: Self::ProverSecret<'_>,
        context: &impl ProofContext,
        transcript: &mut Transcript,
        rng: &mut R,
    ) -> Result<Self> {
        let precommit = Self::precommit(rng)?;
        let proof = Self::prove_from_precommit(context, &precommit, &input, secret, transcript)?;
        Ok(proof)
    }

    fn verify(
        self,
        input: Self::CommonInput<'_>,
        context: &impl ProofContext,
        transcript: &mut Transcript,
    ) -> Result<()> {
        self.verify_internal(input, context, transcript)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{curve::TestCurve, utils::testing::init_testing};

    type TestScalar = <TestCurve as CurveTrait>::Scalar;

    fn transcript() -> Transcript {
        Transcript::new(b"PiSchProof test")
    }

    #[test]
    fn proof_roundtrip_verifies() {
        let mut rng = init_testing();
        let x = TestScalar::random(&mut rng);
        let public = TestCurve::generator().multiply_by_scalar(&x);
        let input = CommonInput::new(&public);
        let secret = ProverSecret::<TestCurve>::new(&x);

        let proof =
            PiSchProof::prove(input, &secret, &(), &mut transcript(), &mut rng).unwrap();
        assert!(proof.verify(input, &(), &mut transcript()).is_ok());
    }

    #[test]
    fn wrong_statement_fails() {
        let mut rng = init_testing();
        let x = TestScalar::random(&mut rng);
        let y = TestScalar::random(&mut rng);
        let public = TestCurve::generator().multiply_by_scalar(&y);
        let input = CommonInput::new(&public);
        let secret = ProverSecret::<TestCurve>::new(&x);

        let proof =
            PiSchProof::prove(input, &secret, &(), &mut transcript(), &mut rng).unwrap();
        assert!(proof.verify(input, &(), &mut transcript()).is_err());
    }

    #[test]
    fn precommit_path_matches_and_pins_the_nonce() {
        let mut rng = init_testing();
        let x = TestScalar::random(&mut rng);
        let public = TestCurve::generator().multiply_by_scalar(&x);
        let input = CommonInput::new(&public);
        let secret = ProverSecret::<TestCurve>::new(&x);

        let precommit = PiSchProof::<TestCurve>::precommit(&mut rng).unwrap();
        let committed = *precommit.precommitment();
        let proof =
            PiSchProof::prove_from_precommit(&(), &precommit, &input, &secret, &transcript())
                .unwrap();
        assert!(proof
            .clone()
            .verify_with_precommit(input, &(), &transcript(), &committed)
            .is_ok());

        // A different precommitment must be rejected.
        let other = PiSchProof::<TestCurve>::precommit(&mut rng).unwrap();
        assert!(proof
            .verify_with_precommit(input, &(), &transcript(), other.precommitment())
            .is_err());
    }

    #[test]
    fn context_binding_is_enforced() {
        let mut rng = init_testing();
        let x = TestScalar::random(&mut rng);
        let public = TestCurve::generator().multiply_by_scalar(&x);
        let input = CommonInput::new(&public);
        let secret = ProverSecret::<TestCurve>::new(&x);

        struct OtherContext;
        impl ProofContext for OtherContext {
            fn as_bytes(&self) -> Result<Vec<u8>> {
                Ok(b"other".to_vec())
            }
        }

        let proof =
            PiSchProof::prove(input, &secret, &(), &mut transcript(), &mut rng).unwrap();
        assert!(proof.verify(input, &OtherContext, &mut transcript()).is_err());
    }
}
