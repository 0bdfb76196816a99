//! Feldman verifiable secret sharing.
//!
//! A dealer splits a secret scalar into evaluations of a random degree-`t`
//! polynomial and publishes the coefficients in the exponent. Each recipient
//! checks its share against those commitments; any `t + 1` holders can
//! reconstruct the secret by Lagrange interpolation at zero, and nothing
//! smaller can learn anything.
//!
//! Shares are evaluated at each party's key coordinate (see
//! [`PartyId::key`](crate::PartyId)), reduced into the scalar field.

use crate::{
    curve::{CurveTrait, ScalarTrait},
    errors::{CallerError, Result},
    protocol::PartyId,
};
use rand::{CryptoRng, RngCore};
use tracing::error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A secret polynomial. The constant term is the shared secret.
#[derive(Zeroize, ZeroizeOnDrop)]
pub(crate) struct Polynomial<C: CurveTrait> {
    coefficients: Vec<C::Scalar>,
}

impl<C: CurveTrait> std::fmt::Debug for Polynomial<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Polynomial")
            .field("degree", &(self.coefficients.len().saturating_sub(1)))
            .field("coefficients", &"[redacted]")
            .finish()
    }
}

impl<C: CurveTrait> Polynomial<C> {
    /// Sample a random polynomial of degree `threshold` with the given
    /// constant term.
    pub(crate) fn sample<R: RngCore + CryptoRng>(
        secret: C::Scalar,
        threshold: usize,
        rng: &mut R,
    ) -> Self {
        let mut coefficients = vec![secret];
        for _ in 0..threshold {
            coefficients.push(C::Scalar::random(rng));
        }
        Self { coefficients }
    }

    /// The Feldman commitment vector `C_j = a_j · G`.
    pub(crate) fn commitments(&self) -> Vec<C> {
        self.coefficients
            .iter()
            .map(|a| C::generator().multiply_by_scalar(a))
            .collect()
    }

    /// Horner evaluation at `x`.
    pub(crate) fn evaluate(&self, x: &C::Scalar) -> C::Scalar {
        let mut sum = C::Scalar::zero();
        for coefficient in self.coefficients.iter().rev() {
            sum = sum.mul(x).add(coefficient);
        }
        sum
    }

    /// Evaluate at a party's key coordinate.
    pub(crate) fn evaluate_at_party(&self, party: &PartyId) -> Result<C::Scalar> {
        Ok(self.evaluate(&party.coordinate::<C>()?))
    }

    /// The shared secret.
    pub(crate) fn constant_term(&self) -> &C::Scalar {
        &self.coefficients[0]
    }
}

/// Evaluate a commitment vector at `x`: `Σ C_j · xʲ`, by Horner.
pub(crate) fn eval_public<C: CurveTrait>(commitments: &[C], x: &C::Scalar) -> C {
    let mut sum = C::identity();
    for commitment in commitments.iter().rev() {
        sum = sum.multiply_by_scalar(x) + *commitment;
    }
    sum
}

/// Check a received share against the dealer's commitment vector.
pub(crate) fn verify_share<C: CurveTrait>(
    share: &C::Scalar,
    commitments: &[C],
    recipient: &PartyId,
) -> Result<bool> {
    let x = recipient.coordinate::<C>()?;
    let expected = eval_public(commitments, &x);
    Ok(C::generator().multiply_by_scalar(share) == expected)
}

/// The Lagrange coefficient of `party` for interpolation at zero over the
/// given quorum.
pub(crate) fn lagrange_coefficient_at_zero<C: CurveTrait>(
    party: &PartyId,
    quorum: &[PartyId],
) -> Result<C::Scalar> {
    let my_coordinate = party.coordinate::<C>()?;
    let mut result = C::Scalar::one();
    for other in quorum {
        if other == party {
            continue;
        }
        let other_coordinate = other.coordinate::<C>()?;
        let numerator = other_coordinate.negate();
        let denominator = my_coordinate.sub(&other_coordinate);
        let inverse = denominator.invert().ok_or_else(|| {
            error!("Quorum contains colliding evaluation coordinates");
            crate::errors::InternalError::InternalInvariantFailed
        })?;
        result = result.mul(&numerator.mul(&inverse));
    }
    Ok(result)
}

/// Reconstruct the secret from a full quorum of shares.
///
/// The caller must supply at least `t + 1` distinct holders; fewer yields
/// garbage, which is the point of the scheme.
pub(crate) fn reconstruct<C: CurveTrait>(shares: &[(PartyId, C::Scalar)]) -> Result<C::Scalar> {
    if shares.is_empty() {
        error!("Cannot reconstruct from an empty share set");
        Err(CallerError::BadInput)?;
    }
    let quorum: Vec<PartyId> = shares.iter().map(|(p, _)| p.clone()).collect();
    let mut secret = C::Scalar::zero();
    for (party, share) in shares {
        let lambda = lagrange_coefficient_at_zero::<C>(party, &quorum)?;
        secret = secret.add(&lambda.mul(share));
    }
    Ok(secret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        curve::TestCurve,
        protocol::testing::test_party_ids,
        utils::testing::init_testing,
    };

    type TestScalar = <TestCurve as CurveTrait>::Scalar;

    #[test]
    fn shares_verify_against_commitments() {
        let mut rng = init_testing();
        let parties = test_party_ids(5);
        let secret = TestScalar::random(&mut rng);
        let polynomial = Polynomial::<TestCurve>::sample(secret, 2, &mut rng);
        let commitments = polynomial.commitments();
        assert_eq!(commitments.len(), 3);

        for party in &parties {
            let share = polynomial.evaluate_at_party(party).unwrap();
            assert!(verify_share::<TestCurve>(&share, &commitments, party).unwrap());
        }
    }

    #[test]
    fn tampered_share_fails_verification() {
        let mut rng = init_testing();
        let parties = test_party_ids(3);
        let secret = TestScalar::random(&mut rng);
        let polynomial = Polynomial::<TestCurve>::sample(secret, 1, &mut rng);
        let commitments = polynomial.commitments();

        let share = polynomial.evaluate_at_party(&parties[0]).unwrap();
        let tampered = share.add(&TestScalar::one());
        assert!(!verify_share::<TestCurve>(&tampered, &commitments, &parties[0]).unwrap());
    }

    #[test]
    fn any_quorum_reconstructs_the_secret() {
        let mut rng = init_testing();
        let parties = test_party_ids(5);
        let secret = TestScalar::random(&mut rng);
        let polynomial = Polynomial::<TestCurve>::sample(secret, 2, &mut rng);

        for quorum in [[0usize, 1, 2], [1, 3, 4], [0, 2, 4]] {
            let shares: Vec<_> = quorum
                .iter()
                .map(|&i| {
                    let party = parties[i].clone();
                    let share = polynomial.evaluate_at_party(&party).unwrap();
                    (party, share)
                })
                .collect();
            assert_eq!(reconstruct::<TestCurve>(&shares).unwrap(), secret);
        }
    }

    #[test]
    fn undersized_quorums_learn_nothing_useful() {
        let mut rng = init_testing();
        let parties = test_party_ids(4);
        let secret = TestScalar::random(&mut rng);
        let polynomial = Polynomial::<TestCurve>::sample(secret, 2, &mut rng);

        let shares: Vec<_> = parties[..2]
            .iter()
            .map(|party| {
                (
                    party.clone(),
                    polynomial.evaluate_at_party(party).unwrap(),
                )
            })
            .collect();
        // Interpolating through too few points yields a different value.
        assert_ne!(reconstruct::<TestCurve>(&shares).unwrap(), secret);
    }

    #[test]
    fn lagrange_weights_sum_shares_to_the_secret() {
        let mut rng = init_testing();
        let parties = test_party_ids(3);
        let secret = TestScalar::random(&mut rng);
        let polynomial = Polynomial::<TestCurve>::sample(secret, 2, &mut rng);

        let mut sum = TestScalar::zero();
        for party in &parties {
            let lambda =
                lagrange_coefficient_at_zero::<TestCurve>(party, &parties).unwrap();
            let share = polynomial.evaluate_at_party(party).unwrap();
            sum = sum.add(&lambda.mul(&share));
        }
        assert_eq!(sum, secret);
    }

    #[test]
    fn trivial_threshold_polynomial_is_constant() {
        let mut rng = init_testing();
        let parties = test_party_ids(1);
        let secret = TestScalar::random(&mut rng);
        let polynomial = Polynomial::<TestCurve>::sample(secret, 0, &mut rng);
        assert_eq!(
            polynomial.evaluate_at_party(&parties[0]).unwrap(),
            secret
        );
    }
}
