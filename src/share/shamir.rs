use crate::share::{Share, ShareError};
use ark_ff::{One, PrimeField, Zero};
use ark_poly::{univariate::DensePolynomial, DenseUVPolynomial, Polynomial};
use ark_std::rand::Rng;
use ark_std::UniformRand;

/// Shamir (t, n) threshold secret sharing over a prime field.
///
/// Shares are evaluations of a random degree `t - 1` polynomial with the
/// secret as constant term, taken at the fixed public points `x = 1..=n`;
/// the share at `x = i` belongs to party `i - 1`. Any `t` distinct shares
/// recover the secret by Lagrange interpolation at `x = 0`.
#[derive(Clone, Copy, Debug)]
pub struct ThresholdSharing {
    pub n: usize,
    pub t: usize,
}

impl ThresholdSharing {
    pub fn new(n: usize, t: usize) -> Result<Self, ShareError> {
        if t == 0 || t > n {
            return Err(ShareError::InvalidThreshold {
                n_parties: n,
                threshold: t,
            });
        }
        Ok(Self { n, t })
    }

    /// Splits `secret` into one share per party.
    pub fn share<F: PrimeField, R: Rng + ?Sized>(&self, secret: F, rng: &mut R) -> Vec<Share<F>> {
        let mut coeffs: Vec<F> = (0..self.t).map(|_| F::rand(rng)).collect();
        coeffs[0] = secret;
        let poly = DensePolynomial::from_coefficients_vec(coeffs);
        (1..=self.n)
            .map(|x| Share::new(x - 1, poly.evaluate(&F::from(x as u64))))
            .collect()
    }

    /// Recovers the secret from the first `t` of the given shares.
    ///
    /// # Errors
    /// - [`ShareError::InsufficientShares`] if fewer than `t` shares are given.
    /// - [`ShareError::DuplicateParty`] if two of the used shares carry the
    ///   same evaluation point.
    pub fn recover<F: PrimeField>(&self, shares: &[Share<F>]) -> Result<F, ShareError> {
        if shares.len() < self.t {
            return Err(ShareError::InsufficientShares {
                needed: self.t,
                got: shares.len(),
            });
        }
        let points = &shares[..self.t];

        let mut secret = F::zero();
        for (i, share_i) in points.iter().enumerate() {
            let x_i = F::from((share_i.party + 1) as u64);
            let mut numerator = F::one();
            let mut denominator = F::one();
            for (j, share_j) in points.iter().enumerate() {
                if i != j {
                    let x_j = F::from((share_j.party + 1) as u64);
                    numerator *= -x_j;
                    denominator *= x_i - x_j;
                }
            }
            let coeff = numerator * denominator.inverse().ok_or(ShareError::DuplicateParty)?;
            secret += share_i.value * coeff;
        }
        Ok(secret)
    }
}
