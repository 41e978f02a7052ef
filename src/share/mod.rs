/// In this protocol, the most fundamental type is a share: one party's
/// evaluation point of a secret-sharing polynomial. Arithmetic between two
/// shares is only meaningful when both belong to the same party (the same
/// evaluation point), so the binary operators are fallible and reject
/// cross-party mixing.
pub mod shamir;

use ark_ff::PrimeField;
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use std::ops::{Add, Mul, Sub};
use thiserror::Error;

/// Type to identify a party in a protocol.
pub type PartyId = usize;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ShareError {
    #[error("shares of parties {0} and {1} cannot be combined")]
    PartyMismatch(PartyId, PartyId),
    #[error("vectors of lengths {0} and {1} cannot be combined")]
    LengthMismatch(usize, usize),
    #[error("need at least {needed} shares to recover, got {got}")]
    InsufficientShares { needed: usize, got: usize },
    #[error("two shares carry the same evaluation point")]
    DuplicateParty,
    #[error("threshold {threshold} is not in 1..={n_parties}")]
    InvalidThreshold {
        n_parties: usize,
        threshold: usize,
    },
}

/// A single party's share of a secret, tagged with the owning party index.
#[derive(Clone, Debug, PartialEq, Eq, CanonicalSerialize, CanonicalDeserialize)]
pub struct Share<F: PrimeField> {
    pub party: PartyId,
    pub value: F,
}

impl<F: PrimeField> Share<F> {
    pub fn new(party: PartyId, value: F) -> Self {
        Self { party, value }
    }

    /// The additive identity share: a degenerate sharing of zero.
    pub fn zero(party: PartyId) -> Self {
        Self {
            party,
            value: F::zero(),
        }
    }

    /// A new share for the same party carrying `value`.
    pub fn with_value(&self, value: F) -> Self {
        Self {
            party: self.party,
            value,
        }
    }
}

impl<F: PrimeField> Add for Share<F> {
    type Output = Result<Self, ShareError>;

    fn add(self, other: Self) -> Self::Output {
        if self.party != other.party {
            return Err(ShareError::PartyMismatch(self.party, other.party));
        }
        Ok(Self {
            party: self.party,
            value: self.value + other.value,
        })
    }
}

impl<F: PrimeField> Sub for Share<F> {
    type Output = Result<Self, ShareError>;

    fn sub(self, other: Self) -> Self::Output {
        if self.party != other.party {
            return Err(ShareError::PartyMismatch(self.party, other.party));
        }
        Ok(Self {
            party: self.party,
            value: self.value - other.value,
        })
    }
}

impl<F: PrimeField> Mul<F> for Share<F> {
    type Output = Self;

    fn mul(self, scalar: F) -> Self {
        Self {
            party: self.party,
            value: self.value * scalar,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_bls12_381::Fr;

    #[test]
    fn same_party_arithmetic() {
        let a = Share::new(2, Fr::from(10u64));
        let b = Share::new(2, Fr::from(4u64));
        assert_eq!((a.clone() + b.clone()).unwrap().value, Fr::from(14u64));
        assert_eq!((a.clone() - b).unwrap().value, Fr::from(6u64));
        assert_eq!((a * Fr::from(3u64)).value, Fr::from(30u64));
    }

    #[test]
    fn rejects_cross_party_mixing() {
        let a = Share::new(0, Fr::from(1u64));
        let b = Share::new(1, Fr::from(1u64));
        assert_eq!((a + b).unwrap_err(), ShareError::PartyMismatch(0, 1));
    }
}
