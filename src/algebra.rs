//! Null-propagating vector algebra over clear values and shares.
//!
//! A `None` element means "no data at this position" (e.g. a worker submitted
//! no label for a task) and is a first-class value, not an error: element-wise
//! operations yield `None` whenever either operand is `None`, and reductions
//! and dot products skip `None` positions entirely. Every gate protocol goes
//! through these helpers so the null semantics live in exactly one place.

use crate::share::{PartyId, Share, ShareError};
use ark_ff::{PrimeField, Zero};

/// A vector of public field elements with possibly missing positions.
pub type ClearVec<F> = Vec<Option<F>>;
/// A vector of one party's shares with possibly missing positions.
pub type ShareVec<F> = Vec<Option<Share<F>>>;

fn check_len<T, U>(x: &[T], y: &[U]) -> Result<(), ShareError> {
    if x.len() != y.len() {
        return Err(ShareError::LengthMismatch(x.len(), y.len()));
    }
    Ok(())
}

/// Element-wise addition of clear vectors.
pub fn add_clear<F: PrimeField>(
    x: &[Option<F>],
    y: &[Option<F>],
) -> Result<ClearVec<F>, ShareError> {
    check_len(x, y)?;
    Ok(x.iter()
        .zip(y)
        .map(|(a, b)| match (a, b) {
            (Some(a), Some(b)) => Some(*a + *b),
            _ => None,
        })
        .collect())
}

/// Element-wise subtraction of clear vectors.
pub fn sub_clear<F: PrimeField>(
    x: &[Option<F>],
    y: &[Option<F>],
) -> Result<ClearVec<F>, ShareError> {
    check_len(x, y)?;
    Ok(x.iter()
        .zip(y)
        .map(|(a, b)| match (a, b) {
            (Some(a), Some(b)) => Some(*a - *b),
            _ => None,
        })
        .collect())
}

/// Element-wise multiplication of clear vectors.
pub fn mul_clear<F: PrimeField>(
    x: &[Option<F>],
    y: &[Option<F>],
) -> Result<ClearVec<F>, ShareError> {
    check_len(x, y)?;
    Ok(x.iter()
        .zip(y)
        .map(|(a, b)| match (a, b) {
            (Some(a), Some(b)) => Some(*a * *b),
            _ => None,
        })
        .collect())
}

/// Multiplies every present element by a constant.
pub fn scale_clear<F: PrimeField>(x: &[Option<F>], c: F) -> ClearVec<F> {
    x.iter().map(|a| a.map(|a| a * c)).collect()
}

/// Dot product of clear vectors, skipping positions where either side is
/// missing. An all-missing input yields zero.
pub fn dot_clear<F: PrimeField>(x: &[Option<F>], y: &[Option<F>]) -> Result<F, ShareError> {
    check_len(x, y)?;
    let mut sum = F::zero();
    for (a, b) in x.iter().zip(y) {
        if let (Some(a), Some(b)) = (a, b) {
            sum += *a * *b;
        }
    }
    Ok(sum)
}

/// Sum of the present elements of a clear vector.
pub fn sum_clear<F: PrimeField>(x: &[Option<F>]) -> F {
    x.iter().flatten().fold(F::zero(), |acc, v| acc + *v)
}

/// Element-wise addition of share vectors.
pub fn add_shares<F: PrimeField>(
    x: &[Option<Share<F>>],
    y: &[Option<Share<F>>],
) -> Result<ShareVec<F>, ShareError> {
    check_len(x, y)?;
    x.iter()
        .zip(y)
        .map(|(a, b)| match (a, b) {
            (Some(a), Some(b)) => (a.clone() + b.clone()).map(Some),
            _ => Ok(None),
        })
        .collect()
}

/// Element-wise subtraction of share vectors.
pub fn sub_shares<F: PrimeField>(
    x: &[Option<Share<F>>],
    y: &[Option<Share<F>>],
) -> Result<ShareVec<F>, ShareError> {
    check_len(x, y)?;
    x.iter()
        .zip(y)
        .map(|(a, b)| match (a, b) {
            (Some(a), Some(b)) => (a.clone() - b.clone()).map(Some),
            _ => Ok(None),
        })
        .collect()
}

/// Turns a public value and a mask share into a share of the unmasked value,
/// per position: `x - y.value`, owned by `y`'s party.
pub fn sub_clear_shares<F: PrimeField>(
    x: &[Option<F>],
    y: &[Option<Share<F>>],
) -> Result<ShareVec<F>, ShareError> {
    check_len(x, y)?;
    Ok(x.iter()
        .zip(y)
        .map(|(a, b)| match (a, b) {
            (Some(a), Some(b)) => Some(b.with_value(*a - b.value)),
            _ => None,
        })
        .collect())
}

/// Element-wise product of a share vector and a clear vector.
pub fn scale_shares<F: PrimeField>(
    x: &[Option<Share<F>>],
    y: &[Option<F>],
) -> Result<ShareVec<F>, ShareError> {
    check_len(x, y)?;
    Ok(x.iter()
        .zip(y)
        .map(|(a, b)| match (a, b) {
            (Some(a), Some(b)) => Some(a.clone() * *b),
            _ => None,
        })
        .collect())
}

/// Multiplies every present share by a constant.
pub fn scale_shares_const<F: PrimeField>(x: &[Option<Share<F>>], c: F) -> ShareVec<F> {
    x.iter().map(|a| a.as_ref().map(|a| a.clone() * c)).collect()
}

/// Dot product of a share vector with a clear vector, skipping missing
/// positions; the result is a single share owned by `party`.
pub fn dot_shares<F: PrimeField>(
    x: &[Option<Share<F>>],
    y: &[Option<F>],
    party: PartyId,
) -> Result<Share<F>, ShareError> {
    check_len(x, y)?;
    let mut sum = F::zero();
    for (a, b) in x.iter().zip(y) {
        if let (Some(a), Some(b)) = (a, b) {
            sum += a.value * *b;
        }
    }
    Ok(Share::new(party, sum))
}

/// Sums the present shares of a vector; `None` if every position is missing.
pub fn sum_shares<F: PrimeField>(x: &[Option<Share<F>>]) -> Result<Option<Share<F>>, ShareError> {
    let mut acc: Option<Share<F>> = None;
    for share in x.iter().flatten() {
        acc = Some(match acc {
            None => share.clone(),
            Some(acc) => (acc + share.clone())?,
        });
    }
    Ok(acc)
}

/// The positions where both vectors carry data.
pub fn joint_mask<F: PrimeField>(x: &[Option<F>], y: &[Option<F>]) -> Result<Vec<bool>, ShareError> {
    check_len(x, y)?;
    Ok(x.iter()
        .zip(y)
        .map(|(a, b)| a.is_some() && b.is_some())
        .collect())
}

/// Nulls out the positions the mask excludes.
pub fn apply_filter<T: Clone>(x: &[Option<T>], keep: &[bool]) -> Result<Vec<Option<T>>, ShareError> {
    check_len(x, keep)?;
    Ok(x.iter()
        .zip(keep)
        .map(|(a, k)| if *k { a.clone() } else { None })
        .collect())
}
