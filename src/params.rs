use ark_ff::PrimeField;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParamsError {
    #[error("threshold {threshold} is not in 1..={n_parties}")]
    BadThreshold { n_parties: usize, threshold: usize },
    #[error("the logarithm scale exponent must be at least 1")]
    BadLogScale,
}

/// Bit-length bounds of the statistical division protocol.
///
/// `l` bounds the divisor, `e` bounds the dividend and `sigma` is the
/// statistical security parameter. Soundness over the integers requires
/// `e + 2 * (l + sigma) < bits(P)`; the circuit builder rejects division
/// gates whenever the chosen field leaves no headroom.
#[derive(Clone, Copy, Debug)]
pub struct DivisionParams {
    pub l: u32,
    pub e: u32,
    pub sigma: u32,
}

impl Default for DivisionParams {
    fn default() -> Self {
        Self {
            l: 64,
            e: 90,
            sigma: 64,
        }
    }
}

impl DivisionParams {
    /// Number of bits the dividend is shifted by before the masked opening.
    pub fn shift_bits(&self) -> u32 {
        self.l + self.sigma
    }

    /// Total bits the opened value can occupy, `e + 2 * (l + sigma)`.
    pub fn required_bits(&self) -> u32 {
        self.e + 2 * (self.l + self.sigma)
    }

    pub fn fits_modulus<F: PrimeField>(&self) -> bool {
        self.required_bits() < F::MODULUS_BIT_SIZE
    }
}

/// Configuration options for one protocol execution.
///
/// An explicit immutable value handed to every constructor, so circuits with
/// different parameters can coexist in one process.
#[derive(Clone, Debug)]
pub struct ProtocolParams {
    /// Number of parties in the protocol.
    pub n_parties: usize,
    /// Minimum number of shares needed to reconstruct a secret.
    pub threshold: usize,
    /// Bit-length bounds of the division protocol.
    pub div: DivisionParams,
    /// Whether division gates verify their dividend's bit length through the
    /// coordinator before running. Costs one extra round per division gate.
    pub check_division_bounds: bool,
    /// Fixed-point scale exponent used by the logarithm gate: the gate
    /// subtracts `10^log_scale_exp` and divides by `10^(log_scale_exp - 1)`.
    pub log_scale_exp: u32,
}

impl ProtocolParams {
    pub fn new(n_parties: usize, threshold: usize) -> Self {
        Self {
            n_parties,
            threshold,
            div: DivisionParams::default(),
            check_division_bounds: true,
            log_scale_exp: 13,
        }
    }

    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.threshold == 0 || self.threshold > self.n_parties {
            return Err(ParamsError::BadThreshold {
                n_parties: self.n_parties,
                threshold: self.threshold,
            });
        }
        if self.log_scale_exp == 0 {
            return Err(ParamsError::BadLogScale);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_bls12_381::{Fq, Fr};

    #[test]
    fn default_division_params_need_a_wide_field() {
        let div = DivisionParams::default();
        assert_eq!(div.required_bits(), 346);
        assert!(div.fits_modulus::<Fq>());
        assert!(!div.fits_modulus::<Fr>());
    }

    #[test]
    fn rejects_bad_threshold() {
        assert!(ProtocolParams::new(7, 4).validate().is_ok());
        assert!(ProtocolParams::new(7, 0).validate().is_err());
        assert!(ProtocolParams::new(7, 8).validate().is_err());
    }
}
