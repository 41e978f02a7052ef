//! Per-party evaluation context and the coordinator-mediated opening
//! protocol.
//!
//! Opening a secret-shared vector always follows the same round: every party
//! sends its (possibly null-holding) share vector to the coordinator, the
//! coordinator reconstructs each dimension that carries enough shares,
//! optionally folds in a public addend known to all parties, and broadcasts
//! the cleartext back. A party performs exactly one blocking read of the
//! coordinator's reply per round; that read is the only synchronization
//! point of the whole protocol.

use crate::algebra::{self, ClearVec, ShareVec};
use crate::params::{ParamsError, ProtocolParams};
use crate::share::shamir::ThresholdSharing;
use crate::share::{PartyId, Share, ShareError};
use crate::tape::{TapeError, TapeReader};
use crate::transport::{StarMessage, StarTransport, TransportError};
use ark_ff::{BigInteger, PrimeField};
use std::io::BufRead;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),
    #[error("share computation failed: {0}")]
    Share(#[from] ShareError),
    #[error("randomness tape failure: {0}")]
    Tape(#[from] TapeError),
    #[error("invalid protocol parameters: {0}")]
    Params(#[from] ParamsError),
    #[error("division operand does not fit the {bound}-bit precondition")]
    DivisionPrecondition { bound: u32 },
    #[error("divisor of {bits} bits exceeds the {limit}-bit protocol limit")]
    DivisorTooWide { bits: u64, limit: u32 },
    #[error("division by a zero divisor")]
    ZeroDivisor,
    #[error("divisor gate has not opened a value")]
    MissingDivisor,
    #[error("input gate evaluated before its secret shares were assigned")]
    MissingInput,
    #[error("gate evaluated before its offline randomness was read")]
    MissingRandomness,
}

/// One party's handle on a protocol execution: its identity, its randomness
/// tape cursor and its channel to the coordinator.
pub struct PartyNode<T: StarTransport, R: BufRead> {
    pub id: PartyId,
    pub params: ProtocolParams,
    sharing: ThresholdSharing,
    tape: TapeReader<R>,
    transport: T,
}

impl<T: StarTransport, R: BufRead> PartyNode<T, R> {
    pub fn new(
        id: PartyId,
        params: ProtocolParams,
        tape: TapeReader<R>,
        transport: T,
    ) -> Result<Self, ProtocolError> {
        params.validate()?;
        let sharing = ThresholdSharing::new(params.n_parties, params.threshold)?;
        Ok(Self {
            id,
            params,
            sharing,
            tape,
            transport,
        })
    }

    pub fn is_coordinator(&self) -> bool {
        self.transport.is_coordinator()
    }

    /// Lines consumed from this party's randomness tape so far.
    pub fn tape_lines_read(&self) -> usize {
        self.tape.lines_read()
    }

    pub fn read_mask_shares<F: PrimeField>(
        &mut self,
        count: usize,
    ) -> Result<ShareVec<F>, ProtocolError> {
        Ok(self.tape.read_shares(count)?)
    }

    pub fn read_clear<F: PrimeField>(&mut self, count: usize) -> Result<ClearVec<F>, ProtocolError> {
        Ok(self.tape.read_clear(count)?)
    }

    /// Opens a secret-shared vector through the coordinator.
    ///
    /// Every party sends `shares`; the coordinator reconstructs each
    /// dimension carrying at least `threshold` non-null shares (others open
    /// as null), folds in `fold` if given (a vector every party knows in the
    /// clear, e.g. the Beaver cross term) and broadcasts the result.
    pub async fn open<F: PrimeField>(
        &self,
        shares: &ShareVec<F>,
        fold: Option<&ClearVec<F>>,
    ) -> Result<ClearVec<F>, ProtocolError> {
        let dim = shares.len();
        let up = StarMessage::masked_shares(self.id, shares)?.to_bytes()?;
        self.transport.send_to_coordinator(up).await?;

        if self.transport.is_coordinator() {
            let rows = self.collect_rows::<F>(dim).await?;
            let mut opened = self.recover_columns(&rows, dim)?;
            if let Some(fold) = fold {
                opened = algebra::add_clear(&opened, fold)?;
            }
            debug!(party = self.id, dim, "opened masked vector");
            let down = StarMessage::opened(&opened)?.to_bytes()?;
            self.transport.broadcast_to_all(down).await?;
        }

        let reply = self.transport.recv_from_coordinator().await?;
        Ok(StarMessage::from_bytes(&reply)?.into_opened::<F>()?)
    }

    /// Opens `shares` at the coordinator only and verifies every recovered
    /// value stays strictly below `bound` bits; the coordinator broadcasts a
    /// verdict so all parties fail deterministically on a violation.
    pub async fn assert_max_bits<F: PrimeField>(
        &self,
        shares: &ShareVec<F>,
        bound: u32,
    ) -> Result<(), ProtocolError> {
        let dim = shares.len();
        let up = StarMessage::masked_shares(self.id, shares)?.to_bytes()?;
        self.transport.send_to_coordinator(up).await?;

        if self.transport.is_coordinator() {
            let rows = self.collect_rows::<F>(dim).await?;
            let opened = self.recover_columns(&rows, dim)?;
            let ok = opened
                .iter()
                .flatten()
                .all(|value| value.into_bigint().num_bits() < bound);
            if !ok {
                warn!(party = self.id, bound, "division precondition violated");
            }
            let down = StarMessage::verdict(ok).to_bytes()?;
            self.transport.broadcast_to_all(down).await?;
        }

        let reply = self.transport.recv_from_coordinator().await?;
        if StarMessage::from_bytes(&reply)?.into_verdict()? {
            Ok(())
        } else {
            Err(ProtocolError::DivisionPrecondition { bound })
        }
    }

    async fn collect_rows<F: PrimeField>(
        &self,
        dim: usize,
    ) -> Result<Vec<ShareVec<F>>, ProtocolError> {
        let raw = self.transport.collect_from_all().await?;
        let mut rows = Vec::with_capacity(raw.len());
        for (party, bytes) in raw.into_iter().enumerate() {
            let row = StarMessage::from_bytes(&bytes)?.into_shares::<F>(party)?;
            if row.len() != dim {
                return Err(ShareError::LengthMismatch(row.len(), dim).into());
            }
            rows.push(row);
        }
        Ok(rows)
    }

    fn recover_columns<F: PrimeField>(
        &self,
        rows: &[ShareVec<F>],
        dim: usize,
    ) -> Result<ClearVec<F>, ProtocolError> {
        let mut opened = Vec::with_capacity(dim);
        for col in 0..dim {
            let column: Vec<Share<F>> = rows.iter().filter_map(|row| row[col].clone()).collect();
            if column.len() >= self.sharing.t {
                opened.push(Some(self.sharing.recover(&column)?));
            } else {
                opened.push(None);
            }
        }
        Ok(opened)
    }
}
