//! The correlated-randomness tape.
//!
//! The offline phase appends field elements to one tape per party, as decimal
//! text with one element per line; the online phase reads them back in the
//! exact same order, gate by gate, value by value. The append/read order is a
//! wire contract between the two phases: a tape that runs short or drifts out
//! of step is fatal for the party that owns it.

use crate::share::{PartyId, Share};
use ark_ff::PrimeField;
use num_bigint::BigUint;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TapeError {
    #[error("tape exhausted after {lines} lines: the offline phase wrote fewer elements than the circuit consumes")]
    Exhausted { lines: usize },
    #[error("malformed tape line {line}: {reason}")]
    Malformed { line: usize, reason: String },
    #[error("tape I/O failure: {0}")]
    Io(#[from] std::io::Error),
}

/// Path of one party's tape inside `dir`.
pub fn tape_path(dir: &Path, job: &str, party: PartyId) -> PathBuf {
    dir.join(format!("{job}-party-{party}.txt"))
}

/// Append-only writer for one party's tape.
pub struct TapeWriter<W: Write> {
    inner: W,
    written: usize,
}

impl<W: Write> TapeWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    pub fn append<F: PrimeField>(&mut self, value: &F) -> Result<(), TapeError> {
        let digits: BigUint = (*value).into();
        writeln!(self.inner, "{digits}")?;
        self.written += 1;
        Ok(())
    }

    pub fn lines_written(&self) -> usize {
        self.written
    }

    pub fn flush(&mut self) -> Result<(), TapeError> {
        self.inner.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl TapeWriter<BufWriter<File>> {
    /// Creates (or truncates) the tape file for `party` under `dir`.
    pub fn create(dir: &Path, job: &str, party: PartyId) -> Result<Self, TapeError> {
        fs::create_dir_all(dir)?;
        let file = File::create(tape_path(dir, job, party))?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

/// Sequential reader over one party's tape. Shares read from the tape are
/// tagged with the owning party's index.
pub struct TapeReader<R: BufRead> {
    inner: R,
    party: PartyId,
    lines: usize,
}

impl<R: BufRead> TapeReader<R> {
    pub fn new(party: PartyId, inner: R) -> Self {
        Self {
            inner,
            party,
            lines: 0,
        }
    }

    pub fn party(&self) -> PartyId {
        self.party
    }

    pub fn lines_read(&self) -> usize {
        self.lines
    }

    fn read_element<F: PrimeField>(&mut self) -> Result<F, TapeError> {
        let mut line = String::new();
        if self.inner.read_line(&mut line)? == 0 {
            return Err(TapeError::Exhausted { lines: self.lines });
        }
        self.lines += 1;
        let digits = BigUint::from_str(line.trim()).map_err(|e| TapeError::Malformed {
            line: self.lines,
            reason: e.to_string(),
        })?;
        Ok(F::from(digits))
    }

    /// Reads `count` public field elements.
    pub fn read_clear<F: PrimeField>(&mut self, count: usize) -> Result<Vec<Option<F>>, TapeError> {
        (0..count).map(|_| self.read_element().map(Some)).collect()
    }

    /// Reads `count` share values owned by this party.
    pub fn read_shares<F: PrimeField>(
        &mut self,
        count: usize,
    ) -> Result<Vec<Option<Share<F>>>, TapeError> {
        (0..count)
            .map(|_| {
                self.read_element()
                    .map(|value| Some(Share::new(self.party, value)))
            })
            .collect()
    }
}

impl TapeReader<BufReader<File>> {
    pub fn open(dir: &Path, job: &str, party: PartyId) -> Result<Self, TapeError> {
        let file = File::open(tape_path(dir, job, party))?;
        Ok(Self::new(party, BufReader::new(file)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_bls12_381::Fr;
    use std::io::Cursor;

    #[test]
    fn round_trips_in_order() {
        let mut writer = TapeWriter::new(Vec::new());
        let values = [Fr::from(7u64), -Fr::from(1u64), Fr::from(0u64)];
        for v in &values {
            writer.append(v).unwrap();
        }
        assert_eq!(writer.lines_written(), 3);

        let mut reader = TapeReader::new(4, Cursor::new(writer.into_inner()));
        let shares = reader.read_shares::<Fr>(2).unwrap();
        assert_eq!(shares[0], Some(Share::new(4, values[0])));
        assert_eq!(shares[1], Some(Share::new(4, values[1])));
        let clear = reader.read_clear::<Fr>(1).unwrap();
        assert_eq!(clear[0], Some(values[2]));
        assert_eq!(reader.lines_read(), 3);
    }

    #[test]
    fn short_tape_is_fatal() {
        let mut writer = TapeWriter::new(Vec::new());
        writer.append(&Fr::from(1u64)).unwrap();
        let mut reader = TapeReader::new(0, Cursor::new(writer.into_inner()));
        let err = reader.read_clear::<Fr>(2).unwrap_err();
        assert!(matches!(err, TapeError::Exhausted { lines: 1 }));
    }

    #[test]
    fn garbage_lines_are_rejected() {
        let mut reader = TapeReader::new(0, Cursor::new(b"not-a-number\n".to_vec()));
        let err = reader.read_clear::<Fr>(1).unwrap_err();
        assert!(matches!(err, TapeError::Malformed { line: 1, .. }));
    }

    #[test]
    fn file_tapes_round_trip() {
        let dir = std::env::temp_dir().join(format!("tape-test-{}", std::process::id()));
        let mut writer = TapeWriter::create(&dir, "job", 2).unwrap();
        writer.append(&Fr::from(99u64)).unwrap();
        writer.flush().unwrap();

        let mut reader = TapeReader::open(&dir, "job", 2).unwrap();
        assert_eq!(reader.party(), 2);
        assert_eq!(
            reader.read_clear::<Fr>(1).unwrap(),
            vec![Some(Fr::from(99u64))]
        );
        std::fs::remove_dir_all(&dir).ok();
    }
}
