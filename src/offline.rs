//! The offline phase: a dealer walks the circuit once, manufactures the
//! correlated randomness every gate's online protocol will consume (fresh
//! masks, Beaver triples and their opened deltas, division randomness),
//! secret-shares it and appends it to one tape per party.
//!
//! [`OfflineCircuit`] mirrors the online builder gate for gate; the append
//! order per gate is exactly the order its online counterpart reads, so the
//! two phases stay in step as long as both circuits are built with the same
//! topology.

use crate::circuit::{CircuitError, GateId};
use crate::dag::dependency_order;
use crate::params::ProtocolParams;
use crate::party::ProtocolError;
use crate::share::shamir::ThresholdSharing;
use crate::share::{Share, ShareError};
use crate::tape::{TapeError, TapeWriter};
use ark_ff::{PrimeField, Zero};
use ark_std::rand::Rng;
use ark_std::UniformRand;
use num_bigint::RandBigInt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

/// Manufactures and distributes the offline randomness: secret-shares values
/// across all parties and appends each party's rows to that party's tape.
pub struct Dealer<W: Write> {
    params: ProtocolParams,
    sharing: ThresholdSharing,
    tapes: Vec<TapeWriter<W>>,
}

impl<W: Write> Dealer<W> {
    pub fn new(params: &ProtocolParams, tapes: Vec<TapeWriter<W>>) -> Result<Self, ProtocolError> {
        params.validate()?;
        if tapes.len() != params.n_parties {
            return Err(ShareError::LengthMismatch(tapes.len(), params.n_parties).into());
        }
        let sharing = ThresholdSharing::new(params.n_parties, params.threshold)?;
        Ok(Self {
            params: params.clone(),
            sharing,
            tapes,
        })
    }

    pub fn from_writers(params: &ProtocolParams, writers: Vec<W>) -> Result<Self, ProtocolError> {
        Self::new(params, writers.into_iter().map(TapeWriter::new).collect())
    }

    /// Lines written to each party's tape so far.
    pub fn lines_written(&self) -> Vec<usize> {
        self.tapes.iter().map(|t| t.lines_written()).collect()
    }

    pub fn flush(&mut self) -> Result<(), TapeError> {
        for tape in &mut self.tapes {
            tape.flush()?;
        }
        Ok(())
    }

    pub fn into_tapes(self) -> Vec<TapeWriter<W>> {
        self.tapes
    }

    pub fn into_writers(self) -> Vec<W> {
        self.tapes.into_iter().map(TapeWriter::into_inner).collect()
    }

    /// Secret-shares each value; row `p` of the result is party `p`'s shares.
    fn share_rows<F: PrimeField, R: Rng>(&self, values: &[F], rng: &mut R) -> Vec<Vec<Share<F>>> {
        let mut rows = vec![Vec::with_capacity(values.len()); self.params.n_parties];
        for value in values {
            for (party, share) in self.sharing.share(*value, rng).into_iter().enumerate() {
                rows[party].push(share);
            }
        }
        rows
    }

    fn write_rows<F: PrimeField>(&mut self, rows: &[Vec<Share<F>>]) -> Result<(), TapeError> {
        for (tape, row) in self.tapes.iter_mut().zip(rows) {
            for share in row {
                tape.append(&share.value)?;
            }
        }
        Ok(())
    }

    /// Shares `values` and appends every party's row to its tape.
    fn deal<F: PrimeField, R: Rng>(
        &mut self,
        values: &[F],
        rng: &mut R,
    ) -> Result<Vec<Vec<Share<F>>>, TapeError> {
        let rows = self.share_rows(values, rng);
        self.write_rows(&rows)?;
        Ok(rows)
    }

    /// Appends the same cleartext values to every party's tape.
    fn write_clear_all<F: PrimeField>(&mut self, values: &[F]) -> Result<(), TapeError> {
        for tape in self.tapes.iter_mut() {
            for value in values {
                tape.append(value)?;
            }
        }
        Ok(())
    }
}

impl Dealer<BufWriter<File>> {
    /// Creates one tape file per party under `dir`.
    pub fn create_in_dir(
        params: &ProtocolParams,
        dir: &Path,
        job: &str,
    ) -> Result<Self, ProtocolError> {
        let tapes = (0..params.n_parties)
            .map(|party| TapeWriter::create(dir, job, party))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(params, tapes)
    }
}

#[derive(Clone, Debug)]
enum OfflineKind<F: PrimeField> {
    Input,
    Add { xs: Vec<GateId> },
    Subtract { x: GateId, y: GateId },
    AddConstant { x: GateId },
    Scaling { x: GateId, factor: F },
    Combination { xs: Vec<GateId> },
    ElemWiseMultiply { x: GateId, y: GateId },
    ElemWiseMulThenMulConst { x: GateId, y: GateId },
    DotProduct { x: GateId, y: GateId },
    DotProdWithFilter { x: GateId, y: GateId },
    Division { x: GateId, divisor: Option<GateId> },
    ElemMulThenDiv { x: GateId, y: GateId, divisor: Option<GateId> },
    DotProdThenDiv { xs: Vec<GateId>, ys: Vec<GateId>, divisor: GateId },
    Reduce { x: GateId },
    Output { x: GateId },
}

struct OfflineGateNode<F: PrimeField> {
    kind: OfflineKind<F>,
    dim: usize,
    done: bool,
    /// The mask in the clear; only the dealer ever sees it.
    lambda_clear: Vec<F>,
    /// The mask's shares, one row per party.
    lambda_rows: Vec<Vec<Share<F>>>,
}

/// The offline twin of the online circuit. Gates carry no secrets here; each
/// one draws the randomness its online counterpart needs and appends it to
/// the party tapes in the exact order the online gate reads it back.
pub struct OfflineCircuit<F: PrimeField> {
    params: ProtocolParams,
    gates: Vec<OfflineGateNode<F>>,
    endpoints: Vec<GateId>,
}

impl<F: PrimeField> OfflineCircuit<F> {
    pub fn new(params: ProtocolParams) -> Self {
        Self {
            params,
            gates: Vec::new(),
            endpoints: Vec::new(),
        }
    }

    pub fn num_gates(&self) -> usize {
        self.gates.len()
    }

    pub fn gate_dim(&self, id: GateId) -> Result<usize, CircuitError> {
        self.check_id(id)?;
        Ok(self.gates[id.0].dim)
    }

    pub fn add_endpoint(&mut self, id: GateId) -> Result<(), CircuitError> {
        self.check_id(id)?;
        self.endpoints.push(id);
        Ok(())
    }

    // ---------------------------------------------------------------- builder

    pub fn input(&mut self, dim: usize) -> GateId {
        self.push(OfflineKind::Input, dim)
    }

    pub fn add(&mut self, xs: &[GateId]) -> Result<GateId, CircuitError> {
        let dim = self.equal_dims(xs)?;
        Ok(self.push(OfflineKind::Add { xs: xs.to_vec() }, dim))
    }

    pub fn subtract(&mut self, x: GateId, y: GateId) -> Result<GateId, CircuitError> {
        let dim = self.equal_dims(&[x, y])?;
        Ok(self.push(OfflineKind::Subtract { x, y }, dim))
    }

    /// Adding a public constant keeps the input's mask; nothing is written.
    pub fn add_constant(&mut self, x: GateId) -> Result<GateId, CircuitError> {
        let dim = self.gate_dim(x)?;
        Ok(self.push(OfflineKind::AddConstant { x }, dim))
    }

    pub fn scaling(&mut self, x: GateId, factor: F) -> Result<GateId, CircuitError> {
        let dim = self.gate_dim(x)?;
        Ok(self.push(OfflineKind::Scaling { x, factor }, dim))
    }

    pub fn combination(&mut self, xs: &[GateId]) -> Result<GateId, CircuitError> {
        if xs.is_empty() {
            return Err(CircuitError::NotEnoughInputs { needed: 1, got: 0 });
        }
        let mut dim = 0;
        for &x in xs {
            dim += self.gate_dim(x)?;
        }
        Ok(self.push(OfflineKind::Combination { xs: xs.to_vec() }, dim))
    }

    pub fn elem_wise_multiply(&mut self, x: GateId, y: GateId) -> Result<GateId, CircuitError> {
        let dim = self.equal_dims(&[x, y])?;
        Ok(self.push(OfflineKind::ElemWiseMultiply { x, y }, dim))
    }

    pub fn elem_wise_mul_then_mul_const(
        &mut self,
        x: GateId,
        y: GateId,
    ) -> Result<GateId, CircuitError> {
        let dim = self.equal_dims(&[x, y])?;
        Ok(self.push(OfflineKind::ElemWiseMulThenMulConst { x, y }, dim))
    }

    pub fn dot_product(&mut self, x: GateId, y: GateId) -> Result<GateId, CircuitError> {
        self.equal_dims(&[x, y])?;
        Ok(self.push(OfflineKind::DotProduct { x, y }, 1))
    }

    pub fn dot_prod_with_filter(&mut self, x: GateId, y: GateId) -> Result<GateId, CircuitError> {
        self.equal_dims(&[x, y])?;
        Ok(self.push(OfflineKind::DotProdWithFilter { x, y }, 1))
    }

    pub fn div(&mut self, x: GateId) -> Result<GateId, CircuitError> {
        let dim = self.gate_dim(x)?;
        self.ensure_division_headroom()?;
        Ok(self.push(OfflineKind::Division { x, divisor: None }, dim))
    }

    pub fn div_by_gate(&mut self, x: GateId, divisor: GateId) -> Result<GateId, CircuitError> {
        let dim = self.gate_dim(x)?;
        self.ensure_division_headroom()?;
        self.ensure_output(divisor)?;
        Ok(self.push(
            OfflineKind::Division {
                x,
                divisor: Some(divisor),
            },
            dim,
        ))
    }

    pub fn elem_mul_then_div(
        &mut self,
        x: GateId,
        y: GateId,
        divisor: GateId,
    ) -> Result<GateId, CircuitError> {
        let dim = self.equal_dims(&[x, y])?;
        self.ensure_division_headroom()?;
        self.ensure_output(divisor)?;
        let divisor_dim = self.gate_dim(divisor)?;
        if divisor_dim != dim {
            return Err(CircuitError::DimensionMismatch {
                expected: dim,
                found: divisor_dim,
            });
        }
        Ok(self.push(
            OfflineKind::ElemMulThenDiv {
                x,
                y,
                divisor: Some(divisor),
            },
            dim,
        ))
    }

    pub fn elem_mul_then_div_const(
        &mut self,
        x: GateId,
        y: GateId,
    ) -> Result<GateId, CircuitError> {
        let dim = self.equal_dims(&[x, y])?;
        self.ensure_division_headroom()?;
        Ok(self.push(
            OfflineKind::ElemMulThenDiv {
                x,
                y,
                divisor: None,
            },
            dim,
        ))
    }

    pub fn dot_prod_then_div(
        &mut self,
        xs: &[GateId],
        ys: &[GateId],
        divisor: GateId,
    ) -> Result<GateId, CircuitError> {
        if xs.is_empty() || xs.len() != ys.len() {
            return Err(CircuitError::NotEnoughInputs {
                needed: 1,
                got: xs.len().min(ys.len()),
            });
        }
        self.ensure_division_headroom()?;
        self.ensure_output(divisor)?;
        let inner = self.gate_dim(xs[0])?;
        for &g in xs.iter().chain(ys) {
            let dim = self.gate_dim(g)?;
            if dim != inner {
                return Err(CircuitError::DimensionMismatch {
                    expected: inner,
                    found: dim,
                });
            }
        }
        let count = xs.len();
        Ok(self.push(
            OfflineKind::DotProdThenDiv {
                xs: xs.to_vec(),
                ys: ys.to_vec(),
                divisor,
            },
            count,
        ))
    }

    pub fn reduce_sum(&mut self, x: GateId) -> Result<GateId, CircuitError> {
        self.check_id(x)?;
        Ok(self.push(OfflineKind::Reduce { x }, 1))
    }

    /// The offline twin of the logarithm chain. The constant shift keeps its
    /// input's mask and writes nothing, so the tape traffic is the squaring
    /// triple followed by the division randomness.
    pub fn logarithm(&mut self, x: GateId) -> Result<GateId, CircuitError> {
        let shifted = self.add_constant(x)?;
        let squared = self.elem_wise_multiply(shifted, shifted)?;
        self.div(squared)
    }

    pub fn output(&mut self, x: GateId) -> Result<GateId, CircuitError> {
        let dim = self.gate_dim(x)?;
        Ok(self.push(OfflineKind::Output { x }, dim))
    }

    // ----------------------------------------------------------------- pass

    /// Walks the reachable gates in dependency order and appends each gate's
    /// randomness to the party tapes. Idempotent per gate.
    pub fn run_offline<W: Write, R: Rng>(
        &mut self,
        dealer: &mut Dealer<W>,
        rng: &mut R,
    ) -> Result<(), ProtocolError> {
        let roots: Vec<usize> = self.endpoints.iter().map(|id| id.0).collect();
        let order = dependency_order(self.gates.len(), &roots, |id| self.input_ids(id));
        info!(gates = order.len(), "manufacturing offline randomness");
        for id in order {
            if self.gates[id].done {
                continue;
            }
            self.run_gate(id, dealer, rng)?;
            self.gates[id].done = true;
        }
        dealer.flush()?;
        Ok(())
    }

    fn run_gate<W: Write, R: Rng>(
        &mut self,
        id: usize,
        dealer: &mut Dealer<W>,
        rng: &mut R,
    ) -> Result<(), ProtocolError> {
        let dim = self.gates[id].dim;
        match self.gates[id].kind.clone() {
            OfflineKind::Input => {
                let lambda = rand_vec::<F, _>(dim, rng);
                let rows = dealer.deal(&lambda, rng)?;
                self.set_lambda(id, lambda, rows);
            }
            OfflineKind::Add { xs } => {
                let mut lambda = self.gates[xs[0].0].lambda_clear.clone();
                let mut rows = self.gates[xs[0].0].lambda_rows.clone();
                for g in &xs[1..] {
                    lambda = add_vecs(&lambda, &self.gates[g.0].lambda_clear);
                    rows = add_rows(&rows, &self.gates[g.0].lambda_rows)?;
                }
                dealer.write_rows(&rows)?;
                self.set_lambda(id, lambda, rows);
            }
            OfflineKind::Subtract { x, y } => {
                let lambda = sub_vecs(
                    &self.gates[x.0].lambda_clear,
                    &self.gates[y.0].lambda_clear,
                );
                let rows = sub_rows(&self.gates[x.0].lambda_rows, &self.gates[y.0].lambda_rows)?;
                dealer.write_rows(&rows)?;
                self.set_lambda(id, lambda, rows);
            }
            OfflineKind::AddConstant { x } => {
                let lambda = self.gates[x.0].lambda_clear.clone();
                let rows = self.gates[x.0].lambda_rows.clone();
                self.set_lambda(id, lambda, rows);
            }
            OfflineKind::Scaling { x, factor } => {
                let lambda: Vec<F> = self.gates[x.0]
                    .lambda_clear
                    .iter()
                    .map(|v| *v * factor)
                    .collect();
                let rows: Vec<Vec<Share<F>>> = self.gates[x.0]
                    .lambda_rows
                    .iter()
                    .map(|row| row.iter().map(|s| s.clone() * factor).collect())
                    .collect();
                dealer.write_rows(&rows)?;
                self.set_lambda(id, lambda, rows);
            }
            OfflineKind::Combination { xs } => {
                let mut lambda = Vec::with_capacity(dim);
                let mut rows = vec![Vec::with_capacity(dim); self.params.n_parties];
                for g in &xs {
                    lambda.extend(self.gates[g.0].lambda_clear.iter().cloned());
                    for (row, src) in rows.iter_mut().zip(&self.gates[g.0].lambda_rows) {
                        row.extend(src.iter().cloned());
                    }
                }
                self.set_lambda(id, lambda, rows);
            }
            OfflineKind::ElemWiseMultiply { x, y }
            | OfflineKind::ElemWiseMulThenMulConst { x, y } => {
                let lambda = rand_vec::<F, _>(dim, rng);
                let rows = self.deal_beaver(dealer, rng, x, y, dim, BeaverC::PerDim, Some(&lambda))?;
                self.set_lambda(id, lambda, rows);
            }
            OfflineKind::DotProduct { x, y } => {
                let lambda = rand_vec::<F, _>(1, rng);
                let inner = self.gates[x.0].dim;
                let rows =
                    self.deal_beaver(dealer, rng, x, y, inner, BeaverC::InnerProduct, Some(&lambda))?;
                self.set_lambda(id, lambda, rows);
            }
            OfflineKind::DotProdWithFilter { x, y } => {
                let lambda = rand_vec::<F, _>(1, rng);
                let inner = self.gates[x.0].dim;
                let rows = self.deal_beaver(dealer, rng, x, y, inner, BeaverC::PerDim, Some(&lambda))?;
                self.set_lambda(id, lambda, rows);
            }
            OfflineKind::Division { .. } => {
                let (lambda, rows) = self.deal_division(dealer, rng, dim)?;
                self.set_lambda(id, lambda, rows);
            }
            OfflineKind::ElemMulThenDiv { x, y, .. } => {
                self.deal_beaver(dealer, rng, x, y, dim, BeaverC::PerDim, None)?;
                let (lambda, rows) = self.deal_division(dealer, rng, dim)?;
                self.set_lambda(id, lambda, rows);
            }
            OfflineKind::DotProdThenDiv { xs, ys, .. } => {
                let inner = self.gates[xs[0].0].dim;
                for (&gx, &gy) in xs.iter().zip(&ys) {
                    self.deal_beaver(dealer, rng, gx, gy, inner, BeaverC::PerDim, None)?;
                }
                let (lambda, rows) = self.deal_division(dealer, rng, dim)?;
                self.set_lambda(id, lambda, rows);
            }
            OfflineKind::Reduce { x } => {
                let lambda = vec![self.gates[x.0]
                    .lambda_clear
                    .iter()
                    .fold(F::zero(), |acc, v| acc + *v)];
                let rows = self.gates[x.0]
                    .lambda_rows
                    .iter()
                    .map(|row| {
                        let mut sum: Option<Share<F>> = None;
                        for share in row {
                            sum = Some(match sum {
                                None => share.clone(),
                                Some(acc) => (acc + share.clone())?,
                            });
                        }
                        Ok(match sum {
                            Some(sum) => vec![sum],
                            None => vec![],
                        })
                    })
                    .collect::<Result<Vec<_>, ShareError>>()?;
                self.set_lambda(id, lambda, rows);
            }
            OfflineKind::Output { .. } => {}
        }
        Ok(())
    }

    /// Deals one multiplication's randomness in read order: `a`, `b`, `c`,
    /// the fresh output mask if any, then the opened `delta_x`, `delta_y`.
    fn deal_beaver<W: Write, R: Rng>(
        &mut self,
        dealer: &mut Dealer<W>,
        rng: &mut R,
        x: GateId,
        y: GateId,
        dim: usize,
        c_shape: BeaverC,
        lambda: Option<&[F]>,
    ) -> Result<Vec<Vec<Share<F>>>, ProtocolError> {
        let a = rand_vec::<F, _>(dim, rng);
        let b = rand_vec::<F, _>(dim, rng);
        let c: Vec<F> = match c_shape {
            BeaverC::PerDim => a.iter().zip(&b).map(|(a, b)| *a * *b).collect(),
            BeaverC::InnerProduct => {
                vec![a.iter().zip(&b).fold(F::zero(), |acc, (a, b)| acc + *a * *b)]
            }
        };
        dealer.deal(&a, rng)?;
        dealer.deal(&b, rng)?;
        dealer.deal(&c, rng)?;
        let lambda_rows = match lambda {
            Some(lambda) => dealer.deal(lambda, rng)?,
            None => Vec::new(),
        };
        let delta_x = sub_vecs(&a, &self.gates[x.0].lambda_clear);
        let delta_y = sub_vecs(&b, &self.gates[y.0].lambda_clear);
        dealer.write_clear_all(&delta_x)?;
        dealer.write_clear_all(&delta_y)?;
        Ok(lambda_rows)
    }

    /// Deals `r`, `r1`, `r2`; `r1` becomes the gate's output mask.
    ///
    /// The bit bounds carry the protocol's correctness: with `r < 2^l` and
    /// `r2 < 2^sigma`, the blinding term `r*d + r2` stays below `2^(l+sigma)`
    /// for every divisor `d < 2^l` (given `sigma >= l`), so the opened `z`
    /// floors to exactly `r1 + x/d`. `r1 < 2^(e+sigma)` statistically hides
    /// any quotient below `2^e` and is what the `e + 2(l+sigma) < bits(P)`
    /// headroom requirement accounts for.
    fn deal_division<W: Write, R: Rng>(
        &mut self,
        dealer: &mut Dealer<W>,
        rng: &mut R,
        dim: usize,
    ) -> Result<(Vec<F>, Vec<Vec<Share<F>>>), ProtocolError> {
        let div = self.params.div;
        let r = rand_bits_vec::<F, _>(dim, div.l, rng);
        let r1 = rand_bits_vec::<F, _>(dim, div.e + div.sigma, rng);
        let r2 = rand_bits_vec::<F, _>(dim, div.sigma, rng);
        dealer.deal(&r, rng)?;
        let r1_rows = dealer.deal(&r1, rng)?;
        dealer.deal(&r2, rng)?;
        Ok((r1, r1_rows))
    }

    // -------------------------------------------------------------- internal

    fn input_ids(&self, id: usize) -> Vec<usize> {
        match &self.gates[id].kind {
            OfflineKind::Input => vec![],
            OfflineKind::Add { xs } | OfflineKind::Combination { xs } => {
                xs.iter().map(|g| g.0).collect()
            }
            OfflineKind::Subtract { x, y }
            | OfflineKind::ElemWiseMultiply { x, y }
            | OfflineKind::ElemWiseMulThenMulConst { x, y }
            | OfflineKind::DotProduct { x, y }
            | OfflineKind::DotProdWithFilter { x, y } => vec![x.0, y.0],
            OfflineKind::AddConstant { x }
            | OfflineKind::Scaling { x, .. }
            | OfflineKind::Reduce { x }
            | OfflineKind::Output { x } => vec![x.0],
            OfflineKind::Division { x, divisor } => {
                let mut ids = vec![x.0];
                if let Some(g) = divisor {
                    ids.push(g.0);
                }
                ids
            }
            OfflineKind::ElemMulThenDiv { x, y, divisor } => {
                let mut ids = vec![x.0, y.0];
                if let Some(g) = divisor {
                    ids.push(g.0);
                }
                ids
            }
            OfflineKind::DotProdThenDiv { xs, ys, divisor } => xs
                .iter()
                .chain(ys)
                .map(|g| g.0)
                .chain([divisor.0])
                .collect(),
        }
    }

    fn set_lambda(&mut self, id: usize, lambda_clear: Vec<F>, lambda_rows: Vec<Vec<Share<F>>>) {
        self.gates[id].lambda_clear = lambda_clear;
        self.gates[id].lambda_rows = lambda_rows;
    }

    fn push(&mut self, kind: OfflineKind<F>, dim: usize) -> GateId {
        let id = GateId(self.gates.len());
        self.gates.push(OfflineGateNode {
            kind,
            dim,
            done: false,
            lambda_clear: Vec::new(),
            lambda_rows: Vec::new(),
        });
        id
    }

    fn check_id(&self, id: GateId) -> Result<(), CircuitError> {
        if id.0 >= self.gates.len() {
            return Err(CircuitError::UnknownGate(id));
        }
        Ok(())
    }

    fn equal_dims(&self, xs: &[GateId]) -> Result<usize, CircuitError> {
        if xs.is_empty() {
            return Err(CircuitError::NotEnoughInputs { needed: 1, got: 0 });
        }
        let dim = self.gate_dim(xs[0])?;
        for &x in &xs[1..] {
            let other = self.gate_dim(x)?;
            if other != dim {
                return Err(CircuitError::DimensionMismatch {
                    expected: dim,
                    found: other,
                });
            }
        }
        Ok(dim)
    }

    fn ensure_output(&self, id: GateId) -> Result<(), CircuitError> {
        self.check_id(id)?;
        match self.gates[id.0].kind {
            OfflineKind::Output { .. } => Ok(()),
            _ => Err(CircuitError::NotAnOutput(id)),
        }
    }

    fn ensure_division_headroom(&self) -> Result<(), CircuitError> {
        if !self.params.div.fits_modulus::<F>() {
            return Err(CircuitError::InsecureDivision {
                required: self.params.div.required_bits(),
                modulus_bits: F::MODULUS_BIT_SIZE,
            });
        }
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum BeaverC {
    /// One `c = a_i * b_i` per dimension.
    PerDim,
    /// A single `c = <a, b>`.
    InnerProduct,
}

fn rand_vec<F: PrimeField, R: Rng>(dim: usize, rng: &mut R) -> Vec<F> {
    (0..dim).map(|_| F::rand(rng)).collect()
}

fn rand_bits_vec<F: PrimeField, R: Rng>(dim: usize, bits: u32, rng: &mut R) -> Vec<F> {
    (0..dim)
        .map(|_| F::from(rng.gen_biguint(u64::from(bits))))
        .collect()
}

fn add_vecs<F: PrimeField>(x: &[F], y: &[F]) -> Vec<F> {
    x.iter().zip(y).map(|(a, b)| *a + *b).collect()
}

fn sub_vecs<F: PrimeField>(x: &[F], y: &[F]) -> Vec<F> {
    x.iter().zip(y).map(|(a, b)| *a - *b).collect()
}

fn add_rows<F: PrimeField>(
    x: &[Vec<Share<F>>],
    y: &[Vec<Share<F>>],
) -> Result<Vec<Vec<Share<F>>>, ShareError> {
    x.iter()
        .zip(y)
        .map(|(rx, ry)| {
            rx.iter()
                .zip(ry)
                .map(|(a, b)| a.clone() + b.clone())
                .collect()
        })
        .collect()
}

fn sub_rows<F: PrimeField>(
    x: &[Vec<Share<F>>],
    y: &[Vec<Share<F>>],
) -> Result<Vec<Vec<Share<F>>>, ShareError> {
    x.iter()
        .zip(y)
        .map(|(rx, ry)| {
            rx.iter()
                .zip(ry)
                .map(|(a, b)| a.clone() - b.clone())
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_bls12_381::Fr;
    use ark_std::test_rng;

    fn params() -> ProtocolParams {
        ProtocolParams::new(4, 3)
    }

    fn dealer() -> Dealer<Vec<u8>> {
        Dealer::from_writers(&params(), vec![Vec::new(); 4]).unwrap()
    }

    #[test]
    fn addition_masks_are_the_sum_of_the_input_masks() {
        let mut circuit: OfflineCircuit<Fr> = OfflineCircuit::new(params());
        let a = circuit.input(2);
        let b = circuit.input(2);
        let sum = circuit.add(&[a, b]).unwrap();
        circuit.add_endpoint(sum).unwrap();

        let mut dealer = dealer();
        let mut rng = test_rng();
        circuit.run_offline(&mut dealer, &mut rng).unwrap();

        let expected = add_vecs(
            &circuit.gates[a.0].lambda_clear,
            &circuit.gates[b.0].lambda_clear,
        );
        assert_eq!(circuit.gates[sum.0].lambda_clear, expected);

        // The written shares reconstruct the same mask.
        let sharing = ThresholdSharing::new(4, 3).unwrap();
        for dim in 0..2 {
            let column: Vec<_> = circuit.gates[sum.0]
                .lambda_rows
                .iter()
                .map(|row| row[dim].clone())
                .collect();
            assert_eq!(sharing.recover(&column).unwrap(), expected[dim]);
        }
        // Two inputs and the sum: six share lines per party.
        assert_eq!(dealer.lines_written(), vec![6; 4]);
    }

    #[test]
    fn multiplication_gates_write_triples_masks_and_deltas() {
        let mut circuit: OfflineCircuit<Fr> = OfflineCircuit::new(params());
        let a = circuit.input(3);
        let b = circuit.input(3);
        let product = circuit.elem_wise_multiply(a, b).unwrap();
        circuit.add_endpoint(product).unwrap();

        let mut dealer = dealer();
        let mut rng = test_rng();
        circuit.run_offline(&mut dealer, &mut rng).unwrap();

        // Per party: 3 + 3 input masks, then a, b, c, lambda shares and the
        // two opened delta vectors of the product.
        assert_eq!(dealer.lines_written(), vec![6 + 6 * 3; 4]);
    }

    #[test]
    fn gates_shared_between_endpoints_are_dealt_once() {
        let mut circuit: OfflineCircuit<Fr> = OfflineCircuit::new(params());
        let a = circuit.input(1);
        let doubled = circuit.scaling(a, Fr::from(2u64)).unwrap();
        let out1 = circuit.output(doubled).unwrap();
        let out2 = circuit.output(doubled).unwrap();
        circuit.add_endpoint(out1).unwrap();
        circuit.add_endpoint(out2).unwrap();

        let mut dealer = dealer();
        let mut rng = test_rng();
        circuit.run_offline(&mut dealer, &mut rng).unwrap();

        // One input mask and one scaled mask, despite two consumers.
        assert_eq!(dealer.lines_written(), vec![2; 4]);
    }
}
