//! The online circuit: a DAG of gates over masked values.
//!
//! Every gate output is a pair of parallel vectors: this party's shares of a
//! secret random mask `lambda`, and the public masked value
//! `Delta = x + lambda`. Gates are arena slots referenced by index; a gate is
//! wired once at construction and never restructured afterwards, while its
//! evaluation state (`Built -> RandomnessRead -> Evaluated`) advances only
//! under the pass driver. Both passes walk the DAG depth-first from the
//! declared endpoints, so a gate shared by several endpoints reads its tape
//! and performs its opening exactly once per pass.
//!
//! Multiplication gates follow the masked Beaver protocol: with a
//! precomputed triple `(a, b, c = a*b)` and the offline-opened deltas
//! `dx = a - lambda_x`, `dy = b - lambda_y`, each party computes the public
//! `temp_x = Delta_x + dx = x + a` and `temp_y = Delta_y + dy = y + b`, forms
//! its share of `Delta_z = c + lambda_z - a*temp_y - b*temp_x`, opens it
//! through the coordinator, and the coordinator folds in the public cross
//! term `temp_x * temp_y` before broadcasting. Division gates shift the
//! dividend by `2^(l+sigma)`, blind it with `h = (r + r1*2^(l+sigma))*d` and
//! `r2`, open the result and divide in the clear; `r1` doubles as the gate's
//! fresh output mask.

use crate::algebra::{self, ClearVec, ShareVec};
use crate::dag::dependency_order;
use crate::params::ProtocolParams;
use crate::party::{PartyNode, ProtocolError};
use crate::share::Share;
use crate::transport::StarTransport;
use ark_ff::{BigInteger, PrimeField, Zero};
use itertools::izip;
use num_bigint::BigUint;
use std::io::BufRead;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum CircuitError {
    #[error("input dimensions don't match: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("gate requires at least {needed} inputs, got {got}")]
    NotEnoughInputs { needed: usize, got: usize },
    #[error("divisor of {bits} bits exceeds the {limit}-bit protocol limit")]
    DivisorTooWide { bits: u64, limit: u32 },
    #[error("divisor must be non-zero")]
    ZeroDivisor,
    #[error("gate {0:?} is not an output gate")]
    NotAnOutput(GateId),
    #[error("gate {0:?} is not an input gate")]
    NotAnInput(GateId),
    #[error("gate {0:?} has not been evaluated")]
    NotEvaluated(GateId),
    #[error("gate {0:?} does not belong to this circuit")]
    UnknownGate(GateId),
    #[error(
        "division parameters need {required} bits but the field modulus has {modulus_bits}"
    )]
    InsecureDivision { required: u32, modulus_bits: u32 },
    #[error("invalid protocol parameters: {0}")]
    Params(#[from] crate::params::ParamsError),
}

/// Handle to a gate inside its owning circuit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GateId(pub(crate) usize);

#[derive(Clone, Debug)]
pub(crate) enum DivisorSource<F: PrimeField> {
    /// Divisors fixed at construction time, already range-checked.
    Constants(Vec<F>),
    /// The opened value of an output gate; its first element is replicated
    /// to fill the dividend's dimension.
    Gate(GateId),
}

#[derive(Clone, Debug)]
enum GateKind<F: PrimeField> {
    Input {
        secrets: Option<ShareVec<F>>,
    },
    Add {
        xs: Vec<GateId>,
    },
    Subtract {
        x: GateId,
        y: GateId,
    },
    AddConstant {
        x: GateId,
        constants: Vec<F>,
    },
    Scaling {
        x: GateId,
        factor: F,
    },
    Combination {
        xs: Vec<GateId>,
    },
    ElemWiseMultiply {
        x: GateId,
        y: GateId,
    },
    ElemWiseMulThenMulConst {
        x: GateId,
        y: GateId,
        constants: Vec<F>,
    },
    DotProduct {
        x: GateId,
        y: GateId,
    },
    DotProdWithFilter {
        x: GateId,
        y: GateId,
    },
    Division {
        x: GateId,
        divisor: DivisorSource<F>,
    },
    ElemMulThenDiv {
        x: GateId,
        y: GateId,
        divisor: DivisorSource<F>,
    },
    DotProdThenDiv {
        xs: Vec<GateId>,
        ys: Vec<GateId>,
        divisor: GateId,
        scaling: Option<F>,
    },
    Reduce {
        x: GateId,
        filter: Option<Vec<bool>>,
    },
    Output {
        x: GateId,
    },
}

/// One multiplication's worth of offline randomness.
#[derive(Clone, Debug)]
struct BeaverRand<F: PrimeField> {
    a: ShareVec<F>,
    b: ShareVec<F>,
    c: ShareVec<F>,
    delta_x: ClearVec<F>,
    delta_y: ClearVec<F>,
}

/// One division's worth of offline randomness; `r1` is also the output mask.
#[derive(Clone, Debug)]
struct DivRand<F: PrimeField> {
    r: ShareVec<F>,
    r1: ShareVec<F>,
    r2: ShareVec<F>,
}

#[derive(Clone, Debug)]
enum GateRand<F: PrimeField> {
    Beaver(BeaverRand<F>),
    Div(DivRand<F>),
    MulDiv(BeaverRand<F>, DivRand<F>),
    DotBatch(Vec<BeaverRand<F>>, DivRand<F>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum GateState {
    Built,
    RandomnessRead,
    Evaluated,
}

#[derive(Debug)]
struct GateNode<F: PrimeField> {
    kind: GateKind<F>,
    dim: usize,
    state: GateState,
    lambda: ShareVec<F>,
    delta: ClearVec<F>,
    rand: Option<GateRand<F>>,
    /// Reconstructed cleartext, output gates only.
    opened: Option<ClearVec<F>>,
    /// Display name, output gates only.
    name: String,
}

/// Builder and pass driver for one party's view of the circuit.
pub struct Circuit<F: PrimeField> {
    params: ProtocolParams,
    gates: Vec<GateNode<F>>,
    endpoints: Vec<GateId>,
    outputs: Vec<GateId>,
}

impl<F: PrimeField> Circuit<F> {
    pub fn new(params: ProtocolParams) -> Self {
        Self {
            params,
            gates: Vec::new(),
            endpoints: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn params(&self) -> &ProtocolParams {
        &self.params
    }

    pub fn num_gates(&self) -> usize {
        self.gates.len()
    }

    pub fn gate_dim(&self, id: GateId) -> Result<usize, CircuitError> {
        self.check_id(id)?;
        Ok(self.gates[id.0].dim)
    }

    /// Marks a gate whose evaluation must be forced by the passes.
    pub fn add_endpoint(&mut self, id: GateId) -> Result<(), CircuitError> {
        self.check_id(id)?;
        self.endpoints.push(id);
        Ok(())
    }

    // ---------------------------------------------------------------- builder

    pub fn input(&mut self, dim: usize) -> GateId {
        self.push(GateKind::Input { secrets: None }, dim)
    }

    /// Assigns this party's shares of the input value; null positions mark
    /// dimensions for which no data exists.
    pub fn assign_input(&mut self, id: GateId, secrets: ShareVec<F>) -> Result<(), CircuitError> {
        self.check_id(id)?;
        let dim = self.gates[id.0].dim;
        if secrets.len() != dim {
            return Err(CircuitError::DimensionMismatch {
                expected: dim,
                found: secrets.len(),
            });
        }
        match &mut self.gates[id.0].kind {
            GateKind::Input { secrets: slot } => {
                *slot = Some(secrets);
                Ok(())
            }
            _ => Err(CircuitError::NotAnInput(id)),
        }
    }

    pub fn add(&mut self, xs: &[GateId]) -> Result<GateId, CircuitError> {
        let dim = self.equal_dims(xs)?;
        Ok(self.push(GateKind::Add { xs: xs.to_vec() }, dim))
    }

    pub fn subtract(&mut self, x: GateId, y: GateId) -> Result<GateId, CircuitError> {
        let dim = self.equal_dims(&[x, y])?;
        Ok(self.push(GateKind::Subtract { x, y }, dim))
    }

    pub fn add_constant(&mut self, x: GateId, constants: Vec<F>) -> Result<GateId, CircuitError> {
        let dim = self.gate_dim(x)?;
        if constants.len() != dim {
            return Err(CircuitError::DimensionMismatch {
                expected: dim,
                found: constants.len(),
            });
        }
        Ok(self.push(GateKind::AddConstant { x, constants }, dim))
    }

    pub fn scaling(&mut self, x: GateId, factor: F) -> Result<GateId, CircuitError> {
        let dim = self.gate_dim(x)?;
        Ok(self.push(GateKind::Scaling { x, factor }, dim))
    }

    pub fn combination(&mut self, xs: &[GateId]) -> Result<GateId, CircuitError> {
        if xs.is_empty() {
            return Err(CircuitError::NotEnoughInputs { needed: 1, got: 0 });
        }
        let mut dim = 0;
        for &x in xs {
            dim += self.gate_dim(x)?;
        }
        Ok(self.push(GateKind::Combination { xs: xs.to_vec() }, dim))
    }

    pub fn elem_wise_multiply(&mut self, x: GateId, y: GateId) -> Result<GateId, CircuitError> {
        let dim = self.equal_dims(&[x, y])?;
        Ok(self.push(GateKind::ElemWiseMultiply { x, y }, dim))
    }

    pub fn elem_wise_mul_then_mul_const(
        &mut self,
        x: GateId,
        y: GateId,
        constants: Vec<F>,
    ) -> Result<GateId, CircuitError> {
        let dim = self.equal_dims(&[x, y])?;
        if constants.len() != dim {
            return Err(CircuitError::DimensionMismatch {
                expected: dim,
                found: constants.len(),
            });
        }
        Ok(self.push(GateKind::ElemWiseMulThenMulConst { x, y, constants }, dim))
    }

    pub fn dot_product(&mut self, x: GateId, y: GateId) -> Result<GateId, CircuitError> {
        self.equal_dims(&[x, y])?;
        Ok(self.push(GateKind::DotProduct { x, y }, 1))
    }

    /// Dot product that excludes every dimension where either input's masked
    /// value is null, instead of poisoning the whole sum.
    pub fn dot_prod_with_filter(&mut self, x: GateId, y: GateId) -> Result<GateId, CircuitError> {
        self.equal_dims(&[x, y])?;
        Ok(self.push(GateKind::DotProdWithFilter { x, y }, 1))
    }

    /// Divides by compile-time constants, each strictly below `2^l`.
    pub fn div(&mut self, x: GateId, divisors: Vec<F>) -> Result<GateId, CircuitError> {
        let dim = self.gate_dim(x)?;
        self.ensure_division_headroom()?;
        if divisors.len() != dim {
            return Err(CircuitError::DimensionMismatch {
                expected: dim,
                found: divisors.len(),
            });
        }
        for d in &divisors {
            Self::check_divisor(d, self.params.div.l)?;
        }
        Ok(self.push(
            GateKind::Division {
                x,
                divisor: DivisorSource::Constants(divisors),
            },
            dim,
        ))
    }

    /// Divides by the opened value of an output gate. The divisor's range is
    /// only known at run time, so the `2^l` bound is checked there.
    pub fn div_by_gate(&mut self, x: GateId, divisor: GateId) -> Result<GateId, CircuitError> {
        let dim = self.gate_dim(x)?;
        self.ensure_division_headroom()?;
        self.ensure_output(divisor)?;
        Ok(self.push(
            GateKind::Division {
                x,
                divisor: DivisorSource::Gate(divisor),
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
            GateKind::ElemMulThenDiv {
                x,
                y,
                divisor: DivisorSource::Gate(divisor),
            },
            dim,
        ))
    }

    pub fn elem_mul_then_div_const(
        &mut self,
        x: GateId,
        y: GateId,
        divisors: Vec<F>,
    ) -> Result<GateId, CircuitError> {
        let dim = self.equal_dims(&[x, y])?;
        self.ensure_division_headroom()?;
        if divisors.len() != dim {
            return Err(CircuitError::DimensionMismatch {
                expected: dim,
                found: divisors.len(),
            });
        }
        for d in &divisors {
            Self::check_divisor(d, self.params.div.l)?;
        }
        Ok(self.push(
            GateKind::ElemMulThenDiv {
                x,
                y,
                divisor: DivisorSource::Constants(divisors),
            },
            dim,
        ))
    }

    /// A batch of dot products (`xs[k] . ys[k]`, one output dimension per
    /// pair, null dimensions excluded per pair) followed by division of every
    /// result by the opened value of `divisor`.
    pub fn dot_prod_then_div(
        &mut self,
        xs: &[GateId],
        ys: &[GateId],
        divisor: GateId,
        scaling: Option<F>,
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
            GateKind::DotProdThenDiv {
                xs: xs.to_vec(),
                ys: ys.to_vec(),
                divisor,
                scaling,
            },
            count,
        ))
    }

    /// Sums the input across all dimensions, skipping null dimensions and,
    /// if a filter is given, the dimensions it excludes. An empty sum is the
    /// additive identity.
    pub fn reduce_sum(
        &mut self,
        x: GateId,
        filter: Option<Vec<bool>>,
    ) -> Result<GateId, CircuitError> {
        let dim = self.gate_dim(x)?;
        if let Some(filter) = &filter {
            if filter.len() != dim {
                return Err(CircuitError::DimensionMismatch {
                    expected: dim,
                    found: filter.len(),
                });
            }
        }
        Ok(self.push(GateKind::Reduce { x, filter }, 1))
    }

    /// The fixed logarithm sub-circuit: shift by `-10^k`, square, divide by
    /// `10^(k-1)`, with `k` taken from the protocol parameters. Returns the
    /// terminal gate of the chain.
    pub fn logarithm(&mut self, x: GateId) -> Result<GateId, CircuitError> {
        let dim = self.gate_dim(x)?;
        self.params.validate()?;
        let k = self.params.log_scale_exp;
        let shift = -pow10::<F>(k);
        let shifted = self.add_constant(x, vec![shift; dim])?;
        let squared = self.elem_wise_multiply(shifted, shifted)?;
        self.div(squared, vec![pow10::<F>(k - 1); dim])
    }

    pub fn output(&mut self, x: GateId) -> Result<GateId, CircuitError> {
        let dim = self.gate_dim(x)?;
        let id = self.push(GateKind::Output { x }, dim);
        self.outputs.push(id);
        Ok(id)
    }

    pub fn set_output_name(
        &mut self,
        id: GateId,
        name: impl Into<String>,
    ) -> Result<(), CircuitError> {
        self.check_id(id)?;
        match self.gates[id.0].kind {
            GateKind::Output { .. } => {
                self.gates[id.0].name = name.into();
                Ok(())
            }
            _ => Err(CircuitError::NotAnOutput(id)),
        }
    }

    // ------------------------------------------------------------- accessors

    /// The reconstructed cleartext of an evaluated output gate.
    pub fn opened_values(&self, id: GateId) -> Result<&ClearVec<F>, CircuitError> {
        self.check_id(id)?;
        match self.gates[id.0].kind {
            GateKind::Output { .. } => self.gates[id.0]
                .opened
                .as_ref()
                .ok_or(CircuitError::NotEvaluated(id)),
            _ => Err(CircuitError::NotAnOutput(id)),
        }
    }

    /// Name/value pairs of every evaluated output gate, in creation order.
    pub fn output_values(&self) -> Result<Vec<(String, ClearVec<F>)>, CircuitError> {
        self.outputs
            .iter()
            .map(|&id| {
                let values = self.opened_values(id)?.clone();
                Ok((self.gates[id.0].name.clone(), values))
            })
            .collect()
    }

    // ----------------------------------------------------------- pass driver

    /// Reads this party's offline randomness for every gate reachable from
    /// the endpoints, in dependency order. Idempotent per gate.
    pub fn read_offline<T, R>(&mut self, node: &mut PartyNode<T, R>) -> Result<(), ProtocolError>
    where
        T: StarTransport,
        R: BufRead,
    {
        let order = self.evaluation_order();
        info!(
            party = node.id,
            gates = order.len(),
            "reading offline randomness"
        );
        for id in order {
            if self.gates[id].state != GateState::Built {
                continue;
            }
            self.read_gate(id, node)?;
            self.gates[id].state = GateState::RandomnessRead;
        }
        Ok(())
    }

    /// Evaluates every gate reachable from the endpoints, in dependency
    /// order, opening intermediate values through the coordinator whenever a
    /// gate's protocol requires it. Idempotent per gate.
    pub async fn run_online<T, R>(&mut self, node: &mut PartyNode<T, R>) -> Result<(), ProtocolError>
    where
        T: StarTransport,
        R: BufRead + Send,
    {
        let order = self.evaluation_order();
        info!(party = node.id, gates = order.len(), "running online phase");
        for id in order {
            match self.gates[id].state {
                GateState::Evaluated => continue,
                GateState::Built => return Err(ProtocolError::MissingRandomness),
                GateState::RandomnessRead => {}
            }
            self.step_online(id, node).await?;
            self.gates[id].state = GateState::Evaluated;
        }
        Ok(())
    }

    fn evaluation_order(&self) -> Vec<usize> {
        let roots: Vec<usize> = self.endpoints.iter().map(|id| id.0).collect();
        dependency_order(self.gates.len(), &roots, |id| self.input_ids(id))
    }

    fn input_ids(&self, id: usize) -> Vec<usize> {
        match &self.gates[id].kind {
            GateKind::Input { .. } => vec![],
            GateKind::Add { xs } | GateKind::Combination { xs } => {
                xs.iter().map(|g| g.0).collect()
            }
            GateKind::Subtract { x, y }
            | GateKind::ElemWiseMultiply { x, y }
            | GateKind::ElemWiseMulThenMulConst { x, y, .. }
            | GateKind::DotProduct { x, y }
            | GateKind::DotProdWithFilter { x, y } => vec![x.0, y.0],
            GateKind::AddConstant { x, .. }
            | GateKind::Scaling { x, .. }
            | GateKind::Reduce { x, .. }
            | GateKind::Output { x } => vec![x.0],
            GateKind::Division { x, divisor } => {
                let mut ids = vec![x.0];
                if let DivisorSource::Gate(g) = divisor {
                    ids.push(g.0);
                }
                ids
            }
            GateKind::ElemMulThenDiv { x, y, divisor } => {
                let mut ids = vec![x.0, y.0];
                if let DivisorSource::Gate(g) = divisor {
                    ids.push(g.0);
                }
                ids
            }
            GateKind::DotProdThenDiv {
                xs, ys, divisor, ..
            } => xs
                .iter()
                .chain(ys)
                .map(|g| g.0)
                .chain([divisor.0])
                .collect(),
        }
    }

    // ------------------------------------------------------------- read pass

    fn read_gate<T, R>(&mut self, id: usize, node: &mut PartyNode<T, R>) -> Result<(), ProtocolError>
    where
        T: StarTransport,
        R: BufRead,
    {
        let dim = self.gates[id].dim;
        match self.gates[id].kind.clone() {
            GateKind::Input { .. }
            | GateKind::Add { .. }
            | GateKind::Subtract { .. }
            | GateKind::Scaling { .. } => {
                self.gates[id].lambda = node.read_mask_shares(dim)?;
            }
            GateKind::AddConstant { .. }
            | GateKind::Combination { .. }
            | GateKind::Reduce { .. }
            | GateKind::Output { .. } => {}
            GateKind::ElemWiseMultiply { .. } | GateKind::ElemWiseMulThenMulConst { .. } => {
                let beaver = Self::read_beaver(node, dim, dim)?;
                self.gates[id].lambda = node.read_mask_shares(dim)?;
                let beaver = Self::finish_beaver(node, beaver, dim)?;
                self.gates[id].rand = Some(GateRand::Beaver(beaver));
            }
            GateKind::DotProduct { x, .. } | GateKind::DotProdWithFilter { x, .. } => {
                let inner = self.gates[x.0].dim;
                // The plain dot product's `c` is the full inner product; the
                // filtered variant keeps one `c` per dimension so excluded
                // positions can be dropped from the sum online.
                let c_len = if matches!(self.gates[id].kind, GateKind::DotProduct { .. }) {
                    1
                } else {
                    inner
                };
                let beaver = Self::read_beaver(node, inner, c_len)?;
                self.gates[id].lambda = node.read_mask_shares(1)?;
                let beaver = Self::finish_beaver(node, beaver, inner)?;
                self.gates[id].rand = Some(GateRand::Beaver(beaver));
            }
            GateKind::Division { .. } => {
                self.gates[id].rand = Some(GateRand::Div(Self::read_div(node, dim)?));
            }
            GateKind::ElemMulThenDiv { .. } => {
                let beaver = Self::read_beaver(node, dim, dim)?;
                let beaver = Self::finish_beaver(node, beaver, dim)?;
                let div = Self::read_div(node, dim)?;
                self.gates[id].rand = Some(GateRand::MulDiv(beaver, div));
            }
            GateKind::DotProdThenDiv { xs, .. } => {
                let inner = self.gates[xs[0].0].dim;
                let mut per_product = Vec::with_capacity(xs.len());
                for _ in 0..xs.len() {
                    let beaver = Self::read_beaver(node, inner, inner)?;
                    per_product.push(Self::finish_beaver(node, beaver, inner)?);
                }
                let div = Self::read_div(node, dim)?;
                self.gates[id].rand = Some(GateRand::DotBatch(per_product, div));
            }
        }
        Ok(())
    }

    /// Reads the `a`, `b`, `c` triples of one multiplication.
    fn read_beaver<T, R>(
        node: &mut PartyNode<T, R>,
        dim: usize,
        c_len: usize,
    ) -> Result<BeaverRand<F>, ProtocolError>
    where
        T: StarTransport,
        R: BufRead,
    {
        Ok(BeaverRand {
            a: node.read_mask_shares(dim)?,
            b: node.read_mask_shares(dim)?,
            c: node.read_mask_shares(c_len)?,
            delta_x: Vec::new(),
            delta_y: Vec::new(),
        })
    }

    /// Reads the opened `delta_x`, `delta_y` that follow a triple.
    fn finish_beaver<T, R>(
        node: &mut PartyNode<T, R>,
        mut beaver: BeaverRand<F>,
        dim: usize,
    ) -> Result<BeaverRand<F>, ProtocolError>
    where
        T: StarTransport,
        R: BufRead,
    {
        beaver.delta_x = node.read_clear(dim)?;
        beaver.delta_y = node.read_clear(dim)?;
        Ok(beaver)
    }

    fn read_div<T, R>(node: &mut PartyNode<T, R>, dim: usize) -> Result<DivRand<F>, ProtocolError>
    where
        T: StarTransport,
        R: BufRead,
    {
        Ok(DivRand {
            r: node.read_mask_shares(dim)?,
            r1: node.read_mask_shares(dim)?,
            r2: node.read_mask_shares(dim)?,
        })
    }

    // ----------------------------------------------------------- online pass

    async fn step_online<T, R>(
        &mut self,
        id: usize,
        node: &mut PartyNode<T, R>,
    ) -> Result<(), ProtocolError>
    where
        T: StarTransport,
        R: BufRead + Send,
    {
        let kind = self.gates[id].kind.clone();
        let rand = self.gates[id].rand.take();

        match kind {
            GateKind::Input { secrets } => {
                let secrets = secrets.ok_or(ProtocolError::MissingInput)?;
                let lambda = self.gates[id].lambda.clone();
                let masked = algebra::add_shares(&secrets, &lambda)?;
                let delta = node.open(&masked, None).await?;
                self.gates[id].delta = delta;
            }
            GateKind::Add { xs } => {
                let mut delta = self.gates[xs[0].0].delta.clone();
                for g in &xs[1..] {
                    delta = algebra::add_clear(&delta, &self.gates[g.0].delta)?;
                }
                self.gates[id].delta = delta;
            }
            GateKind::Subtract { x, y } => {
                self.gates[id].delta =
                    algebra::sub_clear(&self.gates[x.0].delta, &self.gates[y.0].delta)?;
            }
            GateKind::AddConstant { x, constants } => {
                let constants: ClearVec<F> = constants.into_iter().map(Some).collect();
                self.gates[id].lambda = self.gates[x.0].lambda.clone();
                self.gates[id].delta = algebra::add_clear(&self.gates[x.0].delta, &constants)?;
            }
            GateKind::Scaling { x, factor } => {
                self.gates[id].delta = algebra::scale_clear(&self.gates[x.0].delta, factor);
            }
            GateKind::Combination { xs } => {
                let mut lambda = Vec::with_capacity(self.gates[id].dim);
                let mut delta = Vec::with_capacity(self.gates[id].dim);
                for g in &xs {
                    lambda.extend(self.gates[g.0].lambda.iter().cloned());
                    delta.extend(self.gates[g.0].delta.iter().cloned());
                }
                self.gates[id].lambda = lambda;
                self.gates[id].delta = delta;
            }
            GateKind::ElemWiseMultiply { x, y } => {
                let beaver = expect_beaver(rand)?;
                let temp_x = algebra::add_clear(&self.gates[x.0].delta, &beaver.delta_x)?;
                let temp_y = algebra::add_clear(&self.gates[y.0].delta, &beaver.delta_y)?;
                let temp_xy = algebra::mul_clear(&temp_x, &temp_y)?;

                let lambda = self.gates[id].lambda.clone();
                let mut dz = algebra::add_shares(&beaver.c, &lambda)?;
                dz = algebra::sub_shares(&dz, &algebra::scale_shares(&beaver.a, &temp_y)?)?;
                dz = algebra::sub_shares(&dz, &algebra::scale_shares(&beaver.b, &temp_x)?)?;

                self.gates[id].delta = node.open(&dz, Some(&temp_xy)).await?;
            }
            GateKind::ElemWiseMulThenMulConst { x, y, constants } => {
                let beaver = expect_beaver(rand)?;
                let temp_x = algebra::add_clear(&self.gates[x.0].delta, &beaver.delta_x)?;
                let temp_y = algebra::add_clear(&self.gates[y.0].delta, &beaver.delta_y)?;
                let temp_xy = algebra::mul_clear(&temp_x, &temp_y)?;

                let mut dz = beaver.c.clone();
                dz = algebra::sub_shares(&dz, &algebra::scale_shares(&beaver.a, &temp_y)?)?;
                dz = algebra::sub_shares(&dz, &algebra::scale_shares(&beaver.b, &temp_x)?)?;

                let constants: ClearVec<F> = constants.into_iter().map(Some).collect();
                dz = algebra::scale_shares(&dz, &constants)?;
                let temp_xy = algebra::mul_clear(&temp_xy, &constants)?;

                let lambda = self.gates[id].lambda.clone();
                dz = algebra::add_shares(&dz, &lambda)?;
                self.gates[id].delta = node.open(&dz, Some(&temp_xy)).await?;
            }
            GateKind::DotProduct { x, y } => {
                let beaver = expect_beaver(rand)?;
                let temp_x = algebra::add_clear(&self.gates[x.0].delta, &beaver.delta_x)?;
                let temp_y = algebra::add_clear(&self.gates[y.0].delta, &beaver.delta_y)?;
                let temp_xy = vec![Some(algebra::dot_clear(&temp_x, &temp_y)?)];

                let lambda = self.gates[id].lambda.clone();
                let mut dz = algebra::add_shares(&beaver.c, &lambda)?;
                let a_dot = algebra::dot_shares(&beaver.a, &temp_y, node.id)?;
                dz = algebra::sub_shares(&dz, &vec![Some(a_dot)])?;
                let b_dot = algebra::dot_shares(&beaver.b, &temp_x, node.id)?;
                dz = algebra::sub_shares(&dz, &vec![Some(b_dot)])?;

                self.gates[id].delta = node.open(&dz, Some(&temp_xy)).await?;
            }
            GateKind::DotProdWithFilter { x, y } => {
                let beaver = expect_beaver(rand)?;
                let keep = algebra::joint_mask(&self.gates[x.0].delta, &self.gates[y.0].delta)?;
                let temp_x = algebra::apply_filter(
                    &algebra::add_clear(&self.gates[x.0].delta, &beaver.delta_x)?,
                    &keep,
                )?;
                let temp_y = algebra::apply_filter(
                    &algebra::add_clear(&self.gates[y.0].delta, &beaver.delta_y)?,
                    &keep,
                )?;
                let temp_xy = vec![Some(algebra::dot_clear(&temp_x, &temp_y)?)];

                let c_kept = algebra::apply_filter(&beaver.c, &keep)?;
                let c_sum =
                    algebra::sum_shares(&c_kept)?.unwrap_or_else(|| Share::zero(node.id));
                let mut dz = vec![Some(c_sum)];
                let a_dot = algebra::dot_shares(&beaver.a, &temp_y, node.id)?;
                dz = algebra::sub_shares(&dz, &vec![Some(a_dot)])?;
                let b_dot = algebra::dot_shares(&beaver.b, &temp_x, node.id)?;
                dz = algebra::sub_shares(&dz, &vec![Some(b_dot)])?;

                let lambda = self.gates[id].lambda.clone();
                dz = algebra::add_shares(&dz, &lambda)?;
                self.gates[id].delta = node.open(&dz, Some(&temp_xy)).await?;
            }
            GateKind::Division { x, divisor } => {
                let div_rand = expect_div(rand)?;
                let dim = self.gates[id].dim;
                let divisors = self.resolve_divisors(&divisor, dim)?;

                let delta_x = self.gates[x.0].delta.clone();
                let lambda_x = self.gates[x.0].lambda.clone();
                let x_shares = algebra::sub_clear_shares(&delta_x, &lambda_x)?;
                if node.params.check_division_bounds {
                    node.assert_max_bits(&x_shares, node.params.div.e).await?;
                }

                let shift = node.params.div.shift_bits();
                let z_clear = self
                    .open_blinded_quotient(node, &x_shares, None, &divisors, &div_rand)
                    .await?;
                self.gates[id].delta = floor_divide(&z_clear, &divisors, shift);
                self.gates[id].lambda = div_rand.r1;
            }
            GateKind::ElemMulThenDiv { x, y, divisor } => {
                let (beaver, div_rand) = expect_mul_div(rand)?;
                let dim = self.gates[id].dim;
                let divisors = self.resolve_divisors(&divisor, dim)?;

                if node.params.check_division_bounds {
                    let x_shares = algebra::sub_clear_shares(
                        &self.gates[x.0].delta,
                        &self.gates[x.0].lambda,
                    )?;
                    node.assert_max_bits(&x_shares, node.params.div.e).await?;
                }

                let temp_x = algebra::add_clear(&self.gates[x.0].delta, &beaver.delta_x)?;
                let temp_y = algebra::add_clear(&self.gates[y.0].delta, &beaver.delta_y)?;
                let temp_xy = algebra::mul_clear(&temp_x, &temp_y)?;

                let mut dz = beaver.c.clone();
                dz = algebra::sub_shares(&dz, &algebra::scale_shares(&beaver.a, &temp_y)?)?;
                dz = algebra::sub_shares(&dz, &algebra::scale_shares(&beaver.b, &temp_x)?)?;

                let shift = node.params.div.shift_bits();
                let z_clear = self
                    .open_blinded_quotient(node, &dz, Some(&temp_xy), &divisors, &div_rand)
                    .await?;
                self.gates[id].delta = floor_divide(&z_clear, &divisors, shift);
                self.gates[id].lambda = div_rand.r1;
            }
            GateKind::DotProdThenDiv {
                xs,
                ys,
                divisor,
                scaling,
            } => {
                let (per_product, div_rand) = expect_dot_batch(rand)?;
                let count = self.gates[id].dim;
                let divisors =
                    self.resolve_divisors(&DivisorSource::Gate(divisor), count)?;

                let mut dz: ShareVec<F> = Vec::with_capacity(count);
                let mut temp_xy: ClearVec<F> = Vec::with_capacity(count);
                for (beaver, gx, gy) in izip!(&per_product, &xs, &ys) {
                    let dx = &self.gates[gx.0].delta;
                    let dy = &self.gates[gy.0].delta;
                    let keep = algebra::joint_mask(dx, dy)?;
                    let tx =
                        algebra::apply_filter(&algebra::add_clear(dx, &beaver.delta_x)?, &keep)?;
                    let ty =
                        algebra::apply_filter(&algebra::add_clear(dy, &beaver.delta_y)?, &keep)?;
                    let mut txy = algebra::dot_clear(&tx, &ty)?;

                    let c_kept = algebra::apply_filter(&beaver.c, &keep)?;
                    let c_sum =
                        algebra::sum_shares(&c_kept)?.unwrap_or_else(|| Share::zero(node.id));
                    let a_dot = algebra::dot_shares(&beaver.a, &ty, node.id)?;
                    let b_dot = algebra::dot_shares(&beaver.b, &tx, node.id)?;
                    let mut share = ((c_sum - a_dot)? - b_dot)?;

                    if let Some(s) = scaling {
                        share = share * s;
                        txy *= s;
                    }
                    dz.push(Some(share));
                    temp_xy.push(Some(txy));
                }

                let shift = node.params.div.shift_bits();
                let z_clear = self
                    .open_blinded_quotient(node, &dz, Some(&temp_xy), &divisors, &div_rand)
                    .await?;
                self.gates[id].delta = floor_divide(&z_clear, &divisors, shift);
                self.gates[id].lambda = div_rand.r1;
            }
            GateKind::Reduce { x, filter } => {
                let lambda_x = &self.gates[x.0].lambda;
                let delta_x = &self.gates[x.0].delta;
                let mut lambda_sum: Option<Share<F>> = None;
                let mut delta_sum = F::zero();
                for i in 0..delta_x.len() {
                    let kept = delta_x[i].is_some()
                        && filter.as_ref().map_or(true, |f| f[i]);
                    if !kept {
                        continue;
                    }
                    if let Some(share) = &lambda_x[i] {
                        lambda_sum = Some(match lambda_sum {
                            None => share.clone(),
                            Some(acc) => (acc + share.clone())?,
                        });
                    }
                    if let Some(value) = delta_x[i] {
                        delta_sum += value;
                    }
                }
                self.gates[id].lambda =
                    vec![Some(lambda_sum.unwrap_or_else(|| Share::zero(node.id)))];
                self.gates[id].delta = vec![Some(delta_sum)];
            }
            GateKind::Output { x } => {
                let lambda = self.gates[x.0].lambda.clone();
                let delta = self.gates[x.0].delta.clone();
                let lambda_clear = node.open(&lambda, None).await?;
                let values = algebra::sub_clear(&delta, &lambda_clear)?;
                self.gates[id].lambda = lambda;
                self.gates[id].delta = delta;
                self.gates[id].opened = Some(values);
            }
        }
        Ok(())
    }

    /// Shared tail of the division gates: blinds the shifted dividend with
    /// `h = (r + r1*2^(l+sigma))*d` and `r2`, opens it (folding in the public
    /// `fold * 2^(l+sigma)` when the dividend came out of a Beaver step) and
    /// returns the opened `z`.
    async fn open_blinded_quotient<T, R>(
        &self,
        node: &PartyNode<T, R>,
        x_shares: &ShareVec<F>,
        fold: Option<&ClearVec<F>>,
        divisors: &ClearVec<F>,
        div_rand: &DivRand<F>,
    ) -> Result<ClearVec<F>, ProtocolError>
    where
        T: StarTransport,
        R: BufRead + Send,
    {
        let shift = node.params.div.shift_bits();
        let pow = pow2::<F>(shift);

        let mut h = algebra::scale_shares_const(&div_rand.r1, pow);
        h = algebra::add_shares(&div_rand.r, &h)?;
        h = algebra::scale_shares(&h, divisors)?;

        let mut z = algebra::scale_shares_const(x_shares, pow);
        z = algebra::add_shares(&z, &h)?;
        z = algebra::add_shares(&z, &div_rand.r2)?;

        let shifted_fold = fold.map(|f| algebra::scale_clear(f, pow));
        node.open(&z, shifted_fold.as_ref()).await
    }

    fn resolve_divisors(
        &self,
        source: &DivisorSource<F>,
        dim: usize,
    ) -> Result<ClearVec<F>, ProtocolError> {
        match source {
            DivisorSource::Constants(values) => Ok(values.iter().copied().map(Some).collect()),
            DivisorSource::Gate(g) => {
                let opened = self.gates[g.0]
                    .opened
                    .as_ref()
                    .ok_or(ProtocolError::MissingDivisor)?;
                let mut divisors = opened.clone();
                divisors.truncate(dim);
                let first = divisors
                    .first()
                    .cloned()
                    .ok_or(ProtocolError::MissingDivisor)?;
                while divisors.len() < dim {
                    divisors.push(first.clone());
                }
                let limit = self.params.div.l;
                for d in divisors.iter().flatten() {
                    if d.is_zero() {
                        return Err(ProtocolError::ZeroDivisor);
                    }
                    let bits: u64 = u64::from(d.into_bigint().num_bits());
                    if bits >= u64::from(limit) {
                        return Err(ProtocolError::DivisorTooWide { bits, limit });
                    }
                }
                Ok(divisors)
            }
        }
    }

    // -------------------------------------------------------------- internal

    fn push(&mut self, kind: GateKind<F>, dim: usize) -> GateId {
        let id = GateId(self.gates.len());
        self.gates.push(GateNode {
            kind,
            dim,
            state: GateState::Built,
            lambda: Vec::new(),
            delta: Vec::new(),
            rand: None,
            opened: None,
            name: String::new(),
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
            GateKind::Output { .. } => Ok(()),
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

    fn check_divisor(d: &F, limit: u32) -> Result<(), CircuitError> {
        if d.is_zero() {
            return Err(CircuitError::ZeroDivisor);
        }
        let bits = u64::from(d.into_bigint().num_bits());
        if bits >= u64::from(limit) {
            return Err(CircuitError::DivisorTooWide { bits, limit });
        }
        Ok(())
    }
}

fn expect_beaver<F: PrimeField>(rand: Option<GateRand<F>>) -> Result<BeaverRand<F>, ProtocolError> {
    match rand {
        Some(GateRand::Beaver(b)) => Ok(b),
        _ => Err(ProtocolError::MissingRandomness),
    }
}

fn expect_div<F: PrimeField>(rand: Option<GateRand<F>>) -> Result<DivRand<F>, ProtocolError> {
    match rand {
        Some(GateRand::Div(d)) => Ok(d),
        _ => Err(ProtocolError::MissingRandomness),
    }
}

fn expect_mul_div<F: PrimeField>(
    rand: Option<GateRand<F>>,
) -> Result<(BeaverRand<F>, DivRand<F>), ProtocolError> {
    match rand {
        Some(GateRand::MulDiv(b, d)) => Ok((b, d)),
        _ => Err(ProtocolError::MissingRandomness),
    }
}

fn expect_dot_batch<F: PrimeField>(
    rand: Option<GateRand<F>>,
) -> Result<(Vec<BeaverRand<F>>, DivRand<F>), ProtocolError> {
    match rand {
        Some(GateRand::DotBatch(b, d)) => Ok((b, d)),
        _ => Err(ProtocolError::MissingRandomness),
    }
}

pub(crate) fn pow2<F: PrimeField>(bits: u32) -> F {
    F::from(BigUint::from(1u8) << bits as usize)
}

pub(crate) fn pow10<F: PrimeField>(exp: u32) -> F {
    F::from(BigUint::from(10u8).pow(exp))
}

/// `floor(z / (d * 2^shift))` per dimension, over the integers.
fn floor_divide<F: PrimeField>(
    z_clear: &ClearVec<F>,
    divisors: &ClearVec<F>,
    shift: u32,
) -> ClearVec<F> {
    z_clear
        .iter()
        .zip(divisors)
        .map(|(z, d)| match (z, d) {
            (Some(z), Some(d)) => {
                let z: BigUint = (*z).into();
                let d: BigUint = (*d).into();
                Some(F::from(z / (d << shift as usize)))
            }
            _ => None,
        })
        .collect()
}
