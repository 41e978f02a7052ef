//! A semi-honest multi-party computation engine that evaluates arithmetic
//! circuits over a prime field using masked values.
//!
//! Every wire of the circuit carries a pair: a secret-shared random mask
//! `lambda` manufactured ahead of time, and the public masked value
//! `Delta = x + lambda`. The offline phase walks the circuit once and appends
//! the correlated randomness each gate will need (masks, Beaver triples,
//! division randomness) to one tape per party. The online phase walks the
//! identical circuit, reads the tapes back in the same order, and evaluates
//! each gate locally except where the protocol requires a value to be opened,
//! in which case every party sends its share to a designated coordinator that
//! reconstructs the cleartext and broadcasts it back.
//!
//! The crate is generic over the field: any [`ark_ff::PrimeField`] works, as
//! long as the modulus leaves enough headroom for the division protocol's
//! statistical-security bounds (see [`params::DivisionParams`]).

pub mod algebra;
pub mod circuit;
pub(crate) mod dag;
pub mod offline;
pub mod params;
pub mod party;
pub mod share;
pub mod tape;
pub mod transport;

pub use circuit::{Circuit, CircuitError, GateId};
pub use offline::{Dealer, OfflineCircuit};
pub use params::{DivisionParams, ProtocolParams};
pub use party::{PartyNode, ProtocolError};
pub use share::shamir::ThresholdSharing;
pub use share::{PartyId, Share, ShareError};
pub use tape::{TapeReader, TapeWriter};
pub use transport::{channel::ChannelStar, StarTransport, TransportError};
