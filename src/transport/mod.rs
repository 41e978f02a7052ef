//! Star-topology party transport.
//!
//! Every party owns a bidirectional channel to a single coordinator; there
//! are no peer-to-peer links. All value-opening follows the same round shape:
//! each party sends one message to the coordinator, the coordinator collects
//! one message per party (its own included), computes, and broadcasts one
//! reply to everyone. Messages preserve element order and nullability: a
//! missing element round-trips as absent, it is never dropped.

pub mod channel;

use crate::algebra::{ClearVec, ShareVec};
use crate::share::PartyId;
use ark_ff::PrimeField;
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize, SerializationError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for transport related issues.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("a peer disconnected before the round completed")]
    Disconnected,
    #[error("this endpoint is not the coordinator")]
    NotCoordinator,
    #[error("message from party {got} arrived in party {expected}'s slot")]
    UnexpectedSender { expected: PartyId, got: PartyId },
    #[error("unexpected message kind for the current round")]
    UnexpectedMessage,
    #[error("error during the serialization using bincode: {0:?}")]
    Bincode(#[from] Box<bincode::ErrorKind>),
    #[error("error during field element serialization: {0:?}")]
    Ark(#[from] SerializationError),
}

/// A star network as seen from one party.
///
/// The party-side operations are valid on every endpoint; the collect and
/// broadcast operations only on the coordinator's. `collect_from_all` must
/// block until one message per party has arrived, reading the peers
/// concurrently so no party is serialized behind another, and must return the
/// messages indexed by party.
#[async_trait]
pub trait StarTransport: Send + Sync {
    /// Number of parties connected to this network.
    fn party_count(&self) -> usize;
    /// Whether this endpoint mediates the openings.
    fn is_coordinator(&self) -> bool;
    /// Sends one round message to the coordinator.
    async fn send_to_coordinator(&self, bytes: Vec<u8>) -> Result<(), TransportError>;
    /// Blocks until the coordinator's reply for the current round arrives.
    async fn recv_from_coordinator(&self) -> Result<Vec<u8>, TransportError>;
    /// Coordinator only: one message per party, in party order.
    async fn collect_from_all(&self) -> Result<Vec<Vec<u8>>, TransportError>;
    /// Coordinator only: sends the same message to every party, itself included.
    async fn broadcast_to_all(&self, bytes: Vec<u8>) -> Result<(), TransportError>;
}

/// The messages of an opening round. Field-element vectors travel as
/// compressed payload bytes inside a small bincode envelope.
#[derive(Serialize, Deserialize)]
pub enum StarMessage {
    /// A party's masked share vector, sent up to the coordinator.
    MaskedShares { sender: PartyId, payload: Vec<u8> },
    /// The reconstructed cleartext vector, broadcast back down.
    Opened { payload: Vec<u8> },
    /// Outcome of a protocol precondition checked at the coordinator.
    Verdict { ok: bool },
}

impl StarMessage {
    pub fn masked_shares<F: PrimeField>(
        sender: PartyId,
        shares: &ShareVec<F>,
    ) -> Result<Self, TransportError> {
        let mut payload = Vec::new();
        shares.serialize_compressed(&mut payload)?;
        Ok(Self::MaskedShares { sender, payload })
    }

    pub fn opened<F: PrimeField>(values: &ClearVec<F>) -> Result<Self, TransportError> {
        let mut payload = Vec::new();
        values.serialize_compressed(&mut payload)?;
        Ok(Self::Opened { payload })
    }

    pub fn verdict(ok: bool) -> Self {
        Self::Verdict { ok }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, TransportError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TransportError> {
        Ok(bincode::deserialize(bytes)?)
    }

    /// Unpacks a share vector that must originate from `expected` party.
    pub fn into_shares<F: PrimeField>(
        self,
        expected: PartyId,
    ) -> Result<ShareVec<F>, TransportError> {
        match self {
            Self::MaskedShares { sender, payload } => {
                if sender != expected {
                    return Err(TransportError::UnexpectedSender {
                        expected,
                        got: sender,
                    });
                }
                Ok(ShareVec::<F>::deserialize_compressed(payload.as_slice())?)
            }
            _ => Err(TransportError::UnexpectedMessage),
        }
    }

    pub fn into_opened<F: PrimeField>(self) -> Result<ClearVec<F>, TransportError> {
        match self {
            Self::Opened { payload } => {
                Ok(ClearVec::<F>::deserialize_compressed(payload.as_slice())?)
            }
            _ => Err(TransportError::UnexpectedMessage),
        }
    }

    pub fn into_verdict(self) -> Result<bool, TransportError> {
        match self {
            Self::Verdict { ok } => Ok(ok),
            _ => Err(TransportError::UnexpectedMessage),
        }
    }
}
