//! An in-process star network over tokio channels, used by the tests and by
//! single-machine deployments that run one task per party.

use super::{StarTransport, TransportError};
use crate::share::PartyId;
use async_trait::async_trait;
use futures::future::try_join_all;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;

struct Hub {
    /// One inbox per party, coordinator included, indexed by party.
    inboxes: Vec<Mutex<UnboundedReceiver<Vec<u8>>>>,
    outboxes: Vec<UnboundedSender<Vec<u8>>>,
}

/// One party's endpoint of an in-process star. Endpoint 0 carries the hub and
/// therefore acts as the coordinator.
pub struct ChannelStar {
    id: PartyId,
    n: usize,
    to_hub: UnboundedSender<Vec<u8>>,
    from_hub: Mutex<UnboundedReceiver<Vec<u8>>>,
    hub: Option<Hub>,
}

impl ChannelStar {
    /// Creates endpoints for `n` parties; element `i` belongs to party `i`.
    pub fn star(n: usize) -> Vec<ChannelStar> {
        let mut up_txs = Vec::with_capacity(n);
        let mut inboxes = Vec::with_capacity(n);
        let mut outboxes = Vec::with_capacity(n);
        let mut down_rxs = Vec::with_capacity(n);
        for _ in 0..n {
            let (up_tx, up_rx) = unbounded_channel();
            let (down_tx, down_rx) = unbounded_channel();
            up_txs.push(up_tx);
            inboxes.push(Mutex::new(up_rx));
            outboxes.push(down_tx);
            down_rxs.push(down_rx);
        }

        let mut hub = Some(Hub { inboxes, outboxes });
        up_txs
            .into_iter()
            .zip(down_rxs)
            .enumerate()
            .map(|(id, (to_hub, from_hub))| ChannelStar {
                id,
                n,
                to_hub,
                from_hub: Mutex::new(from_hub),
                hub: hub.take(),
            })
            .collect()
    }

    pub fn id(&self) -> PartyId {
        self.id
    }
}

#[async_trait]
impl StarTransport for ChannelStar {
    fn party_count(&self) -> usize {
        self.n
    }

    fn is_coordinator(&self) -> bool {
        self.hub.is_some()
    }

    async fn send_to_coordinator(&self, bytes: Vec<u8>) -> Result<(), TransportError> {
        self.to_hub
            .send(bytes)
            .map_err(|_| TransportError::Disconnected)
    }

    async fn recv_from_coordinator(&self) -> Result<Vec<u8>, TransportError> {
        self.from_hub
            .lock()
            .await
            .recv()
            .await
            .ok_or(TransportError::Disconnected)
    }

    async fn collect_from_all(&self) -> Result<Vec<Vec<u8>>, TransportError> {
        let hub = self.hub.as_ref().ok_or(TransportError::NotCoordinator)?;
        // One concurrent read per party into an order-preserving slot array,
        // joined before the round proceeds.
        try_join_all(hub.inboxes.iter().map(|slot| async move {
            slot.lock()
                .await
                .recv()
                .await
                .ok_or(TransportError::Disconnected)
        }))
        .await
    }

    async fn broadcast_to_all(&self, bytes: Vec<u8>) -> Result<(), TransportError> {
        let hub = self.hub.as_ref().ok_or(TransportError::NotCoordinator)?;
        for outbox in &hub.outboxes {
            outbox
                .send(bytes.clone())
                .map_err(|_| TransportError::Disconnected)?;
        }
        Ok(())
    }
}
