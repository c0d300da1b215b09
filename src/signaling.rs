use anyhow::Result;
use async_trait::async_trait;

use crate::peer::PeerId;
use crate::protocol::SignalPayload;

/// Outbound half of the signaling channel. Inbound deltas and signals arrive
/// as [`NetEvent`](crate::net_link::NetEvent)s.
#[async_trait]
pub trait SignalingClient: Send + Sync {
    async fn send(&self, to: &PeerId, payload: SignalPayload) -> Result<()>;
}
