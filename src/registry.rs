use std::collections::BTreeMap;
use std::sync::Arc;

use crate::connection::{
    ButtonStatus, ConnectionController, ControllerContext, ControllerEvent, PeerStatus,
};
use crate::peer::PeerId;
use crate::protocol::{PeersDelta, SignalMessage};

/// A peer currently in the lobby.
pub struct PeerRecord {
    pub id: PeerId,
    pub name: String,
    pub sanitized_id: String,
    pub controller: ConnectionController,
}

impl PeerRecord {
    pub fn status(&self) -> PeerStatus {
        let state = self.controller.state();
        PeerStatus {
            id: self.id.clone(),
            name: self.name.clone(),
            sanitized_id: self.sanitized_id.clone(),
            state,
            button: ButtonStatus::for_state(state),
        }
    }
}

/// Single owner of every connection controller, keyed by peer id.
///
/// Nothing fails out of the registry: controller errors are logged and stay
/// with the peer that caused them.
pub struct PeerRegistry {
    peers: BTreeMap<PeerId, PeerRecord>,
    ctx: Arc<ControllerContext>,
}

impl PeerRegistry {
    pub fn new(ctx: Arc<ControllerContext>) -> Self {
        Self {
            peers: BTreeMap::new(),
            ctx,
        }
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn contains(&self, id: &PeerId) -> bool {
        self.peers.contains_key(id)
    }

    pub fn get(&self, id: &PeerId) -> Option<&PeerRecord> {
        self.peers.get(id)
    }

    pub fn get_mut(&mut self, id: &PeerId) -> Option<&mut PeerRecord> {
        self.peers.get_mut(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &PeerId> {
        self.peers.keys()
    }

    pub fn statuses(&self) -> Vec<PeerStatus> {
        self.peers.values().map(PeerRecord::status).collect()
    }

    /// Apply a lobby delta. Returns whether the peer set changed.
    pub async fn apply_delta(&mut self, delta: PeersDelta) -> bool {
        let mut changed = false;

        for (id, name) in delta.enter {
            if self.peers.contains_key(&id) {
                continue;
            }
            log::info!("Peer entered: {} ({})", id, name);
            let sanitized_id = id.sanitized();
            if let Some(other) = self.peers.values().find(|r| r.sanitized_id == sanitized_id) {
                log::warn!(
                    "Peer {} shares sanitized id '{}' with {}; toggle it by its full id",
                    id,
                    sanitized_id,
                    other.id
                );
            }
            let record = PeerRecord {
                sanitized_id,
                controller: ConnectionController::new(id.clone(), self.ctx.clone()),
                id: id.clone(),
                name,
            };
            self.peers.insert(id, record);
            changed = true;
        }

        for id in delta.exit {
            if let Some(record) = self.peers.get_mut(&id) {
                record.controller.teardown().await;
                self.peers.remove(&id);
                log::info!("Peer left: {}", id);
                changed = true;
            }
        }

        if changed {
            self.notify();
        }
        changed
    }

    /// Toggle the connection of the peer whose sanitized id matches.
    ///
    /// An exact peer id wins over a sanitized match, so peers whose sanitized
    /// ids collide can still be addressed.
    pub async fn toggle(&mut self, id: &str) -> bool {
        let key = PeerId::new(id);
        let record = if self.peers.contains_key(&key) {
            self.peers.get_mut(&key)
        } else {
            self.peers.values_mut().find(|r| r.sanitized_id == id)
        };
        let Some(record) = record else {
            log::warn!("toggle: no peer with id {}", id);
            return false;
        };
        if let Err(e) = record.controller.toggle().await {
            log::error!("toggle {} failed: {}", record.id, e);
        }
        true
    }

    pub async fn dispatch_signal(&mut self, message: SignalMessage) {
        let Some(record) = self.peers.get_mut(&message.from) else {
            log::warn!("Signal {} from unknown peer {}", message.payload.kind(), message.from);
            return;
        };
        if let Err(e) = record.controller.handle_signal(message.payload).await {
            log::error!("Handling signal from {} failed: {}", message.from, e);
        }
    }

    pub async fn dispatch_event(&mut self, event: ControllerEvent) {
        match self.peers.get_mut(&event.peer) {
            Some(record) => record.controller.handle_event(event.generation, event.kind).await,
            None => log::debug!("Event for departed peer {} dropped", event.peer),
        }
    }

    /// Tear down every controller and forget all peers.
    pub async fn close_all(&mut self) {
        if self.peers.is_empty() {
            return;
        }
        for record in self.peers.values_mut() {
            record.controller.teardown().await;
        }
        self.peers.clear();
        self.notify();
    }

    fn notify(&self) {
        self.ctx.status.peers_changed(&self.statuses());
    }
}
