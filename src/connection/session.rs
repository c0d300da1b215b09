//! The media session seam and the events it reports back to its controller.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::audio::FrameSource;
use crate::error::NegotiationError;
use crate::peer::PeerId;
use crate::protocol::{IceCandidate, SessionDescription};

/// One direct media session with a remote peer (a peer connection).
#[async_trait]
pub trait MediaSession: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription>;
    async fn create_answer(&self) -> Result<SessionDescription>;
    async fn set_local_description(&self, desc: SessionDescription) -> Result<()>;
    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()>;
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;
    async fn close(&self) -> Result<()>;
}

/// Creates sessions. The session reports transport state, local candidates
/// and inbound tracks through `events`.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn create(&self, peer: &PeerId, events: SessionEvents) -> Result<Arc<dyn MediaSession>>;
}

/// Connection state as reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// A remote track delivering decoded frames.
#[derive(Debug)]
pub struct InboundTrack {
    pub id: String,
    pub kind: TrackKind,
    pub frames: FrameSource,
}

#[derive(Debug)]
pub enum ControllerEventKind {
    Transport(TransportState),
    LocalCandidate(IceCandidate),
    Track(InboundTrack),
    /// Offer or answer created and applied locally, ready to send.
    LocalDescription(SessionDescription),
    RemoteDescriptionApplied,
    NegotiationFailed(NegotiationError),
}

/// An event for the controller of `peer`, tagged with the session generation
/// that produced it.
#[derive(Debug)]
pub struct ControllerEvent {
    pub peer: PeerId,
    pub generation: u64,
    pub kind: ControllerEventKind,
}

/// Reporting handle bound to one session generation.
#[derive(Debug, Clone)]
pub struct SessionEvents {
    peer: PeerId,
    generation: u64,
    tx: mpsc::UnboundedSender<ControllerEvent>,
}

impl SessionEvents {
    pub fn new(peer: PeerId, generation: u64, tx: mpsc::UnboundedSender<ControllerEvent>) -> Self {
        Self { peer, generation, tx }
    }

    pub fn peer(&self) -> &PeerId {
        &self.peer
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state_changed(&self, state: TransportState) {
        self.emit(ControllerEventKind::Transport(state));
    }

    pub fn local_candidate(&self, candidate: IceCandidate) {
        self.emit(ControllerEventKind::LocalCandidate(candidate));
    }

    pub fn track(&self, track: InboundTrack) {
        self.emit(ControllerEventKind::Track(track));
    }

    pub(crate) fn emit(&self, kind: ControllerEventKind) {
        let event = ControllerEvent {
            peer: self.peer.clone(),
            generation: self.generation,
            kind,
        };
        if self.tx.send(event).is_err() {
            log::debug!("Controller event for {} dropped, event loop gone", self.peer);
        }
    }
}
