//! connection - per-peer negotiation state machine and the media session seam.

mod controller;
mod session;
mod state;

pub use controller::{ConnectionController, ControllerContext, MAX_PENDING_CANDIDATES};
pub use session::{
    ControllerEvent, ControllerEventKind, InboundTrack, MediaSession, SessionEvents,
    SessionFactory, TrackKind, TransportState,
};
pub use state::{ButtonStatus, ConnectionState, PeerStatus, StatusListener};
