use std::fmt;

use super::session::TransportState;
use crate::peer::PeerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Negotiating,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectionState {
    /// A session in this state still counts as the peer's live session.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Negotiating | Self::Connected)
    }

    /// Terminal transport states map onto their controller state.
    pub fn from_transport(state: TransportState) -> Option<Self> {
        match state {
            TransportState::Connected => Some(Self::Connected),
            TransportState::Disconnected => Some(Self::Disconnected),
            TransportState::Failed => Some(Self::Failed),
            TransportState::Closed => Some(Self::Closed),
            TransportState::New | TransportState::Connecting => None,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Label and colour of a peer's connect toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonStatus {
    pub label: &'static str,
    pub color: &'static str,
}

impl ButtonStatus {
    pub const CONNECT: Self = Self { label: "Connect", color: "LightGray" };
    pub const CONNECTING: Self = Self { label: "Connecting", color: "Yellow" };
    pub const DISCONNECT: Self = Self { label: "Disconnect", color: "LightGreen" };

    pub fn for_state(state: ConnectionState) -> Self {
        match state {
            ConnectionState::Connected => Self::DISCONNECT,
            ConnectionState::Negotiating => Self::CONNECTING,
            ConnectionState::Idle
            | ConnectionState::Disconnected
            | ConnectionState::Failed
            | ConnectionState::Closed => Self::CONNECT,
        }
    }
}

/// One row of the peer list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerStatus {
    pub id: PeerId,
    pub name: String,
    pub sanitized_id: String,
    pub state: ConnectionState,
    pub button: ButtonStatus,
}

/// UI boundary: told about every controller state change and every change
/// of the peer list.
pub trait StatusListener: Send + Sync {
    fn state_changed(&self, peer: &PeerId, state: ConnectionState);
    fn peers_changed(&self, peers: &[PeerStatus]);
}
