//! Lobby / signaling wire format.
//!
//! Every websocket text message is an envelope `{"event": ..., "data": {...}}`.
//! Signal payloads use the browser's JSON shapes for session descriptions and
//! ICE candidates so a browser peer can sit on the other end.

use serde::{Deserialize, Serialize};

use crate::peer::PeerId;

/// Client → server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    EnterLobby { username: String },
    LeaveLobby {},
    /// `id` is the target peer.
    Signal { id: PeerId, signal: SignalPayload },
}

/// Server → client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    Peers(PeersDelta),
    /// `id` is the sending peer.
    Signal { id: PeerId, signal: SignalPayload },
}

/// Lobby membership change. `enter` entries are `[id, name]` pairs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeersDelta {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enter: Vec<(PeerId, String)>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exit: Vec<PeerId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SignalPayload {
    Offer { sdp: String },
    Answer { sdp: String },
    Candidate { candidate: IceCandidate },
}

impl SignalPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Offer { .. } => "offer",
            Self::Answer { .. } => "answer",
            Self::Candidate { .. } => "candidate",
        }
    }
}

impl From<SessionDescription> for SignalPayload {
    fn from(desc: SessionDescription) -> Self {
        match desc.kind {
            SdpKind::Offer => Self::Offer { sdp: desc.sdp },
            SdpKind::Answer => Self::Answer { sdp: desc.sdp },
        }
    }
}

/// An inbound signal together with its sender.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalMessage {
    pub from: PeerId,
    pub payload: SignalPayload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpKind {
    Offer,
    Answer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self { kind: SdpKind::Offer, sdp: sdp.into() }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self { kind: SdpKind::Answer, sdp: sdp.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid", default)]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", default)]
    pub sdp_mline_index: Option<u16>,
    #[serde(rename = "usernameFragment", default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}
