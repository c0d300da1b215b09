use std::fmt;

use thiserror::Error;

use crate::peer::PeerId;

/// The negotiation step that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationStep {
    CreateSession,
    CreateOffer,
    CreateAnswer,
    SetLocalDescription,
    SetRemoteDescription,
    AddIceCandidate,
}

impl fmt::Display for NegotiationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CreateSession => "create session",
            Self::CreateOffer => "create offer",
            Self::CreateAnswer => "create answer",
            Self::SetLocalDescription => "set local description",
            Self::SetRemoteDescription => "set remote description",
            Self::AddIceCandidate => "add ice candidate",
        };
        f.write_str(name)
    }
}

/// Offer/answer creation or description-setting failed. Not retried.
#[derive(Debug, Clone, Error)]
#[error("{step} failed: {message}")]
pub struct NegotiationError {
    pub step: NegotiationStep,
    pub message: String,
}

impl NegotiationError {
    pub fn new(step: NegotiationStep, err: impl fmt::Display) -> Self {
        Self {
            step,
            message: err.to_string(),
        }
    }
}

/// Failures that end one transform pipeline. The owning connection stays up.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("block of {channels} channels x {frames} frames exceeds buffer capacity of {capacity} samples")]
    CapacityExceeded {
        channels: usize,
        frames: usize,
        capacity: usize,
    },
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    #[error("output sink closed")]
    SinkClosed,
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("peer {0} already has a live session")]
    SessionExists(PeerId),
    #[error("controller for peer {0} has been torn down")]
    TornDown(PeerId),
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),
}
