//! media - WebRTC-backed sessions and inbound Opus decoding.

mod opus_decoder;
mod webrtc_session;

pub use opus_decoder::{OpusFrameDecoder, OPUS_SAMPLE_RATE};
pub use webrtc_session::WebRtcSessionFactory;
