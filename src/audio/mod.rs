//! audio - frame types, the pulse-tone kernel and the per-connection
//! transform pipeline.
//!
//! Inbound decoded frames of a remote track flow
//! source → [`TransformSession`] → [`AudioOutput`] sink.

pub mod frame;
pub mod kernel;
pub mod oscillator;
mod output;
pub mod transform;

#[cfg(feature = "playback")]
mod alsa_device;
#[cfg(feature = "playback")]
mod play;

pub use frame::{AudioFrame, FrameBuffer};
pub use oscillator::Oscillator;
pub use output::{AudioOutput, LogOutput};
#[cfg(feature = "playback")]
pub use play::AlsaOutput;
pub use transform::{
    FrameSink, FrameSource, PipelineExit, ReleaseCounter, TransformConfig, TransformHandle,
    TransformSession,
};
