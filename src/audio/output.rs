use anyhow::Result;
use tokio::sync::mpsc;

use super::frame::AudioFrame;
use super::transform::FrameSink;
use crate::peer::PeerId;

/// Frames queued towards an output before the pipeline waits.
pub const OUTPUT_QUEUE_FRAMES: usize = 16;

/// Destination for one peer's (transformed) inbound audio.
pub trait AudioOutput: Send + Sync {
    /// Open a sink for `peer`. Dropping the sink ends that peer's output.
    fn open(&self, peer: &PeerId) -> Result<FrameSink>;
}

/// Drains frames and logs throughput; used when no sound card output is configured.
#[derive(Debug, Default, Clone)]
pub struct LogOutput;

impl AudioOutput for LogOutput {
    fn open(&self, peer: &PeerId) -> Result<FrameSink> {
        let (tx, mut rx) = mpsc::channel::<AudioFrame>(OUTPUT_QUEUE_FRAMES);
        let peer = peer.clone();
        tokio::spawn(async move {
            let mut frames = 0u64;
            let mut audio_us = 0i64;
            while let Some(frame) = rx.recv().await {
                frames += 1;
                audio_us += frame.duration_us();
                // roughly once a second at 20 ms blocks
                if frames % 50 == 0 {
                    log::debug!(
                        "Output {}: {} frames, {:.1}s audio, last block {}ch x {} @ {}Hz",
                        peer,
                        frames,
                        audio_us as f64 / 1e6,
                        frame.channel_count,
                        frame.frame_count,
                        frame.sample_rate
                    );
                }
            }
            log::info!("Output {} closed after {} frames", peer, frames);
        });
        Ok(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_output_drains_every_frame() {
        let sink = LogOutput.open(&PeerId::new("abc123")).unwrap();
        // more than the queue holds, so the drain task has to keep up
        for i in 0..(OUTPUT_QUEUE_FRAMES as i64 * 4) {
            sink.send(AudioFrame::silence(i * 20_000, 48000, 2, 960)).await.unwrap();
        }
        drop(sink);
    }
}
