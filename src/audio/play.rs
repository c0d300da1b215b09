//! ALSA-backed [`AudioOutput`]: one playback thread per peer.

use std::thread;

use alsa::pcm::PCM;
use anyhow::Result;
use tokio::sync::mpsc;

use super::alsa_device;
use super::frame::{AudioFrame, OUTPUT_CHANNELS};
use super::output::{AudioOutput, OUTPUT_QUEUE_FRAMES};
use super::transform::FrameSink;
use crate::peer::PeerId;

const PLAYBACK_SAMPLE_RATE: u32 = 48000;
const PLAYBACK_PERIOD_SIZE: usize = 1024;
const MAX_RECOVERY_RETRIES: u32 = 3;

#[derive(Debug, Clone)]
pub struct AlsaOutput {
    device: String,
}

impl AlsaOutput {
    pub fn new(device: impl Into<String>) -> Self {
        Self { device: device.into() }
    }
}

impl AudioOutput for AlsaOutput {
    fn open(&self, peer: &PeerId) -> Result<FrameSink> {
        let (tx, rx) = mpsc::channel(OUTPUT_QUEUE_FRAMES);
        let device = self.device.clone();
        let name = format!("play-{}", peer.sanitized());
        thread::Builder::new().name(name).spawn(move || {
            if let Err(e) = play_thread(&device, rx) {
                log::error!("Playback thread error: {}", e);
            }
        })?;
        Ok(tx)
    }
}

/// Interleave and convert to i16, fitting the frame to the device channel count.
fn to_device_pcm(frame: &AudioFrame, device_channels: usize) -> Vec<i16> {
    let mut out = Vec::with_capacity(frame.frame_count * device_channels);
    for i in 0..frame.frame_count {
        for ch in 0..device_channels {
            let src = ch.min(frame.channel_count - 1);
            let s = frame.plane(src)[i].clamp(-1.0, 1.0);
            out.push((s * i16::MAX as f32) as i16);
        }
    }
    out
}

fn play_thread(device: &str, mut rx: mpsc::Receiver<AudioFrame>) -> Result<()> {
    let (pcm, params) = alsa_device::open_playback(
        device,
        PLAYBACK_SAMPLE_RATE,
        OUTPUT_CHANNELS as u32,
        Some(PLAYBACK_PERIOD_SIZE),
    )?;
    let channels = params.channels as usize;
    let io = pcm.io_i16()?;
    let mut rate_warned = false;

    while let Some(frame) = rx.blocking_recv() {
        if frame.sample_rate != params.sample_rate && !rate_warned {
            log::warn!(
                "Frame rate {}Hz differs from device rate {}Hz, playing unresampled",
                frame.sample_rate,
                params.sample_rate
            );
            rate_warned = true;
        }
        let pcm_data = to_device_pcm(&frame, channels);
        write_all(&pcm, &io, &pcm_data, channels);
    }

    log::info!("Playback channel closed");
    Ok(())
}

// Short writes are retried; XRUNs go through prepare() with a retry cap so a
// stalled device drops the block instead of spinning.
fn write_all(pcm: &PCM, io: &alsa::pcm::IO<'_, i16>, pcm_data: &[i16], channels: usize) {
    let total_frames = pcm_data.len() / channels;
    let mut frames_written = 0;
    let mut retry_count = 0u32;

    while frames_written < total_frames {
        let offset = frames_written * channels;
        match io.writei(&pcm_data[offset..]) {
            Ok(n) => {
                frames_written += n;
                retry_count = 0;
            }
            Err(e) => {
                log::warn!("ALSA XRUN or error: {}, recovering...", e);
                retry_count += 1;
                if let Err(e2) = pcm.prepare() {
                    log::error!("Failed to recover PCM playback: {}", e2);
                    return;
                }
                if retry_count >= MAX_RECOVERY_RETRIES {
                    log::error!(
                        "Max recovery retries ({}) reached. Dropping {} unwritten frames.",
                        retry_count,
                        total_frames - frames_written
                    );
                    return;
                }
            }
        }
    }
}
