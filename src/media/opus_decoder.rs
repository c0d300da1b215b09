//! Opus packet → planar [`AudioFrame`] decoding for inbound RTP.

use anyhow::Result;

use crate::audio::AudioFrame;

/// RTP clock and decode rate for Opus.
pub const OPUS_SAMPLE_RATE: u32 = 48000;

/// Max 120ms @ 48kHz = 5760 samples/channel, 6000 for safety.
const MAX_FRAME_SIZE: usize = 6000;

pub struct OpusFrameDecoder {
    decoder: opus::Decoder,
    channels: usize,
    pcm_buf: Vec<f32>,
}

impl OpusFrameDecoder {
    /// `channels` is the decode layout (1 or 2), independent of what the
    /// sender encoded.
    pub fn new(channels: usize) -> Result<Self> {
        let opus_channels = if channels == 1 {
            opus::Channels::Mono
        } else {
            opus::Channels::Stereo
        };
        let channels = if channels == 1 { 1 } else { 2 };
        Ok(Self {
            decoder: opus::Decoder::new(OPUS_SAMPLE_RATE, opus_channels)?,
            channels,
            pcm_buf: vec![0.0; MAX_FRAME_SIZE * channels],
        })
    }

    /// Decode one packet. `rtp_timestamp` is in 48 kHz ticks.
    pub fn decode(&mut self, packet: &[u8], rtp_timestamp: u32) -> Result<AudioFrame> {
        let samples_per_ch = self.decoder.decode_float(packet, &mut self.pcm_buf, false)?;
        let timestamp_us = rtp_timestamp as i64 * 1_000_000 / OPUS_SAMPLE_RATE as i64;
        let frame = AudioFrame::from_interleaved(
            timestamp_us,
            OPUS_SAMPLE_RATE,
            self.channels,
            &self.pcm_buf[..samples_per_ch * self.channels],
        )?;
        Ok(frame)
    }
}
