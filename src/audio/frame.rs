//! Planar audio blocks and the reusable staging buffer the kernel works on.

use crate::error::PipelineError;

/// Maximum block the default buffer holds: stereo, 2048 frames.
pub const DEFAULT_BUFFER_CAPACITY: usize = 2 * 2048;

/// Channel count the kernel always produces.
pub const OUTPUT_CHANNELS: usize = 2;

/// One decoded block of audio.
///
/// Samples are planar: channel 0 occupies `samples[0..frame_count]`, channel 1
/// the next `frame_count` samples, and so on.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// Presentation timestamp in microseconds
    pub timestamp_us: i64,
    pub sample_rate: u32,
    pub channel_count: usize,
    pub frame_count: usize,
    pub samples: Vec<f32>,
}

impl AudioFrame {
    pub fn new(
        timestamp_us: i64,
        sample_rate: u32,
        channel_count: usize,
        frame_count: usize,
        samples: Vec<f32>,
    ) -> Result<Self, PipelineError> {
        let frame = Self {
            timestamp_us,
            sample_rate,
            channel_count,
            frame_count,
            samples,
        };
        frame.validate()?;
        Ok(frame)
    }

    /// A block of digital silence.
    pub fn silence(timestamp_us: i64, sample_rate: u32, channel_count: usize, frame_count: usize) -> Self {
        Self {
            timestamp_us,
            sample_rate,
            channel_count,
            frame_count,
            samples: vec![0.0; channel_count * frame_count],
        }
    }

    /// Build a planar frame from interleaved samples.
    pub fn from_interleaved(
        timestamp_us: i64,
        sample_rate: u32,
        channel_count: usize,
        interleaved: &[f32],
    ) -> Result<Self, PipelineError> {
        if channel_count == 0 {
            return Err(PipelineError::MalformedFrame("zero channels".into()));
        }
        let frame_count = interleaved.len() / channel_count;
        let mut samples = vec![0.0; channel_count * frame_count];
        for (i, chunk) in interleaved.chunks_exact(channel_count).enumerate() {
            for (ch, &s) in chunk.iter().enumerate() {
                samples[ch * frame_count + i] = s;
            }
        }
        Self::new(timestamp_us, sample_rate, channel_count, frame_count, samples)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.channel_count == 0 {
            return Err(PipelineError::MalformedFrame("zero channels".into()));
        }
        if self.sample_rate == 0 {
            return Err(PipelineError::MalformedFrame("zero sample rate".into()));
        }
        if self.samples.len() != self.channel_count * self.frame_count {
            return Err(PipelineError::MalformedFrame(format!(
                "{} samples for {} channels x {} frames",
                self.samples.len(),
                self.channel_count,
                self.frame_count
            )));
        }
        Ok(())
    }

    #[inline]
    pub fn plane(&self, ch: usize) -> &[f32] {
        let start = ch * self.frame_count;
        &self.samples[start..start + self.frame_count]
    }

    /// Interleave into the layout sound cards expect.
    pub fn to_interleaved(&self) -> Vec<f32> {
        let mut out = vec![0.0; self.samples.len()];
        for ch in 0..self.channel_count {
            for (i, &s) in self.plane(ch).iter().enumerate() {
                out[i * self.channel_count + ch] = s;
            }
        }
        out
    }

    pub fn duration_us(&self) -> i64 {
        self.frame_count as i64 * 1_000_000 / self.sample_rate.max(1) as i64
    }
}

/// Reusable staging block: header plus planar sample storage sized once.
///
/// Invariant: `channel_count * frame_count <= capacity()`.
#[derive(Debug)]
pub struct FrameBuffer {
    pub channel_count: usize,
    pub frame_count: usize,
    pub sample_rate: u32,
    samples: Vec<f32>,
}

impl FrameBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channel_count: 0,
            frame_count: 0,
            sample_rate: 0,
            samples: vec![0.0; capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.samples.len()
    }

    /// Copy a frame's header and planes into the buffer.
    ///
    /// The block must leave room for the stereo output the kernel writes, so a
    /// mono frame needs `2 * frame_count` samples of capacity.
    pub fn stage(&mut self, frame: &AudioFrame) -> Result<(), PipelineError> {
        frame.validate()?;
        let needed = frame.channel_count.max(OUTPUT_CHANNELS) * frame.frame_count;
        if needed > self.capacity() {
            return Err(PipelineError::CapacityExceeded {
                channels: frame.channel_count,
                frames: frame.frame_count,
                capacity: self.capacity(),
            });
        }
        self.channel_count = frame.channel_count;
        self.frame_count = frame.frame_count;
        self.sample_rate = frame.sample_rate;
        self.samples[..frame.samples.len()].copy_from_slice(&frame.samples);
        Ok(())
    }

    #[inline]
    pub fn plane(&self, ch: usize) -> &[f32] {
        let start = ch * self.frame_count;
        &self.samples[start..start + self.frame_count]
    }

    /// The staged region, `channel_count * frame_count` samples.
    pub fn data(&self) -> &[f32] {
        &self.samples[..self.channel_count * self.frame_count]
    }

    /// Whole backing storage; the kernel may write past the staged channels.
    pub(crate) fn storage_mut(&mut self) -> &mut [f32] {
        &mut self.samples
    }

    /// Read the buffer back into an outbound frame carrying `timestamp_us`.
    pub fn read_back(&self, timestamp_us: i64) -> AudioFrame {
        AudioFrame {
            timestamp_us,
            sample_rate: self.sample_rate,
            channel_count: self.channel_count,
            frame_count: self.frame_count,
            samples: self.data().to_vec(),
        }
    }
}
