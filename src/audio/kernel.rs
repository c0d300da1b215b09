//! Pulse-tone synthesis kernel.
//!
//! Adds `amp * sin(tone) * sin²(pulse)` to the first two planes of a staged
//! block, clamps to `[-1, 1]`, and always leaves a stereo block behind. Mono
//! input is upmixed: the single plane feeds both ears.

use super::frame::{FrameBuffer, OUTPUT_CHANNELS};
use super::oscillator::Oscillator;

/// Peak amplitude of the synthesised signal before the left/right split.
pub const SIGNAL_AMPLITUDE: f32 = 0.5;

/// Default share of the signal sent to the right ear.
pub const DEFAULT_RIGHT_SHIFT: f32 = 0.1;

/// Blend pulse and tone into `buffer` and advance both oscillators by one block.
///
/// `right_shift` places the synthesised source between the ears: 0.0 is fully
/// left, 1.0 fully right. Deterministic for a given oscillator state and block.
pub fn blend(pulse: &mut Oscillator, tone: &mut Oscillator, buffer: &mut FrameBuffer, right_shift: f32) {
    let num_channels = buffer.channel_count;
    let num_frames = buffer.frame_count;
    let dt = 1.0 / buffer.sample_rate as f32;

    let right_shift = right_shift.clamp(0.0, 1.0);

    // Processed as [right, left]: with mono input both read plane 0, so the
    // right plane has to be written before plane 0 is overwritten.
    let output_offsets = [num_frames, 0];
    let input_offsets = if num_channels >= OUTPUT_CHANNELS {
        [num_frames, 0]
    } else {
        [0, 0]
    };
    let amplitudes = [
        SIGNAL_AMPLITUDE * right_shift,
        SIGNAL_AMPLITUDE * (1.0 - right_shift),
    ];

    let data = buffer.storage_mut();
    for ((&input_offset, &output_offset), &amplitude) in input_offsets
        .iter()
        .zip(output_offsets.iter())
        .zip(amplitudes.iter())
    {
        for j in 0..num_frames {
            let t = j as f32 * dt;
            let a = tone.sin_at(t);
            let b = pulse.sin_at(t);
            let signal = amplitude * a * b * b;
            data[output_offset + j] = (data[input_offset + j] + signal).clamp(-1.0, 1.0);
        }
    }

    buffer.channel_count = OUTPUT_CHANNELS;

    let block_seconds = num_frames as f32 * dt;
    tone.advance(block_seconds);
    pulse.advance(block_seconds);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::frame::{AudioFrame, DEFAULT_BUFFER_CAPACITY};

    fn staged(frame: &AudioFrame) -> FrameBuffer {
        let mut buffer = FrameBuffer::with_capacity(DEFAULT_BUFFER_CAPACITY);
        buffer.stage(frame).unwrap();
        buffer
    }

    #[test]
    fn mono_input_is_upmixed_to_stereo() {
        let frame = AudioFrame::new(0, 48000, 1, 4, vec![0.25; 4]).unwrap();
        let mut buffer = staged(&frame);
        let mut pulse = Oscillator::new(1.0);
        let mut tone = Oscillator::new(100.0);
        blend(&mut pulse, &mut tone, &mut buffer, DEFAULT_RIGHT_SHIFT);

        assert_eq!(buffer.channel_count, 2);
        assert_eq!(buffer.frame_count, 4);
        // Both phases start at zero, so the first sample carries no signal.
        assert_eq!(buffer.plane(0)[0], 0.25);
        assert_eq!(buffer.plane(1)[0], 0.25);
    }

    #[test]
    fn right_ear_gets_the_attenuated_share() {
        let frame = AudioFrame::silence(0, 48000, 2, 256);
        let mut buffer = staged(&frame);
        let mut pulse = Oscillator { omega: 0.0, phase: std::f32::consts::FRAC_PI_2 };
        let mut tone = Oscillator { omega: 0.0, phase: std::f32::consts::FRAC_PI_2 };
        blend(&mut pulse, &mut tone, &mut buffer, 0.1);

        // sin(π/2) == 1 for both oscillators, so every sample equals its amplitude.
        assert!((buffer.plane(0)[10] - 0.45).abs() < 1e-6);
        assert!((buffer.plane(1)[10] - 0.05).abs() < 1e-6);
    }

    #[test]
    fn output_is_clamped() {
        let frame = AudioFrame::new(0, 48000, 2, 1, vec![0.99, -0.99]).unwrap();
        let mut buffer = staged(&frame);
        let mut pulse = Oscillator { omega: 0.0, phase: std::f32::consts::FRAC_PI_2 };
        let mut tone = Oscillator { omega: 0.0, phase: std::f32::consts::FRAC_PI_2 };
        blend(&mut pulse, &mut tone, &mut buffer, 0.0);
        assert_eq!(buffer.plane(0)[0], 1.0);
        assert_eq!(buffer.plane(1)[0], -0.99);
    }

    #[test]
    fn phases_advance_by_one_block() {
        let frame = AudioFrame::silence(0, 48000, 2, 480);
        let mut buffer = staged(&frame);
        let mut pulse = Oscillator::new(1.0);
        let mut tone = Oscillator::new(100.0);
        blend(&mut pulse, &mut tone, &mut buffer, DEFAULT_RIGHT_SHIFT);

        // 10 ms block: pulse turns 0.01 of a cycle, tone exactly one cycle.
        assert!((pulse.phase - std::f32::consts::TAU * 0.01).abs() < 1e-4);
        assert!(tone.phase < 1e-3 || (std::f32::consts::TAU - tone.phase) < 1e-3);
    }

    #[test]
    fn blend_is_deterministic() {
        let frame = AudioFrame::new(0, 44100, 2, 3, vec![0.1, 0.2, 0.3, -0.1, -0.2, -0.3]).unwrap();
        let run = || {
            let mut buffer = staged(&frame);
            let mut pulse = Oscillator { omega: 5.0, phase: 0.3 };
            let mut tone = Oscillator { omega: 900.0, phase: 1.1 };
            blend(&mut pulse, &mut tone, &mut buffer, 0.3);
            (buffer.data().to_vec(), pulse, tone)
        };
        assert_eq!(run(), run());
    }
}
