//! Per-connection transform stage.
//!
//! A [`TransformSession`] owns the two oscillators and the staging buffer and
//! turns one inbound block into exactly one outbound block. The pipeline task
//! spawned by [`TransformHandle::spawn`] pulls frames from the track source,
//! runs them through the session in order, and pushes them to the output sink.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use rand::Rng;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::frame::{AudioFrame, FrameBuffer, DEFAULT_BUFFER_CAPACITY};
use super::kernel::{self, DEFAULT_RIGHT_SHIFT};
use super::oscillator::Oscillator;
use crate::error::PipelineError;

/// Inbound decoded frames of one remote track.
pub type FrameSource = mpsc::Receiver<AudioFrame>;
/// Where transformed frames go, usually an [`AudioOutput`](super::AudioOutput).
pub type FrameSink = mpsc::Sender<AudioFrame>;

/// Transform settings shared by all connections.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformConfig {
    /// When false inbound audio is passed through untouched.
    pub enabled: bool,
    /// Inclusive pulse rate range in Hz.
    pub pulse_hz: (f32, f32),
    /// Inclusive tone range in Hz.
    pub tone_hz: (f32, f32),
    pub right_shift: f32,
    /// Staging buffer size in samples.
    pub buffer_capacity: usize,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pulse_hz: (0.5, 1.5),
            tone_hz: (60.0, 500.0),
            right_shift: DEFAULT_RIGHT_SHIFT,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

impl TransformConfig {
    /// Build a session with pulse and tone drawn from the configured ranges.
    pub fn randomized_session(&self) -> TransformSession {
        let mut rng = rand::thread_rng();
        let pulse_hz = pick(&mut rng, self.pulse_hz);
        let tone_hz = pick(&mut rng, self.tone_hz);
        TransformSession::new(pulse_hz, tone_hz, self.right_shift, self.buffer_capacity)
    }
}

fn pick(rng: &mut impl Rng, (lo, hi): (f32, f32)) -> f32 {
    if lo < hi { rng.gen_range(lo..=hi) } else { lo }
}

/// Counts how many times a session's resources were released.
#[derive(Debug, Clone, Default)]
pub struct ReleaseCounter(Arc<AtomicUsize>);

impl ReleaseCounter {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn record(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Oscillators plus staging buffer for one connection.
///
/// Dropping the session releases all three; the drop is the only release path.
#[derive(Debug)]
pub struct TransformSession {
    pulse: Oscillator,
    tone: Oscillator,
    buffer: FrameBuffer,
    right_shift: f32,
    released: ReleaseCounter,
}

impl TransformSession {
    pub fn new(pulse_hz: f32, tone_hz: f32, right_shift: f32, buffer_capacity: usize) -> Self {
        log::debug!(
            "Transform session: pulse={:.3}Hz tone={:.1}Hz right_shift={} capacity={}",
            pulse_hz,
            tone_hz,
            right_shift,
            buffer_capacity
        );
        Self {
            pulse: Oscillator::new(pulse_hz),
            tone: Oscillator::new(tone_hz),
            buffer: FrameBuffer::with_capacity(buffer_capacity),
            right_shift,
            released: ReleaseCounter::default(),
        }
    }

    pub fn pulse(&self) -> &Oscillator {
        &self.pulse
    }

    pub fn tone(&self) -> &Oscillator {
        &self.tone
    }

    pub fn release_counter(&self) -> ReleaseCounter {
        self.released.clone()
    }

    /// Stage, blend and read back one block.
    ///
    /// The output keeps the input's timestamp, sample rate and frame count;
    /// its channel count is whatever the kernel wrote (always stereo).
    pub fn process(&mut self, frame: &AudioFrame) -> Result<AudioFrame, PipelineError> {
        self.buffer.stage(frame)?;
        kernel::blend(&mut self.pulse, &mut self.tone, &mut self.buffer, self.right_shift);
        Ok(self.buffer.read_back(frame.timestamp_us))
    }
}

impl Drop for TransformSession {
    fn drop(&mut self) {
        self.released.record();
        log::debug!("Transform session released ({} samples)", self.buffer.capacity());
    }
}

/// Why a pipeline task stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineExit {
    /// Stopped through the handle.
    Stopped,
    /// The track ended.
    SourceEnded,
    Failed(PipelineError),
}

/// Owner's side of a running pipeline. Dropping it stops the pipeline.
#[derive(Debug)]
pub struct TransformHandle {
    label: String,
    abort: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<PipelineExit>>,
    released: Option<ReleaseCounter>,
    frames_out: Arc<AtomicU64>,
}

impl TransformHandle {
    /// Start pumping `source` into `sink`.
    ///
    /// With `session == None` frames pass through unchanged.
    pub fn spawn(
        label: impl Into<String>,
        session: Option<TransformSession>,
        source: FrameSource,
        sink: FrameSink,
    ) -> Self {
        let label = label.into();
        let (abort_tx, abort_rx) = oneshot::channel();
        let released = session.as_ref().map(TransformSession::release_counter);
        let frames_out = Arc::new(AtomicU64::new(0));
        let task = tokio::spawn(run_pipeline(
            label.clone(),
            session,
            source,
            sink,
            abort_rx,
            frames_out.clone(),
        ));
        Self {
            label,
            abort: Some(abort_tx),
            task: Some(task),
            released,
            frames_out,
        }
    }

    /// Signal the pipeline to stop. Safe to call any number of times.
    pub fn stop(&mut self) {
        if let Some(abort) = self.abort.take() {
            log::debug!("Stopping transform pipeline for {}", self.label);
            let _ = abort.send(());
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Release count of the owned session; `None` for pass-through pipelines.
    pub fn released(&self) -> Option<usize> {
        self.released.as_ref().map(ReleaseCounter::count)
    }

    pub fn release_counter(&self) -> Option<ReleaseCounter> {
        self.released.clone()
    }

    pub fn frames_out(&self) -> u64 {
        self.frames_out.load(Ordering::Relaxed)
    }

    /// Wait for the pipeline task to finish.
    pub async fn join(mut self) -> PipelineExit {
        let Some(task) = self.task.take() else {
            return PipelineExit::Stopped;
        };
        match task.await {
            Ok(exit) => exit,
            Err(e) => {
                log::error!("Transform pipeline task for {} panicked: {}", self.label, e);
                PipelineExit::Stopped
            }
        }
    }
}

impl Drop for TransformHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_pipeline(
    label: String,
    mut session: Option<TransformSession>,
    mut source: FrameSource,
    sink: FrameSink,
    mut abort: oneshot::Receiver<()>,
    frames_out: Arc<AtomicU64>,
) -> PipelineExit {
    log::info!(
        "Transform pipeline started for {} ({})",
        label,
        if session.is_some() { "pulse-tone" } else { "pass-through" }
    );

    let exit = loop {
        // A dropped handle also resolves `abort`, which counts as a stop.
        let frame = tokio::select! {
            biased;
            _ = &mut abort => break PipelineExit::Stopped,
            frame = source.recv() => match frame {
                Some(frame) => frame,
                None => break PipelineExit::SourceEnded,
            },
        };

        let out = match session.as_mut() {
            Some(stage) => match stage.process(&frame) {
                Ok(out) => out,
                Err(e) => break PipelineExit::Failed(e),
            },
            None => frame,
        };

        tokio::select! {
            biased;
            _ = &mut abort => break PipelineExit::Stopped,
            sent = sink.send(out) => {
                if sent.is_err() {
                    break PipelineExit::Failed(PipelineError::SinkClosed);
                }
                frames_out.fetch_add(1, Ordering::Relaxed);
            }
        }
    };

    // Single teardown path for every exit branch.
    source.close();
    drop(sink);
    drop(session.take());

    match &exit {
        PipelineExit::Failed(e) => log::error!("Transform pipeline for {} aborted: {}", label, e),
        other => log::info!(
            "Transform pipeline for {} finished: {:?} after {} frames",
            label,
            other,
            frames_out.load(Ordering::Relaxed)
        ),
    }
    exit
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stereo_block(timestamp_us: i64) -> AudioFrame {
        AudioFrame::silence(timestamp_us, 48000, 2, 1024)
    }

    #[test]
    fn process_keeps_timing_and_emits_stereo() {
        let mut session = TransformSession::new(1.0, 220.0, DEFAULT_RIGHT_SHIFT, DEFAULT_BUFFER_CAPACITY);
        let out = session.process(&stereo_block(21_333)).unwrap();
        assert_eq!(out.sample_rate, 48000);
        assert_eq!(out.frame_count, 1024);
        assert_eq!(out.channel_count, 2);
        assert_eq!(out.timestamp_us, 21_333);
        assert_eq!(out.samples.len(), 2048);
    }

    #[test]
    fn oversize_block_fails_fast() {
        let mut session = TransformSession::new(1.0, 220.0, DEFAULT_RIGHT_SHIFT, DEFAULT_BUFFER_CAPACITY);
        let err = session.process(&AudioFrame::silence(0, 48000, 2, 2049)).unwrap_err();
        assert!(matches!(err, PipelineError::CapacityExceeded { .. }));
    }

    #[test]
    fn dropping_session_releases_once() {
        let session = TransformSession::new(1.0, 220.0, DEFAULT_RIGHT_SHIFT, DEFAULT_BUFFER_CAPACITY);
        let counter = session.release_counter();
        assert_eq!(counter.count(), 0);
        drop(session);
        assert_eq!(counter.count(), 1);
    }

    #[test]
    fn randomized_frequencies_stay_in_range() {
        let config = TransformConfig::default();
        for _ in 0..50 {
            let session = config.randomized_session();
            let pulse = session.pulse().frequency_hz();
            let tone = session.tone().frequency_hz();
            assert!((0.5 - 1e-3..=1.5 + 1e-3).contains(&pulse), "pulse {}", pulse);
            assert!((60.0 - 1e-2..=500.0 + 1e-2).contains(&tone), "tone {}", tone);
        }
    }

    #[tokio::test]
    async fn pipeline_is_one_to_one_and_in_order() {
        let (in_tx, in_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let session = TransformConfig::default().randomized_session();
        let handle = TransformHandle::spawn("test", Some(session), in_rx, out_tx);

        for i in 0..5 {
            in_tx.send(stereo_block(i * 21_333)).await.unwrap();
        }
        for i in 0..5 {
            let out = out_rx.recv().await.unwrap();
            assert_eq!(out.timestamp_us, i * 21_333);
            assert_eq!(out.frame_count, 1024);
            assert_eq!(out.sample_rate, 48000);
        }

        drop(in_tx);
        let released = handle.release_counter().unwrap();
        assert_eq!(handle.join().await, PipelineExit::SourceEnded);
        assert_eq!(released.count(), 1);
        assert!(out_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn stop_releases_once_and_suppresses_output() {
        let (in_tx, in_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let session = TransformConfig::default().randomized_session();
        let mut handle = TransformHandle::spawn("test", Some(session), in_rx, out_tx);

        in_tx.send(stereo_block(0)).await.unwrap();
        assert!(out_rx.recv().await.is_some());

        handle.stop();
        handle.stop();
        let released = handle.release_counter().unwrap();
        assert_eq!(handle.join().await, PipelineExit::Stopped);
        assert_eq!(released.count(), 1);

        // The source is closed, so nothing more gets in or out.
        assert!(in_tx.send(stereo_block(1)).await.is_err());
        assert!(out_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn stop_while_sink_full_drops_pending_block() {
        let (in_tx, in_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(1);
        let session = TransformConfig::default().randomized_session();
        let mut handle = TransformHandle::spawn("test", Some(session), in_rx, out_tx);

        in_tx.send(stereo_block(0)).await.unwrap();
        in_tx.send(stereo_block(1)).await.unwrap();
        // second block is processed and parked on the full sink
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(handle.frames_out(), 1);

        handle.stop();
        let released = handle.release_counter().unwrap();
        assert_eq!(handle.join().await, PipelineExit::Stopped);
        assert_eq!(released.count(), 1);

        assert_eq!(out_rx.recv().await.unwrap().timestamp_us, 0);
        assert!(out_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn oversize_frame_aborts_pipeline() {
        let (in_tx, in_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let session = TransformConfig::default().randomized_session();
        let handle = TransformHandle::spawn("test", Some(session), in_rx, out_tx);

        in_tx.send(AudioFrame::silence(0, 48000, 2, 4096)).await.unwrap();
        let released = handle.release_counter().unwrap();
        let exit = handle.join().await;
        assert!(matches!(exit, PipelineExit::Failed(PipelineError::CapacityExceeded { .. })));
        assert_eq!(released.count(), 1);
        assert!(out_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn closed_sink_ends_pipeline() {
        let (in_tx, in_rx) = mpsc::channel(8);
        let (out_tx, out_rx) = mpsc::channel(8);
        drop(out_rx);
        let session = TransformConfig::default().randomized_session();
        let handle = TransformHandle::spawn("test", Some(session), in_rx, out_tx);

        in_tx.send(stereo_block(0)).await.unwrap();
        let released = handle.release_counter().unwrap();
        assert_eq!(handle.join().await, PipelineExit::Failed(PipelineError::SinkClosed));
        assert_eq!(released.count(), 1);
    }

    #[tokio::test]
    async fn pass_through_forwards_frames_unchanged() {
        let (in_tx, in_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let handle = TransformHandle::spawn("test", None, in_rx, out_tx);
        assert_eq!(handle.released(), None);

        let frame = AudioFrame::new(5, 16000, 1, 2, vec![0.5, -0.5]).unwrap();
        in_tx.send(frame.clone()).await.unwrap();
        assert_eq!(out_rx.recv().await.unwrap(), frame);
        assert_eq!(handle.frames_out(), 1);
    }
}
