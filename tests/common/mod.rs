#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use lobby_voice::audio::{AudioFrame, AudioOutput, FrameSink, TransformConfig};
use lobby_voice::connection::{
    ConnectionState, ControllerContext, ControllerEvent, InboundTrack, MediaSession,
    PeerStatus, SessionEvents, SessionFactory, StatusListener, TrackKind, TransportState,
};
use lobby_voice::peer::PeerId;
use lobby_voice::protocol::{
    IceCandidate, PeersDelta, SessionDescription, SignalMessage, SignalPayload,
};
use lobby_voice::registry::PeerRegistry;
use lobby_voice::signaling::SignalingClient;

/// Which session call should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    Create,
    CreateOffer,
    CreateAnswer,
    SetRemote,
}

pub struct FakeSession {
    pub peer: PeerId,
    pub events: SessionEvents,
    fail: Option<FailAt>,
    closes: AtomicUsize,
    remote: Mutex<Vec<SessionDescription>>,
    local: Mutex<Vec<SessionDescription>>,
    candidates: Mutex<Vec<IceCandidate>>,
}

impl FakeSession {
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn remote_descriptions(&self) -> Vec<SessionDescription> {
        self.remote.lock().unwrap().clone()
    }

    pub fn local_descriptions(&self) -> Vec<SessionDescription> {
        self.local.lock().unwrap().clone()
    }

    pub fn candidates(&self) -> Vec<IceCandidate> {
        self.candidates.lock().unwrap().clone()
    }

    /// Pretend the transport changed state.
    pub fn transport(&self, state: TransportState) {
        self.events.state_changed(state);
    }

    /// Deliver an inbound audio track; returns the feeding end.
    pub fn audio_track(&self, id: &str) -> mpsc::Sender<AudioFrame> {
        let (tx, rx) = mpsc::channel(8);
        self.events.track(InboundTrack {
            id: id.to_string(),
            kind: TrackKind::Audio,
            frames: rx,
        });
        tx
    }

    /// Deliver an inbound video track.
    pub fn video_track(&self, id: &str) -> mpsc::Sender<AudioFrame> {
        let (tx, rx) = mpsc::channel(8);
        self.events.track(InboundTrack {
            id: id.to_string(),
            kind: TrackKind::Video,
            frames: rx,
        });
        tx
    }

    fn fails(&self, at: FailAt) -> Result<()> {
        if self.fail == Some(at) {
            anyhow::bail!("injected failure at {:?}", at);
        }
        Ok(())
    }
}

#[async_trait]
impl MediaSession for FakeSession {
    async fn create_offer(&self) -> Result<SessionDescription> {
        self.fails(FailAt::CreateOffer)?;
        Ok(SessionDescription::offer(format!("offer-for-{}", self.peer)))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        self.fails(FailAt::CreateAnswer)?;
        Ok(SessionDescription::answer(format!("answer-for-{}", self.peer)))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        self.local.lock().unwrap().push(desc);
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        self.fails(FailAt::SetRemote)?;
        self.remote.lock().unwrap().push(desc);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.candidates.lock().unwrap().push(candidate);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeSessionFactory {
    sessions: Mutex<Vec<Arc<FakeSession>>>,
    fail: Mutex<Option<FailAt>>,
}

impl FakeSessionFactory {
    pub fn fail_at(&self, at: Option<FailAt>) {
        *self.fail.lock().unwrap() = at;
    }

    pub fn sessions(&self) -> Vec<Arc<FakeSession>> {
        self.sessions.lock().unwrap().clone()
    }

    pub fn created(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn last(&self) -> Arc<FakeSession> {
        self.sessions.lock().unwrap().last().cloned().expect("no session created")
    }
}

#[async_trait]
impl SessionFactory for FakeSessionFactory {
    async fn create(&self, peer: &PeerId, events: SessionEvents) -> Result<Arc<dyn MediaSession>> {
        let fail = *self.fail.lock().unwrap();
        if fail == Some(FailAt::Create) {
            anyhow::bail!("injected failure creating session");
        }
        let session = Arc::new(FakeSession {
            peer: peer.clone(),
            events,
            fail,
            closes: AtomicUsize::new(0),
            remote: Mutex::new(Vec::new()),
            local: Mutex::new(Vec::new()),
            candidates: Mutex::new(Vec::new()),
        });
        self.sessions.lock().unwrap().push(session.clone());
        Ok(session)
    }
}

#[derive(Default)]
pub struct RecordingSignaling {
    sent: Mutex<Vec<(PeerId, SignalPayload)>>,
}

impl RecordingSignaling {
    pub fn sent(&self) -> Vec<(PeerId, SignalPayload)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.sent.lock().unwrap().iter().map(|(_, p)| p.kind()).collect()
    }
}

#[async_trait]
impl SignalingClient for RecordingSignaling {
    async fn send(&self, to: &PeerId, payload: SignalPayload) -> Result<()> {
        self.sent.lock().unwrap().push((to.clone(), payload));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingStatus {
    states: Mutex<Vec<(PeerId, ConnectionState)>>,
    lists: Mutex<Vec<Vec<PeerStatus>>>,
}

impl RecordingStatus {
    pub fn states_for(&self, peer: &str) -> Vec<ConnectionState> {
        self.states
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p.as_str() == peer)
            .map(|(_, s)| *s)
            .collect()
    }

    pub fn list_updates(&self) -> usize {
        self.lists.lock().unwrap().len()
    }

    pub fn last_list(&self) -> Vec<PeerStatus> {
        self.lists.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

impl StatusListener for RecordingStatus {
    fn state_changed(&self, peer: &PeerId, state: ConnectionState) {
        self.states.lock().unwrap().push((peer.clone(), state));
    }

    fn peers_changed(&self, peers: &[PeerStatus]) {
        self.lists.lock().unwrap().push(peers.to_vec());
    }
}

/// Collects every frame written to any opened sink.
#[derive(Default, Clone)]
pub struct RecordingOutput {
    frames: Arc<Mutex<Vec<AudioFrame>>>,
    opened: Arc<AtomicUsize>,
}

impl RecordingOutput {
    pub fn frames(&self) -> Vec<AudioFrame> {
        self.frames.lock().unwrap().clone()
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

impl AudioOutput for RecordingOutput {
    fn open(&self, _peer: &PeerId) -> Result<FrameSink> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let (tx, mut rx) = mpsc::channel(16);
        let frames = self.frames.clone();
        tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                frames.lock().unwrap().push(frame);
            }
        });
        Ok(tx)
    }
}

/// A registry wired to fakes, plus the controller event loop the binary
/// would run.
pub struct Harness {
    pub registry: PeerRegistry,
    pub sessions: Arc<FakeSessionFactory>,
    pub signaling: Arc<RecordingSignaling>,
    pub status: Arc<RecordingStatus>,
    pub output: RecordingOutput,
    pub events: mpsc::UnboundedReceiver<ControllerEvent>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_transform(TransformConfig::default())
    }

    pub fn with_transform(transform: TransformConfig) -> Self {
        let (tx, events) = mpsc::unbounded_channel();
        let sessions = Arc::new(FakeSessionFactory::default());
        let signaling = Arc::new(RecordingSignaling::default());
        let status = Arc::new(RecordingStatus::default());
        let output = RecordingOutput::default();
        let ctx = Arc::new(ControllerContext {
            sessions: sessions.clone(),
            signaling: signaling.clone(),
            output: Arc::new(output.clone()),
            status: status.clone(),
            transform,
            events: tx,
        });
        Self {
            registry: PeerRegistry::new(ctx),
            sessions,
            signaling,
            status,
            output,
            events,
        }
    }

    pub async fn enter(&mut self, id: &str, name: &str) -> bool {
        self.registry
            .apply_delta(PeersDelta {
                enter: vec![(PeerId::new(id), name.to_string())],
                exit: vec![],
            })
            .await
    }

    pub async fn exit(&mut self, id: &str) -> bool {
        self.registry
            .apply_delta(PeersDelta {
                enter: vec![],
                exit: vec![PeerId::new(id)],
            })
            .await
    }

    pub async fn signal(&mut self, from: &str, payload: SignalPayload) {
        self.registry
            .dispatch_signal(SignalMessage { from: PeerId::new(from), payload })
            .await;
    }

    pub fn state(&self, id: &str) -> ConnectionState {
        self.registry
            .get(&PeerId::new(id))
            .map(|r| r.controller.state())
            .expect("peer not in registry")
    }

    /// Let spawned tasks run and feed their events back, until quiet.
    pub async fn settle(&mut self) {
        for _ in 0..20 {
            tokio::task::yield_now().await;
            while let Ok(event) = self.events.try_recv() {
                self.registry.dispatch_event(event).await;
            }
        }
    }
}

pub fn candidate(n: u16) -> IceCandidate {
    IceCandidate {
        candidate: format!("candidate:{} 1 udp 2122260223 192.168.1.{} 5000{} typ host", n, n, n),
        sdp_mid: Some("0".into()),
        sdp_mline_index: Some(0),
        username_fragment: None,
    }
}

pub fn stereo_block(timestamp_us: i64, frames: usize) -> AudioFrame {
    let samples = (0..2 * frames).map(|i| ((i % 100) as f32 / 100.0) - 0.5).collect();
    AudioFrame::new(timestamp_us, 48000, 2, frames, samples).unwrap()
}
