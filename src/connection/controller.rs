use std::sync::Arc;

use tokio::sync::mpsc;

use super::session::{
    ControllerEvent, ControllerEventKind, InboundTrack, MediaSession, SessionEvents,
    SessionFactory, TrackKind, TransportState,
};
use super::state::{ConnectionState, StatusListener};
use crate::audio::{AudioOutput, ReleaseCounter, TransformConfig, TransformHandle};
use crate::error::{ControllerError, NegotiationError, NegotiationStep};
use crate::peer::PeerId;
use crate::protocol::{IceCandidate, SdpKind, SessionDescription, SignalPayload};
use crate::signaling::SignalingClient;

/// Remote candidates held back until the remote description is applied.
pub const MAX_PENDING_CANDIDATES: usize = 64;

/// Collaborators shared by every controller.
pub struct ControllerContext {
    pub sessions: Arc<dyn SessionFactory>,
    pub signaling: Arc<dyn SignalingClient>,
    pub output: Arc<dyn AudioOutput>,
    pub status: Arc<dyn StatusListener>,
    pub transform: TransformConfig,
    pub events: mpsc::UnboundedSender<ControllerEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Offerer,
    Answerer,
}

/// Negotiation state machine for one peer.
///
/// Owns at most one media session and at most one transform pipeline. Async
/// negotiation steps run on spawned tasks and come back as
/// [`ControllerEvent`]s tagged with the session generation; results for a
/// session that has since been replaced or closed are dropped.
pub struct ConnectionController {
    peer: PeerId,
    ctx: Arc<ControllerContext>,
    state: ConnectionState,
    session: Option<Arc<dyn MediaSession>>,
    generation: u64,
    role: Option<Role>,
    remote_applied: bool,
    pending_candidates: Vec<IceCandidate>,
    // State to fall back to if the opening offer/answer step fails.
    rollback: Option<ConnectionState>,
    transform: Option<TransformHandle>,
    tearing_down: bool,
    torn_down: bool,
}

impl ConnectionController {
    pub fn new(peer: PeerId, ctx: Arc<ControllerContext>) -> Self {
        Self {
            peer,
            ctx,
            state: ConnectionState::Idle,
            session: None,
            generation: 0,
            role: None,
            remote_applied: false,
            pending_candidates: Vec::new(),
            rollback: None,
            transform: None,
            tearing_down: false,
            torn_down: false,
        }
    }

    pub fn peer(&self) -> &PeerId {
        &self.peer
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn has_live_transform(&self) -> bool {
        self.transform.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn transform(&self) -> Option<&TransformHandle> {
        self.transform.as_ref()
    }

    pub fn transform_release_counter(&self) -> Option<ReleaseCounter> {
        self.transform.as_ref().and_then(TransformHandle::release_counter)
    }

    pub fn pending_candidates(&self) -> usize {
        self.pending_candidates.len()
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    fn has_live_session(&self) -> bool {
        self.session.is_some() && self.state.is_live()
    }

    /// The UI toggle: hang up a live connection, otherwise start one.
    pub async fn toggle(&mut self) -> Result<(), ControllerError> {
        if self.has_live_session() {
            self.disconnect().await;
            Ok(())
        } else {
            self.connect().await
        }
    }

    /// Open a session and send an offer.
    pub async fn connect(&mut self) -> Result<(), ControllerError> {
        if self.torn_down {
            return Err(ControllerError::TornDown(self.peer.clone()));
        }
        if self.has_live_session() {
            return Err(ControllerError::SessionExists(self.peer.clone()));
        }

        let prior = self.state;
        let session = self.open_session().await?;
        self.role = Some(Role::Offerer);
        self.rollback = Some(prior);
        self.set_state(ConnectionState::Negotiating);
        log::info!("Connecting to {}: creating offer", self.peer);

        let events = self.session_events();
        tokio::spawn(async move {
            let result = async {
                let offer = session
                    .create_offer()
                    .await
                    .map_err(|e| NegotiationError::new(NegotiationStep::CreateOffer, e))?;
                session
                    .set_local_description(offer.clone())
                    .await
                    .map_err(|e| NegotiationError::new(NegotiationStep::SetLocalDescription, e))?;
                Ok::<_, NegotiationError>(offer)
            }
            .await;
            report_local_description(&events, result);
        });
        Ok(())
    }

    /// Close the session and any transform, back to Idle.
    pub async fn disconnect(&mut self) {
        if self.torn_down || self.tearing_down {
            return;
        }
        log::info!("Disconnecting from {}", self.peer);
        self.release_transform();
        self.close_session().await;
        self.set_state(ConnectionState::Idle);
    }

    /// Final release when the peer leaves. Idempotent.
    pub async fn teardown(&mut self) {
        if self.torn_down || self.tearing_down {
            log::debug!("Teardown of {} already done or in progress", self.peer);
            return;
        }
        self.tearing_down = true;
        log::info!("Tearing down controller for {}", self.peer);
        self.release_transform();
        self.close_session().await;
        self.set_state(ConnectionState::Closed);
        self.torn_down = true;
        self.tearing_down = false;
    }

    /// Apply an inbound signal from this peer.
    pub async fn handle_signal(&mut self, payload: SignalPayload) -> Result<(), ControllerError> {
        if self.torn_down {
            log::debug!("Ignoring {} from {}: controller torn down", payload.kind(), self.peer);
            return Ok(());
        }
        match payload {
            SignalPayload::Offer { sdp } => self.accept_offer(sdp).await,
            SignalPayload::Answer { sdp } => {
                self.accept_answer(sdp);
                Ok(())
            }
            SignalPayload::Candidate { candidate } => {
                self.accept_candidate(candidate);
                Ok(())
            }
        }
    }

    async fn accept_offer(&mut self, sdp: String) -> Result<(), ControllerError> {
        if self.has_live_session() {
            // First offer wins; a competing offer is dropped, not answered.
            log::warn!("Ignoring offer from {}: session already {}", self.peer, self.state);
            return Ok(());
        }

        let prior = self.state;
        let session = self.open_session().await?;
        self.role = Some(Role::Answerer);
        self.rollback = Some(prior);
        self.set_state(ConnectionState::Negotiating);
        log::info!("Offer from {}: creating answer", self.peer);

        let events = self.session_events();
        tokio::spawn(async move {
            let result = async {
                session
                    .set_remote_description(SessionDescription::offer(sdp))
                    .await
                    .map_err(|e| NegotiationError::new(NegotiationStep::SetRemoteDescription, e))?;
                events.emit(ControllerEventKind::RemoteDescriptionApplied);
                let answer = session
                    .create_answer()
                    .await
                    .map_err(|e| NegotiationError::new(NegotiationStep::CreateAnswer, e))?;
                session
                    .set_local_description(answer.clone())
                    .await
                    .map_err(|e| NegotiationError::new(NegotiationStep::SetLocalDescription, e))?;
                Ok::<_, NegotiationError>(answer)
            }
            .await;
            report_local_description(&events, result);
        });
        Ok(())
    }

    fn accept_answer(&mut self, sdp: String) {
        let Some(session) = self.session.clone() else {
            log::debug!("Ignoring answer from {}: no session", self.peer);
            return;
        };
        if self.role != Some(Role::Offerer) || self.remote_applied || self.state != ConnectionState::Negotiating {
            log::warn!("Ignoring unexpected answer from {} in state {}", self.peer, self.state);
            return;
        }

        let events = self.session_events();
        tokio::spawn(async move {
            match session.set_remote_description(SessionDescription::answer(sdp)).await {
                Ok(()) => events.emit(ControllerEventKind::RemoteDescriptionApplied),
                Err(e) => events.emit(ControllerEventKind::NegotiationFailed(NegotiationError::new(
                    NegotiationStep::SetRemoteDescription,
                    e,
                ))),
            }
        });
    }

    fn accept_candidate(&mut self, candidate: IceCandidate) {
        if self.session.is_none() {
            log::debug!("Dropping candidate from {}: no session", self.peer);
            return;
        }
        if self.remote_applied {
            self.add_remote_candidate(candidate);
        } else if self.pending_candidates.len() < MAX_PENDING_CANDIDATES {
            self.pending_candidates.push(candidate);
        } else {
            log::warn!("Dropping candidate from {}: pending queue full", self.peer);
        }
    }

    fn add_remote_candidate(&self, candidate: IceCandidate) {
        let Some(session) = self.session.clone() else {
            return;
        };
        let peer = self.peer.clone();
        tokio::spawn(async move {
            if let Err(e) = session.add_ice_candidate(candidate).await {
                log::warn!("{}", NegotiationError::new(NegotiationStep::AddIceCandidate, format!("{}: {}", peer, e)));
            }
        });
    }

    /// Apply an event reported by this controller's session or one of its
    /// negotiation tasks.
    pub async fn handle_event(&mut self, generation: u64, kind: ControllerEventKind) {
        if self.torn_down || self.session.is_none() || generation != self.generation {
            log::debug!(
                "Dropping stale event for {} (generation {}, current {})",
                self.peer,
                generation,
                self.generation
            );
            return;
        }

        match kind {
            ControllerEventKind::Transport(state) => self.on_transport_state(state),
            ControllerEventKind::LocalCandidate(candidate) => {
                self.send_signal(SignalPayload::Candidate { candidate }).await;
            }
            ControllerEventKind::LocalDescription(desc) => {
                self.rollback = None;
                let kind = desc.kind;
                self.send_signal(desc.into()).await;
                if kind == SdpKind::Answer {
                    log::info!("Answer sent to {}", self.peer);
                }
            }
            ControllerEventKind::RemoteDescriptionApplied => {
                self.remote_applied = true;
                for candidate in std::mem::take(&mut self.pending_candidates) {
                    self.add_remote_candidate(candidate);
                }
            }
            ControllerEventKind::NegotiationFailed(err) => self.on_negotiation_failed(err).await,
            ControllerEventKind::Track(track) => self.on_track(track),
        }
    }

    fn on_transport_state(&mut self, state: TransportState) {
        log::debug!("Transport state for {}: {:?}", self.peer, state);
        let Some(next) = ConnectionState::from_transport(state) else {
            return;
        };
        if next != ConnectionState::Connected {
            self.release_transform();
        }
        self.set_state(next);
    }

    async fn on_negotiation_failed(&mut self, err: NegotiationError) {
        log::error!("Negotiation with {} failed: {}", self.peer, err);
        // Opening step failed: drop the half-built session and restore the
        // prior state. Later failures leave the negotiation where it was.
        if let Some(prior) = self.rollback.take() {
            self.release_transform();
            self.close_session().await;
            self.set_state(prior);
        }
    }

    fn on_track(&mut self, track: InboundTrack) {
        if !self.state.is_live() {
            log::debug!("Ignoring track {} from {} in state {}", track.id, self.peer, self.state);
            return;
        }
        if track.kind != TrackKind::Audio {
            log::debug!("Ignoring non-audio track {} from {}", track.id, self.peer);
            return;
        }
        if self.transform.is_some() {
            log::warn!("Replacing existing transform for {}", self.peer);
            self.release_transform();
        }

        let sink = match self.ctx.output.open(&self.peer) {
            Ok(sink) => sink,
            Err(e) => {
                log::error!("Failed to open audio output for {}: {}", self.peer, e);
                return;
            }
        };
        let session = self
            .ctx
            .transform
            .enabled
            .then(|| self.ctx.transform.randomized_session());
        log::info!("Inbound audio track {} from {}", track.id, self.peer);
        self.transform = Some(TransformHandle::spawn(self.peer.to_string(), session, track.frames, sink));
    }

    async fn open_session(&mut self) -> Result<Arc<dyn MediaSession>, ControllerError> {
        // Leftover from a dead connection (failed/disconnected/closed).
        if self.session.is_some() {
            self.release_transform();
            self.close_session().await;
        }

        let generation = self.generation + 1;
        let events = SessionEvents::new(self.peer.clone(), generation, self.ctx.events.clone());
        let session = self
            .ctx
            .sessions
            .create(&self.peer, events)
            .await
            .map_err(|e| {
                let err = NegotiationError::new(NegotiationStep::CreateSession, e);
                log::error!("Negotiation with {} failed: {}", self.peer, err);
                err
            })?;

        self.generation = generation;
        self.session = Some(session.clone());
        self.remote_applied = false;
        self.pending_candidates.clear();
        Ok(session)
    }

    async fn close_session(&mut self) {
        self.role = None;
        self.remote_applied = false;
        self.rollback = None;
        self.pending_candidates.clear();
        if let Some(session) = self.session.take() {
            if let Err(e) = session.close().await {
                log::warn!("Closing session with {} failed: {}", self.peer, e);
            }
        }
    }

    fn release_transform(&mut self) {
        if let Some(mut transform) = self.transform.take() {
            transform.stop();
        }
    }

    fn session_events(&self) -> SessionEvents {
        SessionEvents::new(self.peer.clone(), self.generation, self.ctx.events.clone())
    }

    async fn send_signal(&self, payload: SignalPayload) {
        let kind = payload.kind();
        if let Err(e) = self.ctx.signaling.send(&self.peer, payload).await {
            log::error!("Failed to send {} to {}: {}", kind, self.peer, e);
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state == state {
            return;
        }
        log::info!("Peer {}: {} -> {}", self.peer, self.state, state);
        self.state = state;
        self.ctx.status.state_changed(&self.peer, state);
    }
}

fn report_local_description(events: &SessionEvents, result: Result<SessionDescription, NegotiationError>) {
    match result {
        Ok(desc) => events.emit(ControllerEventKind::LocalDescription(desc)),
        Err(err) => events.emit(ControllerEventKind::NegotiationFailed(err)),
    }
}
