//! [`MediaSession`] backed by a `webrtc` peer connection.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::{RTCRtpTransceiver, RTCRtpTransceiverInit};
use webrtc::track::track_remote::TrackRemote;

use super::opus_decoder::OpusFrameDecoder;
use crate::audio::AudioFrame;
use crate::connection::{
    InboundTrack, MediaSession, SessionEvents, SessionFactory, TrackKind, TransportState,
};
use crate::peer::PeerId;
use crate::protocol::{IceCandidate, SdpKind, SessionDescription};

/// Decoded frames buffered between the RTP reader and the transform.
const TRACK_QUEUE_FRAMES: usize = 32;

/// Inbound audio is decoded mono; the transform upmixes to stereo.
const DECODE_CHANNELS: usize = 1;

pub struct WebRtcSessionFactory {
    api: API,
    config: RTCConfiguration,
}

impl WebRtcSessionFactory {
    pub fn new(ice_servers: &[String]) -> Result<Self> {
        let mut media = MediaEngine::default();
        media.register_default_codecs()?;
        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media)?;
        let api = APIBuilder::new()
            .with_media_engine(media)
            .with_interceptor_registry(registry)
            .build();

        let ice_servers = if ice_servers.is_empty() {
            Vec::new()
        } else {
            vec![RTCIceServer {
                urls: ice_servers.to_vec(),
                ..Default::default()
            }]
        };
        let config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };
        Ok(Self { api, config })
    }
}

#[async_trait]
impl SessionFactory for WebRtcSessionFactory {
    async fn create(&self, peer: &PeerId, events: SessionEvents) -> Result<Arc<dyn MediaSession>> {
        let pc = Arc::new(self.api.new_peer_connection(self.config.clone()).await?);

        // Local capture is not wired up; receive only.
        pc.add_transceiver_from_kind(
            RTPCodecType::Audio,
            Some(RTCRtpTransceiverInit {
                direction: RTCRtpTransceiverDirection::Recvonly,
                send_encodings: vec![],
            }),
        )
        .await?;

        let ev = events.clone();
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            ev.state_changed(transport_state(state));
            Box::pin(async {})
        }));

        let ev = events.clone();
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let ev = ev.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else {
                    return;
                };
                match candidate.to_json() {
                    Ok(init) => ev.local_candidate(IceCandidate {
                        candidate: init.candidate,
                        sdp_mid: init.sdp_mid,
                        sdp_mline_index: init.sdp_mline_index,
                        username_fragment: init.username_fragment,
                    }),
                    Err(e) => log::warn!("Failed to serialize local candidate for {}: {}", ev.peer(), e),
                }
            })
        }));

        let ev = events;
        pc.on_track(Box::new(
            move |track: Arc<TrackRemote>, _receiver: Arc<RTCRtpReceiver>, _transceiver: Arc<RTCRtpTransceiver>| {
                let ev = ev.clone();
                Box::pin(async move {
                    let kind = if track.kind() == RTPCodecType::Audio {
                        TrackKind::Audio
                    } else {
                        TrackKind::Video
                    };
                    let (tx, rx) = mpsc::channel(TRACK_QUEUE_FRAMES);
                    if kind == TrackKind::Audio {
                        tokio::spawn(read_track(track.clone(), tx));
                    }
                    ev.track(InboundTrack {
                        id: track.id(),
                        kind,
                        frames: rx,
                    });
                })
            },
        ));

        log::debug!("Peer connection created for {}", peer);
        Ok(Arc::new(WebRtcSession { pc }))
    }
}

fn transport_state(state: RTCPeerConnectionState) -> TransportState {
    match state {
        RTCPeerConnectionState::Connecting => TransportState::Connecting,
        RTCPeerConnectionState::Connected => TransportState::Connected,
        RTCPeerConnectionState::Disconnected => TransportState::Disconnected,
        RTCPeerConnectionState::Failed => TransportState::Failed,
        RTCPeerConnectionState::Closed => TransportState::Closed,
        _ => TransportState::New,
    }
}

/// RTP → Opus decode → frames, until the track ends or the consumer goes away.
async fn read_track(track: Arc<TrackRemote>, tx: mpsc::Sender<AudioFrame>) {
    let mut decoder = match OpusFrameDecoder::new(DECODE_CHANNELS) {
        Ok(decoder) => decoder,
        Err(e) => {
            log::error!("Failed to create Opus decoder: {}", e);
            return;
        }
    };
    loop {
        let packet = match track.read_rtp().await {
            Ok((packet, _)) => packet,
            Err(e) => {
                log::info!("Track {} ended: {}", track.id(), e);
                break;
            }
        };
        if packet.payload.is_empty() {
            continue;
        }
        match decoder.decode(&packet.payload, packet.header.timestamp) {
            Ok(frame) => {
                if tx.send(frame).await.is_err() {
                    break;
                }
            }
            Err(e) => log::warn!("Opus decode error: {}", e),
        }
    }
}

struct WebRtcSession {
    pc: Arc<RTCPeerConnection>,
}

fn to_rtc(desc: SessionDescription) -> Result<RTCSessionDescription> {
    Ok(match desc.kind {
        SdpKind::Offer => RTCSessionDescription::offer(desc.sdp)?,
        SdpKind::Answer => RTCSessionDescription::answer(desc.sdp)?,
    })
}

#[async_trait]
impl MediaSession for WebRtcSession {
    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self.pc.create_offer(None).await?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self.pc.create_answer(None).await?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        self.pc.set_local_description(to_rtc(desc)?).await?;
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        self.pc.set_remote_description(to_rtc(desc)?).await?;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.pc
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: candidate.candidate,
                sdp_mid: candidate.sdp_mid,
                sdp_mline_index: candidate.sdp_mline_index,
                username_fragment: candidate.username_fragment,
            })
            .await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.pc.close().await?;
        Ok(())
    }
}
