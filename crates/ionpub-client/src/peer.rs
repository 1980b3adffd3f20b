//! Negotiation engine backed by a webrtc-rs peer connection

use async_trait::async_trait;
use ionpub_media::LocalTrack;
use ionpub_protocol::{CandidateInit, SdpType, SessionDescription};
use std::sync::Arc;
use tokio::sync::mpsc;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;

use crate::engine::{EngineEvent, EngineEventSender, EngineEvents, NegotiationEngine};
use crate::error::NegotiationError;

/// Publishing peer connection
pub struct PeerEngine {
    peer_connection: Arc<RTCPeerConnection>,
}

impl PeerEngine {
    /// Build the peer connection and subscribe to its callbacks
    ///
    /// The returned receiver yields local candidates and connection state changes.
    pub async fn new(ice_servers: &[String]) -> Result<(Self, EngineEvents), NegotiationError> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;

        let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let ice_servers = if ice_servers.is_empty() {
            vec![]
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

        let peer_connection = Arc::new(api.new_peer_connection(config).await?);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        register_callbacks(&peer_connection, events_tx);

        Ok((Self { peer_connection }, events_rx))
    }

    /// Publish a local track on a send-only transceiver
    pub async fn attach_track(&self, track: &dyn LocalTrack) -> Result<(), NegotiationError> {
        self.peer_connection
            .add_transceiver_from_track(
                track.rtp_track(),
                Some(RTCRtpTransceiverInit {
                    direction: RTCRtpTransceiverDirection::Sendonly,
                    send_encodings: vec![],
                }),
            )
            .await?;

        tracing::info!("Added {} track: {}", track.kind(), track.id());
        Ok(())
    }
}

fn register_callbacks(peer_connection: &RTCPeerConnection, events: EngineEventSender) {
    let candidates = events.clone();
    peer_connection.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
        let tx = candidates.clone();
        Box::pin(async move {
            let candidate = match candidate {
                Some(candidate) => match candidate.to_json() {
                    Ok(init) => Some(from_rtc_candidate(init)),
                    Err(e) => {
                        tracing::warn!("Failed to serialize local ICE candidate: {}", e);
                        return;
                    }
                },
                None => None,
            };
            let _ = tx.send(EngineEvent::LocalCandidate(candidate));
        })
    }));

    let ice_states = events.clone();
    peer_connection.on_ice_connection_state_change(Box::new(
        move |state: RTCIceConnectionState| {
            let _ = ice_states.send(EngineEvent::IceConnectionState(state));
            Box::pin(async {})
        },
    ));

    peer_connection.on_peer_connection_state_change(Box::new(
        move |state: RTCPeerConnectionState| {
            let _ = events.send(EngineEvent::PeerConnectionState(state));
            Box::pin(async {})
        },
    ));
}

fn to_rtc_description(
    description: SessionDescription,
) -> Result<RTCSessionDescription, NegotiationError> {
    let rtc = match description.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(description.sdp)?,
        SdpType::Answer => RTCSessionDescription::answer(description.sdp)?,
        SdpType::Pranswer => RTCSessionDescription::pranswer(description.sdp)?,
        SdpType::Rollback => {
            return Err(NegotiationError::UnsupportedDescription(
                SdpType::Rollback.to_string(),
            ))
        }
    };
    Ok(rtc)
}

fn from_rtc_description(
    description: RTCSessionDescription,
) -> Result<SessionDescription, NegotiationError> {
    let sdp_type = match description.sdp_type {
        RTCSdpType::Offer => SdpType::Offer,
        RTCSdpType::Answer => SdpType::Answer,
        RTCSdpType::Pranswer => SdpType::Pranswer,
        RTCSdpType::Rollback => SdpType::Rollback,
        other => return Err(NegotiationError::UnsupportedDescription(other.to_string())),
    };
    Ok(SessionDescription {
        sdp_type,
        sdp: description.sdp,
    })
}

fn from_rtc_candidate(init: RTCIceCandidateInit) -> CandidateInit {
    CandidateInit {
        candidate: init.candidate,
        sdp_mid: init.sdp_mid,
        sdp_mline_index: init.sdp_mline_index,
        username_fragment: init.username_fragment,
    }
}

fn to_rtc_candidate(candidate: CandidateInit) -> RTCIceCandidateInit {
    RTCIceCandidateInit {
        candidate: candidate.candidate,
        sdp_mid: candidate.sdp_mid,
        sdp_mline_index: candidate.sdp_mline_index,
        username_fragment: candidate.username_fragment,
    }
}

#[async_trait]
impl NegotiationEngine for PeerEngine {
    async fn create_offer(&self) -> Result<SessionDescription, NegotiationError> {
        let offer = self.peer_connection.create_offer(None).await?;
        from_rtc_description(offer)
    }

    async fn create_answer(&self) -> Result<SessionDescription, NegotiationError> {
        let answer = self.peer_connection.create_answer(None).await?;
        from_rtc_description(answer)
    }

    async fn set_local_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), NegotiationError> {
        self.peer_connection
            .set_local_description(to_rtc_description(description)?)
            .await?;
        Ok(())
    }

    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), NegotiationError> {
        self.peer_connection
            .set_remote_description(to_rtc_description(description)?)
            .await?;
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        let description = self.peer_connection.local_description().await?;
        from_rtc_description(description).ok()
    }

    async fn add_ice_candidate(&self, candidate: CandidateInit) -> Result<(), NegotiationError> {
        self.peer_connection
            .add_ice_candidate(to_rtc_candidate(candidate))
            .await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), NegotiationError> {
        self.peer_connection.close().await?;
        Ok(())
    }
}
