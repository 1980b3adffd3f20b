//! Negotiation engine seam
//!
//! The session only drives offer/answer and candidates through [`NegotiationEngine`];
//! asynchronous engine callbacks arrive as [`EngineEvent`]s on a channel.

use async_trait::async_trait;
use ionpub_protocol::{CandidateInit, SessionDescription};
use tokio::sync::mpsc;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;

use crate::error::NegotiationError;

#[async_trait]
pub trait NegotiationEngine: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription, NegotiationError>;

    async fn create_answer(&self) -> Result<SessionDescription, NegotiationError>;

    async fn set_local_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), NegotiationError>;

    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), NegotiationError>;

    /// Current local description, including any candidates gathered so far
    async fn local_description(&self) -> Option<SessionDescription>;

    async fn add_ice_candidate(&self, candidate: CandidateInit) -> Result<(), NegotiationError>;

    async fn close(&self) -> Result<(), NegotiationError>;
}

/// Callback events emitted by the engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Newly gathered local candidate; `None` marks the end of gathering
    LocalCandidate(Option<CandidateInit>),

    IceConnectionState(RTCIceConnectionState),

    PeerConnectionState(RTCPeerConnectionState),
}

pub type EngineEventSender = mpsc::UnboundedSender<EngineEvent>;
pub type EngineEvents = mpsc::UnboundedReceiver<EngineEvent>;
