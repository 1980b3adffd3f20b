//! Test doubles for the engine, the transport and local tracks

use async_trait::async_trait;
use ionpub_media::{LocalTrack, MediaCodec, MediaError};
use ionpub_protocol::{CandidateInit, ClientMessage, SessionDescription};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio_tungstenite::tungstenite;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

use crate::engine::NegotiationEngine;
use crate::error::{NegotiationError, TransportError};

fn engine_failure() -> NegotiationError {
    NegotiationError::Engine(webrtc::Error::ErrConnectionClosed)
}

fn broken_pipe() -> TransportError {
    TransportError::WebSocket(tungstenite::Error::Io(std::io::Error::from(
        std::io::ErrorKind::BrokenPipe,
    )))
}
use crate::transport::MessageSink;

/// Shared, ordered record of release steps
#[derive(Clone, Default)]
pub(crate) struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub(crate) fn record(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub(crate) fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum EngineCall {
    CreateOffer,
    CreateAnswer,
    SetLocal(SessionDescription),
    SetRemote(SessionDescription),
    AddCandidate(CandidateInit),
    Close,
}

#[derive(Default)]
pub(crate) struct MockEngine {
    calls: Mutex<Vec<EngineCall>>,
    local: Mutex<Option<SessionDescription>>,
    journal: Journal,
    fail_create_offer: AtomicBool,
    fail_set_remote: AtomicBool,
    fail_add_candidate: AtomicBool,
    fail_close: AtomicBool,
}

impl MockEngine {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_journal(journal: Journal) -> Self {
        Self {
            journal,
            ..Self::default()
        }
    }

    pub(crate) fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn fail_create_offer(&self, fail: bool) {
        self.fail_create_offer.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_set_remote(&self, fail: bool) {
        self.fail_set_remote.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_add_candidate(&self, fail: bool) {
        self.fail_add_candidate.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_close(&self, fail: bool) {
        self.fail_close.store(fail, Ordering::SeqCst);
    }

    fn record(&self, call: EngineCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl NegotiationEngine for MockEngine {
    async fn create_offer(&self) -> Result<SessionDescription, NegotiationError> {
        if self.fail_create_offer.load(Ordering::SeqCst) {
            return Err(engine_failure());
        }
        self.record(EngineCall::CreateOffer);
        Ok(SessionDescription::offer("local-offer"))
    }

    async fn create_answer(&self) -> Result<SessionDescription, NegotiationError> {
        self.record(EngineCall::CreateAnswer);
        Ok(SessionDescription::answer("local-answer"))
    }

    async fn set_local_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), NegotiationError> {
        self.record(EngineCall::SetLocal(description.clone()));
        *self.local.lock().unwrap() = Some(description);
        Ok(())
    }

    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), NegotiationError> {
        if self.fail_set_remote.load(Ordering::SeqCst) {
            return Err(engine_failure());
        }
        self.record(EngineCall::SetRemote(description));
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.local.lock().unwrap().clone()
    }

    async fn add_ice_candidate(&self, candidate: CandidateInit) -> Result<(), NegotiationError> {
        self.record(EngineCall::AddCandidate(candidate));
        if self.fail_add_candidate.load(Ordering::SeqCst) {
            return Err(engine_failure());
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), NegotiationError> {
        self.record(EngineCall::Close);
        self.journal.record("engine:close");
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(engine_failure());
        }
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct RecordingSink {
    sent: Mutex<Vec<ClientMessage>>,
    journal: Journal,
    fail_send: AtomicBool,
    fail_close: AtomicBool,
}

impl RecordingSink {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_journal(journal: Journal) -> Self {
        Self {
            journal,
            ..Self::default()
        }
    }

    pub(crate) fn sent(&self) -> Vec<ClientMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn fail_send(&self, fail: bool) {
        self.fail_send.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_close(&self, fail: bool) {
        self.fail_close.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl MessageSink for RecordingSink {
    async fn send(&self, message: ClientMessage) -> Result<(), TransportError> {
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(broken_pipe());
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.journal.record("transport:close");
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(broken_pipe());
        }
        Ok(())
    }
}

pub(crate) struct MockTrack {
    id: String,
    track: Arc<TrackLocalStaticSample>,
    journal: Journal,
}

impl MockTrack {
    pub(crate) fn new(id: &str, journal: Journal) -> Self {
        Self {
            id: id.to_string(),
            track: Arc::new(TrackLocalStaticSample::new(
                MediaCodec::Vp8.capability(),
                id.to_string(),
                "stream-test".to_string(),
            )),
            journal,
        }
    }
}

#[async_trait]
impl LocalTrack for MockTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> RTPCodecType {
        RTPCodecType::Video
    }

    fn rtp_track(&self) -> Arc<dyn TrackLocal + Send + Sync> {
        self.track.clone()
    }

    async fn stop(&self) -> Result<(), MediaError> {
        self.journal.record(format!("track:{}:stop", self.id));
        Ok(())
    }
}
