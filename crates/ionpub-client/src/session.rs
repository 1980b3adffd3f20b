//! Publisher session
//!
//! One `Session` per SFU relationship. It owns the transport and the negotiation engine,
//! runs the read loop and the engine-event loop, and shuts everything down exactly once.

use ionpub_media::LocalTrack;
use ionpub_protocol::{RequestId, ServerMessage};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;

use crate::engine::{EngineEvent, EngineEvents, NegotiationEngine};
use crate::error::{PublisherError, Result, ShutdownError, TransportError};
use crate::lifecycle::{CloseResult, Lifecycle, LifecycleState};
use crate::signaling::{Signaling, SignalingState};
use crate::transport::{MessageSink, TransportReader};
use crate::trickle;

#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    room: String,
    sink: Arc<dyn MessageSink>,
    engine: Arc<dyn NegotiationEngine>,
    tracks: Vec<Arc<dyn LocalTrack>>,
    signaling: Mutex<Signaling>,
    lifecycle: Lifecycle,
    done_tx: watch::Sender<bool>,
    started: AtomicBool,
}

impl Session {
    pub fn new(
        room: impl Into<String>,
        sink: Arc<dyn MessageSink>,
        engine: Arc<dyn NegotiationEngine>,
        tracks: Vec<Arc<dyn LocalTrack>>,
    ) -> Self {
        let room = room.into();
        let (done_tx, _) = watch::channel(false);

        Self {
            inner: Arc::new(SessionInner {
                signaling: Mutex::new(Signaling::new(room.clone())),
                room,
                sink,
                engine,
                tracks,
                lifecycle: Lifecycle::new(),
                done_tx,
                started: AtomicBool::new(false),
            }),
        }
    }

    pub fn room(&self) -> &str {
        &self.inner.room
    }

    /// Spawn the read loop and the engine-event loop; later calls are ignored
    pub fn start(&self, reader: TransportReader, events: EngineEvents) {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            tracing::warn!("Session for room {} already started", self.inner.room);
            return;
        }

        let session = self.clone();
        tokio::spawn(async move {
            match reader.run(|message| session.handle_message(message)).await {
                Ok(()) => tracing::info!("Connection closed"),
                Err(e) => tracing::warn!("WebSocket error: {}", e),
            }

            session.mark_done();
            if let Err(e) = session.close().await {
                tracing::warn!("Shutdown after connection loss failed: {}", e);
            }
        });

        let session = self.clone();
        tokio::spawn(async move {
            session.pump_engine_events(events).await;
        });
    }

    /// Send the join call; failure here means the session never got going
    pub async fn join(&self) -> Result<RequestId> {
        if self.inner.lifecycle.is_closed() {
            return Err(PublisherError::InvalidState {
                operation: "join",
                state: SignalingState::Closed,
            });
        }

        let mut signaling = self.inner.signaling.lock().await;
        signaling
            .join(self.inner.engine.as_ref(), self.inner.sink.as_ref())
            .await
    }

    pub async fn state(&self) -> SignalingState {
        self.inner.signaling.lock().await.state()
    }

    pub fn lifecycle_state(&self) -> LifecycleState {
        self.inner.lifecycle.state()
    }

    pub fn is_done(&self) -> bool {
        *self.inner.done_tx.borrow()
    }

    /// Resolves once the connection is gone or the session has been closed
    pub async fn wait_done(&self) {
        let mut done_rx = self.inner.done_tx.subscribe();
        let _ = done_rx.wait_for(|done| *done).await;
    }

    /// Wait for the connection to end or for `interrupt`, whichever comes first, then close
    pub async fn run_until_shutdown<F>(&self, interrupt: F) -> CloseResult
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            _ = self.wait_done() => tracing::info!("Session for room {} ended", self.inner.room),
            _ = interrupt => tracing::info!("Interrupted, shutting down..."),
        }

        self.close().await
    }

    /// Stop tracks, close the engine, close the transport; runs once no matter how often
    /// or from where it is called
    pub async fn close(&self) -> CloseResult {
        let session = self.clone();
        self.inner
            .lifecycle
            .close_with(|| async move { session.release().await })
            .await
    }

    async fn release(&self) -> CloseResult {
        tracing::info!("Closing session for room {}", self.inner.room);
        let mut first_error = None;

        for track in &self.inner.tracks {
            if let Err(e) = track.stop().await {
                record_failure(
                    &mut first_error,
                    ShutdownError::Track {
                        id: track.id().to_string(),
                        message: e.to_string(),
                    },
                );
            }
        }

        if let Err(e) = self.inner.engine.close().await {
            record_failure(&mut first_error, ShutdownError::Engine(e.to_string()));
        }

        if let Err(e) = self.inner.sink.close().await {
            record_failure(&mut first_error, ShutdownError::Transport(e.to_string()));
        }

        self.inner.signaling.lock().await.close();
        self.mark_done();

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// A failed write means the connection is gone; shut down the same way a read failure does
    async fn on_send_failure(&self, error: &TransportError) {
        if !error.is_connection_lost() {
            return;
        }

        tracing::warn!("Signaling write failed, shutting down: {}", error);
        self.mark_done();
        if let Err(e) = self.close().await {
            tracing::warn!("Shutdown after write failure failed: {}", e);
        }
    }

    fn mark_done(&self) {
        let changed = self.inner.done_tx.send_if_modified(|done| {
            if *done {
                false
            } else {
                *done = true;
                true
            }
        });
        if changed {
            tracing::debug!("Session for room {} done", self.inner.room);
        }
    }

    pub(crate) async fn handle_message(&self, message: ServerMessage) {
        if self.inner.lifecycle.is_closed() {
            tracing::debug!("Session closed, dropping {:?}", message);
            return;
        }

        let engine = self.inner.engine.as_ref();
        let sink = self.inner.sink.as_ref();

        match message {
            ServerMessage::Reply { id, result } => {
                let mut signaling = self.inner.signaling.lock().await;
                if let Err(e) = signaling.on_reply(id, result, engine).await {
                    tracing::warn!("Failed to set remote description: {}", e);
                }
            }
            ServerMessage::ErrorReply { id, error } => {
                self.inner.signaling.lock().await.on_error_reply(id, &error);
            }
            ServerMessage::Offer(offer) => {
                let result = self
                    .inner
                    .signaling
                    .lock()
                    .await
                    .on_offer(offer, engine, sink)
                    .await;
                if let Err(e) = result {
                    tracing::warn!("Failed to handle renegotiation: {}", e);
                    if let PublisherError::Transport(e) = &e {
                        self.on_send_failure(e).await;
                    }
                }
            }
            ServerMessage::Trickle(params) => {
                let _signaling = self.inner.signaling.lock().await;
                if let Err(e) = trickle::apply_remote_candidate(engine, params).await {
                    tracing::warn!("Failed to add ICE candidate: {}", e);
                }
            }
            ServerMessage::Unknown { method } => {
                tracing::warn!("Ignoring unknown notification `{}`", method);
            }
        }
    }

    async fn pump_engine_events(&self, mut events: EngineEvents) {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle_engine_event(event).await,
                    None => break,
                },
                _ = self.wait_done() => break,
            }
        }
    }

    pub(crate) async fn handle_engine_event(&self, event: EngineEvent) {
        match event {
            EngineEvent::LocalCandidate(candidate) => {
                if self.inner.lifecycle.is_closed() {
                    return;
                }
                if let Err(e) =
                    trickle::send_local_candidate(self.inner.sink.as_ref(), candidate).await
                {
                    tracing::warn!("Failed to send ICE candidate: {}", e);
                    self.on_send_failure(&e).await;
                }
            }
            EngineEvent::IceConnectionState(state) => {
                tracing::info!("ICE connection state: {}", state);
                if matches!(
                    state,
                    RTCIceConnectionState::Failed | RTCIceConnectionState::Disconnected
                ) {
                    tracing::warn!("Connection lost, consider reconnecting...");
                }
            }
            EngineEvent::PeerConnectionState(state) => {
                tracing::info!("Peer connection state: {}", state);
            }
        }
    }
}

fn record_failure(first_error: &mut Option<ShutdownError>, error: ShutdownError) {
    if first_error.is_none() {
        tracing::warn!("{}", error);
        *first_error = Some(error);
    } else {
        tracing::warn!("{} (after earlier failure)", error);
    }
}
