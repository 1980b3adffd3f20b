//! Join / offer-answer / renegotiation state machine
//!
//! ```text
//! Idle -> Joining -> Joined -> Renegotiating -> Joined -> ... -> Closed
//! ```
//!
//! Only `join` and `answer` carry correlation ids, and at most one of them is pending at a
//! time. Trickle notifications never touch the pending id.

use ionpub_protocol::{ClientMessage, JoinParams, RequestId, RpcError, SessionDescription};

use crate::engine::NegotiationEngine;
use crate::error::{PublisherError, Result};
use crate::transport::MessageSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalingState {
    Idle,
    Joining,
    Joined,
    Renegotiating,
    Closed,
}

pub struct Signaling {
    room: String,
    state: SignalingState,
    pending: Option<RequestId>,
    last_id: RequestId,
}

impl Signaling {
    pub fn new(room: impl Into<String>) -> Self {
        Self {
            room: room.into(),
            state: SignalingState::Idle,
            pending: None,
            last_id: 0,
        }
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    pub fn state(&self) -> SignalingState {
        self.state
    }

    /// Correlation id of the call awaiting a reply
    pub fn pending(&self) -> Option<RequestId> {
        self.pending
    }

    fn next_id(&mut self) -> RequestId {
        self.last_id += 1;
        self.last_id
    }

    /// Send the local offer to the SFU and wait for its answer in `Joining`
    pub async fn join(
        &mut self,
        engine: &dyn NegotiationEngine,
        sink: &dyn MessageSink,
    ) -> Result<RequestId> {
        if self.state != SignalingState::Idle {
            return Err(PublisherError::InvalidState {
                operation: "join",
                state: self.state,
            });
        }

        let offer = engine.create_offer().await?;
        engine.set_local_description(offer.clone()).await?;
        let offer = engine.local_description().await.unwrap_or(offer);

        let id = self.next_id();
        sink.send(ClientMessage::Join {
            id,
            params: JoinParams {
                sid: self.room.clone(),
                offer,
            },
        })
        .await?;

        self.pending = Some(id);
        self.state = SignalingState::Joining;
        tracing::info!("Sent join for room {} (id {})", self.room, id);

        Ok(id)
    }

    /// Apply a reply from the SFU
    ///
    /// Replies that do not match the pending id leave the state untouched.
    pub async fn on_reply(
        &mut self,
        id: RequestId,
        result: Option<SessionDescription>,
        engine: &dyn NegotiationEngine,
    ) -> Result<()> {
        if self.state == SignalingState::Closed {
            tracing::debug!("Ignoring reply {} after close", id);
            return Ok(());
        }

        if self.pending != Some(id) {
            tracing::debug!("Ignoring reply {} (pending: {:?})", id, self.pending);
            return Ok(());
        }
        self.pending = None;

        match (self.state, result) {
            (SignalingState::Joining, Some(answer)) => {
                tracing::info!("Received SFU answer");
                engine.set_remote_description(answer).await?;
                self.state = SignalingState::Joined;
                tracing::info!("Joined room {}", self.room);
            }
            (SignalingState::Joining, None) => {
                tracing::warn!("Join reply {} carried no session description", id);
            }
            (_, None) => {
                tracing::debug!("Answer {} acknowledged", id);
            }
            (state, Some(_)) => {
                tracing::warn!(
                    "Ignoring session description in reply {} while {:?}",
                    id,
                    state
                );
            }
        }

        Ok(())
    }

    /// Record a rejected call; a rejected join leaves the session in `Joining`
    pub fn on_error_reply(&mut self, id: Option<RequestId>, error: &RpcError) {
        if id.is_some() && id == self.pending {
            self.pending = None;
            tracing::warn!("SFU rejected call {:?} while {:?}: {}", id, self.state, error);
        } else {
            tracing::warn!("SFU reported error for call {:?}: {}", id, error);
        }
    }

    /// Answer a server-initiated renegotiation
    ///
    /// Returns the id of the `answer` call, or `None` when the offer was dropped because the
    /// session is not `Joined`. The state is back to `Joined` whether or not answering worked.
    pub async fn on_offer(
        &mut self,
        offer: SessionDescription,
        engine: &dyn NegotiationEngine,
        sink: &dyn MessageSink,
    ) -> Result<Option<RequestId>> {
        if self.state != SignalingState::Joined {
            tracing::warn!("Ignoring renegotiation offer while {:?}", self.state);
            return Ok(None);
        }

        tracing::info!("Received renegotiation offer from SFU");
        self.state = SignalingState::Renegotiating;
        let result = self.answer(offer, engine, sink).await;
        self.state = SignalingState::Joined;

        result.map(Some)
    }

    async fn answer(
        &mut self,
        offer: SessionDescription,
        engine: &dyn NegotiationEngine,
        sink: &dyn MessageSink,
    ) -> Result<RequestId> {
        engine.set_remote_description(offer).await?;

        let answer = engine.create_answer().await?;
        engine.set_local_description(answer.clone()).await?;
        let answer = engine.local_description().await.unwrap_or(answer);

        let id = self.next_id();
        sink.send(ClientMessage::Answer {
            id,
            description: answer,
        })
        .await?;

        // A newer answer supersedes any unacknowledged one
        if let Some(previous) = self.pending.replace(id) {
            tracing::debug!("Answer {} superseded by {}", previous, id);
        }

        Ok(id)
    }

    /// Terminal; every later reply or offer is a no-op
    pub fn close(&mut self) {
        self.state = SignalingState::Closed;
        self.pending = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{EngineCall, MockEngine, RecordingSink};
    use ionpub_protocol::SdpType;

    async fn joined(engine: &MockEngine, sink: &RecordingSink) -> Signaling {
        let mut signaling = Signaling::new("room-A");
        let id = signaling.join(engine, sink).await.unwrap();
        signaling
            .on_reply(id, Some(SessionDescription::answer("remote-answer")), engine)
            .await
            .unwrap();
        signaling
    }

    #[tokio::test]
    async fn test_join_sends_offer_and_waits() {
        let engine = MockEngine::new();
        let sink = RecordingSink::new();
        let mut signaling = Signaling::new("room-A");

        let id = signaling.join(&engine, &sink).await.unwrap();

        assert_eq!(id, 1);
        assert_eq!(signaling.state(), SignalingState::Joining);
        assert_eq!(signaling.pending(), Some(1));
        assert_eq!(
            engine.calls(),
            vec![
                EngineCall::CreateOffer,
                EngineCall::SetLocal(SessionDescription::offer("local-offer")),
            ]
        );
        assert_eq!(
            sink.sent(),
            vec![ClientMessage::Join {
                id: 1,
                params: JoinParams {
                    sid: "room-A".to_string(),
                    offer: SessionDescription::offer("local-offer"),
                },
            }]
        );
    }

    #[tokio::test]
    async fn test_matching_reply_joins() {
        let engine = MockEngine::new();
        let sink = RecordingSink::new();
        let signaling = joined(&engine, &sink).await;

        assert_eq!(signaling.state(), SignalingState::Joined);
        assert_eq!(signaling.pending(), None);
        assert!(engine
            .calls()
            .contains(&EngineCall::SetRemote(SessionDescription::answer("remote-answer"))));
    }

    #[tokio::test]
    async fn test_mismatched_reply_is_ignored() {
        let engine = MockEngine::new();
        let sink = RecordingSink::new();
        let mut signaling = Signaling::new("room-A");
        signaling.join(&engine, &sink).await.unwrap();
        let calls_before = engine.calls().len();

        signaling
            .on_reply(42, Some(SessionDescription::answer("stray")), &engine)
            .await
            .unwrap();

        assert_eq!(signaling.state(), SignalingState::Joining);
        assert_eq!(signaling.pending(), Some(1));
        assert_eq!(engine.calls().len(), calls_before);
    }

    #[tokio::test]
    async fn test_join_twice_is_rejected() {
        let engine = MockEngine::new();
        let sink = RecordingSink::new();
        let mut signaling = Signaling::new("room-A");
        signaling.join(&engine, &sink).await.unwrap();

        let result = signaling.join(&engine, &sink).await;
        assert!(matches!(
            result,
            Err(PublisherError::InvalidState {
                operation: "join",
                state: SignalingState::Joining,
            })
        ));
        assert_eq!(sink.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_offer_sends_nothing() {
        let engine = MockEngine::new();
        engine.fail_create_offer(true);
        let sink = RecordingSink::new();
        let mut signaling = Signaling::new("room-A");

        assert!(signaling.join(&engine, &sink).await.is_err());
        assert_eq!(signaling.state(), SignalingState::Idle);
        assert!(sink.sent().is_empty());
    }

    #[tokio::test]
    async fn test_renegotiation_sends_answer_with_fresh_id() {
        let engine = MockEngine::new();
        let sink = RecordingSink::new();
        let mut signaling = joined(&engine, &sink).await;

        let id = signaling
            .on_offer(SessionDescription::offer("X"), &engine, &sink)
            .await
            .unwrap();

        assert_eq!(id, Some(2));
        assert_eq!(signaling.state(), SignalingState::Joined);
        assert_eq!(signaling.pending(), Some(2));

        let sent = sink.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(
            sent[1],
            ClientMessage::Answer {
                id: 2,
                description: SessionDescription::answer("local-answer"),
            }
        );
    }

    #[tokio::test]
    async fn test_overlapping_renegotiations_supersede() {
        let engine = MockEngine::new();
        let sink = RecordingSink::new();
        let mut signaling = joined(&engine, &sink).await;

        signaling
            .on_offer(SessionDescription::offer("X1"), &engine, &sink)
            .await
            .unwrap();
        signaling
            .on_offer(SessionDescription::offer("X2"), &engine, &sink)
            .await
            .unwrap();

        assert_eq!(signaling.pending(), Some(3));
        let ids: Vec<_> = sink.sent().iter().filter_map(|m| m.id()).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        // A late acknowledgement of the superseded answer changes nothing
        signaling.on_reply(2, None, &engine).await.unwrap();
        assert_eq!(signaling.pending(), Some(3));

        signaling.on_reply(3, None, &engine).await.unwrap();
        assert_eq!(signaling.pending(), None);
        assert_eq!(signaling.state(), SignalingState::Joined);
    }

    #[tokio::test]
    async fn test_failed_renegotiation_stays_joined() {
        let engine = MockEngine::new();
        let sink = RecordingSink::new();
        let mut signaling = joined(&engine, &sink).await;
        engine.fail_set_remote(true);

        let result = signaling
            .on_offer(SessionDescription::offer("X"), &engine, &sink)
            .await;

        assert!(result.is_err());
        assert_eq!(signaling.state(), SignalingState::Joined);
        assert_eq!(sink.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_offer_before_joined_is_dropped() {
        let engine = MockEngine::new();
        let sink = RecordingSink::new();
        let mut signaling = Signaling::new("room-A");
        signaling.join(&engine, &sink).await.unwrap();

        let result = signaling
            .on_offer(SessionDescription::offer("X"), &engine, &sink)
            .await
            .unwrap();

        assert_eq!(result, None);
        assert_eq!(signaling.state(), SignalingState::Joining);
        assert_eq!(sink.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_error_reply_clears_pending_join() {
        let engine = MockEngine::new();
        let sink = RecordingSink::new();
        let mut signaling = Signaling::new("room-A");
        signaling.join(&engine, &sink).await.unwrap();

        signaling.on_error_reply(
            Some(1),
            &RpcError {
                code: -32000,
                message: "room full".to_string(),
                data: None,
            },
        );

        assert_eq!(signaling.pending(), None);
        assert_eq!(signaling.state(), SignalingState::Joining);
    }

    #[tokio::test]
    async fn test_late_reply_after_close_is_noop() {
        let engine = MockEngine::new();
        let sink = RecordingSink::new();
        let mut signaling = Signaling::new("room-A");
        signaling.join(&engine, &sink).await.unwrap();
        signaling.close();

        signaling
            .on_reply(1, Some(SessionDescription::answer("late")), &engine)
            .await
            .unwrap();

        assert_eq!(signaling.state(), SignalingState::Closed);
        assert!(!engine
            .calls()
            .iter()
            .any(|call| matches!(call, EngineCall::SetRemote(d) if d.sdp_type == SdpType::Answer)));
    }
}
