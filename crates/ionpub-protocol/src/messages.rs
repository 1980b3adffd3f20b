use crate::types::{JoinParams, RequestId, RpcError, SessionDescription, TrickleParams};

pub const METHOD_JOIN: &str = "join";
pub const METHOD_ANSWER: &str = "answer";
pub const METHOD_OFFER: &str = "offer";
pub const METHOD_TRICKLE: &str = "trickle";

/// Messages sent from the publisher to the SFU
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// Join a room with the local offer
    Join { id: RequestId, params: JoinParams },

    /// Answer a server-initiated renegotiation
    Answer {
        id: RequestId,
        description: SessionDescription,
    },

    /// Local ICE candidate, fire-and-forget
    Trickle(TrickleParams),
}

impl ClientMessage {
    /// Correlation id, `None` for notifications
    pub fn id(&self) -> Option<RequestId> {
        match self {
            ClientMessage::Join { id, .. } | ClientMessage::Answer { id, .. } => Some(*id),
            ClientMessage::Trickle(_) => None,
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            ClientMessage::Join { .. } => METHOD_JOIN,
            ClientMessage::Answer { .. } => METHOD_ANSWER,
            ClientMessage::Trickle(_) => METHOD_TRICKLE,
        }
    }
}

/// Messages received from the SFU
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Reply to a prior call; `join` replies carry the remote answer
    Reply {
        id: RequestId,
        result: Option<SessionDescription>,
    },

    /// Call rejected by the server; `id` is null when the request could not be parsed
    ErrorReply {
        id: Option<RequestId>,
        error: RpcError,
    },

    /// Server-initiated renegotiation
    Offer(SessionDescription),

    /// Remote ICE candidate
    Trickle(TrickleParams),

    /// Notification with a method this client does not handle
    Unknown { method: String },
}
