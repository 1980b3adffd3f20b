use ionpub_media::MediaError;
use ionpub_protocol::CodecError;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

use crate::signaling::SignalingState;

/// Connection-level failures of the signaling channel
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("failed to connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: tungstenite::Error,
    },

    #[error("failed to encode message: {0}")]
    Encode(#[from] CodecError),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
}

impl TransportError {
    /// True when the WebSocket itself failed, as opposed to a message that could not be encoded
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, TransportError::WebSocket(_))
    }
}

/// Failures reported by the negotiation engine
#[derive(Error, Debug)]
pub enum NegotiationError {
    #[error("peer connection error: {0}")]
    Engine(#[from] webrtc::Error),

    #[error("unsupported session description type `{0}`")]
    UnsupportedDescription(String),
}

/// Failures while releasing session resources
///
/// Cloneable so every caller of `close` can observe the same result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShutdownError {
    #[error("failed to stop track {id}: {message}")]
    Track { id: String, message: String },

    #[error("failed to close peer connection: {0}")]
    Engine(String),

    #[error("failed to close transport: {0}")]
    Transport(String),

    #[error("release task failed: {0}")]
    Release(String),
}

#[derive(Error, Debug)]
pub enum PublisherError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Negotiation(#[from] NegotiationError),

    #[error(transparent)]
    Shutdown(#[from] ShutdownError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("cannot {operation} while {state:?}")]
    InvalidState {
        operation: &'static str,
        state: SignalingState,
    },
}

pub type Result<T> = std::result::Result<T, PublisherError>;
