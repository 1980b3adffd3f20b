//! ionpub client library
//!
//! Signaling client that publishes local media to an ion-sfu room over JSON-RPC/WebSocket.

pub mod config;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod peer;
pub mod session;
pub mod signaling;
pub mod transport;
pub mod trickle;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{NegotiationError, PublisherError, Result, ShutdownError, TransportError};
pub use session::Session;
