//! WebSocket transport for the signaling channel
//!
//! The connection is split once: the write half sits behind a mutex so any task can send
//! (engine callbacks, the read loop, the caller), the read half is owned by [`TransportReader`].

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use ionpub_protocol::{ClientMessage, ServerMessage};
use std::future::Future;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::TransportError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Outbound side of the signaling channel
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(&self, message: ClientMessage) -> Result<(), TransportError>;

    async fn close(&self) -> Result<(), TransportError>;
}

/// Write half of the WebSocket connection
pub struct Transport {
    url: String,
    writer: Mutex<SplitSink<WsStream, Message>>,
}

/// Read half of the WebSocket connection
pub struct TransportReader {
    reader: SplitStream<WsStream>,
}

/// Open the signaling connection
pub async fn connect(url: &str) -> Result<(Transport, TransportReader), TransportError> {
    let (ws_stream, _) = connect_async(url)
        .await
        .map_err(|source| TransportError::Connect {
            url: url.to_string(),
            source,
        })?;

    let (write, read) = ws_stream.split();
    tracing::info!("Connected to {}", url);

    Ok((
        Transport {
            url: url.to_string(),
            writer: Mutex::new(write),
        },
        TransportReader { reader: read },
    ))
}

#[async_trait]
impl MessageSink for Transport {
    async fn send(&self, message: ClientMessage) -> Result<(), TransportError> {
        let json = ionpub_protocol::encode(&message)?;
        tracing::debug!("Sending `{}` (id: {:?})", message.method(), message.id());

        let mut writer = self.writer.lock().await;
        writer.send(Message::Text(json.into())).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        let mut writer = self.writer.lock().await;
        match writer.close().await {
            Ok(())
            | Err(tungstenite::Error::ConnectionClosed)
            | Err(tungstenite::Error::AlreadyClosed) => {
                tracing::debug!("WebSocket to {} closed", self.url);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl TransportReader {
    /// Decode inbound frames and hand each message to `dispatch` until the connection ends
    ///
    /// Malformed frames are logged and skipped. Returns `Ok` on a clean close.
    pub async fn run<F, Fut>(mut self, mut dispatch: F) -> Result<(), TransportError>
    where
        F: FnMut(ServerMessage) -> Fut,
        Fut: Future<Output = ()>,
    {
        while let Some(result) = self.reader.next().await {
            match result {
                Ok(Message::Text(text)) => match ionpub_protocol::decode(&text) {
                    Ok(message) => dispatch(message).await,
                    Err(e) => {
                        tracing::warn!("Dropping malformed frame: {}", e);
                    }
                },
                Ok(Message::Binary(data)) => {
                    tracing::warn!("Dropping unexpected binary frame ({} bytes)", data.len());
                }
                Ok(Message::Close(frame)) => {
                    tracing::info!("WebSocket closed by server: {:?}", frame);
                    return Ok(());
                }
                Ok(_) => {
                    // Ping/pong is answered by tungstenite
                }
                Err(tungstenite::Error::ConnectionClosed)
                | Err(tungstenite::Error::AlreadyClosed) => {
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }
}
