//! JSON-RPC 2.0 framing for the signaling channel
//!
//! Outbound messages become `{"jsonrpc":"2.0","id":N,"method":M,"params":P}` envelopes
//! (notifications carry no `id`). Inbound frames decode into exactly one [`ServerMessage`];
//! anything that is not a recognizable reply or notification is a [`CodecError`].

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::messages::{ClientMessage, ServerMessage, METHOD_OFFER, METHOD_TRICKLE};
use crate::types::{RequestId, RpcError};

const JSONRPC_VERSION: &str = "2.0";

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("frame is not a JSON object")]
    NotAnObject,

    #[error("invalid `{0}` field")]
    InvalidField(&'static str),

    #[error("invalid params for `{method}`: {source}")]
    Params {
        method: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("frame is neither a reply nor a notification")]
    Unrecognized,
}

#[derive(Serialize)]
struct Envelope<'a, P: Serialize> {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<RequestId>,
    method: &'a str,
    params: &'a P,
}

fn envelope<P: Serialize>(message: &ClientMessage, params: &P) -> Result<String, CodecError> {
    let envelope = Envelope {
        jsonrpc: JSONRPC_VERSION,
        id: message.id(),
        method: message.method(),
        params,
    };
    Ok(serde_json::to_string(&envelope)?)
}

/// Serialize an outbound message into a text frame
pub fn encode(message: &ClientMessage) -> Result<String, CodecError> {
    match message {
        ClientMessage::Join { params, .. } => envelope(message, params),
        ClientMessage::Answer { description, .. } => envelope(message, description),
        ClientMessage::Trickle(params) => envelope(message, params),
    }
}

/// Decode an inbound text frame
pub fn decode(text: &str) -> Result<ServerMessage, CodecError> {
    let Value::Object(mut frame) = serde_json::from_str::<Value>(text)? else {
        return Err(CodecError::NotAnObject);
    };

    if let Some(method) = frame.remove("method") {
        let Value::String(method) = method else {
            return Err(CodecError::InvalidField("method"));
        };
        let params = frame.remove("params").unwrap_or(Value::Null);

        return match method.as_str() {
            METHOD_OFFER => Ok(ServerMessage::Offer(params_as(&method, params)?)),
            METHOD_TRICKLE => Ok(ServerMessage::Trickle(params_as(&method, params)?)),
            _ => Ok(ServerMessage::Unknown { method }),
        };
    }

    let id = take_id(&mut frame)?;

    if let Some(error) = frame.remove("error") {
        if !error.is_null() {
            let error: RpcError =
                serde_json::from_value(error).map_err(|_| CodecError::InvalidField("error"))?;
            return Ok(ServerMessage::ErrorReply { id, error });
        }
    }

    let Some(id) = id else {
        return Err(CodecError::Unrecognized);
    };

    match frame.remove("result") {
        Some(Value::Null) => Ok(ServerMessage::Reply { id, result: None }),
        Some(result) => {
            let result =
                serde_json::from_value(result).map_err(|_| CodecError::InvalidField("result"))?;
            Ok(ServerMessage::Reply {
                id,
                result: Some(result),
            })
        }
        None => Err(CodecError::Unrecognized),
    }
}

fn take_id(frame: &mut Map<String, Value>) -> Result<Option<RequestId>, CodecError> {
    match frame.remove("id") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(Some)
            .ok_or(CodecError::InvalidField("id")),
        Some(_) => Err(CodecError::InvalidField("id")),
    }
}

fn params_as<T: DeserializeOwned>(method: &str, params: Value) -> Result<T, CodecError> {
    serde_json::from_value(params).map_err(|source| CodecError::Params {
        method: method.to_string(),
        source,
    })
}
