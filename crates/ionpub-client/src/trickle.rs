//! ICE candidate trickling in both directions

use ionpub_protocol::{CandidateInit, ClientMessage, TrickleParams, PUBLISHER_TARGET};

use crate::engine::NegotiationEngine;
use crate::error::{NegotiationError, TransportError};
use crate::transport::MessageSink;

/// Forward a locally gathered candidate as a `trickle` notification
///
/// The end-of-candidates marker is never sent. Returns whether a notification went out.
pub async fn send_local_candidate(
    sink: &dyn MessageSink,
    candidate: Option<CandidateInit>,
) -> Result<bool, TransportError> {
    let Some(candidate) = candidate.filter(|c| !c.is_end_of_candidates()) else {
        tracing::debug!("Local ICE gathering complete");
        return Ok(false);
    };

    tracing::debug!("Sending ICE candidate: {}", candidate.candidate);
    sink.send(ClientMessage::Trickle(TrickleParams {
        target: PUBLISHER_TARGET,
        candidate: Some(candidate),
    }))
    .await?;

    Ok(true)
}

/// Apply a candidate received from the SFU
///
/// A null candidate is ignored without touching the engine. Returns whether it was applied.
pub async fn apply_remote_candidate(
    engine: &dyn NegotiationEngine,
    params: TrickleParams,
) -> Result<bool, NegotiationError> {
    let Some(candidate) = params.candidate else {
        return Ok(false);
    };

    tracing::debug!(
        "Received ICE candidate for target {}: {}",
        params.target,
        candidate.candidate
    );
    engine.add_ice_candidate(candidate).await?;

    Ok(true)
}
