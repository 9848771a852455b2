//! Push delivery endpoint (/consume)
//!
//! Auth and envelope errors are 4xx so the channel's retry policy applies.
//! Generation failures are acknowledged with 200 and `status: failed`.

use axum::{Json, Router, body::Bytes, extract::State, routing::post};
use std::sync::Arc;

use super::auth::PushCaller;
use crate::consume::ConsumeOutcome;
use crate::error::ApiError;
use crate::services::pubsub::PushEnvelope;
use crate::state::CreativeState;

pub fn routes() -> Router<Arc<CreativeState>> {
    Router::new().route("/consume", post(consume))
}

/// POST /consume - Generate the assets for an approved job
async fn consume(
    State(state): State<Arc<CreativeState>>,
    PushCaller(caller): PushCaller,
    body: Bytes,
) -> Result<Json<ConsumeOutcome>, ApiError> {
    let envelope: PushEnvelope = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("Invalid push envelope: {}", e)))?;
    let message = envelope
        .decode()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    tracing::info!(
        event_id = %message.event_id,
        message_id = ?envelope.message.message_id,
        subscription = ?envelope.subscription,
        caller = %caller.subject,
        "[consume] Push message received"
    );

    let outcome = state
        .consumer
        .consume(&message)
        .await
        .map_err(|e| ApiError::from(e).with_event(&message.event_id))?;
    Ok(Json(outcome))
}
