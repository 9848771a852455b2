//! Human approval endpoint (/approve)

use axum::{Json, Router, extract::State, routing::post};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::auth::CallerIdentity;
use crate::approval::approve_job;
use crate::domain::JobStatus;
use crate::error::ApiError;
use crate::state::StrategyState;

pub fn routes() -> Router<Arc<StrategyState>> {
    Router::new().route("/approve", post(approve))
}

#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
    pub event_id: String,
    pub uid: String,
}

#[derive(Debug, Serialize)]
pub struct ApproveResponse {
    pub event_id: String,
    pub status: JobStatus,
    pub published: bool,
    pub message: String,
}

/// POST /approve - Approve a pending job and hand it to the creative service
async fn approve(
    State(state): State<Arc<StrategyState>>,
    caller: CallerIdentity,
    Json(req): Json<ApproveRequest>,
) -> Result<Json<ApproveResponse>, ApiError> {
    caller.require_uid(&req.uid)?;

    let approved = approve_job(
        state.jobs.as_ref(),
        state.channel.as_ref(),
        &req.event_id,
        &req.uid,
    )
    .await?;

    Ok(Json(ApproveResponse {
        event_id: approved.job.event_id,
        status: approved.job.status,
        published: true,
        message: format!(
            "Job approved and queued for asset generation (message {})",
            approved.message_id
        ),
    }))
}
