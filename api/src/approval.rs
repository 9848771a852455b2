//! Human approval: commit the transition, then hand the job to the creative
//! side.
//!
//! Publishing happens only after `pending_approval -> processing` commits,
//! so a consumer can never see a job that is still pending. If publishing
//! fails the transition is reverted. If the revert fails too the job is
//! stuck in `processing` with nobody working on it, which is logged with
//! `alert = "stuck_job"` and reported with its own error code.

use crate::domain::Job;
use crate::domain::jobs::{JobStore, JobStoreError};
use crate::error::{ApiError, ErrorCode};
use crate::services::pubsub::{ChannelError, MessageChannel, TaskMessage};

#[derive(Debug)]
pub struct Approved {
    pub job: Job,
    pub message_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApprovalError {
    #[error(transparent)]
    Store(#[from] JobStoreError),
    #[error("Failed to publish job {event_id}, it was returned to pending_approval; please retry")]
    PublishFailedReverted {
        event_id: String,
        #[source]
        cause: ChannelError,
    },
    #[error(
        "Job {event_id} is stuck in processing: publish failed ({publish}) and revert failed ({revert})"
    )]
    StuckProcessing {
        event_id: String,
        publish: ChannelError,
        revert: JobStoreError,
    },
}

impl From<ApprovalError> for ApiError {
    fn from(e: ApprovalError) -> Self {
        let detail = e.to_string();
        match e {
            ApprovalError::Store(store) => store.into(),
            ApprovalError::PublishFailedReverted { event_id, .. } => {
                ApiError::new(ErrorCode::PublishFailedReverted, detail).with_event(&event_id)
            }
            ApprovalError::StuckProcessing { event_id, .. } => {
                ApiError::new(ErrorCode::JobStuckProcessing, detail).with_event(&event_id)
            }
        }
    }
}

pub async fn approve_job(
    jobs: &dyn JobStore,
    channel: &dyn MessageChannel,
    event_id: &str,
    uid: &str,
) -> Result<Approved, ApprovalError> {
    let job = jobs.approve(event_id, uid).await?;
    tracing::info!(event_id, uid, "[approve] Job moved to processing");

    let message = TaskMessage {
        event_id: job.event_id.clone(),
        task_list: job.task_list.clone(),
    };

    let publish_error = match channel.publish(&message).await {
        Ok(message_id) => {
            tracing::info!(event_id, message_id, "[approve] Task published");
            return Ok(Approved { job, message_id });
        }
        Err(e) => e,
    };

    tracing::warn!(event_id, error = %publish_error, "[approve] Publish failed, reverting");
    match jobs.revert_to_pending(event_id).await {
        Ok(()) => Err(ApprovalError::PublishFailedReverted {
            event_id: event_id.to_string(),
            cause: publish_error,
        }),
        Err(revert_error) => {
            tracing::error!(
                alert = "stuck_job",
                event_id,
                publish_error = %publish_error,
                revert_error = %revert_error,
                "[approve] Job stuck in processing"
            );
            Err(ApprovalError::StuckProcessing {
                event_id: event_id.to_string(),
                publish: publish_error,
                revert: revert_error,
            })
        }
    }
}
