//! Consumption workflow: turn an approved job into stored assets.
//!
//! Delivery is at-least-once, so a completed job is acknowledged again
//! without regenerating anything. Generation failures still end in an
//! acknowledgement (`failed`) so a deterministically failing message is not
//! redelivered forever.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::agent::{OrchestrationError, Orchestrator, parse_orchestration_response};
use crate::assets::{AssetPipeline, GenerationOutput};
use crate::domain::jobs::{JobStore, JobStoreError};
use crate::domain::{AssetUrls, JobStatus, StatusUpdate, TaskList};
use crate::error::ApiError;
use crate::services::pubsub::TaskMessage;
use crate::storage::reference_image_prefix;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPath {
    Direct,
    Orchestrated,
}

/// Stable 0..100 bucket for an event id.
pub fn rollout_bucket(event_id: &str) -> u64 {
    let digest = Sha256::digest(event_id.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(head) % 100
}

/// Redelivery of the same event always takes the same path.
pub fn select_path(event_id: &str, use_orchestration: bool, rollout_percentage: u8) -> ExecutionPath {
    if use_orchestration && rollout_bucket(event_id) < u64::from(rollout_percentage) {
        ExecutionPath::Orchestrated
    } else {
        ExecutionPath::Direct
    }
}

/// Acknowledgement body returned to the push channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConsumeOutcome {
    Success {
        event_id: String,
        outputs: Outputs,
    },
    AlreadyCompleted {
        event_id: String,
    },
    Failed {
        event_id: String,
        error: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Outputs {
    pub captions: Option<String>,
    pub image: Option<String>,
    pub video: Option<String>,
}

impl From<AssetUrls> for Outputs {
    fn from(assets: AssetUrls) -> Self {
        Outputs {
            captions: assets.captions_url,
            image: assets.image_url,
            video: assets.video_url,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConsumeError {
    #[error(transparent)]
    Store(#[from] JobStoreError),
}

impl From<ConsumeError> for ApiError {
    fn from(e: ConsumeError) -> Self {
        match e {
            ConsumeError::Store(e) => e.into(),
        }
    }
}

pub struct Consumer {
    jobs: Arc<dyn JobStore>,
    pipeline: AssetPipeline,
    orchestrator: Arc<dyn Orchestrator>,
    use_orchestration: bool,
    rollout_percentage: u8,
}

impl Consumer {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        pipeline: AssetPipeline,
        orchestrator: Arc<dyn Orchestrator>,
        use_orchestration: bool,
        rollout_percentage: u8,
    ) -> Self {
        Self {
            jobs,
            pipeline,
            orchestrator,
            use_orchestration,
            rollout_percentage: rollout_percentage.min(100),
        }
    }

    pub async fn consume(&self, message: &TaskMessage) -> Result<ConsumeOutcome, ConsumeError> {
        let event_id = message.event_id.as_str();
        let job = self.jobs.get(event_id).await?;

        match job.status {
            JobStatus::Completed => {
                tracing::info!(event_id, "[consume] Job already completed, acknowledging replay");
                return Ok(ConsumeOutcome::AlreadyCompleted {
                    event_id: event_id.to_string(),
                });
            }
            JobStatus::Processing => {}
            current => {
                return Err(JobStoreError::InvalidState {
                    event_id: event_id.to_string(),
                    current,
                    expected: JobStatus::Processing.to_string(),
                }
                .into());
            }
        }

        let path = select_path(event_id, self.use_orchestration, self.rollout_percentage);
        tracing::info!(event_id, ?path, "[consume] Generating assets");

        let output = match path {
            ExecutionPath::Direct => self.pipeline.generate_all(event_id, &message.task_list).await,
            ExecutionPath::Orchestrated => {
                match self.orchestrated(event_id, &message.task_list).await {
                    Ok(output) => output,
                    Err(e) => {
                        tracing::warn!(event_id, error = %e, "[consume] Orchestration failed, falling back to direct generation");
                        // Written now; the final status write repeats it without duplicating.
                        let fallback = format!("orchestration failed, used direct fallback: {}", e);
                        self.jobs.add_warning(event_id, &fallback).await?;
                        let mut output =
                            self.pipeline.generate_all(event_id, &message.task_list).await;
                        output.warnings.insert(0, fallback);
                        output
                    }
                }
            }
        };

        if output.assets.is_empty() {
            let detail = if output.failures.is_empty() {
                "No assets were generated".to_string()
            } else {
                format!("All asset generation failed: {}", output.failures.join("; "))
            };
            tracing::error!(event_id, error = %detail, "[consume] Job failed");
            let update = StatusUpdate::failed(detail.clone()).with_warnings(output.warnings);
            self.jobs.update_status(event_id, &update).await?;
            return Ok(ConsumeOutcome::Failed {
                event_id: event_id.to_string(),
                error: detail,
            });
        }

        let update =
            StatusUpdate::completed(output.assets.clone()).with_warnings(output.warnings.clone());
        self.jobs.update_status(event_id, &update).await?;
        tracing::info!(
            event_id,
            kinds = ?output.assets.kinds(),
            warnings = output.warnings.len(),
            "[consume] Job completed"
        );

        if message.task_list.reference_image_url.is_some() {
            self.cleanup_reference_image(event_id).await;
        }

        Ok(ConsumeOutcome::Success {
            event_id: event_id.to_string(),
            outputs: output.assets.into(),
        })
    }

    async fn orchestrated(
        &self,
        event_id: &str,
        task_list: &TaskList,
    ) -> Result<GenerationOutput, OrchestrationError> {
        let reply = self.orchestrator.orchestrate(event_id, task_list).await?;
        let parsed = parse_orchestration_response(&reply.text, self.pipeline.storage().bucket());
        let assets = requested_only(parsed.assets, task_list);
        if assets.is_empty() {
            return Err(OrchestrationError::NoUsableUrls);
        }

        let mut warnings = reply.warnings;
        if let Some(w) = parsed.warning {
            if !warnings.contains(&w) {
                warnings.push(w);
            }
        }
        tracing::info!(event_id, strategy = ?parsed.strategy, "[consume] Orchestrator response parsed");
        Ok(GenerationOutput {
            assets,
            warnings,
            failures: Vec::new(),
        })
    }

    async fn cleanup_reference_image(&self, event_id: &str) {
        match self
            .pipeline
            .remove_prefix(&reference_image_prefix(event_id))
            .await
        {
            Ok(removed) => {
                tracing::info!(event_id, removed, "[consume] Reference image cleaned up")
            }
            Err(e) => {
                tracing::warn!(event_id, error = %e, "[consume] Reference image cleanup failed")
            }
        }
    }
}

/// Drop URLs for kinds the task list never asked for.
fn requested_only(assets: AssetUrls, task_list: &TaskList) -> AssetUrls {
    AssetUrls {
        captions_url: assets.captions_url.filter(|_| task_list.captions.is_some()),
        image_url: assets.image_url.filter(|_| task_list.image.is_some()),
        video_url: assets.video_url.filter(|_| task_list.video.is_some()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{MockOrchestrator, OrchestratorReply};
    use crate::assets::tests::{FailingVideo, LargeVideo, full_task_list, pipeline_with};
    use crate::domain::jobs::MemoryJobStore;
    use crate::services::copy::{CopyGenerator, MockCopyGenerator};
    use crate::services::image::{GeneratedImage, ImageGenerator, MockImageGenerator};
    use crate::services::provider::ProviderError;
    use crate::services::video::MockVideoGenerator;
    use crate::domain::{BrandStyle, CaptionConfig, ImageConfig};
    use crate::storage::{MemoryStorage, ObjectStorage, StorageError};
    use async_trait::async_trait;
    use std::time::Duration;

    const BUCKET: &str = "mock-bucket";

    struct BrokenOrchestrator;

    #[async_trait]
    impl Orchestrator for BrokenOrchestrator {
        async fn orchestrate(
            &self,
            _event_id: &str,
            _task_list: &TaskList,
        ) -> Result<OrchestratorReply, OrchestrationError> {
            Err(OrchestrationError::Agent("model unavailable".into()))
        }
    }

    struct ChattyOrchestrator(String);

    #[async_trait]
    impl Orchestrator for ChattyOrchestrator {
        async fn orchestrate(
            &self,
            _event_id: &str,
            _task_list: &TaskList,
        ) -> Result<OrchestratorReply, OrchestrationError> {
            Ok(OrchestratorReply {
                text: self.0.clone(),
                warnings: Vec::new(),
            })
        }
    }

    struct FailingCopy;

    #[async_trait]
    impl CopyGenerator for FailingCopy {
        async fn generate_captions(
            &self,
            _config: &CaptionConfig,
            _goal: &str,
            _brand_style: Option<&BrandStyle>,
        ) -> Result<Vec<String>, ProviderError> {
            Err(ProviderError::OperationTimedOut)
        }
    }

    struct FailingImage;

    #[async_trait]
    impl ImageGenerator for FailingImage {
        async fn generate_image(
            &self,
            _config: &ImageConfig,
            _brand_style: Option<&BrandStyle>,
        ) -> Result<GeneratedImage, ProviderError> {
            Err(ProviderError::OperationTimedOut)
        }
    }

    struct HangingStorage;

    #[async_trait]
    impl ObjectStorage for HangingStorage {
        fn bucket(&self) -> &str {
            BUCKET
        }

        async fn put(&self, _key: &str, _data: Vec<u8>, _content_type: &str) -> Result<String, StorageError> {
            std::future::pending().await
        }

        async fn delete_prefix(&self, _prefix: &str) -> Result<usize, StorageError> {
            std::future::pending().await
        }
    }

    fn failing_pipeline(storage: Arc<MemoryStorage>) -> AssetPipeline {
        AssetPipeline::new(
            Arc::new(FailingCopy),
            Arc::new(FailingImage),
            Arc::new(FailingVideo),
            storage,
        )
    }

    const FULL_ROLLOUT: u8 = 100;

    async fn processing_job(jobs: &MemoryJobStore, event_id: &str, task_list: &TaskList) {
        jobs.create(event_id, "user-1", task_list).await.unwrap();
        jobs.approve(event_id, "user-1").await.unwrap();
    }

    fn consumer(
        jobs: Arc<MemoryJobStore>,
        pipeline: AssetPipeline,
        orchestrator: Arc<dyn Orchestrator>,
        rollout: u8,
    ) -> Consumer {
        Consumer::new(jobs, pipeline, orchestrator, rollout > 0, rollout)
    }

    fn message(event_id: &str, task_list: TaskList) -> TaskMessage {
        TaskMessage {
            event_id: event_id.to_string(),
            task_list,
        }
    }

    #[test]
    fn test_rollout_is_deterministic_and_bounded() {
        for id in ["a", "evt-1", "0192f0c2-7c9e-7d1a-8f00-000000000000"] {
            assert_eq!(rollout_bucket(id), rollout_bucket(id));
            assert!(rollout_bucket(id) < 100);
        }
        assert_eq!(select_path("evt-1", true, 0), ExecutionPath::Direct);
        assert_eq!(select_path("evt-1", true, 100), ExecutionPath::Orchestrated);
        assert_eq!(select_path("evt-1", false, 100), ExecutionPath::Direct);
    }

    #[test]
    fn test_rollout_roughly_matches_percentage() {
        let selected = (0..2000)
            .filter(|i| select_path(&format!("evt-{}", i), true, 30) == ExecutionPath::Orchestrated)
            .count();
        assert!((450..=750).contains(&selected), "selected {}", selected);
    }

    #[tokio::test]
    async fn test_direct_success_completes_job() {
        let jobs = Arc::new(MemoryJobStore::new());
        let storage = Arc::new(MemoryStorage::new(BUCKET));
        let task_list = full_task_list(None);
        processing_job(&jobs, "evt-1", &task_list).await;

        let consumer = consumer(
            jobs.clone(),
            pipeline_with(Arc::new(MockVideoGenerator), storage),
            Arc::new(BrokenOrchestrator),
            0,
        );
        let outcome = consumer.consume(&message("evt-1", task_list)).await.unwrap();

        let ConsumeOutcome::Success { outputs, .. } = outcome else {
            panic!("expected success, got {:?}", outcome);
        };
        assert!(outputs.captions.is_some() && outputs.image.is_some() && outputs.video.is_some());
        let job = jobs.get("evt-1").await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.videos.len(), 1);
    }

    #[tokio::test]
    async fn test_replay_of_completed_job_is_acknowledged() {
        let jobs = Arc::new(MemoryJobStore::new());
        let storage = Arc::new(MemoryStorage::new(BUCKET));
        let task_list = full_task_list(None);
        processing_job(&jobs, "evt-1", &task_list).await;
        let consumer = consumer(
            jobs.clone(),
            pipeline_with(Arc::new(MockVideoGenerator), storage.clone()),
            Arc::new(BrokenOrchestrator),
            0,
        );

        consumer.consume(&message("evt-1", task_list.clone())).await.unwrap();
        let stored = storage.keys().await;
        let replay = consumer.consume(&message("evt-1", task_list)).await.unwrap();

        assert_eq!(
            replay,
            ConsumeOutcome::AlreadyCompleted {
                event_id: "evt-1".into()
            }
        );
        assert_eq!(storage.keys().await, stored);
        assert_eq!(jobs.get("evt-1").await.unwrap().captions.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_job_is_error() {
        let jobs = Arc::new(MemoryJobStore::new());
        let storage = Arc::new(MemoryStorage::new(BUCKET));
        let consumer = consumer(
            jobs,
            pipeline_with(Arc::new(MockVideoGenerator), storage),
            Arc::new(BrokenOrchestrator),
            0,
        );
        let err = consumer
            .consume(&message("ghost", full_task_list(None)))
            .await
            .unwrap_err();
        assert!(matches!(err, ConsumeError::Store(JobStoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_pending_job_is_invalid_state() {
        let jobs = Arc::new(MemoryJobStore::new());
        let storage = Arc::new(MemoryStorage::new(BUCKET));
        let task_list = full_task_list(None);
        jobs.create("evt-1", "user-1", &task_list).await.unwrap();
        let consumer = consumer(
            jobs,
            pipeline_with(Arc::new(MockVideoGenerator), storage.clone()),
            Arc::new(BrokenOrchestrator),
            0,
        );

        let err = consumer.consume(&message("evt-1", task_list)).await.unwrap_err();
        assert!(matches!(
            err,
            ConsumeError::Store(JobStoreError::InvalidState {
                current: JobStatus::PendingApproval,
                ..
            })
        ));
        assert!(storage.keys().await.is_empty());
    }

    #[tokio::test]
    async fn test_partial_failure_still_completes() {
        let jobs = Arc::new(MemoryJobStore::new());
        let storage = Arc::new(MemoryStorage::new(BUCKET));
        let task_list = full_task_list(None);
        processing_job(&jobs, "evt-1", &task_list).await;
        let consumer = consumer(
            jobs.clone(),
            pipeline_with(Arc::new(FailingVideo), storage),
            Arc::new(BrokenOrchestrator),
            0,
        );

        let outcome = consumer.consume(&message("evt-1", task_list)).await.unwrap();
        let ConsumeOutcome::Success { outputs, .. } = outcome else {
            panic!("expected success");
        };
        assert!(outputs.video.is_none());
        assert_eq!(jobs.get("evt-1").await.unwrap().status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_all_kinds_failing_marks_job_failed() {
        let jobs = Arc::new(MemoryJobStore::new());
        let storage = Arc::new(MemoryStorage::new(BUCKET));
        let task_list = full_task_list(None);
        processing_job(&jobs, "evt-1", &task_list).await;
        let consumer = consumer(
            jobs.clone(),
            failing_pipeline(storage),
            Arc::new(BrokenOrchestrator),
            0,
        );

        let outcome = consumer.consume(&message("evt-1", task_list)).await.unwrap();
        let ConsumeOutcome::Failed { error, .. } = outcome else {
            panic!("expected failed outcome");
        };
        assert!(error.contains("captions:"));
        let job = jobs.get("evt-1").await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some(error.as_str()));
    }

    #[tokio::test]
    async fn test_failed_fallback_keeps_orchestration_warning() {
        let jobs = Arc::new(MemoryJobStore::new());
        let storage = Arc::new(MemoryStorage::new(BUCKET));
        let task_list = full_task_list(None);
        processing_job(&jobs, "evt-1", &task_list).await;
        let consumer = consumer(
            jobs.clone(),
            failing_pipeline(storage),
            Arc::new(BrokenOrchestrator),
            FULL_ROLLOUT,
        );

        let outcome = consumer.consume(&message("evt-1", task_list)).await.unwrap();
        assert!(matches!(outcome, ConsumeOutcome::Failed { .. }));
        let job = jobs.get("evt-1").await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.warnings.len(), 1);
        assert!(job.warnings[0].starts_with("orchestration failed, used direct fallback:"));
        assert!(job.warnings[0].contains("model unavailable"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_storage_fails_job_instead_of_hanging() {
        let jobs = Arc::new(MemoryJobStore::new());
        let task_list = full_task_list(None);
        processing_job(&jobs, "evt-1", &task_list).await;
        let pipeline = AssetPipeline::new(
            Arc::new(MockCopyGenerator),
            Arc::new(MockImageGenerator),
            Arc::new(MockVideoGenerator),
            Arc::new(HangingStorage),
        )
        .with_store_timeout(Duration::from_secs(5));
        let consumer = consumer(jobs.clone(), pipeline, Arc::new(BrokenOrchestrator), 0);

        let outcome = tokio::time::timeout(
            Duration::from_secs(60),
            consumer.consume(&message("evt-1", task_list)),
        )
        .await
        .expect("consume should finish once uploads time out")
        .unwrap();

        let ConsumeOutcome::Failed { error, .. } = outcome else {
            panic!("expected failed outcome, got {:?}", outcome);
        };
        assert!(error.contains("timed out"), "{}", error);
        assert_eq!(jobs.get("evt-1").await.unwrap().status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_duplicate_delivery_records_warning_once() {
        let jobs = Arc::new(MemoryJobStore::new());
        let storage = Arc::new(MemoryStorage::new(BUCKET));
        let task_list = full_task_list(Some(1.0));
        processing_job(&jobs, "evt-1", &task_list).await;
        let consumer = consumer(
            jobs.clone(),
            pipeline_with(Arc::new(LargeVideo(2 * 1024 * 1024)), storage),
            Arc::new(BrokenOrchestrator),
            0,
        );
        let msg = message("evt-1", task_list);

        let (first, second) = tokio::join!(consumer.consume(&msg), consumer.consume(&msg));
        first.unwrap();
        second.unwrap();

        let job = jobs.get("evt-1").await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.warnings.len(), 1);
        assert_eq!(job.videos.len(), 1);
    }

    #[tokio::test]
    async fn test_orchestrated_path_uses_agent_urls() {
        let jobs = Arc::new(MemoryJobStore::new());
        let storage = Arc::new(MemoryStorage::new(BUCKET));
        let task_list = full_task_list(None);
        processing_job(&jobs, "evt-1", &task_list).await;
        let pipeline = pipeline_with(Arc::new(MockVideoGenerator), storage);
        let consumer = consumer(
            jobs.clone(),
            pipeline.clone(),
            Arc::new(MockOrchestrator::new(pipeline)),
            FULL_ROLLOUT,
        );

        let outcome = consumer.consume(&message("evt-1", task_list)).await.unwrap();
        assert!(matches!(outcome, ConsumeOutcome::Success { .. }));
        let job = jobs.get("evt-1").await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_orchestration_error_falls_back_with_warning() {
        let jobs = Arc::new(MemoryJobStore::new());
        let storage = Arc::new(MemoryStorage::new(BUCKET));
        let task_list = full_task_list(None);
        processing_job(&jobs, "evt-1", &task_list).await;
        let consumer = consumer(
            jobs.clone(),
            pipeline_with(Arc::new(MockVideoGenerator), storage),
            Arc::new(BrokenOrchestrator),
            FULL_ROLLOUT,
        );

        let outcome = consumer.consume(&message("evt-1", task_list)).await.unwrap();
        assert!(matches!(outcome, ConsumeOutcome::Success { .. }));
        let job = jobs.get("evt-1").await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.warnings.len(), 1);
        assert!(job.warnings[0].starts_with("orchestration failed, used direct fallback:"));
        assert!(job.warnings[0].contains("model unavailable"));
    }

    #[tokio::test]
    async fn test_untrusted_agent_urls_trigger_fallback() {
        let jobs = Arc::new(MemoryJobStore::new());
        let storage = Arc::new(MemoryStorage::new(BUCKET));
        let task_list = full_task_list(None);
        processing_job(&jobs, "evt-1", &task_list).await;
        let reply = r#"{"captions_url": "https://evil.example.com/mock-bucket/c.json"}"#;
        let consumer = consumer(
            jobs.clone(),
            pipeline_with(Arc::new(MockVideoGenerator), storage),
            Arc::new(ChattyOrchestrator(reply.to_string())),
            FULL_ROLLOUT,
        );

        let outcome = consumer.consume(&message("evt-1", task_list)).await.unwrap();
        let ConsumeOutcome::Success { outputs, .. } = outcome else {
            panic!("expected success");
        };
        assert_eq!(
            outputs.captions.as_deref(),
            Some("https://storage.googleapis.com/mock-bucket/evt-1/captions.json")
        );
        let job = jobs.get("evt-1").await.unwrap();
        assert!(job.warnings[0].contains("no usable asset URLs"));
    }

    #[tokio::test]
    async fn test_oversize_warning_recorded() {
        let jobs = Arc::new(MemoryJobStore::new());
        let storage = Arc::new(MemoryStorage::new(BUCKET));
        let task_list = full_task_list(Some(1.0));
        processing_job(&jobs, "evt-1", &task_list).await;
        let consumer = consumer(
            jobs.clone(),
            pipeline_with(Arc::new(LargeVideo(2 * 1024 * 1024)), storage),
            Arc::new(BrokenOrchestrator),
            0,
        );

        consumer.consume(&message("evt-1", task_list)).await.unwrap();
        let job = jobs.get("evt-1").await.unwrap();
        assert_eq!(job.warnings.len(), 1);
        assert!(job.warnings[0].contains("exceeds platform limit"));
    }

    #[tokio::test]
    async fn test_reference_image_removed_after_completion() {
        let jobs = Arc::new(MemoryJobStore::new());
        let storage = Arc::new(MemoryStorage::new(BUCKET));
        let mut task_list = full_task_list(None);
        let reference = storage
            .put("evt-1/reference_image.png", vec![1, 2, 3], "image/png")
            .await
            .unwrap();
        task_list.reference_image_url = Some(reference);
        processing_job(&jobs, "evt-1", &task_list).await;
        let consumer = consumer(
            jobs,
            pipeline_with(Arc::new(MockVideoGenerator), storage.clone()),
            Arc::new(BrokenOrchestrator),
            0,
        );

        consumer.consume(&message("evt-1", task_list)).await.unwrap();
        assert!(storage.get("evt-1/reference_image.png").await.is_none());
        assert!(storage.get("evt-1/captions.json").await.is_some());
    }

    #[test]
    fn test_outcome_body_shape() {
        let body = serde_json::to_value(ConsumeOutcome::AlreadyCompleted {
            event_id: "evt-1".into(),
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"status": "already_completed", "event_id": "evt-1"}));

        let body = serde_json::to_value(ConsumeOutcome::Success {
            event_id: "evt-1".into(),
            outputs: Outputs {
                captions: Some("c".into()),
                image: None,
                video: None,
            },
        })
        .unwrap();
        assert_eq!(body["status"], "success");
        assert_eq!(body["outputs"]["captions"], "c");
        assert!(body["outputs"]["image"].is_null());
    }
}
