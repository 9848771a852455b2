//! Shared handler state for both services, assembled once at start-up from
//! [`Settings`]. Each capability is a trait object so mock and Google-backed
//! variants are interchangeable.

use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;

use crate::agent::{MockOrchestrator, Orchestrator, ResonOrchestrator};
use crate::assets::AssetPipeline;
use crate::config::Settings;
use crate::constants::MOCK_BUCKET_NAME;
use crate::consume::Consumer;
use crate::domain::jobs::{JobStore, MemoryJobStore, PgJobStore};
use crate::services::copy::{CopyGenerator, GeminiCopyGenerator, MockCopyGenerator};
use crate::services::gemini::{
    GeminiClient, GeminiText, GeminiVision, MockTextGenerator, MockVision, TextGenerator,
    VisionAnalyzer,
};
use crate::services::identity::{GoogleTokenVerifier, IdentityVerifier, MockVerifier, TokenKind};
use crate::services::image::{ImageGenerator, ImagenGenerator, MockImageGenerator};
use crate::services::pubsub::{MemoryChannel, MessageChannel, PubSubChannel};
use crate::services::video::{MockVideoGenerator, VeoGenerator, VideoGenerator};
use crate::storage::{GcsStorage, MemoryStorage, ObjectStorage, StorageError};
use crate::task_generator::TaskGenerator;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

pub struct StrategyState {
    pub settings: Settings,
    pub jobs: Arc<dyn JobStore>,
    pub channel: Arc<dyn MessageChannel>,
    pub storage: Arc<dyn ObjectStorage>,
    pub users: Arc<dyn IdentityVerifier>,
    pub vision: Arc<dyn VisionAnalyzer>,
    pub task_generator: TaskGenerator,
}

pub struct CreativeState {
    pub settings: Settings,
    pub consumer: Consumer,
    pub push_verifier: Arc<dyn IdentityVerifier>,
}

/// Postgres when `DATABASE_URL` is set (migrations applied), memory otherwise.
pub async fn job_store(settings: &Settings) -> Result<Arc<dyn JobStore>, StartupError> {
    let Some(url) = &settings.database_url else {
        tracing::warn!("[startup] DATABASE_URL not set, jobs are kept in memory");
        return Ok(Arc::new(MemoryJobStore::new()));
    };
    let pool = PgPoolOptions::new().max_connections(5).connect(url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("[startup] Postgres job store ready");
    Ok(Arc::new(PgJobStore::new(pool)))
}

/// Storage backend plus, for GCS, the read client used to fetch Veo output.
async fn object_storage(
    settings: &Settings,
) -> Result<(Arc<dyn ObjectStorage>, Option<google_cloud_storage::client::Storage>), StartupError> {
    if settings.mock.storage {
        return Ok((Arc::new(MemoryStorage::new(MOCK_BUCKET_NAME)), None));
    }
    let gcs = GcsStorage::connect(&settings.storage_bucket, settings.provider_timeout).await?;
    let reader = gcs.reader().clone();
    Ok((Arc::new(gcs), Some(reader)))
}

fn gemini_client(settings: &Settings) -> Result<GeminiClient, StartupError> {
    let key = settings.require_gemini_key().map_err(StartupError::Config)?;
    Ok(GeminiClient::new(&key))
}

fn user_verifier(settings: &Settings) -> Arc<dyn IdentityVerifier> {
    if settings.mock.auth {
        Arc::new(MockVerifier)
    } else {
        Arc::new(GoogleTokenVerifier::new(TokenKind::FirebaseUser, &settings.project_id))
    }
}

impl StrategyState {
    pub async fn from_settings(settings: Settings) -> Result<Self, StartupError> {
        let jobs = job_store(&settings).await?;
        let (storage, _) = object_storage(&settings).await?;

        let channel: Arc<dyn MessageChannel> = if settings.mock.pubsub {
            Arc::new(MemoryChannel::new())
        } else {
            Arc::new(PubSubChannel::new(
                &settings.project_id,
                &settings.pubsub_topic,
                settings.provider_timeout,
            ))
        };

        let (text, vision): (Arc<dyn TextGenerator>, Arc<dyn VisionAnalyzer>) =
            if settings.mock.gemini {
                (Arc::new(MockTextGenerator), Arc::new(MockVision))
            } else {
                let client = gemini_client(&settings)?;
                (
                    Arc::new(GeminiText::new(client.clone(), &settings.gemini_model)),
                    Arc::new(GeminiVision::new(
                        client,
                        &settings.gemini_model,
                        settings.provider_timeout,
                    )),
                )
            };

        Ok(StrategyState {
            users: user_verifier(&settings),
            task_generator: TaskGenerator::new(text, settings.provider_timeout),
            jobs,
            channel,
            storage,
            vision,
            settings,
        })
    }
}

impl CreativeState {
    pub async fn from_settings(settings: Settings) -> Result<Self, StartupError> {
        settings.require_push_identity().map_err(StartupError::Config)?;
        let jobs = job_store(&settings).await?;
        let (storage, reader) = object_storage(&settings).await?;
        let needs_gemini = !(settings.mock.gemini && settings.mock.imagen && settings.mock.veo);
        let client = if needs_gemini {
            Some(gemini_client(&settings)?)
        } else {
            None
        };

        let copy: Arc<dyn CopyGenerator> = match (&client, settings.mock.gemini) {
            (Some(client), false) => Arc::new(GeminiCopyGenerator::new(
                client.clone(),
                &settings.gemini_model,
                settings.provider_timeout,
            )),
            _ => Arc::new(MockCopyGenerator),
        };
        let image: Arc<dyn ImageGenerator> = match (&client, settings.mock.imagen) {
            (Some(client), false) => Arc::new(ImagenGenerator::new(
                client.clone(),
                &settings.imagen_model,
                settings.provider_timeout,
            )),
            _ => Arc::new(MockImageGenerator),
        };
        let video: Arc<dyn VideoGenerator> = match (&client, settings.mock.veo) {
            (Some(client), false) => Arc::new(VeoGenerator::new(
                client.clone(),
                reader,
                &settings.veo_model,
                settings.provider_timeout,
                settings.veo_timeout,
                settings.veo_poll_interval,
            )),
            _ => Arc::new(MockVideoGenerator),
        };

        let pipeline = AssetPipeline::new(copy, image, video, storage)
            .with_store_timeout(settings.provider_timeout);
        let orchestrator: Arc<dyn Orchestrator> = if settings.mock.gemini {
            Arc::new(MockOrchestrator::new(pipeline.clone()))
        } else {
            Arc::new(ResonOrchestrator::new(pipeline.clone(), settings.veo_timeout))
        };

        let push_verifier: Arc<dyn IdentityVerifier> = if settings.mock.auth {
            Arc::new(MockVerifier)
        } else {
            Arc::new(GoogleTokenVerifier::new(TokenKind::GoogleOidc, &settings.project_id))
        };

        if settings.use_orchestration {
            tracing::info!(
                rollout = settings.orchestration_rollout_percentage,
                "[startup] Orchestrated generation enabled"
            );
        }

        Ok(CreativeState {
            consumer: Consumer::new(
                jobs,
                pipeline,
                orchestrator,
                settings.use_orchestration,
                settings.orchestration_rollout_percentage,
            ),
            push_verifier,
            settings,
        })
    }
}
