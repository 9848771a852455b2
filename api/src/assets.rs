//! Generate one asset kind, store it, and report its URL.
//!
//! Shared by the direct consume path and the orchestration agent's tools so
//! both produce identical objects and warnings.

use std::sync::Arc;
use std::time::Duration;

use crate::constants::DEFAULT_PROVIDER_TIMEOUT_SECS;
use crate::domain::{AssetUrls, BrandStyle, CaptionConfig, ImageConfig, TaskList, VideoConfig};
use crate::services::copy::CopyGenerator;
use crate::services::image::ImageGenerator;
use crate::services::provider::ProviderError;
use crate::services::video::{VIDEO_CONTENT_TYPE, VIDEO_FILENAME, VideoGenerator};
use crate::storage::{ObjectStorage, StorageError, asset_key, with_storage_timeout};

pub const CAPTIONS_FILENAME: &str = "captions.json";

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("Failed to encode captions: {0}")]
    Encode(#[from] serde_json::Error),
}

impl AssetError {
    /// A later delivery of the same job may succeed for this kind.
    pub fn is_transient(&self) -> bool {
        match self {
            AssetError::Provider(e) => e.is_transient(),
            AssetError::Storage(StorageError::Timeout(..)) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoAsset {
    pub url: String,
    pub warning: Option<String>,
}

/// Result of generating every requested kind. Kinds that failed are absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationOutput {
    pub assets: AssetUrls,
    pub warnings: Vec<String>,
    pub failures: Vec<String>,
}

#[derive(Clone)]
pub struct AssetPipeline {
    copy: Arc<dyn CopyGenerator>,
    image: Arc<dyn ImageGenerator>,
    video: Arc<dyn VideoGenerator>,
    storage: Arc<dyn ObjectStorage>,
    store_timeout: Duration,
}

impl AssetPipeline {
    pub fn new(
        copy: Arc<dyn CopyGenerator>,
        image: Arc<dyn ImageGenerator>,
        video: Arc<dyn VideoGenerator>,
        storage: Arc<dyn ObjectStorage>,
    ) -> Self {
        Self {
            copy,
            image,
            video,
            storage,
            store_timeout: Duration::from_secs(DEFAULT_PROVIDER_TIMEOUT_SECS),
        }
    }

    /// Upper bound on each upload, whatever the storage backend.
    pub fn with_store_timeout(mut self, limit: Duration) -> Self {
        self.store_timeout = limit;
        self
    }

    async fn store(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<String, StorageError> {
        with_storage_timeout(self.store_timeout, "upload", self.storage.put(key, data, content_type)).await
    }

    pub async fn remove_prefix(&self, prefix: &str) -> Result<usize, StorageError> {
        with_storage_timeout(self.store_timeout, "prefix delete", self.storage.delete_prefix(prefix)).await
    }

    pub fn storage(&self) -> &Arc<dyn ObjectStorage> {
        &self.storage
    }

    pub async fn captions(
        &self,
        event_id: &str,
        config: &CaptionConfig,
        goal: &str,
        brand_style: Option<&BrandStyle>,
    ) -> Result<String, AssetError> {
        let captions = self.copy.generate_captions(config, goal, brand_style).await?;
        let body = serde_json::to_vec_pretty(&captions)?;
        let url = self
            .store(&asset_key(event_id, CAPTIONS_FILENAME), body, "application/json")
            .await?;
        tracing::info!(event_id, count = captions.len(), "[assets] Captions stored");
        Ok(url)
    }

    pub async fn image(
        &self,
        event_id: &str,
        config: &ImageConfig,
        brand_style: Option<&BrandStyle>,
    ) -> Result<String, AssetError> {
        let image = self.image.generate_image(config, brand_style).await?;
        let size = image.data.len();
        let url = self
            .store(&asset_key(event_id, image.filename()), image.data, image.content_type)
            .await?;
        tracing::info!(event_id, size, content_type = image.content_type, "[assets] Image stored");
        Ok(url)
    }

    /// Oversized output is stored anyway and reported as a warning.
    pub async fn video(
        &self,
        event_id: &str,
        config: &VideoConfig,
        brand_style: Option<&BrandStyle>,
    ) -> Result<VideoAsset, AssetError> {
        let data = self.video.generate_video(config, brand_style).await?;
        let warning = config
            .max_file_size_mb
            .and_then(|limit| oversize_warning(data.len(), limit));
        if let Some(w) = &warning {
            tracing::warn!(event_id, warning = %w, "[assets] Video exceeds platform limit");
        }
        let url = self
            .store(&asset_key(event_id, VIDEO_FILENAME), data, VIDEO_CONTENT_TYPE)
            .await?;
        tracing::info!(event_id, "[assets] Video stored");
        Ok(VideoAsset { url, warning })
    }

    /// Run every requested kind concurrently. One kind failing does not
    /// cancel the others.
    pub async fn generate_all(&self, event_id: &str, task_list: &TaskList) -> GenerationOutput {
        let brand = task_list.brand_style.as_ref();

        let captions = async {
            match &task_list.captions {
                Some(config) => Some(self.captions(event_id, config, &task_list.goal, brand).await),
                None => None,
            }
        };
        let image = async {
            match &task_list.image {
                Some(config) => Some(self.image(event_id, config, brand).await),
                None => None,
            }
        };
        let video = async {
            match &task_list.video {
                Some(config) => Some(self.video(event_id, config, brand).await),
                None => None,
            }
        };

        let (captions, image, video) = tokio::join!(captions, image, video);

        let mut output = GenerationOutput::default();
        output.assets.captions_url = settle(event_id, "captions", captions, &mut output.failures);
        output.assets.image_url = settle(event_id, "image", image, &mut output.failures);
        if let Some(video) = settle(event_id, "video", video, &mut output.failures) {
            output.assets.video_url = Some(video.url);
            output.warnings.extend(video.warning);
        }
        output
    }
}

fn settle<T>(
    event_id: &str,
    kind: &str,
    result: Option<Result<T, AssetError>>,
    failures: &mut Vec<String>,
) -> Option<T> {
    match result? {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::error!(
                event_id,
                kind,
                transient = e.is_transient(),
                error = %e,
                "[assets] Generation failed"
            );
            failures.push(format!("{}: {}", kind, e));
            None
        }
    }
}

pub fn oversize_warning(size_bytes: usize, limit_mb: f64) -> Option<String> {
    let size_mb = size_bytes as f64 / (1024.0 * 1024.0);
    (size_mb > limit_mb).then(|| {
        format!(
            "Generated video size ({:.2} MB) exceeds platform limit ({:?} MB). \
             This video may not upload successfully to the target platform.",
            size_mb, limit_mb
        )
    })
}
