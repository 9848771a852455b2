//! Short promotional video generation.

use async_trait::async_trait;
use std::time::Duration;

use super::gemini::GeminiClient;
use super::provider::{ProviderError, with_timeout};
use crate::domain::brand::hex_to_color_name;
use crate::domain::platform::{RatioCategory, ratio_category};
use crate::domain::{BrandStyle, VideoConfig};
use crate::storage::{download_object, parse_gcs_uri};

pub const VIDEO_CONTENT_TYPE: &str = "video/mp4";
pub const VIDEO_FILENAME: &str = "video.mp4";

#[async_trait]
pub trait VideoGenerator: Send + Sync {
    /// Generate a video and return the encoded MP4 bytes.
    async fn generate_video(
        &self,
        config: &VideoConfig,
        brand_style: Option<&BrandStyle>,
    ) -> Result<Vec<u8>, ProviderError>;
}

/// Emits a tiny MP4 container (ftyp, moov, mdat) whose payload encodes the
/// requested duration.
#[derive(Default)]
pub struct MockVideoGenerator;

#[async_trait]
impl VideoGenerator for MockVideoGenerator {
    async fn generate_video(
        &self,
        config: &VideoConfig,
        _brand_style: Option<&BrandStyle>,
    ) -> Result<Vec<u8>, ProviderError> {
        Ok(mock_mp4(config.duration_sec))
    }
}

fn mp4_box(kind: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let size = (payload.len() + 8) as u32;
    let mut out = Vec::with_capacity(size as usize);
    out.extend_from_slice(&size.to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(payload);
    out
}

pub fn mock_mp4(duration_sec: u32) -> Vec<u8> {
    let mut ftyp = Vec::new();
    ftyp.extend_from_slice(b"isom");
    ftyp.extend_from_slice(&0x200u32.to_be_bytes());
    ftyp.extend_from_slice(b"isomiso2mp41");

    // mvhd v0: timescale 1000, duration in ms
    let mut mvhd = vec![0u8; 100];
    mvhd[12..16].copy_from_slice(&1000u32.to_be_bytes());
    mvhd[16..20].copy_from_slice(&(duration_sec * 1000).to_be_bytes());
    let moov = mp4_box(b"moov", &mp4_box(b"mvhd", &mvhd));

    let mdat = mp4_box(b"mdat", &vec![0u8; 1024]);

    let mut out = mp4_box(b"ftyp", &ftyp);
    out.extend(moov);
    out.extend(mdat);
    out
}

/// Veo accepts 4, 6 or 8 second clips.
pub fn veo_duration(requested_secs: u32) -> u32 {
    match requested_secs {
        0..=5 => 4,
        6..=7 => 6,
        _ => 8,
    }
}

/// Veo renders landscape or portrait only.
pub fn veo_aspect_ratio(requested: Option<&str>) -> &'static str {
    match requested.and_then(ratio_category) {
        Some(RatioCategory::Portrait) => "9:16",
        _ => "16:9",
    }
}

pub fn veo_prompt(config: &VideoConfig, brand_style: Option<&BrandStyle>) -> String {
    let Some(brand) = brand_style else {
        return config.prompt.clone();
    };
    let colors: Vec<&str> = brand
        .colors
        .iter()
        .take(3)
        .map(|c| hex_to_color_name(&c.hex_code))
        .collect();
    format!(
        "{}. Color palette: {}. Mood: {}.",
        config.prompt,
        colors.join(", "),
        brand.tone.description()
    )
}

pub struct VeoGenerator {
    client: GeminiClient,
    gcs: Option<google_cloud_storage::client::Storage>,
    model: String,
    call_timeout: Duration,
    overall_timeout: Duration,
    poll_interval: Duration,
}

impl VeoGenerator {
    pub fn new(
        client: GeminiClient,
        gcs: Option<google_cloud_storage::client::Storage>,
        model: &str,
        call_timeout: Duration,
        overall_timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            client,
            gcs,
            model: model.to_string(),
            call_timeout,
            overall_timeout,
            poll_interval,
        }
    }

    async fn wait_for_video(&self, operation: &str) -> Result<String, ProviderError> {
        loop {
            let op = with_timeout(
                self.call_timeout,
                "video operation poll",
                self.client.get_operation(operation),
            )
            .await?;
            if op.done {
                if let Some(error) = op.error {
                    return Err(ProviderError::Other(format!("Video generation failed: {}", error)));
                }
                return op
                    .video_uri()
                    .ok_or_else(|| ProviderError::InvalidResponse("no video in operation result".into()));
            }
            tracing::debug!(operation, "[veo] still running");
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn fetch(&self, uri: &str) -> Result<Vec<u8>, ProviderError> {
        if uri.starts_with("gs://") {
            let (bucket, path) =
                parse_gcs_uri(uri).map_err(|_| ProviderError::InvalidGcsUri(uri.to_string()))?;
            let gcs = self
                .gcs
                .as_ref()
                .ok_or_else(|| ProviderError::Other("no GCS client for video download".into()))?;
            return with_timeout(self.call_timeout, "video download", async {
                download_object(gcs, &bucket, &path)
                    .await
                    .map_err(|e| ProviderError::Other(e.to_string()))
            })
            .await;
        }
        with_timeout(self.call_timeout, "video download", self.client.download(uri)).await
    }
}

#[async_trait]
impl VideoGenerator for VeoGenerator {
    async fn generate_video(
        &self,
        config: &VideoConfig,
        brand_style: Option<&BrandStyle>,
    ) -> Result<Vec<u8>, ProviderError> {
        let prompt = veo_prompt(config, brand_style);
        let duration = veo_duration(config.duration_sec);
        let aspect_ratio = veo_aspect_ratio(config.aspect_ratio.as_deref());

        let operation = with_timeout(
            self.call_timeout,
            "video generation start",
            self.client
                .start_video(&self.model, &prompt, aspect_ratio, duration),
        )
        .await?;
        tracing::info!(operation, duration, aspect_ratio, "[veo] generation started");

        let uri = tokio::time::timeout(self.overall_timeout, self.wait_for_video(&operation))
            .await
            .map_err(|_| ProviderError::OperationTimedOut)??;

        self.fetch(&uri).await
    }
}
