//! The task list: which assets to generate and under which constraints.

use serde::{Deserialize, Serialize};

use super::ValidationError;
use super::brand::BrandStyle;
use super::platform::{Platform, TargetPlatforms};

pub const MIN_CAPTIONS: u32 = 1;
pub const MAX_CAPTIONS: u32 = 10;
pub const DEFAULT_CAPTION_STYLE: &str = "engaging";
pub const DEFAULT_IMAGE_SIZE: &str = "1024x1024";
pub const MIN_VIDEO_SECS: u32 = 4;
pub const MAX_VIDEO_SECS: u32 = 600;
pub const DEFAULT_VIDEO_SECS: u32 = 15;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CaptionConfigInput")]
pub struct CaptionConfig {
    pub n: u32,
    pub style: String,
}

#[derive(Deserialize)]
struct CaptionConfigInput {
    n: u32,
    #[serde(default)]
    style: Option<String>,
}

impl CaptionConfig {
    pub fn new(n: u32, style: Option<String>) -> Result<Self, ValidationError> {
        if !(MIN_CAPTIONS..=MAX_CAPTIONS).contains(&n) {
            return Err(ValidationError::new(format!(
                "Caption count must be between {} and {}, got {}",
                MIN_CAPTIONS, MAX_CAPTIONS, n
            )));
        }
        let style = style
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_CAPTION_STYLE.to_string());
        Ok(CaptionConfig { n, style })
    }
}

impl Default for CaptionConfig {
    fn default() -> Self {
        CaptionConfig {
            n: 3,
            style: DEFAULT_CAPTION_STYLE.to_string(),
        }
    }
}

impl TryFrom<CaptionConfigInput> for CaptionConfig {
    type Error = ValidationError;

    fn try_from(input: CaptionConfigInput) -> Result<Self, Self::Error> {
        CaptionConfig::new(input.n, input.style)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ImageConfigInput")]
pub struct ImageConfig {
    pub prompt: String,
    pub size: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_file_size_mb: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_image_url: Option<String>,
}

#[derive(Deserialize)]
struct ImageConfigInput {
    prompt: String,
    #[serde(default)]
    size: Option<String>,
    #[serde(default)]
    aspect_ratio: Option<String>,
    #[serde(default)]
    max_file_size_mb: Option<f64>,
    #[serde(default)]
    reference_image_url: Option<String>,
}

impl ImageConfig {
    pub fn new(
        prompt: impl Into<String>,
        size: Option<String>,
        aspect_ratio: Option<String>,
        max_file_size_mb: Option<f64>,
    ) -> Result<Self, ValidationError> {
        let prompt = non_empty_prompt(prompt.into())?;
        let size = size.unwrap_or_else(|| DEFAULT_IMAGE_SIZE.to_string());
        parse_size(&size)?;
        validate_max_size(max_file_size_mb)?;
        Ok(ImageConfig {
            prompt,
            size,
            aspect_ratio: aspect_ratio.filter(|r| !r.trim().is_empty()),
            max_file_size_mb,
            reference_image_url: None,
        })
    }

    pub fn with_reference_image(mut self, url: Option<String>) -> Self {
        self.reference_image_url = url;
        self
    }

    pub fn dimensions(&self) -> (u32, u32) {
        // validated at construction
        parse_size(&self.size).unwrap_or((1024, 1024))
    }

    /// The configured ratio, or one derived from the pixel size.
    pub fn effective_aspect_ratio(&self) -> String {
        if let Some(ratio) = &self.aspect_ratio {
            return ratio.clone();
        }
        let (w, h) = self.dimensions();
        let ratio = w as f64 / h as f64;
        let derived = if ratio > 1.5 {
            "16:9"
        } else if ratio < 0.7 {
            "9:16"
        } else if ratio > 1.2 {
            "4:3"
        } else if ratio < 0.85 {
            "3:4"
        } else {
            "1:1"
        };
        derived.to_string()
    }
}

impl TryFrom<ImageConfigInput> for ImageConfig {
    type Error = ValidationError;

    fn try_from(input: ImageConfigInput) -> Result<Self, Self::Error> {
        Ok(ImageConfig::new(
            input.prompt,
            input.size,
            input.aspect_ratio,
            input.max_file_size_mb,
        )?
        .with_reference_image(input.reference_image_url))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "VideoConfigInput")]
pub struct VideoConfig {
    pub prompt: String,
    pub duration_sec: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_file_size_mb: Option<f64>,
}

#[derive(Deserialize)]
struct VideoConfigInput {
    prompt: String,
    #[serde(default)]
    duration_sec: Option<u32>,
    #[serde(default)]
    aspect_ratio: Option<String>,
    #[serde(default)]
    max_file_size_mb: Option<f64>,
}

impl VideoConfig {
    pub fn new(
        prompt: impl Into<String>,
        duration_sec: Option<u32>,
        aspect_ratio: Option<String>,
        max_file_size_mb: Option<f64>,
    ) -> Result<Self, ValidationError> {
        let prompt = non_empty_prompt(prompt.into())?;
        let duration_sec = duration_sec.unwrap_or(DEFAULT_VIDEO_SECS);
        if !(MIN_VIDEO_SECS..=MAX_VIDEO_SECS).contains(&duration_sec) {
            return Err(ValidationError::new(format!(
                "Video duration must be between {} and {} seconds, got {}",
                MIN_VIDEO_SECS, MAX_VIDEO_SECS, duration_sec
            )));
        }
        validate_max_size(max_file_size_mb)?;
        Ok(VideoConfig {
            prompt,
            duration_sec,
            aspect_ratio: aspect_ratio.filter(|r| !r.trim().is_empty()),
            max_file_size_mb,
        })
    }
}

impl TryFrom<VideoConfigInput> for VideoConfig {
    type Error = ValidationError;

    fn try_from(input: VideoConfigInput) -> Result<Self, Self::Error> {
        VideoConfig::new(
            input.prompt,
            input.duration_sec,
            input.aspect_ratio,
            input.max_file_size_mb,
        )
    }
}

/// Unvalidated task list fields. Only becomes a [`TaskList`] through
/// `TaskList::try_from`.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskListDraft {
    pub goal: String,
    pub target_platforms: Vec<Platform>,
    #[serde(default)]
    pub captions: Option<CaptionConfig>,
    #[serde(default)]
    pub image: Option<ImageConfig>,
    #[serde(default)]
    pub video: Option<VideoConfig>,
    #[serde(default)]
    pub brand_style: Option<BrandStyle>,
    #[serde(default)]
    pub reference_image_url: Option<String>,
}

/// Immutable description of the work for one job. Always names at least one
/// asset kind and at least one platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TaskListDraft")]
pub struct TaskList {
    pub goal: String,
    pub target_platforms: TargetPlatforms,
    pub captions: Option<CaptionConfig>,
    pub image: Option<ImageConfig>,
    pub video: Option<VideoConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand_style: Option<BrandStyle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_image_url: Option<String>,
}

impl TaskList {
    /// Minimal valid task list: the goal, the platforms and three captions.
    pub fn fallback(
        goal: &str,
        target_platforms: TargetPlatforms,
        brand_style: Option<BrandStyle>,
    ) -> Self {
        TaskList {
            goal: goal.to_string(),
            target_platforms,
            captions: Some(CaptionConfig::default()),
            image: None,
            video: None,
            brand_style,
            reference_image_url: None,
        }
    }

    pub fn requested_kinds(&self) -> usize {
        [
            self.captions.is_some(),
            self.image.is_some(),
            self.video.is_some(),
        ]
        .into_iter()
        .filter(|k| *k)
        .count()
    }
}

impl TryFrom<TaskListDraft> for TaskList {
    type Error = ValidationError;

    fn try_from(draft: TaskListDraft) -> Result<Self, Self::Error> {
        let goal = draft.goal.trim().to_string();
        if goal.is_empty() {
            return Err(ValidationError::new("goal cannot be empty"));
        }
        let target_platforms = TargetPlatforms::try_from(draft.target_platforms)?;
        if draft.captions.is_none() && draft.image.is_none() && draft.video.is_none() {
            return Err(ValidationError::new(
                "At least one task (captions, image, or video) must be specified",
            ));
        }
        Ok(TaskList {
            goal,
            target_platforms,
            captions: draft.captions,
            image: draft.image,
            video: draft.video,
            brand_style: draft.brand_style,
            reference_image_url: draft.reference_image_url,
        })
    }
}

fn non_empty_prompt(prompt: String) -> Result<String, ValidationError> {
    let prompt = prompt.trim().to_string();
    if prompt.is_empty() {
        return Err(ValidationError::new("prompt cannot be empty"));
    }
    Ok(prompt)
}

fn validate_max_size(max_file_size_mb: Option<f64>) -> Result<(), ValidationError> {
    match max_file_size_mb {
        Some(mb) if !(mb > 0.0) => Err(ValidationError::new(
            "max_file_size_mb must be greater than 0",
        )),
        _ => Ok(()),
    }
}

/// Parse "WIDTHxHEIGHT".
pub fn parse_size(size: &str) -> Result<(u32, u32), ValidationError> {
    let (w, h) = size
        .split_once('x')
        .ok_or_else(|| ValidationError::new(format!("Invalid size format: {}", size)))?;
    let (w, h) = match (w.trim().parse::<u32>(), h.trim().parse::<u32>()) {
        (Ok(w), Ok(h)) => (w, h),
        _ => return Err(ValidationError::new(format!("Invalid size format: {}", size))),
    };
    if w == 0 || h == 0 {
        return Err(ValidationError::new(format!("Invalid dimensions: {}", size)));
    }
    Ok((w, h))
}
