//! Goal to task list planning.
//!
//! The text model only proposes which assets to make and what to prompt
//! them with. Sizes, ratios and limits always come from the platform
//! constraints, and any failure along the way degrades to
//! [`TaskList::fallback`].

use regex::Regex;
use serde::Deserialize;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use crate::domain::task_list::{MAX_CAPTIONS, MIN_CAPTIONS, MIN_VIDEO_SECS};
use crate::domain::{
    BrandStyle, CaptionConfig, ImageConfig, PlatformConstraints, TargetPlatforms, TaskList,
    TaskListDraft, ValidationError, VideoConfig,
};
use crate::services::gemini::{GOAL_MARKER, TextGenerator};
use crate::services::provider::{ProviderError, with_timeout};

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*\n?(.*?)\n?```").expect("valid regex"));

const PREFERRED_VIDEO_SECS: u32 = 15;

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedTaskList {
    pub task_list: TaskList,
    pub warnings: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
enum PlanError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("unparseable proposal: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// What the model is trusted to decide. Everything else is overwritten.
#[derive(Debug, Default, Deserialize)]
struct Proposal {
    #[serde(default)]
    captions: Option<ProposedCaptions>,
    #[serde(default)]
    image: Option<ProposedAsset>,
    #[serde(default)]
    video: Option<ProposedAsset>,
}

#[derive(Debug, Deserialize)]
struct ProposedCaptions {
    #[serde(default)]
    n: Option<i64>,
    #[serde(default)]
    style: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProposedAsset {
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    duration_sec: Option<f64>,
}

pub struct TaskGenerator {
    text: Arc<dyn TextGenerator>,
    timeout: Duration,
}

impl TaskGenerator {
    pub fn new(text: Arc<dyn TextGenerator>, timeout: Duration) -> Self {
        Self { text, timeout }
    }

    /// Plan the assets for `goal`. Never fails; see the module docs.
    pub async fn generate(
        &self,
        goal: &str,
        platforms: &TargetPlatforms,
        brand_style: Option<&BrandStyle>,
        reference_analysis: Option<&str>,
    ) -> GeneratedTaskList {
        let constraints = PlatformConstraints::intersect(platforms);
        let warnings = constraints.warnings.clone();

        let task_list = match self
            .plan(goal, platforms, &constraints, brand_style, reference_analysis)
            .await
        {
            Ok(task_list) => task_list,
            Err(e) => {
                tracing::warn!(error = %e, "[task_generator] Falling back to default task list");
                TaskList::fallback(goal, platforms.clone(), brand_style.cloned())
            }
        };

        GeneratedTaskList {
            task_list,
            warnings,
        }
    }

    async fn plan(
        &self,
        goal: &str,
        platforms: &TargetPlatforms,
        constraints: &PlatformConstraints,
        brand_style: Option<&BrandStyle>,
        reference_analysis: Option<&str>,
    ) -> Result<TaskList, PlanError> {
        let prompt = build_prompt(goal, platforms, constraints, brand_style, reference_analysis);
        let response = with_timeout(
            self.timeout,
            "task planning",
            self.text.generate_text(&prompt, self.timeout),
        )
        .await?;

        let proposal: Proposal = serde_json::from_str(strip_code_fence(&response))?;
        let keywords = reference_analysis.map(analysis_keywords).unwrap_or_default();
        let task_list = merge_proposal(
            goal,
            platforms,
            constraints,
            brand_style,
            &keywords,
            proposal,
        )?;
        tracing::info!(
            goal,
            kinds = task_list.requested_kinds(),
            "[task_generator] Generated task list"
        );
        Ok(task_list)
    }
}

/// Body of the first fenced block, or the trimmed text when there is none.
pub fn strip_code_fence(text: &str) -> &str {
    match CODE_FENCE.captures(text).and_then(|c| c.get(1)) {
        Some(body) => body.as_str().trim(),
        None => text.trim(),
    }
}

/// Visual themes worth carrying from a product image analysis into prompts.
pub fn analysis_keywords(analysis: &str) -> Vec<&'static str> {
    let lower = analysis.to_lowercase();
    let mut keywords = Vec::new();
    if lower.contains("eco") || lower.contains("green") {
        keywords.push("eco-friendly");
    }
    if lower.contains("nature") || lower.contains("outdoor") {
        keywords.push("nature");
    }
    if lower.contains("bottle") {
        keywords.push("bottle");
    }
    keywords
}

fn build_prompt(
    goal: &str,
    platforms: &TargetPlatforms,
    c: &PlatformConstraints,
    brand_style: Option<&BrandStyle>,
    reference_analysis: Option<&str>,
) -> String {
    let mut prompt = format!(
        "You are a marketing strategist. Given a marketing goal and target platforms, \
         propose the assets to create.\n\n\
         {GOAL_MARKER} {goal}\n\
         Target Platforms: {platforms}\n\n\
         Platform Constraints:\n\
         - Image: {image_size} ({image_ratio}), max {image_mb}MB\n\
         - Video: {video_ratio}, max {video_secs}s, max {video_mb}MB\n\
         - Captions: max {caption_len} characters each\n",
        goal = goal,
        platforms = platforms.joined(),
        image_size = c.image_size,
        image_ratio = c.image_aspect_ratio,
        image_mb = c.max_image_size_mb,
        video_ratio = c.video_aspect_ratio,
        video_secs = c.max_video_length_sec,
        video_mb = c.max_video_size_mb,
        caption_len = c.caption_max_length,
    );

    if let Some(brand) = brand_style {
        prompt.push_str(&format!(
            "\nBrand Style:\n\
             - Colors: {}\n\
             - Tone: {} ({})\n\
             - Tagline: {}\n\
             Reference the brand colors in image and video prompts and match the tone in captions.\n",
            brand.color_summary(),
            brand.tone.as_str(),
            brand.tone.description(),
            brand.tagline.as_deref().unwrap_or("N/A"),
        ));
    }

    if let Some(analysis) = reference_analysis {
        prompt.push_str(&format!(
            "\nReference Product Image Analysis:\n{}\n\
             Keep captions and visual prompts consistent with this product.\n",
            analysis
        ));
    }

    prompt.push_str(&format!(
        "\nRespond with a JSON object:\n\
         {{\"captions\": {{\"n\": <1-10>, \"style\": \"<engaging|twitter|linkedin>\"}},\n \
         \"image\": {{\"prompt\": \"<image description>\"}} or null,\n \
         \"video\": {{\"prompt\": \"<video description>\", \"duration_sec\": <{}-{}>}} or null}}\n\n\
         Rules:\n\
         - Always include captions\n\
         - Include an image if the goal mentions visuals or is substantial\n\
         - Include a video only if explicitly requested or the goal is a major campaign\n\
         - Return ONLY the JSON object\n",
        MIN_VIDEO_SECS, c.max_video_length_sec
    ));
    prompt
}

fn merge_proposal(
    goal: &str,
    platforms: &TargetPlatforms,
    c: &PlatformConstraints,
    brand_style: Option<&BrandStyle>,
    keywords: &[&str],
    proposal: Proposal,
) -> Result<TaskList, ValidationError> {
    let captions = proposal
        .captions
        .map(|p| {
            let n = p
                .n
                .unwrap_or(3)
                .clamp(MIN_CAPTIONS as i64, MAX_CAPTIONS as i64) as u32;
            CaptionConfig::new(n, p.style)
        })
        .transpose()?;

    let image = proposal
        .image
        .and_then(|p| p.prompt)
        .filter(|p| !p.trim().is_empty())
        .map(|prompt| {
            let prompt = if keywords.is_empty() {
                prompt
            } else {
                format!("Product visual incorporating {}: {}", keywords.join(", "), prompt)
            };
            ImageConfig::new(
                prompt,
                Some(c.image_size.clone()),
                Some(c.image_aspect_ratio.clone()),
                Some(c.max_image_size_mb),
            )
        })
        .transpose()?;

    let video = proposal
        .video
        .and_then(|p| {
            let prompt = p.prompt.filter(|s| !s.trim().is_empty())?;
            Some((prompt, p.duration_sec))
        })
        .map(|(prompt, duration)| {
            let max = c.max_video_length_sec.max(MIN_VIDEO_SECS);
            let duration = duration
                .filter(|d| d.is_finite())
                .map(|d| d.round() as u32)
                .unwrap_or(PREFERRED_VIDEO_SECS.min(max))
                .clamp(MIN_VIDEO_SECS, max);
            let prompt = if keywords.is_empty() {
                prompt
            } else {
                format!("{} Featuring {}.", prompt, keywords.join(", "))
            };
            VideoConfig::new(
                prompt,
                Some(duration),
                Some(c.video_aspect_ratio.clone()),
                Some(c.max_video_size_mb),
            )
        })
        .transpose()?;

    TaskList::try_from(TaskListDraft {
        goal: goal.to_string(),
        target_platforms: platforms.as_slice().to_vec(),
        captions,
        image,
        video,
        brand_style: brand_style.cloned(),
        reference_image_url: None,
    })
}
