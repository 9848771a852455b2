//! Agent-orchestrated asset generation.
//!
//! A coordinator model is given generation tools and asked to produce every
//! requested asset, then report the resulting URLs. Its final answer is free
//! text, so [`parse_orchestration_response`] reads it with decreasing
//! strictness and only keeps URLs that point into our bucket.

use async_trait::async_trait;
use regex::Regex;
use reson_agentic::Tool;
use reson_agentic::agentic;
use reson_agentic::runtime::ToolFunction;
use reson_agentic::types::{
    ChatRole, CreateResult, MediaPart, MultimodalMessage, ToolCall, ToolResult,
};
use reson_agentic::utils::ConversationMessage;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::assets::AssetPipeline;
use crate::constants::STORAGE_HOST;
use crate::domain::{AssetUrls, CaptionConfig, ImageConfig, TaskList, VideoConfig};

const MAX_TURNS: usize = 12;
const ASSET_KINDS: [&str; 3] = ["captions", "image", "video"];

static FENCED_JSON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*\n?(\{.*?\})\s*\n?```").expect("valid regex")
});
static WARNING_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""warning":\s*"([^"]+)""#).expect("valid regex"));
static KEYED_URLS: LazyLock<Vec<(&'static str, [Regex; 2])>> = LazyLock::new(|| {
    ASSET_KINDS
        .iter()
        .map(|kind| {
            let colon = format!(
                r#"(?i){}_url["']?:\s*["']?(https://storage\.googleapis\.com[^\s"']+)"#,
                kind
            );
            let equals = format!(
                r#"(?i){}_url["']?\s*=\s*["']?(https://storage\.googleapis\.com[^\s"']+)"#,
                kind
            );
            (
                *kind,
                [
                    Regex::new(&colon).expect("valid regex"),
                    Regex::new(&equals).expect("valid regex"),
                ],
            )
        })
        .collect()
});

// ============================================================================
// Response parsing
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStrategy {
    BalancedJson,
    FencedJson,
    KeyedRegex,
}

/// What could be trusted from a coordinator's answer.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialResult {
    pub assets: AssetUrls,
    pub warning: Option<String>,
    pub strategy: ParseStrategy,
}

/// Accept only `https://storage.googleapis.com/{bucket}/...` URLs.
pub fn is_trusted_asset_url(url: &str, bucket: &str) -> bool {
    let Ok(parsed) = reqwest::Url::parse(url) else {
        return false;
    };
    if parsed.scheme() != "https" {
        return false;
    }
    let host_ok = parsed
        .host_str()
        .is_some_and(|h| h.ends_with(STORAGE_HOST));
    host_ok && parsed.path().starts_with(&format!("/{}/", bucket))
}

/// First `{` through its matching `}`.
fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    for (offset, ch) in text[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

fn urls_from_object(object: &Value, bucket: &str) -> AssetUrls {
    let field = |key: &str| {
        object
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|url| {
                let ok = is_trusted_asset_url(url, bucket);
                if !ok {
                    tracing::warn!(url, "[orchestrator] Discarding untrusted URL");
                }
                ok
            })
            .map(str::to_string)
    };
    AssetUrls {
        captions_url: field("captions_url"),
        image_url: field("image_url"),
        video_url: field("video_url"),
    }
}

fn keyed_url(text: &str, kind: &str, bucket: &str) -> Option<String> {
    let (_, patterns) = KEYED_URLS.iter().find(|(k, _)| *k == kind)?;
    patterns.iter().find_map(|re| {
        let url = re
            .captures(text)?
            .get(1)?
            .as_str()
            .trim_end_matches(['"', ',', '\'']);
        is_trusted_asset_url(url, bucket).then(|| url.to_string())
    })
}

/// Read asset URLs out of a coordinator's free-text answer: a balanced JSON
/// object first, then a fenced JSON block, then `kind_url: ...` pairs.
/// Untrusted URLs are dropped at every stage.
pub fn parse_orchestration_response(text: &str, bucket: &str) -> PartialResult {
    let warning = WARNING_FIELD
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());

    if let Some(object) = balanced_object(text).and_then(|s| serde_json::from_str::<Value>(s).ok()) {
        return PartialResult {
            assets: urls_from_object(&object, bucket),
            warning,
            strategy: ParseStrategy::BalancedJson,
        };
    }

    if let Some(object) = FENCED_JSON
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| serde_json::from_str::<Value>(m.as_str()).ok())
    {
        return PartialResult {
            assets: urls_from_object(&object, bucket),
            warning,
            strategy: ParseStrategy::FencedJson,
        };
    }

    tracing::warn!("[orchestrator] No JSON in response, falling back to keyed extraction");
    PartialResult {
        assets: AssetUrls {
            captions_url: keyed_url(text, "captions", bucket),
            image_url: keyed_url(text, "image", bucket),
            video_url: keyed_url(text, "video", bucket),
        },
        warning,
        strategy: ParseStrategy::KeyedRegex,
    }
}

// ============================================================================
// Orchestrator seam
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrchestrationError {
    #[error("agent error: {0}")]
    Agent(String),
    #[error("agent did not finish within {0:?}")]
    TimedOut(Duration),
    #[error("agent produced no final answer")]
    NoAnswer,
    #[error("no usable asset URLs in agent response")]
    NoUsableUrls,
}

/// Raw coordinator output.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorReply {
    pub text: String,
    /// Warnings raised by tools during the run.
    pub warnings: Vec<String>,
}

#[async_trait]
pub trait Orchestrator: Send + Sync {
    async fn orchestrate(
        &self,
        event_id: &str,
        task_list: &TaskList,
    ) -> Result<OrchestratorReply, OrchestrationError>;
}

// ============================================================================
// Tools
// ============================================================================

/// Write social media captions for the campaign and store them.
#[derive(Tool, Serialize, Deserialize, Debug)]
pub struct GenerateCaptions {
    /// Number of captions (1-10)
    pub n: u32,
    /// Caption style, e.g. "engaging", "twitter", "professional"
    pub style: Option<String>,
}

/// Generate the campaign image and store it.
#[derive(Tool, Serialize, Deserialize, Debug)]
pub struct GenerateImage {
    /// Detailed visual description of the image
    pub prompt: String,
}

/// Generate the campaign video and store it.
#[derive(Tool, Serialize, Deserialize, Debug)]
pub struct GenerateVideo {
    /// Detailed description of the video's scenes and motion
    pub prompt: String,
    /// Length in seconds; clamped to the task's limit
    pub duration_sec: Option<u32>,
}

pub struct CoordinatorContext {
    pub event_id: String,
    pub task_list: TaskList,
    pub pipeline: AssetPipeline,
    pub warnings: Vec<String>,
    pub final_text: Option<String>,
}

fn tool_error(message: impl std::fmt::Display) -> String {
    json!({ "error": message.to_string() }).to_string()
}

async fn run_captions_tool(ctx: Arc<Mutex<CoordinatorContext>>, args: GenerateCaptions) -> String {
    let (event_id, pipeline, task_list) = {
        let guard = ctx.lock().await;
        (guard.event_id.clone(), guard.pipeline.clone(), guard.task_list.clone())
    };
    let base = task_list.captions.clone().unwrap_or_default();
    let config = match CaptionConfig::new(args.n, args.style.or(Some(base.style))) {
        Ok(config) => config,
        Err(e) => return tool_error(e),
    };
    match pipeline
        .captions(&event_id, &config, &task_list.goal, task_list.brand_style.as_ref())
        .await
    {
        Ok(url) => json!({ "captions_url": url }).to_string(),
        Err(e) => tool_error(e),
    }
}

async fn run_image_tool(ctx: Arc<Mutex<CoordinatorContext>>, args: GenerateImage) -> String {
    let (event_id, pipeline, task_list) = {
        let guard = ctx.lock().await;
        (guard.event_id.clone(), guard.pipeline.clone(), guard.task_list.clone())
    };
    let Some(base) = task_list.image.clone() else {
        return tool_error("no image was requested for this campaign");
    };
    // Size and limits stay with the task list; only the prompt is the agent's.
    let config = match ImageConfig::new(
        args.prompt,
        Some(base.size),
        base.aspect_ratio,
        base.max_file_size_mb,
    ) {
        Ok(config) => config.with_reference_image(base.reference_image_url),
        Err(e) => return tool_error(e),
    };
    match pipeline
        .image(&event_id, &config, task_list.brand_style.as_ref())
        .await
    {
        Ok(url) => json!({ "image_url": url }).to_string(),
        Err(e) => tool_error(e),
    }
}

async fn run_video_tool(ctx: Arc<Mutex<CoordinatorContext>>, args: GenerateVideo) -> String {
    let (event_id, pipeline, task_list) = {
        let guard = ctx.lock().await;
        (guard.event_id.clone(), guard.pipeline.clone(), guard.task_list.clone())
    };
    let Some(base) = task_list.video.clone() else {
        return tool_error("no video was requested for this campaign");
    };
    let duration = args
        .duration_sec
        .map(|d| d.min(base.duration_sec))
        .unwrap_or(base.duration_sec);
    let config = match VideoConfig::new(
        args.prompt,
        Some(duration),
        base.aspect_ratio,
        base.max_file_size_mb,
    ) {
        Ok(config) => config,
        Err(e) => return tool_error(e),
    };
    match pipeline
        .video(&event_id, &config, task_list.brand_style.as_ref())
        .await
    {
        Ok(video) => {
            if let Some(w) = &video.warning {
                ctx.lock().await.warnings.push(w.clone());
            }
            let mut out = json!({ "video_url": video.url });
            if let Some(w) = video.warning {
                out["warning"] = Value::String(w);
            }
            out.to_string()
        }
        Err(e) => tool_error(e),
    }
}

fn coordinator_prompt(event_id: &str, task_list: &TaskList) -> String {
    let mut tasks = Vec::new();
    if let Some(c) = &task_list.captions {
        tasks.push(format!("- Generate {} captions in '{}' style (GenerateCaptions)", c.n, c.style));
    }
    if let Some(i) = &task_list.image {
        let prompt: String = i.prompt.chars().take(100).collect();
        tasks.push(format!(
            "- Generate image: {} (size: {}, aspect_ratio: {}) (GenerateImage)",
            prompt,
            i.size,
            i.effective_aspect_ratio()
        ));
    }
    if let Some(v) = &task_list.video {
        let prompt: String = v.prompt.chars().take(100).collect();
        tasks.push(format!(
            "- Generate video: {} (duration: {}s) (GenerateVideo)",
            prompt, v.duration_sec
        ));
    }

    let brand = task_list
        .brand_style
        .as_ref()
        .map(|b| {
            format!(
                "\nBrand Style Guidelines:\n- Tone: {} ({})\n- Colors: {}\n- Tagline: {}\n\
                 Apply the brand style consistently across all assets.\n",
                b.tone.as_str(),
                b.tone.description(),
                b.color_summary(),
                b.tagline.as_deref().unwrap_or("N/A")
            )
        })
        .unwrap_or_default();

    format!(
        r#"Generate creative assets for this marketing campaign.

Goal: {goal}
Target Platforms: {platforms}
Event ID: {event_id}
{brand}
Tasks to complete:
{tasks}

Call every tool you need in a single turn so they run in parallel.
When all tools have returned, answer with ONLY this JSON object, using the
URLs the tools returned and omitting assets that were not requested:
{{
  "captions_url": "https://storage.googleapis.com/...",
  "image_url": "https://storage.googleapis.com/...",
  "video_url": "https://storage.googleapis.com/...",
  "warning": "<any warning a tool returned, otherwise omit>"
}}"#,
        goal = task_list.goal,
        platforms = task_list.target_platforms.joined(),
        event_id = event_id,
        brand = brand,
        tasks = tasks.join("\n"),
    )
}

#[agentic(model = "gemini:gemini-2.5-flash")]
pub async fn run_creative_coordinator(
    context: Arc<Mutex<CoordinatorContext>>,
    prompt: String,
    runtime: Runtime,
) -> reson_agentic::error::Result<()> {
    let ctx = context.clone();

    runtime
        .register_tool_with_schema(
            GenerateCaptions::tool_name(),
            GenerateCaptions::description(),
            GenerateCaptions::schema(),
            ToolFunction::Async(Box::new({
                let ctx = ctx.clone();
                move |args| {
                    let ctx = ctx.clone();
                    Box::pin(async move {
                        tracing::debug!(?args, "[orchestrator] GenerateCaptions called");
                        let call: GenerateCaptions = serde_json::from_value(args)?;
                        Ok(run_captions_tool(ctx, call).await)
                    })
                }
            })),
        )
        .await?;

    runtime
        .register_tool_with_schema(
            GenerateImage::tool_name(),
            GenerateImage::description(),
            GenerateImage::schema(),
            ToolFunction::Async(Box::new({
                let ctx = ctx.clone();
                move |args| {
                    let ctx = ctx.clone();
                    Box::pin(async move {
                        tracing::debug!(?args, "[orchestrator] GenerateImage called");
                        let call: GenerateImage = serde_json::from_value(args)?;
                        Ok(run_image_tool(ctx, call).await)
                    })
                }
            })),
        )
        .await?;

    runtime
        .register_tool_with_schema(
            GenerateVideo::tool_name(),
            GenerateVideo::description(),
            GenerateVideo::schema(),
            ToolFunction::Async(Box::new({
                let ctx = ctx.clone();
                move |args| {
                    let ctx = ctx.clone();
                    Box::pin(async move {
                        tracing::debug!(?args, "[orchestrator] GenerateVideo called");
                        let call: GenerateVideo = serde_json::from_value(args)?;
                        Ok(run_video_tool(ctx, call).await)
                    })
                }
            })),
        )
        .await?;

    let message = MultimodalMessage {
        role: ChatRole::User,
        parts: vec![MediaPart::Text { text: prompt }],
        cache_marker: None,
    };
    let mut history = vec![ConversationMessage::Multimodal(message)];

    for turn in 0..MAX_TURNS {
        let response = runtime
            .run(
                None,
                Some("You are a creative director coordinating caption, image and video production. Use the tools to produce every requested asset."),
                Some(history.clone()),
                None,
                None,
                None,
                None,
                None,
                None,
                None,
            )
            .await?;

        let response_is_tool_array = response
            .as_array()
            .map(|arr| !arr.is_empty() && arr.iter().all(|value| runtime.is_tool_call(value)))
            .unwrap_or(false);

        let mut tool_call_values: Vec<Value> = Vec::new();
        if runtime.is_tool_call(&response) {
            tool_call_values.push(response.clone());
        } else if response_is_tool_array {
            if let Some(arr) = response.as_array() {
                tool_call_values.extend(arr.iter().cloned());
            }
        }

        if tool_call_values.is_empty() {
            let text = response
                .as_str()
                .map(|s| s.to_string())
                .unwrap_or_else(|| serde_json::to_string(&response).unwrap_or_default());
            tracing::info!(turn = turn + 1, "[orchestrator] Coordinator answered");
            ctx.lock().await.final_text = Some(text);
            break;
        }

        let mut calls = Vec::new();
        for call_value in &tool_call_values {
            match ToolCall::create(call_value.clone()) {
                Ok(CreateResult::Single(tool_call)) => calls.push((tool_call, call_value)),
                Ok(CreateResult::Multiple(_)) => {
                    tracing::warn!("[orchestrator] Unexpected nested tool call payload");
                }
                Ok(CreateResult::Empty) => {}
                Err(err) => {
                    tracing::warn!(error = %err, "[orchestrator] Failed to parse tool call");
                }
            }
        }

        // Asset kinds are independent; run this turn's tools together.
        let results = futures::future::join_all(
            calls
                .iter()
                .map(|(_, value)| runtime.execute_tool(value)),
        )
        .await;

        for ((tool_call, _), result) in calls.into_iter().zip(results) {
            history.push(ConversationMessage::ToolCall(tool_call.clone()));
            let tool_result = match result {
                Ok(content) => ToolResult::success_with_name(
                    tool_call.tool_use_id.clone(),
                    tool_call.tool_name.clone(),
                    content,
                )
                .with_tool_obj(tool_call.args.clone()),
                Err(err) => ToolResult::error(
                    tool_call.tool_use_id.clone(),
                    format!("Tool execution failed: {}", err),
                )
                .with_tool_name(tool_call.tool_name.clone())
                .with_tool_obj(tool_call.args.clone()),
            };
            history.push(ConversationMessage::ToolResult(tool_result));
        }

        if turn + 1 == MAX_TURNS {
            tracing::warn!("[orchestrator] Turn limit reached without a final answer");
        }
    }

    Ok(())
}

/// Coordinator backed by a Gemini model through reson-agentic.
pub struct ResonOrchestrator {
    pipeline: AssetPipeline,
    timeout: Duration,
}

impl ResonOrchestrator {
    pub fn new(pipeline: AssetPipeline, timeout: Duration) -> Self {
        Self { pipeline, timeout }
    }
}

#[async_trait]
impl Orchestrator for ResonOrchestrator {
    async fn orchestrate(
        &self,
        event_id: &str,
        task_list: &TaskList,
    ) -> Result<OrchestratorReply, OrchestrationError> {
        let context = Arc::new(Mutex::new(CoordinatorContext {
            event_id: event_id.to_string(),
            task_list: task_list.clone(),
            pipeline: self.pipeline.clone(),
            warnings: Vec::new(),
            final_text: None,
        }));
        let prompt = coordinator_prompt(event_id, task_list);

        tokio::time::timeout(self.timeout, run_creative_coordinator(context.clone(), prompt))
            .await
            .map_err(|_| OrchestrationError::TimedOut(self.timeout))?
            .map_err(|e| OrchestrationError::Agent(e.to_string()))?;

        let mut guard = context.lock().await;
        let text = guard.final_text.take().ok_or(OrchestrationError::NoAnswer)?;
        Ok(OrchestratorReply {
            text,
            warnings: std::mem::take(&mut guard.warnings),
        })
    }
}

/// Offline coordinator: runs the pipeline directly and answers the way a
/// chatty model would, with the JSON wrapped in a fenced block.
pub struct MockOrchestrator {
    pipeline: AssetPipeline,
}

impl MockOrchestrator {
    pub fn new(pipeline: AssetPipeline) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl Orchestrator for MockOrchestrator {
    async fn orchestrate(
        &self,
        event_id: &str,
        task_list: &TaskList,
    ) -> Result<OrchestratorReply, OrchestrationError> {
        let output = self.pipeline.generate_all(event_id, task_list).await;
        let mut body = serde_json::to_value(&output.assets)
            .map_err(|e| OrchestrationError::Agent(e.to_string()))?;
        if let Some(w) = output.warnings.first() {
            body["warning"] = Value::String(w.clone());
        }
        Ok(OrchestratorReply {
            text: format!("All assets are ready.\n```json\n{:#}\n```", body),
            warnings: output.warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::tests::{full_task_list, pipeline_with};
    use crate::services::video::MockVideoGenerator;
    use crate::storage::MemoryStorage;

    const BUCKET: &str = "promote-autonomy-assets";

    fn url(path: &str) -> String {
        format!("https://storage.googleapis.com/{}/{}", BUCKET, path)
    }

    #[test]
    fn test_url_allow_list() {
        assert!(is_trusted_asset_url(&url("evt/image.png"), BUCKET));
        assert!(!is_trusted_asset_url("http://storage.googleapis.com/promote-autonomy-assets/x", BUCKET));
        assert!(!is_trusted_asset_url("https://evil.example.com/promote-autonomy-assets/x", BUCKET));
        assert!(!is_trusted_asset_url("https://storage.googleapis.com/other-bucket/x", BUCKET));
        assert!(!is_trusted_asset_url("https://storage.googleapis.com/promote-autonomy-assets-evil/x", BUCKET));
        assert!(!is_trusted_asset_url("not a url", BUCKET));
    }

    #[test]
    fn test_parse_json_with_surrounding_text() {
        let text = format!(
            "Here you go!\n{{\"captions_url\": \"{}\", \"image_url\": \"{}\", \"nested\": {{\"a\": 1}}}}\nDone.",
            url("evt/captions.json"),
            url("evt/image.png")
        );
        let result = parse_orchestration_response(&text, BUCKET);
        assert_eq!(result.strategy, ParseStrategy::BalancedJson);
        assert_eq!(result.assets.captions_url, Some(url("evt/captions.json")));
        assert_eq!(result.assets.image_url, Some(url("evt/image.png")));
        assert!(result.assets.video_url.is_none());
    }

    #[test]
    fn test_parse_discards_untrusted_urls() {
        let text = format!(
            "{{\"captions_url\": \"{}\", \"image_url\": \"https://evil.example.com/x.png\"}}",
            url("evt/captions.json")
        );
        let result = parse_orchestration_response(&text, BUCKET);
        assert_eq!(result.assets.kinds(), vec!["captions"]);
    }

    #[test]
    fn test_parse_fenced_block_after_broken_braces() {
        let text = format!(
            "Plan {{ step one\n```json\n{{\"video_url\": \"{}\"}}\n```",
            url("evt/video.mp4")
        );
        let result = parse_orchestration_response(&text, BUCKET);
        assert_eq!(result.strategy, ParseStrategy::FencedJson);
        assert_eq!(result.assets.video_url, Some(url("evt/video.mp4")));
    }

    #[test]
    fn test_parse_keyed_regex_fallback() {
        let text = format!(
            "captions_url: {}\nImage_URL = '{}',\nvideo_url: https://evil.example.com/v.mp4",
            url("evt/captions.json"),
            url("evt/image.jpg")
        );
        let result = parse_orchestration_response(&text, BUCKET);
        assert_eq!(result.strategy, ParseStrategy::KeyedRegex);
        assert_eq!(result.assets.captions_url, Some(url("evt/captions.json")));
        assert_eq!(result.assets.image_url, Some(url("evt/image.jpg")));
        assert!(result.assets.video_url.is_none());
    }

    #[test]
    fn test_parse_extracts_warning() {
        let text = format!(
            "{{\"video_url\": \"{}\", \"warning\": \"Generated video size (6.00 MB) exceeds platform limit\"}}",
            url("evt/video.mp4")
        );
        let result = parse_orchestration_response(&text, BUCKET);
        assert_eq!(
            result.warning.as_deref(),
            Some("Generated video size (6.00 MB) exceeds platform limit")
        );
    }

    #[test]
    fn test_parse_nothing_usable() {
        let result = parse_orchestration_response("I could not complete the task.", BUCKET);
        assert!(result.assets.is_empty());
        assert!(result.warning.is_none());
    }

    #[test]
    fn test_coordinator_prompt_lists_requested_tasks() {
        let prompt = coordinator_prompt("evt-1", &full_task_list(None));
        assert!(prompt.contains("Event ID: evt-1"));
        assert!(prompt.contains("GenerateCaptions"));
        assert!(prompt.contains("GenerateImage"));
        assert!(prompt.contains("(duration: 8s)"));
    }

    #[tokio::test]
    async fn test_mock_orchestrator_reply_parses() {
        let storage = Arc::new(MemoryStorage::new(BUCKET));
        let orchestrator = MockOrchestrator::new(pipeline_with(Arc::new(MockVideoGenerator), storage));

        let reply = orchestrator
            .orchestrate("evt-1", &full_task_list(None))
            .await
            .unwrap();
        let result = parse_orchestration_response(&reply.text, BUCKET);
        assert_eq!(result.strategy, ParseStrategy::BalancedJson);
        assert_eq!(result.assets.kinds(), vec!["captions", "image", "video"]);
    }
}
