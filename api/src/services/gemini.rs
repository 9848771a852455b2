//! Google generative API client (Gemini, Imagen, Veo) over REST, plus the
//! text and vision capabilities built on it.

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;

use super::provider::{ProviderError, check_response, with_timeout};
use crate::constants::GEMINI_API_BASE;

/// Prompt line the task generator uses to state the goal.
pub const GOAL_MARKER: &str = "Marketing Goal:";

#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Value>,
}

/// State of a long-running generation operation.
#[derive(Debug, Clone, Deserialize)]
pub struct Operation {
    pub name: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub response: Option<Value>,
}

impl Operation {
    /// URI of the first generated video, across the response shapes the
    /// API has used.
    pub fn video_uri(&self) -> Option<String> {
        let response = self.response.as_ref()?;
        let samples = response
            .pointer("/generateVideoResponse/generatedSamples")
            .or_else(|| response.get("generatedVideos"))
            .or_else(|| response.get("videos"))?;
        let first = samples.as_array()?.first()?;
        first
            .pointer("/video/uri")
            .or_else(|| first.get("gcsUri"))
            .or_else(|| first.get("uri"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }
}

impl GeminiClient {
    pub fn new(api_key: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.to_string(),
            base_url: GEMINI_API_BASE.to_string(),
        }
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, ProviderError> {
        let resp = self
            .http
            .post(format!("{}/{}", self.base_url, path))
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await?;
        Ok(check_response(resp).await?.json().await?)
    }

    /// Single-turn generateContent call. `parts` are Gemini content parts.
    pub async fn generate_content(&self, model: &str, parts: Vec<Value>) -> Result<String, ProviderError> {
        let body = json!({ "contents": [{ "role": "user", "parts": parts }] });
        let value = self
            .post(&format!("models/{}:generateContent", model), &body)
            .await?;
        let parsed: GenerateContentResponse = serde_json::from_value(value)
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| {
                c.parts
                    .iter()
                    .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(ProviderError::InvalidResponse("empty model response".into()));
        }
        Ok(text)
    }

    /// Imagen predict call returning raw image bytes.
    pub async fn predict_image(
        &self,
        model: &str,
        prompt: &str,
        aspect_ratio: &str,
    ) -> Result<Vec<u8>, ProviderError> {
        let body = json!({
            "instances": [{ "prompt": prompt }],
            "parameters": { "sampleCount": 1, "aspectRatio": aspect_ratio }
        });
        let value = self.post(&format!("models/{}:predict", model), &body).await?;
        let encoded = value
            .pointer("/predictions/0/bytesBase64Encoded")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ProviderError::InvalidResponse("no image in prediction".into()))?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| ProviderError::InvalidResponse(format!("bad image encoding: {}", e)))
    }

    /// Start a Veo generation. Returns the operation name to poll.
    pub async fn start_video(
        &self,
        model: &str,
        prompt: &str,
        aspect_ratio: &str,
        duration_secs: u32,
    ) -> Result<String, ProviderError> {
        let body = json!({
            "instances": [{ "prompt": prompt }],
            "parameters": { "aspectRatio": aspect_ratio, "durationSeconds": duration_secs }
        });
        let value = self
            .post(&format!("models/{}:predictLongRunning", model), &body)
            .await?;
        value
            .get("name")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| ProviderError::InvalidResponse("no operation name".into()))
    }

    pub async fn get_operation(&self, name: &str) -> Result<Operation, ProviderError> {
        let resp = self
            .http
            .get(format!("{}/{}", self.base_url, name))
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await?;
        Ok(check_response(resp).await?.json().await?)
    }

    /// Download a file the API produced (needs the API key).
    pub async fn download(&self, uri: &str) -> Result<Vec<u8>, ProviderError> {
        let resp = self
            .http
            .get(uri)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await?;
        Ok(check_response(resp).await?.bytes().await?.to_vec())
    }
}

// ============================================================================
// Text generation
// ============================================================================

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate_text(&self, prompt: &str, timeout: Duration) -> Result<String, ProviderError>;
}

pub struct GeminiText {
    client: GeminiClient,
    model: String,
}

impl GeminiText {
    pub fn new(client: GeminiClient, model: &str) -> Self {
        Self {
            client,
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl TextGenerator for GeminiText {
    async fn generate_text(&self, prompt: &str, timeout: Duration) -> Result<String, ProviderError> {
        with_timeout(
            timeout,
            "text generation",
            self.client
                .generate_content(&self.model, vec![json!({ "text": prompt })]),
        )
        .await
    }
}

/// Offline proposal generator. Reads the goal line from the prompt and
/// answers with a keyword-driven JSON task proposal.
#[derive(Default)]
pub struct MockTextGenerator;

impl MockTextGenerator {
    pub fn proposal_for(goal: &str) -> Value {
        let lower = goal.to_lowercase();
        let has_social = ["twitter", "social", "post", "tweet"]
            .iter()
            .any(|w| lower.contains(w));
        let has_image = ["visual", "image", "graphic", "picture", "photo"]
            .iter()
            .any(|w| lower.contains(w));
        let has_video = ["video", "demo", "tutorial", "campaign"]
            .iter()
            .any(|w| lower.contains(w));
        let short_goal: String = goal.chars().take(50).collect();

        let mut proposal = json!({
            "captions": {
                "n": if has_social { 5 } else { 3 },
                "style": if has_social { "twitter" } else { "engaging" }
            },
            "image": null,
            "video": null
        });
        if has_image || goal.chars().count() > 30 {
            proposal["image"] = json!({ "prompt": format!("Modern promotional visual for: {}", short_goal) });
        }
        if has_video {
            proposal["video"] = json!({ "prompt": format!("Promotional video for: {}", short_goal) });
        }
        proposal
    }
}

#[async_trait]
impl TextGenerator for MockTextGenerator {
    async fn generate_text(&self, prompt: &str, _timeout: Duration) -> Result<String, ProviderError> {
        let goal = prompt
            .lines()
            .find_map(|line| line.trim().strip_prefix(GOAL_MARKER))
            .map(|g| g.trim())
            .unwrap_or(prompt);
        let proposal = Self::proposal_for(goal);
        Ok(format!("```json\n{}\n```", proposal))
    }
}

// ============================================================================
// Vision analysis
// ============================================================================

#[async_trait]
pub trait VisionAnalyzer: Send + Sync {
    /// Describe the product shown at `image_url` for a marketing `context`.
    async fn analyze_image(&self, image_url: &str, context: &str) -> Result<String, ProviderError>;
}

pub struct GeminiVision {
    client: GeminiClient,
    model: String,
    timeout: Duration,
}

impl GeminiVision {
    pub fn new(client: GeminiClient, model: &str, timeout: Duration) -> Self {
        Self {
            client,
            model: model.to_string(),
            timeout,
        }
    }

    async fn analyze(&self, image_url: &str, context: &str) -> Result<String, ProviderError> {
        let resp = self.client.http().get(image_url).send().await?;
        let resp = check_response(resp).await?;
        let mime = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/jpeg")
            .to_string();
        let bytes = resp.bytes().await?;
        let data = base64::engine::general_purpose::STANDARD.encode(&bytes);

        let prompt = format!(
            "Analyze this product image for a marketing campaign.\n\
             Campaign goal: {}\n\n\
             Describe: product type, brand elements, dominant colors, composition, \
             mood, key features and visual style. Be concise and concrete.",
            context
        );
        self.client
            .generate_content(
                &self.model,
                vec![
                    json!({ "inline_data": { "mime_type": mime, "data": data } }),
                    json!({ "text": prompt }),
                ],
            )
            .await
    }
}

#[async_trait]
impl VisionAnalyzer for GeminiVision {
    async fn analyze_image(&self, image_url: &str, context: &str) -> Result<String, ProviderError> {
        with_timeout(self.timeout, "image analysis", self.analyze(image_url, context)).await
    }
}

#[derive(Default)]
pub struct MockVision;

#[async_trait]
impl VisionAnalyzer for MockVision {
    async fn analyze_image(&self, _image_url: &str, context: &str) -> Result<String, ProviderError> {
        let lower = context.to_lowercase();
        let product = if ["shoe", "sneaker", "footwear"].iter().any(|w| lower.contains(w)) {
            "Shoes"
        } else if ["laptop", "computer", "tech"].iter().any(|w| lower.contains(w)) {
            "Laptop"
        } else if ["bottle", "water", "drink"].iter().any(|w| lower.contains(w)) {
            "Water Bottle"
        } else if ["coffee", "beans", "beverage"].iter().any(|w| lower.contains(w)) {
            "Coffee"
        } else {
            "Product"
        };
        Ok(format!(
            "Product Type: {}\n\
             Brand Elements: clean composition, modern aesthetic\n\
             Colors: vibrant palette suited to social media\n\
             Mood: contemporary and appealing\n\
             Visual Style: professional product photography",
            product
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_video_uri_shapes() {
        let op: Operation = serde_json::from_value(json!({
            "name": "models/veo/operations/1",
            "done": true,
            "response": {"generateVideoResponse": {"generatedSamples": [
                {"video": {"uri": "https://example.com/v.mp4"}}
            ]}}
        }))
        .unwrap();
        assert_eq!(op.video_uri().as_deref(), Some("https://example.com/v.mp4"));

        let vertex: Operation = serde_json::from_value(json!({
            "name": "op",
            "done": true,
            "response": {"videos": [{"gcsUri": "gs://bucket/out/v.mp4"}]}
        }))
        .unwrap();
        assert_eq!(vertex.video_uri().as_deref(), Some("gs://bucket/out/v.mp4"));

        let pending: Operation = serde_json::from_value(json!({"name": "op"})).unwrap();
        assert!(!pending.done);
        assert!(pending.video_uri().is_none());
    }

    #[test]
    fn test_mock_proposal_keywords() {
        let social = MockTextGenerator::proposal_for("Post on social about us");
        assert_eq!(social["captions"]["n"], 5);
        assert_eq!(social["captions"]["style"], "twitter");
        assert!(social["video"].is_null());

        let video = MockTextGenerator::proposal_for("Product demo video for the launch of our new app");
        assert!(video["video"]["prompt"].as_str().unwrap().starts_with("Promotional video"));
        assert!(video["image"].is_object());
    }

    #[tokio::test]
    async fn test_mock_text_reads_goal_line() {
        let prompt = format!("Intro text with video words\n{} Grow our newsletter\nRules", GOAL_MARKER);
        let text = MockTextGenerator
            .generate_text(&prompt, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(text.starts_with("```json"));
        assert!(!text.contains("Promotional video"));
    }

    #[tokio::test]
    async fn test_mock_vision_detects_product() {
        let analysis = MockVision
            .analyze_image("https://x/y.png", "Sell reusable water bottles")
            .await
            .unwrap();
        assert!(analysis.contains("Water Bottle"));
    }
}
