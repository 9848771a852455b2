//! Caption copy generation.

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

use super::gemini::GeminiClient;
use super::provider::{ProviderError, with_timeout};
use crate::domain::{BrandStyle, CaptionConfig};

#[async_trait]
pub trait CopyGenerator: Send + Sync {
    async fn generate_captions(
        &self,
        config: &CaptionConfig,
        goal: &str,
        brand_style: Option<&BrandStyle>,
    ) -> Result<Vec<String>, ProviderError>;
}

#[derive(Default)]
pub struct MockCopyGenerator;

#[async_trait]
impl CopyGenerator for MockCopyGenerator {
    async fn generate_captions(
        &self,
        config: &CaptionConfig,
        goal: &str,
        _brand_style: Option<&BrandStyle>,
    ) -> Result<Vec<String>, ProviderError> {
        let lead: Vec<&str> = goal.split_whitespace().take(3).collect();
        let lead = lead.join(" ");
        let captions = (1..=config.n)
            .map(|i| match config.style.to_lowercase().as_str() {
                "professional" => format!("{} - Professional insight #{}", lead, i),
                "casual" => format!("{} - Casual vibe #{}", lead, i),
                "humorous" => format!("{} - Funny take #{}", lead, i),
                _ => format!("{} - Caption #{}", lead, i),
            })
            .collect();
        Ok(captions)
    }
}

pub struct GeminiCopyGenerator {
    client: GeminiClient,
    model: String,
    timeout: Duration,
}

impl GeminiCopyGenerator {
    pub fn new(client: GeminiClient, model: &str, timeout: Duration) -> Self {
        Self {
            client,
            model: model.to_string(),
            timeout,
        }
    }

    fn prompt(config: &CaptionConfig, goal: &str, brand_style: Option<&BrandStyle>) -> String {
        let mut prompt = format!(
            "Generate {n} social media captions for this marketing goal:\n\n\
             Goal: {goal}\n\
             Style: {style}\n",
            n = config.n,
            goal = goal,
            style = config.style,
        );
        if let Some(brand) = brand_style {
            prompt.push_str(&format!("Brand tone: {}\n", brand.tone.description()));
            if let Some(tagline) = &brand.tagline {
                prompt.push_str(&format!("Brand tagline: {}\n", tagline));
            }
        }
        prompt.push_str(&format!(
            "\nRequirements:\n\
             - Each caption should be engaging and on-brand\n\
             - Keep captions concise (under 280 characters)\n\
             - Include relevant emojis if appropriate for the style\n\
             - Vary the approach across captions\n\n\
             Return ONLY the captions, one per line, numbered 1-{}.",
            config.n
        ));
        prompt
    }
}

#[async_trait]
impl CopyGenerator for GeminiCopyGenerator {
    async fn generate_captions(
        &self,
        config: &CaptionConfig,
        goal: &str,
        brand_style: Option<&BrandStyle>,
    ) -> Result<Vec<String>, ProviderError> {
        let prompt = Self::prompt(config, goal, brand_style);
        let text = with_timeout(
            self.timeout,
            "caption generation",
            self.client
                .generate_content(&self.model, vec![json!({ "text": prompt })]),
        )
        .await?;

        let captions = parse_numbered_list(&text, config.n as usize);
        if captions.is_empty() {
            return Err(ProviderError::InvalidResponse("no captions in response".into()));
        }
        Ok(captions)
    }
}

/// Lines of a model-written list with their "1. ", "1) " or "- " markers
/// removed, capped at `limit`.
pub fn parse_numbered_list(text: &str, limit: usize) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let numbered = line.starts_with(|c: char| c.is_ascii_digit()) || line.starts_with('-');
            if numbered {
                for sep in [". ", ") ", "- "] {
                    if let Some((_, rest)) = line.split_once(sep) {
                        return rest.trim().to_string();
                    }
                }
            }
            line.to_string()
        })
        .filter(|line| !line.is_empty())
        .take(limit)
        .collect()
}
