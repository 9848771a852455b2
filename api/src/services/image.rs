//! Still image generation.

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader, Rgb, RgbImage};
use std::io::Cursor;
use std::time::Duration;

use super::gemini::GeminiClient;
use super::provider::{ProviderError, with_timeout};
use crate::domain::{BrandStyle, ImageConfig};

/// Cornflower blue.
const DEFAULT_FILL: (u8, u8, u8) = (100, 149, 237);
const JPEG_START_QUALITY: u8 = 95;
const JPEG_MIN_QUALITY: u8 = 10;
const JPEG_QUALITY_STEP: u8 = 10;

/// Encoded image ready for storage.
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub data: Vec<u8>,
    pub content_type: &'static str,
}

impl GeneratedImage {
    fn png(data: Vec<u8>) -> Self {
        Self {
            data,
            content_type: "image/png",
        }
    }

    fn jpeg(data: Vec<u8>) -> Self {
        Self {
            data,
            content_type: "image/jpeg",
        }
    }

    pub fn filename(&self) -> &'static str {
        match self.content_type {
            "image/jpeg" => "image.jpg",
            _ => "image.png",
        }
    }
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate_image(
        &self,
        config: &ImageConfig,
        brand_style: Option<&BrandStyle>,
    ) -> Result<GeneratedImage, ProviderError>;
}

/// Solid fill in the brand's primary colour at the requested size.
#[derive(Default)]
pub struct MockImageGenerator;

#[async_trait]
impl ImageGenerator for MockImageGenerator {
    async fn generate_image(
        &self,
        config: &ImageConfig,
        brand_style: Option<&BrandStyle>,
    ) -> Result<GeneratedImage, ProviderError> {
        let (width, height) = config.dimensions();
        let (r, g, b) = brand_style
            .and_then(|b| b.primary_color())
            .map(|c| c.rgb())
            .unwrap_or(DEFAULT_FILL);

        let data = tokio::task::spawn_blocking(move || {
            let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([r, g, b])));
            encode_png(&img)
        })
        .await
        .map_err(|e| ProviderError::Other(format!("image task failed: {}", e)))??;

        Ok(GeneratedImage::png(data))
    }
}

pub struct ImagenGenerator {
    client: GeminiClient,
    model: String,
    timeout: Duration,
}

impl ImagenGenerator {
    pub fn new(client: GeminiClient, model: &str, timeout: Duration) -> Self {
        Self {
            client,
            model: model.to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl ImageGenerator for ImagenGenerator {
    async fn generate_image(
        &self,
        config: &ImageConfig,
        brand_style: Option<&BrandStyle>,
    ) -> Result<GeneratedImage, ProviderError> {
        let prompt = branded_prompt(&config.prompt, brand_style);
        let aspect_ratio = config.effective_aspect_ratio();
        let raw = with_timeout(
            self.timeout,
            "image generation",
            self.client.predict_image(&self.model, &prompt, &aspect_ratio),
        )
        .await?;

        let (width, height) = config.dimensions();
        let max_file_size_mb = config.max_file_size_mb;
        tokio::task::spawn_blocking(move || -> Result<GeneratedImage, ProviderError> {
            let mut img = ImageReader::new(Cursor::new(raw))
                .with_guessed_format()
                .map_err(|e| ProviderError::InvalidResponse(format!("unreadable image: {}", e)))?
                .decode()?;
            if (img.width(), img.height()) != (width, height) {
                img = img.resize_exact(width, height, FilterType::Lanczos3);
            }
            match max_file_size_mb {
                Some(limit) => Ok(GeneratedImage::jpeg(compress_to_limit(&img, limit)?)),
                None => Ok(GeneratedImage::png(encode_png(&img)?)),
            }
        })
        .await
        .map_err(|e| ProviderError::Other(format!("image task failed: {}", e)))?
    }
}

/// Prompt with the primary colour stated first and up to two more after it.
pub fn branded_prompt(prompt: &str, brand_style: Option<&BrandStyle>) -> String {
    let Some(brand) = brand_style else {
        return prompt.to_string();
    };
    let Some(primary) = brand.primary_color() else {
        return prompt.to_string();
    };
    let mut colors = format!("Primary color: {} (#{})", primary.name, primary.hex_code);
    let others: Vec<String> = brand
        .colors
        .iter()
        .take(3)
        .filter(|c| *c != primary)
        .map(|c| format!("{} (#{})", c.name, c.hex_code))
        .collect();
    if !others.is_empty() {
        colors.push_str(&format!(". Additional colors: {}", others.join(", ")));
    }
    format!("{}. {}.", prompt, colors)
}

fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, ProviderError> {
    let mut output = Cursor::new(Vec::new());
    img.write_to(&mut output, image::ImageFormat::Png)?;
    Ok(output.into_inner())
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, ProviderError> {
    let mut output = Vec::new();
    JpegEncoder::new_with_quality(&mut output, quality).encode_image(img)?;
    Ok(output)
}

/// JPEG at the highest quality (95, 85, ...) that fits under `max_mb`, or
/// the minimum quality if none does.
pub fn compress_to_limit(img: &DynamicImage, max_mb: f64) -> Result<Vec<u8>, ProviderError> {
    let max_bytes = (max_mb * 1024.0 * 1024.0) as usize;
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());

    let mut quality = JPEG_START_QUALITY;
    while quality > JPEG_MIN_QUALITY {
        let data = encode_jpeg(&rgb, quality)?;
        if data.len() <= max_bytes {
            return Ok(data);
        }
        quality -= JPEG_QUALITY_STEP;
    }
    encode_jpeg(&rgb, JPEG_MIN_QUALITY)
}
