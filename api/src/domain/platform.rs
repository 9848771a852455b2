//! Publishing platforms and their fixed asset constraints.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ValidationError;

/// A publishing destination with fixed size, ratio and length limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    InstagramFeed,
    InstagramStory,
    Twitter,
    Facebook,
    Linkedin,
    Youtube,
}

/// Publishing limits for one platform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlatformSpec {
    pub image_size: &'static str,
    pub image_aspect_ratio: &'static str,
    pub max_image_size_mb: f64,
    pub video_size: &'static str,
    pub video_aspect_ratio: &'static str,
    pub max_video_length_sec: u32,
    pub max_video_size_mb: f64,
    pub caption_max_length: usize,
}

impl Platform {
    pub const ALL: [Platform; 6] = [
        Platform::InstagramFeed,
        Platform::InstagramStory,
        Platform::Twitter,
        Platform::Facebook,
        Platform::Linkedin,
        Platform::Youtube,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::InstagramFeed => "instagram_feed",
            Platform::InstagramStory => "instagram_story",
            Platform::Twitter => "twitter",
            Platform::Facebook => "facebook",
            Platform::Linkedin => "linkedin",
            Platform::Youtube => "youtube",
        }
    }

    pub const fn spec(&self) -> PlatformSpec {
        match self {
            Platform::InstagramFeed => PlatformSpec {
                image_size: "1080x1080",
                image_aspect_ratio: "1:1",
                max_image_size_mb: 4.0,
                video_size: "1080x1080",
                video_aspect_ratio: "1:1",
                max_video_length_sec: 60,
                max_video_size_mb: 4.0,
                caption_max_length: 2200,
            },
            Platform::InstagramStory => PlatformSpec {
                image_size: "1080x1920",
                image_aspect_ratio: "9:16",
                max_image_size_mb: 4.0,
                video_size: "1080x1920",
                video_aspect_ratio: "9:16",
                max_video_length_sec: 15,
                max_video_size_mb: 4.0,
                caption_max_length: 2200,
            },
            Platform::Twitter => PlatformSpec {
                image_size: "1200x675",
                image_aspect_ratio: "16:9",
                max_image_size_mb: 5.0,
                video_size: "1280x720",
                video_aspect_ratio: "16:9",
                max_video_length_sec: 140,
                max_video_size_mb: 512.0,
                caption_max_length: 280,
            },
            Platform::Facebook => PlatformSpec {
                image_size: "1200x630",
                image_aspect_ratio: "1.91:1",
                max_image_size_mb: 8.0,
                video_size: "1280x720",
                video_aspect_ratio: "16:9",
                max_video_length_sec: 240,
                max_video_size_mb: 4096.0,
                caption_max_length: 63206,
            },
            Platform::Linkedin => PlatformSpec {
                image_size: "1200x627",
                image_aspect_ratio: "1.91:1",
                max_image_size_mb: 5.0,
                video_size: "1280x720",
                video_aspect_ratio: "16:9",
                max_video_length_sec: 600,
                max_video_size_mb: 5120.0,
                caption_max_length: 3000,
            },
            Platform::Youtube => PlatformSpec {
                image_size: "1280x720",
                image_aspect_ratio: "16:9",
                max_image_size_mb: 2.0,
                video_size: "1920x1080",
                video_aspect_ratio: "16:9",
                max_video_length_sec: 60,
                max_video_size_mb: 256.0,
                caption_max_length: 5000,
            },
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Platform::ALL
            .into_iter()
            .find(|p| p.as_str() == s.trim())
            .ok_or_else(|| ValidationError::new(format!("Unknown platform: {}", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatioCategory {
    Portrait,
    Square,
    Landscape,
}

impl RatioCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            RatioCategory::Portrait => "portrait",
            RatioCategory::Square => "square",
            RatioCategory::Landscape => "landscape",
        }
    }
}

/// Parse a "W:H" ratio string into width / height.
pub fn ratio_value(ratio: &str) -> Option<f64> {
    let (w, h) = ratio.split_once(':')?;
    let w: f64 = w.trim().parse().ok()?;
    let h: f64 = h.trim().parse().ok()?;
    if w <= 0.0 || h <= 0.0 {
        return None;
    }
    Some(w / h)
}

pub fn ratio_category(ratio: &str) -> Option<RatioCategory> {
    let value = ratio_value(ratio)?;
    Some(if value > 1.05 {
        RatioCategory::Landscape
    } else if value < 0.95 {
        RatioCategory::Portrait
    } else {
        RatioCategory::Square
    })
}

/// Non-empty, de-duplicated list of target platforms. Order is kept because
/// the first platform decides aspect ratio and size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Platform>", into = "Vec<Platform>")]
pub struct TargetPlatforms(Vec<Platform>);

impl TargetPlatforms {
    pub fn first(&self) -> Platform {
        // non-empty by construction
        self.0[0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Platform> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Platform] {
        &self.0
    }

    pub fn joined(&self) -> String {
        self.0
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl TryFrom<Vec<Platform>> for TargetPlatforms {
    type Error = ValidationError;

    fn try_from(platforms: Vec<Platform>) -> Result<Self, Self::Error> {
        let mut unique: Vec<Platform> = Vec::with_capacity(platforms.len());
        for p in platforms {
            if !unique.contains(&p) {
                unique.push(p);
            }
        }
        if unique.is_empty() {
            return Err(ValidationError::new(
                "target_platforms must contain at least one platform",
            ));
        }
        Ok(TargetPlatforms(unique))
    }
}

impl From<TargetPlatforms> for Vec<Platform> {
    fn from(platforms: TargetPlatforms) -> Self {
        platforms.0
    }
}

/// Most restrictive limits across a set of platforms. Ratios and sizes come
/// from the first platform.
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformConstraints {
    pub image_size: String,
    pub image_aspect_ratio: String,
    pub max_image_size_mb: f64,
    pub video_aspect_ratio: String,
    pub max_video_length_sec: u32,
    pub max_video_size_mb: f64,
    pub caption_max_length: usize,
    pub warnings: Vec<String>,
}

impl PlatformConstraints {
    pub fn intersect(platforms: &TargetPlatforms) -> Self {
        let first = platforms.first().spec();
        let mut constraints = PlatformConstraints {
            image_size: first.image_size.to_string(),
            image_aspect_ratio: first.image_aspect_ratio.to_string(),
            max_image_size_mb: first.max_image_size_mb,
            video_aspect_ratio: first.video_aspect_ratio.to_string(),
            max_video_length_sec: first.max_video_length_sec,
            max_video_size_mb: first.max_video_size_mb,
            caption_max_length: first.caption_max_length,
            warnings: Vec::new(),
        };

        for platform in platforms.iter().skip(1) {
            let spec = platform.spec();
            constraints.max_image_size_mb = constraints.max_image_size_mb.min(spec.max_image_size_mb);
            constraints.max_video_length_sec =
                constraints.max_video_length_sec.min(spec.max_video_length_sec);
            constraints.max_video_size_mb = constraints.max_video_size_mb.min(spec.max_video_size_mb);
            constraints.caption_max_length =
                constraints.caption_max_length.min(spec.caption_max_length);
        }

        if let Some(w) = ratio_conflict(platforms, "Image", |s| s.image_aspect_ratio) {
            constraints.warnings.push(w);
        }
        if let Some(w) = ratio_conflict(platforms, "Video", |s| s.video_aspect_ratio) {
            constraints.warnings.push(w);
        }

        constraints
    }
}

fn ratio_conflict(
    platforms: &TargetPlatforms,
    kind: &str,
    ratio_of: impl Fn(&PlatformSpec) -> &'static str,
) -> Option<String> {
    let first = platforms.first();
    let first_ratio = ratio_of(&first.spec());
    let first_category = ratio_category(first_ratio)?;

    let conflicting: Vec<String> = platforms
        .iter()
        .skip(1)
        .filter_map(|p| {
            let ratio = ratio_of(&p.spec());
            let category = ratio_category(ratio)?;
            (category != first_category)
                .then(|| format!("{} uses {} ({})", p, ratio, category.as_str()))
        })
        .collect();

    if conflicting.is_empty() {
        return None;
    }

    Some(format!(
        "{} aspect ratio conflict: {} uses {} ({}) but {}. Using {} from {}.",
        kind,
        first,
        first_ratio,
        first_category.as_str(),
        conflicting.join(", "),
        first_ratio,
        first
    ))
}
