//! Brand style guidelines attached to a task list.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use super::ValidationError;

pub const MAX_BRAND_COLORS: usize = 5;
pub const MAX_TAGLINE_CHARS: usize = 100;

static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid tag pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorUsage {
    Primary,
    Accent,
    Background,
    #[default]
    General,
}

impl ColorUsage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColorUsage::Primary => "primary",
            ColorUsage::Accent => "accent",
            ColorUsage::Background => "background",
            ColorUsage::General => "general",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrandTone {
    #[default]
    Professional,
    Casual,
    Playful,
    Luxury,
    Technical,
}

impl BrandTone {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrandTone::Professional => "professional",
            BrandTone::Casual => "casual",
            BrandTone::Playful => "playful",
            BrandTone::Luxury => "luxury",
            BrandTone::Technical => "technical",
        }
    }

    /// Prompt guidance for the tone.
    pub fn description(&self) -> &'static str {
        match self {
            BrandTone::Professional => "corporate, formal language; avoid emojis",
            BrandTone::Casual => "friendly, conversational tone; emojis are okay",
            BrandTone::Playful => "fun and energetic; use emojis liberally",
            BrandTone::Luxury => "sophisticated, elegant language; minimal emojis",
            BrandTone::Technical => "precise and detailed; use industry terminology",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BrandColorInput")]
pub struct BrandColor {
    /// Six hex digits, no leading '#', upper-cased.
    pub hex_code: String,
    pub name: String,
    pub usage: ColorUsage,
}

#[derive(Deserialize)]
struct BrandColorInput {
    hex_code: String,
    name: String,
    #[serde(default)]
    usage: ColorUsage,
}

impl BrandColor {
    pub fn new(
        hex_code: &str,
        name: impl Into<String>,
        usage: ColorUsage,
    ) -> Result<Self, ValidationError> {
        let hex = hex_code.trim();
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ValidationError::new(format!(
                "Invalid hex color '{}': expected 6 hex digits without '#'",
                hex_code
            )));
        }
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ValidationError::new("Color name cannot be empty"));
        }
        Ok(BrandColor {
            hex_code: hex.to_ascii_uppercase(),
            name,
            usage,
        })
    }

    pub fn rgb(&self) -> (u8, u8, u8) {
        parse_hex(&self.hex_code).unwrap_or((0, 0, 0))
    }

    /// "Name (natural colour)" as used in generation prompts.
    pub fn describe(&self) -> String {
        format!("{} ({})", self.name, hex_to_color_name(&self.hex_code))
    }
}

impl TryFrom<BrandColorInput> for BrandColor {
    type Error = ValidationError;

    fn try_from(input: BrandColorInput) -> Result<Self, Self::Error> {
        BrandColor::new(&input.hex_code, input.name, input.usage)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BrandStyleInput")]
pub struct BrandStyle {
    pub colors: Vec<BrandColor>,
    pub tone: BrandTone,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tagline: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
}

#[derive(Deserialize)]
struct BrandStyleInput {
    colors: Vec<BrandColor>,
    #[serde(default)]
    tone: BrandTone,
    #[serde(default)]
    tagline: Option<String>,
    #[serde(default)]
    logo_url: Option<String>,
}

impl BrandStyle {
    pub fn new(
        colors: Vec<BrandColor>,
        tone: BrandTone,
        tagline: Option<String>,
        logo_url: Option<String>,
    ) -> Result<Self, ValidationError> {
        if colors.is_empty() || colors.len() > MAX_BRAND_COLORS {
            return Err(ValidationError::new(format!(
                "Brand style must have between 1 and {} colors",
                MAX_BRAND_COLORS
            )));
        }
        let primaries = colors
            .iter()
            .filter(|c| c.usage == ColorUsage::Primary)
            .count();
        if primaries > 1 {
            return Err(ValidationError::new(
                "Only one color can be marked as primary",
            ));
        }

        let tagline = tagline
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        if let Some(t) = &tagline {
            if t.chars().count() > MAX_TAGLINE_CHARS {
                return Err(ValidationError::new(format!(
                    "Tagline cannot exceed {} characters",
                    MAX_TAGLINE_CHARS
                )));
            }
            if HTML_TAG.is_match(t) {
                return Err(ValidationError::new("Tagline cannot contain HTML tags"));
            }
        }

        Ok(BrandStyle {
            colors,
            tone,
            tagline,
            logo_url: logo_url.filter(|u| !u.trim().is_empty()),
        })
    }

    /// The primary colour, or the first one when none is marked primary.
    pub fn primary_color(&self) -> Option<&BrandColor> {
        self.colors
            .iter()
            .find(|c| c.usage == ColorUsage::Primary)
            .or_else(|| self.colors.first())
    }

    pub fn color_summary(&self) -> String {
        self.colors
            .iter()
            .map(|c| format!("{} #{} ({})", c.name, c.hex_code, c.usage.as_str()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl TryFrom<BrandStyleInput> for BrandStyle {
    type Error = ValidationError;

    fn try_from(input: BrandStyleInput) -> Result<Self, Self::Error> {
        BrandStyle::new(input.colors, input.tone, input.tagline, input.logo_url)
    }
}

fn parse_hex(hex: &str) -> Option<(u8, u8, u8)> {
    let hex = hex.trim().trim_start_matches('#');
    if hex.len() != 6 {
        return None;
    }
    let r = u8::from_str_radix(hex.get(0..2)?, 16).ok()?;
    let g = u8::from_str_radix(hex.get(2..4)?, 16).ok()?;
    let b = u8::from_str_radix(hex.get(4..6)?, 16).ok()?;
    Some((r, g, b))
}

/// Map a hex colour to a plain colour word generation models understand.
pub fn hex_to_color_name(hex: &str) -> &'static str {
    let Some((r, g, b)) = parse_hex(hex) else {
        return "gray";
    };
    let (r, g, b) = (r as f64, g as f64, b as f64);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    if max < 40.0 {
        return "black";
    }
    if delta / max < 0.15 {
        return if max > 215.0 { "white" } else { "gray" };
    }

    let hue = if max == r {
        60.0 * (((g - b) / delta) % 6.0)
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    let hue = if hue < 0.0 { hue + 360.0 } else { hue };

    match hue {
        h if h < 15.0 => "red",
        h if h < 45.0 => "orange",
        h if h < 70.0 => "yellow",
        h if h < 165.0 => "green",
        h if h < 195.0 => "cyan",
        h if h < 255.0 => "blue",
        h if h < 285.0 => "purple",
        h if h < 345.0 => "pink",
        _ => "red",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn color(hex: &str, usage: ColorUsage) -> BrandColor {
        BrandColor::new(hex, "Brand", usage).unwrap()
    }

    #[test]
    fn test_hex_validation() {
        assert!(BrandColor::new("FF5733", "Orange", ColorUsage::Primary).is_ok());
        assert!(BrandColor::new("#FF5733", "Orange", ColorUsage::Primary).is_err());
        assert!(BrandColor::new("GGGGGG", "Bad", ColorUsage::General).is_err());
        assert!(BrandColor::new("FFF", "Short", ColorUsage::General).is_err());
        assert_eq!(color("ff5733", ColorUsage::General).hex_code, "FF5733");
    }

    #[test]
    fn test_color_count_limits() {
        assert!(BrandStyle::new(vec![], BrandTone::default(), None, None).is_err());
        let six = (0..6).map(|_| color("000000", ColorUsage::General)).collect();
        assert!(BrandStyle::new(six, BrandTone::default(), None, None).is_err());
    }

    #[test]
    fn test_single_primary() {
        let err = BrandStyle::new(
            vec![color("FF0000", ColorUsage::Primary), color("00FF00", ColorUsage::Primary)],
            BrandTone::Casual,
            None,
            None,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Only one color can be marked as primary"));
    }

    #[test]
    fn test_tagline_rules() {
        let colors = vec![color("FF0000", ColorUsage::Primary)];
        let err = BrandStyle::new(
            colors.clone(),
            BrandTone::Luxury,
            Some("<script>alert(1)</script>".into()),
            None,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Tagline cannot contain HTML tags"));

        assert!(BrandStyle::new(colors.clone(), BrandTone::Luxury, Some("x".repeat(101)), None).is_err());

        let ok = BrandStyle::new(colors, BrandTone::Luxury, Some("  Just do it  ".into()), None).unwrap();
        assert_eq!(ok.tagline.as_deref(), Some("Just do it"));
    }

    #[test]
    fn test_primary_color_fallback() {
        let style = BrandStyle::new(
            vec![color("111111", ColorUsage::Accent), color("222222", ColorUsage::Background)],
            BrandTone::Technical,
            None,
            None,
        )
        .unwrap();
        assert_eq!(style.primary_color().unwrap().hex_code, "111111");
    }

    #[test]
    fn test_deserialize_defaults_and_validation() {
        let style: BrandStyle = serde_json::from_str(
            r#"{"colors":[{"hex_code":"0066CC","name":"Blue"}],"tagline":"Hi"}"#,
        )
        .unwrap();
        assert_eq!(style.tone, BrandTone::Professional);
        assert_eq!(style.colors[0].usage, ColorUsage::General);

        let bad = serde_json::from_str::<BrandStyle>(
            r##"{"colors":[{"hex_code":"#0066CC","name":"Blue"}]}"##,
        );
        assert!(bad.is_err());
    }

    #[test]
    fn test_grayscale_colors() {
        assert_eq!(hex_to_color_name("000000"), "black");
        assert_eq!(hex_to_color_name("0A0A0A"), "black");
        assert_eq!(hex_to_color_name("FFFFFF"), "white");
        assert_eq!(hex_to_color_name("F0F0F0"), "white");
        assert_eq!(hex_to_color_name("808080"), "gray");
        assert_eq!(hex_to_color_name("666666"), "gray");
    }

    #[test]
    fn test_hue_buckets() {
        assert_eq!(hex_to_color_name("FF0000"), "red");
        assert_eq!(hex_to_color_name("E60000"), "red");
        assert_eq!(hex_to_color_name("00FF00"), "green");
        assert_eq!(hex_to_color_name("0000E6"), "blue");
        assert_eq!(hex_to_color_name("FF8000"), "orange");
        assert_eq!(hex_to_color_name("FFFF00"), "yellow");
        assert_eq!(hex_to_color_name("00FFFF"), "cyan");
        assert_eq!(hex_to_color_name("8000FF"), "purple");
        assert_eq!(hex_to_color_name("4D18C9"), "purple");
        assert_eq!(hex_to_color_name("FF00FF"), "pink");
        assert_eq!(hex_to_color_name("ff0000"), "red");
    }

    #[test]
    fn test_describe_uses_natural_name() {
        let c = BrandColor::new("000000", "Red", ColorUsage::Primary).unwrap();
        assert_eq!(c.describe(), "Red (black)");
    }
}
