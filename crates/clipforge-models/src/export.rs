//! Export settings and the per-export job snapshot.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audio::AudioTrack;
use crate::clip::{ClipMetadata, DualAudioSource, DualLayout, DualVideoClip};
use crate::geometry::Dimensions;
use crate::overlay::{ImageOverlay, TextOverlay};
use crate::time::TrimWindow;

/// Default encoding preset.
pub const DEFAULT_PRESET: &str = "fast";
/// Default CRF (quality, 0-51, lower is better).
pub const DEFAULT_CRF: u8 = 18;
/// Default output frame rate.
pub const DEFAULT_FPS: u32 = 30;
/// Default audio bitrate.
pub const DEFAULT_AUDIO_BITRATE: &str = "128k";

/// Output container format. Codec choice is delegated to the format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    #[default]
    Mp4,
    Webm,
    Mov,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Mp4 => "mp4",
            ExportFormat::Webm => "webm",
            ExportFormat::Mov => "mov",
        }
    }

    /// Default video codec for the container.
    pub fn video_codec(&self) -> &'static str {
        match self {
            ExportFormat::Mp4 | ExportFormat::Mov => "libx264",
            ExportFormat::Webm => "libvpx-vp9",
        }
    }

    /// Default audio codec for the container.
    pub fn audio_codec(&self) -> &'static str {
        match self {
            ExportFormat::Mp4 | ExportFormat::Mov => "aac",
            ExportFormat::Webm => "libopus",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// Output resolution tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    R480p,
    R720p,
    #[default]
    R1080p,
}

impl Resolution {
    /// Landscape dimensions for the tier.
    pub fn dims(&self) -> Dimensions {
        match self {
            Resolution::R480p => Dimensions::new(854, 480),
            Resolution::R720p => Dimensions::new(1280, 720),
            Resolution::R1080p => Dimensions::new(1920, 1080),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Resolution::R480p => "480p",
            Resolution::R720p => "720p",
            Resolution::R1080p => "1080p",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Bitrate selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum BitrateMode {
    #[default]
    Standard,
    High,
    Min,
    /// Use `custom_bitrate_kbps` verbatim.
    Custom,
}

/// Aspect ratio specification, `width:height`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct AspectRatio {
    pub width: u32,
    pub height: u32,
}

impl AspectRatio {
    /// Portrait (9:16) for vertical platforms.
    pub const PORTRAIT: AspectRatio = AspectRatio {
        width: 9,
        height: 16,
    };

    /// Square (1:1).
    pub const SQUARE: AspectRatio = AspectRatio {
        width: 1,
        height: 1,
    };

    /// Widescreen (16:9).
    pub const WIDESCREEN: AspectRatio = AspectRatio {
        width: 16,
        height: 9,
    };

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns the aspect ratio as a decimal.
    pub fn as_f64(&self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.width, self.height)
    }
}

#[derive(Debug, Error)]
pub enum AspectRatioParseError {
    #[error("Invalid aspect ratio format: {0}, expected 'W:H'")]
    InvalidFormat(String),
    #[error("Invalid number in aspect ratio: {0}")]
    InvalidNumber(String),
    #[error("Aspect ratio cannot have zero values")]
    ZeroValue,
}

impl FromStr for AspectRatio {
    type Err = AspectRatioParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 2 {
            return Err(AspectRatioParseError::InvalidFormat(s.to_string()));
        }

        let width = parts[0]
            .parse()
            .map_err(|_| AspectRatioParseError::InvalidNumber(parts[0].to_string()))?;
        let height = parts[1]
            .parse()
            .map_err(|_| AspectRatioParseError::InvalidNumber(parts[1].to_string()))?;

        if width == 0 || height == 0 {
            return Err(AspectRatioParseError::ZeroValue);
        }

        Ok(AspectRatio { width, height })
    }
}

/// Target aspect ratio for the export: keep the source shape, or reformat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum AspectTarget {
    /// No reformatting; the source passes through untouched.
    #[default]
    Original,
    /// Reformat to the given ratio using the configured conversion mode.
    Ratio(AspectRatio),
}

impl FromStr for AspectTarget {
    type Err = AspectRatioParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("original") {
            Ok(AspectTarget::Original)
        } else {
            Ok(AspectTarget::Ratio(s.parse()?))
        }
    }
}

/// How the source is fitted into a different target aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConversionMode {
    /// Fit inside the target box, padding the remainder.
    #[default]
    Letterbox,
    /// Fill the target box, cropping the overflow from the center.
    Crop,
    /// Scale directly to the target box; intentional distortion.
    Stretch,
}

/// Everything the encoder needs to know, independent of any one clip.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExportSettings {
    #[serde(default)]
    pub format: ExportFormat,
    #[serde(default)]
    pub resolution: Resolution,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default)]
    pub bitrate_mode: BitrateMode,
    /// Explicit bitrate for [`BitrateMode::Custom`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_bitrate_kbps: Option<u32>,
    #[serde(default = "default_preset")]
    pub preset: String,
    #[serde(default = "default_crf")]
    pub crf: u8,
    #[serde(default)]
    pub aspect_target: AspectTarget,
    #[serde(default)]
    pub conversion: ConversionMode,
    /// Letterbox filler color override (FFmpeg color name or `#rrggbb`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pad_color: Option<String>,
}

fn default_fps() -> u32 {
    DEFAULT_FPS
}
fn default_preset() -> String {
    DEFAULT_PRESET.to_string()
}
fn default_crf() -> u8 {
    DEFAULT_CRF
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            format: ExportFormat::Mp4,
            resolution: Resolution::R1080p,
            fps: DEFAULT_FPS,
            bitrate_mode: BitrateMode::Standard,
            custom_bitrate_kbps: None,
            preset: DEFAULT_PRESET.to_string(),
            crf: DEFAULT_CRF,
            aspect_target: AspectTarget::Original,
            conversion: ConversionMode::Letterbox,
            pad_color: None,
        }
    }
}

/// Ephemeral aggregate constructed per export call. Read-only after
/// construction; never persisted.
///
/// `display_size` and `target_resolution` stay optional at the type level so
/// the orchestrator can fail fast with a configuration error instead of
/// guessing a coordinate space.
#[derive(Debug, Clone)]
pub struct ExportJob {
    pub clip: ClipMetadata,
    pub trim: TrimWindow,
    pub text_overlays: Vec<TextOverlay>,
    pub image_overlays: Vec<ImageOverlay>,
    pub audio_tracks: Vec<AudioTrack>,
    pub settings: ExportSettings,
    /// Editor container size the overlay coordinates were captured against.
    pub display_size: Option<Dimensions>,
    /// Pixel dimensions of the final render target.
    pub target_resolution: Option<Dimensions>,
    /// Source video dimensions, learned from a probe at load time.
    pub source_dimensions: Dimensions,
    pub dual: Option<DualVideoClip>,
    pub dual_layout: DualLayout,
    pub dual_audio: DualAudioSource,
}

impl ExportJob {
    /// Whether any overlay needs rasterizing for this export.
    pub fn has_overlays(&self) -> bool {
        !self.text_overlays.is_empty() || !self.image_overlays.is_empty()
    }

    /// Audio tracks that actually participate in the mix.
    pub fn active_audio_tracks(&self) -> impl Iterator<Item = &AudioTrack> {
        self.audio_tracks.iter().filter(|t| t.visible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aspect_target_parse() {
        assert_eq!(
            "original".parse::<AspectTarget>().unwrap(),
            AspectTarget::Original
        );
        assert_eq!(
            "9:16".parse::<AspectTarget>().unwrap(),
            AspectTarget::Ratio(AspectRatio::PORTRAIT)
        );
        assert!("0:16".parse::<AspectTarget>().is_err());
        assert!("wide".parse::<AspectTarget>().is_err());
    }

    #[test]
    fn test_format_codecs() {
        assert_eq!(ExportFormat::Mp4.video_codec(), "libx264");
        assert_eq!(ExportFormat::Webm.video_codec(), "libvpx-vp9");
        assert_eq!(ExportFormat::Webm.audio_codec(), "libopus");
        assert_eq!(ExportFormat::Mov.extension(), "mov");
    }

    #[test]
    fn test_resolution_dims() {
        assert_eq!(Resolution::R1080p.dims(), Dimensions::new(1920, 1080));
        assert_eq!(Resolution::R480p.dims(), Dimensions::new(854, 480));
    }

    #[test]
    fn test_settings_defaults() {
        let settings: ExportSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.fps, DEFAULT_FPS);
        assert_eq!(settings.crf, DEFAULT_CRF);
        assert_eq!(settings.preset, DEFAULT_PRESET);
        assert_eq!(settings.aspect_target, AspectTarget::Original);
    }
}
