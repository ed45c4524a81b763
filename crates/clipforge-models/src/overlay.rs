//! Text and image overlay models.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::geometry::NormalizedPos;

/// Default font size for newly created text overlays (display pixels).
pub const DEFAULT_FONT_SIZE: f32 = 24.0;
/// Default maximum text width for newly created text overlays (display pixels).
pub const DEFAULT_TEXT_MAX_WIDTH: f32 = 300.0;
/// Default font family for newly created text overlays.
pub const DEFAULT_FONT_FAMILY: &str = "sans-serif";

/// Unique identifier for overlays and audio tracks, generated at creation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct OverlayId(Uuid);

impl OverlayId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OverlayId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OverlayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An RGBA color, serialized as `#rrggbb` or `#rrggbbaa`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgb(0xff, 0xff, 0xff);
    pub const BLACK: Color = Color::rgb(0x00, 0x00, 0x00);
    pub const TRANSPARENT: Color = Color {
        r: 0,
        g: 0,
        b: 0,
        a: 0,
    };

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 0xff }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }

    pub fn to_hex(self) -> String {
        if self.a == 0xff {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }
}

#[derive(Debug, Error)]
#[error("Invalid color literal: {0}")]
pub struct ColorParseError(String);

impl FromStr for Color {
    type Err = ColorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.strip_prefix('#').unwrap_or(s);
        let bytes = match hex.len() {
            6 | 8 => u32::from_str_radix(hex, 16).map_err(|_| ColorParseError(s.to_string()))?,
            _ => return Err(ColorParseError(s.to_string())),
        };
        Ok(if hex.len() == 6 {
            Color::rgb((bytes >> 16) as u8, (bytes >> 8) as u8, bytes as u8)
        } else {
            Color::rgba(
                (bytes >> 24) as u8,
                (bytes >> 16) as u8,
                (bytes >> 8) as u8,
                bytes as u8,
            )
        })
    }
}

impl Serialize for Color {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl JsonSchema for Color {
    fn schema_name() -> String {
        "Color".to_string()
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        String::json_schema(gen)
    }
}

/// Text alignment within the overlay content area.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
}

/// Where and how large an overlay is on one output surface.
///
/// Every overlay carries two of these, one for the primary 16:9 output and
/// one for the dual 9:16 output, so compositing onto either aspect never
/// re-derives positions from raw drag deltas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Placement {
    /// Position as a fraction of the video frame, captured against the
    /// editor container at interaction time.
    pub pos: NormalizedPos,
    /// Maximum content width in display pixels (text wrap limit, or the
    /// drawn width for images).
    pub max_width: f32,
}

impl Placement {
    pub fn new(pos: NormalizedPos, max_width: f32) -> Self {
        Self { pos, max_width }
    }
}

impl Default for Placement {
    fn default() -> Self {
        Self {
            pos: NormalizedPos::new(0.1, 0.1),
            max_width: DEFAULT_TEXT_MAX_WIDTH,
        }
    }
}

/// A time-windowed text element composited onto the video during export.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TextOverlay {
    pub id: OverlayId,
    /// Visibility window start, in source milliseconds.
    pub start_ms: u64,
    /// Visibility window end; equal to the clip duration for a persistent
    /// overlay.
    pub end_ms: u64,
    /// Placement on the primary (16:9) output.
    pub placement: Placement,
    /// Placement on the dual (9:16) output.
    pub dual_placement: Placement,
    /// Draw opacity in 0..1.
    pub opacity: f64,
    /// Manual visibility toggle, independent of the time window.
    pub visible: bool,
    /// Z-order sequence assigned by the store; later additions render on top.
    pub z: u64,

    pub text: String,
    pub font_size: f32,
    pub font_family: String,
    pub color: Color,
    pub background: Color,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub align: TextAlign,
    /// Extra advance between characters, in display pixels.
    pub letter_spacing: f32,
}

impl TextOverlay {
    /// Whether the window spans the whole clip.
    pub fn is_persistent(&self, total_duration_ms: u64) -> bool {
        self.start_ms == 0 && self.end_ms == total_duration_ms
    }

    /// Visible at `time_ms` (toggle AND window).
    pub fn visible_at(&self, time_ms: u64) -> bool {
        self.visible && time_ms >= self.start_ms && time_ms < self.end_ms
    }
}

/// A time-windowed image element composited onto the video during export.
///
/// The image bytes are owned exclusively by the overlay (via the store):
/// deleting the overlay or dropping the store releases them.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ImageOverlay {
    pub id: OverlayId,
    pub start_ms: u64,
    pub end_ms: u64,
    pub placement: Placement,
    pub dual_placement: Placement,
    pub opacity: f64,
    pub visible: bool,
    pub z: u64,

    /// Original filename, kept for diagnostics.
    pub filename: String,
    /// Encoded image bytes (PNG/JPEG), shared only with export snapshots.
    #[serde(skip)]
    #[schemars(skip)]
    pub data: Arc<Vec<u8>>,
    /// Drawn width in display pixels.
    pub width: f32,
    /// Drawn height in display pixels.
    pub height: f32,
    /// Rotation about the center, in degrees.
    pub rotation_degrees: f32,
    /// Additional user scale on top of the display-to-render factor.
    pub scale: f32,
}

impl ImageOverlay {
    pub fn is_persistent(&self, total_duration_ms: u64) -> bool {
        self.start_ms == 0 && self.end_ms == total_duration_ms
    }

    pub fn visible_at(&self, time_ms: u64) -> bool {
        self.visible && time_ms >= self.start_ms && time_ms < self.end_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_parse() {
        let c: Color = "#ff8000".parse().unwrap();
        assert_eq!(c, Color::rgb(0xff, 0x80, 0x00));
        let c: Color = "80ff0040".parse().unwrap();
        assert_eq!(c.a, 0x40);
        assert!("#zzz".parse::<Color>().is_err());
        assert!("#ffff".parse::<Color>().is_err());
    }

    #[test]
    fn test_color_hex_round_trip() {
        let c = Color::rgba(1, 2, 3, 4);
        assert_eq!(c.to_hex().parse::<Color>().unwrap(), c);
    }

    #[test]
    fn test_visibility_window_is_half_open() {
        let overlay = TextOverlay {
            id: OverlayId::new(),
            start_ms: 1000,
            end_ms: 5000,
            placement: Placement::default(),
            dual_placement: Placement::default(),
            opacity: 1.0,
            visible: true,
            z: 0,
            text: "hi".into(),
            font_size: DEFAULT_FONT_SIZE,
            font_family: DEFAULT_FONT_FAMILY.into(),
            color: Color::WHITE,
            background: Color::TRANSPARENT,
            bold: false,
            italic: false,
            underline: false,
            align: TextAlign::Left,
            letter_spacing: 0.0,
        };
        assert!(!overlay.visible_at(999));
        assert!(overlay.visible_at(1000));
        assert!(overlay.visible_at(4999));
        assert!(!overlay.visible_at(5000));
    }
}
