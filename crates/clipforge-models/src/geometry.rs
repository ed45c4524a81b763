//! Normalized coordinates and display-to-render scaling.
//!
//! Overlay positions are captured as fractions of the *editor container* at
//! interaction time and re-applied against the *render target* at export
//! time. That indirection is what makes placement resolution-independent.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Aspect ratios closer than this are treated as "the same shape" when
/// choosing a scaling policy.
pub const ASPECT_TOLERANCE: f64 = 0.1;

/// Pixel dimensions of a display surface or render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Width over height.
    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }

    /// Total pixel count.
    pub fn area(&self) -> f64 {
        self.width as f64 * self.height as f64
    }
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A position expressed as fractions of the video frame, in [0,1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct NormalizedPos {
    pub x: f64,
    pub y: f64,
}

impl NormalizedPos {
    /// Create a normalized position, clamping both axes into [0,1].
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x: x.clamp(0.0, 1.0),
            y: y.clamp(0.0, 1.0),
        }
    }

    /// Derive a normalized position from a pixel position inside a container.
    pub fn from_pixels(px: f64, py: f64, container: Dimensions) -> Self {
        Self::new(
            normalize_pixel(px, container.width),
            normalize_pixel(py, container.height),
        )
    }

    /// Resolve against a render target, returning pixel coordinates.
    pub fn to_pixels(&self, target: Dimensions) -> (f64, f64) {
        (
            pixel_from_normalized(self.x, target.width),
            pixel_from_normalized(self.y, target.height),
        )
    }
}

/// `norm * dimension_px`.
pub fn pixel_from_normalized(norm: f64, dimension_px: u32) -> f64 {
    norm * dimension_px as f64
}

/// Inverse of [`pixel_from_normalized`].
pub fn normalize_pixel(px: f64, dimension_px: u32) -> f64 {
    if dimension_px == 0 {
        return 0.0;
    }
    px / dimension_px as f64
}

/// Scale factor between the editor display size and the final render size.
///
/// When the two surfaces have (nearly) the same shape, area-based scaling
/// keeps text visually proportional. When the shapes differ (e.g. a 16:9
/// preview exporting to 9:16 portrait) the limiting dimension governs so
/// nothing overflows the narrower axis.
pub fn overlay_scale_factor(display: Dimensions, target: Dimensions) -> f64 {
    let width_ratio = target.width as f64 / display.width as f64;
    let height_ratio = target.height as f64 / display.height as f64;

    if (display.aspect_ratio() - target.aspect_ratio()).abs() < ASPECT_TOLERANCE {
        (target.area() / display.area()).sqrt()
    } else {
        width_ratio.max(height_ratio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_round_trip() {
        // P2: normalize(pixel_from_normalized(n, d), d) == n
        for n in [0.0, 0.25, 0.5, 0.7312, 1.0] {
            for d in [640u32, 1080, 1920, 3840] {
                let px = pixel_from_normalized(n, d);
                assert!((normalize_pixel(px, d) - n).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_normalized_pos_clamps() {
        let p = NormalizedPos::new(-0.5, 1.5);
        assert_eq!(p.x, 0.0);
        assert_eq!(p.y, 1.0);
    }

    #[test]
    fn test_scale_factor_same_aspect_uses_area() {
        // 960x540 preview -> 1920x1080 target: same 16:9 shape, 4x area
        let s = overlay_scale_factor(Dimensions::new(960, 540), Dimensions::new(1920, 1080));
        assert!((s - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_scale_factor_different_aspect_uses_limiting_dimension() {
        // 16:9 preview exporting to 9:16 portrait
        let s = overlay_scale_factor(Dimensions::new(960, 540), Dimensions::new(1080, 1920));
        let width_ratio: f64 = 1080.0 / 960.0;
        let height_ratio = 1920.0 / 540.0;
        assert!((s - width_ratio.max(height_ratio)).abs() < 1e-9);
    }

    #[test]
    fn test_from_pixels_uses_container_not_intrinsic_size() {
        let container = Dimensions::new(800, 450);
        let p = NormalizedPos::from_pixels(400.0, 225.0, container);
        assert!((p.x - 0.5).abs() < 1e-9);
        assert!((p.y - 0.5).abs() < 1e-9);

        let (px, py) = p.to_pixels(Dimensions::new(1920, 1080));
        assert!((px - 960.0).abs() < 1e-9);
        assert!((py - 540.0).abs() < 1e-9);
    }
}
