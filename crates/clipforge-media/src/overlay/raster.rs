//! CPU rasterization of overlay states.
//!
//! Each distinct overlay state becomes one transparent RGBA canvas sized to
//! the render target. Text is laid out with the display-to-render scale
//! factor applied to font size, padding and letter spacing, so glyphs stay
//! proportionally correct at any output resolution.

use std::io::Cursor;
use std::path::PathBuf;

use fontdue::{Font, FontSettings};
use image::{imageops, RgbaImage};
use tracing::debug;

use clipforge_models::{overlay_scale_factor, Color, ImageOverlay, TextAlign, TextOverlay};

use super::{OverlayItem, OverlayRenderSpec};
use crate::error::{MediaError, MediaResult};

/// Base horizontal padding inside a text box, in display pixels.
pub const BASE_PADDING_X: f32 = 8.0;
/// Base vertical padding inside a text box, in display pixels.
pub const BASE_PADDING_Y: f32 = 6.0;
/// Horizontal shear applied per pixel above the baseline for italic text.
const ITALIC_SHEAR: f32 = 0.2;

/// System font locations tried in order when no explicit font is supplied.
pub const DEFAULT_FONT_PATHS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
];

/// Rasterizer configuration.
#[derive(Debug, Clone)]
pub struct RasterConfig {
    /// Explicit font bytes; takes precedence over the search paths.
    pub font_data: Option<Vec<u8>>,
    /// Paths probed for a usable font when no bytes are supplied.
    pub font_paths: Vec<PathBuf>,
}

impl Default for RasterConfig {
    fn default() -> Self {
        Self {
            font_data: None,
            font_paths: DEFAULT_FONT_PATHS.iter().map(PathBuf::from).collect(),
        }
    }
}

impl RasterConfig {
    pub fn with_font_data(data: Vec<u8>) -> Self {
        Self {
            font_data: Some(data),
            ..Default::default()
        }
    }
}

fn resolve_font(config: &RasterConfig) -> MediaResult<Font> {
    if let Some(data) = &config.font_data {
        return Font::from_bytes(data.as_slice(), FontSettings::default())
            .map_err(|e| MediaError::overlay_render(format!("Invalid font data: {e}")));
    }

    for path in &config.font_paths {
        if !path.exists() {
            continue;
        }
        let bytes = std::fs::read(path)?;
        match Font::from_bytes(bytes, FontSettings::default()) {
            Ok(font) => {
                debug!(path = %path.display(), "Resolved overlay font");
                return Ok(font);
            }
            Err(e) => debug!(path = %path.display(), error = e, "Skipping unusable font"),
        }
    }

    Err(MediaError::FontUnavailable(config.font_paths.clone()))
}

/// Greedy word wrap. A single word wider than `max_width` is placed on its
/// own line unsplit, never hyphenated.
pub fn wrap_lines<F>(text: &str, max_width: f32, measure: F) -> Vec<String>
where
    F: Fn(&str) -> f32,
{
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.is_empty() {
            if measure(word) <= max_width {
                current = word.to_string();
            } else {
                lines.push(word.to_string());
            }
            continue;
        }

        let candidate = format!("{current} {word}");
        if measure(&candidate) <= max_width {
            current = candidate;
        } else {
            lines.push(std::mem::take(&mut current));
            if measure(word) <= max_width {
                current = word.to_string();
            } else {
                lines.push(word.to_string());
            }
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Compress letter spacing so the spaced line fits `avail`, flooring at 0.
/// When the bare glyph advances already exceed the width the line overflows
/// like an unsplittable word; text is never truncated.
pub fn effective_letter_spacing(
    spacing: f32,
    advances_sum: f32,
    char_count: usize,
    avail: f32,
) -> f32 {
    if spacing <= 0.0 || char_count < 2 {
        return spacing.max(0.0);
    }
    let gaps = (char_count - 1) as f32;
    if advances_sum + spacing * gaps <= avail {
        return spacing;
    }
    ((avail - advances_sum) / gaps).max(0.0)
}

/// Clamp a box origin so the box stays inside the canvas on one axis.
fn clamp_origin(pos: f64, extent: u32, canvas: u32) -> i64 {
    let max = canvas.saturating_sub(extent) as f64;
    pos.clamp(0.0, max.max(0.0)).round() as i64
}

/// Source-over blend of one RGBA pixel.
fn blend_pixel(canvas: &mut RgbaImage, x: i64, y: i64, color: [u8; 4]) {
    if x < 0 || y < 0 || x >= canvas.width() as i64 || y >= canvas.height() as i64 {
        return;
    }
    let src_a = color[3] as u32;
    if src_a == 0 {
        return;
    }
    let dst = canvas.get_pixel_mut(x as u32, y as u32);
    let dst_a = dst[3] as u32;
    let out_a = src_a + dst_a * (255 - src_a) / 255;
    if out_a == 0 {
        return;
    }
    for c in 0..3 {
        let src_c = color[c] as u32;
        let dst_c = dst[c] as u32;
        dst[c] = ((src_c * src_a + dst_c * dst_a * (255 - src_a) / 255) / out_a) as u8;
    }
    dst[3] = out_a as u8;
}

fn fill_rect(canvas: &mut RgbaImage, x: i64, y: i64, w: u32, h: u32, color: [u8; 4]) {
    for dy in 0..h as i64 {
        for dx in 0..w as i64 {
            blend_pixel(canvas, x + dx, y + dy, color);
        }
    }
}

fn scaled_alpha(color: Color, opacity: f64) -> [u8; 4] {
    let mut rgba = color.to_array();
    rgba[3] = (rgba[3] as f64 * opacity.clamp(0.0, 1.0)).round() as u8;
    rgba
}

/// Rotate an RGBA sprite about its center by `degrees`, expanding the canvas
/// to the rotated bounding box. Inverse-mapped nearest neighbor.
fn rotate_sprite(src: &RgbaImage, degrees: f32) -> RgbaImage {
    let radians = degrees.to_radians();
    let (sin, cos) = radians.sin_cos();
    // Snap near-axis rotations so 90-degree multiples keep exact bounds.
    let sin = if sin.abs() < 1e-6 { 0.0 } else { sin };
    let cos = if cos.abs() < 1e-6 { 0.0 } else { cos };

    let (sw, sh) = (src.width() as f32, src.height() as f32);
    let new_w = (sw * cos.abs() + sh * sin.abs()).ceil().max(1.0) as u32;
    let new_h = (sw * sin.abs() + sh * cos.abs()).ceil().max(1.0) as u32;

    let mut dst = RgbaImage::new(new_w, new_h);
    let (dcx, dcy) = (new_w as f32 / 2.0, new_h as f32 / 2.0);
    let (scx, scy) = (sw / 2.0, sh / 2.0);

    for y in 0..new_h {
        for x in 0..new_w {
            let dx = x as f32 + 0.5 - dcx;
            let dy = y as f32 + 0.5 - dcy;
            // Inverse rotation back into source space
            let sx = dx * cos + dy * sin + scx;
            let sy = -dx * sin + dy * cos + scy;
            if sx >= 0.0 && sy >= 0.0 && sx < sw && sy < sh {
                dst.put_pixel(x, y, *src.get_pixel(sx as u32, sy as u32));
            }
        }
    }
    dst
}

/// One wrapped line with its resolved spacing and measured width.
struct LaidOutLine {
    text: String,
    spacing: f32,
    width: f32,
}

/// Rasterizes overlay states onto transparent canvases.
pub struct Rasterizer {
    font: Option<Font>,
}

impl Rasterizer {
    /// Create a rasterizer; the font is resolved only when text overlays
    /// actually need glyphs.
    pub fn new(config: &RasterConfig, needs_font: bool) -> MediaResult<Self> {
        let font = if needs_font {
            Some(resolve_font(config)?)
        } else {
            None
        };
        Ok(Self { font })
    }

    /// Rasterize one overlay state and return it PNG-encoded.
    pub fn rasterize_state(
        &self,
        visible: &[OverlayItem<'_>],
        spec: &OverlayRenderSpec,
    ) -> MediaResult<Vec<u8>> {
        let mut canvas = RgbaImage::new(spec.target.width, spec.target.height);

        for item in visible {
            match item {
                OverlayItem::Text(overlay) => self.draw_text(&mut canvas, overlay, spec)?,
                OverlayItem::Image(overlay) => draw_image(&mut canvas, overlay, spec)?,
            }
        }

        encode_png(canvas)
    }

    fn measure(&self, font: &Font, text: &str, px: f32, spacing: f32) -> f32 {
        let mut sum = 0.0;
        let mut count = 0usize;
        for ch in text.chars() {
            sum += font.metrics(ch, px).advance_width;
            count += 1;
        }
        if count > 1 {
            sum + spacing * (count - 1) as f32
        } else {
            sum
        }
    }

    fn draw_text(
        &self,
        canvas: &mut RgbaImage,
        overlay: &TextOverlay,
        spec: &OverlayRenderSpec,
    ) -> MediaResult<()> {
        let font = self.font.as_ref().ok_or_else(|| {
            MediaError::overlay_render("Text overlay present but no font was resolved")
        })?;

        let s = overlay_scale_factor(spec.display, spec.target) as f32;
        let px = overlay.font_size * s;
        let pad_x = BASE_PADDING_X * s;
        let pad_y = BASE_PADDING_Y * s;
        let spacing = overlay.letter_spacing * s;

        let placement = if spec.use_dual_placement {
            &overlay.dual_placement
        } else {
            &overlay.placement
        };
        let avail = (placement.max_width * s - 2.0 * pad_x).max(1.0);

        let line_metrics = font
            .horizontal_line_metrics(px)
            .ok_or_else(|| MediaError::overlay_render("Font has no horizontal metrics"))?;
        let line_height = line_metrics.new_line_size;

        // Wrap with the requested spacing, then compress per line to fit.
        let lines: Vec<LaidOutLine> = wrap_lines(&overlay.text, avail, |t| {
            self.measure(font, t, px, spacing)
        })
        .into_iter()
        .map(|text| {
            let advances: f32 = text.chars().map(|c| font.metrics(c, px).advance_width).sum();
            let count = text.chars().count();
            let eff = effective_letter_spacing(spacing, advances, count, avail);
            let width = if count > 1 {
                advances + eff * (count - 1) as f32
            } else {
                advances
            };
            LaidOutLine {
                text,
                spacing: eff,
                width,
            }
        })
        .collect();

        let content_w = lines.iter().map(|l| l.width).fold(0.0f32, f32::max);
        let content_h = lines.len() as f32 * line_height;
        let box_w = (content_w + 2.0 * pad_x).ceil().max(1.0) as u32;
        let box_h = (content_h + 2.0 * pad_y).ceil().max(1.0) as u32;

        // The box is clamped to the canvas edges, independently per axis,
        // never scaled down.
        let (canvas_w, canvas_h) = (canvas.width(), canvas.height());
        let (pos_x, pos_y) = placement.pos.to_pixels(spec.target);
        let box_x = clamp_origin(pos_x, box_w, canvas_w);
        let box_y = clamp_origin(pos_y, box_h, canvas_h);

        if overlay.background.a > 0 {
            fill_rect(
                canvas,
                box_x,
                box_y,
                box_w.min(canvas_w),
                box_h.min(canvas_h),
                scaled_alpha(overlay.background, overlay.opacity),
            );
        }

        let text_color = scaled_alpha(overlay.color, overlay.opacity);
        let underline_thickness = (px / 14.0).max(1.0).round() as u32;

        for (i, line) in lines.iter().enumerate() {
            let line_top = box_y as f32 + pad_y + i as f32 * line_height;
            let baseline = line_top + line_metrics.ascent;

            // Anchor x inside the content area per alignment.
            let anchor = match overlay.align {
                TextAlign::Left => box_x as f32 + pad_x,
                TextAlign::Center => box_x as f32 + (box_w as f32 - line.width) / 2.0,
                TextAlign::Right => box_x as f32 + box_w as f32 - pad_x - line.width,
            };

            let mut cursor = anchor;
            for ch in line.text.chars() {
                let (metrics, bitmap) = font.rasterize(ch, px);
                let glyph_x = cursor + metrics.xmin as f32;
                let glyph_top = baseline - (metrics.height as i32 + metrics.ymin) as f32;

                for gy in 0..metrics.height {
                    for gx in 0..metrics.width {
                        let coverage = bitmap[gy * metrics.width + gx];
                        if coverage == 0 {
                            continue;
                        }
                        let py = glyph_top + gy as f32;
                        let shear = if overlay.italic {
                            (baseline - py) * ITALIC_SHEAR
                        } else {
                            0.0
                        };
                        let px_x = (glyph_x + gx as f32 + shear).round() as i64;
                        let px_y = py.round() as i64;

                        let alpha = (coverage as u32 * text_color[3] as u32 / 255) as u8;
                        let pixel = [text_color[0], text_color[1], text_color[2], alpha];
                        blend_pixel(canvas, px_x, px_y, pixel);
                        if overlay.bold {
                            blend_pixel(canvas, px_x + 1, px_y, pixel);
                        }
                    }
                }
                cursor += metrics.advance_width + line.spacing;
            }

            // Underline spans the measured line width, not the box width.
            if overlay.underline {
                let y = (baseline + px * 0.08).round() as i64;
                fill_rect(
                    canvas,
                    anchor.round() as i64,
                    y,
                    line.width.round().max(1.0) as u32,
                    underline_thickness,
                    text_color,
                );
            }
        }

        Ok(())
    }
}

fn draw_image(
    canvas: &mut RgbaImage,
    overlay: &ImageOverlay,
    spec: &OverlayRenderSpec,
) -> MediaResult<()> {
    let decoded = image::load_from_memory(&overlay.data)
        .map_err(|e| MediaError::ImageDecode(format!("{}: {e}", overlay.filename)))?
        .to_rgba8();

    let s = overlay_scale_factor(spec.display, spec.target) as f32 * overlay.scale.max(0.0);
    let (w, h) = if overlay.width > 0.0 && overlay.height > 0.0 {
        (overlay.width * s, overlay.height * s)
    } else {
        (decoded.width() as f32 * s, decoded.height() as f32 * s)
    };
    let w = w.round().max(1.0) as u32;
    let h = h.round().max(1.0) as u32;

    let mut sprite = imageops::resize(&decoded, w, h, imageops::FilterType::Triangle);

    if overlay.rotation_degrees.rem_euclid(360.0) != 0.0 {
        sprite = rotate_sprite(&sprite, overlay.rotation_degrees);
    }

    let opacity = overlay.opacity.clamp(0.0, 1.0);
    if opacity < 1.0 {
        for pixel in sprite.pixels_mut() {
            pixel[3] = (pixel[3] as f64 * opacity).round() as u8;
        }
    }

    let placement = if spec.use_dual_placement {
        &overlay.dual_placement
    } else {
        &overlay.placement
    };
    let (pos_x, pos_y) = placement.pos.to_pixels(spec.target);
    let origin_x = clamp_origin(pos_x, sprite.width(), canvas.width());
    let origin_y = clamp_origin(pos_y, sprite.height(), canvas.height());

    for (sx, sy, pixel) in sprite.enumerate_pixels() {
        blend_pixel(
            canvas,
            origin_x + sx as i64,
            origin_y + sy as i64,
            pixel.0,
        );
    }

    Ok(())
}

fn encode_png(canvas: RgbaImage) -> MediaResult<Vec<u8>> {
    let mut out = Vec::new();
    image::DynamicImage::ImageRgba8(canvas)
        .write_to(&mut Cursor::new(&mut out), image::ImageOutputFormat::Png)
        .map_err(|e| MediaError::overlay_render(format!("PNG encode failed: {e}")))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipforge_models::{Dimensions, NormalizedPos, OverlayId, Placement, TrimWindow};
    use image::Rgba;

    /// Fixed-advance measure: 10px per character, spacing already included
    /// by the caller where relevant.
    fn fixed_measure(s: &str) -> f32 {
        s.chars().count() as f32 * 10.0
    }

    #[test]
    fn test_wrap_greedy() {
        let lines = wrap_lines("one two three four", 80.0, fixed_measure);
        // "one two" = 7 chars = 70 <= 80; adding " three" exceeds.
        assert_eq!(lines, vec!["one two", "three", "four"]);
    }

    #[test]
    fn test_wrap_overwide_word_unsplit() {
        let lines = wrap_lines("hi incomprehensibilities yo", 100.0, fixed_measure);
        // 21 chars = 210px > 100px, still one unsplit line
        assert_eq!(lines, vec!["hi", "incomprehensibilities", "yo"]);
    }

    #[test]
    fn test_wrap_empty() {
        assert!(wrap_lines("", 100.0, fixed_measure).is_empty());
        assert!(wrap_lines("   ", 100.0, fixed_measure).is_empty());
    }

    #[test]
    fn test_letter_spacing_kept_when_it_fits() {
        // 4 chars * 10 + 3 gaps * 2 = 46 <= 50
        assert_eq!(effective_letter_spacing(2.0, 40.0, 4, 50.0), 2.0);
    }

    #[test]
    fn test_letter_spacing_compressed_to_fit() {
        // 4 chars * 10 + 3 gaps * 5 = 55 > 50 => (50-40)/3
        let eff = effective_letter_spacing(5.0, 40.0, 4, 50.0);
        assert!((eff - 10.0 / 3.0).abs() < 1e-6);
        // Compressed line now fits exactly
        assert!(40.0 + eff * 3.0 <= 50.0 + 1e-4);
    }

    #[test]
    fn test_letter_spacing_floors_at_zero() {
        // Advances alone exceed the width: spacing drops to 0, never negative.
        assert_eq!(effective_letter_spacing(5.0, 60.0, 4, 50.0), 0.0);
    }

    #[test]
    fn test_clamp_origin() {
        assert_eq!(clamp_origin(-20.0, 100, 640), 0);
        assert_eq!(clamp_origin(600.0, 100, 640), 540);
        assert_eq!(clamp_origin(300.0, 100, 640), 300);
        // Box larger than canvas clamps to the origin
        assert_eq!(clamp_origin(50.0, 800, 640), 0);
    }

    #[test]
    fn test_rotate_sprite_bounds() {
        let sprite = RgbaImage::from_pixel(40, 20, Rgba([0, 255, 0, 255]));
        let rotated = rotate_sprite(&sprite, 90.0);
        assert_eq!((rotated.width(), rotated.height()), (20, 40));

        let rotated = rotate_sprite(&sprite, 45.0);
        assert!(rotated.width() >= 42 && rotated.height() >= 42);
        // Center pixel survives any rotation
        let center = rotated.get_pixel(rotated.width() / 2, rotated.height() / 2);
        assert_eq!(center[1], 255);
    }

    #[test]
    fn test_blend_pixel_src_over() {
        let mut canvas = RgbaImage::new(2, 2);
        blend_pixel(&mut canvas, 0, 0, [255, 0, 0, 255]);
        assert_eq!(canvas.get_pixel(0, 0).0, [255, 0, 0, 255]);

        // Half-transparent green over opaque red keeps full alpha
        blend_pixel(&mut canvas, 0, 0, [0, 255, 0, 128]);
        let px = canvas.get_pixel(0, 0);
        assert_eq!(px[3], 255);
        assert!(px[1] > 100 && px[0] < 200);

        // Out-of-bounds writes are ignored
        blend_pixel(&mut canvas, -1, 5, [255, 255, 255, 255]);
    }

    fn image_overlay(data: Vec<u8>, pos: NormalizedPos) -> ImageOverlay {
        ImageOverlay {
            id: OverlayId::new(),
            start_ms: 0,
            end_ms: 1000,
            placement: Placement::new(pos, 100.0),
            dual_placement: Placement::default(),
            opacity: 1.0,
            visible: true,
            z: 0,
            filename: "test.png".into(),
            data: std::sync::Arc::new(data),
            width: 4.0,
            height: 4.0,
            rotation_degrees: 0.0,
            scale: 1.0,
        }
    }

    fn red_png() -> Vec<u8> {
        encode_png(RgbaImage::from_pixel(4, 4, Rgba([255, 0, 0, 255]))).unwrap()
    }

    #[test]
    fn test_rasterize_image_state() {
        let spec = OverlayRenderSpec {
            trim: TrimWindow::new(0, 1000),
            fps: 30,
            target: Dimensions::new(64, 64),
            display: Dimensions::new(64, 64),
            use_dual_placement: false,
        };
        let overlay = image_overlay(red_png(), NormalizedPos::new(0.0, 0.0));
        let rasterizer = Rasterizer::new(&RasterConfig::default(), false).unwrap();
        let png = rasterizer
            .rasterize_state(&[OverlayItem::Image(&overlay)], &spec)
            .unwrap();

        let decoded = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!((decoded.width(), decoded.height()), (64, 64));
        // Top-left carries the sprite, far corner stays transparent.
        assert_eq!(decoded.get_pixel(1, 1).0, [255, 0, 0, 255]);
        assert_eq!(decoded.get_pixel(60, 60)[3], 0);
    }

    #[test]
    fn test_rasterize_applies_opacity() {
        let spec = OverlayRenderSpec {
            trim: TrimWindow::new(0, 1000),
            fps: 30,
            target: Dimensions::new(32, 32),
            display: Dimensions::new(32, 32),
            use_dual_placement: false,
        };
        let mut overlay = image_overlay(red_png(), NormalizedPos::new(0.0, 0.0));
        overlay.opacity = 0.5;
        let rasterizer = Rasterizer::new(&RasterConfig::default(), false).unwrap();
        let png = rasterizer
            .rasterize_state(&[OverlayItem::Image(&overlay)], &spec)
            .unwrap();

        let decoded = image::load_from_memory(&png).unwrap().to_rgba8();
        let alpha = decoded.get_pixel(1, 1)[3];
        assert!(alpha > 100 && alpha < 150);
    }

    #[test]
    fn test_bad_image_bytes_error() {
        let spec = OverlayRenderSpec {
            trim: TrimWindow::new(0, 1000),
            fps: 30,
            target: Dimensions::new(32, 32),
            display: Dimensions::new(32, 32),
            use_dual_placement: false,
        };
        let overlay = image_overlay(vec![1, 2, 3], NormalizedPos::new(0.0, 0.0));
        let rasterizer = Rasterizer::new(&RasterConfig::default(), false).unwrap();
        let result = rasterizer.rasterize_state(&[OverlayItem::Image(&overlay)], &spec);
        assert!(matches!(result, Err(MediaError::ImageDecode(_))));
    }
}
