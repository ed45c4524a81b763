//! Overlay frame rendering.
//!
//! Produces the transparent raster sequence that gets composited over the
//! base video. Rendering work is proportional to the number of *distinct*
//! visual states, not the frame count: visibility can only change at a small
//! set of transition frames, so each distinct state is rasterized once and
//! every output frame just references its state's raster.

pub mod raster;

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, info};

use clipforge_models::{frame_time_ms, Dimensions, ImageOverlay, TextOverlay, TrimWindow};

use crate::error::{MediaError, MediaResult};

pub use raster::{RasterConfig, Rasterizer};

/// Parameters for one overlay render pass.
#[derive(Debug, Clone)]
pub struct OverlayRenderSpec {
    /// The export trim window; frame indices are relative to its start.
    pub trim: TrimWindow,
    /// Output frame rate.
    pub fps: u32,
    /// Render target size; the rasters match it exactly.
    pub target: Dimensions,
    /// Editor container size the normalized coordinates were captured in.
    pub display: Dimensions,
    /// Use each overlay's dual-video placement instead of the primary one.
    pub use_dual_placement: bool,
}

impl OverlayRenderSpec {
    fn validate(&self) -> MediaResult<()> {
        if self.target.width == 0 || self.target.height == 0 {
            return Err(MediaError::missing_config("target resolution"));
        }
        if self.display.width == 0 || self.display.height == 0 {
            return Err(MediaError::missing_config("client display size"));
        }
        if self.fps == 0 {
            return Err(MediaError::missing_config("output fps"));
        }
        Ok(())
    }
}

/// The deduplicated output of a render pass.
#[derive(Debug, Clone)]
pub struct RenderedOverlays {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// One entry per output frame: an index into `states`.
    pub frames: Vec<usize>,
    /// PNG-encoded raster per distinct visual state.
    pub states: Vec<Vec<u8>>,
}

impl RenderedOverlays {
    pub fn total_frames(&self) -> usize {
        self.frames.len()
    }

    /// Number of rasterizations the pass performed.
    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// PNG bytes for a given output frame.
    pub fn frame_png(&self, frame: usize) -> &[u8] {
        &self.states[self.frames[frame]]
    }
}

/// A text or image overlay viewed uniformly by the renderer.
#[derive(Debug, Clone, Copy)]
pub enum OverlayItem<'a> {
    Text(&'a TextOverlay),
    Image(&'a ImageOverlay),
}

impl<'a> OverlayItem<'a> {
    fn z(&self) -> u64 {
        match self {
            OverlayItem::Text(o) => o.z,
            OverlayItem::Image(o) => o.z,
        }
    }

    fn window(&self) -> (u64, u64) {
        match self {
            OverlayItem::Text(o) => (o.start_ms, o.end_ms),
            OverlayItem::Image(o) => (o.start_ms, o.end_ms),
        }
    }

    fn toggled_on(&self) -> bool {
        match self {
            OverlayItem::Text(o) => o.visible,
            OverlayItem::Image(o) => o.visible,
        }
    }

    /// Visible at output frame `frame` of the trim window.
    fn visible_at_frame(&self, trim: &TrimWindow, fps: u32, frame: u64) -> bool {
        if !self.toggled_on() {
            return false;
        }
        let (start, end) = self.window();
        let t = trim.start_ms as f64 + frame_time_ms(frame, fps);
        t >= start as f64 && t < end as f64
    }

    /// The fields that make this overlay's rendered appearance unique.
    fn key_fragment(&self, use_dual: bool) -> String {
        match self {
            OverlayItem::Text(o) => {
                let p = if use_dual { &o.dual_placement } else { &o.placement };
                format!(
                    "T|{}|{:.5},{:.5}|{}|{}-{}|{}|{}|{}|{:?}|{}{}{}|{}|{:.3}",
                    o.text,
                    p.pos.x,
                    p.pos.y,
                    p.max_width,
                    o.start_ms,
                    o.end_ms,
                    o.font_size,
                    o.color.to_hex(),
                    o.background.to_hex(),
                    o.align,
                    o.bold as u8,
                    o.italic as u8,
                    o.underline as u8,
                    o.letter_spacing,
                    o.opacity,
                )
            }
            OverlayItem::Image(o) => {
                let p = if use_dual { &o.dual_placement } else { &o.placement };
                format!(
                    "I|{}|{:.5},{:.5}|{}x{}|{}-{}|{}|{}|{:.3}",
                    o.id,
                    p.pos.x,
                    p.pos.y,
                    o.width,
                    o.height,
                    o.start_ms,
                    o.end_ms,
                    o.rotation_degrees,
                    o.scale,
                    o.opacity,
                )
            }
        }
    }
}

/// Merge text and image overlays into z-order (insertion order).
fn merged_items<'a>(
    texts: &'a [TextOverlay],
    images: &'a [ImageOverlay],
) -> Vec<OverlayItem<'a>> {
    let mut items: Vec<OverlayItem<'a>> = texts
        .iter()
        .map(OverlayItem::Text)
        .chain(images.iter().map(OverlayItem::Image))
        .collect();
    items.sort_by_key(|i| i.z());
    items
}

/// The sorted set of frame indices where the visible-overlay set can change.
///
/// Each overlay contributes its start frame, end frame, and end frame + 1;
/// frame 0 and the last frame are always present. Extra entries are harmless
/// because states deduplicate by key.
pub fn transition_frames(
    items: &[OverlayItem<'_>],
    trim: &TrimWindow,
    fps: u32,
    total: u64,
) -> BTreeSet<u64> {
    let mut frames = BTreeSet::new();
    if total == 0 {
        return frames;
    }
    frames.insert(0);
    frames.insert(total - 1);

    for item in items {
        if !item.toggled_on() {
            continue;
        }
        let (start, end) = item.window();
        if end <= trim.start_ms || start >= trim.end_ms {
            continue;
        }

        let rel_start = start.saturating_sub(trim.start_ms);
        let rel_end = end.saturating_sub(trim.start_ms);

        let start_frame = clipforge_models::frame_index(rel_start, fps);
        let end_frame = clipforge_models::frame_index(rel_end, fps);

        for f in [start_frame, end_frame, end_frame + 1] {
            if f < total {
                frames.insert(f);
            }
        }
    }

    frames
}

/// Canonical identity of the overlay composition at one frame.
pub fn state_key(
    items: &[OverlayItem<'_>],
    spec: &OverlayRenderSpec,
    frame: u64,
) -> String {
    let fragments: Vec<String> = items
        .iter()
        .filter(|i| i.visible_at_frame(&spec.trim, spec.fps, frame))
        .map(|i| i.key_fragment(spec.use_dual_placement))
        .collect();

    if fragments.is_empty() {
        "empty".to_string()
    } else {
        fragments.join(";")
    }
}

/// Render the deduplicated overlay frame sequence for an export window.
///
/// Rasterizes once per distinct state and returns one state reference per
/// output frame. Fails fast on missing render-target/display configuration.
pub fn render_overlay_frames(
    texts: &[TextOverlay],
    images: &[ImageOverlay],
    spec: &OverlayRenderSpec,
    config: &RasterConfig,
) -> MediaResult<RenderedOverlays> {
    spec.validate()?;

    let total = spec.trim.total_frames(spec.fps);
    let items = merged_items(texts, images);
    let needs_font = texts.iter().any(|t| t.visible && !t.text.is_empty());
    let rasterizer = Rasterizer::new(config, needs_font)?;

    let mut key_to_state: HashMap<String, usize> = HashMap::new();
    let mut states: Vec<Vec<u8>> = Vec::new();

    for &frame in &transition_frames(&items, &spec.trim, spec.fps, total) {
        let key = state_key(&items, spec, frame);
        if key_to_state.contains_key(&key) {
            continue;
        }
        let visible: Vec<OverlayItem<'_>> = items
            .iter()
            .copied()
            .filter(|i| i.visible_at_frame(&spec.trim, spec.fps, frame))
            .collect();
        let png = rasterizer.rasterize_state(&visible, spec)?;
        key_to_state.insert(key, states.len());
        states.push(png);
    }

    // Every frame resolves its key the same way and reuses the cached raster.
    let mut frames = Vec::with_capacity(total as usize);
    for frame in 0..total {
        let key = state_key(&items, spec, frame);
        let state = match key_to_state.get(&key) {
            Some(&idx) => idx,
            None => {
                // Transition coverage should make this unreachable; render
                // rather than emit a wrong frame.
                debug!(frame, "State key missed transition coverage");
                let visible: Vec<OverlayItem<'_>> = items
                    .iter()
                    .copied()
                    .filter(|i| i.visible_at_frame(&spec.trim, spec.fps, frame))
                    .collect();
                let png = rasterizer.rasterize_state(&visible, spec)?;
                key_to_state.insert(key, states.len());
                states.push(png);
                states.len() - 1
            }
        };
        frames.push(state);
    }

    info!(
        total_frames = frames.len(),
        distinct_states = states.len(),
        "Rendered overlay frame sequence"
    );

    Ok(RenderedOverlays {
        width: spec.target.width,
        height: spec.target.height,
        fps: spec.fps,
        frames,
        states,
    })
}

/// Async RPC boundary for the renderer.
///
/// The request is moved into an isolated blocking context and the response
/// is moved back; no shared mutable state crosses the boundary, so per-frame
/// rasterization can never block the coordinating task.
pub async fn render_overlay_frames_async(
    texts: Vec<TextOverlay>,
    images: Vec<ImageOverlay>,
    spec: OverlayRenderSpec,
    config: RasterConfig,
) -> MediaResult<RenderedOverlays> {
    tokio::task::spawn_blocking(move || render_overlay_frames(&texts, &images, &spec, &config))
        .await
        .map_err(|e| MediaError::overlay_render(format!("Render worker failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipforge_models::OverlayStore;

    fn spec(trim: TrimWindow, fps: u32) -> OverlayRenderSpec {
        OverlayRenderSpec {
            trim,
            fps,
            target: Dimensions::new(640, 360),
            display: Dimensions::new(640, 360),
            use_dual_placement: false,
        }
    }

    /// A 2x2 opaque red PNG for image-overlay tests; no font needed.
    fn tiny_png() -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(2, 2, image::Rgba([255, 0, 0, 255]));
        let mut out = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(
                &mut std::io::Cursor::new(&mut out),
                image::ImageOutputFormat::Png,
            )
            .unwrap();
        out
    }

    #[test]
    fn test_transition_frames_scenario_a() {
        // Scenario A: 10s source, overlay visible 0-5000ms, 30fps.
        let mut store = OverlayStore::new(10_000);
        store.add_image("a.png", tiny_png(), 0, 5_000);
        let (texts, images, _) = store.snapshot();

        let trim = TrimWindow::new(0, 10_000);
        let items = merged_items(&texts, &images);
        let total = trim.total_frames(30);
        assert_eq!(total, 300);

        let transitions = transition_frames(&items, &trim, 30, total);
        let expected: BTreeSet<u64> = [0, 150, 151, 299].into_iter().collect();
        assert_eq!(transitions, expected);
    }

    #[test]
    fn test_dedup_scenario_a() {
        // Exactly 2 distinct states rasterized, 300 frames emitted.
        let mut store = OverlayStore::new(10_000);
        store.add_image("a.png", tiny_png(), 0, 5_000);
        let (texts, images, _) = store.snapshot();

        let rendered = render_overlay_frames(
            &texts,
            &images,
            &spec(TrimWindow::new(0, 10_000), 30),
            &RasterConfig::default(),
        )
        .unwrap();

        assert_eq!(rendered.total_frames(), 300);
        assert_eq!(rendered.state_count(), 2);

        // Frames 0..149 share the with-overlay state, 150.. the empty one.
        assert_eq!(rendered.frames[0], rendered.frames[149]);
        assert_ne!(rendered.frames[149], rendered.frames[150]);
        assert_eq!(rendered.frames[150], rendered.frames[299]);
    }

    #[test]
    fn test_dedup_many_frames_few_states() {
        // P4: k distinct states across N frames -> k rasterizations.
        let mut store = OverlayStore::new(20_000);
        store.add_image("a.png", tiny_png(), 0, 20_000); // persistent
        store.add_image("b.png", tiny_png(), 5_000, 5_000); // 5s..10s
        let (texts, images, _) = store.snapshot();

        let rendered = render_overlay_frames(
            &texts,
            &images,
            &spec(TrimWindow::new(0, 20_000), 30),
            &RasterConfig::default(),
        )
        .unwrap();

        assert_eq!(rendered.total_frames(), 600);
        // States: {a}, {a,b}, back to {a} (same key) => 2 distinct.
        assert_eq!(rendered.state_count(), 2);
        assert_eq!(rendered.frames[0], rendered.frames[599]);
        assert_ne!(rendered.frames[0], rendered.frames[200]);
    }

    #[test]
    fn test_trim_window_offsets_frames() {
        // Overlay 2s..4s inside a 2s..6s trim => visible frames 0..59 at 30fps.
        let mut store = OverlayStore::new(10_000);
        store.add_image("a.png", tiny_png(), 2_000, 2_000);
        let (texts, images, _) = store.snapshot();

        let rendered = render_overlay_frames(
            &texts,
            &images,
            &spec(TrimWindow::new(2_000, 6_000), 30),
            &RasterConfig::default(),
        )
        .unwrap();

        assert_eq!(rendered.total_frames(), 120);
        assert_eq!(rendered.state_count(), 2);
        assert_eq!(rendered.frames[0], rendered.frames[59]);
        assert_ne!(rendered.frames[59], rendered.frames[60]);
    }

    #[test]
    fn test_toggled_off_overlay_is_invisible() {
        let mut store = OverlayStore::new(10_000);
        let id = store.add_image("a.png", tiny_png(), 0, 10_000);
        store.update_image(
            id,
            clipforge_models::ImagePatch {
                visible: Some(false),
                ..Default::default()
            },
        );
        let (texts, images, _) = store.snapshot();

        let rendered = render_overlay_frames(
            &texts,
            &images,
            &spec(TrimWindow::new(0, 1_000), 30),
            &RasterConfig::default(),
        )
        .unwrap();
        // Only the empty state exists.
        assert_eq!(rendered.state_count(), 1);
    }

    #[test]
    fn test_missing_config_fails_fast() {
        let bad = OverlayRenderSpec {
            trim: TrimWindow::new(0, 1_000),
            fps: 30,
            target: Dimensions::new(0, 0),
            display: Dimensions::new(640, 360),
            use_dual_placement: false,
        };
        let result = render_overlay_frames(&[], &[], &bad, &RasterConfig::default());
        assert!(matches!(result, Err(MediaError::MissingConfig(_))));
    }

    #[test]
    fn test_empty_window_renders_nothing() {
        let rendered = render_overlay_frames(
            &[],
            &[],
            &spec(TrimWindow::new(1_000, 1_000), 30),
            &RasterConfig::default(),
        )
        .unwrap();
        assert_eq!(rendered.total_frames(), 0);
        assert_eq!(rendered.state_count(), 0);
    }

    #[tokio::test]
    async fn test_async_boundary_round_trip() {
        let mut store = OverlayStore::new(4_000);
        store.add_image("a.png", tiny_png(), 0, 2_000);
        let (texts, images, _) = store.snapshot();

        let rendered = render_overlay_frames_async(
            texts,
            images,
            spec(TrimWindow::new(0, 4_000), 10),
            RasterConfig::default(),
        )
        .await
        .unwrap();
        assert_eq!(rendered.total_frames(), 40);
        assert_eq!(rendered.state_count(), 2);
    }
}
