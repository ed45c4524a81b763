//! Overlay state store.
//!
//! A plain owned store holding the ordered overlay and audio collections for
//! one editing session. The UI layer calls the CRUD operations below and the
//! export path takes a [`snapshot`](OverlayStore::snapshot); nothing else
//! holds long-lived references.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::audio::AudioTrack;
use crate::overlay::{
    Color, ImageOverlay, OverlayId, Placement, TextAlign, TextOverlay, DEFAULT_FONT_FAMILY,
    DEFAULT_FONT_SIZE,
};

/// Partial update for a text overlay. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TextPatch {
    pub start_ms: Option<u64>,
    pub end_ms: Option<u64>,
    pub placement: Option<Placement>,
    pub dual_placement: Option<Placement>,
    pub opacity: Option<f64>,
    pub visible: Option<bool>,
    pub text: Option<String>,
    pub font_size: Option<f32>,
    pub font_family: Option<String>,
    pub color: Option<Color>,
    pub background: Option<Color>,
    pub bold: Option<bool>,
    pub italic: Option<bool>,
    pub underline: Option<bool>,
    pub align: Option<TextAlign>,
    pub letter_spacing: Option<f32>,
}

/// Partial update for an image overlay.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImagePatch {
    pub start_ms: Option<u64>,
    pub end_ms: Option<u64>,
    pub placement: Option<Placement>,
    pub dual_placement: Option<Placement>,
    pub opacity: Option<f64>,
    pub visible: Option<bool>,
    pub width: Option<f32>,
    pub height: Option<f32>,
    pub rotation_degrees: Option<f32>,
    pub scale: Option<f32>,
}

/// Partial update for an audio track.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AudioPatch {
    pub start_ms: Option<u64>,
    pub end_ms: Option<u64>,
    pub volume: Option<f32>,
    pub visible: Option<bool>,
}

/// Owned store for one editing session's overlays and audio tracks.
///
/// Insertion order is preserved and doubles as z-order: later additions
/// render on top. Visibility windows are clamped on every write so that
/// `0 <= start <= end <= total_duration` always holds.
#[derive(Debug)]
pub struct OverlayStore {
    total_duration_ms: u64,
    texts: Vec<TextOverlay>,
    images: Vec<ImageOverlay>,
    audio: Vec<AudioTrack>,
    selected: Option<OverlayId>,
    next_z: u64,
}

impl OverlayStore {
    /// Create a store for a clip of the given total duration.
    pub fn new(total_duration_ms: u64) -> Self {
        Self {
            total_duration_ms,
            texts: Vec::new(),
            images: Vec::new(),
            audio: Vec::new(),
            selected: None,
            next_z: 0,
        }
    }

    pub fn total_duration_ms(&self) -> u64 {
        self.total_duration_ms
    }

    /// Clamp a window write: start into `[0, total]`, end into `[start, total]`.
    fn clamp_window(&self, start_ms: u64, end_ms: u64) -> (u64, u64) {
        let start = start_ms.min(self.total_duration_ms);
        let end = end_ms.clamp(start, self.total_duration_ms);
        (start, end)
    }

    fn next_z(&mut self) -> u64 {
        let z = self.next_z;
        self.next_z += 1;
        z
    }

    /// Add a text overlay visible from `at_ms` for `duration_ms`.
    pub fn add_text(&mut self, at_ms: u64, duration_ms: u64) -> OverlayId {
        let (start_ms, end_ms) = self.clamp_window(at_ms, at_ms.saturating_add(duration_ms));
        let z = self.next_z();
        let overlay = TextOverlay {
            id: OverlayId::new(),
            start_ms,
            end_ms,
            placement: Placement::default(),
            dual_placement: Placement::default(),
            opacity: 1.0,
            visible: true,
            z,
            text: String::new(),
            font_size: DEFAULT_FONT_SIZE,
            font_family: DEFAULT_FONT_FAMILY.to_string(),
            color: Color::WHITE,
            background: Color::TRANSPARENT,
            bold: false,
            italic: false,
            underline: false,
            align: TextAlign::Left,
            letter_spacing: 0.0,
        };
        let id = overlay.id;
        self.texts.push(overlay);
        id
    }

    /// Add an image overlay, taking ownership of the supplied bytes.
    pub fn add_image(
        &mut self,
        filename: impl Into<String>,
        data: Vec<u8>,
        at_ms: u64,
        duration_ms: u64,
    ) -> OverlayId {
        let (start_ms, end_ms) = self.clamp_window(at_ms, at_ms.saturating_add(duration_ms));
        let z = self.next_z();
        let overlay = ImageOverlay {
            id: OverlayId::new(),
            start_ms,
            end_ms,
            placement: Placement::default(),
            dual_placement: Placement::default(),
            opacity: 1.0,
            visible: true,
            z,
            filename: filename.into(),
            data: Arc::new(data),
            width: 0.0,
            height: 0.0,
            rotation_degrees: 0.0,
            scale: 1.0,
        };
        let id = overlay.id;
        self.images.push(overlay);
        id
    }

    /// Add an audio track spanning the whole clip, taking ownership of the bytes.
    pub fn add_audio(&mut self, filename: impl Into<String>, data: Vec<u8>) -> OverlayId {
        let track = AudioTrack::new(filename, data, self.total_duration_ms);
        let id = track.id;
        self.audio.push(track);
        id
    }

    /// Apply a partial update to a text overlay. Returns false for unknown ids.
    pub fn update_text(&mut self, id: OverlayId, patch: TextPatch) -> bool {
        let total = self.total_duration_ms;
        let Some(overlay) = self.texts.iter_mut().find(|o| o.id == id) else {
            return false;
        };

        if let Some(start) = patch.start_ms {
            overlay.start_ms = start;
        }
        if let Some(end) = patch.end_ms {
            overlay.end_ms = end;
        }
        let start = overlay.start_ms.min(total);
        overlay.start_ms = start;
        overlay.end_ms = overlay.end_ms.clamp(start, total);

        if let Some(p) = patch.placement {
            overlay.placement = p;
        }
        if let Some(p) = patch.dual_placement {
            overlay.dual_placement = p;
        }
        if let Some(o) = patch.opacity {
            overlay.opacity = o.clamp(0.0, 1.0);
        }
        if let Some(v) = patch.visible {
            overlay.visible = v;
        }
        if let Some(t) = patch.text {
            overlay.text = t;
        }
        if let Some(s) = patch.font_size {
            overlay.font_size = s.max(1.0);
        }
        if let Some(f) = patch.font_family {
            overlay.font_family = f;
        }
        if let Some(c) = patch.color {
            overlay.color = c;
        }
        if let Some(c) = patch.background {
            overlay.background = c;
        }
        if let Some(b) = patch.bold {
            overlay.bold = b;
        }
        if let Some(i) = patch.italic {
            overlay.italic = i;
        }
        if let Some(u) = patch.underline {
            overlay.underline = u;
        }
        if let Some(a) = patch.align {
            overlay.align = a;
        }
        if let Some(ls) = patch.letter_spacing {
            overlay.letter_spacing = ls.max(0.0);
        }
        true
    }

    /// Apply a partial update to an image overlay. Returns false for unknown ids.
    pub fn update_image(&mut self, id: OverlayId, patch: ImagePatch) -> bool {
        let total = self.total_duration_ms;
        let Some(overlay) = self.images.iter_mut().find(|o| o.id == id) else {
            return false;
        };

        if let Some(start) = patch.start_ms {
            overlay.start_ms = start;
        }
        if let Some(end) = patch.end_ms {
            overlay.end_ms = end;
        }
        let start = overlay.start_ms.min(total);
        overlay.start_ms = start;
        overlay.end_ms = overlay.end_ms.clamp(start, total);

        if let Some(p) = patch.placement {
            overlay.placement = p;
        }
        if let Some(p) = patch.dual_placement {
            overlay.dual_placement = p;
        }
        if let Some(o) = patch.opacity {
            overlay.opacity = o.clamp(0.0, 1.0);
        }
        if let Some(v) = patch.visible {
            overlay.visible = v;
        }
        if let Some(w) = patch.width {
            overlay.width = w.max(0.0);
        }
        if let Some(h) = patch.height {
            overlay.height = h.max(0.0);
        }
        if let Some(r) = patch.rotation_degrees {
            overlay.rotation_degrees = r;
        }
        if let Some(s) = patch.scale {
            overlay.scale = s.max(0.0);
        }
        true
    }

    /// Apply a partial update to an audio track. Returns false for unknown ids.
    pub fn update_audio(&mut self, id: OverlayId, patch: AudioPatch) -> bool {
        let total = self.total_duration_ms;
        let Some(track) = self.audio.iter_mut().find(|t| t.id == id) else {
            return false;
        };

        if let Some(start) = patch.start_ms {
            track.start_ms = start;
        }
        if let Some(end) = patch.end_ms {
            track.end_ms = end;
        }
        let start = track.start_ms.min(total);
        track.start_ms = start;
        track.end_ms = track.end_ms.clamp(start, total);

        if let Some(v) = patch.volume {
            track.volume = AudioTrack::clamp_volume(v);
        }
        if let Some(v) = patch.visible {
            track.visible = v;
        }
        true
    }

    /// Delete an overlay or audio track, releasing its owned bytes.
    /// Clears the selection if it pointed at the deleted id.
    pub fn delete(&mut self, id: OverlayId) -> bool {
        let before = self.texts.len() + self.images.len() + self.audio.len();
        self.texts.retain(|o| o.id != id);
        self.images.retain(|o| o.id != id);
        self.audio.retain(|t| t.id != id);
        let removed = self.texts.len() + self.images.len() + self.audio.len() != before;

        if removed && self.selected == Some(id) {
            self.selected = None;
        }
        removed
    }

    pub fn select(&mut self, id: Option<OverlayId>) {
        self.selected = id;
    }

    pub fn selected(&self) -> Option<OverlayId> {
        self.selected
    }

    pub fn text(&self, id: OverlayId) -> Option<&TextOverlay> {
        self.texts.iter().find(|o| o.id == id)
    }

    pub fn image(&self, id: OverlayId) -> Option<&ImageOverlay> {
        self.images.iter().find(|o| o.id == id)
    }

    pub fn audio_track(&self, id: OverlayId) -> Option<&AudioTrack> {
        self.audio.iter().find(|t| t.id == id)
    }

    /// Overlays visible at `time_ms`: toggle on AND window contains the time.
    pub fn visible_at(&self, time_ms: u64) -> (Vec<&TextOverlay>, Vec<&ImageOverlay>) {
        (
            self.texts.iter().filter(|o| o.visible_at(time_ms)).collect(),
            self.images
                .iter()
                .filter(|o| o.visible_at(time_ms))
                .collect(),
        )
    }

    /// Overlays with the toggle on, ignoring time windows. Used by the export
    /// path to enumerate everything that could ever appear.
    pub fn all_visible(&self) -> (Vec<&TextOverlay>, Vec<&ImageOverlay>) {
        (
            self.texts.iter().filter(|o| o.visible).collect(),
            self.images.iter().filter(|o| o.visible).collect(),
        )
    }

    /// Shallow-copy everything an export job needs. Image/audio bytes are
    /// shared via `Arc`, not duplicated.
    pub fn snapshot(&self) -> (Vec<TextOverlay>, Vec<ImageOverlay>, Vec<AudioTrack>) {
        (
            self.texts.iter().filter(|o| o.visible).cloned().collect(),
            self.images.iter().filter(|o| o.visible).cloned().collect(),
            self.audio.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_text_clamps_to_duration() {
        let mut store = OverlayStore::new(10_000);
        let id = store.add_text(8_000, 5_000);
        let overlay = store.text(id).unwrap();
        assert_eq!(overlay.start_ms, 8_000);
        assert_eq!(overlay.end_ms, 10_000);
        assert!(overlay.is_persistent(10_000) == false);
    }

    #[test]
    fn test_update_never_inverts_window() {
        // P3: end < start clamps to a valid window
        let mut store = OverlayStore::new(10_000);
        let id = store.add_text(2_000, 3_000);
        store.update_text(
            id,
            TextPatch {
                start_ms: Some(6_000),
                end_ms: Some(1_000),
                ..Default::default()
            },
        );
        let overlay = store.text(id).unwrap();
        assert!(overlay.start_ms <= overlay.end_ms);
        assert_eq!(overlay.start_ms, 6_000);
        assert_eq!(overlay.end_ms, 6_000);
    }

    #[test]
    fn test_update_clamps_past_duration() {
        let mut store = OverlayStore::new(10_000);
        let id = store.add_text(0, 1_000);
        store.update_text(
            id,
            TextPatch {
                start_ms: Some(50_000),
                end_ms: Some(60_000),
                ..Default::default()
            },
        );
        let overlay = store.text(id).unwrap();
        assert_eq!(overlay.start_ms, 10_000);
        assert_eq!(overlay.end_ms, 10_000);
    }

    #[test]
    fn test_delete_clears_selection() {
        let mut store = OverlayStore::new(10_000);
        let id = store.add_text(0, 1_000);
        store.select(Some(id));
        assert_eq!(store.selected(), Some(id));
        assert!(store.delete(id));
        assert_eq!(store.selected(), None);
        assert!(!store.delete(id));
    }

    #[test]
    fn test_delete_other_keeps_selection() {
        let mut store = OverlayStore::new(10_000);
        let keep = store.add_text(0, 1_000);
        let drop_id = store.add_image("logo.png", vec![1, 2, 3], 0, 1_000);
        store.select(Some(keep));
        store.delete(drop_id);
        assert_eq!(store.selected(), Some(keep));
    }

    #[test]
    fn test_insertion_order_is_z_order() {
        let mut store = OverlayStore::new(10_000);
        let a = store.add_text(0, 10_000);
        let b = store.add_image("a.png", vec![], 0, 10_000);
        let c = store.add_text(0, 10_000);
        assert!(store.text(a).unwrap().z < store.image(b).unwrap().z);
        assert!(store.image(b).unwrap().z < store.text(c).unwrap().z);
    }

    #[test]
    fn test_visible_at_respects_toggle_and_window() {
        let mut store = OverlayStore::new(10_000);
        let shown = store.add_text(0, 5_000);
        let hidden = store.add_text(0, 5_000);
        store.update_text(
            hidden,
            TextPatch {
                visible: Some(false),
                ..Default::default()
            },
        );

        let (texts, images) = store.visible_at(2_500);
        assert_eq!(texts.len(), 1);
        assert_eq!(texts[0].id, shown);
        assert!(images.is_empty());

        let (texts, _) = store.visible_at(7_000);
        assert!(texts.is_empty());

        // all_visible ignores the window but not the toggle
        let (texts, _) = store.all_visible();
        assert_eq!(texts.len(), 1);
    }

    #[test]
    fn test_audio_volume_clamped() {
        let mut store = OverlayStore::new(10_000);
        let id = store.add_audio("music.mp3", vec![0u8; 16]);
        store.update_audio(
            id,
            AudioPatch {
                volume: Some(9.0),
                ..Default::default()
            },
        );
        assert_eq!(store.audio_track(id).unwrap().volume, 2.0);
    }

    #[test]
    fn test_snapshot_shares_image_bytes() {
        let mut store = OverlayStore::new(10_000);
        store.add_image("logo.png", vec![7u8; 1024], 0, 10_000);
        let (_, images, _) = store.snapshot();
        let original = store.all_visible().1[0].data.clone();
        assert!(Arc::ptr_eq(&images[0].data, &original));
    }
}
