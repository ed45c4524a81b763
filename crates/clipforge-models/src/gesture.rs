//! Overlay drag interaction state machine.
//!
//! One gesture per pointer interaction: `idle -> dragging -> committed`.
//! While dragging, the live position is preview-only and may be read at any
//! throttle the UI likes; the store is written exactly once, on commit, with
//! the final normalized coordinate.

use crate::geometry::{Dimensions, NormalizedPos};
use crate::overlay::OverlayId;
use crate::store::{ImagePatch, OverlayStore, TextPatch};

/// Current phase of a drag interaction.
#[derive(Debug, Clone, Copy, PartialEq)]
enum DragState {
    Idle,
    Dragging {
        overlay: OverlayId,
        live: NormalizedPos,
    },
}

/// Tracks one overlay drag from pointer-down to commit.
///
/// Positions are normalized against the editor container captured at
/// pointer-down, never against the intrinsic video resolution.
#[derive(Debug, Clone)]
pub struct DragGesture {
    container: Dimensions,
    state: DragState,
}

impl DragGesture {
    pub fn new(container: Dimensions) -> Self {
        Self {
            container,
            state: DragState::Idle,
        }
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging { .. })
    }

    /// Enter the dragging state at the given pointer position.
    pub fn begin(&mut self, overlay: OverlayId, pointer_x: f64, pointer_y: f64) {
        self.state = DragState::Dragging {
            overlay,
            live: NormalizedPos::from_pixels(pointer_x, pointer_y, self.container),
        };
    }

    /// Update the live preview position. No store write happens here.
    pub fn move_to(&mut self, pointer_x: f64, pointer_y: f64) {
        if let DragState::Dragging { live, .. } = &mut self.state {
            *live = NormalizedPos::from_pixels(pointer_x, pointer_y, self.container);
        }
    }

    /// The position the UI should render during the gesture, if one is active.
    pub fn live_position(&self) -> Option<NormalizedPos> {
        match self.state {
            DragState::Dragging { live, .. } => Some(live),
            DragState::Idle => None,
        }
    }

    /// Abandon the gesture without touching the store.
    pub fn cancel(&mut self) {
        self.state = DragState::Idle;
    }

    /// Commit the final position: one store write per gesture, then back to
    /// idle. Returns the committed position, or `None` if no drag was active
    /// or the overlay no longer exists.
    pub fn commit(&mut self, store: &mut OverlayStore) -> Option<NormalizedPos> {
        let DragState::Dragging { overlay, live } = self.state else {
            return None;
        };
        self.state = DragState::Idle;

        if let Some(text) = store.text(overlay) {
            let mut placement = text.placement;
            placement.pos = live;
            store.update_text(
                overlay,
                TextPatch {
                    placement: Some(placement),
                    ..Default::default()
                },
            );
            return Some(live);
        }

        if let Some(image) = store.image(overlay) {
            let mut placement = image.placement;
            placement.pos = live;
            store.update_image(
                overlay,
                ImagePatch {
                    placement: Some(placement),
                    ..Default::default()
                },
            );
            return Some(live);
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_writes_store_once() {
        let mut store = OverlayStore::new(10_000);
        let id = store.add_text(0, 5_000);

        let mut gesture = DragGesture::new(Dimensions::new(800, 450));
        gesture.begin(id, 80.0, 45.0);
        gesture.move_to(400.0, 225.0);
        gesture.move_to(200.0, 90.0);

        // Live preview moved, the store has not.
        let live = gesture.live_position().unwrap();
        assert!((live.x - 0.25).abs() < 1e-9);
        assert_ne!(store.text(id).unwrap().placement.pos, live);

        let committed = gesture.commit(&mut store).unwrap();
        assert_eq!(store.text(id).unwrap().placement.pos, committed);
        assert!(!gesture.is_dragging());

        // A second commit without a new gesture does nothing.
        assert!(gesture.commit(&mut store).is_none());
    }

    #[test]
    fn test_cancel_leaves_store_untouched() {
        let mut store = OverlayStore::new(10_000);
        let id = store.add_text(0, 5_000);
        let before = store.text(id).unwrap().placement.pos;

        let mut gesture = DragGesture::new(Dimensions::new(800, 450));
        gesture.begin(id, 600.0, 300.0);
        gesture.cancel();
        assert!(gesture.commit(&mut store).is_none());
        assert_eq!(store.text(id).unwrap().placement.pos, before);
    }

    #[test]
    fn test_commit_on_deleted_overlay_is_noop() {
        let mut store = OverlayStore::new(10_000);
        let id = store.add_image("logo.png", vec![1], 0, 5_000);

        let mut gesture = DragGesture::new(Dimensions::new(800, 450));
        gesture.begin(id, 100.0, 100.0);
        store.delete(id);
        assert!(gesture.commit(&mut store).is_none());
    }

    #[test]
    fn test_positions_clamp_to_container() {
        let mut gesture = DragGesture::new(Dimensions::new(800, 450));
        gesture.begin(OverlayId::new(), -50.0, 900.0);
        let live = gesture.live_position().unwrap();
        assert_eq!(live.x, 0.0);
        assert_eq!(live.y, 1.0);
    }
}
