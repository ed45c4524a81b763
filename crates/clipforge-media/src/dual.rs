//! Dual-video synchronization.
//!
//! The committed offset lives on [`DualVideoClip`]; this synchronizer is a
//! view over that one value. Preview resync decisions and the export-time
//! compositing offset both read it from here, so they can never diverge.

use clipforge_models::DualVideoClip;

/// Drift beyond this triggers a secondary reseek during preview playback.
/// Smaller corrections are ignored to avoid constant micro-seeks.
pub const RESYNC_TOLERANCE_MS: u64 = 100;

/// Keeps a secondary clip aligned with the primary by a millisecond offset.
#[derive(Debug, Clone, Copy, Default)]
pub struct DualVideoSync {
    offset_ms: u64,
}

impl DualVideoSync {
    pub fn new(offset_ms: u64) -> Self {
        Self { offset_ms }
    }

    /// The offset consumed at export time, identical to the committed value
    /// the preview used.
    pub fn export_offset_ms(&self) -> u64 {
        self.offset_ms
    }

    /// Where the secondary should be, given the primary position. Negative
    /// means the secondary has not started yet.
    pub fn expected_secondary_ms(&self, primary_ms: u64) -> i64 {
        primary_ms as i64 - self.offset_ms as i64
    }

    /// Whether the secondary's actual position has drifted far enough from
    /// the expected position to justify a reseek.
    pub fn needs_resync(&self, primary_ms: u64, actual_secondary_ms: i64) -> bool {
        let expected = self.expected_secondary_ms(primary_ms);
        expected.abs_diff(actual_secondary_ms) > RESYNC_TOLERANCE_MS
    }
}

impl From<&DualVideoClip> for DualVideoSync {
    fn from(clip: &DualVideoClip) -> Self {
        Self::new(clip.offset_ms)
    }
}
