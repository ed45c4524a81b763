//! Audio track model.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::overlay::OverlayId;

/// Maximum track volume (2.0 = +6dB boost).
pub const MAX_AUDIO_VOLUME: f32 = 2.0;

/// An independent audio timeline entity, trimmed and mixed at export time
/// only. The source bytes are owned exclusively by the store.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AudioTrack {
    pub id: OverlayId,
    /// Original filename, kept for diagnostics and container sniffing.
    pub filename: String,
    /// Encoded audio bytes, shared only with export snapshots.
    #[serde(skip)]
    #[schemars(skip)]
    pub data: Arc<Vec<u8>>,
    /// Playback volume in 0..2; clamped on write.
    pub volume: f32,
    /// Mix-in window start, in output-relative milliseconds.
    pub start_ms: u64,
    /// Mix-in window end.
    pub end_ms: u64,
    /// Manual toggle; muted tracks are skipped at export.
    pub visible: bool,
}

impl AudioTrack {
    pub fn new(filename: impl Into<String>, data: Vec<u8>, duration_ms: u64) -> Self {
        Self {
            id: OverlayId::new(),
            filename: filename.into(),
            data: Arc::new(data),
            volume: 1.0,
            start_ms: 0,
            end_ms: duration_ms,
            visible: true,
        }
    }

    /// Clamp a requested volume into the allowed range.
    pub fn clamp_volume(volume: f32) -> f32 {
        volume.clamp(0.0, MAX_AUDIO_VOLUME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_clamp() {
        assert_eq!(AudioTrack::clamp_volume(-1.0), 0.0);
        assert_eq!(AudioTrack::clamp_volume(1.5), 1.5);
        assert_eq!(AudioTrack::clamp_volume(5.0), MAX_AUDIO_VOLUME);
    }
}
