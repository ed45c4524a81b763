//! Clip metadata and dual-video models.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Metadata identifying a source video asset. Immutable once fetched.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClipMetadata {
    /// Stable identifier of the clip in storage.
    pub clip_id: String,
    /// Full source duration in milliseconds.
    pub duration_ms: u64,
    /// Recording-relative start of the clip, in milliseconds.
    pub start_time_ms: u64,
    /// Recording-relative end of the clip, in milliseconds.
    pub end_time_ms: u64,
    /// Channel the clip was captured from, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub streamer_name: Option<String>,
    /// Upload filename, when the clip came from a local file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_filename: Option<String>,
    /// Object key in the storage backend.
    pub storage_key: String,
}

/// Pane arrangement when compositing the dual video with the primary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum DualLayout {
    /// Primary on top, secondary below (9:16 split output).
    #[default]
    Vertical,
    /// Primary left, secondary right.
    Horizontal,
}

/// Which audio streams survive into a dual-video export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum DualAudioSource {
    #[default]
    Primary,
    Secondary,
    Mix,
}

/// A secondary video composited alongside the primary clip.
///
/// Created when the user adds a secondary file (probed once to learn its
/// duration); the owned bytes are released when the clip is replaced or the
/// session ends.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DualVideoClip {
    /// Duration learned from a single decode at load time.
    pub duration_ms: u64,
    /// Original filename, kept for diagnostics.
    pub filename: String,
    /// Encoded container bytes, shared only with export snapshots.
    #[serde(skip)]
    #[schemars(skip)]
    pub data: Arc<Vec<u8>>,
    /// Offset of the secondary relative to the primary, in milliseconds.
    /// Positive means the secondary starts later; clamped to >= 0 on write.
    pub offset_ms: u64,
    /// Playback volume in 0..2.
    pub volume: f32,
    pub visible: bool,
}

impl DualVideoClip {
    pub fn new(filename: impl Into<String>, data: Vec<u8>, duration_ms: u64) -> Self {
        Self {
            duration_ms,
            filename: filename.into(),
            data: Arc::new(data),
            offset_ms: 0,
            volume: 1.0,
            visible: true,
        }
    }

    /// Update the offset from a signed drag delta, clamping at zero.
    pub fn set_offset(&mut self, offset_ms: i64) {
        self.offset_ms = offset_ms.max(0) as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dual_offset_clamps_negative() {
        let mut dual = DualVideoClip::new("cam.mp4", vec![], 30_000);
        dual.set_offset(-500);
        assert_eq!(dual.offset_ms, 0);
        dual.set_offset(2500);
        assert_eq!(dual.offset_ms, 2500);
    }

    #[test]
    fn test_clip_metadata_serde() {
        let meta = ClipMetadata {
            clip_id: "clip-123".into(),
            duration_ms: 30_000,
            start_time_ms: 0,
            end_time_ms: 30_000,
            streamer_name: Some("streamer".into()),
            original_filename: None,
            storage_key: "clips/clip-123.mp4".into(),
        };
        let json = serde_json::to_string(&meta).unwrap();
        assert!(json.contains("\"clip_id\":\"clip-123\""));
        assert!(!json.contains("original_filename"));
        let back: ClipMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back.duration_ms, 30_000);
    }
}
