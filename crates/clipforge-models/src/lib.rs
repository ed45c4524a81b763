//! Shared data models for the ClipForge editor core.
//!
//! This crate provides Serde-serializable types for:
//! - Clip metadata and trim windows
//! - Text/image overlays and audio tracks
//! - The overlay state store (CRUD + time-windowed queries)
//! - Export settings and the per-export job snapshot
//! - Time/frame and normalized-coordinate conversions
//! - The overlay drag interaction state machine

pub mod audio;
pub mod clip;
pub mod export;
pub mod geometry;
pub mod gesture;
pub mod overlay;
pub mod store;
pub mod time;

// Re-export common types
pub use audio::AudioTrack;
pub use clip::{ClipMetadata, DualAudioSource, DualLayout, DualVideoClip};
pub use export::{
    AspectRatio, AspectTarget, BitrateMode, ConversionMode, ExportFormat, ExportJob,
    ExportSettings, Resolution,
};
pub use geometry::{overlay_scale_factor, Dimensions, NormalizedPos};
pub use gesture::DragGesture;
pub use overlay::{Color, ImageOverlay, OverlayId, Placement, TextAlign, TextOverlay};
pub use store::{AudioPatch, ImagePatch, OverlayStore, TextPatch};
pub use time::{frame_index, frame_time_ms, TrimWindow};
