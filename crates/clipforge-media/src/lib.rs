#![deny(unreachable_patterns)]
//! FFmpeg-backed export pipeline for ClipForge.
//!
//! This crate provides:
//! - A transcoding-engine abstraction with a process-wide serialized handle
//! - Type-safe multi-input FFmpeg command building
//! - Progress parsing from `-progress pipe:2`
//! - Clip transform planning (aspect filters, bitrate resolution)
//! - Deduplicated overlay frame rendering behind an async worker boundary
//! - Dual-video synchronization
//! - The export orchestrator tying it all together

pub mod command;
pub mod dual;
pub mod engine;
pub mod error;
pub mod export;
pub mod filters;
pub mod overlay;
pub mod probe;
pub mod progress;

pub use command::{FfmpegCommand, InputSpec};
pub use dual::{DualVideoSync, RESYNC_TOLERANCE_MS};
pub use engine::{EngineHandle, FfmpegCliEngine, TranscodeEngine};
pub use error::{MediaError, MediaResult};
pub use export::{export_clip, ProgressSender};
pub use filters::{plan_aspect_filter, resolve_bitrate_kbps};
pub use overlay::{
    render_overlay_frames, render_overlay_frames_async, OverlayRenderSpec, RasterConfig,
    RenderedOverlays,
};
pub use probe::{load_dual_video, probe_media, SourceInfo};
pub use progress::{ExportPhase, ExportProgress, FfmpegProgress};
