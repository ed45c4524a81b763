//! Export progress reporting.
//!
//! Two layers: [`FfmpegProgress`] is the raw `-progress pipe:2` state parsed
//! from the engine, [`ExportProgress`] is the phase-annotated percentage the
//! UI consumes. Both travel over unbounded channels; progress is a
//! notification stream, never a control channel.

use serde::{Deserialize, Serialize};

/// Phases of one export, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportPhase {
    /// Validating the job and loading the engine.
    Preparing,
    /// Rasterizing the overlay frame sequence.
    RenderingOverlays,
    /// Writing inputs into the engine's working storage.
    Staging,
    /// Running the transcode.
    Transcoding,
    /// Reading back the artifact and releasing staged files.
    Finalizing,
}

/// Approximate overall completion, for UI consumption only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExportProgress {
    pub phase: ExportPhase,
    /// Overall completion in 0..100.
    pub percent: f32,
}

impl ExportProgress {
    pub fn new(phase: ExportPhase, percent: f32) -> Self {
        Self {
            phase,
            percent: percent.clamp(0.0, 100.0),
        }
    }
}

/// Progress information parsed from FFmpeg's `-progress` output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FfmpegProgress {
    /// Current frame number
    pub frame: u64,
    /// Current encoding FPS
    pub fps: f64,
    /// Output time in milliseconds
    pub out_time_ms: i64,
    /// Encoding speed (e.g., 1.5 = 1.5x realtime)
    pub speed: f64,
    /// Whether encoding is complete
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Completion percentage given the expected output duration.
    pub fn percentage(&self, total_duration_ms: i64) -> f64 {
        if total_duration_ms <= 0 {
            return 0.0;
        }
        ((self.out_time_ms as f64 / total_duration_ms as f64) * 100.0).min(100.0)
    }
}

/// Fold one `key=value` line of `-progress` output into the running state.
/// Returns a snapshot whenever a `progress=` terminator completes a block.
pub fn parse_progress_line(line: &str, current: &mut FfmpegProgress) -> Option<FfmpegProgress> {
    let line = line.trim();

    if let Some((key, value)) = line.split_once('=') {
        match key {
            "out_time_ms" | "out_time_us" => {
                // Both keys report microseconds in modern FFmpeg builds.
                if let Ok(us) = value.parse::<i64>() {
                    current.out_time_ms = us / 1000;
                }
            }
            "frame" => {
                if let Ok(frame) = value.parse() {
                    current.frame = frame;
                }
            }
            "fps" => {
                if let Ok(fps) = value.parse() {
                    current.fps = fps;
                }
            }
            "speed" => {
                if value != "N/A" {
                    if let Some(speed_str) = value.strip_suffix('x') {
                        if let Ok(speed) = speed_str.parse() {
                            current.speed = speed;
                        }
                    }
                }
            }
            "progress" => {
                if value == "end" {
                    current.is_complete = true;
                }
                return Some(current.clone());
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_percentage() {
        let progress = FfmpegProgress {
            out_time_ms: 5000,
            ..Default::default()
        };

        assert!((progress.percentage(10000) - 50.0).abs() < 0.01);
        assert!((progress.percentage(5000) - 100.0).abs() < 0.01);
        assert_eq!(progress.percentage(0), 0.0);
    }

    #[test]
    fn test_parse_progress_block() {
        let mut progress = FfmpegProgress::default();

        assert!(parse_progress_line("frame=42", &mut progress).is_none());
        assert!(parse_progress_line("out_time_us=5000000", &mut progress).is_none());
        parse_progress_line("speed=1.5x", &mut progress);

        let snapshot = parse_progress_line("progress=continue", &mut progress).unwrap();
        assert_eq!(snapshot.frame, 42);
        assert_eq!(snapshot.out_time_ms, 5000);
        assert!((snapshot.speed - 1.5).abs() < 0.01);
        assert!(!snapshot.is_complete);

        let snapshot = parse_progress_line("progress=end", &mut progress).unwrap();
        assert!(snapshot.is_complete);
    }

    #[test]
    fn test_export_progress_clamps() {
        assert_eq!(ExportProgress::new(ExportPhase::Transcoding, 150.0).percent, 100.0);
        assert_eq!(ExportProgress::new(ExportPhase::Preparing, -3.0).percent, 0.0);
    }

    #[test]
    fn test_phase_ordering() {
        assert!(ExportPhase::Preparing < ExportPhase::RenderingOverlays);
        assert!(ExportPhase::RenderingOverlays < ExportPhase::Staging);
        assert!(ExportPhase::Staging < ExportPhase::Transcoding);
        assert!(ExportPhase::Transcoding < ExportPhase::Finalizing);
    }
}
