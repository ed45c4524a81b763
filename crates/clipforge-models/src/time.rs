//! Time and frame conversions.
//!
//! The editor speaks milliseconds everywhere; FFmpeg wants seconds and the
//! overlay renderer wants output frame indices. All three views of the
//! timeline meet here.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Convert a millisecond position into an output frame index at `fps`.
pub fn frame_index(time_ms: u64, fps: u32) -> u64 {
    (time_ms as f64 / 1000.0 * fps as f64).floor() as u64
}

/// Convert an output frame index back into its millisecond position.
pub fn frame_time_ms(frame: u64, fps: u32) -> f64 {
    frame as f64 / fps as f64 * 1000.0
}

/// Convert milliseconds to seconds for FFmpeg `-ss`/`-t` arguments.
pub fn seconds(time_ms: u64) -> f64 {
    time_ms as f64 / 1000.0
}

/// The `[start, end]` sub-range of the source clip selected for export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TrimWindow {
    /// Start position in milliseconds
    pub start_ms: u64,
    /// End position in milliseconds
    pub end_ms: u64,
}

impl TrimWindow {
    /// Create a trim window. Start and end are swapped if given reversed.
    pub fn new(start_ms: u64, end_ms: u64) -> Self {
        if start_ms <= end_ms {
            Self { start_ms, end_ms }
        } else {
            Self {
                start_ms: end_ms,
                end_ms: start_ms,
            }
        }
    }

    /// Window length in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        self.end_ms - self.start_ms
    }

    /// Window length in seconds.
    pub fn duration_secs(&self) -> f64 {
        seconds(self.duration_ms())
    }

    /// Start position in seconds.
    pub fn start_secs(&self) -> f64 {
        seconds(self.start_ms)
    }

    /// Number of output frames this window produces at `fps`.
    pub fn total_frames(&self, fps: u32) -> u64 {
        (self.duration_ms() as f64 / 1000.0 * fps as f64).ceil() as u64
    }

    /// Whether a millisecond position (in source time) falls inside the window.
    pub fn contains(&self, time_ms: u64) -> bool {
        time_ms >= self.start_ms && time_ms < self.end_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_index_round_trip() {
        assert_eq!(frame_index(0, 30), 0);
        assert_eq!(frame_index(5000, 30), 150);
        assert_eq!(frame_index(999, 30), 29);
        assert_eq!(frame_index(1000, 30), 30);
        assert!((frame_time_ms(150, 30) - 5000.0).abs() < 0.001);
    }

    #[test]
    fn test_trim_window_frames() {
        let w = TrimWindow::new(0, 10_000);
        assert_eq!(w.total_frames(30), 300);
        assert_eq!(w.duration_ms(), 10_000);
        assert!((w.duration_secs() - 10.0).abs() < 0.001);

        // Partial trailing frame rounds up
        let w = TrimWindow::new(0, 10_050);
        assert_eq!(w.total_frames(30), 302);
    }

    #[test]
    fn test_trim_window_reversed() {
        let w = TrimWindow::new(8000, 2000);
        assert_eq!(w.start_ms, 2000);
        assert_eq!(w.end_ms, 8000);
    }

    #[test]
    fn test_contains_is_half_open() {
        let w = TrimWindow::new(1000, 2000);
        assert!(w.contains(1000));
        assert!(w.contains(1999));
        assert!(!w.contains(2000));
    }
}
