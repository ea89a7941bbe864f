//! Frame-rate reporting

use std::time::{Duration, Instant};

/// One reporting window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    pub fps: f32,
    /// Longest single frame in the window, in milliseconds
    pub max_frame_ms: f32,
}

/// Counts frames and tracks the worst frame time, reporting once per interval
pub struct FrameMetrics {
    interval: Duration,
    last_frame: Instant,
    accumulated: Duration,
    frame_count: u32,
    max_frame: Duration,
}

impl Default for FrameMetrics {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl FrameMetrics {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_frame: Instant::now(),
            accumulated: Duration::ZERO,
            frame_count: 0,
            max_frame: Duration::ZERO,
        }
    }

    /// Mark the end of a frame; returns the elapsed time since the previous one
    /// and logs a report whenever an interval completes
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let delta = now - self.last_frame;
        self.last_frame = now;
        if let Some(report) = self.record(delta) {
            log::info!("{:.1} fps, max frame {:.2} ms", report.fps, report.max_frame_ms);
        }
        delta
    }

    /// Add one frame of the given duration
    pub fn record(&mut self, delta: Duration) -> Option<FrameReport> {
        self.frame_count += 1;
        self.accumulated += delta;
        self.max_frame = self.max_frame.max(delta);

        if self.accumulated < self.interval {
            return None;
        }

        let report = FrameReport {
            fps: self.frame_count as f32 / self.accumulated.as_secs_f32(),
            max_frame_ms: self.max_frame.as_secs_f32() * 1000.0,
        };
        self.accumulated = Duration::ZERO;
        self.frame_count = 0;
        self.max_frame = Duration::ZERO;
        Some(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reports_once_per_interval() {
        let mut metrics = FrameMetrics::default();
        for _ in 0..59 {
            assert!(metrics.record(Duration::from_millis(16)).is_none());
        }
        let report = metrics.record(Duration::from_millis(60)).unwrap();
        assert!((report.max_frame_ms - 60.0).abs() < 1e-3);
        assert!((report.fps - 60.0 / 1.004).abs() < 1e-3, "{}", report.fps);
    }

    #[test]
    fn test_window_resets_after_report() {
        let mut metrics = FrameMetrics::new(Duration::from_millis(100));
        metrics.record(Duration::from_millis(150)).unwrap();
        let report = metrics.record(Duration::from_millis(100)).unwrap();
        assert!((report.max_frame_ms - 100.0).abs() < 1e-3);
        assert!((report.fps - 10.0).abs() < 1e-3);
    }
}
