//! Frame timing for animation and periodic FPS reporting.

use std::time::{Duration, Instant};

/// Tracks total run time and reports an average frame rate once per interval.
#[derive(Debug)]
pub struct FrameTimer {
    start: Instant,
    window_start: Instant,
    frames_in_window: u32,
    report_interval: Duration,
}

impl FrameTimer {
    /// Create a timer that reports once per second.
    pub fn new() -> Self {
        Self::with_interval(Duration::from_secs(1))
    }

    /// Create a timer with a custom reporting interval.
    pub fn with_interval(report_interval: Duration) -> Self {
        let now = Instant::now();
        Self {
            start: now,
            window_start: now,
            frames_in_window: 0,
            report_interval,
        }
    }

    /// Seconds since the timer was created. Drives time-based animation.
    pub fn elapsed_secs(&self) -> f32 {
        self.start.elapsed().as_secs_f32()
    }

    /// Count one rendered frame.
    ///
    /// Returns the average frames per second when the reporting interval has
    /// elapsed, then starts a new window.
    pub fn frame(&mut self) -> Option<f32> {
        self.frame_at(Instant::now())
    }

    fn frame_at(&mut self, now: Instant) -> Option<f32> {
        self.frames_in_window += 1;
        let window = now.saturating_duration_since(self.window_start);
        if window < self.report_interval {
            return None;
        }

        let fps = self.frames_in_window as f32 / window.as_secs_f32();
        self.window_start = now;
        self.frames_in_window = 0;
        Some(fps)
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_report_inside_interval() {
        let mut timer = FrameTimer::with_interval(Duration::from_secs(60));
        let now = timer.window_start;
        assert!(timer.frame_at(now + Duration::from_millis(16)).is_none());
        assert!(timer.frame_at(now + Duration::from_millis(32)).is_none());
    }

    #[test]
    fn test_report_after_interval() {
        let mut timer = FrameTimer::with_interval(Duration::from_secs(1));
        let start = timer.window_start;
        for i in 1..60 {
            assert!(timer.frame_at(start + Duration::from_millis(i * 10)).is_none());
        }
        let fps = timer
            .frame_at(start + Duration::from_secs(2))
            .expect("interval elapsed");
        assert!((fps - 30.0).abs() < 0.01);
        assert_eq!(timer.frames_in_window, 0);
    }
}
