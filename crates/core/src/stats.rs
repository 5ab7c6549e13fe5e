//! Frame-rate bookkeeping for the render loop.

use std::time::{Duration, Instant};

/// Frames presented over one reporting window.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FpsReport {
    pub frames: u32,
    pub elapsed: Duration,
    pub fps: f32,
}

/// Counts presented frames and yields an [`FpsReport`] once per interval.
#[derive(Debug)]
pub struct FrameStats {
    interval: Duration,
    window_start: Instant,
    frames_in_window: u32,
    total_frames: u64,
}

impl FrameStats {
    /// Default reporting interval.
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);

    pub fn new(interval: Duration) -> Self {
        Self::starting_at(interval, Instant::now())
    }

    /// Creates the counter with an explicit start instant.
    pub fn starting_at(interval: Duration, start: Instant) -> Self {
        Self {
            interval,
            window_start: start,
            frames_in_window: 0,
            total_frames: 0,
        }
    }

    /// Records one presented frame at the current instant.
    pub fn record_frame(&mut self) -> Option<FpsReport> {
        self.record_frame_at(Instant::now())
    }

    /// Records one presented frame at `now`.
    ///
    /// Returns a report and starts a new window when at least one interval
    /// has passed since the window began.
    pub fn record_frame_at(&mut self, now: Instant) -> Option<FpsReport> {
        self.frames_in_window += 1;
        self.total_frames += 1;

        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.interval {
            return None;
        }

        let report = FpsReport {
            frames: self.frames_in_window,
            elapsed,
            fps: self.frames_in_window as f32 / elapsed.as_secs_f32(),
        };

        self.window_start = now;
        self.frames_in_window = 0;
        Some(report)
    }

    /// Frames recorded since creation.
    #[inline]
    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }
}

impl Default for FrameStats {
    fn default() -> Self {
        Self::new(Self::DEFAULT_INTERVAL)
    }
}
