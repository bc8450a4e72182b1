//! Frame-rate sampling for the render loop.

use std::time::{Duration, Instant};

/// Counts presented frames and reports the rate once per sampling window.
#[derive(Debug)]
pub struct FrameTimer {
    window: Duration,
    window_start: Instant,
    frames: u32,
}

impl FrameTimer {
    /// Create a timer reporting once per `window`.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            window_start: Instant::now(),
            frames: 0,
        }
    }

    /// Record one frame at `now`.
    ///
    /// Returns the frames-per-second figure when the sampling window has
    /// elapsed, and starts a new window.
    pub fn tick_at(&mut self, now: Instant) -> Option<f64> {
        self.frames += 1;
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.window {
            return None;
        }

        let fps = f64::from(self.frames) / elapsed.as_secs_f64();
        self.frames = 0;
        self.window_start = now;
        Some(fps)
    }

    /// Record one frame now.
    pub fn tick(&mut self) -> Option<f64> {
        self.tick_at(Instant::now())
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}
