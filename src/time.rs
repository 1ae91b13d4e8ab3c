use std::time::{Duration, Instant};

/// Monotonic frame clock feeding wall-clock deltas to the step loop.
pub struct Time {
    start: Instant,
    last: Instant,
    pub delta: Duration,
    frames: u64,
}

impl Default for Time {
    fn default() -> Self {
        Self::new()
    }
}

impl Time {
    pub fn new() -> Self {
        let now = Instant::now();
        Self { start: now, last: now, delta: Duration::ZERO, frames: 0 }
    }

    /// Samples the clock and returns the seconds since the previous tick.
    pub fn tick(&mut self) -> f32 {
        let now = Instant::now();
        self.delta = now - self.last;
        self.last = now;
        self.frames += 1;
        self.delta.as_secs_f32()
    }

    pub fn delta_seconds(&self) -> f32 {
        self.delta.as_secs_f32()
    }

    pub fn elapsed_seconds(&self) -> f32 {
        self.last.duration_since(self.start).as_secs_f32()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}
