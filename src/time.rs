use std::time::{Duration, Instant};

/// Frame timer. Deltas are capped so a stalled frame cannot fast-forward
/// every instance cycle at once.
pub struct Time {
    start: Instant,
    last: Instant,
    delta: Duration,
    max_delta: Duration,
}

impl Time {
    pub fn new() -> Self {
        let now = Instant::now();
        Self { start: now, last: now, delta: Duration::ZERO, max_delta: Duration::from_millis(100) }
    }

    pub fn tick(&mut self) {
        let now = Instant::now();
        self.delta = (now - self.last).min(self.max_delta);
        self.last = now;
    }

    pub fn delta_seconds(&self) -> f32 {
        self.delta.as_secs_f32()
    }

    pub fn elapsed_seconds(&self) -> f32 {
        self.last.duration_since(self.start).as_secs_f32()
    }
}

impl Default for Time {
    fn default() -> Self {
        Self::new()
    }
}
