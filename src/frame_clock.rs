use crate::atlas::VatMeta;
use serde::Deserialize;

/// Normalized animation progress in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Progress(f32);

impl Progress {
    pub const START: Progress = Progress(0.0);
    pub const END: Progress = Progress(1.0);

    pub fn new(value: f32) -> Self {
        if value.is_nan() {
            return Self::START;
        }
        Self(value.clamp(0.0, 1.0))
    }

    pub fn value(self) -> f32 {
        self.0
    }

    /// Raw continuous frame index, clamped so interpolation never reads past
    /// the last frame.
    pub fn frame_index(self, frame_count: u32) -> f32 {
        let last = frame_count.saturating_sub(1) as f32;
        (self.0 * frame_count as f32).clamp(0.0, last)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PlaybackMode {
    #[default]
    Automatic,
    Manual { ratio: f32 },
}

pub const DEFAULT_HEADROOM_FRAMES: f32 = 1.0;

/// Maps elapsed time (automatic) or a ratio (manual) to progress.
pub fn next_frame(mode: PlaybackMode, elapsed: f32, meta: &VatMeta, speed: f32, headroom_frames: f32) -> Progress {
    let frames = meta.frame_count as f32;
    match mode {
        PlaybackMode::Manual { ratio } => {
            let headroom = headroom_frames.max(1.0);
            let ceiling = (frames - headroom).max(0.0) / frames;
            Progress::new(ratio.clamp(0.0, 1.0).min(ceiling))
        }
        PlaybackMode::Automatic => {
            // rem_euclid may round up to `frames` itself.
            let raw = (elapsed * meta.fps * speed).rem_euclid(frames);
            Progress::new(if raw >= frames { 0.0 } else { raw / frames })
        }
    }
}

/// Single-mesh playback state.
#[derive(Debug, Clone)]
pub struct FrameClock {
    mode: PlaybackMode,
    speed: f32,
    paused: bool,
    headroom_frames: f32,
    elapsed: f32,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new(PlaybackMode::Automatic, 1.0)
    }
}

impl FrameClock {
    pub fn new(mode: PlaybackMode, speed: f32) -> Self {
        Self { mode, speed, paused: false, headroom_frames: DEFAULT_HEADROOM_FRAMES, elapsed: 0.0 }
    }

    pub fn with_headroom(mut self, frames: f32) -> Self {
        self.headroom_frames = frames.max(1.0);
        self
    }

    pub fn advance(&mut self, delta_seconds: f32) {
        if !self.paused && delta_seconds.is_finite() && delta_seconds > 0.0 {
            self.elapsed += delta_seconds;
        }
    }

    pub fn progress(&self, meta: &VatMeta) -> Progress {
        next_frame(self.mode, self.elapsed, meta, self.speed, self.headroom_frames)
    }

    pub fn set_mode(&mut self, mode: PlaybackMode) {
        self.mode = mode;
    }

    pub fn mode(&self) -> PlaybackMode {
        self.mode
    }

    pub fn set_speed(&mut self, speed: f32) {
        self.speed = speed;
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn paused(&self) -> bool {
        self.paused
    }

    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    pub fn reset(&mut self) {
        self.elapsed = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(frame_count: u32, fps: f32) -> VatMeta {
        VatMeta {
            vertex_count: 1,
            frame_count,
            fps,
            tex_width: frame_count,
            tex_height: 1,
            columns: 1,
            frame_stride: frame_count,
            store_delta: false,
            normals_compressed: false,
        }
    }

    #[test]
    fn progress_maps_to_clamped_frame_index() {
        assert_eq!(Progress::new(0.5).frame_index(10), 5.0);
        assert_eq!(Progress::END.frame_index(10), 9.0);
        assert_eq!(Progress::new(2.0).frame_index(10), 9.0);
        assert_eq!(Progress::new(0.7).frame_index(1), 0.0);
    }

    #[test]
    fn manual_mode_reserves_headroom() {
        let meta = meta(20, 24.0);
        let p = next_frame(PlaybackMode::Manual { ratio: 1.0 }, 0.0, &meta, 1.0, 1.0);
        assert!((p.value() - 19.0 / 20.0).abs() < 1e-6);
        let p = next_frame(PlaybackMode::Manual { ratio: 1.0 }, 0.0, &meta, 1.0, 5.0);
        assert!((p.value() - 15.0 / 20.0).abs() < 1e-6);
        let p = next_frame(PlaybackMode::Manual { ratio: 0.25 }, 0.0, &meta, 1.0, 1.0);
        assert!((p.value() - 0.25).abs() < 1e-6);
    }

    #[test]
    fn paused_clock_holds_elapsed_time() {
        let mut clock = FrameClock::default();
        clock.advance(0.5);
        clock.set_paused(true);
        clock.advance(3.0);
        assert_eq!(clock.elapsed(), 0.5);
        clock.set_paused(false);
        clock.advance(0.25);
        assert_eq!(clock.elapsed(), 0.75);
    }

    #[test]
    fn negative_speed_plays_backwards_within_range() {
        let meta = meta(10, 10.0);
        let p = next_frame(PlaybackMode::Automatic, 0.25, &meta, -1.0, 1.0);
        assert!((p.value() - 0.75).abs() < 1e-5);
    }
}
