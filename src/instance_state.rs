//! Per-instance animation state machine.
//!
//! [`advance`] is the reference transition; `assets/shaders/frame_compute.wgsl`
//! runs the same steps on the GPU. Both read the previous state, the
//! instance's immutable duration profile and plane UV, and the shared hot spot.

use bytemuck::{Pod, Zeroable};
use glam::Vec2;
use rand::Rng;
use serde::Deserialize;

/// One vec4 of GPU state: normalized frame progress, activation, a reserved
/// channel and the position within the instance cycle.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct InstanceState {
    pub frame: f32,
    pub animated: f32,
    pub reserved: f32,
    pub cycle: f32,
}

impl InstanceState {
    pub fn seeded(initially_animated: bool) -> Self {
        Self { frame: 0.0, animated: if initially_animated { 1.0 } else { 0.0 }, reserved: 0.0, cycle: 0.0 }
    }

    pub fn is_animated(&self) -> bool {
        self.animated > 0.0
    }

    pub fn is_finite(&self) -> bool {
        self.frame.is_finite() && self.animated.is_finite() && self.reserved.is_finite() && self.cycle.is_finite()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Rest,
    Rise,
    Hold,
    Fall,
}

/// Seconds spent in each lifecycle phase: idle at rest, rise, idle at peak, fall.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct StateDurations {
    pub rest: f32,
    pub rise: f32,
    pub hold: f32,
    pub fall: f32,
}

impl StateDurations {
    pub fn new(rest: f32, rise: f32, hold: f32, fall: f32) -> Self {
        Self { rest: rest.max(0.0), rise: rise.max(0.0), hold: hold.max(0.0), fall: fall.max(0.0) }
    }

    pub fn total(&self) -> f32 {
        self.rest + self.rise + self.hold + self.fall
    }

    /// Phase and the fraction already spent in it for a cycle position.
    pub fn phase_at(&self, cycle: f32) -> (Phase, f32) {
        let total = self.total();
        if total <= 0.0 {
            return (Phase::Rest, 0.0);
        }
        let mut t = cycle.clamp(0.0, 1.0) * total;
        for (phase, span) in
            [(Phase::Rest, self.rest), (Phase::Rise, self.rise), (Phase::Hold, self.hold), (Phase::Fall, self.fall)]
        {
            if t < span {
                return (phase, t / span);
            }
            t -= span;
        }
        if self.fall > 0.0 {
            (Phase::Fall, 1.0)
        } else {
            (Phase::Rest, 0.0)
        }
    }

    pub fn frame_at(&self, cycle: f32, peak: f32) -> f32 {
        match self.phase_at(cycle) {
            (Phase::Rest, _) => 0.0,
            (Phase::Rise, f) => peak * f,
            (Phase::Hold, _) => peak,
            (Phase::Fall, f) => peak * (1.0 - f),
        }
    }
}

/// Fixed value or uniform range, written as `3.0` or `{ "min": 3, "max": 5 }`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(from = "DurationRangeRepr")]
pub struct DurationRange {
    pub min: f32,
    pub max: f32,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DurationRangeRepr {
    Fixed(f32),
    Range { min: f32, max: f32 },
}

impl From<DurationRangeRepr> for DurationRange {
    fn from(repr: DurationRangeRepr) -> Self {
        match repr {
            DurationRangeRepr::Fixed(value) => DurationRange::fixed(value),
            DurationRangeRepr::Range { min, max } => DurationRange::new(min, max),
        }
    }
}

impl DurationRange {
    pub fn new(a: f32, b: f32) -> Self {
        Self { min: a.min(b), max: a.max(b) }
    }

    pub const fn fixed(value: f32) -> Self {
        Self { min: value, max: value }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f32 {
        let unit: f32 = rng.gen();
        (self.min + unit * (self.max - self.min)).max(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct StateDurationRanges {
    #[serde(default = "StateDurationRanges::default_rest")]
    pub state0: DurationRange,
    #[serde(default = "StateDurationRanges::default_rise")]
    pub state1: DurationRange,
    #[serde(default = "StateDurationRanges::default_hold")]
    pub state2: DurationRange,
    #[serde(default = "StateDurationRanges::default_fall")]
    pub state3: DurationRange,
}

impl StateDurationRanges {
    fn default_rest() -> DurationRange {
        DurationRange::fixed(0.0)
    }

    fn default_rise() -> DurationRange {
        DurationRange::new(3.0, 5.0)
    }

    fn default_hold() -> DurationRange {
        DurationRange::fixed(3.0)
    }

    fn default_fall() -> DurationRange {
        DurationRange::new(4.0, 5.0)
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> StateDurations {
        StateDurations::new(
            self.state0.sample(rng),
            self.state1.sample(rng),
            self.state2.sample(rng),
            self.state3.sample(rng),
        )
    }

    /// One profile per instance, drawn in instance order from `rng`.
    pub fn generate<R: Rng + ?Sized>(&self, count: usize, rng: &mut R) -> Vec<StateDurations> {
        (0..count).map(|_| self.sample(rng)).collect()
    }
}

impl Default for StateDurationRanges {
    fn default() -> Self {
        Self {
            state0: Self::default_rest(),
            state1: Self::default_rise(),
            state2: Self::default_hold(),
            state3: Self::default_fall(),
        }
    }
}

/// How the hot spot activates instances.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TriggerPolicy {
    Off,
    /// Latch on entering `radius`, optionally returning to rest after one cycle.
    Edge {
        #[serde(default = "TriggerPolicy::default_radius")]
        radius: f32,
        #[serde(default = "TriggerPolicy::default_release")]
        release_on_wrap: bool,
    },
    /// Activation follows distance, with a soft edge and a decay once the
    /// hot spot moves away.
    Level {
        #[serde(default = "TriggerPolicy::default_radius")]
        radius: f32,
        #[serde(default = "TriggerPolicy::default_feather")]
        feather: f32,
        #[serde(default = "TriggerPolicy::default_decay")]
        decay_per_second: f32,
    },
}

impl Default for TriggerPolicy {
    fn default() -> Self {
        TriggerPolicy::Edge { radius: Self::default_radius(), release_on_wrap: Self::default_release() }
    }
}

impl TriggerPolicy {
    const fn default_radius() -> f32 {
        0.05
    }

    const fn default_feather() -> f32 {
        0.025
    }

    const fn default_decay() -> f32 {
        0.5
    }

    const fn default_release() -> bool {
        true
    }

    /// Activation strength in `[0, 1]` for an instance at `plane_uv`.
    pub fn strength(&self, plane_uv: Vec2, hot_spot: Option<Vec2>) -> f32 {
        let Some(hot) = hot_spot else {
            return 0.0;
        };
        let distance = plane_uv.distance(hot);
        match *self {
            TriggerPolicy::Off => 0.0,
            TriggerPolicy::Edge { radius, .. } => {
                if distance <= radius {
                    1.0
                } else {
                    0.0
                }
            }
            TriggerPolicy::Level { radius, feather, .. } => falloff(distance, radius, feather),
        }
    }
}

pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// 1 inside `radius`, easing to 0 across `feather`; a hard edge when
/// `feather` is zero.
pub fn falloff(distance: f32, radius: f32, feather: f32) -> f32 {
    if feather <= 0.0 {
        return if distance <= radius { 1.0 } else { 0.0 };
    }
    1.0 - smoothstep(radius, radius + feather, distance)
}

/// Shared inputs of one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickParams {
    pub delta_seconds: f32,
    pub speed: f32,
    /// Progress reached at the top of the rise phase.
    pub peak: f32,
    /// Forces every instance to this progress ratio when set.
    pub manual: Option<f32>,
    pub hot_spot: Option<Vec2>,
    pub policy: TriggerPolicy,
}

impl Default for TickParams {
    fn default() -> Self {
        Self {
            delta_seconds: 0.0,
            speed: 1.0,
            peak: 1.0,
            manual: None,
            hot_spot: None,
            policy: TriggerPolicy::Off,
        }
    }
}

pub fn advance(prev: InstanceState, durations: &StateDurations, plane_uv: Vec2, params: &TickParams) -> InstanceState {
    let mut next = prev;
    next.reserved = 0.0;
    let peak = params.peak.clamp(0.0, 1.0);

    if let Some(ratio) = params.manual {
        next.frame = ratio.clamp(0.0, 1.0) * peak;
        return next;
    }

    let strength = params.policy.strength(plane_uv, params.hot_spot);
    match params.policy {
        TriggerPolicy::Off => {}
        TriggerPolicy::Edge { .. } => {
            if strength > 0.0 && prev.animated <= 0.0 {
                next.animated = 1.0;
                next.cycle = 0.0;
            }
        }
        TriggerPolicy::Level { decay_per_second, .. } => {
            next.animated = if strength >= prev.animated {
                strength
            } else {
                (prev.animated - decay_per_second.max(0.0) * params.delta_seconds).max(strength)
            };
        }
    }

    let total = durations.total();
    let rate = next.animated;
    if rate <= 0.0 || total <= 0.0 {
        return next;
    }

    let mut cycle = next.cycle + params.delta_seconds.max(0.0) * params.speed * rate / total;
    if cycle >= 1.0 {
        cycle = cycle.fract();
        if let TriggerPolicy::Edge { release_on_wrap: true, .. } = params.policy {
            next.animated = 0.0;
            next.cycle = 0.0;
            next.frame = 0.0;
            return next;
        }
    } else if cycle < 0.0 {
        cycle = cycle.rem_euclid(1.0);
    }
    next.cycle = cycle;
    next.frame = durations.frame_at(cycle, peak);
    next
}
