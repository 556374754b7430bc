use glam::Vec2;
use kestrel_vat::frame_compute::{CpuFrameCompute, FrameComputeSeed};
use kestrel_vat::instance_state::{advance, InstanceState, StateDurations, TickParams, TriggerPolicy};

const TOLERANCE: f32 = 1e-3;

fn running_compute(durations: Vec<StateDurations>, initially_animated: bool) -> CpuFrameCompute {
    let uvs = vec![Vec2::splat(0.5); durations.len()];
    CpuFrameCompute::new(FrameComputeSeed::new(durations, uvs, initially_animated).expect("seed"))
}

fn step(dt: f32) -> TickParams {
    TickParams { delta_seconds: dt, policy: TriggerPolicy::Off, ..Default::default() }
}

#[test]
fn animated_instance_follows_its_lifecycle() {
    let mut compute = running_compute(vec![StateDurations::new(1.0, 2.0, 1.0, 2.0)], true);
    let checkpoints = [(0.5, 0.0), (2.0, 0.5), (3.5, 1.0), (5.0, 0.5), (6.0, 0.0)];
    let mut elapsed = 0.0;
    for (at, expected) in checkpoints {
        while elapsed < at - 1e-6 {
            compute.tick(&step(0.5));
            elapsed += 0.5;
        }
        let frame = compute.current()[0].frame;
        assert!((frame - expected).abs() < TOLERANCE, "t={at}: frame {frame}, expected {expected}");
    }
    assert_eq!(compute.completed_ticks(), 12);
}

#[test]
fn idle_instances_hold_their_frame() {
    let mut compute = running_compute(vec![StateDurations::new(1.0, 2.0, 1.0, 2.0); 3], false);
    for _ in 0..20 {
        compute.tick(&step(0.25));
    }
    for state in compute.current() {
        assert_eq!(*state, InstanceState::seeded(false));
    }
}

#[test]
fn empty_and_single_instance_fields() {
    let mut empty = running_compute(Vec::new(), true);
    empty.tick(&step(1.0));
    assert_eq!(empty.instance_count(), 0);

    let mut single = running_compute(vec![StateDurations::new(0.0, 1.0, 0.0, 1.0)], true);
    single.tick(&step(0.5));
    assert_eq!(single.instance_count(), 1);
    assert!((single.current()[0].frame - 0.5).abs() < TOLERANCE);
}

#[test]
fn edge_trigger_latches_one_cycle_then_releases() {
    let durations = StateDurations::new(0.0, 1.0, 0.0, 1.0);
    let policy = TriggerPolicy::Edge { radius: 0.1, release_on_wrap: true };
    let near = Vec2::new(0.52, 0.5);
    let hovered = TickParams { delta_seconds: 0.5, hot_spot: Some(Vec2::splat(0.5)), policy, ..Default::default() };

    let started = advance(InstanceState::seeded(false), &durations, near, &hovered);
    assert!(started.is_animated());
    assert!((started.frame - 0.5).abs() < TOLERANCE);

    // keeps running after the pointer leaves
    let away = TickParams { hot_spot: None, ..hovered };
    let peaked = advance(started, &durations, near, &away);
    assert!(peaked.is_animated());
    assert!((peaked.frame - 1.0).abs() < TOLERANCE);

    let mut state = peaked;
    for _ in 0..4 {
        state = advance(state, &durations, near, &away);
    }
    assert_eq!(state, InstanceState::seeded(false));

    let far = Vec2::new(0.9, 0.9);
    assert!(!advance(InstanceState::seeded(false), &durations, far, &hovered).is_animated());
}

#[test]
fn manual_ratio_overrides_every_instance() {
    let durations = StateDurations::new(1.0, 1.0, 1.0, 1.0);
    let params = TickParams { delta_seconds: 3.0, manual: Some(0.4), peak: 0.5, ..Default::default() };
    let next = advance(InstanceState::seeded(false), &durations, Vec2::ZERO, &params);
    assert!((next.frame - 0.2).abs() < 1e-6);
    assert!(!next.is_animated());
}
