use crate::error::{VatError, VatResult};
use crate::instance_state::{advance, InstanceState, StateDurations, TickParams};
use crate::ping_pong::PingPong;
use glam::Vec2;

pub const MAX_INSTANCES: usize = 1 << 16;

/// Shared construction input of the CPU and GPU compute backends.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameComputeSeed {
    pub initially_animated: bool,
    pub durations: Vec<StateDurations>,
    pub plane_uvs: Vec<Vec2>,
}

impl FrameComputeSeed {
    pub fn new(durations: Vec<StateDurations>, plane_uvs: Vec<Vec2>, initially_animated: bool) -> VatResult<Self> {
        if durations.len() != plane_uvs.len() {
            return Err(VatError::InstanceInputs { durations: durations.len(), plane_uvs: plane_uvs.len() });
        }
        if durations.len() > MAX_INSTANCES {
            return Err(VatError::InstanceCount { count: durations.len(), max: MAX_INSTANCES });
        }
        Ok(Self { initially_animated, durations, plane_uvs })
    }

    pub fn count(&self) -> usize {
        self.durations.len()
    }

    pub fn initial_states(&self) -> Vec<InstanceState> {
        vec![InstanceState::seeded(self.initially_animated); self.count()]
    }
}

/// Host-side double-buffered tick, bit-compatible with the GPU kernel.
#[derive(Debug, Clone)]
pub struct CpuFrameCompute {
    states: PingPong<Vec<InstanceState>>,
    durations: Vec<StateDurations>,
    plane_uvs: Vec<Vec2>,
}

impl CpuFrameCompute {
    pub fn new(seed: FrameComputeSeed) -> Self {
        let states = PingPong::filled(seed.initial_states());
        Self { states, durations: seed.durations, plane_uvs: seed.plane_uvs }
    }

    pub fn instance_count(&self) -> usize {
        self.durations.len()
    }

    pub fn current(&self) -> &[InstanceState] {
        self.states.current()
    }

    pub fn completed_ticks(&self) -> u64 {
        self.states.generation()
    }

    pub fn tick(&mut self, params: &TickParams) {
        if self.durations.is_empty() {
            return;
        }
        let durations = &self.durations;
        let plane_uvs = &self.plane_uvs;
        self.states.tick(|read, write| {
            for (i, (dst, src)) in write.iter_mut().zip(read.iter()).enumerate() {
                *dst = advance(*src, &durations[i], plane_uvs[i], params);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatched_inputs_are_rejected() {
        let err = FrameComputeSeed::new(vec![StateDurations::default(); 2], vec![Vec2::ZERO], false);
        assert!(err.is_err());
    }

    #[test]
    fn empty_compute_is_a_no_op() {
        let seed = FrameComputeSeed::new(Vec::new(), Vec::new(), false).expect("seed");
        let mut compute = CpuFrameCompute::new(seed);
        compute.tick(&TickParams { delta_seconds: 1.0, ..Default::default() });
        assert_eq!(compute.instance_count(), 0);
        assert!(compute.current().is_empty());
        assert_eq!(compute.completed_ticks(), 0);
    }
}
