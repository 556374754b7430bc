use crate::frame_compute::FrameComputeSeed;
use crate::instance_state::{TickParams, TriggerPolicy};
use crate::logging;
use crate::ping_pong::PingPong;
use std::sync::Arc;
use wgpu::util::DeviceExt;

const WORKGROUP_SIZE: u32 = 64;

/// Mirrors `TickParams` in `frame_compute.wgsl`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct TickUniform {
    pub delta_seconds: f32,
    pub speed: f32,
    pub peak: f32,
    pub manual: f32,
    pub hot_spot: [f32; 2],
    pub has_hot_spot: u32,
    pub policy: u32,
    pub radius: f32,
    pub feather: f32,
    pub decay: f32,
    pub release_on_wrap: u32,
    pub instance_count: u32,
    pub _pad: [u32; 3],
}

impl TickUniform {
    pub fn new(params: &TickParams, instance_count: u32) -> Self {
        let (policy, radius, feather, decay, release_on_wrap) = match params.policy {
            TriggerPolicy::Off => (0, 0.0, 0.0, 0.0, false),
            TriggerPolicy::Edge { radius, release_on_wrap } => (1, radius, 0.0, 0.0, release_on_wrap),
            TriggerPolicy::Level { radius, feather, decay_per_second } => {
                (2, radius, feather, decay_per_second, false)
            }
        };
        Self {
            delta_seconds: params.delta_seconds,
            speed: params.speed,
            peak: params.peak,
            manual: params.manual.map(|ratio| ratio.clamp(0.0, 1.0)).unwrap_or(-1.0),
            hot_spot: params.hot_spot.map(|hot| hot.to_array()).unwrap_or([-1.0, -1.0]),
            has_hot_spot: params.hot_spot.is_some() as u32,
            policy,
            radius,
            feather,
            decay,
            release_on_wrap: release_on_wrap as u32,
            instance_count,
            _pad: [0; 3],
        }
    }
}

struct StateSlot {
    buffer: wgpu::Buffer,
    /// Binds this slot as `previous` and the other as `next`.
    advance: wgpu::BindGroup,
    /// Vertex-stage view of this slot.
    sample: wgpu::BindGroup,
}

struct ComputeResources {
    pipeline: wgpu::ComputePipeline,
    uniform: wgpu::Buffer,
    durations: wgpu::Buffer,
    plane_uvs: wgpu::Buffer,
    states: PingPong<StateSlot>,
}

/// Per-instance state on the GPU, advanced once per frame by a compute pass.
pub struct GpuFrameCompute {
    resources: Option<ComputeResources>,
    instance_count: u32,
}

impl GpuFrameCompute {
    pub fn new(device: &wgpu::Device, state_bgl: &Arc<wgpu::BindGroupLayout>, seed: &FrameComputeSeed) -> Self {
        let instance_count = seed.count() as u32;
        if instance_count == 0 {
            return Self { resources: None, instance_count };
        }

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Frame Compute Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../../assets/shaders/frame_compute.wgsl").into()),
        });
        let storage = |binding: u32, read_only: bool| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let advance_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Frame Compute BGL"),
            entries: &[
                storage(0, true),
                storage(1, false),
                storage(2, true),
                storage(3, true),
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Frame Compute Layout"),
            bind_group_layouts: &[&advance_bgl],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Frame Compute Pipeline"),
            layout: Some(&layout),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });

        let initial = seed.initial_states();
        let state_buffer = |label: &str| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(&initial),
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            })
        };
        let buffers = [state_buffer("Instance State A"), state_buffer("Instance State B")];
        let durations = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Instance Durations"),
            contents: bytemuck::cast_slice(&seed.durations),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let plane_uvs: Vec<[f32; 2]> = seed.plane_uvs.iter().map(|uv| uv.to_array()).collect();
        let plane_uvs = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Instance Plane UVs"),
            contents: bytemuck::cast_slice(&plane_uvs),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let uniform = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Frame Compute Params"),
            size: std::mem::size_of::<TickUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let advance_group = |read: &wgpu::Buffer, write: &wgpu::Buffer| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Frame Compute BG"),
                layout: &advance_bgl,
                entries: &[
                    wgpu::BindGroupEntry { binding: 0, resource: read.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 1, resource: write.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 2, resource: durations.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 3, resource: plane_uvs.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 4, resource: uniform.as_entire_binding() },
                ],
            })
        };
        let sample_group = |buffer: &wgpu::Buffer| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Instance State BG"),
                layout: state_bgl,
                entries: &[wgpu::BindGroupEntry { binding: 0, resource: buffer.as_entire_binding() }],
            })
        };
        let advance_a = advance_group(&buffers[0], &buffers[1]);
        let advance_b = advance_group(&buffers[1], &buffers[0]);
        let sample_a = sample_group(&buffers[0]);
        let sample_b = sample_group(&buffers[1]);
        let [buffer_a, buffer_b] = buffers;
        let states = PingPong::new(
            StateSlot { buffer: buffer_a, advance: advance_a, sample: sample_a },
            StateSlot { buffer: buffer_b, advance: advance_b, sample: sample_b },
        );
        log::info!(target: logging::COMPUTE, "frame compute ready for {instance_count} instances");
        Self {
            resources: Some(ComputeResources {
                pipeline,
                uniform,
                durations,
                plane_uvs,
                states,
            }),
            instance_count,
        }
    }

    pub fn instance_count(&self) -> u32 {
        self.instance_count
    }

    pub fn completed_ticks(&self) -> u64 {
        self.resources.as_ref().map(|res| res.states.generation()).unwrap_or(0)
    }

    /// Records one tick into `encoder`. Draws recorded after this call in the
    /// same submission see the new states through [`Self::sample_bind_group`].
    pub fn encode_tick(&mut self, encoder: &mut wgpu::CommandEncoder, queue: &wgpu::Queue, params: &TickParams) {
        let Some(res) = self.resources.as_mut() else {
            return;
        };
        let uniform = TickUniform::new(params, self.instance_count);
        queue.write_buffer(&res.uniform, 0, bytemuck::bytes_of(&uniform));
        let pipeline = &res.pipeline;
        let groups = self.instance_count.div_ceil(WORKGROUP_SIZE);
        res.states.tick(|read, _write| {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Frame Compute Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &read.advance, &[]);
            pass.dispatch_workgroups(groups, 1, 1);
        });
    }

    pub fn sample_bind_group(&self) -> Option<&wgpu::BindGroup> {
        self.resources.as_ref().map(|res| &res.states.current().sample)
    }

    pub fn destroy(&mut self) {
        if let Some(res) = self.resources.take() {
            res.states.slot(0).buffer.destroy();
            res.states.slot(1).buffer.destroy();
            res.durations.destroy();
            res.plane_uvs.destroy();
            res.uniform.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;

    #[test]
    fn tick_uniform_matches_wgsl_layout() {
        assert_eq!(std::mem::size_of::<TickUniform>(), 64);
    }

    #[test]
    fn tick_uniform_encodes_missing_inputs_as_sentinels() {
        let uniform = TickUniform::new(&TickParams::default(), 8);
        assert_eq!(uniform.manual, -1.0);
        assert_eq!(uniform.has_hot_spot, 0);
        assert_eq!(uniform.policy, 0);
        assert_eq!(uniform.instance_count, 8);
    }

    #[test]
    fn tick_uniform_encodes_policies() {
        let edge = TickParams {
            hot_spot: Some(Vec2::new(0.25, 0.75)),
            policy: TriggerPolicy::Edge { radius: 0.1, release_on_wrap: true },
            manual: Some(1.5),
            ..TickParams::default()
        };
        let uniform = TickUniform::new(&edge, 1);
        assert_eq!((uniform.policy, uniform.release_on_wrap, uniform.radius), (1, 1, 0.1));
        assert_eq!(uniform.hot_spot, [0.25, 0.75]);
        assert_eq!(uniform.has_hot_spot, 1);
        assert_eq!(uniform.manual, 1.0);

        let level = TickParams {
            policy: TriggerPolicy::Level { radius: 0.2, feather: 0.05, decay_per_second: 0.5 },
            ..TickParams::default()
        };
        let uniform = TickUniform::new(&level, 1);
        assert_eq!((uniform.policy, uniform.feather, uniform.decay), (2, 0.05, 0.5));
    }
}
