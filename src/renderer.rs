mod compute_pass;
mod plane_pass;
mod vat_pass;
mod window_surface;

pub use compute_pass::{GpuFrameCompute, TickUniform};
pub use plane_pass::PlanePass;
pub use vat_pass::{GpuSurfaceFactory, VatPass, VatSurfaceGpu, VatUniform};
pub use window_surface::{SurfaceFrame, WindowSurface};

use crate::camera::ViewCamera;
use glam::Vec3;
use std::sync::Arc;
use winit::dpi::PhysicalSize;

pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
pub const CLEAR_COLOR: wgpu::Color = wgpu::Color { r: 0.05, g: 0.06, b: 0.07, a: 1.0 };

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FrameUniform {
    pub view_proj: [[f32; 4]; 4],
    pub camera_pos: [f32; 4],
    pub light_dir: [f32; 4],
    pub light_color: [f32; 4],
    /// rgb ambient, w = seconds since start
    pub ambient: [f32; 4],
}

impl FrameUniform {
    pub fn new(camera: &ViewCamera, viewport: PhysicalSize<u32>, elapsed_seconds: f32) -> Self {
        let light_dir = Vec3::new(-0.4, -1.0, -0.3).normalize();
        Self {
            view_proj: camera.view_projection(viewport).to_cols_array_2d(),
            camera_pos: camera.eye.extend(1.0).to_array(),
            light_dir: light_dir.extend(0.0).to_array(),
            light_color: [1.0, 0.97, 0.92, 1.0],
            ambient: [0.18, 0.2, 0.24, elapsed_seconds],
        }
    }
}

/// Group 0 of every pass: the per-frame camera and light block.
pub struct FrameBindings {
    layout: Arc<wgpu::BindGroupLayout>,
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl FrameBindings {
    pub fn new(device: &wgpu::Device) -> Self {
        let layout = Arc::new(device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Frame BGL"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        }));
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Frame Uniform Buffer"),
            size: std::mem::size_of::<FrameUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Frame BG"),
            layout: &layout,
            entries: &[wgpu::BindGroupEntry { binding: 0, resource: buffer.as_entire_binding() }],
        });
        Self { layout, buffer, bind_group }
    }

    pub fn layout(&self) -> &Arc<wgpu::BindGroupLayout> {
        &self.layout
    }

    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }

    pub fn write(&self, queue: &wgpu::Queue, uniform: &FrameUniform) {
        queue.write_buffer(&self.buffer, 0, bytemuck::bytes_of(uniform));
    }
}

/// Read-only view of an instance state buffer for the vertex stage.
pub fn state_bind_group_layout(device: &wgpu::Device) -> Arc<wgpu::BindGroupLayout> {
    Arc::new(device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Instance State BGL"),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: true },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_uniform_matches_wgsl_layout() {
        assert_eq!(std::mem::size_of::<FrameUniform>(), 128);
    }

    #[test]
    fn frame_uniform_carries_elapsed_time() {
        let camera = ViewCamera::new(Vec3::new(0.0, 1.0, 3.0), Vec3::ZERO, 0.8);
        let uniform = FrameUniform::new(&camera, PhysicalSize::new(640, 480), 2.5);
        assert_eq!(uniform.ambient[3], 2.5);
        assert_eq!(uniform.camera_pos, [0.0, 1.0, 3.0, 1.0]);
    }
}
