use crate::assembly::{SurfaceDescriptor, SurfaceFactory, SurfaceKind, SurfaceParams};
use crate::atlas::{AtlasImage, VatMeta};
use crate::geometry::{AtlasBinding, VatVertex};
use crate::instance_state::InstanceState;
use crate::layout::{InstanceLayout, InstanceRaw};
use crate::logging;
use crate::material::{MaterialUniform, ParamDirty, ShaderKey, ShaderVariant};
use anyhow::{bail, Result};
use glam::Mat4;
use std::collections::HashMap;
use std::sync::Arc;
use wgpu::util::DeviceExt;

use super::DEPTH_FORMAT;

const COMMON_SOURCE: &str = include_str!("../../assets/shaders/vat_common.wgsl");

const FLAG_STORE_DELTA: u32 = 1;
const FLAG_NORMALS_COMPRESSED: u32 = 2;
const FLAG_ANIMATED: u32 = 4;
const FLAG_HAS_NORMALS: u32 = 8;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct VatUniform {
    pub frame_count: f32,
    pub tex_width: f32,
    pub tex_height: f32,
    pub flags: u32,
}

impl VatUniform {
    pub fn new(meta: &VatMeta, binding: &AtlasBinding, has_normals: bool) -> Self {
        let mut flags = 0;
        if meta.store_delta {
            flags |= FLAG_STORE_DELTA;
        }
        if meta.normals_compressed {
            flags |= FLAG_NORMALS_COMPRESSED;
        }
        if binding.is_animated() {
            flags |= FLAG_ANIMATED;
        }
        if has_normals {
            flags |= FLAG_HAS_NORMALS;
        }
        Self {
            frame_count: meta.frame_count as f32,
            tex_width: meta.tex_width as f32,
            tex_height: meta.tex_height as f32,
            flags,
        }
    }
}

/// Full WGSL module for a variant: shared declarations, then both stages.
pub fn compose_source(variant: &ShaderVariant) -> String {
    let mut source = String::with_capacity(
        COMMON_SOURCE.len() + variant.vertex_source().len() + variant.fragment_source().len() + 2,
    );
    source.push_str(COMMON_SOURCE);
    source.push('\n');
    source.push_str(variant.vertex_source());
    source.push('\n');
    source.push_str(variant.fragment_source());
    source
}

/// The two passes a VAT surface is drawn in. Both run the same decoding
/// vertex stage, so animated meshes occlude with their deformed shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VatPass {
    /// Depth only, no fragment stage.
    Depth,
    /// Colour against the depth laid down by [`VatPass::Depth`].
    Shading,
}

impl VatPass {
    pub fn depth_stencil(self) -> wgpu::DepthStencilState {
        let (depth_write_enabled, depth_compare) = match self {
            VatPass::Depth => (true, wgpu::CompareFunction::Less),
            VatPass::Shading => (false, wgpu::CompareFunction::LessEqual),
        };
        wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled,
            depth_compare,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }
    }

    fn label(self) -> &'static str {
        match self {
            VatPass::Depth => "VAT Depth Pipeline",
            VatPass::Shading => "VAT Pipeline",
        }
    }
}

/// Compiled pipelines of one shader variant.
pub struct VatPipelines {
    depth: wgpu::RenderPipeline,
    shading: wgpu::RenderPipeline,
}

impl VatPipelines {
    fn get(&self, pass: VatPass) -> &wgpu::RenderPipeline {
        match pass {
            VatPass::Depth => &self.depth,
            VatPass::Shading => &self.shading,
        }
    }
}

/// Backend objects of one live VAT surface.
pub struct VatSurfaceGpu {
    pipelines: Arc<VatPipelines>,
    shader: Arc<ShaderVariant>,
    kind: SurfaceKind,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
    instance_buffer: wgpu::Buffer,
    material_buffer: wgpu::Buffer,
    vat_buffer: wgpu::Buffer,
    material_bind_group: wgpu::BindGroup,
    textures: Vec<wgpu::Texture>,
    atlas_bind_group: wgpu::BindGroup,
    /// Single surfaces carry their own one-element state buffer.
    own_state: Option<(wgpu::Buffer, wgpu::BindGroup)>,
}

impl VatSurfaceGpu {
    pub fn kind(&self) -> SurfaceKind {
        self.kind
    }

    pub fn instance_count(&self) -> u32 {
        self.kind.instance_count()
    }

    /// Writes the playback state read by a single surface. No-op on instanced
    /// surfaces, whose states come from the frame compute.
    pub fn write_single_state(&self, queue: &wgpu::Queue, state: InstanceState) {
        if let Some((buffer, _)) = self.own_state.as_ref() {
            queue.write_buffer(buffer, 0, bytemuck::bytes_of(&state));
        }
    }

    /// Records the draw for `stage`. `states` is the compute output for
    /// instanced surfaces and is ignored when the surface owns its state.
    pub fn draw(
        &self,
        stage: VatPass,
        pass: &mut wgpu::RenderPass<'_>,
        frame_bind_group: &wgpu::BindGroup,
        states: Option<&wgpu::BindGroup>,
    ) {
        let states = match self.own_state.as_ref() {
            Some((_, bind_group)) => bind_group,
            None => match states {
                Some(bind_group) => bind_group,
                None => return,
            },
        };
        pass.set_pipeline(self.pipelines.get(stage));
        pass.set_bind_group(0, frame_bind_group, &[]);
        pass.set_bind_group(1, &self.material_bind_group, &[]);
        pass.set_bind_group(2, &self.atlas_bind_group, &[]);
        pass.set_bind_group(3, states, &[]);
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        pass.set_vertex_buffer(1, self.instance_buffer.slice(..));
        pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..self.index_count, 0, 0..self.instance_count());
    }
}

/// Builds [`VatSurfaceGpu`]s. Pipelines are cached per shader variant so a
/// surface recreated for a new atlas or mesh reuses its compiled module.
pub struct GpuSurfaceFactory {
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface_format: wgpu::TextureFormat,
    frame_bgl: Arc<wgpu::BindGroupLayout>,
    state_bgl: Arc<wgpu::BindGroupLayout>,
    material_bgl: wgpu::BindGroupLayout,
    atlas_bgl: wgpu::BindGroupLayout,
    pipelines: HashMap<ShaderKey, Arc<VatPipelines>>,
}

impl GpuSurfaceFactory {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        surface_format: wgpu::TextureFormat,
        frame_bgl: Arc<wgpu::BindGroupLayout>,
        state_bgl: Arc<wgpu::BindGroupLayout>,
    ) -> Self {
        let uniform_entry = |binding: u32, visibility: wgpu::ShaderStages| wgpu::BindGroupLayoutEntry {
            binding,
            visibility,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let material_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("VAT Material BGL"),
            entries: &[
                uniform_entry(0, wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT),
                uniform_entry(1, wgpu::ShaderStages::VERTEX),
            ],
        });
        let texture_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::VERTEX,
            ty: wgpu::BindingType::Texture {
                multisampled: false,
                view_dimension: wgpu::TextureViewDimension::D2,
                sample_type: wgpu::TextureSampleType::Float { filterable: false },
            },
            count: None,
        };
        let atlas_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("VAT Atlas BGL"),
            entries: &[texture_entry(0), texture_entry(1)],
        });
        Self {
            device: device.clone(),
            queue: queue.clone(),
            surface_format,
            frame_bgl,
            state_bgl,
            material_bgl,
            atlas_bgl,
            pipelines: HashMap::new(),
        }
    }

    fn pipelines_for(&mut self, variant: &ShaderVariant) -> Result<Arc<VatPipelines>> {
        let key = variant.key();
        if let Some(pipelines) = self.pipelines.get(&key) {
            return Ok(pipelines.clone());
        }
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let shader = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("VAT Shader"),
            source: wgpu::ShaderSource::Wgsl(compose_source(variant).into()),
        });
        let layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("VAT Pipeline Layout"),
            bind_group_layouts: &[self.frame_bgl.as_ref(), &self.material_bgl, &self.atlas_bgl, self.state_bgl.as_ref()],
            push_constant_ranges: &[],
        });
        let pipelines = Arc::new(VatPipelines {
            depth: self.build_pipeline(&shader, &layout, VatPass::Depth),
            shading: self.build_pipeline(&shader, &layout, VatPass::Shading),
        });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            bail!("shader variant '{}' failed validation: {err}", variant.label);
        }
        log::debug!(target: logging::GPU, "compiled VAT pipelines '{}'", variant.label);
        self.pipelines.insert(key, pipelines.clone());
        Ok(pipelines)
    }

    fn build_pipeline(
        &self,
        shader: &wgpu::ShaderModule,
        layout: &wgpu::PipelineLayout,
        stage: VatPass,
    ) -> wgpu::RenderPipeline {
        let targets = [Some(wgpu::ColorTargetState {
            format: self.surface_format,
            blend: Some(wgpu::BlendState::REPLACE),
            write_mask: wgpu::ColorWrites::ALL,
        })];
        let fragment = match stage {
            VatPass::Depth => None,
            VatPass::Shading => Some(wgpu::FragmentState {
                module: shader,
                entry_point: Some("fs_main"),
                targets: &targets,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
        };
        self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(stage.label()),
            layout: Some(layout),
            vertex: wgpu::VertexState {
                module: shader,
                entry_point: Some("vs_main"),
                buffers: &[VatVertex::layout(), InstanceRaw::layout()],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment,
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: Some(stage.depth_stencil()),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        })
    }

    fn upload_atlas_image(&self, label: &str, image: &AtlasImage) -> wgpu::Texture {
        let size = wgpu::Extent3d { width: image.width, height: image.height, depth_or_array_layers: 1 };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba32Float,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            image.as_bytes(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(16 * image.width),
                rows_per_image: Some(image.height),
            },
            size,
        );
        texture
    }

    fn instance_data(kind: SurfaceKind, layout: Option<&InstanceLayout>) -> Result<Vec<InstanceRaw>> {
        match kind {
            SurfaceKind::Single => Ok(InstanceLayout::single(Mat4::IDENTITY).raw()),
            SurfaceKind::Instanced { count } => {
                let Some(layout) = layout else {
                    bail!("instanced surface needs a layout");
                };
                if layout.len() != count as usize {
                    bail!("instance layout has {} placements, surface expects {count}", layout.len());
                }
                Ok(layout.raw())
            }
        }
    }
}

impl SurfaceFactory for GpuSurfaceFactory {
    type Surface = VatSurfaceGpu;

    fn create(
        &mut self,
        descriptor: &SurfaceDescriptor,
        binding: &AtlasBinding,
        params: &SurfaceParams,
    ) -> Result<VatSurfaceGpu> {
        let instances = Self::instance_data(descriptor.kind, params.layout.as_deref())?;
        let geometry = &descriptor.geometry;
        if geometry.indices().is_empty() {
            bail!("surface '{}' has no triangles", descriptor.shader.label);
        }
        let user = params.user.pack(&descriptor.shader)?;
        let pipelines = self.pipelines_for(&descriptor.shader)?;

        let vertex_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("VAT VB"),
            contents: bytemuck::cast_slice(geometry.vertices()),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("VAT IB"),
            contents: bytemuck::cast_slice(geometry.indices()),
            usage: wgpu::BufferUsages::INDEX,
        });
        let instance_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("VAT Instances"),
            contents: bytemuck::cast_slice(&instances),
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        });

        let material = MaterialUniform::pack(&params.material, user);
        let material_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("VAT Material"),
            contents: bytemuck::bytes_of(&material),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let atlas = &descriptor.atlas;
        let vat = VatUniform::new(atlas.meta(), binding, atlas.normals().is_some());
        let vat_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("VAT Layout"),
            contents: bytemuck::bytes_of(&vat),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let material_bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("VAT Material BG"),
            layout: &self.material_bgl,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: material_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: vat_buffer.as_entire_binding() },
            ],
        });

        let positions = self.upload_atlas_image("VAT Positions", atlas.positions());
        let fallback;
        let normals_image = match atlas.normals() {
            Some(image) => image,
            None => {
                fallback = AtlasImage::filled(1, 1, [0.0, 1.0, 0.0, 0.0]);
                &fallback
            }
        };
        let normals = self.upload_atlas_image("VAT Normals", normals_image);
        let positions_view = positions.create_view(&wgpu::TextureViewDescriptor::default());
        let normals_view = normals.create_view(&wgpu::TextureViewDescriptor::default());
        let atlas_bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("VAT Atlas BG"),
            layout: &self.atlas_bgl,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(&positions_view) },
                wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::TextureView(&normals_view) },
            ],
        });

        let own_state = match descriptor.kind {
            SurfaceKind::Single => {
                let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("VAT Single State"),
                    contents: bytemuck::bytes_of(&InstanceState::default()),
                    usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
                });
                let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("VAT Single State BG"),
                    layout: &self.state_bgl,
                    entries: &[wgpu::BindGroupEntry { binding: 0, resource: buffer.as_entire_binding() }],
                });
                Some((buffer, bind_group))
            }
            SurfaceKind::Instanced { .. } => None,
        };

        Ok(VatSurfaceGpu {
            pipelines,
            shader: descriptor.shader.clone(),
            kind: descriptor.kind,
            vertex_buffer,
            index_buffer,
            index_count: geometry.indices().len() as u32,
            instance_buffer,
            material_buffer,
            vat_buffer,
            material_bind_group,
            textures: vec![positions, normals],
            atlas_bind_group,
            own_state,
        })
    }

    fn update(&mut self, surface: &mut VatSurfaceGpu, params: &SurfaceParams, dirty: ParamDirty) -> Result<()> {
        if dirty.intersects(ParamDirty::MATERIAL | ParamDirty::USER) {
            let user = params.user.pack(&surface.shader)?;
            let material = MaterialUniform::pack(&params.material, user);
            self.queue.write_buffer(&surface.material_buffer, 0, bytemuck::bytes_of(&material));
        }
        if dirty.contains(ParamDirty::LAYOUT) {
            let instances = Self::instance_data(surface.kind, params.layout.as_deref())?;
            self.queue.write_buffer(&surface.instance_buffer, 0, bytemuck::cast_slice(&instances));
        }
        Ok(())
    }

    fn dispose(&mut self, surface: VatSurfaceGpu) {
        surface.vertex_buffer.destroy();
        surface.index_buffer.destroy();
        surface.instance_buffer.destroy();
        surface.material_buffer.destroy();
        surface.vat_buffer.destroy();
        for texture in &surface.textures {
            texture.destroy();
        }
        if let Some((buffer, _)) = surface.own_state.as_ref() {
            buffer.destroy();
        }
        log::debug!(target: logging::GPU, "disposed VAT surface '{}' ({:?})", surface.shader.label, surface.kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::DEFAULT_VERTEX_SOURCE;

    fn meta() -> VatMeta {
        VatMeta {
            vertex_count: 4,
            frame_count: 8,
            fps: 24.0,
            tex_width: 16,
            tex_height: 4,
            columns: 2,
            frame_stride: 8,
            store_delta: true,
            normals_compressed: false,
        }
    }

    #[test]
    fn vat_uniform_flags_follow_meta_and_binding() {
        let uniform = VatUniform::new(&meta(), &AtlasBinding::Animated, true);
        assert_eq!(uniform.flags, FLAG_STORE_DELTA | FLAG_ANIMATED | FLAG_HAS_NORMALS);
        assert_eq!(uniform.frame_count, 8.0);

        let rest = AtlasBinding::RestPose { reason: "vertex count mismatch".into() };
        let uniform = VatUniform::new(&meta(), &rest, false);
        assert_eq!(uniform.flags & FLAG_ANIMATED, 0);
        assert_eq!(std::mem::size_of::<VatUniform>(), 16);
    }

    #[test]
    fn composed_source_orders_common_before_stages() {
        let variant = ShaderVariant::new("plant");
        let source = compose_source(&variant);
        let common = source.find("struct VatUniform").expect("common block");
        let vertex = source.find("fn vs_main").expect("vertex stage");
        let fragment = source.find("fn fs_main").expect("fragment stage");
        assert!(common < vertex && vertex < fragment);
        assert!(source.contains(DEFAULT_VERTEX_SOURCE));
    }

    #[test]
    fn shading_pass_reuses_prepass_depth() {
        let depth = VatPass::Depth.depth_stencil();
        assert!(depth.depth_write_enabled);
        assert_eq!(depth.depth_compare, wgpu::CompareFunction::Less);

        let shading = VatPass::Shading.depth_stencil();
        assert!(!shading.depth_write_enabled);
        assert_eq!(shading.depth_compare, wgpu::CompareFunction::LessEqual);
        assert_eq!(depth.format, shading.format);
        assert!(compose_source(&ShaderVariant::new("plant")).contains("@invariant @builtin(position)"));
    }

    #[test]
    fn instanced_data_requires_matching_layout() {
        assert!(GpuSurfaceFactory::instance_data(SurfaceKind::Instanced { count: 2 }, None).is_err());
        let layout = InstanceLayout::single(Mat4::IDENTITY);
        assert!(GpuSurfaceFactory::instance_data(SurfaceKind::Instanced { count: 2 }, Some(&layout)).is_err());
        let single = GpuSurfaceFactory::instance_data(SurfaceKind::Single, None).expect("single");
        assert_eq!(single.len(), 1);
    }
}
