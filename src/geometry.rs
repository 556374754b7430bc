use crate::atlas::{Fingerprint, VatMeta};
use crate::decoder::AtlasCoord;
use glam::{Vec2, Vec3};

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct VatVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
    pub atlas_uv: [f32; 2],
    pub color: [f32; 4],
}

impl VatVertex {
    pub fn new(position: Vec3, normal: Vec3, uv: Vec2) -> Self {
        Self {
            position: position.to_array(),
            normal: normal.to_array(),
            uv: uv.to_array(),
            atlas_uv: [0.0; 2],
            color: [1.0; 4],
        }
    }

    pub fn with_color(mut self, color: [f32; 4]) -> Self {
        self.color = color;
        self
    }

    pub fn layout<'a>() -> wgpu::VertexBufferLayout<'a> {
        const ATTRIBUTES: [wgpu::VertexAttribute; 5] = wgpu::vertex_attr_array![
            0 => Float32x3,
            1 => Float32x3,
            2 => Float32x2,
            3 => Float32x2,
            4 => Float32x4,
        ];
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<VatVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &ATTRIBUTES,
        }
    }
}

/// Whether a geometry can be driven by an atlas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AtlasBinding {
    Animated,
    RestPose { reason: String },
}

impl AtlasBinding {
    pub fn is_animated(&self) -> bool {
        matches!(self, AtlasBinding::Animated)
    }
}

/// Triangle list geometry carrying the atlas coordinate channel.
#[derive(Debug, Clone)]
pub struct VatGeometry {
    vertices: Vec<VatVertex>,
    indices: Vec<u32>,
    has_atlas_uv: bool,
    fingerprint: Fingerprint,
}

impl VatGeometry {
    pub fn new(vertices: Vec<VatVertex>, indices: Vec<u32>, has_atlas_uv: bool) -> Self {
        let fingerprint = fingerprint_of(&vertices, &indices);
        Self { vertices, indices, has_atlas_uv, fingerprint }
    }

    pub fn vertices(&self) -> &[VatVertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn has_atlas_uv(&self) -> bool {
        self.has_atlas_uv
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    pub fn bind_to(&self, meta: &VatMeta) -> AtlasBinding {
        if self.vertices.len() as u64 != u64::from(meta.vertex_count) {
            return AtlasBinding::RestPose {
                reason: format!(
                    "geometry has {} vertices but the atlas was baked for {}",
                    self.vertices.len(),
                    meta.vertex_count
                ),
            };
        }
        if !self.has_atlas_uv {
            return AtlasBinding::RestPose { reason: "geometry has no atlas coordinate channel".into() };
        }
        AtlasBinding::Animated
    }

    /// Generates the atlas coordinate channel when it is missing and the vertex
    /// count matches the atlas.
    pub fn ensure_atlas_uv(&mut self, meta: &VatMeta) -> AtlasBinding {
        if !self.has_atlas_uv && self.vertices.len() as u64 == u64::from(meta.vertex_count) {
            for (index, vertex) in self.vertices.iter_mut().enumerate() {
                vertex.atlas_uv = AtlasCoord::for_vertex(meta, index as u32).to_array();
            }
            self.has_atlas_uv = true;
            self.fingerprint = fingerprint_of(&self.vertices, &self.indices);
        }
        self.bind_to(meta)
    }

    /// Horizontal plane centered on the origin facing +Y. UV `v` grows toward -Z.
    pub fn plane(width: f32, depth: f32, segments: u32) -> Self {
        let segments = segments.max(1);
        let row = segments + 1;
        let mut vertices = Vec::with_capacity((row * row) as usize);
        for iy in 0..=segments {
            for ix in 0..=segments {
                let u = ix as f32 / segments as f32;
                let v = 1.0 - iy as f32 / segments as f32;
                let position = Vec3::new((u - 0.5) * width, 0.0, (0.5 - v) * depth);
                vertices.push(VatVertex::new(position, Vec3::Y, Vec2::new(u, v)));
            }
        }
        let mut indices = Vec::with_capacity((segments * segments * 6) as usize);
        for iy in 0..segments {
            for ix in 0..segments {
                let a = iy * row + ix;
                let b = a + row;
                let c = b + 1;
                let d = a + 1;
                indices.extend_from_slice(&[a, b, c, a, c, d]);
            }
        }
        Self::new(vertices, indices, false)
    }
}

fn fingerprint_of(vertices: &[VatVertex], indices: &[u32]) -> Fingerprint {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&(vertices.len() as u64).to_le_bytes());
    hasher.update(bytemuck::cast_slice(vertices));
    hasher.update(bytemuck::cast_slice(indices));
    Fingerprint(*hasher.finalize().as_bytes())
}

/// Smooth vertex normals from triangle areas; degenerate vertices get +Y.
pub fn compute_normals(positions: &[Vec3], indices: &[u32]) -> Vec<Vec3> {
    let mut normals = vec![Vec3::ZERO; positions.len()];
    for tri in indices.chunks_exact(3) {
        let [i0, i1, i2] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        let (Some(&a), Some(&b), Some(&c)) = (positions.get(i0), positions.get(i1), positions.get(i2)) else {
            continue;
        };
        let face = (b - a).cross(c - a);
        normals[i0] += face;
        normals[i1] += face;
        normals[i2] += face;
    }
    normals
        .into_iter()
        .map(|n| if n.length_squared() > 0.0 { n.normalize() } else { Vec3::Y })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::texel_index;

    fn meta(vertex_count: u32) -> VatMeta {
        VatMeta {
            vertex_count,
            frame_count: 2,
            fps: 24.0,
            tex_width: 6,
            tex_height: 4,
            columns: 3,
            frame_stride: 2,
            store_delta: true,
            normals_compressed: false,
        }
    }

    #[test]
    fn plane_faces_up_with_expected_uvs() {
        let plane = VatGeometry::plane(2.0, 2.0, 4);
        assert_eq!(plane.vertex_count(), 25);
        assert_eq!(plane.indices().len(), 96);
        for tri in plane.indices().chunks_exact(3) {
            let [a, b, c] = [0, 1, 2].map(|k| Vec3::from(plane.vertices()[tri[k] as usize].position));
            let n = (b - a).cross(c - a);
            assert!(n.y > 0.0);
        }
        let corner = plane.vertices()[0];
        assert_eq!(corner.uv, [0.0, 1.0]);
        assert_eq!(corner.position, [-1.0, 0.0, -1.0]);
    }

    #[test]
    fn atlas_uv_is_generated_once_and_changes_identity() {
        let mut geometry = VatGeometry::plane(1.0, 1.0, 2);
        let before = geometry.fingerprint();
        let meta = meta(9);
        assert_eq!(geometry.ensure_atlas_uv(&meta), AtlasBinding::Animated);
        assert!(geometry.has_atlas_uv());
        assert_ne!(before, geometry.fingerprint());
        for (i, vertex) in geometry.vertices().iter().enumerate() {
            let (x, y) = texel_index(&meta, AtlasCoord::from(vertex.atlas_uv), 1);
            assert_eq!(x, (i as u32 / 4) * 2 + 1);
            assert_eq!(y, i as u32 % 4);
        }
    }

    #[test]
    fn count_mismatch_falls_back_to_rest_pose() {
        let mut geometry = VatGeometry::plane(1.0, 1.0, 2);
        let binding = geometry.ensure_atlas_uv(&meta(8));
        assert!(!binding.is_animated());
        assert!(!geometry.has_atlas_uv());
    }

    #[test]
    fn computed_normals_point_out_of_a_flat_triangle() {
        let positions = [Vec3::ZERO, Vec3::Z, Vec3::X];
        let normals = compute_normals(&positions, &[0, 1, 2]);
        assert!(normals.iter().all(|n| (*n - Vec3::Y).length() < 1e-6));
    }
}
