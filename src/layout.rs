use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Quat, Vec2, Vec3};
use rand::Rng;

/// Radical inverse of `index` in `base`.
pub fn halton(mut index: u32, base: u32) -> f32 {
    let mut fraction = 1.0f32;
    let mut result = 0.0f32;
    while index > 0 {
        fraction /= base as f32;
        result += fraction * (index % base) as f32;
        index /= base;
    }
    result
}

/// Low-discrepancy points in `[0, 1)^2`, skipping the origin sample.
pub fn halton_2d(count: usize) -> Vec<Vec2> {
    (1..=count as u32).map(|i| Vec2::new(halton(i, 2), halton(i, 3))).collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutParams {
    pub plane_size: f32,
    pub scale_min: f32,
    pub scale_max: f32,
}

impl Default for LayoutParams {
    fn default() -> Self {
        Self { plane_size: 2.0, scale_min: 0.08, scale_max: 0.144 }
    }
}

/// Per-instance vertex attributes: model matrix columns then
/// `(seed, plane_u, plane_v, 0)`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct InstanceRaw {
    pub model: [[f32; 4]; 4],
    pub extra: [f32; 4],
}

impl InstanceRaw {
    pub fn layout<'a>() -> wgpu::VertexBufferLayout<'a> {
        const ATTRIBUTES: [wgpu::VertexAttribute; 5] = wgpu::vertex_attr_array![
            5 => Float32x4,
            6 => Float32x4,
            7 => Float32x4,
            8 => Float32x4,
            9 => Float32x4,
        ];
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<InstanceRaw>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &ATTRIBUTES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstancePlacement {
    pub plane_uv: Vec2,
    pub transform: Mat4,
    pub seed: f32,
}

impl InstancePlacement {
    pub fn raw(&self) -> InstanceRaw {
        InstanceRaw {
            model: self.transform.to_cols_array_2d(),
            extra: [self.seed, self.plane_uv.x, self.plane_uv.y, 0.0],
        }
    }
}

/// Placements for an instanced batch, in instance-index order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InstanceLayout {
    placements: Vec<InstancePlacement>,
}

impl InstanceLayout {
    /// Scatters `count` instances over a square plane centered on the origin.
    pub fn scatter<R: Rng + ?Sized>(count: usize, params: &LayoutParams, rng: &mut R) -> Self {
        let (lo, hi) = (params.scale_min.min(params.scale_max), params.scale_min.max(params.scale_max));
        let placements = halton_2d(count)
            .into_iter()
            .map(|plane_uv| {
                let xz = (plane_uv - Vec2::splat(0.5)) * params.plane_size;
                let yaw = rng.gen::<f32>() * std::f32::consts::TAU;
                let scale = lo + rng.gen::<f32>() * (hi - lo);
                let seed = rng.gen::<f32>();
                // Plane UV v grows toward -Z.
                let translation = Vec3::new(xz.x, 0.0, -xz.y);
                InstancePlacement {
                    plane_uv,
                    transform: Mat4::from_scale_rotation_translation(
                        Vec3::splat(scale),
                        Quat::from_rotation_y(yaw),
                        translation,
                    ),
                    seed,
                }
            })
            .collect();
        Self { placements }
    }

    /// One untransformed instance, used by single-mesh surfaces.
    pub fn single(transform: Mat4) -> Self {
        Self { placements: vec![InstancePlacement { plane_uv: Vec2::splat(0.5), transform, seed: 0.5 }] }
    }

    pub fn len(&self) -> usize {
        self.placements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }

    pub fn placements(&self) -> &[InstancePlacement] {
        &self.placements
    }

    pub fn plane_uvs(&self) -> Vec<Vec2> {
        self.placements.iter().map(|p| p.plane_uv).collect()
    }

    pub fn raw(&self) -> Vec<InstanceRaw> {
        self.placements.iter().map(InstancePlacement::raw).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn halton_matches_known_sequence() {
        assert_eq!(halton(1, 2), 0.5);
        assert_eq!(halton(2, 2), 0.25);
        assert_eq!(halton(3, 2), 0.75);
        assert!((halton(1, 3) - 1.0 / 3.0).abs() < 1e-6);
        assert!((halton(4, 3) - 4.0 / 9.0).abs() < 1e-6);
    }

    #[test]
    fn scatter_is_deterministic_and_inside_plane() {
        let params = LayoutParams::default();
        let a = InstanceLayout::scatter(200, &params, &mut StdRng::seed_from_u64(3));
        let b = InstanceLayout::scatter(200, &params, &mut StdRng::seed_from_u64(3));
        assert_eq!(a, b);
        for placement in a.placements() {
            assert!((0.0..1.0).contains(&placement.plane_uv.x));
            assert!((0.0..1.0).contains(&placement.plane_uv.y));
            let (scale, _, translation) = placement.transform.to_scale_rotation_translation();
            assert!(translation.x.abs() <= 1.0 && translation.z.abs() <= 1.0);
            assert!(scale.x >= params.scale_min - 1e-5 && scale.x <= params.scale_max + 1e-5);
        }
    }

    #[test]
    fn empty_layout_is_valid() {
        let layout = InstanceLayout::scatter(0, &LayoutParams::default(), &mut StdRng::seed_from_u64(0));
        assert!(layout.is_empty());
        assert!(layout.raw().is_empty());
    }
}
