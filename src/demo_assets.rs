//! Procedural plant stalk baked into a VAT atlas, so the viewer runs
//! without external files.

use crate::atlas::{AtlasImage, VatAtlas, VatMeta};
use crate::decoder::{oct_encode, AtlasCoord};
use crate::error::VatResult;
use crate::geometry::{compute_normals, VatGeometry, VatVertex};
use glam::{Vec2, Vec3};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProceduralPlant {
    pub segments: u32,
    pub sides: u32,
    pub height: f32,
    pub radius: f32,
    pub frame_count: u32,
    pub fps: f32,
    pub max_rows: u32,
}

impl Default for ProceduralPlant {
    fn default() -> Self {
        Self { segments: 16, sides: 8, height: 1.0, radius: 0.035, frame_count: 48, fps: 24.0, max_rows: 64 }
    }
}

impl ProceduralPlant {
    pub fn vertex_count(&self) -> u32 {
        (self.segments + 1) * self.sides.max(3)
    }

    pub fn meta(&self) -> VatMeta {
        let vertex_count = self.vertex_count();
        let tex_height = vertex_count.min(self.max_rows.max(1));
        let columns = vertex_count.div_ceil(tex_height);
        VatMeta {
            vertex_count,
            frame_count: self.frame_count.max(1),
            fps: self.fps,
            tex_width: columns * self.frame_count.max(1),
            tex_height,
            columns,
            frame_stride: self.frame_count.max(1),
            store_delta: true,
            normals_compressed: true,
        }
    }

    /// Stalk shape at animation progress `t` in `[0, 1]`: it bends over and
    /// the tip swells as it opens.
    fn positions_at(&self, t: f32) -> Vec<Vec3> {
        let sides = self.sides.max(3);
        let bend = t * 1.1;
        let mut positions = Vec::with_capacity(self.vertex_count() as usize);
        for ring in 0..=self.segments {
            let h = ring as f32 / self.segments as f32;
            let swell = 1.0 + 2.5 * t * h.powi(4);
            let radius = self.radius * (1.0 - 0.5 * h) * swell;
            let angle = bend * h;
            let spine_len = self.height * h;
            let spine = if bend.abs() < 1e-4 {
                Vec3::new(0.0, spine_len, 0.0)
            } else {
                let arc = self.height / bend;
                Vec3::new(arc * (1.0 - angle.cos()), arc * angle.sin(), 0.0)
            };
            for side in 0..sides {
                let theta = side as f32 / sides as f32 * std::f32::consts::TAU;
                let local = Vec3::new(theta.cos() * radius, 0.0, theta.sin() * radius);
                let rotated = Vec3::new(local.x * angle.cos(), -local.x * angle.sin(), local.z);
                positions.push(spine + rotated);
            }
        }
        positions
    }

    fn indices(&self) -> Vec<u32> {
        let sides = self.sides.max(3);
        let mut indices = Vec::with_capacity((self.segments * sides * 6) as usize);
        for ring in 0..self.segments {
            for side in 0..sides {
                let a = ring * sides + side;
                let b = ring * sides + (side + 1) % sides;
                let c = a + sides;
                let d = b + sides;
                indices.extend_from_slice(&[a, c, b, b, c, d]);
            }
        }
        indices
    }

    pub fn build(&self) -> VatResult<(VatGeometry, VatAtlas)> {
        let meta = self.meta();
        let indices = self.indices();
        let rest = self.positions_at(0.0);
        let rest_normals = compute_normals(&rest, &indices);
        let sides = self.sides.max(3);

        let mut positions = AtlasImage::filled(meta.tex_width, meta.tex_height, [0.0, 0.0, 0.0, 1.0]);
        let mut normals = AtlasImage::filled(meta.tex_width, meta.tex_height, [0.5, 1.0, 0.0, 1.0]);
        for frame in 0..meta.frame_count {
            let t = if meta.frame_count > 1 { frame as f32 / (meta.frame_count - 1) as f32 } else { 0.0 };
            let deformed = self.positions_at(t);
            let frame_normals = compute_normals(&deformed, &indices);
            for (index, (p, n)) in deformed.iter().zip(&frame_normals).enumerate() {
                let coord = AtlasCoord::for_vertex(&meta, index as u32);
                let (x, y) = crate::decoder::texel_index(&meta, coord, frame);
                let delta = *p - rest[index];
                positions.set_texel(x, y, [delta.x, delta.y, delta.z, 1.0]);
                let e = oct_encode(*n);
                normals.set_texel(x, y, [e.x, e.y, 0.0, 1.0]);
            }
        }

        let vertices = rest
            .iter()
            .zip(&rest_normals)
            .enumerate()
            .map(|(index, (p, n))| {
                let ring = index as u32 / sides;
                let side = index as u32 % sides;
                let uv = Vec2::new(side as f32 / sides as f32, ring as f32 / self.segments as f32);
                VatVertex::new(*p, *n, uv).with_color([0.35, 0.55 + 0.3 * uv.y, 0.25, 1.0])
            })
            .collect();
        let mut geometry = VatGeometry::new(vertices, indices, false);
        geometry.ensure_atlas_uv(&meta);
        let atlas = VatAtlas::new(meta, positions, Some(normals))?;
        Ok((geometry, atlas))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{decode_normal, decode_position};
    use crate::geometry::AtlasBinding;

    #[test]
    fn baked_plant_binds_and_decodes_rest_pose_at_frame_zero() {
        let plant = ProceduralPlant::default();
        let (geometry, atlas) = plant.build().expect("bake");
        assert_eq!(geometry.bind_to(atlas.meta()), AtlasBinding::Animated);
        for (index, vertex) in geometry.vertices().iter().enumerate().step_by(7) {
            let coord = AtlasCoord::from(vertex.atlas_uv);
            let rest = Vec3::from(vertex.position);
            let decoded = decode_position(&atlas, coord, rest, 0.0);
            assert!((decoded - rest).length() < 1e-5, "vertex {index}");
            let normal = decode_normal(&atlas, coord, 0.0);
            assert!((normal - Vec3::from(vertex.normal)).length() < 1e-3, "vertex {index}");
        }
    }

    #[test]
    fn tip_moves_by_the_last_frame() {
        let plant = ProceduralPlant::default();
        let (geometry, atlas) = plant.build().expect("bake");
        let tip = geometry.vertices().last().copied().expect("vertex");
        let rest = Vec3::from(tip.position);
        let last = (atlas.meta().frame_count - 1) as f32;
        let bent = decode_position(&atlas, AtlasCoord::from(tip.atlas_uv), rest, last);
        assert!(bent.x > rest.x + 0.2);
        assert!(bent.y < rest.y);
    }

    #[test]
    fn meta_spreads_vertices_over_columns() {
        let meta = ProceduralPlant::default().meta();
        meta.validate().expect("valid");
        assert_eq!(meta.tex_height, 64);
        assert_eq!(meta.columns, 3);
    }
}
