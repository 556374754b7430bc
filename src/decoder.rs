//! CPU side of the atlas decoder. `assets/shaders/vat_common.wgsl` mirrors
//! these functions for the vertex stage.

use crate::atlas::{AtlasImage, VatAtlas, VatMeta};
use glam::{Vec2, Vec3};

/// Base atlas coordinate of a vertex: left edge of its frame block in U, row
/// center in V. See [`texel_index`] for the U conventions accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AtlasCoord {
    pub u: f32,
    pub v: f32,
}

impl AtlasCoord {
    pub fn for_vertex(meta: &VatMeta, index: u32) -> Self {
        let column = index / meta.tex_height;
        let row = index % meta.tex_height;
        let px = column * meta.frame_stride;
        Self { u: px as f32 / meta.tex_width as f32, v: (row as f32 + 0.5) / meta.tex_height as f32 }
    }

    pub fn to_array(self) -> [f32; 2] {
        [self.u, self.v]
    }
}

impl From<[f32; 2]> for AtlasCoord {
    fn from(value: [f32; 2]) -> Self {
        Self { u: value[0], v: value[1] }
    }
}

pub fn clamp_frame(meta: &VatMeta, frame: f32) -> f32 {
    let last = meta.frame_count.saturating_sub(1) as f32;
    if frame.is_nan() {
        return 0.0;
    }
    frame.clamp(0.0, last)
}

/// Integer texel addressed by `coord` at whole frame `frame`.
///
/// `coord.u` may sit on the left edge of the block's first texel or on its
/// center (`(px + 0.5) / tex_width`, as some bakers write TEXCOORD_1); both
/// resolve to column `px`.
pub fn texel_index(meta: &VatMeta, coord: AtlasCoord, frame: u32) -> (u32, u32) {
    let width = meta.tex_width as f32;
    let height = meta.tex_height as f32;
    let base = (coord.u * width + 0.25).floor();
    let x = (base + frame as f32).clamp(0.0, width - 1.0) as u32;
    let y = (coord.v * height).floor().clamp(0.0, height - 1.0) as u32;
    (x, y)
}

fn sample_pair(meta: &VatMeta, image: &AtlasImage, coord: AtlasCoord, frame: f32) -> ([f32; 4], [f32; 4], f32) {
    let frame = clamp_frame(meta, frame);
    let last = meta.frame_count.saturating_sub(1);
    let f0 = frame.floor() as u32;
    let f1 = (f0 + 1).min(last);
    let t = frame - f0 as f32;
    let (x0, y0) = texel_index(meta, coord, f0);
    let (x1, y1) = texel_index(meta, coord, f1);
    (image.texel(x0, y0), image.texel(x1, y1), t)
}

fn xyz(texel: [f32; 4]) -> Vec3 {
    Vec3::new(texel[0], texel[1], texel[2])
}

/// Interpolated position at a continuous raw frame index.
pub fn decode_position(atlas: &VatAtlas, coord: AtlasCoord, rest: Vec3, frame: f32) -> Vec3 {
    let meta = atlas.meta();
    let (a, b, t) = sample_pair(meta, atlas.positions(), coord, frame);
    let offset = xyz(a).lerp(xyz(b), t);
    if meta.store_delta {
        rest + offset
    } else {
        offset
    }
}

/// Interpolated unit normal at a continuous raw frame index. Atlases without a
/// normal image report +Y.
pub fn decode_normal(atlas: &VatAtlas, coord: AtlasCoord, frame: f32) -> Vec3 {
    let Some(normals) = atlas.normals() else {
        return Vec3::Y;
    };
    let meta = atlas.meta();
    let (a, b, t) = sample_pair(meta, normals, coord, frame);
    let decode = |texel: [f32; 4]| {
        if meta.normals_compressed {
            oct_decode(Vec2::new(texel[0], texel[1]))
        } else {
            xyz(texel).normalize_or_zero()
        }
    };
    let n = decode(a).lerp(decode(b), t).normalize_or_zero();
    if n == Vec3::ZERO {
        Vec3::Y
    } else {
        n
    }
}

fn sign_not_zero(v: Vec2) -> Vec2 {
    Vec2::new(if v.x >= 0.0 { 1.0 } else { -1.0 }, if v.y >= 0.0 { 1.0 } else { -1.0 })
}

/// Decodes an octahedral normal stored in `[0, 1]^2`.
pub fn oct_decode(encoded: Vec2) -> Vec3 {
    let e = encoded * 2.0 - Vec2::ONE;
    let mut v = Vec3::new(e.x, e.y, 1.0 - e.x.abs() - e.y.abs());
    if v.z < 0.0 {
        let folded = (Vec2::ONE - Vec2::new(v.y, v.x).abs()) * sign_not_zero(Vec2::new(v.x, v.y));
        v.x = folded.x;
        v.y = folded.y;
    }
    v.normalize_or_zero()
}

/// Inverse of [`oct_decode`] for unit vectors.
pub fn oct_encode(n: Vec3) -> Vec2 {
    let l1 = n.x.abs() + n.y.abs() + n.z.abs();
    if l1 <= f32::EPSILON {
        return Vec2::splat(0.5);
    }
    let mut p = Vec2::new(n.x, n.y) / l1;
    if n.z < 0.0 {
        p = (Vec2::ONE - Vec2::new(p.y, p.x).abs()) * sign_not_zero(p);
    }
    p * 0.5 + Vec2::splat(0.5)
}
