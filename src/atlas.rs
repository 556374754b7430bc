use crate::error::{VatError, VatResult};
use crate::logging;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Layout of a baked vertex animation atlas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VatMeta {
    pub vertex_count: u32,
    pub frame_count: u32,
    #[serde(default = "VatMeta::default_fps")]
    pub fps: f32,
    pub tex_width: u32,
    pub tex_height: u32,
    pub columns: u32,
    pub frame_stride: u32,
    #[serde(default)]
    pub store_delta: bool,
    #[serde(default)]
    pub normals_compressed: bool,
}

impl VatMeta {
    const fn default_fps() -> f32 {
        24.0
    }

    pub fn from_json_slice(bytes: &[u8]) -> VatResult<Self> {
        let meta: VatMeta = serde_json::from_slice(bytes)?;
        meta.validate()?;
        Ok(meta)
    }

    pub fn load(path: impl AsRef<Path>) -> VatResult<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| VatError::Io { path: path.to_path_buf(), source })?;
        Self::from_json_slice(&bytes)
    }

    pub fn validate(&self) -> VatResult<()> {
        if self.frame_count == 0 {
            return Err(VatError::invalid("frameCount", "must be at least 1"));
        }
        if self.vertex_count == 0 {
            return Err(VatError::invalid("vertexCount", "must be at least 1"));
        }
        if self.tex_width == 0 || self.tex_height == 0 {
            return Err(VatError::invalid("texWidth", "atlas dimensions must be non-zero"));
        }
        if self.columns == 0 {
            return Err(VatError::invalid("columns", "must be at least 1"));
        }
        if !self.fps.is_finite() || self.fps <= 0.0 {
            return Err(VatError::invalid("fps", format!("{} is not a positive rate", self.fps)));
        }
        if self.frame_stride < self.frame_count {
            return Err(VatError::invalid(
                "frameStride",
                format!("{} is smaller than frameCount {}", self.frame_stride, self.frame_count),
            ));
        }
        let needed_width = u64::from(self.columns) * u64::from(self.frame_stride);
        if needed_width > u64::from(self.tex_width) {
            return Err(VatError::invalid(
                "texWidth",
                format!("{} columns x {} stride needs {needed_width} texels", self.columns, self.frame_stride),
            ));
        }
        let capacity = u64::from(self.columns) * u64::from(self.tex_height);
        if u64::from(self.vertex_count) > capacity {
            return Err(VatError::invalid(
                "vertexCount",
                format!("{} vertices do not fit in {capacity} atlas rows", self.vertex_count),
            ));
        }
        Ok(())
    }
}

/// Row-major RGBA float texels.
#[derive(Debug, Clone, PartialEq)]
pub struct AtlasImage {
    pub width: u32,
    pub height: u32,
    pub texels: Vec<[f32; 4]>,
}

impl AtlasImage {
    pub fn new(width: u32, height: u32, texels: Vec<[f32; 4]>) -> Option<Self> {
        if texels.len() as u64 != u64::from(width) * u64::from(height) {
            return None;
        }
        Some(Self { width, height, texels })
    }

    pub fn filled(width: u32, height: u32, value: [f32; 4]) -> Self {
        Self { width, height, texels: vec![value; width as usize * height as usize] }
    }

    pub fn from_dynamic(image: &image::DynamicImage) -> Self {
        let rgba = image.to_rgba32f();
        let (width, height) = rgba.dimensions();
        let texels = rgba.pixels().map(|p| p.0).collect();
        Self { width, height, texels }
    }

    pub fn load(path: impl AsRef<Path>) -> VatResult<Self> {
        let path = path.as_ref();
        let image =
            image::open(path).map_err(|source| VatError::Image { path: path.to_path_buf(), source })?;
        Ok(Self::from_dynamic(&image))
    }

    /// Texel at `(x, y)`, clamped to the image edge.
    pub fn texel(&self, x: u32, y: u32) -> [f32; 4] {
        let x = x.min(self.width.saturating_sub(1));
        let y = y.min(self.height.saturating_sub(1));
        self.texels[(y * self.width + x) as usize]
    }

    pub fn set_texel(&mut self, x: u32, y: u32, value: [f32; 4]) {
        if x < self.width && y < self.height {
            self.texels[(y * self.width + x) as usize] = value;
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.texels)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AtlasPaths {
    pub meta: PathBuf,
    pub positions: PathBuf,
    #[serde(default)]
    pub normals: Option<PathBuf>,
}

/// Structural identity of geometry or atlas content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(pub [u8; 32]);

impl Fingerprint {
    pub fn short(&self) -> String {
        self.0[..4].iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// Validated metadata plus the position and optional normal atlases.
#[derive(Debug, Clone)]
pub struct VatAtlas {
    meta: VatMeta,
    positions: AtlasImage,
    normals: Option<AtlasImage>,
    fingerprint: Fingerprint,
}

impl VatAtlas {
    pub fn new(meta: VatMeta, positions: AtlasImage, normals: Option<AtlasImage>) -> VatResult<Self> {
        meta.validate()?;
        check_size("position", &meta, &positions)?;
        if let Some(normals) = normals.as_ref() {
            check_size("normal", &meta, normals)?;
        }
        let mut hasher = blake3::Hasher::new();
        hasher.update(bytemuck::bytes_of(&[
            meta.vertex_count,
            meta.frame_count,
            meta.tex_width,
            meta.tex_height,
            meta.columns,
            meta.frame_stride,
            meta.store_delta as u32,
            meta.normals_compressed as u32,
        ]));
        hasher.update(&meta.fps.to_le_bytes());
        hasher.update(positions.as_bytes());
        if let Some(normals) = normals.as_ref() {
            hasher.update(normals.as_bytes());
        }
        let fingerprint = Fingerprint(*hasher.finalize().as_bytes());
        Ok(Self { meta, positions, normals, fingerprint })
    }

    pub fn load(paths: &AtlasPaths) -> VatResult<Self> {
        let meta = VatMeta::load(&paths.meta)?;
        let positions = AtlasImage::load(&paths.positions)?;
        let normals = paths.normals.as_ref().map(AtlasImage::load).transpose()?;
        let atlas = Self::new(meta, positions, normals)?;
        log::info!(
            target: logging::ATLAS,
            "loaded atlas {} ({} vertices, {} frames @ {} fps, {}x{})",
            atlas.fingerprint.short(),
            meta.vertex_count,
            meta.frame_count,
            meta.fps,
            meta.tex_width,
            meta.tex_height
        );
        Ok(atlas)
    }

    pub fn meta(&self) -> &VatMeta {
        &self.meta
    }

    pub fn positions(&self) -> &AtlasImage {
        &self.positions
    }

    pub fn normals(&self) -> Option<&AtlasImage> {
        self.normals.as_ref()
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }
}

fn check_size(which: &'static str, meta: &VatMeta, image: &AtlasImage) -> VatResult<()> {
    if image.width != meta.tex_width || image.height != meta.tex_height {
        return Err(VatError::AtlasSize {
            which,
            expected_width: meta.tex_width,
            expected_height: meta.tex_height,
            actual_width: image.width,
            actual_height: image.height,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> VatMeta {
        VatMeta {
            vertex_count: 6,
            frame_count: 4,
            fps: 24.0,
            tex_width: 10,
            tex_height: 4,
            columns: 2,
            frame_stride: 5,
            store_delta: true,
            normals_compressed: true,
        }
    }

    #[test]
    fn parses_camel_case_json_with_default_fps() {
        let json = br#"{"vertexCount":6,"frameCount":4,"texWidth":10,"texHeight":4,"columns":2,"frameStride":5,"storeDelta":true}"#;
        let parsed = VatMeta::from_json_slice(json).expect("meta");
        assert_eq!(parsed.fps, 24.0);
        assert!(parsed.store_delta);
        assert!(!parsed.normals_compressed);
    }

    #[test]
    fn missing_frame_count_is_a_metadata_error() {
        let json = br#"{"vertexCount":6,"texWidth":10,"texHeight":4,"columns":2,"frameStride":5}"#;
        let err = VatMeta::from_json_slice(json).expect_err("frameCount is required");
        assert!(matches!(err, VatError::Metadata(_)));
    }

    #[test]
    fn validation_rejects_each_inconsistent_field() {
        let cases: Vec<(&str, VatMeta)> = vec![
            ("frameCount", VatMeta { frame_count: 0, ..meta() }),
            ("vertexCount", VatMeta { vertex_count: 0, ..meta() }),
            ("fps", VatMeta { fps: 0.0, ..meta() }),
            ("fps", VatMeta { fps: f32::NAN, ..meta() }),
            ("frameStride", VatMeta { frame_stride: 3, ..meta() }),
            ("texWidth", VatMeta { tex_width: 9, ..meta() }),
            ("vertexCount", VatMeta { vertex_count: 9, ..meta() }),
            ("columns", VatMeta { columns: 0, ..meta() }),
        ];
        for (field, candidate) in cases {
            match candidate.validate() {
                Err(VatError::InvalidMetadata { field: reported, .. }) => assert_eq!(reported, field),
                other => panic!("expected {field} to be rejected, got {other:?}"),
            }
        }
        meta().validate().expect("baseline metadata is valid");
    }

    #[test]
    fn atlas_rejects_mismatched_image_size() {
        let err = VatAtlas::new(meta(), AtlasImage::filled(8, 4, [0.0; 4]), None).expect_err("size");
        assert!(matches!(err, VatError::AtlasSize { which: "position", .. }));
    }

    #[test]
    fn fingerprint_tracks_texel_content() {
        let a = VatAtlas::new(meta(), AtlasImage::filled(10, 4, [0.0; 4]), None).expect("atlas");
        let b = VatAtlas::new(meta(), AtlasImage::filled(10, 4, [0.0; 4]), None).expect("atlas");
        let mut texels = AtlasImage::filled(10, 4, [0.0; 4]);
        texels.set_texel(3, 1, [1.0, 0.0, 0.0, 1.0]);
        let c = VatAtlas::new(meta(), texels, None).expect("atlas");
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }
}
