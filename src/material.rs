use crate::error::{VatError, VatResult};
use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use serde::Deserialize;
use std::collections::BTreeMap;

pub const MAX_USER_UNIFORMS: usize = 4;

pub const DEFAULT_VERTEX_SOURCE: &str = include_str!("../assets/shaders/vat_vertex.wgsl");
pub const DEFAULT_FRAGMENT_SOURCE: &str = include_str!("../assets/shaders/vat_fragment.wgsl");

/// `#rrggbb` colour as written in config files.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(transparent)]
pub struct HexColor(String);

impl HexColor {
    pub fn new(value: &str) -> Self {
        Self(value.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Linear RGB, magenta when the string does not parse.
    pub fn linear(&self) -> [f32; 3] {
        parse_hex_color(&self.0).unwrap_or([1.0, 0.0, 1.0])
    }
}

/// sRGB `#rrggbb` (or `rrggbb`) to linear RGB.
pub fn parse_hex_color(value: &str) -> Option<[f32; 3]> {
    let hex = value.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| -> Option<f32> {
        let byte = u8::from_str_radix(&hex[range], 16).ok()?;
        Some(srgb_to_linear(byte as f32 / 255.0))
    };
    Some([channel(0..2)?, channel(2..4)?, channel(4..6)?])
}

fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

/// Numeric surface parameters. Changing any of these updates uniforms in place.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct VatMaterialParams {
    pub base_color: HexColor,
    pub emissive: HexColor,
    pub roughness: f32,
    pub metalness: f32,
    pub transmission: f32,
    pub thickness: f32,
    pub ior: f32,
    pub clearcoat: f32,
    pub clearcoat_roughness: f32,
    pub reflectivity: f32,
    pub env_map_intensity: f32,
    pub bump_scale: f32,
    pub sheen: f32,
    pub sheen_roughness: f32,
    pub sheen_color: HexColor,
    pub iridescence: f32,
    pub iridescence_ior: f32,
    pub iridescence_thickness_range: [f32; 2],
    /// `None` is an infinite attenuation distance.
    pub attenuation_distance: Option<f32>,
    pub attenuation_color: HexColor,
}

impl Default for VatMaterialParams {
    fn default() -> Self {
        Self {
            base_color: HexColor::new("#ffffff"),
            emissive: HexColor::new("#000000"),
            roughness: 0.4,
            metalness: 0.6,
            transmission: 0.0,
            thickness: 0.0,
            ior: 1.5,
            clearcoat: 0.1,
            clearcoat_roughness: 0.1,
            reflectivity: 0.5,
            env_map_intensity: 1.0,
            bump_scale: 1.0,
            sheen: 0.0,
            sheen_roughness: 0.1,
            sheen_color: HexColor::new("#3695ff"),
            iridescence: 0.0,
            iridescence_ior: 1.3,
            iridescence_thickness_range: [100.0, 400.0],
            attenuation_distance: None,
            attenuation_color: HexColor::new("#ffffff"),
        }
    }
}

/// A user uniform value: scalar, up to four components, or a hex colour.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum UniformValue {
    Scalar(f32),
    Vector(Vec<f32>),
    Color(HexColor),
}

impl UniformValue {
    pub fn to_vec4(&self) -> [f32; 4] {
        match self {
            UniformValue::Scalar(v) => [*v, 0.0, 0.0, 0.0],
            UniformValue::Vector(values) => {
                let mut out = [0.0; 4];
                for (dst, src) in out.iter_mut().zip(values) {
                    *dst = *src;
                }
                out
            }
            UniformValue::Color(color) => {
                let [r, g, b] = color.linear();
                [r, g, b, 1.0]
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct UserUniforms(BTreeMap<String, UniformValue>);

impl UserUniforms {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: UniformValue) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&UniformValue> {
        self.0.get(name)
    }

    /// Values in variant slot order. Undeclared names are rejected, missing
    /// ones read as zero.
    pub fn pack(&self, variant: &ShaderVariant) -> VatResult<[[f32; 4]; MAX_USER_UNIFORMS]> {
        if let Some(name) = self.0.keys().find(|name| !variant.user_slots.contains(name)) {
            return Err(VatError::UnknownUniform { name: name.clone(), variant: variant.label.clone() });
        }
        let mut packed = [[0.0; 4]; MAX_USER_UNIFORMS];
        for (slot, name) in variant.user_slots.iter().enumerate() {
            if let Some(value) = self.0.get(name) {
                packed[slot] = value.to_vec4();
            }
        }
        Ok(packed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderKey(pub [u8; 32]);

/// Vertex/fragment stage sources plus the names bound to the user slots.
/// Missing stages use the built-in VAT shaders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderVariant {
    pub label: String,
    pub vertex: Option<String>,
    pub fragment: Option<String>,
    user_slots: Vec<String>,
}

impl ShaderVariant {
    pub fn new(label: impl Into<String>) -> Self {
        Self { label: label.into(), vertex: None, fragment: None, user_slots: Vec::new() }
    }

    pub fn with_vertex(mut self, source: impl Into<String>) -> Self {
        self.vertex = Some(source.into());
        self
    }

    pub fn with_fragment(mut self, source: impl Into<String>) -> Self {
        self.fragment = Some(source.into());
        self
    }

    pub fn with_user_slots<I, S>(mut self, names: I) -> VatResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let slots: Vec<String> = names.into_iter().map(Into::into).collect();
        if slots.len() > MAX_USER_UNIFORMS {
            return Err(VatError::TooManyUniforms {
                variant: self.label,
                count: slots.len(),
                max: MAX_USER_UNIFORMS,
            });
        }
        self.user_slots = slots;
        Ok(self)
    }

    pub fn user_slots(&self) -> &[String] {
        &self.user_slots
    }

    pub fn vertex_source(&self) -> &str {
        self.vertex.as_deref().unwrap_or(DEFAULT_VERTEX_SOURCE)
    }

    pub fn fragment_source(&self) -> &str {
        self.fragment.as_deref().unwrap_or(DEFAULT_FRAGMENT_SOURCE)
    }

    /// Content hash of everything that requires a new pipeline. The label is
    /// not part of it.
    pub fn key(&self) -> ShaderKey {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.vertex_source().as_bytes());
        hasher.update(b"|");
        hasher.update(self.fragment_source().as_bytes());
        for slot in &self.user_slots {
            hasher.update(b"|");
            hasher.update(slot.as_bytes());
        }
        ShaderKey(*hasher.finalize().as_bytes())
    }
}

bitflags! {
    /// Which uploaded parameter groups changed since the last sync.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ParamDirty: u32 {
        const MATERIAL = 1 << 0;
        const USER = 1 << 1;
        const LAYOUT = 1 << 2;
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MaterialUniform {
    pub base_color: [f32; 4],
    pub emissive: [f32; 4],
    /// roughness, metalness, reflectivity, env intensity
    pub surface: [f32; 4],
    /// clearcoat, clearcoat roughness, sheen, sheen roughness
    pub layers: [f32; 4],
    /// rgb, bump scale
    pub sheen_color: [f32; 4],
    /// transmission, thickness, ior, attenuation distance
    pub transmission: [f32; 4],
    pub attenuation_color: [f32; 4],
    /// strength, ior, thickness min, thickness max
    pub iridescence: [f32; 4],
    pub user: [[f32; 4]; MAX_USER_UNIFORMS],
}

const INFINITE_DISTANCE: f32 = 1.0e30;

impl MaterialUniform {
    pub fn pack(params: &VatMaterialParams, user: [[f32; 4]; MAX_USER_UNIFORMS]) -> Self {
        let rgb1 = |c: &HexColor, w: f32| {
            let [r, g, b] = c.linear();
            [r, g, b, w]
        };
        Self {
            base_color: rgb1(&params.base_color, 1.0),
            emissive: rgb1(&params.emissive, 1.0),
            surface: [params.roughness, params.metalness, params.reflectivity, params.env_map_intensity],
            layers: [params.clearcoat, params.clearcoat_roughness, params.sheen, params.sheen_roughness],
            sheen_color: rgb1(&params.sheen_color, params.bump_scale),
            transmission: [
                params.transmission,
                params.thickness,
                params.ior,
                params.attenuation_distance.unwrap_or(INFINITE_DISTANCE),
            ],
            attenuation_color: rgb1(&params.attenuation_color, 0.0),
            iridescence: [
                params.iridescence,
                params.iridescence_ior,
                params.iridescence_thickness_range[0],
                params.iridescence_thickness_range[1],
            ],
            user,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_colors_convert_to_linear() {
        assert_eq!(parse_hex_color("#ffffff"), Some([1.0, 1.0, 1.0]));
        assert_eq!(parse_hex_color("000000"), Some([0.0, 0.0, 0.0]));
        let [r, g, b] = parse_hex_color("#ff3366").expect("colour");
        assert_eq!(r, 1.0);
        assert!((g - 0.0331).abs() < 1e-3);
        assert!((b - 0.1329).abs() < 1e-3);
        assert_eq!(parse_hex_color("#ff33"), None);
        assert_eq!(parse_hex_color("#gg0000"), None);
    }

    #[test]
    fn shader_key_ignores_label_but_tracks_sources() {
        let a = ShaderVariant::new("a");
        let b = ShaderVariant::new("b");
        assert_eq!(a.key(), b.key());
        let c = ShaderVariant::new("a").with_fragment("@fragment fn fs_main() {}");
        assert_ne!(a.key(), c.key());
        let d = ShaderVariant::new("a").with_user_slots(["green1"]).expect("slots");
        assert_ne!(a.key(), d.key());
    }

    #[test]
    fn user_uniforms_pack_in_slot_order() {
        let variant = ShaderVariant::new("rose").with_user_slots(["green1", "noise"]).expect("slots");
        let mut user = UserUniforms::new();
        user.set("noise", UniformValue::Scalar(0.25));
        user.set("green1", UniformValue::Vector(vec![0.1, 0.2]));
        let packed = user.pack(&variant).expect("pack");
        assert_eq!(packed[0], [0.1, 0.2, 0.0, 0.0]);
        assert_eq!(packed[1], [0.25, 0.0, 0.0, 0.0]);
        assert_eq!(packed[2], [0.0; 4]);

        user.set("missing", UniformValue::Scalar(1.0));
        assert!(matches!(user.pack(&variant), Err(VatError::UnknownUniform { .. })));
    }

    #[test]
    fn too_many_slots_is_rejected() {
        let err = ShaderVariant::new("wide").with_user_slots(["a", "b", "c", "d", "e"]).expect_err("limit");
        assert!(matches!(err, VatError::TooManyUniforms { count: 5, .. }));
    }

    #[test]
    fn params_deserialize_with_partial_fields() {
        let params: VatMaterialParams = serde_json::from_str(r#"{"roughness": 0.9}"#).expect("params");
        assert_eq!(params.roughness, 0.9);
        assert_eq!(params.metalness, 0.6);
        assert_eq!(params.attenuation_distance, None);
        let uniform = MaterialUniform::pack(&params, [[0.0; 4]; 4]);
        assert_eq!(uniform.surface[0], 0.9);
        assert_eq!(uniform.transmission[3], INFINITE_DISTANCE);
    }
}
