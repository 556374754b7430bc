use crate::instance_state::falloff;
use crate::material::{parse_hex_color, HexColor};
use bytemuck::{Pod, Zeroable};
use glam::Vec2;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HighlightParams {
    #[serde(default = "HighlightParams::default_radius")]
    pub radius: f32,
    #[serde(default = "HighlightParams::default_feather")]
    pub feather: f32,
    #[serde(default = "HighlightParams::default_color")]
    pub color: HexColor,
    #[serde(default = "HighlightParams::default_overlay")]
    pub overlay: HexColor,
}

impl HighlightParams {
    const fn default_radius() -> f32 {
        0.05
    }

    const fn default_feather() -> f32 {
        0.025
    }

    fn default_color() -> HexColor {
        HexColor::new("#ff3366")
    }

    fn default_overlay() -> HexColor {
        HexColor::new("#cbc9c9")
    }

    /// Highlight coverage at `uv` for the current hot spot.
    pub fn weight(&self, uv: Vec2, hot_spot: Option<Vec2>) -> f32 {
        match hot_spot {
            Some(hot) => falloff(uv.distance(hot), self.radius, self.feather),
            None => 0.0,
        }
    }

    pub fn uniform(&self, hot_spot: Option<Vec2>) -> HighlightUniform {
        let (hot, active) = match hot_spot {
            Some(hot) => (hot.to_array(), 1.0),
            None => ([-1.0, -1.0], 0.0),
        };
        let color = parse_hex_color(self.color.as_str()).unwrap_or([1.0, 0.0, 1.0]);
        let overlay = parse_hex_color(self.overlay.as_str()).unwrap_or([0.8, 0.8, 0.8]);
        HighlightUniform {
            hot_spot: hot,
            radius: self.radius,
            feather: self.feather.max(0.0),
            color: [color[0], color[1], color[2], active],
            overlay: [overlay[0], overlay[1], overlay[2], 1.0],
        }
    }
}

impl Default for HighlightParams {
    fn default() -> Self {
        Self {
            radius: Self::default_radius(),
            feather: Self::default_feather(),
            color: Self::default_color(),
            overlay: Self::default_overlay(),
        }
    }
}

/// `color.w` is 1 while a hot spot is active.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct HighlightUniform {
    pub hot_spot: [f32; 2],
    pub radius: f32,
    pub feather: f32,
    pub color: [f32; 4],
    pub overlay: [f32; 4],
}
