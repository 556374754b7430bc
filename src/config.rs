use crate::atlas::AtlasPaths;
use crate::frame_clock::PlaybackMode;
use crate::highlight::HighlightParams;
use crate::instance_state::{StateDurationRanges, TriggerPolicy};
use crate::layout::LayoutParams;
use crate::material::{HexColor, UniformValue, UserUniforms, VatMaterialParams};
use anyhow::{Context, Result};
use log::LevelFilter;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "config/vat.json";
pub const MAX_INSTANCE_COUNT: usize = 4096;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub vsync: bool,
    #[serde(default)]
    pub fullscreen: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self { title: "Kestrel VAT".to_string(), width: 1280, height: 720, vsync: true, fullscreen: false }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: LevelFilter,
    #[serde(default = "LoggingConfig::default_filters")]
    pub filters: BTreeMap<String, LevelFilter>,
}

impl LoggingConfig {
    const fn default_level() -> LevelFilter {
        LevelFilter::Info
    }

    fn default_filters() -> BTreeMap<String, LevelFilter> {
        [("wgpu_core", LevelFilter::Warn), ("wgpu_hal", LevelFilter::Warn), ("naga", LevelFilter::Warn)]
            .into_iter()
            .map(|(target, level)| (target.to_string(), level))
            .collect()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: Self::default_level(), filters: Self::default_filters() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackModeKind {
    #[default]
    Automatic,
    Manual,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlaybackConfig {
    #[serde(default)]
    pub mode: PlaybackModeKind,
    #[serde(default)]
    pub ratio: f32,
    #[serde(default = "PlaybackConfig::default_speed")]
    pub speed: f32,
    #[serde(default)]
    pub paused: bool,
    #[serde(default = "PlaybackConfig::default_headroom")]
    pub headroom_frames: f32,
}

impl PlaybackConfig {
    const fn default_speed() -> f32 {
        1.0
    }

    const fn default_headroom() -> f32 {
        crate::frame_clock::DEFAULT_HEADROOM_FRAMES
    }

    pub fn mode(&self) -> PlaybackMode {
        match self.mode {
            PlaybackModeKind::Automatic => PlaybackMode::Automatic,
            PlaybackModeKind::Manual => PlaybackMode::Manual { ratio: self.ratio },
        }
    }

    /// Manual ratio forwarded to the instance tick.
    pub fn manual_ratio(&self) -> Option<f32> {
        match self.mode {
            PlaybackModeKind::Manual => Some(self.ratio),
            PlaybackModeKind::Automatic => None,
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            mode: PlaybackModeKind::default(),
            ratio: 0.0,
            speed: Self::default_speed(),
            paused: false,
            headroom_frames: Self::default_headroom(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InstancingConfig {
    #[serde(default = "InstancingConfig::default_enabled")]
    pub enabled: bool,
    #[serde(default = "InstancingConfig::default_count")]
    pub count: usize,
    #[serde(default = "InstancingConfig::default_seed")]
    pub seed: u64,
    #[serde(default = "InstancingConfig::default_plane_size")]
    pub plane_size: f32,
    #[serde(default = "InstancingConfig::default_scale_min")]
    pub scale_min: f32,
    #[serde(default = "InstancingConfig::default_scale_max")]
    pub scale_max: f32,
    #[serde(default)]
    pub initially_animated: bool,
    #[serde(default = "InstancingConfig::default_peak")]
    pub peak: f32,
    #[serde(default)]
    pub durations: StateDurationRanges,
}

impl InstancingConfig {
    const fn default_enabled() -> bool {
        true
    }

    const fn default_count() -> usize {
        1000
    }

    const fn default_seed() -> u64 {
        7
    }

    const fn default_plane_size() -> f32 {
        2.0
    }

    const fn default_scale_min() -> f32 {
        0.08
    }

    const fn default_scale_max() -> f32 {
        0.144
    }

    const fn default_peak() -> f32 {
        1.0
    }

    pub fn layout_params(&self) -> LayoutParams {
        LayoutParams { plane_size: self.plane_size, scale_min: self.scale_min, scale_max: self.scale_max }
    }

    /// Instance count clamped to the supported range.
    pub fn clamped_count(&self) -> usize {
        self.count.min(MAX_INSTANCE_COUNT)
    }
}

impl Default for InstancingConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            count: Self::default_count(),
            seed: Self::default_seed(),
            plane_size: Self::default_plane_size(),
            scale_min: Self::default_scale_min(),
            scale_max: Self::default_scale_max(),
            initially_animated: false,
            peak: Self::default_peak(),
            durations: StateDurationRanges::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct MeshConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ShaderConfig {
    #[serde(default = "ShaderConfig::default_label")]
    pub label: String,
    #[serde(default)]
    pub vertex: Option<PathBuf>,
    #[serde(default)]
    pub fragment: Option<PathBuf>,
    #[serde(default = "ShaderConfig::default_user_slots")]
    pub user_slots: Vec<String>,
}

impl ShaderConfig {
    fn default_label() -> String {
        "vat_plant".to_string()
    }

    fn default_user_slots() -> Vec<String> {
        vec!["green1".to_string(), "green2".to_string(), "noise".to_string()]
    }
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self { label: Self::default_label(), vertex: None, fragment: None, user_slots: Self::default_user_slots() }
    }
}

fn default_uniforms() -> UserUniforms {
    let mut uniforms = UserUniforms::new();
    uniforms.set("green1", UniformValue::Color(HexColor::new("#325825")));
    uniforms.set("green2", UniformValue::Color(HexColor::new("#4f802b")));
    // displacement strength, normal strength, noise scale xy
    uniforms.set("noise", UniformValue::Vector(vec![0.1, 0.5, 5.0, 20.0]));
    uniforms
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VatConfig {
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Procedural demo atlas when absent.
    #[serde(default)]
    pub atlas: Option<AtlasPaths>,
    #[serde(default)]
    pub mesh: MeshConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub instancing: InstancingConfig,
    #[serde(default)]
    pub trigger: TriggerPolicy,
    #[serde(default)]
    pub highlight: HighlightParams,
    #[serde(default)]
    pub material: VatMaterialParams,
    #[serde(default)]
    pub shader: ShaderConfig,
    #[serde(default = "default_uniforms")]
    pub uniforms: UserUniforms,
}

impl Default for VatConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            logging: LoggingConfig::default(),
            atlas: None,
            mesh: MeshConfig::default(),
            playback: PlaybackConfig::default(),
            instancing: InstancingConfig::default(),
            trigger: TriggerPolicy::default(),
            highlight: HighlightParams::default(),
            material: VatMaterialParams::default(),
            shader: ShaderConfig::default(),
            uniforms: default_uniforms(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VatConfigOverrides {
    pub config_path: Option<PathBuf>,
    pub count: Option<usize>,
    pub seed: Option<u64>,
    pub single: bool,
    pub paused: Option<bool>,
}

impl VatConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: VatConfig = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse config JSON {}", path.display()))?;
        config.resolve_relative_paths(path.parent().unwrap_or_else(|| Path::new(".")));
        Ok(config)
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(config) => config,
            Err(err) => {
                log::warn!(target: crate::logging::APP, "{err:?}. Using built-in defaults.");
                Self::default()
            }
        }
    }

    pub fn apply_overrides(&mut self, overrides: &VatConfigOverrides) {
        if let Some(count) = overrides.count {
            self.instancing.count = count;
        }
        if let Some(seed) = overrides.seed {
            self.instancing.seed = seed;
        }
        if overrides.single {
            self.instancing.enabled = false;
        }
        if let Some(paused) = overrides.paused {
            self.playback.paused = paused;
        }
    }

    /// Asset paths in the file are relative to the config file's directory.
    fn resolve_relative_paths(&mut self, base: &Path) {
        let fix = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        if let Some(atlas) = self.atlas.as_mut() {
            fix(&mut atlas.meta);
            fix(&mut atlas.positions);
            if let Some(normals) = atlas.normals.as_mut() {
                fix(normals);
            }
        }
        if let Some(mesh) = self.mesh.path.as_mut() {
            fix(mesh);
        }
        if let Some(vertex) = self.shader.vertex.as_mut() {
            fix(vertex);
        }
        if let Some(fragment) = self.shader.fragment.as_mut() {
            fix(fragment);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_uses_defaults() {
        let config: VatConfig = serde_json::from_str("{}").expect("config");
        assert_eq!(config, VatConfig::default());
        assert_eq!(config.instancing.count, 1000);
        assert_eq!(config.highlight.radius, 0.05);
        assert!(matches!(config.trigger, TriggerPolicy::Edge { release_on_wrap: true, .. }));
    }

    #[test]
    fn overrides_apply_on_top() {
        let mut config = VatConfig::default();
        config.apply_overrides(&VatConfigOverrides {
            count: Some(12),
            seed: Some(99),
            single: true,
            paused: Some(true),
            ..Default::default()
        });
        assert_eq!(config.instancing.count, 12);
        assert_eq!(config.instancing.seed, 99);
        assert!(!config.instancing.enabled);
        assert!(config.playback.paused);
    }

    #[test]
    fn count_is_clamped() {
        let config = InstancingConfig { count: 1_000_000, ..Default::default() };
        assert_eq!(config.clamped_count(), MAX_INSTANCE_COUNT);
    }

    #[test]
    fn manual_playback_builds_manual_mode() {
        let playback: PlaybackConfig = serde_json::from_str(r#"{"mode":"manual","ratio":0.4}"#).expect("playback");
        assert_eq!(playback.mode(), PlaybackMode::Manual { ratio: 0.4 });
        assert_eq!(playback.manual_ratio(), Some(0.4));
    }
}
