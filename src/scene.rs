//! Turns a [`VatConfig`] into what the renderer consumes: loaded assets, the
//! surface descriptor and parameters, and the instance compute seed.

use crate::assembly::{SurfaceDescriptor, SurfaceKind, SurfaceParams};
use crate::atlas::VatAtlas;
use crate::config::VatConfig;
use crate::demo_assets::ProceduralPlant;
use crate::frame_compute::FrameComputeSeed;
use crate::geometry::VatGeometry;
use crate::instance_state::TickParams;
use crate::layout::InstanceLayout;
use crate::logging;
use crate::material::ShaderVariant;
use crate::mesh_source::MeshSource;
use anyhow::{bail, Context, Result};
use glam::Vec2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct SceneAssets {
    pub geometry: Arc<VatGeometry>,
    pub atlas: Arc<VatAtlas>,
    pub shader: Arc<ShaderVariant>,
}

impl SceneAssets {
    /// Loads the configured atlas, mesh and shader stages. Without an atlas the
    /// procedural plant supplies both geometry and animation.
    pub fn load(config: &VatConfig) -> Result<Self> {
        let (mut geometry, atlas) = match (&config.atlas, &config.mesh.path) {
            (Some(paths), Some(mesh)) => {
                let atlas = VatAtlas::load(paths)
                    .with_context(|| format!("Failed to load atlas {}", paths.meta.display()))?;
                (load_mesh(mesh)?, atlas)
            }
            (Some(paths), None) => bail!("atlas {} is configured without a mesh path", paths.meta.display()),
            (None, mesh) => {
                let (plant_geometry, atlas) = ProceduralPlant::default().build()?;
                let geometry = match mesh {
                    Some(path) => load_mesh(path)?,
                    None => plant_geometry,
                };
                log::info!(target: logging::ATLAS, "using procedural demo atlas {}", atlas.fingerprint().short());
                (geometry, atlas)
            }
        };
        geometry.ensure_atlas_uv(atlas.meta());

        let mut shader = ShaderVariant::new(config.shader.label.clone());
        if let Some(path) = config.shader.vertex.as_ref() {
            shader = shader.with_vertex(read_stage(path)?);
        }
        if let Some(path) = config.shader.fragment.as_ref() {
            shader = shader.with_fragment(read_stage(path)?);
        }
        let shader = shader.with_user_slots(config.shader.user_slots.iter().cloned())?;

        Ok(Self { geometry: Arc::new(geometry), atlas: Arc::new(atlas), shader: Arc::new(shader) })
    }

    /// Files whose edits should trigger a reload.
    pub fn watched_paths(config: &VatConfig) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(atlas) = config.atlas.as_ref() {
            paths.push(atlas.meta.clone());
            paths.push(atlas.positions.clone());
            paths.extend(atlas.normals.clone());
        }
        paths.extend(config.mesh.path.clone());
        paths.extend(config.shader.vertex.clone());
        paths.extend(config.shader.fragment.clone());
        paths
    }
}

fn load_mesh(path: &Path) -> Result<VatGeometry> {
    MeshSource::resolve(path)?.load()
}

fn read_stage(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read shader stage {}", path.display()))
}

/// Everything needed to sync the assembly and seed the instance compute.
#[derive(Debug, Clone)]
pub struct ScenePlan {
    pub descriptor: SurfaceDescriptor,
    pub params: SurfaceParams,
    pub seed: FrameComputeSeed,
}

impl ScenePlan {
    /// Placements are drawn from the seeded RNG first, then the per-instance
    /// duration profiles, so the same seed always yields the same field.
    pub fn new(config: &VatConfig, assets: &SceneAssets) -> Result<Self> {
        let count = config.instancing.clamped_count();
        if config.instancing.enabled && count < config.instancing.count {
            log::warn!(
                target: logging::APP,
                "instance count {} clamped to {count}",
                config.instancing.count
            );
        }
        let (kind, layout, seed) = if config.instancing.enabled {
            let mut rng = StdRng::seed_from_u64(config.instancing.seed);
            let layout = InstanceLayout::scatter(count, &config.instancing.layout_params(), &mut rng);
            let durations = config.instancing.durations.generate(count, &mut rng);
            let seed =
                FrameComputeSeed::new(durations, layout.plane_uvs(), config.instancing.initially_animated)?;
            (SurfaceKind::Instanced { count: count as u32 }, Some(Arc::new(layout)), seed)
        } else {
            (SurfaceKind::Single, None, FrameComputeSeed::default())
        };
        Ok(Self {
            descriptor: SurfaceDescriptor {
                geometry: assets.geometry.clone(),
                atlas: assets.atlas.clone(),
                shader: assets.shader.clone(),
                kind,
            },
            params: SurfaceParams { material: config.material.clone(), user: config.uniforms.clone(), layout },
            seed,
        })
    }
}

/// Shared inputs of this frame's instance tick.
pub fn tick_params(config: &VatConfig, delta_seconds: f32, hot_spot: Option<Vec2>) -> TickParams {
    TickParams {
        delta_seconds: if config.playback.paused { 0.0 } else { delta_seconds },
        speed: config.playback.speed,
        peak: config.instancing.peak,
        manual: config.playback.manual_ratio(),
        hot_spot,
        policy: config.trigger,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlaybackModeKind;

    #[test]
    fn default_config_builds_procedural_instanced_plan() {
        let config = VatConfig::default();
        let assets = SceneAssets::load(&config).expect("assets");
        assert!(assets.geometry.bind_to(assets.atlas.meta()).is_animated());
        let plan = ScenePlan::new(&config, &assets).expect("plan");
        assert_eq!(plan.descriptor.kind, SurfaceKind::Instanced { count: 1000 });
        assert_eq!(plan.seed.count(), 1000);
        assert_eq!(plan.params.layout.as_ref().map(|l| l.len()), Some(1000));
    }

    #[test]
    fn same_seed_gives_identical_plans() {
        let config = VatConfig::default();
        let assets = SceneAssets::load(&config).expect("assets");
        let a = ScenePlan::new(&config, &assets).expect("plan");
        let b = ScenePlan::new(&config, &assets).expect("plan");
        assert_eq!(a.seed, b.seed);
        assert_eq!(a.params, b.params);
        assert_eq!(a.descriptor.key(), b.descriptor.key());
    }

    #[test]
    fn disabled_instancing_yields_single_surface() {
        let mut config = VatConfig::default();
        config.instancing.enabled = false;
        let assets = SceneAssets::load(&config).expect("assets");
        let plan = ScenePlan::new(&config, &assets).expect("plan");
        assert_eq!(plan.descriptor.kind, SurfaceKind::Single);
        assert_eq!(plan.seed.count(), 0);
        assert!(plan.params.layout.is_none());
    }

    #[test]
    fn zero_instances_stay_instanced_and_empty() {
        let mut config = VatConfig::default();
        config.instancing.count = 0;
        let assets = SceneAssets::load(&config).expect("assets");
        let plan = ScenePlan::new(&config, &assets).expect("plan");
        assert_eq!(plan.descriptor.kind, SurfaceKind::Instanced { count: 0 });
        assert_eq!(plan.descriptor.kind.instance_count(), 0);
        assert_eq!(plan.seed.count(), 0);
        assert_eq!(plan.params.layout.as_ref().map(|l| l.len()), Some(0));
    }

    #[test]
    fn atlas_without_mesh_is_rejected() {
        let mut config = VatConfig::default();
        config.atlas = Some(crate::atlas::AtlasPaths {
            meta: "meta.json".into(),
            positions: "positions.exr".into(),
            normals: None,
        });
        assert!(SceneAssets::load(&config).is_err());
    }

    #[test]
    fn tick_params_follow_playback() {
        let mut config = VatConfig::default();
        config.playback.paused = true;
        config.playback.mode = PlaybackModeKind::Manual;
        config.playback.ratio = 0.3;
        let params = tick_params(&config, 0.016, Some(Vec2::splat(0.5)));
        assert_eq!(params.delta_seconds, 0.0);
        assert_eq!(params.manual, Some(0.3));
        assert_eq!(params.hot_spot, Some(Vec2::splat(0.5)));
    }
}
