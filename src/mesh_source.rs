use crate::demo_assets::ProceduralPlant;
use crate::error::VatError;
use crate::geometry::{compute_normals, VatGeometry, VatVertex};
use anyhow::{anyhow, Context, Result};
use glam::{Vec2, Vec3};
use gltf::mesh::Mode;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where base geometry comes from, decided once from config.
#[derive(Debug, Clone)]
pub enum MeshSource {
    Gltf(PathBuf),
    Procedural(ProceduralPlant),
    Prebuilt(Arc<VatGeometry>),
}

impl MeshSource {
    /// Picks the loader from the file extension.
    pub fn resolve(path: &Path) -> Result<Self, VatError> {
        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or_default().to_ascii_lowercase();
        match extension.as_str() {
            "gltf" | "glb" => Ok(MeshSource::Gltf(path.to_path_buf())),
            _ => Err(VatError::UnsupportedMesh { extension }),
        }
    }

    pub fn load(&self) -> Result<VatGeometry> {
        match self {
            MeshSource::Gltf(path) => load_gltf(path),
            MeshSource::Procedural(plant) => Ok(plant.build()?.0),
            MeshSource::Prebuilt(geometry) => Ok((**geometry).clone()),
        }
    }
}

/// First triangle primitive of the first mesh. `TEXCOORD_1` is taken as the
/// atlas coordinate channel when present; `COLOR_0` is kept for shading masks.
fn load_gltf(path: &Path) -> Result<VatGeometry> {
    let (document, buffers, _) =
        gltf::import(path).with_context(|| format!("Failed to import glTF from {}", path.display()))?;
    let mesh = document.meshes().next().ok_or_else(|| anyhow!("No meshes found in {}", path.display()))?;
    let primitive = mesh
        .primitives()
        .find(|primitive| primitive.mode() == Mode::Triangles)
        .ok_or_else(|| anyhow!("Mesh in {} contains no triangle primitives", path.display()))?;
    let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()]));

    let positions: Vec<Vec3> = reader
        .read_positions()
        .ok_or_else(|| anyhow!("POSITION attribute missing in {}", path.display()))?
        .map(Vec3::from_array)
        .collect();
    let indices: Vec<u32> = reader
        .read_indices()
        .map(|read| read.into_u32().collect())
        .unwrap_or_else(|| (0..positions.len() as u32).collect());
    let normals: Vec<Vec3> = reader
        .read_normals()
        .map(|it| it.map(Vec3::from_array).collect())
        .filter(|normals: &Vec<Vec3>| normals.len() == positions.len())
        .unwrap_or_else(|| compute_normals(&positions, &indices));
    let uvs: Vec<Vec2> = reader
        .read_tex_coords(0)
        .map(|coords| coords.into_f32().map(Vec2::from_array).collect())
        .unwrap_or_default();
    let atlas_uvs: Option<Vec<[f32; 2]>> = reader
        .read_tex_coords(1)
        .map(|coords| coords.into_f32().collect())
        .filter(|coords: &Vec<[f32; 2]>| coords.len() == positions.len());
    let colors: Vec<[f32; 4]> =
        reader.read_colors(0).map(|colors| colors.into_rgba_f32().collect()).unwrap_or_default();

    let vertices = positions
        .iter()
        .enumerate()
        .map(|(i, position)| {
            let mut vertex = VatVertex::new(
                *position,
                normals.get(i).copied().unwrap_or(Vec3::Y).normalize_or_zero(),
                uvs.get(i).copied().unwrap_or(Vec2::ZERO),
            );
            if let Some(color) = colors.get(i) {
                vertex = vertex.with_color(*color);
            }
            if let Some(atlas_uvs) = atlas_uvs.as_ref() {
                vertex.atlas_uv = atlas_uvs[i];
            }
            vertex
        })
        .collect();
    Ok(VatGeometry::new(vertices, indices, atlas_uvs.is_some()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_dispatch_is_case_insensitive() {
        assert!(matches!(MeshSource::resolve(Path::new("rose.GLB")), Ok(MeshSource::Gltf(_))));
        assert!(matches!(MeshSource::resolve(Path::new("rose.gltf")), Ok(MeshSource::Gltf(_))));
        match MeshSource::resolve(Path::new("rose.fbx")) {
            Err(VatError::UnsupportedMesh { extension }) => assert_eq!(extension, "fbx"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(MeshSource::resolve(Path::new("rose")).is_err());
    }

    #[test]
    fn procedural_source_builds_geometry() {
        let geometry = MeshSource::Procedural(ProceduralPlant::default()).load().expect("geometry");
        assert_eq!(geometry.vertex_count() as u32, ProceduralPlant::default().vertex_count());
        assert!(geometry.has_atlas_uv());
    }
}
