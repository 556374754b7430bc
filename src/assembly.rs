//! Renderable surface lifecycle.
//!
//! A surface is built once per structural combination of geometry, atlas,
//! shader variant and kind. Any change to that combination disposes the old
//! surface and creates a new one; other parameter changes are uploaded in
//! place. An instanced surface with no instances is tracked without any
//! backend objects.

use crate::atlas::{Fingerprint, VatAtlas};
use crate::geometry::{AtlasBinding, VatGeometry};
use crate::layout::InstanceLayout;
use crate::logging;
use crate::material::{ParamDirty, ShaderKey, ShaderVariant, UserUniforms, VatMaterialParams};
use anyhow::Result;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceKind {
    Single,
    Instanced { count: u32 },
}

impl SurfaceKind {
    pub fn instance_count(self) -> u32 {
        match self {
            SurfaceKind::Single => 1,
            SurfaceKind::Instanced { count } => count,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SurfaceDescriptor {
    pub geometry: Arc<VatGeometry>,
    pub atlas: Arc<VatAtlas>,
    pub shader: Arc<ShaderVariant>,
    pub kind: SurfaceKind,
}

impl SurfaceDescriptor {
    pub fn key(&self) -> StructuralKey {
        StructuralKey {
            geometry: self.geometry.fingerprint(),
            atlas: self.atlas.fingerprint(),
            shader: self.shader.key(),
            kind: self.kind,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StructuralKey {
    pub geometry: Fingerprint,
    pub atlas: Fingerprint,
    pub shader: ShaderKey,
    pub kind: SurfaceKind,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SurfaceParams {
    pub material: VatMaterialParams,
    pub user: UserUniforms,
    pub layout: Option<Arc<InstanceLayout>>,
}

impl SurfaceParams {
    pub fn diff(&self, other: &SurfaceParams) -> ParamDirty {
        let mut dirty = ParamDirty::empty();
        if self.material != other.material {
            dirty |= ParamDirty::MATERIAL;
        }
        if self.user != other.user {
            dirty |= ParamDirty::USER;
        }
        let same_layout = match (&self.layout, &other.layout) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b) || a == b,
            (None, None) => true,
            _ => false,
        };
        if !same_layout {
            dirty |= ParamDirty::LAYOUT;
        }
        dirty
    }
}

/// Creates, updates and releases the backend objects behind a surface.
pub trait SurfaceFactory {
    type Surface;

    fn create(
        &mut self,
        descriptor: &SurfaceDescriptor,
        binding: &AtlasBinding,
        params: &SurfaceParams,
    ) -> Result<Self::Surface>;

    fn update(&mut self, surface: &mut Self::Surface, params: &SurfaceParams, dirty: ParamDirty) -> Result<()>;

    fn dispose(&mut self, surface: Self::Surface);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Created,
    Recreated,
    Updated(ParamDirty),
    Unchanged,
}

struct LiveSurface<S> {
    key: StructuralKey,
    params: SurfaceParams,
    binding: AtlasBinding,
    /// `None` for an instanced surface with zero instances.
    surface: Option<S>,
}

pub struct VatAssembly<F: SurfaceFactory> {
    factory: F,
    live: Option<LiveSurface<F::Surface>>,
}

impl<F: SurfaceFactory> VatAssembly<F> {
    pub fn new(factory: F) -> Self {
        Self { factory, live: None }
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn factory_mut(&mut self) -> &mut F {
        &mut self.factory
    }

    pub fn surface(&self) -> Option<&F::Surface> {
        self.live.as_ref().and_then(|live| live.surface.as_ref())
    }

    pub fn key(&self) -> Option<StructuralKey> {
        self.live.as_ref().map(|live| live.key)
    }

    pub fn binding(&self) -> Option<&AtlasBinding> {
        self.live.as_ref().map(|live| &live.binding)
    }

    /// Brings the live surface in line with `descriptor` and `params`.
    ///
    /// A structural change builds the replacement first and disposes the old
    /// surface only once that succeeded, so a failed create leaves the
    /// previous surface live.
    pub fn sync(&mut self, descriptor: &SurfaceDescriptor, params: &SurfaceParams) -> Result<SyncOutcome> {
        let key = descriptor.key();
        if let Some(live) = self.live.as_mut() {
            if live.key == key {
                let dirty = live.params.diff(params);
                if dirty.is_empty() {
                    return Ok(SyncOutcome::Unchanged);
                }
                if let Some(surface) = live.surface.as_mut() {
                    self.factory.update(surface, params, dirty)?;
                }
                live.params = params.clone();
                log::debug!(target: logging::ASSEMBLY, "updated surface parameters {dirty:?}");
                return Ok(SyncOutcome::Updated(dirty));
            }
        }

        let binding = descriptor.geometry.bind_to(descriptor.atlas.meta());
        if let AtlasBinding::RestPose { reason } = &binding {
            let warn_key = format!(
                "rest-pose:{}:{}",
                descriptor.geometry.fingerprint().short(),
                descriptor.atlas.fingerprint().short()
            );
            logging::warn_once(logging::ASSEMBLY, &warn_key, || {
                format!("rendering '{}' in rest pose: {reason}", descriptor.shader.label)
            });
        }
        let surface = if descriptor.kind.instance_count() == 0 {
            None
        } else {
            Some(self.factory.create(descriptor, &binding, params)?)
        };
        let replaced = self.release();
        log::info!(
            target: logging::ASSEMBLY,
            "{} surface '{}' ({:?}, geometry {}, atlas {})",
            if replaced { "recreated" } else { "created" },
            descriptor.shader.label,
            descriptor.kind,
            key.geometry.short(),
            key.atlas.short()
        );
        self.live = Some(LiveSurface { key, params: params.clone(), binding, surface });
        Ok(if replaced { SyncOutcome::Recreated } else { SyncOutcome::Created })
    }

    /// Disposes the live surface, if any. Returns whether one existed.
    pub fn release(&mut self) -> bool {
        match self.live.take() {
            Some(live) => {
                if let Some(surface) = live.surface {
                    self.factory.dispose(surface);
                }
                true
            }
            None => false,
        }
    }
}

impl<F: SurfaceFactory> Drop for VatAssembly<F> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atlas::{AtlasImage, VatMeta};

    #[derive(Default)]
    struct Counting {
        created: usize,
        updated: usize,
        disposed: Vec<usize>,
    }

    impl SurfaceFactory for Counting {
        type Surface = usize;

        fn create(&mut self, _: &SurfaceDescriptor, _: &AtlasBinding, _: &SurfaceParams) -> Result<usize> {
            self.created += 1;
            Ok(self.created)
        }

        fn update(&mut self, _: &mut usize, _: &SurfaceParams, _: ParamDirty) -> Result<()> {
            self.updated += 1;
            Ok(())
        }

        fn dispose(&mut self, surface: usize) {
            self.disposed.push(surface);
        }
    }

    fn descriptor() -> SurfaceDescriptor {
        let mut geometry = VatGeometry::plane(1.0, 1.0, 1);
        let meta = VatMeta {
            vertex_count: 4,
            frame_count: 2,
            fps: 24.0,
            tex_width: 2,
            tex_height: 4,
            columns: 1,
            frame_stride: 2,
            store_delta: true,
            normals_compressed: false,
        };
        geometry.ensure_atlas_uv(&meta);
        let atlas = VatAtlas::new(meta, AtlasImage::filled(2, 4, [0.0; 4]), None).expect("atlas");
        SurfaceDescriptor {
            geometry: Arc::new(geometry),
            atlas: Arc::new(atlas),
            shader: Arc::new(ShaderVariant::new("test")),
            kind: SurfaceKind::Single,
        }
    }

    #[test]
    fn identical_sync_is_unchanged() {
        let mut assembly = VatAssembly::new(Counting::default());
        let desc = descriptor();
        let params = SurfaceParams::default();
        assert_eq!(assembly.sync(&desc, &params).expect("sync"), SyncOutcome::Created);
        assert_eq!(assembly.sync(&desc, &params).expect("sync"), SyncOutcome::Unchanged);
        assert_eq!(assembly.factory().created, 1);
        assert_eq!(assembly.binding(), Some(&AtlasBinding::Animated));
    }

    #[test]
    fn kind_change_recreates() {
        let mut assembly = VatAssembly::new(Counting::default());
        let mut desc = descriptor();
        let params = SurfaceParams::default();
        assembly.sync(&desc, &params).expect("sync");
        desc.kind = SurfaceKind::Instanced { count: 3 };
        assert_eq!(assembly.sync(&desc, &params).expect("sync"), SyncOutcome::Recreated);
        assert_eq!(assembly.factory().disposed, vec![1]);
        assert_eq!(assembly.surface(), Some(&2));
    }

    #[test]
    fn empty_instanced_surface_creates_nothing() {
        let mut assembly = VatAssembly::new(Counting::default());
        let mut desc = descriptor();
        desc.kind = SurfaceKind::Instanced { count: 0 };
        let mut params = SurfaceParams::default();
        assert_eq!(assembly.sync(&desc, &params).expect("sync"), SyncOutcome::Created);
        assert!(assembly.surface().is_none());
        assert!(assembly.key().is_some());

        params.material.roughness = 0.9;
        assert_eq!(assembly.sync(&desc, &params).expect("sync"), SyncOutcome::Updated(ParamDirty::MATERIAL));
        assert!(assembly.release());
        assert_eq!(assembly.factory().created, 0);
        assert_eq!(assembly.factory().updated, 0);
        assert!(assembly.factory().disposed.is_empty());
    }
}
