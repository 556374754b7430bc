//! Pointer to hot-spot bridge.
//!
//! The tracker is the only writer of the hot spot; the compute tick and the
//! highlight pass hold readers. The cell keeps just the latest sample.

use crate::camera::{Ray, ViewCamera};
use crate::logging;
use glam::{Mat4, Vec2};
use std::cell::Cell;
use std::rc::Rc;
use winit::dpi::PhysicalSize;

/// Sole writer of the hot spot. Not `Clone`.
#[derive(Debug)]
pub struct HotSpotWriter {
    cell: Rc<Cell<Option<Vec2>>>,
}

#[derive(Debug, Clone)]
pub struct HotSpotReader {
    cell: Rc<Cell<Option<Vec2>>>,
}

pub fn hot_spot_channel() -> (HotSpotWriter, HotSpotReader) {
    let cell = Rc::new(Cell::new(None));
    (HotSpotWriter { cell: Rc::clone(&cell) }, HotSpotReader { cell })
}

impl HotSpotWriter {
    pub fn publish(&self, hot_spot: Option<Vec2>) {
        self.cell.set(hot_spot);
    }

    pub fn reader(&self) -> HotSpotReader {
        HotSpotReader { cell: Rc::clone(&self.cell) }
    }
}

impl HotSpotReader {
    pub fn get(&self) -> Option<Vec2> {
        self.cell.get()
    }
}

/// Something a pointer ray can hit, reporting surface UV at the hit.
pub trait InteractiveSurface {
    fn intersect_uv(&self, ray: &Ray) -> Option<Vec2>;
}

/// Finite horizontal plane placed by `transform`, same layout as
/// [`crate::geometry::VatGeometry::plane`].
#[derive(Debug, Clone)]
pub struct InteractivePlane {
    pub width: f32,
    pub depth: f32,
    pub transform: Mat4,
}

impl InteractivePlane {
    pub fn new(width: f32, depth: f32) -> Self {
        Self { width, depth, transform: Mat4::IDENTITY }
    }

    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }
}

impl InteractiveSurface for InteractivePlane {
    fn intersect_uv(&self, ray: &Ray) -> Option<Vec2> {
        let local = ray.transformed(self.transform.inverse());
        if local.direction.y.abs() <= f32::EPSILON {
            return None;
        }
        let t = -local.origin.y / local.direction.y;
        if t < 0.0 {
            return None;
        }
        let hit = local.at(t);
        let u = hit.x / self.width + 0.5;
        let v = 0.5 - hit.z / self.depth;
        if (0.0..=1.0).contains(&u) && (0.0..=1.0).contains(&v) {
            Some(Vec2::new(u, v))
        } else {
            None
        }
    }
}

/// Turns pointer samples into hot-spot writes.
pub struct PointerTracker {
    writer: HotSpotWriter,
    surface: Box<dyn InteractiveSurface>,
    last: Option<Vec2>,
}

impl PointerTracker {
    pub fn new(writer: HotSpotWriter, surface: Box<dyn InteractiveSurface>) -> Self {
        Self { writer, surface, last: None }
    }

    pub fn reader(&self) -> HotSpotReader {
        self.writer.reader()
    }

    pub fn pointer_moved(&mut self, camera: &ViewCamera, screen: Vec2, viewport: PhysicalSize<u32>) -> Option<Vec2> {
        let hit = camera.screen_ray(screen, viewport).and_then(|ray| self.surface.intersect_uv(&ray));
        self.publish(hit);
        hit
    }

    pub fn pointer_left(&mut self) {
        self.publish(None);
    }

    fn publish(&mut self, hit: Option<Vec2>) {
        if hit.is_some() != self.last.is_some() {
            log::trace!(target: logging::TRIGGER, "hot spot {}", if hit.is_some() { "entered" } else { "cleared" });
        }
        self.last = hit;
        self.writer.publish(hit);
    }
}
