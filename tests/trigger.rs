use glam::{Mat4, Vec2, Vec3};
use kestrel_vat::camera::{Ray, ViewCamera};
use kestrel_vat::highlight::HighlightParams;
use kestrel_vat::trigger::{hot_spot_channel, InteractivePlane, InteractiveSurface, PointerTracker};
use winit::dpi::PhysicalSize;

const VIEWPORT: PhysicalSize<u32> = PhysicalSize::new(800, 600);

fn tracker() -> (PointerTracker, kestrel_vat::trigger::HotSpotReader) {
    let (writer, reader) = hot_spot_channel();
    (PointerTracker::new(writer, Box::new(InteractivePlane::new(2.0, 2.0))), reader)
}

fn camera() -> ViewCamera {
    ViewCamera::new(Vec3::new(0.0, 3.0, 3.0), Vec3::ZERO, 0.8)
}

#[test]
fn screen_center_hits_plane_center() {
    let (mut tracker, reader) = tracker();
    let hit = tracker.pointer_moved(&camera(), Vec2::new(400.0, 300.0), VIEWPORT).expect("hit");
    assert!((hit - Vec2::splat(0.5)).length() < 1e-3, "{hit:?}");
    assert_eq!(reader.get(), Some(hit));
}

#[test]
fn leaving_the_plane_clears_the_hot_spot() {
    let (mut tracker, reader) = tracker();
    tracker.pointer_moved(&camera(), Vec2::new(400.0, 300.0), VIEWPORT);
    assert!(reader.get().is_some());

    // top edge of the screen looks past the far edge of the plane
    assert_eq!(tracker.pointer_moved(&camera(), Vec2::new(400.0, 0.0), VIEWPORT), None);
    assert_eq!(reader.get(), None);

    tracker.pointer_moved(&camera(), Vec2::new(400.0, 300.0), VIEWPORT);
    tracker.pointer_left();
    assert_eq!(reader.get(), None);
}

#[test]
fn zero_sized_viewport_never_hits() {
    let (mut tracker, reader) = tracker();
    assert_eq!(tracker.pointer_moved(&camera(), Vec2::ZERO, PhysicalSize::new(0, 0)), None);
    assert_eq!(reader.get(), None);
}

#[test]
fn transformed_plane_reports_local_uv() {
    let plane = InteractivePlane::new(2.0, 2.0).with_transform(Mat4::from_translation(Vec3::new(5.0, 1.0, 0.0)));
    let ray = Ray::new(Vec3::new(5.0, 4.0, 0.0), Vec3::NEG_Y);
    let uv = plane.intersect_uv(&ray).expect("hit");
    assert!((uv - Vec2::splat(0.5)).length() < 1e-5);
    assert_eq!(plane.intersect_uv(&Ray::new(Vec3::new(0.0, 4.0, 0.0), Vec3::NEG_Y)), None);
}

#[test]
fn highlight_weight_matches_the_hot_spot() {
    let params = HighlightParams::default();
    let hot = Some(Vec2::splat(0.5));
    assert_eq!(params.weight(Vec2::splat(0.5), hot), 1.0);
    assert_eq!(params.weight(Vec2::new(0.5, 0.9), hot), 0.0);
    assert_eq!(params.weight(Vec2::splat(0.5), None), 0.0);
    let edge = params.weight(Vec2::new(0.5 + params.radius + params.feather * 0.5, 0.5), hot);
    assert!(edge > 0.0 && edge < 1.0);
}
