use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
use winit::dpi::PhysicalSize;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self { origin, direction: direction.normalize_or_zero() }
    }

    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    pub fn transformed(&self, matrix: Mat4) -> Ray {
        Ray {
            origin: matrix.transform_point3(self.origin),
            direction: matrix.transform_vector3(self.direction),
        }
    }
}

/// Perspective camera with a wgpu (0..1 depth) projection.
#[derive(Debug, Clone)]
pub struct ViewCamera {
    pub eye: Vec3,
    pub target: Vec3,
    pub fov_y_radians: f32,
    pub near: f32,
    pub far: f32,
}

impl ViewCamera {
    pub fn new(eye: Vec3, target: Vec3, fov_y_radians: f32) -> Self {
        Self { eye, target, fov_y_radians, near: 0.05, far: 200.0 }
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, self.target, Vec3::Y)
    }

    pub fn projection(&self, viewport: PhysicalSize<u32>) -> Mat4 {
        let aspect = if viewport.height > 0 { viewport.width as f32 / viewport.height as f32 } else { 1.0 };
        Mat4::perspective_rh(self.fov_y_radians, aspect.max(1e-4), self.near, self.far)
    }

    pub fn view_projection(&self, viewport: PhysicalSize<u32>) -> Mat4 {
        self.projection(viewport) * self.view()
    }

    /// World-space ray through a pixel position (origin top-left).
    pub fn screen_ray(&self, screen: Vec2, viewport: PhysicalSize<u32>) -> Option<Ray> {
        if viewport.width == 0 || viewport.height == 0 {
            return None;
        }
        let ndc = Vec2::new(
            2.0 * screen.x / viewport.width as f32 - 1.0,
            1.0 - 2.0 * screen.y / viewport.height as f32,
        );
        let inverse = self.view_projection(viewport).inverse();
        let far = inverse * Vec4::new(ndc.x, ndc.y, 1.0, 1.0);
        if far.w.abs() < f32::EPSILON {
            return None;
        }
        let direction = far.truncate() / far.w - self.eye;
        if direction.length_squared() <= f32::EPSILON {
            return None;
        }
        Some(Ray::new(self.eye, direction))
    }
}

/// Yaw/pitch/distance rig around a target point.
#[derive(Debug, Clone)]
pub struct OrbitRig {
    pub target: Vec3,
    pub distance: f32,
    pub yaw: f32,
    pub pitch: f32,
}

impl OrbitRig {
    const PITCH_LIMIT: f32 = std::f32::consts::FRAC_PI_2 - 0.02;

    pub fn new(target: Vec3, distance: f32, yaw: f32, pitch: f32) -> Self {
        Self { target, distance: distance.max(0.1), yaw, pitch: pitch.clamp(-Self::PITCH_LIMIT, Self::PITCH_LIMIT) }
    }

    pub fn eye(&self) -> Vec3 {
        let rotation = Quat::from_euler(glam::EulerRot::YXZ, self.yaw, -self.pitch, 0.0);
        self.target + rotation * Vec3::new(0.0, 0.0, self.distance)
    }

    pub fn camera(&self, fov_y_radians: f32) -> ViewCamera {
        ViewCamera::new(self.eye(), self.target, fov_y_radians)
    }

    pub fn drag(&mut self, delta_pixels: Vec2, radians_per_pixel: f32) {
        self.yaw -= delta_pixels.x * radians_per_pixel;
        self.pitch = (self.pitch + delta_pixels.y * radians_per_pixel).clamp(-Self::PITCH_LIMIT, Self::PITCH_LIMIT);
    }

    pub fn zoom(&mut self, steps: f32) {
        self.distance = (self.distance * 0.9_f32.powf(steps)).clamp(0.25, 100.0);
    }
}
