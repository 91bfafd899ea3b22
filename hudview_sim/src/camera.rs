//! Pinhole camera for the harness.

use hudview_env::CameraProjection;
use nalgebra::{Isometry3, Perspective3, Point3, Vector3};

/// Perspective camera with a fixed viewport.
///
/// Screen space is pixels from the bottom-left corner, depth in [0, 1].
#[derive(Debug, Clone)]
pub struct PinholeCamera {
    eye: Point3<f32>,
    target: Point3<f32>,
    view: Isometry3<f32>,
    projection: Perspective3<f32>,
    width: u32,
    height: u32,
}

impl PinholeCamera {
    /// Camera at the origin looking down -Z.
    pub fn new(width: u32, height: u32, fovy: f32) -> Self {
        let aspect = width as f32 / height.max(1) as f32;
        let eye = Point3::origin();
        let target = Point3::new(0.0, 0.0, -1.0);
        Self {
            eye,
            target,
            view: Isometry3::look_at_rh(&eye, &target, &Vector3::y()),
            projection: Perspective3::new(aspect, fovy, 0.1, 10_000.0),
            width,
            height,
        }
    }

    /// Moves the camera to `eye`, facing `target`.
    pub fn look_at(&mut self, eye: Vector3<f32>, target: Vector3<f32>) {
        self.eye = Point3::from(eye);
        self.target = Point3::from(target);
        self.view = Isometry3::look_at_rh(&self.eye, &self.target, &Vector3::y());
    }
}

impl Default for PinholeCamera {
    fn default() -> Self {
        Self::new(1280, 720, std::f32::consts::FRAC_PI_3)
    }
}

impl CameraProjection for PinholeCamera {
    fn location(&self) -> Vector3<f32> {
        self.eye.coords
    }

    fn direction(&self) -> Vector3<f32> {
        (self.target - self.eye).normalize()
    }

    fn screen_coordinates(&self, world: &Vector3<f32>) -> Vector3<f32> {
        let ndc = self
            .projection
            .project_point(&self.view.transform_point(&Point3::from(*world)));
        Vector3::new(
            (ndc.x + 1.0) * 0.5 * self.width as f32,
            (ndc.y + 1.0) * 0.5 * self.height as f32,
            (ndc.z + 1.0) * 0.5,
        )
    }

    fn viewport(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
