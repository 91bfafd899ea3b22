//! Camera/projection service consumed by the render step.

use nalgebra::Vector3;

/// Read-only view of the active camera.
///
/// ```text
///   eye ──direction──►   world point p
///    │                      │
///    └──── screen_coordinates(p) ──► (x, y, depth) in pixels
/// ```
pub trait CameraProjection {
    /// Eye position in world space.
    fn location(&self) -> Vector3<f32>;

    /// Unit forward direction in world space.
    fn direction(&self) -> Vector3<f32>;

    /// Maps a world-space point to screen space.
    ///
    /// `x`/`y` are pixels from the bottom-left of the viewport, `z` is the
    /// normalized depth used to order overlay elements.
    fn screen_coordinates(&self, world: &Vector3<f32>) -> Vector3<f32>;

    /// Current viewport size in pixels `(width, height)`.
    fn viewport(&self) -> (u32, u32);
}
