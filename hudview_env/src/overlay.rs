//! Screen overlay surface that hosts HUD labels.

use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};

use crate::types::{CullHint, HandleId, Rgba};

/// Visual style applied to a label when it is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelStyle {
    /// Style sheet element id (e.g. `ship.label`)
    pub element_id: String,

    /// Text color
    pub color: Rgba,

    /// Drop shadow color
    pub shadow_color: Rgba,
}

impl Default for LabelStyle {
    fn default() -> Self {
        Self {
            element_id: "ship.label".to_string(),
            color: Rgba::GREEN,
            shadow_color: Rgba::BLACK,
        }
    }
}

/// The 2D GUI layer labels are attached to.
///
/// A handle is created detached. Attaching twice is not guarded by the
/// surface; callers check [`OverlaySurface::is_attached`] first.
pub trait OverlaySurface {
    /// Creates a detached label and returns its handle.
    fn create_label(&mut self, style: &LabelStyle, text: &str) -> HandleId;

    /// Replaces the label text.
    fn set_text(&mut self, handle: HandleId, text: &str);

    /// Preferred on-screen size of the label in pixels.
    fn preferred_size(&self, handle: HandleId) -> Vector2<f32>;

    /// Moves the label to a screen-space translation.
    fn set_translation(&mut self, handle: HandleId, translation: Vector3<f32>);

    /// Sets whether the label is drawn.
    fn set_cull_hint(&mut self, handle: HandleId, hint: CullHint);

    /// Returns true if the label currently has a parent on screen.
    fn is_attached(&self, handle: HandleId) -> bool;

    /// Attaches the label to the overlay root.
    fn attach(&mut self, handle: HandleId);

    /// Removes the label from its parent.
    fn detach(&mut self, handle: HandleId);

    /// Destroys the label. The handle is invalid afterwards.
    fn release(&mut self, handle: HandleId);
}
