//! 3D scene that hosts subject models.

use nalgebra::{UnitQuaternion, Vector3};

use crate::types::{CullHint, HandleId, SubjectClass, SubjectId};

/// The world-space scene graph models live in.
pub trait ModelScene {
    /// Creates a model for a subject of the given class.
    fn spawn_model(&mut self, subject: SubjectId, class: SubjectClass) -> HandleId;

    /// Places the model.
    fn set_transform(&mut self, handle: HandleId, position: Vector3<f32>, rotation: UnitQuaternion<f32>);

    /// Sets whether the model is drawn.
    fn set_cull_hint(&mut self, handle: HandleId, hint: CullHint);

    /// Removes the model from the scene. The handle is invalid afterwards.
    fn despawn(&mut self, handle: HandleId);
}
