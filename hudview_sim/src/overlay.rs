//! Recording overlay and scene.
//!
//! In-memory implementations of the display traits that keep every handle's
//! state and count the calls made on them. Scenario invariants are checked
//! against these records.

use hudview_env::{
    CullHint, EnvError, HandleId, LabelStyle, ModelScene, OverlaySurface, SubjectClass, SubjectId,
};
use nalgebra::{UnitQuaternion, Vector2, Vector3};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::warn;

/// Approximate glyph box of the default label font, in pixels.
const GLYPH_WIDTH: f32 = 8.0;
const LINE_HEIGHT: f32 = 16.0;

/// A label as the overlay currently holds it.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedLabel {
    pub element_id: String,
    pub text: String,
    pub attached: bool,
    pub cull: CullHint,
    pub translation: Vector3<f32>,
}

/// Overlay call counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OverlayStats {
    pub created: u64,
    pub released: u64,
    pub attaches: u64,
    pub detaches: u64,
    /// `attach` on a label that already had a parent
    pub double_attaches: u64,
    /// Calls naming a handle that was never issued or already released
    pub unknown_handles: u64,
}

#[derive(Debug, Default)]
pub struct RecordingOverlay {
    labels: BTreeMap<HandleId, RecordedLabel>,
    next: u64,
    stats: OverlayStats,
}

impl RecordingOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn label(&self, handle: HandleId) -> Result<&RecordedLabel, EnvError> {
        self.labels.get(&handle).ok_or(EnvError::HandleNotFound(handle))
    }

    /// Handles not yet released.
    pub fn live_handles(&self) -> usize {
        self.labels.len()
    }

    pub fn attached_count(&self) -> usize {
        self.labels.values().filter(|l| l.attached).count()
    }

    pub fn stats(&self) -> OverlayStats {
        self.stats
    }

    fn label_mut(&mut self, handle: HandleId, op: &str) -> Option<&mut RecordedLabel> {
        let label = self.labels.get_mut(&handle);
        if label.is_none() {
            warn!(%handle, op, "overlay call on unknown handle");
            self.stats.unknown_handles += 1;
        }
        label
    }
}

impl OverlaySurface for RecordingOverlay {
    fn create_label(&mut self, style: &LabelStyle, text: &str) -> HandleId {
        self.next += 1;
        let handle = HandleId(self.next);
        self.labels.insert(
            handle,
            RecordedLabel {
                element_id: style.element_id.clone(),
                text: text.to_string(),
                attached: false,
                cull: CullHint::Inherit,
                translation: Vector3::zeros(),
            },
        );
        self.stats.created += 1;
        handle
    }

    fn set_text(&mut self, handle: HandleId, text: &str) {
        if let Some(label) = self.label_mut(handle, "set_text") {
            label.text = text.to_string();
        }
    }

    fn preferred_size(&self, handle: HandleId) -> Vector2<f32> {
        let chars = self.labels.get(&handle).map_or(0, |l| l.text.chars().count());
        Vector2::new(chars as f32 * GLYPH_WIDTH, LINE_HEIGHT)
    }

    fn set_translation(&mut self, handle: HandleId, translation: Vector3<f32>) {
        if let Some(label) = self.label_mut(handle, "set_translation") {
            label.translation = translation;
        }
    }

    fn set_cull_hint(&mut self, handle: HandleId, hint: CullHint) {
        if let Some(label) = self.label_mut(handle, "set_cull_hint") {
            label.cull = hint;
        }
    }

    fn is_attached(&self, handle: HandleId) -> bool {
        self.labels.get(&handle).is_some_and(|l| l.attached)
    }

    fn attach(&mut self, handle: HandleId) {
        let Some(label) = self.label_mut(handle, "attach") else {
            return;
        };
        let already = label.attached;
        label.attached = true;
        self.stats.attaches += 1;
        if already {
            self.stats.double_attaches += 1;
        }
    }

    fn detach(&mut self, handle: HandleId) {
        if let Some(label) = self.label_mut(handle, "detach") {
            label.attached = false;
            self.stats.detaches += 1;
        }
    }

    fn release(&mut self, handle: HandleId) {
        if self.labels.remove(&handle).is_some() {
            self.stats.released += 1;
        } else {
            warn!(%handle, "released unknown label");
            self.stats.unknown_handles += 1;
        }
    }
}

// ============================================================================
// SCENE
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedModel {
    pub subject: SubjectId,
    pub class: SubjectClass,
    pub position: Vector3<f32>,
    pub rotation: UnitQuaternion<f32>,
    pub cull: CullHint,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SceneStats {
    pub spawned: u64,
    pub despawned: u64,
    pub unknown_handles: u64,
}

#[derive(Debug, Default)]
pub struct RecordingScene {
    models: BTreeMap<HandleId, RecordedModel>,
    next: u64,
    stats: SceneStats,
}

impl RecordingScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model(&self, handle: HandleId) -> Result<&RecordedModel, EnvError> {
        self.models.get(&handle).ok_or(EnvError::HandleNotFound(handle))
    }

    pub fn live_handles(&self) -> usize {
        self.models.len()
    }

    pub fn stats(&self) -> SceneStats {
        self.stats
    }

    fn model_mut(&mut self, handle: HandleId) -> Option<&mut RecordedModel> {
        let model = self.models.get_mut(&handle);
        if model.is_none() {
            warn!(%handle, "scene call on unknown handle");
            self.stats.unknown_handles += 1;
        }
        model
    }
}

impl ModelScene for RecordingScene {
    fn spawn_model(&mut self, subject: SubjectId, class: SubjectClass) -> HandleId {
        self.next += 1;
        let handle = HandleId(self.next);
        self.models.insert(
            handle,
            RecordedModel {
                subject,
                class,
                position: Vector3::zeros(),
                rotation: UnitQuaternion::identity(),
                cull: CullHint::Inherit,
            },
        );
        self.stats.spawned += 1;
        handle
    }

    fn set_transform(&mut self, handle: HandleId, position: Vector3<f32>, rotation: UnitQuaternion<f32>) {
        if let Some(model) = self.model_mut(handle) {
            model.position = position;
            model.rotation = rotation;
        }
    }

    fn set_cull_hint(&mut self, handle: HandleId, hint: CullHint) {
        if let Some(model) = self.model_mut(handle) {
            model.cull = hint;
        }
    }

    fn despawn(&mut self, handle: HandleId) {
        if self.models.remove(&handle).is_some() {
            self.stats.despawned += 1;
        } else {
            warn!(%handle, "despawned unknown model");
            self.stats.unknown_handles += 1;
        }
    }
}
