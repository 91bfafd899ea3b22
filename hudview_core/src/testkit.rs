//! In-crate doubles for the environment traits, used by unit tests.

use async_trait::async_trait;
use hudview_env::{
    CameraProjection, CullHint, HandleId, LabelStyle, ModelScene, OverlaySurface, SubjectClass,
    SubjectId, ViewContext,
};
use nalgebra::{UnitQuaternion, Vector2, Vector3};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::hudview_time::{TemporalSampleBuffer, DEFAULT_HISTORY_CAPACITY};
use crate::source::{AttributeSet, EntitySource, SubjectRecord, Subscription};

// ============================================================================
// SOURCE
// ============================================================================

struct SubState {
    required: AttributeSet,
    dirty: bool,
    snapshot: Vec<SubjectRecord>,
}

/// Vec-backed entity source with per-subscription dirty flags.
#[derive(Default)]
pub struct FakeSource {
    records: Vec<SubjectRecord>,
    next_id: u64,
    subs: HashMap<u64, SubState>,
    next_sub: u64,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn touch(&mut self) {
        for state in self.subs.values_mut() {
            state.dirty = true;
        }
    }

    fn record_mut(&mut self, id: SubjectId) -> &mut SubjectRecord {
        self.records
            .iter_mut()
            .find(|r| r.id == id)
            .expect("unknown subject")
    }

    fn insert(&mut self, mut record: SubjectRecord) -> SubjectId {
        record.revision = 1;
        let id = record.id;
        self.records.push(record);
        self.touch();
        id
    }

    fn allocate(&mut self) -> SubjectRecord {
        self.next_id += 1;
        SubjectRecord::new(SubjectId(self.next_id))
    }

    pub fn spawn_named(&mut self, name: &str) -> SubjectId {
        let mut record = self.allocate();
        record.name = Some(name.to_string());
        record.buffer = Some(TemporalSampleBuffer::new(DEFAULT_HISTORY_CAPACITY));
        self.insert(record)
    }

    pub fn spawn_unnamed(&mut self) -> SubjectId {
        let mut record = self.allocate();
        record.buffer = Some(TemporalSampleBuffer::new(DEFAULT_HISTORY_CAPACITY));
        self.insert(record)
    }

    pub fn spawn_model(&mut self, name: &str, class: SubjectClass) -> SubjectId {
        let mut record = self.allocate();
        record.name = Some(name.to_string());
        record.class = Some(class);
        record.buffer = Some(TemporalSampleBuffer::new(DEFAULT_HISTORY_CAPACITY));
        self.insert(record)
    }

    pub fn rename(&mut self, id: SubjectId, name: &str) {
        let record = self.record_mut(id);
        record.name = Some(name.to_string());
        record.revision += 1;
        self.touch();
    }

    /// Binds a fresh, empty sample buffer.
    pub fn rebind_history(&mut self, id: SubjectId) {
        let record = self.record_mut(id);
        record.buffer = Some(TemporalSampleBuffer::new(DEFAULT_HISTORY_CAPACITY));
        record.revision += 1;
        self.touch();
    }

    pub fn set_class(&mut self, id: SubjectId, class: SubjectClass) {
        let record = self.record_mut(id);
        record.class = Some(class);
        record.revision += 1;
        self.touch();
    }

    pub fn clear_name(&mut self, id: SubjectId) {
        let record = self.record_mut(id);
        record.name = None;
        record.revision += 1;
        self.touch();
    }

    pub fn despawn(&mut self, id: SubjectId) {
        self.records.retain(|r| r.id != id);
        self.touch();
    }

    pub fn duplicate_record(&mut self, id: SubjectId) {
        let copy = self.record_mut(id).clone();
        self.records.push(copy);
        self.touch();
    }

    pub fn buffer(&self, id: SubjectId) -> TemporalSampleBuffer {
        self.records
            .iter()
            .find(|r| r.id == id)
            .and_then(|r| r.buffer.clone())
            .expect("subject has no buffer")
    }

    pub fn live_subscriptions(&self) -> usize {
        self.subs.len()
    }
}

impl EntitySource for FakeSource {
    fn subscribe(&mut self, required: AttributeSet) -> Subscription {
        self.next_sub += 1;
        self.subs.insert(
            self.next_sub,
            SubState {
                required,
                dirty: true,
                snapshot: Vec::new(),
            },
        );
        Subscription::new(self.next_sub, required)
    }

    fn apply_changes(&mut self, subscription: &Subscription) -> bool {
        let state = self
            .subs
            .get_mut(&subscription.id())
            .expect("unknown subscription");
        if !state.dirty {
            return false;
        }
        state.dirty = false;
        let required = state.required;
        state.snapshot = self
            .records
            .iter()
            .filter(|r| r.attributes().intersects(required))
            .cloned()
            .collect();
        true
    }

    fn records(&self, subscription: &Subscription) -> &[SubjectRecord] {
        &self.subs[&subscription.id()].snapshot
    }

    fn release(&mut self, subscription: Subscription) {
        self.subs
            .remove(&subscription.id())
            .expect("subscription released twice");
    }
}

// ============================================================================
// OVERLAY
// ============================================================================

#[derive(Debug)]
pub struct FakeLabel {
    pub text: String,
    pub attached: bool,
    pub cull: CullHint,
    pub translation: Vector3<f32>,
}

/// Overlay that records label state and counts double attaches.
#[derive(Default)]
pub struct FakeOverlay {
    pub labels: HashMap<HandleId, FakeLabel>,
    pub double_attaches: usize,
    pub attach_calls: usize,
    next: u64,
}

impl FakeOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn label(&self, handle: HandleId) -> &FakeLabel {
        &self.labels[&handle]
    }

    pub fn attached_count(&self) -> usize {
        self.labels.values().filter(|l| l.attached).count()
    }
}

impl OverlaySurface for FakeOverlay {
    fn create_label(&mut self, _style: &LabelStyle, text: &str) -> HandleId {
        self.next += 1;
        let handle = HandleId(self.next);
        self.labels.insert(
            handle,
            FakeLabel {
                text: text.to_string(),
                attached: false,
                cull: CullHint::Inherit,
                translation: Vector3::zeros(),
            },
        );
        handle
    }

    fn set_text(&mut self, handle: HandleId, text: &str) {
        if let Some(label) = self.labels.get_mut(&handle) {
            label.text = text.to_string();
        }
    }

    fn preferred_size(&self, handle: HandleId) -> Vector2<f32> {
        let chars = self.labels.get(&handle).map_or(0, |l| l.text.len());
        Vector2::new(chars as f32 * 8.0, 16.0)
    }

    fn set_translation(&mut self, handle: HandleId, translation: Vector3<f32>) {
        if let Some(label) = self.labels.get_mut(&handle) {
            label.translation = translation;
        }
    }

    fn set_cull_hint(&mut self, handle: HandleId, hint: CullHint) {
        if let Some(label) = self.labels.get_mut(&handle) {
            label.cull = hint;
        }
    }

    fn is_attached(&self, handle: HandleId) -> bool {
        self.labels.get(&handle).is_some_and(|l| l.attached)
    }

    fn attach(&mut self, handle: HandleId) {
        self.attach_calls += 1;
        if let Some(label) = self.labels.get_mut(&handle) {
            if label.attached {
                self.double_attaches += 1;
            }
            label.attached = true;
        }
    }

    fn detach(&mut self, handle: HandleId) {
        if let Some(label) = self.labels.get_mut(&handle) {
            label.attached = false;
        }
    }

    fn release(&mut self, handle: HandleId) {
        self.labels.remove(&handle);
    }
}

// ============================================================================
// SCENE
// ============================================================================

#[derive(Debug)]
pub struct FakeModel {
    pub subject: SubjectId,
    pub class: SubjectClass,
    pub position: Vector3<f32>,
    pub rotation: UnitQuaternion<f32>,
    pub cull: CullHint,
}

#[derive(Default)]
pub struct FakeScene {
    pub models: HashMap<HandleId, FakeModel>,
    next: u64,
}

impl FakeScene {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ModelScene for FakeScene {
    fn spawn_model(&mut self, subject: SubjectId, class: SubjectClass) -> HandleId {
        self.next += 1;
        let handle = HandleId(self.next);
        self.models.insert(
            handle,
            FakeModel {
                subject,
                class,
                position: Vector3::zeros(),
                rotation: UnitQuaternion::identity(),
                cull: CullHint::Inherit,
            },
        );
        handle
    }

    fn set_transform(&mut self, handle: HandleId, position: Vector3<f32>, rotation: UnitQuaternion<f32>) {
        if let Some(model) = self.models.get_mut(&handle) {
            model.position = position;
            model.rotation = rotation;
        }
    }

    fn set_cull_hint(&mut self, handle: HandleId, hint: CullHint) {
        if let Some(model) = self.models.get_mut(&handle) {
            model.cull = hint;
        }
    }

    fn despawn(&mut self, handle: HandleId) {
        self.models.remove(&handle);
    }
}

// ============================================================================
// CAMERA + CLOCK
// ============================================================================

/// Camera at the origin looking down -Z with a trivial projection.
pub struct FixedCamera {
    pub location: Vector3<f32>,
    pub direction: Vector3<f32>,
}

impl Default for FixedCamera {
    fn default() -> Self {
        Self {
            location: Vector3::zeros(),
            direction: -Vector3::z(),
        }
    }
}

impl CameraProjection for FixedCamera {
    fn location(&self) -> Vector3<f32> {
        self.location
    }

    fn direction(&self) -> Vector3<f32> {
        self.direction
    }

    fn screen_coordinates(&self, world: &Vector3<f32>) -> Vector3<f32> {
        Vector3::new(400.0 + world.x * 10.0, 300.0 + world.y * 10.0, 0.5)
    }

    fn viewport(&self) -> (u32, u32) {
        (800, 600)
    }
}

/// Clock that only moves when told to.
#[derive(Default)]
pub struct ManualContext {
    now: Mutex<Duration>,
}

impl ManualContext {
    pub fn set(&self, now: Duration) {
        *self.now.lock().unwrap() = now;
    }
}

#[async_trait]
impl ViewContext for ManualContext {
    fn now(&self) -> Duration {
        *self.now.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += duration;
    }

    fn spawn<F>(&self, _name: &str, _future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
    }

    fn seed(&self) -> u64 {
        0
    }
}
