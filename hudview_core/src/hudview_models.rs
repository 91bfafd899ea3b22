//! The "MODELS" Engine - One scene model per classified subject
//!
//! Same reconcile-then-render loop as the labels, against the 3D scene
//! instead of the overlay. Models take the full interpolated pose, and the
//! local viewer's own ship is never drawn since it would always lag the
//! viewer's own turning.

use hudview_env::{CullHint, HandleId, ModelScene, SubjectClass, SubjectId};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::HudError;
use crate::hudview_index::{LiveViewIndex, ViewHooks};
use crate::hudview_time::{TemporalSampleBuffer, Timestamp};
use crate::source::{Attribute, AttributeSet, EntitySource, ReadySubject, Subscription};

/// A subject needs both of these to get a model.
pub const MODEL_ATTRIBUTES: AttributeSet = AttributeSet::EMPTY
    .with(Attribute::Classification)
    .with(Attribute::PositionHistory);

/// Scene state for one subject's model.
#[derive(Debug)]
pub struct ModelView {
    handle: HandleId,
    subject: SubjectId,
    class: SubjectClass,
    buffer: TemporalSampleBuffer,
    is_local_subject: bool,
    visible: bool,
}

impl ModelView {
    pub fn handle(&self) -> HandleId {
        self.handle
    }

    pub fn subject(&self) -> SubjectId {
        self.subject
    }

    pub fn class(&self) -> SubjectClass {
        self.class
    }

    pub fn is_local_subject(&self) -> bool {
        self.is_local_subject
    }

    /// Poses the model at `time`. Returns true if the model is drawn.
    pub fn render<M: ModelScene + ?Sized>(&mut self, time: Timestamp, scene: &mut M) -> bool {
        let Some(transition) = self.buffer.query(time) else {
            if self.visible {
                self.visible = false;
                scene.set_cull_hint(self.handle, CullHint::Always);
            }
            return false;
        };
        scene.set_transform(
            self.handle,
            transition.position_at(time),
            transition.orientation_at(time),
        );

        let visible = transition.visible_at(time) && !self.is_local_subject;
        if visible != self.visible {
            self.visible = visible;
            scene.set_cull_hint(self.handle, CullHint::for_visibility(visible));
        }
        visible
    }
}

/// Model create/update/destroy against a scene.
pub struct ModelHooks<'a, M: ModelScene + ?Sized> {
    pub scene: &'a mut M,
    pub local_subject: Option<SubjectId>,
}

impl<M: ModelScene + ?Sized> ViewHooks for ModelHooks<'_, M> {
    type View = ModelView;

    fn create(&mut self, subject: &ReadySubject<'_>) -> ModelView {
        let handle = self.scene.spawn_model(subject.id(), subject.class());
        self.scene.set_cull_hint(handle, CullHint::Always);
        ModelView {
            handle,
            subject: subject.id(),
            class: subject.class(),
            buffer: subject.buffer().clone(),
            is_local_subject: self.local_subject == Some(subject.id()),
            visible: false,
        }
    }

    // Geometry is fixed at spawn, so a new class means a new scene model.
    // The view itself survives and keeps its buffer.
    fn update(&mut self, view: &mut ModelView, subject: &ReadySubject<'_>) {
        let class = subject.class();
        if view.class != class {
            self.scene.despawn(view.handle);
            view.handle = self.scene.spawn_model(view.subject, class);
            self.scene.set_cull_hint(view.handle, CullHint::Always);
            view.class = class;
            view.visible = false;
        }
        if !view.buffer.same_history(subject.buffer()) {
            view.buffer = subject.buffer().clone();
        }
    }

    fn destroy(&mut self, view: ModelView) {
        self.scene.despawn(view.handle);
    }
}

/// What one `ModelViews::update` did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ModelReport {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    pub deferred: usize,
    pub drawn: usize,
    pub culled: usize,
}

/// Owns the model for every classified, positioned subject while running.
#[derive(Default)]
pub struct ModelViews {
    index: LiveViewIndex<ModelView>,
    subscription: Option<Subscription>,
    local_subject: Option<SubjectId>,
}

impl ModelViews {
    pub fn new(local_subject: Option<SubjectId>) -> Self {
        Self {
            index: LiveViewIndex::new(),
            subscription: None,
            local_subject,
        }
    }

    pub fn start<S: EntitySource + ?Sized>(&mut self, source: &mut S) -> Result<(), HudError> {
        if self.subscription.is_some() {
            return Err(HudError::AlreadyRunning("model views"));
        }
        self.subscription = Some(source.subscribe(MODEL_ATTRIBUTES));
        info!("model views started");
        Ok(())
    }

    /// Despawns every model and releases the subscription.
    pub fn stop<S, M>(&mut self, source: &mut S, scene: &mut M) -> Result<usize, HudError>
    where
        S: EntitySource + ?Sized,
        M: ModelScene + ?Sized,
    {
        let subscription = self
            .subscription
            .take()
            .ok_or(HudError::NotRunning("model views"))?;
        let mut hooks = ModelHooks {
            scene,
            local_subject: self.local_subject,
        };
        let released = self.index.teardown(&mut hooks);
        source.release(subscription);
        info!(released, "model views stopped");
        Ok(released)
    }

    pub fn update<S, M>(
        &mut self,
        source: &mut S,
        scene: &mut M,
        time: Timestamp,
    ) -> Result<ModelReport, HudError>
    where
        S: EntitySource + ?Sized,
        M: ModelScene + ?Sized,
    {
        let subscription = self
            .subscription
            .as_ref()
            .ok_or(HudError::NotRunning("model views"))?;

        let mut hooks = ModelHooks {
            scene: &mut *scene,
            local_subject: self.local_subject,
        };
        let stats = self.index.reconcile(source, subscription, &mut hooks);

        let mut report = ModelReport {
            added: stats.added,
            updated: stats.updated,
            removed: stats.removed,
            deferred: stats.deferred,
            ..ModelReport::default()
        };
        for (_, view) in self.index.iter_mut() {
            if view.render(time, scene) {
                report.drawn += 1;
            } else {
                report.culled += 1;
            }
        }
        debug!(%time, drawn = report.drawn, culled = report.culled, "models posed");
        Ok(report)
    }

    /// The scene handle of a subject's model.
    pub fn model(&self, id: SubjectId) -> Option<HandleId> {
        self.index.get(id).map(ModelView::handle)
    }

    pub fn view(&self, id: SubjectId) -> Option<&ModelView> {
        self.index.get(id)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn is_running(&self) -> bool {
        self.subscription.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hudview_time::Sample;
    use crate::testkit::{FakeScene, FakeSource};
    use approx::assert_relative_eq;
    use nalgebra::{UnitQuaternion, Vector3};
    use std::f32::consts::FRAC_PI_2;

    fn ts(ms: u64) -> Timestamp {
        Timestamp::from_micros(ms * 1_000)
    }

    fn running(local: Option<SubjectId>) -> (FakeSource, FakeScene, ModelViews) {
        let mut source = FakeSource::new();
        let mut models = ModelViews::new(local);
        models.start(&mut source).unwrap();
        (source, FakeScene::new(), models)
    }

    #[test]
    fn test_model_follows_interpolated_pose() {
        let (mut source, mut scene, mut models) = running(None);
        let id = source.spawn_model("Hauler", SubjectClass::Ship);
        let buffer = source.buffer(id);
        buffer.push(Sample::new(ts(0), Vector3::zeros(), UnitQuaternion::identity(), true));
        buffer.push(Sample::new(
            ts(100),
            Vector3::new(10.0, 0.0, 0.0),
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), FRAC_PI_2),
            true,
        ));

        let report = models.update(&mut source, &mut scene, ts(50)).unwrap();
        assert_eq!((report.added, report.drawn), (1, 1));

        let handle = models.model(id).unwrap();
        let model = &scene.models[&handle];
        assert_eq!(model.subject, id);
        assert_eq!(model.cull, CullHint::Inherit);
        assert_relative_eq!(model.position.x, 5.0, epsilon = 1e-4);
        assert_relative_eq!(model.rotation.angle(), FRAC_PI_2 / 2.0, epsilon = 1e-4);
    }

    #[test]
    fn test_local_ship_model_is_culled() {
        let mut source = FakeSource::new();
        let me = source.spawn_model("Me", SubjectClass::Ship);
        let mut models = ModelViews::new(Some(me));
        models.start(&mut source).unwrap();
        let mut scene = FakeScene::new();
        source.buffer(me).push(Sample::at(ts(0), Vector3::zeros()));

        let report = models.update(&mut source, &mut scene, ts(0)).unwrap();
        assert_eq!(report.culled, 1);
        let handle = models.model(me).unwrap();
        assert_eq!(scene.models[&handle].cull, CullHint::Always);
    }

    #[test]
    fn test_class_change_respawns_model() {
        let (mut source, mut scene, mut models) = running(None);
        let id = source.spawn_model("Shifter", SubjectClass::Ship);
        source.buffer(id).push(Sample::at(ts(0), Vector3::new(3.0, 0.0, 0.0)));
        models.update(&mut source, &mut scene, ts(0)).unwrap();
        let ship = models.model(id).unwrap();

        let class = SubjectClass::GravSphere { radius: 2.5 };
        source.set_class(id, class);
        let report = models.update(&mut source, &mut scene, ts(0)).unwrap();
        assert_eq!((report.added, report.updated, report.removed), (0, 1, 0));
        assert_eq!(report.drawn, 1);

        let sphere = models.model(id).unwrap();
        assert_ne!(sphere, ship);
        assert!(!scene.models.contains_key(&ship));
        assert_eq!(scene.models.len(), 1);
        assert_eq!(scene.models[&sphere].class, class);
        assert_eq!(scene.models[&sphere].cull, CullHint::Inherit);
        assert_relative_eq!(scene.models[&sphere].position.x, 3.0, epsilon = 1e-4);
        assert_eq!(models.view(id).unwrap().class(), class);
    }

    #[test]
    fn test_rebound_history_culls_drawn_model() {
        let (mut source, mut scene, mut models) = running(None);
        let id = source.spawn_model("Hauler", SubjectClass::Ship);
        source.buffer(id).push(Sample::at(ts(0), Vector3::zeros()));
        models.update(&mut source, &mut scene, ts(0)).unwrap();
        let handle = models.model(id).unwrap();
        assert_eq!(scene.models[&handle].cull, CullHint::Inherit);

        source.rebind_history(id);
        let report = models.update(&mut source, &mut scene, ts(10)).unwrap();
        assert_eq!(report.culled, 1);
        assert_eq!(models.model(id), Some(handle));
        assert_eq!(scene.models[&handle].cull, CullHint::Always);
    }

    #[test]
    fn test_unclassified_subject_has_no_model() {
        let (mut source, mut scene, mut models) = running(None);
        let id = source.spawn_named("Label only");

        let report = models.update(&mut source, &mut scene, ts(0)).unwrap();
        assert_eq!(report.deferred, 1);
        assert!(models.model(id).is_none());
        assert!(scene.models.is_empty());
    }

    #[test]
    fn test_stop_despawns_every_model() {
        let (mut source, mut scene, mut models) = running(None);
        source.spawn_model("A", SubjectClass::Ship);
        source.spawn_model("Well", SubjectClass::GravSphere { radius: 4.0 });
        models.update(&mut source, &mut scene, ts(0)).unwrap();
        assert_eq!(scene.models.len(), 2);

        assert_eq!(models.stop(&mut source, &mut scene).unwrap(), 2);
        assert!(scene.models.is_empty());
        assert_eq!(source.live_subscriptions(), 0);
        assert!(matches!(
            models.update(&mut source, &mut scene, ts(0)),
            Err(HudError::NotRunning(_))
        ));
    }
}
