//! The "LABELS" Engine - Floating name tags over subjects
//!
//! Every subject carrying a name and a position history gets one overlay
//! label. Each frame, after reconciliation, every label samples its buffer
//! at the frame's render time and is placed centered above its subject:
//!
//! ```text
//!   query(t) ─► no data?        → NoData        (detached, culled)
//!            ─► local viewer?   → Suppressed    (detached, culled)
//!            ─► step hidden?    → Hidden        (detached, culled)
//!            ─► behind camera?  → BehindCamera  (detached)
//!            ─► outside view?   → OffScreen     (detached)
//!            └► project anchor  → Shown         (attached once)
//! ```
//!
//! Attach and detach are only issued on a state change, so running the
//! step every frame never stacks attachments.

use hudview_env::{
    CameraProjection, CullHint, HandleId, LabelStyle, OverlaySurface, SubjectId,
};
use nalgebra::Vector3;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::HudConfig;
use crate::error::HudError;
use crate::hudview_index::{LiveViewIndex, ReconcileStats, ViewHooks};
use crate::hudview_time::{TemporalSampleBuffer, Timestamp};
use crate::source::{Attribute, AttributeSet, EntitySource, ReadySubject, Subscription};

/// A subject needs both of these to get a label.
pub const LABEL_ATTRIBUTES: AttributeSet = AttributeSet::EMPTY
    .with(Attribute::Name)
    .with(Attribute::PositionHistory);

/// Outcome of one label's render step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LabelState {
    /// The buffer holds no sample yet
    NoData,

    /// The local viewer's own subject
    Suppressed,

    /// Step visibility is off
    Hidden,

    /// The subject is behind the camera plane
    BehindCamera,

    /// The anchor projects outside the viewport
    OffScreen,

    /// Placed and attached
    Shown,
}

/// Per-state counts over one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LabelTally {
    pub shown: usize,
    pub hidden: usize,
    pub behind_camera: usize,
    pub off_screen: usize,
    pub suppressed: usize,
    pub no_data: usize,
}

impl LabelTally {
    pub fn record(&mut self, state: LabelState) {
        match state {
            LabelState::NoData => self.no_data += 1,
            LabelState::Suppressed => self.suppressed += 1,
            LabelState::Hidden => self.hidden += 1,
            LabelState::BehindCamera => self.behind_camera += 1,
            LabelState::OffScreen => self.off_screen += 1,
            LabelState::Shown => self.shown += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.shown
            + self.hidden
            + self.behind_camera
            + self.off_screen
            + self.suppressed
            + self.no_data
    }
}

// ============================================================================
// LABEL VIEW
// ============================================================================

/// Presentation state for one subject's label.
#[derive(Debug)]
pub struct LabelView {
    handle: HandleId,
    subject: SubjectId,
    buffer: TemporalSampleBuffer,
    is_local_subject: bool,
    visible: bool,
    text: String,
    label_offset: f32,
    placement: Option<Vector3<f32>>,
    state: LabelState,
}

impl LabelView {
    pub fn handle(&self) -> HandleId {
        self.handle
    }

    pub fn subject(&self) -> SubjectId {
        self.subject
    }

    /// Fixed when the view is created.
    pub fn is_local_subject(&self) -> bool {
        self.is_local_subject
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Screen translation from the last frame the label was shown.
    pub fn placement(&self) -> Option<Vector3<f32>> {
        self.placement
    }

    /// Outcome of the most recent render.
    pub fn state(&self) -> LabelState {
        self.state
    }

    /// Samples the buffer at `time` and places, hides or suppresses the label.
    pub fn render<C, O>(&mut self, time: Timestamp, camera: &C, overlay: &mut O) -> LabelState
    where
        C: CameraProjection + ?Sized,
        O: OverlaySurface + ?Sized,
    {
        self.state = self.step(time, camera, overlay);
        self.state
    }

    fn step<C, O>(&mut self, time: Timestamp, camera: &C, overlay: &mut O) -> LabelState
    where
        C: CameraProjection + ?Sized,
        O: OverlaySurface + ?Sized,
    {
        let Some(transition) = self.buffer.query(time) else {
            // Nothing to place counts as not visible
            self.set_visible(false, overlay);
            self.take_down(overlay);
            return LabelState::NoData;
        };
        let position = transition.position_at(time);
        self.set_visible(transition.visible_at(time), overlay);

        if self.is_local_subject {
            self.take_down(overlay);
            return LabelState::Suppressed;
        }
        if !self.visible {
            self.take_down(overlay);
            return LabelState::Hidden;
        }

        let distance = camera.direction().dot(&(position - camera.location()));
        if distance < 0.0 {
            self.take_down(overlay);
            return LabelState::BehindCamera;
        }

        let screen = camera.screen_coordinates(&(position + Vector3::y() * self.label_offset));
        let (width, height) = camera.viewport();
        if !(0.0..=width as f32).contains(&screen.x) || !(0.0..=height as f32).contains(&screen.y) {
            self.take_down(overlay);
            return LabelState::OffScreen;
        }

        let preferred = overlay.preferred_size(self.handle);
        let translation = Vector3::new(
            screen.x - preferred.x * 0.5,
            screen.y + preferred.y,
            screen.z,
        );
        overlay.set_translation(self.handle, translation);
        self.placement = Some(translation);

        if !overlay.is_attached(self.handle) {
            overlay.attach(self.handle);
        }
        LabelState::Shown
    }

    fn set_visible<O: OverlaySurface + ?Sized>(&mut self, visible: bool, overlay: &mut O) {
        if self.visible == visible {
            return;
        }
        self.visible = visible;
        let hint = CullHint::for_visibility(visible && !self.is_local_subject);
        overlay.set_cull_hint(self.handle, hint);
    }

    fn take_down<O: OverlaySurface + ?Sized>(&mut self, overlay: &mut O) {
        self.placement = None;
        if overlay.is_attached(self.handle) {
            overlay.detach(self.handle);
        }
    }

    fn dispose<O: OverlaySurface + ?Sized>(self, overlay: &mut O) {
        if overlay.is_attached(self.handle) {
            overlay.detach(self.handle);
        }
        overlay.release(self.handle);
    }
}

// ============================================================================
// HOOKS
// ============================================================================

/// Label create/update/destroy against an overlay surface.
pub struct LabelHooks<'a, O: OverlaySurface + ?Sized> {
    pub overlay: &'a mut O,
    pub style: &'a LabelStyle,
    pub local_subject: Option<SubjectId>,
    pub label_offset: f32,
}

impl<O: OverlaySurface + ?Sized> ViewHooks for LabelHooks<'_, O> {
    type View = LabelView;

    fn create(&mut self, subject: &ReadySubject<'_>) -> LabelView {
        let text = subject.name().to_string();
        let handle = self.overlay.create_label(self.style, &text);
        // Culled until the first visible sample arrives
        self.overlay.set_cull_hint(handle, CullHint::Always);

        LabelView {
            handle,
            subject: subject.id(),
            buffer: subject.buffer().clone(),
            is_local_subject: self.local_subject == Some(subject.id()),
            visible: false,
            text,
            label_offset: self.label_offset,
            placement: None,
            state: LabelState::NoData,
        }
    }

    fn update(&mut self, view: &mut LabelView, subject: &ReadySubject<'_>) {
        let name = subject.name();
        if view.text != name {
            view.text = name.to_string();
            self.overlay.set_text(view.handle, name);
        }
        if !view.buffer.same_history(subject.buffer()) {
            view.buffer = subject.buffer().clone();
        }
    }

    fn destroy(&mut self, view: LabelView) {
        view.dispose(&mut *self.overlay);
    }
}

// ============================================================================
// HUD LABELS (lifecycle)
// ============================================================================

/// What one `HudLabels::update` did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LabelReport {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    pub deferred: usize,
    pub tally: LabelTally,
}

impl LabelReport {
    fn new(stats: ReconcileStats, tally: LabelTally) -> Self {
        Self {
            added: stats.added,
            updated: stats.updated,
            removed: stats.removed,
            deferred: stats.deferred,
            tally,
        }
    }
}

/// Owns the label for every named, positioned subject while running.
pub struct HudLabels {
    index: LiveViewIndex<LabelView>,
    subscription: Option<Subscription>,
    style: LabelStyle,
    label_offset: f32,
    local_subject: Option<SubjectId>,
}

impl HudLabels {
    pub fn new(config: &HudConfig, local_subject: Option<SubjectId>) -> Self {
        Self {
            index: LiveViewIndex::new(),
            subscription: None,
            style: config.label_style.clone(),
            label_offset: config.label_offset,
            local_subject,
        }
    }

    /// Subscribes to the source. Labels appear on the next `update`.
    pub fn start<S: EntitySource + ?Sized>(&mut self, source: &mut S) -> Result<(), HudError> {
        if self.subscription.is_some() {
            return Err(HudError::AlreadyRunning("hud labels"));
        }
        self.subscription = Some(source.subscribe(LABEL_ATTRIBUTES));
        info!("hud labels started");
        Ok(())
    }

    /// Releases every label and the subscription. Returns the labels released.
    pub fn stop<S, O>(&mut self, source: &mut S, overlay: &mut O) -> Result<usize, HudError>
    where
        S: EntitySource + ?Sized,
        O: OverlaySurface + ?Sized,
    {
        let subscription = self
            .subscription
            .take()
            .ok_or(HudError::NotRunning("hud labels"))?;

        let mut hooks = LabelHooks {
            overlay,
            style: &self.style,
            local_subject: self.local_subject,
            label_offset: self.label_offset,
        };
        let released = self.index.teardown(&mut hooks);
        source.release(subscription);
        info!(released, "hud labels stopped");
        Ok(released)
    }

    /// Reconciles with the source, then renders every label at `time`.
    pub fn update<S, O, C>(
        &mut self,
        source: &mut S,
        overlay: &mut O,
        camera: &C,
        time: Timestamp,
    ) -> Result<LabelReport, HudError>
    where
        S: EntitySource + ?Sized,
        O: OverlaySurface + ?Sized,
        C: CameraProjection + ?Sized,
    {
        let subscription = self
            .subscription
            .as_ref()
            .ok_or(HudError::NotRunning("hud labels"))?;

        let mut hooks = LabelHooks {
            overlay: &mut *overlay,
            style: &self.style,
            local_subject: self.local_subject,
            label_offset: self.label_offset,
        };
        let stats = self.index.reconcile(source, subscription, &mut hooks);

        let mut tally = LabelTally::default();
        for (_, view) in self.index.iter_mut() {
            tally.record(view.render(time, camera, overlay));
        }
        debug!(
            %time,
            shown = tally.shown,
            hidden = tally.hidden,
            behind = tally.behind_camera,
            off_screen = tally.off_screen,
            "labels rendered"
        );
        Ok(LabelReport::new(stats, tally))
    }

    pub fn label(&self, id: SubjectId) -> Option<&LabelView> {
        self.index.get(id)
    }

    pub fn labels(&self) -> impl Iterator<Item = (SubjectId, &LabelView)> {
        self.index.iter()
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
    use crate::testkit::{FakeOverlay, FakeSource, FixedCamera};
    use approx::assert_relative_eq;
    use nalgebra::UnitQuaternion;
    use proptest::prelude::*;

    fn ts(ms: u64) -> Timestamp {
        Timestamp::from_micros(ms * 1_000)
    }

    fn push(source: &FakeSource, id: SubjectId, ms: u64, pos: Vector3<f32>, visible: bool) {
        source
            .buffer(id)
            .push(Sample::new(ts(ms), pos, UnitQuaternion::identity(), visible));
    }

    // Camera looks down -Z, so negative z is in front of it
    fn ahead(x: f32) -> Vector3<f32> {
        Vector3::new(x, 0.0, -10.0)
    }

    fn running(local: Option<SubjectId>) -> (FakeSource, FakeOverlay, HudLabels) {
        let mut source = FakeSource::new();
        let mut labels = HudLabels::new(&HudConfig::default(), local);
        labels.start(&mut source).unwrap();
        (source, FakeOverlay::new(), labels)
    }

    #[test]
    fn test_label_is_placed_centered_above_subject() {
        let (mut source, mut overlay, mut labels) = running(None);
        let camera = FixedCamera::default();
        let id = source.spawn_named("Bravo");
        push(&source, id, 0, ahead(0.0), true);
        push(&source, id, 100, ahead(2.0), true);

        let report = labels.update(&mut source, &mut overlay, &camera, ts(50)).unwrap();
        assert_eq!(report.added, 1);
        assert_eq!(report.tally.shown, 1);

        let view = labels.label(id).unwrap();
        let placed = overlay.label(view.handle());
        assert!(placed.attached);
        assert_eq!(placed.cull, CullHint::Inherit);

        // x = 1.0 at the midpoint, anchor raised by 0.1; "Bravo" is 40x16
        assert_relative_eq!(placed.translation.x, 400.0 + 10.0 - 20.0, epsilon = 1e-3);
        assert_relative_eq!(placed.translation.y, 300.0 + 1.0 + 16.0, epsilon = 1e-3);
        assert_eq!(view.placement(), Some(placed.translation));
    }

    #[test]
    fn test_empty_history_reports_no_data() {
        let (mut source, mut overlay, mut labels) = running(None);
        let camera = FixedCamera::default();
        let id = source.spawn_named("Empty");

        let report = labels.update(&mut source, &mut overlay, &camera, ts(0)).unwrap();
        assert_eq!(report.tally.no_data, 1);
        let handle = labels.label(id).unwrap().handle();
        assert!(!overlay.label(handle).attached);
        assert_eq!(overlay.label(handle).cull, CullHint::Always);
    }

    #[test]
    fn test_local_subject_is_never_attached() {
        let mut source = FakeSource::new();
        let me = source.spawn_named("Me");
        let mut labels = HudLabels::new(&HudConfig::default(), Some(me));
        labels.start(&mut source).unwrap();
        let mut overlay = FakeOverlay::new();
        let camera = FixedCamera::default();
        push(&source, me, 0, ahead(0.0), true);

        let report = labels.update(&mut source, &mut overlay, &camera, ts(0)).unwrap();
        assert_eq!(report.tally.suppressed, 1);
        let view = labels.label(me).unwrap();
        assert!(view.is_local_subject());
        assert!(!overlay.label(view.handle()).attached);
        assert_eq!(overlay.label(view.handle()).cull, CullHint::Always);
    }

    #[test]
    fn test_hidden_sample_detaches() {
        let (mut source, mut overlay, mut labels) = running(None);
        let camera = FixedCamera::default();
        let id = source.spawn_named("Ghost");
        push(&source, id, 0, ahead(0.0), true);
        push(&source, id, 100, ahead(0.0), false);

        labels.update(&mut source, &mut overlay, &camera, ts(50)).unwrap();
        let handle = labels.label(id).unwrap().handle();
        assert!(overlay.label(handle).attached);

        // Step visibility switches exactly at the later sample
        let report = labels.update(&mut source, &mut overlay, &camera, ts(100)).unwrap();
        assert_eq!(report.tally.hidden, 1);
        assert!(!overlay.label(handle).attached);
        assert_eq!(overlay.label(handle).cull, CullHint::Always);
        assert!(labels.label(id).unwrap().placement().is_none());
    }

    #[test]
    fn test_behind_camera_detaches_even_when_visible() {
        let (mut source, mut overlay, mut labels) = running(None);
        let camera = FixedCamera::default();
        let id = source.spawn_named("Tail");
        push(&source, id, 0, ahead(0.0), true);
        push(&source, id, 100, Vector3::new(0.0, 0.0, 10.0), true);

        labels.update(&mut source, &mut overlay, &camera, ts(0)).unwrap();
        let handle = labels.label(id).unwrap().handle();
        assert!(overlay.label(handle).attached);

        let report = labels.update(&mut source, &mut overlay, &camera, ts(100)).unwrap();
        assert_eq!(report.tally.behind_camera, 1);
        assert_eq!(labels.label(id).unwrap().state(), LabelState::BehindCamera);
        assert!(!overlay.label(handle).attached);
        assert!(labels.label(id).unwrap().is_visible());
    }

    #[test]
    fn test_off_screen_anchor_detaches() {
        let (mut source, mut overlay, mut labels) = running(None);
        let camera = FixedCamera::default();
        let id = source.spawn_named("Wide");
        push(&source, id, 0, ahead(0.0), true);
        push(&source, id, 100, ahead(50.0), true);

        labels.update(&mut source, &mut overlay, &camera, ts(0)).unwrap();
        let handle = labels.label(id).unwrap().handle();
        assert!(overlay.label(handle).attached);

        // x = 50 lands at 900 px on an 800 px viewport
        let report = labels.update(&mut source, &mut overlay, &camera, ts(100)).unwrap();
        assert_eq!(report.tally.off_screen, 1);
        assert_eq!(labels.label(id).unwrap().state(), LabelState::OffScreen);
        assert!(!overlay.label(handle).attached);
        assert!(labels.label(id).unwrap().placement().is_none());
    }

    #[test]
    fn test_rebound_history_takes_shown_label_down() {
        let (mut source, mut overlay, mut labels) = running(None);
        let camera = FixedCamera::default();
        let id = source.spawn_named("Rebound");
        push(&source, id, 0, ahead(0.0), true);

        labels.update(&mut source, &mut overlay, &camera, ts(0)).unwrap();
        let handle = labels.label(id).unwrap().handle();
        assert!(overlay.label(handle).attached);
        assert_eq!(overlay.label(handle).cull, CullHint::Inherit);

        source.rebind_history(id);
        let report = labels.update(&mut source, &mut overlay, &camera, ts(10)).unwrap();
        assert_eq!(report.updated, 1);
        assert_eq!(report.tally.no_data, 1);

        let view = labels.label(id).unwrap();
        assert_eq!(view.handle(), handle);
        assert_eq!(view.state(), LabelState::NoData);
        assert!(!view.is_visible());
        assert!(view.placement().is_none());
        assert!(!overlay.label(handle).attached);
        assert_eq!(overlay.label(handle).cull, CullHint::Always);

        // Comes back once the new history has a sample
        push(&source, id, 20, ahead(1.0), true);
        labels.update(&mut source, &mut overlay, &camera, ts(20)).unwrap();
        assert!(overlay.label(handle).attached);
        assert_eq!(overlay.double_attaches, 0);
    }

    #[test]
    fn test_repeated_frames_attach_once() {
        let (mut source, mut overlay, mut labels) = running(None);
        let camera = FixedCamera::default();
        let id = source.spawn_named("Steady");
        push(&source, id, 0, ahead(0.0), true);

        for frame in 0..10 {
            labels.update(&mut source, &mut overlay, &camera, ts(frame)).unwrap();
        }
        assert_eq!(overlay.attach_calls, 1);
        assert_eq!(overlay.double_attaches, 0);
    }

    #[test]
    fn test_rename_keeps_handle() {
        let (mut source, mut overlay, mut labels) = running(None);
        let camera = FixedCamera::default();
        let id = source.spawn_named("Old");
        labels.update(&mut source, &mut overlay, &camera, ts(0)).unwrap();
        let handle = labels.label(id).unwrap().handle();

        source.rename(id, "New");
        let report = labels.update(&mut source, &mut overlay, &camera, ts(0)).unwrap();
        assert_eq!(report.updated, 1);
        assert_eq!(labels.label(id).unwrap().handle(), handle);
        assert_eq!(overlay.label(handle).text, "New");
    }

    #[test]
    fn test_stop_releases_every_label() {
        let (mut source, mut overlay, mut labels) = running(None);
        let camera = FixedCamera::default();
        for name in ["A", "B", "C"] {
            let id = source.spawn_named(name);
            push(&source, id, 0, ahead(0.0), true);
        }
        labels.update(&mut source, &mut overlay, &camera, ts(0)).unwrap();
        assert_eq!(overlay.attached_count(), 3);

        assert_eq!(labels.stop(&mut source, &mut overlay).unwrap(), 3);
        assert!(overlay.labels.is_empty());
        assert_eq!(source.live_subscriptions(), 0);
        assert!(!labels.is_running());
        assert!(labels.is_empty());
    }

    #[test]
    fn test_lifecycle_errors() {
        let (mut source, mut overlay, mut labels) = running(None);
        let camera = FixedCamera::default();
        assert!(matches!(labels.start(&mut source), Err(HudError::AlreadyRunning(_))));

        labels.stop(&mut source, &mut overlay).unwrap();
        assert!(matches!(
            labels.stop(&mut source, &mut overlay),
            Err(HudError::NotRunning(_))
        ));
        assert!(matches!(
            labels.update(&mut source, &mut overlay, &camera, ts(0)),
            Err(HudError::NotRunning(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_local_subject_never_attached(flags in prop::collection::vec(any::<bool>(), 1..30)) {
            let mut source = FakeSource::new();
            let me = source.spawn_named("Me");
            let mut labels = HudLabels::new(&HudConfig::default(), Some(me));
            labels.start(&mut source).unwrap();
            let mut overlay = FakeOverlay::new();
            let camera = FixedCamera::default();

            for (i, visible) in flags.into_iter().enumerate() {
                let ms = i as u64 * 10;
                push(&source, me, ms, ahead(i as f32), visible);
                labels.update(&mut source, &mut overlay, &camera, ts(ms)).unwrap();
                let handle = labels.label(me).unwrap().handle();
                prop_assert!(!overlay.label(handle).attached);
            }
            prop_assert_eq!(overlay.attach_calls, 0);
        }

        #[test]
        fn prop_behind_camera_never_attached(
            flags in prop::collection::vec(any::<bool>(), 1..30),
            depth in 0.5f32..100.0,
        ) {
            let (mut source, mut overlay, mut labels) = running(None);
            let camera = FixedCamera::default();
            let id = source.spawn_named("Rear");

            for (i, visible) in flags.into_iter().enumerate() {
                let ms = i as u64 * 10;
                push(&source, id, ms, Vector3::new(0.0, 0.0, depth), visible);
                labels.update(&mut source, &mut overlay, &camera, ts(ms)).unwrap();
            }
            prop_assert_eq!(overlay.attach_calls, 0);
        }
    }
}
