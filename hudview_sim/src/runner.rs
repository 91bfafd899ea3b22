//! Scenario runner - drives a HUD session through presentation scenarios.
//!
//! Each run owns a virtual clock, an entity store fed by the oracle over a
//! faulty link, and recording display surfaces. After every frame the
//! runner checks the presentation invariants against those recordings:
//!
//! - one live label per named, positioned subject and nothing else
//! - one live model per classified, positioned subject and nothing else
//! - shown labels attached, every other label detached
//! - no label attached twice, the local viewer's label never attached
//! - render time never moves backwards
//!
//! After `stop` every handle and subscription must be released.

use crate::camera::PinholeCamera;
use crate::context::SimContext;
use crate::error::SimError;
use crate::exporter::{LabelPlacement, SimEvent, SimExport, SimFrame};
use crate::network::{LinkProfile, NetworkStats, SampleNetwork};
use crate::oracle::Oracle;
use crate::overlay::{OverlayStats, RecordingOverlay, RecordingScene};
use crate::scenarios::ScenarioId;
use crate::store::SimEntityStore;

use hudview_core::hudview_labels::LABEL_ATTRIBUTES;
use hudview_core::hudview_models::MODEL_ATTRIBUTES;
use hudview_core::{
    Attribute, AttributeSet, FrameReport, HudConfig, HudSession, LabelState,
    TemporalSampleBuffer, Timestamp, Transition,
};
use hudview_env::{CullHint, OverlaySurface, SubjectClass, SubjectId, ViewContext};
use nalgebra::Vector3;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Largest tolerated distance between an interpolated label anchor and
/// ground truth, in world units.
pub const MAX_INTERP_ERROR: f32 = 0.01;

const NETWORK_STREAM: u64 = 1;
const SCRIPT_STREAM: u64 = 2;

/// Violation messages kept per run; the rest are only counted.
const MAX_RECORDED_VIOLATIONS: usize = 8;

const CALLSIGNS: [&str; 12] = [
    "Aurora", "Basilisk", "Corsair", "Dauntless", "Ember", "Falcon", "Gryphon", "Harrier", "Ion",
    "Jackal", "Kestrel", "Lancer",
];

fn callsign(n: u64) -> String {
    let base = CALLSIGNS[(n as usize) % CALLSIGNS.len()];
    if (n as usize) < CALLSIGNS.len() {
        base.to_string()
    } else {
        format!("{} {}", base, n)
    }
}

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Total frames rendered
    pub total_frames: u64,

    /// Final simulation time in seconds
    pub final_time_secs: f64,

    /// Number of live labels just before teardown
    pub final_label_count: usize,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

impl ScenarioResult {
    fn aborted(scenario: ScenarioId, seed: u64, error: SimError) -> Self {
        Self {
            scenario,
            seed,
            passed: false,
            total_frames: 0,
            final_time_secs: 0.0,
            final_label_count: 0,
            failure_reason: Some(format!("aborted: {}", error)),
            metrics: ScenarioMetrics::default(),
        }
    }
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScenarioMetrics {
    /// Link counters at the end of the run
    pub network: NetworkStats,

    /// Samples still on the wire when the run ended
    pub in_flight_at_end: u64,

    /// Overlay counters at the end of the run
    pub overlay: OverlayStats,

    pub frames_rendered: u64,

    /// Most labels alive in a single frame
    pub peak_labels: usize,

    /// Label-frames per render outcome
    pub label_frames_shown: u64,
    pub label_frames_hidden: u64,
    pub label_frames_behind: u64,
    pub label_frames_off_screen: u64,
    pub label_frames_suppressed: u64,
    pub label_frames_no_data: u64,

    /// Records seen without every attribute their view needs
    pub deferred_records: u64,

    /// Frames in which some shown label sat past its newest sample
    pub frozen_frames: u64,

    /// Worst interpolated anchor vs ground truth distance
    pub max_interp_error: f32,

    /// Interpolated anchors compared against ground truth
    pub interp_checks: u64,

    pub subjects_spawned: u64,
    pub subjects_despawned: u64,
    pub renames: u64,

    pub invariant_violations: u64,
}

// ============================================================================
// WORLD (everything upstream of the HUD)
// ============================================================================

struct Tracked {
    ship: u64,
    /// `None` until the subject's position history is bound
    buffer: Option<TemporalSampleBuffer>,
}

struct World {
    context: Arc<SimContext>,
    store: SimEntityStore,
    oracle: Oracle,
    network: SampleNetwork,
    tracked: BTreeMap<SubjectId, Tracked>,
    rng: ChaCha8Rng,
    events: Vec<SimEvent>,
    spawned: u64,
    despawned: u64,
    renames: u64,
}

impl World {
    fn new(context: Arc<SimContext>, seed: u64, config: &HudConfig) -> Self {
        let physics_seed = seed.wrapping_mul(0x9e3779b97f4a7c15);
        Self {
            store: SimEntityStore::new(config.history_capacity),
            oracle: Oracle::new(physics_seed),
            network: SampleNetwork::new(context.derive_rng(NETWORK_STREAM), LinkProfile::default()),
            rng: context.derive_rng(SCRIPT_STREAM),
            context,
            tracked: BTreeMap::new(),
            events: Vec::new(),
            spawned: 0,
            despawned: 0,
            renames: 0,
        }
    }

    fn now_secs(&self) -> f64 {
        self.context.now().as_secs_f64()
    }

    /// Spawns a named, classified subject with no position history yet.
    fn spawn_unbound(
        &mut self,
        name: &str,
        class: SubjectClass,
        origin: Vector3<f32>,
        velocity: Vector3<f32>,
    ) -> Result<SubjectId, SimError> {
        let ship = self.oracle.spawn_ship(name, class, origin, velocity, self.now_secs());
        let subject = self.store.spawn();
        self.store.set_name(subject, name)?;
        self.store.set_class(subject, class)?;
        self.tracked.insert(subject, Tracked { ship, buffer: None });
        self.spawned += 1;
        self.events.push(SimEvent::info(format!("{} joined as {}", name, subject)));
        Ok(subject)
    }

    fn spawn_ship(
        &mut self,
        name: &str,
        class: SubjectClass,
        origin: Vector3<f32>,
        velocity: Vector3<f32>,
    ) -> Result<SubjectId, SimError> {
        let subject = self.spawn_unbound(name, class, origin, velocity)?;
        self.bind_history(subject)?;
        Ok(subject)
    }

    fn bind_history(&mut self, subject: SubjectId) -> Result<(), SimError> {
        let tracked = self
            .tracked
            .get_mut(&subject)
            .ok_or(SimError::UnknownSubject(subject))?;
        tracked.buffer = Some(self.store.attach_history(subject)?);
        Ok(())
    }

    fn despawn(&mut self, subject: SubjectId) -> Result<(), SimError> {
        let tracked = self
            .tracked
            .remove(&subject)
            .ok_or(SimError::UnknownSubject(subject))?;
        self.oracle.remove_ship(tracked.ship);
        self.store.despawn(subject)?;
        self.despawned += 1;
        self.events.push(SimEvent::info(format!("{} left", subject)));
        Ok(())
    }

    fn rename(&mut self, subject: SubjectId, name: &str) -> Result<(), SimError> {
        self.store.set_name(subject, name)?;
        self.renames += 1;
        self.events.push(SimEvent::info(format!("{} renamed to {}", subject, name)));
        Ok(())
    }

    /// A uniformly chosen tracked subject other than `exclude`.
    fn pick(&mut self, exclude: Option<SubjectId>) -> Option<SubjectId> {
        let candidates: Vec<SubjectId> = self
            .tracked
            .keys()
            .copied()
            .filter(|id| Some(*id) != exclude)
            .collect();
        if candidates.is_empty() {
            return None;
        }
        Some(candidates[self.rng.gen_range(0..candidates.len())])
    }

    /// One producer tick: sample every bound ship at `at` and send it.
    fn produce(&mut self, at: Duration) {
        for tracked in self.tracked.values() {
            let Some(buffer) = &tracked.buffer else {
                continue;
            };
            if let Some(sample) = self.oracle.sample(tracked.ship, at) {
                self.network.send(buffer, sample, at);
            }
        }
    }
}

// ============================================================================
// RIG (world + HUD + recordings)
// ============================================================================

struct Setup {
    local: Option<SubjectId>,
    camera: PinholeCamera,
    position_noise: f32,
    outage: Option<(f64, f64)>,
}

impl Setup {
    fn new() -> Self {
        Self {
            local: None,
            camera: PinholeCamera::default(),
            position_noise: 0.0,
            outage: None,
        }
    }
}

struct Rig {
    scenario: ScenarioId,
    world: World,
    overlay: RecordingOverlay,
    scene: RecordingScene,
    camera: PinholeCamera,
    session: HudSession<SimContext>,
    local: Option<SubjectId>,
    check_interpolation: bool,
    outage: Option<(f64, f64)>,
    pending_history: Vec<(u64, SubjectId)>,
    last_render: Timestamp,
    metrics: ScenarioMetrics,
    violations: Vec<String>,
}

impl Rig {
    /// Scripted world changes for `frame`, applied before it renders.
    fn script(&mut self, frame: u64, t: f64) -> Result<(), SimError> {
        match self.scenario {
            ScenarioId::Churn => self.churn(frame),
            ScenarioId::SelfView => {
                self.follow_local(t);
                Ok(())
            }
            ScenarioId::Blackout => {
                self.apply_outage(t);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn churn(&mut self, frame: u64) -> Result<(), SimError> {
        let world = &mut self.world;

        if frame > 0 && frame % 20 == 0 && world.tracked.len() < 16 {
            let name = callsign(world.spawned);
            let origin = Vector3::new(
                world.rng.gen_range(-30.0f32..30.0),
                world.rng.gen_range(-10.0f32..10.0),
                world.rng.gen_range(-80.0f32..-30.0),
            );
            let velocity = Vector3::new(world.rng.gen_range(-3.0f32..3.0), 0.0, 0.0);
            world.spawn_ship(&name, SubjectClass::Ship, origin, velocity)?;
        }

        if frame % 30 == 15 && world.tracked.len() > 3 {
            if let Some(victim) = world.pick(None) {
                world.despawn(victim)?;
            }
        }

        if frame % 25 == 10 {
            if let Some(subject) = world.pick(None) {
                let name = format!("{} {}", callsign(subject.raw()), frame);
                world.rename(subject, &name)?;
            }
        }

        // Named before its history arrives: deferred until bound
        if frame % 40 == 5 {
            let name = callsign(world.spawned);
            let origin = Vector3::new(world.rng.gen_range(-20.0f32..20.0), 0.0, -50.0);
            let subject =
                world.spawn_unbound(&name, SubjectClass::Ship, origin, Vector3::zeros())?;
            self.pending_history.push((frame + 10, subject));
        }

        let (due, waiting): (Vec<_>, Vec<_>) = self
            .pending_history
            .drain(..)
            .partition(|(at, _)| *at <= frame);
        self.pending_history = waiting;
        for (_, subject) in due {
            if self.world.tracked.contains_key(&subject) {
                self.world.bind_history(subject)?;
            }
        }

        if frame > 0 && frame % 120 == 0 {
            let open = self.session.toggle_roster(&mut self.world.store);
            debug!(frame, open, "roster toggled");
        }
        Ok(())
    }

    /// Puts the camera on the local ship, looking down its heading.
    fn follow_local(&mut self, t: f64) {
        let ship = self
            .local
            .and_then(|local| self.world.tracked.get(&local))
            .and_then(|tracked| self.world.oracle.ship(tracked.ship));
        if let Some(ship) = ship {
            let eye = ship.position_at(t);
            self.camera.look_at(eye, eye - Vector3::z());
        }
    }

    fn apply_outage(&mut self, t: f64) {
        let Some((start, end)) = self.outage else {
            return;
        };
        let active = t >= start && t < end;
        if active != self.world.network.is_blacked_out() {
            self.world.network.set_blackout(active);
            let message = if active { "link down" } else { "link restored" };
            info!(t, "{}", message);
            self.world.events.push(SimEvent::info(message));
        }
    }

    fn frame(&mut self) -> Result<FrameReport, SimError> {
        let now = self.world.context.now();
        self.world.network.deliver_due(now);
        let report = self.session.frame(
            &mut self.world.store,
            &mut self.overlay,
            &mut self.scene,
            &self.camera,
        )?;
        self.observe(&report);
        self.check(&report)?;
        Ok(report)
    }

    fn observe(&mut self, report: &FrameReport) {
        let tally = report.labels.tally;
        let render_secs = report.render_time.as_micros() as f64 / 1_000_000.0;
        let mut frozen = false;
        let mut max_error = self.metrics.max_interp_error;
        let mut checks = 0;

        for (id, view) in self.session.labels().labels() {
            if view.state() != LabelState::Shown {
                continue;
            }
            let Some(tracked) = self.world.tracked.get(&id) else {
                continue;
            };
            let Some(buffer) = &tracked.buffer else {
                continue;
            };
            match buffer.query(report.render_time) {
                Some(span @ Transition::Span { .. }) if self.check_interpolation => {
                    if let Some(ship) = self.world.oracle.ship(tracked.ship) {
                        let error = (span.position_at(report.render_time)
                            - ship.position_at(render_secs))
                        .norm();
                        max_error = max_error.max(error);
                        checks += 1;
                    }
                }
                Some(Transition::Hold(sample)) if report.render_time > sample.timestamp => {
                    frozen = true;
                }
                _ => {}
            }
        }

        let m = &mut self.metrics;
        m.frames_rendered += 1;
        m.peak_labels = m.peak_labels.max(self.session.labels().len());
        m.label_frames_shown += tally.shown as u64;
        m.label_frames_hidden += tally.hidden as u64;
        m.label_frames_behind += tally.behind_camera as u64;
        m.label_frames_off_screen += tally.off_screen as u64;
        m.label_frames_suppressed += tally.suppressed as u64;
        m.label_frames_no_data += tally.no_data as u64;
        m.deferred_records += (report.labels.deferred + report.models.deferred) as u64;
        m.max_interp_error = max_error;
        m.interp_checks += checks;
        if frozen {
            m.frozen_frames += 1;
        }
    }

    fn check(&mut self, report: &FrameReport) -> Result<(), SimError> {
        let mut failures = Vec::new();
        let labels = self.session.labels();
        let models = self.session.models();
        let stats = self.overlay.stats();

        if report.render_time < self.last_render {
            failures.push(format!(
                "render time went backwards: {} -> {}",
                self.last_render, report.render_time
            ));
        }
        if stats.double_attaches > 0 {
            failures.push(format!("{} double attaches", stats.double_attaches));
        }
        if stats.unknown_handles > 0 || self.scene.stats().unknown_handles > 0 {
            failures.push("call on a released handle".to_string());
        }

        let ready_labels = self.world.store.count_ready(LABEL_ATTRIBUTES);
        if labels.len() != ready_labels {
            failures.push(format!(
                "{} labels for {} labelable subjects",
                labels.len(),
                ready_labels
            ));
        }
        let ready_models = self.world.store.count_ready(MODEL_ATTRIBUTES);
        if models.len() != ready_models {
            failures.push(format!(
                "{} models for {} drawable subjects",
                models.len(),
                ready_models
            ));
        }
        if self.overlay.live_handles() != labels.len() {
            failures.push(format!(
                "{} overlay handles for {} labels",
                self.overlay.live_handles(),
                labels.len()
            ));
        }
        if self.scene.live_handles() != models.len() {
            failures.push(format!(
                "{} scene handles for {} models",
                self.scene.live_handles(),
                models.len()
            ));
        }

        for (id, view) in labels.labels() {
            let attached = self.overlay.is_attached(view.handle());
            let expected = match view.state() {
                LabelState::Shown => true,
                LabelState::NoData
                | LabelState::Hidden
                | LabelState::BehindCamera
                | LabelState::OffScreen
                | LabelState::Suppressed => false,
            };
            if attached != expected {
                failures.push(format!(
                    "{} is {:?} but attached={}",
                    id,
                    view.state(),
                    attached
                ));
            }
        }

        if let Some(local) = self.local {
            if let Some(view) = labels.label(local) {
                if self.overlay.is_attached(view.handle()) {
                    failures.push(format!("local subject {} has an attached label", local));
                }
            }
            if let Some(handle) = models.model(local) {
                if self.scene.model(handle)?.cull != CullHint::Always {
                    failures.push(format!("local subject {} model is drawn", local));
                }
            }
        }

        let roster = self.session.roster();
        if roster.is_open() {
            let named = self
                .world
                .store
                .count_ready(AttributeSet::EMPTY.with(Attribute::Name));
            if roster.entries().len() != named {
                failures.push(format!(
                    "roster lists {} of {} named subjects",
                    roster.entries().len(),
                    named
                ));
            }
        }

        self.last_render = report.render_time;
        for failure in failures {
            self.violation(report.frame, failure);
        }
        Ok(())
    }

    fn violation(&mut self, frame: u64, message: String) {
        self.metrics.invariant_violations += 1;
        if self.violations.len() < MAX_RECORDED_VIOLATIONS {
            warn!(frame, "invariant violated: {}", message);
            self.violations.push(format!("frame {}: {}", frame, message));
        }
    }

    fn snapshot(&mut self, t: f64, report: &FrameReport) -> SimFrame {
        let mut labels: Vec<LabelPlacement> = self
            .session
            .labels()
            .labels()
            .map(|(id, view)| {
                LabelPlacement::new(id.raw(), view.text(), view.state(), view.placement())
            })
            .collect();
        labels.sort_by_key(|label| label.subject);
        SimFrame {
            time_sec: t,
            render_time_us: report.render_time.as_micros(),
            labels,
            events: std::mem::take(&mut self.world.events),
        }
    }

    /// Stops the session and checks nothing outlived it. Returns the label
    /// count just before teardown.
    fn finish(&mut self) -> Result<usize, SimError> {
        let final_labels = self.session.labels().len();
        let teardown =
            self.session
                .stop(&mut self.world.store, &mut self.overlay, &mut self.scene)?;
        debug!(?teardown, "session torn down");

        let frame = self.metrics.frames_rendered;
        if self.overlay.live_handles() != 0 {
            let leaked = self.overlay.live_handles();
            self.violation(frame, format!("{} labels outlived stop", leaked));
        }
        if self.scene.live_handles() != 0 {
            let leaked = self.scene.live_handles();
            self.violation(frame, format!("{} models outlived stop", leaked));
        }
        if self.world.store.active_subscriptions() != 0 {
            let leaked = self.world.store.active_subscriptions();
            self.violation(frame, format!("{} subscriptions outlived stop", leaked));
        }

        let m = &mut self.metrics;
        m.network = self.world.network.stats();
        m.in_flight_at_end = self.world.network.in_flight() as u64;
        m.overlay = self.overlay.stats();
        m.subjects_spawned = self.world.spawned;
        m.subjects_despawned = self.world.despawned;
        m.renames = self.world.renames;
        Ok(final_labels)
    }

    /// Scenario-specific pass criteria. `None` means passed.
    fn verdict(&self) -> Option<String> {
        let m = &self.metrics;
        if let Some(first) = self.violations.first() {
            return Some(format!(
                "{} invariant violation(s), first at {}",
                m.invariant_violations, first
            ));
        }
        if m.max_interp_error > MAX_INTERP_ERROR {
            return Some(format!(
                "interpolation error {:.4} exceeds {}",
                m.max_interp_error, MAX_INTERP_ERROR
            ));
        }

        match self.scenario {
            ScenarioId::SteadyFlight => {
                if m.label_frames_shown == 0 {
                    return Some("no label was ever shown".to_string());
                }
                if m.interp_checks == 0 {
                    return Some("no interpolated label was checked".to_string());
                }
            }
            ScenarioId::JitterStorm => {
                let net = m.network;
                let accounted = net.delivered + net.rejected + net.dropped + m.in_flight_at_end;
                if net.sent != accounted {
                    return Some(format!(
                        "{} samples sent but {} accounted for",
                        net.sent, accounted
                    ));
                }
                if m.label_frames_shown == 0 {
                    return Some("no label survived the storm".to_string());
                }
            }
            ScenarioId::Churn => {
                if m.subjects_despawned == 0 || m.renames == 0 {
                    return Some("churn script never ran".to_string());
                }
                if m.deferred_records == 0 {
                    return Some("no half-built subject was deferred".to_string());
                }
            }
            ScenarioId::SelfView => {
                if m.label_frames_suppressed == 0 {
                    return Some("local label was never suppressed".to_string());
                }
            }
            ScenarioId::RearView => {
                if m.overlay.attaches > 0 {
                    return Some(format!(
                        "{} labels attached for ships behind the camera",
                        m.overlay.attaches
                    ));
                }
                if m.label_frames_behind == 0 {
                    return Some("no label was classified behind the camera".to_string());
                }
            }
            ScenarioId::Blackout => {
                if m.label_frames_hidden == 0 {
                    return Some("cloaked ships were never hidden".to_string());
                }
                if m.frozen_frames == 0 {
                    return Some("labels never froze during the outage".to_string());
                }
            }
        }
        None
    }
}

// ============================================================================
// RUNNER
// ============================================================================

/// Runs presentation scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Producer tick rate in Hz
    tick_rate_hz: u32,

    /// Render frame rate in Hz
    frame_rate_hz: u32,

    /// Maximum duration in seconds
    max_duration_secs: f64,

    /// Presentation settings handed to the session
    config: HudConfig,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            tick_rate_hz: 30,
            frame_rate_hz: 60,
            max_duration_secs: 10.0,
            config: HudConfig::default(),
        }
    }

    /// Sets the producer tick rate.
    pub fn with_tick_rate(mut self, hz: u32) -> Self {
        self.tick_rate_hz = hz.max(1);
        self
    }

    /// Sets the render frame rate.
    pub fn with_frame_rate(mut self, hz: u32) -> Self {
        self.frame_rate_hz = hz.max(1);
        self
    }

    /// Sets the maximum duration.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.max_duration_secs = secs.max(0.0);
        self
    }

    pub fn with_config(mut self, config: HudConfig) -> Self {
        self.config = config;
        self
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);
        let result = self
            .execute(scenario, None)
            .unwrap_or_else(|e| ScenarioResult::aborted(scenario, self.seed, e));
        log_outcome(&result);
        result
    }

    /// Runs a scenario and also records a frame-by-frame export.
    pub fn run_exported(&self, scenario: ScenarioId) -> (ScenarioResult, SimExport) {
        info!("Starting scenario: {} (seed={}, exporting)", scenario.name(), self.seed);
        let mut export = SimExport::new(scenario.name(), self.seed);
        let result = self
            .execute(scenario, Some(&mut export))
            .unwrap_or_else(|e| ScenarioResult::aborted(scenario, self.seed, e));
        export.finalize(result.passed, result.failure_reason.clone());
        log_outcome(&result);
        (result, export)
    }

    fn execute(
        &self,
        scenario: ScenarioId,
        mut export: Option<&mut SimExport>,
    ) -> Result<ScenarioResult, SimError> {
        let mut rig = self.build(scenario)?;

        let frame_ns = 1_000_000_000 / u64::from(self.frame_rate_hz.max(1));
        let tick_ns = 1_000_000_000 / u64::from(self.tick_rate_hz.max(1));
        let total_frames = (self.max_duration_secs * f64::from(self.frame_rate_hz)) as u64;
        let export_every = u64::from(self.frame_rate_hz / 10).max(1);
        let mut next_tick_ns = 0;
        let mut final_time_secs = 0.0;

        for frame in 0..total_frames {
            let now_ns = (frame + 1) * frame_ns;
            rig.world.context.set_time(now_ns);
            let t = now_ns as f64 / 1e9;
            final_time_secs = t;

            rig.script(frame, t)?;
            while next_tick_ns <= now_ns {
                rig.world.produce(Duration::from_nanos(next_tick_ns));
                next_tick_ns += tick_ns;
            }

            let report = rig.frame()?;
            match export.as_deref_mut() {
                Some(export) if frame % export_every == 0 => {
                    export.add_frame(rig.snapshot(t, &report));
                }
                Some(_) => {}
                None => rig.world.events.clear(),
            }

            if frame % u64::from(self.frame_rate_hz) == 0 {
                debug!(
                    t,
                    labels = rig.session.labels().len(),
                    shown = report.labels.tally.shown,
                    in_flight = rig.world.network.in_flight(),
                    "progress"
                );
            }
        }

        let final_label_count = rig.finish()?;
        let failure_reason = rig.verdict();
        Ok(ScenarioResult {
            scenario,
            seed: self.seed,
            passed: failure_reason.is_none(),
            total_frames,
            final_time_secs,
            final_label_count,
            failure_reason,
            metrics: rig.metrics,
        })
    }

    fn build(&self, scenario: ScenarioId) -> Result<Rig, SimError> {
        let context = SimContext::shared(self.seed);
        let mut world = World::new(context.clone(), self.seed, &self.config);

        let setup = match scenario {
            ScenarioId::SteadyFlight => self.setup_steady_flight(&mut world)?,
            ScenarioId::JitterStorm => self.setup_jitter_storm(&mut world)?,
            ScenarioId::Churn => self.setup_churn(&mut world)?,
            ScenarioId::SelfView => self.setup_self_view(&mut world)?,
            ScenarioId::RearView => self.setup_rear_view(&mut world)?,
            ScenarioId::Blackout => self.setup_blackout(&mut world)?,
        };
        world.oracle.set_position_noise(setup.position_noise);

        let mut session = HudSession::new(context, self.config.clone(), setup.local)?;
        session.start(&mut world.store)?;
        if scenario == ScenarioId::Churn {
            session.toggle_roster(&mut world.store);
        }

        Ok(Rig {
            scenario,
            world,
            overlay: RecordingOverlay::new(),
            scene: RecordingScene::new(),
            camera: setup.camera,
            session,
            local: setup.local,
            check_interpolation: setup.position_noise == 0.0,
            outage: setup.outage,
            pending_history: Vec::new(),
            last_render: Timestamp::ZERO,
            metrics: ScenarioMetrics::default(),
            violations: Vec::new(),
        })
    }

    /// `count` ships in a loose line ahead of the camera, drifting sideways.
    fn formation(world: &mut World, count: usize, depth: f32) -> Result<Vec<SubjectId>, SimError> {
        (0..count)
            .map(|i| {
                let x = -35.0 + 10.0 * i as f32;
                let y = ((i % 3) as f32 - 1.0) * 4.0;
                let origin = Vector3::new(x, y, depth - 5.0 * i as f32);
                let drift = if i % 2 == 0 { 3.0 } else { -3.0 };
                let velocity = Vector3::new(drift, 0.0, 1.0);
                let subject = world.spawn_ship(&callsign(i as u64), SubjectClass::Ship, origin, velocity)?;
                if let Some(tracked) = world.tracked.get(&subject) {
                    world.oracle.set_yaw_rate(tracked.ship, 0.4);
                }
                Ok(subject)
            })
            .collect()
    }

    /// HUD-001: Ships crossing the view on a clean link.
    ///
    /// **Assertion**: Interpolated anchors within 0.01 of ground truth.
    fn setup_steady_flight(&self, world: &mut World) -> Result<Setup, SimError> {
        info!("HUD-001: SteadyFlight - 8 ships, 30ms link");
        world
            .network
            .set_profile(LinkProfile::new(Duration::from_millis(30), Duration::ZERO, 0.0));
        Self::formation(world, 8, -60.0)?;
        Ok(Setup::new())
    }

    /// HUD-002: Heavy jitter and loss with noisy positions.
    ///
    /// **Assertion**: Every sent sample is delivered, dropped, rejected as
    /// stale or still in flight.
    fn setup_jitter_storm(&self, world: &mut World) -> Result<Setup, SimError> {
        info!("HUD-002: JitterStorm - 60ms +/- 40ms, 15% loss");
        world.network.set_profile(LinkProfile::new(
            Duration::from_millis(60),
            Duration::from_millis(40),
            0.15,
        ));
        Self::formation(world, 8, -60.0)?;
        Ok(Setup {
            position_noise: 0.05,
            ..Setup::new()
        })
    }

    /// HUD-003: Subjects joining, leaving and being renamed constantly.
    ///
    /// **Assertion**: Label and roster counts track the store every frame.
    fn setup_churn(&self, world: &mut World) -> Result<Setup, SimError> {
        info!("HUD-003: Churn - spawn/despawn/rename");
        Self::formation(world, 4, -50.0)?;
        Ok(Setup::new())
    }

    /// HUD-004: Camera riding the local viewer's ship.
    ///
    /// **Assertion**: The local label is never attached and the local model
    /// never drawn.
    fn setup_self_view(&self, world: &mut World) -> Result<Setup, SimError> {
        info!("HUD-004: SelfView - camera on the local ship");
        let heading = Vector3::new(0.0, 0.0, -4.0);
        let local = world.spawn_ship("Vanguard", SubjectClass::Ship, Vector3::zeros(), heading)?;
        for i in 0..5 {
            let origin = Vector3::new(-20.0 + 10.0 * i as f32, 2.0, -40.0);
            world.spawn_ship(&callsign(i), SubjectClass::Ship, origin, heading)?;
        }
        Ok(Setup {
            local: Some(local),
            ..Setup::new()
        })
    }

    /// HUD-005: Traffic passing behind the camera.
    ///
    /// **Assertion**: No label is ever attached.
    fn setup_rear_view(&self, world: &mut World) -> Result<Setup, SimError> {
        info!("HUD-005: RearView - ships behind the camera");
        for i in 0..6 {
            let origin = Vector3::new(-25.0 + 10.0 * i as f32, 0.0, 20.0 + 5.0 * i as f32);
            let drift = if i % 2 == 0 { 2.0 } else { -2.0 };
            world.spawn_ship(
                &callsign(i),
                SubjectClass::Ship,
                origin,
                Vector3::new(drift, 0.0, 0.5),
            )?;
        }
        Ok(Setup::new())
    }

    /// HUD-006: Cloak windows, then a full link outage.
    ///
    /// **Assertion**: Cloaked ships go hidden, and labels freeze at their
    /// last sample while the link is down.
    fn setup_blackout(&self, world: &mut World) -> Result<Setup, SimError> {
        info!("HUD-006: Blackout - cloaks and a link outage");
        world
            .network
            .set_profile(LinkProfile::new(Duration::from_millis(30), Duration::ZERO, 0.0));
        let subjects = Self::formation(world, 6, -60.0)?;

        let d = self.max_duration_secs;
        for subject in subjects.iter().skip(1).step_by(2) {
            if let Some(tracked) = world.tracked.get(subject) {
                world.oracle.add_cloak(tracked.ship, 0.2 * d, 0.4 * d);
            }
        }
        Ok(Setup {
            outage: Some((0.5 * d, 0.6 * d)),
            ..Setup::new()
        })
    }
}

fn log_outcome(result: &ScenarioResult) {
    if result.passed {
        info!(
            "✅ {} passed: {} frames, peak {} labels",
            result.scenario.name(),
            result.total_frames,
            result.metrics.peak_labels
        );
    } else {
        warn!(
            "❌ {} failed: {}",
            result.scenario.name(),
            result.failure_reason.as_deref().unwrap_or("unknown")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steady_flight_scenario() {
        let result = ScenarioRunner::new(42).with_duration(3.0).run(ScenarioId::SteadyFlight);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.total_frames, 180);
        assert_eq!(result.final_label_count, 8);
        assert!(result.metrics.max_interp_error < MAX_INTERP_ERROR);
    }

    #[test]
    fn test_rear_view_never_attaches() {
        let result = ScenarioRunner::new(7).with_duration(2.0).run(ScenarioId::RearView);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.metrics.overlay.attaches, 0);
        assert_eq!(result.metrics.label_frames_shown, 0);
    }

    #[test]
    fn test_jitter_storm_accounts_for_every_sample() {
        let result = ScenarioRunner::new(42).with_duration(3.0).run(ScenarioId::JitterStorm);
        let net = result.metrics.network;
        assert!(net.dropped > 0);
        assert_eq!(
            net.sent,
            net.delivered + net.dropped + net.rejected + result.metrics.in_flight_at_end
        );
        // Noisy positions are not compared against truth
        assert_eq!(result.metrics.interp_checks, 0);
    }

    #[test]
    fn test_self_view_suppresses_local_label() {
        let result = ScenarioRunner::new(42).with_duration(2.0).run(ScenarioId::SelfView);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.label_frames_suppressed > 0);
        assert_eq!(result.final_label_count, 6);
    }

    #[test]
    fn test_blackout_hides_then_freezes() {
        let result = ScenarioRunner::new(42).with_duration(3.0).run(ScenarioId::Blackout);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.label_frames_hidden > 0);
        assert!(result.metrics.frozen_frames > 0);
        assert!(result.metrics.network.dropped > 0);
    }

    #[test]
    fn test_exported_run_records_sorted_frames() {
        let (result, export) = ScenarioRunner::new(42)
            .with_duration(1.0)
            .run_exported(ScenarioId::SteadyFlight);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(export.passed);
        assert_eq!(export.frames.len(), 10);

        let last = export.frames.last().unwrap();
        assert_eq!(last.labels.len(), 8);
        assert!(last.labels.windows(2).all(|w| w[0].subject < w[1].subject));
        assert!(export.frames[0].events.len() >= 8);
    }

    #[test]
    fn test_churn_deterministic() {
        let runner = ScenarioRunner::new(99).with_duration(4.0);
        let a = runner.run(ScenarioId::Churn);
        let b = runner.run(ScenarioId::Churn);
        assert!(a.passed, "{:?}", a.failure_reason);
        assert_eq!(a.metrics, b.metrics);
    }

    #[test]
    fn test_invalid_config_aborts() {
        let config = HudConfig {
            history_capacity: 1,
            ..HudConfig::default()
        };
        let result = ScenarioRunner::new(1)
            .with_config(config)
            .with_duration(1.0)
            .run(ScenarioId::SteadyFlight);
        assert!(!result.passed);
        assert!(result.failure_reason.unwrap().starts_with("aborted"));
    }

    #[test]
    fn test_callsigns_unique_past_the_list() {
        assert_eq!(callsign(0), "Aurora");
        assert_eq!(callsign(12), "Aurora 12");
        assert_ne!(callsign(1), callsign(13));
    }
}
