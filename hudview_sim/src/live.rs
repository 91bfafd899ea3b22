//! Real-time run against the OS clock.
//!
//! The producer runs as its own task and pushes samples into the shared
//! buffers while the frame loop reads them, so the buffers see real
//! concurrent access. Nothing here is deterministic; use the scenario
//! runner for reproducible checks.

use crate::camera::PinholeCamera;
use crate::error::SimError;
use crate::oracle::Oracle;
use crate::overlay::{RecordingOverlay, RecordingScene};
use crate::store::SimEntityStore;

use hudview_core::{HudConfig, HudSession, TeardownReport, TemporalSampleBuffer};
use hudview_env::{SubjectClass, SystemContext, ViewContext};
use nalgebra::Vector3;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info};

/// Settings for a live run.
#[derive(Debug, Clone)]
pub struct LiveConfig {
    pub seed: u64,
    pub duration: Duration,
    pub frame_rate_hz: u32,
    pub tick_rate_hz: u32,
    pub ships: usize,
    pub hud: HudConfig,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            duration: Duration::from_secs(5),
            frame_rate_hz: 60,
            tick_rate_hz: 30,
            ships: 6,
            hud: HudConfig::default(),
        }
    }
}

/// What a live run did.
#[derive(Debug, Clone, Serialize)]
pub struct LiveReport {
    pub frames: u64,
    pub samples_pushed: u64,
    pub samples_rejected: u64,
    pub peak_labels: usize,
    pub peak_shown: usize,
    pub teardown: TeardownReport,
}

#[derive(Default)]
struct ProducerCounters {
    pushed: AtomicU64,
    rejected: AtomicU64,
}

/// Runs the HUD for `config.duration` of wall-clock time.
pub async fn run_live(config: LiveConfig) -> Result<LiveReport, SimError> {
    let context = SystemContext::shared();
    let mut store = SimEntityStore::new(config.hud.history_capacity);
    let mut oracle = Oracle::new(config.seed);

    let spawned_at = context.now().as_secs_f64();
    let mut targets: Vec<(u64, TemporalSampleBuffer)> = Vec::with_capacity(config.ships);
    for i in 0..config.ships {
        let name = format!("Contact {}", i + 1);
        let origin = Vector3::new(-25.0 + 10.0 * i as f32, 0.0, -50.0);
        let velocity = Vector3::new(if i % 2 == 0 { 2.0 } else { -2.0 }, 0.0, 0.0);
        let ship = oracle.spawn_ship(&name, SubjectClass::Ship, origin, velocity, spawned_at);

        let subject = store.spawn();
        store.set_name(subject, &name)?;
        store.set_class(subject, SubjectClass::Ship)?;
        targets.push((ship, store.attach_history(subject)?));
    }

    let mut session = HudSession::new(context.clone(), config.hud.clone(), None)?;
    session.start(&mut store)?;

    let stop = Arc::new(AtomicBool::new(false));
    let counters = Arc::new(ProducerCounters::default());
    let (done_tx, done_rx) = oneshot::channel();
    {
        let context = context.clone();
        let stop = stop.clone();
        let counters = counters.clone();
        let tick = Duration::from_secs_f64(1.0 / f64::from(config.tick_rate_hz.max(1)));
        context.clone().spawn("sample-producer", async move {
            while !stop.load(Ordering::Relaxed) {
                let now = context.now();
                for (ship, buffer) in &targets {
                    let Some(sample) = oracle.sample(*ship, now) else {
                        continue;
                    };
                    if buffer.push(sample).is_accepted() {
                        counters.pushed.fetch_add(1, Ordering::Relaxed);
                    } else {
                        counters.rejected.fetch_add(1, Ordering::Relaxed);
                    }
                }
                context.sleep(tick).await;
            }
            let _ = done_tx.send(());
        });
    }

    info!(ships = config.ships, duration = ?config.duration, "live run started");
    let mut overlay = RecordingOverlay::new();
    let mut scene = RecordingScene::new();
    let camera = PinholeCamera::default();
    let frame_interval = Duration::from_secs_f64(1.0 / f64::from(config.frame_rate_hz.max(1)));
    let deadline = context.now() + config.duration;

    let mut frames = 0;
    let mut peak_labels = 0;
    let mut peak_shown = 0;
    while context.now() < deadline {
        let report = session.frame(&mut store, &mut overlay, &mut scene, &camera)?;
        frames += 1;
        peak_labels = peak_labels.max(session.labels().len());
        peak_shown = peak_shown.max(report.labels.tally.shown);
        if frames % 60 == 0 {
            debug!(frames, shown = report.labels.tally.shown, "live frame");
        }
        context.sleep(frame_interval).await;
    }

    stop.store(true, Ordering::Relaxed);
    let _ = done_rx.await;
    let teardown = session.stop(&mut store, &mut overlay, &mut scene)?;

    let report = LiveReport {
        frames,
        samples_pushed: counters.pushed.load(Ordering::Relaxed),
        samples_rejected: counters.rejected.load(Ordering::Relaxed),
        peak_labels,
        peak_shown,
        teardown,
    };
    info!(
        frames = report.frames,
        pushed = report.samples_pushed,
        peak_shown = report.peak_shown,
        "live run finished"
    );
    Ok(report)
}
