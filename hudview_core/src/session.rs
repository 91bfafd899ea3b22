//! HUD Session - Orchestrates the presentation engines with a view context.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      HudSession                             │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │  RenderClock: now() - display_lag, once per frame    │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │                              │ render time                   │
//! │  ┌──────────────┐ ┌──────────────┐ ┌──────────────────┐     │
//! │  │  HudLabels   │ │  ModelViews  │ │   PlayerRoster   │     │
//! │  │  (overlay)   │ │   (scene)    │ │   (on demand)    │     │
//! │  └──────────────┘ └──────────────┘ └──────────────────┘     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use hudview_core::{HudConfig, HudSession};
//! use hudview_env::SystemContext;
//!
//! let mut session = HudSession::new(SystemContext::shared(), HudConfig::default(), Some(me))?;
//! session.start(&mut source)?;
//! loop {
//!     session.frame(&mut source, &mut overlay, &mut scene, &camera)?;
//! }
//! ```

use hudview_env::{CameraProjection, ModelScene, OverlaySurface, SubjectId, ViewContext};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::HudConfig;
use crate::error::HudError;
use crate::hudview_labels::{HudLabels, LabelReport};
use crate::hudview_models::{ModelReport, ModelViews};
use crate::hudview_time::Timestamp;
use crate::render_clock::RenderClock;
use crate::roster::PlayerRoster;
use crate::source::EntitySource;

/// What one frame did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrameReport {
    pub frame: u64,
    pub render_time: Timestamp,
    pub labels: LabelReport,
    pub models: ModelReport,
    pub roster_changed: bool,
}

/// Handles released by `stop`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TeardownReport {
    pub labels_released: usize,
    pub models_released: usize,
    pub roster_closed: bool,
}

/// The client-side presentation layer for one local viewer.
///
/// Generic over the context so the same frame loop runs against the OS
/// clock or a simulated one.
pub struct HudSession<Ctx: ViewContext> {
    clock: RenderClock<Ctx>,
    labels: HudLabels,
    models: ModelViews,
    roster: PlayerRoster,
    local_subject: Option<SubjectId>,
    config: HudConfig,
    running: bool,
}

impl<Ctx: ViewContext> HudSession<Ctx> {
    /// Creates a stopped session. Fails if `config` does not validate.
    pub fn new(
        context: Arc<Ctx>,
        config: HudConfig,
        local_subject: Option<SubjectId>,
    ) -> Result<Self, HudError> {
        config.validate()?;
        Ok(Self {
            clock: RenderClock::new(context, config.display_lag()),
            labels: HudLabels::new(&config, local_subject),
            models: ModelViews::new(local_subject),
            roster: PlayerRoster::new(),
            local_subject,
            config,
            running: false,
        })
    }

    /// Subscribes labels and models to the source.
    pub fn start<S: EntitySource + ?Sized>(&mut self, source: &mut S) -> Result<(), HudError> {
        if self.running {
            return Err(HudError::AlreadyRunning("hud session"));
        }
        self.labels.start(source)?;
        self.models.start(source)?;
        self.running = true;
        info!(
            local = ?self.local_subject,
            lag_ms = self.config.display_lag_ms,
            "hud session started"
        );
        Ok(())
    }

    /// Releases every handle and subscription the session holds.
    pub fn stop<S, O, M>(
        &mut self,
        source: &mut S,
        overlay: &mut O,
        scene: &mut M,
    ) -> Result<TeardownReport, HudError>
    where
        S: EntitySource + ?Sized,
        O: OverlaySurface + ?Sized,
        M: ModelScene + ?Sized,
    {
        if !self.running {
            return Err(HudError::NotRunning("hud session"));
        }
        let roster_closed = self.roster.is_open();
        self.roster.close(source);

        let report = TeardownReport {
            labels_released: self.labels.stop(source, overlay)?,
            models_released: self.models.stop(source, scene)?,
            roster_closed,
        };
        self.running = false;
        info!(
            labels = report.labels_released,
            models = report.models_released,
            "hud session stopped"
        );
        Ok(report)
    }

    /// Runs one frame: latch the render time, then reconcile and render
    /// labels and models at that time.
    pub fn frame<S, O, M, C>(
        &mut self,
        source: &mut S,
        overlay: &mut O,
        scene: &mut M,
        camera: &C,
    ) -> Result<FrameReport, HudError>
    where
        S: EntitySource + ?Sized,
        O: OverlaySurface + ?Sized,
        M: ModelScene + ?Sized,
        C: CameraProjection + ?Sized,
    {
        if !self.running {
            return Err(HudError::NotRunning("hud session"));
        }
        let render_time = self.clock.begin_frame();
        let labels = self.labels.update(source, overlay, camera, render_time)?;
        let models = self.models.update(source, scene, render_time)?;
        let roster_changed = self.roster.refresh(source);

        let report = FrameReport {
            frame: self.clock.frames(),
            render_time,
            labels,
            models,
            roster_changed,
        };
        debug!(
            frame = report.frame,
            %render_time,
            labels = self.labels.len(),
            models = self.models.len(),
            "frame complete"
        );
        Ok(report)
    }

    /// Opens or closes the player list. Returns true if now open.
    pub fn toggle_roster<S: EntitySource + ?Sized>(&mut self, source: &mut S) -> bool {
        self.roster.toggle(source)
    }

    pub fn roster(&self) -> &PlayerRoster {
        &self.roster
    }

    pub fn labels(&self) -> &HudLabels {
        &self.labels
    }

    pub fn models(&self) -> &ModelViews {
        &self.models
    }

    pub fn clock(&self) -> &RenderClock<Ctx> {
        &self.clock
    }

    pub fn config(&self) -> &HudConfig {
        &self.config
    }

    pub fn local_subject(&self) -> Option<SubjectId> {
        self.local_subject
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}
