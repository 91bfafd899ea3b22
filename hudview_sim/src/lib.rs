//! hudview Deterministic Simulation Harness
//!
//! A controlled environment where the whole presentation layer runs
//! reproducibly from a single 64-bit seed.
//!
//! # Core Principle: Everything Upstream Is Simulated
//!
//! All sources of non-determinism are intercepted and controlled:
//! - **Time**: a virtual clock stepped once per frame
//! - **Network**: a sample link with configurable latency, jitter, loss
//!   and outages
//! - **Randomness**: every stream derived from the master seed
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ScenarioRunner                         │
//! │  ┌──────────┐  samples  ┌─────────────┐  records            │
//! │  │  Oracle  │──────────►│ SampleNet   │────────┐            │
//! │  │ (truth)  │           │ (faulty)    │        ▼            │
//! │  └──────────┘           └─────────────┘  ┌───────────┐      │
//! │                                          │  Entity   │      │
//! │                                          │  Store    │      │
//! │                                          └─────┬─────┘      │
//! │                                                ▼            │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │ HudSession ──► RecordingOverlay / RecordingScene     │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use hudview_sim::{ScenarioId, ScenarioRunner};
//!
//! let result = ScenarioRunner::new(42).run(ScenarioId::JitterStorm);
//! assert!(result.passed);
//! ```

mod camera;
mod context;
mod error;
mod exporter;
mod live;
mod network;
mod oracle;
mod overlay;
mod runner;
mod store;
pub mod scenarios;

pub use camera::PinholeCamera;
pub use context::SimContext;
pub use error::SimError;
pub use exporter::{LabelPlacement, SimEvent, SimExport, SimFrame};
pub use live::{run_live, LiveConfig, LiveReport};
pub use network::{LinkProfile, NetworkStats, SampleNetwork};
pub use oracle::{GroundTruthShip, Oracle};
pub use overlay::{
    OverlayStats, RecordedLabel, RecordedModel, RecordingOverlay, RecordingScene, SceneStats,
};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner, MAX_INTERP_ERROR};
pub use scenarios::ScenarioId;
pub use store::SimEntityStore;
