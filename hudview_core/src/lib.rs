//! hudview Core - Client-side presentation glue for a networked space sim
//!
//! This library keeps the HUD in step with a simulation it does not own:
//! 1. **Rate Mismatch Problem**: bounded, thread-safe sample histories that
//!    turn sparse network updates into a continuous, interpolated pose
//! 2. **Churn Problem**: a live view index that diffs the entity source each
//!    frame into exactly-once create/update/destroy calls
//! 3. **Placement Problem**: a per-object render step that projects labels
//!    above their subjects, hides the viewer's own ship and drops anything
//!    behind the camera

pub mod config;
pub mod error;
pub mod hudview_index;
pub mod hudview_labels;
pub mod hudview_models;
pub mod hudview_time;
pub mod render_clock;
pub mod roster;
pub mod session;
pub mod source;

#[cfg(test)]
pub(crate) mod testkit;

// Re-export key types for convenience
pub use config::HudConfig;
pub use error::HudError;
pub use hudview_index::{LiveViewIndex, ReconcileStats, ViewHooks};
pub use hudview_labels::{HudLabels, LabelReport, LabelState, LabelTally, LabelView};
pub use hudview_models::{ModelReport, ModelView, ModelViews};
pub use hudview_time::{PushOutcome, Sample, TemporalSampleBuffer, Timestamp, Transition};
pub use render_clock::RenderClock;
pub use roster::{PlayerRoster, RosterEntry};
pub use session::{FrameReport, HudSession, TeardownReport};
pub use source::{Attribute, AttributeSet, EntitySource, ReadySubject, SubjectRecord, Subscription};
