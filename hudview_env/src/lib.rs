//! hudview Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" seam between the presentation core and
//! the things it does not own:
//! - Time (`now()`, `sleep()`) for the frame clock
//! - The camera/projection service
//! - The 2D screen overlay that hosts HUD labels
//! - The 3D scene that hosts subject models
//!
//! The core only ever talks to these traits, so the same label and model
//! logic runs against a real window (production) or against recording
//! doubles in the deterministic harness.
//!
//! # Example
//!
//! ```ignore
//! use hudview_env::{ViewContext, CameraProjection, OverlaySurface};
//!
//! fn frame<Ctx: ViewContext, O: OverlaySurface, C: CameraProjection>(
//!     ctx: &Ctx,
//!     overlay: &mut O,
//!     camera: &C,
//! ) {
//!     let now = ctx.now();
//!     // sample, project, attach...
//! }
//! ```

mod camera;
mod context;
mod error;
mod overlay;
mod scene;
mod tokio_impl;
mod types;

pub use camera::CameraProjection;
pub use context::ViewContext;
pub use error::EnvError;
pub use overlay::{LabelStyle, OverlaySurface};
pub use scene::ModelScene;
pub use tokio_impl::SystemContext;
pub use types::{CullHint, HandleId, Rgba, SubjectClass, SubjectId};
