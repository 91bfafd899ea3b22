//! Common types for the hudview environment abstraction.

use serde::{Deserialize, Serialize};

/// Identity of a simulated subject (ship, player, ...).
///
/// Assigned by the entity source, stable for the subject's lifetime and
/// never reused while the subject is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubjectId(pub u64);

impl SubjectId {
    /// Returns the raw identifier.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SubjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "subject#{}", self.0)
    }
}

/// Opaque display handle issued by an overlay surface or model scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HandleId(pub u64);

impl std::fmt::Display for HandleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "handle#{}", self.0)
    }
}

/// Classification attribute of a subject, used to pick a model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SubjectClass {
    /// A player-controlled ship
    Ship,

    /// A static gravity well rendered as a sphere
    GravSphere {
        /// Sphere radius in world units
        radius: f32,
    },
}

/// Linear RGBA color, each channel in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgba(pub [f32; 4]);

impl Rgba {
    pub const GREEN: Rgba = Rgba([0.0, 1.0, 0.0, 1.0]);
    pub const BLACK: Rgba = Rgba([0.0, 0.0, 0.0, 1.0]);
}

/// Whether a visual element takes part in drawing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CullHint {
    /// Drawn whenever its parent is drawn
    Inherit,

    /// Never drawn
    Always,
}

impl CullHint {
    /// Returns the hint for a visibility flag.
    pub fn for_visibility(visible: bool) -> Self {
        if visible {
            CullHint::Inherit
        } else {
            CullHint::Always
        }
    }
}
