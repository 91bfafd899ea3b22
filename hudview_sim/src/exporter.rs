//! JSON exporter for label placements.
//!
//! Exports per-frame HUD state so a run can be replayed or plotted outside
//! the harness.

use hudview_core::LabelState;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;

use crate::error::SimError;

/// A single frame of HUD output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimFrame {
    /// Simulation time in seconds
    pub time_sec: f64,

    /// Render time in microseconds
    pub render_time_us: u64,

    /// Every live label, ordered by subject
    pub labels: Vec<LabelPlacement>,

    /// Events (spawns, outages, etc.)
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub events: Vec<SimEvent>,
}

/// One label's state in a frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelPlacement {
    pub subject: u64,
    pub text: String,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub screen: Option<[f32; 3]>,
}

impl LabelPlacement {
    pub fn new(subject: u64, text: &str, state: LabelState, screen: Option<Vector3<f32>>) -> Self {
        Self {
            subject,
            text: text.to_string(),
            state: format!("{:?}", state),
            screen: screen.map(|v| [v.x, v.y, v.z]),
        }
    }
}

/// Simulation event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimEvent {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub level: Option<String>,
}

impl SimEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: None,
        }
    }
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Duration in seconds
    pub duration_sec: f64,

    /// All frames
    pub frames: Vec<SimFrame>,

    /// Final results
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub failure_reason: Option<String>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            duration_sec: 0.0,
            frames: Vec::new(),
            passed: false,
            failure_reason: None,
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: SimFrame) {
        self.duration_sec = frame.time_sec;
        self.frames.push(frame);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, failure_reason: Option<String>) {
        self.passed = passed;
        self.failure_reason = failure_reason;
    }

    pub fn to_json(&self) -> Result<String, SimError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &str) -> Result<(), SimError> {
        let json = self.to_json()?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_json_shape() {
        let mut export = SimExport::new("steady_flight", 42);
        export.add_frame(SimFrame {
            time_sec: 0.5,
            render_time_us: 400_000,
            labels: vec![LabelPlacement::new(
                1,
                "Alpha",
                LabelState::Shown,
                Some(Vector3::new(10.0, 20.0, 0.5)),
            )],
            events: vec![],
        });
        export.finalize(true, None);

        let json = export.to_json().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["scenario"], "steady_flight");
        assert_eq!(parsed["duration_sec"], 0.5);
        assert_eq!(parsed["frames"][0]["labels"][0]["state"], "Shown");
        assert!(parsed["frames"][0].get("events").is_none());
        assert!(parsed.get("failure_reason").is_none());
    }
}
