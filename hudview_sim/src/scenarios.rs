//! Presentation scenarios for the harness.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScenarioId {
    /// HUD-001: Ships crossing the view on a clean link
    SteadyFlight,

    /// HUD-002: Heavy latency jitter and loss, reordered samples
    JitterStorm,

    /// HUD-003: Subjects joining, leaving and being renamed constantly
    Churn,

    /// HUD-004: Camera riding the local viewer's own ship
    SelfView,

    /// HUD-005: Traffic passing behind the camera
    RearView,

    /// HUD-006: Cloaked ships and a full network outage
    Blackout,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::SteadyFlight,
            ScenarioId::JitterStorm,
            ScenarioId::Churn,
            ScenarioId::SelfView,
            ScenarioId::RearView,
            ScenarioId::Blackout,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::SteadyFlight => "steady_flight",
            ScenarioId::JitterStorm => "jitter_storm",
            ScenarioId::Churn => "churn",
            ScenarioId::SelfView => "self_view",
            ScenarioId::RearView => "rear_view",
            ScenarioId::Blackout => "blackout",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::SteadyFlight => "8 ships on a 30ms link, interpolation must match ground truth",
            ScenarioId::JitterStorm => "60ms +/- 40ms latency with 15% loss, stale samples rejected",
            ScenarioId::Churn => "Spawn/despawn/rename every few frames, labels track exactly",
            ScenarioId::SelfView => "Camera on the local ship, its label and model never shown",
            ScenarioId::RearView => "Ships behind the camera, no label ever attached for them",
            ScenarioId::Blackout => "Cloak windows plus a 1s outage, labels hide then freeze",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "steady_flight" | "steadyflight" | "hud-001" => Ok(ScenarioId::SteadyFlight),
            "jitter_storm" | "jitterstorm" | "hud-002" => Ok(ScenarioId::JitterStorm),
            "churn" | "hud-003" => Ok(ScenarioId::Churn),
            "self_view" | "selfview" | "hud-004" => Ok(ScenarioId::SelfView),
            "rear_view" | "rearview" | "hud-005" => Ok(ScenarioId::RearView),
            "blackout" | "hud-006" => Ok(ScenarioId::Blackout),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
