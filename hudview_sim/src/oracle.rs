//! Ground truth oracle for simulation.
//!
//! The Oracle holds the "God's eye view" of every ship:
//! - Analytic constant-velocity trajectories (exact at any instant)
//! - Yaw about the up axis at a fixed rate
//! - Cloak windows during which the ship reports itself invisible
//! - Sample generation with optional Gaussian position noise

use hudview_core::{Sample, Timestamp};
use hudview_env::SubjectClass;
use nalgebra::{UnitQuaternion, Vector3};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// A ground truth ship in the simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundTruthShip {
    /// Unique ship ID
    pub id: u64,

    /// Display name
    pub name: String,

    /// Model classification
    pub class: SubjectClass,

    /// Position at `spawned_at`
    pub origin: Vector3<f32>,

    /// Velocity in units per second
    pub velocity: Vector3<f32>,

    /// Yaw rate in radians per second
    pub yaw_rate: f32,

    /// Simulation second the ship appeared
    pub spawned_at: f64,

    /// Half-open `[start, end)` windows in which the ship is cloaked
    pub cloaks: Vec<(f64, f64)>,

    /// Ship is active (not destroyed/removed)
    pub active: bool,
}

impl GroundTruthShip {
    /// Exact position at simulation second `t`.
    pub fn position_at(&self, t: f64) -> Vector3<f32> {
        self.origin + self.velocity * (t - self.spawned_at) as f32
    }

    /// Exact orientation at simulation second `t`.
    pub fn orientation_at(&self, t: f64) -> UnitQuaternion<f32> {
        let yaw = self.yaw_rate * (t - self.spawned_at) as f32;
        UnitQuaternion::from_axis_angle(&Vector3::y_axis(), yaw)
    }

    pub fn visible_at(&self, t: f64) -> bool {
        !self.cloaks.iter().any(|&(start, end)| t >= start && t < end)
    }
}

/// The Oracle - owns ground truth and turns it into samples.
pub struct Oracle {
    /// RNG for physics noise
    physics_rng: ChaCha8Rng,

    /// All ships, ordered by ID
    ships: BTreeMap<u64, GroundTruthShip>,

    /// Next ship ID
    next_id: u64,

    /// Position noise standard deviation (world units)
    position_noise: Option<Normal<f32>>,
}

impl Oracle {
    /// Creates a new Oracle with the given physics seed.
    ///
    /// Keep the physics seed separate from the network seed so that changing
    /// network conditions doesn't affect trajectories.
    pub fn new(physics_seed: u64) -> Self {
        Self {
            physics_rng: ChaCha8Rng::seed_from_u64(physics_seed),
            ships: BTreeMap::new(),
            next_id: 0,
            position_noise: None,
        }
    }

    /// Sets the position noise standard deviation. Zero disables noise.
    pub fn set_position_noise(&mut self, std_dev: f32) {
        self.position_noise = Normal::new(0.0, std_dev).ok().filter(|_| std_dev > 0.0);
    }

    /// Spawns a ship at `t` and returns its ID.
    pub fn spawn_ship(
        &mut self,
        name: &str,
        class: SubjectClass,
        origin: Vector3<f32>,
        velocity: Vector3<f32>,
        t: f64,
    ) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.ships.insert(
            id,
            GroundTruthShip {
                id,
                name: name.to_string(),
                class,
                origin,
                velocity,
                yaw_rate: 0.0,
                spawned_at: t,
                cloaks: Vec::new(),
                active: true,
            },
        );
        id
    }

    pub fn set_yaw_rate(&mut self, id: u64, yaw_rate: f32) {
        if let Some(ship) = self.ships.get_mut(&id) {
            ship.yaw_rate = yaw_rate;
        }
    }

    /// Cloaks the ship over `[start, end)`.
    pub fn add_cloak(&mut self, id: u64, start: f64, end: f64) {
        if let Some(ship) = self.ships.get_mut(&id) {
            ship.cloaks.push((start, end));
        }
    }

    /// Removes a ship from the simulation.
    pub fn remove_ship(&mut self, id: u64) {
        if let Some(ship) = self.ships.get_mut(&id) {
            ship.active = false;
        }
    }

    pub fn ship(&self, id: u64) -> Option<&GroundTruthShip> {
        self.ships.get(&id)
    }

    /// Active ships in ID order.
    pub fn active_ships(&self) -> impl Iterator<Item = &GroundTruthShip> {
        self.ships.values().filter(|s| s.active)
    }

    /// A (possibly noisy) sample of ship `id` at `at`.
    pub fn sample(&mut self, id: u64, at: Duration) -> Option<Sample> {
        let ship = self.ships.get(&id).filter(|s| s.active)?;
        let t = at.as_secs_f64();
        let mut position = ship.position_at(t);
        let orientation = ship.orientation_at(t);
        let visible = ship.visible_at(t);

        if let Some(noise) = &self.position_noise {
            position += Vector3::new(
                noise.sample(&mut self.physics_rng),
                noise.sample(&mut self.physics_rng),
                noise.sample(&mut self.physics_rng),
            );
        }
        Some(Sample::new(Timestamp::from_duration(at), position, orientation, visible))
    }

    /// Samples every active ship at `at`, in ID order.
    pub fn sample_all(&mut self, at: Duration) -> Vec<(u64, Sample)> {
        let ids: Vec<u64> = self.active_ships().map(|s| s.id).collect();
        ids.into_iter()
            .filter_map(|id| self.sample(id, at).map(|s| (id, s)))
            .collect()
    }
}
