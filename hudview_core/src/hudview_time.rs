//! The "TIME" Engine - Bounded Sample History + Interpolation
//!
//! Simulation updates and screen redraws run at independent rates. This
//! module keeps a short rolling window of timestamped samples per subject
//! and turns it into a continuous function of time:
//!
//! ```text
//!   push (network thread)          query (render thread)
//!        │                               │
//!        ▼                               ▼
//!   [s0][s1][s2] ... [s11]  ──►  Transition { s_i, s_i+1 }  ──►  lerp / slerp / step
//! ```
//!
//! Out-of-order samples are rejected at the boundary, queries before the
//! oldest sample clamp to it, and queries after the newest sample freeze on
//! it instead of extrapolating.

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::trace;

/// Default number of samples kept per subject.
pub const DEFAULT_HISTORY_CAPACITY: usize = 12;

/// Below this the two rotations are treated as identical by slerp.
const SLERP_EPSILON: f32 = 1.0e-6;

// ============================================================================
// TIMESTAMP
// ============================================================================

/// Monotonic time in microseconds since the time source's epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The epoch.
    pub const ZERO: Timestamp = Timestamp(0);

    /// Creates a timestamp from microseconds.
    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    /// Creates a timestamp from a duration since the epoch.
    pub fn from_duration(since_epoch: Duration) -> Self {
        Self(u64::try_from(since_epoch.as_micros()).unwrap_or(u64::MAX))
    }

    /// Returns the raw microsecond count.
    pub const fn as_micros(self) -> u64 {
        self.0
    }

    /// Moves the timestamp back by `offset`, stopping at the epoch.
    pub fn saturating_sub(self, offset: Duration) -> Self {
        let offset = u64::try_from(offset.as_micros()).unwrap_or(u64::MAX);
        Self(self.0.saturating_sub(offset))
    }

    /// Moves the timestamp forward by `offset`.
    pub fn saturating_add(self, offset: Duration) -> Self {
        let offset = u64::try_from(offset.as_micros()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(offset))
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}us", self.0)
    }
}

// ============================================================================
// SAMPLE
// ============================================================================

/// One timestamped observation of a subject.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// When the observation was taken (producer's time base)
    pub timestamp: Timestamp,

    /// World-space position
    pub position: Vector3<f32>,

    /// World-space orientation
    pub orientation: UnitQuaternion<f32>,

    /// Whether the subject is visible at this instant
    pub visible: bool,
}

impl Sample {
    /// Creates a new sample.
    pub fn new(
        timestamp: Timestamp,
        position: Vector3<f32>,
        orientation: UnitQuaternion<f32>,
        visible: bool,
    ) -> Self {
        Self {
            timestamp,
            position,
            orientation,
            visible,
        }
    }

    /// A visible, unrotated sample at `position`.
    pub fn at(timestamp: Timestamp, position: Vector3<f32>) -> Self {
        Self::new(timestamp, position, UnitQuaternion::identity(), true)
    }
}

/// What `push` did with a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Appended, nothing evicted
    Appended,

    /// Appended after evicting the oldest sample (its timestamp)
    Evicted(Timestamp),

    /// Ignored: timestamp was not newer than the newest stored sample
    RejectedStale {
        /// Newest timestamp already in the history
        newest: Timestamp,
    },
}

impl PushOutcome {
    /// Returns true if the sample is now part of the history.
    pub fn is_accepted(&self) -> bool {
        !matches!(self, PushOutcome::RejectedStale { .. })
    }
}

// ============================================================================
// TRANSITION (query result)
// ============================================================================

/// The samples bracketing a queried time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transition {
    /// A single sample held constant: only one sample exists, or the query
    /// fell before the oldest (clamp) or after the newest (freeze) sample.
    Hold(Sample),

    /// Two adjacent samples with `start.timestamp <= t < end.timestamp`
    Span {
        /// Earlier sample
        start: Sample,
        /// Later sample
        end: Sample,
    },
}

impl Transition {
    /// The timestamps this transition covers.
    pub fn bracket(&self) -> (Timestamp, Timestamp) {
        match self {
            Transition::Hold(sample) => (sample.timestamp, sample.timestamp),
            Transition::Span { start, end } => (start.timestamp, end.timestamp),
        }
    }

    /// Fractional position of `time` between start and end, clamped to [0, 1].
    pub fn alpha(&self, time: Timestamp) -> f32 {
        match self {
            Transition::Hold(_) => 0.0,
            Transition::Span { start, end } => {
                if time <= start.timestamp {
                    return 0.0;
                }
                if time >= end.timestamp {
                    return 1.0;
                }
                let span = (end.timestamp.as_micros() - start.timestamp.as_micros()) as f64;
                let offset = (time.as_micros() - start.timestamp.as_micros()) as f64;
                (offset / span) as f32
            }
        }
    }

    /// Linearly interpolated position at `time`.
    pub fn position_at(&self, time: Timestamp) -> Vector3<f32> {
        match self {
            Transition::Hold(sample) => sample.position,
            Transition::Span { start, end } => start.position.lerp(&end.position, self.alpha(time)),
        }
    }

    /// Spherically interpolated orientation at `time`.
    pub fn orientation_at(&self, time: Timestamp) -> UnitQuaternion<f32> {
        match self {
            Transition::Hold(sample) => sample.orientation,
            Transition::Span { start, end } => {
                slerp_rotation(&start.orientation, &end.orientation, self.alpha(time))
            }
        }
    }

    /// Step-valued visibility: the earlier sample's flag until `time`
    /// reaches the later sample.
    pub fn visible_at(&self, time: Timestamp) -> bool {
        match self {
            Transition::Hold(sample) => sample.visible,
            Transition::Span { start, end } => {
                if time >= end.timestamp {
                    end.visible
                } else {
                    start.visible
                }
            }
        }
    }

    /// Full interpolated sample at `time`.
    pub fn sample_at(&self, time: Timestamp) -> Sample {
        Sample {
            timestamp: time,
            position: self.position_at(time),
            orientation: self.orientation_at(time),
            visible: self.visible_at(time),
        }
    }
}

/// Shortest-arc slerp. Falls back to normalized lerp when the rotations are
/// too close for slerp to be well defined.
fn slerp_rotation(
    from: &UnitQuaternion<f32>,
    to: &UnitQuaternion<f32>,
    alpha: f32,
) -> UnitQuaternion<f32> {
    from.try_slerp(to, alpha, SLERP_EPSILON).unwrap_or_else(|| {
        // q and -q are the same rotation; keep nlerp on the short arc
        let to = if from.coords.dot(&to.coords) < 0.0 {
            UnitQuaternion::new_unchecked(-to.into_inner())
        } else {
            *to
        };
        from.nlerp(&to, alpha)
    })
}

// ============================================================================
// SAMPLE HISTORY (single-threaded core)
// ============================================================================

/// Fixed-capacity, timestamp-ordered ring of the most recent samples.
///
/// Invariants: `len() <= capacity()`, timestamps strictly increasing.
#[derive(Debug, Clone)]
pub struct SampleHistory {
    samples: VecDeque<Sample>,
    capacity: usize,
}

impl SampleHistory {
    /// Creates an empty history.
    ///
    /// # Panics
    /// If `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "sample history capacity must be non-zero");
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a sample, evicting the oldest when full.
    ///
    /// A sample whose timestamp is not newer than the newest stored one is
    /// rejected. Reordering at the network boundary is expected noise, so
    /// this is not an error.
    pub fn push(&mut self, sample: Sample) -> PushOutcome {
        if let Some(newest) = self.samples.back() {
            if sample.timestamp <= newest.timestamp {
                trace!(
                    incoming = %sample.timestamp,
                    newest = %newest.timestamp,
                    "rejected out-of-order sample"
                );
                return PushOutcome::RejectedStale {
                    newest: newest.timestamp,
                };
            }
        }

        let evicted = if self.samples.len() == self.capacity {
            self.samples.pop_front().map(|s| s.timestamp)
        } else {
            None
        };
        self.samples.push_back(sample);
        debug_assert!(self.samples.len() <= self.capacity);

        match evicted {
            Some(timestamp) => PushOutcome::Evicted(timestamp),
            None => PushOutcome::Appended,
        }
    }

    /// Returns the transition bracketing `time`, or `None` with no data.
    pub fn query(&self, time: Timestamp) -> Option<Transition> {
        let oldest = self.samples.front()?;
        let newest = self.samples.back()?;

        if time < oldest.timestamp {
            return Some(Transition::Hold(*oldest));
        }
        if time >= newest.timestamp {
            return Some(Transition::Hold(*newest));
        }

        // oldest <= time < newest, so 1 <= idx < len
        let idx = self.samples.partition_point(|s| s.timestamp <= time);
        Some(Transition::Span {
            start: self.samples[idx - 1],
            end: self.samples[idx],
        })
    }

    /// Number of stored samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns true if no sample has been stored.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Maximum number of stored samples.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest stored sample.
    pub fn oldest(&self) -> Option<&Sample> {
        self.samples.front()
    }

    /// Newest stored sample.
    pub fn newest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    /// Samples from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    /// Drops every sample, keeping the allocation.
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

// ============================================================================
// TEMPORAL SAMPLE BUFFER (shared handle)
// ============================================================================

/// Thread-safe handle to one subject's sample history.
///
/// Cloning is cheap and every clone refers to the same history. The entity
/// source creates one per subject and hands clones to whoever needs it: one
/// producer pushes, one consumer queries. Each sample is copied in and out
/// whole under the lock, so a reader never sees a half-written sample.
#[derive(Debug, Clone)]
pub struct TemporalSampleBuffer {
    history: Arc<Mutex<SampleHistory>>,
}

impl TemporalSampleBuffer {
    /// Creates an empty buffer.
    ///
    /// # Panics
    /// If `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        Self {
            history: Arc::new(Mutex::new(SampleHistory::new(capacity))),
        }
    }

    // Samples are Copy and every mutation completes before unlock, so a
    // poisoned lock still guards a consistent history.
    fn lock(&self) -> MutexGuard<'_, SampleHistory> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// See [`SampleHistory::push`].
    pub fn push(&self, sample: Sample) -> PushOutcome {
        self.lock().push(sample)
    }

    /// See [`SampleHistory::query`].
    pub fn query(&self, time: Timestamp) -> Option<Transition> {
        self.lock().query(time)
    }

    /// Number of stored samples.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if no sample has been stored.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Maximum number of stored samples.
    pub fn capacity(&self) -> usize {
        self.lock().capacity()
    }

    /// Timestamp of the oldest stored sample.
    pub fn oldest_timestamp(&self) -> Option<Timestamp> {
        self.lock().oldest().map(|s| s.timestamp)
    }

    /// Timestamp of the newest stored sample.
    pub fn newest_timestamp(&self) -> Option<Timestamp> {
        self.lock().newest().map(|s| s.timestamp)
    }

    /// Copies the stored samples, oldest first.
    pub fn snapshot(&self) -> Vec<Sample> {
        self.lock().iter().copied().collect()
    }

    /// Returns true if both handles refer to the same history.
    pub fn same_history(&self, other: &TemporalSampleBuffer) -> bool {
        Arc::ptr_eq(&self.history, &other.history)
    }
}

impl Default for TemporalSampleBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
