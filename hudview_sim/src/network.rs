//! Simulated sample transport with fault injection.
//!
//! Samples leave the producer with a latency drawn from a normal
//! distribution and may be dropped. Anything in flight is delivered in
//! arrival order, which with enough jitter is not send order, so the
//! receiving buffers see stale samples and must reject them.

use hudview_core::{PushOutcome, Sample, TemporalSampleBuffer};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::trace;

/// Link conditions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkProfile {
    /// Mean one-way latency
    pub latency: Duration,

    /// Standard deviation of the latency
    pub jitter: Duration,

    /// Drop probability (0.0 - 1.0)
    pub loss_rate: f64,
}

impl LinkProfile {
    /// Instant, lossless delivery.
    pub const PERFECT: LinkProfile = LinkProfile {
        latency: Duration::ZERO,
        jitter: Duration::ZERO,
        loss_rate: 0.0,
    };

    pub fn new(latency: Duration, jitter: Duration, loss_rate: f64) -> Self {
        Self {
            latency,
            jitter,
            loss_rate: loss_rate.clamp(0.0, 1.0),
        }
    }
}

impl Default for LinkProfile {
    fn default() -> Self {
        Self::new(Duration::from_millis(30), Duration::from_millis(5), 0.0)
    }
}

/// Delivery counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NetworkStats {
    pub sent: u64,
    pub delivered: u64,
    pub dropped: u64,
    /// Delivered but refused by the buffer as out of order
    pub rejected: u64,
}

struct InFlight {
    target: TemporalSampleBuffer,
    sample: Sample,
}

/// Lossy, jittery one-way link from the producer to the sample buffers.
pub struct SampleNetwork {
    rng: ChaCha8Rng,
    profile: LinkProfile,
    blackout: bool,

    // Keyed by (arrival ns, send sequence)
    in_flight: BTreeMap<(u64, u64), InFlight>,
    sequence: u64,
    stats: NetworkStats,
}

impl SampleNetwork {
    pub fn new(rng: ChaCha8Rng, profile: LinkProfile) -> Self {
        Self {
            rng,
            profile,
            blackout: false,
            in_flight: BTreeMap::new(),
            sequence: 0,
            stats: NetworkStats::default(),
        }
    }

    pub fn set_profile(&mut self, profile: LinkProfile) {
        self.profile = profile;
    }

    /// While blacked out every sent sample is dropped.
    pub fn set_blackout(&mut self, blackout: bool) {
        self.blackout = blackout;
    }

    pub fn is_blacked_out(&self) -> bool {
        self.blackout
    }

    /// Queues `sample` for `target`, sent at virtual time `now`.
    pub fn send(&mut self, target: &TemporalSampleBuffer, sample: Sample, now: Duration) {
        self.stats.sent += 1;
        if self.blackout || self.rng.gen_bool(self.profile.loss_rate) {
            self.stats.dropped += 1;
            return;
        }

        let arrival = now + self.draw_latency();
        self.sequence += 1;
        self.in_flight.insert(
            (arrival.as_nanos() as u64, self.sequence),
            InFlight {
                target: target.clone(),
                sample,
            },
        );
    }

    /// Pushes every sample that has arrived by `now`. Returns how many.
    pub fn deliver_due(&mut self, now: Duration) -> usize {
        let cutoff = (now.as_nanos() as u64).saturating_add(1);
        let later = self.in_flight.split_off(&(cutoff, 0));
        let due = std::mem::replace(&mut self.in_flight, later);

        let count = due.len();
        for (_, packet) in due {
            match packet.target.push(packet.sample) {
                PushOutcome::RejectedStale { newest } => {
                    trace!(
                        stale = %packet.sample.timestamp,
                        %newest,
                        "dropped reordered sample"
                    );
                    self.stats.rejected += 1;
                }
                _ => self.stats.delivered += 1,
            }
        }
        count
    }

    /// Samples sent but not yet delivered.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn stats(&self) -> NetworkStats {
        self.stats
    }

    fn draw_latency(&mut self) -> Duration {
        let mean = self.profile.latency.as_secs_f64();
        let std_dev = self.profile.jitter.as_secs_f64();
        let secs = match Normal::new(mean, std_dev) {
            Ok(normal) if std_dev > 0.0 => normal.sample(&mut self.rng),
            _ => mean,
        };
        Duration::from_secs_f64(secs.max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hudview_core::Timestamp;
    use nalgebra::Vector3;
    use proptest::prelude::*;
    use rand::SeedableRng;

    fn sample(ms: u64) -> Sample {
        Sample::at(Timestamp::from_micros(ms * 1_000), Vector3::zeros())
    }

    #[test]
    fn test_perfect_link_delivers_immediately() {
        let mut net = SampleNetwork::new(ChaCha8Rng::seed_from_u64(1), LinkProfile::PERFECT);
        let buffer = TemporalSampleBuffer::new(4);

        net.send(&buffer, sample(0), Duration::ZERO);
        assert_eq!(net.deliver_due(Duration::ZERO), 1);
        assert_eq!(buffer.len(), 1);
        assert_eq!(net.stats().delivered, 1);
    }

    #[test]
    fn test_latency_holds_samples() {
        let profile = LinkProfile::new(Duration::from_millis(50), Duration::ZERO, 0.0);
        let mut net = SampleNetwork::new(ChaCha8Rng::seed_from_u64(1), profile);
        let buffer = TemporalSampleBuffer::new(4);

        net.send(&buffer, sample(0), Duration::ZERO);
        assert_eq!(net.deliver_due(Duration::from_millis(49)), 0);
        assert_eq!(net.in_flight(), 1);
        assert_eq!(net.deliver_due(Duration::from_millis(50)), 1);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_blackout_drops_everything() {
        let mut net = SampleNetwork::new(ChaCha8Rng::seed_from_u64(1), LinkProfile::PERFECT);
        let buffer = TemporalSampleBuffer::new(4);
        net.set_blackout(true);

        net.send(&buffer, sample(0), Duration::ZERO);
        net.deliver_due(Duration::from_secs(1));
        assert!(buffer.is_empty());
        assert_eq!(net.stats().dropped, 1);
    }

    #[test]
    fn test_jitter_reorders_and_buffer_rejects() {
        let profile = LinkProfile::new(Duration::from_millis(50), Duration::from_millis(40), 0.0);
        let mut net = SampleNetwork::new(ChaCha8Rng::seed_from_u64(7), profile);
        let buffer = TemporalSampleBuffer::new(64);

        for ms in 0..200 {
            net.send(&buffer, sample(ms), Duration::from_millis(ms));
        }
        net.deliver_due(Duration::from_secs(10));

        let stats = net.stats();
        assert_eq!(stats.sent, stats.delivered + stats.rejected);
        assert!(stats.rejected > 0);

        let stored: Vec<_> = buffer.snapshot().iter().map(|s| s.timestamp).collect();
        assert!(stored.windows(2).all(|w| w[0] < w[1]));
    }

    proptest! {
        #[test]
        fn prop_every_sample_is_accounted_for(
            seed in any::<u64>(),
            latency_ms in 0u64..200,
            jitter_ms in 0u64..100,
            loss in 0.0f64..0.5,
            count in 1u64..120,
        ) {
            let profile = LinkProfile::new(
                Duration::from_millis(latency_ms),
                Duration::from_millis(jitter_ms),
                loss,
            );
            let mut net = SampleNetwork::new(ChaCha8Rng::seed_from_u64(seed), profile);
            let buffer = TemporalSampleBuffer::new(8);

            for ms in 0..count {
                net.send(&buffer, sample(ms * 10), Duration::from_millis(ms * 10));
                net.deliver_due(Duration::from_millis(ms * 10));
            }
            let stats = net.stats();
            prop_assert_eq!(
                stats.sent,
                stats.delivered + stats.rejected + stats.dropped + net.in_flight() as u64
            );

            // Stored history stays strictly ordered however the link reorders
            let stored: Vec<_> = buffer.snapshot().iter().map(|s| s.timestamp).collect();
            prop_assert!(stored.windows(2).all(|w| w[0] < w[1]));
            prop_assert!(stored.len() <= 8);
        }
    }
}
