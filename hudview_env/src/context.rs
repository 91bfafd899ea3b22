//! Core environment context trait for the presentation layer.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

/// The central interface for time and task control.
///
/// Abstracts the "real world" clock so that the frame loop can run against
/// the OS clock (production) or a virtual clock (simulation).
///
/// # Implementations
///
/// - **Production**: `SystemContext` - wraps `std::time::Instant`, `tokio::time`
/// - **Simulation**: `SimContext` - a manually advanced virtual clock
///
/// # Time base
///
/// `now()` must share its epoch with the timestamps the producer stamps on
/// samples, otherwise interpolation queries land outside every history.
#[async_trait]
pub trait ViewContext: Send + Sync + 'static {
    /// Returns the current monotonic time since the time source's epoch.
    ///
    /// In simulation, this is the virtual clock time.
    fn now(&self) -> Duration;

    /// Suspends execution for the given duration.
    ///
    /// In production: wraps `tokio::time::sleep`
    /// In simulation: advances virtual clock
    async fn sleep(&self, duration: Duration);

    /// Spawns a background task (sample producers, network pumps).
    fn spawn<F>(&self, name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static;

    /// Returns the context's seed (for logging/debugging).
    ///
    /// In production, returns 0 (not seeded).
    fn seed(&self) -> u64;
}
