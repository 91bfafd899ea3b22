//! Per-frame render time.
//!
//! Every subject in a frame is sampled at the same instant: the context's
//! clock minus a fixed display lag. Rendering in the recent past means the
//! common case interpolates between two received samples instead of
//! extrapolating past the newest one.

use hudview_env::ViewContext;
use std::sync::Arc;
use std::time::Duration;

use crate::hudview_time::Timestamp;

/// Latches one render time per frame.
pub struct RenderClock<Ctx: ViewContext> {
    context: Arc<Ctx>,
    display_lag: Duration,
    current: Timestamp,
    frames: u64,
}

impl<Ctx: ViewContext> RenderClock<Ctx> {
    pub fn new(context: Arc<Ctx>, display_lag: Duration) -> Self {
        Self {
            context,
            display_lag,
            current: Timestamp::ZERO,
            frames: 0,
        }
    }

    /// Reads the context once and latches `now - display_lag`.
    ///
    /// Saturates at zero and never moves backward across frames.
    pub fn begin_frame(&mut self) -> Timestamp {
        let target = Timestamp::from_duration(self.context.now()).saturating_sub(self.display_lag);
        self.current = self.current.max(target);
        self.frames += 1;
        self.current
    }

    /// The latched time of the current frame.
    pub fn current(&self) -> Timestamp {
        self.current
    }

    pub fn display_lag(&self) -> Duration {
        self.display_lag
    }

    /// Frames begun so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn context(&self) -> &Arc<Ctx> {
        &self.context
    }
}
