//! Tracking of the modem hardware timebase published as tick messages.

/// Result of one tick observation.
///
/// `delta` is the signed difference to the previous tick in nanoseconds,
/// or None on the first observation. Callers use it for jitter and gap
/// diagnostics; it is advisory only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickEvent {
    pub delta: Option<i64>,
}

/// Maintains the last observed hardware tick. Zero means no tick has been
/// observed yet.
pub struct TickTracker {
    tick_prev: u64,
}

impl TickTracker {
    pub const fn new() -> Self {
        TickTracker { tick_prev: 0 }
    }

    /// Record a tick and report the delta to the previous one.
    ///
    /// Any value is accepted. An out-of-order tick produces a negative
    /// delta rather than an error; the caller decides whether to log it as
    /// an anomaly. A repeated tick produces a delta of zero.
    pub fn observe(&mut self, tick: u64) -> TickEvent {
        let delta = if self.tick_prev == 0 {
            None
        } else {
            Some(tick.wrapping_sub(self.tick_prev) as i64)
        };
        self.tick_prev = tick;
        TickEvent { delta }
    }

    /// Last observed tick, 0 if none yet.
    pub fn last_tick(&self) -> u64 {
        self.tick_prev
    }
}

impl Default for TickTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    #[test]
    fn first_observation_has_no_delta() {
        let mut tracker = TickTracker::new();
        assert_eq!(tracker.observe(1000), TickEvent { delta: None });
        assert_eq!(tracker.last_tick(), 1000);
    }

    #[test]
    fn subsequent_observation_reports_difference() {
        let mut tracker = TickTracker::new();
        tracker.observe(1000);
        assert_eq!(tracker.observe(1500), TickEvent { delta: Some(500) });
        assert_eq!(tracker.last_tick(), 1500);
    }

    #[test]
    fn out_of_order_tick_yields_negative_delta() {
        let mut tracker = TickTracker::new();
        tracker.observe(1500);
        assert_eq!(tracker.observe(1200), TickEvent { delta: Some(-300) });
    }

    #[test]
    fn repeated_tick_yields_zero_delta() {
        let mut tracker = TickTracker::new();
        tracker.observe(1500);
        assert_eq!(tracker.observe(1500), TickEvent { delta: Some(0) });
    }
}
