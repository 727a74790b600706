//! Fixed-interval task timing

/// Fires once every `interval_ms`
///
/// The reference time advances by exactly one interval per firing, so the
/// average rate holds even when the loop runs late.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    interval_ms: u64,
    reference_ms: u64,
}

impl Cadence {
    pub fn new(interval_ms: u64, now_ms: u64) -> Self {
        Self {
            interval_ms: interval_ms.max(1),
            reference_ms: now_ms,
        }
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    /// True (and the reference advanced) when an interval has elapsed
    pub fn due(&mut self, now_ms: u64) -> bool {
        if now_ms.saturating_sub(self.reference_ms) >= self.interval_ms {
            self.reference_ms += self.interval_ms;
            true
        } else {
            false
        }
    }

    /// Restart timing from `now_ms` (after the loop was suspended)
    pub fn reset(&mut self, now_ms: u64) {
        self.reference_ms = now_ms;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_on_interval() {
        let mut cadence = Cadence::new(5, 0);
        assert!(!cadence.due(4));
        assert!(cadence.due(5));
        assert!(!cadence.due(9));
        assert!(cadence.due(10));
    }

    #[test]
    fn test_late_loop_catches_up_one_interval_at_a_time() {
        let mut cadence = Cadence::new(5, 0);
        // Loop stalled for 12 ms: two intervals are owed
        assert!(cadence.due(12));
        assert!(cadence.due(12));
        assert!(!cadence.due(12));
        assert!(cadence.due(15));
    }

    #[test]
    fn test_reset_drops_owed_intervals() {
        let mut cadence = Cadence::new(15, 0);
        cadence.reset(1000);
        assert!(!cadence.due(1000));
        assert!(!cadence.due(1014));
        assert!(cadence.due(1015));
    }
}
