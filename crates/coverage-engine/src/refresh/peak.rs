use std::sync::{Mutex, MutexGuard};

/// Highest peak recorded so far. The lock is held only for the
/// compare-and-set; the long compute-cycle section lives elsewhere.
#[derive(Debug, Default)]
pub struct PeakTracker {
    highest: Mutex<u64>,
}

impl PeakTracker {
    fn guard(&self) -> MutexGuard<'_, u64> {
        self.highest.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Records `height` if it is strictly greater than the current peak.
    pub fn try_advance(&self, height: u64) -> bool {
        let mut guard = self.guard();
        if height <= *guard {
            return false;
        }
        *guard = height;
        true
    }

    pub fn current(&self) -> u64 {
        *self.guard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advances_only_strictly_upward() {
        let tracker = PeakTracker::default();
        assert!(tracker.try_advance(5));
        assert!(!tracker.try_advance(5));
        assert!(!tracker.try_advance(4));
        assert!(tracker.try_advance(6));
        assert_eq!(tracker.current(), 6);
    }
}
