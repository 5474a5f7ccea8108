//! Detection throttle and liveness gate.
//!
//! A frame is forwarded to the detector only when the throttle interval has
//! elapsed since the last forwarded frame AND nothing is in flight. Everything
//! else is dropped on the spot; there is no queue. The overlay keeps showing the
//! last result meanwhile, so staleness is bounded by one interval plus one
//! detector latency.
//!
//! Callers pass `now` explicitly so the gate can be driven by a synthetic clock.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Reference throttle interval.
pub const DEFAULT_THROTTLE_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GateStats {
    pub forwarded: u64,
    pub dropped_throttled: u64,
    pub dropped_busy: u64,
}

#[derive(Debug, Default)]
struct GateState {
    last_forwarded: Option<Instant>,
    in_flight: bool,
    stats: GateStats,
}

/// Admission gate in front of the detector. Cheap to clone; clones share state.
#[derive(Clone, Debug)]
pub struct DetectionGate {
    interval: Duration,
    state: Arc<Mutex<GateState>>,
}

impl DetectionGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            state: Arc::new(Mutex::new(GateState::default())),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Try to admit a frame observed at `now`.
    ///
    /// Returns a permit that holds the single in-flight slot until it is finished
    /// or dropped.
    pub fn try_admit(&self, now: Instant) -> Option<DetectionPermit> {
        let mut state = self.lock();
        if state.in_flight {
            state.stats.dropped_busy += 1;
            return None;
        }
        if let Some(last) = state.last_forwarded {
            if now.saturating_duration_since(last) < self.interval {
                state.stats.dropped_throttled += 1;
                return None;
            }
        }
        state.in_flight = true;
        state.last_forwarded = Some(now);
        state.stats.forwarded += 1;
        Some(DetectionPermit {
            state: Some(Arc::clone(&self.state)),
            admitted_at: now,
        })
    }

    pub fn is_in_flight(&self) -> bool {
        self.lock().in_flight
    }

    pub fn stats(&self) -> GateStats {
        self.lock().stats
    }

    // A poisoned gate only ever held plain flags; keep using them.
    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for DetectionGate {
    fn default() -> Self {
        Self::new(DEFAULT_THROTTLE_INTERVAL)
    }
}

/// The in-flight slot. Dropping it frees the slot.
#[derive(Debug)]
pub struct DetectionPermit {
    state: Option<Arc<Mutex<GateState>>>,
    admitted_at: Instant,
}

impl DetectionPermit {
    pub fn admitted_at(&self) -> Instant {
        self.admitted_at
    }

    /// Free the slot now.
    pub fn finish(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(state) = self.state.take() {
            let mut state = state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            state.in_flight = false;
        }
    }
}

impl Drop for DetectionPermit {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(base: Instant, ms: u64) -> Instant {
        base + Duration::from_millis(ms)
    }

    #[test]
    fn first_frame_is_admitted() {
        let gate = DetectionGate::default();
        assert!(gate.try_admit(Instant::now()).is_some());
        assert!(gate.is_in_flight());
    }

    #[test]
    fn frames_inside_interval_are_dropped() {
        let base = Instant::now();
        let gate = DetectionGate::new(Duration::from_millis(100));
        gate.try_admit(at(base, 0)).unwrap().finish();
        assert!(gate.try_admit(at(base, 50)).is_none());
        assert!(gate.try_admit(at(base, 99)).is_none());
        assert!(gate.try_admit(at(base, 100)).is_some());
        let stats = gate.stats();
        assert_eq!(stats.forwarded, 2);
        assert_eq!(stats.dropped_throttled, 2);
    }

    #[test]
    fn outstanding_permit_blocks_admission() {
        let base = Instant::now();
        let gate = DetectionGate::new(Duration::from_millis(100));
        let permit = gate.try_admit(at(base, 0)).unwrap();
        assert!(gate.try_admit(at(base, 500)).is_none());
        assert_eq!(gate.stats().dropped_busy, 1);
        drop(permit);
        assert!(gate.try_admit(at(base, 501)).is_some());
    }

    #[test]
    fn clones_share_the_slot() {
        let gate = DetectionGate::default();
        let other = gate.clone();
        let _permit = gate.try_admit(Instant::now()).unwrap();
        assert!(other.is_in_flight());
    }
}
