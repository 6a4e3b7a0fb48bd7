use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

/// Process-wide playback/schedule synchronization state.
///
/// `time_delta` is written by exactly one path (the scheduler's drift check)
/// and read by exactly one other (the filter builder's pacing stage), once
/// per node. It is a single-slot, overwrite-on-write value; the atomic keeps
/// that contract safe across threads without a lock.
///
/// The delta is stored in microseconds so it fits an `AtomicI64`; no
/// scheduling decision needs finer resolution than that.
pub struct SyncState {
    delta_us: AtomicI64,
    realtime: AtomicBool,
}

impl SyncState {
    pub fn new(realtime: bool) -> Self {
        Self {
            delta_us: AtomicI64::new(0),
            realtime: AtomicBool::new(realtime),
        }
    }

    /// Signed drift in seconds between scheduled and wall-clock position.
    /// Negative means playback is behind schedule.
    pub fn time_delta(&self) -> f64 {
        self.delta_us.load(Ordering::Relaxed) as f64 / 1_000_000.0
    }

    pub fn set_time_delta(&self, seconds: f64) {
        self.delta_us
            .store((seconds * 1_000_000.0) as i64, Ordering::Relaxed);
    }

    pub fn realtime(&self) -> bool {
        self.realtime.load(Ordering::Relaxed)
    }

    pub fn set_realtime(&self, on: bool) {
        self.realtime.store(on, Ordering::Relaxed);
    }
}
