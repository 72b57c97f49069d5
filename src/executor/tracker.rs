//! Process-wide accounting of live accelerator executors
//!
//! Each accelerator executor registers with the tracker at construction
//! and unregisters on drop. When the last live executor on a device goes
//! away and any of them asked for reset-on-last, the reset hook fires
//! exactly once. The per-device entry is guarded by a process-wide
//! `parking_lot` mutex.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::OnceLock;

#[derive(Default)]
struct DeviceEntry {
    live: usize,
    reset_requested: bool,
}

/// Per-device live-executor counter with a reset-on-last hook
#[derive(Default)]
pub struct DeviceTracker {
    devices: Mutex<HashMap<usize, DeviceEntry>>,
}

impl DeviceTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide tracker shared by all accelerator executors
    pub fn global() -> &'static DeviceTracker {
        static TRACKER: OnceLock<DeviceTracker> = OnceLock::new();
        TRACKER.get_or_init(DeviceTracker::new)
    }

    /// Record a new live executor on `device_id`
    pub fn register(&self, device_id: usize, reset_on_last: bool) {
        let mut devices = self.devices.lock();
        let entry = devices.entry(device_id).or_default();
        entry.live += 1;
        entry.reset_requested |= reset_on_last;
    }

    /// Record the destruction of an executor on `device_id`
    ///
    /// Invokes `reset` with the device id if this was the last live
    /// executor and reset-on-last was requested by any of them. Returns
    /// whether the hook fired. The hook runs outside the lock.
    pub fn unregister(&self, device_id: usize, reset: impl FnOnce(usize)) -> bool {
        let fire = {
            let mut devices = self.devices.lock();
            let entry = devices
                .get_mut(&device_id)
                .expect("unregister without matching register");
            entry.live -= 1;
            if entry.live == 0 {
                let fire = entry.reset_requested;
                devices.remove(&device_id);
                fire
            } else {
                false
            }
        };
        if fire {
            reset(device_id);
        }
        fire
    }

    /// Number of live executors on `device_id`
    pub fn live_count(&self, device_id: usize) -> usize {
        self.devices
            .lock()
            .get(&device_id)
            .map_or(0, |entry| entry.live)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_reset_fires_after_last() {
        let tracker = DeviceTracker::new();
        let fired = AtomicUsize::new(0);

        tracker.register(0, true);
        tracker.register(0, false);
        assert_eq!(tracker.live_count(0), 2);

        assert!(!tracker.unregister(0, |_| {
            fired.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        assert!(tracker.unregister(0, |_| {
            fired.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.live_count(0), 0);
    }

    #[test]
    fn test_no_reset_when_not_requested() {
        let tracker = DeviceTracker::new();
        tracker.register(1, false);
        assert!(!tracker.unregister(1, |_| panic!("reset must not fire")));
    }

    #[test]
    fn test_reset_fires_once_per_generation() {
        let tracker = DeviceTracker::new();
        let fired = AtomicUsize::new(0);

        // request sticks even after the requesting executor is gone
        tracker.register(2, true);
        tracker.register(2, false);
        tracker.unregister(2, |_| {});
        tracker.unregister(2, |_| {
            fired.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // a fresh generation without a request does not fire
        tracker.register(2, false);
        tracker.unregister(2, |_| {
            fired.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_devices_are_independent() {
        let tracker = DeviceTracker::new();
        tracker.register(0, true);
        tracker.register(1, true);
        assert!(tracker.unregister(1, |_| {}));
        assert_eq!(tracker.live_count(0), 1);
        assert!(tracker.unregister(0, |_| {}));
    }
}
