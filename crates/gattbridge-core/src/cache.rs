//! Status snapshot cache
//!
//! Holds the last parsed telemetry reading. The snapshot is replaced whole,
//! never mutated in place, and the lock is held only for the swap or copy.

use std::sync::{Arc, Mutex};

use crate::status::DeviceStatus;

/// Shared cache of the last-known device status
#[derive(Debug, Clone, Default)]
pub struct StatusCache {
    inner: Arc<Mutex<DeviceStatus>>,
}

impl StatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cached snapshot with a new reading
    pub fn replace(&self, status: DeviceStatus) {
        let mut guard = self.inner.lock().expect("status cache lock poisoned");
        *guard = status;
    }

    /// Atomic copy of the current snapshot
    pub fn snapshot(&self) -> DeviceStatus {
        *self.inner.lock().expect("status cache lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_and_snapshot() {
        let cache = StatusCache::new();
        assert_eq!(cache.snapshot(), DeviceStatus::default());

        let status = DeviceStatus {
            battery_level: 0x64,
            signal_strength: 0x50,
            firmware_major: 1,
            firmware_minor: 2,
            work_mode: 3,
            ..Default::default()
        };
        cache.replace(status);
        assert_eq!(cache.snapshot(), status);

        // Clones observe the same underlying snapshot
        let clone = cache.clone();
        clone.replace(DeviceStatus::default());
        assert_eq!(cache.snapshot(), DeviceStatus::default());
    }
}
