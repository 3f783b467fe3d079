use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::model::Serial;

/// Ref-counted registry of snapshot serials held by in-flight readers.
///
/// The smallest registered serial is the vacuum barrier: a version whose
/// till-serial is at or below it is invisible to every live reader. Counts
/// matter because concurrent readers routinely share a serial; the last one
/// out frees it.
pub(crate) struct SnapshotRegistry {
    floor: Mutex<BTreeMap<Serial, u32>>,
}

impl SnapshotRegistry {
    pub(crate) fn new() -> Self {
        Self {
            floor: Mutex::new(BTreeMap::new()),
        }
    }

    pub(crate) fn register(&self, serial: Serial) {
        *self.floor.lock().entry(serial).or_insert(0) += 1;
    }

    pub(crate) fn release(&self, serial: Serial) {
        let mut floor = self.floor.lock();
        if let Some(count) = floor.get_mut(&serial) {
            if *count > 1 {
                *count -= 1;
            } else {
                floor.remove(&serial);
            }
        }
    }

    /// Oldest serial any live reader still observes.
    pub(crate) fn min(&self) -> Option<Serial> {
        self.floor.lock().keys().next().copied()
    }

    pub(crate) fn clear(&self) {
        self.floor.lock().clear();
    }
}
