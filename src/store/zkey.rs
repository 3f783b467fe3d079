use std::sync::atomic::{AtomicU64, Ordering};

/// Ordered key for the z-index.
///
/// The index must transiently hold several versions with the same z (an
/// outgoing and an incoming version coexist between a shift and the next
/// vacuum), so the map key carries a process-wide sequence number as a
/// tiebreaker. Ordering is lexicographic on `(z, seq)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct ZKey {
    z: i32,
    seq: u64,
}

impl ZKey {
    /// Smallest key for `z`; range scans start here.
    pub(crate) fn floor(z: i32) -> Self {
        Self { z, seq: 0 }
    }

    /// Largest key for `z`; bounds an equal-z probe.
    pub(crate) fn ceiling(z: i32) -> Self {
        Self { z, seq: u64::MAX }
    }
}

pub(crate) struct ZKeyFactory {
    seq: AtomicU64,
}

impl ZKeyFactory {
    pub(crate) fn new() -> Self {
        Self {
            seq: AtomicU64::new(0),
        }
    }

    pub(crate) fn fresh(&self, z: i32) -> ZKey {
        ZKey {
            z,
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub(crate) fn reset(&self) {
        self.seq.store(0, Ordering::Relaxed);
    }
}
