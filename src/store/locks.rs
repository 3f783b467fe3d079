use std::collections::{BTreeSet, HashSet};
use std::ops::Bound;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::warn;

use crate::error::{Result, StoreError};
use crate::model::WidgetId;

/// Logical mutual exclusion for writers, over three namespaces: widget ids,
/// individual z values, and a single "everything at z above a bound" range
/// lock. All waiting happens on one monitor.
///
/// Callers acquire in the order id -> z -> range, and the z values inside a
/// single call are taken in ascending order, so writers cannot form cycles
/// among themselves. The remaining cycle (a shift holding the range lock
/// while collecting other widgets' id locks, against a delete holding one of
/// those ids while waiting for a covered z) is broken by the timed variants:
/// the timed waiter gives up, rolls back its partial acquisitions, and the
/// caller surfaces [`StoreError::Timeout`] for an external retry. Broad range
/// operations can be outpaced by streams of individual locks; that liveness
/// gap is accepted.
pub(crate) struct WriteLockTable {
    state: Mutex<LockState>,
    available: Condvar,
}

#[derive(Default)]
struct LockState {
    ids: HashSet<WidgetId>,
    zs: BTreeSet<i32>,
    /// `Some(r)` locks every z strictly greater than `r`.
    range: Option<i32>,
}

impl LockState {
    fn z_is_blocked(&self, z: i32) -> bool {
        self.range.is_some_and(|r| z > r) || self.zs.contains(&z)
    }

    fn range_is_blocked(&self, from_z: i32) -> bool {
        self.range.is_some()
            || self
                .zs
                .range((Bound::Excluded(from_z), Bound::Unbounded))
                .next()
                .is_some()
    }
}

impl WriteLockTable {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(LockState::default()),
            available: Condvar::new(),
        }
    }

    pub(crate) fn lock_id(&self, id: WidgetId) {
        let mut state = self.state.lock();
        while state.ids.contains(&id) {
            self.available.wait(&mut state);
        }
        state.ids.insert(id);
    }

    /// Locks every z in `zs` (deduplicated, ascending), waiting as long as
    /// it takes.
    pub(crate) fn lock_z(&self, zs: &[i32]) {
        let sorted = sorted_distinct(zs);
        let mut state = self.state.lock();
        for &z in &sorted {
            while state.z_is_blocked(z) {
                self.available.wait(&mut state);
            }
            state.zs.insert(z);
        }
    }

    /// Like [`lock_z`](Self::lock_z) but gives up once `timeout` has elapsed,
    /// releasing whatever this call already took.
    pub(crate) fn lock_z_timeout(&self, zs: &[i32], timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let sorted = sorted_distinct(zs);
        let mut state = self.state.lock();
        for (taken, &z) in sorted.iter().enumerate() {
            while state.z_is_blocked(z) {
                if self.wait_until(&mut state, deadline) {
                    for &held in &sorted[..taken] {
                        state.zs.remove(&held);
                    }
                    drop(state);
                    self.available.notify_all();
                    warn!(z, "store.lock.z_timeout");
                    return Err(StoreError::Timeout);
                }
            }
            state.zs.insert(z);
        }
        Ok(())
    }

    /// Locks every z strictly greater than `from_z`, waiting as long as it
    /// takes. At most one range lock exists at a time.
    pub(crate) fn lock_range(&self, from_z: i32) {
        let mut state = self.state.lock();
        while state.range_is_blocked(from_z) {
            self.available.wait(&mut state);
        }
        state.range = Some(from_z);
    }

    pub(crate) fn lock_range_timeout(&self, from_z: i32, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.range_is_blocked(from_z) {
            if self.wait_until(&mut state, deadline) {
                warn!(from_z, "store.lock.range_timeout");
                return Err(StoreError::Timeout);
            }
        }
        state.range = Some(from_z);
        Ok(())
    }

    pub(crate) fn release_id(&self, id: WidgetId) {
        let mut state = self.state.lock();
        state.ids.remove(&id);
        drop(state);
        self.available.notify_all();
    }

    pub(crate) fn release_z(&self, zs: &[i32]) {
        let mut state = self.state.lock();
        for z in zs {
            state.zs.remove(z);
        }
        drop(state);
        self.available.notify_all();
    }

    pub(crate) fn release_range(&self) {
        let mut state = self.state.lock();
        state.range = None;
        drop(state);
        self.available.notify_all();
    }

    /// Drops every held lock. Only `clear` calls this, under the exclusive
    /// global latch, so no waiter can be parked here.
    pub(crate) fn reset(&self) {
        let mut state = self.state.lock();
        state.ids.clear();
        state.zs.clear();
        state.range = None;
    }

    /// Waits for a wakeup or the deadline; returns `true` once the deadline
    /// has passed. The caller re-checks its predicate either way.
    fn wait_until(&self, state: &mut MutexGuard<'_, LockState>, deadline: Instant) -> bool {
        if Instant::now() >= deadline {
            return true;
        }
        self.available.wait_until(state, deadline);
        false
    }
}

fn sorted_distinct(zs: &[i32]) -> Vec<i32> {
    let mut sorted = zs.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn lock_and_release_uncontended() {
        let locks = WriteLockTable::new();
        locks.lock_id(1);
        locks.lock_z(&[1, 2]);
        locks.lock_range(2);
        locks.release_range();
        locks.release_z(&[1, 2]);
        locks.release_id(1);
    }

    #[test]
    fn range_lock_blocks_covered_z() {
        let locks = Arc::new(WriteLockTable::new());
        locks.lock_range(2);

        let (tx, rx) = mpsc::channel();
        let worker = {
            let locks = Arc::clone(&locks);
            thread::spawn(move || {
                // 1 is at or below the bound, 3 is covered; the call parks on 3.
                locks.lock_z(&[3, 1]);
                tx.send(()).unwrap();
            })
        };

        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        locks.release_range();
        rx.recv_timeout(Duration::from_secs(1)).unwrap();
        worker.join().unwrap();
    }

    #[test]
    fn z_lock_above_bound_blocks_range() {
        let locks = Arc::new(WriteLockTable::new());
        locks.lock_z(&[5]);

        let (tx, rx) = mpsc::channel();
        let worker = {
            let locks = Arc::clone(&locks);
            thread::spawn(move || {
                locks.lock_range(2);
                tx.send(()).unwrap();
            })
        };

        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        locks.release_z(&[5]);
        rx.recv_timeout(Duration::from_secs(1)).unwrap();
        worker.join().unwrap();
    }

    #[test]
    fn range_at_bound_does_not_block_equal_z() {
        let locks = WriteLockTable::new();
        locks.lock_range(4);
        // z == bound is not covered; only strictly greater values are.
        locks
            .lock_z_timeout(&[4], Duration::from_millis(50))
            .unwrap();
    }

    #[test]
    fn timed_out_z_lock_rolls_back_partial_acquisitions() {
        let locks = WriteLockTable::new();
        locks.lock_z(&[7]);

        let err = locks
            .lock_z_timeout(&[3, 7], Duration::from_millis(50))
            .unwrap_err();
        assert!(matches!(err, StoreError::Timeout));

        // 3 was taken before the wait on 7 timed out, and must be free again.
        locks
            .lock_z_timeout(&[3], Duration::from_millis(50))
            .unwrap();
    }

    #[test]
    fn timed_out_range_lock_leaves_no_range() {
        let locks = WriteLockTable::new();
        locks.lock_z(&[9]);
        assert!(locks
            .lock_range_timeout(1, Duration::from_millis(50))
            .is_err());
        locks.release_z(&[9]);
        locks
            .lock_range_timeout(1, Duration::from_millis(50))
            .unwrap();
    }

    #[test]
    fn reset_frees_everything() {
        let locks = WriteLockTable::new();
        locks.lock_id(1);
        locks.lock_z(&[2]);
        locks.lock_range(0);
        locks.reset();
        locks.lock_id(1);
        locks.lock_z(&[2]);
        locks.lock_range(0);
    }
}
