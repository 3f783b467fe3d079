//! In-memory MVCC store for z-ordered widgets.
//!
//! Every widget is represented by its chain of versions over time. Writers
//! append new versions and mark old ones superseded; readers pick a snapshot
//! serial and filter both indices through it, so reads never wait on
//! writers. Commit order in the transaction log is the serialization order.

mod locks;
mod reads;
mod snapshots;
mod txlog;
mod vacuum;
mod version;
mod writes;
mod zkey;

use std::sync::atomic::{AtomicI32, AtomicI64, Ordering};
use std::sync::Arc;

use crossbeam_skiplist::SkipMap;
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::model::{Serial, Tid, WidgetId};

use locks::WriteLockTable;
use snapshots::SnapshotRegistry;
use txlog::TransactionLog;
use version::{VersionStatus, WidgetVersion};
use zkey::{ZKey, ZKeyFactory};

pub use reads::RangeByZ;
pub use vacuum::{VacuumScheduler, VacuumStats};

type VersionChain = Vec<Arc<WidgetVersion>>;

/// MVCC widget store.
///
/// Reads take the global latch in shared mode, publish their snapshot
/// serial, and filter version visibility through the transaction log.
/// Writes also run under the shared latch; they serialize against each
/// other with logical id/z/range locks instead. Only [`clear`](Self::clear)
/// takes the latch exclusively.
pub struct BoardStore {
    config: Config,
    /// Shared side for every normal operation; exclusive side is the
    /// `clear` barrier.
    latch: RwLock<()>,
    /// Primary index: widget id to its version chain, oldest first.
    /// Appenders hold the widget's id lock; there is at most one per chain.
    chains: DashMap<WidgetId, VersionChain>,
    /// Secondary index ordered by (z, tiebreaker).
    by_z: SkipMap<ZKey, Arc<WidgetVersion>>,
    zkeys: ZKeyFactory,
    txlog: TransactionLog,
    locks: WriteLockTable,
    snapshots: SnapshotRegistry,
    tid_seq: AtomicI64,
    id_seq: AtomicI32,
}

impl BoardStore {
    pub fn new() -> Result<Self> {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            latch: RwLock::new(()),
            chains: DashMap::with_capacity(config.initial_capacity),
            by_z: SkipMap::new(),
            zkeys: ZKeyFactory::new(),
            txlog: TransactionLog::with_capacity(config.initial_capacity),
            locks: WriteLockTable::new(),
            snapshots: SnapshotRegistry::new(),
            tid_seq: AtomicI64::new(0),
            id_seq: AtomicI32::new(0),
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Latest committed serial; -1 before the first commit. Diagnostic.
    pub fn latest_serial(&self) -> Serial {
        self.txlog.latest_serial()
    }

    /// Total number of versions held across all chains, vacuumed or not.
    /// Diagnostic.
    pub fn version_count(&self) -> usize {
        self.chains.iter().map(|chain| chain.len()).sum()
    }

    /// Empties the store back to its freshly-constructed state. This is the
    /// one operation that takes the global latch exclusively, so it waits
    /// for every in-flight read and write (including undrained range
    /// iterators) to finish.
    pub fn clear(&self) {
        let _barrier = self.latch.write();
        self.chains.clear();
        while self.by_z.pop_front().is_some() {}
        self.tid_seq.store(0, Ordering::Relaxed);
        self.id_seq.store(0, Ordering::Relaxed);
        self.txlog.clear();
        self.locks.reset();
        self.zkeys.reset();
        self.snapshots.clear();
        info!("store.cleared");
    }

    fn next_tid(&self) -> Tid {
        self.tid_seq.fetch_add(1, Ordering::Relaxed)
    }

    fn next_widget_id(&self) -> WidgetId {
        self.id_seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Newest version of `id` if it is currently active. Writers resolve
    /// their target through this; the chain tail is the only version a
    /// writer may supersede.
    fn newest_active(&self, id: WidgetId) -> Option<Arc<WidgetVersion>> {
        let newest = self.chains.get(&id)?.last()?.clone();
        match newest.status_now(&self.txlog) {
            VersionStatus::Active => Some(newest),
            _ => None,
        }
    }

    /// The active version occupying `z` under `snapshot`, if any. More than
    /// one is an invariant breach: z values must be unique among active
    /// versions.
    fn active_at_z(&self, z: i32, snapshot: Serial) -> Result<Option<Arc<WidgetVersion>>> {
        let mut found: Option<Arc<WidgetVersion>> = None;
        for entry in self.by_z.range(ZKey::floor(z)..=ZKey::ceiling(z)) {
            if entry.value().status_at(snapshot, &self.txlog) != VersionStatus::Active {
                continue;
            }
            if let Some(first) = &found {
                warn!(
                    z,
                    snapshot,
                    first_id = first.id(),
                    second_id = entry.value().id(),
                    "store.z.duplicate_active"
                );
                return Err(StoreError::Internal("two active versions share one z"));
            }
            found = Some(entry.value().clone());
        }
        Ok(found)
    }

    /// Largest z among currently active versions.
    fn max_active_z(&self) -> Option<i32> {
        self.by_z
            .iter()
            .rev()
            .find(|entry| entry.value().status_now(&self.txlog) == VersionStatus::Active)
            .map(|entry| entry.value().z())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Widget;

    fn test_store() -> BoardStore {
        BoardStore::with_config(Config::for_testing()).unwrap()
    }

    #[test]
    fn chain_serials_are_monotone_and_adjacent() {
        let store = test_store();
        let w = store.create(0, 0, 1, 1, 1).unwrap();
        store.update(w.id, 1, 0, 1, 1, 1).unwrap();
        store.update(w.id, 2, 0, 2, 1, 1).unwrap();

        let chain = store.chains.get(&w.id).unwrap().clone();
        assert_eq!(chain.len(), 3);
        for pair in chain.windows(2) {
            let prev_from = pair[0].from_serial(&store.txlog).unwrap();
            let next_from = pair[1].from_serial(&store.txlog).unwrap();
            assert!(prev_from < next_from);
            // A version ends exactly where its successor begins.
            assert_eq!(pair[0].till_serial(&store.txlog), Some(next_from));
        }
        assert_eq!(chain.last().unwrap().till_serial(&store.txlog), None);
    }

    #[test]
    fn duplicate_active_z_is_surfaced_as_an_invariant_breach() {
        let store = test_store();
        let mut widget = Widget {
            id: 100,
            x: 0,
            y: 0,
            z: 5,
            width: 1,
            height: 1,
        };
        let first = Arc::new(WidgetVersion::new(widget, 900));
        widget.id = 101;
        let second = Arc::new(WidgetVersion::new(widget, 901));
        store.by_z.insert(store.zkeys.fresh(5), first);
        store.by_z.insert(store.zkeys.fresh(5), second);
        store.txlog.commit(900).unwrap();
        store.txlog.commit(901).unwrap();

        assert!(matches!(
            store.active_at_z(5, Serial::MAX),
            Err(StoreError::Internal(_))
        ));
    }

    #[test]
    fn active_at_z_skips_expired_and_uncommitted_versions() {
        let store = test_store();
        let w = store.create(0, 0, 3, 1, 1).unwrap();
        store.update(w.id, 1, 0, 3, 1, 1).unwrap();

        // Two index entries share z = 3, but only the newer one is active.
        let current = store.active_at_z(3, Serial::MAX).unwrap().unwrap();
        assert_eq!(current.widget().x, 1);

        store.delete(w.id).unwrap();
        assert!(store.active_at_z(3, Serial::MAX).unwrap().is_none());
    }
}
