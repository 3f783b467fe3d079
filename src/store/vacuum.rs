use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use crate::model::Serial;

use super::version::WidgetVersion;
use super::BoardStore;

/// What one vacuum pass reclaimed.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct VacuumStats {
    /// Serial the pass pruned up to: versions superseded at or before it
    /// are invisible to every live reader.
    pub barrier: Serial,
    /// Versions removed from version chains.
    pub chain_versions_pruned: u64,
    /// Chains removed entirely because no version survived.
    pub chains_removed: u64,
    /// Entries removed from the z-index.
    pub index_entries_pruned: u64,
}

impl VacuumStats {
    fn made_progress(&self) -> bool {
        self.chain_versions_pruned > 0 || self.chains_removed > 0 || self.index_entries_pruned > 0
    }
}

impl BoardStore {
    /// Reclaims versions no live reader can still observe.
    ///
    /// Runs under the shared latch, concurrently with reads and writes: the
    /// barrier is the oldest live snapshot (or the latest serial when no
    /// reader is out), so everything pruned was already invisible, and
    /// writers only append versions whose serials resolve after this pass
    /// computed its barrier.
    pub fn vacuum(&self) -> VacuumStats {
        let _section = self.latch.read();
        let barrier = self
            .snapshots
            .min()
            .unwrap_or_else(|| self.txlog.latest_serial());
        let mut stats = VacuumStats {
            barrier,
            ..VacuumStats::default()
        };

        self.chains.retain(|_, chain| {
            let before = chain.len();
            chain.retain(|version| !self.version_is_reclaimable(version, barrier));
            stats.chain_versions_pruned += (before - chain.len()) as u64;
            if chain.is_empty() {
                stats.chains_removed += 1;
                false
            } else {
                true
            }
        });

        for entry in self.by_z.iter() {
            if self.version_is_reclaimable(entry.value(), barrier) && entry.remove() {
                stats.index_entries_pruned += 1;
            }
        }

        if stats.made_progress() {
            info!(
                barrier,
                chain_versions = stats.chain_versions_pruned,
                chains_removed = stats.chains_removed,
                index_entries = stats.index_entries_pruned,
                "store.vacuum.completed"
            );
        } else {
            debug!(barrier, "store.vacuum.noop");
        }
        stats
    }

    /// A version is reclaimable once its end of life has a known serial at
    /// or below the barrier. Resolving may populate the serial cache but
    /// touches nothing else.
    fn version_is_reclaimable(&self, version: &WidgetVersion, barrier: Serial) -> bool {
        version
            .till_serial(&self.txlog)
            .is_some_and(|till| till <= barrier)
    }
}

/// Drives [`BoardStore::vacuum`] on a fixed cadence from a background
/// thread. The store itself never schedules anything; embedders start one
/// of these (or call `vacuum` from their own scheduler).
///
/// Stops and joins the thread on drop.
pub struct VacuumScheduler {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl VacuumScheduler {
    /// Spawns the vacuum thread; `interval` normally comes from
    /// [`Config::vacuum_interval`](crate::config::Config::vacuum_interval).
    pub fn start(store: Arc<BoardStore>, interval: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            while !flag.load(Ordering::Relaxed) {
                thread::park_timeout(interval);
                if flag.load(Ordering::Relaxed) {
                    break;
                }
                store.vacuum();
            }
        });
        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Stops the thread and waits for it to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            let _ = handle.join();
        }
    }
}

impl Drop for VacuumScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
