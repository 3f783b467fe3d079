use std::ops::RangeFrom;
use std::sync::Arc;

use crossbeam_skiplist::map;
use parking_lot::RwLockReadGuard;

use crate::model::{Serial, Widget, WidgetId};

use super::version::{VersionStatus, WidgetVersion};
use super::zkey::ZKey;
use super::BoardStore;

/// A read in progress: the shared latch plus a published snapshot serial.
/// Dropping it retracts the serial from the live-snapshot registry on every
/// exit path, normal or not.
struct SnapshotTicket<'a> {
    store: &'a BoardStore,
    serial: Serial,
    _latch: RwLockReadGuard<'a, ()>,
}

impl Drop for SnapshotTicket<'_> {
    fn drop(&mut self) {
        self.store.snapshots.release(self.serial);
    }
}

impl BoardStore {
    fn begin_read(&self) -> SnapshotTicket<'_> {
        let latch = self.latch.read();
        // Visible: created at or before this serial, superseded after it.
        let serial = self.txlog.latest_serial();
        self.snapshots.register(serial);
        SnapshotTicket {
            store: self,
            serial,
            _latch: latch,
        }
    }

    /// Snapshot lookup by id.
    pub fn get_by_id(&self, id: WidgetId) -> Option<Widget> {
        let ticket = self.begin_read();
        let chain = self.chains.get(&id)?;
        for version in chain.iter().rev() {
            match version.status_at(ticket.serial, &self.txlog) {
                VersionStatus::Active => return Some(version.widget()),
                // Older versions expired even earlier; nothing below an
                // expiration boundary can be active.
                VersionStatus::Expired => return None,
                VersionStatus::Uncommitted => continue,
            }
        }
        None
    }

    /// Number of widgets visible right now.
    pub fn len(&self) -> usize {
        let ticket = self.begin_read();
        self.chains
            .iter()
            .filter(|chain| {
                for version in chain.iter().rev() {
                    match version.status_at(ticket.serial, &self.txlog) {
                        VersionStatus::Active => return true,
                        VersionStatus::Expired => return false,
                        VersionStatus::Uncommitted => continue,
                    }
                }
                false
            })
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Widgets with z at or above `from_z`, ascending, at most `limit` of
    /// them, as of one consistent snapshot.
    ///
    /// The iterator holds the shared latch and its snapshot serial until it
    /// is drained or dropped; hold it briefly. A `clear` cannot start while
    /// one is alive.
    pub fn range_by_z(&self, from_z: i32, limit: usize) -> RangeByZ<'_> {
        let ticket = self.begin_read();
        let entries = self.by_z.range(ZKey::floor(from_z)..);
        RangeByZ {
            ticket,
            entries,
            remaining: limit,
        }
    }
}

/// Lazy ascending-by-z scan pinned to one snapshot. See
/// [`BoardStore::range_by_z`].
pub struct RangeByZ<'a> {
    ticket: SnapshotTicket<'a>,
    entries: map::Range<'a, ZKey, RangeFrom<ZKey>, ZKey, Arc<WidgetVersion>>,
    remaining: usize,
}

impl Iterator for RangeByZ<'_> {
    type Item = Widget;

    fn next(&mut self) -> Option<Widget> {
        if self.remaining == 0 {
            return None;
        }
        let store = self.ticket.store;
        for entry in self.entries.by_ref() {
            if entry.value().status_at(self.ticket.serial, &store.txlog) == VersionStatus::Active {
                self.remaining -= 1;
                return Some(entry.value().widget());
            }
        }
        None
    }
}
