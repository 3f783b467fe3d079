use std::sync::Arc;

use tracing::debug;

use crate::error::{Result, StoreError};
use crate::model::{Serial, Tid, Widget, WidgetId};

use super::version::{VersionStatus, WidgetVersion};
use super::zkey::ZKey;
use super::BoardStore;

/// An old version marked superseded and the successor that replaces it one
/// z higher. Produced by a range shift, consumed after commit for lock
/// release and serial caching.
struct ShiftedPair {
    outgoing: Arc<WidgetVersion>,
    incoming: Arc<WidgetVersion>,
}

impl BoardStore {
    /// Creates a widget at an explicit z. If that z is taken, the occupant
    /// and everything above it move up by one within the same transaction.
    ///
    /// Lock acquisition here is untimed: create never holds an id lock
    /// while waiting behind another writer's range, so it cannot be party
    /// to the id/z cycle the timed operations guard against.
    pub fn create(&self, x: i32, y: i32, z: i32, width: i32, height: i32) -> Result<Widget> {
        validate_dimensions(width, height)?;
        let _section = self.latch.read();
        let tid = self.next_tid();
        let id = self.next_widget_id();

        self.locks.lock_id(id);
        self.locks.lock_z(&[z]);

        let widget = Widget {
            id,
            x,
            y,
            z,
            width,
            height,
        };
        let version = Arc::new(WidgetVersion::new(widget, tid));
        self.chains.insert(id, vec![version.clone()]);
        self.by_z.insert(self.zkeys.fresh(z), version.clone());

        // The probe sees only committed versions, so the row just inserted
        // does not count as its own displaced occupant.
        let occupant = match self.active_at_z(z, Serial::MAX) {
            Ok(found) => found,
            Err(err) => {
                self.locks.release_z(&[z]);
                self.locks.release_id(id);
                return Err(err);
            }
        };

        let mut shifted = Vec::new();
        if occupant.is_some() {
            self.locks.lock_range(z);
            shifted = self.shift_up_from(z, tid, None);
            self.index_shifted(&shifted);
        }

        let serial = self.txlog.commit(tid)?;

        self.locks.release_z(&[z]);
        self.locks.release_id(id);
        if occupant.is_some() {
            self.locks.release_range();
        }
        self.finish_shifted(&shifted, serial);
        version.cache_from_serial(serial);

        debug!(id, z, serial, shifted = shifted.len(), "store.create");
        Ok(widget)
    }

    /// Creates a widget one step above the current top of the stack (z = 0
    /// on an empty board). Holding the minimum z lock plus the minimum
    /// range lock shuts out every other writer while the top is scanned.
    pub fn create_at_top(&self, x: i32, y: i32, width: i32, height: i32) -> Result<Widget> {
        validate_dimensions(width, height)?;
        let _section = self.latch.read();
        let tid = self.next_tid();
        let id = self.next_widget_id();

        self.locks.lock_id(id);
        self.locks.lock_z(&[i32::MIN]);
        self.locks.lock_range(i32::MIN);

        let z = self.max_active_z().map_or(0, |top| top + 1);
        let widget = Widget {
            id,
            x,
            y,
            z,
            width,
            height,
        };
        let version = Arc::new(WidgetVersion::new(widget, tid));
        self.chains.insert(id, vec![version.clone()]);
        self.by_z.insert(self.zkeys.fresh(z), version.clone());

        let serial = self.txlog.commit(tid)?;

        self.locks.release_range();
        self.locks.release_z(&[i32::MIN]);
        self.locks.release_id(id);
        version.cache_from_serial(serial);

        debug!(id, z, serial, "store.create_at_top");
        Ok(widget)
    }

    /// Replaces every field of `id`. Moving onto an occupied z shifts the
    /// occupant and everything above it up by one. A field-identical update
    /// is a pure no-op: no version, no commit.
    pub fn update(
        &self,
        id: WidgetId,
        x: i32,
        y: i32,
        z: i32,
        width: i32,
        height: i32,
    ) -> Result<Widget> {
        validate_dimensions(width, height)?;
        let _section = self.latch.read();
        let tid = self.next_tid();

        self.locks.lock_id(id);
        let old = match self.newest_active(id) {
            Some(version) => version,
            None => {
                self.locks.release_id(id);
                return Err(StoreError::NotFound(id));
            }
        };

        let widget = Widget {
            id,
            x,
            y,
            z,
            width,
            height,
        };
        if widget == old.widget() {
            self.locks.release_id(id);
            return Ok(widget);
        }

        let old_z = old.z();
        let locked_zs = [z, old_z];
        if let Err(err) = self.locks.lock_z_timeout(&locked_zs, self.config.lock_timeout) {
            self.locks.release_id(id);
            return Err(err);
        }

        let mut range_locked = false;
        let mut shifted = Vec::new();
        if z != old_z {
            let occupant = match self.active_at_z(z, Serial::MAX) {
                Ok(found) => found,
                Err(err) => {
                    self.locks.release_z(&locked_zs);
                    self.locks.release_id(id);
                    return Err(err);
                }
            };
            if occupant.is_some() {
                if let Err(err) = self.locks.lock_range_timeout(z, self.config.lock_timeout) {
                    self.locks.release_z(&locked_zs);
                    self.locks.release_id(id);
                    return Err(err);
                }
                range_locked = true;
                shifted = self.shift_up_from(z, tid, Some(id));
                self.index_shifted(&shifted);
            }
        }

        old.supersede(tid);
        let version = Arc::new(WidgetVersion::new(widget, tid));
        if let Some(mut chain) = self.chains.get_mut(&id) {
            chain.push(version.clone());
        }
        self.by_z.insert(self.zkeys.fresh(z), version.clone());

        let serial = self.txlog.commit(tid)?;

        self.locks.release_z(&locked_zs);
        if range_locked {
            self.locks.release_range();
        }
        self.finish_shifted(&shifted, serial);
        version.cache_from_serial(serial);
        old.cache_till_serial(serial);
        self.locks.release_id(id);

        debug!(
            id,
            from_z = old_z,
            to_z = z,
            serial,
            shifted = shifted.len(),
            "store.update"
        );
        Ok(widget)
    }

    /// Moves `id` to the top of the stack, updating the other fields along
    /// the way. A widget already in the foreground keeps its z; if nothing
    /// else changed either, the whole call is a no-op.
    pub fn update_to_top(
        &self,
        id: WidgetId,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    ) -> Result<Widget> {
        validate_dimensions(width, height)?;
        let _section = self.latch.read();
        let tid = self.next_tid();

        self.locks.lock_id(id);
        let old = match self.newest_active(id) {
            Some(version) => version,
            None => {
                self.locks.release_id(id);
                return Err(StoreError::NotFound(id));
            }
        };

        // Blocks all other writers, like create_at_top, but bounded: this
        // path holds an id lock while it waits, so it must be able to back
        // off.
        if let Err(err) = self
            .locks
            .lock_z_timeout(&[i32::MIN], self.config.lock_timeout)
        {
            self.locks.release_id(id);
            return Err(err);
        }
        if let Err(err) = self
            .locks
            .lock_range_timeout(i32::MIN, self.config.lock_timeout)
        {
            self.locks.release_z(&[i32::MIN]);
            self.locks.release_id(id);
            return Err(err);
        }

        // The chain for `id` is non-empty, so the board cannot be empty.
        let top = self.max_active_z().map_or(0, |top| top + 1);
        let z = if old.z() + 1 == top { old.z() } else { top };
        let widget = Widget {
            id,
            x,
            y,
            z,
            width,
            height,
        };

        if widget != old.widget() {
            old.supersede(tid);
            let version = Arc::new(WidgetVersion::new(widget, tid));
            if let Some(mut chain) = self.chains.get_mut(&id) {
                chain.push(version.clone());
            }
            self.by_z.insert(self.zkeys.fresh(z), version.clone());

            let serial = self.txlog.commit(tid)?;

            version.cache_from_serial(serial);
            old.cache_till_serial(serial);
            debug!(id, z, serial, "store.update_to_top");
        }

        self.locks.release_range();
        self.locks.release_z(&[i32::MIN]);
        self.locks.release_id(id);

        Ok(widget)
    }

    /// Deletes `id`. The version chain stays behind for readers until
    /// vacuum catches up.
    pub fn delete(&self, id: WidgetId) -> Result<()> {
        let _section = self.latch.read();
        let tid = self.next_tid();

        self.locks.lock_id(id);
        let old = match self.newest_active(id) {
            Some(version) => version,
            None => {
                self.locks.release_id(id);
                return Err(StoreError::NotFound(id));
            }
        };

        let old_z = old.z();
        if let Err(err) = self.locks.lock_z_timeout(&[old_z], self.config.lock_timeout) {
            self.locks.release_id(id);
            return Err(err);
        }

        old.supersede(tid);
        let serial = match self.txlog.commit(tid) {
            Ok(serial) => serial,
            Err(err) => {
                self.locks.release_id(id);
                return Err(err);
            }
        };
        self.locks.release_z(&[old_z]);
        old.cache_till_serial(serial);
        self.locks.release_id(id);

        debug!(id, z = old_z, serial, "store.delete");
        Ok(())
    }

    /// Supersedes every active version with z at or above `from_z` and
    /// builds its successor one step higher, taking each widget's id lock
    /// along the way. Successors go into the z-index afterwards, in one
    /// batch, so this scan never observes its own insertions.
    ///
    /// Caller holds the z lock on `from_z` and the range lock above it.
    /// An update moving its own widget down the stack passes that widget's
    /// id as `skip`: the mover's old version is above `from_z` and still
    /// active, but it is replaced by the update itself, and its id lock is
    /// already held by this very transaction.
    fn shift_up_from(&self, from_z: i32, tid: Tid, skip: Option<WidgetId>) -> Vec<ShiftedPair> {
        let mut shifted = Vec::new();
        for entry in self.by_z.range(ZKey::floor(from_z)..) {
            let outgoing = entry.value().clone();
            if skip == Some(outgoing.id()) {
                continue;
            }
            if outgoing.status_now(&self.txlog) != VersionStatus::Active {
                continue;
            }
            self.locks.lock_id(outgoing.id());
            outgoing.supersede(tid);

            let mut moved = outgoing.widget();
            moved.z += 1;
            let incoming = Arc::new(WidgetVersion::new(moved, tid));
            if let Some(mut chain) = self.chains.get_mut(&incoming.id()) {
                chain.push(incoming.clone());
            }
            shifted.push(ShiftedPair { outgoing, incoming });
        }
        shifted
    }

    fn index_shifted(&self, shifted: &[ShiftedPair]) {
        for pair in shifted {
            self.by_z
                .insert(self.zkeys.fresh(pair.incoming.z()), pair.incoming.clone());
        }
    }

    /// Post-commit bookkeeping for a shift: release the id locks taken
    /// while collecting, and memoize the commit serial on both sides of
    /// every pair.
    fn finish_shifted(&self, shifted: &[ShiftedPair], serial: Serial) {
        for pair in shifted {
            self.locks.release_id(pair.incoming.id());
            pair.outgoing.cache_till_serial(serial);
            pair.incoming.cache_from_serial(serial);
        }
    }
}

fn validate_dimensions(width: i32, height: i32) -> Result<()> {
    if width <= 0 || height <= 0 {
        return Err(StoreError::Invalid("width and height must be positive"));
    }
    Ok(())
}
