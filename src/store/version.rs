use std::sync::atomic::{AtomicI64, Ordering};

use crate::model::{Serial, Tid, Widget, WidgetId};

use super::txlog::TransactionLog;

/// Marks a version that no transaction has superseded yet.
pub(crate) const TID_NONE: Tid = -1;

/// Serial cache value meaning "not resolved yet, consult the log".
const SERIAL_UNSET: Serial = -1;

/// One immutable-after-publish version of a widget.
///
/// The payload never changes. `till_tid` is written exactly once, by the
/// superseding writer while it holds this widget's id lock; the serial
/// fields only memoize transaction-log lookups, so any racer that stores
/// them stores the same value. All three are published with release stores
/// and read with acquire loads so a reader that sees a tid also sees the
/// log state that makes it resolvable.
pub(crate) struct WidgetVersion {
    widget: Widget,
    from_tid: Tid,
    till_tid: AtomicI64,
    from_serial: AtomicI64,
    till_serial: AtomicI64,
}

/// Visibility of a version under a snapshot serial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum VersionStatus {
    /// Committed at or before the snapshot and not yet superseded by it.
    Active,
    /// Superseded or deleted at or before the snapshot.
    Expired,
    /// Created by a transaction the snapshot cannot see.
    Uncommitted,
}

impl WidgetVersion {
    pub(crate) fn new(widget: Widget, from_tid: Tid) -> Self {
        Self {
            widget,
            from_tid,
            till_tid: AtomicI64::new(TID_NONE),
            from_serial: AtomicI64::new(SERIAL_UNSET),
            till_serial: AtomicI64::new(SERIAL_UNSET),
        }
    }

    pub(crate) fn widget(&self) -> Widget {
        self.widget
    }

    pub(crate) fn id(&self) -> WidgetId {
        self.widget.id
    }

    pub(crate) fn z(&self) -> i32 {
        self.widget.z
    }

    /// Records `tid` as the transaction that ends this version's lifetime.
    /// Invisible to readers until that transaction commits.
    pub(crate) fn supersede(&self, tid: Tid) {
        self.till_tid.store(tid, Ordering::Release);
    }

    pub(crate) fn cache_from_serial(&self, serial: Serial) {
        self.from_serial.store(serial, Ordering::Release);
    }

    pub(crate) fn cache_till_serial(&self, serial: Serial) {
        self.till_serial.store(serial, Ordering::Release);
    }

    /// Commit serial of the creating transaction, if it has committed.
    /// Resolution through the log is memoized.
    pub(crate) fn from_serial(&self, log: &TransactionLog) -> Option<Serial> {
        let cached = self.from_serial.load(Ordering::Acquire);
        if cached != SERIAL_UNSET {
            return Some(cached);
        }
        let resolved = log.serial_for(self.from_tid)?;
        self.from_serial.store(resolved, Ordering::Release);
        Some(resolved)
    }

    /// Commit serial of the superseding transaction: `None` while the
    /// version is current or its supersessor has not committed.
    pub(crate) fn till_serial(&self, log: &TransactionLog) -> Option<Serial> {
        let cached = self.till_serial.load(Ordering::Acquire);
        if cached != SERIAL_UNSET {
            return Some(cached);
        }
        let till_tid = self.till_tid.load(Ordering::Acquire);
        if till_tid == TID_NONE {
            return None;
        }
        let resolved = log.serial_for(till_tid)?;
        self.till_serial.store(resolved, Ordering::Release);
        Some(resolved)
    }

    pub(crate) fn status_at(&self, snapshot: Serial, log: &TransactionLog) -> VersionStatus {
        if let Some(till) = self.till_serial(log) {
            if till <= snapshot {
                return VersionStatus::Expired;
            }
        }
        match self.from_serial(log) {
            Some(from) if from <= snapshot => VersionStatus::Active,
            _ => VersionStatus::Uncommitted,
        }
    }

    /// Status against the newest possible snapshot; what writers use to ask
    /// "is this version current right now".
    pub(crate) fn status_now(&self, log: &TransactionLog) -> VersionStatus {
        self.status_at(Serial::MAX, log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn widget(id: WidgetId, z: i32) -> Widget {
        Widget {
            id,
            x: 0,
            y: 0,
            z,
            width: 1,
            height: 1,
        }
    }

    #[test]
    fn uncommitted_until_the_log_knows_the_tid() {
        let log = TransactionLog::with_capacity(4);
        let version = WidgetVersion::new(widget(1, 0), 7);
        assert_eq!(version.status_at(100, &log), VersionStatus::Uncommitted);

        let serial = log.commit(7).unwrap();
        assert_eq!(version.status_at(serial, &log), VersionStatus::Active);
        assert_eq!(version.status_at(serial - 1, &log), VersionStatus::Uncommitted);
    }

    #[test]
    fn supersession_is_invisible_until_commit() {
        let log = TransactionLog::with_capacity(4);
        let version = WidgetVersion::new(widget(1, 0), 1);
        let created = log.commit(1).unwrap();

        version.supersede(2);
        assert_eq!(version.status_now(&log), VersionStatus::Active);

        let deleted = log.commit(2).unwrap();
        assert_eq!(version.status_at(created, &log), VersionStatus::Active);
        assert_eq!(version.status_at(deleted, &log), VersionStatus::Expired);
        assert_eq!(version.status_now(&log), VersionStatus::Expired);
    }

    #[test]
    fn cached_serials_bypass_the_log() {
        let log = TransactionLog::with_capacity(4);
        let version = WidgetVersion::new(widget(1, 0), 1);
        let serial = log.commit(1).unwrap();
        assert_eq!(version.from_serial(&log), Some(serial));

        // Resolution memoized: a cleared log no longer matters.
        log.clear();
        assert_eq!(version.from_serial(&log), Some(serial));
    }
}
