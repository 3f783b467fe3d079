use std::collections::HashMap;

use parking_lot::RwLock;

use crate::error::{Result, StoreError};
use crate::model::{Serial, Tid};

/// Append-only record of committed transactions.
///
/// Commit is the serialization point: a write becomes visible to readers the
/// instant its tid lands here, because readers resolve version visibility
/// through [`serial_for`](TransactionLog::serial_for). Serials are dense and
/// uniquely assigned, starting at 0.
pub(crate) struct TransactionLog {
    inner: RwLock<LogState>,
}

struct LogState {
    serials: HashMap<Tid, Serial>,
    next_serial: Serial,
}

impl TransactionLog {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(LogState {
                serials: HashMap::with_capacity(capacity),
                next_serial: 0,
            }),
        }
    }

    /// Assigns the next commit serial to `tid`. A tid can commit once.
    pub(crate) fn commit(&self, tid: Tid) -> Result<Serial> {
        let mut state = self.inner.write();
        if state.serials.contains_key(&tid) {
            return Err(StoreError::Internal("transaction already committed"));
        }
        let serial = state.next_serial;
        state.serials.insert(tid, serial);
        state.next_serial += 1;
        Ok(serial)
    }

    /// Latest committed serial, or -1 when nothing has committed yet.
    pub(crate) fn latest_serial(&self) -> Serial {
        self.inner.read().next_serial - 1
    }

    pub(crate) fn serial_for(&self, tid: Tid) -> Option<Serial> {
        self.inner.read().serials.get(&tid).copied()
    }

    pub(crate) fn clear(&self) {
        let mut state = self.inner.write();
        state.serials.clear();
        state.next_serial = 0;
    }
}
