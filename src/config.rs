use std::time::Duration;

use crate::error::{Result, StoreError};

#[derive(Debug, Clone)]
pub struct Config {
    /// Pre-sizing hint for the primary index and the transaction log.
    pub initial_capacity: usize,
    /// How long a writer waits for a contended z or range lock before the
    /// operation fails with [`StoreError::Timeout`].
    pub lock_timeout: Duration,
    /// Suggested cadence for [`VacuumScheduler`](crate::store::VacuumScheduler).
    pub vacuum_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            initial_capacity: 1000,
            lock_timeout: Duration::from_millis(1000),
            vacuum_interval: Duration::from_secs(60),
        }
    }
}

impl Config {
    /// Small capacities and short waits so contention tests finish quickly.
    pub fn for_testing() -> Self {
        Self {
            initial_capacity: 16,
            lock_timeout: Duration::from_millis(100),
            vacuum_interval: Duration::from_millis(50),
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.lock_timeout.is_zero() {
            return Err(StoreError::Invalid("lock timeout must be positive"));
        }
        Ok(())
    }
}
