use thiserror::Error;

use crate::model::WidgetId;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("widget {0} not found")]
    NotFound(WidgetId),
    #[error("lock wait timed out")]
    Timeout,
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
    #[error("internal invariant violated: {0}")]
    Internal(&'static str),
}

impl StoreError {
    /// Returns `true` when the operation may succeed if re-driven after a
    /// backoff. Only lock-wait timeouts are retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Timeout)
    }
}
