//! zboard: an in-memory MVCC store for z-ordered board widgets.
//!
//! Reads never block and never wait on writers; they observe one consistent
//! snapshot across the by-id lookup and the ordered-by-z scan. Writers
//! serialize through logical id/z/range locks and a transaction log whose
//! commit order is the serialization order. Obsolete versions are reclaimed
//! by [`BoardStore::vacuum`] without quiescing readers.

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod model;
pub mod store;

pub use crate::config::Config;
pub use crate::error::{Result, StoreError};
pub use crate::model::{Serial, Tid, Widget, WidgetId};
pub use crate::store::{BoardStore, RangeByZ, VacuumScheduler, VacuumStats};
