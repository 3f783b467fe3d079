use serde::{Deserialize, Serialize};

pub type WidgetId = i32;

/// Transaction id handed out when a write begins. Distinct from the commit
/// serial: a tid exists before its transaction reaches the log.
pub type Tid = i64;

/// Commit serial assigned by the transaction log. Serials are dense and
/// start at 0, so -1 reads as "log empty" / "cache unset".
pub type Serial = i64;

/// A widget on the board. `z` is the stack order; among all currently
/// visible widgets it is unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Widget {
    pub id: WidgetId,
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub width: i32,
    pub height: i32,
}
