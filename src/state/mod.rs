//! Pane state of record
//!
//! - `record.rs`: `PaneRecord`, `PaneKind` and the `StateDocument` JSON shape
//! - `store.rs`: file I/O with atomic writes
//! - `queue.rs`: the single-writer queue every mutation goes through

mod queue;
mod record;
mod store;

pub use queue::WriteQueue;
pub use record::{PaneKind, PaneRecord, StateDocument};
pub use store::{StateStore, StoreError};
