//! Durable, file-backed record of a migration.
//!
//! Everything the pipeline needs to resume after a crash lives under one
//! output directory as pretty-printed JSON:
//! - per-item album and file detail files written during enumeration
//! - the projected album and file indexes
//! - the set of migrated file ids and the append-only failure log

pub mod error;
pub mod store;
pub mod types;

pub use error::LedgerError;
pub use store::Ledger;
pub use types::{AlbumEntry, FailureEvent, FailureKind, FileRecord};
