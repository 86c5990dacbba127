//! # Fitlog Ledger
//!
//! Durable change ledger and pull cursors for Fitlog's local-first sync.
//!
//! This crate provides:
//! - `ChangeLedger`: the append-only record of local mutations not yet
//!   confirmed remotely, with compaction-on-append
//! - A CRC-framed CBOR journal making ledger entries durable across restarts
//! - `CursorTable`: per-kind "changed since" watermarks for pulls
//!
//! ## Key Invariants
//!
//! - At most one live entry per `(kind, entity id)`; later mutations
//!   supersede in place
//! - Entries are removed only after remote confirmation, so a crash before
//!   confirmation re-sends the mutation (transport calls are idempotent)
//! - An update appended after a local delete is rejected, never dropped
//! - Cursors advance monotonically; the only rollback is an explicit reset

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cursor;
mod entry;
mod error;
mod journal;
mod ledger;

pub use cursor::CursorTable;
pub use entry::{EntryId, LedgerEntry, LedgerOp};
pub use error::{LedgerError, LedgerResult};
pub use ledger::{ChangeLedger, LedgerConfig};
