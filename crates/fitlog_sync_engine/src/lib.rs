//! # Fitlog Sync Engine
//!
//! Sync coordinator, connectivity monitor, and remote transport for Fitlog's
//! local-first data store.
//!
//! This crate provides:
//! - Sync pass state machine (idle → pushing → pulling → compacting)
//! - Connectivity monitoring with debounced online/offline transitions
//! - Remote transport abstraction with an HTTP adapter and a mock
//! - Status publishing for UI badges (online / syncing / pending / stuck)
//! - A background driver for automatic sync scheduling
//!
//! ## Architecture
//!
//! The engine implements a **push-then-pull** synchronization model:
//! 1. Drain the change ledger to the remote (oldest first, idempotent)
//! 2. Pull remote changes per entity kind from the last pulled watermark
//! 3. Merge pulled records by strict last-writer-wins
//! 4. Compact the ledger entries the remote acknowledged
//!
//! Local writes never wait on the network: the host application writes its
//! store and appends to the ledger, and the engine drains in the background.
//!
//! ## Key Invariants
//!
//! - Local store state = last confirmed remote state ⊕ uncompacted ledger
//!   entries, in ledger order, even across a crash mid-pass
//! - Only one pass runs at a time; concurrent requests coalesce
//! - A remote pull never clobbers a local change still in the ledger
//! - Phase effects (compaction, cursor advance) commit only at phase end
//!
//! There is no global engine singleton: the composition root constructs the
//! components once at startup and passes them by handle.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod connectivity;
mod coordinator;
mod driver;
mod error;
mod http;
mod status;
mod transport;

pub use config::{MonitorConfig, SyncConfig};
pub use connectivity::{ConnectivityMonitor, ReachabilityProbe, ScriptedProbe};
pub use coordinator::{SyncCoordinator, SyncPhase, SyncStats, SyncSummary};
pub use driver::SyncDriver;
pub use error::{SyncError, SyncResult};
pub use http::{HttpClient, HttpResponse, HttpTransport};
pub use status::{StatusPublisher, SyncStatus};
pub use transport::{
    Ack, ChangePage, MockTransport, RemoteTransport, ScriptedFailure, StaticTokenProvider,
    TokenProvider,
};
