//! # Fitlog Testkit
//!
//! Test utilities for Fitlog sync.
//!
//! This crate provides:
//! - `SyncHarness`: a fully wired engine over in-memory (or durable)
//!   components, with app-layer helpers for local mutations
//! - `InMemoryRemote`: a fake backend with idempotent upsert semantics,
//!   changed-since pagination, and fault injection
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust
//! use fitlog_testkit::prelude::*;
//!
//! let harness = SyncHarness::in_memory();
//! harness.create_local(sample_meal(100)).unwrap();
//! let summary = harness.sync().unwrap();
//! assert_eq!(summary.pushed, 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod remote;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::remote::*;
}

pub use fixtures::*;
pub use generators::*;
pub use remote::*;
