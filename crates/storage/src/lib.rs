// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Persisted constraint registry
//!
//! ```text
//! Operation → WalEntry → wal-<g>.jsonl ─┐
//!                                       ├─ catch_up → MaterializedState
//!              other processes append ──┘
//!
//! snapshot-<g+1>.json ← compaction (after a purge or a full log)
//! ```

mod error;
mod operation;
mod snapshot;
mod state;
mod store;
mod wal;

pub use error::StoreError;
pub use operation::Operation;
pub use snapshot::Snapshot;
pub use state::MaterializedState;
pub use store::ConstraintStore;
pub use wal::{Wal, WalEntry, DEFAULT_COMPACTION_THRESHOLD};
