// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
// Enable coverage(off) attribute for excluding test infrastructure
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Adapters for the engine's outbound collaborators

pub mod execution;
pub mod notify;
pub mod traced;

pub use execution::{
    ExecutionAdapter, ExecutionError, ExecutionInfo, ExecutionStatus, JsonExecutionAdapter,
};
pub use notify::{NotifyError, WaitNotifyHub, WakeNotifier, WakeReceiver, WakeSignal};
pub use traced::{TracedExecutionAdapter, TracedWakeNotifier};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use execution::{ExecutionCall, FakeExecutionAdapter};
#[cfg(any(test, feature = "test-support"))]
pub use notify::FakeWakeNotifier;
