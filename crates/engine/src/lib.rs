// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! rc-engine: the resource constraint service and its reconciliation loop

mod error;
mod reconciler;
mod service;

pub use error::{PassFailure, ServiceError};
pub use reconciler::{DefaultReconciler, PassReport, Reconciler};
pub use service::{
    ActivePass, DefaultService, RegisterRequest, ResourceConstraintService, ServiceDeps,
};
