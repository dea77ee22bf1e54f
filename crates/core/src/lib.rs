// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! rc-core: model and admission algorithm of the resource constraint engine
//!
//! This crate provides:
//! - Constraints, consumers and the consumer state machine
//! - The FIFO/ASAP selection of admissible consumers (pure)
//! - The registry and catalog ports storage implements
//! - Configuration, clock and id seams

pub mod clock;
pub mod config;
pub mod id;

pub mod catalog;
pub mod constraint;
pub mod consumer;
pub mod registry;
pub mod resource;
pub mod scope;

pub use catalog::{ConstraintCatalog, ConsumerFilter};
pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{ConfigError, EngineConfig, ReconcilerConfig, StoreConfig};
pub use constraint::{
    Constraint, ConstraintId, ConstraintSpec, ConstraintUnit, RunnableConsumers, Strategy,
};
pub use consumer::{Consumer, ConsumerId, ConsumerInput, ConsumerState};
pub use id::{IdGen, SequentialIdGen, UuidIdGen};
pub use registry::{
    Admission, ConstraintRegistry, RegisterContext, RegisterOutcome, RegistryError,
    TransitionContext,
};
pub use resource::{ActiveScope, ConsumerRecord, ResourceConstraint, ResourceConstraintUsage};
pub use scope::{HoldingScope, ReleaseEntityPolicy, ReleaseScope, ScopePolicy, UnhandledScope};
