// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Storage/transition port for constraint admission
//!
//! Every mutation on a registry is a conditional update scoped by
//! `(consumer id, unit, expected state)`: it either matches the record's
//! current state and applies, or matches nothing and is a no-op. That is the
//! only concurrency control between processes sharing a registry.

use crate::constraint::{Constraint, ConstraintId, ConstraintUnit};
use crate::consumer::{Consumer, ConsumerId, ConsumerState};
use crate::scope::UnhandledScope;
use thiserror::Error;

/// Errors surfaced by registry implementations and the admission protocol
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("constraint not found: {0}")]
    ConstraintNotFound(ConstraintId),

    #[error("consumer {consumer_id} must request at least one permit")]
    InvalidPermits { consumer_id: ConsumerId },

    #[error("consumer {consumer_id} requests {permits} permits but unit {unit} holds at most {limit}")]
    PermanentlyBlocked {
        consumer_id: ConsumerId,
        unit: ConstraintUnit,
        permits: u32,
        limit: u32,
    },

    #[error("resource constraint name {name:?} is already used in account {account_id}")]
    DuplicateName { account_id: String, name: String },

    #[error("resource constraint already exists: {0}")]
    DuplicateId(ConstraintId),

    #[error(transparent)]
    Scope(#[from] UnhandledScope),

    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Context carried through a registration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterContext {
    /// Proposed fairness order (see [`ConstraintRegistry::adjust_register_consumer_context`])
    pub order: u64,
    /// Application scope of the owning execution
    pub app_id: String,
}

impl RegisterContext {
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            order: 0,
            app_id: app_id.into(),
        }
    }
}

/// Extra match keys and guards for a state transition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitionContext {
    /// When set, only a record of this application matches
    pub app_id: Option<String>,
    /// When set, an unblock only applies if the unit still has room for the
    /// consumer under this ceiling
    pub capacity: Option<u32>,
}

impl TransitionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_app(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }

    pub fn with_capacity(mut self, capacity: u32) -> Self {
        self.capacity = Some(capacity);
        self
    }
}

/// Result of persisting a new consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// Record created in the given initial state
    Registered(ConsumerState),
    /// A record with this consumer id already exists; nothing changed
    AlreadyRegistered,
}

impl RegisterOutcome {
    /// True only for a fresh registration admitted straight to ACTIVE
    pub fn admitted(&self) -> bool {
        matches!(self, RegisterOutcome::Registered(ConsumerState::Active))
    }
}

/// Decides a new consumer's initial state from the unit's current consumers.
///
/// Registries call it while holding whatever guard makes the insert atomic,
/// with the candidate's final order already assigned.
pub type Admission<'a> = &'a dyn Fn(&[Consumer], &Consumer) -> ConsumerState;

/// The storage/transition contract the admission protocol runs against
pub trait ConstraintRegistry: Send + Sync {
    /// Load a constraint's algorithmic view
    fn load(&self, id: &ConstraintId) -> Result<Constraint, RegistryError>;

    /// Non-finished consumers of a unit, ascending by order
    fn load_consumers(
        &self,
        id: &ConstraintId,
        unit: &ConstraintUnit,
    ) -> Result<Vec<Consumer>, RegistryError>;

    /// Highest order ever assigned under a constraint (0 when none)
    fn max_order(&self, id: &ConstraintId) -> Result<u64, RegistryError>;

    /// Propose `max + 1` as the new consumer's order.
    ///
    /// Returns false when the context already carried that order. The value
    /// is a proposal: [`ConstraintRegistry::register_consumer`] raises it if a
    /// concurrent registration claimed it first.
    fn adjust_register_consumer_context(
        &self,
        id: &ConstraintId,
        context: &mut RegisterContext,
    ) -> Result<bool, RegistryError> {
        let order = self.max_order(id)? + 1;
        if order == context.order {
            return Ok(false);
        }
        context.order = order;
        Ok(true)
    }

    /// Persist a consumer with `consumer.id` as uniqueness key.
    ///
    /// `currently_running` is the caller's view of used permits and is only
    /// informational; the initial state comes from `admission`, evaluated
    /// atomically with the insert.
    fn register_consumer(
        &self,
        id: &ConstraintId,
        unit: &ConstraintUnit,
        consumer: &Consumer,
        context: &RegisterContext,
        currently_running: u32,
        admission: Admission<'_>,
    ) -> Result<RegisterOutcome, RegistryError>;

    /// `(consumer_id, unit, BLOCKED) → ACTIVE`.
    ///
    /// Returns true when the record is ACTIVE afterwards, whether this call
    /// or an earlier one performed the transition.
    fn consumer_unblocked(
        &self,
        id: &ConstraintId,
        unit: &ConstraintUnit,
        consumer_id: &ConsumerId,
        context: &TransitionContext,
    ) -> Result<bool, RegistryError>;

    /// `(consumer_id, unit, ACTIVE) → FINISHED`.
    ///
    /// Returns whether this call performed the transition.
    fn consumer_finished(
        &self,
        id: &ConstraintId,
        unit: &ConstraintUnit,
        consumer_id: &ConsumerId,
        context: &TransitionContext,
    ) -> Result<bool, RegistryError>;
}
