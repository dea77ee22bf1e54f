// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Constraints and the admission algorithm
//!
//! A constraint is a weighted counting semaphore partitioned into units.
//! Selection is a pure function over a unit's consumers; the registry only
//! supplies the consumers and applies the resulting transitions.

use crate::consumer::{Consumer, ConsumerId, ConsumerState};
use crate::registry::{
    ConstraintRegistry, RegisterContext, RegisterOutcome, RegistryError, TransitionContext,
};
use crate::scope::ScopePolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Opaque constraint identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConstraintId(pub String);

impl ConstraintId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConstraintId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConstraintId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Sub-partition of a constraint's capacity (e.g. an environment id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConstraintUnit(pub String);

impl ConstraintUnit {
    pub fn new(unit: impl Into<String>) -> Self {
        Self(unit.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConstraintUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConstraintUnit {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// How blocked consumers that do not fit affect the ones behind them
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Strategy {
    /// Admit in order; a consumer that does not fit holds back later
    /// consumers of other release entities
    #[default]
    Fifo,
    /// Admit every consumer that fits, in order
    Asap,
}

/// Capacity specification of a constraint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintSpec {
    /// Permit capacity of every unit without an override
    pub limits: u32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub unit_limits: BTreeMap<String, u32>,
    #[serde(default)]
    pub strategy: Strategy,
}

impl ConstraintSpec {
    pub fn new(limits: u32) -> Self {
        Self {
            limits,
            unit_limits: BTreeMap::new(),
            strategy: Strategy::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_unit_limit(mut self, unit: impl Into<String>, limit: u32) -> Self {
        self.unit_limits.insert(unit.into(), limit);
        self
    }

    /// Capacity ceiling of a unit
    pub fn limit_for(&self, unit: &ConstraintUnit) -> u32 {
        self.unit_limits
            .get(unit.as_str())
            .copied()
            .unwrap_or(self.limits)
    }
}

/// Consumers selected for admission on one unit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunnableConsumers {
    /// Permits held by ACTIVE consumers before selection
    pub used_permits: u32,
    /// Admissible BLOCKED consumers, ascending by order
    pub consumer_ids: Vec<ConsumerId>,
}

/// A constraint as the admission algorithm sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    pub id: ConstraintId,
    pub spec: ConstraintSpec,
}

impl Constraint {
    pub fn new(id: impl Into<ConstraintId>, spec: ConstraintSpec) -> Self {
        Self {
            id: id.into(),
            spec,
        }
    }

    pub fn capacity(&self, unit: &ConstraintUnit) -> u32 {
        self.spec.limit_for(unit)
    }

    /// Select the BLOCKED consumers of `unit` that may become ACTIVE.
    ///
    /// Finished consumers in `consumers` are ignored; order of the slice does
    /// not matter.
    pub fn select_runnable(
        &self,
        unit: &ConstraintUnit,
        consumers: &[Consumer],
        policy: &dyn ScopePolicy,
    ) -> RunnableConsumers {
        let mut line: Vec<&Consumer> = consumers
            .iter()
            .filter(|c| !c.state.is_terminal())
            .collect();
        line.sort_by_key(|c| c.order);
        self.select_in_line(unit, &line, policy)
    }

    /// Walk a line of non-finished consumers that is already in order
    fn select_in_line(
        &self,
        unit: &ConstraintUnit,
        line: &[&Consumer],
        policy: &dyn ScopePolicy,
    ) -> RunnableConsumers {
        let capacity = self.capacity(unit);
        let used_permits = line
            .iter()
            .filter(|c| c.is_active())
            .fold(0u32, |acc, c| acc.saturating_add(c.permits));

        let mut used = used_permits;
        let mut barriers: Vec<&Consumer> = Vec::new();
        let mut consumer_ids = Vec::new();

        for consumer in line.iter().filter(|c| c.is_blocked()) {
            // Left behind by a capacity decrease; cannot be admitted until the
            // capacity grows again and must not hold anyone else back.
            if consumer.permits > capacity {
                tracing::debug!(
                    constraint_id = %self.id,
                    %unit,
                    consumer_id = %consumer.id,
                    permits = consumer.permits,
                    capacity,
                    "consumer exceeds unit capacity"
                );
                continue;
            }

            let fits = used.saturating_add(consumer.permits) <= capacity;
            let unobstructed = barriers
                .iter()
                .all(|barrier| policy.overlapping_scope(barrier, consumer));

            if fits && unobstructed {
                used += consumer.permits;
                consumer_ids.push(consumer.id.clone());
            } else if self.spec.strategy == Strategy::Fifo {
                barriers.push(consumer);
            }
        }

        RunnableConsumers {
            used_permits,
            consumer_ids,
        }
    }

    /// Initial state of `candidate` joining the end of the unit's line
    pub fn admission_state(
        &self,
        unit: &ConstraintUnit,
        existing: &[Consumer],
        candidate: &Consumer,
        policy: &dyn ScopePolicy,
    ) -> ConsumerState {
        let mut line: Vec<&Consumer> = existing
            .iter()
            .filter(|c| !c.state.is_terminal() && c.id != candidate.id)
            .collect();
        line.sort_by_key(|c| c.order);

        let waiting = candidate.clone().with_state(ConsumerState::Blocked);
        line.push(&waiting);

        let runnable = self.select_in_line(unit, &line, policy);
        if runnable.consumer_ids.contains(&candidate.id) {
            ConsumerState::Active
        } else {
            ConsumerState::Blocked
        }
    }

    /// Load a unit's consumers and select the admissible ones
    pub fn runnable_consumers<R: ConstraintRegistry + ?Sized>(
        &self,
        unit: &ConstraintUnit,
        registry: &R,
        policy: &dyn ScopePolicy,
    ) -> Result<RunnableConsumers, RegistryError> {
        let consumers = registry.load_consumers(&self.id, unit)?;
        Ok(self.select_runnable(unit, &consumers, policy))
    }

    /// Register a consumer on `unit`, admitting it right away when it fits.
    pub fn register_consumer<R: ConstraintRegistry + ?Sized>(
        &self,
        unit: &ConstraintUnit,
        consumer: &Consumer,
        mut context: RegisterContext,
        registry: &R,
        policy: &dyn ScopePolicy,
    ) -> Result<RegisterOutcome, RegistryError> {
        if consumer.permits == 0 {
            return Err(RegistryError::InvalidPermits {
                consumer_id: consumer.id.clone(),
            });
        }
        let limit = self.capacity(unit);
        if consumer.permits > limit {
            return Err(RegistryError::PermanentlyBlocked {
                consumer_id: consumer.id.clone(),
                unit: unit.clone(),
                permits: consumer.permits,
                limit,
            });
        }

        let currently_running = registry
            .load_consumers(&self.id, unit)?
            .iter()
            .filter(|c| c.is_active())
            .fold(0u32, |acc, c| acc.saturating_add(c.permits));

        registry.adjust_register_consumer_context(&self.id, &mut context)?;
        let candidate = consumer
            .clone()
            .with_state(ConsumerState::Blocked)
            .with_order(context.order);

        let admission = |line: &[Consumer], candidate: &Consumer| {
            self.admission_state(unit, line, candidate, policy)
        };
        let outcome = registry.register_consumer(
            &self.id,
            unit,
            &candidate,
            &context,
            currently_running,
            &admission,
        )?;

        match outcome {
            RegisterOutcome::Registered(state) => tracing::info!(
                constraint_id = %self.id,
                %unit,
                consumer_id = %consumer.id,
                permits = consumer.permits,
                currently_running,
                %state,
                "consumer registered"
            ),
            RegisterOutcome::AlreadyRegistered => tracing::debug!(
                constraint_id = %self.id,
                %unit,
                consumer_id = %consumer.id,
                "consumer already registered"
            ),
        }
        Ok(outcome)
    }

    /// Move a BLOCKED consumer to ACTIVE if the unit still has room for it
    pub fn consumer_unblocked<R: ConstraintRegistry + ?Sized>(
        &self,
        unit: &ConstraintUnit,
        consumer_id: &ConsumerId,
        context: TransitionContext,
        registry: &R,
    ) -> Result<bool, RegistryError> {
        let context = context.with_capacity(self.capacity(unit));
        registry.consumer_unblocked(&self.id, unit, consumer_id, &context)
    }

    /// Move an ACTIVE consumer to FINISHED
    pub fn consumer_finished<R: ConstraintRegistry + ?Sized>(
        &self,
        unit: &ConstraintUnit,
        consumer_id: &ConsumerId,
        context: TransitionContext,
        registry: &R,
    ) -> Result<bool, RegistryError> {
        registry.consumer_finished(&self.id, unit, consumer_id, &context)
    }
}

#[cfg(test)]
#[path = "constraint_tests.rs"]
mod tests;
