// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Materialized state from WAL replay

use crate::operation::Operation;
use rc_core::{
    ConstraintId, ConstraintUnit, ConsumerFilter, ConsumerId, ConsumerInput, ConsumerRecord,
    ConsumerState, ResourceConstraint,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Constraints and consumer records built from journaled operations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterializedState {
    pub constraints: BTreeMap<ConstraintId, ResourceConstraint>,
    pub consumers: HashMap<ConsumerId, ConsumerRecord>,
    /// Highest order ever assigned per constraint; survives purges
    #[serde(default)]
    max_orders: HashMap<ConstraintId, u64>,
}

impl MaterializedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an operation to update the state
    pub fn apply(&mut self, op: &Operation) {
        match op {
            Operation::ConstraintSaved { constraint } | Operation::ConstraintUpdated { constraint } => {
                self.constraints
                    .insert(constraint.id.clone(), constraint.clone());
            }

            Operation::ConstraintDeleted { id } => {
                self.constraints.remove(id);
            }

            Operation::ConsumerRegistered { record } => {
                let max = self.max_orders.entry(record.constraint_id.clone()).or_default();
                *max = (*max).max(record.order);
                self.consumers
                    .entry(record.id.clone())
                    .or_insert_with(|| record.clone());
            }

            Operation::ConsumerUnblocked { id, at } => {
                if let Some(record) = self.consumers.get_mut(id) {
                    if let Some(next) = record.state.transition(ConsumerInput::Unblock) {
                        record.state = next;
                        record.acquired_at = Some(*at);
                    }
                }
            }

            Operation::ConsumerFinished { id, at } => {
                if let Some(record) = self.consumers.get_mut(id) {
                    if let Some(next) = record.state.transition(ConsumerInput::Finish) {
                        record.state = next;
                        record.finished_at = Some(*at);
                    }
                }
            }

            Operation::ConsumersPurged { ids } => {
                for id in ids {
                    if self
                        .consumers
                        .get(id)
                        .is_some_and(|r| r.state == ConsumerState::Finished)
                    {
                        self.consumers.remove(id);
                    }
                }
            }
        }
    }

    pub fn constraint(&self, id: &ConstraintId) -> Option<&ResourceConstraint> {
        self.constraints.get(id)
    }

    pub fn constraint_named(&self, account_id: &str, name: &str) -> Option<&ResourceConstraint> {
        self.constraints
            .values()
            .find(|c| c.account_id == account_id && c.name == name)
    }

    pub fn consumer(&self, id: &ConsumerId) -> Option<&ConsumerRecord> {
        self.consumers.get(id)
    }

    /// Non-finished consumers of a unit, ascending by order
    pub fn consumers_for_unit(
        &self,
        id: &ConstraintId,
        unit: &ConstraintUnit,
    ) -> Vec<&ConsumerRecord> {
        let mut records: Vec<_> = self
            .consumers
            .values()
            .filter(|r| &r.constraint_id == id && &r.unit == unit && !r.state.is_terminal())
            .collect();
        records.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
        records
    }

    /// Permits held by ACTIVE consumers of a unit
    pub fn active_permits(&self, id: &ConstraintId, unit: &ConstraintUnit) -> u32 {
        self.consumers
            .values()
            .filter(|r| &r.constraint_id == id && &r.unit == unit && r.state == ConsumerState::Active)
            .fold(0u32, |acc, r| acc.saturating_add(r.permits))
    }

    pub fn max_order(&self, id: &ConstraintId) -> u64 {
        self.max_orders.get(id).copied().unwrap_or(0)
    }

    /// Units of a constraint with at least one non-finished consumer
    pub fn units(&self, id: &ConstraintId) -> BTreeSet<ConstraintUnit> {
        self.consumers
            .values()
            .filter(|r| &r.constraint_id == id && !r.state.is_terminal())
            .map(|r| r.unit.clone())
            .collect()
    }

    /// Records matching `filter`, ascending by `(constraint, unit, order)`
    pub fn records(&self, filter: &ConsumerFilter) -> Vec<ConsumerRecord> {
        let mut records: Vec<_> = self
            .consumers
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            (&a.constraint_id, &a.unit, a.order, &a.id).cmp(&(&b.constraint_id, &b.unit, b.order, &b.id))
        });
        records
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
