// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persisted catalog and consumer records

use crate::constraint::{Constraint, ConstraintId, ConstraintSpec, ConstraintUnit, Strategy};
use crate::consumer::{Consumer, ConsumerId, ConsumerState};
use crate::scope::{HoldingScope, ReleaseScope, UnhandledScope};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A named, account-owned resource constraint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceConstraint {
    pub id: ConstraintId,
    pub account_id: String,
    /// Unique within the account
    pub name: String,
    pub capacity: u32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub unit_capacity: BTreeMap<String, u32>,
    #[serde(default)]
    pub strategy: Strategy,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ResourceConstraint {
    pub fn new(
        id: ConstraintId,
        account_id: impl Into<String>,
        name: impl Into<String>,
        spec: ConstraintSpec,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            account_id: account_id.into(),
            name: name.into(),
            capacity: spec.limits,
            unit_capacity: spec.unit_limits,
            strategy: spec.strategy,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn spec(&self) -> ConstraintSpec {
        ConstraintSpec {
            limits: self.capacity,
            unit_limits: self.unit_capacity.clone(),
            strategy: self.strategy,
        }
    }

    /// The algorithmic view used for admission
    pub fn to_constraint(&self) -> Constraint {
        Constraint::new(self.id.clone(), self.spec())
    }
}

/// Persisted state of one acquisition attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerRecord {
    pub id: ConsumerId,
    #[serde(default)]
    pub app_id: String,
    pub constraint_id: ConstraintId,
    pub unit: ConstraintUnit,
    pub permits: u32,
    pub state: ConsumerState,
    pub order: u64,
    /// Holding scope as text; see [`crate::scope`]
    pub release_entity_type: String,
    pub release_entity_id: String,
    pub registered_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acquired_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl ConsumerRecord {
    /// Build the record for a consumer entering `state` at `now`
    pub fn new(
        constraint_id: ConstraintId,
        unit: ConstraintUnit,
        consumer: &Consumer,
        app_id: impl Into<String>,
        state: ConsumerState,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: consumer.id.clone(),
            app_id: app_id.into(),
            constraint_id,
            unit,
            permits: consumer.permits,
            state,
            order: consumer.order,
            release_entity_type: consumer.release.entity_type.clone(),
            release_entity_id: consumer.release.entity_id.clone(),
            registered_at: now,
            acquired_at: (state == ConsumerState::Active).then_some(now),
            finished_at: None,
        }
    }

    pub fn release(&self) -> ReleaseScope {
        ReleaseScope::raw(&self.release_entity_type, &self.release_entity_id)
    }

    pub fn holding_scope(&self) -> Result<HoldingScope, UnhandledScope> {
        self.release_entity_type.parse()
    }

    pub fn to_consumer(&self) -> Consumer {
        Consumer {
            id: self.id.clone(),
            permits: self.permits,
            state: self.state,
            order: self.order,
            release: self.release(),
        }
    }
}

/// Active holders of one constraint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceConstraintUsage {
    pub resource_constraint_id: ConstraintId,
    pub active_scopes: Vec<ActiveScope>,
}

impl ResourceConstraintUsage {
    /// Permits held on `unit`
    pub fn used_permits(&self, unit: &ConstraintUnit) -> u32 {
        self.active_scopes
            .iter()
            .filter(|s| &s.unit == unit)
            .map(|s| s.permits)
            .sum()
    }
}

/// One ACTIVE holder as reported by usage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveScope {
    pub release_entity_type: String,
    pub release_entity_id: String,
    /// Display name of the release entity; empty when it no longer exists
    pub release_entity_name: String,
    pub unit: ConstraintUnit,
    pub permits: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acquired_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
#[path = "resource_tests.rs"]
mod tests;
