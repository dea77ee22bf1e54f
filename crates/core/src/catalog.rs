// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Catalog port: constraint CRUD and consumer scans

use crate::constraint::{ConstraintId, ConstraintUnit};
use crate::consumer::{ConsumerId, ConsumerState};
use crate::registry::RegistryError;
use crate::resource::{ConsumerRecord, ResourceConstraint};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

/// Selects consumer records in a scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumerFilter {
    /// Empty matches every state
    pub states: Vec<ConsumerState>,
    pub constraint_ids: Option<BTreeSet<ConstraintId>>,
    pub app_id: Option<String>,
    pub release_entity_id: Option<String>,
}

impl ConsumerFilter {
    pub fn active() -> Self {
        Self {
            states: vec![ConsumerState::Active],
            ..Self::default()
        }
    }

    pub fn unfinished() -> Self {
        Self {
            states: vec![ConsumerState::Blocked, ConsumerState::Active],
            ..Self::default()
        }
    }

    pub fn with_constraints(mut self, ids: impl IntoIterator<Item = ConstraintId>) -> Self {
        self.constraint_ids = Some(ids.into_iter().collect());
        self
    }

    pub fn with_app(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }

    pub fn with_release_entity(mut self, entity_id: impl Into<String>) -> Self {
        self.release_entity_id = Some(entity_id.into());
        self
    }

    pub fn matches(&self, record: &ConsumerRecord) -> bool {
        if !self.states.is_empty() && !self.states.contains(&record.state) {
            return false;
        }
        if let Some(ids) = &self.constraint_ids {
            if !ids.contains(&record.constraint_id) {
                return false;
            }
        }
        if let Some(app_id) = &self.app_id {
            if &record.app_id != app_id {
                return false;
            }
        }
        if let Some(entity_id) = &self.release_entity_id {
            if &record.release_entity_id != entity_id {
                return false;
            }
        }
        true
    }
}

/// Constraint catalog and consumer scans
pub trait ConstraintCatalog: Send + Sync {
    /// Create a constraint; its name must be unique within the account
    fn save_constraint(
        &self,
        constraint: ResourceConstraint,
    ) -> Result<ResourceConstraint, RegistryError>;

    /// Replace an existing constraint's capacity, strategy and name
    fn update_constraint(
        &self,
        constraint: ResourceConstraint,
    ) -> Result<ResourceConstraint, RegistryError>;

    fn get_constraint(&self, id: &ConstraintId)
        -> Result<Option<ResourceConstraint>, RegistryError>;

    /// Constraints of one account, or all when `account_id` is `None`
    fn list_constraints(
        &self,
        account_id: Option<&str>,
    ) -> Result<Vec<ResourceConstraint>, RegistryError>;

    /// Returns whether a constraint was removed
    fn delete_constraint(&self, id: &ConstraintId) -> Result<bool, RegistryError>;

    /// Returns the number of constraints removed
    fn delete_constraints_by_account(&self, account_id: &str) -> Result<usize, RegistryError>;

    /// Records matching `filter`, ascending by `(constraint, unit, order)`
    fn scan_consumers(&self, filter: &ConsumerFilter)
        -> Result<Vec<ConsumerRecord>, RegistryError>;

    /// Units of a constraint with at least one non-finished consumer
    fn active_units(&self, id: &ConstraintId) -> Result<BTreeSet<ConstraintUnit>, RegistryError>;

    /// Drop FINISHED records that finished before `before`
    fn purge_finished(&self, before: DateTime<Utc>) -> Result<Vec<ConsumerId>, RegistryError>;
}
