// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Constraint store
//!
//! Implements the registry and catalog ports over a [`MaterializedState`],
//! either purely in memory or journaled to a [`Wal`] that several processes
//! may share. Each mutation evaluates its condition and appends its outcome
//! under one critical section, so concurrent callers (threads or processes)
//! never both win the same transition.

use crate::error::StoreError;
use crate::operation::Operation;
use crate::state::MaterializedState;
use crate::wal::Wal;
use chrono::{DateTime, Utc};
use rc_core::{
    Admission, Clock, Constraint, ConstraintCatalog, ConstraintId, ConstraintRegistry,
    ConstraintUnit, Consumer, ConsumerFilter, ConsumerId, ConsumerInput, ConsumerRecord,
    ConsumerState, RegisterContext, RegisterOutcome, RegistryError, ResourceConstraint, StoreConfig,
    SystemClock, TransitionContext,
};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

struct Inner {
    state: MaterializedState,
    journal: Option<Wal>,
}

/// Persisted constraint registry
#[derive(Clone)]
pub struct ConstraintStore<C: Clock = SystemClock> {
    inner: Arc<Mutex<Inner>>,
    clock: C,
}

impl ConstraintStore<SystemClock> {
    pub fn in_memory() -> Self {
        Self::in_memory_with_clock(SystemClock)
    }

    pub fn open(dir: &Path, machine_id: &str) -> Result<Self, StoreError> {
        Self::open_with_clock(dir, machine_id, SystemClock)
    }

    pub fn from_config(config: &StoreConfig) -> Result<Self, StoreError> {
        match &config.path {
            Some(dir) => {
                let wal = Wal::open(dir, &config.machine_id)?
                    .with_compaction_threshold(config.compaction_threshold);
                Self::journaled(wal, SystemClock)
            }
            None => Ok(Self::in_memory()),
        }
    }
}

impl<C: Clock> ConstraintStore<C> {
    pub fn in_memory_with_clock(clock: C) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: MaterializedState::new(),
                journal: None,
            })),
            clock,
        }
    }

    /// Open the journal in `dir`, replaying everything committed so far
    pub fn open_with_clock(dir: &Path, machine_id: &str, clock: C) -> Result<Self, StoreError> {
        Self::journaled(Wal::open(dir, machine_id)?, clock)
    }

    fn journaled(mut wal: Wal, clock: C) -> Result<Self, StoreError> {
        let mut state = MaterializedState::new();
        let replayed = wal.refresh(&mut state)?;
        tracing::info!(
            path = %wal.path().display(),
            generation = wal.generation(),
            replayed,
            constraints = state.constraints.len(),
            consumers = state.consumers.len(),
            "constraint store opened"
        );

        Ok(Self {
            inner: Arc::new(Mutex::new(Inner {
                state,
                journal: Some(wal),
            })),
            clock,
        })
    }

    /// Fold the journal into a snapshot now; false for an in-memory store
    pub fn compact(&self) -> Result<bool, StoreError> {
        let now = self.clock.now();
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let Inner { state, journal } = &mut *inner;
        match journal {
            Some(wal) => {
                wal.compact(state, now)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// A copy of the current state
    pub fn snapshot(&self) -> Result<MaterializedState, StoreError> {
        self.read(|state| state.clone())
    }

    fn read<T>(&self, f: impl FnOnce(&MaterializedState) -> T) -> Result<T, StoreError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let Inner { state, journal } = &mut *inner;
        if let Some(wal) = journal {
            wal.refresh(state)?;
        }
        Ok(f(state))
    }

    fn write<T>(
        &self,
        decide: impl FnOnce(&MaterializedState) -> Result<(Vec<Operation>, T), RegistryError>,
    ) -> Result<T, RegistryError> {
        let now = self.clock.now();
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let Inner { state, journal } = &mut *inner;
        match journal {
            Some(wal) => wal.transact(state, now, decide),
            None => {
                let (ops, out) = decide(state)?;
                for op in &ops {
                    state.apply(op);
                }
                Ok(out)
            }
        }
    }
}

fn transition_matches(
    record: &ConsumerRecord,
    id: &ConstraintId,
    unit: &ConstraintUnit,
    context: &TransitionContext,
) -> bool {
    &record.constraint_id == id
        && &record.unit == unit
        && context
            .app_id
            .as_ref()
            .is_none_or(|app_id| &record.app_id == app_id)
}

impl<C: Clock> ConstraintRegistry for ConstraintStore<C> {
    fn load(&self, id: &ConstraintId) -> Result<Constraint, RegistryError> {
        self.read(|s| s.constraint(id).map(ResourceConstraint::to_constraint))?
            .ok_or_else(|| RegistryError::ConstraintNotFound(id.clone()))
    }

    fn load_consumers(
        &self,
        id: &ConstraintId,
        unit: &ConstraintUnit,
    ) -> Result<Vec<Consumer>, RegistryError> {
        Ok(self.read(|s| {
            s.consumers_for_unit(id, unit)
                .into_iter()
                .map(ConsumerRecord::to_consumer)
                .collect()
        })?)
    }

    fn max_order(&self, id: &ConstraintId) -> Result<u64, RegistryError> {
        Ok(self.read(|s| s.max_order(id))?)
    }

    fn register_consumer(
        &self,
        id: &ConstraintId,
        unit: &ConstraintUnit,
        consumer: &Consumer,
        context: &RegisterContext,
        currently_running: u32,
        admission: Admission<'_>,
    ) -> Result<RegisterOutcome, RegistryError> {
        let now = self.clock.now();
        self.write(|s| {
            if s.consumer(&consumer.id).is_some() {
                return Ok((Vec::new(), RegisterOutcome::AlreadyRegistered));
            }
            if s.constraint(id).is_none() {
                return Err(RegistryError::ConstraintNotFound(id.clone()));
            }

            // Another registration may have claimed the proposed order since
            // it was read.
            let order = context.order.max(s.max_order(id) + 1);
            if order != context.order {
                tracing::debug!(
                    constraint_id = %id,
                    consumer_id = %consumer.id,
                    proposed = context.order,
                    order,
                    "raised consumer order"
                );
            }
            let candidate = consumer.clone().with_order(order);

            let line: Vec<Consumer> = s
                .consumers_for_unit(id, unit)
                .into_iter()
                .map(ConsumerRecord::to_consumer)
                .collect();
            let state = admission(line.as_slice(), &candidate);
            let used = s.active_permits(id, unit);
            if used != currently_running {
                tracing::debug!(
                    constraint_id = %id,
                    %unit,
                    currently_running,
                    used,
                    "usage changed during registration"
                );
            }

            let record = ConsumerRecord::new(
                id.clone(),
                unit.clone(),
                &candidate,
                context.app_id.clone(),
                state,
                now,
            );
            Ok((
                vec![Operation::ConsumerRegistered { record }],
                RegisterOutcome::Registered(state),
            ))
        })
    }

    fn consumer_unblocked(
        &self,
        id: &ConstraintId,
        unit: &ConstraintUnit,
        consumer_id: &ConsumerId,
        context: &TransitionContext,
    ) -> Result<bool, RegistryError> {
        let now = self.clock.now();
        self.write(|s| {
            let Some(record) = s
                .consumer(consumer_id)
                .filter(|r| transition_matches(r, id, unit, context))
            else {
                return Ok((Vec::new(), false));
            };

            if record.state.transition(ConsumerInput::Unblock).is_none() {
                // An ACTIVE record was already unblocked; FINISHED never returns
                return Ok((Vec::new(), record.state == ConsumerState::Active));
            }

            let used = s.active_permits(id, unit);
            if let Some(capacity) = context.capacity {
                if used.saturating_add(record.permits) > capacity {
                    tracing::debug!(
                        constraint_id = %id,
                        %unit,
                        %consumer_id,
                        used,
                        capacity,
                        "no room to unblock consumer"
                    );
                    return Ok((Vec::new(), false));
                }
            }
            tracing::info!(constraint_id = %id, %unit, %consumer_id, "consumer unblocked");
            Ok((
                vec![Operation::ConsumerUnblocked {
                    id: consumer_id.clone(),
                    at: now,
                }],
                true,
            ))
        })
    }

    fn consumer_finished(
        &self,
        id: &ConstraintId,
        unit: &ConstraintUnit,
        consumer_id: &ConsumerId,
        context: &TransitionContext,
    ) -> Result<bool, RegistryError> {
        let now = self.clock.now();
        self.write(|s| {
            let finishable = s
                .consumer(consumer_id)
                .filter(|r| transition_matches(r, id, unit, context))
                .is_some_and(|r| r.state.transition(ConsumerInput::Finish).is_some());
            if !finishable {
                return Ok((Vec::new(), false));
            }
            tracing::info!(constraint_id = %id, %unit, %consumer_id, "consumer finished");
            Ok((
                vec![Operation::ConsumerFinished {
                    id: consumer_id.clone(),
                    at: now,
                }],
                true,
            ))
        })
    }
}

impl<C: Clock> ConstraintCatalog for ConstraintStore<C> {
    fn save_constraint(
        &self,
        constraint: ResourceConstraint,
    ) -> Result<ResourceConstraint, RegistryError> {
        self.write(|s| {
            if s.constraint(&constraint.id).is_some() {
                return Err(RegistryError::DuplicateId(constraint.id.clone()));
            }
            if s.constraint_named(&constraint.account_id, &constraint.name).is_some() {
                return Err(RegistryError::DuplicateName {
                    account_id: constraint.account_id.clone(),
                    name: constraint.name.clone(),
                });
            }
            Ok((
                vec![Operation::ConstraintSaved {
                    constraint: constraint.clone(),
                }],
                constraint,
            ))
        })
    }

    fn update_constraint(
        &self,
        constraint: ResourceConstraint,
    ) -> Result<ResourceConstraint, RegistryError> {
        let now = self.clock.now();
        self.write(|s| {
            let Some(existing) = s.constraint(&constraint.id) else {
                return Err(RegistryError::ConstraintNotFound(constraint.id.clone()));
            };
            if s
                .constraint_named(&existing.account_id, &constraint.name)
                .is_some_and(|other| other.id != constraint.id)
            {
                return Err(RegistryError::DuplicateName {
                    account_id: existing.account_id.clone(),
                    name: constraint.name.clone(),
                });
            }
            let updated = ResourceConstraint {
                account_id: existing.account_id.clone(),
                created_at: existing.created_at,
                updated_at: now,
                ..constraint
            };
            Ok((
                vec![Operation::ConstraintUpdated {
                    constraint: updated.clone(),
                }],
                updated,
            ))
        })
    }

    fn get_constraint(
        &self,
        id: &ConstraintId,
    ) -> Result<Option<ResourceConstraint>, RegistryError> {
        Ok(self.read(|s| s.constraint(id).cloned())?)
    }

    fn list_constraints(
        &self,
        account_id: Option<&str>,
    ) -> Result<Vec<ResourceConstraint>, RegistryError> {
        let mut list: Vec<ResourceConstraint> = self.read(|s| {
            s.constraints
                .values()
                .filter(|c| account_id.is_none_or(|account| c.account_id == account))
                .cloned()
                .collect()
        })?;
        list.sort_by(|a, b| (&a.account_id, &a.name).cmp(&(&b.account_id, &b.name)));
        Ok(list)
    }

    fn delete_constraint(&self, id: &ConstraintId) -> Result<bool, RegistryError> {
        self.write(|s| {
            if s.constraint(id).is_none() {
                return Ok((Vec::new(), false));
            }
            Ok((vec![Operation::ConstraintDeleted { id: id.clone() }], true))
        })
    }

    fn delete_constraints_by_account(&self, account_id: &str) -> Result<usize, RegistryError> {
        self.write(|s| {
            let ops: Vec<Operation> = s
                .constraints
                .values()
                .filter(|c| c.account_id == account_id)
                .map(|c| Operation::ConstraintDeleted { id: c.id.clone() })
                .collect();
            let count = ops.len();
            Ok((ops, count))
        })
    }

    fn scan_consumers(
        &self,
        filter: &ConsumerFilter,
    ) -> Result<Vec<ConsumerRecord>, RegistryError> {
        Ok(self.read(|s| s.records(filter))?)
    }

    fn active_units(&self, id: &ConstraintId) -> Result<BTreeSet<ConstraintUnit>, RegistryError> {
        Ok(self.read(|s| s.units(id))?)
    }

    fn purge_finished(&self, before: DateTime<Utc>) -> Result<Vec<ConsumerId>, RegistryError> {
        self.write(|s| {
            let mut ids: Vec<ConsumerId> = s
                .consumers
                .values()
                .filter(|r| r.state == ConsumerState::Finished)
                .filter(|r| {
                    r.finished_at
                        .or(r.acquired_at)
                        .unwrap_or(r.registered_at)
                        < before
                })
                .map(|r| r.id.clone())
                .collect();
            ids.sort();
            if ids.is_empty() {
                return Ok((Vec::new(), ids));
            }
            tracing::info!(purged = ids.len(), "purging finished consumers");
            Ok((vec![Operation::ConsumersPurged { ids: ids.clone() }], ids))
        })
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
