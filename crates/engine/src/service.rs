// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resource constraint service
//!
//! The entry point callers and the reconciler share: the constraint catalog,
//! consumer registration, and the two passes that finish released holds and
//! admit waiting consumers. Every state change goes through the store's
//! conditional updates, so any number of services may run against one
//! journal.

use crate::error::{PassFailure, ServiceError};
use chrono::{DateTime, Utc};
use rc_adapters::{ExecutionAdapter, TracedExecutionAdapter, TracedWakeNotifier, WakeNotifier};
use rc_core::{
    ActiveScope, Clock, Constraint, ConstraintCatalog, ConstraintId, ConstraintRegistry,
    ConstraintSpec, ConstraintUnit, Consumer, ConsumerFilter, ConsumerId, ConsumerRecord,
    HoldingScope, IdGen, RegisterContext, RegistryError, ReleaseEntityPolicy, ReleaseScope,
    ResourceConstraint, ResourceConstraintUsage, ScopePolicy, StoreConfig, Strategy, SystemClock,
    TransitionContext, UuidIdGen,
};
use rc_storage::ConstraintStore;
use std::collections::{BTreeMap, BTreeSet};

/// Service collaborator dependencies
pub struct ServiceDeps<S, P, E, N> {
    pub store: S,
    pub policy: P,
    pub executions: E,
    pub notifier: N,
}

/// A request to hold permits of one unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterRequest {
    pub constraint_id: ConstraintId,
    pub unit: ConstraintUnit,
    /// Idempotency key of the request
    pub consumer_id: ConsumerId,
    pub permits: u32,
    pub holding_scope: HoldingScope,
    pub release_entity_id: String,
    pub app_id: String,
}

impl RegisterRequest {
    pub fn new(
        constraint_id: impl Into<ConstraintId>,
        unit: impl Into<ConstraintUnit>,
        consumer_id: impl Into<ConsumerId>,
        permits: u32,
        holding_scope: HoldingScope,
        release_entity_id: impl Into<String>,
    ) -> Self {
        Self {
            constraint_id: constraint_id.into(),
            unit: unit.into(),
            consumer_id: consumer_id.into(),
            permits,
            holding_scope,
            release_entity_id: release_entity_id.into(),
            app_id: String::new(),
        }
    }

    pub fn with_app(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = app_id.into();
        self
    }
}

/// Outcome of [`ResourceConstraintService::update_active_constraints`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivePass {
    /// Constraints that had at least one consumer finished by this pass
    pub constraint_ids: BTreeSet<ConstraintId>,
    pub finished: Vec<ConsumerId>,
    pub failures: Vec<PassFailure>,
}

/// Production wiring: journaled store, traced adapters, system clock
pub type DefaultService<E, N> = ResourceConstraintService<
    ConstraintStore,
    ReleaseEntityPolicy,
    TracedExecutionAdapter<E>,
    TracedWakeNotifier<N>,
    SystemClock,
    UuidIdGen,
>;

impl<E: ExecutionAdapter, N: WakeNotifier> DefaultService<E, N> {
    /// Open the configured store and wrap the adapters in tracing
    pub fn open(config: &StoreConfig, executions: E, notifier: N) -> Result<Self, ServiceError> {
        let store = ConstraintStore::from_config(config)?;
        let deps = ServiceDeps {
            store,
            policy: ReleaseEntityPolicy,
            executions: TracedExecutionAdapter::new(executions),
            notifier: TracedWakeNotifier::new(notifier),
        };
        Ok(Self::new(deps, SystemClock, UuidIdGen))
    }
}

/// Admission and reconciliation over a constraint store
pub struct ResourceConstraintService<S, P, E, N, C: Clock, I: IdGen> {
    store: S,
    policy: P,
    executions: E,
    notifier: N,
    clock: C,
    id_gen: I,
}

impl<S, P, E, N, C, I> ResourceConstraintService<S, P, E, N, C, I>
where
    S: ConstraintRegistry + ConstraintCatalog,
    P: ScopePolicy,
    E: ExecutionAdapter,
    N: WakeNotifier,
    C: Clock,
    I: IdGen,
{
    pub fn new(deps: ServiceDeps<S, P, E, N>, clock: C, id_gen: I) -> Self {
        Self {
            store: deps.store,
            policy: deps.policy,
            executions: deps.executions,
            notifier: deps.notifier,
            clock,
            id_gen,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // === Catalog ===

    /// Create a constraint with a fresh id
    pub fn create_constraint(
        &self,
        account_id: &str,
        name: &str,
        spec: ConstraintSpec,
    ) -> Result<ResourceConstraint, ServiceError> {
        let constraint = ResourceConstraint::new(
            self.id_gen.constraint_id(),
            account_id,
            name,
            spec,
            self.clock.now(),
        );
        self.save(constraint)
    }

    /// Persist a new constraint; the name must be unused in its account
    pub fn save(&self, constraint: ResourceConstraint) -> Result<ResourceConstraint, ServiceError> {
        validate(&constraint)?;
        let saved = self.store.save_constraint(constraint)?;
        tracing::info!(
            constraint_id = %saved.id,
            account_id = %saved.account_id,
            name = %saved.name,
            capacity = saved.capacity,
            strategy = ?saved.strategy,
            "resource constraint created"
        );
        Ok(saved)
    }

    pub fn list(&self, account_id: Option<&str>) -> Result<Vec<ResourceConstraint>, ServiceError> {
        Ok(self.store.list_constraints(account_id)?)
    }

    /// `None` also when the constraint belongs to another account
    pub fn get(
        &self,
        account_id: Option<&str>,
        id: &ConstraintId,
    ) -> Result<Option<ResourceConstraint>, ServiceError> {
        let constraint = self.store.get_constraint(id)?;
        Ok(constraint.filter(|c| account_id.map_or(true, |account| c.account_id == account)))
    }

    /// Change capacity, strategy or name.
    ///
    /// Waiting consumers pick up a raised capacity on the next pass that
    /// visits the constraint.
    pub fn update(
        &self,
        constraint: ResourceConstraint,
    ) -> Result<ResourceConstraint, ServiceError> {
        validate(&constraint)?;
        let updated = self.store.update_constraint(constraint)?;
        tracing::info!(
            constraint_id = %updated.id,
            capacity = updated.capacity,
            strategy = ?updated.strategy,
            "resource constraint updated"
        );
        Ok(updated)
    }

    /// Delete a constraint owned by `account_id`; returns whether it existed
    pub fn delete(&self, account_id: &str, id: &ConstraintId) -> Result<bool, ServiceError> {
        match self.store.get_constraint(id)? {
            None => Ok(false),
            Some(constraint) if constraint.account_id != account_id => {
                tracing::error!(
                    constraint_id = %id,
                    account_id,
                    owner = %constraint.account_id,
                    "refusing to delete constraint of another account"
                );
                Ok(false)
            }
            Some(_) => {
                let removed = self.store.delete_constraint(id)?;
                if removed {
                    tracing::info!(constraint_id = %id, account_id, "resource constraint deleted");
                }
                Ok(removed)
            }
        }
    }

    pub fn delete_by_account(&self, account_id: &str) -> Result<usize, ServiceError> {
        let removed = self.store.delete_constraints_by_account(account_id)?;
        tracing::info!(account_id, removed, "account constraints deleted");
        Ok(removed)
    }

    /// The algorithmic view of a persisted constraint
    pub fn create_abstraction(&self, constraint: &ResourceConstraint) -> Constraint {
        constraint.to_constraint()
    }

    pub fn get_max_order(&self, id: &ConstraintId) -> Result<u64, ServiceError> {
        Ok(self.store.max_order(id)?)
    }

    // === Admission ===

    /// Register a consumer; true when it was admitted straight to ACTIVE.
    ///
    /// A repeated consumer id returns false and changes nothing. A caller
    /// that gets false for a fresh id waits for the consumer's wake.
    pub fn register(&self, request: RegisterRequest) -> Result<bool, ServiceError> {
        let constraint = self.store.load(&request.constraint_id)?;
        let consumer = Consumer::new(
            request.consumer_id,
            request.permits,
            ReleaseScope::new(request.holding_scope, request.release_entity_id),
        );
        let outcome = constraint.register_consumer(
            &request.unit,
            &consumer,
            RegisterContext::new(request.app_id),
            &self.store,
            &self.policy,
        )?;
        Ok(outcome.admitted())
    }

    // === Reconciliation ===

    /// Finish ACTIVE consumers whose release entity has ended or vanished.
    ///
    /// A consumer that cannot be resolved is reported in the pass and left
    /// ACTIVE; storage errors abort the pass.
    pub async fn update_active_constraints(
        &self,
        app_id: Option<&str>,
        release_entity_id: Option<&str>,
    ) -> Result<ActivePass, ServiceError> {
        let mut filter = ConsumerFilter::active();
        if let Some(app_id) = app_id {
            filter = filter.with_app(app_id);
        }
        if let Some(entity_id) = release_entity_id {
            filter = filter.with_release_entity(entity_id);
        }

        let mut pass = ActivePass::default();
        for record in self.store.scan_consumers(&filter)? {
            let scope = match record.holding_scope() {
                Ok(scope) => scope,
                Err(e) => {
                    tracing::error!(
                        constraint_id = %record.constraint_id,
                        consumer_id = %record.id,
                        error = %e,
                        "cannot release consumer"
                    );
                    pass.failures
                        .push(PassFailure::new(&record.constraint_id, &record.id, e));
                    continue;
                }
            };

            let released = match self
                .executions
                .execution(&record.app_id, scope, &record.release_entity_id)
                .await
            {
                Ok(None) => true,
                Ok(Some(info)) => info.status.is_final(),
                Err(e) => {
                    tracing::warn!(
                        constraint_id = %record.constraint_id,
                        consumer_id = %record.id,
                        error = %e,
                        "release entity lookup failed"
                    );
                    pass.failures
                        .push(PassFailure::new(&record.constraint_id, &record.id, e));
                    continue;
                }
            };
            if !released {
                continue;
            }

            let context = TransitionContext::new().with_app(record.app_id.clone());
            if self
                .store
                .consumer_finished(&record.constraint_id, &record.unit, &record.id, &context)?
            {
                tracing::info!(
                    constraint_id = %record.constraint_id,
                    unit = %record.unit,
                    consumer_id = %record.id,
                    release_entity_id = %record.release_entity_id,
                    "consumer finished"
                );
                pass.constraint_ids.insert(record.constraint_id.clone());
                pass.finished.push(record.id);
            } else {
                tracing::debug!(consumer_id = %record.id, "consumer already finished");
            }
        }
        Ok(pass)
    }

    /// Constraints with a unit whose line admits at least one waiting
    /// consumer right now.
    ///
    /// Picks up permits freed by a pass that died between finishing and
    /// admitting, as well as capacity raised since the last pass.
    pub fn select_blocked_constraints(&self) -> Result<BTreeSet<ConstraintId>, ServiceError> {
        let records = self.store.scan_consumers(&ConsumerFilter::unfinished())?;

        let mut lines: BTreeMap<(&ConstraintId, &ConstraintUnit), Vec<Consumer>> = BTreeMap::new();
        for record in &records {
            lines
                .entry((&record.constraint_id, &record.unit))
                .or_default()
                .push(record.to_consumer());
        }

        let mut selected = BTreeSet::new();
        for ((id, unit), line) in lines {
            if selected.contains(id) || !line.iter().any(Consumer::is_blocked) {
                continue;
            }
            let constraint = match self.store.load(id) {
                Ok(constraint) => constraint,
                Err(RegistryError::ConstraintNotFound(_)) => continue,
                Err(e) => return Err(e.into()),
            };
            let runnable = constraint.select_runnable(unit, &line, &self.policy);
            if !runnable.consumer_ids.is_empty() {
                tracing::debug!(
                    constraint_id = %id,
                    %unit,
                    used_permits = runnable.used_permits,
                    "waiting consumers admissible"
                );
                selected.insert(id.clone());
            }
        }
        Ok(selected)
    }

    /// Admit waiting consumers of the given constraints, in order.
    ///
    /// Returns the consumers confirmed ACTIVE, each of which was woken.
    pub async fn update_blocked_constraints(
        &self,
        ids: &BTreeSet<ConstraintId>,
    ) -> Result<Vec<ConsumerId>, ServiceError> {
        let mut unblocked = Vec::new();
        for id in ids {
            let constraint = match self.store.load(id) {
                Ok(constraint) => constraint,
                Err(RegistryError::ConstraintNotFound(_)) => {
                    tracing::warn!(constraint_id = %id, "constraint deleted with consumers waiting");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            for unit in self.store.active_units(id)? {
                let runnable = constraint.runnable_consumers(&unit, &self.store, &self.policy)?;
                for consumer_id in runnable.consumer_ids {
                    let admitted = constraint.consumer_unblocked(
                        &unit,
                        &consumer_id,
                        TransitionContext::new(),
                        &self.store,
                    )?;
                    if !admitted {
                        tracing::debug!(
                            constraint_id = %id,
                            %unit,
                            %consumer_id,
                            "consumer no longer admissible"
                        );
                        // A later consumer may still fit only when nobody
                        // queues behind the one that failed
                        match constraint.spec.strategy {
                            Strategy::Asap => continue,
                            Strategy::Fifo => break,
                        }
                    }

                    tracing::info!(
                        constraint_id = %id,
                        %unit,
                        %consumer_id,
                        used_permits = runnable.used_permits,
                        "consumer unblocked"
                    );
                    if let Err(e) = self.notifier.wake(&consumer_id).await {
                        tracing::warn!(%consumer_id, error = %e, "wake not delivered");
                    }
                    unblocked.push(consumer_id);
                }
            }
        }
        Ok(unblocked)
    }

    // === Reporting ===

    /// ACTIVE holders of each constraint the account owns, by constraint id.
    ///
    /// Ids of other accounts or of missing constraints are left out.
    pub async fn usage(
        &self,
        account_id: &str,
        ids: &[ConstraintId],
    ) -> Result<Vec<ResourceConstraintUsage>, ServiceError> {
        let mut holders: BTreeMap<ConstraintId, Vec<ActiveScope>> = BTreeMap::new();
        for id in ids {
            if self.get(Some(account_id), id)?.is_some() {
                holders.insert(id.clone(), Vec::new());
            }
        }
        if holders.is_empty() {
            return Ok(Vec::new());
        }

        let filter = ConsumerFilter::active().with_constraints(holders.keys().cloned());
        for record in self.store.scan_consumers(&filter)? {
            let name = self.entity_name(&record).await;
            if let Some(scopes) = holders.get_mut(&record.constraint_id) {
                scopes.push(ActiveScope {
                    release_entity_type: record.release_entity_type,
                    release_entity_id: record.release_entity_id,
                    release_entity_name: name,
                    unit: record.unit,
                    permits: record.permits,
                    acquired_at: record.acquired_at,
                });
            }
        }

        Ok(holders
            .into_iter()
            .map(|(resource_constraint_id, active_scopes)| ResourceConstraintUsage {
                resource_constraint_id,
                active_scopes,
            })
            .collect())
    }

    async fn entity_name(&self, record: &ConsumerRecord) -> String {
        let scope = match record.holding_scope() {
            Ok(scope) => scope,
            Err(e) => {
                tracing::error!(consumer_id = %record.id, error = %e, "cannot name release entity");
                return String::new();
            }
        };
        match self
            .executions
            .execution(&record.app_id, scope, &record.release_entity_id)
            .await
        {
            Ok(Some(info)) => info.name,
            Ok(None) => String::new(),
            Err(e) => {
                tracing::warn!(consumer_id = %record.id, error = %e, "release entity lookup failed");
                String::new()
            }
        }
    }

    /// Drop FINISHED records older than `before`; returns how many went
    pub fn purge_finished(&self, before: DateTime<Utc>) -> Result<usize, ServiceError> {
        let purged = self.store.purge_finished(before)?;
        if !purged.is_empty() {
            tracing::info!(purged = purged.len(), %before, "finished consumers purged");
        }
        Ok(purged.len())
    }
}

fn validate(constraint: &ResourceConstraint) -> Result<(), ServiceError> {
    if constraint.name.trim().is_empty() {
        return Err(ServiceError::InvalidConstraint(
            "name must not be empty".to_string(),
        ));
    }
    if constraint.capacity == 0 {
        return Err(ServiceError::InvalidConstraint(format!(
            "{}: capacity must be at least 1",
            constraint.name
        )));
    }
    if let Some((unit, _)) = constraint.unit_capacity.iter().find(|(_, limit)| **limit == 0) {
        return Err(ServiceError::InvalidConstraint(format!(
            "{}: unit {unit} capacity must be at least 1",
            constraint.name
        )));
    }
    Ok(())
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
