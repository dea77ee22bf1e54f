// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reconciliation loop
//!
//! A tick finishes the holds whose release entity has ended, then admits
//! waiting consumers of every constraint that changed (plus, when sweeping,
//! every constraint with a unit where a waiter fits now). Ticks from several
//! processes may interleave freely.

use crate::error::{PassFailure, ServiceError};
use crate::service::{ActivePass, DefaultService, ResourceConstraintService};
use rc_adapters::{ExecutionAdapter, TracedExecutionAdapter, TracedWakeNotifier, WakeNotifier};
use rc_core::{
    Clock, ConstraintCatalog, ConstraintRegistry, EngineConfig, IdGen, ReconcilerConfig,
    ReleaseEntityPolicy, ScopePolicy, SystemClock, UuidIdGen,
};
use rc_storage::ConstraintStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::Instrument;

/// What one pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub finished: usize,
    /// Constraints visited only because the blocked sweep found them
    pub swept: usize,
    pub unblocked: usize,
    pub failures: Vec<PassFailure>,
}

impl PassReport {
    pub fn is_idle(&self) -> bool {
        self.finished == 0 && self.swept == 0 && self.unblocked == 0 && self.failures.is_empty()
    }
}

/// Production wiring of [`DefaultService`] under a reconciler
pub type DefaultReconciler<E, N> = Reconciler<
    ConstraintStore,
    ReleaseEntityPolicy,
    TracedExecutionAdapter<E>,
    TracedWakeNotifier<N>,
    SystemClock,
    UuidIdGen,
>;

impl<E: ExecutionAdapter, N: WakeNotifier> DefaultReconciler<E, N> {
    /// Open the configured store and drive it with the configured loop
    pub fn from_config(
        config: &EngineConfig,
        executions: E,
        notifier: N,
    ) -> Result<Self, ServiceError> {
        let service = DefaultService::open(&config.store, executions, notifier)?;
        tracing::info!(
            path = ?config.store.path,
            machine_id = %config.store.machine_id,
            interval = ?config.reconciler.interval,
            "engine configured"
        );
        Ok(Self::new(Arc::new(service), config.reconciler.clone()))
    }
}

/// Periodic driver of the service's reconciliation passes
pub struct Reconciler<S, P, E, N, C: Clock, I: IdGen> {
    service: Arc<ResourceConstraintService<S, P, E, N, C, I>>,
    config: ReconcilerConfig,
}

impl<S, P, E, N, C, I> Reconciler<S, P, E, N, C, I>
where
    S: ConstraintRegistry + ConstraintCatalog,
    P: ScopePolicy,
    E: ExecutionAdapter,
    N: WakeNotifier,
    C: Clock,
    I: IdGen,
{
    pub fn new(
        service: Arc<ResourceConstraintService<S, P, E, N, C, I>>,
        config: ReconcilerConfig,
    ) -> Self {
        Self { service, config }
    }

    pub fn service(&self) -> &Arc<ResourceConstraintService<S, P, E, N, C, I>> {
        &self.service
    }

    /// Run one full pass
    pub async fn tick(&self) -> Result<PassReport, ServiceError> {
        let span = tracing::info_span!("reconcile", app_id = self.config.app_id.as_deref());
        async {
            let active = self
                .service
                .update_active_constraints(self.config.app_id.as_deref(), None)
                .await?;
            self.admit(active, self.config.sweep_blocked).await
        }
        .instrument(span)
        .await
    }

    /// Release the holds of one execution that just ended and admit whoever
    /// was waiting on them, without waiting for the next tick
    pub async fn on_execution_finished(
        &self,
        app_id: &str,
        execution_id: &str,
    ) -> Result<PassReport, ServiceError> {
        let span = tracing::info_span!("reconcile.release", app_id, execution_id);
        async {
            let active = self
                .service
                .update_active_constraints(Some(app_id), Some(execution_id))
                .await?;
            self.admit(active, false).await
        }
        .instrument(span)
        .await
    }

    async fn admit(&self, active: ActivePass, sweep: bool) -> Result<PassReport, ServiceError> {
        let mut dirty = active.constraint_ids;
        let mut swept = 0;
        if sweep {
            for id in self.service.select_blocked_constraints()? {
                if dirty.insert(id) {
                    swept += 1;
                }
            }
        }

        let unblocked = self.service.update_blocked_constraints(&dirty).await?;
        let report = PassReport {
            finished: active.finished.len(),
            swept,
            unblocked: unblocked.len(),
            failures: active.failures,
        };

        if report.is_idle() {
            tracing::debug!("nothing to reconcile");
        } else {
            tracing::info!(
                finished = report.finished,
                swept = report.swept,
                unblocked = report.unblocked,
                failures = report.failures.len(),
                "reconciliation pass"
            );
        }
        Ok(report)
    }

    /// Tick on the configured interval until `shutdown` turns true or its
    /// sender is dropped. A failed pass is logged and retried next tick.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        if *shutdown.borrow() {
            return;
        }

        let period = self.config.interval.max(Duration::from_millis(1));
        let mut timer = tokio::time::interval(period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval = ?period, "reconciler started");

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    if let Err(e) = self.tick().await {
                        tracing::error!(error = %e, "reconciliation pass failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("reconciler stopped");
    }
}

#[cfg(test)]
#[path = "reconciler_tests.rs"]
mod tests;
