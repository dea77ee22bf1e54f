// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Traced adapter wrappers for consistent observability

use crate::execution::{ExecutionAdapter, ExecutionError, ExecutionInfo};
use crate::notify::{NotifyError, WakeNotifier};
use async_trait::async_trait;
use rc_core::{ConsumerId, HoldingScope};
use tracing::Instrument;

/// Wrapper that adds tracing to any ExecutionAdapter
#[derive(Clone)]
pub struct TracedExecutionAdapter<E> {
    inner: E,
}

impl<E> TracedExecutionAdapter<E> {
    pub fn new(inner: E) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<E: ExecutionAdapter> ExecutionAdapter for TracedExecutionAdapter<E> {
    async fn execution(
        &self,
        app_id: &str,
        scope: HoldingScope,
        execution_id: &str,
    ) -> Result<Option<ExecutionInfo>, ExecutionError> {
        let span = tracing::info_span!("execution.lookup", app_id, %scope, execution_id);

        async {
            let start = std::time::Instant::now();
            let result = self.inner.execution(app_id, scope, execution_id).await;
            let elapsed = start.elapsed();

            match &result {
                Ok(Some(info)) => tracing::debug!(
                    status = ?info.status,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "execution found"
                ),
                Ok(None) => tracing::info!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    "execution not found"
                ),
                Err(e) => tracing::error!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    error = %e,
                    "lookup failed"
                ),
            }

            result
        }
        .instrument(span)
        .await
    }
}

/// Wrapper that adds tracing to any WakeNotifier
#[derive(Clone)]
pub struct TracedWakeNotifier<N> {
    inner: N,
}

impl<N> TracedWakeNotifier<N> {
    pub fn new(inner: N) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<N: WakeNotifier> WakeNotifier for TracedWakeNotifier<N> {
    async fn wake(&self, consumer_id: &ConsumerId) -> Result<(), NotifyError> {
        let span = tracing::info_span!("notify.wake", %consumer_id);

        async {
            let result = self.inner.wake(consumer_id).await;
            match &result {
                Ok(()) => tracing::debug!("woken"),
                Err(e) => tracing::warn!(error = %e, "wake failed"),
            }
            result
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
#[path = "traced_tests.rs"]
mod tests;
