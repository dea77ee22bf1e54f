// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake execution adapter for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{ExecutionAdapter, ExecutionError, ExecutionInfo, ExecutionStatus};
use async_trait::async_trait;
use rc_core::HoldingScope;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Recorded lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionCall {
    pub app_id: String,
    pub scope: HoldingScope,
    pub execution_id: String,
}

#[derive(Default)]
struct FakeState {
    executions: HashMap<(String, String), ExecutionInfo>,
    failing: HashSet<(String, String)>,
    calls: Vec<ExecutionCall>,
}

/// In-memory executions keyed by `(app_id, execution_id)`
#[derive(Clone, Default)]
pub struct FakeExecutionAdapter {
    inner: Arc<Mutex<FakeState>>,
}

impl FakeExecutionAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an execution
    pub fn set(&self, app_id: &str, info: ExecutionInfo) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .executions
            .insert((app_id.to_string(), info.id.clone()), info);
    }

    /// Shorthand for an execution named after its id
    pub fn set_status(&self, app_id: &str, execution_id: &str, status: ExecutionStatus) {
        self.set(app_id, ExecutionInfo::new(execution_id, execution_id, status));
    }

    pub fn remove(&self, app_id: &str, execution_id: &str) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .executions
            .remove(&(app_id.to_string(), execution_id.to_string()));
    }

    /// Make lookups of this execution fail until cleared with `recover`
    pub fn fail(&self, app_id: &str, execution_id: &str) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .failing
            .insert((app_id.to_string(), execution_id.to_string()));
    }

    pub fn recover(&self, app_id: &str, execution_id: &str) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .failing
            .remove(&(app_id.to_string(), execution_id.to_string()));
    }

    /// Get all recorded lookups
    pub fn calls(&self) -> Vec<ExecutionCall> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .calls
            .clone()
    }
}

#[async_trait]
impl ExecutionAdapter for FakeExecutionAdapter {
    async fn execution(
        &self,
        app_id: &str,
        scope: HoldingScope,
        execution_id: &str,
    ) -> Result<Option<ExecutionInfo>, ExecutionError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.calls.push(ExecutionCall {
            app_id: app_id.to_string(),
            scope,
            execution_id: execution_id.to_string(),
        });
        let key = (app_id.to_string(), execution_id.to_string());
        if inner.failing.contains(&key) {
            return Err(ExecutionError::Unavailable(format!(
                "{app_id}/{execution_id}"
            )));
        }
        Ok(inner.executions.get(&key).cloned())
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
