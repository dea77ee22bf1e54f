// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution status lookup
//!
//! Resolves the release entity behind a hold so reconciliation can tell
//! whether it has ended.

mod json;

pub use json::JsonExecutionAdapter;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{ExecutionCall, FakeExecutionAdapter};

use async_trait::async_trait;
use rc_core::HoldingScope;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Lifecycle status of a workflow or pipeline execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    New,
    Queued,
    Running,
    Paused,
    Waiting,
    Success,
    Failed,
    Error,
    Aborted,
    Expired,
    Rejected,
    Skipped,
}

impl ExecutionStatus {
    /// True once the execution can no longer hold anything
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Success
                | ExecutionStatus::Failed
                | ExecutionStatus::Error
                | ExecutionStatus::Aborted
                | ExecutionStatus::Expired
                | ExecutionStatus::Rejected
                | ExecutionStatus::Skipped
        )
    }
}

/// The fields of an execution the engine reads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub status: ExecutionStatus,
}

impl ExecutionInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>, status: ExecutionStatus) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status,
        }
    }
}

/// Errors from execution lookups
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("invalid execution key: {0}")]
    InvalidKey(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed execution document {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("execution lookup failed: {0}")]
    Unavailable(String),
}

/// Read-only lookup of the entity a consumer holds permits for
#[async_trait]
pub trait ExecutionAdapter: Clone + Send + Sync + 'static {
    /// `None` when the execution no longer exists
    async fn execution(
        &self,
        app_id: &str,
        scope: HoldingScope,
        execution_id: &str,
    ) -> Result<Option<ExecutionInfo>, ExecutionError>;
}
