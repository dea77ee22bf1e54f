// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution documents on disk
//!
//! The orchestrator writes one JSON document per execution at
//! `<root>/<app_id>/<kind>/<execution_id>.json`, where `<kind>` is
//! `workflows` or `pipelines`. Ids are only unique within a kind.

use super::{ExecutionAdapter, ExecutionError, ExecutionInfo};
use async_trait::async_trait;
use rc_core::HoldingScope;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug)]
pub struct JsonExecutionAdapter {
    root: PathBuf,
}

impl JsonExecutionAdapter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn document_path(
        &self,
        app_id: &str,
        scope: HoldingScope,
        execution_id: &str,
    ) -> Result<PathBuf, ExecutionError> {
        for key in [app_id, execution_id] {
            if key.is_empty() || key == "." || key == ".." || key.contains(['/', '\\']) {
                return Err(ExecutionError::InvalidKey(key.to_string()));
            }
        }
        let kind = match scope {
            HoldingScope::Workflow => "workflows",
            HoldingScope::Pipeline => "pipelines",
        };
        Ok(self
            .root
            .join(app_id)
            .join(kind)
            .join(format!("{execution_id}.json")))
    }

    /// Write an execution document atomically
    pub async fn record(
        &self,
        app_id: &str,
        scope: HoldingScope,
        info: &ExecutionInfo,
    ) -> Result<(), ExecutionError> {
        let path = self.document_path(app_id, scope, &info.id)?;
        let io_err = |source| ExecutionError::Io {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let json = serde_json::to_vec_pretty(info).map_err(|source| ExecutionError::Parse {
            path: path.clone(),
            source,
        })?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &path).await.map_err(io_err)?;
        Ok(())
    }
}

#[async_trait]
impl ExecutionAdapter for JsonExecutionAdapter {
    async fn execution(
        &self,
        app_id: &str,
        scope: HoldingScope,
        execution_id: &str,
    ) -> Result<Option<ExecutionInfo>, ExecutionError> {
        let path = self.document_path(app_id, scope, execution_id)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(ExecutionError::Io { path, source }),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| ExecutionError::Parse { path, source })
    }
}

#[cfg(test)]
#[path = "json_tests.rs"]
mod tests;
