// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use rc_core::RegistryError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from the journal and store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported snapshot version {version} in {path}")]
    UnsupportedSnapshot { path: PathBuf, version: u32 },
}

impl From<StoreError> for RegistryError {
    fn from(e: StoreError) -> Self {
        RegistryError::Storage(Box::new(e))
    }
}
