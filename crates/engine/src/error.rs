// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the constraint service

use rc_core::{ConstraintId, ConsumerId, RegistryError};
use rc_storage::StoreError;
use thiserror::Error;

/// Errors that can occur in the service
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("invalid resource constraint: {0}")]
    InvalidConstraint(String),
}

/// One consumer a reconciliation pass could not handle
///
/// The consumer is left as it was and retried on the next pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassFailure {
    pub constraint_id: ConstraintId,
    pub consumer_id: ConsumerId,
    pub reason: String,
}

impl PassFailure {
    pub fn new(
        constraint_id: &ConstraintId,
        consumer_id: &ConsumerId,
        reason: impl ToString,
    ) -> Self {
        Self {
            constraint_id: constraint_id.clone(),
            consumer_id: consumer_id.clone(),
            reason: reason.to_string(),
        }
    }
}
