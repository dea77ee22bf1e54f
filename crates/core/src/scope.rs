// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Holding scopes and the scope-overlap policy
//!
//! A consumer holds its permits on behalf of a release entity (e.g. a
//! workflow execution). The hold ends when that entity reaches a terminal
//! status. Records persist the scope as text so that a value written by a
//! newer process is surfaced as [`UnhandledScope`] where it is used instead
//! of failing every load.

use crate::consumer::Consumer;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Entity types whose lifecycle can end a hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HoldingScope {
    /// Held until a workflow execution finishes
    Workflow,
    /// Held until a pipeline execution finishes
    Pipeline,
}

impl HoldingScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            HoldingScope::Workflow => "WORKFLOW",
            HoldingScope::Pipeline => "PIPELINE",
        }
    }
}

impl fmt::Display for HoldingScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted holding scope this build does not know how to release
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unhandled holding scope: {0}")]
pub struct UnhandledScope(pub String);

impl FromStr for HoldingScope {
    type Err = UnhandledScope;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WORKFLOW" => Ok(HoldingScope::Workflow),
            "PIPELINE" => Ok(HoldingScope::Pipeline),
            other => Err(UnhandledScope(other.to_string())),
        }
    }
}

/// The release entity a consumer holds permits for
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReleaseScope {
    /// Holding scope as persisted (see [`HoldingScope::as_str`])
    pub entity_type: String,
    pub entity_id: String,
}

impl ReleaseScope {
    pub fn new(scope: HoldingScope, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type: scope.as_str().to_string(),
            entity_id: entity_id.into(),
        }
    }

    /// Build a scope from raw persisted parts without validating the type
    pub fn raw(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
        }
    }

    pub fn holding_scope(&self) -> Result<HoldingScope, UnhandledScope> {
        self.entity_type.parse()
    }
}

impl fmt::Display for ReleaseScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.entity_id)
    }
}

/// Scheduling-policy port: decides which consumers never contend for order
pub trait ScopePolicy: Send + Sync {
    /// True when `consumer` and `blocked` hold on behalf of the same entity
    fn overlapping_scope(&self, consumer: &Consumer, blocked: &Consumer) -> bool;
}

/// Consumers overlap when they share holding scope and release entity
#[derive(Debug, Clone, Copy, Default)]
pub struct ReleaseEntityPolicy;

impl ScopePolicy for ReleaseEntityPolicy {
    fn overlapping_scope(&self, consumer: &Consumer, blocked: &Consumer) -> bool {
        let scope = match consumer.release.holding_scope() {
            Ok(scope) => scope,
            Err(e) => {
                tracing::error!(consumer_id = %consumer.id, error = %e, "cannot compare scope");
                return false;
            }
        };
        let blocked_scope = match blocked.release.holding_scope() {
            Ok(scope) => scope,
            Err(e) => {
                tracing::error!(consumer_id = %blocked.id, error = %e, "cannot compare scope");
                return false;
            }
        };

        scope == blocked_scope && consumer.release.entity_id == blocked.release.entity_id
    }
}

#[cfg(test)]
#[path = "scope_tests.rs"]
mod tests;
