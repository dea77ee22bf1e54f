// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Consumer state machine
//!
//! A consumer is one attempt to hold permits of a constraint unit.
//!
//! ```text
//! register ──► BLOCKED ──unblock──► ACTIVE ──finish──► FINISHED
//!     └───────────────(room left)────┘
//! ```
//!
//! Transitions never reverse. Repeating a transition is a no-op, which is
//! what lets concurrent reconciliation passes race on the same record.

use crate::scope::ReleaseScope;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Caller-supplied consumer identifier; doubles as the idempotency key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConsumerId(pub String);

impl ConsumerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConsumerId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Lifecycle state of a consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsumerState {
    /// Waiting for capacity
    Blocked,
    /// Holding its permits
    Active,
    /// Permits released (terminal)
    Finished,
}

/// Inputs that drive a consumer forward
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerInput {
    Unblock,
    Finish,
}

impl ConsumerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConsumerState::Finished)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ConsumerState::Blocked => "BLOCKED",
            ConsumerState::Active => "ACTIVE",
            ConsumerState::Finished => "FINISHED",
        }
    }

    /// The state reached by applying `input`, or `None` if the input does
    /// not apply to this state
    pub fn transition(self, input: ConsumerInput) -> Option<ConsumerState> {
        match (self, input) {
            (ConsumerState::Blocked, ConsumerInput::Unblock) => Some(ConsumerState::Active),
            (ConsumerState::Active, ConsumerInput::Finish) => Some(ConsumerState::Finished),
            _ => None,
        }
    }
}

impl fmt::Display for ConsumerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A consumer as seen by the admission algorithm
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Consumer {
    pub id: ConsumerId,
    /// Weight taken from the unit's capacity
    pub permits: u32,
    pub state: ConsumerState,
    /// Fairness order; lower registered earlier
    pub order: u64,
    pub release: ReleaseScope,
}

impl Consumer {
    /// A consumer about to be registered (blocked until admitted)
    pub fn new(id: impl Into<ConsumerId>, permits: u32, release: ReleaseScope) -> Self {
        Self {
            id: id.into(),
            permits,
            state: ConsumerState::Blocked,
            order: 0,
            release,
        }
    }

    pub fn with_state(mut self, state: ConsumerState) -> Self {
        self.state = state;
        self
    }

    pub fn with_order(mut self, order: u64) -> Self {
        self.order = order;
        self
    }

    pub fn is_active(&self) -> bool {
        self.state == ConsumerState::Active
    }

    pub fn is_blocked(&self) -> bool {
        self.state == ConsumerState::Blocked
    }
}

impl From<String> for ConsumerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
#[path = "consumer_tests.rs"]
mod tests;
