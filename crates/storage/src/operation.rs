// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Journaled state changes
//!
//! Operations record outcomes, not requests: a conditional update whose
//! condition failed is never journaled, so replay needs no re-evaluation.

use chrono::{DateTime, Utc};
use rc_core::{ConstraintId, ConsumerId, ConsumerRecord, ResourceConstraint};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    ConstraintSaved {
        constraint: ResourceConstraint,
    },
    ConstraintUpdated {
        constraint: ResourceConstraint,
    },
    ConstraintDeleted {
        id: ConstraintId,
    },
    ConsumerRegistered {
        record: ConsumerRecord,
    },
    /// BLOCKED → ACTIVE
    ConsumerUnblocked {
        id: ConsumerId,
        at: DateTime<Utc>,
    },
    /// ACTIVE → FINISHED
    ConsumerFinished {
        id: ConsumerId,
        at: DateTime<Utc>,
    },
    ConsumersPurged {
        ids: Vec<ConsumerId>,
    },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::ConstraintSaved { .. } => "constraint_saved",
            Operation::ConstraintUpdated { .. } => "constraint_updated",
            Operation::ConstraintDeleted { .. } => "constraint_deleted",
            Operation::ConsumerRegistered { .. } => "consumer_registered",
            Operation::ConsumerUnblocked { .. } => "consumer_unblocked",
            Operation::ConsumerFinished { .. } => "consumer_finished",
            Operation::ConsumersPurged { .. } => "consumers_purged",
        }
    }
}
