// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wake notifications for suspended callers
//!
//! A caller whose consumer registered BLOCKED parks its task on a one-shot
//! wake keyed by consumer id. Delivery is fire-and-forget from the engine's
//! side, so receivers must tolerate duplicates.

mod hub;

pub use hub::{WaitNotifyHub, WakeReceiver};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeWakeNotifier;

use async_trait::async_trait;
use rc_core::ConsumerId;
use thiserror::Error;

/// Delivered to a waiter once its consumer is ACTIVE
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeSignal {
    pub consumer_id: ConsumerId,
}

/// Errors from wake delivery
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("wait for {0} was abandoned")]
    Closed(ConsumerId),
    #[error("wake delivery failed: {0}")]
    DeliveryFailed(String),
}

/// Outbound port: wake whoever waits on a consumer
#[async_trait]
pub trait WakeNotifier: Clone + Send + Sync + 'static {
    async fn wake(&self, consumer_id: &ConsumerId) -> Result<(), NotifyError>;
}
