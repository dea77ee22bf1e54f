// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake wake notifier for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{NotifyError, WakeNotifier};
use async_trait::async_trait;
use rc_core::ConsumerId;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct FakeState {
    calls: Vec<ConsumerId>,
    failure: Option<String>,
}

/// Records every wake
#[derive(Clone, Default)]
pub struct FakeWakeNotifier {
    inner: Arc<Mutex<FakeState>>,
}

impl FakeWakeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent wakes fail (they are still recorded)
    pub fn fail_with(&self, message: impl Into<String>) {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).failure = Some(message.into());
    }

    /// Get all recorded wakes, in order
    pub fn calls(&self) -> Vec<ConsumerId> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .calls
            .clone()
    }
}

#[async_trait]
impl WakeNotifier for FakeWakeNotifier {
    async fn wake(&self, consumer_id: &ConsumerId) -> Result<(), NotifyError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.calls.push(consumer_id.clone());
        match &inner.failure {
            Some(message) => Err(NotifyError::DeliveryFailed(message.clone())),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
