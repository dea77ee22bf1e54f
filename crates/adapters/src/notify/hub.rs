// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process wake queue
//!
//! A wake that arrives before anyone waits is retained, so a caller that
//! registers, gets BLOCKED and only then starts waiting cannot miss it.
//! A consumer's state is dropped once its wake has been delivered or its
//! retained wake has been picked up. Retained wakes nobody collects are
//! evicted oldest first past the retention limit.

use super::{NotifyError, WakeNotifier, WakeSignal};
use async_trait::async_trait;
use rc_core::ConsumerId;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

/// Retained wakes kept by default
const DEFAULT_RETENTION: usize = 1024;

enum Slot {
    Waiting(Vec<oneshot::Sender<WakeSignal>>),
    Fired,
}

#[derive(Default)]
struct Slots {
    by_id: HashMap<ConsumerId, Slot>,
    /// Ids in `Fired` state, oldest first
    fired: VecDeque<ConsumerId>,
}

impl Slots {
    fn retain_wake(&mut self, consumer_id: &ConsumerId, retention: usize) {
        self.by_id.insert(consumer_id.clone(), Slot::Fired);
        self.fired.push_back(consumer_id.clone());
        while self.fired.len() > retention {
            let Some(evicted) = self.fired.pop_front() else {
                break;
            };
            self.by_id.remove(&evicted);
            tracing::debug!(consumer_id = %evicted, "uncollected wake evicted");
        }
    }

    fn unfire(&mut self, consumer_id: &ConsumerId) {
        self.fired.retain(|id| id != consumer_id);
    }
}

/// One-shot wakes keyed by consumer id
#[derive(Clone)]
pub struct WaitNotifyHub {
    slots: Arc<Mutex<Slots>>,
    retention: usize,
}

impl Default for WaitNotifyHub {
    fn default() -> Self {
        Self {
            slots: Arc::default(),
            retention: DEFAULT_RETENTION,
        }
    }
}

impl WaitNotifyHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `retention` wakes that arrived before their waiter
    pub fn with_retention(mut self, retention: usize) -> Self {
        self.retention = retention;
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Wait for `consumer_id` to be woken
    pub fn wait(&self, consumer_id: &ConsumerId) -> WakeReceiver {
        let mut slots = self.lock();
        if matches!(slots.by_id.get(consumer_id), Some(Slot::Fired)) {
            slots.by_id.remove(consumer_id);
            slots.unfire(consumer_id);
            return WakeReceiver {
                consumer_id: consumer_id.clone(),
                rx: None,
            };
        }

        let (tx, rx) = oneshot::channel();
        match slots
            .by_id
            .entry(consumer_id.clone())
            .or_insert_with(|| Slot::Waiting(Vec::new()))
        {
            Slot::Waiting(senders) => {
                senders.retain(|sender| !sender.is_closed());
                senders.push(tx);
            }
            Slot::Fired => {}
        }
        WakeReceiver {
            consumer_id: consumer_id.clone(),
            rx: Some(rx),
        }
    }

    /// Drop all state for a consumer; pending waiters resolve with
    /// [`NotifyError::Closed`]
    pub fn forget(&self, consumer_id: &ConsumerId) {
        let mut slots = self.lock();
        if let Some(Slot::Fired) = slots.by_id.remove(consumer_id) {
            slots.unfire(consumer_id);
        }
    }

    /// Number of consumers with at least one waiter
    pub fn pending(&self) -> usize {
        self.lock()
            .by_id
            .values()
            .filter(|slot| {
                matches!(slot, Slot::Waiting(senders) if senders.iter().any(|s| !s.is_closed()))
            })
            .count()
    }

    /// Number of wakes waiting for a waiter to collect them
    pub fn retained(&self) -> usize {
        self.lock().fired.len()
    }

    /// Number of consumers the hub holds any state for
    pub fn tracked(&self) -> usize {
        self.lock().by_id.len()
    }
}

#[async_trait]
impl WakeNotifier for WaitNotifyHub {
    async fn wake(&self, consumer_id: &ConsumerId) -> Result<(), NotifyError> {
        let mut slots = self.lock();
        match slots.by_id.remove(consumer_id) {
            Some(Slot::Waiting(senders)) => {
                let woken = senders
                    .into_iter()
                    .map(|tx| {
                        tx.send(WakeSignal {
                            consumer_id: consumer_id.clone(),
                        })
                        .is_ok()
                    })
                    .filter(|delivered| *delivered)
                    .count();
                if woken == 0 {
                    // every waiter gave up; keep the wake for the next one
                    slots.retain_wake(consumer_id, self.retention);
                    tracing::debug!(%consumer_id, "wake retained for later waiter");
                } else {
                    tracing::debug!(%consumer_id, woken, "woke waiters");
                }
            }
            Some(Slot::Fired) => {
                slots.by_id.insert(consumer_id.clone(), Slot::Fired);
                tracing::debug!(%consumer_id, "duplicate wake ignored");
            }
            None => {
                slots.retain_wake(consumer_id, self.retention);
                tracing::debug!(%consumer_id, "wake retained for later waiter");
            }
        }
        Ok(())
    }
}

/// Resolves once the consumer is woken
pub struct WakeReceiver {
    consumer_id: ConsumerId,
    rx: Option<oneshot::Receiver<WakeSignal>>,
}

impl WakeReceiver {
    pub fn consumer_id(&self) -> &ConsumerId {
        &self.consumer_id
    }

    pub async fn recv(self) -> Result<WakeSignal, NotifyError> {
        match self.rx {
            None => Ok(WakeSignal {
                consumer_id: self.consumer_id,
            }),
            Some(rx) => rx.await.map_err(|_| NotifyError::Closed(self.consumer_id)),
        }
    }
}

#[cfg(test)]
#[path = "hub_tests.rs"]
mod tests;
