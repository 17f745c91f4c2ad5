//! Single-slot status notification with generation-guarded auto-clear.
//!
//! Every post bumps the generation. A scheduled clear remembers the generation
//! it was scheduled for and does nothing if a newer status has been posted in
//! the meantime.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use shared::domain::{PendingStatus, StatusPhase};
use tokio::sync::broadcast;
use tracing::debug;

use crate::CoordinatorEvent;

#[derive(Clone)]
pub struct StatusChannel {
    slot: Arc<Mutex<PendingStatus>>,
    events: broadcast::Sender<CoordinatorEvent>,
    success_clear_after: Duration,
    error_clear_after: Duration,
}

impl StatusChannel {
    pub fn new(
        events: broadcast::Sender<CoordinatorEvent>,
        success_clear_after: Duration,
        error_clear_after: Duration,
    ) -> Self {
        Self {
            slot: Arc::new(Mutex::new(PendingStatus::default())),
            events,
            success_clear_after,
            error_clear_after,
        }
    }

    pub fn current(&self) -> PendingStatus {
        lock_slot(&self.slot).clone()
    }

    pub fn pending(&self, message: impl Into<String>) -> u64 {
        self.post(StatusPhase::Pending, message.into())
    }

    pub fn success(&self, message: impl Into<String>) -> u64 {
        self.post(StatusPhase::Success, message.into())
    }

    pub fn error(&self, message: impl Into<String>) -> u64 {
        self.post(StatusPhase::Error, message.into())
    }

    /// Overwrites the slot. Success and error statuses schedule their own
    /// clear on the tokio timer; pending statuses stay until superseded.
    pub fn post(&self, phase: StatusPhase, message: String) -> u64 {
        let snapshot = {
            let mut slot = lock_slot(&self.slot);
            slot.generation += 1;
            slot.visible = true;
            slot.phase = phase;
            slot.message = message;
            slot.clone()
        };
        let generation = snapshot.generation;
        let _ = self.events.send(CoordinatorEvent::StatusChanged(snapshot));

        let clear_after = match phase {
            StatusPhase::Pending => None,
            StatusPhase::Success => Some(self.success_clear_after),
            StatusPhase::Error => Some(self.error_clear_after),
        };
        if let Some(delay) = clear_after {
            self.schedule_clear(generation, delay);
        }
        generation
    }

    /// Hides the slot only if `generation` is still the latest post.
    pub fn clear_if_current(&self, generation: u64) -> bool {
        clear_slot_if_current(&self.slot, &self.events, generation)
    }

    fn schedule_clear(&self, generation: u64, delay: Duration) {
        let slot = Arc::clone(&self.slot);
        let events = self.events.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !clear_slot_if_current(&slot, &events, generation) {
                debug!(generation, "status: skipped stale auto-clear");
            }
        });
    }
}

fn clear_slot_if_current(
    slot: &Mutex<PendingStatus>,
    events: &broadcast::Sender<CoordinatorEvent>,
    generation: u64,
) -> bool {
    let snapshot = {
        let mut slot = lock_slot(slot);
        if slot.generation != generation || !slot.visible {
            return false;
        }
        *slot = PendingStatus {
            generation,
            ..PendingStatus::default()
        };
        slot.clone()
    };
    let _ = events.send(CoordinatorEvent::StatusChanged(snapshot));
    true
}

fn lock_slot(slot: &Mutex<PendingStatus>) -> std::sync::MutexGuard<'_, PendingStatus> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
