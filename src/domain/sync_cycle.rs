//! Per-cycle sync state and the single-flight trigger guard
//!
//! One sync cycle moves through
//! `Idle -> AcquiringSession -> Extracting -> Synchronizing -> Reconciling -> Idle`
//! with `Failed` as the absorbing error state. The cycle state is an explicit
//! value object owned by the sync service and threaded through the stages;
//! there is no global mutable session cache.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stage of the currently running (or last finished) sync cycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SyncStage {
    Idle,
    AcquiringSession,
    Extracting,
    Synchronizing,
    Reconciling,
    Failed,
}

/// Value object carrying the state of one sync cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncCycleState {
    pub cycle_id: String,
    pub stage: SyncStage,
    pub started_at: DateTime<Utc>,
    pub pages_fetched: u32,
    pub records_extracted: u32,
    pub snapshot_upserted: u64,
    pub snapshot_deleted: u64,
    pub error: Option<String>,
}

impl SyncCycleState {
    pub fn begin() -> Self {
        Self {
            cycle_id: Uuid::new_v4().to_string(),
            stage: SyncStage::Idle,
            started_at: Utc::now(),
            pages_fetched: 0,
            records_extracted: 0,
            snapshot_upserted: 0,
            snapshot_deleted: 0,
            error: None,
        }
    }

    pub fn advance(&mut self, stage: SyncStage) {
        tracing::debug!("cycle {}: {:?} -> {:?}", self.cycle_id, self.stage, stage);
        self.stage = stage;
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.stage = SyncStage::Failed;
        self.error = Some(message.into());
    }
}

/// Single-flight guard for sync triggers.
///
/// A compare-and-swap on an atomic flag with an explicit expiry timestamp.
/// A trigger arriving while the guard is held and unexpired is rejected,
/// never queued. A hold past its cooldown window is considered stale and may
/// be stolen by the next trigger, so a crashed cycle cannot wedge the
/// trigger surface forever.
#[derive(Debug, Default)]
pub struct TriggerGuard {
    in_flight: AtomicBool,
    expires_at_ms: AtomicI64,
}

fn epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}

impl TriggerGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to claim the guard for one cycle. Returns false on conflict.
    pub fn try_acquire(&self, cooldown: Duration) -> bool {
        let now = epoch_ms();
        let expiry = now.saturating_add(i64::try_from(cooldown.as_millis()).unwrap_or(i64::MAX));

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.expires_at_ms.store(expiry, Ordering::SeqCst);
            return true;
        }

        // Held. Steal only a stale hold, and only once per expiry value.
        let held_expiry = self.expires_at_ms.load(Ordering::SeqCst);
        now >= held_expiry
            && self
                .expires_at_ms
                .compare_exchange(held_expiry, expiry, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
    }

    pub fn release(&self) {
        self.in_flight.store(false, Ordering::SeqCst);
    }

    pub fn is_held(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) && epoch_ms() < self.expires_at_ms.load(Ordering::SeqCst)
    }
}
