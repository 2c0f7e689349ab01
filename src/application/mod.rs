//! Application layer: the sync pipeline stages and their orchestration

pub mod reconciler;
pub mod snapshot_sync;
pub mod sync_service;

pub use reconciler::{ReconcileReport, Reconciler};
pub use snapshot_sync::{SnapshotReport, SnapshotSynchronizer};
pub use sync_service::{CycleSummary, SyncError, SyncService};
