//! Snapshot synchronization: extracted records -> tenants store
//!
//! Full-replace semantics in two passes: batch upsert of every extracted
//! record, then a tombstone pass deleting stored rows absent upstream. An
//! empty extraction skips both passes so a transient upstream failure can
//! never wipe the snapshot.

use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};

use crate::domain::tenant::{derive_room, Tag, Tenant};
use crate::infrastructure::extractor::ExtractedTenant;
use crate::infrastructure::tenant_repository::TenantRepository;

/// What one synchronization pass did to the snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotReport {
    /// The whole pass was skipped because the extraction came back empty.
    pub skipped: bool,
    pub upserted: u64,
    pub deleted: u64,
}

pub struct SnapshotSynchronizer {
    tenants: TenantRepository,
}

impl SnapshotSynchronizer {
    pub fn new(tenants: TenantRepository) -> Self {
        Self { tenants }
    }

    pub async fn synchronize(&self, extracted: &[ExtractedTenant]) -> Result<SnapshotReport> {
        if extracted.is_empty() {
            warn!("⚠️ Extraction returned no records, keeping existing snapshot untouched");
            return Ok(SnapshotReport { skipped: true, ..Default::default() });
        }

        let batch: Vec<Tenant> = extracted.iter().map(to_snapshot_row).collect();
        let upserted = self.tenants.upsert_batch(&batch).await?;

        let current_ids: Vec<i64> = batch.iter().map(|tenant| tenant.id).collect();
        let deleted = self.tenants.delete_missing(&current_ids).await?;

        info!("💾 Snapshot synchronized: {} upserted, {} deleted", upserted, deleted);
        Ok(SnapshotReport { skipped: false, upserted, deleted })
    }
}

/// Extracted record to snapshot row: derives floor/room from the house name.
/// The tag written here is a placeholder; on an existing row the stored tag
/// survives the upsert.
fn to_snapshot_row(extracted: &ExtractedTenant) -> Tenant {
    let (floor, room_number) = derive_room(&extracted.house_name);
    Tenant {
        id: extracted.id,
        guests_id: extracted.guests_id.clone(),
        house_id: extracted.house_id,
        house_name: extracted.house_name.clone(),
        tenant_name: extracted.tenant_name.clone(),
        mobile: extracted.mobile.clone(),
        id_card: extracted.id_card.clone(),
        is_main: extracted.is_main,
        floor,
        room_number,
        tag: Tag::None,
        updated_at: Utc::now(),
    }
}
