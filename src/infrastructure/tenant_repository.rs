//! Snapshot store for tenant occupancy rows
//!
//! The snapshot mirrors upstream state and is fully replaced each cycle:
//! batch upsert keyed by the upstream id, then a tombstone pass deleting
//! every stored id absent from the latest extraction. The locally managed
//! `tag` column survives upserts; it belongs to the dashboard, not upstream.

use anyhow::Result;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;

use crate::domain::tenant::{Tag, Tenant};

/// Floor -> room -> occupants, primary occupant first. The shape the REST
/// collaborator renders as the floor/room grid.
pub type FloorGrid = BTreeMap<i64, BTreeMap<i64, Vec<Tenant>>>;

#[derive(Clone)]
pub struct TenantRepository {
    pool: SqlitePool,
}

impl TenantRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert-or-replace the batch in one transaction. Every column is
    /// replaced from the incoming row except `tag`, which is managed locally
    /// and only ever corrected from the master side.
    pub async fn upsert_batch(&self, tenants: &[Tenant]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        for tenant in tenants {
            sqlx::query(
                r#"
                INSERT INTO tenants
                    (id, guests_id, house_id, house_name, tenant_name, mobile, id_card,
                     is_main, floor, room_number, tag, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    guests_id = excluded.guests_id,
                    house_id = excluded.house_id,
                    house_name = excluded.house_name,
                    tenant_name = excluded.tenant_name,
                    mobile = excluded.mobile,
                    id_card = excluded.id_card,
                    is_main = excluded.is_main,
                    floor = excluded.floor,
                    room_number = excluded.room_number,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(tenant.id)
            .bind(&tenant.guests_id)
            .bind(tenant.house_id)
            .bind(&tenant.house_name)
            .bind(&tenant.tenant_name)
            .bind(&tenant.mobile)
            .bind(&tenant.id_card)
            .bind(tenant.is_main)
            .bind(tenant.floor)
            .bind(tenant.room_number)
            .bind(tenant.tag)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(tenants.len() as u64)
    }

    /// Delete every stored row whose id is not in `current_ids`. An empty id
    /// set is treated as "nothing to reconcile against" and deletes nothing;
    /// the synchronizer never wipes the snapshot on an empty extraction.
    pub async fn delete_missing(&self, current_ids: &[i64]) -> Result<u64> {
        if current_ids.is_empty() {
            return Ok(0);
        }

        let placeholders = vec!["?"; current_ids.len()].join(", ");
        let sql = format!("DELETE FROM tenants WHERE id NOT IN ({placeholders})");
        let mut query = sqlx::query(&sql);
        for id in current_ids {
            query = query.bind(id);
        }

        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    pub async fn get_all(&self) -> Result<Vec<Tenant>> {
        let rows = sqlx::query(
            "SELECT * FROM tenants ORDER BY floor ASC, room_number ASC, is_main DESC, tenant_name ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(map_row).collect()
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Tenant>> {
        let row = sqlx::query("SELECT * FROM tenants WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(map_row).transpose()
    }

    /// Correct one snapshot row's tag (master -> snapshot flow, and the
    /// operation behind the external field-patch surface).
    pub async fn update_tag(&self, id: i64, tag: Tag) -> Result<bool> {
        let result = sqlx::query("UPDATE tenants SET tag = ?, updated_at = ? WHERE id = ?")
            .bind(tag)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Records grouped by floor then room, primary occupant sorted first in
    /// each room.
    pub async fn list_grouped_by_floor(&self) -> Result<FloorGrid> {
        let mut grid: FloorGrid = BTreeMap::new();
        for tenant in self.get_all().await? {
            grid.entry(tenant.floor)
                .or_default()
                .entry(tenant.room_number)
                .or_default()
                .push(tenant);
        }
        Ok(grid)
    }
}

fn map_row(row: &sqlx::sqlite::SqliteRow) -> Result<Tenant> {
    Ok(Tenant {
        id: row.get("id"),
        guests_id: row.get("guests_id"),
        house_id: row.get("house_id"),
        house_name: row.get("house_name"),
        tenant_name: row.get("tenant_name"),
        mobile: row.get("mobile"),
        id_card: row.get("id_card"),
        is_main: row.get("is_main"),
        floor: row.get("floor"),
        room_number: row.get("room_number"),
        tag: row.try_get("tag")?,
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::tenant::derive_room;
    use crate::infrastructure::database_connection::DatabaseConnection;

    async fn setup() -> TenantRepository {
        let db = DatabaseConnection::new("sqlite::memory:").await.unwrap();
        db.migrate().await.unwrap();
        TenantRepository::new(db.pool().clone())
    }

    fn tenant(id: i64, house_name: &str, name: &str) -> Tenant {
        let (floor, room_number) = derive_room(house_name);
        Tenant {
            id,
            guests_id: Some(format!("g-{id}")),
            house_id: Some(1),
            house_name: house_name.to_string(),
            tenant_name: name.to_string(),
            mobile: None,
            id_card: None,
            is_main: false,
            floor,
            room_number,
            tag: Tag::None,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn upsert_is_idempotent() {
        let repo = setup().await;
        let batch = vec![tenant(1, "A-305", "张三"), tenant(2, "A-306", "李四")];

        repo.upsert_batch(&batch).await.unwrap();
        repo.upsert_batch(&batch).await.unwrap();

        let all = repo.get_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].room_number, 305);
    }

    #[tokio::test]
    async fn delete_missing_leaves_exactly_the_current_id_set() {
        let repo = setup().await;
        repo.upsert_batch(&[
            tenant(1, "A-101", "a"),
            tenant(2, "A-102", "b"),
            tenant(3, "A-103", "c"),
        ])
        .await
        .unwrap();

        repo.upsert_batch(&[tenant(2, "A-102", "b"), tenant(3, "A-103", "c"), tenant(4, "A-104", "d")])
            .await
            .unwrap();
        let deleted = repo.delete_missing(&[2, 3, 4]).await.unwrap();
        assert_eq!(deleted, 1);

        let ids: Vec<i64> = repo.get_all().await.unwrap().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn delete_missing_with_empty_set_deletes_nothing() {
        let repo = setup().await;
        repo.upsert_batch(&[tenant(1, "A-101", "a")]).await.unwrap();
        assert_eq!(repo.delete_missing(&[]).await.unwrap(), 0);
        assert_eq!(repo.get_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn upsert_preserves_locally_managed_tag() {
        let repo = setup().await;
        repo.upsert_batch(&[tenant(1, "A-305", "张三")]).await.unwrap();
        assert!(repo.update_tag(1, Tag::Cohort2023).await.unwrap());

        // Next sync cycle replaces the row; the tag must survive.
        repo.upsert_batch(&[tenant(1, "A-305", "张三")]).await.unwrap();
        let stored = repo.get_by_id(1).await.unwrap().unwrap();
        assert_eq!(stored.tag, Tag::Cohort2023);
    }

    #[tokio::test]
    async fn update_tag_on_unknown_id_reports_false() {
        let repo = setup().await;
        assert!(!repo.update_tag(999, Tag::Internship).await.unwrap());
    }

    #[tokio::test]
    async fn grouped_listing_puts_primary_occupant_first() {
        let repo = setup().await;
        let mut main_tenant = tenant(1, "A-305", "主租客");
        main_tenant.is_main = true;
        let secondary = tenant(2, "A-305", "同住人");
        let other_floor = tenant(3, "A-1205", "楼上");

        repo.upsert_batch(&[secondary, main_tenant, other_floor]).await.unwrap();

        let grid = repo.list_grouped_by_floor().await.unwrap();
        let room_305 = &grid[&3][&305];
        assert_eq!(room_305.len(), 2);
        assert!(room_305[0].is_main);
        assert!(grid.contains_key(&12));
    }
}
