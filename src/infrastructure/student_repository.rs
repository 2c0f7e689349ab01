//! Master store for student identity records
//!
//! Students are long-lived and independently keyed from the snapshot. The
//! reconciler is the only writer. Uniqueness of mobile / id-card numbers is
//! enforced by the schema; a conflicting creation is reported, not raised,
//! so one bad row cannot abort a reconciliation batch.

use anyhow::Result;
use chrono::Utc;
use sqlx::{Row, SqlitePool};

use crate::domain::student::{NewStudent, Occupancy, Student};
use crate::domain::tenant::Tag;

/// Outcome of a creation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateResult {
    Created(i64),
    /// A uniqueness constraint rejected the row (duplicate mobile/id-card).
    Conflict,
}

#[derive(Clone)]
pub struct StudentRepository {
    pool: SqlitePool,
}

impl StudentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_all(&self) -> Result<Vec<Student>> {
        let rows = sqlx::query("SELECT * FROM students ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(map_row).collect()
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Student>> {
        let row = sqlx::query("SELECT * FROM students WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(map_row).transpose()
    }

    /// Insert a new master record. Uniqueness violations come back as
    /// `Conflict` instead of an error.
    pub async fn create(&self, new: &NewStudent) -> Result<CreateResult> {
        let result = sqlx::query(
            r#"
            INSERT INTO students (name, mobile, id_card, is_checked_in, occupancies, tag, updated_at)
            VALUES (?, ?, ?, 0, '[]', '', ?)
            "#,
        )
        .bind(&new.name)
        .bind(&new.mobile)
        .bind(&new.id_card)
        .bind(Utc::now())
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => Ok(CreateResult::Created(done.last_insert_rowid())),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Ok(CreateResult::Conflict)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write platform back-references, but only where currently unset. A
    /// snapshot never overwrites an existing platform binding.
    pub async fn bind_platform_refs(
        &self,
        id: i64,
        tenant_id: i64,
        house_id: Option<i64>,
        guests_id: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE students SET
                platform_tenant_id = COALESCE(platform_tenant_id, ?),
                platform_house_id = COALESCE(platform_house_id, ?),
                platform_guests_id = COALESCE(platform_guests_id, ?),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(tenant_id)
        .bind(house_id)
        .bind(guests_id)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Overwrite contact fields from the snapshot (snapshot is authoritative
    /// for mobile / id-card). May hit a uniqueness constraint; the caller
    /// decides whether that is fatal.
    pub async fn update_contact(
        &self,
        id: i64,
        mobile: Option<&str>,
        id_card: Option<&str>,
    ) -> Result<()> {
        sqlx::query("UPDATE students SET mobile = ?, id_card = ?, updated_at = ? WHERE id = ?")
            .bind(mobile)
            .bind(id_card)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Write the deduplicated occupancy list and mark the student checked-in.
    pub async fn set_checked_in(&self, id: i64, occupancies: &[Occupancy]) -> Result<()> {
        let occupancies_json = serde_json::to_string(occupancies)?;
        sqlx::query(
            "UPDATE students SET is_checked_in = 1, occupancies = ?, updated_at = ? WHERE id = ?",
        )
        .bind(occupancies_json)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Mark every checked-in student absent from `active_ids` as checked-out
    /// with occupancies cleared. Returns the number of check-outs.
    pub async fn check_out_absent(&self, active_ids: &[i64]) -> Result<u64> {
        let sql = if active_ids.is_empty() {
            "UPDATE students SET is_checked_in = 0, occupancies = '[]', updated_at = ? WHERE is_checked_in = 1".to_string()
        } else {
            let placeholders = vec!["?"; active_ids.len()].join(", ");
            format!(
                "UPDATE students SET is_checked_in = 0, occupancies = '[]', updated_at = ? WHERE is_checked_in = 1 AND id NOT IN ({placeholders})"
            )
        };

        let mut query = sqlx::query(&sql).bind(Utc::now());
        for id in active_ids {
            query = query.bind(id);
        }
        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Set the master-side tag (administrative operation; the master side is
    /// authoritative for tags).
    pub async fn set_tag(&self, id: i64, tag: Tag) -> Result<bool> {
        let result = sqlx::query("UPDATE students SET tag = ?, updated_at = ? WHERE id = ?")
            .bind(tag)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn map_row(row: &sqlx::sqlite::SqliteRow) -> Result<Student> {
    let occupancies_json: String = row.get("occupancies");
    Ok(Student {
        id: row.get("id"),
        name: row.get("name"),
        mobile: row.get("mobile"),
        id_card: row.get("id_card"),
        platform_tenant_id: row.get("platform_tenant_id"),
        platform_house_id: row.get("platform_house_id"),
        platform_guests_id: row.get("platform_guests_id"),
        is_checked_in: row.get("is_checked_in"),
        occupancies: serde_json::from_str(&occupancies_json)?,
        tag: row.try_get("tag")?,
        updated_at: row.get("updated_at"),
    })
}
