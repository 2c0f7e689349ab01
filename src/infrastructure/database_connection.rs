// Database connection and pool management
// This module handles SQLite database connections using sqlx

use anyhow::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;

pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str) -> Result<Self> {
        Self::with_max_connections(database_url, 5).await
    }

    pub async fn with_max_connections(database_url: &str, max_connections: u32) -> Result<Self> {
        // Create the database file (and its directory) if necessary
        let db_path = if database_url.starts_with("sqlite://") {
            database_url.trim_start_matches("sqlite://")
        } else if database_url.starts_with("sqlite:") {
            database_url.trim_start_matches("sqlite:")
        } else {
            database_url
        };

        if db_path != ":memory:" && !Path::new(db_path).exists() {
            if let Some(parent) = Path::new(db_path).parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            std::fs::File::create(db_path)?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        let create_tenants_sql = r#"
            CREATE TABLE IF NOT EXISTS tenants (
                id INTEGER PRIMARY KEY,
                guests_id TEXT,
                house_id INTEGER,
                house_name TEXT NOT NULL,
                tenant_name TEXT NOT NULL,
                mobile TEXT,
                id_card TEXT,
                is_main BOOLEAN NOT NULL DEFAULT 0,
                floor INTEGER NOT NULL DEFAULT 0,
                room_number INTEGER NOT NULL DEFAULT 0,
                tag TEXT NOT NULL DEFAULT '',
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
        "#;

        let create_students_sql = r#"
            CREATE TABLE IF NOT EXISTS students (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                mobile TEXT UNIQUE,
                id_card TEXT UNIQUE,
                platform_tenant_id INTEGER,
                platform_house_id INTEGER,
                platform_guests_id TEXT,
                is_checked_in BOOLEAN NOT NULL DEFAULT 0,
                occupancies TEXT NOT NULL DEFAULT '[]',
                tag TEXT NOT NULL DEFAULT '',
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
        "#;

        let create_indexes_sql = [
            "CREATE INDEX IF NOT EXISTS idx_tenants_floor_room ON tenants (floor, room_number)",
            "CREATE INDEX IF NOT EXISTS idx_students_name ON students (name)",
            "CREATE INDEX IF NOT EXISTS idx_students_platform_tenant_id ON students (platform_tenant_id)",
        ];

        sqlx::query(create_tenants_sql).execute(&self.pool).await?;
        sqlx::query(create_students_sql).execute(&self.pool).await?;
        for sql in create_indexes_sql {
            sqlx::query(sql).execute(&self.pool).await?;
        }

        tracing::info!("Database schema is up to date");
        Ok(())
    }
}
