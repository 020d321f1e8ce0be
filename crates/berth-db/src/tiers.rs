//! Resource tiers repository

use berth_core::{Error, ResourceTier, Result};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;

use crate::instances::row_to_resources;
use crate::map_write_error;

const SELECT_COLUMNS: &str = r#"
    SELECT id, code, name, sequence, active, description, target_user_count, price_monthly, notes,
           app_cpu_limit, app_cpu_reservation, app_memory_limit, app_memory_reservation,
           db_cpu_limit, db_cpu_reservation, db_memory_limit, db_memory_reservation
    FROM tiers
"#;

/// Repository for resource tier operations
pub struct TiersRepository {
    pool: SqlitePool,
}

impl TiersRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new tier. A duplicate code is a validation error.
    pub async fn insert(&self, tier: &ResourceTier) -> Result<i64> {
        let res = &tier.resources;
        let result = sqlx::query(
            r#"
            INSERT INTO tiers (
                code, name, sequence, active, description, target_user_count, price_monthly, notes,
                app_cpu_limit, app_cpu_reservation, app_memory_limit, app_memory_reservation,
                db_cpu_limit, db_cpu_reservation, db_memory_limit, db_memory_reservation
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&tier.code)
        .bind(&tier.name)
        .bind(tier.sequence)
        .bind(tier.active)
        .bind(&tier.description)
        .bind(&tier.target_user_count)
        .bind(tier.price_monthly)
        .bind(&tier.notes)
        .bind(res.app.cpu_limit)
        .bind(res.app.cpu_reservation)
        .bind(&res.app.memory_limit)
        .bind(&res.app.memory_reservation)
        .bind(res.database.cpu_limit)
        .bind(res.database.cpu_reservation)
        .bind(&res.database.memory_limit)
        .bind(&res.database.memory_reservation)
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(e, "Tier code"))?;

        Ok(result.last_insert_rowid())
    }

    pub async fn update(&self, tier: &ResourceTier) -> Result<()> {
        let res = &tier.resources;
        let result = sqlx::query(
            r#"
            UPDATE tiers SET
                code = ?, name = ?, sequence = ?, active = ?, description = ?,
                target_user_count = ?, price_monthly = ?, notes = ?,
                app_cpu_limit = ?, app_cpu_reservation = ?, app_memory_limit = ?, app_memory_reservation = ?,
                db_cpu_limit = ?, db_cpu_reservation = ?, db_memory_limit = ?, db_memory_reservation = ?
            WHERE id = ?
            "#,
        )
        .bind(&tier.code)
        .bind(&tier.name)
        .bind(tier.sequence)
        .bind(tier.active)
        .bind(&tier.description)
        .bind(&tier.target_user_count)
        .bind(tier.price_monthly)
        .bind(&tier.notes)
        .bind(res.app.cpu_limit)
        .bind(res.app.cpu_reservation)
        .bind(&res.app.memory_limit)
        .bind(&res.app.memory_reservation)
        .bind(res.database.cpu_limit)
        .bind(res.database.cpu_reservation)
        .bind(&res.database.memory_limit)
        .bind(&res.database.memory_reservation)
        .bind(tier.id)
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(e, "Tier code"))?;

        if result.rows_affected() == 0 {
            return Err(Error::TierNotFound(tier.id.to_string()));
        }
        Ok(())
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<ResourceTier>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::DbError(e.to_string()))?;

        Ok(row.as_ref().map(row_to_tier))
    }

    pub async fn get_by_code(&self, code: &str) -> Result<Option<ResourceTier>> {
        let row = sqlx::query(&format!("{} WHERE code = ?", SELECT_COLUMNS))
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::DbError(e.to_string()))?;

        Ok(row.as_ref().map(row_to_tier))
    }

    /// All tiers in display order
    pub async fn get_all(&self) -> Result<Vec<ResourceTier>> {
        let rows = sqlx::query(&format!("{} ORDER BY sequence, id", SELECT_COLUMNS))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::DbError(e.to_string()))?;

        Ok(rows.iter().map(row_to_tier).collect())
    }

    /// Delete a tier. Instances referencing it keep their copied values.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tiers WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::DbError(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}

fn row_to_tier(row: &SqliteRow) -> ResourceTier {
    ResourceTier {
        id: row.get("id"),
        code: row.get("code"),
        name: row.get("name"),
        sequence: row.get("sequence"),
        active: row.get("active"),
        description: row.get("description"),
        target_user_count: row.get("target_user_count"),
        price_monthly: row.get("price_monthly"),
        notes: row.get("notes"),
        resources: row_to_resources(row),
    }
}
