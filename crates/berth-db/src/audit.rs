//! Audit log repository - append-only record of state changes

use berth_core::{AuditEntity, AuditEntry, Error, Result};
use chrono::Utc;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;

use crate::{format_ts, parse_ts};

pub struct AuditRepository {
    pool: SqlitePool,
}

impl AuditRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append an entry stamped with the current time
    pub async fn append(&self, entity: AuditEntity, entity_id: i64, message: &str) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO audit_log (entity, entity_id, message, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(entity.as_str())
        .bind(entity_id)
        .bind(message)
        .bind(format_ts(&Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(|e| Error::DbError(e.to_string()))?;

        Ok(result.last_insert_rowid())
    }

    /// Entries for one record, oldest first
    pub async fn find_by_entity(&self, entity: AuditEntity, entity_id: i64) -> Result<Vec<AuditEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, entity, entity_id, message, created_at
            FROM audit_log
            WHERE entity = ? AND entity_id = ?
            ORDER BY id
            "#,
        )
        .bind(entity.as_str())
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::DbError(e.to_string()))?;

        rows.iter().map(row_to_entry).collect()
    }

    /// Most recent entries across all records
    pub async fn recent(&self, limit: u32) -> Result<Vec<AuditEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, entity, entity_id, message, created_at
            FROM audit_log
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::DbError(e.to_string()))?;

        rows.iter().map(row_to_entry).collect()
    }
}

fn row_to_entry(row: &SqliteRow) -> Result<AuditEntry> {
    let entity: String = row.get("entity");
    let created_at: String = row.get("created_at");

    Ok(AuditEntry {
        id: row.get("id"),
        entity: entity.parse()?,
        entity_id: row.get("entity_id"),
        message: row.get("message"),
        created_at: parse_ts(&created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::setup_db;

    #[tokio::test]
    async fn test_append_and_find() {
        let (db, _dir) = setup_db().await;
        let audit = db.audit();

        audit.append(AuditEntity::Instance, 1, "Instance started").await.unwrap();
        audit.append(AuditEntity::Instance, 2, "Instance created").await.unwrap();
        audit.append(AuditEntity::Instance, 1, "Instance stopped").await.unwrap();

        let entries = audit.find_by_entity(AuditEntity::Instance, 1).await.unwrap();
        let messages: Vec<&str> = entries.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["Instance started", "Instance stopped"]);

        let recent = audit.recent(1).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].message, "Instance stopped");
    }
}
