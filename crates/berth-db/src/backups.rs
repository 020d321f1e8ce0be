//! Backups repository - backup records and their artifact files

use berth_core::{Backup, BackupStatus, Error, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::{format_ts, parse_ts};

const SELECT_COLUMNS: &str = r#"
    SELECT id, instance_id, config_id, name, backup_date, file_path, file_size, status, message
    FROM backups
"#;

/// Repository for backup record operations
pub struct BackupsRepository {
    pool: SqlitePool,
}

impl BackupsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new backup record after validating it
    pub async fn insert(&self, backup: &Backup) -> Result<i64> {
        backup.validate()?;
        let result = sqlx::query(
            r#"
            INSERT INTO backups (
                instance_id, config_id, name, backup_date, file_path, file_size, status, message
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(backup.instance_id)
        .bind(backup.config_id)
        .bind(&backup.name)
        .bind(format_ts(&backup.backup_date))
        .bind(backup.file_path.as_ref().map(|p| p.to_string_lossy().to_string()))
        .bind(backup.file_size as i64)
        .bind(backup.status.as_str())
        .bind(&backup.message)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::DbError(e.to_string()))?;

        Ok(result.last_insert_rowid())
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Backup>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::DbError(e.to_string()))?;

        row.as_ref().map(row_to_backup).transpose()
    }

    /// Backups of an instance, newest first
    pub async fn find_by_instance(&self, instance_id: i64) -> Result<Vec<Backup>> {
        let rows = sqlx::query(&format!(
            "{} WHERE instance_id = ? ORDER BY backup_date DESC, id DESC",
            SELECT_COLUMNS
        ))
        .bind(instance_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::DbError(e.to_string()))?;

        rows.iter().map(row_to_backup).collect()
    }

    /// Backups produced by a configuration, newest first
    pub async fn find_by_config(&self, config_id: i64) -> Result<Vec<Backup>> {
        let rows = sqlx::query(&format!(
            "{} WHERE config_id = ? ORDER BY backup_date DESC, id DESC",
            SELECT_COLUMNS
        ))
        .bind(config_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::DbError(e.to_string()))?;

        rows.iter().map(row_to_backup).collect()
    }

    /// Successful backups of a configuration dated strictly before `cutoff`
    pub async fn find_prunable(&self, config_id: i64, cutoff: DateTime<Utc>) -> Result<Vec<Backup>> {
        let rows = sqlx::query(&format!(
            "{} WHERE config_id = ? AND status = ? AND backup_date < ? ORDER BY backup_date",
            SELECT_COLUMNS
        ))
        .bind(config_id)
        .bind(BackupStatus::Success.as_str())
        .bind(format_ts(&cutoff))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::DbError(e.to_string()))?;

        rows.iter().map(row_to_backup).collect()
    }

    /// Delete a backup record and its artifact file.
    /// Failing to remove the file is logged and does not stop the record deletion.
    pub async fn delete(&self, backup: &Backup) -> Result<bool> {
        remove_artifact(backup).await;

        let result = sqlx::query("DELETE FROM backups WHERE id = ?")
            .bind(backup.id)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::DbError(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete every backup of an instance, artifacts included
    pub async fn delete_by_instance(&self, instance_id: i64) -> Result<u64> {
        let mut deleted = 0;
        for backup in self.find_by_instance(instance_id).await? {
            if self.delete(&backup).await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}

async fn remove_artifact(backup: &Backup) {
    let Some(path) = &backup.file_path else {
        return;
    };
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed backup file {:?}", path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Unable to remove backup file {:?}: {}", path, e),
    }
}

fn row_to_backup(row: &SqliteRow) -> Result<Backup> {
    let backup_date: String = row.get("backup_date");
    let file_path: Option<String> = row.get("file_path");
    let file_size: i64 = row.get("file_size");
    let status: String = row.get("status");

    Ok(Backup {
        id: row.get("id"),
        instance_id: row.get("instance_id"),
        config_id: row.get("config_id"),
        name: row.get("name"),
        backup_date: parse_ts(&backup_date)?,
        file_path: file_path.map(PathBuf::from),
        file_size: file_size.max(0) as u64,
        status: status.parse()?,
        message: row.get("message"),
    })
}
