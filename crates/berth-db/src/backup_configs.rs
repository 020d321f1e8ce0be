//! Backup configurations repository

use berth_core::{BackupConfig, BackupStatus, Error, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::path::PathBuf;

use crate::{format_ts, parse_opt_ts};

const SELECT_COLUMNS: &str = r#"
    SELECT id, instance_id, name, active, frequency, destination, backup_directory,
           auto_prune, days_to_keep, last_execution, next_execution, last_status, last_message
    FROM backup_configs
"#;

/// Repository for backup configuration operations
pub struct BackupConfigsRepository {
    pool: SqlitePool,
}

impl BackupConfigsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new configuration after validating it
    pub async fn insert(&self, config: &BackupConfig) -> Result<i64> {
        config.validate()?;
        let result = sqlx::query(
            r#"
            INSERT INTO backup_configs (
                instance_id, name, active, frequency, destination, backup_directory,
                auto_prune, days_to_keep, last_execution, next_execution, last_status, last_message
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(config.instance_id)
        .bind(&config.name)
        .bind(config.active)
        .bind(config.frequency.as_str())
        .bind(config.destination.as_str())
        .bind(dir_text(config))
        .bind(config.auto_prune)
        .bind(config.days_to_keep)
        .bind(config.last_execution.as_ref().map(format_ts))
        .bind(config.next_execution.as_ref().map(format_ts))
        .bind(config.last_status.map(|s| s.as_str()))
        .bind(&config.last_message)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::DbError(e.to_string()))?;

        Ok(result.last_insert_rowid())
    }

    /// Persist every field of an existing configuration after validating it
    pub async fn update(&self, config: &BackupConfig) -> Result<()> {
        config.validate()?;
        let result = sqlx::query(
            r#"
            UPDATE backup_configs SET
                name = ?, active = ?, frequency = ?, destination = ?, backup_directory = ?,
                auto_prune = ?, days_to_keep = ?, last_execution = ?, next_execution = ?,
                last_status = ?, last_message = ?
            WHERE id = ?
            "#,
        )
        .bind(&config.name)
        .bind(config.active)
        .bind(config.frequency.as_str())
        .bind(config.destination.as_str())
        .bind(dir_text(config))
        .bind(config.auto_prune)
        .bind(config.days_to_keep)
        .bind(config.last_execution.as_ref().map(format_ts))
        .bind(config.next_execution.as_ref().map(format_ts))
        .bind(config.last_status.map(|s| s.as_str()))
        .bind(&config.last_message)
        .bind(config.id)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::DbError(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(Error::BackupConfigNotFound(config.id));
        }
        Ok(())
    }

    /// Record a run outcome on the stored configuration.
    ///
    /// Only the `last_*` columns and `next_execution` are written, and
    /// `next_execution` stays cleared for a configuration that is no longer active.
    /// Returns the configuration as stored afterwards.
    pub async fn record_outcome(
        &self,
        id: i64,
        status: BackupStatus,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<BackupConfig> {
        let config = self
            .get_by_id(id)
            .await?
            .ok_or(Error::BackupConfigNotFound(id))?;

        let result = sqlx::query(
            r#"
            UPDATE backup_configs SET
                last_execution = ?, last_status = ?, last_message = ?,
                next_execution = CASE WHEN active = 1 THEN ? ELSE NULL END
            WHERE id = ?
            "#,
        )
        .bind(format_ts(&now))
        .bind(status.as_str())
        .bind(message)
        .bind(format_ts(&config.frequency.next_after(now)))
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::DbError(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(Error::BackupConfigNotFound(id));
        }
        self.get_by_id(id)
            .await?
            .ok_or(Error::BackupConfigNotFound(id))
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<BackupConfig>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::DbError(e.to_string()))?;

        row.as_ref().map(row_to_config).transpose()
    }

    pub async fn find_by_instance(&self, instance_id: i64) -> Result<Vec<BackupConfig>> {
        let rows = sqlx::query(&format!("{} WHERE instance_id = ? ORDER BY id", SELECT_COLUMNS))
            .bind(instance_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::DbError(e.to_string()))?;

        rows.iter().map(row_to_config).collect()
    }

    pub async fn get_all(&self) -> Result<Vec<BackupConfig>> {
        let rows = sqlx::query(&format!("{} ORDER BY id", SELECT_COLUMNS))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::DbError(e.to_string()))?;

        rows.iter().map(row_to_config).collect()
    }

    /// Active configurations whose next run is at or before `now`
    pub async fn find_active_due(&self, now: DateTime<Utc>) -> Result<Vec<BackupConfig>> {
        let rows = sqlx::query(&format!(
            "{} WHERE active = 1 AND next_execution IS NOT NULL AND next_execution <= ? \
             ORDER BY next_execution, id",
            SELECT_COLUMNS
        ))
        .bind(format_ts(&now))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::DbError(e.to_string()))?;

        rows.iter().map(row_to_config).collect()
    }

    /// Advance `next_execution` from `observed` to `next` only if no one else did first.
    /// Returns whether this caller won the claim.
    pub async fn claim(
        &self,
        id: i64,
        observed: DateTime<Utc>,
        next: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE backup_configs SET next_execution = ? \
             WHERE id = ? AND active = 1 AND next_execution = ?",
        )
        .bind(format_ts(&next))
        .bind(id)
        .bind(format_ts(&observed))
        .execute(&self.pool)
        .await
        .map_err(|e| Error::DbError(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM backup_configs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::DbError(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}

fn dir_text(config: &BackupConfig) -> Option<String> {
    config
        .backup_directory
        .as_ref()
        .map(|p| p.to_string_lossy().to_string())
}

fn row_to_config(row: &SqliteRow) -> Result<BackupConfig> {
    let frequency: String = row.get("frequency");
    let destination: String = row.get("destination");
    let backup_directory: Option<String> = row.get("backup_directory");
    let last_status: Option<String> = row.get("last_status");

    Ok(BackupConfig {
        id: row.get("id"),
        instance_id: row.get("instance_id"),
        name: row.get("name"),
        active: row.get("active"),
        frequency: frequency.parse()?,
        destination: destination.parse()?,
        backup_directory: backup_directory.map(PathBuf::from),
        auto_prune: row.get("auto_prune"),
        days_to_keep: row.get("days_to_keep"),
        last_execution: parse_opt_ts(row.get("last_execution"))?,
        next_execution: parse_opt_ts(row.get("next_execution"))?,
        last_status: last_status.as_deref().map(str::parse::<BackupStatus>).transpose()?,
        last_message: row.get("last_message"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_instance, setup_db};
    use crate::Database;
    use berth_core::BackupFrequency;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    async fn instance_id(db: &Database, name: &str, port: u16) -> i64 {
        db.instances()
            .insert(&sample_instance(name, port))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let (db, _dir) = setup_db().await;
        let instance_id = instance_id(&db, "a", 8069).await;
        let configs = db.backup_configs();

        let config = BackupConfig::new(instance_id, at(2024, 1, 1))
            .with_frequency(BackupFrequency::Weekly, at(2024, 1, 1))
            .with_directory("/backups/a");
        let id = configs.insert(&config).await.unwrap();

        let stored = configs.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.frequency, BackupFrequency::Weekly);
        assert_eq!(stored.next_execution, Some(at(2024, 1, 8)));
        assert_eq!(stored.backup_directory, Some(PathBuf::from("/backups/a")));
        assert!(stored.last_status.is_none());
    }

    #[tokio::test]
    async fn test_insert_rejects_invalid_retention() {
        let (db, _dir) = setup_db().await;
        let instance_id = instance_id(&db, "a", 8069).await;

        let config = BackupConfig::new(instance_id, at(2024, 1, 1)).with_retention(true, 0);
        let result = db.backup_configs().insert(&config).await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_find_active_due() {
        let (db, _dir) = setup_db().await;
        let instance_id = instance_id(&db, "a", 8069).await;
        let configs = db.backup_configs();

        // due at 2024-01-02
        let due = configs.insert(&BackupConfig::new(instance_id, at(2024, 1, 1))).await.unwrap();
        // due at 2024-02-01
        configs
            .insert(
                &BackupConfig::new(instance_id, at(2024, 1, 1))
                    .with_frequency(BackupFrequency::Monthly, at(2024, 1, 1)),
            )
            .await
            .unwrap();
        // inactive
        let mut inactive = BackupConfig::new(instance_id, at(2023, 1, 1));
        inactive.set_active(false, at(2023, 1, 1));
        configs.insert(&inactive).await.unwrap();

        let found = configs.find_active_due(at(2024, 1, 10)).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, due);

        // boundary is inclusive
        let found = configs.find_active_due(at(2024, 1, 2)).await.unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn test_claim_is_exclusive() {
        let (db, _dir) = setup_db().await;
        let instance_id = instance_id(&db, "a", 8069).await;
        let configs = db.backup_configs();
        let id = configs.insert(&BackupConfig::new(instance_id, at(2024, 1, 1))).await.unwrap();

        let observed = at(2024, 1, 2);
        assert!(configs.claim(id, observed, at(2024, 1, 11)).await.unwrap());
        assert!(!configs.claim(id, observed, at(2024, 1, 11)).await.unwrap());

        let stored = configs.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.next_execution, Some(at(2024, 1, 11)));
    }

    #[tokio::test]
    async fn test_update_records_outcome() {
        let (db, _dir) = setup_db().await;
        let instance_id = instance_id(&db, "a", 8069).await;
        let configs = db.backup_configs();
        let id = configs.insert(&BackupConfig::new(instance_id, at(2024, 1, 1))).await.unwrap();

        let mut config = configs.get_by_id(id).await.unwrap().unwrap();
        config.record_outcome(BackupStatus::Failed, "timeout", at(2024, 1, 5));
        configs.update(&config).await.unwrap();

        let stored = configs.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.last_status, Some(BackupStatus::Failed));
        assert_eq!(stored.last_message.as_deref(), Some("timeout"));
        assert_eq!(stored.last_execution, Some(at(2024, 1, 5)));
        assert_eq!(stored.next_execution, Some(at(2024, 1, 6)));
    }

    #[tokio::test]
    async fn test_record_outcome_keeps_settings() {
        let (db, _dir) = setup_db().await;
        let instance_id = instance_id(&db, "a", 8069).await;
        let configs = db.backup_configs();
        let id = configs.insert(&BackupConfig::new(instance_id, at(2024, 1, 1))).await.unwrap();
        let stale = configs.get_by_id(id).await.unwrap().unwrap();

        // deactivated and retuned while a run was in flight
        let mut edited = stale.clone();
        edited.set_active(false, at(2024, 1, 2));
        edited.days_to_keep = 7;
        configs.update(&edited).await.unwrap();

        let stored = configs
            .record_outcome(id, BackupStatus::Success, "done", at(2024, 1, 3))
            .await
            .unwrap();
        assert!(!stored.active);
        assert_eq!(stored.days_to_keep, 7);
        assert!(stored.next_execution.is_none());
        assert_eq!(stored.last_status, Some(BackupStatus::Success));
        assert_eq!(stored.last_execution, Some(at(2024, 1, 3)));
        assert!(stored.validate().is_ok());

        let missing = configs.record_outcome(999, BackupStatus::Failed, "x", at(2024, 1, 3)).await;
        assert!(matches!(missing, Err(Error::BackupConfigNotFound(999))));
    }

    #[tokio::test]
    async fn test_record_outcome_reschedules_active() {
        let (db, _dir) = setup_db().await;
        let instance_id = instance_id(&db, "a", 8069).await;
        let configs = db.backup_configs();
        let id = configs
            .insert(
                &BackupConfig::new(instance_id, at(2024, 1, 1))
                    .with_frequency(BackupFrequency::Weekly, at(2024, 1, 1)),
            )
            .await
            .unwrap();

        let stored = configs
            .record_outcome(id, BackupStatus::Failed, "timeout", at(2024, 1, 10))
            .await
            .unwrap();
        assert_eq!(stored.next_execution, Some(at(2024, 1, 17)));
        assert_eq!(stored.last_message.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn test_cascade_on_instance_delete() {
        let (db, _dir) = setup_db().await;
        let instance_id = instance_id(&db, "a", 8069).await;
        let configs = db.backup_configs();
        configs.insert(&BackupConfig::new(instance_id, at(2024, 1, 1))).await.unwrap();

        db.instances().delete(instance_id).await.unwrap();
        assert!(configs.find_by_instance(instance_id).await.unwrap().is_empty());
    }
}
