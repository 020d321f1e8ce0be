//! Single backup run: request, store, record

use crate::client::{BackupRequest, DatabaseBackupClient, HttpBackupClient};
use crate::retention;
use berth_core::{Backup, BackupConfig, BackupSettings, BackupStatus, Error, Instance, Result};
use berth_db::Database;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Executes one backup configuration against its instance
pub struct BackupExecutor {
    db: Database,
    client: Arc<dyn DatabaseBackupClient>,
    endpoint_host: String,
}

impl BackupExecutor {
    pub fn new(db: Database, client: Arc<dyn DatabaseBackupClient>, endpoint_host: impl Into<String>) -> Self {
        Self {
            db,
            client,
            endpoint_host: endpoint_host.into(),
        }
    }

    pub fn from_settings(db: Database, settings: &BackupSettings) -> Result<Self> {
        let client = HttpBackupClient::from_settings(settings)?;
        Ok(Self::new(db, Arc::new(client), settings.endpoint_host.clone()))
    }

    /// Download a backup for `config`, store it, and record the outcome.
    ///
    /// `config` is refreshed from the stored row afterwards. Errors are returned
    /// untouched; recording a failed run is the caller's job.
    pub async fn execute(&self, config: &mut BackupConfig, now: DateTime<Utc>) -> Result<Backup> {
        let instance = self
            .db
            .instances()
            .get_by_id(config.instance_id)
            .await?
            .ok_or_else(|| Error::InstanceNotFound(config.instance_id.to_string()))?;

        let request = BackupRequest::for_instance(&instance, &self.endpoint_host)?;
        let directory = backup_directory(config, &instance);
        let filename = artifact_name(&instance.db_name, now);
        let path = directory.join(&filename);

        let payload = self.client.fetch(&request).await?;
        store(&directory, &path, &payload).await?;
        debug!("Wrote {} bytes to {}", payload.len(), path.display());

        let mut backup = Backup::success(
            instance.id,
            Some(config.id),
            filename.clone(),
            path,
            payload.len() as u64,
            now,
        );
        backup.id = match self.db.backups().insert(&backup).await {
            Ok(id) => id,
            Err(e) => {
                discard(&backup.file_path).await;
                return Err(e);
            }
        };

        let outcome = format!("Backup created: {}", filename);
        *config = self
            .db
            .backup_configs()
            .record_outcome(config.id, BackupStatus::Success, &outcome, now)
            .await?;
        info!("Backup {} created for instance {}", filename, instance.name);

        if config.auto_prune {
            if let Err(e) = retention::prune(&self.db, config, now).await {
                warn!("Failed to prune backups for config {}: {}", config.id, e);
            }
        }

        Ok(backup)
    }
}

fn backup_directory(config: &BackupConfig, instance: &Instance) -> PathBuf {
    config
        .backup_directory
        .clone()
        .unwrap_or_else(|| instance.default_backup_dir())
}

/// `<dbid>_<YYYYmmdd_HHMMSS>.zip` in UTC
pub fn artifact_name(db_name: &str, at: DateTime<Utc>) -> String {
    format!("{}_{}.zip", db_name, at.format("%Y%m%d_%H%M%S"))
}

async fn store(directory: &std::path::Path, path: &std::path::Path, payload: &[u8]) -> Result<()> {
    tokio::fs::create_dir_all(directory).await.map_err(|e| {
        Error::backup_storage(format!("Failed to create {}: {}", directory.display(), e))
    })?;

    if let Err(e) = tokio::fs::write(path, payload).await {
        let _ = tokio::fs::remove_file(path).await;
        return Err(Error::backup_storage(format!(
            "Failed to write {}: {}",
            path.display(),
            e
        )));
    }
    Ok(())
}

async fn discard(path: &Option<PathBuf>) {
    let Some(path) = path else {
        return;
    };
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!("Failed to remove unrecorded backup {}: {}", path.display(), e);
    }
}
