//! Berth Engine - Instance lifecycle, resource tiers, backups and addon modules
//!
//! [`Engine`] wires the collaborators together from [`Settings`] and is what
//! the CLI and the HTTP API drive.

mod audit;
pub mod lifecycle;
pub mod locks;
pub mod modules;
pub mod tiers;

#[cfg(test)]
pub(crate) mod test_support;

pub use lifecycle::{CreateInstance, InstanceLifecycleManager};
pub use locks::InstanceLocks;
pub use tiers::ResourceTierService;
pub use berth_backup::{FailedRun, TickReport};

use berth_backup::{BackupExecutor, BackupScheduler, DatabaseBackupClient};
use berth_ci::{ContinuousIntegrationProvisioner, GitHubJenkinsProvisioner};
use berth_core::{
    AuditEntity, AuditEntry, Backup, BackupConfig, BackupFrequency, Error, Result, Settings,
};
use berth_db::Database;
use berth_runtime::{ComposeRuntime, ContainerRuntime};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Options for a new backup configuration
#[derive(Debug, Clone)]
pub struct BackupConfigRequest {
    pub frequency: BackupFrequency,
    pub directory: Option<PathBuf>,
    pub auto_prune: bool,
    pub days_to_keep: i64,
}

impl Default for BackupConfigRequest {
    fn default() -> Self {
        Self {
            frequency: BackupFrequency::Daily,
            directory: None,
            auto_prune: true,
            days_to_keep: berth_core::DEFAULT_DAYS_TO_KEEP as i64,
        }
    }
}

/// Changes to an existing backup configuration; `None` keeps the current value
#[derive(Debug, Clone, Default)]
pub struct BackupConfigUpdate {
    pub active: Option<bool>,
    pub frequency: Option<BackupFrequency>,
    pub days_to_keep: Option<i64>,
}

pub struct Engine {
    db: Database,
    settings: Arc<Settings>,
    lifecycle: InstanceLifecycleManager,
    tiers: Arc<ResourceTierService>,
    scheduler: BackupScheduler,
}

impl Engine {
    /// Open the database and build the production collaborators
    pub async fn new(settings: Settings) -> Result<Self> {
        let db = Database::new(&settings.paths.database).await?;
        let runtime = Arc::new(ComposeRuntime::from_settings(&settings.runtime));
        let ci = Arc::new(GitHubJenkinsProvisioner::from_settings(&settings.ci));
        let executor = BackupExecutor::from_settings(db.clone(), &settings.backup)?;
        Ok(Self::assemble(settings, db, runtime, ci, executor))
    }

    /// Build with explicit collaborators
    pub fn with_parts(
        settings: Settings,
        db: Database,
        runtime: Arc<dyn ContainerRuntime>,
        ci: Arc<dyn ContinuousIntegrationProvisioner>,
        backup_client: Arc<dyn DatabaseBackupClient>,
    ) -> Self {
        let executor = BackupExecutor::new(db.clone(), backup_client, settings.backup.endpoint_host.clone());
        Self::assemble(settings, db, runtime, ci, executor)
    }

    fn assemble(
        settings: Settings,
        db: Database,
        runtime: Arc<dyn ContainerRuntime>,
        ci: Arc<dyn ContinuousIntegrationProvisioner>,
        executor: BackupExecutor,
    ) -> Self {
        let settings = Arc::new(settings);
        let locks = Arc::new(InstanceLocks::new());
        let tiers = Arc::new(ResourceTierService::new(db.clone(), locks.clone()));
        let lifecycle = InstanceLifecycleManager::new(
            db.clone(),
            settings.clone(),
            runtime,
            ci,
            tiers.clone(),
            locks,
        );
        let scheduler = BackupScheduler::new(db.clone(), executor);

        Self {
            db,
            settings,
            lifecycle,
            tiers,
            scheduler,
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn lifecycle(&self) -> &InstanceLifecycleManager {
        &self.lifecycle
    }

    pub fn tiers(&self) -> &ResourceTierService {
        &self.tiers
    }

    pub fn scheduler(&self) -> &BackupScheduler {
        &self.scheduler
    }

    /// Assign a tier by code to the named instance
    pub async fn assign_tier(&self, instance: &str, code: &str) -> Result<berth_core::Instance> {
        let tier = self.tiers.get(code).await?;
        let instance = self.lifecycle.find(instance).await?;
        self.lifecycle.assign_tier(instance.id, &tier).await
    }

    pub async fn propagate_tier(&self, code: &str) -> Result<usize> {
        let tier = self.tiers.get(code).await?;
        self.tiers.propagate(&tier).await
    }

    pub async fn history(&self, instance: &str) -> Result<Vec<AuditEntry>> {
        let instance = self.lifecycle.find(instance).await?;
        self.db.audit().find_by_entity(AuditEntity::Instance, instance.id).await
    }

    pub async fn add_backup_config(&self, instance: &str, request: BackupConfigRequest) -> Result<BackupConfig> {
        let instance = self.lifecycle.find(instance).await?;
        let now = Utc::now();

        let mut config = BackupConfig::new(instance.id, now)
            .with_frequency(request.frequency, now)
            .with_retention(request.auto_prune, request.days_to_keep);
        if let Some(directory) = request.directory {
            config = config.with_directory(directory);
        }
        config.id = self.db.backup_configs().insert(&config).await?;

        info!(
            "Added {} backup configuration for instance {}",
            config.frequency, instance.name
        );
        audit::record(&self.db, AuditEntity::BackupConfig, config.id, "Backup configuration created").await;
        Ok(config)
    }

    pub async fn backup_configs(&self, instance: Option<&str>) -> Result<Vec<BackupConfig>> {
        match instance {
            Some(name) => {
                let instance = self.lifecycle.find(name).await?;
                self.db.backup_configs().find_by_instance(instance.id).await
            }
            None => self.db.backup_configs().get_all().await,
        }
    }

    /// Activate, deactivate or reschedule a configuration.
    /// Any change of activity or frequency reschedules from now.
    pub async fn update_backup_config(&self, config_id: i64, update: BackupConfigUpdate) -> Result<BackupConfig> {
        let mut config = self.backup_config(config_id).await?;
        let now = Utc::now();

        if let Some(frequency) = update.frequency {
            config.set_frequency(frequency, now);
        }
        if let Some(active) = update.active {
            config.set_active(active, now);
        }
        if let Some(days) = update.days_to_keep {
            config.days_to_keep = days;
        }
        self.db.backup_configs().update(&config).await?;

        info!(
            "Updated backup configuration {} (active: {}, frequency: {})",
            config.id, config.active, config.frequency
        );
        audit::record(&self.db, AuditEntity::BackupConfig, config.id, "Backup configuration updated").await;
        Ok(config)
    }

    /// Remove a configuration. Its backups stay listed under the instance.
    pub async fn delete_backup_config(&self, config_id: i64) -> Result<()> {
        let config = self.backup_config(config_id).await?;
        if !self.db.backup_configs().delete(config.id).await? {
            return Err(Error::BackupConfigNotFound(config_id));
        }

        info!("Deleted backup configuration {}", config_id);
        audit::record(
            &self.db,
            AuditEntity::Instance,
            config.instance_id,
            &format!("Backup configuration {} deleted", config_id),
        )
        .await;
        Ok(())
    }

    pub async fn tick(&self) -> Result<TickReport> {
        self.scheduler.tick(Utc::now()).await
    }

    pub async fn run_backup_config(&self, config_id: i64) -> Result<Backup> {
        self.scheduler.run_now(config_id, Utc::now()).await
    }

    /// Run the instance's first active configuration now
    pub async fn run_backup_now(&self, instance: &str) -> Result<Backup> {
        let instance = self.lifecycle.find(instance).await?;
        let config = self
            .db
            .backup_configs()
            .find_by_instance(instance.id)
            .await?
            .into_iter()
            .find(|c| c.active)
            .ok_or_else(|| {
                Error::validation(format!(
                    "No active backup configuration for instance {}",
                    instance.name
                ))
            })?;
        self.scheduler.run_now(config.id, Utc::now()).await
    }

    pub async fn backups(&self, instance: &str) -> Result<Vec<Backup>> {
        let instance = self.lifecycle.find(instance).await?;
        self.db.backups().find_by_instance(instance.id).await
    }

    pub async fn prune_backups(&self, config_id: i64) -> Result<usize> {
        let config = self.backup_config(config_id).await?;
        self.scheduler.prune(&config, Utc::now()).await
    }

    /// Delete a backup record together with its artifact file
    pub async fn delete_backup(&self, backup_id: i64) -> Result<()> {
        let backup = self
            .db
            .backups()
            .get_by_id(backup_id)
            .await?
            .ok_or_else(|| Error::BackupNotFound(backup_id.to_string()))?;
        if !self.db.backups().delete(&backup).await? {
            return Err(Error::BackupNotFound(backup_id.to_string()));
        }

        info!("Deleted backup {}", backup.name);
        audit::record(
            &self.db,
            AuditEntity::Instance,
            backup.instance_id,
            &format!("Backup {} deleted", backup.name),
        )
        .await;
        Ok(())
    }

    async fn backup_config(&self, config_id: i64) -> Result<BackupConfig> {
        self.db
            .backup_configs()
            .get_by_id(config_id)
            .await?
            .ok_or(Error::BackupConfigNotFound(config_id))
    }

    /// A successful backup whose artifact is still on disk
    pub async fn backup_artifact(&self, backup_id: i64) -> Result<(Backup, PathBuf)> {
        let not_found = || Error::BackupNotFound(backup_id.to_string());
        let backup = self.db.backups().get_by_id(backup_id).await?.ok_or_else(not_found)?;
        let path = backup.file_path.clone().ok_or_else(not_found)?;
        if !path.is_file() {
            return Err(not_found());
        }
        Ok((backup, path))
    }

    pub async fn list_modules(&self, dir: &Path) -> Result<Vec<String>> {
        modules::list(dir).await
    }

    /// Extract an addon archive, then restart the named instance if given
    pub async fn upload_module(
        &self,
        dir: &Path,
        filename: &str,
        data: Vec<u8>,
        restart: Option<&str>,
    ) -> Result<Vec<String>> {
        let extracted = modules::install_archive(dir, filename, data).await?;
        self.restart_by_name(restart).await?;
        Ok(extracted)
    }

    pub async fn delete_module(&self, dir: &Path, name: &str, restart: Option<&str>) -> Result<()> {
        modules::remove(dir, name).await?;
        self.restart_by_name(restart).await
    }

    async fn restart_by_name(&self, name: Option<&str>) -> Result<()> {
        if let Some(name) = name.filter(|n| !n.is_empty()) {
            let instance = self.lifecycle.find(name).await?;
            self.lifecycle.restart(instance.id).await?;
        }
        Ok(())
    }
}
