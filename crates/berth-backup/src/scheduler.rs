//! Due-check over all backup configurations

use crate::executor::BackupExecutor;
use crate::retention;
use berth_core::{Backup, BackupConfig, BackupStatus, Error, Result};
use berth_db::Database;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

/// What one `tick` did
#[derive(Debug, Default, Clone, Serialize)]
pub struct TickReport {
    pub due: usize,
    pub succeeded: Vec<i64>,
    pub failed: Vec<FailedRun>,
    pub skipped: Vec<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedRun {
    pub config_id: i64,
    pub message: String,
}

/// Runs due backup configurations and records their outcomes
pub struct BackupScheduler {
    db: Database,
    executor: BackupExecutor,
}

impl BackupScheduler {
    pub fn new(db: Database, executor: BackupExecutor) -> Self {
        Self { db, executor }
    }

    /// Execute every active configuration due at `now`.
    ///
    /// Each configuration is claimed before it runs so that concurrent ticks
    /// never execute the same run twice. A failing configuration is recorded
    /// and rescheduled; it never stops the others.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickReport> {
        let due = self.db.backup_configs().find_active_due(now).await?;
        let mut report = TickReport {
            due: due.len(),
            ..Default::default()
        };
        debug!("{} backup configuration(s) due", due.len());

        for config in due {
            let Some(observed) = config.next_execution else {
                continue;
            };
            let next = config.frequency.next_after(now);
            match self.db.backup_configs().claim(config.id, observed, next).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!("Config {} already claimed, skipping", config.id);
                    report.skipped.push(config.id);
                    continue;
                }
                Err(e) => {
                    warn!("Failed to claim config {}: {}", config.id, e);
                    report.skipped.push(config.id);
                    continue;
                }
            }

            let id = config.id;
            match self.run(config, now).await {
                Ok(_) => report.succeeded.push(id),
                Err(e) => report.failed.push(FailedRun {
                    config_id: id,
                    message: e.to_string(),
                }),
            }
        }

        if report.due > 0 {
            info!(
                "Backup tick: {} succeeded, {} failed, {} skipped",
                report.succeeded.len(),
                report.failed.len(),
                report.skipped.len()
            );
        }
        Ok(report)
    }

    /// Run a configuration immediately, recording the outcome like a scheduled run
    pub async fn run_now(&self, config_id: i64, now: DateTime<Utc>) -> Result<Backup> {
        let config = self
            .db
            .backup_configs()
            .get_by_id(config_id)
            .await?
            .ok_or(Error::BackupConfigNotFound(config_id))?;
        self.run(config, now).await
    }

    pub async fn prune(&self, config: &BackupConfig, now: DateTime<Utc>) -> Result<usize> {
        retention::prune(&self.db, config, now).await
    }

    async fn run(&self, mut config: BackupConfig, now: DateTime<Utc>) -> Result<Backup> {
        match self.executor.execute(&mut config, now).await {
            Ok(backup) => Ok(backup),
            Err(e) => {
                self.record_failure(&mut config, &e.to_string(), now).await;
                Err(e)
            }
        }
    }

    async fn record_failure(&self, config: &mut BackupConfig, message: &str, now: DateTime<Utc>) {
        error!("Backup failed for config {}: {}", config.id, message);

        let failed = Backup::failed(config.instance_id, Some(config.id), message, now);
        if let Err(e) = self.db.backups().insert(&failed).await {
            warn!("Failed to record failed backup for config {}: {}", config.id, e);
        }

        match self
            .db
            .backup_configs()
            .record_outcome(config.id, BackupStatus::Failed, message, now)
            .await
        {
            Ok(stored) => *config = stored,
            Err(e) => warn!("Failed to update config {} after failure: {}", config.id, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{BackupRequest, DatabaseBackupClient};
    use crate::test_support::{at, insert_instance, setup_db, FakeBackupClient, PAYLOAD};
    use async_trait::async_trait;
    use chrono::Duration;
    use std::sync::Arc;

    /// Deactivates a configuration while its backup is being fetched
    struct DeactivatingClient {
        db: Database,
        config_id: i64,
        fail: bool,
    }

    #[async_trait]
    impl DatabaseBackupClient for DeactivatingClient {
        async fn fetch(&self, _request: &BackupRequest) -> Result<Vec<u8>> {
            let configs = self.db.backup_configs();
            let mut config = configs.get_by_id(self.config_id).await?.unwrap();
            config.set_active(false, at(2024, 1, 2));
            configs.update(&config).await?;
            if self.fail {
                return Err(Error::backup_request("connection reset"));
            }
            Ok(PAYLOAD.to_vec())
        }
    }

    fn scheduler(db: &Database, client: FakeBackupClient) -> BackupScheduler {
        let executor = BackupExecutor::new(db.clone(), Arc::new(client), "127.0.0.1");
        BackupScheduler::new(db.clone(), executor)
    }

    async fn add_config(db: &Database, instance_id: i64, created: DateTime<Utc>) -> BackupConfig {
        let mut config = BackupConfig::new(instance_id, created);
        config.id = db.backup_configs().insert(&config).await.unwrap();
        config
    }

    #[tokio::test]
    async fn test_daily_config_first_run() {
        let (db, dir) = setup_db().await;
        let instance = insert_instance(&db, dir.path(), "Acme", 8069).await;
        let config = add_config(&db, instance.id, at(2024, 1, 1)).await;
        assert_eq!(config.next_execution, Some(at(2024, 1, 2)));

        let scheduler = scheduler(&db, FakeBackupClient::default());
        let early = scheduler.tick(at(2024, 1, 1) + Duration::hours(23)).await.unwrap();
        assert_eq!(early.due, 0);

        let report = scheduler.tick(at(2024, 1, 2)).await.unwrap();
        assert_eq!(report.succeeded, vec![config.id]);
    }

    #[tokio::test]
    async fn test_tick_timeout_records_failure_and_reschedules() {
        let (db, dir) = setup_db().await;
        let instance = insert_instance(&db, dir.path(), "Acme", 8069).await;
        let config = add_config(&db, instance.id, at(2024, 1, 1)).await;
        let now = at(2024, 1, 2);

        let scheduler = scheduler(&db, FakeBackupClient::failing_for(&["acme"]));
        let report = scheduler.tick(now).await.unwrap();
        assert_eq!(report.failed.len(), 1);
        assert!(report.succeeded.is_empty());

        let backups = db.backups().find_by_instance(instance.id).await.unwrap();
        assert_eq!(backups.len(), 1);
        assert_eq!(backups[0].status, BackupStatus::Failed);
        assert!(backups[0].file_path.is_none());

        let stored = db.backup_configs().get_by_id(config.id).await.unwrap().unwrap();
        assert_eq!(stored.last_status, Some(BackupStatus::Failed));
        assert!(stored.last_message.unwrap().contains("timed out"));
        assert_eq!(stored.next_execution, Some(now + Duration::days(1)));
    }

    #[tokio::test]
    async fn test_tick_isolates_failures() {
        let (db, dir) = setup_db().await;
        let first = insert_instance(&db, dir.path(), "Broken", 8069).await;
        let second = insert_instance(&db, dir.path(), "Healthy", 8071).await;
        let broken = add_config(&db, first.id, at(2024, 1, 1)).await;
        let healthy = add_config(&db, second.id, at(2024, 1, 1)).await;
        let now = at(2024, 1, 5);

        let scheduler = scheduler(&db, FakeBackupClient::failing_for(&["broken"]));
        let report = scheduler.tick(now).await.unwrap();
        assert_eq!(report.due, 2);
        assert_eq!(report.failed[0].config_id, broken.id);
        assert_eq!(report.succeeded, vec![healthy.id]);

        for id in [broken.id, healthy.id] {
            let stored = db.backup_configs().get_by_id(id).await.unwrap().unwrap();
            assert_eq!(stored.next_execution, Some(now + Duration::days(1)));
        }
        let healthy_backups = db.backups().find_by_instance(second.id).await.unwrap();
        assert_eq!(healthy_backups[0].status, BackupStatus::Success);
    }

    #[tokio::test]
    async fn test_second_tick_does_not_rerun() {
        let (db, dir) = setup_db().await;
        let instance = insert_instance(&db, dir.path(), "Acme", 8069).await;
        add_config(&db, instance.id, at(2024, 1, 1)).await;
        let now = at(2024, 1, 2);

        let scheduler = scheduler(&db, FakeBackupClient::default());
        assert_eq!(scheduler.tick(now).await.unwrap().succeeded.len(), 1);
        assert_eq!(scheduler.tick(now).await.unwrap().due, 0);
        assert_eq!(db.backups().find_by_instance(instance.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_inactive_config_never_due() {
        let (db, dir) = setup_db().await;
        let instance = insert_instance(&db, dir.path(), "Acme", 8069).await;
        let mut config = BackupConfig::new(instance.id, at(2024, 1, 1));
        config.set_active(false, at(2024, 1, 1));
        db.backup_configs().insert(&config).await.unwrap();

        let scheduler = scheduler(&db, FakeBackupClient::default());
        assert_eq!(scheduler.tick(at(2030, 1, 1)).await.unwrap().due, 0);
    }

    #[tokio::test]
    async fn test_deactivation_during_run_is_kept() {
        for fail in [false, true] {
            let (db, dir) = setup_db().await;
            let instance = insert_instance(&db, dir.path(), "Acme", 8069).await;
            let config = add_config(&db, instance.id, at(2024, 1, 1)).await;

            let client = DeactivatingClient {
                db: db.clone(),
                config_id: config.id,
                fail,
            };
            let executor = BackupExecutor::new(db.clone(), Arc::new(client), "127.0.0.1");
            let scheduler = BackupScheduler::new(db.clone(), executor);
            let report = scheduler.tick(at(2024, 1, 2)).await.unwrap();
            assert_eq!(report.due, 1);
            assert_eq!(report.failed.len(), usize::from(fail));

            let stored = db.backup_configs().get_by_id(config.id).await.unwrap().unwrap();
            assert!(!stored.active);
            assert!(stored.next_execution.is_none());
            assert!(stored.last_status.is_some());
            assert_eq!(scheduler.tick(at(2030, 1, 1)).await.unwrap().due, 0);
        }
    }

    #[tokio::test]
    async fn test_run_now_returns_failure() {
        let (db, dir) = setup_db().await;
        let instance = insert_instance(&db, dir.path(), "Acme", 8069).await;
        let config = add_config(&db, instance.id, at(2024, 1, 1)).await;

        let scheduler = scheduler(&db, FakeBackupClient::failing_for(&["acme"]));
        let result = scheduler.run_now(config.id, at(2024, 1, 1)).await;
        assert!(matches!(result, Err(Error::BackupRequest(_))));

        let backups = db.backups().find_by_config(config.id).await.unwrap();
        assert_eq!(backups[0].status, BackupStatus::Failed);
    }

    #[tokio::test]
    async fn test_run_now_unknown_config() {
        let (db, _dir) = setup_db().await;
        let scheduler = scheduler(&db, FakeBackupClient::default());
        let result = scheduler.run_now(42, at(2024, 1, 1)).await;
        assert!(matches!(result, Err(Error::BackupConfigNotFound(42))));
    }
}
