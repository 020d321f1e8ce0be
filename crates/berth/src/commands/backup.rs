//! Backup commands

use anyhow::{bail, Result};
use berth_core::BackupFrequency;
use berth_engine::{BackupConfigRequest, BackupConfigUpdate, Engine};
use tracing::debug;

use crate::cli::BackupCommand;
use crate::output::{
    is_json_mode, print_backup, print_backup_configs, print_backups, print_json, print_success,
    print_tick_report,
};

pub async fn execute(engine: &Engine, command: BackupCommand) -> Result<()> {
    match command {
        BackupCommand::ConfigAdd {
            instance,
            frequency,
            directory,
            no_prune,
            days_to_keep,
        } => {
            let request = BackupConfigRequest {
                frequency: frequency.parse()?,
                directory,
                auto_prune: !no_prune,
                days_to_keep,
            };
            let config = engine.add_backup_config(&instance, request).await?;
            if is_json_mode() {
                print_json(&config);
            } else {
                print_success(&format!(
                    "Added {} backup configuration {} for {}",
                    config.frequency, config.id, instance
                ));
            }
            Ok(())
        }
        BackupCommand::ConfigSet {
            config_id,
            active,
            inactive,
            frequency,
            days_to_keep,
        } => {
            let update = BackupConfigUpdate {
                active: if active {
                    Some(true)
                } else if inactive {
                    Some(false)
                } else {
                    None
                },
                frequency: frequency.as_deref().map(str::parse::<BackupFrequency>).transpose()?,
                days_to_keep,
            };
            debug!("Updating backup configuration {}: {:?}", config_id, update);
            let config = engine.update_backup_config(config_id, update).await?;
            if is_json_mode() {
                print_json(&config);
            } else {
                let state = if config.active { "active" } else { "inactive" };
                print_success(&format!(
                    "Backup configuration {} is {} ({})",
                    config.id, state, config.frequency
                ));
            }
            Ok(())
        }
        BackupCommand::ConfigDelete { config_id } => {
            engine.delete_backup_config(config_id).await?;
            if is_json_mode() {
                print_json(&serde_json::json!({ "deleted": config_id }));
            } else {
                print_success(&format!("Deleted backup configuration {}", config_id));
            }
            Ok(())
        }
        BackupCommand::Configs { instance } => {
            print_backup_configs(&engine.backup_configs(instance.as_deref()).await?);
            Ok(())
        }
        BackupCommand::Tick => {
            let report = engine.tick().await?;
            print_tick_report(&report);
            if !report.failed.is_empty() {
                bail!("{} backup configuration(s) failed", report.failed.len());
            }
            Ok(())
        }
        BackupCommand::Run { instance, config_id } => {
            let backup = match (instance, config_id) {
                (_, Some(id)) => engine.run_backup_config(id).await?,
                (Some(name), None) => engine.run_backup_now(&name).await?,
                (None, None) => bail!("Provide an instance name or --config-id"),
            };
            print_backup(&backup);
            Ok(())
        }
        BackupCommand::List { instance } => {
            print_backups(&engine.backups(&instance).await?);
            Ok(())
        }
        BackupCommand::Delete { backup_id } => {
            engine.delete_backup(backup_id).await?;
            if is_json_mode() {
                print_json(&serde_json::json!({ "deleted": backup_id }));
            } else {
                print_success(&format!("Deleted backup {}", backup_id));
            }
            Ok(())
        }
        BackupCommand::Prune { config_id } => {
            let removed = engine.prune_backups(config_id).await?;
            if is_json_mode() {
                print_json(&serde_json::json!({ "config_id": config_id, "removed": removed }));
            } else {
                print_success(&format!("Pruned {} backup(s)", removed));
            }
            Ok(())
        }
    }
}
