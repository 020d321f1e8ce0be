//! Age-based pruning of successful backups

use berth_core::{BackupConfig, Result};
use berth_db::Database;
use chrono::{DateTime, Utc};
use tracing::info;

/// Delete successful backups of `config` older than its retention window.
/// Failed backups are kept regardless of age. Returns the number deleted.
pub async fn prune(db: &Database, config: &BackupConfig, now: DateTime<Utc>) -> Result<usize> {
    let Some(cutoff) = config.prune_cutoff(now) else {
        return Ok(0);
    };

    let backups = db.backups();
    let mut deleted = 0;
    for backup in backups.find_prunable(config.id, cutoff).await? {
        if backups.delete(&backup).await? {
            deleted += 1;
        }
    }

    if deleted > 0 {
        info!(
            "Pruned {} backup(s) older than {} days for config {}",
            deleted, config.days_to_keep, config.id
        );
    }
    Ok(deleted)
}
