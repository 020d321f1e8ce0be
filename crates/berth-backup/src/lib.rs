//! Berth Backup - Scheduled database backups, outcome recording and retention

pub mod client;
pub mod executor;
pub mod retention;
pub mod scheduler;

pub use client::{BackupRequest, DatabaseBackupClient, HttpBackupClient};
pub use executor::BackupExecutor;
pub use retention::prune;
pub use scheduler::{BackupScheduler, FailedRun, TickReport};

#[cfg(test)]
pub(crate) mod test_support;
