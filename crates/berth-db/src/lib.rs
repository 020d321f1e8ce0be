//! Berth Database - SQLite persistence layer

pub mod audit;
pub mod backup_configs;
pub mod backups;
pub mod instances;
pub mod schema;
pub mod tiers;

use berth_core::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::path::Path;
use tracing::info;

pub use audit::AuditRepository;
pub use backup_configs::BackupConfigsRepository;
pub use backups::BackupsRepository;
pub use instances::InstancesRepository;
pub use tiers::TiersRepository;

/// Database connection and operations
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection
    pub async fn new(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::DbError(e.to_string()))?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.display());
        info!("Connecting to database: {}", url);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .map_err(|e| Error::DbError(e.to_string()))?;

        // Instance rows hold credentials
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)) {
                tracing::warn!("Failed to set database file permissions: {}", e);
            }
        }

        sqlx::query(schema::SCHEMA)
            .execute(&pool)
            .await
            .map_err(|e| Error::DbError(e.to_string()))?;

        info!("Database initialized");
        Ok(Self { pool })
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn instances(&self) -> InstancesRepository {
        InstancesRepository::new(self.pool.clone())
    }

    pub fn tiers(&self) -> TiersRepository {
        TiersRepository::new(self.pool.clone())
    }

    pub fn backup_configs(&self) -> BackupConfigsRepository {
        BackupConfigsRepository::new(self.pool.clone())
    }

    pub fn backups(&self) -> BackupsRepository {
        BackupsRepository::new(self.pool.clone())
    }

    pub fn audit(&self) -> AuditRepository {
        AuditRepository::new(self.pool.clone())
    }

    /// Close the database connection
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Fixed-width UTC text so that string order matches time order
pub(crate) fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::DbError(format!("Invalid timestamp '{}': {}", value, e)))
}

pub(crate) fn parse_opt_ts(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value.as_deref().map(parse_ts).transpose()
}

/// Map a constraint violation to a validation error, everything else to a database error
pub(crate) fn map_write_error(e: sqlx::Error, what: &str) -> Error {
    match &e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            Error::validation(format!("{} already exists: {}", what, db_err.message()))
        }
        _ => Error::DbError(e.to_string()),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use berth_core::{AppVersion, Instance, RoutingSettings};
    use tempfile::{tempdir, TempDir};

    // Return both Database and TempDir to keep the directory alive
    pub async fn setup_db() -> (Database, TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::new(&db_path).await.unwrap();
        (db, dir)
    }

    pub fn sample_instance(name: &str, port: u16) -> Instance {
        Instance::try_new(
            name,
            AppVersion::V17,
            Path::new("/srv/odoo"),
            &RoutingSettings::default(),
        )
        .unwrap()
        .with_ports(port, port + 1)
    }
}
