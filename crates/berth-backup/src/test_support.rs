use crate::client::{BackupRequest, DatabaseBackupClient};
use async_trait::async_trait;
use berth_core::{AppVersion, Error, Instance, Result, RoutingSettings};
use berth_db::Database;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::Path;
use tempfile::{tempdir, TempDir};

pub const PAYLOAD: &[u8] = b"PK\x03\x04backup";

// Return both Database and TempDir to keep the directory alive
pub async fn setup_db() -> (Database, TempDir) {
    let dir = tempdir().unwrap();
    let db = Database::new(&dir.path().join("test.db")).await.unwrap();
    (db, dir)
}

pub fn sample_instance(name: &str, port: u16) -> Instance {
    Instance::try_new(name, AppVersion::V17, Path::new("/srv/odoo"), &RoutingSettings::default())
        .unwrap()
        .with_ports(port, port + 1)
}

/// Insert an instance rooted under `root`
pub async fn insert_instance(db: &Database, root: &Path, name: &str, port: u16) -> Instance {
    let mut instance = Instance::try_new(name, AppVersion::V17, root, &RoutingSettings::default())
        .unwrap()
        .with_ports(port, port + 1);
    instance.id = db.instances().insert(&instance).await.unwrap();
    instance
}

pub fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

/// Backup endpoint double: fails for the listed databases, records every request
#[derive(Default)]
pub struct FakeBackupClient {
    pub failing: HashSet<String>,
    pub requests: Mutex<Vec<BackupRequest>>,
}

impl FakeBackupClient {
    pub fn failing_for(databases: &[&str]) -> Self {
        Self {
            failing: databases.iter().map(|d| d.to_string()).collect(),
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl DatabaseBackupClient for FakeBackupClient {
    async fn fetch(&self, request: &BackupRequest) -> Result<Vec<u8>> {
        self.requests.lock().push(request.clone());
        if self.failing.contains(&request.database) {
            return Err(Error::backup_request("operation timed out"));
        }
        Ok(PAYLOAD.to_vec())
    }
}
