//! Database backup endpoint client

use async_trait::async_trait;
use berth_core::{BackupSettings, Error, Instance, Result};
use std::time::Duration;
use tracing::{debug, info};

/// One backup download request against an instance's application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRequest {
    pub url: String,
    pub master_password: String,
    pub database: String,
}

impl BackupRequest {
    /// Request for `instance`, or a validation error if it has no port or database
    pub fn for_instance(instance: &Instance, endpoint_host: &str) -> Result<Self> {
        let port = instance.http_port.ok_or_else(|| {
            Error::validation(format!("Instance {} has no HTTP port", instance.name))
        })?;
        if instance.db_name.is_empty() {
            return Err(Error::validation(format!(
                "No database name for {}",
                instance.name
            )));
        }
        let master_password = if instance.admin_password.is_empty() {
            "admin".to_string()
        } else {
            instance.admin_password.clone()
        };

        Ok(Self {
            url: format!("http://{}:{}/web/database/backup", endpoint_host, port),
            master_password,
            database: instance.db_name.clone(),
        })
    }
}

/// Fetches a zipped database dump
#[async_trait]
pub trait DatabaseBackupClient: Send + Sync {
    /// Returns the archive bytes, or `Error::BackupRequest` on transport failure,
    /// timeout or a non-2xx response
    async fn fetch(&self, request: &BackupRequest) -> Result<Vec<u8>>;
}

/// HTTP form POST to the application's database manager
pub struct HttpBackupClient {
    client: reqwest::Client,
}

impl HttpBackupClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    pub fn from_settings(settings: &BackupSettings) -> Result<Self> {
        Self::new(Duration::from_secs(settings.request_timeout_secs))
    }
}

#[async_trait]
impl DatabaseBackupClient for HttpBackupClient {
    async fn fetch(&self, request: &BackupRequest) -> Result<Vec<u8>> {
        info!("Requesting backup of {} from {}", request.database, request.url);

        let form = [
            ("master_pwd", request.master_password.as_str()),
            ("name", request.database.as_str()),
            ("backup_format", "zip"),
        ];
        let response = self
            .client
            .post(&request.url)
            .form(&form)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::backup_request(e.to_string()))?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::backup_request(e.to_string()))?;

        debug!("Received {} bytes for {}", bytes.len(), request.database);
        Ok(bytes.to_vec())
    }
}
