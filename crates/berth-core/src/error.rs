//! Error types for Berth

use std::path::PathBuf;

/// Berth error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Deployment failed: {0}")]
    Deployment(String),

    #[error("Integration error: {0}")]
    Integration(String),

    #[error("Backup request failed: {0}")]
    BackupRequest(String),

    #[error("Backup storage error: {0}")]
    BackupStorage(String),

    #[error("No free port found between {start}-{end}")]
    NoPortAvailable { start: u16, end: u16 },

    #[error("Instance not found: {0}")]
    InstanceNotFound(String),

    #[error("Backup not found: {0}")]
    BackupNotFound(String),

    #[error("Backup configuration not found: {0}")]
    BackupConfigNotFound(i64),

    #[error("Resource tier not found: {0}")]
    TierNotFound(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("Database error: {0}")]
    DbError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("YAML parse error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

/// Result type alias for Berth
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Error::Validation(msg.into())
    }

    pub fn deployment<S: Into<String>>(msg: S) -> Self {
        Error::Deployment(msg.into())
    }

    pub fn integration<S: Into<String>>(msg: S) -> Self {
        Error::Integration(msg.into())
    }

    pub fn backup_request<S: Into<String>>(msg: S) -> Self {
        Error::BackupRequest(msg.into())
    }

    pub fn backup_storage<S: Into<String>>(msg: S) -> Self {
        Error::BackupStorage(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::ConfigError(msg.into())
    }

    pub fn db<S: Into<String>>(msg: S) -> Self {
        Error::DbError(msg.into())
    }

    /// Whether the error means the addressed record does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::InstanceNotFound(_)
                | Error::BackupNotFound(_)
                | Error::BackupConfigNotFound(_)
                | Error::TierNotFound(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InstanceNotFound("acme".to_string());
        assert_eq!(err.to_string(), "Instance not found: acme");

        let err = Error::NoPortAvailable { start: 8069, end: 9000 };
        assert_eq!(err.to_string(), "No free port found between 8069-9000");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::IoError(_)));
    }

    #[test]
    fn test_is_not_found() {
        assert!(Error::TierNotFound("gold".into()).is_not_found());
        assert!(Error::BackupConfigNotFound(3).is_not_found());
        assert!(!Error::validation("bad").is_not_found());
    }
}
