//! Settings file parsing for Berth
//!
//! Supports multiple configuration file formats:
//! - TOML (.toml)
//! - YAML (.yaml, .yml)
//! - JSON (.json)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::constants::*;
use crate::error::{Error, Result};
use crate::naming;
use crate::types::Instance;

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Yaml,
    Json,
}

impl ConfigFormat {
    /// Detect format from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(ConfigFormat::Toml),
            "yaml" | "yml" => Some(ConfigFormat::Yaml),
            "json" => Some(ConfigFormat::Json),
            _ => None,
        }
    }

    /// Detect format from file path
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

/// Reverse proxy routing settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RoutingSettings {
    /// Base domain; instances are served at `<slug>.<base_domain>`. Empty disables routing.
    pub base_domain: String,
    pub enable_https: bool,
    pub cert_resolver: String,
    pub http_entrypoint: String,
    pub https_entrypoint: String,
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            base_domain: String::new(),
            enable_https: true,
            cert_resolver: "letsencrypt".to_string(),
            http_entrypoint: "web".to_string(),
            https_entrypoint: "websecure".to_string(),
        }
    }
}

impl RoutingSettings {
    /// Trimmed base domain, if routing is configured
    pub fn domain(&self) -> Option<&str> {
        let domain = self.base_domain.trim();
        (!domain.is_empty()).then_some(domain)
    }

    pub fn scheme(&self) -> &'static str {
        if self.enable_https {
            "https"
        } else {
            "http"
        }
    }

    /// Public host for an instance, if it is mapped to a domain
    pub fn public_host(&self, instance: &Instance) -> Option<String> {
        if !instance.map_domain {
            return None;
        }
        self.domain()
            .map(|domain| naming::public_host(&instance.name, domain))
    }

    /// Public URL for an instance, if it is mapped to a domain
    pub fn public_url(&self, instance: &Instance) -> Option<String> {
        self.public_host(instance)
            .map(|host| format!("{}://{}", self.scheme(), host))
    }
}

/// Filesystem locations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PathSettings {
    pub instances_root: PathBuf,
    pub database: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            instances_root: default_instances_root(),
            database: db_path(),
        }
    }
}

/// Host port pool
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PortSettings {
    pub range_start: u16,
    pub range_end: u16,
    /// Address probed when checking whether a port is free
    pub bind_host: String,
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            range_start: DEFAULT_PORT_RANGE_START,
            range_end: DEFAULT_PORT_RANGE_END,
            bind_host: "0.0.0.0".to_string(),
        }
    }
}

/// Container runtime invocation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RuntimeSettings {
    /// Compose program, e.g. `docker-compose` or `docker compose`
    pub compose_command: String,
    pub command_timeout_secs: u64,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            compose_command: "docker-compose".to_string(),
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
        }
    }
}

impl RuntimeSettings {
    /// Program and leading arguments of the compose command
    pub fn compose_program(&self) -> (String, Vec<String>) {
        let mut parts = self.compose_command.split_whitespace().map(String::from);
        let program = parts.next().unwrap_or_else(|| "docker-compose".to_string());
        (program, parts.collect())
    }
}

/// Database backup endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackupSettings {
    /// Host the application's HTTP port is reached on
    pub endpoint_host: String,
    pub request_timeout_secs: u64,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            endpoint_host: "127.0.0.1".to_string(),
            request_timeout_secs: DEFAULT_BACKUP_TIMEOUT_SECS,
        }
    }
}

/// Source hosting and build server credentials
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CiSettings {
    pub git_user: Option<String>,
    pub git_token: Option<String>,
    pub git_webhook_url: Option<String>,
    pub github_api_base: String,
    pub jenkins_url: Option<String>,
    pub jenkins_user: Option<String>,
    pub jenkins_token: Option<String>,
}

impl Default for CiSettings {
    fn default() -> Self {
        Self {
            git_user: None,
            git_token: None,
            git_webhook_url: None,
            github_api_base: "https://api.github.com".to_string(),
            jenkins_url: None,
            jenkins_user: None,
            jenkins_token: None,
        }
    }
}

impl CiSettings {
    pub fn has_git_credentials(&self) -> bool {
        non_empty(&self.git_user) && non_empty(&self.git_token)
    }

    pub fn has_jenkins_credentials(&self) -> bool {
        non_empty(&self.jenkins_url) && non_empty(&self.jenkins_user) && non_empty(&self.jenkins_token)
    }
}

fn non_empty(value: &Option<String>) -> bool {
    value.as_deref().map_or(false, |v| !v.trim().is_empty())
}

/// HTTP API settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WebSettings {
    pub bind: String,
}

impl Default for WebSettings {
    fn default() -> Self {
        Self {
            bind: DEFAULT_WEB_BIND.to_string(),
        }
    }
}

/// Top-level settings file (berth.toml/yaml/json)
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub routing: RoutingSettings,
    /// Publish host ports for local debugging
    pub development_mode: bool,
    pub paths: PathSettings,
    pub ports: PortSettings,
    pub runtime: RuntimeSettings,
    pub backup: BackupSettings,
    pub ci: CiSettings,
    pub web: WebSettings,
}

impl Settings {
    /// Load settings from file, automatically detecting format from extension
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::ConfigNotFound(path.to_path_buf()));
        }

        let format = ConfigFormat::from_path(path).ok_or_else(|| {
            Error::ConfigError(format!(
                "Unsupported config file extension: {}. Expected .toml, .yaml, .yml, or .json",
                path.display()
            ))
        })?;

        let content = std::fs::read_to_string(path)?;
        let settings = Self::parse(&content, format)?;
        settings.validate()?;
        debug!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Load from an explicit path, or from the default path falling back to defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let path = settings_path();
                if path.exists() {
                    Self::load(&path)
                } else {
                    debug!("Settings not found at {:?}, using defaults", path);
                    Ok(Self::default())
                }
            }
        }
    }

    /// Parse settings content with specified format
    pub fn parse(content: &str, format: ConfigFormat) -> Result<Self> {
        let settings = match format {
            ConfigFormat::Toml => toml::from_str(content)?,
            ConfigFormat::Yaml => serde_yaml::from_str(content)?,
            ConfigFormat::Json => serde_json::from_str(content)?,
        };
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ports.range_start > self.ports.range_end {
            return Err(Error::config(format!(
                "Port range start {} is greater than end {}",
                self.ports.range_start, self.ports.range_end
            )));
        }
        if self.runtime.command_timeout_secs == 0 {
            return Err(Error::config("runtime.command_timeout_secs must be greater than zero"));
        }
        if self.backup.request_timeout_secs == 0 {
            return Err(Error::config("backup.request_timeout_secs must be greater than zero"));
        }
        Ok(())
    }
}
