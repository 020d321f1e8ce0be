//! Core types for Berth

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config::RoutingSettings;
use crate::constants::*;
use crate::error::{Error, Result};
use crate::naming;

/// Lifecycle state of an instance
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    #[default]
    Draft,
    Stopped,
    Running,
    Error,
}

impl InstanceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceState::Draft => "draft",
            InstanceState::Stopped => "stopped",
            InstanceState::Running => "running",
            InstanceState::Error => "error",
        }
    }

    /// Only draft and stopped instances may be started
    pub fn can_start(&self) -> bool {
        matches!(self, InstanceState::Draft | InstanceState::Stopped)
    }
}

impl std::fmt::Display for InstanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for InstanceState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(InstanceState::Draft),
            "stopped" => Ok(InstanceState::Stopped),
            "running" => Ok(InstanceState::Running),
            "error" => Ok(InstanceState::Error),
            _ => Err(Error::validation(format!("Invalid instance state: {}", s))),
        }
    }
}

/// Application release deployed by an instance
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum AppVersion {
    #[default]
    #[serde(rename = "17.0")]
    V17,
    #[serde(rename = "18.0")]
    V18,
    #[serde(rename = "19.0")]
    V19,
}

impl AppVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppVersion::V17 => "17.0",
            AppVersion::V18 => "18.0",
            AppVersion::V19 => "19.0",
        }
    }

    /// Container image for this release
    pub fn image(&self) -> String {
        format!("odoo:{}", self.as_str())
    }
}

impl std::fmt::Display for AppVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AppVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "17" | "17.0" => Ok(AppVersion::V17),
            "18" | "18.0" => Ok(AppVersion::V18),
            "19" | "19.0" => Ok(AppVersion::V19),
            _ => Err(Error::validation(format!("Unsupported version: {}", s))),
        }
    }
}

/// CPU and memory bounds for one service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceResources {
    /// Maximum CPU cores (0 = unlimited)
    pub cpu_limit: f64,
    /// Guaranteed CPU cores (0 = none)
    pub cpu_reservation: f64,
    /// Maximum memory, e.g. "512m" (empty = unlimited)
    pub memory_limit: String,
    /// Guaranteed memory (empty = none)
    pub memory_reservation: String,
}

impl ServiceResources {
    pub fn new(
        cpu_limit: f64,
        cpu_reservation: f64,
        memory_limit: impl Into<String>,
        memory_reservation: impl Into<String>,
    ) -> Self {
        Self {
            cpu_limit,
            cpu_reservation,
            memory_limit: memory_limit.into(),
            memory_reservation: memory_reservation.into(),
        }
    }

    /// No limits and no reservations
    pub fn unbounded() -> Self {
        Self::new(0.0, 0.0, "", "")
    }

    pub fn has_limits(&self) -> bool {
        self.cpu_limit > 0.0 || !self.memory_limit.is_empty()
    }

    pub fn has_reservations(&self) -> bool {
        self.cpu_reservation > 0.0 || !self.memory_reservation.is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        if self.cpu_limit < 0.0 || self.cpu_reservation < 0.0 {
            return Err(Error::validation("CPU values must not be negative"));
        }
        Ok(())
    }
}

/// Resource bounds for the application and its database
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceLimits {
    pub app: ServiceResources,
    pub database: ServiceResources,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            app: ServiceResources::new(2.0, 1.0, "4g", "1g"),
            database: ServiceResources::new(1.0, 0.5, "2g", "1g"),
        }
    }
}

impl ResourceLimits {
    pub fn validate(&self) -> Result<()> {
        self.app.validate()?;
        self.database.validate()
    }
}

/// A provisioned application deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub db_name: String,
    pub version: AppVersion,
    pub http_port: Option<u16>,
    pub longpolling_port: Option<u16>,
    pub instance_path: PathBuf,
    pub db_user: String,
    pub db_password: String,
    pub admin_password: String,
    pub map_domain: bool,
    pub mapped_domain: Option<String>,
    pub tier_id: Option<i64>,
    pub resources: ResourceLimits,
    pub state: InstanceState,
    pub last_error: Option<String>,
    pub need_custom_addons: bool,
    pub repository_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Instance {
    /// Create a draft instance with fresh credentials and derived names.
    /// Ports are assigned separately by the allocator.
    pub fn try_new(
        name: impl Into<String>,
        version: AppVersion,
        instances_root: &Path,
        routing: &RoutingSettings,
    ) -> Result<Self> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(Error::validation("Instance name must not be empty"));
        }

        let mut instance = Self {
            id: 0,
            name,
            slug: String::new(),
            db_name: String::new(),
            version,
            http_port: None,
            longpolling_port: None,
            instance_path: PathBuf::new(),
            db_user: DEFAULT_DB_USER.to_string(),
            db_password: naming::generate_secret(DB_PASSWORD_LENGTH),
            admin_password: naming::generate_secret(ADMIN_PASSWORD_LENGTH),
            map_domain: true,
            mapped_domain: None,
            tier_id: None,
            resources: ResourceLimits::default(),
            state: InstanceState::Draft,
            last_error: None,
            need_custom_addons: false,
            repository_url: None,
            created_at: Utc::now(),
        };
        instance.refresh_derived(instances_root, routing);
        Ok(instance)
    }

    /// Recompute every field derived from the name and routing settings
    pub fn refresh_derived(&mut self, instances_root: &Path, routing: &RoutingSettings) {
        self.slug = naming::instance_slug(&self.name);
        self.db_name = naming::db_identifier(&self.name);
        self.instance_path = instances_root.join(naming::safe_dir_name(&self.name));
        self.mapped_domain = routing.public_url(self);
    }

    pub fn with_ports(mut self, http_port: u16, longpolling_port: u16) -> Self {
        self.http_port = Some(http_port);
        self.longpolling_port = Some(longpolling_port);
        self
    }

    pub fn with_map_domain(mut self, map_domain: bool) -> Self {
        self.map_domain = map_domain;
        self
    }

    pub fn with_custom_addons(mut self, enabled: bool) -> Self {
        self.need_custom_addons = enabled;
        self
    }

    pub fn compose_path(&self) -> PathBuf {
        self.instance_path.join(COMPOSE_FILE)
    }

    pub fn config_dir(&self) -> PathBuf {
        self.instance_path.join(CONFIG_DIR)
    }

    pub fn runtime_config_path(&self) -> PathBuf {
        self.config_dir().join(RUNTIME_CONFIG_FILE)
    }

    pub fn addons_path(&self) -> PathBuf {
        self.instance_path.join(ADDONS_DIR)
    }

    pub fn git_addons_path(&self) -> PathBuf {
        self.addons_path().join(GIT_ADDONS_DIR)
    }

    pub fn default_backup_dir(&self) -> PathBuf {
        self.instance_path.join(BACKUPS_DIR)
    }

    /// Direct URL on the host-mapped port
    pub fn instance_url(&self, host: &str) -> Option<String> {
        self.http_port.map(|port| format!("http://{}:{}", host, port))
    }
}

/// How often a backup configuration runs
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackupFrequency {
    #[default]
    Daily,
    Weekly,
    Monthly,
}

impl BackupFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupFrequency::Daily => "daily",
            BackupFrequency::Weekly => "weekly",
            BackupFrequency::Monthly => "monthly",
        }
    }

    /// Next run after `reference`. Monthly steps are calendar months,
    /// clamped to the last day of a shorter month.
    pub fn next_after(&self, reference: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            BackupFrequency::Daily => reference + Duration::days(1),
            BackupFrequency::Weekly => reference + Duration::weeks(1),
            BackupFrequency::Monthly => reference
                .checked_add_months(Months::new(1))
                .unwrap_or(reference + Duration::days(30)),
        }
    }
}

impl std::fmt::Display for BackupFrequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BackupFrequency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "daily" => Ok(BackupFrequency::Daily),
            "weekly" => Ok(BackupFrequency::Weekly),
            "monthly" => Ok(BackupFrequency::Monthly),
            _ => Err(Error::validation(format!("Invalid backup frequency: {}", s))),
        }
    }
}

/// Where backup archives are stored
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackupDestination {
    #[default]
    Local,
}

impl BackupDestination {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupDestination::Local => "local",
        }
    }
}

impl FromStr for BackupDestination {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "local" => Ok(BackupDestination::Local),
            _ => Err(Error::validation(format!("Invalid backup destination: {}", s))),
        }
    }
}

/// Outcome of a backup run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackupStatus {
    Success,
    Failed,
}

impl BackupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupStatus::Success => "success",
            BackupStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for BackupStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BackupStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "success" => Ok(BackupStatus::Success),
            "failed" => Ok(BackupStatus::Failed),
            _ => Err(Error::validation(format!("Invalid backup status: {}", s))),
        }
    }
}

/// Recurring backup schedule for one instance.
///
/// `next_execution` is set exactly when `active` is true; use the setters
/// below rather than writing the fields directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    pub id: i64,
    pub instance_id: i64,
    pub name: String,
    pub active: bool,
    pub frequency: BackupFrequency,
    pub destination: BackupDestination,
    pub backup_directory: Option<PathBuf>,
    pub auto_prune: bool,
    pub days_to_keep: i64,
    pub last_execution: Option<DateTime<Utc>>,
    pub next_execution: Option<DateTime<Utc>>,
    pub last_status: Option<BackupStatus>,
    pub last_message: Option<String>,
}

impl BackupConfig {
    /// Active daily configuration, scheduled one interval after `now`
    pub fn new(instance_id: i64, now: DateTime<Utc>) -> Self {
        let mut config = Self {
            id: 0,
            instance_id,
            name: "Backup Configuration".to_string(),
            active: true,
            frequency: BackupFrequency::Daily,
            destination: BackupDestination::Local,
            backup_directory: None,
            auto_prune: true,
            days_to_keep: DEFAULT_DAYS_TO_KEEP as i64,
            last_execution: None,
            next_execution: None,
            last_status: None,
            last_message: None,
        };
        config.schedule_next(now);
        config
    }

    pub fn with_frequency(mut self, frequency: BackupFrequency, now: DateTime<Utc>) -> Self {
        self.set_frequency(frequency, now);
        self
    }

    pub fn with_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.backup_directory = Some(dir.into());
        self
    }

    pub fn with_retention(mut self, auto_prune: bool, days_to_keep: i64) -> Self {
        self.auto_prune = auto_prune;
        self.days_to_keep = days_to_keep;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.auto_prune && self.days_to_keep <= 0 {
            return Err(Error::validation("Days to keep must be greater than zero"));
        }
        if self.active != self.next_execution.is_some() {
            return Err(Error::validation(
                "Next execution must be set if and only if the configuration is active",
            ));
        }
        Ok(())
    }

    /// Schedule the next run one interval after `reference`, or clear it when inactive
    pub fn schedule_next(&mut self, reference: DateTime<Utc>) {
        self.next_execution = if self.active {
            Some(self.frequency.next_after(reference))
        } else {
            None
        };
    }

    pub fn set_active(&mut self, active: bool, now: DateTime<Utc>) {
        self.active = active;
        self.schedule_next(now);
    }

    pub fn set_frequency(&mut self, frequency: BackupFrequency, now: DateTime<Utc>) {
        self.frequency = frequency;
        self.schedule_next(now);
    }

    /// Record the outcome of a run at `now` and reschedule from `now`
    pub fn record_outcome(&mut self, status: BackupStatus, message: impl Into<String>, now: DateTime<Utc>) {
        self.last_execution = Some(now);
        self.last_status = Some(status);
        self.last_message = Some(message.into());
        self.schedule_next(now);
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.active && self.next_execution.map_or(false, |next| next <= now)
    }

    /// Successful backups dated before this instant are eligible for pruning
    pub fn prune_cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.auto_prune && self.days_to_keep > 0 {
            Some(now - Duration::days(self.days_to_keep))
        } else {
            None
        }
    }
}

/// One backup attempt and, on success, its stored artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Backup {
    pub id: i64,
    pub instance_id: i64,
    pub config_id: Option<i64>,
    pub name: String,
    pub backup_date: DateTime<Utc>,
    pub file_path: Option<PathBuf>,
    pub file_size: u64,
    pub status: BackupStatus,
    pub message: Option<String>,
}

impl Backup {
    pub fn success(
        instance_id: i64,
        config_id: Option<i64>,
        name: impl Into<String>,
        file_path: PathBuf,
        file_size: u64,
        backup_date: DateTime<Utc>,
    ) -> Self {
        let message = format!("Stored locally at {}", file_path.display());
        Self {
            id: 0,
            instance_id,
            config_id,
            name: name.into(),
            backup_date,
            file_path: Some(file_path),
            file_size,
            status: BackupStatus::Success,
            message: Some(message),
        }
    }

    pub fn failed(
        instance_id: i64,
        config_id: Option<i64>,
        message: impl Into<String>,
        backup_date: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            instance_id,
            config_id,
            name: "Failed Backup".to_string(),
            backup_date,
            file_path: None,
            file_size: 0,
            status: BackupStatus::Failed,
            message: Some(message.into()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.status == BackupStatus::Success && self.file_path.is_none() {
            return Err(Error::validation(
                "A successful backup must record its file path",
            ));
        }
        Ok(())
    }

    /// Size formatted with binary units, e.g. "1.50 KB"
    pub fn readable_size(&self) -> String {
        human_size(self.file_size)
    }
}

/// Format a byte count with binary units
pub fn human_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }
    const LABELS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size > 1024.0 && unit < LABELS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", size, LABELS[unit])
}

/// Named template of resource bounds, applied to instances by copy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceTier {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub sequence: i64,
    pub active: bool,
    pub description: Option<String>,
    pub target_user_count: Option<String>,
    pub price_monthly: Option<f64>,
    pub notes: Option<String>,
    pub resources: ResourceLimits,
}

impl ResourceTier {
    pub fn new(code: impl Into<String>, name: impl Into<String>, resources: ResourceLimits) -> Self {
        Self {
            id: 0,
            code: code.into(),
            name: name.into(),
            sequence: 10,
            active: true,
            description: None,
            target_user_count: None,
            price_monthly: None,
            notes: None,
            resources,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.code.trim().is_empty() {
            return Err(Error::validation("Tier code must not be empty"));
        }
        if self.name.trim().is_empty() {
            return Err(Error::validation("Tier name must not be empty"));
        }
        self.resources.validate()
    }
}

/// Kind of record an audit entry refers to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEntity {
    Instance,
    BackupConfig,
    Tier,
}

impl AuditEntity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEntity::Instance => "instance",
            AuditEntity::BackupConfig => "backup_config",
            AuditEntity::Tier => "tier",
        }
    }
}

impl FromStr for AuditEntity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "instance" => Ok(AuditEntity::Instance),
            "backup_config" => Ok(AuditEntity::BackupConfig),
            "tier" => Ok(AuditEntity::Tier),
            _ => Err(Error::validation(format!("Invalid audit entity: {}", s))),
        }
    }
}

/// Append-only record of a state change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub entity: AuditEntity,
    pub entity_id: i64,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn routing() -> RoutingSettings {
        RoutingSettings {
            base_domain: "example.com".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_instance_state_roundtrip() {
        for state in [
            InstanceState::Draft,
            InstanceState::Stopped,
            InstanceState::Running,
            InstanceState::Error,
        ] {
            assert_eq!(state.as_str().parse::<InstanceState>().unwrap(), state);
        }
        assert!("paused".parse::<InstanceState>().is_err());
    }

    #[test]
    fn test_can_start() {
        assert!(InstanceState::Draft.can_start());
        assert!(InstanceState::Stopped.can_start());
        assert!(!InstanceState::Running.can_start());
        assert!(!InstanceState::Error.can_start());
    }

    #[test]
    fn test_app_version() {
        assert_eq!("18.0".parse::<AppVersion>().unwrap(), AppVersion::V18);
        assert_eq!("19".parse::<AppVersion>().unwrap(), AppVersion::V19);
        assert_eq!(AppVersion::V17.image(), "odoo:17.0");
        assert!("16.0".parse::<AppVersion>().is_err());
    }

    #[test]
    fn test_instance_new_derives_fields() {
        let root = PathBuf::from("/srv/instances");
        let instance = Instance::try_new("Acme Corp", AppVersion::V17, &root, &routing()).unwrap();

        assert_eq!(instance.slug, "acme-corp");
        assert_eq!(instance.db_name, "acme_corp");
        assert_eq!(instance.instance_path, PathBuf::from("/srv/instances/acme_corp"));
        assert_eq!(instance.mapped_domain.as_deref(), Some("https://acme-corp.example.com"));
        assert_eq!(instance.state, InstanceState::Draft);
        assert_eq!(instance.db_user, "odoo");
        assert_eq!(instance.db_password.len(), 16);
        assert_eq!(instance.admin_password.len(), 12);
        assert_eq!(instance.compose_path(), root.join("acme_corp/docker-compose.yml"));
        assert_eq!(instance.runtime_config_path(), root.join("acme_corp/config/odoo.conf"));
        assert_eq!(instance.git_addons_path(), root.join("acme_corp/addons/git_addons"));
    }

    #[test]
    fn test_instance_empty_name_rejected() {
        let result = Instance::try_new("   ", AppVersion::V17, Path::new("/srv"), &routing());
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_refresh_derived_after_rename() {
        let root = PathBuf::from("/srv");
        let mut instance = Instance::try_new("old", AppVersion::V17, &root, &routing()).unwrap();
        instance.name = "New Name".to_string();
        instance.refresh_derived(&root, &routing());
        assert_eq!(instance.slug, "new-name");
        assert_eq!(instance.instance_path, PathBuf::from("/srv/new_name"));
    }

    #[test]
    fn test_mapped_domain_absent_without_flag() {
        let root = PathBuf::from("/srv");
        let mut instance = Instance::try_new("shop", AppVersion::V17, &root, &routing()).unwrap();
        instance.map_domain = false;
        instance.refresh_derived(&root, &routing());
        assert!(instance.mapped_domain.is_none());
    }

    #[test]
    fn test_instance_url() {
        let instance = Instance::try_new("shop", AppVersion::V17, Path::new("/srv"), &routing())
            .unwrap()
            .with_ports(8070, 8071);
        assert_eq!(instance.instance_url("localhost").as_deref(), Some("http://localhost:8070"));
    }

    #[test]
    fn test_resource_presence() {
        let res = ServiceResources::new(0.0, 0.0, "", "");
        assert!(!res.has_limits());
        assert!(!res.has_reservations());

        let res = ServiceResources::new(0.0, 0.0, "1g", "");
        assert!(res.has_limits());
        assert!(!res.has_reservations());

        let res = ServiceResources::new(0.0, 0.25, "", "");
        assert!(!res.has_limits());
        assert!(res.has_reservations());
    }

    #[test]
    fn test_compute_next_daily_weekly() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(BackupFrequency::Daily.next_after(t), at(2024, 1, 2));
        assert_eq!(BackupFrequency::Weekly.next_after(t), at(2024, 1, 8));
    }

    #[test]
    fn test_compute_next_monthly_clamps_month_end() {
        assert_eq!(BackupFrequency::Monthly.next_after(at(2024, 1, 31)), at(2024, 2, 29));
        assert_eq!(BackupFrequency::Monthly.next_after(at(2023, 1, 31)), at(2023, 2, 28));
        assert_eq!(BackupFrequency::Monthly.next_after(at(2024, 12, 15)), at(2025, 1, 15));
    }

    #[test]
    fn test_backup_config_scheduled_on_creation() {
        let t = at(2024, 1, 1);
        let config = BackupConfig::new(1, t);
        assert!(config.active);
        assert_eq!(config.next_execution, Some(at(2024, 1, 2)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_backup_config_inactive_clears_next() {
        let t = at(2024, 1, 1);
        let mut config = BackupConfig::new(1, t);
        config.set_active(false, t);
        assert!(config.next_execution.is_none());
        assert!(!config.is_due(at(2030, 1, 1)));

        config.set_active(true, at(2024, 3, 1));
        assert_eq!(config.next_execution, Some(at(2024, 3, 2)));
    }

    #[test]
    fn test_backup_config_retention_validation() {
        let config = BackupConfig::new(1, at(2024, 1, 1)).with_retention(true, 0);
        assert!(matches!(config.validate(), Err(Error::Validation(_))));

        let config = BackupConfig::new(1, at(2024, 1, 1)).with_retention(false, 0);
        assert!(config.validate().is_ok());
        assert!(config.prune_cutoff(at(2024, 2, 1)).is_none());
    }

    #[test]
    fn test_record_outcome_reschedules_from_now() {
        let mut config = BackupConfig::new(1, at(2024, 1, 1))
            .with_frequency(BackupFrequency::Weekly, at(2024, 1, 1));
        let now = at(2024, 2, 10);
        config.record_outcome(BackupStatus::Failed, "timeout", now);
        assert_eq!(config.last_status, Some(BackupStatus::Failed));
        assert_eq!(config.last_execution, Some(now));
        assert_eq!(config.next_execution, Some(at(2024, 2, 17)));
    }

    #[test]
    fn test_backup_validation() {
        let ok = Backup::success(1, Some(1), "a.zip", PathBuf::from("/b/a.zip"), 10, at(2024, 1, 1));
        assert!(ok.validate().is_ok());

        let mut bad = ok.clone();
        bad.file_path = None;
        assert!(bad.validate().is_err());

        let failed = Backup::failed(1, Some(1), "boom", at(2024, 1, 1));
        assert!(failed.validate().is_ok());
        assert!(failed.file_path.is_none());
    }

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(0), "0 B");
        assert_eq!(human_size(512), "512.00 B");
        assert_eq!(human_size(1536), "1.50 KB");
        assert_eq!(human_size(5 * 1024 * 1024), "5.00 MB");
    }

    #[test]
    fn test_tier_validation() {
        let tier = ResourceTier::new("starter", "Starter", ResourceLimits::default());
        assert!(tier.validate().is_ok());

        let tier = ResourceTier::new("", "Starter", ResourceLimits::default());
        assert!(tier.validate().is_err());
    }
}
