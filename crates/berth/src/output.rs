//! Table and JSON output formatting

use berth_core::{
    AuditEntry, Backup, BackupConfig, BackupStatus, Instance, InstanceState, ResourceTier,
    ServiceResources,
};
use berth_engine::TickReport;
use berth_web::InstanceView;
use colored::Colorize;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use tabled::{
    settings::{object::Columns, Alignment, Modify, Style},
    Table, Tabled,
};

/// Global flag for JSON output mode
static JSON_MODE: AtomicBool = AtomicBool::new(false);

/// Enable or disable JSON output mode
pub fn set_json_mode(enabled: bool) {
    JSON_MODE.store(enabled, Ordering::SeqCst);
}

/// Check if JSON output mode is enabled
pub fn is_json_mode() -> bool {
    JSON_MODE.load(Ordering::SeqCst)
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing to JSON: {}", e),
    }
}

fn print_table<R: Tabled>(rows: Vec<R>) {
    let table = Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::single(0)).with(Alignment::right()))
        .to_string();
    println!("{}", table);
}

#[derive(Tabled)]
pub struct InstanceRow {
    #[tabled(rename = "id")]
    pub id: i64,
    #[tabled(rename = "name")]
    pub name: String,
    #[tabled(rename = "version")]
    pub version: String,
    #[tabled(rename = "state")]
    pub state: String,
    #[tabled(rename = "ports")]
    pub ports: String,
    #[tabled(rename = "domain")]
    pub domain: String,
}

impl From<&Instance> for InstanceRow {
    fn from(instance: &Instance) -> Self {
        InstanceRow {
            id: instance.id,
            name: instance.name.clone(),
            version: instance.version.to_string(),
            state: format_state(instance.state),
            ports: format_ports(instance),
            domain: instance.mapped_domain.clone().unwrap_or_else(|| "-".to_string()),
        }
    }
}

pub fn print_instances(instances: &[Instance]) {
    if is_json_mode() {
        let views: Vec<InstanceView> = instances.iter().cloned().map(InstanceView::from).collect();
        print_json(&views);
        return;
    }

    if instances.is_empty() {
        println!("No instances");
        return;
    }

    print_table(instances.iter().map(InstanceRow::from).collect());
}

pub fn print_instance_detail(instance: &Instance) {
    if is_json_mode() {
        print_json(&InstanceView::from(instance.clone()));
        return;
    }

    println!("{}", "─".repeat(50));
    println!("  {} │ {}", "Name".bold(), instance.name);
    println!("  {} │ {}", "ID".bold(), instance.id);
    println!("  {} │ {}", "Version".bold(), instance.version);
    println!("  {} │ {}", "State".bold(), format_state(instance.state));
    println!("  {} │ {}", "Ports".bold(), format_ports(instance));
    if let Some(domain) = &instance.mapped_domain {
        println!("  {} │ {}", "Domain".bold(), domain);
    }
    println!("  {} │ {}", "Path".bold(), instance.instance_path.display());
    println!("  {} │ {}", "Database".bold(), instance.db_name);
    println!("  {} │ {}", "Admin password".bold(), instance.admin_password);
    println!("{}", "─".repeat(50));
    println!("  {} │ {}", "App".bold(), format_resources(&instance.resources.app));
    println!("  {} │ {}", "DB".bold(), format_resources(&instance.resources.database));
    if let Some(repo) = &instance.repository_url {
        println!("  {} │ {}", "Repository".bold(), repo);
    }
    if let Some(error) = &instance.last_error {
        println!("  {} │ {}", "Last error".bold(), error.red());
    }
    println!("{}", "─".repeat(50));
}

#[derive(Tabled)]
pub struct TierRow {
    #[tabled(rename = "seq")]
    pub sequence: i64,
    #[tabled(rename = "code")]
    pub code: String,
    #[tabled(rename = "name")]
    pub name: String,
    #[tabled(rename = "app")]
    pub app: String,
    #[tabled(rename = "db")]
    pub database: String,
}

impl From<&ResourceTier> for TierRow {
    fn from(tier: &ResourceTier) -> Self {
        TierRow {
            sequence: tier.sequence,
            code: tier.code.clone(),
            name: tier.name.clone(),
            app: format_resources(&tier.resources.app),
            database: format_resources(&tier.resources.database),
        }
    }
}

pub fn print_tiers(tiers: &[ResourceTier]) {
    if is_json_mode() {
        print_json(tiers);
        return;
    }

    if tiers.is_empty() {
        println!("No resource tiers");
        return;
    }

    print_table(tiers.iter().map(TierRow::from).collect());
}

#[derive(Tabled)]
pub struct BackupConfigRow {
    #[tabled(rename = "id")]
    pub id: i64,
    #[tabled(rename = "instance")]
    pub instance_id: i64,
    #[tabled(rename = "frequency")]
    pub frequency: String,
    #[tabled(rename = "active")]
    pub active: String,
    #[tabled(rename = "keep")]
    pub retention: String,
    #[tabled(rename = "next run")]
    pub next: String,
    #[tabled(rename = "last status")]
    pub last_status: String,
}

impl From<&BackupConfig> for BackupConfigRow {
    fn from(config: &BackupConfig) -> Self {
        BackupConfigRow {
            id: config.id,
            instance_id: config.instance_id,
            frequency: config.frequency.to_string(),
            active: if config.active { "yes".green().to_string() } else { "no".dimmed().to_string() },
            retention: if config.auto_prune {
                format!("{}d", config.days_to_keep)
            } else {
                "forever".to_string()
            },
            next: config
                .next_execution
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "-".to_string()),
            last_status: config.last_status.map(format_backup_status).unwrap_or_else(|| "-".to_string()),
        }
    }
}

pub fn print_backup_configs(configs: &[BackupConfig]) {
    if is_json_mode() {
        print_json(configs);
        return;
    }

    if configs.is_empty() {
        println!("No backup configurations");
        return;
    }

    print_table(configs.iter().map(BackupConfigRow::from).collect());
}

#[derive(Tabled)]
pub struct BackupRow {
    #[tabled(rename = "id")]
    pub id: i64,
    #[tabled(rename = "name")]
    pub name: String,
    #[tabled(rename = "date")]
    pub date: String,
    #[tabled(rename = "size")]
    pub size: String,
    #[tabled(rename = "status")]
    pub status: String,
}

impl From<&Backup> for BackupRow {
    fn from(backup: &Backup) -> Self {
        BackupRow {
            id: backup.id,
            name: backup.name.clone(),
            date: backup.backup_date.format("%Y-%m-%d %H:%M:%S").to_string(),
            size: backup.readable_size(),
            status: format_backup_status(backup.status),
        }
    }
}

pub fn print_backups(backups: &[Backup]) {
    if is_json_mode() {
        print_json(backups);
        return;
    }

    if backups.is_empty() {
        println!("No backups");
        return;
    }

    print_table(backups.iter().map(BackupRow::from).collect());
}

pub fn print_backup(backup: &Backup) {
    if is_json_mode() {
        print_json(backup);
        return;
    }

    let path = backup
        .file_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    print_success(&format!("Backup {} ({}) written to {}", backup.name, backup.readable_size(), path));
}

pub fn print_tick_report(report: &TickReport) {
    if is_json_mode() {
        print_json(report);
        return;
    }

    if report.due == 0 {
        print_info("No backup configurations due");
        return;
    }

    for id in &report.succeeded {
        print_success(&format!("Backup configuration {} completed", id));
    }
    for failed in &report.failed {
        print_error(&format!("Backup configuration {} failed: {}", failed.config_id, failed.message));
    }
    for id in &report.skipped {
        print_info(&format!("Backup configuration {} was claimed by another run", id));
    }
}

pub fn print_history(entries: &[AuditEntry]) {
    if is_json_mode() {
        print_json(entries);
        return;
    }

    for entry in entries {
        println!(
            "{}  {}",
            entry.created_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
            entry.message
        );
    }
}

pub fn print_names(names: &[String]) {
    if is_json_mode() {
        print_json(names);
        return;
    }

    for name in names {
        println!("{}", name);
    }
}

fn format_state(state: InstanceState) -> String {
    match state {
        InstanceState::Running => "running".green().to_string(),
        InstanceState::Stopped => "stopped".yellow().to_string(),
        InstanceState::Error => "error".red().bold().to_string(),
        InstanceState::Draft => "draft".cyan().to_string(),
    }
}

fn format_backup_status(status: BackupStatus) -> String {
    match status {
        BackupStatus::Success => "success".green().to_string(),
        BackupStatus::Failed => "failed".red().to_string(),
    }
}

fn format_ports(instance: &Instance) -> String {
    match (instance.http_port, instance.longpolling_port) {
        (Some(http), Some(poll)) => format!("{}/{}", http, poll),
        (Some(http), None) => http.to_string(),
        _ => "-".to_string(),
    }
}

pub fn format_resources(resources: &ServiceResources) -> String {
    let cpu = if resources.cpu_limit > 0.0 {
        format!("{} cpu", resources.cpu_limit)
    } else {
        "unlimited cpu".to_string()
    };
    let memory = if resources.memory_limit.is_empty() {
        "unlimited mem".to_string()
    } else {
        resources.memory_limit.clone()
    };
    format!("{}, {}", cpu, memory)
}

pub fn print_success(message: &str) {
    println!("{} {}", "✓".green(), message);
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red(), message);
}

pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue(), message);
}
