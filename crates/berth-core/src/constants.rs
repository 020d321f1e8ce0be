//! Constants and default values for Berth

use std::path::PathBuf;

/// Berth home directory name
pub const BERTH_DIR: &str = ".berth";

/// Default database file name
pub const DB_FILE: &str = "berth.db";

/// Default settings file name
pub const SETTINGS_FILE: &str = "berth.toml";

/// Directory (under the user's home) holding instance roots
pub const INSTANCES_DIR: &str = "odoo_docker";

/// Compose manifest file name inside an instance root
pub const COMPOSE_FILE: &str = "docker-compose.yml";

/// Runtime configuration directory inside an instance root
pub const CONFIG_DIR: &str = "config";

/// Runtime configuration file name inside `CONFIG_DIR`
pub const RUNTIME_CONFIG_FILE: &str = "odoo.conf";

/// Addons directory inside an instance root
pub const ADDONS_DIR: &str = "addons";

/// Directory inside `ADDONS_DIR` synchronised from the CI repository
pub const GIT_ADDONS_DIR: &str = "git_addons";

/// Default backup directory inside an instance root
pub const BACKUPS_DIR: &str = "backups";

/// Default port pool
pub const DEFAULT_PORT_RANGE_START: u16 = 8069;
pub const DEFAULT_PORT_RANGE_END: u16 = 9000;

/// Ports the application listens on inside its container
pub const APP_HTTP_PORT: u16 = 8069;
pub const APP_LONGPOLLING_PORT: u16 = 8072;

/// Database port inside the stack network
pub const DB_PORT: u16 = 5432;

/// Database server image
pub const DB_IMAGE: &str = "postgres:16";

/// Default database role for new instances
pub const DEFAULT_DB_USER: &str = "odoo";

/// Generated credential lengths
pub const DB_PASSWORD_LENGTH: usize = 16;
pub const ADMIN_PASSWORD_LENGTH: usize = 12;

/// Slug used when an instance name yields no usable characters
pub const FALLBACK_SLUG: &str = "odoo-instance";

/// Suffix for CI repositories and jobs
pub const CI_NAME_SUFFIX: &str = "docker-saas";

/// Backup request timeout in seconds
pub const DEFAULT_BACKUP_TIMEOUT_SECS: u64 = 600;

/// External runtime command timeout in seconds
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 300;

/// Default retention for pruned backups
pub const DEFAULT_DAYS_TO_KEEP: u32 = 30;

/// Default web API bind address
pub const DEFAULT_WEB_BIND: &str = "127.0.0.1:8080";

/// Get the Berth home directory
pub fn berth_home() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(BERTH_DIR))
        .unwrap_or_else(|| PathBuf::from(BERTH_DIR))
}

/// Get the default database path
pub fn db_path() -> PathBuf {
    berth_home().join(DB_FILE)
}

/// Get the default settings path
pub fn settings_path() -> PathBuf {
    berth_home().join(SETTINGS_FILE)
}

/// Get the default root under which instance directories are created
pub fn default_instances_root() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(INSTANCES_DIR))
        .unwrap_or_else(|| PathBuf::from("/tmp").join(INSTANCES_DIR))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_berth_home() {
        let home = berth_home();
        assert!(home.to_string_lossy().contains(".berth"));
    }

    #[test]
    fn test_db_path() {
        assert!(db_path().to_string_lossy().ends_with("berth.db"));
    }

    #[test]
    fn test_instances_root() {
        assert!(default_instances_root()
            .to_string_lossy()
            .ends_with("odoo_docker"));
    }
}
