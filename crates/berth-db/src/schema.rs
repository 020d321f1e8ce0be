//! Database schema for Berth

/// SQLite schema initialization
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS tiers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    code TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    sequence INTEGER NOT NULL DEFAULT 10,
    active INTEGER NOT NULL DEFAULT 1,
    description TEXT,
    target_user_count TEXT,
    price_monthly REAL,
    notes TEXT,
    app_cpu_limit REAL NOT NULL DEFAULT 0,
    app_cpu_reservation REAL NOT NULL DEFAULT 0,
    app_memory_limit TEXT NOT NULL DEFAULT '',
    app_memory_reservation TEXT NOT NULL DEFAULT '',
    db_cpu_limit REAL NOT NULL DEFAULT 0,
    db_cpu_reservation REAL NOT NULL DEFAULT 0,
    db_memory_limit TEXT NOT NULL DEFAULT '',
    db_memory_reservation TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS instances (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    slug TEXT NOT NULL UNIQUE,
    db_name TEXT NOT NULL UNIQUE,
    version TEXT NOT NULL,
    http_port INTEGER UNIQUE,
    longpolling_port INTEGER,
    instance_path TEXT NOT NULL UNIQUE,
    db_user TEXT NOT NULL,
    db_password TEXT NOT NULL,
    admin_password TEXT NOT NULL,
    map_domain INTEGER NOT NULL DEFAULT 1,
    mapped_domain TEXT,
    tier_id INTEGER,
    app_cpu_limit REAL NOT NULL DEFAULT 0,
    app_cpu_reservation REAL NOT NULL DEFAULT 0,
    app_memory_limit TEXT NOT NULL DEFAULT '',
    app_memory_reservation TEXT NOT NULL DEFAULT '',
    db_cpu_limit REAL NOT NULL DEFAULT 0,
    db_cpu_reservation REAL NOT NULL DEFAULT 0,
    db_memory_limit TEXT NOT NULL DEFAULT '',
    db_memory_reservation TEXT NOT NULL DEFAULT '',
    state TEXT NOT NULL DEFAULT 'draft',
    last_error TEXT,
    need_custom_addons INTEGER NOT NULL DEFAULT 0,
    repository_url TEXT,
    created_at TEXT NOT NULL,
    FOREIGN KEY (tier_id) REFERENCES tiers(id) ON DELETE SET NULL
);

CREATE INDEX IF NOT EXISTS idx_instances_tier_id ON instances(tier_id);

CREATE TABLE IF NOT EXISTS backup_configs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    instance_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 1,
    frequency TEXT NOT NULL,
    destination TEXT NOT NULL DEFAULT 'local',
    backup_directory TEXT,
    auto_prune INTEGER NOT NULL DEFAULT 1,
    days_to_keep INTEGER NOT NULL DEFAULT 30,
    last_execution TEXT,
    next_execution TEXT,
    last_status TEXT,
    last_message TEXT,
    FOREIGN KEY (instance_id) REFERENCES instances(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_backup_configs_instance_id ON backup_configs(instance_id);
CREATE INDEX IF NOT EXISTS idx_backup_configs_next_execution ON backup_configs(next_execution);

CREATE TABLE IF NOT EXISTS backups (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    instance_id INTEGER NOT NULL,
    config_id INTEGER,
    name TEXT NOT NULL,
    backup_date TEXT NOT NULL,
    file_path TEXT,
    file_size INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL,
    message TEXT,
    FOREIGN KEY (instance_id) REFERENCES instances(id) ON DELETE CASCADE,
    FOREIGN KEY (config_id) REFERENCES backup_configs(id) ON DELETE SET NULL
);

CREATE INDEX IF NOT EXISTS idx_backups_instance_id ON backups(instance_id);
CREATE INDEX IF NOT EXISTS idx_backups_config_id ON backups(config_id);
CREATE INDEX IF NOT EXISTS idx_backups_backup_date ON backups(backup_date);

CREATE TABLE IF NOT EXISTS audit_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity TEXT NOT NULL,
    entity_id INTEGER NOT NULL,
    message TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_audit_log_entity ON audit_log(entity, entity_id);
"#;
