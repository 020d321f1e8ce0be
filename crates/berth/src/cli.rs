//! CLI argument definitions

use berth_core::ResourceLimits;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "berth")]
#[command(version, about = "Provision and operate containerised application instances")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Settings file (.toml, .yaml, .yml or .json)
    #[arg(short, long, global = true, env = "BERTH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Output in JSON format instead of tables
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage instances
    Instance {
        #[command(subcommand)]
        command: InstanceCommand,
    },

    /// Manage resource tiers
    Tier {
        #[command(subcommand)]
        command: TierCommand,
    },

    /// Manage backup configurations and backups
    Backup {
        #[command(subcommand)]
        command: BackupCommand,
    },

    /// Manage addon module directories
    Module {
        #[command(subcommand)]
        command: ModuleCommand,
    },

    /// Start the HTTP API server
    Serve {
        /// Bind address, overrides web.bind from settings
        #[arg(long)]
        bind: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum InstanceCommand {
    /// Create a draft instance and allocate its ports
    Create(CreateArgs),

    /// List instances
    List,

    /// Show details for an instance
    Show { name: String },

    /// Deploy and start an instance
    Start { name: String },

    /// Stop a running instance
    Stop { name: String },

    /// Restart an instance
    Restart { name: String },

    /// Tear down an instance and remove its records
    Delete { name: String },

    /// Change resource limits, redeploying if running
    Resources {
        name: String,

        #[command(flatten)]
        limits: ResourceArgs,
    },

    /// Print the generated compose file
    Manifest {
        name: String,

        /// Print the runtime configuration file instead
        #[arg(long)]
        runtime_config: bool,
    },

    /// Assign a resource tier to an instance
    Tier { name: String, code: String },

    /// Show the audit history of an instance
    History { name: String },
}

#[derive(Args)]
pub struct CreateArgs {
    /// Instance name
    pub name: String,

    /// Application version (17.0, 18.0 or 19.0)
    #[arg(long, default_value = "17.0")]
    pub version: String,

    /// Resource tier code
    #[arg(long)]
    pub tier: Option<String>,

    /// Do not publish the instance under the base domain
    #[arg(long)]
    pub no_domain: bool,

    /// Provision a source repository and build job on first start
    #[arg(long)]
    pub custom_addons: bool,
}

/// Resource flags; unset values keep the current (or default) setting
#[derive(Args, Default)]
pub struct ResourceArgs {
    /// App CPU limit in cores (0 = unlimited)
    #[arg(long)]
    pub app_cpu_limit: Option<f64>,

    /// App CPU reservation in cores
    #[arg(long)]
    pub app_cpu_reservation: Option<f64>,

    /// App memory limit, e.g. 4g
    #[arg(long)]
    pub app_memory_limit: Option<String>,

    /// App memory reservation
    #[arg(long)]
    pub app_memory_reservation: Option<String>,

    /// Database CPU limit in cores (0 = unlimited)
    #[arg(long)]
    pub db_cpu_limit: Option<f64>,

    /// Database CPU reservation in cores
    #[arg(long)]
    pub db_cpu_reservation: Option<f64>,

    /// Database memory limit
    #[arg(long)]
    pub db_memory_limit: Option<String>,

    /// Database memory reservation
    #[arg(long)]
    pub db_memory_reservation: Option<String>,
}

impl ResourceArgs {
    /// Overlay the provided flags onto `base`
    pub fn apply(self, mut base: ResourceLimits) -> ResourceLimits {
        if let Some(v) = self.app_cpu_limit {
            base.app.cpu_limit = v;
        }
        if let Some(v) = self.app_cpu_reservation {
            base.app.cpu_reservation = v;
        }
        if let Some(v) = self.app_memory_limit {
            base.app.memory_limit = v;
        }
        if let Some(v) = self.app_memory_reservation {
            base.app.memory_reservation = v;
        }
        if let Some(v) = self.db_cpu_limit {
            base.database.cpu_limit = v;
        }
        if let Some(v) = self.db_cpu_reservation {
            base.database.cpu_reservation = v;
        }
        if let Some(v) = self.db_memory_limit {
            base.database.memory_limit = v;
        }
        if let Some(v) = self.db_memory_reservation {
            base.database.memory_reservation = v;
        }
        base
    }
}

#[derive(Subcommand)]
pub enum TierCommand {
    /// Create a resource tier
    Create {
        /// Unique tier code
        code: String,

        /// Display name
        name: String,

        #[arg(long)]
        description: Option<String>,

        #[arg(long, default_value = "10")]
        sequence: i64,

        #[command(flatten)]
        limits: ResourceArgs,
    },

    /// List resource tiers
    List,

    /// Push a tier's resource values to every instance using it
    Propagate { code: String },
}

#[derive(Subcommand)]
pub enum BackupCommand {
    /// Add a backup configuration to an instance
    ConfigAdd {
        /// Instance name
        instance: String,

        /// daily, weekly or monthly
        #[arg(long, default_value = "daily")]
        frequency: String,

        /// Backup directory (defaults to <instance>/backups)
        #[arg(long)]
        directory: Option<PathBuf>,

        /// Keep backups forever
        #[arg(long)]
        no_prune: bool,

        #[arg(long, default_value = "30")]
        days_to_keep: i64,
    },

    /// Activate, deactivate or reschedule a backup configuration
    ConfigSet {
        /// Backup configuration id
        config_id: i64,

        #[arg(long, conflicts_with = "inactive")]
        active: bool,

        #[arg(long)]
        inactive: bool,

        /// daily, weekly or monthly
        #[arg(long)]
        frequency: Option<String>,

        #[arg(long)]
        days_to_keep: Option<i64>,
    },

    /// Remove a backup configuration, keeping its backups
    ConfigDelete {
        /// Backup configuration id
        config_id: i64,
    },

    /// List backup configurations
    Configs {
        /// Only configurations of this instance
        #[arg(long)]
        instance: Option<String>,
    },

    /// Run every due backup configuration
    Tick,

    /// Run a backup now
    Run {
        /// Instance whose first active configuration runs
        instance: Option<String>,

        /// Run this configuration id instead
        #[arg(long, conflicts_with = "instance")]
        config_id: Option<i64>,
    },

    /// List backups of an instance
    List { instance: String },

    /// Delete a backup and its file
    Delete {
        /// Backup id
        backup_id: i64,
    },

    /// Delete backups older than the configuration's retention
    Prune {
        /// Backup configuration id
        config_id: i64,
    },
}

#[derive(Subcommand)]
pub enum ModuleCommand {
    /// List module directories
    List {
        /// Addons directory
        path: PathBuf,
    },

    /// Extract a ZIP archive into an addons directory
    Upload {
        /// Addons directory
        path: PathBuf,

        /// ZIP archive
        archive: PathBuf,

        /// Restart this instance afterwards
        #[arg(long)]
        restart: Option<String>,
    },

    /// Remove a module from an addons directory
    Delete {
        /// Addons directory
        path: PathBuf,

        /// Module name
        name: String,

        /// Restart this instance afterwards
        #[arg(long)]
        restart: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_resource_args_overlay() {
        let args = ResourceArgs {
            app_cpu_limit: Some(4.0),
            db_memory_limit: Some("8g".to_string()),
            ..Default::default()
        };
        let limits = args.apply(ResourceLimits::default());
        assert_eq!(limits.app.cpu_limit, 4.0);
        assert_eq!(limits.app.cpu_reservation, 1.0);
        assert_eq!(limits.database.memory_limit, "8g");
        assert_eq!(limits.database.memory_reservation, "1g");
    }

    #[test]
    fn test_backup_config_set_flags() {
        let parsed = Cli::try_parse_from(["berth", "backup", "config-set", "3", "--active", "--inactive"]);
        assert!(parsed.is_err());

        let parsed =
            Cli::try_parse_from(["berth", "backup", "config-set", "3", "--inactive", "--frequency", "weekly"])
                .unwrap();
        match parsed.command {
            Commands::Backup {
                command:
                    BackupCommand::ConfigSet {
                        config_id,
                        active,
                        inactive,
                        frequency,
                        days_to_keep,
                    },
            } => {
                assert_eq!(config_id, 3);
                assert!(!active);
                assert!(inactive);
                assert_eq!(frequency.as_deref(), Some("weekly"));
                assert!(days_to_keep.is_none());
            }
            _ => panic!("expected backup config-set"),
        }
    }

    #[test]
    fn test_backup_run_flags_conflict() {
        let parsed = Cli::try_parse_from(["berth", "backup", "run", "acme", "--config-id", "3"]);
        assert!(parsed.is_err());
    }
}
