use async_trait::async_trait;
use berth_ci::{CiError, ContinuousIntegrationProvisioner};
use berth_core::{AppVersion, Error, Instance, Result, RoutingSettings, Settings};
use berth_db::Database;
use berth_runtime::{CommandOutput, ContainerRuntime, PrepareResult, RuntimeCommand};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};

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

pub async fn insert_instance(db: &Database, root: &Path, name: &str, port: u16) -> Instance {
    let mut instance = Instance::try_new(name, AppVersion::V17, root, &RoutingSettings::default())
        .unwrap()
        .with_ports(port, port + 1);
    instance.id = db.instances().insert(&instance).await.unwrap();
    instance
}

/// Settings rooted in `dir` with a private port range
pub fn test_settings(dir: &Path) -> Settings {
    let mut settings = Settings::default();
    settings.paths.instances_root = dir.join("instances");
    settings.paths.database = dir.join("test.db");
    settings.ports.range_start = 38069;
    settings.ports.range_end = 38169;
    settings.ports.bind_host = "127.0.0.1".to_string();
    settings
}

/// Container runtime double recording every command
#[derive(Default)]
pub struct FakeRuntime {
    pub commands: Mutex<Vec<(PathBuf, RuntimeCommand)>>,
    pub failing: Mutex<Option<RuntimeCommand>>,
}

impl FakeRuntime {
    pub fn fail_on(&self, command: RuntimeCommand) {
        *self.failing.lock() = Some(command);
    }

    pub fn succeed(&self) {
        *self.failing.lock() = None;
    }

    pub fn executed(&self) -> Vec<RuntimeCommand> {
        self.commands.lock().iter().map(|(_, c)| *c).collect()
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn prepare(&self) -> Result<PrepareResult> {
        Ok(PrepareResult::success("fake"))
    }

    async fn execute(&self, compose_file: &Path, command: RuntimeCommand) -> Result<CommandOutput> {
        self.commands.lock().push((compose_file.to_path_buf(), command));
        if *self.failing.lock() == Some(command) {
            return Err(Error::deployment(format!(
                "Command failed:\n{}\n\nno such service",
                self.command_string(compose_file, command)
            )));
        }
        Ok(CommandOutput::default())
    }

    fn command_string(&self, compose_file: &Path, command: RuntimeCommand) -> String {
        format!("fake -f {} {}", compose_file.display(), command.args().join(" "))
    }
}

/// CI provisioner double
#[derive(Default)]
pub struct FakeCi {
    pub fail: bool,
    pub repositories: Mutex<Vec<String>>,
    pub jobs: Mutex<Vec<String>>,
}

impl FakeCi {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }
}

#[async_trait]
impl ContinuousIntegrationProvisioner for FakeCi {
    async fn ensure_repository(&self, instance: &Instance) -> berth_ci::Result<String> {
        if self.fail {
            return Err(CiError::NotConfigured("GitHub"));
        }
        self.repositories.lock().push(instance.name.clone());
        Ok(format!("https://github.com/octo/{}.git", instance.slug))
    }

    async fn ensure_build_job(&self, instance: &Instance) -> berth_ci::Result<()> {
        self.jobs.lock().push(instance.name.clone());
        Ok(())
    }

    fn is_configured(&self) -> bool {
        !self.fail
    }
}
