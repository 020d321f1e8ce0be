//! Compose CLI runtime

use async_trait::async_trait;
use berth_core::{Error, Result, RuntimeSettings};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::traits::{CommandOutput, ContainerRuntime, PrepareResult, RuntimeCommand};

/// Runs `docker-compose -f <file> ...` (or a configured equivalent)
pub struct ComposeRuntime {
    program: String,
    base_args: Vec<String>,
    timeout: Duration,
}

impl ComposeRuntime {
    pub fn new(program: impl Into<String>, base_args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            base_args,
            timeout,
        }
    }

    pub fn from_settings(settings: &RuntimeSettings) -> Self {
        let (program, base_args) = settings.compose_program();
        Self::new(
            program,
            base_args,
            Duration::from_secs(settings.command_timeout_secs),
        )
    }

    fn build_args(&self, compose_file: &Path, command: RuntimeCommand) -> Vec<String> {
        let mut args = self.base_args.clone();
        args.push("-f".to_string());
        args.push(compose_file.to_string_lossy().to_string());
        args.extend(command.args().iter().map(|a| a.to_string()));
        args
    }
}

#[async_trait]
impl ContainerRuntime for ComposeRuntime {
    async fn prepare(&self) -> Result<PrepareResult> {
        match which::which(&self.program) {
            Ok(path) => Ok(PrepareResult::success(format!(
                "Found {} at {}",
                self.program,
                path.display()
            ))),
            Err(_) => {
                if Path::new(&self.program).exists() {
                    Ok(PrepareResult::success(format!("Using {}", self.program)))
                } else {
                    Ok(PrepareResult::failure(format!(
                        "Command not found: {}",
                        self.program
                    )))
                }
            }
        }
    }

    async fn execute(&self, compose_file: &Path, command: RuntimeCommand) -> Result<CommandOutput> {
        let cmd_line = self.command_string(compose_file, command);
        info!("Running command: {}", cmd_line);

        let mut cmd = Command::new(&self.program);
        cmd.args(self.build_args(compose_file, command))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = compose_file.parent() {
            if dir.is_dir() {
                cmd.current_dir(dir);
            }
        }

        let child = cmd
            .spawn()
            .map_err(|e| Error::deployment(format!("Failed to run '{}': {}", cmd_line, e)))?;

        // Dropping the wait future on timeout kills the child
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| {
                Error::deployment(format!("Failed to wait for '{}': {}", cmd_line, e))
            })?,
            Err(_) => {
                warn!("Command timed out after {:?}: {}", self.timeout, cmd_line);
                return Err(Error::deployment(format!(
                    "Command timed out after {}s:\n{}",
                    self.timeout.as_secs(),
                    cmd_line
                )));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            return Err(Error::deployment(format!(
                "Command failed:\n{}\n\n{}",
                cmd_line, stderr
            )));
        }

        debug!("Command succeeded: {}", cmd_line);
        Ok(CommandOutput { stdout, stderr })
    }

    fn command_string(&self, compose_file: &Path, command: RuntimeCommand) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.build_args(compose_file, command));
        parts.join(" ")
    }
}
