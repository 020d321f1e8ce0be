//! Container runtime trait and common types

use async_trait::async_trait;
use berth_core::Result;
use std::path::Path;

/// Result of the prepare phase (runtime availability check)
#[derive(Debug)]
pub struct PrepareResult {
    pub success: bool,
    pub output: String,
}

impl PrepareResult {
    pub fn success<S: Into<String>>(output: S) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    pub fn failure<S: Into<String>>(output: S) -> Self {
        Self {
            success: false,
            output: output.into(),
        }
    }
}

/// Operation to run against an instance's compose stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeCommand {
    /// Create and start all services in the background
    Up,
    /// Stop and remove the services, optionally with their named volumes
    Down { volumes: bool },
    /// Restart running services
    Restart,
    /// Recreate services so changed settings take effect
    Recreate,
}

impl RuntimeCommand {
    /// Arguments following `-f <compose file>`
    pub fn args(&self) -> &'static [&'static str] {
        match self {
            RuntimeCommand::Up => &["up", "-d"],
            RuntimeCommand::Down { volumes: false } => &["down"],
            RuntimeCommand::Down { volumes: true } => &["down", "-v"],
            RuntimeCommand::Restart => &["restart"],
            RuntimeCommand::Recreate => &["up", "-d", "--force-recreate"],
        }
    }
}

/// Captured output of a successful command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// External container runtime driving compose stacks.
///
/// A non-zero exit or timeout fails with `Error::Deployment` carrying the
/// command line and its standard error.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Check that the runtime program is available
    async fn prepare(&self) -> Result<PrepareResult>;

    /// Run a command against the stack described by `compose_file`
    async fn execute(&self, compose_file: &Path, command: RuntimeCommand) -> Result<CommandOutput>;

    /// Get the command line that will be executed (for display)
    fn command_string(&self, compose_file: &Path, command: RuntimeCommand) -> String;
}
