//! Addon module commands

use anyhow::{Context, Result};
use berth_engine::Engine;

use crate::cli::ModuleCommand;
use crate::output::{is_json_mode, print_names, print_success};

pub async fn execute(engine: &Engine, command: ModuleCommand) -> Result<()> {
    match command {
        ModuleCommand::List { path } => {
            print_names(&engine.list_modules(&path).await?);
            Ok(())
        }
        ModuleCommand::Upload {
            path,
            archive,
            restart,
        } => {
            let data = tokio::fs::read(&archive)
                .await
                .with_context(|| format!("Failed to read {}", archive.display()))?;
            let filename = archive
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();

            let extracted = engine
                .upload_module(&path, &filename, data, restart.as_deref())
                .await?;
            if is_json_mode() {
                print_names(&extracted);
            } else {
                print_success(&format!(
                    "Extracted {} into {}",
                    extracted.join(", "),
                    path.display()
                ));
            }
            Ok(())
        }
        ModuleCommand::Delete {
            path,
            name,
            restart,
        } => {
            engine.delete_module(&path, &name, restart.as_deref()).await?;
            print_success(&format!("Removed {} from {}", name, path.display()));
            Ok(())
        }
    }
}
