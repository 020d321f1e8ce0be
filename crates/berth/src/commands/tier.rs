//! Resource tier commands

use anyhow::Result;
use berth_core::{ResourceLimits, ResourceTier};
use berth_engine::Engine;

use crate::cli::TierCommand;
use crate::output::{is_json_mode, print_json, print_success, print_tiers};

pub async fn execute(engine: &Engine, command: TierCommand) -> Result<()> {
    match command {
        TierCommand::Create {
            code,
            name,
            description,
            sequence,
            limits,
        } => {
            let mut tier = ResourceTier::new(code, name, limits.apply(ResourceLimits::default()));
            tier.description = description;
            tier.sequence = sequence;

            let tier = engine.tiers().create(tier).await?;
            if is_json_mode() {
                print_json(&tier);
            } else {
                print_success(&format!("Created tier {} ({})", tier.code, tier.name));
            }
            Ok(())
        }
        TierCommand::List => {
            print_tiers(&engine.tiers().list().await?);
            Ok(())
        }
        TierCommand::Propagate { code } => {
            let updated = engine.propagate_tier(&code).await?;
            if is_json_mode() {
                print_json(&serde_json::json!({ "tier": code, "updated": updated }));
            } else {
                print_success(&format!("Propagated tier {} to {} instance(s)", code, updated));
            }
            Ok(())
        }
    }
}
