//! Instance commands

use anyhow::Result;
use berth_engine::{CreateInstance, Engine};

use crate::cli::{CreateArgs, InstanceCommand};
use crate::output::{print_history, print_instance_detail, print_instances, print_success};

pub async fn execute(engine: &Engine, command: InstanceCommand) -> Result<()> {
    let lifecycle = engine.lifecycle();

    match command {
        InstanceCommand::Create(args) => create(engine, args).await,
        InstanceCommand::List => {
            print_instances(&lifecycle.list().await?);
            Ok(())
        }
        InstanceCommand::Show { name } => {
            print_instance_detail(&lifecycle.find(&name).await?);
            Ok(())
        }
        InstanceCommand::Start { name } => {
            let instance = lifecycle.find(&name).await?;
            let instance = lifecycle.start(instance.id).await?;
            report(&instance, &format!("Started {}", instance.name));
            Ok(())
        }
        InstanceCommand::Stop { name } => {
            let instance = lifecycle.find(&name).await?;
            let instance = lifecycle.stop(instance.id).await?;
            report(&instance, &format!("Stopped {}", instance.name));
            Ok(())
        }
        InstanceCommand::Restart { name } => {
            let instance = lifecycle.find(&name).await?;
            let instance = lifecycle.restart(instance.id).await?;
            report(&instance, &format!("Restarted {}", instance.name));
            Ok(())
        }
        InstanceCommand::Delete { name } => {
            let instance = lifecycle.find(&name).await?;
            lifecycle.delete(instance.id).await?;
            print_success(&format!("Deleted {}", name));
            Ok(())
        }
        InstanceCommand::Resources { name, limits } => {
            let instance = lifecycle.find(&name).await?;
            let resources = limits.apply(instance.resources.clone());
            let instance = lifecycle.update_resources(instance.id, resources).await?;
            report(&instance, &format!("Updated resources of {}", instance.name));
            Ok(())
        }
        InstanceCommand::Manifest { name, runtime_config } => {
            let instance = lifecycle.find(&name).await?;
            let manifest = lifecycle.manifest(instance.id).await?;
            if runtime_config {
                print!("{}", manifest.runtime_config);
            } else {
                print!("{}", manifest.compose);
            }
            Ok(())
        }
        InstanceCommand::Tier { name, code } => {
            let instance = engine.assign_tier(&name, &code).await?;
            report(&instance, &format!("Assigned tier {} to {}", code, instance.name));
            Ok(())
        }
        InstanceCommand::History { name } => {
            print_history(&engine.history(&name).await?);
            Ok(())
        }
    }
}

async fn create(engine: &Engine, args: CreateArgs) -> Result<()> {
    let mut request = CreateInstance::new(args.name, args.version.parse()?);
    request.tier = args.tier;
    request.map_domain = !args.no_domain;
    request.need_custom_addons = args.custom_addons;

    let instance = engine.lifecycle().create(request).await?;
    report(
        &instance,
        &format!(
            "Created {} on port {}",
            instance.name,
            instance.http_port.map(|p| p.to_string()).unwrap_or_default()
        ),
    );
    Ok(())
}

fn report(instance: &berth_core::Instance, message: &str) {
    if crate::output::is_json_mode() {
        print_instance_detail(instance);
    } else {
        print_success(message);
    }
}
