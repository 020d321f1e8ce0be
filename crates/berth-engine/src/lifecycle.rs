//! Instance lifecycle state machine
//!
//! Every operation loads the instance under its lock, drives the container
//! runtime, and persists the resulting state. External failures move the
//! instance to `error` with the message retained, then propagate.

use crate::audit;
use crate::locks::InstanceLocks;
use crate::tiers::ResourceTierService;
use berth_ci::ContinuousIntegrationProvisioner;
use berth_core::{
    AppVersion, AuditEntity, Error, Instance, InstanceState, Manifest, ManifestGenerator,
    ResourceLimits, ResourceTier, Result, Settings,
};
use berth_db::Database;
use berth_runtime::{ContainerRuntime, PortAllocator, RuntimeCommand};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Parameters for a new instance
#[derive(Debug, Clone)]
pub struct CreateInstance {
    pub name: String,
    pub version: AppVersion,
    /// Tier code to apply
    pub tier: Option<String>,
    pub map_domain: bool,
    pub need_custom_addons: bool,
}

impl CreateInstance {
    pub fn new(name: impl Into<String>, version: AppVersion) -> Self {
        Self {
            name: name.into(),
            version,
            tier: None,
            map_domain: true,
            need_custom_addons: false,
        }
    }
}

pub struct InstanceLifecycleManager {
    db: Database,
    settings: Arc<Settings>,
    generator: ManifestGenerator,
    runtime: Arc<dyn ContainerRuntime>,
    ci: Arc<dyn ContinuousIntegrationProvisioner>,
    tiers: Arc<ResourceTierService>,
    allocator: PortAllocator,
    locks: Arc<InstanceLocks>,
    allocation: tokio::sync::Mutex<()>,
}

impl InstanceLifecycleManager {
    pub fn new(
        db: Database,
        settings: Arc<Settings>,
        runtime: Arc<dyn ContainerRuntime>,
        ci: Arc<dyn ContinuousIntegrationProvisioner>,
        tiers: Arc<ResourceTierService>,
        locks: Arc<InstanceLocks>,
    ) -> Self {
        Self {
            generator: ManifestGenerator::from_settings(&settings),
            allocator: PortAllocator::from_settings(&settings.ports),
            db,
            settings,
            runtime,
            ci,
            tiers,
            locks,
            allocation: tokio::sync::Mutex::new(()),
        }
    }

    /// Provision a draft instance with allocated ports and fresh credentials
    pub async fn create(&self, request: CreateInstance) -> Result<Instance> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(Error::validation("Instance name must not be empty"));
        }
        if self.db.instances().exists(name).await? {
            return Err(Error::validation(format!(
                "An instance named {} already exists",
                name
            )));
        }
        let tier = match &request.tier {
            Some(code) => Some(self.tiers.get(code).await?),
            None => None,
        };

        let paths = &self.settings.paths;
        let mut instance = Instance::try_new(
            name,
            request.version,
            &paths.instances_root,
            &self.settings.routing,
        )?
        .with_map_domain(request.map_domain)
        .with_custom_addons(request.need_custom_addons);
        instance.refresh_derived(&paths.instances_root, &self.settings.routing);

        if let Some(tier) = &tier {
            instance.tier_id = Some(tier.id);
            ResourceTierService::apply_tier(&mut instance, Some(tier));
        }

        {
            // Held across conflict check, port allocation and insert
            let _guard = self.allocation.lock().await;
            if let Some(existing) = self.db.instances().find_conflicting(&instance).await? {
                return Err(Error::validation(format!(
                    "Instance {} would share its database or directory with {}",
                    instance.name, existing.name
                )));
            }
            let used = self.db.instances().used_ports().await?;
            let ports = &self.settings.ports;
            let (http, longpolling) =
                self.allocator
                    .allocate_pair(ports.range_start, ports.range_end, &used)?;
            instance = instance.with_ports(http, longpolling);
            instance.id = self.db.instances().insert(&instance).await?;
        }

        info!(
            "Created instance {} (id: {}) on port {}",
            instance.name,
            instance.id,
            instance.http_port.unwrap_or_default()
        );
        audit::record(
            &self.db,
            AuditEntity::Instance,
            instance.id,
            &format!("Created on port {}", instance.http_port.unwrap_or_default()),
        )
        .await;
        Ok(instance)
    }

    pub async fn get(&self, id: i64) -> Result<Instance> {
        self.db
            .instances()
            .get_by_id(id)
            .await?
            .ok_or_else(|| Error::InstanceNotFound(id.to_string()))
    }

    pub async fn find(&self, name: &str) -> Result<Instance> {
        self.db
            .instances()
            .get_by_name(name)
            .await?
            .ok_or_else(|| Error::InstanceNotFound(name.to_string()))
    }

    pub async fn list(&self) -> Result<Vec<Instance>> {
        self.db.instances().get_all().await
    }

    /// Deploy a draft or stopped instance
    pub async fn start(&self, id: i64) -> Result<Instance> {
        let lock = self.locks.lock_for(id);
        let _guard = lock.lock().await;
        let mut instance = self.get(id).await?;

        if !instance.state.can_start() {
            return Err(Error::validation(format!(
                "Instance {} cannot be started from state {}",
                instance.name, instance.state
            )));
        }

        info!("Starting instance {}", instance.name);
        match self.deploy(&mut instance).await {
            Ok(()) => {
                self.transition(&mut instance, InstanceState::Running, "Started").await?;
                Ok(instance)
            }
            Err(e) => Err(self.fail(&mut instance, "start", e).await),
        }
    }

    pub async fn stop(&self, id: i64) -> Result<Instance> {
        let lock = self.locks.lock_for(id);
        let _guard = lock.lock().await;
        let mut instance = self.get(id).await?;

        let compose = instance.compose_path();
        if !compose.exists() {
            return Err(Error::validation(format!(
                "No manifest found for instance {} at {}",
                instance.name,
                compose.display()
            )));
        }

        info!("Stopping instance {}", instance.name);
        match self
            .runtime
            .execute(&compose, RuntimeCommand::Down { volumes: false })
            .await
        {
            Ok(_) => {
                self.transition(&mut instance, InstanceState::Stopped, "Stopped").await?;
                Ok(instance)
            }
            Err(e) => Err(self.fail(&mut instance, "stop", e).await),
        }
    }

    /// Restart the stack; a successful restart brings any state back to `running`
    pub async fn restart(&self, id: i64) -> Result<Instance> {
        let lock = self.locks.lock_for(id);
        let _guard = lock.lock().await;
        let mut instance = self.get(id).await?;

        info!("Restarting instance {}", instance.name);
        match self
            .runtime
            .execute(&instance.compose_path(), RuntimeCommand::Restart)
            .await
        {
            Ok(_) => {
                if instance.state != InstanceState::Running {
                    let message = format!("Restarted from {}", instance.state);
                    self.transition(&mut instance, InstanceState::Running, &message).await?;
                } else {
                    audit::record(&self.db, AuditEntity::Instance, instance.id, "Restarted").await;
                }
                Ok(instance)
            }
            Err(e) => Err(self.fail(&mut instance, "restart", e).await),
        }
    }

    /// Replace the instance's resource bounds and redeploy them
    pub async fn update_resources(&self, id: i64, resources: ResourceLimits) -> Result<Instance> {
        resources.validate()?;

        let lock = self.locks.lock_for(id);
        let _guard = lock.lock().await;
        let mut instance = self.get(id).await?;

        if instance.state == InstanceState::Draft {
            return Err(Error::validation(format!(
                "Instance {} is still a draft; start it before changing resources",
                instance.name
            )));
        }

        instance.resources = resources;
        self.db
            .instances()
            .update_resources(instance.id, &instance.resources)
            .await?;
        self.redeploy_resources(&mut instance).await?;
        Ok(instance)
    }

    /// Assign a tier and, outside `draft`, redeploy the new bounds
    pub async fn assign_tier(&self, id: i64, tier: &ResourceTier) -> Result<Instance> {
        let lock = self.locks.lock_for(id);
        let _guard = lock.lock().await;
        let mut instance = self.get(id).await?;

        self.tiers.assign_tier(&mut instance, tier).await?;
        if instance.state != InstanceState::Draft {
            self.redeploy_resources(&mut instance).await?;
        }
        Ok(instance)
    }

    /// Tear down a running stack (best effort), drop its backups, then the record
    pub async fn delete(&self, id: i64) -> Result<()> {
        let lock = self.locks.lock_for(id);
        let _guard = lock.lock().await;
        let instance = self.get(id).await?;

        if instance.state == InstanceState::Running {
            if let Err(e) = self
                .runtime
                .execute(&instance.compose_path(), RuntimeCommand::Down { volumes: true })
                .await
            {
                warn!("Teardown of instance {} failed, deleting anyway: {}", instance.name, e);
            }
        }

        let removed = self.db.backups().delete_by_instance(instance.id).await?;
        debug!("Removed {} backup(s) of instance {}", removed, instance.name);
        self.db.instances().delete(instance.id).await?;

        audit::record(&self.db, AuditEntity::Instance, instance.id, "Deleted").await;
        info!("Deleted instance {}", instance.name);
        drop(_guard);
        self.locks.forget(id);
        Ok(())
    }

    /// Generated artifacts for the instance, without writing them
    pub async fn manifest(&self, id: i64) -> Result<Manifest> {
        let instance = self.get(id).await?;
        Ok(self.generator.generate(&instance))
    }

    /// Provision the repository and build job.
    ///
    /// With `raise_on_error` false a failure is logged and reported as `Ok(false)`.
    pub async fn enable_integration(&self, id: i64, raise_on_error: bool) -> Result<bool> {
        let lock = self.locks.lock_for(id);
        let _guard = lock.lock().await;
        let mut instance = self.get(id).await?;

        match self.integrate(&mut instance).await {
            Ok(()) => Ok(true),
            Err(e) if raise_on_error => Err(e),
            Err(e) => {
                warn!("CI provisioning for instance {} failed: {}", instance.name, e);
                Ok(false)
            }
        }
    }

    async fn deploy(&self, instance: &mut Instance) -> Result<()> {
        ensure_layout(instance).await?;
        if instance.need_custom_addons && instance.repository_url.is_none() {
            self.integrate(instance).await?;
        }
        self.write_manifest(instance)?;
        self.runtime
            .execute(&instance.compose_path(), RuntimeCommand::Up)
            .await?;
        Ok(())
    }

    async fn redeploy_resources(&self, instance: &mut Instance) -> Result<()> {
        if let Err(e) = self.write_manifest(instance) {
            return Err(self.fail(instance, "update resources of", e).await);
        }

        if instance.state == InstanceState::Running {
            if let Err(e) = self
                .runtime
                .execute(&instance.compose_path(), RuntimeCommand::Recreate)
                .await
            {
                return Err(self.fail(instance, "recreate", e).await);
            }
        }

        info!("Updated resources of instance {}", instance.name);
        audit::record(&self.db, AuditEntity::Instance, instance.id, "Resources updated").await;
        Ok(())
    }

    async fn integrate(&self, instance: &mut Instance) -> Result<()> {
        let url = self.ci.ensure_repository(instance).await?;
        self.db.instances().set_repository_url(instance.id, &url).await?;
        instance.repository_url = Some(url);

        self.ci.ensure_build_job(instance).await?;
        audit::record(&self.db, AuditEntity::Instance, instance.id, "CI integration enabled").await;
        Ok(())
    }

    fn write_manifest(&self, instance: &Instance) -> Result<()> {
        self.generator.generate(instance).write_for(instance)?;
        debug!("Wrote manifest for instance {}", instance.name);
        Ok(())
    }

    async fn transition(&self, instance: &mut Instance, state: InstanceState, message: &str) -> Result<()> {
        instance.state = state;
        instance.last_error = None;
        self.db.instances().update_state(instance.id, state, None).await?;

        info!("Instance {} is now {}", instance.name, state);
        audit::record(&self.db, AuditEntity::Instance, instance.id, message).await;
        Ok(())
    }

    /// Persist the `error` state and hand the error back for propagation
    async fn fail(&self, instance: &mut Instance, action: &str, error: Error) -> Error {
        let message = error.to_string();
        error!("Failed to {} instance {}: {}", action, instance.name, message);

        instance.state = InstanceState::Error;
        instance.last_error = Some(message.clone());
        if let Err(e) = self
            .db
            .instances()
            .update_state(instance.id, InstanceState::Error, Some(&message))
            .await
        {
            warn!("Failed to record error state for {}: {}", instance.name, e);
        }

        audit::record(
            &self.db,
            AuditEntity::Instance,
            instance.id,
            &format!("Failed to {}: {}", action, message),
        )
        .await;
        error
    }
}

async fn ensure_layout(instance: &Instance) -> Result<()> {
    for dir in [instance.git_addons_path(), instance.config_dir()] {
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            Error::deployment(format!("Failed to create {}: {}", dir.display(), e))
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_settings, FakeCi, FakeRuntime};
    use berth_core::ServiceResources;
    use tempfile::{tempdir, TempDir};

    struct Harness {
        manager: InstanceLifecycleManager,
        runtime: Arc<FakeRuntime>,
        ci: Arc<FakeCi>,
        db: Database,
        _dir: TempDir,
    }

    async fn harness_with(ci: FakeCi) -> Harness {
        let dir = tempdir().unwrap();
        let settings = Arc::new(test_settings(dir.path()));
        let db = Database::new(&settings.paths.database).await.unwrap();
        let locks = Arc::new(InstanceLocks::new());
        let tiers = Arc::new(ResourceTierService::new(db.clone(), locks.clone()));
        let runtime = Arc::new(FakeRuntime::default());
        let ci = Arc::new(ci);
        let manager = InstanceLifecycleManager::new(
            db.clone(),
            settings,
            runtime.clone(),
            ci.clone(),
            tiers,
            locks,
        );
        Harness {
            manager,
            runtime,
            ci,
            db,
            _dir: dir,
        }
    }

    async fn harness() -> Harness {
        harness_with(FakeCi::default()).await
    }

    #[tokio::test]
    async fn test_create_allocates_distinct_ports() {
        let h = harness().await;
        let first = h.manager.create(CreateInstance::new("Acme", AppVersion::V17)).await.unwrap();
        let second = h.manager.create(CreateInstance::new("Globex", AppVersion::V18)).await.unwrap();

        assert_eq!(first.state, InstanceState::Draft);
        let ports = [
            first.http_port.unwrap(),
            first.longpolling_port.unwrap(),
            second.http_port.unwrap(),
            second.longpolling_port.unwrap(),
        ];
        for (i, port) in ports.iter().enumerate() {
            assert!((38069..=38169).contains(port));
            assert!(!ports[i + 1..].contains(port));
        }
        assert!(first.longpolling_port > first.http_port);
    }

    #[tokio::test]
    async fn test_create_rejects_duplicates_and_blank_names() {
        let h = harness().await;
        h.manager.create(CreateInstance::new("Acme", AppVersion::V17)).await.unwrap();

        let duplicate = h.manager.create(CreateInstance::new("Acme", AppVersion::V17)).await;
        assert!(matches!(duplicate, Err(Error::Validation(_))));
        let blank = h.manager.create(CreateInstance::new("  ", AppVersion::V17)).await;
        assert!(matches!(blank, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_create_rejects_colliding_derived_names() {
        let h = harness().await;
        let first = h.manager.create(CreateInstance::new("Acme Shop", AppVersion::V17)).await.unwrap();

        let result = h.manager.create(CreateInstance::new("acme_shop", AppVersion::V17)).await;
        match result {
            Err(Error::Validation(message)) => assert!(message.contains("Acme Shop")),
            other => panic!("expected validation error, got {:?}", other.map(|i| i.name)),
        }

        let all = h.db.instances().get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].instance_path, first.instance_path);
    }

    #[tokio::test]
    async fn test_create_with_tier() {
        let h = harness().await;
        let limits = ResourceLimits {
            app: ServiceResources::new(3.0, 1.5, "6g", "2g"),
            database: ServiceResources::unbounded(),
        };
        let tier = h.db.tiers().insert(&ResourceTier::new("medium", "Medium", limits.clone())).await.unwrap();

        let mut request = CreateInstance::new("Acme", AppVersion::V17);
        request.tier = Some("medium".to_string());
        let instance = h.manager.create(request).await.unwrap();
        assert_eq!(instance.tier_id, Some(tier));
        assert_eq!(instance.resources, limits);

        let mut request = CreateInstance::new("Globex", AppVersion::V17);
        request.tier = Some("missing".to_string());
        assert!(matches!(h.manager.create(request).await, Err(Error::TierNotFound(_))));
    }

    #[tokio::test]
    async fn test_start_writes_layout_and_runs() {
        let h = harness().await;
        let created = h.manager.create(CreateInstance::new("Acme", AppVersion::V17)).await.unwrap();

        let started = h.manager.start(created.id).await.unwrap();
        assert_eq!(started.state, InstanceState::Running);
        assert!(started.compose_path().exists());
        assert!(started.runtime_config_path().exists());
        assert!(started.git_addons_path().is_dir());
        assert_eq!(h.runtime.executed(), vec![RuntimeCommand::Up]);

        // Running instances cannot be started again
        let again = h.manager.start(created.id).await;
        assert!(matches!(again, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_start_failure_sets_error_state() {
        let h = harness().await;
        let created = h.manager.create(CreateInstance::new("Acme", AppVersion::V17)).await.unwrap();
        h.runtime.fail_on(RuntimeCommand::Up);

        let result = h.manager.start(created.id).await;
        assert!(matches!(result, Err(Error::Deployment(_))));

        let stored = h.manager.get(created.id).await.unwrap();
        assert_eq!(stored.state, InstanceState::Error);
        assert!(stored.last_error.unwrap().contains("no such service"));

        // Error is not startable; restart heals it
        assert!(matches!(h.manager.start(created.id).await, Err(Error::Validation(_))));
        h.runtime.succeed();
        let healed = h.manager.restart(created.id).await.unwrap();
        assert_eq!(healed.state, InstanceState::Running);
        assert!(h.manager.get(created.id).await.unwrap().last_error.is_none());
    }

    #[tokio::test]
    async fn test_stop_requires_manifest() {
        let h = harness().await;
        let created = h.manager.create(CreateInstance::new("Acme", AppVersion::V17)).await.unwrap();
        assert!(matches!(h.manager.stop(created.id).await, Err(Error::Validation(_))));

        h.manager.start(created.id).await.unwrap();
        let stopped = h.manager.stop(created.id).await.unwrap();
        assert_eq!(stopped.state, InstanceState::Stopped);
        assert_eq!(
            h.runtime.executed(),
            vec![RuntimeCommand::Up, RuntimeCommand::Down { volumes: false }]
        );

        let restarted = h.manager.start(created.id).await.unwrap();
        assert_eq!(restarted.state, InstanceState::Running);
    }

    #[tokio::test]
    async fn test_stop_failure_sets_error_state() {
        let h = harness().await;
        let created = h.manager.create(CreateInstance::new("Acme", AppVersion::V17)).await.unwrap();
        h.manager.start(created.id).await.unwrap();
        h.runtime.fail_on(RuntimeCommand::Down { volumes: false });

        assert!(h.manager.stop(created.id).await.is_err());
        assert_eq!(h.manager.get(created.id).await.unwrap().state, InstanceState::Error);
    }

    #[tokio::test]
    async fn test_update_resources() {
        let h = harness().await;
        let created = h.manager.create(CreateInstance::new("Acme", AppVersion::V17)).await.unwrap();
        let limits = ResourceLimits {
            app: ServiceResources::new(0.5, 0.0, "768m", ""),
            database: ServiceResources::unbounded(),
        };

        let draft = h.manager.update_resources(created.id, limits.clone()).await;
        assert!(matches!(draft, Err(Error::Validation(_))));

        h.manager.start(created.id).await.unwrap();
        let updated = h.manager.update_resources(created.id, limits.clone()).await.unwrap();
        assert_eq!(updated.resources, limits);
        assert_eq!(updated.state, InstanceState::Running);
        assert_eq!(
            h.runtime.executed(),
            vec![RuntimeCommand::Up, RuntimeCommand::Recreate]
        );

        let compose = std::fs::read_to_string(updated.compose_path()).unwrap();
        assert!(compose.contains("memory: 768m"));
        assert_eq!(h.manager.get(created.id).await.unwrap().resources, limits);
    }

    #[tokio::test]
    async fn test_update_resources_when_stopped_skips_recreate() {
        let h = harness().await;
        let created = h.manager.create(CreateInstance::new("Acme", AppVersion::V17)).await.unwrap();
        h.manager.start(created.id).await.unwrap();
        h.manager.stop(created.id).await.unwrap();

        h.manager.update_resources(created.id, ResourceLimits::default()).await.unwrap();
        assert!(!h.runtime.executed().contains(&RuntimeCommand::Recreate));
    }

    #[tokio::test]
    async fn test_failed_recreate_sets_error_state() {
        let h = harness().await;
        let created = h.manager.create(CreateInstance::new("Acme", AppVersion::V17)).await.unwrap();
        h.manager.start(created.id).await.unwrap();
        h.runtime.fail_on(RuntimeCommand::Recreate);

        let result = h.manager.update_resources(created.id, ResourceLimits::default()).await;
        assert!(matches!(result, Err(Error::Deployment(_))));
        assert_eq!(h.manager.get(created.id).await.unwrap().state, InstanceState::Error);
    }

    #[tokio::test]
    async fn test_delete_tears_down_and_removes_backups() {
        let h = harness().await;
        let created = h.manager.create(CreateInstance::new("Acme", AppVersion::V17)).await.unwrap();
        h.manager.start(created.id).await.unwrap();

        let artifact = created.instance_path.join("old.zip");
        std::fs::write(&artifact, b"zip").unwrap();
        let backup = berth_core::Backup::success(
            created.id,
            None,
            "old.zip",
            artifact.clone(),
            3,
            chrono::Utc::now(),
        );
        h.db.backups().insert(&backup).await.unwrap();

        // Teardown failure does not block deletion
        h.runtime.fail_on(RuntimeCommand::Down { volumes: true });
        h.manager.delete(created.id).await.unwrap();

        assert!(h.runtime.executed().contains(&RuntimeCommand::Down { volumes: true }));
        assert!(!artifact.exists());
        assert!(matches!(h.manager.get(created.id).await, Err(Error::InstanceNotFound(_))));
    }

    #[tokio::test]
    async fn test_start_provisions_ci_once() {
        let h = harness().await;
        let mut request = CreateInstance::new("Acme", AppVersion::V17);
        request.need_custom_addons = true;
        let created = h.manager.create(request).await.unwrap();

        let started = h.manager.start(created.id).await.unwrap();
        assert_eq!(started.repository_url.as_deref(), Some("https://github.com/octo/acme.git"));
        h.manager.stop(created.id).await.unwrap();
        h.manager.start(created.id).await.unwrap();

        assert_eq!(h.ci.repositories.lock().len(), 1);
        assert_eq!(h.ci.jobs.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_enable_integration_modes() {
        let h = harness_with(FakeCi::failing()).await;
        let created = h.manager.create(CreateInstance::new("Acme", AppVersion::V17)).await.unwrap();

        assert!(!h.manager.enable_integration(created.id, false).await.unwrap());
        let raised = h.manager.enable_integration(created.id, true).await;
        assert!(matches!(raised, Err(Error::Integration(_))));
    }

    #[tokio::test]
    async fn test_manifest_preview_is_deterministic() {
        let h = harness().await;
        let created = h.manager.create(CreateInstance::new("Acme", AppVersion::V17)).await.unwrap();
        let first = h.manager.manifest(created.id).await.unwrap();
        let second = h.manager.manifest(created.id).await.unwrap();
        assert_eq!(first, second);
        assert!(!created.compose_path().exists());
    }

    #[tokio::test]
    async fn test_transitions_are_audited() {
        let h = harness().await;
        let created = h.manager.create(CreateInstance::new("Acme", AppVersion::V17)).await.unwrap();
        h.manager.start(created.id).await.unwrap();

        let entries = h.db.audit().find_by_entity(AuditEntity::Instance, created.id).await.unwrap();
        let messages: Vec<_> = entries.iter().map(|e| e.message.as_str()).collect();
        assert!(messages.iter().any(|m| m.starts_with("Created on port")));
        assert!(messages.contains(&"Started"));
    }
}
