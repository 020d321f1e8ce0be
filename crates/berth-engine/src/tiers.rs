//! Resource tier templates

use crate::audit;
use crate::locks::InstanceLocks;
use berth_core::{AuditEntity, Error, Instance, ResourceTier, Result};
use berth_db::Database;
use std::sync::Arc;
use tracing::{debug, info};

/// Applies tier resource values to instances by copy
pub struct ResourceTierService {
    db: Database,
    locks: Arc<InstanceLocks>,
}

impl ResourceTierService {
    pub fn new(db: Database, locks: Arc<InstanceLocks>) -> Self {
        Self { db, locks }
    }

    /// Copy the tier's eight resource fields onto `instance`. No-op without a tier.
    pub fn apply_tier(instance: &mut Instance, tier: Option<&ResourceTier>) {
        if let Some(tier) = tier {
            instance.resources = tier.resources.clone();
        }
    }

    /// Point `instance` at `tier`, copy its values and persist both.
    /// The caller holds the instance lock.
    pub async fn assign_tier(&self, instance: &mut Instance, tier: &ResourceTier) -> Result<()> {
        instance.tier_id = Some(tier.id);
        Self::apply_tier(instance, Some(tier));
        self.db.instances().update(instance).await?;

        info!("Assigned tier {} to instance {}", tier.code, instance.name);
        audit::record(
            &self.db,
            AuditEntity::Instance,
            instance.id,
            &format!("Tier {} assigned", tier.code),
        )
        .await;
        Ok(())
    }

    /// Re-apply `tier` to every instance referencing it. Manifests are left
    /// untouched; returns the number of instances updated.
    pub async fn propagate(&self, tier: &ResourceTier) -> Result<usize> {
        let mut updated = 0;
        for candidate in self.db.instances().find_by_tier(tier.id).await? {
            let lock = self.locks.lock_for(candidate.id);
            let _guard = lock.lock().await;

            self.db.instances().update_resources(candidate.id, &tier.resources).await?;
            debug!("Propagated tier {} to instance {}", tier.code, candidate.name);
            updated += 1;
        }

        info!("Propagated tier {} to {} instance(s)", tier.code, updated);
        audit::record(
            &self.db,
            AuditEntity::Tier,
            tier.id,
            &format!("Propagated to {} instance(s)", updated),
        )
        .await;
        Ok(updated)
    }

    pub async fn create(&self, mut tier: ResourceTier) -> Result<ResourceTier> {
        tier.validate()?;
        tier.id = self.db.tiers().insert(&tier).await?;
        audit::record(&self.db, AuditEntity::Tier, tier.id, "Tier created").await;
        info!("Created tier {}", tier.code);
        Ok(tier)
    }

    pub async fn get(&self, code: &str) -> Result<ResourceTier> {
        self.db
            .tiers()
            .get_by_code(code)
            .await?
            .ok_or_else(|| Error::TierNotFound(code.to_string()))
    }

    pub async fn list(&self) -> Result<Vec<ResourceTier>> {
        self.db.tiers().get_all().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{insert_instance, setup_db};
    use berth_core::{ResourceLimits, ServiceResources};

    fn large() -> ResourceLimits {
        ResourceLimits {
            app: ServiceResources::new(4.0, 2.0, "8g", "4g"),
            database: ServiceResources::new(2.0, 1.0, "4g", "2g"),
        }
    }

    #[test]
    fn test_apply_tier_copies_values() {
        let mut instance = crate::test_support::sample_instance("Acme", 8069);
        let tier = ResourceTier::new("large", "Large", large());

        ResourceTierService::apply_tier(&mut instance, Some(&tier));
        assert_eq!(instance.resources, large());

        ResourceTierService::apply_tier(&mut instance, None);
        assert_eq!(instance.resources, large());
    }

    #[tokio::test]
    async fn test_assign_then_propagate() {
        let (db, dir) = setup_db().await;
        let service = ResourceTierService::new(db.clone(), Arc::new(InstanceLocks::new()));
        let mut tier = service.create(ResourceTier::new("large", "Large", large())).await.unwrap();

        let mut first = insert_instance(&db, dir.path(), "First", 8069).await;
        let mut second = insert_instance(&db, dir.path(), "Second", 8071).await;
        let untouched = insert_instance(&db, dir.path(), "Third", 8073).await;
        service.assign_tier(&mut first, &tier).await.unwrap();
        service.assign_tier(&mut second, &tier).await.unwrap();

        // Instances keep independent copies
        let mut custom = large();
        custom.app.memory_limit = "16g".to_string();
        db.instances().update_resources(second.id, &custom).await.unwrap();

        tier.resources.app.cpu_limit = 8.0;
        db.tiers().update(&tier).await.unwrap();
        assert_eq!(service.propagate(&tier).await.unwrap(), 2);

        for id in [first.id, second.id] {
            let stored = db.instances().get_by_id(id).await.unwrap().unwrap();
            assert_eq!(stored.resources, tier.resources);
            assert_eq!(stored.tier_id, Some(tier.id));
        }
        let stored = db.instances().get_by_id(untouched.id).await.unwrap().unwrap();
        assert_eq!(stored.resources, ResourceLimits::default());
    }

    #[tokio::test]
    async fn test_get_unknown_tier() {
        let (db, _dir) = setup_db().await;
        let service = ResourceTierService::new(db, Arc::new(InstanceLocks::new()));
        let result = service.get("missing").await;
        assert!(matches!(result, Err(Error::TierNotFound(_))));
    }
}
