//! Instances repository - CRUD operations for instances

use berth_core::{Error, Instance, InstanceState, ResourceLimits, Result, ServiceResources};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::collections::HashSet;
use std::path::PathBuf;

use crate::{format_ts, map_write_error, parse_ts};

const SELECT_COLUMNS: &str = r#"
    SELECT id, name, slug, db_name, version, http_port, longpolling_port, instance_path,
           db_user, db_password, admin_password, map_domain, mapped_domain, tier_id,
           app_cpu_limit, app_cpu_reservation, app_memory_limit, app_memory_reservation,
           db_cpu_limit, db_cpu_reservation, db_memory_limit, db_memory_reservation,
           state, last_error, need_custom_addons, repository_url, created_at
    FROM instances
"#;

/// Repository for instance operations
pub struct InstancesRepository {
    pool: SqlitePool,
}

impl InstancesRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new instance. A duplicate name, primary port, slug, database name or
    /// instance path is a validation error.
    pub async fn insert(&self, instance: &Instance) -> Result<i64> {
        let res = &instance.resources;
        let result = sqlx::query(
            r#"
            INSERT INTO instances (
                name, slug, db_name, version, http_port, longpolling_port, instance_path,
                db_user, db_password, admin_password, map_domain, mapped_domain, tier_id,
                app_cpu_limit, app_cpu_reservation, app_memory_limit, app_memory_reservation,
                db_cpu_limit, db_cpu_reservation, db_memory_limit, db_memory_reservation,
                state, last_error, need_custom_addons, repository_url, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&instance.name)
        .bind(&instance.slug)
        .bind(&instance.db_name)
        .bind(instance.version.as_str())
        .bind(instance.http_port.map(i64::from))
        .bind(instance.longpolling_port.map(i64::from))
        .bind(instance.instance_path.to_string_lossy().to_string())
        .bind(&instance.db_user)
        .bind(&instance.db_password)
        .bind(&instance.admin_password)
        .bind(instance.map_domain)
        .bind(&instance.mapped_domain)
        .bind(instance.tier_id)
        .bind(res.app.cpu_limit)
        .bind(res.app.cpu_reservation)
        .bind(&res.app.memory_limit)
        .bind(&res.app.memory_reservation)
        .bind(res.database.cpu_limit)
        .bind(res.database.cpu_reservation)
        .bind(&res.database.memory_limit)
        .bind(&res.database.memory_reservation)
        .bind(instance.state.as_str())
        .bind(&instance.last_error)
        .bind(instance.need_custom_addons)
        .bind(&instance.repository_url)
        .bind(format_ts(&instance.created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(e, "Instance name, port, database or path"))?;

        Ok(result.last_insert_rowid())
    }

    /// Persist every mutable field of an existing instance
    pub async fn update(&self, instance: &Instance) -> Result<()> {
        let res = &instance.resources;
        let result = sqlx::query(
            r#"
            UPDATE instances SET
                name = ?, slug = ?, db_name = ?, version = ?, http_port = ?, longpolling_port = ?,
                instance_path = ?, db_user = ?, db_password = ?, admin_password = ?,
                map_domain = ?, mapped_domain = ?, tier_id = ?,
                app_cpu_limit = ?, app_cpu_reservation = ?, app_memory_limit = ?, app_memory_reservation = ?,
                db_cpu_limit = ?, db_cpu_reservation = ?, db_memory_limit = ?, db_memory_reservation = ?,
                state = ?, last_error = ?, need_custom_addons = ?, repository_url = ?
            WHERE id = ?
            "#,
        )
        .bind(&instance.name)
        .bind(&instance.slug)
        .bind(&instance.db_name)
        .bind(instance.version.as_str())
        .bind(instance.http_port.map(i64::from))
        .bind(instance.longpolling_port.map(i64::from))
        .bind(instance.instance_path.to_string_lossy().to_string())
        .bind(&instance.db_user)
        .bind(&instance.db_password)
        .bind(&instance.admin_password)
        .bind(instance.map_domain)
        .bind(&instance.mapped_domain)
        .bind(instance.tier_id)
        .bind(res.app.cpu_limit)
        .bind(res.app.cpu_reservation)
        .bind(&res.app.memory_limit)
        .bind(&res.app.memory_reservation)
        .bind(res.database.cpu_limit)
        .bind(res.database.cpu_reservation)
        .bind(&res.database.memory_limit)
        .bind(&res.database.memory_reservation)
        .bind(instance.state.as_str())
        .bind(&instance.last_error)
        .bind(instance.need_custom_addons)
        .bind(&instance.repository_url)
        .bind(instance.id)
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(e, "Instance name, port, database or path"))?;

        if result.rows_affected() == 0 {
            return Err(Error::InstanceNotFound(instance.id.to_string()));
        }
        Ok(())
    }

    /// Record a lifecycle state change
    pub async fn update_state(
        &self,
        id: i64,
        state: InstanceState,
        last_error: Option<&str>,
    ) -> Result<()> {
        let result = sqlx::query("UPDATE instances SET state = ?, last_error = ? WHERE id = ?")
            .bind(state.as_str())
            .bind(last_error)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::DbError(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(Error::InstanceNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Overwrite the eight resource fields
    pub async fn update_resources(&self, id: i64, resources: &ResourceLimits) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE instances SET
                app_cpu_limit = ?, app_cpu_reservation = ?, app_memory_limit = ?, app_memory_reservation = ?,
                db_cpu_limit = ?, db_cpu_reservation = ?, db_memory_limit = ?, db_memory_reservation = ?
            WHERE id = ?
            "#,
        )
        .bind(resources.app.cpu_limit)
        .bind(resources.app.cpu_reservation)
        .bind(&resources.app.memory_limit)
        .bind(&resources.app.memory_reservation)
        .bind(resources.database.cpu_limit)
        .bind(resources.database.cpu_reservation)
        .bind(&resources.database.memory_limit)
        .bind(&resources.database.memory_reservation)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::DbError(e.to_string()))?;

        Ok(())
    }

    pub async fn set_repository_url(&self, id: i64, url: &str) -> Result<()> {
        sqlx::query("UPDATE instances SET repository_url = ? WHERE id = ?")
            .bind(url)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::DbError(e.to_string()))?;

        Ok(())
    }

    /// Get instance by ID
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Instance>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::DbError(e.to_string()))?;

        row.as_ref().map(row_to_instance).transpose()
    }

    /// Get instance by name
    pub async fn get_by_name(&self, name: &str) -> Result<Option<Instance>> {
        let row = sqlx::query(&format!("{} WHERE name = ?", SELECT_COLUMNS))
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::DbError(e.to_string()))?;

        row.as_ref().map(row_to_instance).transpose()
    }

    /// Get all instances
    pub async fn get_all(&self) -> Result<Vec<Instance>> {
        let rows = sqlx::query(&format!("{} ORDER BY id", SELECT_COLUMNS))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::DbError(e.to_string()))?;

        rows.iter().map(row_to_instance).collect()
    }

    /// Instances currently referencing a tier
    pub async fn find_by_tier(&self, tier_id: i64) -> Result<Vec<Instance>> {
        let rows = sqlx::query(&format!("{} WHERE tier_id = ? ORDER BY id", SELECT_COLUMNS))
            .bind(tier_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::DbError(e.to_string()))?;

        rows.iter().map(row_to_instance).collect()
    }

    /// Every recorded primary and secondary port
    pub async fn used_ports(&self) -> Result<HashSet<u16>> {
        let rows: Vec<(Option<i64>, Option<i64>)> =
            sqlx::query_as("SELECT http_port, longpolling_port FROM instances")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| Error::DbError(e.to_string()))?;

        Ok(rows
            .into_iter()
            .flat_map(|(http, longpolling)| [http, longpolling])
            .flatten()
            .filter_map(|port| u16::try_from(port).ok())
            .collect())
    }

    /// Check if an instance exists by name
    pub async fn exists(&self, name: &str) -> Result<bool> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM instances WHERE name = ?")
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Error::DbError(e.to_string()))?;

        Ok(row.0 > 0)
    }

    /// Existing instance whose slug, database name or instance path equals the candidate's
    pub async fn find_conflicting(&self, candidate: &Instance) -> Result<Option<Instance>> {
        let row = sqlx::query(&format!(
            "{} WHERE slug = ? OR db_name = ? OR instance_path = ? LIMIT 1",
            SELECT_COLUMNS
        ))
        .bind(&candidate.slug)
        .bind(&candidate.db_name)
        .bind(candidate.instance_path.to_string_lossy().to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::DbError(e.to_string()))?;

        row.as_ref().map(row_to_instance).transpose()
    }

    /// Delete instance by ID. Backup configs and remaining backups cascade.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM instances WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::DbError(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}

fn port(value: Option<i64>) -> Option<u16> {
    value.and_then(|p| u16::try_from(p).ok())
}

pub(crate) fn row_to_resources(row: &SqliteRow) -> ResourceLimits {
    ResourceLimits {
        app: ServiceResources {
            cpu_limit: row.get("app_cpu_limit"),
            cpu_reservation: row.get("app_cpu_reservation"),
            memory_limit: row.get("app_memory_limit"),
            memory_reservation: row.get("app_memory_reservation"),
        },
        database: ServiceResources {
            cpu_limit: row.get("db_cpu_limit"),
            cpu_reservation: row.get("db_cpu_reservation"),
            memory_limit: row.get("db_memory_limit"),
            memory_reservation: row.get("db_memory_reservation"),
        },
    }
}

fn row_to_instance(row: &SqliteRow) -> Result<Instance> {
    let version: String = row.get("version");
    let state: String = row.get("state");
    let instance_path: String = row.get("instance_path");
    let created_at: String = row.get("created_at");

    Ok(Instance {
        id: row.get("id"),
        name: row.get("name"),
        slug: row.get("slug"),
        db_name: row.get("db_name"),
        version: version.parse()?,
        http_port: port(row.get("http_port")),
        longpolling_port: port(row.get("longpolling_port")),
        instance_path: PathBuf::from(instance_path),
        db_user: row.get("db_user"),
        db_password: row.get("db_password"),
        admin_password: row.get("admin_password"),
        map_domain: row.get("map_domain"),
        mapped_domain: row.get("mapped_domain"),
        tier_id: row.get("tier_id"),
        resources: row_to_resources(row),
        state: state.parse()?,
        last_error: row.get("last_error"),
        need_custom_addons: row.get("need_custom_addons"),
        repository_url: row.get("repository_url"),
        created_at: parse_ts(&created_at)?,
    })
}
