//! Compose manifest and runtime configuration generation
//!
//! Output is a pure function of the instance record and the routing
//! settings, so two calls with the same inputs produce identical text.

use std::fmt::Write as _;
use std::path::Path;

use crate::config::{RoutingSettings, Settings};
use crate::constants::*;
use crate::error::Result;
use crate::naming;
use crate::types::{Instance, ServiceResources};

/// Generated deployment artifacts for one instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    /// docker-compose.yml contents
    pub compose: String,
    /// odoo.conf contents
    pub runtime_config: String,
}

impl Manifest {
    /// Write both artifacts, creating parent directories as needed
    pub fn write(&self, compose_path: &Path, runtime_config_path: &Path) -> Result<()> {
        write_file(compose_path, &self.compose)?;
        write_file(runtime_config_path, &self.runtime_config)
    }

    /// Write both artifacts to the instance's standard locations
    pub fn write_for(&self, instance: &Instance) -> Result<()> {
        self.write(&instance.compose_path(), &instance.runtime_config_path())
    }
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

/// Builds manifests from instance attributes
#[derive(Debug, Clone)]
pub struct ManifestGenerator {
    routing: RoutingSettings,
    development_mode: bool,
}

impl ManifestGenerator {
    pub fn new(routing: RoutingSettings, development_mode: bool) -> Self {
        Self {
            routing,
            development_mode,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.routing.clone(), settings.development_mode)
    }

    pub fn generate(&self, instance: &Instance) -> Manifest {
        Manifest {
            compose: self.compose(instance),
            runtime_config: runtime_config(instance),
        }
    }

    /// docker-compose.yml for the application and its database
    pub fn compose(&self, instance: &Instance) -> String {
        let root = instance.instance_path.display();
        let db_resources = resource_section(&instance.resources.database);
        let app_resources = resource_section(&instance.resources.app);
        let labels = self.routing_labels(instance);
        let ports = self.ports_section(instance);

        format!(
            r#"services:
  db:
    image: {db_image}
    container_name: {dbid}_db
    environment:
      - POSTGRES_DB=postgres
      - POSTGRES_USER={db_user}
      - POSTGRES_PASSWORD={db_password}
      - PGDATA=/var/lib/postgresql/data/pgdata
    volumes:
      - odoo-db-data:/var/lib/postgresql/data/pgdata
    restart: always{db_resources}

  odoo:
    image: {app_image}
    container_name: {dbid}_odoo
    user: root
    depends_on:
      - db
{ports}    environment:
      - HOST=db
      - USER={db_user}
      - PASSWORD={db_password}
    volumes:
      - odoo-web-data:/var/lib/odoo
      - {root}/{config_dir}:/etc/odoo
      - {root}/{addons_dir}:/mnt/extra-addons
    restart: always{labels}{app_resources}

volumes:
  odoo-web-data:
  odoo-db-data:
"#,
            db_image = DB_IMAGE,
            dbid = instance.db_name,
            db_user = instance.db_user,
            db_password = instance.db_password,
            app_image = instance.version.image(),
            config_dir = CONFIG_DIR,
            addons_dir = ADDONS_DIR,
        )
    }

    /// Host port mappings, only emitted in development mode
    fn ports_section(&self, instance: &Instance) -> String {
        if !self.development_mode {
            return String::new();
        }
        let mut out = String::from("    ports:\n");
        if let Some(port) = instance.http_port {
            let _ = writeln!(out, "      - \"{}:{}\"", port, APP_HTTP_PORT);
        }
        if let Some(port) = instance.longpolling_port {
            let _ = writeln!(out, "      - \"{}:{}\"", port, APP_LONGPOLLING_PORT);
        }
        out
    }

    /// Reverse proxy labels for the application service
    pub fn routing_labels(&self, instance: &Instance) -> String {
        let Some(host) = self.routing.public_host(instance) else {
            return String::new();
        };
        let router = naming::router_name(&naming::instance_slug(&instance.name));
        let routing = &self.routing;

        let mut labels = vec!["    labels:".to_string(), label("traefik.enable=true")];

        if routing.enable_https {
            labels.extend([
                label(format!("traefik.http.routers.{router}.rule=Host(`{host}`)")),
                label(format!(
                    "traefik.http.routers.{router}.entrypoints={}",
                    routing.https_entrypoint
                )),
                label(format!("traefik.http.routers.{router}.tls=true")),
                label(format!(
                    "traefik.http.routers.{router}.tls.certresolver={}",
                    routing.cert_resolver
                )),
                label(format!("traefik.http.routers.{router}.middlewares={router}-headers")),
                label(format!("traefik.http.routers.{router}-http.rule=Host(`{host}`)")),
                label(format!(
                    "traefik.http.routers.{router}-http.entrypoints={}",
                    routing.http_entrypoint
                )),
                label(format!(
                    "traefik.http.routers.{router}-http.middlewares={router}-redirect"
                )),
                label(format!(
                    "traefik.http.middlewares.{router}-redirect.redirectscheme.scheme=https"
                )),
                label(format!(
                    "traefik.http.middlewares.{router}-redirect.redirectscheme.permanent=true"
                )),
                label(format!(
                    "traefik.http.middlewares.{router}-headers.headers.customrequestheaders.X-Forwarded-Proto=https"
                )),
                label(format!(
                    "traefik.http.middlewares.{router}-headers.headers.customrequestheaders.X-Real-IP={{{{.RemoteAddr}}}}"
                )),
            ]);
        } else {
            labels.extend([
                label(format!("traefik.http.routers.{router}.rule=Host(`{host}`)")),
                label(format!(
                    "traefik.http.routers.{router}.entrypoints={}",
                    routing.http_entrypoint
                )),
                label(format!("traefik.http.routers.{router}.middlewares={router}-headers")),
            ]);
        }

        labels.extend([
            label(format!(
                "traefik.http.middlewares.{router}-headers.headers.customrequestheaders.Upgrade=websocket"
            )),
            label(format!(
                "traefik.http.middlewares.{router}-headers.headers.customrequestheaders.Connection=Upgrade"
            )),
            label(format!(
                "traefik.http.services.{router}.loadbalancer.server.port={}",
                APP_HTTP_PORT
            )),
        ]);

        format!("\n{}", labels.join("\n"))
    }
}

fn label(text: impl AsRef<str>) -> String {
    format!("      - \"{}\"", text.as_ref())
}

/// `deploy.resources` block for one service, empty when nothing is bounded
pub fn resource_section(resources: &ServiceResources) -> String {
    let has_limits = resources.has_limits();
    let has_reservations = resources.has_reservations();
    if !has_limits && !has_reservations {
        return String::new();
    }

    let mut lines = vec!["\n    deploy:".to_string(), "      resources:".to_string()];

    if has_limits {
        lines.push("        limits:".to_string());
        if resources.cpu_limit > 0.0 {
            lines.push(format!("          cpus: \"{:?}\"", resources.cpu_limit));
        }
        if !resources.memory_limit.is_empty() {
            lines.push(format!("          memory: {}", resources.memory_limit));
        }
    }

    if has_reservations {
        lines.push("        reservations:".to_string());
        if resources.cpu_reservation > 0.0 {
            lines.push(format!("          cpus: \"{:?}\"", resources.cpu_reservation));
        }
        if !resources.memory_reservation.is_empty() {
            lines.push(format!("          memory: {}", resources.memory_reservation));
        }
    }

    lines.join("\n")
}

/// odoo.conf contents
pub fn runtime_config(instance: &Instance) -> String {
    format!(
        "[options]\n\
         admin_passwd = {admin}\n\
         db_host = db\n\
         db_port = {db_port}\n\
         db_user = {user}\n\
         db_password = {password}\n\
         db_name = {db_name}\n\
         addons_path = /mnt/extra-addons,/usr/lib/python3/dist-packages/odoo/addons\n",
        admin = instance.admin_password,
        db_port = DB_PORT,
        user = instance.db_user,
        password = instance.db_password,
        db_name = instance.db_name,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AppVersion, ResourceLimits};
    use tempfile::tempdir;

    fn routing(domain: &str, https: bool) -> RoutingSettings {
        RoutingSettings {
            base_domain: domain.to_string(),
            enable_https: https,
            ..Default::default()
        }
    }

    fn instance(routing: &RoutingSettings) -> Instance {
        let mut instance =
            Instance::try_new("Acme Shop", AppVersion::V18, Path::new("/srv/odoo"), routing)
                .unwrap()
                .with_ports(8070, 8071);
        instance.db_password = "dbpass".to_string();
        instance.admin_password = "adminpass".to_string();
        instance
    }

    #[test]
    fn test_generation_is_deterministic() {
        let routing = routing("example.com", true);
        let generator = ManifestGenerator::new(routing.clone(), false);
        let inst = instance(&routing);
        assert_eq!(generator.generate(&inst), generator.generate(&inst));
    }

    #[test]
    fn test_compose_shape() {
        let routing = routing("", true);
        let generator = ManifestGenerator::new(routing.clone(), false);
        let compose = generator.compose(&instance(&routing));

        assert!(compose.starts_with("services:\n  db:\n    image: postgres:16\n"));
        assert!(compose.contains("container_name: acme_shop_db"));
        assert!(compose.contains("container_name: acme_shop_odoo"));
        assert!(compose.contains("image: odoo:18.0"));
        assert!(compose.contains("- POSTGRES_PASSWORD=dbpass"));
        assert!(compose.contains("- /srv/odoo/acme_shop/config:/etc/odoo"));
        assert!(compose.contains("- /srv/odoo/acme_shop/addons:/mnt/extra-addons"));
        assert!(compose.contains("    depends_on:\n      - db\n    environment:\n"));
        assert!(compose.ends_with("volumes:\n  odoo-web-data:\n  odoo-db-data:\n"));
        assert!(!compose.contains("ports:"));
        assert!(!compose.contains("traefik"));
    }

    #[test]
    fn test_development_mode_publishes_ports() {
        let routing = routing("", true);
        let generator = ManifestGenerator::new(routing.clone(), true);
        let compose = generator.compose(&instance(&routing));
        assert!(compose.contains(
            "      - db\n    ports:\n      - \"8070:8069\"\n      - \"8071:8072\"\n    environment:"
        ));
    }

    #[test]
    fn test_default_resources_block() {
        let section = resource_section(&ResourceLimits::default().app);
        assert_eq!(
            section,
            "\n    deploy:\n      resources:\n        limits:\n          cpus: \"2.0\"\n          memory: 4g\n        reservations:\n          cpus: \"1.0\"\n          memory: 1g"
        );
    }

    #[test]
    fn test_resource_blocks_independent() {
        assert_eq!(resource_section(&ServiceResources::unbounded()), "");

        let limits_only = resource_section(&ServiceResources::new(0.5, 0.0, "", ""));
        assert!(limits_only.contains("limits:"));
        assert!(limits_only.contains("cpus: \"0.5\""));
        assert!(!limits_only.contains("reservations:"));

        let reservations_only = resource_section(&ServiceResources::new(0.0, 0.0, "", "256m"));
        assert!(!reservations_only.contains("limits:"));
        assert!(reservations_only.contains("reservations:\n          memory: 256m"));
    }

    #[test]
    fn test_unbounded_database_omits_only_its_block() {
        let routing = routing("", true);
        let generator = ManifestGenerator::new(routing.clone(), false);
        let mut inst = instance(&routing);
        inst.resources.database = ServiceResources::unbounded();

        let compose = generator.compose(&inst);
        assert_eq!(compose.matches("deploy:").count(), 1);
        assert!(compose.contains("restart: always\n\n  odoo:"));
    }

    #[test]
    fn test_https_labels() {
        let routing = routing("example.com", true);
        let generator = ManifestGenerator::new(routing.clone(), false);
        let labels = generator.routing_labels(&instance(&routing));

        assert!(labels.starts_with("\n    labels:\n      - \"traefik.enable=true\""));
        assert!(labels.contains("traefik.http.routers.acme-shop.rule=Host(`acme-shop.example.com`)"));
        assert!(labels.contains("traefik.http.routers.acme-shop.entrypoints=websecure"));
        assert!(labels.contains("traefik.http.routers.acme-shop.tls.certresolver=letsencrypt"));
        assert!(labels.contains("traefik.http.routers.acme-shop-http.entrypoints=web"));
        assert!(labels.contains("redirectscheme.permanent=true"));
        assert!(labels.contains("X-Forwarded-Proto=https"));
        assert!(labels.contains("X-Real-IP={{.RemoteAddr}}"));
        assert!(labels.contains("Upgrade=websocket"));
        assert!(labels.ends_with(
            "      - \"traefik.http.services.acme-shop.loadbalancer.server.port=8069\""
        ));
    }

    #[test]
    fn test_http_only_labels() {
        let routing = routing("example.com", false);
        let generator = ManifestGenerator::new(routing.clone(), false);
        let labels = generator.routing_labels(&instance(&routing));

        assert!(labels.contains("traefik.http.routers.acme-shop.entrypoints=web"));
        assert!(labels.contains("Connection=Upgrade"));
        assert!(!labels.contains("tls"));
        assert!(!labels.contains("redirect"));
        assert!(!labels.contains("X-Forwarded-Proto"));
    }

    #[test]
    fn test_labels_absent_without_domain_or_flag() {
        let unrouted = routing("  ", true);
        let generator = ManifestGenerator::new(unrouted.clone(), false);
        assert_eq!(generator.routing_labels(&instance(&unrouted)), "");

        let routed = routing("example.com", true);
        let generator = ManifestGenerator::new(routed.clone(), false);
        let inst = instance(&routed).with_map_domain(false);
        assert_eq!(generator.routing_labels(&inst), "");
    }

    #[test]
    fn test_runtime_config() {
        let routing = routing("", true);
        let conf = runtime_config(&instance(&routing));
        assert_eq!(
            conf,
            "[options]\nadmin_passwd = adminpass\ndb_host = db\ndb_port = 5432\ndb_user = odoo\ndb_password = dbpass\ndb_name = acme_shop\naddons_path = /mnt/extra-addons,/usr/lib/python3/dist-packages/odoo/addons\n"
        );
    }

    #[test]
    fn test_write_creates_directories() {
        let dir = tempdir().unwrap();
        let routing = routing("", true);
        let mut inst = instance(&routing);
        inst.instance_path = dir.path().join("acme");

        let manifest = ManifestGenerator::new(routing, false).generate(&inst);
        manifest.write_for(&inst).unwrap();

        assert_eq!(std::fs::read_to_string(inst.compose_path()).unwrap(), manifest.compose);
        assert_eq!(
            std::fs::read_to_string(inst.runtime_config_path()).unwrap(),
            manifest.runtime_config
        );
    }
}
