//! Rendering of compose, reverse proxy and env files for a tenant.
//!
//! All renderers are pure; the `write_*` helpers overwrite their target so a
//! phase can be rerun at any time.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use berth_core::TenantName;
use berth_store::TenantConfig;

use crate::compose::{
    ComposeFile, DependsOn, DependsOnCondition, Healthcheck, NetworkSpec, Service,
    ServiceCondition, VolumeSpec,
};
use crate::error::{Result, RuntimeError};

/// Port the backend listens on inside its container.
pub const BACKEND_CONTAINER_PORT: u16 = 5004;

/// Port the frontend listens on inside its container.
pub const FRONTEND_CONTAINER_PORT: u16 = 3001;

/// Path prefix routed to the backend.
pub const API_PREFIX: &str = "/v1/api";

/// Ordered `KEY=value` pairs for an env file.
pub type EnvPairs = Vec<(&'static str, String)>;

fn context_name(dir: &Path, fallback: &str) -> String {
    dir.file_name()
        .map_or_else(|| fallback.to_string(), |n| n.to_string_lossy().into_owned())
}

fn extra_host(tenant: &TenantName, domain: &str) -> String {
    format!("{tenant}.{domain}:127.0.0.1")
}

/// Compose document with the tenant's database, cache and backend.
///
/// The backend is built from `backend_dir`, which must sit next to the
/// compose file.
#[must_use]
pub fn render_base_compose(
    tenant: &TenantName,
    config: &TenantConfig,
    domain: &str,
    backend_dir: &Path,
) -> ComposeFile {
    let network = tenant.to_string();
    let db = tenant.container("db");
    let redis = tenant.container("redis");
    let backend = tenant.container("backend");
    let context = context_name(backend_dir, "backend");

    let mut compose = ComposeFile::default();

    compose.services.insert(
        db.clone(),
        Service {
            image: Some("postgres:15".to_string()),
            container_name: Some(db.clone()),
            environment: BTreeMap::from([
                ("POSTGRES_DB".to_string(), config.db_master_name.clone()),
                ("POSTGRES_USER".to_string(), config.db_user.clone()),
                ("POSTGRES_PASSWORD".to_string(), config.db_pass.clone()),
            ]),
            volumes: vec![format!("{tenant}_db_data:/var/lib/postgresql/data")],
            networks: vec![network.clone()],
            healthcheck: Some(Healthcheck {
                test: vec![
                    "CMD-SHELL".to_string(),
                    "bash -c 'PGUSER=$POSTGRES_USER pg_isready'".to_string(),
                ],
                interval: "10s".to_string(),
                timeout: "5s".to_string(),
                retries: 5,
                start_period: Some("10s".to_string()),
            }),
            ..Service::default()
        },
    );

    compose.services.insert(
        redis.clone(),
        Service {
            image: Some("redis:7".to_string()),
            container_name: Some(redis.clone()),
            environment: BTreeMap::from([(
                "REDIS_PASSWORD".to_string(),
                config.redis_pass.clone(),
            )]),
            volumes: vec![format!("{tenant}_redis_data:/var/lib/redis/data")],
            networks: vec![network.clone()],
            ..Service::default()
        },
    );

    compose.services.insert(
        backend.clone(),
        Service {
            build: Some(context.clone()),
            container_name: Some(backend),
            env_file: Some(format!("{context}/.env")),
            ports: vec![format!("{}:{BACKEND_CONTAINER_PORT}", config.backend_port)],
            depends_on: Some(DependsOn::Conditions(BTreeMap::from([
                (
                    db,
                    DependsOnCondition {
                        condition: ServiceCondition::ServiceHealthy,
                    },
                ),
                (
                    redis,
                    DependsOnCondition {
                        condition: ServiceCondition::ServiceStarted,
                    },
                ),
            ]))),
            networks: vec![network.clone()],
            extra_hosts: vec![extra_host(tenant, domain)],
            command: Some("sh -c 'sleep 15 && npm run deploy'".to_string()),
            environment: BTreeMap::from([
                ("NODE_ENV".to_string(), "development".to_string()),
                ("DB_SERVER".to_string(), config.db_server.clone()),
            ]),
            ..Service::default()
        },
    );

    compose.volumes = BTreeMap::from([
        (format!("{tenant}_db_data"), VolumeSpec::default()),
        (format!("{tenant}_redis_data"), VolumeSpec::default()),
        (
            format!("{tenant}_nginx_config"),
            VolumeSpec {
                driver: Some("local".to_string()),
            },
        ),
    ]);
    compose.networks = BTreeMap::from([(network, NetworkSpec::default())]);

    compose
}

/// Add the frontend and nginx services to an existing compose document.
///
/// `nginx_conf` is mounted as given, so it should be absolute.
pub fn add_frontend_services(
    tenant: &TenantName,
    config: &TenantConfig,
    domain: &str,
    frontend_dir: &Path,
    nginx_conf: &Path,
    compose: &mut ComposeFile,
) {
    let network = tenant.to_string();
    let backend = tenant.container("backend");
    let frontend = tenant.container("frontend");
    let nginx = tenant.container("nginx");
    let context = context_name(frontend_dir, "frontend");

    compose.services.insert(
        frontend.clone(),
        Service {
            build: Some(context.clone()),
            container_name: Some(frontend.clone()),
            env_file: Some(format!("{context}/.env")),
            ports: vec![format!(
                "{}:{FRONTEND_CONTAINER_PORT}",
                config.frontend_port
            )],
            depends_on: Some(DependsOn::List(vec![backend.clone()])),
            networks: vec![network.clone()],
            extra_hosts: vec![extra_host(tenant, domain)],
            command: Some("npm start".to_string()),
            environment: BTreeMap::from([(
                "PORT".to_string(),
                FRONTEND_CONTAINER_PORT.to_string(),
            )]),
            ..Service::default()
        },
    );

    compose.services.insert(
        nginx.clone(),
        Service {
            image: Some("nginx:latest".to_string()),
            container_name: Some(nginx),
            volumes: vec![format!(
                "{}:/etc/nginx/conf.d/default.conf:ro",
                nginx_conf.display()
            )],
            ports: vec![format!("{}:80", config.nginx_port)],
            depends_on: Some(DependsOn::List(vec![backend, frontend])),
            networks: vec![network.clone()],
            extra_hosts: vec![extra_host(tenant, domain)],
            restart: Some("on-failure".to_string()),
            ..Service::default()
        },
    );

    compose.networks.entry(network).or_default();
    compose.volumes.insert(
        format!("{tenant}_nginx_config"),
        VolumeSpec {
            driver: Some("local".to_string()),
        },
    );
}

fn proxy_location(path: &str, upstream: &str) -> String {
    format!(
        "    location {path} {{
        proxy_pass {upstream};
        proxy_set_header Host $host;
        proxy_set_header X-Real-IP $remote_addr;
        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;
        proxy_set_header X-Forwarded-Proto $scheme;
        proxy_read_timeout 300s;
        proxy_connect_timeout 75s;
    }}
"
    )
}

/// Reverse proxy configuration routing the API prefix to the backend and
/// everything else to the frontend.
#[must_use]
pub fn render_nginx_conf(tenant: &TenantName, domain: &str) -> String {
    let backend = format!(
        "http://{}:{BACKEND_CONTAINER_PORT}",
        tenant.container("backend")
    );
    let frontend = format!(
        "http://{}:{FRONTEND_CONTAINER_PORT}/",
        tenant.container("frontend")
    );
    format!(
        "server {{
    listen 80;
    server_name {tenant}.{domain} localhost;

{}
{}}}
",
        proxy_location(API_PREFIX, &backend),
        proxy_location("/", &frontend),
    )
}

/// Write the nginx config, replacing a directory docker may have created in its place.
///
/// # Errors
///
/// Returns an error if the stale directory cannot be removed or the file cannot be written.
pub fn write_nginx_conf(path: &Path, contents: &str) -> Result<()> {
    if path.is_dir() {
        tracing::warn!(path = %path.display(), "Removing directory in place of nginx.conf");
        fs::remove_dir_all(path).map_err(|e| RuntimeError::io(path, e))?;
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| RuntimeError::io(parent, e))?;
    }
    fs::write(path, contents).map_err(|e| RuntimeError::io(path, e))
}

/// Environment for the backend container.
#[must_use]
pub fn backend_env(tenant: &TenantName, config: &TenantConfig, domain: &str) -> EnvPairs {
    vec![
        ("PORT", BACKEND_CONTAINER_PORT.to_string()),
        ("EMAIL", format!("no-reply@{tenant}.{domain}")),
        ("SESSION_SECRET", config.session_secret.clone()),
        ("SESSION_COOKIE_NAME", "vmaTechLabs".to_string()),
        ("SESSION_MAX_AGE", "3600000".to_string()),
        ("REDIS_URL", config.redis_url.clone()),
        ("DB_PORT", "5432".to_string()),
        ("DB_POOL_MIN", "0".to_string()),
        ("DB_POOL_MAX", "100".to_string()),
        ("DB_USERNAME", config.db_user.clone()),
        ("DB_SERVER", config.db_server.clone()),
        ("DB_PASSWORD", config.db_pass.clone()),
        ("DB_DATABASE_MASTER", config.db_master_name.clone()),
        (
            "DB_DATABASE_TRANSACTIONAL",
            config.db_transactional_name.clone(),
        ),
        ("CONFIRM_DELETION", "true".to_string()),
        ("NODE_ENV", "development".to_string()),
        ("NODE_ENV_DEV", "development".to_string()),
        ("NODE_ENV_DEV2", "developmentDB2".to_string()),
        ("NODE_ENV_TRIGGER", "trigger".to_string()),
    ]
}

/// API base URL as seen from a browser, through nginx.
#[must_use]
pub fn public_api_url(tenant: &TenantName, config: &TenantConfig, domain: &str) -> String {
    format!("http://{tenant}.{domain}:{}{API_PREFIX}", config.nginx_port)
}

/// Environment for the frontend build.
#[must_use]
pub fn frontend_env(tenant: &TenantName, config: &TenantConfig, domain: &str) -> EnvPairs {
    let api = public_api_url(tenant, config, domain);
    vec![("BASE_URL", api.clone()), ("REACT_APP_BASE_URL", api)]
}

/// Render pairs as `KEY=value` lines.
#[must_use]
pub fn render_env(pairs: &[(&str, String)]) -> String {
    pairs.iter().fold(String::new(), |mut out, (key, value)| {
        out.push_str(key);
        out.push('=');
        out.push_str(value);
        out.push('\n');
        out
    })
}

/// Write an env file, creating its directory.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_env_file(path: &Path, pairs: &[(&str, String)]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| RuntimeError::io(parent, e))?;
    }
    fs::write(path, render_env(pairs)).map_err(|e| RuntimeError::io(path, e))
}

/// Resolve `path` against the current directory.
///
/// # Errors
///
/// Returns an error if the current directory cannot be determined.
pub fn absolutize(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(|e| RuntimeError::io(".", e))?;
    Ok(cwd.join(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_store::types::RawConfig;
    use tempfile::TempDir;

    fn fixture() -> (TenantName, TenantConfig) {
        let tenant = TenantName::new("acme").unwrap();
        let config = TenantConfig::resolve(&tenant, "vsync", RawConfig::new(), || Ok(12)).unwrap();
        (tenant, config)
    }

    #[test]
    fn base_compose_has_infra_and_backend() {
        let (tenant, config) = fixture();
        let compose =
            render_base_compose(&tenant, &config, "vsync", Path::new("tenants/acme/backend"));

        assert_eq!(compose.version, "3.8");
        let db = &compose.services["acme_db"];
        assert_eq!(db.image.as_deref(), Some("postgres:15"));
        assert_eq!(db.environment["POSTGRES_DB"], "acme_master");
        assert!(db.healthcheck.is_some());

        let backend = &compose.services["acme_backend"];
        assert_eq!(backend.build.as_deref(), Some("backend"));
        assert_eq!(backend.env_file.as_deref(), Some("backend/.env"));
        assert_eq!(backend.ports, vec![format!("{}:5004", config.backend_port)]);
        match backend.depends_on.as_ref().unwrap() {
            DependsOn::Conditions(map) => {
                assert_eq!(map["acme_db"].condition, ServiceCondition::ServiceHealthy);
                assert_eq!(
                    map["acme_redis"].condition,
                    ServiceCondition::ServiceStarted
                );
            }
            DependsOn::List(_) => panic!("backend must use conditions"),
        }

        assert!(compose.volumes.contains_key("acme_db_data"));
        assert!(compose.volumes.contains_key("acme_redis_data"));
        assert!(compose.volumes.contains_key("acme_nginx_config"));
        assert!(compose.networks.contains_key("acme"));
        assert!(compose
            .services
            .values()
            .all(|s| s.networks == vec!["acme".to_string()]));
    }

    #[test]
    fn frontend_services_are_added_in_place() {
        let (tenant, config) = fixture();
        let mut compose = render_base_compose(&tenant, &config, "vsync", Path::new("backend"));
        add_frontend_services(
            &tenant,
            &config,
            "vsync",
            Path::new("/srv/tenants/acme/frontend"),
            Path::new("/srv/tenants/acme/nginx.conf"),
            &mut compose,
        );

        assert_eq!(compose.services.len(), 5);
        let frontend = &compose.services["acme_frontend"];
        assert_eq!(frontend.build.as_deref(), Some("frontend"));
        assert_eq!(
            frontend.ports,
            vec![format!("{}:3001", config.frontend_port)]
        );
        assert_eq!(
            frontend.depends_on.as_ref().unwrap().services(),
            vec!["acme_backend"]
        );

        let nginx = &compose.services["acme_nginx"];
        assert_eq!(
            nginx.volumes,
            vec!["/srv/tenants/acme/nginx.conf:/etc/nginx/conf.d/default.conf:ro".to_string()]
        );
        assert_eq!(nginx.restart.as_deref(), Some("on-failure"));
        assert_eq!(
            nginx.depends_on.as_ref().unwrap().services(),
            vec!["acme_backend", "acme_frontend"]
        );
    }

    #[test]
    fn adding_frontend_twice_is_idempotent() {
        let (tenant, config) = fixture();
        let mut once = render_base_compose(&tenant, &config, "vsync", Path::new("backend"));
        let frontend = Path::new("frontend");
        let conf = Path::new("/abs/nginx.conf");
        add_frontend_services(&tenant, &config, "vsync", frontend, conf, &mut once);
        let mut twice = once.clone();
        add_frontend_services(&tenant, &config, "vsync", frontend, conf, &mut twice);
        assert_eq!(once, twice);
    }

    #[test]
    fn nginx_conf_routes_api_and_root_once() {
        let tenant = TenantName::new("acme").unwrap();
        let conf = render_nginx_conf(&tenant, "vsync");

        assert_eq!(conf.matches("location /v1/api {").count(), 1);
        assert_eq!(conf.matches("location / {").count(), 1);
        assert!(conf.contains("proxy_pass http://acme_backend:5004;"));
        assert!(conf.contains("proxy_pass http://acme_frontend:3001/;"));
        assert!(conf.contains("server_name acme.vsync localhost;"));
        assert_eq!(conf.matches('{').count(), conf.matches('}').count());
    }

    #[test]
    fn nginx_conf_replaces_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nginx.conf");
        fs::create_dir_all(path.join("stale")).unwrap();

        write_nginx_conf(&path, "server {}\n").unwrap();
        assert!(path.is_file());
        assert_eq!(fs::read_to_string(&path).unwrap(), "server {}\n");
    }

    #[test]
    fn backend_env_uses_persisted_secrets() {
        let (tenant, config) = fixture();
        let env = backend_env(&tenant, &config, "vsync");
        let lookup = |key: &str| {
            env.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.clone())
                .unwrap()
        };

        assert_eq!(env.first().map(|(k, _)| *k), Some("PORT"));
        assert_eq!(lookup("SESSION_SECRET"), config.session_secret);
        assert_eq!(lookup("DB_PASSWORD"), config.db_pass);
        assert_eq!(lookup("REDIS_URL"), config.redis_url);
        assert_eq!(lookup("EMAIL"), "no-reply@acme.vsync");
        assert_eq!(lookup("DB_DATABASE_TRANSACTIONAL"), "acme_transactional");
    }

    #[test]
    fn frontend_env_points_at_nginx() {
        let (tenant, config) = fixture();
        let env = frontend_env(&tenant, &config, "vsync");
        let expected = format!("http://acme.vsync:{}/v1/api", config.nginx_port);
        assert_eq!(
            env,
            vec![("BASE_URL", expected.clone()), ("REACT_APP_BASE_URL", expected)]
        );
    }

    #[test]
    fn env_file_is_key_value_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app/.env");
        write_env_file(&path, &[("A", "1".to_string()), ("B", "two".to_string())]).unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "A=1\nB=two\n");
    }

    #[test]
    fn absolutize_keeps_absolute_paths() {
        assert_eq!(
            absolutize(Path::new("/etc/hosts")).unwrap(),
            PathBuf::from("/etc/hosts")
        );
        assert!(absolutize(Path::new("rel/path")).unwrap().is_absolute());
    }
}
