//! Environment-variable projection: turns a target instance's resolved
//! ports and env, plus its hard and soft dependencies', into the flat
//! `KEY=value` map actually handed to the daemon at create time.
//!
//! Overlay order, lowest to highest precedence: values projected from
//! dependencies, then env-file contents, then the owning service's `env`,
//! then the instance's own `env`.

use crate::error::MaestroResult;
use crate::model::environment::Environment;
use crate::model::instance::Instance;
use indexmap::IndexMap;

/// Normalize a dependency name component into the form used by projected
/// variable names: any run of characters outside `[A-Za-z0-9_-]` becomes a
/// single `_`, then `-` becomes `_`, then the whole thing is upper-cased.
fn normalize_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_was_replaced = false;
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
            out.push(c);
            last_was_replaced = false;
        } else if !last_was_replaced {
            out.push('_');
            last_was_replaced = true;
        }
    }
    out.replace('-', "_").to_uppercase()
}

/// Project one dependency instance's ports and env into
/// `<SERVICE>_<INSTANCE>_<PORTNAME>_PORT` / `_HOST` and
/// `<SERVICE>_<INSTANCE>_ENV_<KEY>` entries.
fn project_dependency(
    env: &Environment,
    dependency: &Instance,
    out: &mut IndexMap<String, String>,
) -> MaestroResult<()> {
    let ship = env.ship_of(dependency)?;
    let service_part = normalize_component(&dependency.service);
    let instance_part = normalize_component(&dependency.name);
    let prefix = format!("{service_part}_{instance_part}");

    let ports = env.resolved_ports(&dependency.name)?;
    for port in ports {
        let port_name = normalize_component(&port.name);
        out.insert(
            format!("{prefix}_{port_name}_PORT"),
            port.external.port.to_string(),
        );
        out.insert(
            format!("{prefix}_{port_name}_HOST"),
            ship.external_address().to_string(),
        );
    }

    let dep_env = env.resolved_env(&dependency.name)?;
    for (key, value) in dep_env {
        out.insert(format!("{prefix}_ENV_{}", normalize_component(&key)), value);
    }

    Ok(())
}

/// Build the full environment for `target`: projected values from every
/// hard (`requires`) and soft (`wants_info`) dependency of its owning
/// service, overlaid by env-file contents, then the service's own `env`,
/// then the instance's own `env`.
///
/// `env_file_contents` holds the already-loaded contents of each file in
/// the service's `env_files`, in declaration order; loading files from
/// disk is the caller's concern, kept out of this pure function so it
/// stays trivially testable.
pub fn project(
    environment: &Environment,
    target: &Instance,
    env_file_contents: &[IndexMap<String, String>],
) -> MaestroResult<IndexMap<String, String>> {
    let service = environment.service_of(target)?;
    let mut out = IndexMap::new();

    let mut dependency_services: Vec<&String> =
        service.requires.iter().chain(service.wants_info.iter()).collect();
    dependency_services.sort();
    dependency_services.dedup();

    for dep_service_name in dependency_services {
        for dependency in environment.instances_of_service(dep_service_name) {
            project_dependency(environment, dependency, &mut out)?;
        }
    }

    for file_env in env_file_contents {
        for (k, v) in file_env {
            out.insert(k.clone(), v.clone());
        }
    }

    for (k, v) in &service.env {
        out.insert(k.clone(), v.clone());
    }

    for (k, v) in &target.env {
        out.insert(k.clone(), v.clone());
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::environment::{DocMeta, EnvironmentDoc};
    use crate::model::instance::{Port, PortSpec, Protocol};
    use crate::model::service::Service;
    use crate::model::ship::{Ship, Transport};

    #[test]
    fn normalizes_non_alphanumeric_runs_to_single_underscore() {
        assert_eq!(normalize_component("broker.0"), "BROKER_0");
        assert_eq!(normalize_component("my-service"), "MY_SERVICE");
        assert_eq!(normalize_component("a--b"), "A_B");
        assert_eq!(normalize_component("cache_1"), "CACHE_1");
    }

    fn bare_instance(name: &str, ship: &str) -> Instance {
        Instance {
            name: name.into(),
            service: String::new(),
            ship: ship.into(),
            image: None,
            ports: vec![],
            volume_specs: vec![],
            volumes: vec![],
            anonymous_volumes: vec![],
            volumes_from: vec![],
            env: IndexMap::new(),
            checks: vec![],
            resources: Default::default(),
            network_mode: None,
            dns: vec![],
            restart_policy: Default::default(),
            security_opts: vec![],
            labels: IndexMap::new(),
            stop_timeout: 10,
            command: None,
            user: None,
            workdir: None,
            read_only_root: false,
            extra_hosts: vec![],
            log_driver: None,
            log_options: IndexMap::new(),
            links: IndexMap::new(),
        }
    }

    #[test]
    fn projects_dependency_ports_and_env_under_its_own_prefix() {
        let mut db_instance = bare_instance("db-1", "a");
        db_instance.ports = vec![Port {
            name: "client".into(),
            external: PortSpec::single(5432),
            internal: PortSpec::single(5432),
            protocol: Protocol::Tcp,
        }];
        let db = Service {
            name: "db".into(),
            image: "postgres:16".into(),
            ports: vec![],
            env: IndexMap::from([("PGUSER".to_string(), "app".to_string())]),
            env_files: vec![],
            checks: vec![],
            requires: vec![],
            wants_info: vec![],
            omit: false,
            instances: vec![db_instance],
        };
        let web = Service {
            name: "web".into(),
            image: "web:latest".into(),
            ports: vec![],
            env: IndexMap::new(),
            env_files: vec![],
            checks: vec![],
            requires: vec!["db".into()],
            wants_info: vec![],
            omit: false,
            instances: vec![bare_instance("web-1", "a")],
        };

        let doc = EnvironmentDoc {
            meta: DocMeta { schema: 2 },
            ships: vec![Ship {
                name: "a".into(),
                address: "10.0.0.1".into(),
                endpoint: None,
                transport: Transport::Tcp,
                api_version: "auto".into(),
                default_timeout_secs: 30,
            }],
            registries: vec![],
            services: vec![db, web],
        };
        let environment = crate::model::environment::Environment::new(doc).unwrap();
        let web_instance = environment.instance("web-1").unwrap();

        let projected = project(&environment, web_instance, &[]).unwrap();
        assert_eq!(projected.get("DB_DB_1_CLIENT_PORT").unwrap(), "5432");
        assert_eq!(projected.get("DB_DB_1_CLIENT_HOST").unwrap(), "10.0.0.1");
        assert_eq!(projected.get("DB_DB_1_ENV_PGUSER").unwrap(), "app");
    }
}
