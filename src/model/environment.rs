//! The fully validated environment: ships, services, instances, and
//! registries, plus the service-level dependency graph derived from them.
//!
//! `Environment::new` is the single place the model's invariants are
//! enforced: name uniqueness, ship references, `volumes_from` co-location,
//! and dependency acyclicity.

use super::instance::Instance;
use super::registry::Registry;
use super::service::Service;
use super::ship::Ship;
use crate::error::{MaestroError, MaestroResult};
use crate::graph::DependencyGraph;
use indexmap::IndexMap;
use serde::Deserialize;

/// `__maestro` document metadata: just the schema version today.
#[derive(Debug, Clone, Deserialize)]
pub struct DocMeta {
    /// `1` or `2`; governs volume-binding string order.
    pub schema: u8,
}

/// The raw shape of an environment document, as the loader deserializes it
/// before `Environment::new` validates and normalizes it.
#[derive(Debug, Clone, Deserialize)]
pub struct EnvironmentDoc {
    /// Document metadata.
    #[serde(rename = "__maestro")]
    pub meta: DocMeta,
    /// Declared ships.
    #[serde(default)]
    pub ships: Vec<Ship>,
    /// Declared registries.
    #[serde(default)]
    pub registries: Vec<Registry>,
    /// Declared services.
    pub services: Vec<Service>,
}

/// A fully validated, ready-to-run environment: the aggregate every other
/// module (`envproject`, `state_machine`, `play`) is driven from.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Ships by name.
    pub ships: IndexMap<String, Ship>,
    /// Registries, in declaration order (matched first-match-wins).
    pub registries: Vec<Registry>,
    /// Services by name.
    pub services: IndexMap<String, Service>,
    /// All instances across all services, by instance name.
    pub instances: IndexMap<String, Instance>,
    /// Service-level dependency graph.
    pub graph: DependencyGraph,
}

impl Environment {
    /// Validate and normalize `doc` into a ready-to-run environment.
    pub fn new(doc: EnvironmentDoc) -> MaestroResult<Self> {
        let schema_v2 = match doc.meta.schema {
            1 => false,
            2 => true,
            other => {
                return Err(MaestroError::config(format!(
                    "unsupported __maestro.schema version {other}"
                )))
            }
        };

        let mut ships = IndexMap::new();
        for ship in doc.ships {
            let name = ship.name.clone();
            if ships.insert(name.clone(), ship).is_some() {
                return Err(MaestroError::config(format!("duplicate ship name '{name}'")));
            }
        }

        let mut services: IndexMap<String, Service> = IndexMap::new();
        let mut instances: IndexMap<String, Instance> = IndexMap::new();

        for mut service in doc.services {
            if services.contains_key(&service.name) {
                return Err(MaestroError::config(format!(
                    "duplicate service name '{}'",
                    service.name
                )));
            }

            for requirement in service.requires.iter().chain(service.wants_info.iter()) {
                if requirement == &service.name {
                    return Err(MaestroError::config(format!(
                        "service '{}' cannot depend on itself",
                        service.name
                    )));
                }
            }

            for mut instance in std::mem::take(&mut service.instances) {
                if instances.contains_key(&instance.name) {
                    return Err(MaestroError::config(format!(
                        "duplicate instance name '{}'",
                        instance.name
                    )));
                }
                if !ships.contains_key(&instance.ship) {
                    return Err(MaestroError::config(format!(
                        "instance '{}' references unknown ship '{}'",
                        instance.name, instance.ship
                    )));
                }
                instance
                    .resolve_volumes(schema_v2)
                    .map_err(MaestroError::config)?;
                instance.service = service.name.clone();
                instances.insert(instance.name.clone(), instance);
            }

            services.insert(service.name.clone(), service);
        }

        for service in services.values() {
            for requirement in &service.requires {
                if !services.contains_key(requirement) {
                    return Err(MaestroError::config(format!(
                        "service '{}' requires unknown service '{requirement}'",
                        service.name
                    )));
                }
            }
            for wanted in &service.wants_info {
                if !services.contains_key(wanted) {
                    return Err(MaestroError::config(format!(
                        "service '{}' wants_info from unknown service '{wanted}'",
                        service.name
                    )));
                }
            }
        }

        for instance in instances.values() {
            for source_service in &instance.volumes_from {
                if !services.contains_key(source_service) {
                    return Err(MaestroError::config(format!(
                        "instance '{}' has volumes_from unknown service '{source_service}'",
                        instance.name
                    )));
                }
                let co_located = instances
                    .values()
                    .any(|other| other.service == *source_service && other.ship == instance.ship);
                if !co_located {
                    return Err(MaestroError::config(format!(
                        "instance '{}' has volumes_from '{source_service}' with no instance on ship '{}'",
                        instance.name, instance.ship
                    )));
                }
            }
        }

        let mut graph = DependencyGraph::new();
        for service in services.values() {
            graph.add_service(&service.name);
            for requirement in &service.requires {
                graph.add_hard_edge(&service.name, requirement);
            }
            for wanted in &service.wants_info {
                graph.add_soft_edge(&service.name, wanted);
            }
        }
        for instance in instances.values() {
            for source_service in &instance.volumes_from {
                graph.add_hard_edge(&instance.service, source_service);
            }
        }
        graph.validate_acyclic()?;

        Ok(Self {
            ships,
            registries: doc.registries,
            services,
            instances,
            graph,
        })
    }

    /// Look up the registry whose host matches `repository_host`, if any.
    #[must_use]
    pub fn registry_for(&self, repository_host: &str) -> Option<&Registry> {
        self.registries
            .iter()
            .find(|r| r.matches(repository_host))
    }

    /// Resolve an instance's effective (merged) ports: service defaults
    /// overridden by the instance's own, instance wins by name.
    pub fn resolved_ports(&self, instance_name: &str) -> MaestroResult<Vec<super::instance::Port>> {
        let instance = self.instance(instance_name)?;
        let service = self.service_of(instance)?;
        Ok(service.merged_ports(&instance.ports))
    }

    /// Resolve an instance's effective environment: service defaults, then
    /// instance env on top (env-files are the loader's concern and are
    /// applied before this method is called, by `envproject`).
    pub fn resolved_env(&self, instance_name: &str) -> MaestroResult<IndexMap<String, String>> {
        let instance = self.instance(instance_name)?;
        let service = self.service_of(instance)?;
        Ok(service.merged_env(&instance.env))
    }

    /// The named instance, or a config error if it doesn't exist.
    pub fn instance(&self, name: &str) -> MaestroResult<&Instance> {
        self.instances
            .get(name)
            .ok_or_else(|| MaestroError::config(format!("unknown instance '{name}'")))
    }

    /// The service owning `instance`.
    pub fn service_of(&self, instance: &Instance) -> MaestroResult<&Service> {
        self.services
            .get(&instance.service)
            .ok_or_else(|| MaestroError::config(format!("unknown service '{}'", instance.service)))
    }

    /// The ship hosting `instance`.
    pub fn ship_of(&self, instance: &Instance) -> MaestroResult<&Ship> {
        self.ships
            .get(&instance.ship)
            .ok_or_else(|| MaestroError::config(format!("unknown ship '{}'", instance.ship)))
    }

    /// Instance names belonging to `service_name`, in declaration order.
    #[must_use]
    pub fn instances_of_service(&self, service_name: &str) -> Vec<&Instance> {
        self.instances
            .values()
            .filter(|i| i.service == service_name)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::instance::{PortSpec, Protocol};

    fn ship(name: &str) -> Ship {
        Ship {
            name: name.into(),
            address: "10.0.0.1".into(),
            endpoint: None,
            transport: crate::model::ship::Transport::Tcp,
            api_version: "auto".into(),
            default_timeout_secs: 30,
        }
    }

    fn instance(name: &str, ship_name: &str) -> Instance {
        Instance {
            name: name.into(),
            service: String::new(),
            ship: ship_name.into(),
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

    fn service(name: &str, instances: Vec<Instance>, requires: Vec<&str>) -> Service {
        Service {
            name: name.into(),
            image: format!("{name}:latest"),
            ports: vec![],
            env: IndexMap::new(),
            env_files: vec![],
            checks: vec![],
            requires: requires.into_iter().map(String::from).collect(),
            wants_info: vec![],
            omit: false,
            instances,
        }
    }

    fn doc(services: Vec<Service>, ships: Vec<Ship>) -> EnvironmentDoc {
        EnvironmentDoc {
            meta: DocMeta { schema: 2 },
            ships,
            registries: vec![],
            services,
        }
    }

    #[test]
    fn rejects_unknown_ship_reference() {
        let d = doc(
            vec![service("web", vec![instance("web-1", "ghost")], vec![])],
            vec![ship("a")],
        );
        let err = Environment::new(d).unwrap_err();
        assert!(matches!(err, MaestroError::Config { .. }));
    }

    #[test]
    fn rejects_duplicate_instance_names() {
        let d = doc(
            vec![
                service("web", vec![instance("same", "a")], vec![]),
                service("api", vec![instance("same", "a")], vec![]),
            ],
            vec![ship("a")],
        );
        assert!(Environment::new(d).is_err());
    }

    #[test]
    fn rejects_cyclic_requires() {
        let d = doc(
            vec![
                service("web", vec![instance("web-1", "a")], vec!["api"]),
                service("api", vec![instance("api-1", "a")], vec!["web"]),
            ],
            vec![ship("a")],
        );
        assert!(Environment::new(d).is_err());
    }

    #[test]
    fn accepts_valid_environment_and_builds_graph() {
        let d = doc(
            vec![
                service("web", vec![instance("web-1", "a")], vec!["db"]),
                service("db", vec![instance("db-1", "a")], vec![]),
            ],
            vec![ship("a")],
        );
        let env = Environment::new(d).unwrap();
        assert_eq!(env.graph.hard_dependencies("web"), vec!["db".to_string()]);
        assert_eq!(env.instances.len(), 2);
    }

    #[test]
    fn volumes_from_requires_co_located_instance() {
        let mut dependent = instance("cache-1", "a");
        dependent.volumes_from = vec!["data".into()];
        let d = doc(
            vec![
                service("data", vec![instance("data-1", "b")], vec![]),
                service("cache", vec![dependent], vec![]),
            ],
            vec![ship("a"), ship("b")],
        );
        assert!(Environment::new(d).is_err());
    }

    #[test]
    fn resolved_ports_prefer_instance_over_service() {
        let mut web = instance("web-1", "a");
        web.ports = vec![super::super::instance::Port {
            name: "http".into(),
            external: PortSpec::single(9090),
            internal: PortSpec::single(8080),
            protocol: Protocol::Tcp,
        }];
        let mut svc = service("web", vec![web], vec![]);
        svc.ports = vec![super::super::instance::Port {
            name: "http".into(),
            external: PortSpec::single(80),
            internal: PortSpec::single(8080),
            protocol: Protocol::Tcp,
        }];
        let d = doc(vec![svc], vec![ship("a")]);
        let env = Environment::new(d).unwrap();
        let ports = env.resolved_ports("web-1").unwrap();
        assert_eq!(ports[0].external.port, 9090);
    }
}
