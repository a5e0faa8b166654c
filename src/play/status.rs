//! Read-only status reporting: inspect every target instance without
//! mutating anything, for `maestro status` style commands.

use crate::adapter::{ObservedStatus, ShipDocker};
use crate::error::MaestroResult;
use crate::model::environment::Environment;
use indexmap::IndexMap;
use std::net::ToSocketAddrs;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Reachability of a single named port, as probed in detailed status mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortStatus {
    /// The port's symbolic name.
    pub name: String,
    /// External (ship-facing) port number probed.
    pub external_port: u16,
    /// Whether a TCP connection could be established within the probe
    /// timeout.
    pub reachable: bool,
}

/// Observed status of a single instance, alongside its placement and, in
/// detailed mode, its per-port reachability.
#[derive(Debug, Clone)]
pub struct InstanceStatus {
    /// Instance name.
    pub instance: String,
    /// Owning service name.
    pub service: String,
    /// Ship the instance is placed on.
    pub ship: String,
    /// Image the instance is configured to run.
    pub configured_image: String,
    /// Image the running (or last-created) container actually reports, if
    /// inspection succeeded.
    pub actual_image: Option<String>,
    /// Observed daemon status, or `None` if inspection itself failed.
    pub status: Option<ObservedStatus>,
    /// Whether `actual_image` differs from `configured_image` (meaningless
    /// when `status` is `None`).
    pub image_drifted: bool,
    /// Per-port TCP reachability; populated only when detailed mode is
    /// requested and the instance is observed running.
    pub ports: Vec<PortStatus>,
}

/// Connect timeout used for the detailed-mode per-port TCP probe. Status
/// probes are a one-shot connectivity check, not a lifecycle-check retry
/// loop, so there is no budget to configure.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

async fn probe_port(host: &str, port: u16) -> bool {
    let addrs: Vec<_> = match (host, port).to_socket_addrs() {
        Ok(it) => it.collect(),
        Err(_) => return false,
    };
    let Some(addr) = addrs.into_iter().next() else {
        return false;
    };
    timeout(PROBE_TIMEOUT, TcpStream::connect(addr))
        .await
        .is_ok_and(|r| r.is_ok())
}

/// Inspect every instance of `target_services` (or all instances, when
/// empty) and report their observed status. Never mutates daemon state.
/// When `detailed` is set, also probes each resolved port's external
/// reachability for instances observed running.
pub async fn status(
    environment: &Environment,
    adapters: &IndexMap<String, Arc<dyn ShipDocker>>,
    target_services: &[String],
    detailed: bool,
) -> MaestroResult<Vec<InstanceStatus>> {
    let mut out = Vec::new();
    for instance in environment.instances.values() {
        if !target_services.is_empty() && !target_services.contains(&instance.service) {
            continue;
        }
        let service = environment.service_of(instance)?;
        let configured_image = instance.effective_image(&service.image).to_string();

        let observed = match adapters.get(&instance.ship) {
            Some(adapter) => adapter.inspect(&instance.name).await?,
            None => None,
        };
        let status = observed.as_ref().map(|o| o.status);
        let actual_image = observed.as_ref().map(|o| o.image.clone());
        let image_drifted = actual_image
            .as_deref()
            .is_some_and(|actual| actual != configured_image);

        let ports = if detailed && status == Some(ObservedStatus::Running) {
            let ship = environment.ship_of(instance)?;
            let host = ship.external_address().to_string();
            let mut resolved = Vec::new();
            for port in environment.resolved_ports(&instance.name)? {
                let reachable = probe_port(&host, port.external.port).await;
                resolved.push(PortStatus {
                    name: port.name,
                    external_port: port.external.port,
                    reachable,
                });
            }
            resolved
        } else {
            Vec::new()
        };

        out.push(InstanceStatus {
            instance: instance.name.clone(),
            service: instance.service.clone(),
            ship: instance.ship.clone(),
            configured_image,
            actual_image,
            status,
            image_drifted,
            ports,
        });
    }
    out.sort_by(|a, b| a.instance.cmp(&b.instance));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::testing::FakeShipDocker;
    use crate::model::environment::{DocMeta, EnvironmentDoc};
    use crate::model::instance::Instance;
    use crate::model::service::Service;
    use crate::model::ship::{Ship, Transport};

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

    fn environment_with(instance: Instance, image: &str) -> Environment {
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
            services: vec![Service {
                name: "web".into(),
                image: image.into(),
                ports: vec![],
                env: IndexMap::new(),
                env_files: vec![],
                checks: vec![],
                requires: vec![],
                wants_info: vec![],
                omit: false,
                instances: vec![instance],
            }],
        };
        Environment::new(doc).unwrap()
    }

    #[tokio::test]
    async fn reports_absent_for_uninspected_container() {
        let environment = environment_with(bare_instance("web-1", "a"), "web:latest");
        let mut adapters: IndexMap<String, Arc<dyn ShipDocker>> = IndexMap::new();
        adapters.insert("a".into(), Arc::new(FakeShipDocker::new()));

        let statuses = status(&environment, &adapters, &[], false).await.unwrap();
        assert_eq!(statuses.len(), 1);
        assert!(statuses[0].status.is_none());
        assert_eq!(statuses[0].configured_image, "web:latest");
        assert!(statuses[0].actual_image.is_none());
    }

    #[tokio::test]
    async fn flags_image_drift_against_the_running_container() {
        let environment = environment_with(bare_instance("web-1", "a"), "web:latest");
        let fake = FakeShipDocker::new();
        fake.seed("web-1", ObservedStatus::Running, "web:stale");
        let mut adapters: IndexMap<String, Arc<dyn ShipDocker>> = IndexMap::new();
        adapters.insert("a".into(), Arc::new(fake));

        let statuses = status(&environment, &adapters, &[], false).await.unwrap();
        assert_eq!(statuses[0].actual_image.as_deref(), Some("web:stale"));
        assert!(statuses[0].image_drifted);
    }

    #[tokio::test]
    async fn detailed_mode_probes_ports_only_when_running() {
        let environment = environment_with(bare_instance("web-1", "a"), "web:latest");
        let mut adapters: IndexMap<String, Arc<dyn ShipDocker>> = IndexMap::new();
        adapters.insert("a".into(), Arc::new(FakeShipDocker::new()));

        let statuses = status(&environment, &adapters, &[], true).await.unwrap();
        assert!(statuses[0].ports.is_empty());
    }
}
