//! A named template producing one or more container instances.

use super::instance::{Instance, Port};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A service: named, unique within the environment, holding the defaults
/// its instances inherit plus dependency declarations that drive both
/// ordering (`requires`) and env projection (`requires` ∪ `wants_info`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    /// Unique service name.
    pub name: String,
    /// Image repository, possibly instance-parameterized; `Instance::image`
    /// overrides this per instance.
    pub image: String,
    /// Default named ports, inherited by every instance.
    #[serde(default)]
    pub ports: Vec<Port>,
    /// Default environment, overlaid by env-files, then instance env.
    #[serde(default)]
    pub env: IndexMap<String, String>,
    /// Env-files to load, in declaration order (each overlays the last).
    #[serde(default)]
    pub env_files: Vec<String>,
    /// Service-level lifecycle checks, merged with per-instance checks.
    #[serde(default)]
    pub checks: Vec<crate::lifecycle::CheckSpec>,
    /// Hard dependencies: affect both ordering and env projection.
    #[serde(default)]
    pub requires: Vec<String>,
    /// Soft dependencies: affect env projection only, never ordering.
    #[serde(default)]
    pub wants_info: Vec<String>,
    /// Excluded from "all" selections, but still eligible as a dependency.
    #[serde(default)]
    pub omit: bool,
    /// The service's container instances, in declaration order.
    pub instances: Vec<Instance>,
}

impl Service {
    /// Merge this service's default ports with an instance's own ports,
    /// instance wins on name collision.
    #[must_use]
    pub fn merged_ports(&self, instance_ports: &[Port]) -> Vec<Port> {
        let mut merged: IndexMap<String, Port> = self
            .ports
            .iter()
            .cloned()
            .map(|p| (p.name.clone(), p))
            .collect();
        for p in instance_ports {
            merged.insert(p.name.clone(), p.clone());
        }
        merged.into_values().collect()
    }

    /// Merge this service's default env with an instance's own env,
    /// instance wins on key collision (env-files are applied by the
    /// loader between these two layers and are not represented here).
    #[must_use]
    pub fn merged_env(&self, instance_env: &IndexMap<String, String>) -> IndexMap<String, String> {
        let mut merged = self.env.clone();
        for (k, v) in instance_env {
            merged.insert(k.clone(), v.clone());
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::instance::{PortSpec, Protocol};

    fn port(name: &str, n: u16) -> Port {
        Port {
            name: name.into(),
            external: PortSpec::single(n),
            internal: PortSpec::single(n),
            protocol: Protocol::Tcp,
        }
    }

    #[test]
    fn instance_port_overrides_service_port_by_name() {
        let svc = Service {
            name: "kafka".into(),
            image: "kafka:latest".into(),
            ports: vec![port("broker", 9092)],
            env: IndexMap::new(),
            env_files: vec![],
            checks: vec![],
            requires: vec![],
            wants_info: vec![],
            omit: false,
            instances: vec![],
        };
        let merged = svc.merged_ports(&[port("broker", 9093)]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].external.port, 9093);
    }
}
