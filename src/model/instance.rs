//! A single runnable unit of a service, and the small value types its
//! fields are built from (ports, volumes, resource limits).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Wire protocol for a [`Port`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// TCP.
    Tcp,
    /// UDP.
    Udp,
}

impl Default for Protocol {
    fn default() -> Self {
        Protocol::Tcp
    }
}

/// A port or port range, with an optional bind address, as it appears on
/// one side (external or internal) of a [`Port`] mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortSpec {
    /// Starting (or only) port number.
    pub port: u16,
    /// Inclusive end of the range, when this spec describes a range
    /// rather than a single port.
    #[serde(default)]
    pub end_port: Option<u16>,
    /// Address to bind, when this is the external (ship-facing) side.
    #[serde(default)]
    pub bind_address: Option<String>,
}

impl PortSpec {
    /// A single-port spec with no bind address override.
    #[must_use]
    pub fn single(port: u16) -> Self {
        Self {
            port,
            end_port: None,
            bind_address: None,
        }
    }
}

/// A named port mapping. Named because dependents resolve ports by name
/// at env-projection time, never by raw number, per the GLOSSARY.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Port {
    /// Symbolic name, e.g. `"client"`, `"broker"`.
    pub name: String,
    /// Externally (ship-facing) reachable side.
    pub external: PortSpec,
    /// In-container side.
    pub internal: PortSpec,
    /// Protocol.
    #[serde(default)]
    pub protocol: Protocol,
}

/// Bind-mount mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountMode {
    /// Read-write.
    Rw,
    /// Read-only.
    Ro,
}

impl Default for MountMode {
    fn default() -> Self {
        MountMode::Rw
    }
}

/// A host-path bind mount, already normalized out of the environment
/// document's schema-dependent `container:host` (v1) or `host:container`
/// (v2) string form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeBinding {
    /// Path on the ship's filesystem.
    pub host_path: String,
    /// Path inside the container.
    pub container_path: String,
    /// Read-write or read-only.
    #[serde(default)]
    pub mode: MountMode,
}

impl VolumeBinding {
    /// Parse a schema-v1 `container:host[:mode]` binding string.
    pub fn from_v1(raw: &str) -> Result<Self, String> {
        Self::from_parts(raw, true)
    }

    /// Parse a schema-v2 `host:container[:mode]` binding string.
    pub fn from_v2(raw: &str) -> Result<Self, String> {
        Self::from_parts(raw, false)
    }

    fn from_parts(raw: &str, container_first: bool) -> Result<Self, String> {
        let parts: Vec<&str> = raw.split(':').collect();
        if parts.len() < 2 || parts.len() > 3 {
            return Err(format!("invalid volume binding '{raw}'"));
        }
        let (container_path, host_path) = if container_first {
            (parts[0], parts[1])
        } else {
            (parts[1], parts[0])
        };
        let mode = match parts.get(2).copied() {
            None | Some("rw") => MountMode::Rw,
            Some("ro") => MountMode::Ro,
            Some(other) => return Err(format!("invalid volume mode '{other}' in '{raw}'")),
        };
        Ok(Self {
            host_path: host_path.to_string(),
            container_path: container_path.to_string(),
            mode,
        })
    }
}

/// Per-container resource constraints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Memory limit in bytes.
    #[serde(default)]
    pub memory: Option<u64>,
    /// Memory + swap limit in bytes.
    #[serde(default)]
    pub memory_swap: Option<u64>,
    /// Relative CPU share weight.
    #[serde(default)]
    pub cpu_shares: Option<u64>,
    /// `name:soft:hard` ulimit strings, kept opaque and passed through to
    /// the daemon largely unparsed.
    #[serde(default)]
    pub ulimits: Vec<String>,
}

/// Container restart policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RestartPolicy {
    /// Never restart automatically.
    No,
    /// Always restart.
    Always,
    /// Restart unless the user explicitly stopped it.
    UnlessStopped,
    /// Restart on non-zero exit, up to `max_retries` times (`None` = unbounded).
    OnFailure {
        /// Retry cap, or unbounded if absent.
        #[serde(default)]
        max_retries: Option<u32>,
    },
}

impl Default for RestartPolicy {
    fn default() -> Self {
        RestartPolicy::No
    }
}

impl RestartPolicy {
    /// The daemon-level restart policy name (as Docker's `--restart` flag
    /// expects it), dropping the retry cap: adapters that support it read
    /// `max_retries` off this enum directly rather than parsing the string.
    #[must_use]
    pub fn as_daemon_string(&self) -> String {
        match self {
            RestartPolicy::No => "no".to_string(),
            RestartPolicy::Always => "always".to_string(),
            RestartPolicy::UnlessStopped => "unless-stopped".to_string(),
            RestartPolicy::OnFailure { max_retries: Some(n) } => format!("on-failure:{n}"),
            RestartPolicy::OnFailure { max_retries: None } => "on-failure".to_string(),
        }
    }
}

/// A single placed, runnable unit of a [`crate::model::service::Service`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    /// Instance name, unique across ALL services in the environment.
    pub name: String,
    /// Owning service name. Populated by `Environment::new` from the
    /// surrounding `Service`; the per-instance YAML shape does not repeat it.
    #[serde(skip)]
    pub service: String,
    /// Ship this instance is placed on.
    pub ship: String,
    /// Image override; falls back to the service's image when absent.
    #[serde(default)]
    pub image: Option<String>,
    /// Port mappings, merged with the service's defaults (instance wins on
    /// name collision) by `Environment::new`.
    #[serde(default)]
    pub ports: Vec<Port>,
    /// Raw `container:host[:mode]` (schema v1) or `host:container[:mode]`
    /// (schema v2) binding strings, as they appear in the document.
    #[serde(default, rename = "volumes")]
    pub volume_specs: Vec<String>,
    /// Host bind mounts, parsed from `volume_specs` against the
    /// environment's schema version by `Environment::new`.
    #[serde(skip)]
    pub volumes: Vec<VolumeBinding>,
    /// Container-only (unnamed, daemon-managed) volumes, by container path.
    #[serde(default)]
    pub anonymous_volumes: Vec<String>,
    /// Names of services whose instances this one shares volumes from.
    /// Those instances must run on the same ship; this implies a hard
    /// dependency on the source service.
    #[serde(default)]
    pub volumes_from: Vec<String>,
    /// Instance-level environment (wins over service env and env-files).
    #[serde(default)]
    pub env: IndexMap<String, String>,
    /// Instance-level lifecycle checks, merged with the service's.
    #[serde(default)]
    pub checks: Vec<crate::lifecycle::CheckSpec>,
    /// Resource limits.
    #[serde(default)]
    pub resources: ResourceLimits,
    /// Docker network mode (`"bridge"`, `"host"`, `"container:<name>"`, ...).
    #[serde(default)]
    pub network_mode: Option<String>,
    /// Extra DNS servers.
    #[serde(default)]
    pub dns: Vec<String>,
    /// Restart policy.
    #[serde(default)]
    pub restart_policy: RestartPolicy,
    /// `--security-opt` values.
    #[serde(default)]
    pub security_opts: Vec<String>,
    /// Container labels.
    #[serde(default)]
    pub labels: IndexMap<String, String>,
    /// Seconds to wait after TERM before escalating to KILL on stop.
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout: u64,
    /// Command override.
    #[serde(default)]
    pub command: Option<Vec<String>>,
    /// User to run as.
    #[serde(default)]
    pub user: Option<String>,
    /// Working directory override.
    #[serde(default)]
    pub workdir: Option<String>,
    /// Mount the root filesystem read-only.
    #[serde(default)]
    pub read_only_root: bool,
    /// `host:ip` entries to add to `/etc/hosts`.
    #[serde(default)]
    pub extra_hosts: Vec<String>,
    /// Docker log driver.
    #[serde(default)]
    pub log_driver: Option<String>,
    /// Log driver options.
    #[serde(default)]
    pub log_options: IndexMap<String, String>,
    /// Legacy Docker `--link` entries, alias -> target container name.
    #[serde(default)]
    pub links: IndexMap<String, String>,
}

fn default_stop_timeout() -> u64 {
    10
}

impl Instance {
    /// Image actually used to create this instance: instance override,
    /// else the service's image.
    #[must_use]
    pub fn effective_image<'a>(&'a self, service_image: &'a str) -> &'a str {
        self.image.as_deref().unwrap_or(service_image)
    }

    /// Parse `volume_specs` into `volumes` according to the document's
    /// schema version. Called once by `Environment::new`.
    pub fn resolve_volumes(&mut self, schema_v2: bool) -> Result<(), String> {
        self.volumes = self
            .volume_specs
            .iter()
            .map(|raw| {
                if schema_v2 {
                    VolumeBinding::from_v2(raw)
                } else {
                    VolumeBinding::from_v1(raw)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v1_binding_is_container_colon_host() {
        let b = VolumeBinding::from_v1("/data:/srv/data:ro").unwrap();
        assert_eq!(b.container_path, "/data");
        assert_eq!(b.host_path, "/srv/data");
        assert_eq!(b.mode, MountMode::Ro);
    }

    #[test]
    fn v2_binding_is_host_colon_container() {
        let b = VolumeBinding::from_v2("/srv/data:/data").unwrap();
        assert_eq!(b.container_path, "/data");
        assert_eq!(b.host_path, "/srv/data");
        assert_eq!(b.mode, MountMode::Rw);
    }

    #[test]
    fn rejects_bad_mode() {
        assert!(VolumeBinding::from_v2("/a:/b:bogus").is_err());
    }
}
