//! The `ShipDocker` interface: everything the orchestration core needs from
//! a Docker daemon, and nothing else.
//!
//! This crate ships a capability interface plus one
//! reference implementation ([`cli::CliShipDocker`]) backed by shelling out
//! to the `docker` binary. Production deployments are expected to supply
//! their own implementation (e.g. backed by the Docker Engine HTTP API)
//! rather than rely on process spawning.

#[cfg(feature = "cli-adapter")]
pub mod cli;
pub mod testing;

use crate::error::MaestroResult;
use crate::model::registry::Registry;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Observed state of a container, as last reported by the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservedStatus {
    /// No container with the expected identity exists.
    Absent,
    /// Container exists but is not running.
    Created,
    /// Container is running.
    Running,
    /// Container exists, is not running, and was not `Created` (exited or stopped).
    Stopped,
}

/// A snapshot of one container as reported by `inspect`.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedContainer {
    /// Adapter-assigned container id.
    pub id: String,
    /// Current status.
    pub status: ObservedStatus,
    /// Image id or reference the container was created from.
    pub image: String,
    /// Labels attached at creation, used to detect drift against the
    /// desired create spec.
    pub labels: IndexMap<String, String>,
}

/// Everything needed to create a container, translated from
/// [`crate::model::instance::Instance`] by the state machine. Kept
/// independent of the model types so the adapter boundary stays a pure
/// interface.
#[derive(Debug, Clone)]
pub struct CreateSpec {
    /// Name to assign the container.
    pub name: String,
    /// Image reference to create from.
    pub image: String,
    /// Port publications.
    pub ports: Vec<PortPublish>,
    /// Bind mounts, as `host_path:container_path[:ro]` strings.
    pub volumes: Vec<String>,
    /// Anonymous volume container paths.
    pub anonymous_volumes: Vec<String>,
    /// Environment variables.
    pub env: IndexMap<String, String>,
    /// Labels to attach (includes the drift-detection identity labels).
    pub labels: IndexMap<String, String>,
    /// Command override.
    pub command: Option<Vec<String>>,
    /// Network mode.
    pub network_mode: Option<String>,
    /// DNS servers.
    pub dns: Vec<String>,
    /// Restart policy, opaque daemon-level string (e.g. `"always"`, `"no"`).
    pub restart_policy: String,
    /// Security options.
    pub security_opts: Vec<String>,
    /// User to run as.
    pub user: Option<String>,
    /// Working directory.
    pub workdir: Option<String>,
    /// Read-only root filesystem.
    pub read_only_root: bool,
    /// Extra `/etc/hosts` entries.
    pub extra_hosts: Vec<String>,
    /// Source containers to share volumes from.
    pub volumes_from: Vec<String>,
    /// Legacy container links.
    pub links: IndexMap<String, String>,
}

/// A single published port mapping.
#[derive(Debug, Clone)]
pub struct PortPublish {
    /// External (ship-facing) port or range start.
    pub external_port: u16,
    /// Internal (container) port or range start.
    pub internal_port: u16,
    /// Bind address on the ship, if any.
    pub bind_address: Option<String>,
    /// `"tcp"` or `"udp"`.
    pub protocol: String,
}

/// Output of an `exec`/`rexec` invocation inside a container.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    /// Process exit code.
    pub exit_code: i32,
    /// Combined/stdout output, adapter-defined.
    pub output: String,
}

/// The capability interface the orchestration core drives. Implementations
/// are expected to be cheaply cloneable handles (a connection pool, a CLI
/// binary path) rather than to own daemon state themselves.
#[async_trait]
pub trait ShipDocker: Send + Sync {
    /// Look up a container by name. `Ok(None)` means absent.
    async fn inspect(&self, name: &str) -> MaestroResult<Option<ObservedContainer>>;

    /// Create (but do not start) a container.
    async fn create(&self, spec: &CreateSpec) -> MaestroResult<String>;

    /// Start a created container.
    async fn start(&self, name: &str) -> MaestroResult<()>;

    /// Stop a running container, sending TERM and escalating to KILL after
    /// `timeout`.
    async fn stop(&self, name: &str, timeout: Duration) -> MaestroResult<()>;

    /// Send SIGKILL immediately.
    async fn kill(&self, name: &str) -> MaestroResult<()>;

    /// Remove a container (must not be running).
    async fn remove(&self, name: &str) -> MaestroResult<()>;

    /// Fetch recent logs.
    async fn logs(&self, name: &str, tail: Option<usize>) -> MaestroResult<String>;

    /// Pull an image, authenticating via `registry` when given.
    async fn pull(&self, image: &str, registry: Option<&Registry>) -> MaestroResult<()>;

    /// Authenticate against a registry (so subsequent pulls/pushes succeed).
    async fn login(&self, registry: &Registry) -> MaestroResult<()>;

    /// Run `command` inside the named, already-running container.
    async fn exec(&self, name: &str, command: &[String]) -> MaestroResult<ExecOutput>;
}
