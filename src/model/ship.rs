//! A reachable Docker daemon.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the controller reaches a ship's Docker daemon. The core never
/// dials this itself — it is part of the `Ship` value that a `ShipDocker`
/// adapter implementation is constructed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transport {
    /// Plain TCP, no transport security.
    Tcp,
    /// TLS, optionally verifying the daemon's certificate.
    Tls {
        /// Whether to verify the daemon's certificate chain.
        #[serde(default = "default_true")]
        verify: bool,
    },
    /// A Unix domain socket path on the controller host.
    UnixSocket {
        /// Path to the socket, e.g. `/var/run/docker.sock`.
        path: String,
    },
    /// An SSH tunnel to a remote daemon socket.
    Ssh {
        /// SSH user.
        user: String,
        /// Path to a private key, if not using agent auth.
        #[serde(default)]
        key_path: Option<String>,
        /// SSH port.
        #[serde(default = "default_ssh_port")]
        port: u16,
    },
}

impl Default for Transport {
    fn default() -> Self {
        Transport::Tcp
    }
}

fn default_true() -> bool {
    true
}

fn default_ssh_port() -> u16 {
    22
}

/// A declared Docker host. Ships are created at environment load and are
/// immutable for the lifetime of a play; the daemon client for a ship is
/// acquired lazily by the adapter and kept for the play's duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ship {
    /// Logical name, unique within the environment.
    pub name: String,
    /// IP or hostname.
    pub address: String,
    /// Endpoint override, if the daemon isn't reachable at `address`
    /// directly (e.g. a load balancer in front of a Swarm manager).
    #[serde(default)]
    pub endpoint: Option<String>,
    /// How to connect.
    #[serde(default)]
    pub transport: Transport,
    /// API version to negotiate, or "auto".
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Default per-RPC timeout, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,
}

fn default_api_version() -> String {
    "auto".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Ship {
    /// The externally reachable address used for env projection and TCP
    /// lifecycle checks: the explicit endpoint if set, else `address`.
    #[must_use]
    pub fn external_address(&self) -> &str {
        self.endpoint.as_deref().unwrap_or(&self.address)
    }

    /// The default operation timeout as a [`Duration`].
    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_address_prefers_endpoint() {
        let mut ship = Ship {
            name: "a".into(),
            address: "10.0.0.1".into(),
            endpoint: None,
            transport: Transport::Tcp,
            api_version: "auto".into(),
            default_timeout_secs: 30,
        };
        assert_eq!(ship.external_address(), "10.0.0.1");
        ship.endpoint = Some("lb.internal".into());
        assert_eq!(ship.external_address(), "lb.internal");
    }

    #[test]
    fn transport_tag_roundtrips() {
        let t: Transport = serde_json::from_str(r#"{"kind":"ssh","user":"deploy"}"#).unwrap();
        assert_eq!(
            t,
            Transport::Ssh {
                user: "deploy".into(),
                key_path: None,
                port: 22,
            }
        );
    }
}
