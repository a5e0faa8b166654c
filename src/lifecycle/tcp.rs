//! TCP connect probe.

use super::{Budget, CheckContext, LifecycleCheck, PortRef};
use crate::error::MaestroResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::ToSocketAddrs;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Passes when a TCP connection to `host:port` can be established.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpCheck {
    /// Host to connect to; defaults to the container's ship address.
    #[serde(default)]
    pub host: Option<String>,
    /// Port to connect to, named or literal.
    pub port: PortRef,
    /// Connect timeout, in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Retry budget.
    #[serde(default)]
    pub budget: Budget,
}

fn default_connect_timeout_secs() -> u64 {
    3
}

#[async_trait]
impl LifecycleCheck for TcpCheck {
    async fn attempt(&self, ctx: &CheckContext<'_>) -> MaestroResult<bool> {
        let host = self.host.as_deref().unwrap_or(ctx.ship_address);
        let port = ctx.resolve_port(&self.port)?;
        let addrs: Vec<_> = match (host, port).to_socket_addrs() {
            Ok(it) => it.collect(),
            Err(_) => return Ok(false),
        };
        let Some(addr) = addrs.into_iter().next() else {
            return Ok(false);
        };
        let dur = Duration::from_secs(self.connect_timeout_secs);
        Ok(timeout(dur, TcpStream::connect(addr)).await.is_ok_and(|r| r.is_ok()))
    }

    fn budget(&self) -> &Budget {
        &self.budget
    }

    fn describe(&self) -> String {
        match &self.port {
            PortRef::Named(name) => format!("tcp:{name}"),
            PortRef::Numeric(n) => format!("tcp:{n}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describes_named_port() {
        let check = TcpCheck {
            host: None,
            port: PortRef::Named("broker".into()),
            connect_timeout_secs: 1,
            budget: Budget::default(),
        };
        assert_eq!(check.describe(), "tcp:broker");
    }
}
