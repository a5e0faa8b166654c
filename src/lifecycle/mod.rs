//! Lifecycle checks: probes that gate the success of a container state
//! transition.
//!
//! Every check type implements [`LifecycleCheck`] (a capability interface,
//! not runtime class loading) and is re-attempted
//! by [`run_check`] until it passes or its [`Budget`] is exhausted, with a
//! fixed one-second delay between attempts.

mod exec;
mod http;
mod sleep;
mod tcp;

pub use exec::{ExecCheck, RexecCheck};
pub use http::HttpCheck;
pub use sleep::SleepCheck;
pub use tcp::TcpCheck;

use crate::error::{MaestroError, MaestroResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::time::sleep as tokio_sleep;

/// How long, and how many times, a check is retried before it fails.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    /// Overall wall-clock budget, in seconds.
    #[serde(default)]
    pub max_wait_secs: Option<u64>,
    /// Maximum number of attempts.
    #[serde(default)]
    pub attempts: Option<u32>,
}

/// A port reference as it appears in a check spec: either a symbolic name
/// resolved via the target instance's named ports, or a literal number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortRef {
    /// A named port, resolved to its external mapped port number.
    Named(String),
    /// A literal port number.
    Numeric(u16),
}

/// Everything a check needs to run, assembled by the state machine before
/// dispatching a probe: the resolved address/ports of the container being
/// gated, its projected environment (for `exec`), and a handle back to the
/// adapter (for `rexec`).
pub struct CheckContext<'a> {
    /// Default host for `tcp`/`http` checks when the check doesn't override.
    pub ship_address: &'a str,
    /// Named ports resolved to `(external, internal)` numbers.
    pub ports: &'a HashMap<String, (u16, u16)>,
    /// The environment the container was (or would be) created with.
    pub container_env: &'a HashMap<String, String>,
    /// Adapter used by `rexec` to run inside the container.
    pub adapter: &'a dyn crate::adapter::ShipDocker,
    /// Container id as known to the adapter (empty before `create`).
    pub container_id: &'a str,
}

impl<'a> CheckContext<'a> {
    fn resolve_port(&self, port: &PortRef) -> MaestroResult<u16> {
        match port {
            PortRef::Numeric(n) => Ok(*n),
            PortRef::Named(name) => self
                .ports
                .get(name)
                .map(|(external, _internal)| *external)
                .ok_or_else(|| MaestroError::config(format!("unknown named port '{name}'"))),
        }
    }
}

/// A single probe attempt. `attempt` returns `Ok(true)` on pass, `Ok(false)`
/// on a recoverable fail (retry), and `Err` on a fatal error that should
/// abort the retry loop immediately.
#[async_trait]
pub trait LifecycleCheck: Send + Sync {
    /// Run one attempt.
    async fn attempt(&self, ctx: &CheckContext<'_>) -> MaestroResult<bool>;
    /// Retry budget for this check.
    fn budget(&self) -> &Budget;
    /// Human-readable identity used in timeout diagnostics, e.g. `"tcp:broker"`.
    fn describe(&self) -> String;
}

/// The gate a check applies to: `running` gates start/restart success,
/// `stopped` gates stop success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    /// Gates `start`/`restart`.
    Running,
    /// Gates `stop`.
    Stopped,
}

/// A declared check as it appears in the environment document: a slot plus
/// a tagged check variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckSpec {
    /// Which transition this check gates.
    pub slot: Slot,
    /// The probe itself.
    #[serde(flatten)]
    pub kind: CheckKind,
}

/// Tagged union of the five probe types.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CheckKind {
    /// TCP connect probe.
    Tcp(TcpCheck),
    /// HTTP request probe.
    Http(HttpCheck),
    /// Controller-local command probe.
    Exec(ExecCheck),
    /// In-container command probe.
    Rexec(RexecCheck),
    /// Unconditional delay.
    Sleep(SleepCheck),
}

#[async_trait]
impl LifecycleCheck for CheckKind {
    async fn attempt(&self, ctx: &CheckContext<'_>) -> MaestroResult<bool> {
        match self {
            CheckKind::Tcp(c) => c.attempt(ctx).await,
            CheckKind::Http(c) => c.attempt(ctx).await,
            CheckKind::Exec(c) => c.attempt(ctx).await,
            CheckKind::Rexec(c) => c.attempt(ctx).await,
            CheckKind::Sleep(c) => c.attempt(ctx).await,
        }
    }

    fn budget(&self) -> &Budget {
        match self {
            CheckKind::Tcp(c) => c.budget(),
            CheckKind::Http(c) => c.budget(),
            CheckKind::Exec(c) => c.budget(),
            CheckKind::Rexec(c) => c.budget(),
            CheckKind::Sleep(c) => c.budget(),
        }
    }

    fn describe(&self) -> String {
        match self {
            CheckKind::Tcp(c) => c.describe(),
            CheckKind::Http(c) => c.describe(),
            CheckKind::Exec(c) => c.describe(),
            CheckKind::Rexec(c) => c.describe(),
            CheckKind::Sleep(c) => c.describe(),
        }
    }
}

/// Run `check` to success or budget exhaustion, waiting one second between
/// attempts, and report a [`MaestroError::LifecycleTimeout`] naming
/// `container` on exhaustion.
pub async fn run_check(
    check: &dyn LifecycleCheck,
    ctx: &CheckContext<'_>,
    container: &str,
) -> MaestroResult<()> {
    let budget = check.budget();
    let deadline = budget
        .max_wait_secs
        .map(|secs| Instant::now() + Duration::from_secs(secs));
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        if check.attempt(ctx).await? {
            return Ok(());
        }

        let exhausted_attempts = budget.attempts.is_some_and(|max| attempts >= max);
        let exhausted_deadline = deadline.is_some_and(|dl| Instant::now() >= dl);
        let no_budget_left = budget.attempts.is_none() && budget.max_wait_secs.is_none();

        if exhausted_attempts || exhausted_deadline || no_budget_left {
            return Err(MaestroError::lifecycle_timeout(
                check.describe(),
                container,
                attempts,
            ));
        }

        tokio_sleep(Duration::from_secs(1)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysFail(Budget);

    #[async_trait]
    impl LifecycleCheck for AlwaysFail {
        async fn attempt(&self, _ctx: &CheckContext<'_>) -> MaestroResult<bool> {
            Ok(false)
        }
        fn budget(&self) -> &Budget {
            &self.0
        }
        fn describe(&self) -> String {
            "always-fail".into()
        }
    }

    struct PassOnNth(u32, std::sync::atomic::AtomicU32, Budget);

    #[async_trait]
    impl LifecycleCheck for PassOnNth {
        async fn attempt(&self, _ctx: &CheckContext<'_>) -> MaestroResult<bool> {
            let n = self.1.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
            Ok(n >= self.0)
        }
        fn budget(&self) -> &Budget {
            &self.2
        }
        fn describe(&self) -> String {
            "pass-on-nth".into()
        }
    }

    fn empty_ctx<'a>(
        ports: &'a HashMap<String, (u16, u16)>,
        env: &'a HashMap<String, String>,
        adapter: &'a dyn crate::adapter::ShipDocker,
    ) -> CheckContext<'a> {
        CheckContext {
            ship_address: "127.0.0.1",
            ports,
            container_env: env,
            adapter,
            container_id: "",
        }
    }

    #[tokio::test]
    async fn exhausts_attempts_budget() {
        let ports = HashMap::new();
        let env = HashMap::new();
        let adapter = crate::adapter::testing::FakeShipDocker::new();
        let ctx = empty_ctx(&ports, &env, &adapter);
        let check = AlwaysFail(Budget {
            max_wait_secs: None,
            attempts: Some(2),
        });
        let err = run_check(&check, &ctx, "c1").await.unwrap_err();
        assert!(matches!(err, MaestroError::LifecycleTimeout { attempts: 2, .. }));
    }

    #[tokio::test]
    async fn no_budget_fails_after_first_attempt() {
        let ports = HashMap::new();
        let env = HashMap::new();
        let adapter = crate::adapter::testing::FakeShipDocker::new();
        let ctx = empty_ctx(&ports, &env, &adapter);
        let check = AlwaysFail(Budget::default());
        let err = run_check(&check, &ctx, "c1").await.unwrap_err();
        assert!(matches!(err, MaestroError::LifecycleTimeout { attempts: 1, .. }));
    }

    #[tokio::test]
    async fn succeeds_within_attempts_budget() {
        let ports = HashMap::new();
        let env = HashMap::new();
        let adapter = crate::adapter::testing::FakeShipDocker::new();
        let ctx = empty_ctx(&ports, &env, &adapter);
        let check = PassOnNth(
            3,
            std::sync::atomic::AtomicU32::new(0),
            Budget {
                max_wait_secs: None,
                attempts: Some(5),
            },
        );
        run_check(&check, &ctx, "c1").await.unwrap();
    }
}
