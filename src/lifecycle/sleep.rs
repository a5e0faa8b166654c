//! Unconditional delay, used to paper over services with no real readiness
//! signal.

use super::{Budget, CheckContext, LifecycleCheck};
use crate::error::MaestroResult;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep as tokio_sleep;

/// Always passes, after sleeping `seconds`. Runs exactly once: its budget
/// always reports a single attempt so [`super::run_check`] never retries it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SleepCheck {
    /// Seconds to sleep before reporting success.
    pub seconds: u64,
    #[serde(skip, default = "one_attempt_budget")]
    budget: Budget,
}

fn one_attempt_budget() -> Budget {
    Budget {
        max_wait_secs: None,
        attempts: Some(1),
    }
}

#[async_trait::async_trait]
impl LifecycleCheck for SleepCheck {
    async fn attempt(&self, _ctx: &CheckContext<'_>) -> MaestroResult<bool> {
        tokio_sleep(Duration::from_secs(self.seconds)).await;
        Ok(true)
    }

    fn budget(&self) -> &Budget {
        &self.budget
    }

    fn describe(&self) -> String {
        format!("sleep:{}s", self.seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sleeps_then_passes() {
        let check = SleepCheck {
            seconds: 0,
            budget: one_attempt_budget(),
        };
        let ports = std::collections::HashMap::new();
        let env = std::collections::HashMap::new();
        let adapter = crate::adapter::testing::FakeShipDocker::new();
        let ctx = CheckContext {
            ship_address: "127.0.0.1",
            ports: &ports,
            container_env: &env,
            adapter: &adapter,
            container_id: "",
        };
        assert!(check.attempt(&ctx).await.unwrap());
    }
}
