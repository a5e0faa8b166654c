//! Command probes: `exec` runs on the controller host, `rexec` runs inside
//! the target container via the adapter.

use super::{Budget, CheckContext, LifecycleCheck};
use crate::error::{MaestroError, MaestroResult};
use crate::executor::{ExecutionConfig, ProcessExecutor};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Passes when `command`, run on the controller host with the container's
/// projected environment, exits zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecCheck {
    /// Program and arguments.
    pub command: Vec<String>,
    /// Per-attempt timeout, in seconds.
    #[serde(default = "default_attempt_timeout_secs")]
    pub timeout_secs: u64,
    /// Retry budget.
    #[serde(default)]
    pub budget: Budget,
}

fn default_attempt_timeout_secs() -> u64 {
    10
}

#[async_trait::async_trait]
impl LifecycleCheck for ExecCheck {
    async fn attempt(&self, ctx: &CheckContext<'_>) -> MaestroResult<bool> {
        let Some((program, args)) = self.command.split_first() else {
            return Err(MaestroError::config("exec check command must not be empty"));
        };
        let executor = ProcessExecutor::new(program);
        let config = ExecutionConfig {
            timeout: Some(Duration::from_secs(self.timeout_secs)),
            environment: ctx.container_env.clone(),
            working_dir: None,
        };
        let output = executor.execute(args, Some(config)).await?;
        Ok(output.success)
    }

    fn budget(&self) -> &Budget {
        &self.budget
    }

    fn describe(&self) -> String {
        format!("exec:{}", self.command.first().map(String::as_str).unwrap_or(""))
    }
}

/// Passes when `command`, run inside the already-created container via the
/// adapter's `exec`, exits zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RexecCheck {
    /// Command and arguments to run inside the container.
    pub command: Vec<String>,
    /// Retry budget.
    #[serde(default)]
    pub budget: Budget,
}

#[async_trait::async_trait]
impl LifecycleCheck for RexecCheck {
    async fn attempt(&self, ctx: &CheckContext<'_>) -> MaestroResult<bool> {
        if ctx.container_id.is_empty() {
            return Ok(false);
        }
        let output = ctx.adapter.exec(ctx.container_id, &self.command).await?;
        Ok(output.exit_code == 0)
    }

    fn budget(&self) -> &Budget {
        &self.budget
    }

    fn describe(&self) -> String {
        format!("rexec:{}", self.command.first().map(String::as_str).unwrap_or(""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_uses_first_argument() {
        let check = RexecCheck {
            command: vec!["pg_isready".into()],
            budget: Budget::default(),
        };
        assert_eq!(check.describe(), "rexec:pg_isready");
    }
}
