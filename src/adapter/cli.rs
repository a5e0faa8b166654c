//! Reference `ShipDocker` implementation: shells out to a local or
//! remote-context `docker` binary rather than talking to the Engine API
//! directly.

use super::{CreateSpec, ExecOutput, ObservedContainer, ObservedStatus, ShipDocker};
use crate::error::{MaestroError, MaestroResult};
use crate::executor::{find_docker_binary, ExecutionConfig, ProcessExecutor};
use crate::model::registry::Registry;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Drives `docker` as a subprocess. One instance per ship; `docker_host`
/// sets `DOCKER_HOST` for the child process so a single controller can
/// address many daemons without per-call context switching.
#[derive(Debug, Clone)]
pub struct CliShipDocker {
    executor: ProcessExecutor,
    docker_host: Option<String>,
}

impl CliShipDocker {
    /// Build an adapter targeting the local `docker` binary, addressing a
    /// remote daemon at `docker_host` (e.g. `tcp://10.0.0.5:2376`) when set.
    pub fn new(docker_host: Option<String>) -> MaestroResult<Self> {
        Ok(Self {
            executor: ProcessExecutor::new(find_docker_binary()?),
            docker_host,
        })
    }

    fn config(&self) -> ExecutionConfig {
        let mut environment = std::collections::HashMap::new();
        if let Some(host) = &self.docker_host {
            environment.insert("DOCKER_HOST".to_string(), host.clone());
        }
        ExecutionConfig {
            timeout: Some(Duration::from_secs(30)),
            environment,
            working_dir: None,
        }
    }

    async fn run(&self, args: Vec<String>) -> MaestroResult<String> {
        let output = self.executor.execute(&args, Some(self.config())).await?;
        if !output.success {
            return Err(MaestroError::daemon(
                self.docker_host.as_deref().unwrap_or("local"),
                format!("docker {}: {}", args.join(" "), output.stderr.trim()),
            ));
        }
        Ok(output.stdout)
    }
}

#[derive(Debug, Deserialize)]
struct InspectEntry {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Image")]
    image: String,
    #[serde(rename = "State")]
    state: InspectState,
    #[serde(rename = "Config")]
    config: InspectConfig,
}

#[derive(Debug, Deserialize)]
struct InspectState {
    #[serde(rename = "Running")]
    running: bool,
}

#[derive(Debug, Deserialize)]
struct InspectConfig {
    #[serde(rename = "Labels")]
    labels: Option<IndexMap<String, String>>,
}

#[async_trait]
impl ShipDocker for CliShipDocker {
    async fn inspect(&self, name: &str) -> MaestroResult<Option<ObservedContainer>> {
        let args = vec!["inspect".to_string(), name.to_string()];
        let output = self.executor.execute(&args, Some(self.config())).await?;
        if !output.success {
            return Ok(None);
        }
        let mut entries: Vec<InspectEntry> = serde_json::from_str(&output.stdout)
            .map_err(|e| MaestroError::Parse(format!("parsing docker inspect output: {e}")))?;
        let Some(entry) = entries.pop() else {
            return Ok(None);
        };
        let status = if entry.state.running {
            ObservedStatus::Running
        } else {
            ObservedStatus::Stopped
        };
        Ok(Some(ObservedContainer {
            id: entry.id,
            status,
            image: entry.image,
            labels: entry.config.labels.unwrap_or_default(),
        }))
    }

    async fn create(&self, spec: &CreateSpec) -> MaestroResult<String> {
        let mut args = vec!["create".to_string(), "--name".to_string(), spec.name.clone()];

        for port in &spec.ports {
            let bind = port
                .bind_address
                .as_deref()
                .map(|addr| format!("{addr}:"))
                .unwrap_or_default();
            args.push("-p".into());
            args.push(format!(
                "{bind}{}:{}/{}",
                port.external_port, port.internal_port, port.protocol
            ));
        }
        for volume in &spec.volumes {
            args.push("-v".into());
            args.push(volume.clone());
        }
        for anon in &spec.anonymous_volumes {
            args.push("-v".into());
            args.push(anon.clone());
        }
        for (key, value) in &spec.env {
            args.push("-e".into());
            args.push(format!("{key}={value}"));
        }
        for (key, value) in &spec.labels {
            args.push("-l".into());
            args.push(format!("{key}={value}"));
        }
        for source in &spec.volumes_from {
            args.push("--volumes-from".into());
            args.push(source.clone());
        }
        for (alias, target) in &spec.links {
            args.push("--link".into());
            args.push(format!("{target}:{alias}"));
        }
        if let Some(network_mode) = &spec.network_mode {
            args.push("--network".into());
            args.push(network_mode.clone());
        }
        for dns in &spec.dns {
            args.push("--dns".into());
            args.push(dns.clone());
        }
        args.push("--restart".into());
        args.push(spec.restart_policy.clone());
        for opt in &spec.security_opts {
            args.push("--security-opt".into());
            args.push(opt.clone());
        }
        if let Some(user) = &spec.user {
            args.push("-u".into());
            args.push(user.clone());
        }
        if let Some(workdir) = &spec.workdir {
            args.push("-w".into());
            args.push(workdir.clone());
        }
        if spec.read_only_root {
            args.push("--read-only".into());
        }
        for host_entry in &spec.extra_hosts {
            args.push("--add-host".into());
            args.push(host_entry.clone());
        }

        args.push(spec.image.clone());
        if let Some(command) = &spec.command {
            args.extend(command.iter().cloned());
        }

        debug!(container = %spec.name, "creating container");
        let stdout = self.run(args).await?;
        Ok(stdout.trim().to_string())
    }

    async fn start(&self, name: &str) -> MaestroResult<()> {
        self.run(vec!["start".to_string(), name.to_string()]).await?;
        Ok(())
    }

    async fn stop(&self, name: &str, timeout: Duration) -> MaestroResult<()> {
        self.run(vec![
            "stop".to_string(),
            "-t".to_string(),
            timeout.as_secs().to_string(),
            name.to_string(),
        ])
        .await?;
        Ok(())
    }

    async fn kill(&self, name: &str) -> MaestroResult<()> {
        self.run(vec!["kill".to_string(), name.to_string()]).await?;
        Ok(())
    }

    async fn remove(&self, name: &str) -> MaestroResult<()> {
        self.run(vec![
            "rm".to_string(),
            "-f".to_string(),
            "-v".to_string(),
            name.to_string(),
        ])
        .await?;
        Ok(())
    }

    async fn logs(&self, name: &str, tail: Option<usize>) -> MaestroResult<String> {
        let mut args = vec!["logs".to_string()];
        if let Some(n) = tail {
            args.push("--tail".into());
            args.push(n.to_string());
        }
        args.push(name.to_string());
        self.run(args).await
    }

    async fn pull(&self, image: &str, registry: Option<&Registry>) -> MaestroResult<()> {
        if let Some(registry) = registry {
            self.login(registry).await?;
        }
        let attempts = registry.map(|r| r.retry.max_attempts).unwrap_or(1);
        let mut last_err = None;
        for attempt in 1..=attempts.max(1) {
            match self.run(vec!["pull".to_string(), image.to_string()]).await {
                Ok(_) => return Ok(()),
                Err(e) => {
                    warn!(image, attempt, "pull failed");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| MaestroError::image("unknown", image, "pull failed")))
    }

    async fn login(&self, registry: &Registry) -> MaestroResult<()> {
        self.run(vec![
            "login".to_string(),
            "--username".to_string(),
            registry.username.clone(),
            "--password".to_string(),
            registry.password.clone(),
            registry.url.clone(),
        ])
        .await?;
        Ok(())
    }

    async fn exec(&self, name: &str, command: &[String]) -> MaestroResult<ExecOutput> {
        let mut args = vec!["exec".to_string(), name.to_string()];
        args.extend(command.iter().cloned());
        let output = self.executor.execute(&args, Some(self.config())).await?;
        Ok(ExecOutput {
            exit_code: output.exit_code,
            output: if output.success { output.stdout } else { output.stderr },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_host_is_only_set_when_configured() {
        let adapter = CliShipDocker {
            executor: ProcessExecutor::new("docker"),
            docker_host: None,
        };
        assert!(adapter.config().environment.is_empty());

        let adapter = CliShipDocker {
            executor: ProcessExecutor::new("docker"),
            docker_host: Some("tcp://10.0.0.5:2376".into()),
        };
        assert_eq!(
            adapter.config().environment.get("DOCKER_HOST").unwrap(),
            "tcp://10.0.0.5:2376"
        );
    }
}
