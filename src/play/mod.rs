//! Plays: the layered, parallel execution of an action (start, stop, kill,
//! restart, pull) over a set of services, respecting the hard-dependency
//! graph and gating each transition on its lifecycle checks.

pub mod status;

use crate::adapter::{CreateSpec, PortPublish, ShipDocker};
use crate::envproject;
use crate::error::{MaestroError, MaestroResult};
use crate::graph::Direction;
use crate::lifecycle::{CheckContext, Slot};
use crate::model::environment::Environment;
use crate::model::instance::Instance;
use crate::observer::{AuditBus, AuditEvent, ProgressEvent, ProgressSink};
use crate::state_machine::{reconcile, DesiredState, ImagePullCoordinator, StateMachine, StopMode};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

/// The action a play applies to its target services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Bring instances up, pulling and creating as needed.
    Start,
    /// Stop running instances without removing them.
    Stop,
    /// KILL running instances immediately, without removing them.
    Kill,
    /// Stop then start.
    Restart,
    /// Pull each instance's image without touching container state.
    Pull,
    /// Remove stopped (or absent) instances and their managed volumes.
    Clean,
}

impl Action {
    /// Scheduling direction: dependencies-first for actions that bring
    /// things up, dependents-first for actions that tear things down.
    #[must_use]
    pub fn direction(&self) -> Direction {
        match self {
            Action::Start | Action::Restart | Action::Pull => Direction::Forward,
            Action::Stop | Action::Kill | Action::Clean => Direction::Reverse,
        }
    }

    fn desired_state(&self) -> DesiredState {
        match self {
            Action::Start | Action::Restart | Action::Pull => DesiredState::Running,
            Action::Stop | Action::Kill => DesiredState::Stopped,
            Action::Clean => DesiredState::Absent,
        }
    }

    /// Whether a `Stop` daemon op under this action should signal TERM
    /// (honoring `stopTimeout`) or KILL immediately.
    fn stop_mode(&self) -> StopMode {
        match self {
            Action::Kill => StopMode::Immediate,
            _ => StopMode::Graceful,
        }
    }
}

/// Tuning knobs for a play's scheduler.
#[derive(Debug, Clone)]
pub struct PlaySettings {
    /// Maximum containers actioned concurrently, across the whole play
    /// (not per layer: a layer can be wider than this and will drain
    /// through the semaphore).
    pub max_parallel: usize,
    /// Whether a single instance failure cancels the rest of the play.
    pub fail_fast: bool,
}

impl Default for PlaySettings {
    fn default() -> Self {
        Self {
            max_parallel: 8,
            fail_fast: false,
        }
    }
}

/// The per-instance result of a play.
#[derive(Debug)]
pub struct PlayOutcome {
    /// Instance name.
    pub instance: String,
    /// What happened.
    pub result: MaestroResult<()>,
}

/// Translate a validated instance into the adapter-facing [`CreateSpec`],
/// resolving its environment via [`envproject::project`].
pub fn build_create_spec(
    environment: &Environment,
    instance: &Instance,
    env_file_contents: &[IndexMap<String, String>],
) -> MaestroResult<CreateSpec> {
    let service = environment.service_of(instance)?;
    let image = instance.effective_image(&service.image).to_string();
    let ports = environment.resolved_ports(&instance.name)?;
    let env = envproject::project(environment, instance, env_file_contents)?;

    let mut labels = instance.labels.clone();
    labels.insert("maestro.service".to_string(), instance.service.clone());
    labels.insert("maestro.image".to_string(), image.clone());

    Ok(CreateSpec {
        name: instance.name.clone(),
        image,
        ports: ports
            .iter()
            .map(|p| PortPublish {
                external_port: p.external.port,
                internal_port: p.internal.port,
                bind_address: p.external.bind_address.clone(),
                protocol: format!("{:?}", p.protocol).to_lowercase(),
            })
            .collect(),
        volumes: instance
            .volumes
            .iter()
            .map(|v| {
                let mode = match v.mode {
                    crate::model::instance::MountMode::Ro => "ro",
                    crate::model::instance::MountMode::Rw => "rw",
                };
                format!("{}:{}:{mode}", v.host_path, v.container_path)
            })
            .collect(),
        anonymous_volumes: instance.anonymous_volumes.clone(),
        env,
        labels,
        command: instance.command.clone(),
        network_mode: instance.network_mode.clone(),
        dns: instance.dns.clone(),
        restart_policy: instance.restart_policy.as_daemon_string(),
        security_opts: instance.security_opts.clone(),
        user: instance.user.clone(),
        workdir: instance.workdir.clone(),
        read_only_root: instance.read_only_root,
        extra_hosts: instance.extra_hosts.clone(),
        volumes_from: instance.volumes_from.clone(),
        links: instance.links.clone(),
    })
}

async fn run_checks(
    instance: &Instance,
    slot: Slot,
    environment: &Environment,
    adapter: &dyn ShipDocker,
    container_id: &str,
    container_env: &HashMap<String, String>,
) -> MaestroResult<()> {
    let ship = environment.ship_of(instance)?;
    let resolved_ports = environment.resolved_ports(&instance.name)?;
    let port_map: HashMap<String, (u16, u16)> = resolved_ports
        .iter()
        .map(|p| (p.name.clone(), (p.external.port, p.internal.port)))
        .collect();

    let service = environment.service_of(instance)?;
    let checks = service.checks.iter().chain(instance.checks.iter());

    let ctx = CheckContext {
        ship_address: ship.external_address(),
        ports: &port_map,
        container_env,
        adapter,
        container_id,
    };

    for check in checks.filter(|c| c.slot == slot) {
        crate::lifecycle::run_check(&check.kind, &ctx, &instance.name).await?;
    }
    Ok(())
}

async fn run_instance(
    environment: &Environment,
    instance_name: String,
    adapter: Arc<dyn ShipDocker>,
    action: Action,
    env_file_contents: Arc<Vec<IndexMap<String, String>>>,
    pulls: Arc<ImagePullCoordinator>,
    audit: Option<Arc<AuditBus>>,
) -> MaestroResult<()> {
    let instance = environment.instance(&instance_name)?;
    let spec = build_create_spec(environment, instance, &env_file_contents)?;
    let ship = environment.ship_of(instance)?;
    let registry_host = spec.image.split('/').next().unwrap_or(&spec.image);
    let registry = environment.registry_for(registry_host);

    if action == Action::Pull {
        pulls.pull(adapter.as_ref(), &ship.name, &spec.image, registry).await?;
        return Ok(());
    }

    let observed = adapter.inspect(&instance_name).await?;
    let ops = reconcile(observed.as_ref(), action.desired_state(), &spec);
    let machine = StateMachine::new(adapter.as_ref());
    let stop_timeout = Duration::from_secs(instance.stop_timeout);
    let stop_mode = action.stop_mode();
    machine
        .drive(&ops, &spec, &ship.name, registry, stop_timeout, &pulls, stop_mode)
        .await?;

    if action == Action::Restart {
        let restart_ops = reconcile(
            adapter.inspect(&instance_name).await?.as_ref(),
            DesiredState::Running,
            &spec,
        );
        machine
            .drive(&restart_ops, &spec, &ship.name, registry, stop_timeout, &pulls, stop_mode)
            .await?;
    }

    let gate = match action {
        Action::Start | Action::Restart => Some(Slot::Running),
        Action::Stop => Some(Slot::Stopped),
        Action::Kill | Action::Pull | Action::Clean => None,
    };
    if let Some(slot) = gate {
        let container_env: HashMap<String, String> = spec.env.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        run_checks(instance, slot, environment, adapter.as_ref(), &instance_name, &container_env).await?;
    }

    if let Some(bus) = &audit {
        let event = match action {
            Action::Start | Action::Restart => AuditEvent::Started {
                container: instance_name.clone(),
            },
            Action::Stop | Action::Kill => AuditEvent::Stopped {
                container: instance_name.clone(),
            },
            Action::Clean => AuditEvent::Removed {
                container: instance_name.clone(),
            },
            Action::Pull => AuditEvent::PullFinished {
                ship: ship.name.clone(),
                image: spec.image.clone(),
                ok: true,
            },
        };
        let _ = bus.dispatch(event).await;
    }

    Ok(())
}

/// Runs an action over a set of target services, scheduling by dependency
/// layer and bounding total in-flight work with a semaphore.
pub struct Play<'a> {
    environment: &'a Environment,
    adapters: &'a IndexMap<String, Arc<dyn ShipDocker>>,
    settings: PlaySettings,
}

impl<'a> Play<'a> {
    /// Build a play over `environment`, dispatching to `adapters` (keyed by
    /// ship name).
    #[must_use]
    pub fn new(
        environment: &'a Environment,
        adapters: &'a IndexMap<String, Arc<dyn ShipDocker>>,
        settings: PlaySettings,
    ) -> Self {
        Self {
            environment,
            adapters,
            settings,
        }
    }

    /// Run `action` over `target_services`, stopping early if `cancel`
    /// reports true between layers.
    pub async fn run(
        &self,
        action: Action,
        target_services: &[String],
        env_file_contents: Vec<IndexMap<String, String>>,
        audit: Option<Arc<AuditBus>>,
        progress: Option<Arc<dyn ProgressSink>>,
        mut cancel: watch::Receiver<bool>,
    ) -> MaestroResult<Vec<PlayOutcome>> {
        let layers = self
            .environment
            .graph
            .layered_order(target_services, action.direction());
        let env_file_contents = Arc::new(env_file_contents);
        let pulls = Arc::new(ImagePullCoordinator::new());
        let semaphore = Arc::new(Semaphore::new(self.settings.max_parallel.max(1)));
        let mut outcomes = Vec::new();

        for layer_services in layers {
            if *cancel.borrow() {
                break;
            }

            let mut instance_names = Vec::new();
            for service_name in &layer_services {
                for instance in self.environment.instances_of_service(service_name) {
                    instance_names.push(instance.name.clone());
                }
            }
            if let Some(p) = &progress {
                p.report(ProgressEvent::LayerStarted {
                    total: instance_names.len(),
                });
            }

            let mut join_set = JoinSet::new();
            for instance_name in instance_names {
                let Some(instance) = self.environment.instances.get(&instance_name) else {
                    continue;
                };
                let Some(adapter) = self.adapters.get(&instance.ship).cloned() else {
                    outcomes.push(PlayOutcome {
                        instance: instance_name.clone(),
                        result: Err(MaestroError::config(format!(
                            "no adapter registered for ship '{}'",
                            instance.ship
                        ))),
                    });
                    continue;
                };

                let environment = self.environment;
                let permit_pool = semaphore.clone();
                let env_file_contents = env_file_contents.clone();
                let pulls = pulls.clone();
                let audit = audit.clone();
                let mut cancel_rx = cancel.clone();

                join_set.spawn(async move {
                    let _permit = permit_pool.acquire_owned().await.expect("semaphore closed");
                    if *cancel_rx.borrow_and_update() {
                        return (instance_name, Err(MaestroError::cancelled(instance_name.clone())));
                    }
                    let result = run_instance(
                        environment,
                        instance_name.clone(),
                        adapter,
                        action,
                        env_file_contents,
                        pulls,
                        audit,
                    )
                    .await;
                    (instance_name, result)
                });
            }

            let mut layer_failed = false;
            while let Some(joined) = join_set.join_next().await {
                let (instance_name, result) = joined.map_err(|e| {
                    MaestroError::state("play", format!("task join error: {e}"))
                })?;
                if let Some(p) = &progress {
                    p.report(ProgressEvent::ContainerFinished { ok: result.is_ok() });
                }
                if result.is_err() {
                    layer_failed = true;
                }
                outcomes.push(PlayOutcome {
                    instance: instance_name,
                    result,
                });
            }

            if layer_failed && self.settings.fail_fast {
                break;
            }
        }

        if let Some(p) = &progress {
            p.report(ProgressEvent::PlayFinished);
        }
        Ok(outcomes)
    }
}
