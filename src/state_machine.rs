//! Container state machine: a pure `reconcile` function from observed to
//! desired state (Absent/Created/Running/Stopped), a
//! `StateMachine` that drives the resulting operations through a
//! `ShipDocker`, and an `ImagePullCoordinator` that coalesces concurrent
//! pulls of the same image on the same ship into one daemon call.

use crate::adapter::{CreateSpec, ObservedContainer, ObservedStatus, ShipDocker};
use crate::error::{MaestroError, MaestroResult};
use crate::model::registry::Registry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// The state a reconciliation pass is trying to reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesiredState {
    /// The container should exist and be running.
    Running,
    /// The container should exist but not be running.
    Stopped,
    /// The container should not exist.
    Absent,
}

/// A single daemon-facing step `StateMachine::drive` executes in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonOp {
    /// Pull the image before creating.
    Pull,
    /// Create the container from the desired spec.
    Create,
    /// Start a created (or freshly created) container.
    Start,
    /// Stop a running container.
    Stop,
    /// Remove an existing container.
    Remove,
    /// Nothing to do: already at the desired state with no drift.
    NoOp,
}

/// Whether `observed`'s image/labels have drifted from `spec`, meaning the
/// container must be recreated rather than just started/stopped in place.
fn has_drifted(observed: &ObservedContainer, spec: &CreateSpec) -> bool {
    observed.image != spec.image || observed.labels != spec.labels
}

/// Decide the daemon operations needed to take a container from `observed`
/// (`None` means absent) to `desired`, given the [`CreateSpec`] it would be
/// created or recreated from. Pure and synchronous so it is exhaustively
/// testable without a daemon.
#[must_use]
pub fn reconcile(
    observed: Option<&ObservedContainer>,
    desired: DesiredState,
    spec: &CreateSpec,
) -> Vec<DaemonOp> {
    use DaemonOp::{Create, NoOp, Pull, Remove, Start, Stop};
    use DesiredState::{Absent, Running, Stopped};

    match (observed, desired) {
        (None, Absent) => vec![],
        (None, Stopped) => vec![Pull, Create],
        (None, Running) => vec![Pull, Create, Start],

        (Some(_), Absent) => {
            vec![Stop, Remove]
        }

        (Some(c), Running) if c.status == ObservedStatus::Running && !has_drifted(c, spec) => {
            vec![NoOp]
        }
        (Some(c), Running) if has_drifted(c, spec) => {
            vec![Stop, Remove, Pull, Create, Start]
        }
        (Some(_), Running) => vec![Start],

        (Some(c), Stopped)
            if matches!(c.status, ObservedStatus::Stopped | ObservedStatus::Created)
                && !has_drifted(c, spec) =>
        {
            vec![NoOp]
        }
        (Some(c), Stopped) if has_drifted(c, spec) => {
            vec![Stop, Remove, Pull, Create]
        }
        (Some(_), Stopped) => vec![Stop],
    }
}

/// Whether a `DaemonOp::Stop` step should signal a graceful TERM (honoring
/// `stopTimeout`) or an immediate KILL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMode {
    /// TERM, escalating to KILL only after `stopTimeout` elapses.
    Graceful,
    /// KILL immediately.
    Immediate,
}

/// Drives the operations `reconcile` decided through a `ShipDocker`.
pub struct StateMachine<'a> {
    adapter: &'a dyn ShipDocker,
}

impl<'a> StateMachine<'a> {
    /// Build a state machine driving `adapter`.
    #[must_use]
    pub fn new(adapter: &'a dyn ShipDocker) -> Self {
        Self { adapter }
    }

    /// Run `ops` against `spec`, pulling through `pulls` (so concurrent
    /// reconciliations of other instances on the same image coalesce).
    pub async fn drive(
        &self,
        ops: &[DaemonOp],
        spec: &CreateSpec,
        ship: &str,
        registry: Option<&Registry>,
        stop_timeout: Duration,
        pulls: &ImagePullCoordinator,
        stop_mode: StopMode,
    ) -> MaestroResult<()> {
        for op in ops {
            match op {
                DaemonOp::NoOp => {
                    debug!(container = %spec.name, "already at desired state");
                }
                DaemonOp::Pull => {
                    pulls.pull(self.adapter, ship, &spec.image, registry).await?;
                }
                DaemonOp::Create => {
                    info!(container = %spec.name, "creating");
                    self.adapter.create(spec).await?;
                }
                DaemonOp::Start => {
                    info!(container = %spec.name, "starting");
                    self.adapter.start(&spec.name).await?;
                }
                DaemonOp::Stop => match stop_mode {
                    StopMode::Graceful => {
                        info!(container = %spec.name, "stopping");
                        if let Err(e) = self.adapter.stop(&spec.name, stop_timeout).await {
                            debug!(container = %spec.name, error = %e, "stop failed, already absent?");
                        }
                    }
                    StopMode::Immediate => {
                        info!(container = %spec.name, "killing");
                        if let Err(e) = self.adapter.kill(&spec.name).await {
                            debug!(container = %spec.name, error = %e, "kill failed, already absent?");
                        }
                    }
                },
                DaemonOp::Remove => {
                    info!(container = %spec.name, "removing");
                    if let Err(e) = self.adapter.remove(&spec.name).await {
                        debug!(container = %spec.name, error = %e, "remove failed, already absent?");
                    }
                }
            }
        }
        Ok(())
    }
}

type PullKey = (String, String);
type PullSlot = Arc<OnceCell<Result<(), String>>>;

/// Coalesces concurrent pulls of the same `(ship, image)` pair into a
/// single daemon call: every caller for the same key awaits the same
/// in-flight pull rather than issuing redundant ones.
#[derive(Debug, Default)]
pub struct ImagePullCoordinator {
    inflight: DashMap<PullKey, PullSlot>,
}

impl ImagePullCoordinator {
    /// An empty coordinator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pull `image` on `ship`, joining any already in-flight pull of the
    /// same pair instead of starting a second one.
    pub async fn pull(
        &self,
        adapter: &dyn ShipDocker,
        ship: &str,
        image: &str,
        registry: Option<&Registry>,
    ) -> MaestroResult<()> {
        let key = (ship.to_string(), image.to_string());
        let slot = {
            self.inflight
                .entry(key)
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .value()
                .clone()
        };
        let result = slot
            .get_or_init(|| async move { adapter.pull(image, registry).await.map_err(|e| e.to_string()) })
            .await;
        result
            .clone()
            .map_err(|message| MaestroError::image(ship, image, message))
    }
}
