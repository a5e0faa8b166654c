//! In-memory `ShipDocker` double used by this crate's own tests and
//! available to downstream consumers for theirs.

use super::{CreateSpec, ExecOutput, ObservedContainer, ObservedStatus, ShipDocker};
use crate::error::{MaestroError, MaestroResult};
use crate::model::registry::Registry;
use async_trait::async_trait;
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
struct FakeContainer {
    status: ObservedStatus,
    image: String,
    labels: IndexMap<String, String>,
}

/// A fully in-process `ShipDocker`: containers live in a `Mutex<HashMap>`,
/// `pull`/`login` always succeed, `exec` always returns exit code 0. Tests
/// can pre-seed state via [`FakeShipDocker::seed`] to exercise drift and
/// reconciliation paths without a real daemon.
#[derive(Debug, Default)]
pub struct FakeShipDocker {
    containers: Mutex<HashMap<String, FakeContainer>>,
    next_id: Mutex<u64>,
    fail_create: Mutex<HashSet<String>>,
}

impl FakeShipDocker {
    /// A fake with no containers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed a container as if it had already been created.
    pub fn seed(&self, name: &str, status: ObservedStatus, image: &str) {
        self.containers.lock().unwrap().insert(
            name.to_string(),
            FakeContainer {
                status,
                image: image.to_string(),
                labels: IndexMap::new(),
            },
        );
    }

    /// Make `create` fail for `name` with a daemon error, as if the ship's
    /// daemon rejected the request.
    pub fn fail_create_for(&self, name: &str) {
        self.fail_create.lock().unwrap().insert(name.to_string());
    }

    /// Pre-seed a container with specific labels, for drift-sensitive tests
    /// that need the observed container to exactly match a `CreateSpec`.
    pub fn seed_with_labels(
        &self,
        name: &str,
        status: ObservedStatus,
        image: &str,
        labels: IndexMap<String, String>,
    ) {
        self.containers.lock().unwrap().insert(
            name.to_string(),
            FakeContainer {
                status,
                image: image.to_string(),
                labels,
            },
        );
    }
}

#[async_trait]
impl ShipDocker for FakeShipDocker {
    async fn inspect(&self, name: &str) -> MaestroResult<Option<ObservedContainer>> {
        let containers = self.containers.lock().unwrap();
        Ok(containers.get(name).map(|c| ObservedContainer {
            id: name.to_string(),
            status: c.status,
            image: c.image.clone(),
            labels: c.labels.clone(),
        }))
    }

    async fn create(&self, spec: &CreateSpec) -> MaestroResult<String> {
        if self.fail_create.lock().unwrap().contains(&spec.name) {
            return Err(MaestroError::daemon("fake", format!("create rejected for {}", spec.name)));
        }
        let mut id = self.next_id.lock().unwrap();
        *id += 1;
        self.containers.lock().unwrap().insert(
            spec.name.clone(),
            FakeContainer {
                status: ObservedStatus::Created,
                image: spec.image.clone(),
                labels: spec.labels.clone(),
            },
        );
        Ok(spec.name.clone())
    }

    async fn start(&self, name: &str) -> MaestroResult<()> {
        let mut containers = self.containers.lock().unwrap();
        match containers.get_mut(name) {
            Some(c) => {
                c.status = ObservedStatus::Running;
                Ok(())
            }
            None => Err(MaestroError::state(name, "cannot start: absent")),
        }
    }

    async fn stop(&self, name: &str, _timeout: Duration) -> MaestroResult<()> {
        let mut containers = self.containers.lock().unwrap();
        match containers.get_mut(name) {
            Some(c) => {
                c.status = ObservedStatus::Stopped;
                Ok(())
            }
            None => Err(MaestroError::state(name, "cannot stop: absent")),
        }
    }

    async fn kill(&self, name: &str) -> MaestroResult<()> {
        self.stop(name, Duration::from_secs(0)).await
    }

    async fn remove(&self, name: &str) -> MaestroResult<()> {
        self.containers.lock().unwrap().remove(name);
        Ok(())
    }

    async fn logs(&self, name: &str, _tail: Option<usize>) -> MaestroResult<String> {
        if self.containers.lock().unwrap().contains_key(name) {
            Ok(String::new())
        } else {
            Err(MaestroError::state(name, "cannot fetch logs: absent"))
        }
    }

    async fn pull(&self, _image: &str, _registry: Option<&Registry>) -> MaestroResult<()> {
        Ok(())
    }

    async fn login(&self, _registry: &Registry) -> MaestroResult<()> {
        Ok(())
    }

    async fn exec(&self, name: &str, _command: &[String]) -> MaestroResult<ExecOutput> {
        if self.containers.lock().unwrap().contains_key(name) {
            Ok(ExecOutput {
                exit_code: 0,
                output: String::new(),
            })
        } else {
            Err(MaestroError::state(name, "cannot exec: absent"))
        }
    }
}
