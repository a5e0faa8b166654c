//! # maestro-core
//!
//! A dependency-aware, parallel orchestration engine for fleets of Docker
//! hosts: declare ships (daemons), services, and their container
//! instances in an environment document, and drive them through start,
//! stop, kill, restart, and pull with ordering derived from declared
//! dependencies rather than manual scripting.
//!
//! ## Architecture
//!
//! - [`model`] - the environment document's object model: ships,
//!   registries, services, instances, and the validated [`model::Environment`]
//!   aggregate.
//! - [`graph`] - the service-level dependency graph: cycle detection and
//!   layered, parallel-safe ordering.
//! - [`envproject`] - environment-variable projection from a service's
//!   dependencies into the flat map handed to the daemon.
//! - [`lifecycle`] - readiness probes (`tcp`, `http`, `exec`, `rexec`,
//!   `sleep`) that gate a transition's success.
//! - [`state_machine`] - the pure observed-to-desired container
//!   reconciliation function, plus image-pull coalescing.
//! - [`adapter`] - the [`adapter::ShipDocker`] capability interface and its
//!   reference CLI-backed implementation.
//! - [`play`] - the layered scheduler that actually drives an action over
//!   a set of services.
//! - [`observer`] - audit and progress observation, decoupled from
//!   scheduling.
//! - [`executor`] - the async process-exec primitive the CLI adapter and
//!   `exec` checks both build on.
//! - [`error`] - the crate's error type.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod adapter;
pub mod envproject;
pub mod error;
pub mod executor;
pub mod graph;
pub mod lifecycle;
pub mod model;
pub mod observer;
pub mod play;
pub mod state_machine;
pub mod utils;

pub use error::{MaestroError, MaestroResult};
pub use graph::{DependencyGraph, Direction};
pub use model::{Environment, EnvironmentDoc, Instance, Registry, Service, Ship};
pub use play::{Action, Play, PlaySettings};
