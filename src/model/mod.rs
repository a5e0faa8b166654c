//! The environment document's object model: ships, registries, services,
//! and container instances.

pub mod environment;
pub mod instance;
pub mod registry;
pub mod service;
pub mod ship;

pub use environment::{Environment, EnvironmentDoc};
pub use instance::Instance;
pub use registry::Registry;
pub use service::Service;
pub use ship::Ship;
