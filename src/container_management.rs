//! Container management subsystem.
//!
//! Two layers: [`ContainerDriver`] is a thin capability over the Docker
//! engine (create/start/stop/remove, exec create/start/inspect, image
//! inspect/build, list by label) that performs no retries and no
//! policy; [`ContainerManager`] builds challenge containers on top of
//! it — read-only challenge mounts, resource limits, ownership labels,
//! setup and validation script execution, and best-effort teardown.
//!
//! Re-exports:
//! - [`ContainerManager`]: main entry point for challenge containers.
//! - [`ContainerDriver`], [`DockerDriver`]: engine capability and its
//!   Docker implementation.
//! - [`ContainerSpec`], [`ExecSpec`], [`ExecStatus`], [`ExecStream`]:
//!   core types.

pub mod container_manager;
pub mod docker_driver;
#[cfg(test)]
pub mod test_support;
pub mod types;

pub use container_manager::ContainerManager;
pub use docker_driver::{ContainerDriver, DockerDriver};
pub use types::{BindMount, ContainerSpec, ExecSpec, ExecStatus, ExecStream};
