//! Container operations layer: a uniform surface over Docker/Podman
//!

pub mod compose;
pub mod install;
pub mod pkgmgr;
pub mod runtime;
pub mod ssh;

use serde::{Deserialize, Serialize};

pub use runtime::{ContainerRuntime, Runtime};

/// Adapted `docker inspect`/`podman inspect` output — the core does not
/// own container persistence, only a stable read-through view
///
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    pub image: String,
    pub status: String,
    pub published_ports: Vec<PublishedPort>,
    pub created_at: String,
    pub command: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishedPort {
    pub host_port: u16,
    pub container_port: u16,
    pub protocol: String,
}

/// The uniform `run` request
/// Unknown flags are passed through verbatim in `extra_args`.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub image: String,
    pub name: Option<String>,
    pub detach: bool,
    pub interactive: bool,
    pub tty: bool,
    pub publish: Vec<String>,
    pub volumes: Vec<String>,
    pub env: Vec<String>,
    pub command: Vec<String>,
    /// Podman-specific hints (rootless, pods); ignored with a log line
    /// when the active runtime is Docker.
    pub podman_hints: PodmanHints,
    pub extra_args: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PodmanHints {
    pub rootless: bool,
    pub pod: Option<String>,
}
