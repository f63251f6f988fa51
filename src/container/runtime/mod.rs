//! Container runtime trait and the closed enum dispatched through it,
//! mirroring the virt engine's backend pattern.

pub mod docker;
pub mod podman;

use async_trait::async_trait;

use crate::container::{ContainerInfo, RunRequest};
use crate::error::Result;
use crate::process::Output;

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    fn name(&self) -> &'static str;

    async fn is_available(&self) -> bool;

    async fn run(&self, req: &RunRequest) -> Result<String>;

    async fn exec(&self, container: &str, command: &[&str]) -> Result<Output>;

    async fn cp(&self, src: &str, dst: &str) -> Result<()>;

    /// Streams log bytes; `follow=false` returns once the buffered output
    /// is captured
    async fn logs(&self, container: &str, follow: bool) -> Result<Output>;

    async fn ps(&self) -> Result<Vec<ContainerInfo>>;

    async fn rm(&self, container: &str, force: bool) -> Result<()>;

    async fn start(&self, container: &str) -> Result<()>;

    async fn stop(&self, container: &str) -> Result<()>;
}

/// The runtime selected once per process and cached for its lifetime
///
pub enum Runtime {
    Docker(docker::DockerRuntime),
    Podman(podman::PodmanRuntime),
}

impl Runtime {
    /// Docker first if its daemon responds to `version`, otherwise
    /// Podman. First match wins.
    pub async fn detect() -> Result<Self> {
        let docker = docker::DockerRuntime::new();
        if docker.is_available().await {
            return Ok(Runtime::Docker(docker));
        }
        let podman = podman::PodmanRuntime::new();
        if podman.is_available().await {
            return Ok(Runtime::Podman(podman));
        }
        Err(crate::error::Error::backend_unavailable(
            "container",
            "neither docker nor podman responded on this host",
        ))
    }

    pub fn as_trait(&self) -> &dyn ContainerRuntime {
        match self {
            Runtime::Docker(r) => r,
            Runtime::Podman(r) => r,
        }
    }
}
