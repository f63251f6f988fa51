//! `compose` sub-detection: its own priority probe, independent of the
//! `run`-family runtime choice.

use crate::error::{Error, Result};
use crate::process;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeCommand {
    DockerComposeV2,
    DockerComposeV1,
    PodmanCompose,
}

impl ComposeCommand {
    pub fn program_and_prefix(&self) -> (&'static str, &'static [&'static str]) {
        match self {
            ComposeCommand::DockerComposeV2 => ("docker", &["compose"]),
            ComposeCommand::DockerComposeV1 => ("docker-compose", &[]),
            ComposeCommand::PodmanCompose => ("podman-compose", &[]),
        }
    }
}

/// Probes `docker compose` v2, then `docker-compose` v1, then
/// `podman-compose`. First match wins.
pub async fn detect() -> Result<ComposeCommand> {
    if process::run_default("docker", &["compose", "version"])
        .await
        .map(|o| o.success())
        .unwrap_or(false)
    {
        return Ok(ComposeCommand::DockerComposeV2);
    }
    if crate::sysdetect::resolve_binary("docker-compose").is_some() {
        return Ok(ComposeCommand::DockerComposeV1);
    }
    if crate::sysdetect::resolve_binary("podman-compose").is_some() {
        return Ok(ComposeCommand::PodmanCompose);
    }
    Err(Error::backend_unavailable(
        "compose",
        "none of `docker compose`, `docker-compose`, or `podman-compose` were found",
    ))
}

/// Runs `compose <args...>` against the detected tool in `dir`.
pub async fn run(cmd: ComposeCommand, args: &[&str], dir: &std::path::Path) -> Result<process::Output> {
    let (program, prefix) = cmd.program_and_prefix();
    let mut full: Vec<&str> = prefix.to_vec();
    full.extend(["--project-directory", dir.to_str().unwrap_or(".")]);
    full.extend(args);
    process::run_default(program, &full).await
}
