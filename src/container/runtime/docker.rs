//! Docker runtime adapter.

use async_trait::async_trait;
use tracing::warn;

use crate::container::{ContainerInfo, PublishedPort, RunRequest};
use crate::error::{Error, Result};
use crate::process::{self, Output};
use crate::container::runtime::ContainerRuntime;

pub struct DockerRuntime {
    binary: String,
}

impl DockerRuntime {
    pub fn new() -> Self {
        Self {
            binary: "docker".to_string(),
        }
    }

    fn build_run_args(&self, req: &RunRequest) -> Vec<String> {
        let mut args = vec!["run".to_string()];
        if req.detach {
            args.push("-d".to_string());
        }
        if req.interactive {
            args.push("-i".to_string());
        }
        if req.tty {
            args.push("-t".to_string());
        }
        if let Some(name) = &req.name {
            args.push("--name".to_string());
            args.push(name.clone());
        }
        for p in &req.publish {
            args.push("-p".to_string());
            args.push(p.clone());
        }
        for v in &req.volumes {
            args.push("-v".to_string());
            args.push(v.clone());
        }
        for e in &req.env {
            args.push("-e".to_string());
            args.push(e.clone());
        }
        if req.podman_hints.rootless || req.podman_hints.pod.is_some() {
            warn!("podman-specific hints (rootless/pod) are ignored under the docker runtime");
        }
        args.extend(req.extra_args.iter().cloned());
        args.push(req.image.clone());
        args.extend(req.command.iter().cloned());
        args
    }
}

impl Default for DockerRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn is_available(&self) -> bool {
        crate::sysdetect::resolve_binary(&self.binary).is_some()
            && process::run_default(&self.binary, &["version"]).await.map(|o| o.success()).unwrap_or(false)
    }

    async fn run(&self, req: &RunRequest) -> Result<String> {
        let args = self.build_run_args(req);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let out = process::run_default(&self.binary, &arg_refs).await?;
        if out.success() {
            Ok(out.stdout_str().trim().to_string())
        } else {
            Err(Error::validation(req.image.clone(), out.stderr_str()))
        }
    }

    async fn exec(&self, container: &str, command: &[&str]) -> Result<Output> {
        let mut args = vec!["exec", container];
        args.extend(command);
        process::run_default(&self.binary, &args).await
    }

    async fn cp(&self, src: &str, dst: &str) -> Result<()> {
        let out = process::run_default(&self.binary, &["cp", src, dst]).await?;
        if out.success() {
            Ok(())
        } else {
            Err(Error::validation(src, out.stderr_str()))
        }
    }

    async fn logs(&self, container: &str, follow: bool) -> Result<Output> {
        let mut args = vec!["logs"];
        if follow {
            args.push("--follow");
        }
        args.push(container);
        process::run_default(&self.binary, &args).await
    }

    async fn ps(&self) -> Result<Vec<ContainerInfo>> {
        let out = process::run_default(
            &self.binary,
            &["ps", "-a", "--format", "{{.ID}}\t{{.Names}}\t{{.Image}}\t{{.Status}}\t{{.Ports}}\t{{.CreatedAt}}\t{{.Command}}"],
        )
        .await?;
        Ok(parse_ps_table(&out.stdout_str()))
    }

    async fn rm(&self, container: &str, force: bool) -> Result<()> {
        let mut args = vec!["rm"];
        if force {
            args.push("-f");
        }
        args.push(container);
        let out = process::run_default(&self.binary, &args).await?;
        if out.success() {
            Ok(())
        } else {
            Err(Error::not_found("container", container))
        }
    }

    async fn start(&self, container: &str) -> Result<()> {
        let out = process::run_default(&self.binary, &["start", container]).await?;
        if out.success() {
            Ok(())
        } else {
            Err(Error::not_found("container", container))
        }
    }

    async fn stop(&self, container: &str) -> Result<()> {
        let out = process::run_default(&self.binary, &["stop", container]).await?;
        if out.success() {
            Ok(())
        } else {
            Err(Error::not_found("container", container))
        }
    }
}

/// Shared by both runtimes: Docker and Podman's `--format` table output
/// for `ps` are tab-separated in the same column order.
pub(crate) fn parse_ps_table(output: &str) -> Vec<ContainerInfo> {
    output
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|line| {
            let cols: Vec<&str> = line.split('\t').collect();
            if cols.len() < 7 {
                return None;
            }
            Some(ContainerInfo {
                id: cols[0].to_string(),
                name: cols[1].to_string(),
                image: cols[2].to_string(),
                status: cols[3].to_string(),
                published_ports: parse_ports(cols[4]),
                created_at: cols[5].to_string(),
                command: cols[6].trim_matches('"').to_string(),
            })
        })
        .collect()
}

fn parse_ports(raw: &str) -> Vec<PublishedPort> {
    raw.split(',')
        .filter_map(|chunk| {
            let chunk = chunk.trim();
            let (host, rest) = chunk.split_once("->")?;
            let host_port: u16 = host.rsplit(':').next()?.parse().ok()?;
            let (container_part, protocol) = rest.split_once('/').unwrap_or((rest, "tcp"));
            let container_port: u16 = container_part.parse().ok()?;
            Some(PublishedPort {
                host_port,
                container_port,
                protocol: protocol.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_run_args_translates_uniform_flags() {
        let runtime = DockerRuntime::new();
        let req = RunRequest {
            image: "ubuntu:22.04".to_string(),
            name: Some("t1".to_string()),
            detach: true,
            publish: vec!["8080:80".to_string()],
            command: vec!["sleep".to_string(), "3600".to_string()],
            ..Default::default()
        };
        let args = runtime.build_run_args(&req);
        assert!(args.contains(&"-d".to_string()));
        assert!(args.contains(&"--name".to_string()));
        assert_eq!(args.last().unwrap(), "3600");
    }

    #[test]
    fn parses_published_port_list() {
        let ports = parse_ports("0.0.0.0:8080->80/tcp, 0.0.0.0:2222->22/tcp");
        assert_eq!(ports.len(), 2);
        assert_eq!(ports[0].host_port, 8080);
        assert_eq!(ports[1].container_port, 22);
    }
}
