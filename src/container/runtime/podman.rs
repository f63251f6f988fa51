//! Podman runtime adapter. Shares Docker's CLI surface closely enough
//! that only flag translation for podman-specific hints differs.

use async_trait::async_trait;

use crate::container::runtime::docker::parse_ps_table;
use crate::container::runtime::ContainerRuntime;
use crate::container::{ContainerInfo, RunRequest};
use crate::error::{Error, Result};
use crate::process::{self, Output};

pub struct PodmanRuntime {
    binary: String,
}

impl PodmanRuntime {
    pub fn new() -> Self {
        Self {
            binary: "podman".to_string(),
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
        if req.podman_hints.rootless {
            args.push("--userns=keep-id".to_string());
        }
        if let Some(pod) = &req.podman_hints.pod {
            args.push("--pod".to_string());
            args.push(pod.clone());
        }
        args.extend(req.extra_args.iter().cloned());
        args.push(req.image.clone());
        args.extend(req.command.iter().cloned());
        args
    }
}

impl Default for PodmanRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerRuntime for PodmanRuntime {
    fn name(&self) -> &'static str {
        "podman"
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::PodmanHints;

    #[test]
    fn rootless_hint_adds_userns_flag() {
        let runtime = PodmanRuntime::new();
        let req = RunRequest {
            image: "ubuntu:22.04".to_string(),
            podman_hints: PodmanHints {
                rootless: true,
                pod: None,
            },
            ..Default::default()
        };
        let args = runtime.build_run_args(&req);
        assert!(args.contains(&"--userns=keep-id".to_string()));
    }
}
