//! VirtualBox backend: drives `VBoxManage` as a subprocess.

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::process;
use crate::virt::backend::{CreateSpec, VmBackend};
use crate::virt::descriptor::VmState;
use crate::virt::snapshot::Snapshot;

pub struct VirtualBoxBackend {
    binary: String,
}

impl Default for VirtualBoxBackend {
    fn default() -> Self {
        Self {
            binary: "VBoxManage".to_string(),
        }
    }
}

impl VirtualBoxBackend {
    pub fn new() -> Self {
        Self::default()
    }

    async fn showvminfo(&self, name: &str) -> Result<process::Output> {
        process::run_default(&self.binary, &["showvminfo", name, "--machinereadable"]).await
    }
}

#[async_trait]
impl VmBackend for VirtualBoxBackend {
    fn name(&self) -> &'static str {
        "virtualbox"
    }

    async fn is_available(&self) -> bool {
        crate::sysdetect::resolve_binary(&self.binary).is_some()
    }

    async fn version(&self) -> Result<String> {
        let out = process::run_default(&self.binary, &["--version"]).await?;
        Ok(out.stdout_str().trim().to_string())
    }

    async fn create(&self, spec: &CreateSpec<'_>) -> Result<()> {
        let out = process::run_default(
            &self.binary,
            &["createvm", "--name", spec.name, "--ostype", spec.os_type, "--register"],
        )
        .await?;
        if !out.success() {
            return Err(Error::validation(spec.name, out.stderr_str()));
        }

        let memory_mb = (spec.ram_bytes / (1024 * 1024)).to_string();
        let cpus = spec.cpus.to_string();
        process::run_default(
            &self.binary,
            &[
                "modifyvm",
                spec.name,
                "--memory",
                &memory_mb,
                "--cpus",
                &cpus,
            ],
        )
        .await?;

        if spec.os_type == "windows10" || spec.os_type == "windows11" {
            let mut efi_args = vec!["modifyvm", spec.name, "--firmware", "efi"];
            if spec.os_type == "windows11" {
                efi_args.extend(["--tpm-type", "2.0", "--secure-boot", "on"]);
            }
            process::run_default(&self.binary, &efi_args).await?;
        }

        let size_mb = (spec.disk_bytes / (1024 * 1024)).to_string();
        let out = process::run_default(
            &self.binary,
            &[
                "createmedium",
                "disk",
                "--filename",
                spec.disk_path.to_str().unwrap_or_default(),
                "--size",
                &size_mb,
                "--format",
                "VDI",
            ],
        )
        .await?;
        if !out.success() {
            return Err(Error::validation(spec.name, out.stderr_str()));
        }
        Ok(())
    }

    async fn start(&self, name: &str) -> Result<()> {
        if self.state(name).await? == VmState::Running {
            return Ok(());
        }
        let out = process::run_default(&self.binary, &["startvm", name, "--type", "headless"]).await?;
        if out.success() {
            Ok(())
        } else {
            Err(Error::backend_unavailable("virtualbox", out.stderr_str()))
        }
    }

    async fn stop(&self, name: &str, force: bool) -> Result<()> {
        let verb = if force { "poweroff" } else { "acpipowerbutton" };
        let out = process::run_default(&self.binary, &["controlvm", name, verb]).await?;
        if !force {
            for _ in 0..30 {
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                if self.state(name).await? != VmState::Running {
                    return Ok(());
                }
            }
            let out = process::run_default(&self.binary, &["controlvm", name, "poweroff"]).await?;
            return if out.success() {
                Ok(())
            } else {
                Err(Error::backend_unavailable("virtualbox", out.stderr_str()))
            };
        }
        if out.success() || out.stderr_str().contains("not currently running") {
            Ok(())
        } else {
            Err(Error::backend_unavailable("virtualbox", out.stderr_str()))
        }
    }

    async fn suspend(&self, name: &str) -> Result<()> {
        let out = process::run_default(&self.binary, &["controlvm", name, "savestate"]).await?;
        if out.success() {
            Ok(())
        } else {
            Err(Error::backend_unavailable("virtualbox", out.stderr_str()))
        }
    }

    async fn resume(&self, name: &str) -> Result<()> {
        self.start(name).await
    }

    async fn delete(&self, name: &str, keep_disk: bool) -> Result<()> {
        self.stop(name, true).await.ok();
        let mut args = vec!["unregistervm", name];
        if !keep_disk {
            args.push("--delete");
        }
        let out = process::run_default(&self.binary, &args).await?;
        if out.success() {
            Ok(())
        } else {
            Err(Error::not_found("vm", name))
        }
    }

    async fn state(&self, name: &str) -> Result<VmState> {
        let out = match self.showvminfo(name).await {
            Ok(out) => out,
            Err(_) => return Ok(VmState::NotFound),
        };
        if !out.success() {
            if out.stderr_str().to_lowercase().contains("access") {
                return Ok(VmState::Error);
            }
            return Ok(VmState::NotFound);
        }
        let text = out.stdout_str();
        let state_line = text
            .lines()
            .find(|l| l.starts_with("VMState="))
            .unwrap_or("VMState=\"unknown\"");
        let value = state_line
            .split('=')
            .nth(1)
            .unwrap_or("\"unknown\"")
            .trim_matches('"');
        Ok(match value {
            "running" => VmState::Running,
            "poweroff" | "aborted" => VmState::Stopped,
            "saved" => VmState::Suspended,
            "starting" => VmState::Starting,
            "stopping" => VmState::Stopping,
            _ => VmState::Unknown,
        })
    }

    async fn ip_address(&self, name: &str) -> Result<String> {
        let out = process::run_default(
            &self.binary,
            &["guestproperty", "get", name, "/VirtualBox/GuestInfo/Net/0/V4/IP"],
        )
        .await?;
        let text = out.stdout_str();
        text.strip_prefix("Value: ")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::not_found("vm-ip-lease", name))
    }

    async fn snapshot_create(&self, name: &str, snapshot: &str, description: Option<&str>) -> Result<()> {
        let mut args = vec!["snapshot", name, "take", snapshot];
        if let Some(desc) = description {
            args.extend(["--description", desc]);
        }
        let out = process::run_default(&self.binary, &args).await?;
        if out.success() {
            Ok(())
        } else {
            Err(Error::validation(snapshot, out.stderr_str()))
        }
    }

    async fn snapshot_list(&self, name: &str) -> Result<Vec<Snapshot>> {
        let out = process::run_default(&self.binary, &["snapshot", name, "list", "--machinereadable"]).await?;
        Ok(Snapshot::parse_vboxmanage_list(&out.stdout_str()))
    }

    async fn snapshot_revert(&self, name: &str, snapshot: &str) -> Result<()> {
        if self.state(name).await? == VmState::Running {
            self.stop(name, true).await?;
        }
        let out = process::run_default(&self.binary, &["snapshot", name, "restore", snapshot]).await?;
        if out.success() {
            Ok(())
        } else {
            Err(Error::validation(snapshot, out.stderr_str()))
        }
    }

    async fn snapshot_delete(&self, name: &str, snapshot: &str) -> Result<()> {
        let out = process::run_default(&self.binary, &["snapshot", name, "delete", snapshot]).await?;
        if out.success() {
            Ok(())
        } else {
            Err(Error::validation(snapshot, out.stderr_str()))
        }
    }
}
