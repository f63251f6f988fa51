//! QEMU/KVM backend: drives `qemu-img` and `qemu-system-*` as
//! subprocesses. Unlike a hosted hypervisor embedded via ioctls, every
//! lifecycle verb here shells out and parses the result.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::process::{self, DEFAULT_EXEC_TIMEOUT};
use crate::virt::backend::{CreateSpec, VmBackend};
use crate::virt::descriptor::VmState;
use crate::virt::snapshot::Snapshot;

/// Fixed search list for the OVMF CODE/VARS pflash pair, consulted when
/// `os-type` requires UEFI
const OVMF_SEARCH_PATHS: &[(&str, &str)] = &[
    (
        "/usr/share/OVMF/OVMF_CODE.fd",
        "/usr/share/OVMF/OVMF_VARS.fd",
    ),
    (
        "/usr/share/edk2/ovmf/OVMF_CODE.fd",
        "/usr/share/edk2/ovmf/OVMF_VARS.fd",
    ),
    (
        "/usr/share/qemu/OVMF_CODE.fd",
        "/usr/share/qemu/OVMF_VARS.fd",
    ),
];

pub struct QemuBackend {
    binary: String,
    img_binary: String,
    /// `PortunixHome::vms_dir()` — every per-VM path this backend touches
    /// is rooted here rather than under the process's current directory,
    /// so lifecycle calls agree with where `VirtManager` created the VM.
    vms_dir: PathBuf,
}

impl QemuBackend {
    pub fn new(vms_dir: PathBuf) -> Self {
        Self {
            binary: "qemu-system-x86_64".to_string(),
            img_binary: "qemu-img".to_string(),
            vms_dir,
        }
    }

    fn pid_file(disk_dir: &Path) -> PathBuf {
        disk_dir.join("pid")
    }

    fn monitor_socket(disk_dir: &Path) -> PathBuf {
        disk_dir.join("monitor.sock")
    }

    /// Reads the pid sidecar and checks liveness. A stale pid (process
    /// gone) is treated as `stopped`
    fn read_live_pid(disk_dir: &Path) -> Option<u32> {
        let raw = std::fs::read_to_string(Self::pid_file(disk_dir)).ok()?;
        let pid: u32 = raw.trim().parse().ok()?;
        #[cfg(unix)]
        {
            let alive = nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None).is_ok();
            alive.then_some(pid)
        }
        #[cfg(not(unix))]
        {
            Some(pid)
        }
    }

    fn disk_dir_for(&self, name: &str) -> PathBuf {
        self.vms_dir.join(name)
    }

    /// Resolves (and copies the VARS template if missing) the OVMF pair
    /// for a Windows 10/11 `os-type`.
    fn resolve_ovmf(&self, vm_dir: &Path) -> Result<(PathBuf, PathBuf)> {
        for (code, vars_template) in OVMF_SEARCH_PATHS {
            let code = PathBuf::from(code);
            let vars_template = PathBuf::from(vars_template);
            if code.exists() && vars_template.exists() {
                let vars_copy = vm_dir.join("OVMF_VARS.fd");
                if !vars_copy.exists() {
                    std::fs::copy(&vars_template, &vars_copy)
                        .map_err(|e| Error::io(vars_copy.display().to_string(), e))?;
                }
                return Ok((code, vars_copy));
            }
        }
        Err(Error::backend_unavailable(
            "qemu",
            "no OVMF CODE/VARS pair found on this host; install an OVMF/edk2 package",
        ))
    }

    fn needs_efi(os_type: &str) -> bool {
        os_type == "windows10" || os_type == "windows11"
    }

    fn needs_tpm(os_type: &str) -> bool {
        os_type == "windows11"
    }
}

#[async_trait]
impl VmBackend for QemuBackend {
    fn name(&self) -> &'static str {
        "qemu"
    }

    async fn is_available(&self) -> bool {
        crate::sysdetect::resolve_binary(&self.binary).is_some()
            && crate::sysdetect::resolve_binary(&self.img_binary).is_some()
    }

    async fn version(&self) -> Result<String> {
        let out = process::run_default(&self.binary, &["--version"]).await?;
        Ok(out.stdout_str().lines().next().unwrap_or_default().to_string())
    }

    async fn create(&self, spec: &CreateSpec<'_>) -> Result<()> {
        if spec.disk_path.exists() {
            return Err(Error::validation(
                spec.name,
                format!("disk image already exists at {}", spec.disk_path.display()),
            ));
        }
        let size_arg = format!("{}", spec.disk_bytes);
        let out = process::run_default(
            &self.img_binary,
            &[
                "create",
                "-f",
                "qcow2",
                spec.disk_path.to_str().unwrap_or_default(),
                &size_arg,
            ],
        )
        .await?;
        if !out.success() {
            return Err(Error::backend_unavailable(
                "qemu-img",
                out.stderr_str(),
            ));
        }

        if Self::needs_efi(spec.os_type) {
            let vm_dir = spec.disk_path.parent().unwrap_or_else(|| Path::new("."));
            self.resolve_ovmf(vm_dir)?;
            if Self::needs_tpm(spec.os_type) {
                info!(vm = spec.name, "windows11: TPM 2.0 emulation will be hooked at start");
            }
        }
        Ok(())
    }

    async fn start(&self, name: &str) -> Result<()> {
        if self.state(name).await? == VmState::Running {
            return Ok(());
        }
        let disk_dir = self.disk_dir_for(name);
        let disk = disk_dir.join(format!("{name}.qcow2"));
        let pid_file = Self::pid_file(&disk_dir);

        let args = vec![
            "-daemonize".to_string(),
            "-pidfile".to_string(),
            pid_file.display().to_string(),
            "-drive".to_string(),
            format!("file={},if=virtio", disk.display()),
            "-monitor".to_string(),
            format!("unix:{},server,nowait", Self::monitor_socket(&disk_dir).display()),
        ];
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let out = process::run(&self.binary, &arg_refs, DEFAULT_EXEC_TIMEOUT).await?;
        if !out.success() {
            let _ = std::fs::remove_file(&pid_file);
            return Err(Error::backend_unavailable("qemu", out.stderr_str()));
        }
        Ok(())
    }

    async fn stop(&self, name: &str, force: bool) -> Result<()> {
        let disk_dir = self.disk_dir_for(name);
        let pid = match Self::read_live_pid(&disk_dir) {
            Some(pid) => pid,
            None => return Ok(()),
        };

        if !force {
            self.send_monitor_command(&disk_dir, "system_powerdown").await?;
            for _ in 0..30 {
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                if Self::read_live_pid(&disk_dir).is_none() {
                    let _ = std::fs::remove_file(Self::pid_file(&disk_dir));
                    return Ok(());
                }
            }
            warn!(vm = name, "graceful shutdown timed out after 30s, forcing kill");
        }

        #[cfg(unix)]
        {
            let _ = nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), nix::sys::signal::Signal::SIGKILL);
        }
        let _ = std::fs::remove_file(Self::pid_file(&disk_dir));
        Ok(())
    }

    async fn suspend(&self, name: &str) -> Result<()> {
        let disk_dir = self.disk_dir_for(name);
        self.send_monitor_command(&disk_dir, "stop").await
    }

    async fn resume(&self, name: &str) -> Result<()> {
        let disk_dir = self.disk_dir_for(name);
        self.send_monitor_command(&disk_dir, "cont").await
    }

    async fn delete(&self, name: &str, keep_disk: bool) -> Result<()> {
        self.stop(name, true).await?;
        if !keep_disk {
            let disk_dir = self.disk_dir_for(name);
            std::fs::remove_dir_all(&disk_dir).map_err(|e| Error::io(disk_dir.display().to_string(), e))?;
        }
        Ok(())
    }

    async fn state(&self, name: &str) -> Result<VmState> {
        let disk_dir = self.disk_dir_for(name);
        if !disk_dir.exists() {
            return Ok(VmState::NotFound);
        }
        Ok(match Self::read_live_pid(&disk_dir) {
            Some(_) => VmState::Running,
            None => VmState::Stopped,
        })
    }

    async fn ip_address(&self, name: &str) -> Result<String> {
        Err(Error::not_found("vm-ip-lease", name))
    }

    async fn snapshot_create(&self, name: &str, snapshot: &str, _description: Option<&str>) -> Result<()> {
        let disk_dir = self.disk_dir_for(name);
        let disk = disk_dir.join(format!("{name}.qcow2"));
        let out = process::run_default(
            &self.img_binary,
            &["snapshot", "-c", snapshot, disk.to_str().unwrap_or_default()],
        )
        .await?;
        if out.success() {
            Ok(())
        } else {
            Err(Error::validation(snapshot, out.stderr_str()))
        }
    }

    async fn snapshot_list(&self, name: &str) -> Result<Vec<Snapshot>> {
        let disk_dir = self.disk_dir_for(name);
        let disk = disk_dir.join(format!("{name}.qcow2"));
        let out = process::run_default(&self.img_binary, &["snapshot", "-l", disk.to_str().unwrap_or_default()]).await?;
        Ok(Snapshot::parse_qemu_img_list(&out.stdout_str()))
    }

    async fn snapshot_revert(&self, name: &str, snapshot: &str) -> Result<()> {
        if self.state(name).await? == VmState::Running {
            self.stop(name, true).await?;
        }
        let disk_dir = self.disk_dir_for(name);
        let disk = disk_dir.join(format!("{name}.qcow2"));
        let out = process::run_default(
            &self.img_binary,
            &["snapshot", "-a", snapshot, disk.to_str().unwrap_or_default()],
        )
        .await?;
        if out.success() {
            Ok(())
        } else {
            Err(Error::validation(snapshot, out.stderr_str()))
        }
    }

    async fn snapshot_delete(&self, name: &str, snapshot: &str) -> Result<()> {
        let disk_dir = self.disk_dir_for(name);
        let disk = disk_dir.join(format!("{name}.qcow2"));
        let out = process::run_default(
            &self.img_binary,
            &["snapshot", "-d", snapshot, disk.to_str().unwrap_or_default()],
        )
        .await?;
        if out.success() {
            Ok(())
        } else {
            Err(Error::validation(snapshot, out.stderr_str()))
        }
    }
}

impl QemuBackend {
    async fn send_monitor_command(&self, disk_dir: &Path, command: &str) -> Result<()> {
        use tokio::io::AsyncWriteExt;
        #[cfg(unix)]
        {
            let socket = Self::monitor_socket(disk_dir);
            let mut stream = tokio::net::UnixStream::connect(&socket)
                .await
                .map_err(|e| Error::io(socket.display().to_string(), e))?;
            stream
                .write_all(format!("{command}\n").as_bytes())
                .await
                .map_err(|e| Error::io(socket.display().to_string(), e))?;
            Ok(())
        }
        #[cfg(not(unix))]
        {
            let _ = (disk_dir, command);
            Err(Error::backend_unavailable("qemu", "monitor socket control requires a unix host"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn needs_efi_matches_windows_only() {
        assert!(QemuBackend::needs_efi("windows10"));
        assert!(QemuBackend::needs_efi("windows11"));
        assert!(!QemuBackend::needs_efi("ubuntu"));
    }

    #[test]
    fn needs_tpm_only_for_windows11() {
        assert!(QemuBackend::needs_tpm("windows11"));
        assert!(!QemuBackend::needs_tpm("windows10"));
    }
}
