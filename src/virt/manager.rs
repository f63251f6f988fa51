//! `VirtManager`: the single entry point for VM lifecycle operations.
//! Selects one [`Backend`] at construction and serializes concurrent
//! lifecycle calls per VM name.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex as AsyncMutex;
use tracing::info;

use crate::config::PortunixHome;
use crate::error::{Error, Result};
use crate::virt::backend::qemu::QemuBackend;
use crate::virt::backend::virtualbox::VirtualBoxBackend;
use crate::virt::backend::{Backend, CreateSpec, VmBackend};
use crate::virt::descriptor::{ByteSize, NetworkConfig, VmDescriptor, VmState};
use crate::virt::snapshot::Snapshot;

pub struct VirtManager {
    home: PortunixHome,
    backend: Backend,
    /// Per-VM-name lock registry: `Create`/`Delete` on the same name
    /// cannot overlap A plain `Mutex<HashMap<...>>` is
    /// enough here — the registry itself is touched far less often than
    /// the per-VM locks it hands out.
    locks: std::sync::Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl VirtManager {
    /// Selects the backend: QEMU/KVM if available, otherwise VirtualBox,
    /// otherwise an error, unless `pinned` names one explicitly
    ///
    pub async fn new(home: PortunixHome, pinned: Option<&str>) -> Result<Self> {
        let backend = match pinned {
            Some("qemu") => Backend::Qemu(QemuBackend::new(home.vms_dir())),
            Some("virtualbox") => Backend::VirtualBox(VirtualBoxBackend::new()),
            Some(other) => {
                return Err(Error::validation("virt-backend", format!("unknown backend '{other}'")))
            }
            None => {
                let qemu = QemuBackend::new(home.vms_dir());
                if qemu.is_available().await {
                    Backend::Qemu(qemu)
                } else {
                    let vbox = VirtualBoxBackend::new();
                    if vbox.is_available().await {
                        Backend::VirtualBox(vbox)
                    } else {
                        return Err(Error::backend_unavailable(
                            "virt",
                            "neither qemu-system-* nor VBoxManage was found on PATH",
                        ));
                    }
                }
            }
        };
        info!(backend = backend.as_trait().name(), "virt backend selected");
        Ok(Self {
            home,
            backend,
            locks: std::sync::Mutex::new(HashMap::new()),
        })
    }

    fn lock_for(&self, name: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().expect("lock registry poisoned");
        locks.entry(name.to_string()).or_default().clone()
    }

    fn descriptor_path(&self, name: &str) -> std::path::PathBuf {
        self.home.vm_dir(name).join("config.json")
    }

    fn load_descriptor(&self, name: &str) -> Result<VmDescriptor> {
        let path = self.descriptor_path(name);
        let raw = std::fs::read_to_string(&path).map_err(|_| Error::not_found("vm", name))?;
        serde_json::from_str(&raw).map_err(|e| Error::Serde {
            entity: path.display().to_string(),
            source: e,
        })
    }

    fn save_descriptor(&self, descriptor: &VmDescriptor) -> Result<()> {
        let path = self.descriptor_path(&descriptor.name);
        std::fs::create_dir_all(self.home.vm_dir(&descriptor.name)).map_err(|e| Error::io(descriptor.name.clone(), e))?;
        let json = serde_json::to_vec_pretty(descriptor).map_err(|e| Error::Serde {
            entity: descriptor.name.clone(),
            source: e,
        })?;
        crate::process::atomic_write(&path, &json)
    }

    /// Creates a VM: on success, a descriptor and a sparse disk image
    /// exist under the VM directory; on any failure, no files
    /// attributable to the VM remain
    pub async fn create(
        &self,
        name: &str,
        ram: ByteSize,
        cpus: u32,
        disk: ByteSize,
        os_type: &str,
        iso_path: Option<std::path::PathBuf>,
        network: NetworkConfig,
    ) -> Result<()> {
        VmDescriptor::validate_name(name)?;
        let guard = self.lock_for(name);
        let _permit = guard.lock().await;

        if self.descriptor_path(name).exists() {
            return Err(Error::validation(name, "a VM with this name already exists"));
        }
        if cpus == 0 {
            return Err(Error::validation(name, "cpus must be positive"));
        }

        let vm_dir = self.home.vm_dir(name);
        std::fs::create_dir_all(&vm_dir).map_err(|e| Error::io(name.to_string(), e))?;
        let disk_path = vm_dir.join(format!(
            "{name}.{}",
            if matches!(self.backend, Backend::Qemu(_)) { "qcow2" } else { "vdi" }
        ));

        let spec = CreateSpec {
            name,
            ram_bytes: ram.as_bytes(),
            cpus,
            disk_path: &disk_path,
            disk_bytes: disk.as_bytes(),
            os_type,
            iso_path: iso_path.as_deref(),
            network: &network,
        };

        if let Err(e) = self.backend.as_trait().create(&spec).await {
            let _ = std::fs::remove_dir_all(&vm_dir);
            return Err(e);
        }

        let descriptor = VmDescriptor {
            name: name.to_string(),
            ram,
            cpus,
            disk_path,
            disk_size: disk,
            os_type: os_type.to_string(),
            iso_path,
            network,
            features: HashMap::new(),
            created_at: VmDescriptor::now_unix(),
            backend: self.backend.as_trait().name().to_string(),
        };
        if let Err(e) = self.save_descriptor(&descriptor) {
            let _ = std::fs::remove_dir_all(&vm_dir);
            return Err(e);
        }
        Ok(())
    }

    pub async fn start(&self, name: &str) -> Result<()> {
        let guard = self.lock_for(name);
        let _permit = guard.lock().await;
        self.load_descriptor(name)?;
        self.backend.as_trait().start(name).await
    }

    pub async fn stop(&self, name: &str, force: bool) -> Result<()> {
        let guard = self.lock_for(name);
        let _permit = guard.lock().await;
        self.load_descriptor(name)?;
        self.backend.as_trait().stop(name, force).await
    }

    pub async fn restart(&self, name: &str, force: bool) -> Result<()> {
        let guard = self.lock_for(name);
        let _permit = guard.lock().await;
        self.load_descriptor(name)?;
        self.backend.as_trait().restart(name, force).await
    }

    pub async fn suspend(&self, name: &str) -> Result<()> {
        self.load_descriptor(name)?;
        self.backend.as_trait().suspend(name).await
    }

    pub async fn resume(&self, name: &str) -> Result<()> {
        self.load_descriptor(name)?;
        self.backend.as_trait().resume(name).await
    }

    /// `keep_disk=false` also removes the on-disk directory, returning
    /// the data directory to its pre-create state
    pub async fn delete(&self, name: &str, keep_disk: bool) -> Result<()> {
        let guard = self.lock_for(name);
        let _permit = guard.lock().await;
        self.load_descriptor(name)?;
        self.backend.as_trait().delete(name, keep_disk).await?;
        if !keep_disk {
            let vm_dir = self.home.vm_dir(name);
            if vm_dir.exists() {
                std::fs::remove_dir_all(&vm_dir).map_err(|e| Error::io(name.to_string(), e))?;
            }
        }
        Ok(())
    }

    /// Per-VM state, falling back to a secondary inspect path and never
    /// causing the caller to omit the VM
    pub async fn state(&self, name: &str) -> Result<VmState> {
        if self.load_descriptor(name).is_err() {
            return Ok(VmState::NotFound);
        }
        self.backend.as_trait().state(name).await
    }

    /// Lists every VM that has a descriptor, even ones whose inspect call
    /// failed — those are stamped `error`/`notfound` rather than omitted
    ///
    pub async fn list(&self) -> Result<Vec<(String, VmState)>> {
        let vms_dir = self.home.vms_dir();
        if !vms_dir.exists() {
            return Ok(Vec::new());
        }
        let mut rows = Vec::new();
        let entries = std::fs::read_dir(&vms_dir).map_err(|e| Error::io(vms_dir.display().to_string(), e))?;
        for entry in entries.flatten() {
            let Ok(file_type) = entry.file_type() else { continue };
            if !file_type.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let state = self.state(&name).await.unwrap_or(VmState::Error);
            rows.push((name, state));
        }
        Ok(rows)
    }

    pub async fn ip_address(&self, name: &str) -> Result<String> {
        self.load_descriptor(name)?;
        self.backend.as_trait().ip_address(name).await
    }

    /// Connects to 22/tcp with a caller-supplied timeout, without
    /// performing the SSH handshake
    pub async fn is_ssh_ready(&self, name: &str) -> Result<bool> {
        let ip = self.ip_address(name).await?;
        Ok(crate::process::tcp_port_open(&ip, 22).await)
    }

    /// Spawns the system `ssh` client with inherited stdio and waits for
    /// it to exit, rather than implementing the SSH protocol itself
    /// The returned code is the ssh client's own exit
    /// status, which callers surface verbatim rather than mapping through
    /// [`Error`].
    pub async fn connect(&self, name: &str, user: Option<&str>) -> Result<i32> {
        let ip = self.ip_address(name).await?;
        let target = match user {
            Some(user) => format!("{user}@{ip}"),
            None => ip,
        };
        let status = tokio::process::Command::new("ssh")
            .arg(&target)
            .stdin(std::process::Stdio::inherit())
            .stdout(std::process::Stdio::inherit())
            .stderr(std::process::Stdio::inherit())
            .status()
            .await
            .map_err(|e| Error::io("ssh".to_string(), e))?;
        Ok(status.code().unwrap_or(-1))
    }

    pub async fn snapshot_create(&self, name: &str, snapshot: &str, description: Option<&str>) -> Result<()> {
        self.load_descriptor(name)?;
        self.backend.as_trait().snapshot_create(name, snapshot, description).await
    }

    pub async fn snapshot_list(&self, name: &str) -> Result<Vec<Snapshot>> {
        self.load_descriptor(name)?;
        self.backend.as_trait().snapshot_list(name).await
    }

    pub async fn snapshot_revert(&self, name: &str, snapshot: &str) -> Result<()> {
        self.load_descriptor(name)?;
        self.backend.as_trait().snapshot_revert(name, snapshot).await
    }

    pub async fn snapshot_delete(&self, name: &str, snapshot: &str) -> Result<()> {
        self.load_descriptor(name)?;
        self.backend.as_trait().snapshot_delete(name, snapshot).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_rejects_invalid_name() {
        let dir = tempfile::tempdir().unwrap();
        let home = PortunixHome::at(dir.path()).unwrap();
        let Ok(manager) = VirtManager::new(home, Some("qemu")).await else {
            return; // qemu-img/qemu-system-* absent on this host; skip.
        };
        let result = manager
            .create(
                "bad name",
                "1G".parse().unwrap(),
                1,
                "1G".parse().unwrap(),
                "ubuntu",
                None,
                NetworkConfig::User,
            )
            .await;
        assert!(result.is_err());
    }
}
