//! Backend capability contract and the closed tagged union dispatched through it
//!

pub mod qemu;
pub mod virtualbox;

use async_trait::async_trait;

use crate::error::Result;
use crate::virt::descriptor::{NetworkConfig, VmState};
use crate::virt::snapshot::Snapshot;

/// Inputs to [`VmBackend::create`], already validated by [`super::manager::VirtManager`].
#[derive(Debug, Clone)]
pub struct CreateSpec<'a> {
    pub name: &'a str,
    pub ram_bytes: u64,
    pub cpus: u32,
    pub disk_path: &'a std::path::Path,
    pub disk_bytes: u64,
    pub os_type: &'a str,
    pub iso_path: Option<&'a std::path::Path>,
    pub network: &'a NetworkConfig,
}

/// Every VM backend must implement the full lifecycle and query surface.
/// Adding a hypervisor is a new [`Backend`] variant plus an impl, never a
/// subclass.
#[async_trait]
pub trait VmBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the backend's tooling is present and usable on this host.
    async fn is_available(&self) -> bool;

    async fn version(&self) -> Result<String>;

    async fn create(&self, spec: &CreateSpec<'_>) -> Result<()>;

    /// Idempotent: a no-op success if already running
    async fn start(&self, name: &str) -> Result<()>;

    /// `force=false` attempts a graceful shutdown, polling for up to 30s
    /// before force-killing; `force=true` kills immediately.
    async fn stop(&self, name: &str, force: bool) -> Result<()>;

    async fn restart(&self, name: &str, force: bool) -> Result<()> {
        self.stop(name, force).await?;
        self.start(name).await
    }

    async fn suspend(&self, name: &str) -> Result<()>;

    async fn resume(&self, name: &str) -> Result<()>;

    /// `keep_disk=false` also removes the disk image.
    async fn delete(&self, name: &str, keep_disk: bool) -> Result<()>;

    async fn state(&self, name: &str) -> Result<VmState>;

    /// Returns `Err` if the guest has not yet reported its address;
    /// callers typically retry
    async fn ip_address(&self, name: &str) -> Result<String>;

    async fn snapshot_create(&self, name: &str, snapshot: &str, description: Option<&str>) -> Result<()>;

    async fn snapshot_list(&self, name: &str) -> Result<Vec<Snapshot>>;

    /// Forcibly stops the VM first if running
    async fn snapshot_revert(&self, name: &str, snapshot: &str) -> Result<()>;

    async fn snapshot_delete(&self, name: &str, snapshot: &str) -> Result<()>;
}

/// The active backend selected at `VirtManager` construction: a closed
/// tagged union, not a trait-object field, so match sites stay exhaustive
/// as backends are added.
pub enum Backend {
    Qemu(qemu::QemuBackend),
    VirtualBox(virtualbox::VirtualBoxBackend),
}

impl Backend {
    pub fn as_trait(&self) -> &dyn VmBackend {
        match self {
            Backend::Qemu(b) => b,
            Backend::VirtualBox(b) => b,
        }
    }
}
