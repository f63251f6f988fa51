//! `portunix virt ...`: VM lifecycle operations.

use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::config::PortunixHome;
use crate::error::{Error, Result};
use crate::virt::descriptor::{ByteSize, NetworkConfig};
use crate::virt::template;
use crate::virt::VirtManager;

#[derive(Args, Debug)]
pub struct VirtArgs {
    #[command(subcommand)]
    pub command: VirtCommand,

    /// Pin the backend (`qemu`|`virtualbox`) instead of auto-detecting.
    #[arg(long, global = true)]
    pub backend: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum VirtCommand {
    Create(CreateArgs),
    Start(NameArgs),
    Stop(StopArgs),
    Restart(StopArgs),
    Suspend(NameArgs),
    Resume(NameArgs),
    Delete(DeleteArgs),
    List,
    Status(StatusArgs),
    Ip(NameArgs),
    Connect(ConnectArgs),
    Snapshot(SnapshotArgs),
}

#[derive(Args, Debug)]
pub struct NameArgs {
    pub name: String,
}

#[derive(Args, Debug)]
pub struct StopArgs {
    pub name: String,
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    pub name: String,
    #[arg(long)]
    pub force: bool,
    #[arg(long = "keep-disk")]
    pub keep_disk: bool,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    pub name: Option<String>,
    /// Emit the lowercase state token alone, for scripting.
    #[arg(long)]
    pub simple: bool,
}

#[derive(Args, Debug)]
pub struct ConnectArgs {
    pub name: String,
    #[arg(long)]
    pub user: Option<String>,
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    pub name: String,
    #[arg(long)]
    pub ram: Option<String>,
    #[arg(long)]
    pub cpus: Option<u32>,
    #[arg(long)]
    pub disk: Option<String>,
    #[arg(long)]
    pub iso: Option<PathBuf>,
    #[arg(long = "os-type")]
    pub os_type: Option<String>,
    #[arg(long)]
    pub template: Option<String>,
    #[arg(long = "enable-ssh")]
    pub enable_ssh: bool,
    #[arg(long)]
    pub bridge: Option<String>,
    /// Wait for the guest to report an IP and SSH readiness before
    /// returning (default); `--no-wait` returns as soon as the backend
    /// reports the VM started.
    #[arg(long = "no-wait")]
    pub no_wait: bool,
    #[arg(long = "wait-timeout", default_value_t = 120)]
    pub wait_timeout: u64,
}

#[derive(Args, Debug)]
pub struct SnapshotArgs {
    #[command(subcommand)]
    pub command: SnapshotCommand,
}

#[derive(Subcommand, Debug)]
pub enum SnapshotCommand {
    Create {
        name: String,
        snapshot: String,
        #[arg(long)]
        description: Option<String>,
    },
    List {
        name: String,
    },
    Revert {
        name: String,
        snapshot: String,
    },
    Delete {
        name: String,
        snapshot: String,
    },
}

async fn manager(backend: Option<&str>) -> Result<VirtManager> {
    let home = PortunixHome::resolve()?;
    let pinned = backend
        .map(str::to_string)
        .or_else(|| home.load_config().ok().and_then(|c| c.virt_backend));
    VirtManager::new(home, pinned.as_deref()).await
}

pub async fn execute(args: VirtArgs) -> Result<()> {
    let manager = manager(args.backend.as_deref()).await?;
    match args.command {
        VirtCommand::Create(a) => create(&manager, a).await,
        VirtCommand::Start(a) => {
            manager.start(&a.name).await?;
            println!("{} started", a.name);
            Ok(())
        }
        VirtCommand::Stop(a) => {
            manager.stop(&a.name, a.force).await?;
            println!("{} stopped", a.name);
            Ok(())
        }
        VirtCommand::Restart(a) => {
            manager.restart(&a.name, a.force).await?;
            println!("{} restarted", a.name);
            Ok(())
        }
        VirtCommand::Suspend(a) => {
            manager.suspend(&a.name).await?;
            println!("{} suspended", a.name);
            Ok(())
        }
        VirtCommand::Resume(a) => {
            manager.resume(&a.name).await?;
            println!("{} resumed", a.name);
            Ok(())
        }
        VirtCommand::Delete(a) => {
            if !a.force {
                return Err(Error::validation(a.name, "delete requires --force"));
            }
            manager.delete(&a.name, a.keep_disk).await?;
            println!("{} deleted", a.name);
            Ok(())
        }
        VirtCommand::List => list(&manager).await,
        VirtCommand::Status(a) => status(&manager, a).await,
        VirtCommand::Ip(a) => {
            println!("{}", manager.ip_address(&a.name).await?);
            Ok(())
        }
        VirtCommand::Connect(a) => {
            let code = manager.connect(&a.name, a.user.as_deref()).await?;
            std::process::exit(code);
        }
        VirtCommand::Snapshot(a) => snapshot(&manager, a).await,
    }
}

/// Resolves ram/disk/os-type from the template hint (if any), letting any
/// explicit flag override it, then falling back to hardcoded defaults
///
async fn create(manager: &VirtManager, args: CreateArgs) -> Result<()> {
    let hint = args.template.as_deref().and_then(template::lookup);

    let os_type = args
        .os_type
        .or_else(|| hint.as_ref().map(|h| h.os_type.to_string()))
        .unwrap_or_else(|| "ubuntu".to_string());
    let ram: ByteSize = args.ram.unwrap_or_else(|| "1G".to_string()).parse()?;
    let cpus = args.cpus.unwrap_or(1);
    let disk: ByteSize = match args.disk {
        Some(raw) => raw.parse()?,
        None => hint.as_ref().map(|h| h.default_disk).unwrap_or_else(|| ByteSize::bytes(10 * 1024 * 1024 * 1024)),
    };

    let network = match args.bridge {
        Some(interface) => NetworkConfig::Bridged { interface },
        None => NetworkConfig::Nat { forwards: vec![] },
    };

    manager
        .create(&args.name, ram, cpus, disk, &os_type, args.iso, network)
        .await?;
    manager.start(&args.name).await?;

    if !args.no_wait {
        wait_for_ssh(manager, &args.name, args.wait_timeout).await;
    }
    println!("{} created", args.name);
    Ok(())
}

async fn wait_for_ssh(manager: &VirtManager, name: &str, timeout_secs: u64) {
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(timeout_secs);
    while tokio::time::Instant::now() < deadline {
        if manager.is_ssh_ready(name).await.unwrap_or(false) {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_secs(2)).await;
    }
}

async fn list(manager: &VirtManager) -> Result<()> {
    let rows = manager.list().await?;
    if rows.is_empty() {
        println!("no VMs");
        return Ok(());
    }
    for (name, state) in rows {
        println!("{name}\t{state}");
    }
    Ok(())
}

async fn status(manager: &VirtManager, args: StatusArgs) -> Result<()> {
    match args.name {
        Some(name) => {
            let state = manager.state(&name).await?;
            if args.simple {
                println!("{state}");
            } else {
                println!("{name}: {state}");
            }
        }
        None => list(manager).await?,
    }
    Ok(())
}

async fn snapshot(manager: &VirtManager, args: SnapshotArgs) -> Result<()> {
    match args.command {
        SnapshotCommand::Create { name, snapshot, description } => {
            manager.snapshot_create(&name, &snapshot, description.as_deref()).await?;
            println!("snapshot '{snapshot}' created for {name}");
        }
        SnapshotCommand::List { name } => {
            for snap in manager.snapshot_list(&name).await? {
                println!("{}", snap.name);
            }
        }
        SnapshotCommand::Revert { name, snapshot } => {
            manager.snapshot_revert(&name, &snapshot).await?;
            println!("{name} reverted to '{snapshot}'");
        }
        SnapshotCommand::Delete { name, snapshot } => {
            manager.snapshot_delete(&name, &snapshot).await?;
            println!("snapshot '{snapshot}' deleted from {name}");
        }
    }
    Ok(())
}
