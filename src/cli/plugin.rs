//! `portunix plugin ...`: plugin lifecycle management.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Subcommand};

use crate::config::PortunixHome;
use crate::error::Result;
use crate::plugin::{PluginHost, PluginManifest};

#[derive(Args, Debug)]
pub struct PluginArgs {
    #[command(subcommand)]
    pub command: PluginCommand,
}

#[derive(Subcommand, Debug)]
pub enum PluginCommand {
    List,
    /// Installs from an unpacked directory containing `plugin.yaml`.
    Install {
        path: PathBuf,
    },
    Uninstall {
        name: String,
    },
    Enable {
        name: String,
    },
    Disable {
        name: String,
    },
    Start {
        name: String,
    },
    Stop {
        name: String,
    },
    Info {
        name: String,
    },
    Health {
        name: String,
    },
    /// Parses `plugin.yaml` and reports whether it is well-formed, without
    /// installing it.
    Validate {
        path: PathBuf,
    },
}

fn host() -> Result<Arc<PluginHost>> {
    let home = PortunixHome::resolve()?;
    let catalog = Arc::new(portunix_mcp::ToolCatalog::new());
    Ok(Arc::new(PluginHost::new(home, catalog)))
}

pub async fn execute(args: PluginArgs) -> Result<()> {
    match args.command {
        PluginCommand::List => list().await,
        PluginCommand::Install { path } => {
            let host = host()?;
            let installed = host.install(&path)?;
            println!("{} {} installed", installed.manifest.name, installed.manifest.version);
            Ok(())
        }
        PluginCommand::Uninstall { name } => {
            let host = host()?;
            host.uninstall(&name).await?;
            println!("{name} uninstalled");
            Ok(())
        }
        PluginCommand::Enable { name } => {
            let host = host()?;
            host.enable(&name)?;
            println!("{name} enabled");
            Ok(())
        }
        PluginCommand::Disable { name } => {
            let host = host()?;
            host.disable(&name).await?;
            println!("{name} disabled");
            Ok(())
        }
        PluginCommand::Start { name } => {
            let host = host()?;
            host.start(&name).await?;
            println!("{name} started");
            Ok(())
        }
        PluginCommand::Stop { name } => {
            let host = host()?;
            host.stop(&name).await?;
            println!("{name} stopped");
            Ok(())
        }
        PluginCommand::Info { name } => info(&name).await,
        PluginCommand::Health { name } => {
            let host = host()?;
            let status = host.health(&name).await?;
            println!("liveness={} ", status.liveness);
            Ok(())
        }
        PluginCommand::Validate { path } => validate(&path),
    }
}

async fn list() -> Result<()> {
    let host = host()?;
    let plugins = host.list().await?;
    if plugins.is_empty() {
        println!("no plugins installed");
        return Ok(());
    }
    for (name, state) in plugins {
        println!("{name}\t{state:?}");
    }
    Ok(())
}

async fn info(name: &str) -> Result<()> {
    let home = PortunixHome::resolve()?;
    let registry = crate::plugin::Registry::new(home);
    let plugins = registry.scan()?;
    let plugin = plugins
        .get(name)
        .ok_or_else(|| crate::error::Error::not_found("plugin", name))?;
    println!("name: {}", plugin.manifest.name);
    println!("version: {}", plugin.manifest.version);
    println!("type: {:?}", plugin.manifest.plugin_type);
    println!("state: {:?}", plugin.state);
    println!("tools: {}", plugin.manifest.tools.len());
    Ok(())
}

fn validate(path: &PathBuf) -> Result<()> {
    let manifest_path = path.join("plugin.yaml");
    let raw = std::fs::read_to_string(&manifest_path).map_err(|e| crate::error::Error::io(manifest_path.display().to_string(), e))?;
    let manifest = PluginManifest::from_yaml(&raw)
        .map_err(|e| crate::error::Error::validation(path.display().to_string(), e.to_string()))?;
    println!("{} {} is a valid manifest", manifest.name, manifest.version);
    Ok(())
}
