//! CLI surface. Every subcommand here is a thin adapter translating parsed
//! arguments into calls on the library's engines — no lifecycle logic
//! lives in this module tree.

pub mod container;
pub mod install;
pub mod mcp;
pub mod plugin;
pub mod update;
pub mod virt;

use clap::{Parser, Subcommand};

use crate::error::Result;

#[derive(Parser, Debug)]
#[command(name = "portunix", version, about = "Cross-platform developer/operator toolkit", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Print full error detail (including source chains) instead of a
    /// single-line message
    #[arg(long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Package installer (host packages and ISO-sourced packages).
    Install(install::InstallArgs),
    /// VM lifecycle operations.
    Virt(virt::VirtArgs),
    /// Container operations.
    Container(container::ContainerArgs),
    /// Plugin host operations.
    Plugin(plugin::PluginArgs),
    /// MCP dispatcher operations.
    Mcp(mcp::McpArgs),
    /// Self-update.
    Update(update::UpdateArgs),
}

pub async fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Install(args) => install::execute(args).await,
        Command::Virt(args) => virt::execute(args).await,
        Command::Container(args) => container::execute(args).await,
        Command::Plugin(args) => plugin::execute(args).await,
        Command::Mcp(args) => mcp::execute(args).await,
        Command::Update(args) => update::execute(args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_well_formed() {
        // `debug_assert` panics on a malformed clap tree (duplicate flags,
        // conflicting arg ids, ...); this just forces that check to run.
        Cli::command().debug_assert();
    }
}
