//! `portunix mcp ...`: dispatcher serve/configure/remove/status.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Subcommand};
use portunix_mcp::integration::{self, Assistant, Scope, TransportParams};
use portunix_mcp::{Dispatcher, Profile, ToolCatalog};

use crate::config::PortunixHome;
use crate::error::{Error, Result};
use crate::plugin::PluginHost;

#[derive(Args, Debug)]
pub struct McpArgs {
    #[command(subcommand)]
    pub command: McpCommand,
}

#[derive(Subcommand, Debug)]
pub enum McpCommand {
    /// Runs the dispatcher in the foreground over the chosen transport.
    Serve(ServeArgs),
    /// Writes (or updates) the `portunix` entry in an assistant's own
    /// config file.
    Configure(TargetArgs),
    /// Removes the `portunix` entry from an assistant's config file.
    Remove(TargetArgs),
    /// Reports the transport params currently registered, if any.
    Status(TargetArgs),
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// `stdio`, `tcp`, or `unix`.
    #[arg(short = 'm', long, default_value = "stdio")]
    pub mode: String,
    #[arg(short = 'p', long)]
    pub port: Option<u16>,
    #[arg(short = 's', long)]
    pub socket: Option<PathBuf>,
    /// `limited`, `standard`, or `full`.
    #[arg(short = 'r', long)]
    pub profile: Option<String>,
}

#[derive(Args, Debug)]
pub struct TargetArgs {
    /// `claude-desktop`, `cursor`, or `generic`.
    #[arg(long, default_value = "generic")]
    pub assistant: String,
    /// `local`, `user`, or `project` (requires `--config-file`).
    #[arg(long, default_value = "local")]
    pub scope: String,
    #[arg(short = 'c', long = "config-file")]
    pub config_file: Option<PathBuf>,
    #[arg(short = 'm', long, default_value = "stdio")]
    pub mode: String,
    #[arg(short = 'p', long, default_value_t = portunix_mcp::transport::tcp::DEFAULT_PORT)]
    pub port: u16,
    #[arg(short = 's', long)]
    pub socket: Option<PathBuf>,
}

fn parse_assistant(raw: &str) -> Result<Assistant> {
    match raw {
        "claude-desktop" => Ok(Assistant::ClaudeDesktop),
        "cursor" => Ok(Assistant::Cursor),
        "generic" => Ok(Assistant::Generic),
        other => Err(Error::validation("assistant", format!("unknown assistant '{other}'"))),
    }
}

fn parse_scope(raw: &str, config_file: Option<PathBuf>) -> Result<Scope> {
    match raw {
        "local" => Ok(Scope::Local),
        "user" => Ok(Scope::User),
        "project" => {
            let path = config_file
                .ok_or_else(|| Error::validation("scope", "--scope project requires --config-file"))?;
            Ok(Scope::Project(path))
        }
        other => Err(Error::validation("scope", format!("unknown scope '{other}'"))),
    }
}

fn parse_transport(mode: &str, port: Option<u16>, socket: Option<PathBuf>) -> Result<TransportParams> {
    match mode {
        "stdio" => Ok(TransportParams::Stdio),
        "tcp" => Ok(TransportParams::Tcp {
            port: port.unwrap_or(portunix_mcp::transport::tcp::DEFAULT_PORT),
        }),
        "unix" => Ok(TransportParams::Unix {
            socket: socket.unwrap_or_else(default_socket_path),
        }),
        other => Err(Error::validation("mode", format!("unknown transport mode '{other}'"))),
    }
}

#[cfg(unix)]
fn default_socket_path() -> PathBuf {
    std::env::temp_dir().join(portunix_mcp::transport::unix::DEFAULT_SOCKET_NAME)
}

#[cfg(not(unix))]
fn default_socket_path() -> PathBuf {
    std::env::temp_dir().join("portunix.sock")
}

pub async fn execute(args: McpArgs) -> Result<()> {
    match args.command {
        McpCommand::Serve(a) => serve(a).await,
        McpCommand::Configure(a) => configure(a),
        McpCommand::Remove(a) => remove(a),
        McpCommand::Status(a) => status(a),
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    let home = PortunixHome::resolve()?;
    let config = home.load_config()?;
    let profile: Profile = args
        .profile
        .as_deref()
        .unwrap_or(&config.mcp_default_profile)
        .parse()
        .map_err(|e: String| Error::validation("profile", e))?;

    let catalog = Arc::new(ToolCatalog::new());
    let plugin_host = Arc::new(PluginHost::new(home.clone(), Arc::clone(&catalog)));
    let mut dispatcher = Dispatcher::new(Arc::clone(&catalog));
    crate::mcp_tools::register(&catalog, &mut dispatcher, home, Arc::clone(&plugin_host))?;
    let dispatcher = Arc::new(dispatcher.with_plugin_caller(plugin_host));

    let result = match args.mode.as_str() {
        "stdio" => portunix_mcp::transport::stdio::serve(dispatcher, profile).await,
        "tcp" => {
            let port = args.port.unwrap_or(portunix_mcp::transport::tcp::DEFAULT_PORT);
            let addr = std::net::SocketAddr::from(([127, 0, 0, 1], port));
            portunix_mcp::transport::tcp::serve(dispatcher, profile, addr, portunix_mcp::transport::tcp::DEFAULT_MAX_CONCURRENCY).await
        }
        #[cfg(unix)]
        "unix" => {
            let socket = args.socket.unwrap_or_else(default_socket_path);
            portunix_mcp::transport::unix::serve(dispatcher, profile, &socket, portunix_mcp::transport::tcp::DEFAULT_MAX_CONCURRENCY).await
        }
        #[cfg(not(unix))]
        "unix" => return Err(Error::validation("mode", "the unix transport is only available on unix hosts")),
        other => return Err(Error::validation("mode", format!("unknown transport mode '{other}'"))),
    };
    result.map_err(|e| Error::io("mcp-serve", e))
}

fn configure(args: TargetArgs) -> Result<()> {
    let assistant = parse_assistant(&args.assistant)?;
    let scope = parse_scope(&args.scope, args.config_file)?;
    let transport = parse_transport(&args.mode, Some(args.port), args.socket)?;
    let path = assistant
        .config_path(&scope)
        .map_err(|e| Error::validation("mcp-configure", e.to_string()))?;
    integration::write_entry(&path, &transport).map_err(|e| Error::validation(path.display().to_string(), e.to_string()))?;
    println!("registered portunix with {} at {}", args.assistant, path.display());
    Ok(())
}

fn remove(args: TargetArgs) -> Result<()> {
    let assistant = parse_assistant(&args.assistant)?;
    let scope = parse_scope(&args.scope, args.config_file)?;
    let path = assistant
        .config_path(&scope)
        .map_err(|e| Error::validation("mcp-remove", e.to_string()))?;
    integration::remove_entry(&path).map_err(|e| Error::validation(path.display().to_string(), e.to_string()))?;
    println!("removed portunix entry from {}", path.display());
    Ok(())
}

fn status(args: TargetArgs) -> Result<()> {
    let assistant = parse_assistant(&args.assistant)?;
    let scope = parse_scope(&args.scope, args.config_file)?;
    let path = assistant
        .config_path(&scope)
        .map_err(|e| Error::validation("mcp-status", e.to_string()))?;
    match integration::detect(&path).map_err(|e| Error::validation(path.display().to_string(), e.to_string()))? {
        Some(entry) => println!("{entry}"),
        None => println!("no portunix entry registered at {}", path.display()),
    }
    Ok(())
}
