//! portunix: cross-platform developer/operator toolkit.
//!
//! Unifies package installation, container orchestration, virtual-machine
//! lifecycle management, and an out-of-process plugin plane that exposes
//! tools to AI assistants via a Model Context Protocol (MCP) server.
//!
//! The four subsystems where the engineering lives:
//!
//! - [`virt`] — backend-abstracted VM lifecycle engine (QEMU/KVM, VirtualBox).
//! - [`container`] — uniform operations layer over Docker/Podman.
//! - [`plugin`] — RPC-based plugin host: discovery, supervision, sandboxing.
//! - `portunix_mcp` (separate crate) — multi-transport MCP dispatcher.
//!
//! Everything else (`config`, `logging`, `sysdetect`, `process`) is ambient
//! support these four subsystems share.

pub mod cli;
pub mod config;
pub mod container;
pub mod error;
pub mod logging;
pub mod mcp_tools;
pub mod plugin;
pub mod process;
pub mod sysdetect;
pub mod update;
pub mod virt;

pub use error::{Error, Result};

/// Re-exports for CLI and integration-test code.
pub mod prelude {
    pub use crate::config::PortunixHome;
    pub use crate::error::{Error, Result};
    pub use crate::virt::{VirtManager, VmState};
}
