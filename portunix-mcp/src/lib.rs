//! Multi-transport MCP request dispatcher.
//!
//! `portunix-mcp` serves AI assistants over stdio, TCP, or a local Unix
//! socket with identical request/response semantics, and
//! routes `call_tool` requests to either a core-owned handler or a running
//! plugin. It is kept independent of the plugin host's concrete types (see
//! [`dispatcher::PluginCaller`]) so it can be embedded without pulling in
//! the whole `portunix` core.

pub mod catalog;
pub mod dispatcher;
pub mod error;
pub mod integration;
pub mod profile;
pub mod transport;

pub use catalog::{ToolCatalog, ToolEntry, ToolOwner};
pub use dispatcher::{Dispatcher, PluginCaller, ToolHandler};
pub use error::{ToolError, TransportError};
pub use profile::Profile;
