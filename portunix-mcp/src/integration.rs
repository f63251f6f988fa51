//! Assistant integration files. Writes, updates in place, or removes the
//! MCP server entry inside an AI assistant's own configuration file.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::json;

/// Where the integration file lives.
#[derive(Debug, Clone)]
pub enum Scope {
    /// Project-local config directory (default).
    Local,
    /// The user's home directory.
    User,
    /// An explicit path supplied by the caller.
    Project(PathBuf),
}

impl Default for Scope {
    fn default() -> Self {
        Scope::Local
    }
}

/// Transport parameters to advertise to the assistant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum TransportParams {
    Stdio,
    Tcp { port: u16 },
    Unix { socket: PathBuf },
}

/// A known assistant integration target. New assistants are additional
/// variants/match arms, never a new subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assistant {
    ClaudeDesktop,
    Cursor,
    /// Any assistant that reads a flat `{"mcpServers": {...}}` file at a
    /// caller-supplied path.
    Generic,
}

impl Assistant {
    /// The config file this assistant reads, for the given scope.
    pub fn config_path(&self, scope: &Scope) -> Result<PathBuf, IntegrationError> {
        match (self, scope) {
            (_, Scope::Project(path)) => Ok(path.clone()),
            (Assistant::ClaudeDesktop, Scope::User) => dirs::config_dir()
                .map(|d| d.join("Claude").join("claude_desktop_config.json"))
                .ok_or(IntegrationError::NoHomeDirectory),
            (Assistant::ClaudeDesktop, Scope::Local) => {
                Ok(PathBuf::from(".mcp").join("claude_desktop_config.json"))
            }
            (Assistant::Cursor, Scope::User) => dirs::home_dir()
                .map(|d| d.join(".cursor").join("mcp.json"))
                .ok_or(IntegrationError::NoHomeDirectory),
            (Assistant::Cursor, Scope::Local) => Ok(PathBuf::from(".cursor").join("mcp.json")),
            (Assistant::Generic, Scope::User) => dirs::home_dir()
                .map(|d| d.join(".portunix").join("mcp.json"))
                .ok_or(IntegrationError::NoHomeDirectory),
            (Assistant::Generic, Scope::Local) => Ok(PathBuf::from(".portunix").join("mcp.json")),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IntegrationError {
    #[error("could not determine the user's home directory")]
    NoHomeDirectory,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("{0}'s \"mcpServers\" key is not an object")]
    MalformedConfig(String),
}

const SERVER_NAME: &str = "portunix";

/// Writes (or updates in place) the `portunix` entry inside `path`'s
/// `mcpServers` map, preserving every other entry and every unrecognized
/// top-level key.
pub fn write_entry(path: &std::path::Path, transport: &TransportParams) -> Result<(), IntegrationError> {
    let mut doc = read_or_empty(path)?;
    let servers = doc
        .as_object_mut()
        .expect("read_or_empty always returns an object")
        .entry("mcpServers")
        .or_insert_with(|| json!({}));
    let entry = server_entry(transport);
    servers
        .as_object_mut()
        .ok_or_else(|| IntegrationError::MalformedConfig(path.display().to_string()))?
        .insert(SERVER_NAME.to_string(), entry);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let pretty = serde_json::to_string_pretty(&doc)?;
    std::fs::write(path, pretty)?;
    Ok(())
}

/// Removes the `portunix` entry from `path`, leaving everything else
/// untouched. No-op if the file or the entry does not exist.
pub fn remove_entry(path: &std::path::Path) -> Result<(), IntegrationError> {
    if !path.exists() {
        return Ok(());
    }
    let mut doc = read_or_empty(path)?;
    if let Some(servers) = doc.get_mut("mcpServers").and_then(|v| v.as_object_mut()) {
        servers.remove(SERVER_NAME);
    }
    let pretty = serde_json::to_string_pretty(&doc)?;
    std::fs::write(path, pretty)?;
    Ok(())
}

/// Returns `Some(transport params)` already registered for `portunix` at
/// `path`, or `None` if there is no such entry yet.
pub fn detect(path: &std::path::Path) -> Result<Option<serde_json::Value>, IntegrationError> {
    if !path.exists() {
        return Ok(None);
    }
    let doc = read_or_empty(path)?;
    Ok(doc
        .get("mcpServers")
        .and_then(|v| v.get(SERVER_NAME))
        .cloned())
}

fn read_or_empty(path: &std::path::Path) -> Result<serde_json::Value, IntegrationError> {
    if !path.exists() {
        return Ok(json!({}));
    }
    let raw = std::fs::read_to_string(path)?;
    if raw.trim().is_empty() {
        return Ok(json!({}));
    }
    Ok(serde_json::from_str(&raw)?)
}

fn server_entry(transport: &TransportParams) -> serde_json::Value {
    match transport {
        TransportParams::Stdio => json!({
            "command": "portunix",
            "args": ["mcp", "serve", "-m", "stdio"],
        }),
        TransportParams::Tcp { port } => json!({
            "command": "portunix",
            "args": ["mcp", "serve", "-m", "tcp", "-p", port.to_string()],
            "transport": { "type": "tcp", "port": port },
        }),
        TransportParams::Unix { socket } => json!({
            "command": "portunix",
            "args": ["mcp", "serve", "-m", "unix", "-s", socket.display().to_string()],
            "transport": { "type": "unix", "socket": socket },
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_detect_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        write_entry(&path, &TransportParams::Tcp { port: 3001 }).unwrap();
        let entry = detect(&path).unwrap().unwrap();
        assert_eq!(entry["args"][3], "tcp");
    }

    #[test]
    fn write_preserves_unrelated_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"otherTool": {"command": "x"}, "mcpServers": {"other": {}}}"#).unwrap();
        write_entry(&path, &TransportParams::Stdio).unwrap();
        let doc: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(doc.get("otherTool").is_some());
        assert!(doc["mcpServers"].get("other").is_some());
        assert!(doc["mcpServers"].get("portunix").is_some());
    }

    #[test]
    fn remove_entry_is_noop_on_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        assert!(remove_entry(&path).is_ok());
    }

    #[test]
    fn remove_entry_deletes_only_portunix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        write_entry(&path, &TransportParams::Stdio).unwrap();
        remove_entry(&path).unwrap();
        assert!(detect(&path).unwrap().is_none());
    }
}
