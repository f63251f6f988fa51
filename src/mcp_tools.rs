//! Core MCP tools: `virt_list`, `virt_status`, `container_ps`, `plugin_list`,
//! exposed alongside whatever plugins add.

use std::sync::Arc;

use async_trait::async_trait;
use portunix_mcp::catalog::{namespaced_name, ToolCatalog, ToolEntry, ToolOwner};
use portunix_mcp::dispatcher::{Dispatcher, ToolHandler};
use portunix_mcp::error::ToolError;

use crate::config::PortunixHome;
use crate::container::runtime::{ContainerRuntime, Runtime};
use crate::error::Error;
use crate::plugin::PluginHost;
use crate::virt::VirtManager;

fn to_tool_error(e: Error) -> ToolError {
    match e {
        Error::Validation { .. } => ToolError::InvalidArgs(e.to_string()),
        Error::NotFound { .. } => ToolError::NotFound(e.to_string()),
        Error::Timeout { .. } => ToolError::Timeout(std::time::Duration::from_secs(0)),
        other => ToolError::Internal(other.to_string()),
    }
}

fn entry(tool_name: &str, description: &str) -> ToolEntry {
    ToolEntry {
        name: namespaced_name(&ToolOwner::Core, tool_name),
        description: description.to_string(),
        input_schema: serde_json::json!({"type": "object"}),
        owner: ToolOwner::Core,
        capability_tags: vec![],
    }
}

struct VirtListTool {
    home: PortunixHome,
}

#[async_trait]
impl ToolHandler for VirtListTool {
    async fn call(&self, _args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let manager = VirtManager::new(self.home.clone(), None).await.map_err(to_tool_error)?;
        let rows = manager.list().await.map_err(to_tool_error)?;
        let tools: Vec<_> = rows
            .into_iter()
            .map(|(name, state)| serde_json::json!({"name": name, "state": state.to_string()}))
            .collect();
        Ok(serde_json::Value::Array(tools))
    }
}

struct VirtStatusTool {
    home: PortunixHome,
}

#[derive(serde::Deserialize)]
struct VirtStatusArgs {
    name: String,
}

#[async_trait]
impl ToolHandler for VirtStatusTool {
    async fn call(&self, args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let args: VirtStatusArgs =
            serde_json::from_value(args).map_err(|e| ToolError::InvalidArgs(e.to_string()))?;
        let manager = VirtManager::new(self.home.clone(), None).await.map_err(to_tool_error)?;
        let state = manager.state(&args.name).await.map_err(to_tool_error)?;
        Ok(serde_json::json!({"name": args.name, "state": state.to_string()}))
    }
}

struct ContainerPsTool;

#[async_trait]
impl ToolHandler for ContainerPsTool {
    async fn call(&self, _args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let runtime = Runtime::detect().await.map_err(to_tool_error)?;
        let containers = runtime.as_trait().ps().await.map_err(to_tool_error)?;
        serde_json::to_value(containers).map_err(|e| ToolError::Internal(e.to_string()))
    }
}

struct PluginListTool {
    host: Arc<PluginHost>,
}

#[async_trait]
impl ToolHandler for PluginListTool {
    async fn call(&self, _args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let plugins = self.host.list().await.map_err(to_tool_error)?;
        let tools: Vec<_> = plugins
            .into_iter()
            .map(|(name, state)| serde_json::json!({"name": name, "state": format!("{state:?}")}))
            .collect();
        Ok(serde_json::Value::Array(tools))
    }
}

/// Registers every core tool's catalog entry and dispatcher handler
///
pub fn register(
    catalog: &Arc<ToolCatalog>,
    dispatcher: &mut Dispatcher,
    home: PortunixHome,
    plugin_host: Arc<PluginHost>,
) -> crate::error::Result<()> {
    let registrations: Vec<(ToolEntry, Arc<dyn ToolHandler>)> = vec![
        (
            entry("virt_list", "Lists every VM and its current state."),
            Arc::new(VirtListTool { home: home.clone() }),
        ),
        (
            entry("virt_status", "Reports one VM's current state."),
            Arc::new(VirtStatusTool { home }),
        ),
        (
            entry("container_ps", "Lists containers on the active runtime."),
            Arc::new(ContainerPsTool),
        ),
        (
            entry("plugin_list", "Lists installed plugins and their state."),
            Arc::new(PluginListTool { host: plugin_host }),
        ),
    ];

    for (tool_entry, handler) in registrations {
        let name = tool_entry.name.clone();
        catalog
            .register(tool_entry)
            .map_err(|e| Error::validation("mcp-catalog", e.to_string()))?;
        dispatcher.register_core_handler(name, handler);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_adds_four_core_tools() {
        let dir = tempfile::tempdir().unwrap();
        let home = PortunixHome::at(dir.path()).unwrap();
        let catalog = Arc::new(ToolCatalog::new());
        let mut dispatcher = Dispatcher::new(Arc::clone(&catalog));
        let plugin_host = Arc::new(PluginHost::new(home.clone(), Arc::clone(&catalog)));

        register(&catalog, &mut dispatcher, home, plugin_host).unwrap();

        let names: Vec<_> = catalog.list().into_iter().map(|e| e.name).collect();
        assert!(names.contains(&"core.virt_list".to_string()));
        assert!(names.contains(&"core.plugin_list".to_string()));
    }
}
