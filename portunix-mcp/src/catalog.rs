//! Tool catalog: the aggregated set of MCP tools owned by the core or by
//! running plugins.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

/// Who owns a tool: the core itself, or a named running plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name")]
pub enum ToolOwner {
    Core,
    Plugin(String),
}

impl ToolOwner {
    pub fn is_core(&self) -> bool {
        matches!(self, ToolOwner::Core)
    }

    pub fn plugin_name(&self) -> Option<&str> {
        match self {
            ToolOwner::Plugin(name) => Some(name),
            ToolOwner::Core => None,
        }
    }
}

/// One entry in the aggregated catalog. `name` is already namespaced
/// (`core.<tool>` or `<plugin-name>.<tool-name>`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolEntry {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
    pub owner: ToolOwner,
    /// Opaque complexity/category hints used by permission profiles; the
    /// well-known tag `"destructive"` is filtered by the `standard`
    /// profile.
    #[serde(default)]
    pub capability_tags: Vec<String>,
}

/// Builds a namespaced tool name: `core.<tool>` or `<plugin>.<tool>`.
pub fn namespaced_name(owner: &ToolOwner, tool_name: &str) -> String {
    match owner {
        ToolOwner::Core => format!("core.{tool_name}"),
        ToolOwner::Plugin(plugin) => format!("{plugin}.{tool_name}"),
    }
}

/// Error registering a tool whose namespaced name already exists.
#[derive(Debug, thiserror::Error)]
#[error("tool name collision: {0} is already registered")]
pub struct CollisionError(pub String);

/// The aggregated, thread-safe tool catalog. Registration of a name that
/// already exists is refused
#[derive(Default)]
pub struct ToolCatalog {
    entries: RwLock<HashMap<String, ToolEntry>>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, entry: ToolEntry) -> Result<(), CollisionError> {
        let mut entries = self.entries.write().expect("catalog lock poisoned");
        if entries.contains_key(&entry.name) {
            return Err(CollisionError(entry.name.clone()));
        }
        entries.insert(entry.name.clone(), entry);
        Ok(())
    }

    /// Replaces every entry owned by `plugin` in one atomic step. Used when
    /// a plugin's tool list changes (new version enabled, tools added).
    pub fn replace_plugin_tools(&self, plugin: &str, new_entries: Vec<ToolEntry>) {
        let mut entries = self.entries.write().expect("catalog lock poisoned");
        entries.retain(|_, e| e.owner.plugin_name() != Some(plugin));
        for entry in new_entries {
            entries.insert(entry.name.clone(), entry);
        }
    }

    /// Removes every tool owned by `plugin` (disable/uninstall).
    pub fn remove_plugin_tools(&self, plugin: &str) {
        let mut entries = self.entries.write().expect("catalog lock poisoned");
        entries.retain(|_, e| e.owner.plugin_name() != Some(plugin));
    }

    pub fn get(&self, name: &str) -> Option<ToolEntry> {
        self.entries
            .read()
            .expect("catalog lock poisoned")
            .get(name)
            .cloned()
    }

    pub fn list(&self) -> Vec<ToolEntry> {
        let mut v: Vec<ToolEntry> = self
            .entries
            .read()
            .expect("catalog lock poisoned")
            .values()
            .cloned()
            .collect();
        v.sort_by(|a, b| a.name.cmp(&b.name));
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn core_entry(name: &str) -> ToolEntry {
        ToolEntry {
            name: namespaced_name(&ToolOwner::Core, name),
            description: "d".into(),
            input_schema: serde_json::json!({}),
            owner: ToolOwner::Core,
            capability_tags: vec![],
        }
    }

    #[test]
    fn register_refuses_collision() {
        let catalog = ToolCatalog::new();
        catalog.register(core_entry("virt_list")).unwrap();
        let err = catalog.register(core_entry("virt_list")).unwrap_err();
        assert_eq!(err.0, "core.virt_list");
    }

    #[test]
    fn replace_plugin_tools_swaps_atomically() {
        let catalog = ToolCatalog::new();
        let owner = ToolOwner::Plugin("demo".into());
        catalog
            .register(ToolEntry {
                name: namespaced_name(&owner, "old_tool"),
                description: "d".into(),
                input_schema: serde_json::json!({}),
                owner: owner.clone(),
                capability_tags: vec![],
            })
            .unwrap();
        catalog.replace_plugin_tools(
            "demo",
            vec![ToolEntry {
                name: namespaced_name(&owner, "new_tool"),
                description: "d".into(),
                input_schema: serde_json::json!({}),
                owner: owner.clone(),
                capability_tags: vec![],
            }],
        );
        assert!(catalog.get("demo.old_tool").is_none());
        assert!(catalog.get("demo.new_tool").is_some());
    }

    #[test]
    fn list_is_sorted_by_name() {
        let catalog = ToolCatalog::new();
        catalog.register(core_entry("zeta")).unwrap();
        catalog.register(core_entry("alpha")).unwrap();
        let names: Vec<_> = catalog.list().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["core.alpha", "core.zeta"]);
    }
}
