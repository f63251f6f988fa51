//! `plugin.yaml` schema.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginType {
    Service,
    Tool,
    Mcp,
    Integration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DependencySpec {
    pub name: String,
    pub version_req: String,
    #[serde(default)]
    pub kind: DependencyKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    #[default]
    Plugin,
    SystemBinary,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct PermissionBundle {
    #[serde(default)]
    pub filesystem_read: Vec<String>,
    #[serde(default)]
    pub filesystem_write: Vec<String>,
    #[serde(default)]
    pub outbound_hosts: Vec<String>,
    #[serde(default)]
    pub allowed_binaries: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub entry_type: String,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub sensitive: bool,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// `plugin.yaml`'s full declarative contents. Unknown top-level keys are
/// rejected (`deny_unknown_fields`) so a manifest round-trips exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginManifest {
    pub name: String,
    pub version: semver::Version,
    pub plugin_type: PluginType,
    #[serde(default)]
    pub capabilities: Vec<String>,
    pub language: String,
    #[serde(default)]
    pub dependencies: Vec<DependencySpec>,
    #[serde(default)]
    pub permissions: PermissionBundle,
    #[serde(default)]
    pub config_schema: Vec<ConfigEntry>,
    #[serde(default)]
    pub tools: Vec<ToolSpec>,
    /// Max concurrent tool calls on a `RUNNING` plugin
    #[serde(default = "default_concurrency")]
    pub max_concurrency: usize,
    #[serde(default)]
    pub restart_policy: RestartPolicy,
}

fn default_concurrency() -> usize {
    8
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RestartPolicy {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
}

fn default_max_restarts() -> u32 {
    5
}

fn default_base_backoff_ms() -> u64 {
    500
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            max_restarts: default_max_restarts(),
            base_backoff_ms: default_base_backoff_ms(),
        }
    }
}

impl PluginManifest {
    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(raw)
    }

    pub fn directory_name(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
name: demo-plugin
version: 0.1.0
plugin_type: mcp
language: python
tools:
  - name: process_text
    description: transforms text
    input_schema: { "type": "object" }
"#;

    #[test]
    fn parses_minimal_valid_manifest() {
        let manifest = PluginManifest::from_yaml(VALID).unwrap();
        assert_eq!(manifest.name, "demo-plugin");
        assert_eq!(manifest.tools[0].name, "process_text");
        assert_eq!(manifest.max_concurrency, 8);
    }

    #[test]
    fn rejects_unknown_top_level_key() {
        let raw = format!("{VALID}\nunknown_field: true\n");
        assert!(PluginManifest::from_yaml(&raw).is_err());
    }

    #[test]
    fn rejects_missing_required_field() {
        let raw = "name: demo-plugin\nplugin_type: mcp\nlanguage: python\n";
        assert!(PluginManifest::from_yaml(raw).is_err());
    }
}
