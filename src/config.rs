//! Configuration root resolution and the general `config.yaml`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const HOME_ENV: &str = "PORTUNIX_HOME";

/// The per-user data/config root: `vms/`, `plugins/`, and MCP integration
/// files all live under here. Resolved once at startup and passed
/// explicitly to constructors
#[derive(Debug, Clone)]
pub struct PortunixHome {
    root: PathBuf,
}

impl PortunixHome {
    /// Resolves `$PORTUNIX_HOME` if set, otherwise the OS's per-user data
    /// directory joined with `portunix`. Creates the tree with owner-only
    /// permissions if it does not yet exist.
    pub fn resolve() -> Result<Self> {
        let root = if let Some(over) = std::env::var_os(HOME_ENV) {
            PathBuf::from(over)
        } else {
            dirs::data_dir()
                .or_else(dirs::home_dir)
                .map(|d| d.join(".portunix"))
                .ok_or_else(|| Error::validation("PORTUNIX_HOME", "could not determine a home directory"))?
        };
        let home = Self { root };
        home.ensure_tree()?;
        Ok(home)
    }

    /// Builds a home rooted at an arbitrary path without touching the OS
    /// default directories (used by tests).
    pub fn at(root: impl Into<PathBuf>) -> Result<Self> {
        let home = Self { root: root.into() };
        home.ensure_tree()?;
        Ok(home)
    }

    fn ensure_tree(&self) -> Result<()> {
        for dir in [
            self.root.clone(),
            self.vms_dir(),
            self.plugins_dir().join("installed"),
            self.plugins_dir().join("enabled"),
            self.plugins_dir().join("configs"),
            self.plugins_dir().join("logs"),
            self.plugins_dir().join("registry"),
        ] {
            fs::create_dir_all(&dir).map_err(|e| Error::io(dir.display().to_string(), e))?;
            set_owner_only_dir(&dir)?;
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn vms_dir(&self) -> PathBuf {
        self.root.join("vms")
    }

    pub fn vm_dir(&self, name: &str) -> PathBuf {
        self.vms_dir().join(name)
    }

    pub fn plugins_dir(&self) -> PathBuf {
        self.root.join("plugins")
    }

    pub fn general_config_path(&self) -> PathBuf {
        self.root.join("config.yaml")
    }

    /// Curated index of plugins installable by name without a direct
    /// source URL (`plugin install-available`, `plugin list-available`).
    pub fn registry_dir(&self) -> PathBuf {
        self.plugins_dir().join("registry")
    }

    pub fn registry_index_path(&self) -> PathBuf {
        self.registry_dir().join("index.yaml")
    }

    /// Loads `config.yaml`, returning the default config if absent.
    pub fn load_config(&self) -> Result<GeneralConfig> {
        let path = self.general_config_path();
        if !path.exists() {
            return Ok(GeneralConfig::default());
        }
        let raw = fs::read_to_string(&path).map_err(|e| Error::io(path.display().to_string(), e))?;
        serde_yaml::from_str(&raw).map_err(|e| Error::validation(path.display().to_string(), e.to_string()))
    }

    /// Persists `config.yaml` via write-to-temp-then-rename, matching the
    /// descriptor-persistence pattern used throughout
    pub fn save_config(&self, config: &GeneralConfig) -> Result<()> {
        let yaml = serde_yaml::to_string(config)
            .map_err(|e| Error::validation("config.yaml", e.to_string()))?;
        crate::process::atomic_write(&self.general_config_path(), yaml.as_bytes())
    }
}

#[cfg(unix)]
fn set_owner_only_dir(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)
        .map_err(|e| Error::io(path.display().to_string(), e))?
        .permissions();
    perms.set_mode(0o700);
    fs::set_permissions(path, perms).map_err(|e| Error::io(path.display().to_string(), e))
}

#[cfg(not(unix))]
fn set_owner_only_dir(_path: &Path) -> Result<()> {
    Ok(())
}

/// General `config.yaml` contents: defaults consulted when a CLI flag or
/// manifest does not pin a value explicitly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Pins the active VM backend instead of auto-detecting
    pub virt_backend: Option<String>,
    /// Pins the active container runtime instead of auto-detecting.
    pub container_runtime: Option<String>,
    /// Default MCP permission profile for `mcp serve` when `-r` is omitted.
    pub mcp_default_profile: String,
    /// Default MCP transport mode for `mcp serve` when `-m` is omitted.
    pub mcp_default_mode: String,
    /// Release feed `portunix update` checks against, as an owner/repo pair.
    pub update_repo: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            virt_backend: None,
            container_runtime: None,
            mcp_default_profile: "standard".to_string(),
            mcp_default_mode: "stdio".to_string(),
            update_repo: "cassandragargoyle/portunix".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_at_creates_owner_only_tree() {
        let dir = tempfile::tempdir().unwrap();
        let home = PortunixHome::at(dir.path().join("home")).unwrap();
        assert!(home.vms_dir().exists());
        assert!(home.plugins_dir().join("installed").exists());
    }

    #[test]
    fn save_then_load_config_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let home = PortunixHome::at(dir.path()).unwrap();
        let mut cfg = GeneralConfig::default();
        cfg.virt_backend = Some("qemu".to_string());
        home.save_config(&cfg).unwrap();
        let loaded = home.load_config().unwrap();
        assert_eq!(loaded.virt_backend.as_deref(), Some("qemu"));
    }

    #[test]
    fn load_config_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let home = PortunixHome::at(dir.path()).unwrap();
        let loaded = home.load_config().unwrap();
        assert_eq!(loaded.mcp_default_profile, "standard");
    }
}
