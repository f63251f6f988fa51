//! Plugin registry: reconstructed by scanning `plugins/installed/` and
//! `plugins/enabled/` rather than kept in a separate database file
//!

use std::collections::HashMap;
use std::path::PathBuf;

use crate::config::PortunixHome;
use crate::error::{Error, Result};
use crate::plugin::manifest::PluginManifest;
use crate::plugin::state::PluginState;

#[derive(Debug, Clone)]
pub struct InstalledPlugin {
    pub manifest: PluginManifest,
    pub install_dir: PathBuf,
    pub state: PluginState,
}

pub struct Registry {
    home: PortunixHome,
}

impl Registry {
    pub fn new(home: PortunixHome) -> Self {
        Self { home }
    }

    fn installed_dir(&self) -> PathBuf {
        self.home.plugins_dir().join("installed")
    }

    fn enabled_dir(&self) -> PathBuf {
        self.home.plugins_dir().join("enabled")
    }

    /// Scans disk and reconstructs every installed plugin's position in
    /// the state machine. A plugin is `Enabled` iff a symlink with its
    /// name exists under `plugins/enabled/`; otherwise `Installed`.
    /// `Started`/`Running`/`Error` are live-process states the
    /// supervisor tracks separately and are not reconstructed here.
    pub fn scan(&self) -> Result<HashMap<String, InstalledPlugin>> {
        let installed_dir = self.installed_dir();
        if !installed_dir.exists() {
            return Ok(HashMap::new());
        }
        let enabled: std::collections::HashSet<String> = std::fs::read_dir(self.enabled_dir())
            .into_iter()
            .flatten()
            .flatten()
            .filter_map(|e| e.file_name().into_string().ok())
            .collect();

        let mut plugins = HashMap::new();
        for entry in std::fs::read_dir(&installed_dir)
            .map_err(|e| Error::io(installed_dir.display().to_string(), e))?
            .flatten()
        {
            if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }
            let dir = entry.path();
            let manifest_path = dir.join("plugin.yaml");
            let Ok(raw) = std::fs::read_to_string(&manifest_path) else {
                continue;
            };
            let Ok(manifest) = PluginManifest::from_yaml(&raw) else {
                continue;
            };
            let state = if enabled.contains(&manifest.name) {
                PluginState::Enabled
            } else {
                PluginState::Installed
            };
            plugins.insert(
                manifest.name.clone(),
                InstalledPlugin {
                    manifest,
                    install_dir: dir,
                    state,
                },
            );
        }
        Ok(plugins)
    }

    /// Installs `from` (an unpacked plugin directory containing
    /// `plugin.yaml`) under `plugins/installed/<name>-<version>/`.
    pub fn install(&self, from: &std::path::Path) -> Result<InstalledPlugin> {
        let manifest_path = from.join("plugin.yaml");
        let raw = std::fs::read_to_string(&manifest_path).map_err(|e| Error::io(manifest_path.display().to_string(), e))?;
        let manifest = PluginManifest::from_yaml(&raw)
            .map_err(|e| Error::validation(from.display().to_string(), e.to_string()))?;

        let dest = self.installed_dir().join(manifest.directory_name());
        if dest.exists() {
            return Err(Error::validation(
                manifest.name.clone(),
                "this plugin version is already installed",
            ));
        }
        copy_dir_recursive(from, &dest)?;
        Ok(InstalledPlugin {
            manifest,
            install_dir: dest,
            state: PluginState::Installed,
        })
    }

    /// Removes the installed directory tree; refuses if still enabled.
    pub fn uninstall(&self, plugin: &InstalledPlugin) -> Result<()> {
        if plugin.state == PluginState::Enabled || plugin.state == PluginState::Running {
            return Err(Error::state_conflict(
                plugin.manifest.name.clone(),
                format!("{:?}", plugin.state),
                "uninstall",
            ));
        }
        std::fs::remove_dir_all(&plugin.install_dir).map_err(|e| Error::io(plugin.install_dir.display().to_string(), e))
    }

    /// Creates the `plugins/enabled/<name>` symlink pointing at the
    /// installed directory.
    pub fn enable(&self, plugin: &InstalledPlugin) -> Result<()> {
        let link = self.enabled_dir().join(&plugin.manifest.name);
        if link.exists() {
            return Ok(());
        }
        symlink(&plugin.install_dir, &link)
    }

    /// Removes the enabled symlink; does not stop a running process
    /// (callers terminate it first).
    pub fn disable(&self, name: &str) -> Result<()> {
        let link = self.enabled_dir().join(name);
        if link.exists() {
            std::fs::remove_file(&link).map_err(|e| Error::io(link.display().to_string(), e))?;
        }
        Ok(())
    }
}

#[cfg(unix)]
fn symlink(target: &std::path::Path, link: &std::path::Path) -> Result<()> {
    std::os::unix::fs::symlink(target, link).map_err(|e| Error::io(link.display().to_string(), e))
}

#[cfg(not(unix))]
fn symlink(target: &std::path::Path, link: &std::path::Path) -> Result<()> {
    std::os::windows::fs::symlink_dir(target, link).map_err(|e| Error::io(link.display().to_string(), e))
}

fn copy_dir_recursive(src: &std::path::Path, dst: &std::path::Path) -> Result<()> {
    std::fs::create_dir_all(dst).map_err(|e| Error::io(dst.display().to_string(), e))?;
    for entry in std::fs::read_dir(src).map_err(|e| Error::io(src.display().to_string(), e))?.flatten() {
        let dest_path = dst.join(entry.file_name());
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            copy_dir_recursive(&entry.path(), &dest_path)?;
        } else {
            std::fs::copy(entry.path(), &dest_path).map_err(|e| Error::io(dest_path.display().to_string(), e))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_demo_plugin(dir: &std::path::Path) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(
            dir.join("plugin.yaml"),
            "name: demo-plugin\nversion: 0.1.0\nplugin_type: mcp\nlanguage: python\n",
        )
        .unwrap();
    }

    #[test]
    fn install_then_scan_finds_the_plugin_as_installed() {
        let tmp = tempfile::tempdir().unwrap();
        let home = PortunixHome::at(tmp.path().join("home")).unwrap();
        let source = tmp.path().join("demo-plugin-src");
        write_demo_plugin(&source);

        let registry = Registry::new(home);
        registry.install(&source).unwrap();
        let scanned = registry.scan().unwrap();
        assert_eq!(scanned["demo-plugin"].state, PluginState::Installed);
    }

    #[test]
    fn enable_then_scan_reports_enabled() {
        let tmp = tempfile::tempdir().unwrap();
        let home = PortunixHome::at(tmp.path().join("home")).unwrap();
        let source = tmp.path().join("demo-plugin-src");
        write_demo_plugin(&source);

        let registry = Registry::new(home);
        let installed = registry.install(&source).unwrap();
        registry.enable(&installed).unwrap();
        let scanned = registry.scan().unwrap();
        assert_eq!(scanned["demo-plugin"].state, PluginState::Enabled);
    }

    #[test]
    fn uninstall_refuses_while_enabled() {
        let tmp = tempfile::tempdir().unwrap();
        let home = PortunixHome::at(tmp.path().join("home")).unwrap();
        let source = tmp.path().join("demo-plugin-src");
        write_demo_plugin(&source);

        let registry = Registry::new(home);
        let installed = registry.install(&source).unwrap();
        registry.enable(&installed).unwrap();
        let scanned = registry.scan().unwrap();
        assert!(registry.uninstall(&scanned["demo-plugin"]).is_err());
    }
}
