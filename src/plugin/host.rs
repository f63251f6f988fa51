//! `PluginHost`: supervises out-of-process plugin children — spawn,
//! health-check watchdog, restart-on-failure, hot reload — and forwards
//! MCP `call_tool` requests to the right running plugin.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use portunix_protocol::{CallToolRequest, RpcStatus};
use portunix_mcp::catalog::{namespaced_name, ToolCatalog, ToolEntry, ToolOwner};
use portunix_mcp::dispatcher::PluginCaller;
use portunix_mcp::error::ToolError;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{error, info, warn};

use crate::config::PortunixHome;
use crate::error::{Error, Result};
use crate::plugin::manifest::PluginManifest;
use crate::plugin::registry::Registry;
use crate::plugin::rpc_client::{Endpoint, PluginConnection};
use crate::plugin::sandbox;
use crate::plugin::state::PluginState;

const PLUGIN_ENDPOINT_VAR: &str = "PLUGIN_ENDPOINT";

/// Poll interval while waiting for a freshly spawned plugin to report ready.
const STARTUP_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Ceiling on the startup wait before the plugin is considered failed to
/// launch
const STARTUP_TIMEOUT: Duration = Duration::from_secs(30);
/// Steady-state health-check cadence.
const WATCHDOG_INTERVAL: Duration = Duration::from_secs(2);
/// Consecutive failed health checks before a running plugin is declared
/// errored
const WATCHDOG_FAILURE_THRESHOLD: u32 = 3;
/// How long a `ShutdownRequest` gets to be acknowledged before the child is
/// killed outright.
const RPC_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);
/// How long the child process gets to exit after shutdown/kill is issued.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
/// Ceiling on the exponential restart backoff.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

struct RunningPlugin {
    connection: Arc<PluginConnection>,
    child: tokio::process::Child,
    watchdog: tokio::task::JoinHandle<()>,
    manifest: PluginManifest,
}

pub struct PluginHost {
    home: PortunixHome,
    registry: Registry,
    catalog: Arc<ToolCatalog>,
    running: AsyncMutex<HashMap<String, RunningPlugin>>,
    locks: std::sync::Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl PluginHost {
    pub fn new(home: PortunixHome, catalog: Arc<ToolCatalog>) -> Self {
        let registry = Registry::new(home.clone());
        Self {
            home,
            registry,
            catalog,
            running: AsyncMutex::new(HashMap::new()),
            locks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, name: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().expect("lock registry poisoned");
        locks.entry(name.to_string()).or_default().clone()
    }

    /// Opens (creating/truncating) `plugins/logs/<name>.log` and returns
    /// independent handles for the child's stdout and stderr so neither
    /// stream goes unread — a piped child with nobody draining it will
    /// eventually block on a full OS pipe buffer.
    fn open_log_files(&self, name: &str) -> Result<(std::process::Stdio, std::process::Stdio)> {
        let log_path = self.home.plugins_dir().join("logs").join(format!("{name}.log"));
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(|e| Error::io(log_path.display().to_string(), e))?;
        let stderr_file = file.try_clone().map_err(|e| Error::io(log_path.display().to_string(), e))?;
        Ok((std::process::Stdio::from(file), std::process::Stdio::from(stderr_file)))
    }

    /// Installs a plugin directory and validates its declared permissions
    /// before admitting it Rolls back the install on a failed
    /// validation.
    pub fn install(&self, from: &Path) -> Result<crate::plugin::registry::InstalledPlugin> {
        let installed = self.registry.install(from)?;
        if let Err(e) = sandbox::validate(&installed.manifest.permissions) {
            let _ = self.registry.uninstall(&installed);
            return Err(e);
        }
        Ok(installed)
    }

    fn find(&self, name: &str) -> Result<crate::plugin::registry::InstalledPlugin> {
        self.registry
            .scan()?
            .remove(name)
            .ok_or_else(|| Error::not_found("plugin", name))
    }

    pub async fn uninstall(&self, name: &str) -> Result<()> {
        let guard = self.lock_for(name);
        let _permit = guard.lock().await;
        self.stop_locked(name).await;
        self.registry.disable(name)?;
        let plugin = self.find(name)?;
        self.registry.uninstall(&plugin)
    }

    pub fn enable(&self, name: &str) -> Result<()> {
        let plugin = self.find(name)?;
        self.registry.enable(&plugin)
    }

    /// Stops the plugin if running, then removes the `enabled` symlink and
    /// its catalog entries
    pub async fn disable(&self, name: &str) -> Result<()> {
        let guard = self.lock_for(name);
        let _permit = guard.lock().await;
        self.stop_locked(name).await;
        self.registry.disable(name)?;
        self.catalog.remove_plugin_tools(name);
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<(String, PluginState)>> {
        let mut plugins: Vec<(String, PluginState)> = self
            .registry
            .scan()?
            .into_iter()
            .map(|(name, p)| (name, p.state))
            .collect();
        let running = self.running.lock().await;
        for (name, state) in plugins.iter_mut() {
            if running.contains_key(name) {
                *state = PluginState::Running;
            }
        }
        plugins.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(plugins)
    }

    pub async fn health(&self, name: &str) -> Result<portunix_protocol::HealthStatus> {
        let connection = {
            let running = self.running.lock().await;
            running
                .get(name)
                .map(|p| Arc::clone(&p.connection))
                .ok_or_else(|| Error::state_conflict(name, "STOPPED", "health"))?
        };
        connection.health_check().await
    }

    /// Spawns the plugin's executable with a restricted environment and a
    /// pinned working directory, waits for it to report ready, then starts
    /// the steady-state watchdog
    pub async fn start(self: &Arc<Self>, name: &str) -> Result<()> {
        let guard = self.lock_for(name);
        let _permit = guard.lock().await;
        self.start_locked(name).await
    }

    /// Assumes the caller already holds this plugin's lifecycle lock.
    async fn start_locked(self: &Arc<Self>, name: &str) -> Result<()> {
        if self.running.lock().await.contains_key(name) {
            return Err(Error::state_conflict(name, "RUNNING", "start"));
        }

        let plugin = self.find(name)?;
        if plugin.state != PluginState::Enabled {
            return Err(Error::state_conflict(name, format!("{:?}", plugin.state), "start"));
        }
        sandbox::validate(&plugin.manifest.permissions)?;

        let endpoint = choose_endpoint(&plugin.install_dir);
        let binary = executable_path(&plugin.install_dir)?;
        let env = sandbox::restricted_env(PLUGIN_ENDPOINT_VAR, &endpoint.as_env_value());
        let (stdout, stderr) = self.open_log_files(name)?;

        let mut command = tokio::process::Command::new(&binary);
        command
            .current_dir(&plugin.install_dir)
            .env_clear()
            .envs(env)
            .stdin(std::process::Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .kill_on_drop(true);
        let mut child = command.spawn().map_err(|e| Error::io(name.to_string(), e))?;

        let connection = Arc::new(PluginConnection::new(
            name,
            endpoint,
            plugin.manifest.max_concurrency,
        ));

        if !wait_until_ready(&connection, STARTUP_TIMEOUT).await {
            let _ = child.start_kill();
            let _ = child.wait().await;
            return Err(Error::timeout(name, "plugin-start", STARTUP_TIMEOUT.as_secs()));
        }
        info!(plugin = name, "plugin started");

        self.refresh_tool_catalog(name, &connection).await;

        let watchdog_host = Arc::clone(self);
        let watchdog_name = name.to_string();
        let watchdog = tokio::spawn(async move {
            watchdog_host.watchdog_loop(watchdog_name).await;
        });

        let mut running = self.running.lock().await;
        running.insert(
            name.to_string(),
            RunningPlugin {
                connection,
                child,
                watchdog,
                manifest: plugin.manifest,
            },
        );
        Ok(())
    }

    /// Graceful shutdown RPC, falling back to a kill if the plugin doesn't
    /// exit within [`SHUTDOWN_GRACE`]. A no-op if the plugin isn't running.
    pub async fn stop(&self, name: &str) -> Result<()> {
        let guard = self.lock_for(name);
        let _permit = guard.lock().await;
        self.stop_locked(name).await;
        Ok(())
    }

    /// Assumes the caller already holds this plugin's lifecycle lock.
    async fn stop_locked(&self, name: &str) {
        let Some(mut plugin) = self.running.lock().await.remove(name) else {
            return;
        };
        plugin.watchdog.abort();
        self.shutdown_process(name, &mut plugin).await;
        info!(plugin = name, "plugin stopped");
    }

    async fn shutdown_process(&self, name: &str, plugin: &mut RunningPlugin) {
        let _ = tokio::time::timeout(RPC_SHUTDOWN_TIMEOUT, plugin.connection.shutdown()).await;
        match tokio::time::timeout(SHUTDOWN_GRACE, plugin.child.wait()).await {
            Ok(_) => {}
            Err(_) => {
                let _ = plugin.child.start_kill();
                let _ = plugin.child.wait().await;
            }
        }
        self.catalog.remove_plugin_tools(name);
    }

    async fn refresh_tool_catalog(&self, name: &str, connection: &PluginConnection) {
        match connection.list_tools().await {
            Ok(resp) => {
                let owner = ToolOwner::Plugin(name.to_string());
                let entries = resp
                    .tools
                    .into_iter()
                    .map(|t| ToolEntry {
                        name: namespaced_name(&owner, &t.name),
                        description: t.description,
                        input_schema: t.input_schema,
                        owner: owner.clone(),
                        capability_tags: vec![],
                    })
                    .collect();
                self.catalog.replace_plugin_tools(name, entries);
            }
            Err(e) => {
                warn!(plugin = name, error = %e, "failed to list tools after start; catalog left unchanged");
            }
        }
    }

    /// Steady-state health polling for one running plugin. Ends the
    /// process and restarts it with exponential backoff on
    /// [`WATCHDOG_FAILURE_THRESHOLD`] consecutive failed checks, up to the
    /// manifest's `restart_policy.max_restarts` Exits quietly once the plugin is no longer tracked
    /// (stopped/disabled elsewhere) or once it gives up restarting.
    async fn watchdog_loop(self: Arc<Self>, name: String) {
        let mut consecutive_failures = 0u32;
        let mut attempt = 0u32;
        loop {
            tokio::time::sleep(WATCHDOG_INTERVAL).await;
            let connection = {
                let running = self.running.lock().await;
                match running.get(&name) {
                    Some(p) => Arc::clone(&p.connection),
                    None => return,
                }
            };
            let healthy = matches!(connection.health_check().await, Ok(status) if status.liveness);
            if healthy {
                consecutive_failures = 0;
                continue;
            }
            consecutive_failures += 1;
            if consecutive_failures < WATCHDOG_FAILURE_THRESHOLD {
                continue;
            }
            warn!(
                plugin = %name,
                threshold = WATCHDOG_FAILURE_THRESHOLD,
                "plugin failed consecutive health checks, tearing down"
            );
            // Hold the per-plugin lock for the rest of this iteration so a
            // concurrent stop/disable/start can't race the teardown below.
            // This is our own watchdog handle, so it's dropped rather than
            // aborted here.
            let guard = self.lock_for(&name);
            let _permit = guard.lock().await;
            let Some(mut plugin) = self.running.lock().await.remove(&name) else {
                return;
            };
            let restart_policy = plugin.manifest.restart_policy.clone();
            self.shutdown_process(&name, &mut plugin).await;
            drop(plugin);

            if !restart_policy.enabled || attempt >= restart_policy.max_restarts {
                error!(plugin = %name, "plugin errored and will not be restarted");
                return;
            }
            let backoff_ms = restart_policy.base_backoff_ms.saturating_mul(1u64 << attempt.min(10));
            let backoff = Duration::from_millis(backoff_ms).min(MAX_BACKOFF);
            attempt += 1;
            warn!(plugin = %name, attempt, backoff_ms = backoff.as_millis() as u64, "restarting plugin");
            tokio::time::sleep(backoff).await;
            if self.start_locked(&name).await.is_err() {
                error!(plugin = %name, "restart attempt failed; giving up");
            }
            // `start_locked` spawned a fresh watchdog on success, or gave up on
            // failure; either way this loop's work is done.
            return;
        }
    }
}

#[async_trait]
impl PluginCaller for PluginHost {
    async fn call_tool(
        &self,
        plugin: &str,
        tool: &str,
        args: serde_json::Value,
        timeout: Duration,
    ) -> std::result::Result<serde_json::Value, ToolError> {
        let connection = {
            let running = self.running.lock().await;
            running.get(plugin).map(|p| Arc::clone(&p.connection))
        }
        .ok_or_else(|| ToolError::NotFound(plugin.to_string()))?;

        let req = CallToolRequest {
            name: tool.to_string(),
            args,
        };
        match tokio::time::timeout(timeout, connection.call_tool(req)).await {
            Err(_) => Err(ToolError::Timeout(timeout)),
            Ok(Err(e)) => Err(ToolError::Internal(e.to_string())),
            Ok(Ok(resp)) => match resp.status {
                RpcStatus::Success => Ok(resp.result),
                RpcStatus::InvalidArgs => Err(ToolError::InvalidArgs(resp.error.unwrap_or_default())),
                RpcStatus::NotFound => Err(ToolError::NotFound(resp.error.unwrap_or_default())),
                RpcStatus::Error => Err(ToolError::Internal(resp.error.unwrap_or_default())),
            },
        }
    }
}

/// Unix plugins bind a private socket in their own install directory,
/// sidestepping the ephemeral-port race a TCP listener would need; other
/// platforms fall back to a loopback TCP port picked by binding to port 0
/// and releasing it before the child binds it.
#[cfg(unix)]
fn choose_endpoint(install_dir: &Path) -> Endpoint {
    Endpoint::Unix(install_dir.join("rpc.sock").display().to_string())
}

#[cfg(not(unix))]
fn choose_endpoint(_install_dir: &Path) -> Endpoint {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("loopback bind should never fail");
    let port = listener.local_addr().expect("bound listener has a local addr").port();
    drop(listener);
    Endpoint::Tcp(format!("127.0.0.1:{port}"))
}

/// Finds the plugin's single executable: the one regular file in the
/// install directory that isn't the manifest, executable on the current
/// platform.
fn executable_path(install_dir: &Path) -> Result<PathBuf> {
    let entries = std::fs::read_dir(install_dir).map_err(|e| Error::io(install_dir.display().to_string(), e))?;
    let mut candidates = Vec::new();
    for entry in entries.flatten() {
        if entry.file_name() == "plugin.yaml" {
            continue;
        }
        let Ok(file_type) = entry.file_type() else { continue };
        if !file_type.is_file() {
            continue;
        }
        if !is_executable(&entry.path()) {
            continue;
        }
        candidates.push(entry.path());
    }
    match candidates.len() {
        1 => Ok(candidates.remove(0)),
        0 => Err(Error::validation(
            install_dir.display().to_string(),
            "no executable file found alongside plugin.yaml",
        )),
        _ => Err(Error::validation(
            install_dir.display().to_string(),
            "more than one executable file found; expected exactly one plugin binary",
        )),
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    matches!(path.extension().and_then(|e| e.to_str()), Some("exe") | Some("bat") | Some("com"))
}

async fn wait_until_ready(connection: &PluginConnection, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Ok(status) = connection.health_check().await {
            if status.liveness {
                return true;
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(STARTUP_POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn executable_path_rejects_empty_directory() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("plugin.yaml"), "name: x\n").unwrap();
        assert!(executable_path(tmp.path()).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn executable_path_finds_the_sole_executable() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("plugin.yaml"), "name: x\n").unwrap();
        let bin = tmp.path().join("demo-plugin");
        std::fs::write(&bin, "#!/bin/sh\n").unwrap();
        let mut perms = std::fs::metadata(&bin).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&bin, perms).unwrap();
        assert_eq!(executable_path(tmp.path()).unwrap(), bin);
    }

    #[tokio::test]
    async fn health_on_unknown_plugin_is_state_conflict() {
        let tmp = tempfile::tempdir().unwrap();
        let home = PortunixHome::at(tmp.path()).unwrap();
        let host = PluginHost::new(home, Arc::new(ToolCatalog::new()));
        assert!(host.health("nope").await.is_err());
    }

    #[tokio::test]
    async fn uninstall_unknown_plugin_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let home = PortunixHome::at(tmp.path()).unwrap();
        let host = PluginHost::new(home, Arc::new(ToolCatalog::new()));
        let err = host.uninstall("nope").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }
}
