//! Permission validation and runtime sandboxing for plugin child processes
//! Stronger sandboxing
//! (containers, seccomp) is explicitly out of scope there; this module
//! does what the host OS offers for free: a restricted environment, a
//! pinned working directory, and install-time validation of declared
//! paths/binaries.

use std::path::Path;

use crate::error::{Error, Result};
use crate::plugin::manifest::PermissionBundle;

/// Environment variables passed through to every plugin child regardless
/// of its declared permissions — the minimum needed to run at all.
const ALWAYS_ALLOWED_ENV: &[&str] = &["PATH", "HOME", "LANG", "TZ"];

/// Validates a manifest's declared permissions at install time: every
/// filesystem root must exist or be creatable, and every allowed binary
/// must resolve on `PATH`
pub fn validate(bundle: &PermissionBundle) -> Result<()> {
    for root in bundle.filesystem_read.iter().chain(bundle.filesystem_write.iter()) {
        let path = Path::new(root);
        if path.exists() {
            continue;
        }
        if let Some(parent) = path.parent() {
            if parent.exists() {
                continue;
            }
        }
        return Err(Error::validation(
            root.clone(),
            "declared permission path neither exists nor has a creatable parent",
        ));
    }
    for binary in &bundle.allowed_binaries {
        if crate::sysdetect::resolve_binary(binary).is_none() {
            return Err(Error::validation(
                binary.clone(),
                "declared allowed binary does not resolve on PATH",
            ));
        }
    }
    for host_port in &bundle.outbound_hosts {
        if host_port.rsplit_once(':').is_none() {
            return Err(Error::validation(
                host_port.clone(),
                "outbound host permission must be 'host:port'",
            ));
        }
    }
    Ok(())
}

/// Builds the restricted environment for a plugin child process: only
/// [`ALWAYS_ALLOWED_ENV`] plus the transport endpoint variable pass
/// through; everything else the host's own environment carries is
/// dropped
pub fn restricted_env(endpoint_var: &str, endpoint_value: &str) -> Vec<(String, String)> {
    let mut env: Vec<(String, String)> = ALWAYS_ALLOWED_ENV
        .iter()
        .filter_map(|key| std::env::var(key).ok().map(|v| (key.to_string(), v)))
        .collect();
    env.push((endpoint_var.to_string(), endpoint_value.to_string()));
    env
}

/// Whether `binary` is covered by the manifest's `allowed_binaries` list.
/// Used by a plugin's own `Execute` sandboxing if it shells out further
/// (the host cannot enforce this inside the plugin process, only document
/// the contract it was installed under).
pub fn binary_is_allowed(bundle: &PermissionBundle, binary: &str) -> bool {
    bundle.allowed_binaries.iter().any(|b| b == binary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle() -> PermissionBundle {
        PermissionBundle::default()
    }

    #[test]
    fn validate_accepts_empty_bundle() {
        assert!(validate(&bundle()).is_ok());
    }

    #[test]
    fn validate_rejects_unresolvable_binary() {
        let mut b = bundle();
        b.allowed_binaries.push("this-binary-does-not-exist-anywhere".to_string());
        assert!(validate(&b).is_err());
    }

    #[test]
    fn validate_rejects_malformed_outbound_host() {
        let mut b = bundle();
        b.outbound_hosts.push("not-a-host-port".to_string());
        assert!(validate(&b).is_err());
    }

    #[test]
    fn restricted_env_includes_endpoint_and_excludes_others() {
        std::env::set_var("PORTUNIX_SANDBOX_TEST_SECRET", "shhh");
        let env = restricted_env("PLUGIN_ENDPOINT", "tcp://127.0.0.1:9000");
        assert!(env.iter().any(|(k, v)| k == "PLUGIN_ENDPOINT" && v == "tcp://127.0.0.1:9000"));
        assert!(!env.iter().any(|(k, _)| k == "PORTUNIX_SANDBOX_TEST_SECRET"));
        std::env::remove_var("PORTUNIX_SANDBOX_TEST_SECRET");
    }

    #[test]
    fn binary_is_allowed_checks_the_declared_list() {
        let mut b = bundle();
        b.allowed_binaries.push("curl".to_string());
        assert!(binary_is_allowed(&b, "curl"));
        assert!(!binary_is_allowed(&b, "rm"));
    }
}
