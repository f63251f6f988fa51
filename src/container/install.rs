//! In-container package install flow: start a temporary container, detect the guest's
//! package manager, inject the portunix binary, run `portunix install`.

use crate::container::pkgmgr::PackageManager;
use crate::container::runtime::ContainerRuntime;
use crate::container::{PodmanHints, RunRequest};
use crate::error::{Error, Result};

/// Runs `portunix install <pkg>` inside a temporary container built from
/// `image`. Returns once the guest process exits; logs are the runtime's
/// own streamed `exec` output.
pub async fn install_in_container(
    runtime: &dyn ContainerRuntime,
    image: &str,
    pkg: &str,
    portunix_binary: &std::path::Path,
) -> Result<()> {
    let container_name = format!("portunix-install-{pkg}");
    let req = RunRequest {
        image: image.to_string(),
        name: Some(container_name.clone()),
        detach: true,
        command: vec!["sleep".to_string(), "infinity".to_string()],
        podman_hints: PodmanHints::default(),
        ..Default::default()
    };
    runtime.run(&req).await?;

    let result = run_install(runtime, &container_name, pkg, portunix_binary).await;
    let _ = runtime.stop(&container_name).await;
    let _ = runtime.rm(&container_name, true).await;
    result
}

async fn run_install(
    runtime: &dyn ContainerRuntime,
    container_name: &str,
    pkg: &str,
    portunix_binary: &std::path::Path,
) -> Result<()> {
    let family = detect_family(runtime, container_name).await?;

    runtime
        .cp(
            portunix_binary.to_str().unwrap_or_default(),
            &format!("{container_name}:/usr/local/bin/portunix"),
        )
        .await?;
    runtime.exec(container_name, &["chmod", "+x", "/usr/local/bin/portunix"]).await?;

    let install_cmd = family.install_command(pkg);
    let parts: Vec<&str> = install_cmd.split_whitespace().collect();
    let out = runtime.exec(container_name, &parts).await?;
    if out.success() {
        Ok(())
    } else {
        Err(Error::validation(pkg, out.stderr_str()))
    }
}

async fn detect_family(
    runtime: &dyn ContainerRuntime,
    container_name: &str,
) -> Result<&'static PackageManager> {
    for candidate in crate::container::pkgmgr::FAMILIES {
        let probe = runtime
            .exec(container_name, &["which", candidate.name])
            .await
            .map(|o| o.success())
            .unwrap_or(false);
        if probe {
            return Ok(candidate);
        }
    }
    Err(Error::backend_unavailable(
        "container-install",
        "no recognized package manager (apt-get|dnf|yum|apk|pacman|zypper) found in the guest",
    ))
}
