//! `portunix install ...`: installs host packages directly,
//! either through the host's own package manager or from an offline ISO.

use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::container::pkgmgr::FAMILIES;
use crate::error::{Error, Result};
use crate::process;

#[derive(Args, Debug)]
pub struct InstallArgs {
    #[command(subcommand)]
    pub command: InstallCommand,
}

#[derive(Subcommand, Debug)]
pub enum InstallCommand {
    /// Installs a package using the host's own package manager
    /// (`apt-get|dnf|yum|apk|pacman|zypper`, first one present wins).
    Apt { package: String },
    /// Mounts an offline ISO, installs `.deb`/`.rpm` packages found on it,
    /// then unmounts
    Iso(IsoArgs),
}

#[derive(Args, Debug)]
pub struct IsoArgs {
    pub iso_path: PathBuf,
    #[arg(long)]
    pub package: Option<String>,
}

pub async fn execute(args: InstallArgs) -> Result<()> {
    match args.command {
        InstallCommand::Apt { package } => apt(&package).await,
        InstallCommand::Iso(a) => iso(a).await,
    }
}

async fn apt(package: &str) -> Result<()> {
    let family = detect_host_family().await?;
    let command = family.install_command(package);
    let parts: Vec<&str> = command.split_whitespace().collect();
    let sudo_parts: Vec<&str> = std::iter::once("sudo").chain(parts).collect();
    let out = process::run_default(sudo_parts[0], &sudo_parts[1..]).await?;
    if out.success() {
        println!("{package} installed via {}", family.name);
        Ok(())
    } else {
        Err(Error::validation(package, out.stderr_str()))
    }
}

async fn detect_host_family() -> Result<&'static crate::container::pkgmgr::PackageManager> {
    for candidate in FAMILIES {
        if crate::sysdetect::resolve_binary(candidate.name).is_some() {
            return Ok(candidate);
        }
    }
    Err(Error::backend_unavailable(
        "install",
        "no recognized package manager (apt-get|dnf|yum|apk|pacman|zypper) found on this host",
    ))
}

/// Loop-mounts the ISO read-only, discovers every `.deb`/`.rpm` under it
/// (or just `package`, if named), installs them, then unmounts — even on
/// install failure, so a failed run never leaves the ISO mounted.
async fn iso(args: IsoArgs) -> Result<()> {
    let mount_point = tempfile::tempdir().map_err(|e| Error::io("iso-mount", e))?;
    let mount_path = mount_point.path();

    let mount_out = process::run_default(
        "mount",
        &["-o", "loop,ro", args.iso_path.to_str().unwrap_or_default(), mount_path.to_str().unwrap_or_default()],
    )
    .await?;
    if !mount_out.success() {
        return Err(Error::backend_unavailable("install-iso", mount_out.stderr_str()));
    }

    let result = install_from_mount(mount_path, args.package.as_deref()).await;

    let _ = process::run_default("umount", &[mount_path.to_str().unwrap_or_default()]).await;
    result
}

async fn install_from_mount(mount_path: &std::path::Path, package: Option<&str>) -> Result<()> {
    let family = detect_host_family().await?;
    let packages = discover_packages(mount_path, family.class, package)?;
    if packages.is_empty() {
        return Err(Error::not_found("iso-package", package.unwrap_or("*")));
    }
    for pkg_path in &packages {
        let out = match family.class {
            crate::container::pkgmgr::DistroClass::DebianBased => {
                process::run_default("dpkg", &["-i", pkg_path.to_str().unwrap_or_default()]).await?
            }
            _ => process::run_default("rpm", &["-i", pkg_path.to_str().unwrap_or_default()]).await?,
        };
        if !out.success() {
            return Err(Error::validation(pkg_path.display().to_string(), out.stderr_str()));
        }
    }
    println!("installed {} package(s) from ISO", packages.len());
    Ok(())
}

fn discover_packages(
    mount_path: &std::path::Path,
    class: crate::container::pkgmgr::DistroClass,
    package: Option<&str>,
) -> Result<Vec<PathBuf>> {
    let ext = match class {
        crate::container::pkgmgr::DistroClass::DebianBased => "deb",
        _ => "rpm",
    };
    let mut found = Vec::new();
    walk_for_extension(mount_path, ext, package, &mut found)?;
    Ok(found)
}

fn walk_for_extension(dir: &std::path::Path, ext: &str, package: Option<&str>, found: &mut Vec<PathBuf>) -> Result<()> {
    let entries = std::fs::read_dir(dir).map_err(|e| Error::io(dir.display().to_string(), e))?;
    for entry in entries.flatten() {
        let path = entry.path();
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            walk_for_extension(&path, ext, package, found)?;
            continue;
        }
        let matches_ext = path.extension().and_then(|e| e.to_str()) == Some(ext);
        let matches_package = package
            .map(|p| path.file_stem().and_then(|s| s.to_str()).is_some_and(|s| s.starts_with(p)))
            .unwrap_or(true);
        if matches_ext && matches_package {
            found.push(path);
        }
    }
    Ok(())
}
