//! Self-update: checks a GitHub
//! releases feed, verifies a SHA-256 checksum, and replaces the running
//! binary only after a backup and a post-replace smoke test succeed.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
    assets: Vec<Asset>,
}

#[derive(Debug, Deserialize)]
struct Asset {
    name: String,
    browser_download_url: String,
}

/// What `check()` found available, if anything newer than the running
/// binary exists.
#[derive(Debug, Clone)]
pub struct UpdateInfo {
    pub current_version: semver::Version,
    pub latest_version: semver::Version,
    asset_url: String,
    checksum_url: Option<String>,
}

/// The running binary's own version, parsed once from the build's
/// `CARGO_PKG_VERSION`.
pub fn current_version() -> semver::Version {
    env!("CARGO_PKG_VERSION")
        .parse()
        .expect("CARGO_PKG_VERSION is always valid semver")
}

/// The asset name this host expects to find attached to a release, e.g.
/// `portunix-linux-x86_64`. Releases that don't carry a matching asset
/// cannot be applied on this host.
fn asset_name() -> String {
    let os = if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "macos") {
        "macos"
    } else {
        "linux"
    };
    let arch = if cfg!(target_arch = "aarch64") {
        "aarch64"
    } else {
        "x86_64"
    };
    let ext = if cfg!(target_os = "windows") { ".exe" } else { "" };
    format!("portunix-{os}-{arch}{ext}")
}

fn http_client() -> Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .user_agent(concat!("portunix-update/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| Error::backend_unavailable("update", e.to_string()))
}

/// Queries `https://api.github.com/repos/<repo>/releases/latest` and
/// returns `Some(info)` if its tag is a newer semver than the running
/// binary, `None` if already current.
pub fn check(repo: &str) -> Result<Option<UpdateInfo>> {
    let client = http_client()?;
    let url = format!("https://api.github.com/repos/{repo}/releases/latest");
    let resp = client
        .get(&url)
        .send()
        .map_err(|e| Error::backend_unavailable("update", e.to_string()))?;
    if !resp.status().is_success() {
        return Err(Error::backend_unavailable(
            "update",
            format!("release feed returned HTTP {}", resp.status()),
        ));
    }
    let release: Release = resp
        .json()
        .map_err(|e| Error::validation("update", format!("malformed release feed: {e}")))?;

    let latest = release
        .tag_name
        .trim_start_matches('v')
        .parse::<semver::Version>()
        .map_err(|e| Error::validation("update", format!("release tag '{}' is not semver: {e}", release.tag_name)))?;
    let current = current_version();
    if latest <= current {
        return Ok(None);
    }

    let wanted = asset_name();
    let asset = release
        .assets
        .iter()
        .find(|a| a.name == wanted)
        .ok_or_else(|| Error::not_found("update-asset", wanted.clone()))?;
    let checksum_url = release
        .assets
        .iter()
        .find(|a| a.name == format!("{wanted}.sha256"))
        .map(|a| a.browser_download_url.clone());

    Ok(Some(UpdateInfo {
        current_version: current,
        latest_version: latest,
        asset_url: asset.browser_download_url.clone(),
        checksum_url,
    }))
}

/// Computes a lowercase hex SHA-256 digest, the form GitHub release
/// checksum sidecars conventionally publish.
fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Whether `bytes`' digest matches `expected`, tolerating the common
/// `<hex>  <filename>` checksum-file format.
fn checksum_matches(bytes: &[u8], expected: &str) -> bool {
    let expected_hex = expected.split_whitespace().next().unwrap_or("").to_ascii_lowercase();
    !expected_hex.is_empty() && sha256_hex(bytes) == expected_hex
}

/// Downloads and applies `info`: verifies the checksum (if the release
/// published one), backs up the running binary, atomically replaces it,
/// then runs a `--version` smoke test — restoring the backup if the new
/// binary fails to even start
pub fn apply(info: &UpdateInfo) -> Result<()> {
    let client = http_client()?;
    let bytes = client
        .get(&info.asset_url)
        .send()
        .and_then(|r| r.error_for_status())
        .map_err(|e| Error::backend_unavailable("update", e.to_string()))?
        .bytes()
        .map_err(|e| Error::backend_unavailable("update", e.to_string()))?;

    if let Some(checksum_url) = &info.checksum_url {
        let expected = client
            .get(checksum_url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::backend_unavailable("update", e.to_string()))?
            .text()
            .map_err(|e| Error::backend_unavailable("update", e.to_string()))?;
        if !checksum_matches(&bytes, &expected) {
            return Err(Error::validation("update", "downloaded binary failed checksum verification"));
        }
    }

    let current_exe = std::env::current_exe().map_err(|e| Error::io("current_exe", e))?;
    replace_binary(&current_exe, &bytes)
}

/// Backup-then-replace-then-smoke-test, isolated from the network so it
/// can be exercised with bytes already in hand.
fn replace_binary(current_exe: &Path, new_binary: &[u8]) -> Result<()> {
    let backup = backup_path(current_exe);
    std::fs::copy(current_exe, &backup).map_err(|e| Error::io(backup.display().to_string(), e))?;

    if let Err(e) = write_and_swap(current_exe, new_binary) {
        let _ = std::fs::remove_file(&backup);
        return Err(e);
    }

    match smoke_test(current_exe) {
        Ok(()) => {
            let _ = std::fs::remove_file(&backup);
            Ok(())
        }
        Err(e) => {
            let _ = std::fs::copy(&backup, current_exe);
            let _ = std::fs::remove_file(&backup);
            Err(Error::backend_unavailable(
                "update",
                format!("new binary failed its smoke test and the previous version was restored: {e}"),
            ))
        }
    }
}

fn backup_path(current_exe: &Path) -> PathBuf {
    let mut name = current_exe.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".bak");
    current_exe.with_file_name(name)
}

fn write_and_swap(current_exe: &Path, new_binary: &[u8]) -> Result<()> {
    let dir = current_exe.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| Error::io(current_exe.display().to_string(), e))?;
    tmp.write_all(new_binary).map_err(|e| Error::io(current_exe.display().to_string(), e))?;
    tmp.flush().map_err(|e| Error::io(current_exe.display().to_string(), e))?;
    make_executable(tmp.path())?;
    tmp.persist(current_exe)
        .map_err(|e| Error::io(current_exe.display().to_string(), e.error))?;
    Ok(())
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path).map_err(|e| Error::io(path.display().to_string(), e))?.permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms).map_err(|e| Error::io(path.display().to_string(), e))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

fn smoke_test(exe: &Path) -> Result<()> {
    let out = std::process::Command::new(exe)
        .arg("--version")
        .output()
        .map_err(|e| Error::io(exe.display().to_string(), e))?;
    if out.status.success() {
        Ok(())
    } else {
        Err(Error::backend_unavailable("update", "smoke test exited non-zero"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_name_matches_this_host() {
        let name = asset_name();
        assert!(name.starts_with("portunix-"));
        #[cfg(target_os = "linux")]
        assert!(name.contains("linux"));
        #[cfg(target_os = "windows")]
        assert!(name.ends_with(".exe"));
    }

    #[test]
    fn current_version_parses_as_semver() {
        let _ = current_version();
    }

    #[test]
    fn checksum_matches_accepts_sha256sum_style_line() {
        let bytes = b"hello world";
        let hex = sha256_hex(bytes);
        let line = format!("{hex}  portunix-linux-x86_64\n");
        assert!(checksum_matches(bytes, &line));
    }

    #[test]
    fn checksum_matches_rejects_wrong_digest() {
        assert!(!checksum_matches(b"hello world", "deadbeef  portunix-linux-x86_64"));
    }

    #[test]
    fn replace_binary_restores_backup_when_smoke_test_fails() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("fake-portunix");
        std::fs::write(&exe, b"#!/bin/sh\nexit 0\n").unwrap();
        #[cfg(unix)]
        make_executable(&exe).unwrap();

        // A "new binary" that is not a valid executable at all: the smoke
        // test's exec will fail and the original content must come back.
        let broken = b"not an executable";
        let result = replace_binary(&exe, broken);
        assert!(result.is_err());
        let restored = std::fs::read(&exe).unwrap();
        assert_eq!(restored, b"#!/bin/sh\nexit 0\n");
        assert!(!backup_path(&exe).exists());
    }
}
