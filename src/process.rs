//! Subprocess and atomic-file-write helpers shared by the virt backends,
//! container runtimes, and ssh/scp flows.

use std::path::Path;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;

use crate::error::{Error, Result};

/// Default ceiling for a child-process exec
pub const DEFAULT_EXEC_TIMEOUT: Duration = Duration::from_secs(120);

/// Default ceiling for a raw TCP connect probe
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// The captured result of running a child process to completion.
#[derive(Debug, Clone)]
pub struct Output {
    pub status: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl Output {
    pub fn success(&self) -> bool {
        self.status == 0
    }

    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Runs `program args…` to completion, killing it if it exceeds
/// `timeout_dur`. The child is reaped on every exit path, including
/// cancellation
pub async fn run(program: &str, args: &[&str], timeout_dur: Duration) -> Result<Output> {
    let entity = format!("{program} {}", args.join(" "));
    let mut child = Command::new(program)
        .args(args)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
        .map_err(|e| Error::io(entity.clone(), e))?;

    let wait = async {
        let out = child
            .wait_with_output()
            .await
            .map_err(|e| Error::io(entity.clone(), e))?;
        Ok::<_, Error>(Output {
            status: out.status.code().unwrap_or(-1),
            stdout: out.stdout,
            stderr: out.stderr,
        })
    };

    match timeout(timeout_dur, wait).await {
        Ok(result) => result,
        Err(_) => Err(Error::timeout(entity, "exec", timeout_dur.as_secs())),
    }
}

/// Convenience wrapper using [`DEFAULT_EXEC_TIMEOUT`].
pub async fn run_default(program: &str, args: &[&str]) -> Result<Output> {
    run(program, args, DEFAULT_EXEC_TIMEOUT).await
}

/// Probes whether `host:port` accepts a TCP connection within
/// [`DEFAULT_CONNECT_TIMEOUT`], without performing any protocol handshake
///
pub async fn tcp_port_open(host: &str, port: u16) -> bool {
    let addr = format!("{host}:{port}");
    matches!(
        timeout(DEFAULT_CONNECT_TIMEOUT, tokio::net::TcpStream::connect(&addr)).await,
        Ok(Ok(_))
    )
}

/// Writes `contents` to `path` atomically: a temp file in the same
/// directory is written and fsynced, then renamed over `path`. A crash or
/// cancellation mid-write never leaves a half-written file
pub fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| Error::io(path.display().to_string(), e))?;
    use std::io::Write;
    tmp.write_all(contents)
        .map_err(|e| Error::io(path.display().to_string(), e))?;
    tmp.flush().map_err(|e| Error::io(path.display().to_string(), e))?;
    tmp.persist(path)
        .map_err(|e| Error::io(path.display().to_string(), e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_captures_exit_status_and_stdout() {
        let out = run_default(
            if cfg!(windows) { "cmd" } else { "sh" },
            if cfg!(windows) {
                &["/C", "echo hi"]
            } else {
                &["-c", "echo hi"]
            },
        )
        .await
        .unwrap();
        assert!(out.success());
        assert!(out.stdout_str().contains("hi"));
    }

    #[tokio::test]
    async fn run_times_out_on_slow_command() {
        if cfg!(windows) {
            return;
        }
        let result = run("sleep", &["5"], Duration::from_millis(50)).await;
        assert!(matches!(result, Err(Error::Timeout { .. })));
    }

    #[test]
    fn atomic_write_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        atomic_write(&path, b"one").unwrap();
        atomic_write(&path, b"two").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "two");
    }
}
