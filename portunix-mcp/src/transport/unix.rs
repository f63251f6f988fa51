//! Local IPC transport: a Unix domain socket, local-only equivalent of the
//! TCP transport. The socket file is created with owner-only permissions
//!

use std::path::Path;
use std::sync::Arc;

use tokio::net::UnixListener;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::dispatcher::Dispatcher;
use crate::profile::Profile;
use crate::transport::handle_connection;

/// Default socket filename, rooted under the OS temp directory by the
/// caller
pub const DEFAULT_SOCKET_NAME: &str = "portunix.sock";

/// Binds `path` (removing a stale socket file if present) and serves
/// connections until the process is killed or the listener errors.
pub async fn serve(
    dispatcher: Arc<Dispatcher>,
    profile: Profile,
    path: &Path,
    max_concurrency: usize,
) -> std::io::Result<()> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    let listener = UnixListener::bind(path)?;
    set_owner_only_permissions(path)?;
    let semaphore = Arc::new(Semaphore::new(max_concurrency));
    info!(path = %path.display(), max_concurrency, "mcp unix transport listening");

    loop {
        let (stream, _addr) = listener.accept().await?;
        let permit = match Arc::clone(&semaphore).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!(max_concurrency, "refusing unix connection: concurrency limit reached");
                drop(stream);
                continue;
            }
        };
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move {
            let (read_half, write_half) = stream.into_split();
            if let Err(e) = handle_connection(read_half, write_half, dispatcher, profile).await {
                warn!(error = %e, "mcp unix connection ended with error");
            }
            drop(permit);
        });
    }
}

#[cfg(unix)]
fn set_owner_only_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(0o600);
    std::fs::set_permissions(path, perms)
}
