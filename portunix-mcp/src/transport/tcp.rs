//! TCP transport: default port 3001, concurrent connections up to a
//! configurable ceiling; the listener refuses new connections once the
//! ceiling is reached.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::dispatcher::Dispatcher;
use crate::profile::Profile;
use crate::transport::handle_connection;

/// Default TCP port for the MCP dispatcher.
pub const DEFAULT_PORT: u16 = 3001;

/// Default concurrency ceiling
pub const DEFAULT_MAX_CONCURRENCY: usize = 32;

/// Binds `addr` and serves connections until the process is killed or the
/// listener errors. Runs forever; callers typically spawn this on its own
/// task.
pub async fn serve(
    dispatcher: Arc<Dispatcher>,
    profile: Profile,
    addr: std::net::SocketAddr,
    max_concurrency: usize,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    let semaphore = Arc::new(Semaphore::new(max_concurrency));
    info!(%addr, max_concurrency, "mcp tcp transport listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        let permit = match Arc::clone(&semaphore).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!(%peer, max_concurrency, "refusing tcp connection: concurrency limit reached");
                drop(stream);
                continue;
            }
        };
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move {
            let (read_half, write_half) = stream.into_split();
            if let Err(e) = handle_connection(read_half, write_half, dispatcher, profile).await {
                warn!(%peer, error = %e, "mcp tcp connection ended with error");
            }
            drop(permit);
        });
    }
}
