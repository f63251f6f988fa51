//! stdio transport: one newline-framed request per line on stdin,
//! responses on stdout, single concurrent call.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::dispatcher::Dispatcher;
use crate::profile::Profile;
use crate::transport::process_line;

/// Serves requests from stdin until EOF. Logs MUST only go to stderr —
/// `tracing` is configured by the caller to do exactly that — so stdout
/// stays a clean protocol stream.
pub async fn serve(dispatcher: Arc<Dispatcher>, profile: Profile) -> std::io::Result<()> {
    let stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(stdin).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = process_line(&dispatcher, profile, &line).await;
        stdout.write_all(response.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }
    Ok(())
}
