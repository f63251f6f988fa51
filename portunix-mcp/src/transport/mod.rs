//! Transport listeners. Every transport speaks the same newline-framed
//! JSON [`McpRequest`]/[`McpResponse`] protocol; they differ only in how
//! bytes reach the dispatcher and how many requests may be in flight at
//! once.

pub mod stdio;
pub mod tcp;
#[cfg(unix)]
pub mod unix;

use std::sync::Arc;

use portunix_protocol::{McpErrorCode, McpRequest, McpResponse, RequestId};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use crate::dispatcher::Dispatcher;
use crate::profile::Profile;

/// Parses one line of input into a request, or a parse-error response
/// addressed to a best-effort id (`0`) if the line isn't valid JSON — the
/// spec requires a response for every request but malformed input has no
/// id to echo, so callers should treat id `0` specially or avoid sending
/// invalid frames.
pub fn parse_line(line: &str) -> Result<McpRequest, McpResponse> {
    serde_json::from_str(line).map_err(|e| {
        McpResponse::err(
            RequestId::Number(0),
            McpErrorCode::ParseError,
            format!("malformed request: {e}"),
        )
    })
}

/// Runs one request through the dispatcher and serializes the response as
/// a single line (no embedded newline, since JSON strings escape them).
pub async fn process_line(
    dispatcher: &Arc<Dispatcher>,
    profile: Profile,
    line: &str,
) -> String {
    let response = match parse_line(line) {
        Ok(req) => dispatcher.handle(profile, req).await,
        Err(resp) => resp,
    };
    serde_json::to_string(&response)
        .unwrap_or_else(|_| r#"{"id":0,"error":{"code":"ERROR","message":"failed to serialize response"}}"#.to_string())
}

/// Serves one bidirectional connection (TCP or Unix). Each line is
/// dispatched on its own task so a slow tool call cannot stall responses
/// for other in-flight requests on the same connection; a single writer
/// task serializes the interleaved responses onto the socket.
pub async fn handle_connection<R, W>(
    reader: R,
    writer: W,
    dispatcher: Arc<Dispatcher>,
    profile: Profile,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<String>(64);

    let writer_task = tokio::spawn(async move {
        let mut writer = writer;
        while let Some(line) = rx.recv().await {
            if writer.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            if writer.write_all(b"\n").await.is_err() {
                break;
            }
            if writer.flush().await.is_err() {
                break;
            }
        }
    });

    let mut lines = BufReader::new(reader).lines();
    let mut in_flight = Vec::new();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let dispatcher = Arc::clone(&dispatcher);
        let tx = tx.clone();
        in_flight.push(tokio::spawn(async move {
            let response = process_line(&dispatcher, profile, &line).await;
            let _ = tx.send(response).await;
        }));
    }
    for task in in_flight {
        let _ = task.await;
    }
    drop(tx);
    let _ = writer_task.await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ToolCatalog;

    #[tokio::test]
    async fn process_line_handles_malformed_json() {
        let dispatcher = Arc::new(Dispatcher::new(Arc::new(ToolCatalog::new())));
        let out = process_line(&dispatcher, Profile::Full, "not json").await;
        assert!(out.contains("PARSE_ERROR"));
    }

    #[tokio::test]
    async fn process_line_handles_ping() {
        let dispatcher = Arc::new(Dispatcher::new(Arc::new(ToolCatalog::new())));
        let out = process_line(&dispatcher, Profile::Full, r#"{"id":1,"method":"ping"}"#).await;
        assert!(out.contains("pong"));
    }
}
