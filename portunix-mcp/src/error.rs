//! Error types for the MCP dispatcher.

use portunix_protocol::McpErrorCode;

/// Errors a tool handler (core or plugin-forwarded) can report back to the
/// dispatcher. These map directly onto [`McpErrorCode`].
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),
    #[error("tool not found: {0}")]
    NotFound(String),
    #[error("tool call timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("tool call failed: {0}")]
    Internal(String),
}

impl ToolError {
    pub fn code(&self) -> McpErrorCode {
        match self {
            ToolError::InvalidArgs(_) => McpErrorCode::InvalidArgs,
            ToolError::NotFound(_) => McpErrorCode::NotFound,
            ToolError::Timeout(_) => McpErrorCode::Timeout,
            ToolError::Internal(_) => McpErrorCode::Error,
        }
    }
}

/// Errors that can occur while a transport listener is running.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("listener refused connection: concurrency limit ({0}) reached")]
    ConcurrencyLimitReached(usize),
}
