//! Shared wire-format types for portunix host ↔ plugin RPC and the MCP
//! request/response envelope.
//!
//! This crate is the single source of truth for both wire formats so the
//! core (`portunix`), the MCP dispatcher (`portunix-mcp`) and third-party
//! plugin authors (via `portunix-plugin-sdk`) never duplicate struct
//! definitions.
//!
//! ## Plugin RPC wire format
//!
//! Every message is framed as:
//!
//! ```text
//! ┌──────────────┬───────────┬──────────────────┐
//! │ length (4 B) │ type (1B) │ payload (N bytes) │
//! └──────────────┴───────────┴──────────────────┘
//! ```
//!
//! - **length**: `u32` little-endian, size of the payload only (not
//!   including the 5-byte header).
//! - **type**: one byte mapping to [`RpcMessageType`].
//! - **payload**: JSON-encoded body (may be empty).

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Errors that can occur during protocol message framing.
#[derive(Debug)]
pub enum ProtocolError {
    /// Message buffer too short or incomplete.
    InvalidMessage(String),
    /// The type byte does not map to a known [`RpcMessageType`].
    UnknownMessageType(u8),
    /// An I/O error occurred while reading or writing.
    Io(std::io::Error),
    /// JSON (de)serialization failed.
    Json(serde_json::Error),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::InvalidMessage(msg) => write!(f, "invalid message: {msg}"),
            ProtocolError::UnknownMessageType(b) => write!(f, "unknown message type: {b}"),
            ProtocolError::Io(e) => write!(f, "I/O error: {e}"),
            ProtocolError::Json(e) => write!(f, "JSON error: {e}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

impl From<std::io::Error> for ProtocolError {
    fn from(e: std::io::Error) -> Self {
        ProtocolError::Io(e)
    }
}

impl From<serde_json::Error> for ProtocolError {
    fn from(e: serde_json::Error) -> Self {
        ProtocolError::Json(e)
    }
}

// ---------------------------------------------------------------------------
// Plugin RPC framing
// ---------------------------------------------------------------------------

/// Header size in bytes: 4 (length) + 1 (type).
pub const HEADER_SIZE: usize = 5;

/// Message types exchanged between the plugin host and a plugin child
/// process. One request type always pairs with exactly one response type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum RpcMessageType {
    GetInfoRequest = 1,
    GetInfoResponse = 2,
    HealthCheckRequest = 3,
    HealthCheckResponse = 4,
    ShutdownRequest = 5,
    ShutdownResponse = 6,
    ExecuteRequest = 7,
    ExecuteResponse = 8,
    ConfigureRequest = 9,
    ConfigureResponse = 10,
    ListToolsRequest = 11,
    ListToolsResponse = 12,
    CallToolRequest = 13,
    CallToolResponse = 14,
    /// Best-effort cancellation of an in-flight request.
    CancelRequest = 15,
}

impl TryFrom<u8> for RpcMessageType {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            1 => Ok(Self::GetInfoRequest),
            2 => Ok(Self::GetInfoResponse),
            3 => Ok(Self::HealthCheckRequest),
            4 => Ok(Self::HealthCheckResponse),
            5 => Ok(Self::ShutdownRequest),
            6 => Ok(Self::ShutdownResponse),
            7 => Ok(Self::ExecuteRequest),
            8 => Ok(Self::ExecuteResponse),
            9 => Ok(Self::ConfigureRequest),
            10 => Ok(Self::ConfigureResponse),
            11 => Ok(Self::ListToolsRequest),
            12 => Ok(Self::ListToolsResponse),
            13 => Ok(Self::CallToolRequest),
            14 => Ok(Self::CallToolResponse),
            15 => Ok(Self::CancelRequest),
            _ => Err(ProtocolError::UnknownMessageType(byte)),
        }
    }
}

/// A framed RPC message consisting of a type tag, a correlation id and a
/// JSON payload.
#[derive(Debug, Clone)]
pub struct RpcMessage {
    /// Type of message.
    pub msg_type: RpcMessageType,
    /// Correlation id, echoed from request to response.
    pub id: u64,
    /// Message payload (JSON-encoded).
    pub payload: Vec<u8>,
}

impl RpcMessage {
    /// Build a message from a serializable payload.
    pub fn new<T: Serialize>(
        msg_type: RpcMessageType,
        id: u64,
        payload: &T,
    ) -> Result<Self, ProtocolError> {
        Ok(Self {
            msg_type,
            id,
            payload: serde_json::to_vec(payload)?,
        })
    }

    /// Decode the JSON payload into `T`.
    pub fn decode<T: for<'de> Deserialize<'de>>(&self) -> Result<T, ProtocolError> {
        Ok(serde_json::from_slice(&self.payload)?)
    }

    /// Serialize this message into a byte buffer (header + id + payload).
    pub fn serialize(&self) -> Vec<u8> {
        let payload_len = (self.payload.len() + 8) as u32;
        let mut buf = Vec::with_capacity(HEADER_SIZE + 8 + self.payload.len());
        buf.extend_from_slice(&payload_len.to_le_bytes());
        buf.push(self.msg_type as u8);
        buf.extend_from_slice(&self.id.to_le_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Deserialize a message from a contiguous byte slice.
    pub fn deserialize(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < HEADER_SIZE + 8 {
            return Err(ProtocolError::InvalidMessage("message too short".into()));
        }
        let length = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
        let msg_type = RpcMessageType::try_from(data[4])?;
        if data.len() < HEADER_SIZE + length {
            return Err(ProtocolError::InvalidMessage("incomplete message".into()));
        }
        let id = u64::from_le_bytes(data[HEADER_SIZE..HEADER_SIZE + 8].try_into().unwrap());
        let payload = data[HEADER_SIZE + 8..HEADER_SIZE + length].to_vec();
        Ok(Self {
            msg_type,
            id,
            payload,
        })
    }

    /// Read a complete message from a synchronous [`std::io::Read`] stream.
    pub fn read_from_sync<R: std::io::Read>(reader: &mut R) -> Result<Self, ProtocolError> {
        let mut header = [0u8; HEADER_SIZE];
        reader.read_exact(&mut header)?;
        let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let msg_type = RpcMessageType::try_from(header[4])?;
        if length < 8 {
            return Err(ProtocolError::InvalidMessage("message missing id".into()));
        }
        let mut rest = vec![0u8; length];
        reader.read_exact(&mut rest)?;
        let id = u64::from_le_bytes(rest[0..8].try_into().unwrap());
        let payload = rest[8..].to_vec();
        Ok(Self {
            msg_type,
            id,
            payload,
        })
    }

    /// Write this message to a synchronous [`std::io::Write`] stream.
    pub fn write_to_sync<W: std::io::Write>(&self, writer: &mut W) -> Result<(), ProtocolError> {
        writer.write_all(&self.serialize())?;
        writer.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Plugin RPC payload types
// ---------------------------------------------------------------------------

/// Status of a plugin RPC call, mirrored onto MCP status codes by the
/// dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RpcStatus {
    Success,
    InvalidArgs,
    NotFound,
    Error,
}

/// Response to `GetInfo`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginInfo {
    pub name: String,
    pub version: String,
    pub plugin_type: String,
    pub capabilities: Vec<String>,
}

/// Startup phases reported by `HealthCheck`, from cold start to steady
/// state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthPhase {
    Starting,
    Ready,
    Degraded,
}

/// Response to `HealthCheck`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub phase: HealthPhase,
    pub liveness: bool,
    pub readiness: bool,
    pub detail: Option<String>,
}

/// Request for `Execute`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub command: String,
    pub args: Vec<String>,
}

/// Response to `Execute`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub result: serde_json::Value,
    pub status: RpcStatus,
    pub error: Option<String>,
}

/// Request for `Configure`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigureRequest {
    pub config: serde_json::Value,
}

/// Response to `Configure`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigureResponse {
    pub status: RpcStatus,
    pub error: Option<String>,
}

/// A single MCP tool exposed by a plugin, as declared in the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Response to `ListTools`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListToolsResponse {
    pub tools: Vec<ToolDescriptor>,
}

/// Request for `CallTool`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolRequest {
    pub name: String,
    pub args: serde_json::Value,
}

/// Response to `CallTool`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolResponse {
    pub result: serde_json::Value,
    pub status: RpcStatus,
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// MCP request/response envelope
// ---------------------------------------------------------------------------

/// An MCP request id. The dispatcher round-trips whatever shape the caller
/// used verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{n}"),
            RequestId::String(s) => write!(f, "{s}"),
        }
    }
}

/// `{id, method, params}` — the single request shape every transport speaks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpRequest {
    pub id: RequestId,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// MCP-level error codes. `InvalidArgs`/`NotFound`/`Error` are the plugin
/// RPC statuses translated verbatim; `ParseError` and `Unauthorized` are
/// dispatcher-local.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum McpErrorCode {
    ParseError,
    InvalidArgs,
    NotFound,
    Unauthorized,
    Timeout,
    Error,
}

/// `{code, message}` — the error half of an MCP response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpError {
    pub code: McpErrorCode,
    pub message: String,
}

/// `{id, result}` | `{id, error}` — every request gets exactly one of
/// these on the same connection, with the id echoed verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpResponse {
    pub id: RequestId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<McpError>,
}

impl McpResponse {
    pub fn ok(id: RequestId, result: serde_json::Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: RequestId, code: McpErrorCode, message: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(McpError {
                code,
                message: message.into(),
            }),
        }
    }
}

impl From<RpcStatus> for McpErrorCode {
    fn from(status: RpcStatus) -> Self {
        match status {
            RpcStatus::Success => McpErrorCode::Error, // caller should not map Success to an error
            RpcStatus::InvalidArgs => McpErrorCode::InvalidArgs,
            RpcStatus::NotFound => McpErrorCode::NotFound,
            RpcStatus::Error => McpErrorCode::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_message_round_trips() {
        let req = ExecuteRequest {
            command: "ping".into(),
            args: vec![],
        };
        let msg = RpcMessage::new(RpcMessageType::ExecuteRequest, 42, &req).unwrap();
        let bytes = msg.serialize();
        let decoded = RpcMessage::deserialize(&bytes).unwrap();
        assert_eq!(decoded.id, 42);
        assert_eq!(decoded.msg_type, RpcMessageType::ExecuteRequest);
        let decoded_req: ExecuteRequest = decoded.decode().unwrap();
        assert_eq!(decoded_req.command, "ping");
    }

    #[test]
    fn rpc_message_rejects_short_buffer() {
        let err = RpcMessage::deserialize(&[1, 2, 3]).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidMessage(_)));
    }

    #[test]
    fn mcp_request_id_round_trips_through_json() {
        let req: McpRequest =
            serde_json::from_str(r#"{"id":7,"method":"ping","params":{}}"#).unwrap();
        assert_eq!(req.id, RequestId::Number(7));
        let resp = McpResponse::ok(req.id, serde_json::json!("pong"));
        let s = serde_json::to_string(&resp).unwrap();
        assert!(s.contains("\"id\":7"));
        assert!(!s.contains("\"error\""));
    }

    #[test]
    fn mcp_request_id_preserves_string_ids() {
        let req: McpRequest =
            serde_json::from_str(r#"{"id":"abc-1","method":"list_tools","params":null}"#)
                .unwrap();
        assert_eq!(req.id, RequestId::String("abc-1".into()));
    }
}
