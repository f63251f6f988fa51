//! Host-side async client for the plugin RPC contract
//!
//!
//! The plugin binds [`PLUGIN_ENDPOINT`] and accepts connections
//! (`portunix-plugin-sdk::serve`); the host is the client here, opening a
//! small pool of connections per plugin so concurrent tool calls up to the
//! manifest's `max_concurrency` don't queue behind each other on one
//! socket

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use portunix_protocol::{
    CallToolRequest, CallToolResponse, ExecuteRequest, ExecuteResponse, HealthStatus,
    ListToolsResponse, PluginInfo, ProtocolError, RpcMessage, RpcMessageType,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UnixStream};
use tokio::sync::Mutex;

use crate::error::{Error, Result};

/// `tcp://host:port` or `unix:/path/to/socket`, as injected into the
/// plugin's environment via `PLUGIN_ENDPOINT`.
#[derive(Debug, Clone)]
pub enum Endpoint {
    Tcp(String),
    Unix(String),
}

impl Endpoint {
    pub fn as_env_value(&self) -> String {
        match self {
            Endpoint::Tcp(addr) => format!("tcp://{addr}"),
            Endpoint::Unix(path) => format!("unix:{path}"),
        }
    }
}

enum Wire {
    Tcp(TcpStream),
    Unix(UnixStream),
}

impl Wire {
    async fn connect(endpoint: &Endpoint) -> Result<Self> {
        match endpoint {
            Endpoint::Tcp(addr) => {
                let stream = tokio::time::timeout(
                    crate::process::DEFAULT_CONNECT_TIMEOUT,
                    TcpStream::connect(addr),
                )
                .await
                .map_err(|_| Error::timeout(addr.clone(), "plugin-rpc-connect", 3))?
                .map_err(|e| Error::io(addr.clone(), e))?;
                Ok(Wire::Tcp(stream))
            }
            Endpoint::Unix(path) => {
                let stream = tokio::time::timeout(
                    crate::process::DEFAULT_CONNECT_TIMEOUT,
                    UnixStream::connect(path),
                )
                .await
                .map_err(|_| Error::timeout(path.clone(), "plugin-rpc-connect", 3))?
                .map_err(|e| Error::io(path.clone(), e))?;
                Ok(Wire::Unix(stream))
            }
        }
    }

    async fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        match self {
            Wire::Tcp(s) => s.write_all(buf).await,
            Wire::Unix(s) => s.write_all(buf).await,
        }
    }

    async fn read_exact(&mut self, buf: &mut [u8]) -> std::io::Result<()> {
        match self {
            Wire::Tcp(s) => s.read_exact(buf).await.map(|_| ()),
            Wire::Unix(s) => s.read_exact(buf).await.map(|_| ()),
        }
    }
}

/// Default ceiling for a single plugin RPC call
pub const DEFAULT_RPC_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

struct Slot {
    wire: Mutex<Option<Wire>>,
}

/// A small pool of independent connections to one plugin's endpoint.
/// Each call borrows the next slot round-robin and reconnects lazily if
/// the cached connection was dropped (plugin restarted).
pub struct PluginConnection {
    endpoint: Endpoint,
    slots: Vec<Slot>,
    next: AtomicUsize,
    plugin_name: String,
}

impl PluginConnection {
    pub fn new(plugin_name: impl Into<String>, endpoint: Endpoint, pool_size: usize) -> Self {
        let pool_size = pool_size.max(1);
        Self {
            endpoint,
            slots: (0..pool_size).map(|_| Slot { wire: Mutex::new(None) }).collect(),
            next: AtomicUsize::new(0),
            plugin_name: plugin_name.into(),
        }
    }

    fn pick_slot(&self) -> &Slot {
        let i = self.next.fetch_add(1, Ordering::Relaxed) % self.slots.len();
        &self.slots[i]
    }

    async fn roundtrip(&self, msg_type: RpcMessageType, payload: &impl serde::Serialize) -> Result<RpcMessage> {
        let slot = self.pick_slot();
        let mut guard = slot.wire.lock().await;
        if guard.is_none() {
            *guard = Some(Wire::connect(&self.endpoint).await?);
        }
        let req = RpcMessage::new(msg_type, 0, payload).map_err(|e| protocol_err(&self.plugin_name, e))?;
        let bytes = req.serialize();

        let result = async {
            let wire = guard.as_mut().expect("connection just populated");
            wire.write_all(&bytes)
                .await
                .map_err(|e| Error::io(self.plugin_name.clone(), e))?;
            read_message(wire).await
        }
        .await;

        if result.is_err() {
            // Drop the stale connection so the next call reconnects.
            *guard = None;
        }
        result
    }

    pub async fn get_info(&self) -> Result<PluginInfo> {
        let reply = self.roundtrip(RpcMessageType::GetInfoRequest, &()).await?;
        reply.decode().map_err(|e| protocol_err(&self.plugin_name, e))
    }

    pub async fn health_check(&self) -> Result<HealthStatus> {
        let reply = self.roundtrip(RpcMessageType::HealthCheckRequest, &()).await?;
        reply.decode().map_err(|e| protocol_err(&self.plugin_name, e))
    }

    pub async fn shutdown(&self) -> Result<()> {
        let _ = self.roundtrip(RpcMessageType::ShutdownRequest, &()).await?;
        Ok(())
    }

    pub async fn execute(&self, req: ExecuteRequest) -> Result<ExecuteResponse> {
        let reply = self.roundtrip(RpcMessageType::ExecuteRequest, &req).await?;
        reply.decode().map_err(|e| protocol_err(&self.plugin_name, e))
    }

    pub async fn call_tool(&self, req: CallToolRequest) -> Result<CallToolResponse> {
        let reply = self.roundtrip(RpcMessageType::CallToolRequest, &req).await?;
        reply.decode().map_err(|e| protocol_err(&self.plugin_name, e))
    }

    pub async fn list_tools(&self) -> Result<ListToolsResponse> {
        let reply = self.roundtrip(RpcMessageType::ListToolsRequest, &()).await?;
        reply.decode().map_err(|e| protocol_err(&self.plugin_name, e))
    }
}

async fn read_message(wire: &mut Wire) -> Result<RpcMessage> {
    let mut header = [0u8; portunix_protocol::HEADER_SIZE];
    wire.read_exact(&mut header)
        .await
        .map_err(|e| Error::io("plugin-rpc", e))?;
    let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
    if length < 8 {
        return Err(Error::Protocol {
            context: "plugin-rpc".to_string(),
            source: ProtocolError::InvalidMessage("message missing id".into()),
        });
    }
    let mut rest = vec![0u8; length];
    wire.read_exact(&mut rest).await.map_err(|e| Error::io("plugin-rpc", e))?;
    let mut framed = Vec::with_capacity(portunix_protocol::HEADER_SIZE + length);
    framed.extend_from_slice(&header);
    framed.extend_from_slice(&rest);
    RpcMessage::deserialize(&framed).map_err(|e| protocol_err("plugin-rpc", e))
}

fn protocol_err(context: &str, source: ProtocolError) -> Error {
    Error::Protocol {
        context: context.to_string(),
        source,
    }
}

/// A trivial client usable purely for tests / local experimentation with
/// an in-process mock plugin over a Unix socket pair.
#[async_trait]
pub trait RpcClient: Send + Sync {
    async fn health(&self) -> Result<HealthStatus>;
}

#[async_trait]
impl RpcClient for PluginConnection {
    async fn health(&self) -> Result<HealthStatus> {
        self.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portunix_protocol::{HealthPhase, RpcStatus};
    use tokio::net::TcpListener;

    /// Reads one framed `RpcMessage` and replies with a canned response,
    /// emulating the `portunix-plugin-sdk::serve` accept loop closely
    /// enough to exercise the host-side wire format end to end without
    /// spawning a real child process.
    async fn fake_plugin(listener: TcpListener) {
        let (mut stream, _) = listener.accept().await.unwrap();
        loop {
            let mut header = [0u8; portunix_protocol::HEADER_SIZE];
            if stream.read_exact(&mut header).await.is_err() {
                return;
            }
            let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
            let mut rest = vec![0u8; length];
            stream.read_exact(&mut rest).await.unwrap();
            let mut framed = Vec::with_capacity(header.len() + rest.len());
            framed.extend_from_slice(&header);
            framed.extend_from_slice(&rest);
            let request = RpcMessage::deserialize(&framed).unwrap();

            let reply = match request.msg_type {
                RpcMessageType::GetInfoRequest => RpcMessage::new(
                    RpcMessageType::GetInfoResponse,
                    request.id,
                    &PluginInfo {
                        name: "fake-plugin".into(),
                        version: "0.1.0".into(),
                        plugin_type: "tool".into(),
                        capabilities: vec![],
                    },
                ),
                RpcMessageType::HealthCheckRequest => RpcMessage::new(
                    RpcMessageType::HealthCheckResponse,
                    request.id,
                    &HealthStatus {
                        phase: HealthPhase::Ready,
                        liveness: true,
                        readiness: true,
                        detail: None,
                    },
                ),
                RpcMessageType::CallToolRequest => {
                    let req: CallToolRequest = request.decode().unwrap();
                    let result = if req.name == "uppercase" {
                        serde_json::json!(req.args["text"].as_str().unwrap_or_default().to_uppercase())
                    } else {
                        serde_json::Value::Null
                    };
                    RpcMessage::new(
                        RpcMessageType::CallToolResponse,
                        request.id,
                        &CallToolResponse {
                            result,
                            status: RpcStatus::Success,
                            error: None,
                        },
                    )
                }
                other => panic!("fake_plugin received unexpected message type {other:?}"),
            }
            .unwrap();
            stream.write_all(&reply.serialize()).await.unwrap();
        }
    }

    #[tokio::test]
    async fn round_trips_get_info_health_and_call_tool_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(fake_plugin(listener));

        let conn = PluginConnection::new("fake-plugin", Endpoint::Tcp(addr.to_string()), 1);

        let info = conn.get_info().await.unwrap();
        assert_eq!(info.name, "fake-plugin");

        let health = conn.health_check().await.unwrap();
        assert!(health.liveness && health.readiness);

        let resp = conn
            .call_tool(CallToolRequest {
                name: "uppercase".into(),
                args: serde_json::json!({"text": "abc"}),
            })
            .await
            .unwrap();
        assert_eq!(resp.status, RpcStatus::Success);
        assert_eq!(resp.result, serde_json::json!("ABC"));
    }
}
