//! SDK for plugin authors implementing the portunix plugin RPC contract.
//!
//! A plugin is a standalone executable. The host launches it with the
//! transport endpoint injected via the `PLUGIN_ENDPOINT` environment
//! variable (`tcp://127.0.0.1:PORT` or `unix:/path/to/socket`) and polls
//! `HealthCheck` until the plugin reports ready. This crate hides the
//! framed-JSON wire format behind a single trait so a plugin author only
//! has to answer `GetInfo`/`HealthCheck`/`Shutdown` and whichever optional
//! methods their plugin supports.
//!
//! ```no_run
//! use portunix_plugin_sdk::{serve, PluginHandler};
//! use portunix_protocol::{PluginInfo, HealthStatus, HealthPhase};
//!
//! struct Demo;
//!
//! impl PluginHandler for Demo {
//!     fn get_info(&self) -> PluginInfo {
//!         PluginInfo {
//!             name: "demo-plugin".into(),
//!             version: "0.1.0".into(),
//!             plugin_type: "tool".into(),
//!             capabilities: vec![],
//!         }
//!     }
//!
//!     fn health_check(&self) -> HealthStatus {
//!         HealthStatus { phase: HealthPhase::Ready, liveness: true, readiness: true, detail: None }
//!     }
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     serve(Demo)?;
//!     Ok(())
//! }
//! ```

use std::io::{BufReader, BufWriter};
use std::net::{TcpListener, TcpStream};
#[cfg(unix)]
use std::os::unix::net::{UnixListener, UnixStream};

use portunix_protocol::{
    CallToolRequest, CallToolResponse, ConfigureRequest, ConfigureResponse, ExecuteRequest,
    ExecuteResponse, HealthStatus, ListToolsResponse, PluginInfo, ProtocolError, RpcMessage,
    RpcMessageType, RpcStatus, ToolDescriptor,
};

/// Errors that can occur while serving the plugin RPC endpoint.
#[derive(Debug, thiserror::Error)]
pub enum SdkError {
    #[error("PLUGIN_ENDPOINT is not set")]
    MissingEndpoint,
    #[error("unsupported endpoint scheme: {0}")]
    UnsupportedScheme(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// The methods a plugin must (and may) implement. Defaults return
/// `NotFound`/empty results for the optional ones (`execute`, `configure`,
/// `list_tools`, `call_tool`).
pub trait PluginHandler: Send {
    /// Returns the plugin's descriptor, used by `GetInfo`.
    fn get_info(&self) -> PluginInfo;

    /// Liveness/readiness/startup-phase probe, polled every second by the
    /// host for up to 30s after launch.
    fn health_check(&self) -> HealthStatus;

    /// Called when the host requests a graceful shutdown. The default
    /// implementation does nothing; override to flush state, drain
    /// connections, etc. The host waits up to 10s before sending a
    /// termination signal.
    fn shutdown(&mut self) {}

    /// Runs an arbitrary command. Unimplemented by default.
    fn execute(&mut self, req: ExecuteRequest) -> ExecuteResponse {
        let _ = req;
        ExecuteResponse {
            result: serde_json::Value::Null,
            status: RpcStatus::NotFound,
            error: Some("execute not implemented".into()),
        }
    }

    /// Applies a configuration payload. Unimplemented by default.
    fn configure(&mut self, req: ConfigureRequest) -> ConfigureResponse {
        let _ = req;
        ConfigureResponse {
            status: RpcStatus::NotFound,
            error: Some("configure not implemented".into()),
        }
    }

    /// Lists the MCP tools this plugin exposes. Empty by default.
    fn list_tools(&self) -> Vec<ToolDescriptor> {
        Vec::new()
    }

    /// Invokes one of the tools returned by `list_tools`. Unimplemented by
    /// default.
    fn call_tool(&mut self, req: CallToolRequest) -> CallToolResponse {
        CallToolResponse {
            result: serde_json::Value::Null,
            status: RpcStatus::NotFound,
            error: Some(format!("no such tool: {}", req.name)),
        }
    }
}

enum Endpoint {
    Tcp(String),
    #[cfg(unix)]
    Unix(String),
}

fn parse_endpoint(raw: &str) -> Result<Endpoint, SdkError> {
    if let Some(addr) = raw.strip_prefix("tcp://") {
        Ok(Endpoint::Tcp(addr.to_string()))
    } else if let Some(path) = raw.strip_prefix("unix:") {
        #[cfg(unix)]
        {
            Ok(Endpoint::Unix(path.to_string()))
        }
        #[cfg(not(unix))]
        {
            let _ = path;
            Err(SdkError::UnsupportedScheme("unix".into()))
        }
    } else {
        Err(SdkError::UnsupportedScheme(raw.to_string()))
    }
}

/// Read the endpoint from `PLUGIN_ENDPOINT`, bind it, accept connections in
/// a loop, and dispatch each framed [`RpcMessage`] to `handler`. Each
/// connection is handled sequentially; the manifest's declared
/// `concurrency` is the host's problem, not the plugin's, because the host
/// only forwards one in-flight call per connection slot.
pub fn serve(mut handler: impl PluginHandler) -> Result<(), SdkError> {
    let raw = std::env::var("PLUGIN_ENDPOINT").map_err(|_| SdkError::MissingEndpoint)?;
    match parse_endpoint(&raw)? {
        Endpoint::Tcp(addr) => {
            let listener = TcpListener::bind(&addr)?;
            for stream in listener.incoming() {
                let stream = stream?;
                if !serve_connection(&mut handler, stream.try_clone()?, stream)? {
                    break;
                }
            }
        }
        #[cfg(unix)]
        Endpoint::Unix(path) => {
            let _ = std::fs::remove_file(&path);
            let listener = UnixListener::bind(&path)?;
            for stream in listener.incoming() {
                let stream = stream?;
                if !serve_connection(&mut handler, stream.try_clone()?, stream)? {
                    break;
                }
            }
        }
    }
    Ok(())
}

/// Returns `false` when the handler was asked to shut down, so the accept
/// loop can exit.
fn serve_connection<R, W>(
    handler: &mut impl PluginHandler,
    reader_src: R,
    writer_src: W,
) -> Result<bool, SdkError>
where
    R: std::io::Read,
    W: std::io::Write,
{
    let mut reader = BufReader::new(reader_src);
    let mut writer = BufWriter::new(writer_src);
    loop {
        let msg = match RpcMessage::read_from_sync(&mut reader) {
            Ok(m) => m,
            Err(ProtocolError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Ok(true);
            }
            Err(e) => return Err(e.into()),
        };
        let keep_going = dispatch_one(handler, &msg, &mut writer)?;
        if !keep_going {
            return Ok(false);
        }
    }
}

fn dispatch_one<W: std::io::Write>(
    handler: &mut impl PluginHandler,
    msg: &RpcMessage,
    writer: &mut W,
) -> Result<bool, SdkError> {
    let reply = match msg.msg_type {
        RpcMessageType::GetInfoRequest => {
            RpcMessage::new(RpcMessageType::GetInfoResponse, msg.id, &handler.get_info())?
        }
        RpcMessageType::HealthCheckRequest => RpcMessage::new(
            RpcMessageType::HealthCheckResponse,
            msg.id,
            &handler.health_check(),
        )?,
        RpcMessageType::ShutdownRequest => {
            handler.shutdown();
            let reply = RpcMessage::new(RpcMessageType::ShutdownResponse, msg.id, &())?;
            reply.write_to_sync(writer)?;
            return Ok(false);
        }
        RpcMessageType::ExecuteRequest => {
            let req: ExecuteRequest = msg.decode()?;
            RpcMessage::new(RpcMessageType::ExecuteResponse, msg.id, &handler.execute(req))?
        }
        RpcMessageType::ConfigureRequest => {
            let req: ConfigureRequest = msg.decode()?;
            RpcMessage::new(
                RpcMessageType::ConfigureResponse,
                msg.id,
                &handler.configure(req),
            )?
        }
        RpcMessageType::ListToolsRequest => {
            let resp = ListToolsResponse {
                tools: handler.list_tools(),
            };
            RpcMessage::new(RpcMessageType::ListToolsResponse, msg.id, &resp)?
        }
        RpcMessageType::CallToolRequest => {
            let req: CallToolRequest = msg.decode()?;
            RpcMessage::new(
                RpcMessageType::CallToolResponse,
                msg.id,
                &handler.call_tool(req),
            )?
        }
        RpcMessageType::CancelRequest => return Ok(true),
        RpcMessageType::GetInfoResponse
        | RpcMessageType::HealthCheckResponse
        | RpcMessageType::ShutdownResponse
        | RpcMessageType::ExecuteResponse
        | RpcMessageType::ConfigureResponse
        | RpcMessageType::ListToolsResponse
        | RpcMessageType::CallToolResponse => {
            return Err(SdkError::Protocol(ProtocolError::InvalidMessage(
                "plugin received a response-typed message".into(),
            )))
        }
    };
    reply.write_to_sync(writer)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl PluginHandler for Echo {
        fn get_info(&self) -> PluginInfo {
            PluginInfo {
                name: "echo".into(),
                version: "0.1.0".into(),
                plugin_type: "tool".into(),
                capabilities: vec![],
            }
        }

        fn health_check(&self) -> HealthStatus {
            HealthStatus {
                phase: portunix_protocol::HealthPhase::Ready,
                liveness: true,
                readiness: true,
                detail: None,
            }
        }

        fn call_tool(&mut self, req: CallToolRequest) -> CallToolResponse {
            CallToolResponse {
                result: req.args,
                status: RpcStatus::Success,
                error: None,
            }
        }
    }

    #[test]
    fn dispatch_get_info_reply_has_matching_id() {
        let mut handler = Echo;
        let req = RpcMessage::new(RpcMessageType::GetInfoRequest, 5, &()).unwrap();
        let mut buf = Vec::new();
        dispatch_one(&mut handler, &req, &mut buf).unwrap();
        let reply = RpcMessage::deserialize(&buf).unwrap();
        assert_eq!(reply.id, 5);
        assert_eq!(reply.msg_type, RpcMessageType::GetInfoResponse);
    }

    #[test]
    fn dispatch_call_tool_echoes_args() {
        let mut handler = Echo;
        let payload = CallToolRequest {
            name: "anything".into(),
            args: serde_json::json!({"x": 1}),
        };
        let req = RpcMessage::new(RpcMessageType::CallToolRequest, 1, &payload).unwrap();
        let mut buf = Vec::new();
        dispatch_one(&mut handler, &req, &mut buf).unwrap();
        let reply = RpcMessage::deserialize(&buf).unwrap();
        let decoded: CallToolResponse = reply.decode().unwrap();
        assert_eq!(decoded.status, RpcStatus::Success);
        assert_eq!(decoded.result, serde_json::json!({"x": 1}));
    }

    #[test]
    fn parse_endpoint_rejects_unknown_scheme() {
        assert!(matches!(
            parse_endpoint("http://x"),
            Err(SdkError::UnsupportedScheme(_))
        ));
    }
}
