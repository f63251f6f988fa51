//! Request routing: validate → look up → invoke (core or plugin) → apply
//! timeout → translate status.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use portunix_protocol::{McpError, McpErrorCode, McpRequest, McpResponse, RequestId};
use serde::{Deserialize, Serialize};

use crate::catalog::{ToolCatalog, ToolOwner};
use crate::error::ToolError;
use crate::profile::Profile;

/// Default per-call timeout, overridable per tool
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// A core-owned tool implementation.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: serde_json::Value) -> Result<serde_json::Value, ToolError>;
}

/// Forwards a `CallTool` to a running plugin over its RPC connection. The
/// plugin host (in the `portunix` crate) implements this; the dispatcher
/// only depends on the trait, never on the plugin host's concrete types,
/// to keep `portunix-mcp` independently embeddable.
#[async_trait]
pub trait PluginCaller: Send + Sync {
    async fn call_tool(
        &self,
        plugin: &str,
        tool: &str,
        args: serde_json::Value,
        timeout: Duration,
    ) -> Result<serde_json::Value, ToolError>;
}

/// `{result: Value}` wrapper used for `get_info`/`ping`/`list_tools`
/// responses that aren't a raw tool-call result.
#[derive(Serialize)]
struct ListToolsResult {
    tools: Vec<crate::catalog::ToolEntry>,
}

#[derive(Deserialize)]
struct CallToolParams {
    name: String,
    #[serde(default)]
    args: serde_json::Value,
}

/// The MCP dispatcher. One instance is shared across every transport
/// listener
pub struct Dispatcher {
    catalog: Arc<ToolCatalog>,
    core_handlers: HashMap<String, Arc<dyn ToolHandler>>,
    plugin_caller: Option<Arc<dyn PluginCaller>>,
    per_tool_timeout: HashMap<String, Duration>,
}

impl Dispatcher {
    pub fn new(catalog: Arc<ToolCatalog>) -> Self {
        Self {
            catalog,
            core_handlers: HashMap::new(),
            plugin_caller: None,
            per_tool_timeout: HashMap::new(),
        }
    }

    pub fn with_plugin_caller(mut self, caller: Arc<dyn PluginCaller>) -> Self {
        self.plugin_caller = Some(caller);
        self
    }

    /// Registers the handler for a core tool. `namespaced_name` must match
    /// the name used when the tool was registered in the catalog
    /// (`core.<tool>`).
    pub fn register_core_handler(
        &mut self,
        namespaced_name: impl Into<String>,
        handler: Arc<dyn ToolHandler>,
    ) {
        self.core_handlers.insert(namespaced_name.into(), handler);
    }

    pub fn set_tool_timeout(&mut self, namespaced_name: impl Into<String>, timeout: Duration) {
        self.per_tool_timeout.insert(namespaced_name.into(), timeout);
    }

    pub fn catalog(&self) -> &Arc<ToolCatalog> {
        &self.catalog
    }

    /// Handles one request under the given session profile, returning the
    /// response to send back on the same connection. Never panics on
    /// malformed input — every failure path returns a structured
    /// [`McpResponse`].
    pub async fn handle(&self, profile: Profile, req: McpRequest) -> McpResponse {
        let id = req.id.clone();
        match req.method.as_str() {
            "ping" => McpResponse::ok(id, serde_json::json!("pong")),
            "get_info" => McpResponse::ok(
                id,
                serde_json::json!({
                    "name": "portunix",
                    "profile": profile_label(profile),
                }),
            ),
            "list_tools" => {
                let tools: Vec<_> = self
                    .catalog
                    .list()
                    .into_iter()
                    .filter(|t| profile.allows(t))
                    .collect();
                McpResponse::ok(
                    id,
                    serde_json::to_value(ListToolsResult { tools }).unwrap_or(serde_json::Value::Null),
                )
            }
            "call_tool" => self.handle_call_tool(id, profile, req.params).await,
            other => McpResponse::err(
                id,
                McpErrorCode::InvalidArgs,
                format!("unknown method: {other}"),
            ),
        }
    }

    async fn handle_call_tool(
        &self,
        id: RequestId,
        profile: Profile,
        params: serde_json::Value,
    ) -> McpResponse {
        let params: CallToolParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => {
                return McpResponse::err(
                    id,
                    McpErrorCode::ParseError,
                    format!("invalid call_tool params: {e}"),
                )
            }
        };

        let entry = match self.catalog.get(&params.name) {
            Some(e) => e,
            None => {
                return McpResponse::err(
                    id,
                    McpErrorCode::NotFound,
                    format!("no such tool: {}", params.name),
                )
            }
        };

        if !profile.allows(&entry) {
            return McpResponse::err(
                id,
                McpErrorCode::Unauthorized,
                format!("tool {} is outside this session's profile", entry.name),
            );
        }

        let timeout = self
            .per_tool_timeout
            .get(&entry.name)
            .copied()
            .unwrap_or(DEFAULT_TOOL_TIMEOUT);

        let result = match &entry.owner {
            ToolOwner::Core => match self.core_handlers.get(&entry.name) {
                Some(handler) => {
                    let handler = Arc::clone(handler);
                    let args = params.args.clone();
                    match tokio::time::timeout(timeout, handler.call(args)).await {
                        Ok(r) => r,
                        Err(_) => Err(ToolError::Timeout(timeout)),
                    }
                }
                None => Err(ToolError::Internal(format!(
                    "tool {} is registered but has no handler",
                    entry.name
                ))),
            },
            ToolOwner::Plugin(plugin) => match &self.plugin_caller {
                Some(caller) => {
                    let tool = entry
                        .name
                        .strip_prefix(&format!("{plugin}."))
                        .unwrap_or(&entry.name);
                    caller
                        .call_tool(plugin, tool, params.args.clone(), timeout)
                        .await
                }
                None => Err(ToolError::Internal("no plugin host configured".into())),
            },
        };

        match result {
            Ok(value) => McpResponse::ok(id, value),
            Err(e) => McpResponse::err(id, e.code(), e.to_string()),
        }
    }
}

fn profile_label(profile: Profile) -> &'static str {
    match profile {
        Profile::Limited => "limited",
        Profile::Standard => "standard",
        Profile::Full => "full",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{namespaced_name, ToolEntry};

    struct Echo;

    #[async_trait]
    impl ToolHandler for Echo {
        async fn call(&self, args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
            Ok(args)
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl ToolHandler for AlwaysFails {
        async fn call(&self, _args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
            Err(ToolError::Internal("boom".into()))
        }
    }

    fn build_dispatcher() -> Dispatcher {
        let catalog = Arc::new(ToolCatalog::new());
        let name = namespaced_name(&ToolOwner::Core, "echo");
        catalog
            .register(ToolEntry {
                name: name.clone(),
                description: "echoes input".into(),
                input_schema: serde_json::json!({}),
                owner: ToolOwner::Core,
                capability_tags: vec![],
            })
            .unwrap();
        let mut dispatcher = Dispatcher::new(catalog);
        dispatcher.register_core_handler(name, Arc::new(Echo));
        dispatcher
    }

    fn req(method: &str, params: serde_json::Value) -> McpRequest {
        McpRequest {
            id: RequestId::Number(1),
            method: method.into(),
            params,
        }
    }

    #[tokio::test]
    async fn ping_returns_pong() {
        let dispatcher = build_dispatcher();
        let resp = dispatcher.handle(Profile::Full, req("ping", serde_json::Value::Null)).await;
        assert_eq!(resp.result.unwrap(), serde_json::json!("pong"));
    }

    #[tokio::test]
    async fn call_tool_routes_to_core_handler() {
        let dispatcher = build_dispatcher();
        let resp = dispatcher
            .handle(
                Profile::Full,
                req(
                    "call_tool",
                    serde_json::json!({"name": "core.echo", "args": {"x": 1}}),
                ),
            )
            .await;
        assert_eq!(resp.result.unwrap(), serde_json::json!({"x": 1}));
    }

    #[tokio::test]
    async fn call_tool_unknown_name_is_not_found() {
        let dispatcher = build_dispatcher();
        let resp = dispatcher
            .handle(
                Profile::Full,
                req("call_tool", serde_json::json!({"name": "core.nope"})),
            )
            .await;
        let err = resp.error.unwrap();
        assert_eq!(err.code, McpErrorCode::NotFound);
    }

    #[tokio::test]
    async fn call_tool_malformed_params_is_parse_error() {
        let dispatcher = build_dispatcher();
        let resp = dispatcher
            .handle(Profile::Full, req("call_tool", serde_json::json!(42)))
            .await;
        let err = resp.error.unwrap();
        assert_eq!(err.code, McpErrorCode::ParseError);
    }

    #[tokio::test]
    async fn call_tool_propagates_handler_error() {
        let catalog = Arc::new(ToolCatalog::new());
        let name = namespaced_name(&ToolOwner::Core, "broken");
        catalog
            .register(ToolEntry {
                name: name.clone(),
                description: "d".into(),
                input_schema: serde_json::json!({}),
                owner: ToolOwner::Core,
                capability_tags: vec![],
            })
            .unwrap();
        let mut dispatcher = Dispatcher::new(catalog);
        dispatcher.register_core_handler(name, Arc::new(AlwaysFails));
        let resp = dispatcher
            .handle(
                Profile::Full,
                req("call_tool", serde_json::json!({"name": "core.broken"})),
            )
            .await;
        let err = resp.error.unwrap();
        assert_eq!(err.code, McpErrorCode::Error);
    }

    #[tokio::test]
    async fn limited_profile_rejects_plugin_tool() {
        let catalog = Arc::new(ToolCatalog::new());
        let owner = ToolOwner::Plugin("demo".into());
        let name = namespaced_name(&owner, "greet");
        catalog
            .register(ToolEntry {
                name: name.clone(),
                description: "d".into(),
                input_schema: serde_json::json!({}),
                owner,
                capability_tags: vec![],
            })
            .unwrap();
        let dispatcher = Dispatcher::new(catalog);
        let resp = dispatcher
            .handle(
                Profile::Limited,
                req("call_tool", serde_json::json!({"name": name})),
            )
            .await;
        let err = resp.error.unwrap();
        assert_eq!(err.code, McpErrorCode::Unauthorized);
    }

    #[test]
    fn mcp_error_serializes_with_code_and_message() {
        let e = McpError {
            code: McpErrorCode::NotFound,
            message: "x".into(),
        };
        let s = serde_json::to_string(&e).unwrap();
        assert!(s.contains("NOT_FOUND"));
    }
}
