//! End-to-end exercise of the newline-framed MCP protocol over a real
//! bidirectional byte stream (an in-memory duplex pipe stands in for a
//! TCP/Unix connection — `handle_connection` is transport-agnostic, so this
//! covers the same code path the TCP/Unix listeners use).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use portunix_mcp::catalog::{namespaced_name, ToolCatalog, ToolEntry, ToolOwner};
use portunix_mcp::dispatcher::{Dispatcher, ToolHandler};
use portunix_mcp::error::ToolError;
use portunix_mcp::profile::Profile;
use portunix_mcp::transport::handle_connection;
use tokio::io::{split, AsyncBufReadExt, AsyncWriteExt, BufReader};

struct Slow;

#[async_trait]
impl ToolHandler for Slow {
    async fn call(&self, _args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        tokio::time::sleep(Duration::from_millis(150)).await;
        Ok(serde_json::json!("slow-done"))
    }
}

struct Fast;

#[async_trait]
impl ToolHandler for Fast {
    async fn call(&self, _args: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        Ok(serde_json::json!("fast-done"))
    }
}

fn entry(name: &str) -> ToolEntry {
    ToolEntry {
        name: name.to_string(),
        description: String::new(),
        input_schema: serde_json::json!({}),
        owner: ToolOwner::Core,
        capability_tags: vec![],
    }
}

/// A slow tool call must not block a fast one queued right behind it on
/// the same connection: each line is dispatched on its own task.
#[tokio::test]
async fn concurrent_requests_on_one_connection_do_not_serialize()
{
    let catalog = Arc::new(ToolCatalog::new());
    let slow_name = namespaced_name(&ToolOwner::Core, "slow");
    let fast_name = namespaced_name(&ToolOwner::Core, "fast");
    catalog.register(entry(&slow_name)).unwrap();
    catalog.register(entry(&fast_name)).unwrap();

    let mut dispatcher = Dispatcher::new(Arc::clone(&catalog));
    dispatcher.register_core_handler(slow_name.clone(), Arc::new(Slow));
    dispatcher.register_core_handler(fast_name.clone(), Arc::new(Fast));
    let dispatcher = Arc::new(dispatcher);

    let (client, server) = tokio::io::duplex(8192);
    let (server_read, server_write) = split(server);
    let conn = tokio::spawn(handle_connection(server_read, server_write, dispatcher, Profile::Full));

    let (client_read, mut client_write) = split(client);
    let mut lines = BufReader::new(client_read).lines();

    let request = |id: u32, name: &str| {
        format!(r#"{{"id":{id},"method":"call_tool","params":{{"name":"{name}","args":{{}}}}}}"#)
    };
    client_write
        .write_all(format!("{}\n{}\n", request(1, &slow_name), request(2, &fast_name)).as_bytes())
        .await
        .unwrap();

    let first = lines.next_line().await.unwrap().unwrap();
    let second = lines.next_line().await.unwrap().unwrap();

    // Sent in slow-then-fast order, but the fast call finishes first
    // because both run on independent tasks.
    assert!(first.contains("fast-done"), "expected fast response first, got: {first}");
    assert!(second.contains("slow-done"), "expected slow response second, got: {second}");

    drop(client_write);
    conn.await.unwrap().unwrap();
}

/// Every request id round-trips verbatim, including on the unhappy paths:
/// unknown tool, malformed params, and unparsable JSON all still produce
/// exactly one response each.
#[tokio::test]
async fn every_request_id_gets_exactly_one_response() {
    let catalog = Arc::new(ToolCatalog::new());
    let dispatcher = Arc::new(Dispatcher::new(catalog));

    let (client, server) = tokio::io::duplex(8192);
    let (server_read, server_write) = split(server);
    let conn = tokio::spawn(handle_connection(server_read, server_write, dispatcher, Profile::Full));

    let (client_read, mut client_write) = split(client);
    let mut lines = BufReader::new(client_read).lines();

    client_write
        .write_all(b"{\"id\":7,\"method\":\"call_tool\",\"params\":{\"name\":\"core.nope\"}}\n")
        .await
        .unwrap();
    client_write.write_all(b"not json at all\n").await.unwrap();
    client_write.write_all(b"{\"id\":9,\"method\":\"ping\"}\n").await.unwrap();

    let mut responses = Vec::new();
    for _ in 0..3 {
        responses.push(lines.next_line().await.unwrap().unwrap());
    }

    assert!(responses.iter().any(|r| r.contains("\"id\":7") && r.contains("NOT_FOUND")));
    assert!(responses.iter().any(|r| r.contains("PARSE_ERROR")));
    assert!(responses.iter().any(|r| r.contains("\"id\":9") && r.contains("pong")));

    drop(client_write);
    conn.await.unwrap().unwrap();
}
