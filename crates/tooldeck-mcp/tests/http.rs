//! Integration tests for the remote transports.
//!
//! A wiremock server plays the MCP server. Request ids are assigned in
//! order starting at 1, so the canned responses can name them directly.

use serde_json::{Value, json};
use tooldeck_mcp::{
    McpClient, McpError, ProgressNotification, RemoteConfig, ToolClient, TransportConfig,
};
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn initialize_response() -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "result": {
            "protocolVersion": "2025-03-26",
            "capabilities": { "tools": {} },
            "serverInfo": { "name": "remote-server", "version": "2.1.0" }
        }
    })
}

fn tools_response(id: u64) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": {
            "tools": [
                {
                    "name": "search",
                    "description": "Search the index",
                    "inputSchema": {
                        "type": "object",
                        "properties": { "query": { "type": "string" } }
                    }
                }
            ]
        }
    })
}

fn sse_event(event: &str, data: &Value) -> String {
    format!("event: {}\ndata: {}\n\n", event, data)
}

fn progress(token: u64, step: u64, total: u64) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": "notifications/progress",
        "params": {
            "progressToken": token,
            "progress": step,
            "total": total,
            "message": format!("step {}", step)
        }
    })
}

async fn mount_streamable_handshake(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(json!({"method": "initialize"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(initialize_response())
                .insert_header("mcp-session-id", "session-abc"),
        )
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(header("mcp-session-id", "session-abc"))
        .and(body_partial_json(json!({"method": "notifications/initialized"})))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(server)
        .await;
}

fn streamable_config(server: &MockServer) -> TransportConfig {
    TransportConfig::StreamableHttp(
        RemoteConfig::new(format!("{}/mcp", server.uri())).with_header("x-api-key", "secret"),
    )
}

#[tokio::test]
async fn test_streamable_json_responses() {
    let server = MockServer::start().await;
    mount_streamable_handshake(&server).await;

    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(header("mcp-session-id", "session-abc"))
        .and(header("x-api-key", "secret"))
        .and(body_partial_json(json!({"method": "tools/list"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(tools_response(2)))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = McpClient::connect(streamable_config(&server)).await.unwrap();
    let info = client.initialize().await.unwrap();
    assert_eq!(info.name, "remote-server");
    assert_eq!(info.version, "2.1.0");

    let tools = client.list_tools().await.unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "search");
}

#[tokio::test]
async fn test_streamable_event_stream_with_progress() {
    let server = MockServer::start().await;
    mount_streamable_handshake(&server).await;

    let body = [
        sse_event("message", &progress(2, 1, 2)),
        sse_event("message", &progress(2, 2, 2)),
        sse_event(
            "message",
            &json!({
                "jsonrpc": "2.0",
                "id": 2,
                "result": { "content": [ { "type": "text", "text": "found 4 hits" } ] }
            }),
        ),
    ]
    .concat();

    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(json!({
            "method": "tools/call",
            "params": { "name": "search", "_meta": { "progressToken": 2 } }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = McpClient::connect(streamable_config(&server)).await.unwrap();
    client.initialize().await.unwrap();

    let mut seen = Vec::new();
    let mut on_progress = |p: &ProgressNotification| seen.push(p.progress);
    let result = client
        .call_tool("search", json!({"query": "rust"}), &mut on_progress)
        .await
        .unwrap();

    assert_eq!(result.text(), Some("found 4 hits".to_string()));
    assert_eq!(seen, vec![1.0, 2.0]);
}

#[tokio::test]
async fn test_streamable_batch_body() {
    let server = MockServer::start().await;
    mount_streamable_handshake(&server).await;

    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(json!({"method": "tools/call"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            progress(2, 1, 1),
            {
                "jsonrpc": "2.0",
                "id": 2,
                "result": { "content": [ { "type": "text", "text": "ok" } ], "isError": false }
            }
        ])))
        .mount(&server)
        .await;

    let mut client = McpClient::connect(streamable_config(&server)).await.unwrap();
    client.initialize().await.unwrap();

    let mut count = 0;
    let mut on_progress = |_: &ProgressNotification| count += 1;
    let result = client
        .call_tool("search", json!({}), &mut on_progress)
        .await
        .unwrap();

    assert_eq!(result.text(), Some("ok".to_string()));
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_streamable_http_error_status() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/mcp"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let mut client = McpClient::connect(streamable_config(&server)).await.unwrap();
    match client.initialize().await {
        Err(McpError::Transport(msg)) => {
            assert!(msg.contains("HTTP error 500"));
            assert!(msg.contains("boom"));
        }
        other => panic!("Expected Transport error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_streamable_accepted_without_response() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/mcp"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;

    let mut client = McpClient::connect(streamable_config(&server)).await.unwrap();
    assert!(matches!(
        client.initialize().await,
        Err(McpError::Protocol(_))
    ));
}

#[tokio::test]
async fn test_streamable_shutdown_deletes_session() {
    let server = MockServer::start().await;
    mount_streamable_handshake(&server).await;

    Mock::given(method("DELETE"))
        .and(path("/mcp"))
        .and(header("mcp-session-id", "session-abc"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = McpClient::connect(streamable_config(&server)).await.unwrap();
    client.initialize().await.unwrap();
    client.shutdown().await.unwrap();
    assert!(!client.is_initialized());
}

#[tokio::test]
async fn test_legacy_sse_round_trip() {
    let server = MockServer::start().await;

    let events = [
        "event: endpoint\ndata: /messages?session_id=abc\n\n".to_string(),
        sse_event("message", &initialize_response()),
        sse_event("message", &tools_response(2)),
        sse_event("message", &progress(3, 1, 1)),
        sse_event(
            "message",
            &json!({
                "jsonrpc": "2.0",
                "id": 3,
                "result": { "content": [ { "type": "text", "text": "{\"hits\":4}" } ] }
            }),
        ),
    ]
    .concat();

    Mock::given(method("GET"))
        .and(path("/sse"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(events, "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(query_param("session_id", "abc"))
        .respond_with(ResponseTemplate::new(202))
        .expect(5)
        .mount(&server)
        .await;

    let config = TransportConfig::Sse(RemoteConfig::new(format!("{}/sse", server.uri())));
    let mut client = McpClient::connect(config).await.unwrap();

    let info = client.initialize().await.unwrap();
    assert_eq!(info.name, "remote-server");

    let tools = client.list_tools().await.unwrap();
    assert_eq!(tools[0].name, "search");

    let mut seen = 0;
    let mut on_progress = |_: &ProgressNotification| seen += 1;
    let result = client
        .call_tool("search", json!({"query": "rust"}), &mut on_progress)
        .await
        .unwrap();
    assert_eq!(result.text(), Some("{\"hits\":4}".to_string()));
    assert_eq!(seen, 1);

    // The event stream is exhausted; further requests cannot be answered.
    let mut ignore = |_: &ProgressNotification| {};
    let next = client.call_tool("search", json!({}), &mut ignore).await;
    assert!(matches!(next, Err(McpError::ConnectionClosed)));
}

#[tokio::test]
async fn test_legacy_sse_without_endpoint() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/sse"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            sse_event("message", &json!({"jsonrpc": "2.0", "method": "notifications/message"})),
            "text/event-stream",
        ))
        .mount(&server)
        .await;

    let config = TransportConfig::Sse(RemoteConfig::new(format!("{}/sse", server.uri())));
    assert!(matches!(
        McpClient::connect(config).await,
        Err(McpError::Protocol(_))
    ));
}

#[tokio::test]
async fn test_legacy_sse_client_moves_across_tasks() {
    let server = MockServer::start().await;

    let events = [
        "event: endpoint\ndata: /messages\n\n".to_string(),
        sse_event("message", &initialize_response()),
        sse_event("message", &tools_response(2)),
    ]
    .concat();

    Mock::given(method("GET"))
        .and(path("/sse"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(events, "text/event-stream"))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;

    let config = TransportConfig::Sse(RemoteConfig::new(format!("{}/sse", server.uri())));
    let mut client = McpClient::connect(config).await.unwrap();
    client.initialize().await.unwrap();

    let mut client: Box<dyn ToolClient> = Box::new(client);
    let tools = tokio::spawn(async move { client.list_tools().await })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "search");
}
