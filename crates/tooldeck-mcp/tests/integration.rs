//! Integration tests for the MCP client over stdio.
//!
//! These tests spawn the mock-mcp-server binary and talk to it through
//! McpClient.

use serde_json::json;
use tooldeck_mcp::{
    McpClient, McpError, ProgressNotification, StdioConfig, ToolClient, ToolContent,
    TransportConfig,
};

fn mock_server_config(args: &[&str]) -> TransportConfig {
    TransportConfig::Stdio(
        StdioConfig::new(env!("CARGO_BIN_EXE_mock-mcp-server"))
            .with_args(args.iter().map(|a| a.to_string()).collect()),
    )
}

async fn connected_client(args: &[&str]) -> McpClient {
    let mut client = McpClient::connect(mock_server_config(args))
        .await
        .expect("Failed to spawn mock server");
    client.initialize().await.expect("Failed to initialize");
    client
}

fn ignore_progress() -> impl FnMut(&ProgressNotification) + Send {
    |_| {}
}

#[tokio::test]
async fn test_connect_and_initialize() {
    let mut client = McpClient::connect(mock_server_config(&[]))
        .await
        .expect("Failed to spawn mock server");

    assert!(!client.is_initialized());

    let server_info = client.initialize().await.expect("Failed to initialize");
    assert_eq!(server_info.name, "mock-mcp-server");
    assert_eq!(server_info.version, "1.0.0");

    assert!(client.is_initialized());
    assert!(client.is_connected());

    // A second initialize is a no-op.
    client.initialize().await.unwrap();
}

#[tokio::test]
async fn test_list_tools() {
    let mut client = connected_client(&[]).await;

    let tools = client.list_tools().await.expect("Failed to list tools");
    let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["echo", "add", "progress", "json", "fail", "ping_first", "crash"]
    );

    let echo = &tools[0];
    assert_eq!(echo.description.as_deref(), Some("Echo back the input"));
    assert!(echo.input_schema.is_some());

    let json_tool = &tools[3];
    assert_eq!(json_tool.extra["annotations"], json!({"readOnlyHint": true}));
}

#[tokio::test]
async fn test_list_tools_follows_pagination() {
    let mut client = connected_client(&["--page-size", "2"]).await;

    let tools = client.list_tools().await.unwrap();
    assert_eq!(tools.len(), 7);
    assert_eq!(tools[0].name, "echo");
    assert_eq!(tools[6].name, "crash");
}

#[tokio::test]
async fn test_call_echo_tool() {
    let mut client = connected_client(&[]).await;

    let mut progress = ignore_progress();
    let result = client
        .call_tool("echo", json!({"message": "Hello, MCP!"}), &mut progress)
        .await
        .expect("Failed to call echo tool");

    assert!(!result.is_error());
    assert_eq!(result.text(), Some("Hello, MCP!".to_string()));
}

#[tokio::test]
async fn test_call_add_tool() {
    let mut client = connected_client(&[]).await;

    let mut progress = ignore_progress();
    let result = client
        .call_tool("add", json!({"a": 5, "b": 3}), &mut progress)
        .await
        .expect("Failed to call add tool");

    assert!(!result.is_error());
    assert_eq!(result.text(), Some("8".to_string()));
}

#[tokio::test]
async fn test_progress_notifications_reach_handler() {
    let mut client = connected_client(&[]).await;

    let mut seen = Vec::new();
    let mut progress = |p: &ProgressNotification| seen.push(p.clone());
    let result = client
        .call_tool("progress", json!({"steps": 3}), &mut progress)
        .await
        .unwrap();

    assert_eq!(result.text(), Some("done after 3 steps".to_string()));
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[0].progress, 1.0);
    assert_eq!(seen[2].progress, 3.0);
    assert_eq!(seen[2].total, Some(3.0));
    assert_eq!(seen[1].message.as_deref(), Some("step 2"));
}

#[tokio::test]
async fn test_json_text_content() {
    let mut client = connected_client(&[]).await;

    let mut progress = ignore_progress();
    let result = client
        .call_tool("json", json!({}), &mut progress)
        .await
        .unwrap();

    let content = result.content.expect("content");
    assert_eq!(content.len(), 1);
    match &content[0] {
        ToolContent::Text { text } => {
            let value: serde_json::Value = serde_json::from_str(text).unwrap();
            assert_eq!(value["name"], json!("测试"));
        }
        other => panic!("Expected text content, got {:?}", other),
    }
}

#[tokio::test]
async fn test_call_unknown_tool() {
    let mut client = connected_client(&[]).await;

    let mut progress = ignore_progress();
    let result = client
        .call_tool("nonexistent", json!({}), &mut progress)
        .await
        .expect("Call should succeed but return error content");

    assert!(result.is_error());
    assert!(result.text().unwrap().contains("Unknown tool"));
}

#[tokio::test]
async fn test_server_error_response() {
    let mut client = connected_client(&[]).await;

    let mut progress = ignore_progress();
    let result = client.call_tool("fail", json!({}), &mut progress).await;

    match result {
        Err(McpError::ServerError { code, message, .. }) => {
            assert_eq!(code, -32603);
            assert_eq!(message, "tool exploded");
        }
        other => panic!("Expected ServerError, got {:?}", other),
    }

    // The connection stays usable after an error response.
    let tools = client.list_tools().await.unwrap();
    assert_eq!(tools.len(), 7);
}

#[tokio::test]
async fn test_client_answers_server_ping() {
    let mut client = connected_client(&[]).await;

    let mut progress = ignore_progress();
    let result = client
        .call_tool("ping_first", json!({}), &mut progress)
        .await
        .unwrap();

    assert_eq!(result.text(), Some("pong received".to_string()));
}

#[tokio::test]
async fn test_call_before_initialize() {
    let mut client = McpClient::connect(mock_server_config(&[]))
        .await
        .expect("Failed to spawn mock server");

    let mut progress = ignore_progress();
    let result = client.call_tool("echo", json!({}), &mut progress).await;
    assert!(matches!(result, Err(McpError::NotInitialized)));
}

#[tokio::test]
async fn test_trait_object_usage() {
    let client = connected_client(&[]).await;
    let mut client: Box<dyn ToolClient> = Box::new(client);

    let tools = client.list_tools().await.unwrap();
    assert_eq!(tools.len(), 7);

    let mut progress = ignore_progress();
    let result = client
        .call_tool("echo", json!({"message": "via trait"}), &mut progress)
        .await
        .unwrap();
    assert_eq!(result.text(), Some("via trait".to_string()));

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_shutdown() {
    let mut client = connected_client(&[]).await;
    assert!(client.is_connected());

    client.shutdown().await.expect("Failed to shutdown");

    assert!(!client.is_initialized());
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_server_crash_detection() {
    let mut client = connected_client(&["--crash-on", "echo"]).await;

    let mut progress = ignore_progress();
    let result = client
        .call_tool("echo", json!({"message": "test"}), &mut progress)
        .await;

    assert!(result.is_err(), "Expected error when server crashes");
    assert!(matches!(
        result,
        Err(McpError::ConnectionClosed) | Err(McpError::Io(_))
    ));
}

#[tokio::test]
async fn test_connection_closed_after_shutdown() {
    let mut client = connected_client(&[]).await;
    client.shutdown().await.unwrap();

    let mut progress = ignore_progress();
    let result = client.call_tool("echo", json!({}), &mut progress).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_delayed_responses() {
    let mut client = connected_client(&["--delay-ms", "20"]).await;

    let start = std::time::Instant::now();
    let tools = client.list_tools().await.unwrap();
    assert_eq!(tools.len(), 7);
    assert!(start.elapsed() >= std::time::Duration::from_millis(20));
}
