//! Unit tests for MCP protocol implementation.
//!
//! Tests JSON-RPC 2.0 request/response handling, tool definitions,
//! and dispatch of diagnostic tool calls through `handle_line`.

use super::*;
use serde_json::json;
use std::sync::Arc;

use crate::config::{
    Config, DatabaseConfig, EngineConfig, LoggingConfig, OptionOrder, RequestConfig,
};
use crate::server::AppState;
use crate::storage::SqliteStorage;
use crate::test_support::sample_form;

fn test_config() -> Config {
    Config {
        database: DatabaseConfig {
            path: ":memory:".into(),
            max_connections: 1,
        },
        logging: LoggingConfig::default(),
        request: RequestConfig::default(),
        engine: EngineConfig {
            option_order: OptionOrder::Authored,
            ..EngineConfig::default()
        },
    }
}

async fn create_test_server() -> McpServer {
    let storage = SqliteStorage::new_in_memory().await.unwrap();
    McpServer::new(Arc::new(AppState::new(test_config(), storage)))
}

async fn call(server: &McpServer, id: i64, tool: &str, arguments: Value) -> (Value, bool) {
    let line = json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": { "name": tool, "arguments": arguments }
    })
    .to_string();

    let response = server.handle_line(&line).await.expect("request gets a response");
    assert!(response.error.is_none(), "unexpected rpc error for {}", tool);
    let result = response.result.expect("tool call result");
    let is_error = result["isError"].as_bool().unwrap_or(false);
    let text = result["content"][0]["text"].as_str().unwrap().to_string();
    (serde_json::from_str(&text).unwrap(), is_error)
}

// ============================================================================
// JsonRpcResponse tests
// ============================================================================

#[test]
fn test_jsonrpc_response_success_with_id() {
    let response = JsonRpcResponse::success(Some(json!(1)), json!({"result": "ok"}));

    assert_eq!(response.jsonrpc, "2.0");
    assert_eq!(response.id, json!(1));
    assert!(response.error.is_none());
    assert_eq!(response.result.unwrap()["result"], "ok");
}

#[test]
fn test_jsonrpc_response_error_without_id() {
    let response = JsonRpcResponse::error(None, -32700, "Parse error");

    assert_eq!(response.id, Value::Null);
    assert!(response.result.is_none());
    assert_eq!(response.error.unwrap().code, -32700);
}

#[test]
fn test_jsonrpc_response_serialization() {
    let response = JsonRpcResponse::success(Some(json!(1)), json!({"test": true}));
    let serialized = serde_json::to_string(&response).unwrap();

    assert!(serialized.contains("\"jsonrpc\":\"2.0\""));
    assert!(serialized.contains("\"id\":1"));
    // Error should be omitted when None
    assert!(!serialized.contains("\"error\""));
}

#[test]
fn test_jsonrpc_error_with_data() {
    let mut error = JsonRpcError {
        code: -32603,
        message: "Internal error".to_string(),
        data: Some(json!({"details": "pool closed"})),
    };

    let json = serde_json::to_value(&error).unwrap();
    assert_eq!(json["data"]["details"], "pool closed");

    error.data = None;
    let json = serde_json::to_value(&error).unwrap();
    assert!(json.get("data").is_none());
}

// ============================================================================
// Request parsing tests
// ============================================================================

#[test]
fn test_jsonrpc_notification_no_id() {
    let json_str = r#"{"jsonrpc":"2.0","method":"initialized","params":{}}"#;
    let request: JsonRpcRequest = serde_json::from_str(json_str).unwrap();

    assert!(request.id.is_none());
    assert_eq!(request.method, "initialized");
}

#[test]
fn test_jsonrpc_request_missing_method_field() {
    let result: Result<JsonRpcRequest, _> = serde_json::from_str(r#"{"jsonrpc":"2.0","id":1}"#);
    assert!(result.is_err());
}

#[test]
fn test_tool_call_params_deserialization() {
    let json_str =
        r#"{"name":"diagnostic_session_get","arguments":{"session_id":"SESSION-1"}}"#;
    let params: ToolCallParams = serde_json::from_str(json_str).unwrap();

    assert_eq!(params.name, "diagnostic_session_get");
    assert_eq!(params.arguments.unwrap()["session_id"], "SESSION-1");
}

#[test]
fn test_tool_call_params_with_null_arguments() {
    let json_str = r#"{"name":"diagnostic_session_get","arguments":null}"#;
    let params: ToolCallParams = serde_json::from_str(json_str).unwrap();
    assert!(params.arguments.is_none());
}

// ============================================================================
// Tool definition tests
// ============================================================================

#[test]
fn test_all_tools_count() {
    assert_eq!(all_tools().len(), 6);
}

#[test]
fn test_tool_names_are_unique_and_prefixed() {
    let mut names: Vec<String> = all_tools().into_iter().map(|t| t.name).collect();
    assert!(names.iter().all(|n| n.starts_with("diagnostic_")));

    let original_len = names.len();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), original_len);
}

#[test]
fn test_all_tools_have_closed_object_schemas() {
    for tool in all_tools() {
        assert!(!tool.description.is_empty(), "{} needs a description", tool.name);
        assert_eq!(tool.input_schema["type"], "object", "{}", tool.name);
        assert!(tool.input_schema["properties"].is_object(), "{}", tool.name);
        assert_eq!(
            tool.input_schema["additionalProperties"], false,
            "{} should reject unknown fields",
            tool.name
        );
    }
}

#[test]
fn test_submit_tool_schema() {
    let tool = get_session_submit_tool();
    let required = tool.input_schema["required"].as_array().unwrap();

    assert!(required.contains(&json!("session_id")));
    assert!(required.contains(&json!("selected_option_id")));
    assert!(!required.contains(&json!("node_id")));
    assert_eq!(
        tool.input_schema["properties"]["time_spent_seconds"]["minimum"],
        0
    );
}

#[test]
fn test_learner_results_limit_bounds() {
    let tool = get_learner_results_tool();
    let limit = &tool.input_schema["properties"]["limit"];
    assert_eq!(limit["minimum"], 1);
    assert_eq!(limit["maximum"], 100);
}

#[test]
fn test_tool_serialization_field_names() {
    let json = serde_json::to_value(get_session_start_tool()).unwrap();
    assert!(json.get("inputSchema").is_some());
    assert!(json.get("input_schema").is_none());
}

#[test]
fn test_tool_call_result_with_error() {
    let result = ToolCallResult {
        content: vec![ToolResultContent {
            content_type: "text".to_string(),
            text: "{}".to_string(),
        }],
        is_error: Some(true),
    };

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["isError"], true);
    assert_eq!(json["content"][0]["type"], "text");
}

// ============================================================================
// Dispatch tests
// ============================================================================

#[tokio::test]
async fn test_initialize_reports_server_info() {
    let server = create_test_server().await;
    let response = server
        .handle_line(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#)
        .await
        .unwrap();

    let result = response.result.unwrap();
    assert_eq!(result["protocolVersion"], "2024-11-05");
    assert_eq!(result["serverInfo"]["name"], env!("CARGO_PKG_NAME"));
    assert_eq!(result["capabilities"]["tools"]["listChanged"], false);
}

#[tokio::test]
async fn test_notifications_get_no_response() {
    let server = create_test_server().await;
    assert!(server
        .handle_line(r#"{"jsonrpc":"2.0","method":"initialized"}"#)
        .await
        .is_none());
    assert!(server
        .handle_line(r#"{"jsonrpc":"2.0","method":"notifications/cancelled","params":{}}"#)
        .await
        .is_none());
    assert!(server
        .handle_line(r#"{"jsonrpc":"2.0","method":"something/else"}"#)
        .await
        .is_none());
}

#[tokio::test]
async fn test_protocol_error_codes() {
    let server = create_test_server().await;

    let parse = server.handle_line("{not json").await.unwrap();
    assert_eq!(parse.error.unwrap().code, -32700);

    let unknown = server
        .handle_line(r#"{"jsonrpc":"2.0","id":2,"method":"resources/list"}"#)
        .await
        .unwrap();
    assert_eq!(unknown.error.unwrap().code, -32601);

    let missing = server
        .handle_line(r#"{"jsonrpc":"2.0","id":3,"method":"tools/call"}"#)
        .await
        .unwrap();
    assert_eq!(missing.error.unwrap().code, -32602);
}

#[tokio::test]
async fn test_tools_list_over_the_wire() {
    let server = create_test_server().await;
    let response = server
        .handle_line(r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#)
        .await
        .unwrap();

    let tools = response.result.unwrap()["tools"].as_array().unwrap().clone();
    assert_eq!(tools.len(), 6);
}

#[tokio::test]
async fn test_unknown_tool_is_tool_error() {
    let server = create_test_server().await;
    let (payload, is_error) = call(&server, 1, "diagnostic_nope", json!({})).await;
    assert!(is_error);
    assert_eq!(payload["code"], "UnknownTool");
    assert_eq!(payload["class"], "input");
}

#[tokio::test]
async fn test_session_flow_through_tools() {
    let server = create_test_server().await;

    let (summary, is_error) = call(
        &server,
        1,
        "diagnostic_form_register",
        json!({ "form": sample_form() }),
    )
    .await;
    assert!(!is_error);
    assert_eq!(summary["form_id"], "form-mult-01");

    let (start, _) = call(
        &server,
        2,
        "diagnostic_session_start",
        json!({ "learner_id": "learner-7", "form_id": "form-mult-01" }),
    )
    .await;
    let session_id = start["state"]["session_id"].as_str().unwrap().to_string();
    assert_eq!(start["current_node"]["node_id"], "item-root");

    let (pending, is_error) = call(
        &server,
        3,
        "diagnostic_result_get",
        json!({ "session_id": session_id }),
    )
    .await;
    assert!(is_error);
    assert_eq!(pending["code"], "ResultNotReady");

    let (step, _) = call(
        &server,
        4,
        "diagnostic_session_submit",
        json!({ "session_id": session_id, "selected_option_id": "A", "time_spent_seconds": 15 }),
    )
    .await;
    assert_eq!(step["outcome"], "terminal");
    assert_eq!(step["result"]["severity"], "low");

    let (late, is_error) = call(
        &server,
        5,
        "diagnostic_session_submit",
        json!({ "session_id": session_id, "selected_option_id": "A" }),
    )
    .await;
    assert!(is_error);
    assert_eq!(late["code"], "SessionAlreadyComplete");
    assert_eq!(late["class"], "state");
    assert_eq!(late["state"]["status"], "completed");

    let (history, _) = call(
        &server,
        6,
        "diagnostic_learner_results",
        json!({ "learner_id": "learner-7" }),
    )
    .await;
    assert_eq!(history.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_unknown_argument_rejected() {
    let server = create_test_server().await;
    let (payload, is_error) = call(
        &server,
        1,
        "diagnostic_session_get",
        json!({ "session_id": "SESSION-1", "verbose": true }),
    )
    .await;
    assert!(is_error);
    assert_eq!(payload["code"], "InvalidParameters");
}
