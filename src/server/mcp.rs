//! Line-delimited JSON-RPC 2.0 over stdio, carrying the MCP handshake and
//! the `diagnostic_*` tools.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};

use super::{handle_tool_call, SharedState};

#[cfg(test)]
#[path = "mcp_tests.rs"]
mod mcp_tests;

const PROTOCOL_VERSION: &str = "2024-11-05";

const PARSE_ERROR: i32 = -32700;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;
const INTERNAL_ERROR: i32 = -32603;

/// An incoming message. `id` is absent on notifications.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

/// An outgoing message. Exactly one of `result` and `error` is set.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct Capabilities {
    pub tools: ToolCapabilities,
}

/// The tool set is fixed, so `listChanged` is always false.
#[derive(Debug, Serialize)]
pub struct ToolCapabilities {
    #[serde(rename = "listChanged")]
    pub list_changed: bool,
}

/// Reply to `initialize`.
#[derive(Debug, Serialize)]
pub struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    pub capabilities: Capabilities,
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
}

/// A tool advertised by `tools/list`, with the JSON Schema of its arguments.
#[derive(Debug, Clone, Serialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

#[derive(Debug, Deserialize)]
pub struct ToolCallParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct ToolResultContent {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: String,
}

/// Body of a `tools/call` reply. Tool failures are reported here with
/// `isError` set, not as JSON-RPC errors.
#[derive(Debug, Serialize)]
pub struct ToolCallResult {
    pub content: Vec<ToolResultContent>,
    #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(Value::Null),
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(Value::Null),
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// Stdio front end for the session engine.
pub struct McpServer {
    state: SharedState,
}

impl McpServer {
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }

    /// Serve requests from stdin until EOF, one JSON message per line.
    pub async fn run(&self) -> std::io::Result<()> {
        info!("Diagnostic session server listening on stdio");

        let mut reader = BufReader::new(tokio::io::stdin());
        let mut stdout = tokio::io::stdout();
        let mut line = String::new();

        while reader.read_line(&mut line).await? > 0 {
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                if let Some(response) = self.handle_line(trimmed).await {
                    let encoded = serde_json::to_string(&response)?;
                    debug!(response = %encoded, "Sending response");
                    stdout.write_all(encoded.as_bytes()).await?;
                    stdout.write_all(b"\n").await?;
                    stdout.flush().await?;
                }
            }
            line.clear();
        }

        info!("stdin closed, shutting down");
        Ok(())
    }

    /// Handle one line of input, returning the response to write, if any.
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        debug!(request = %line, "Received request");

        match serde_json::from_str::<JsonRpcRequest>(line) {
            Ok(request) => self.dispatch(request).await,
            Err(e) => {
                error!(error = %e, "Unparseable request");
                Some(JsonRpcResponse::error(
                    None,
                    PARSE_ERROR,
                    format!("Parse error: {}", e),
                ))
            }
        }
    }

    async fn dispatch(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let JsonRpcRequest {
            id, method, params, ..
        } = request;

        let response = match method.as_str() {
            "initialize" => self.initialize(id),
            "tools/list" => JsonRpcResponse::success(id, serde_json::json!({ "tools": all_tools() })),
            "tools/call" => self.handle_tool_call(id, params).await,
            "ping" => JsonRpcResponse::success(id, Value::Object(Default::default())),
            _ if id.is_none() => {
                debug!(method = %method, "Notification ignored");
                return None;
            }
            _ => {
                warn!(method = %method, "Unknown method");
                JsonRpcResponse::error(
                    id,
                    METHOD_NOT_FOUND,
                    format!("Method not found: {}", method),
                )
            }
        };
        Some(response)
    }

    fn initialize(&self, id: Option<Value>) -> JsonRpcResponse {
        info!(protocol = PROTOCOL_VERSION, "Client initialized");

        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: Capabilities {
                tools: ToolCapabilities {
                    list_changed: false,
                },
            },
            server_info: ServerInfo {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        match serde_json::to_value(result) {
            Ok(val) => JsonRpcResponse::success(id, val),
            Err(e) => JsonRpcResponse::error(id, INTERNAL_ERROR, format!("Internal error: {}", e)),
        }
    }

    async fn handle_tool_call(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let Some(params) = params else {
            return JsonRpcResponse::error(id, INVALID_PARAMS, "Missing params");
        };
        let call: ToolCallParams = match serde_json::from_value(params) {
            Ok(call) => call,
            Err(e) => {
                return JsonRpcResponse::error(id, INVALID_PARAMS, format!("Invalid params: {}", e))
            }
        };

        info!(tool = %call.name, "Tool call");

        let (text, is_error) = match handle_tool_call(&self.state, &call.name, call.arguments).await {
            Ok(result) => (serde_json::to_string_pretty(&result), None),
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool call failed");
                (serde_json::to_string_pretty(&e.to_payload()), Some(true))
            }
        };
        let text = match text {
            Ok(text) => text,
            Err(e) => {
                error!(error = %e, "Cannot encode tool output");
                return JsonRpcResponse::error(id, INTERNAL_ERROR, format!("Internal error: {}", e));
            }
        };

        let result = ToolCallResult {
            content: vec![ToolResultContent {
                content_type: "text".to_string(),
                text,
            }],
            is_error,
        };
        match serde_json::to_value(result) {
            Ok(val) => JsonRpcResponse::success(id, val),
            Err(e) => JsonRpcResponse::error(id, INTERNAL_ERROR, format!("Internal error: {}", e)),
        }
    }
}

/// Every tool the server exposes.
pub fn all_tools() -> Vec<Tool> {
    vec![
        get_form_register_tool(),
        get_session_start_tool(),
        get_session_submit_tool(),
        get_session_get_tool(),
        get_result_get_tool(),
        get_learner_results_tool(),
    ]
}

/// Get the form registration tool definition
fn get_form_register_tool() -> Tool {
    Tool {
        name: "diagnostic_form_register".to_string(),
        description: "Validate and register a diagnostic form (items, probes and decision edges). Re-registering an identical form version is a no-op.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "form": {
                    "type": "object",
                    "description": "The diagnostic form definition",
                    "properties": {
                        "form_id": { "type": "string" },
                        "title": { "type": "string" },
                        "root_item_id": { "type": "string" },
                        "items": { "type": "array", "items": { "type": "object" } },
                        "probes": { "type": "array", "items": { "type": "object" } },
                        "edges": { "type": "array", "items": { "type": "object" } },
                        "max_depth": { "type": "integer", "minimum": 1 },
                        "max_time_minutes": { "type": "integer", "minimum": 1, "maximum": 525600 },
                        "version": { "type": "integer", "minimum": 1 }
                    },
                    "required": ["form_id", "title", "root_item_id", "items", "edges"]
                }
            },
            "required": ["form"],
            "additionalProperties": false
        }),
    }
}

/// Get the session start tool definition
fn get_session_start_tool() -> Tool {
    Tool {
        name: "diagnostic_session_start".to_string(),
        description: "Start a diagnostic session for a learner on the latest version of a form. Returns the session state and the root item to present.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "learner_id": {
                    "type": "string",
                    "description": "Opaque learner identifier"
                },
                "form_id": {
                    "type": "string",
                    "description": "The diagnostic form to run"
                }
            },
            "required": ["learner_id", "form_id"],
            "additionalProperties": false
        }),
    }
}

/// Get the answer submission tool definition
fn get_session_submit_tool() -> Tool {
    Tool {
        name: "diagnostic_session_submit".to_string(),
        description: "Submit the learner's answer for the current node. Returns either the next node (outcome: continue) or the final diagnostic result (outcome: terminal).".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "session_id": {
                    "type": "string",
                    "description": "The session ID"
                },
                "node_id": {
                    "type": "string",
                    "description": "Node the answer is for; defaults to the current node. Send it on every submit: only requests carrying node_id are replayed on retry, an unpinned resend is answered against the next node"
                },
                "selected_option_id": {
                    "type": "string",
                    "description": "The chosen option"
                },
                "time_spent_seconds": {
                    "type": "integer",
                    "minimum": 0,
                    "description": "Seconds the learner spent on the node"
                }
            },
            "required": ["session_id", "selected_option_id"],
            "additionalProperties": false
        }),
    }
}

/// Get the session lookup tool definition
fn get_session_get_tool() -> Tool {
    Tool {
        name: "diagnostic_session_get".to_string(),
        description: "Get the current state of a diagnostic session.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "session_id": {
                    "type": "string",
                    "description": "The session ID"
                }
            },
            "required": ["session_id"],
            "additionalProperties": false
        }),
    }
}

/// Get the result lookup tool definition
fn get_result_get_tool() -> Tool {
    Tool {
        name: "diagnostic_result_get".to_string(),
        description: "Get the diagnostic result of a finished session.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "session_id": {
                    "type": "string",
                    "description": "The session ID"
                }
            },
            "required": ["session_id"],
            "additionalProperties": false
        }),
    }
}

/// Get the learner history tool definition
fn get_learner_results_tool() -> Tool {
    Tool {
        name: "diagnostic_learner_results".to_string(),
        description: "List a learner's most recent diagnostic results, newest first.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "learner_id": {
                    "type": "string",
                    "description": "Opaque learner identifier"
                },
                "limit": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": 100,
                    "description": "Maximum number of results (default: 10)"
                }
            },
            "required": ["learner_id"],
            "additionalProperties": false
        }),
    }
}
