use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::SharedState;
use crate::engine::SubmitRequest;
use crate::error::{McpError, McpResult};
use crate::form::DiagnosticForm;

/// Route tool calls to appropriate handlers
pub async fn handle_tool_call(
    state: &SharedState,
    tool_name: &str,
    arguments: Option<Value>,
) -> McpResult<Value> {
    info!(tool = %tool_name, "Routing tool call");

    match tool_name {
        "diagnostic_form_register" => handle_form_register(state, arguments).await,
        "diagnostic_session_start" => handle_session_start(state, arguments).await,
        "diagnostic_session_submit" => handle_session_submit(state, arguments).await,
        "diagnostic_session_get" => handle_session_get(state, arguments).await,
        "diagnostic_result_get" => handle_result_get(state, arguments).await,
        "diagnostic_learner_results" => handle_learner_results(state, arguments).await,
        _ => Err(McpError::UnknownTool {
            tool_name: tool_name.to_string(),
        }),
    }
}

/// Parameters for `diagnostic_form_register`.
#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FormRegisterParams {
    pub form: DiagnosticForm,
}

/// Parameters for `diagnostic_session_start`.
#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SessionStartParams {
    pub learner_id: String,
    pub form_id: String,
}

/// Parameters for tools addressing a single session.
#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SessionIdParams {
    pub session_id: String,
}

/// Parameters for `diagnostic_learner_results`.
#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LearnerResultsParams {
    pub learner_id: String,
    /// Defaults to 10, clamped to 1-100.
    #[serde(default)]
    pub limit: Option<u32>,
}

async fn handle_form_register(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler(
        "diagnostic_form_register",
        arguments,
        |params: FormRegisterParams| state.manager.register_form(params.form),
    )
    .await
}

async fn handle_session_start(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler(
        "diagnostic_session_start",
        arguments,
        |params: SessionStartParams| async move {
            state
                .manager
                .start(&params.learner_id, &params.form_id)
                .await
        },
    )
    .await
}

async fn handle_session_submit(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler(
        "diagnostic_session_submit",
        arguments,
        |params: SubmitRequest| state.manager.submit(params),
    )
    .await
}

async fn handle_session_get(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler(
        "diagnostic_session_get",
        arguments,
        |params: SessionIdParams| async move { state.manager.session(&params.session_id).await },
    )
    .await
}

async fn handle_result_get(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler(
        "diagnostic_result_get",
        arguments,
        |params: SessionIdParams| async move { state.manager.result(&params.session_id).await },
    )
    .await
}

async fn handle_learner_results(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler(
        "diagnostic_learner_results",
        arguments,
        |params: LearnerResultsParams| async move {
            state
                .manager
                .learner_results(&params.learner_id, params.limit)
                .await
        },
    )
    .await
}

// ============================================================================
// Helper functions
// ============================================================================

/// Helper to parse arguments with consistent error handling
fn parse_arguments<T: serde::de::DeserializeOwned>(
    tool_name: &str,
    arguments: Option<Value>,
) -> McpResult<T> {
    match arguments {
        Some(args) => serde_json::from_value(args).map_err(|e| McpError::InvalidParameters {
            tool_name: tool_name.to_string(),
            message: e.to_string(),
        }),
        None => Err(McpError::InvalidParameters {
            tool_name: tool_name.to_string(),
            message: "Missing arguments".to_string(),
        }),
    }
}

/// Parse typed parameters, run an engine operation and serialize its output.
///
/// Engine errors keep their variant so the client receives the structured
/// `{code, class, message, state?}` payload.
async fn execute_handler<P, R, E, F, Fut>(
    tool_name: &str,
    arguments: Option<Value>,
    operation: F,
) -> McpResult<Value>
where
    P: serde::de::DeserializeOwned,
    R: Serialize,
    E: Into<McpError>,
    F: FnOnce(P) -> Fut,
    Fut: std::future::Future<Output = Result<R, E>>,
{
    let params: P = parse_arguments(tool_name, arguments)?;
    let result = operation(params).await.map_err(Into::<McpError>::into)?;
    serde_json::to_value(result).map_err(McpError::Json)
}
