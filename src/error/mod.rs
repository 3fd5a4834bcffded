use serde::Serialize;
use thiserror::Error;

use crate::engine::SessionState;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Diagnostic error: {0}")]
    Diagnostic(#[from] DiagnosticError),

    #[error("MCP protocol error: {0}")]
    Mcp(#[from] McpError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("Serialization failed for {entity}: {message}")]
    Serialization { entity: String, message: String },

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Malformed diagnostic graph detected while a session was running.
///
/// These are fatal for the session: it is aborted rather than silently
/// terminated.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum IntegrityError {
    #[error("Form {form_id} references missing node {node_id}")]
    MissingNode { form_id: String, node_id: String },

    #[error("Session {session_id} would revisit node {node_id}")]
    Revisit { session_id: String, node_id: String },
}

/// Coarse classification used at the request boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Client mistakes. Reported immediately, state unchanged.
    Input,
    /// Client out of sync with the server. Carries the authoritative state.
    State,
    /// Malformed diagnostic form.
    Integrity,
    /// Store or runtime failure. Safe to retry with the same request.
    Infrastructure,
}

/// Session lifecycle and decision errors
#[derive(Debug, Error)]
pub enum DiagnosticError {
    #[error("Diagnostic form not found: {form_id}")]
    FormNotFound { form_id: String },

    #[error("Invalid form {form_id}: {}", .problems.join("; "))]
    InvalidForm {
        form_id: String,
        problems: Vec<String>,
    },

    #[error("Option {option_id} is not an answer of node {node_id}")]
    InvalidOption { node_id: String, option_id: String },

    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("Session already complete: {}", .state.session_id)]
    SessionAlreadyComplete { state: Box<SessionState> },

    #[error("Stale submission for node {submitted_node_id}; current node is {}", .state.current_node_id)]
    StaleSubmission {
        submitted_node_id: String,
        state: Box<SessionState>,
    },

    #[error("Result not ready for session {session_id}")]
    ResultNotReady { session_id: String },

    #[error("Session {session_id} was aborted: {reason}")]
    SessionAborted { session_id: String, reason: String },

    #[error("Integrity error: {0}")]
    Integrity(#[from] IntegrityError),

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Session {session_id} kept changing after {attempts} attempts")]
    Contention { session_id: String, attempts: u32 },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl DiagnosticError {
    /// Classification of this error for the caller.
    pub fn class(&self) -> ErrorClass {
        match self {
            DiagnosticError::FormNotFound { .. }
            | DiagnosticError::InvalidForm { .. }
            | DiagnosticError::InvalidOption { .. } => ErrorClass::Input,
            DiagnosticError::SessionNotFound { .. }
            | DiagnosticError::SessionAlreadyComplete { .. }
            | DiagnosticError::StaleSubmission { .. }
            | DiagnosticError::ResultNotReady { .. }
            | DiagnosticError::SessionAborted { .. } => ErrorClass::State,
            DiagnosticError::Integrity(_) => ErrorClass::Integrity,
            DiagnosticError::Timeout { .. }
            | DiagnosticError::Contention { .. }
            | DiagnosticError::Storage(_) => ErrorClass::Infrastructure,
        }
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            DiagnosticError::FormNotFound { .. } => "FormNotFound",
            DiagnosticError::InvalidForm { .. } => "InvalidForm",
            DiagnosticError::InvalidOption { .. } => "InvalidOption",
            DiagnosticError::SessionNotFound { .. } => "SessionNotFound",
            DiagnosticError::SessionAlreadyComplete { .. } => "SessionAlreadyComplete",
            DiagnosticError::StaleSubmission { .. } => "StaleSubmission",
            DiagnosticError::ResultNotReady { .. } => "ResultNotReady",
            DiagnosticError::SessionAborted { .. } => "SessionAborted",
            DiagnosticError::Integrity(IntegrityError::MissingNode { .. }) => "MissingNode",
            DiagnosticError::Integrity(IntegrityError::Revisit { .. }) => "Revisit",
            DiagnosticError::Timeout { .. } => "Timeout",
            DiagnosticError::Contention { .. } => "Contention",
            DiagnosticError::Storage(_) => "StorageFailure",
        }
    }

    /// Authoritative session state attached to state errors.
    pub fn state(&self) -> Option<&SessionState> {
        match self {
            DiagnosticError::SessionAlreadyComplete { state }
            | DiagnosticError::StaleSubmission { state, .. } => Some(state),
            _ => None,
        }
    }

    /// Structured payload returned to clients.
    pub fn to_payload(&self) -> serde_json::Value {
        let mut payload = serde_json::json!({
            "code": self.code(),
            "class": self.class(),
            "message": self.to_string(),
        });
        if let Some(state) = self.state() {
            payload["state"] = serde_json::to_value(state).unwrap_or(serde_json::Value::Null);
        }
        if let DiagnosticError::InvalidForm { problems, .. } = self {
            payload["problems"] = serde_json::json!(problems);
        }
        payload
    }
}

/// MCP protocol errors
#[derive(Debug, Error)]
pub enum McpError {
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Unknown tool: {tool_name}")]
    UnknownTool { tool_name: String },

    #[error("Invalid parameters for {tool_name}: {message}")]
    InvalidParameters { tool_name: String, message: String },

    #[error("{0}")]
    Diagnostic(#[from] DiagnosticError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl McpError {
    /// Structured payload returned to clients as a failed tool result.
    pub fn to_payload(&self) -> serde_json::Value {
        match self {
            McpError::Diagnostic(err) => err.to_payload(),
            McpError::UnknownTool { .. } => serde_json::json!({
                "code": "UnknownTool",
                "class": ErrorClass::Input,
                "message": self.to_string(),
            }),
            McpError::InvalidRequest { .. } | McpError::InvalidParameters { .. } => {
                serde_json::json!({
                    "code": "InvalidParameters",
                    "class": ErrorClass::Input,
                    "message": self.to_string(),
                })
            }
            McpError::Json(_) => serde_json::json!({
                "code": "Serialization",
                "class": ErrorClass::Infrastructure,
                "message": self.to_string(),
            }),
        }
    }
}

impl From<StorageError> for McpError {
    fn from(err: StorageError) -> Self {
        McpError::Diagnostic(DiagnosticError::Storage(err))
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for session engine operations
pub type EngineResult<T> = Result<T, DiagnosticError>;

/// Result type alias for MCP operations
pub type McpResult<T> = Result<T, McpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::Config {
            message: "missing key".to_string(),
        };
        assert_eq!(err.to_string(), "Configuration error: missing key");

        let err = AppError::Internal {
            message: "unexpected".to_string(),
        };
        assert_eq!(err.to_string(), "Internal error: unexpected");
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::Connection {
            message: "failed to connect".to_string(),
        };
        assert_eq!(err.to_string(), "Database connection failed: failed to connect");

        let err = StorageError::Serialization {
            entity: "session".to_string(),
            message: "bad json".to_string(),
        };
        assert_eq!(err.to_string(), "Serialization failed for session: bad json");

        let err = StorageError::Migration {
            message: "version mismatch".to_string(),
        };
        assert_eq!(err.to_string(), "Migration failed: version mismatch");
    }

    #[test]
    fn test_diagnostic_error_display() {
        let err = DiagnosticError::FormNotFound {
            form_id: "form-1".to_string(),
        };
        assert_eq!(err.to_string(), "Diagnostic form not found: form-1");

        let err = DiagnosticError::InvalidOption {
            node_id: "item-1".to_string(),
            option_id: "Z".to_string(),
        };
        assert_eq!(err.to_string(), "Option Z is not an answer of node item-1");

        let err = DiagnosticError::InvalidForm {
            form_id: "form-1".to_string(),
            problems: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(err.to_string(), "Invalid form form-1: a; b");

        let err = DiagnosticError::Timeout { timeout_ms: 500 };
        assert_eq!(err.to_string(), "Request timeout after 500ms");
    }

    #[test]
    fn test_diagnostic_error_classes() {
        let input = DiagnosticError::InvalidOption {
            node_id: "n".to_string(),
            option_id: "o".to_string(),
        };
        assert_eq!(input.class(), ErrorClass::Input);
        assert_eq!(input.code(), "InvalidOption");

        let state = DiagnosticError::SessionNotFound {
            session_id: "s".to_string(),
        };
        assert_eq!(state.class(), ErrorClass::State);

        let integrity: DiagnosticError = IntegrityError::Revisit {
            session_id: "s".to_string(),
            node_id: "n".to_string(),
        }
        .into();
        assert_eq!(integrity.class(), ErrorClass::Integrity);
        assert_eq!(integrity.code(), "Revisit");

        let infra = DiagnosticError::Timeout { timeout_ms: 10 };
        assert_eq!(infra.class(), ErrorClass::Infrastructure);
    }

    #[test]
    fn test_payload_without_state() {
        let err = DiagnosticError::ResultNotReady {
            session_id: "s-1".to_string(),
        };
        let payload = err.to_payload();
        assert_eq!(payload["code"], "ResultNotReady");
        assert_eq!(payload["class"], "state");
        assert!(payload.get("state").is_none());
    }

    #[test]
    fn test_mcp_error_display() {
        let err = McpError::UnknownTool {
            tool_name: "nonexistent".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown tool: nonexistent");

        let err = McpError::InvalidParameters {
            tool_name: "diagnostic_session_submit".to_string(),
            message: "missing session_id".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid parameters for diagnostic_session_submit: missing session_id"
        );
    }

    #[test]
    fn test_mcp_error_payload() {
        let err = McpError::InvalidParameters {
            tool_name: "diagnostic_session_start".to_string(),
            message: "unknown field `extra`".to_string(),
        };
        let payload = err.to_payload();
        assert_eq!(payload["code"], "InvalidParameters");
        assert_eq!(payload["class"], "input");

        let err: McpError = DiagnosticError::SessionNotFound {
            session_id: "s-9".to_string(),
        }
        .into();
        assert_eq!(err.to_payload()["code"], "SessionNotFound");
    }

    #[test]
    fn test_storage_error_conversion_to_app_error() {
        let storage_err = StorageError::Query {
            message: "x".to_string(),
        };
        let app_err: AppError = storage_err.into();
        assert!(matches!(app_err, AppError::Storage(_)));
    }

    #[test]
    fn test_storage_error_conversion_to_mcp_error() {
        let storage_err = StorageError::Query {
            message: "x".to_string(),
        };
        let mcp_err: McpError = storage_err.into();
        assert!(matches!(
            mcp_err,
            McpError::Diagnostic(DiagnosticError::Storage(_))
        ));
    }
}
