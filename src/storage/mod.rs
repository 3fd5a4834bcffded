//! Storage layer for diagnostic forms, sessions and results.
//!
//! Sessions are written with an optimistic version check so that two
//! requests racing on the same session can never both commit a step.

mod sqlite;

pub use sqlite::SqliteStorage;

use async_trait::async_trait;

use crate::engine::{DiagnosticResult, SessionState};
use crate::error::StorageResult;
use crate::form::{DiagnosticForm, FormSummary};

/// Storage trait for database operations.
#[async_trait]
pub trait Storage: Send + Sync {
    // Form operations

    /// Insert a form version. Existing `(form_id, version)` rows are left untouched.
    async fn save_form(&self, form: &DiagnosticForm) -> StorageResult<()>;
    /// Get a specific version of a form.
    async fn get_form(&self, form_id: &str, version: u32) -> StorageResult<Option<DiagnosticForm>>;
    /// Get the highest registered version of a form.
    async fn get_latest_form(&self, form_id: &str) -> StorageResult<Option<DiagnosticForm>>;
    /// Summaries of every registered form version.
    async fn list_forms(&self) -> StorageResult<Vec<FormSummary>>;

    // Session operations

    /// Persist a newly started session.
    async fn create_session(&self, session: &SessionState) -> StorageResult<()>;
    /// Get a session by ID.
    async fn get_session(&self, id: &str) -> StorageResult<Option<SessionState>>;
    /// Write `session` if the stored version still equals `expected_version`.
    ///
    /// When `result` is given it is inserted in the same transaction. Returns
    /// `false` without writing anything when another writer got there first.
    async fn commit_session(
        &self,
        session: &SessionState,
        expected_version: i64,
        result: Option<&DiagnosticResult>,
    ) -> StorageResult<bool>;
    /// All sessions still waiting for answers.
    async fn list_open_sessions(&self) -> StorageResult<Vec<SessionState>>;

    // Result operations

    /// Get the result of a session.
    async fn get_result(&self, session_id: &str) -> StorageResult<Option<DiagnosticResult>>;
    /// Most recent results for a learner, newest first.
    async fn get_learner_results(
        &self,
        learner_id: &str,
        limit: u32,
    ) -> StorageResult<Vec<DiagnosticResult>>;
}
