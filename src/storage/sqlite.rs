use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{debug, info};

use super::Storage;
use crate::config::DatabaseConfig;
use crate::engine::{DiagnosticResult, SessionState};
use crate::error::{StorageError, StorageResult};
use crate::form::{DiagnosticForm, FormSummary};

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed storage implementation
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage instance
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Create a private in-memory database, mainly for tests.
    ///
    /// A single connection that never idles out keeps the database alive
    /// for the lifetime of the pool.
    pub async fn new_in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| {
            StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            }
        })?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to open in-memory database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR.run(&self.pool).await.map_err(|e| StorageError::Migration {
            message: format!("Failed to run migrations: {}", e),
        })?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn save_form(&self, form: &DiagnosticForm) -> StorageResult<()> {
        let payload = encode("form", form)?;

        sqlx::query(
            r#"
            INSERT OR IGNORE INTO forms (form_id, version, title, payload, registered_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&form.form_id)
        .bind(form.version as i64)
        .bind(&form.title)
        .bind(&payload)
        .bind(timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_form(&self, form_id: &str, version: u32) -> StorageResult<Option<DiagnosticForm>> {
        let payload: Option<String> =
            sqlx::query_scalar("SELECT payload FROM forms WHERE form_id = ? AND version = ?")
                .bind(form_id)
                .bind(version as i64)
                .fetch_optional(&self.pool)
                .await?;

        payload.map(|p| decode("form", &p)).transpose()
    }

    async fn get_latest_form(&self, form_id: &str) -> StorageResult<Option<DiagnosticForm>> {
        let payload: Option<String> = sqlx::query_scalar(
            r#"
            SELECT payload FROM forms
            WHERE form_id = ?
            ORDER BY version DESC
            LIMIT 1
            "#,
        )
        .bind(form_id)
        .fetch_optional(&self.pool)
        .await?;

        payload.map(|p| decode("form", &p)).transpose()
    }

    async fn list_forms(&self) -> StorageResult<Vec<FormSummary>> {
        let payloads: Vec<String> =
            sqlx::query_scalar("SELECT payload FROM forms ORDER BY form_id, version")
                .fetch_all(&self.pool)
                .await?;

        payloads
            .iter()
            .map(|p| decode::<DiagnosticForm>("form", p).map(|f| f.summary()))
            .collect()
    }

    async fn create_session(&self, session: &SessionState) -> StorageResult<()> {
        let state = encode("session", session)?;

        sqlx::query(
            r#"
            INSERT INTO sessions (id, learner_id, form_id, form_version, status, version,
                                  started_at, last_activity_at, completed_at, state)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&session.session_id)
        .bind(&session.learner_id)
        .bind(&session.form_id)
        .bind(session.form_version as i64)
        .bind(session.status.to_string())
        .bind(session.version)
        .bind(timestamp(session.started_at))
        .bind(timestamp(session.last_activity_at))
        .bind(session.completed_at.map(timestamp))
        .bind(&state)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_session(&self, id: &str) -> StorageResult<Option<SessionState>> {
        let row: Option<SessionRow> = sqlx::query_as(
            r#"
            SELECT id, version, state
            FROM sessions
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(SessionRow::into_state).transpose()
    }

    async fn commit_session(
        &self,
        session: &SessionState,
        expected_version: i64,
        result: Option<&DiagnosticResult>,
    ) -> StorageResult<bool> {
        let state = encode("session", session)?;
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE sessions
            SET status = ?, version = ?, last_activity_at = ?, completed_at = ?, state = ?
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(session.status.to_string())
        .bind(session.version)
        .bind(timestamp(session.last_activity_at))
        .bind(session.completed_at.map(timestamp))
        .bind(&state)
        .bind(&session.session_id)
        .bind(expected_version)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            debug!(
                session_id = %session.session_id,
                expected_version,
                "Session version conflict"
            );
            return Ok(false);
        }

        if let Some(result) = result {
            let payload = encode("result", result)?;
            sqlx::query(
                r#"
                INSERT INTO results (session_id, result_id, learner_id, form_id, severity,
                                     completed_at, payload)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&result.session_id)
            .bind(&result.result_id)
            .bind(&result.learner_id)
            .bind(&result.form_id)
            .bind(result.severity.to_string())
            .bind(timestamp(result.completed_at))
            .bind(&payload)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn list_open_sessions(&self) -> StorageResult<Vec<SessionState>> {
        let rows: Vec<SessionRow> = sqlx::query_as(
            r#"
            SELECT id, version, state
            FROM sessions
            WHERE status = 'in_progress'
            ORDER BY last_activity_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SessionRow::into_state).collect()
    }

    async fn get_result(&self, session_id: &str) -> StorageResult<Option<DiagnosticResult>> {
        let payload: Option<String> =
            sqlx::query_scalar("SELECT payload FROM results WHERE session_id = ?")
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await?;

        payload.map(|p| decode("result", &p)).transpose()
    }

    async fn get_learner_results(
        &self,
        learner_id: &str,
        limit: u32,
    ) -> StorageResult<Vec<DiagnosticResult>> {
        let payloads: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT payload FROM results
            WHERE learner_id = ?
            ORDER BY completed_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(learner_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        payloads.iter().map(|p| decode("result", p)).collect()
    }
}

// Internal row types for SQLx mapping
#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    version: i64,
    state: String,
}

impl SessionRow {
    /// Decode the state blob; the row's version column is authoritative.
    fn into_state(self) -> StorageResult<SessionState> {
        let mut state: SessionState = decode("session", &self.state)?;
        if state.session_id != self.id {
            return Err(StorageError::Serialization {
                entity: "session".to_string(),
                message: format!("row {} holds state for {}", self.id, state.session_id),
            });
        }
        state.version = self.version;
        Ok(state)
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn encode<T: serde::Serialize>(entity: &str, value: &T) -> StorageResult<String> {
    serde_json::to_string(value).map_err(|e| StorageError::Serialization {
        entity: entity.to_string(),
        message: e.to_string(),
    })
}

fn decode<T: DeserializeOwned>(entity: &str, payload: &str) -> StorageResult<T> {
    serde_json::from_str(payload).map_err(|e| StorageError::Serialization {
        entity: entity.to_string(),
        message: e.to_string(),
    })
}
