//! # Diagnostic Engine
//!
//! An adaptive diagnostic session engine. A learner answers a short root
//! item; a wrong answer whose distractor carries a misconception tag routes
//! them into probes that confirm or rule out that misconception. Evidence
//! accumulates per tag and the finished session yields an explainable
//! result: primary misconception, severity, interventions and summaries.
//!
//! ## Architecture
//!
//! ```text
//! MCP Client → McpServer (JSON-RPC stdio) → SessionManager
//!                                              ↓
//!                        DecisionEngine / ConfidenceAggregator / ResultSynthesizer
//!                                              ↓
//!                                        SQLite (forms, sessions, results)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use diagnostic_engine::{Config, AppState, McpServer};
//! use diagnostic_engine::storage::SqliteStorage;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let storage = SqliteStorage::new(&config.database).await?;
//!     let state = Arc::new(AppState::new(config, storage));
//!     McpServer::new(state).run().await?;
//!     Ok(())
//! }
//! ```

/// Misconception taxonomy and remediation lookup.
pub mod catalog;
/// Command-line subcommands.
pub mod cli;
/// Configuration management.
pub mod config;
/// Session lifecycle, decision making, evidence and result synthesis.
pub mod engine;
/// Error types and result aliases for the application.
pub mod error;
/// Diagnostic form model and validation.
pub mod form;
/// MCP server implementation and request handling.
pub mod server;
/// SQLite storage layer for persistence.
pub mod storage;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use server::{AppState, McpServer, SharedState};
