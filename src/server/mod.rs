//! Server module for MCP protocol handling.
//!
//! This module provides:
//! - MCP server implementation over stdio
//! - Tool call handlers and routing
//! - Shared application state management

mod handlers;
mod mcp;

pub use handlers::*;
pub use mcp::*;

use std::sync::Arc;

use crate::config::Config;
use crate::engine::SessionManager;
use crate::storage::SqliteStorage;

/// Application state shared across handlers.
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// SQLite storage backend.
    pub storage: SqliteStorage,
    /// Diagnostic session engine.
    pub manager: SessionManager,
}

impl AppState {
    /// Create new application state
    pub fn new(config: Config, storage: SqliteStorage) -> Self {
        tracing::info!(
            option_order = ?config.engine.option_order,
            confirmation_threshold = config.engine.confirmation_threshold,
            timeout_ms = config.request.timeout_ms,
            "AppState initializing"
        );

        let manager = SessionManager::new(storage.clone(), &config);
        Self {
            config,
            storage,
            manager,
        }
    }

    /// Create state around an already configured manager.
    pub fn with_manager(config: Config, storage: SqliteStorage, manager: SessionManager) -> Self {
        Self {
            config,
            storage,
            manager,
        }
    }
}

/// Shared application state handle
pub type SharedState = Arc<AppState>;
