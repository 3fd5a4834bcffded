//! Command-line interface.
//!
//! `serve` runs the stdio protocol server. The other commands are one-shot
//! operational tasks against the same database.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use crate::engine::SessionManager;
use crate::form::DiagnosticForm;

/// Adaptive diagnostic session engine.
#[derive(Parser, Debug)]
#[command(name = "diagnostic-engine", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// The requested command, `serve` when none was given.
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Serve)
    }
}

/// CLI subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Serve JSON-RPC requests on stdin/stdout (default)
    Serve,

    /// Validate and register a diagnostic form from a JSON file
    LoadForm {
        /// Path to the form definition
        path: PathBuf,
    },

    /// Expire sessions idle past their time budget and write their results
    Expire,

    /// List registered forms
    Forms,

    /// Show a learner's most recent results
    Results {
        /// Learner identifier
        learner_id: String,

        /// Maximum number of results to show
        #[arg(long, default_value = "10")]
        limit: u32,
    },
}

/// Result of CLI command execution.
pub struct CliResult {
    /// Exit code (0 = success)
    pub exit_code: i32,
    /// Output message
    pub message: String,
}

impl CliResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            exit_code: 1,
            message: message.into(),
        }
    }
}

/// Execute a one-shot command. `Serve` is handled by the binary.
pub async fn execute_command(command: Commands, manager: &SessionManager) -> CliResult {
    match command {
        Commands::Serve => CliResult::error("serve is not a one-shot command"),
        Commands::LoadForm { path } => execute_load_form(manager, &path).await,
        Commands::Expire => execute_expire(manager).await,
        Commands::Forms => execute_forms(manager).await,
        Commands::Results { learner_id, limit } => {
            execute_results(manager, &learner_id, limit).await
        }
    }
}

async fn execute_load_form(manager: &SessionManager, path: &Path) -> CliResult {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) => return CliResult::error(format!("Cannot read {}: {}", path.display(), e)),
    };
    let form: DiagnosticForm = match serde_json::from_str(&raw) {
        Ok(form) => form,
        Err(e) => return CliResult::error(format!("Malformed form JSON: {}", e)),
    };

    match manager.register_form(form).await {
        Ok(summary) => CliResult::success(format!(
            "Registered {} v{} ({} items, {} probes, {} edges)",
            summary.form_id,
            summary.version,
            summary.item_count,
            summary.probe_count,
            summary.edge_count
        )),
        Err(e) => {
            let mut message = e.to_string();
            if let crate::error::DiagnosticError::InvalidForm { problems, .. } = &e {
                for problem in problems {
                    message.push_str(&format!("\n  - {}", problem));
                }
            }
            CliResult::error(message)
        }
    }
}

async fn execute_expire(manager: &SessionManager) -> CliResult {
    match manager.expire_inactive(manager.now()).await {
        Ok(expired) if expired.is_empty() => CliResult::success("No inactive sessions"),
        Ok(expired) => {
            let mut output = format!("Expired {} session(s)\n", expired.len());
            for id in expired {
                output.push_str(&format!("  {}\n", id));
            }
            CliResult::success(output)
        }
        Err(e) => CliResult::error(format!("Expiry failed: {}", e)),
    }
}

async fn execute_forms(manager: &SessionManager) -> CliResult {
    match manager.forms().await {
        Ok(forms) if forms.is_empty() => CliResult::success("No forms registered"),
        Ok(forms) => {
            let mut output = String::new();
            for form in forms {
                output.push_str(&format!(
                    "{:<24} v{:<3} {:>2} items {:>2} probes  {}\n",
                    form.form_id, form.version, form.item_count, form.probe_count, form.title
                ));
            }
            CliResult::success(output)
        }
        Err(e) => CliResult::error(format!("Cannot list forms: {}", e)),
    }
}

async fn execute_results(manager: &SessionManager, learner_id: &str, limit: u32) -> CliResult {
    match manager.learner_results(learner_id, Some(limit)).await {
        Ok(results) if results.is_empty() => {
            CliResult::success(format!("No results for {}", learner_id))
        }
        Ok(results) => {
            let mut output = String::new();
            for result in results {
                output.push_str(&format!(
                    "{}  {:<8} {:<24} {}\n",
                    result.completed_at.format("%Y-%m-%d %H:%M"),
                    result.severity,
                    result.primary_misconception.as_deref().unwrap_or("-"),
                    result.session_id
                ));
            }
            CliResult::success(output)
        }
        Err(e) => CliResult::error(format!("Cannot load results: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, DatabaseConfig, EngineConfig, LoggingConfig, RequestConfig};
    use crate::storage::SqliteStorage;
    use std::io::Write;

    async fn create_manager() -> SessionManager {
        let storage = SqliteStorage::new_in_memory().await.unwrap();
        let config = Config {
            database: DatabaseConfig {
                path: ":memory:".into(),
                max_connections: 1,
            },
            logging: LoggingConfig::default(),
            request: RequestConfig::default(),
            engine: EngineConfig::default(),
        };
        SessionManager::new(storage, &config)
    }

    #[test]
    fn test_default_command_is_serve() {
        let cli = Cli::parse_from(["diagnostic-engine"]);
        assert_eq!(cli.command(), Commands::Serve);
    }

    #[test]
    fn test_parse_load_form() {
        let cli = Cli::parse_from(["diagnostic-engine", "load-form", "forms/mult.json"]);
        assert_eq!(
            cli.command(),
            Commands::LoadForm {
                path: PathBuf::from("forms/mult.json")
            }
        );
    }

    #[test]
    fn test_parse_results_limit() {
        let cli = Cli::parse_from(["diagnostic-engine", "results", "learner-1", "--limit", "3"]);
        assert_eq!(
            cli.command(),
            Commands::Results {
                learner_id: "learner-1".to_string(),
                limit: 3
            }
        );
    }

    #[tokio::test]
    async fn test_load_form_from_file() {
        let manager = create_manager().await;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(include_bytes!("../tests/fixtures/multiplication_form.json"))
            .unwrap();

        let result = execute_command(
            Commands::LoadForm {
                path: file.path().to_path_buf(),
            },
            &manager,
        )
        .await;
        assert_eq!(result.exit_code, 0, "{}", result.message);
        assert!(result.message.contains("form-mult-01"));

        let forms = execute_command(Commands::Forms, &manager).await;
        assert!(forms.message.contains("form-mult-01"));
    }

    #[tokio::test]
    async fn test_load_form_rejects_bad_json() {
        let manager = create_manager().await;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{ \"form_id\": ").unwrap();

        let result = execute_command(
            Commands::LoadForm {
                path: file.path().to_path_buf(),
            },
            &manager,
        )
        .await;
        assert_eq!(result.exit_code, 1);
        assert!(result.message.contains("Malformed form JSON"));
    }

    #[tokio::test]
    async fn test_expire_with_nothing_open() {
        let manager = create_manager().await;
        let result = execute_command(Commands::Expire, &manager).await;
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.message, "No inactive sessions");
    }
}
