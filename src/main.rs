use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use diagnostic_engine::{
    cli::{execute_command, Cli, Commands},
    config::{Config, LogFormat},
    engine::SessionManager,
    server::{AppState, McpServer, SharedState},
    storage::SqliteStorage,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(&config);

    // Initialize storage
    let storage = match SqliteStorage::new(&config.database).await {
        Ok(s) => {
            info!(path = %config.database.path.display(), "Database initialized");
            s
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize database");
            return Err(e.into());
        }
    };

    let command = cli.command();
    if command != Commands::Serve {
        let manager = SessionManager::new(storage, &config);
        let result = execute_command(command, &manager).await;
        if result.exit_code == 0 {
            println!("{}", result.message);
        } else {
            eprintln!("{}", result.message);
        }
        std::process::exit(result.exit_code);
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Diagnostic session server starting..."
    );

    let sweep_secs = config.engine.expiry_sweep_interval_secs;
    let state: SharedState = Arc::new(AppState::new(config, storage));

    if sweep_secs > 0 {
        tokio::spawn(run_expiry_sweeper(
            Arc::clone(&state),
            Duration::from_secs(sweep_secs),
        ));
    } else {
        info!("Expiry sweeper disabled");
    }

    let server = McpServer::new(state);

    info!("Server ready, waiting for requests on stdin...");

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Periodically close sessions that have gone idle.
async fn run_expiry_sweeper(state: SharedState, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        match state.manager.expire_inactive(state.manager.now()).await {
            Ok(expired) if !expired.is_empty() => {
                info!(count = expired.len(), "Expiry sweep closed sessions");
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Expiry sweep failed"),
        }
    }
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
