use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::AppError;
use crate::form::MAX_TIME_LIMIT_MINUTES;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub request: RequestConfig,
    pub engine: EngineConfig,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Request handling configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    /// Upper bound for a single start/submit call.
    pub timeout_ms: u64,
    /// Optimistic commit attempts before giving up with `Contention`.
    pub max_retries: u32,
}

/// How answer options are ordered in node views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptionOrder {
    /// Shuffled deterministically from `(session_id, node_id)`.
    #[default]
    Seeded,
    /// Correct answer first, then distractors as authored.
    Authored,
}

impl FromStr for OptionOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "seeded" => Ok(OptionOrder::Seeded),
            "authored" => Ok(OptionOrder::Authored),
            _ => Err(format!("Unknown option order: {}", s)),
        }
    }
}

/// Decision and evidence thresholds for the session engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Accumulated confidence needed (with corroboration) to confirm a tag.
    pub confirmation_threshold: f64,
    /// Confidence below which a suspicion is treated as noise.
    pub noise_floor: f64,
    /// Primary confidence for `high` severity.
    pub high_severity_threshold: f64,
    /// Primary confidence for `critical` severity.
    pub critical_severity_threshold: f64,
    /// Distinct prerequisite skills across confirmed tags that escalate to `critical`.
    pub breadth_critical_skills: usize,
    /// Minutes past `max_time_minutes` before an idle session is expired.
    pub expiry_grace_minutes: i64,
    /// Sweeper period in seconds; 0 disables the background sweeper.
    pub expiry_sweep_interval_secs: u64,
    pub option_order: OptionOrder,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database = DatabaseConfig {
            path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/diagnostic.db".to_string()),
            ),
            max_connections: env_parse("DATABASE_MAX_CONNECTIONS", 5)?,
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let request = RequestConfig {
            timeout_ms: env_parse("REQUEST_TIMEOUT_MS", 5000)?,
            max_retries: env_parse("MAX_RETRIES", 3)?,
        };

        let defaults = EngineConfig::default();
        let engine = EngineConfig {
            confirmation_threshold: env_parse(
                "CONFIRMATION_THRESHOLD",
                defaults.confirmation_threshold,
            )?,
            noise_floor: env_parse("NOISE_FLOOR", defaults.noise_floor)?,
            high_severity_threshold: env_parse(
                "HIGH_SEVERITY_THRESHOLD",
                defaults.high_severity_threshold,
            )?,
            critical_severity_threshold: env_parse(
                "CRITICAL_SEVERITY_THRESHOLD",
                defaults.critical_severity_threshold,
            )?,
            breadth_critical_skills: env_parse(
                "BREADTH_CRITICAL_SKILLS",
                defaults.breadth_critical_skills,
            )?,
            expiry_grace_minutes: env_parse("EXPIRY_GRACE_MINUTES", defaults.expiry_grace_minutes)?,
            expiry_sweep_interval_secs: env_parse(
                "EXPIRY_SWEEP_INTERVAL_SECS",
                defaults.expiry_sweep_interval_secs,
            )?,
            option_order: match env::var("OPTION_ORDER") {
                Ok(raw) => raw
                    .parse()
                    .map_err(|message| AppError::Config { message })?,
                Err(_) => defaults.option_order,
            },
        };
        engine.validate()?;

        Ok(Config {
            database,
            logging,
            request,
            engine,
        })
    }
}

impl EngineConfig {
    /// Check that thresholds form a usable 0-1 scale.
    pub fn validate(&self) -> Result<(), AppError> {
        let unit = [
            ("CONFIRMATION_THRESHOLD", self.confirmation_threshold),
            ("NOISE_FLOOR", self.noise_floor),
            ("HIGH_SEVERITY_THRESHOLD", self.high_severity_threshold),
            ("CRITICAL_SEVERITY_THRESHOLD", self.critical_severity_threshold),
        ];
        for (name, value) in unit {
            if !(0.0..=1.0).contains(&value) {
                return Err(AppError::Config {
                    message: format!("{} must be within 0.0-1.0, got {}", name, value),
                });
            }
        }
        if self.noise_floor >= self.confirmation_threshold {
            return Err(AppError::Config {
                message: "NOISE_FLOOR must be below CONFIRMATION_THRESHOLD".to_string(),
            });
        }
        if self.high_severity_threshold > self.critical_severity_threshold {
            return Err(AppError::Config {
                message: "HIGH_SEVERITY_THRESHOLD must not exceed CRITICAL_SEVERITY_THRESHOLD"
                    .to_string(),
            });
        }
        if !(0..=MAX_TIME_LIMIT_MINUTES).contains(&self.expiry_grace_minutes) {
            return Err(AppError::Config {
                message: format!(
                    "EXPIRY_GRACE_MINUTES must be within 0-{}, got {}",
                    MAX_TIME_LIMIT_MINUTES, self.expiry_grace_minutes
                ),
            });
        }
        Ok(())
    }
}

fn env_parse<T: FromStr>(name: &str, default: T) -> Result<T, AppError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| AppError::Config {
            message: format!("{} has an invalid value: {}", name, raw),
        }),
        Err(_) => Ok(default),
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            max_retries: 3,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            confirmation_threshold: 0.65,
            noise_floor: 0.15,
            high_severity_threshold: 0.65,
            critical_severity_threshold: 0.85,
            breadth_critical_skills: 4,
            expiry_grace_minutes: 5,
            expiry_sweep_interval_secs: 60,
            option_order: OptionOrder::Seeded,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}
