//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use lms_progress_core::CompletionPolicy;
use std::net::SocketAddr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    /// Watch percentage at which a lesson counts as completed.
    pub completion_threshold: f64,
    /// Quiz percentage that stamps the passing attempt.
    pub quiz_pass_threshold: f64,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Database Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load Completion Policy Knobs ---
        let completion_threshold = parse_percentage("COMPLETION_THRESHOLD", 95.0)?;
        let quiz_pass_threshold = parse_percentage("QUIZ_PASS_THRESHOLD", 100.0)?;

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            completion_threshold,
            quiz_pass_threshold,
        })
    }

    pub fn completion_policy(&self) -> CompletionPolicy {
        CompletionPolicy {
            completion_threshold: self.completion_threshold,
            quiz_pass_threshold: self.quiz_pass_threshold,
        }
    }
}

fn parse_percentage(var: &str, default: f64) -> Result<f64, ConfigError> {
    let raw = match std::env::var(var) {
        Ok(v) => v,
        Err(_) => return Ok(default),
    };
    let value = raw
        .parse::<f64>()
        .map_err(|e| ConfigError::InvalidValue(var.to_string(), e.to_string()))?;
    if !value.is_finite() || !(0.0..=100.0).contains(&value) {
        return Err(ConfigError::InvalidValue(
            var.to_string(),
            format!("'{}' is not a percentage between 0 and 100", raw),
        ));
    }
    Ok(value)
}
