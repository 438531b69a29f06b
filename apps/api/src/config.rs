use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Fails at startup if a variable is present but malformed.
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres URL for persisted quiz results. Unset keeps results in memory.
    pub database_url: Option<String>,
    /// Directory holding the quiz question JSON files. Defaults to the
    /// bundled `data/` next to this crate's manifest.
    pub quiz_data_dir: PathBuf,
    /// Fixed seed for tie draws and the placeholder ranker. Unset seeds from entropy.
    pub quiz_rng_seed: Option<u64>,
    /// Unfinished sessions idle this long are dropped from memory.
    pub session_idle_timeout: Duration,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: optional_env("DATABASE_URL"),
            quiz_data_dir: optional_env("QUIZ_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(default_data_dir),
            quiz_rng_seed: optional_env("QUIZ_RNG_SEED")
                .map(|s| s.parse::<u64>())
                .transpose()
                .context("QUIZ_RNG_SEED must be an unsigned integer")?,
            session_idle_timeout: Duration::from_secs(
                std::env::var("SESSION_IDLE_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "1800".to_string())
                    .parse::<u64>()
                    .context("SESSION_IDLE_TIMEOUT_SECS must be a number of seconds")?,
            ),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/data"))
}
